//! Turns raw compiler and interpreter diagnostics into localized records.

use std::collections::BTreeMap;

use regex::{Captures, Regex};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Syntax,
    Runtime,
    Linker,
    Logic,
    Semantic,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Error,
    Warning,
    Info,
}

impl ErrorKind {
    fn severity(self) -> Severity {
        match self {
            ErrorKind::Linker => Severity::Critical,
            ErrorKind::Logic => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub severity: Severity,
    /// 0 when the message carries no line.
    pub line: usize,
    pub column: usize,
    pub raw_message: String,
    pub localized_message: String,
}

struct Pattern {
    kind: ErrorKind,
    regex: Regex,
    template: &'static str,
}

fn compile(pattern: &str) -> Option<Regex> {
    Regex::new(&format!("(?i){pattern}"))
        .map_err(|e| log::error!("Invalid diagnostic pattern {:?}: {}", pattern, e))
        .ok()
}

lazy_static::lazy_static! {
    static ref PATTERNS: Vec<Pattern> = [
        (ErrorKind::Syntax, r"Parse Error: (.+) \(Satir: (\d+)\)", "Sözdizimi hatası, satır {1}: {0}"),
        (ErrorKind::Syntax, r"Syntax Error: (.+) at line (\d+)", "Sözdizimi hatası, satır {1}: {0}"),
        (ErrorKind::Syntax, r"Expected (.+) but got (.+) at line (\d+)", "Satır {2}: {0} bekleniyordu, {1} bulundu"),
        (ErrorKind::Runtime, r"Runtime Error: (.+) \(Satir: (\d+)\)", "Çalışma zamanı hatası, satır {1}: {0}"),
        (ErrorKind::Runtime, r"Tanimlanmamis degisken: '(.+?)'", "Tanımsız değişken: '{0}'"),
        (ErrorKind::Runtime, r"Division by zero at line (\d+)", "Sıfıra bölme, satır {0}"),
        (ErrorKind::Linker, r"undefined reference to `(.+)'", "Tanımsız referans: {0}"),
        (ErrorKind::Linker, r"LNK2019: unresolved external symbol (.+)", "Çözülmemiş sembol: {0}"),
        (ErrorKind::Linker, r"ld returned (\d+) exit status", "Bağlayıcı {0} koduyla çıktı"),
        (ErrorKind::Logic, r"Infinite loop detected at line (\d+)", "Sonsuz döngü, satır {0}"),
        (ErrorKind::Logic, r"Stack overflow at line (\d+)", "Yığın taşması, satır {0}"),
    ]
    .into_iter()
    .filter_map(|(kind, pattern, template)| {
        compile(pattern).map(|regex| Pattern { kind, regex, template })
    })
    .collect();

    static ref TRANSLATIONS: Vec<(Regex, &'static str)> = [
        (r"syntax error", "Kodun yapısında bir bozukluk var."),
        (r"parse error", "Kod okunurken bir eksiklik bulundu."),
        (r"fatal error", "Derleme kritik bir hata yüzünden durdu."),
        (r"error: '(.+?)' was not declared in this scope", "'{0}' kullanılmadan önce 'değişken' ile tanımlanmalı."),
        (r"undefined variable '(.+?)'", "Tanımsız değişken: '{0}'."),
        (r"redefinition of '(.+?)'", "'{0}' ismi zaten kullanılıyor."),
        (r"error: expected '(.+?)' before '(.+?)'", "'{1}' ifadesinden önce '{0}' bekleniyordu."),
        (r"expected '(.+?)'", "Şu ifade bekleniyor: '{0}'."),
        (r"missing '(.+?)'", "Eksik karakter: '{0}'."),
        (r"expected expression", "Burada bir ifade bekleniyor."),
        (r"expected ';'", "Satır sonunda noktalı virgül (;) eksik."),
        (r"error: invalid conversion from '(.+?)' to '(.+?)'", "'{0}' türü '{1}' türüne dönüştürülemez."),
        (r"error: no matching function for call to '(.+?)'", "'{0}' bu argümanlarla çağrılamaz."),
        (r"function '(.+?)' not found", "Fonksiyon bulunamadı: '{0}'."),
        (r"unknown type '(.+?)'", "Bilinmeyen tür: '{0}'."),
        (r"unmatched '\{'", "Açılan blok ({) kapatılmamış."),
        (r"unmatched '\}'", "Fazladan blok kapatma (})."),
        (r"segmentation fault", "Bellek erişim hatası."),
        (r"division by zero", "Sıfıra bölme hatası."),
        (r"stack overflow", "Yığın taşması."),
        (r"no such file or directory", "Böyle bir dosya veya klasör yok."),
        (r"permission denied", "Erişim reddedildi."),
    ]
    .into_iter()
    .filter_map(|(pattern, template)| compile(pattern).map(|regex| (regex, template)))
    .collect();

    static ref LINE_REFERENCE: Option<Regex> = compile(r"line\s+\d+|:\d+:");
}

/// Fills `{i}` placeholders with the matching capture groups.
fn interpolate(template: &str, captures: &Captures) -> String {
    captures
        .iter()
        .skip(1)
        .enumerate()
        .fold(template.to_string(), |text, (i, group)| {
            text.replace(&format!("{{{i}}}"), group.map_or("", |m| m.as_str()))
        })
}

/// Classifies the first known diagnostic in `raw`.
pub fn classify(raw: &str) -> Option<ErrorRecord> {
    PATTERNS.iter().find_map(|pattern| {
        let captures = pattern.regex.captures(raw)?;
        let line = captures
            .iter()
            .skip(1)
            .flatten()
            .map(|m| m.as_str())
            .find(|group| !group.is_empty() && group.chars().all(|c| c.is_ascii_digit()))
            .and_then(|group| group.parse().ok())
            .unwrap_or(0);

        Some(ErrorRecord {
            kind: pattern.kind,
            severity: pattern.kind.severity(),
            line,
            column: 0,
            raw_message: captures.get(0).map_or("", |m| m.as_str()).to_string(),
            localized_message: interpolate(pattern.template, &captures),
        })
    })
}

/// Rewrites every error or warning line of a diagnostic stream in Turkish.
pub fn translate(text: &str) -> String {
    text.split('\n')
        .map(|line| translate_line(line).unwrap_or_else(|| line.to_string()))
        .collect::<Vec<_>>()
        .join("\n")
}

fn translate_line(line: &str) -> Option<String> {
    let trimmed = line.trim();
    let lower = trimmed.to_lowercase();
    let is_error = lower.contains("error");
    let is_warning = lower.contains("warning");
    if !is_error && !is_warning && !lower.contains("hata") {
        return None;
    }

    let translated = TRANSLATIONS.iter().find_map(|(regex, template)| {
        let captures = regex.captures(trimmed)?;
        let location = LINE_REFERENCE
            .as_ref()
            .and_then(|regex| regex.find(trimmed))
            .map(|m| format!("📍 {} ", m.as_str()))
            .unwrap_or_default();
        let icon = if is_warning { "⚠️" } else { "🔴 HATA:" };
        Some(format!("{location}{icon} {}", interpolate(template, &captures)))
    });

    match translated {
        Some(line) => Some(line),
        None if is_error => Some(format!("🔴 {trimmed}")),
        None if is_warning => Some(format!("⚠️ {trimmed}")),
        None => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ErrorStatistics {
    pub total_errors: usize,
    pub by_type: BTreeMap<ErrorKind, usize>,
    pub by_severity: BTreeMap<Severity, usize>,
    /// 0 when no record carries a line.
    pub most_common_line: usize,
}

/// Append-only log of classified diagnostics.
#[derive(Debug, Clone, Default)]
pub struct ErrorHistory {
    records: Vec<ErrorRecord>,
}

impl ErrorHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classifies `raw` and keeps the record if it is a known diagnostic.
    pub fn record(&mut self, raw: &str) -> Option<ErrorRecord> {
        let record = classify(raw)?;
        log::debug!("Recorded {:?} error at line {}", record.kind, record.line);
        self.records.push(record.clone());
        Some(record)
    }

    pub fn records(&self) -> &[ErrorRecord] {
        &self.records
    }

    pub fn statistics(&self) -> ErrorStatistics {
        let mut statistics = ErrorStatistics {
            total_errors: self.records.len(),
            ..Default::default()
        };
        let mut lines: BTreeMap<usize, usize> = BTreeMap::new();

        for record in &self.records {
            *statistics.by_type.entry(record.kind).or_default() += 1;
            *statistics.by_severity.entry(record.severity).or_default() += 1;
            if record.line > 0 {
                *lines.entry(record.line).or_default() += 1;
            }
        }

        // Ties go to the lowest line.
        statistics.most_common_line = lines
            .into_iter()
            .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
            .map_or(0, |(line, _)| line);
        statistics
    }
}

const MISSPELLINGS: &[(&str, &str)] = &[
    ("degisken", "değişken"),
    ("dongu", "döngü"),
    ("eger", "eğer"),
    ("degilse", "değilse"),
    ("yazdir", "yazdır"),
];

lazy_static::lazy_static! {
    static ref QUOTED_NAME: Option<Regex> = compile(r"'([^']+)'");
}

/// A short hint for fixing `record`.
pub fn suggest_fix(record: &ErrorRecord) -> String {
    let message = record.raw_message.to_lowercase();

    if message.contains("tanimlanmamis") || message.contains("tanımsız") || message.contains("undefined") {
        if let Some(name) = QUOTED_NAME
            .as_ref()
            .and_then(|regex| regex.captures(&record.raw_message))
            .and_then(|captures| captures.get(1))
        {
            let name = name.as_str();
            return format!("💡 '{name}' tanımlanmamış. Önce 'değişken {name} = ...' şeklinde tanımlayın.");
        }
    }

    match record.kind {
        ErrorKind::Syntax => {
            if let Some((wrong, right)) = MISSPELLINGS.iter().find(|(wrong, _)| message.contains(wrong)) {
                return format!("💡 '{wrong}' yerine '{right}' yazmalısınız.");
            }
        }
        ErrorKind::Linker => {
            return "💡 Eksik kütüphane veya fonksiyon tanımı. 'dahil et' satırlarını kontrol edin.".to_string()
        }
        ErrorKind::Logic => {
            return "💡 Döngü koşulunun bir noktada yanlış olduğundan ya da özyinelemenin bittiğinden emin olun."
                .to_string()
        }
        _ => {}
    }

    "💡 Kodu dikkatle kontrol edin ve hata mesajını okuyun.".to_string()
}
