use crate::{ast::Literal, span::Span};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenType {
    // Single-character tokens
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    Comma,
    Dot,
    Minus,
    Plus,
    Semicolon,
    Slash,
    Star,
    Percent,

    // One or two character tokens
    Bang,
    BangEqual,
    Equal,
    EqualEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,

    // Literals
    Identifier(String),
    String(String),
    TemplateString(String),
    Integer(i64),
    Float(f64),

    // Keywords
    And,
    Break,
    Catch,
    Class,
    Continue,
    Else,
    False,
    Function,
    If,
    Include,
    New,
    Not,
    Null,
    Or,
    Print,
    Return,
    Super,
    This,
    True,
    Try,
    Var,
    While,

    // End of file
    Eof,
}

impl std::fmt::Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenType::LeftParen => write!(f, "("),
            TokenType::RightParen => write!(f, ")"),
            TokenType::LeftBrace => write!(f, "{{"),
            TokenType::RightBrace => write!(f, "}}"),
            TokenType::LeftBracket => write!(f, "["),
            TokenType::RightBracket => write!(f, "]"),
            TokenType::Comma => write!(f, ","),
            TokenType::Dot => write!(f, "."),
            TokenType::Minus => write!(f, "-"),
            TokenType::Plus => write!(f, "+"),
            TokenType::Semicolon => write!(f, ";"),
            TokenType::Slash => write!(f, "/"),
            TokenType::Star => write!(f, "*"),
            TokenType::Percent => write!(f, "%"),
            TokenType::Bang => write!(f, "!"),
            TokenType::BangEqual => write!(f, "!="),
            TokenType::Equal => write!(f, "="),
            TokenType::EqualEqual => write!(f, "=="),
            TokenType::Greater => write!(f, ">"),
            TokenType::GreaterEqual => write!(f, ">="),
            TokenType::Less => write!(f, "<"),
            TokenType::LessEqual => write!(f, "<="),
            TokenType::Identifier(name) => write!(f, "{name}"),
            TokenType::String(s) => write!(f, "\"{s}\""),
            TokenType::TemplateString(s) => write!(f, "$\"{s}\""),
            TokenType::Integer(n) => write!(f, "{n}"),
            TokenType::Float(n) => write!(f, "{n}"),
            TokenType::And => write!(f, "ve"),
            TokenType::Break => write!(f, "kır"),
            TokenType::Catch => write!(f, "yakala"),
            TokenType::Class => write!(f, "sınıf"),
            TokenType::Continue => write!(f, "devam"),
            TokenType::Else => write!(f, "değilse"),
            TokenType::False => write!(f, "yanlış"),
            TokenType::Function => write!(f, "fonksiyon"),
            TokenType::If => write!(f, "eğer"),
            TokenType::Include => write!(f, "dahil et"),
            TokenType::New => write!(f, "yeni"),
            TokenType::Not => write!(f, "değil"),
            TokenType::Null => write!(f, "yok"),
            TokenType::Or => write!(f, "veya"),
            TokenType::Print => write!(f, "yazdır"),
            TokenType::Return => write!(f, "dön"),
            TokenType::Super => write!(f, "ata"),
            TokenType::This => write!(f, "öz"),
            TokenType::True => write!(f, "doğru"),
            TokenType::Try => write!(f, "dene"),
            TokenType::Var => write!(f, "değişken"),
            TokenType::While => write!(f, "döngü"),
            TokenType::Eof => write!(f, "EOF"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub token_type: TokenType,
    pub span: Span,
}

impl Token {
    pub fn new(token_type: TokenType, span: Span) -> Self {
        Self { token_type, span }
    }

    pub fn token_type(&self) -> &TokenType {
        &self.token_type
    }

    pub fn line(&self) -> usize {
        self.span.line
    }

    /// The literal value carried by the token, if it is a literal.
    pub fn literal(&self) -> Option<Literal> {
        match &self.token_type {
            TokenType::String(s) | TokenType::TemplateString(s) => Some(Literal::String(s.clone())),
            TokenType::Integer(n) => Some(Literal::Integer(*n)),
            TokenType::Float(n) => Some(Literal::Float(*n)),
            TokenType::True => Some(Literal::Boolean(true)),
            TokenType::False => Some(Literal::Boolean(false)),
            TokenType::Null => Some(Literal::Null),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum TokenizeError {
    #[error("Unterminated string")]
    UnterminatedString { line: usize },
}

impl TokenizeError {
    pub fn line(&self) -> usize {
        match self {
            TokenizeError::UnterminatedString { line } => *line,
        }
    }
}

pub fn tokenize(source: &str) -> Result<Vec<Token>, TokenizeError> {
    let mut tokenizer = Tokenizer::new(source);
    let mut tokens = Vec::new();

    loop {
        let token = tokenizer.token()?;
        let done = token.token_type == TokenType::Eof;
        tokens.push(token);
        if done {
            break;
        }
    }

    Ok(tokens)
}

pub struct Tokenizer<'a> {
    rest: &'a str,
    span: Span,
    finished: bool,
}

impl<'a> Tokenizer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            rest: source,
            span: Span::new(1, 1),
            finished: false,
        }
    }

    fn advance(&mut self, rest: &'a str) {
        let consumed = &self.rest[..self.rest.len() - rest.len()];
        self.span.advance(consumed);
        self.rest = rest;
    }

    pub fn token(&mut self) -> Result<Token, TokenizeError> {
        loop {
            if self.finished {
                return Ok(Token::new(TokenType::Eof, self.span));
            }

            while let Some((_, rest)) = maximal(&[whitespace, comment], self.rest) {
                self.advance(rest);
            }

            let start = self.span;
            if self.rest.is_empty() {
                self.finished = true;
                continue;
            }

            if self.rest.starts_with('"') || self.rest.starts_with("$\"") {
                let (token_type, rest) = string(self.rest)
                    .ok_or(TokenizeError::UnterminatedString { line: start.line })?;
                self.advance(rest);
                return Ok(Token::new(token_type, start));
            }

            let scanned = maximal(
                &[
                    // Single-character tokens
                    left_paren,
                    right_paren,
                    left_brace,
                    right_brace,
                    left_bracket,
                    right_bracket,
                    comma,
                    dot,
                    minus,
                    plus,
                    semicolon,
                    slash,
                    star,
                    percent,
                    // one or two character tokens
                    bang,
                    bang_equal,
                    equal,
                    equal_equal,
                    greater,
                    greater_equal,
                    less,
                    less_equal,
                    // literals and keywords
                    number,
                    word,
                ],
                self.rest,
            );

            match scanned {
                // `çık` ends the program text
                Some((TokenType::Eof, _)) => {
                    self.finished = true;
                    return Ok(Token::new(TokenType::Eof, start));
                }
                Some((token_type, rest)) => {
                    self.advance(rest);
                    return Ok(Token::new(token_type, start));
                }
                None => {
                    let mut chars = self.rest.chars();
                    if let Some(c) = chars.next() {
                        log::debug!("Skipping unexpected character {c:?} at {start}");
                    }
                    self.advance(chars.as_str());
                }
            }
        }
    }
}

fn maximal<'a, T: std::fmt::Debug>(
    parsers: &[fn(&str) -> Option<(T, &str)>],
    source: &'a str,
) -> Option<(T, &'a str)> {
    let mut min_left = source.len() + 1;
    let mut max_match = None;

    let matching_parsers = parsers.iter().filter_map(|parser| parser(source));
    for (m, rest) in matching_parsers {
        let left = rest.len();
        if left < min_left {
            min_left = left;
            max_match = Some((m, rest));
        }
    }

    max_match
}

fn whitespace(source: &str) -> Option<((), &str)> {
    let len = source
        .chars()
        .take_while(|c| c.is_whitespace())
        .map(char::len_utf8)
        .sum();
    if len > 0 {
        Some(((), &source[len..]))
    } else {
        None
    }
}

fn comment(source: &str) -> Option<((), &str)> {
    if source.starts_with("//") {
        let len = source
            .chars()
            .take_while(|c| *c != '\n')
            .map(char::len_utf8)
            .sum();
        Some(((), &source[len..]))
    } else {
        None
    }
}

macro_rules! match_literal {
    ($name:ident, $word:literal, $token:expr) => {
        fn $name(source: &str) -> Option<(TokenType, &str)> {
            source.strip_prefix($word).map(|rest| ($token, rest))
        }
    };
}

match_literal! { left_paren, "(", TokenType::LeftParen }
match_literal! { right_paren, ")", TokenType::RightParen }
match_literal! { left_brace, "{", TokenType::LeftBrace }
match_literal! { right_brace, "}", TokenType::RightBrace }
match_literal! { left_bracket, "[", TokenType::LeftBracket }
match_literal! { right_bracket, "]", TokenType::RightBracket }
match_literal! { comma, ",", TokenType::Comma }
match_literal! { dot, ".", TokenType::Dot }
match_literal! { minus, "-", TokenType::Minus }
match_literal! { plus, "+", TokenType::Plus }
match_literal! { semicolon, ";", TokenType::Semicolon }
match_literal! { slash, "/", TokenType::Slash }
match_literal! { star, "*", TokenType::Star }
match_literal! { percent, "%", TokenType::Percent }
match_literal! { bang, "!", TokenType::Bang }
match_literal! { equal, "=", TokenType::Equal }
match_literal! { greater, ">", TokenType::Greater }
match_literal! { less, "<", TokenType::Less }
match_literal! { bang_equal, "!=", TokenType::BangEqual }
match_literal! { equal_equal, "==", TokenType::EqualEqual }
match_literal! { greater_equal, ">=", TokenType::GreaterEqual }
match_literal! { less_equal, "<=", TokenType::LessEqual }

const TURKISH_LETTERS: &str = "üğışçöÜĞİŞÇÖ";

fn is_identifier_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || TURKISH_LETTERS.contains(c)
}

fn is_identifier_char(c: char) -> bool {
    is_identifier_start(c) || c.is_ascii_digit()
}

fn identifier_len(source: &str) -> usize {
    let mut chars = source.chars();
    match chars.next() {
        Some(first) if is_identifier_start(first) => {
            first.len_utf8()
                + chars
                    .take_while(|c| is_identifier_char(*c))
                    .map(char::len_utf8)
                    .sum::<usize>()
        }
        _ => 0,
    }
}

fn keyword(word: &str) -> Option<TokenType> {
    let token_type = match word {
        "fonksiyon" => TokenType::Function,
        "eğer" | "eger" => TokenType::If,
        "değilse" | "degilse" | "yoksa" => TokenType::Else,
        "döngü" | "dongu" => TokenType::While,
        "dön" | "don" => TokenType::Return,
        "kır" | "kir" => TokenType::Break,
        "devam" => TokenType::Continue,
        "değişken" | "degisken" => TokenType::Var,
        "sınıf" | "sinif" => TokenType::Class,
        "öz" | "oz" | "ben" => TokenType::This,
        "ata" | "temel" => TokenType::Super,
        "yeni" => TokenType::New,
        "yazdır" | "yazdir" => TokenType::Print,
        "doğru" | "dogru" => TokenType::True,
        "yanlış" | "yanlis" => TokenType::False,
        "yok" => TokenType::Null,
        "dahil_et" => TokenType::Include,
        "dene" => TokenType::Try,
        "yakala" => TokenType::Catch,
        "ve" => TokenType::And,
        "veya" => TokenType::Or,
        "değil" | "degil" => TokenType::Not,
        "çık" | "cik" => TokenType::Eof,
        _ => return None,
    };
    Some(token_type)
}

/// Two-word keywords: the prefix word, exactly one space, then the continuation word.
fn compound_keyword<'a>(first: &str, rest: &'a str) -> Option<(TokenType, &'a str)> {
    let (continuations, token_type): (&[&str], TokenType) = match first {
        "dahil" => (&["et"], TokenType::Include),
        "devam" => (&["et"], TokenType::Continue),
        "boş" | "bos" => (&["geç", "gec"], TokenType::Null),
        _ => return None,
    };
    let after_space = rest.strip_prefix(' ')?;
    let len = identifier_len(after_space);
    let (second, rest) = after_space.split_at(len);
    continuations
        .contains(&second)
        .then_some((token_type, rest))
}

fn word(source: &str) -> Option<(TokenType, &str)> {
    let len = identifier_len(source);
    if len == 0 {
        return None;
    }

    let (text, rest) = source.split_at(len);
    if let Some(matched) = compound_keyword(text, rest) {
        return Some(matched);
    }

    let token_type = keyword(text).unwrap_or_else(|| TokenType::Identifier(text.to_string()));
    Some((token_type, rest))
}

fn string(source: &str) -> Option<(TokenType, &str)> {
    let (template, body) = match source.strip_prefix("$\"") {
        Some(body) => (true, body),
        None => (false, source.strip_prefix('"')?),
    };

    let end = body.find('"')?;
    let text = body[..end].to_string();
    let token_type = if template {
        TokenType::TemplateString(text)
    } else {
        TokenType::String(text)
    };
    Some((token_type, &body[end + 1..]))
}

fn number(source: &str) -> Option<(TokenType, &str)> {
    let digits = |s: &str| s.chars().take_while(char::is_ascii_digit).count();

    let whole = digits(source);
    if whole == 0 {
        return None;
    }

    let mut len = whole;
    if let Some(fraction) = source[len..].strip_prefix('.') {
        let fraction_len = digits(fraction);
        if fraction_len > 0 {
            len += 1 + fraction_len;
        }
    }

    let text = &source[..len];
    let token_type = match text.parse::<i64>() {
        Ok(n) => TokenType::Integer(n),
        Err(_) => {
            let n: f64 = text.parse().ok()?;
            if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
                TokenType::Integer(n as i64)
            } else {
                TokenType::Float(n)
            }
        }
    };
    Some((token_type, &source[len..]))
}

#[cfg(test)]
mod test {
    use super::*;

    fn token_types(source: &str) -> Vec<TokenType> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|token| token.token_type)
            .collect()
    }

    #[test]
    fn test_print_hello() {
        let expected = vec![
            TokenType::Print,
            TokenType::LeftParen,
            TokenType::String("Merhaba Dünya".to_string()),
            TokenType::RightParen,
            TokenType::Eof,
        ];
        assert_eq!(token_types("yazdır(\"Merhaba Dünya\")"), expected);
    }

    #[test]
    fn test_tokens_with_comments() {
        let source = "değişken x = 1; // yorum";
        let expected = vec![
            TokenType::Var,
            TokenType::Identifier("x".to_string()),
            TokenType::Equal,
            TokenType::Integer(1),
            TokenType::Semicolon,
            TokenType::Eof,
        ];
        assert_eq!(token_types(source), expected);
    }

    #[test]
    fn test_ascii_spellings() {
        let source = "degisken sayac = dogru ve yanlis";
        let expected = vec![
            TokenType::Var,
            TokenType::Identifier("sayac".to_string()),
            TokenType::Equal,
            TokenType::True,
            TokenType::And,
            TokenType::False,
            TokenType::Eof,
        ];
        assert_eq!(token_types(source), expected);
    }

    #[test]
    fn test_multi_word_keywords() {
        assert_eq!(
            token_types("dahil et matematik"),
            vec![
                TokenType::Include,
                TokenType::Identifier("matematik".to_string()),
                TokenType::Eof,
            ]
        );
        assert_eq!(
            token_types("devam et; boş geç"),
            vec![
                TokenType::Continue,
                TokenType::Semicolon,
                TokenType::Null,
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn test_multi_word_keyword_backtracks() {
        assert_eq!(
            token_types("dahil etiket"),
            vec![
                TokenType::Identifier("dahil".to_string()),
                TokenType::Identifier("etiket".to_string()),
                TokenType::Eof,
            ]
        );
        assert_eq!(
            token_types("devam\n et"),
            vec![
                TokenType::Continue,
                TokenType::Identifier("et".to_string()),
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn test_whole_numbers_are_integers() {
        assert_eq!(
            token_types("7 2.0 2.5"),
            vec![
                TokenType::Integer(7),
                TokenType::Integer(2),
                TokenType::Float(2.5),
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn test_double_equal() {
        assert_eq!(
            token_types("a==b"),
            vec![
                TokenType::Identifier("a".to_string()),
                TokenType::EqualEqual,
                TokenType::Identifier("b".to_string()),
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn test_unknown_characters_are_skipped() {
        assert_eq!(
            token_types("x @ y"),
            vec![
                TokenType::Identifier("x".to_string()),
                TokenType::Identifier("y".to_string()),
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn test_unterminated_string() {
        assert_eq!(
            tokenize("yazdır(1)\nyazdır(\"açık"),
            Err(TokenizeError::UnterminatedString { line: 2 })
        );
    }

    #[test]
    fn test_exit_keyword_ends_stream() {
        assert_eq!(
            token_types("yazdır 1 çık yazdır 2"),
            vec![TokenType::Print, TokenType::Integer(1), TokenType::Eof]
        );
    }

    #[test]
    fn test_template_string() {
        assert_eq!(
            token_types("$\"Merhaba {isim}\""),
            vec![
                TokenType::TemplateString("Merhaba {isim}".to_string()),
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn test_lines_and_columns() {
        let tokens = tokenize("x = 1\n  yazdır x").unwrap();
        let positions: Vec<(usize, usize)> = tokens
            .iter()
            .map(|token| (token.span.line, token.span.column))
            .collect();
        assert_eq!(positions, vec![(1, 1), (1, 3), (1, 5), (2, 3), (2, 10), (2, 11)]);
        assert!(tokens.windows(2).all(|w| w[0].line() <= w[1].line()));
    }

    #[test]
    fn test_literal_values() {
        let tokens = tokenize("\"a\" 3 yok fonksiyon").unwrap();
        assert_eq!(tokens[0].literal(), Some(Literal::String("a".to_string())));
        assert_eq!(tokens[1].literal(), Some(Literal::Integer(3)));
        assert_eq!(tokens[2].literal(), Some(Literal::Null));
        assert_eq!(tokens[3].literal(), None);
    }
}
