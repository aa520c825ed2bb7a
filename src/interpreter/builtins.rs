use std::fmt::Debug;

use rand::Rng;
use rustc_hash::FxHashMap;

use crate::protocol::Frame;

use super::{value::Value, ExecutionErrorKind, Interpreter};

pub type BuiltinFn = fn(&mut Interpreter, &[Value]) -> Result<Value, ExecutionErrorKind>;

#[derive(Clone, Copy)]
pub struct Builtin {
    pub name: &'static str,
    min_args: usize,
    max_args: usize,
    function: BuiltinFn,
}

impl Debug for Builtin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Builtin<{}>({}..={})", self.name, self.min_args, self.max_args)
    }
}

impl Builtin {
    const fn new(name: &'static str, min_args: usize, max_args: usize, function: BuiltinFn) -> Self {
        Self {
            name,
            min_args,
            max_args,
            function,
        }
    }

    pub fn call(&self, interpreter: &mut Interpreter, args: &[Value]) -> Result<Value, ExecutionErrorKind> {
        if args.len() < self.min_args || args.len() > self.max_args {
            let expected = if self.min_args == self.max_args {
                self.min_args.to_string()
            } else {
                format!("{}-{}", self.min_args, self.max_args)
            };
            return Err(ExecutionErrorKind::ArgumentCount {
                name: self.name.to_string(),
                expected,
                found: args.len(),
            });
        }
        (self.function)(interpreter, args)
    }
}

const BUILTINS: &[Builtin] = &[
    Builtin::new("metin", 1, 1, metin),
    Builtin::new("sayı", 1, 1, sayi),
    Builtin::new("sayi", 1, 1, sayi),
    Builtin::new("karekök", 1, 1, karekok),
    Builtin::new("karekok", 1, 1, karekok),
    Builtin::new("rastgele", 0, 2, rastgele),
    Builtin::new("zaman", 0, 0, zaman),
    Builtin::new("bekle", 1, 1, bekle),
    Builtin::new("girdi", 0, 1, girdi),
    Builtin::new("tip", 1, 1, tip),
    Builtin::new("uzunluk", 1, 1, uzunluk),
    // Canvas
    Builtin::new("daire", 4, 4, daire),
    Builtin::new("daire_çiz", 4, 4, daire),
    Builtin::new("dikdörtgen", 5, 5, dikdortgen),
    Builtin::new("dikdörtgen_çiz", 5, 5, dikdortgen),
    Builtin::new("çizgi", 6, 6, cizgi),
    Builtin::new("çizgi_çiz", 6, 6, cizgi),
    Builtin::new("temizle", 0, 0, temizle),
    Builtin::new("tuval_temizle", 0, 0, temizle),
];

pub fn registry() -> FxHashMap<&'static str, Builtin> {
    BUILTINS
        .iter()
        .map(|builtin| (builtin.name, *builtin))
        .collect()
}

fn invalid_argument(name: &str, message: &str) -> ExecutionErrorKind {
    ExecutionErrorKind::InvalidArgument {
        name: name.to_string(),
        message: message.to_string(),
    }
}

fn metin(_: &mut Interpreter, args: &[Value]) -> Result<Value, ExecutionErrorKind> {
    Ok(Value::String(args[0].to_string()))
}

fn sayi(_: &mut Interpreter, args: &[Value]) -> Result<Value, ExecutionErrorKind> {
    Ok(match &args[0] {
        Value::Integer(n) => Value::Integer(*n),
        Value::Float(n) => Value::Float(*n),
        Value::Boolean(b) => Value::Integer(i64::from(*b)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .map(Value::Integer)
                .or_else(|_| s.parse::<f64>().map(Value::Float))
                .unwrap_or(Value::Integer(0))
        }
        _ => Value::Integer(0),
    })
}

fn karekok(_: &mut Interpreter, args: &[Value]) -> Result<Value, ExecutionErrorKind> {
    match args[0].as_f64() {
        Some(n) if n >= 0.0 => Ok(Value::Float(n.sqrt())),
        Some(_) => Err(invalid_argument("karekök", "negatif sayının karekökü alınamaz")),
        None => Err(invalid_argument("karekök", "sayı bekleniyor")),
    }
}

fn rastgele(_: &mut Interpreter, args: &[Value]) -> Result<Value, ExecutionErrorKind> {
    let (low, high) = match args {
        [] => (0, i64::from(i32::MAX)),
        [Value::Integer(high)] => (0, *high),
        [Value::Integer(low), Value::Integer(high)] => (*low, *high),
        _ => return Err(invalid_argument("rastgele", "tamsayı sınırlar bekleniyor")),
    };
    if low > high {
        return Err(invalid_argument("rastgele", "alt sınır üst sınırdan büyük"));
    }
    Ok(Value::Integer(rand::thread_rng().gen_range(low..=high)))
}

fn zaman(_: &mut Interpreter, _: &[Value]) -> Result<Value, ExecutionErrorKind> {
    let seconds = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or(0);
    Ok(Value::Integer(seconds))
}

fn bekle(_: &mut Interpreter, args: &[Value]) -> Result<Value, ExecutionErrorKind> {
    match args[0] {
        Value::Integer(ms) if ms >= 0 => {
            std::thread::sleep(std::time::Duration::from_millis(ms as u64));
            Ok(Value::Null)
        }
        _ => Err(invalid_argument("bekle", "milisaniye bekleniyor")),
    }
}

fn girdi(interpreter: &mut Interpreter, args: &[Value]) -> Result<Value, ExecutionErrorKind> {
    if let Some(prompt) = args.first() {
        interpreter.prompt(&prompt.to_string())?;
    }
    Ok(Value::String(interpreter.read_input()?))
}

fn tip(_: &mut Interpreter, args: &[Value]) -> Result<Value, ExecutionErrorKind> {
    Ok(Value::String(args[0].type_name().to_string()))
}

fn uzunluk(_: &mut Interpreter, args: &[Value]) -> Result<Value, ExecutionErrorKind> {
    match &args[0] {
        Value::String(s) => Ok(Value::Integer(s.chars().count() as i64)),
        _ => Ok(Value::Integer(0)),
    }
}

/// Canvas arguments travel space separated, so each must be a single non-empty word.
fn canvas(interpreter: &mut Interpreter, opcode: &str, args: &[Value]) -> Result<Value, ExecutionErrorKind> {
    let args: Vec<String> = args.iter().map(Value::to_string).collect();
    if args.iter().any(|arg| arg.is_empty() || arg.contains(char::is_whitespace)) {
        return Err(invalid_argument(opcode, "argümanlar boşluk içeremez"));
    }
    let frame = Frame::Canvas {
        opcode: opcode.to_string(),
        args,
    };
    interpreter.emit(&frame.encode())?;
    Ok(Value::Null)
}

fn daire(interpreter: &mut Interpreter, args: &[Value]) -> Result<Value, ExecutionErrorKind> {
    canvas(interpreter, "daire", args)
}

fn dikdortgen(interpreter: &mut Interpreter, args: &[Value]) -> Result<Value, ExecutionErrorKind> {
    canvas(interpreter, "dikdortgen", args)
}

fn cizgi(interpreter: &mut Interpreter, args: &[Value]) -> Result<Value, ExecutionErrorKind> {
    canvas(interpreter, "cizgi", args)
}

fn temizle(interpreter: &mut Interpreter, args: &[Value]) -> Result<Value, ExecutionErrorKind> {
    canvas(interpreter, "temizle", args)
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, io::Cursor, rc::Rc};

    use super::*;
    use crate::interpreter::RunOptions;

    fn call(name: &str, args: &[Value]) -> (Result<Value, ExecutionErrorKind>, String) {
        let output = Rc::new(RefCell::new(Vec::new()));
        let mut interpreter = Interpreter::new(output.clone());
        let result = registry()[name].call(&mut interpreter, args);
        let output = String::from_utf8(output.take()).unwrap();
        (result, output)
    }

    fn value(name: &str, args: &[Value]) -> Value {
        call(name, args).0.expect("builtin should succeed")
    }

    #[test]
    fn arity_is_checked() {
        let (result, _) = call("karekök", &[]);
        assert!(matches!(
            result,
            Err(ExecutionErrorKind::ArgumentCount { ref expected, found: 0, .. }) if expected == "1"
        ));

        let args = [Value::Integer(1), Value::Integer(2), Value::Integer(3)];
        let (result, _) = call("rastgele", &args);
        assert!(matches!(
            result,
            Err(ExecutionErrorKind::ArgumentCount { ref expected, found: 3, .. }) if expected == "0-2"
        ));
    }

    #[test]
    fn square_root() {
        assert_eq!(value("karekök", &[Value::Integer(16)]), Value::Float(4.0));
        assert!(matches!(
            call("karekok", &[Value::Integer(-4)]).0,
            Err(ExecutionErrorKind::InvalidArgument { .. })
        ));
        assert!(matches!(
            call("karekök", &[Value::String("dört".to_string())]).0,
            Err(ExecutionErrorKind::InvalidArgument { .. })
        ));
    }

    #[test]
    fn random_stays_within_bounds() {
        assert_eq!(value("rastgele", &[Value::Integer(3), Value::Integer(3)]), Value::Integer(3));
        for _ in 0..100 {
            let Value::Integer(n) = value("rastgele", &[Value::Integer(1), Value::Integer(6)]) else {
                panic!("expected an integer");
            };
            assert!((1..=6).contains(&n));
        }
        assert!(matches!(
            call("rastgele", &[Value::Integer(5), Value::Integer(1)]).0,
            Err(ExecutionErrorKind::InvalidArgument { .. })
        ));
        assert!(matches!(
            call("rastgele", &[Value::Float(2.5)]).0,
            Err(ExecutionErrorKind::InvalidArgument { .. })
        ));
    }

    #[test]
    fn number_conversion() {
        assert_eq!(value("sayı", &[Value::String(" 42 ".to_string())]), Value::Integer(42));
        assert_eq!(value("sayi", &[Value::String("2.5".to_string())]), Value::Float(2.5));
        assert_eq!(value("sayı", &[Value::String("kırk".to_string())]), Value::Integer(0));
        assert_eq!(value("sayı", &[Value::Boolean(true)]), Value::Integer(1));
    }

    #[test]
    fn type_names() {
        assert_eq!(value("tip", &[Value::Null]), Value::String("yok".to_string()));
        let builtin = Value::Builtin(registry()["metin"]);
        assert_eq!(value("tip", &[builtin]), Value::String("fonksiyon".to_string()));
        assert_eq!(value("tip", &[Value::Boolean(false)]), Value::String("mantıksal".to_string()));
    }

    #[test]
    fn length_counts_characters() {
        assert_eq!(value("uzunluk", &[Value::String("ağaç".to_string())]), Value::Integer(4));
        assert_eq!(value("uzunluk", &[Value::Integer(12345)]), Value::Integer(0));
    }

    #[test]
    fn input_prompts_and_reads_a_line() {
        let output = Rc::new(RefCell::new(Vec::new()));
        let input = Rc::new(RefCell::new(Cursor::new(b"Ada\r\nfazla\n".to_vec())));
        let mut interpreter = Interpreter::with_io(output.clone(), input, RunOptions::default());
        let name = registry()["girdi"]
            .call(&mut interpreter, &[Value::String("Ad: ".to_string())])
            .unwrap();
        assert_eq!(name, Value::String("Ada".to_string()));
        assert_eq!(String::from_utf8(output.take()).unwrap(), "Ad: ");
    }

    #[test]
    fn canvas_emits_frames() {
        let args = [
            Value::Integer(1),
            Value::Integer(2),
            Value::Float(3.5),
            Value::String("mavi".to_string()),
        ];
        let (result, output) = call("daire_çiz", &args);
        assert_eq!(result.unwrap(), Value::Null);
        assert_eq!(output, "__CANVAS__:daire 1 2 3.5 mavi\n");
    }

    #[test]
    fn canvas_rejects_arguments_with_spaces() {
        let args = [
            Value::Integer(1),
            Value::Integer(2),
            Value::Integer(3),
            Value::String("açık mavi".to_string()),
        ];
        let (result, output) = call("daire", &args);
        assert!(matches!(result, Err(ExecutionErrorKind::InvalidArgument { .. })));
        assert_eq!(output, "");

        let args = [
            Value::Integer(1),
            Value::Integer(2),
            Value::Integer(3),
            Value::String(String::new()),
        ];
        assert!(call("daire", &args).0.is_err());
    }
}
