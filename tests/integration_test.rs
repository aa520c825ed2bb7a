use std::{cell::RefCell, path::PathBuf, rc::Rc};

use gumus::{
    interpreter::{run, run_with, Interpreter, RunOptions, EXIT_RUNTIME, EXIT_SYNTAX},
    parser::parse,
    tokenizer::tokenize,
    tree::program_to_tree,
};

fn test_valid_program(source: &str, expected_output: &str) {
    let tokens = tokenize(source).expect("Tokenize should work on valid program");
    let program = parse(&tokens)
        .into_result()
        .expect("Parse should work on valid program");
    let output = Rc::new(RefCell::new(Vec::new()));
    let mut interpreter = Interpreter::new(output.clone());
    interpreter
        .interpret(&program)
        .expect("Interpret should work on valid program");
    let output = String::from_utf8(output.take()).expect("Output should be valid UTF-8");
    assert_eq!(output, expected_output);
}

fn run_with_options(source: &str, options: RunOptions) -> (String, i32) {
    let output = Rc::new(RefCell::new(Vec::new()));
    let code = run_with(
        source,
        options,
        output.clone(),
        Rc::new(RefCell::new(std::io::empty())),
    );
    let output = String::from_utf8(output.take()).expect("Output should be valid UTF-8");
    (output, code)
}

/// Runs on a thread with room for deep recursion.
fn run_deep(source: &'static str) -> gumus::interpreter::RunOutput {
    std::thread::Builder::new()
        .stack_size(256 * 1024 * 1024)
        .spawn(move || run(source))
        .expect("thread should start")
        .join()
        .expect("interpreter should not panic")
}

#[test]
fn test_hello_world() {
    test_valid_program("yazdır(\"Merhaba Dünya\")", "Merhaba Dünya\n");
}

#[test]
fn test_variables_and_arithmetic() {
    let source = r#"
    değişken x = 10
    değişken y = 20
    yazdır x + y
    "#;
    test_valid_program(source, "30\n");
}

#[test]
fn test_fib() {
    let source = r#"
    fonksiyon fib(n) {
        eğer n <= 1 {
            dön n
        }
        dön fib(n - 1) + fib(n - 2)
    }

    değişken i = 0
    döngü i < 10 {
        yazdır fib(i)
        i = i + 1
    }
    "#;
    test_valid_program(source, "0\n1\n1\n2\n3\n5\n8\n13\n21\n34\n");
}

#[test]
fn test_function_with_parameters() {
    let source = r#"
    fonksiyon topla(a, b) { dön a + b }
    yazdır topla(3, 5)
    "#;
    test_valid_program(source, "8\n");
}

#[test]
fn test_functions_are_hoisted() {
    let source = r#"
    yazdır kare(4)
    fonksiyon kare(n) {
        dön n * n
    }
    "#;
    test_valid_program(source, "16\n");
}

#[test]
fn test_callee_cannot_change_caller_variables() {
    let source = r#"
    değişken x = 1
    fonksiyon değiştir() {
        x = 99
        yazdır x
    }
    değiştir()
    yazdır x
    "#;
    test_valid_program(source, "99\n1\n");
}

#[test]
fn test_callee_reads_caller_scope() {
    let source = r#"
    fonksiyon göster() {
        yazdır yerel
    }
    fonksiyon çağıran() {
        değişken yerel = "çağıranın"
        göster()
    }
    çağıran()
    "#;
    test_valid_program(source, "çağıranın\n");
}

#[test]
fn test_blocks_share_the_enclosing_scope() {
    let source = r#"
    eğer doğru {
        değişken içeride = 5
    }
    yazdır içeride
    "#;
    test_valid_program(source, "5\n");
}

#[test]
fn test_break_and_continue() {
    let source = r#"
    değişken i = 0
    döngü doğru {
        i = i + 1
        eğer i % 2 == 0 {
            devam et
        }
        eğer i > 7 {
            kır
        }
        yazdır i
    }
    "#;
    test_valid_program(source, "1\n3\n5\n7\n");
}

#[test]
fn test_else_branch_and_logic() {
    let source = r#"
    değişken a = 3
    eğer a > 5 ve doğru {
        yazdır "büyük"
    } değilse {
        yazdır "küçük"
    }
    yazdır değil yanlış
    yazdır yok veya 0
    "#;
    test_valid_program(source, "küçük\ndoğru\nyanlış\n");
}

#[test]
fn test_template_strings() {
    let source = r#"
    değişken ad = "Ayşe"
    değişken yaş = 30
    yazdır $"{ad} {yaş} yaşında"
    "#;
    test_valid_program(source, "Ayşe 30 yaşında\n");
}

#[test]
fn test_try_catch_binds_message() {
    let source = r#"
    dene {
        yazdır 1 / 0
    } yakala (hata) {
        yazdır "yakalandı: " + hata
    }
    yazdır "devam"
    "#;
    test_valid_program(source, "yakalandı: Sıfıra bölme\ndevam\n");
}

#[test]
fn test_try_catch_unwinds_calls() {
    let source = r#"
    fonksiyon patlat(n) {
        dön n / 0
    }
    değişken x = "dış"
    dene {
        patlat(1)
    } yakala {
        yazdır x
    }
    yazdır patlat
    "#;
    test_valid_program(source, "dış\n<fonksiyon patlat>\n");
}

#[test]
fn test_builtins() {
    let source = r#"
    yazdır tip(1)
    yazdır tip(2.5)
    yazdır tip("a")
    yazdır uzunluk("çiçek")
    yazdır sayı("42") + 1
    yazdır karekök(16)
    yazdır metin(7) + "!"
    "#;
    test_valid_program(source, "tamsayı\nondalık\nmetin\n5\n43\n4.0\n7!\n");
}

#[test]
fn test_canvas_builtins_emit_frames() {
    test_valid_program(
        "daire(10, 20, 5, \"kırmızı\")\ntemizle()",
        "__CANVAS__:daire 10 20 5 kırmızı\n__CANVAS__:temizle\n",
    );
}

#[test]
fn test_top_level_return_ends_program() {
    test_valid_program("yazdır 1\ndön\nyazdır 2", "1\n");
}

#[test]
fn test_exit_keyword_ends_token_stream() {
    test_valid_program("yazdır 1\nçık\nyazdır 2", "1\n");
}

#[test]
fn test_parse_errors_are_all_reported() {
    let output = run("değişken a = )\nyazdır 1\ndeğişken = 2");
    assert_eq!(output.exit_code, EXIT_SYNTAX);
    let lines: Vec<_> = output.stdout.lines().collect();
    assert_eq!(lines.len(), 2, "{}", output.stdout);
    assert!(lines[0].starts_with("Parse Error: "));
    assert!(lines[0].ends_with("(Satir: 1)"));
    assert!(lines[1].ends_with("(Satir: 3)"));
}

#[test]
fn test_unterminated_string_is_a_syntax_error() {
    let output = run("yazdır 1\nyazdır \"açık");
    assert_eq!(output.exit_code, EXIT_SYNTAX);
    assert_eq!(output.stdout, "Syntax Error: Unterminated string at line 2\n");
}

#[test]
fn test_runtime_error_keeps_earlier_output() {
    let output = run("yazdır \"önce\"\nyazdır bilinmeyen");
    assert_eq!(output.exit_code, EXIT_RUNTIME);
    assert_eq!(
        output.stdout,
        "önce\nRuntime Error: Tanımsız değişken: 'bilinmeyen' (Satir: 2)\n"
    );
}

#[test]
fn test_wrong_argument_count() {
    let output = run("fonksiyon f(a) {\n dön a\n}\nyazdır f(1, 2)");
    assert_eq!(output.exit_code, EXIT_RUNTIME);
    assert!(output.stdout.contains("'f' 1 argüman bekliyor, 2 verildi"), "{}", output.stdout);
}

#[test]
fn test_infinite_loop_is_a_logic_error() {
    let output = run("değişken i = 0\ndöngü doğru {\n    i = i + 1\n}");
    assert_eq!(output.exit_code, EXIT_RUNTIME);
    assert!(
        output
            .stdout
            .starts_with("Logic Error: Infinite loop detected at line 2"),
        "{}",
        output.stdout
    );
}

#[test]
fn test_loop_limit_is_configurable() {
    let source = "değişken i = 0\ndöngü i < 5 {\n    i = i + 1\n}\nyazdır i";
    let (output, code) = run_with_options(
        source,
        RunOptions {
            loop_limit: 5,
            ..Default::default()
        },
    );
    assert_eq!((output.as_str(), code), ("5\n", 0));

    let (output, code) = run_with_options(
        source,
        RunOptions {
            loop_limit: 4,
            ..Default::default()
        },
    );
    assert_eq!(code, EXIT_RUNTIME);
    assert!(output.starts_with("Logic Error: Infinite loop detected at line 2"));
}

#[test]
fn test_deep_recursion_is_a_stack_overflow() {
    let output = run_deep("fonksiyon sonsuz(n) {\n    dön sonsuz(n + 1)\n}\nsonsuz(0)");
    assert_eq!(output.exit_code, EXIT_RUNTIME);
    assert!(
        output.stdout.starts_with("Logic Error: Stack overflow at line 2"),
        "{}",
        output.stdout
    );
}

#[test]
fn test_recursion_within_depth_limit() {
    let output = run_deep(
        "fonksiyon topla(n) {\n    eğer n == 0 {\n        dön 0\n    }\n    dön n + topla(n - 1)\n}\nyazdır topla(150)",
    );
    assert_eq!(output.stdout, "11325\n");
    assert_eq!(output.exit_code, 0);
}

#[test]
fn test_include_loads_module_once() {
    let dir = std::env::temp_dir().join(format!("gumus-include-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join("matematik.tr"),
        "\u{feff}yazdır \"yüklendi\"\nfonksiyon iki_kat(n) {\n    dön n * 2\n}\n",
    )
    .unwrap();

    let (output, code) = run_with_options(
        "dahil et matematik\ndahil et matematik\nyazdır iki_kat(21)",
        RunOptions {
            script_dir: Some(dir.clone()),
            ..Default::default()
        },
    );
    std::fs::remove_dir_all(&dir).unwrap();
    assert_eq!(code, 0, "{}", output);
    assert_eq!(output, "yüklendi\n42\n");
}

fn module_dir(name: &str, files: &[(&str, &str)]) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("gumus-{}-{}", name, std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    for (file, source) in files {
        std::fs::write(dir.join(file), source).unwrap();
    }
    dir
}

#[test]
fn test_failed_include_can_be_retried() {
    let dir = module_dir("retry", &[("bozuk.tr", "yazdır \"yükleniyor\"\nyazdır 1 / 0\n")]);
    let source = r#"
    dene { dahil et bozuk } yakala (hata) { yazdır hata }
    dene { dahil et bozuk } yakala (hata) { yazdır hata }
    "#;
    let (output, code) = run_with_options(
        source,
        RunOptions {
            script_dir: Some(dir.clone()),
            ..Default::default()
        },
    );
    std::fs::remove_dir_all(&dir).unwrap();
    assert_eq!(code, 0, "{}", output);
    assert_eq!(output, "yükleniyor\nSıfıra bölme\nyükleniyor\nSıfıra bölme\n");
}

#[test]
fn test_self_include_loads_once() {
    let dir = module_dir("self", &[("kendisi.tr", "dahil et kendisi\nyazdır \"bir kez\"\n")]);
    let (output, code) = run_with_options(
        "dahil et kendisi",
        RunOptions {
            script_dir: Some(dir.clone()),
            ..Default::default()
        },
    );
    std::fs::remove_dir_all(&dir).unwrap();
    assert_eq!((output.as_str(), code), ("bir kez\n", 0));
}

#[test]
fn test_missing_module_is_reported() {
    let (output, code) = run_with_options(
        "dahil et yok_boyle_bir_modul",
        RunOptions {
            script_dir: Some(PathBuf::from("/nonexistent")),
            ..Default::default()
        },
    );
    assert_eq!(code, EXIT_RUNTIME);
    assert!(output.contains("Modül bulunamadı: 'yok_boyle_bir_modul'"));
}

#[test]
fn test_tree_is_deterministic() {
    let source = "fonksiyon f(a, b) {\n    dön a + b\n}\nyazdır f(1, 2.5)";
    let tree = |source: &str| {
        let tokens = tokenize(source).unwrap();
        let program = parse(&tokens).into_result().unwrap();
        serde_json::to_string(&program_to_tree(&program)).unwrap()
    };
    assert_eq!(tree(source), tree(source));
    assert!(tree(source).contains("\"params\":[\"a\",\"b\"]"));
}

#[test]
fn test_token_lines_are_monotonic() {
    let tokens = tokenize("değişken a = 1\n\n// yorum\nyazdır a\n").unwrap();
    assert!(tokens.windows(2).all(|pair| pair[0].line() <= pair[1].line()));
}
