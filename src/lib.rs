pub mod ast;
pub mod debugger;
pub mod diagnostics;
pub mod interpreter;
pub mod parser;
pub mod protocol;
pub mod runner;
pub mod span;
pub mod tokenizer;
pub mod tree;
