pub mod ast;
pub mod codegen;
pub mod diagnostics;
pub mod driver;
pub mod lexer;
pub mod parser;

use thiserror::Error;

use crate::{codegen::CodegenError, lexer::LexerError, parser::ParserError};

#[derive(Error, Debug)]
pub enum CompileError {
    #[error("{0}")]
    Lexer(#[from] LexerError),
    #[error("{0}")]
    Parser(#[from] ParserError),
    #[error("{0}")]
    Codegen(#[from] CodegenError),
}

impl CompileError {
    /// Byte offset to anchor a caret diagnostic at, where one exists.
    pub fn offset(&self) -> Option<usize> {
        match self {
            CompileError::Lexer(err) => Some(err.offset()),
            CompileError::Parser(err) => Some(err.offset()),
            CompileError::Codegen(_) => None,
        }
    }
}

/// Compile a source string into x86-64 assembly text.
pub fn compile(source: &str) -> Result<String, CompileError> {
    let tokens = lexer::Lexer::new(source).tokenize()?;
    let program = parser::Parser::new(tokens).parse_program()?;
    Ok(codegen::generate_program(&program)?)
}
