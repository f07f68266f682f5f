//! Execution core for a teaching subset of C++: a tree-walking evaluator and
//! a single-step driver over the same semantics.

pub mod ast;
pub mod env;
pub mod error;
pub mod interpreter;
pub mod io;
pub mod lexer;
pub mod parser;
pub mod stepper;
pub mod translate;
pub mod types;
pub mod value;

use anyhow::Result;

use crate::ast::Program;
use crate::error::EvalError;
use crate::interpreter::Interpreter;
use crate::io::{Input, SharedBuffer};
use crate::translate::Translator;

/// Lex and parse a whole translation unit.
pub fn parse_source(src: &str) -> Result<Program> {
    let tokens = lexer::lex(src)?;
    parser::parse(tokens)
}

/// Run `program` to completion with `input` as standard input. Returns the
/// output produced (also when the run fails) and the outcome.
pub fn run(program: &Program, input: &str, tr: Translator) -> (String, Result<(), EvalError>) {
    let out = SharedBuffer::new();
    let mut interp = Interpreter::new(Input::from_string(input), Box::new(out.clone()), tr);
    let result = interp.run(program);
    (out.take(), result)
}
