pub mod ast;
pub mod cli;
pub mod error;
pub mod function;
pub mod lexer;
pub mod object;
pub mod parser;
pub mod program;
pub mod scope;

pub use ast::{Expression, Statement, Token, TokenKind};
pub use error::{Error, ErrorKind, Location, Result};
pub use function::{Function, IntoArgs};
pub use lexer::Lexer;
pub use object::{ArithKind, CompareKind, Object, OpTable, ScriptType};
pub use parser::Parser;
pub use program::{Program, Proxy, TypeHandle};
pub use scope::{Flow, Scope};
