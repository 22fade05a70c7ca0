//! Support for the `cassia` command-line driver.

use std::io::{self, Read};

use crate::error::Error;
use crate::program::Program;

#[derive(Debug)]
pub enum CliError {
    Io(io::Error),
    /// Nothing on stdin and no file argument.
    NoInput,
    /// A compile or run failure, kept with the source for rendering.
    Script {
        error: Error,
        source: String,
    },
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Io(e) => write!(f, "{}", e),
            CliError::NoInput => {
                write!(f, "no input: pass a script file or pipe one on stdin")
            }
            CliError::Script { error, source } => write!(f, "{}", error.render(source)),
        }
    }
}

impl std::error::Error for CliError {}

/// Reads the script from a file argument, or from stdin when piped.
pub fn read_source(file: Option<&str>) -> Result<String, CliError> {
    match file {
        Some(path) => std::fs::read_to_string(path).map_err(CliError::Io),
        None if !atty::is(atty::Stream::Stdin) => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .map_err(CliError::Io)?;
            Ok(buffer)
        }
        None => Err(CliError::NoInput),
    }
}

/// A program with the driver's standard bindings: `print` for numeric
/// values and `print_string` for strings.
fn prepared_program() -> Program {
    let mut program = Program::new();
    program
        .bind("print", |value: f32| println!("{}", value))
        .expect("fresh program has no bindings");
    program
        .bind("print_string", |text: String| println!("{}", text))
        .expect("fresh program has no bindings");
    program
}

pub fn run_source(source: &str, name: Option<&str>) -> Result<(), CliError> {
    let mut program = prepared_program();
    let compiled = match name {
        Some(name) => program.compile_named(source, name),
        None => program.compile(source),
    };
    compiled.map_err(|error| CliError::Script {
        error,
        source: source.to_string(),
    })?;
    program.run().map_err(|error| CliError::Script {
        error,
        source: source.to_string(),
    })
}

pub fn check_source(source: &str, name: Option<&str>) -> Result<(), CliError> {
    let mut program = prepared_program();
    let compiled = match name {
        Some(name) => program.compile_named(source, name),
        None => program.compile(source),
    };
    compiled.map_err(|error| CliError::Script {
        error,
        source: source.to_string(),
    })
}
