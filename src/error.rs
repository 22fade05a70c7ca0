use std::fmt;

/// Position of a lexeme within the source text.
///
/// Lines and columns are zero-based; `length` counts characters. Two
/// locations can be merged into a span covering both, which is how multi
/// token constructs report errors.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Location {
    pub line: usize,
    pub column: usize,
    pub length: usize,
    pub file: Option<String>,
}

impl Location {
    pub fn new(line: usize, column: usize, length: usize) -> Self {
        Location {
            line,
            column,
            length,
            file: None,
        }
    }

    pub fn with_file(mut self, file: Option<&str>) -> Self {
        self.file = file.map(|f| f.to_string());
        self
    }

    /// Span covering this location and `rhs` (lengths add up).
    pub fn merge(&self, rhs: &Location) -> Location {
        Location {
            line: self.line,
            column: self.column,
            length: self.length + rhs.length,
            file: self.file.clone(),
        }
    }

    /// Renders the located source line with a `~` underline beneath the span.
    ///
    /// ```text
    /// 2:8:    x = y;
    ///             ~
    /// ```
    pub fn render(&self, source: &str) -> String {
        let line_text = source.lines().nth(self.line).unwrap_or("");
        let prefix = format!("{}:{}:", self.line, self.column);
        let mut underline = " ".repeat(prefix.len() + self.column);
        underline.push_str(&"~".repeat(self.length.max(1)));
        format!("{}{}\n{}", prefix, line_text, underline)
    }
}

/// Category of a user-visible failure (see the `Error` carrier).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed lexeme: unknown escape, unterminated literal.
    Lex,
    /// Malformed structure: missing operand, unmatched bracket.
    Parse,
    /// A name that should resolve to a type, variable, function, or member
    /// does not.
    Resolution,
    /// Operator not available for a type, conversion failure, void where a
    /// value is required.
    Type,
    /// Failure during execution: index out of range, no viable constructor,
    /// return-type mismatch.
    Runtime,
}

/// The single error carrier used by every phase.
///
/// Carries one line of message and, when the failure can be pinned to the
/// source, the location of the offending lexeme or operand. Internal
/// invariant violations do not produce an `Error`; they panic with the
/// failing predicate.
#[derive(Debug, Clone)]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
    pub location: Option<Location>,
}

impl Error {
    pub fn lex(message: impl Into<String>, location: Location) -> Self {
        Error {
            kind: ErrorKind::Lex,
            message: message.into(),
            location: Some(location),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Error {
            kind: ErrorKind::Parse,
            message: message.into(),
            location: None,
        }
    }

    pub fn resolution(message: impl Into<String>) -> Self {
        Error {
            kind: ErrorKind::Resolution,
            message: message.into(),
            location: None,
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Error {
            kind: ErrorKind::Type,
            message: message.into(),
            location: None,
        }
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Error {
            kind: ErrorKind::Runtime,
            message: message.into(),
            location: None,
        }
    }

    /// Attaches a location if the error does not already carry one.
    pub fn at(mut self, location: &Location) -> Self {
        if self.location.is_none() {
            self.location = Some(location.clone());
        }
        self
    }

    /// One line of message plus the located span rendered against `source`.
    pub fn render(&self, source: &str) -> String {
        match &self.location {
            Some(location) => format!("{}:\n{}", self.message, location.render(source)),
            None => self.message.clone(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

#[test]
fn test_render_underline() {
    let source = "int x;\nx = y;";
    let location = Location::new(1, 4, 1);
    let rendered = location.render(source);
    assert_eq!(rendered, "1:4:x = y;\n        ~");
}

#[test]
fn test_merge_spans() {
    let a = Location::new(0, 2, 3);
    let b = Location::new(0, 5, 2);
    let merged = a.merge(&b);
    assert_eq!(merged.length, 5);
    assert_eq!(merged.column, 2);
}
