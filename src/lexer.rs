use crate::ast::{Token, TokenKind};
use crate::error::{Error, Location, Result};

fn is_space(ch: char) -> bool {
    ch == ' ' || ch == '\t' || ch == '\x0c'
}

fn is_newline(ch: char) -> bool {
    ch == '\n' || ch == '\r'
}

fn is_identifier_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_'
}

fn is_identifier_part(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

fn escape_char(ch: char) -> Option<char> {
    match ch {
        'n' => Some('\n'),
        't' => Some('\t'),
        'r' => Some('\r'),
        'b' => Some('\u{8}'),
        'v' => Some('\u{b}'),
        'f' => Some('\u{c}'),
        'a' => Some('\u{7}'),
        _ => None,
    }
}

pub struct Lexer {
    input: Vec<char>,
    position: usize,
    line: usize,
    column: usize,
    file: Option<String>,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Lexer {
            input: input.chars().collect(),
            position: 0,
            line: 0,
            column: 0,
            file: None,
        }
    }

    pub fn with_file(mut self, file: Option<&str>) -> Self {
        self.file = file.map(|f| f.to_string());
        self
    }

    /// Lexes the whole input into a token sequence terminated by one Eof
    /// token. Any malformed lexeme aborts the scan; no partial stream is
    /// returned.
    pub fn tokenize(mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token.is(TokenKind::EOF);
            tokens.push(token);
            if done {
                break;
            }
        }
        Ok(tokens)
    }

    fn current_char(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn peek_char(&self, offset: usize) -> Option<char> {
        self.input.get(self.position + offset).copied()
    }

    fn advance(&mut self) {
        if let Some(ch) = self.current_char() {
            self.position += 1;
            if is_newline(ch) {
                self.line += 1;
                self.column = 0;
            } else {
                self.column += 1;
            }
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            while let Some(ch) = self.current_char() {
                if is_space(ch) || is_newline(ch) {
                    self.advance();
                } else {
                    break;
                }
            }
            // line comment: consume to the newline, emit nothing
            if self.current_char() == Some('/') && self.peek_char(1) == Some('/') {
                while let Some(ch) = self.current_char() {
                    if is_newline(ch) {
                        break;
                    }
                    self.advance();
                }
            } else {
                break;
            }
        }
    }

    fn here(&self, length: usize) -> Location {
        Location::new(self.line, self.column, length).with_file(self.file.as_deref())
    }

    pub fn next_token(&mut self) -> Result<Token> {
        self.skip_whitespace_and_comments();

        let start_line = self.line;
        let start_column = self.column;
        let start_position = self.position;

        let ch = match self.current_char() {
            Some(ch) => ch,
            None => return Ok(Token::new(TokenKind::EOF, self.here(0))),
        };

        let kind = match ch {
            '+' => {
                self.advance();
                match self.current_char() {
                    Some('+') => {
                        self.advance();
                        TokenKind::INCREMENT
                    }
                    Some('=') => {
                        self.advance();
                        TokenKind::PLUS_EQUAL
                    }
                    _ => TokenKind::PLUS,
                }
            }
            '-' => {
                self.advance();
                match self.current_char() {
                    Some('-') => {
                        self.advance();
                        TokenKind::DECREMENT
                    }
                    Some('=') => {
                        self.advance();
                        TokenKind::MINUS_EQUAL
                    }
                    _ => TokenKind::MINUS,
                }
            }
            '*' => {
                self.advance();
                if self.current_char() == Some('=') {
                    self.advance();
                    TokenKind::STAR_EQUAL
                } else {
                    TokenKind::STAR
                }
            }
            '/' => {
                self.advance();
                if self.current_char() == Some('=') {
                    self.advance();
                    TokenKind::SLASH_EQUAL
                } else {
                    TokenKind::SLASH
                }
            }
            '<' => {
                self.advance();
                if self.current_char() == Some('=') {
                    self.advance();
                    TokenKind::LESS_EQUAL
                } else {
                    TokenKind::LESS
                }
            }
            '>' => {
                self.advance();
                if self.current_char() == Some('=') {
                    self.advance();
                    TokenKind::GREATER_EQUAL
                } else {
                    TokenKind::GREATER
                }
            }
            '=' => {
                self.advance();
                if self.current_char() == Some('=') {
                    self.advance();
                    TokenKind::EQUAL
                } else {
                    TokenKind::ASSIGN
                }
            }
            '!' => {
                self.advance();
                if self.current_char() == Some('=') {
                    self.advance();
                    TokenKind::NOT_EQUAL
                } else {
                    TokenKind::EXCLAMATION
                }
            }
            '(' => {
                self.advance();
                TokenKind::LEFT_PAREN
            }
            ')' => {
                self.advance();
                TokenKind::RIGHT_PAREN
            }
            '[' => {
                self.advance();
                TokenKind::LEFT_BRACKET
            }
            ']' => {
                self.advance();
                TokenKind::RIGHT_BRACKET
            }
            '{' => {
                self.advance();
                TokenKind::LEFT_BRACE
            }
            '}' => {
                self.advance();
                TokenKind::RIGHT_BRACE
            }
            ';' => {
                self.advance();
                TokenKind::SEMICOLON
            }
            '.' => {
                self.advance();
                TokenKind::DOT
            }
            ',' => {
                self.advance();
                TokenKind::COMMA
            }
            '"' => return self.read_string(start_line, start_column, start_position),
            '\'' => return self.read_char(start_line, start_column, start_position),
            ch if ch.is_ascii_digit() => {
                return self.read_number(start_line, start_column, start_position)
            }
            ch if is_identifier_start(ch) => {
                return Ok(self.read_identifier(start_line, start_column, start_position))
            }
            ch => {
                return Err(Error::lex(
                    format!("unexpected character '{}'", ch),
                    self.here(1),
                ))
            }
        };

        let length = self.position - start_position;
        let location =
            Location::new(start_line, start_column, length).with_file(self.file.as_deref());
        Ok(Token::new(kind, location))
    }

    fn read_number(&mut self, line: usize, column: usize, start: usize) -> Result<Token> {
        let mut number = String::new();
        while let Some(ch) = self.current_char() {
            if ch.is_ascii_digit() {
                number.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        if self.current_char() == Some('.') {
            number.push('.');
            self.advance();
            while let Some(ch) = self.current_char() {
                if ch.is_ascii_digit() {
                    number.push(ch);
                    self.advance();
                } else {
                    break;
                }
            }
        }
        // trailing precision suffix is consumed but changes nothing
        if self.current_char() == Some('f') {
            self.advance();
        }

        let length = self.position - start;
        let location = Location::new(line, column, length).with_file(self.file.as_deref());
        let value = number.parse::<f32>().map_err(|_| {
            Error::lex(format!("malformed number \"{}\"", number), location.clone())
        })?;
        let mut token = Token::new(TokenKind::NUMBER, location);
        token.value = value;
        Ok(token)
    }

    fn read_identifier(&mut self, line: usize, column: usize, start: usize) -> Token {
        let mut text = String::new();
        while let Some(ch) = self.current_char() {
            if is_identifier_part(ch) {
                text.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        let length = self.position - start;
        let location = Location::new(line, column, length).with_file(self.file.as_deref());
        match text.as_str() {
            "true" => {
                let mut token = Token::new(TokenKind::NUMBER, location);
                token.value = 1.0;
                token.text = text;
                token
            }
            "false" => {
                let mut token = Token::new(TokenKind::NUMBER, location);
                token.value = 0.0;
                token.text = text;
                token
            }
            _ => {
                let mut token = Token::new(TokenKind::IDENTIFIER, location);
                token.text = text;
                token
            }
        }
    }

    fn read_escape(&mut self) -> Result<char> {
        let escape_location = self.here(2);
        self.advance(); // consume backslash
        match self.current_char() {
            Some(ch) => match escape_char(ch) {
                Some(decoded) => {
                    self.advance();
                    Ok(decoded)
                }
                None => Err(Error::lex(
                    format!("use of unknown escape character '\\{}'", ch),
                    escape_location,
                )),
            },
            None => Err(Error::lex(
                "unexpected end of input after '\\'",
                escape_location,
            )),
        }
    }

    fn read_string(&mut self, line: usize, column: usize, start: usize) -> Result<Token> {
        let open_quote = self.here(1);
        self.advance(); // consume opening quote

        let mut text = String::new();
        loop {
            match self.current_char() {
                None => return Err(Error::lex("missing closing '\"'", open_quote)),
                Some('"') => {
                    self.advance();
                    break;
                }
                Some('\\') => text.push(self.read_escape()?),
                Some(ch) => {
                    text.push(ch);
                    self.advance();
                }
            }
        }

        let length = self.position - start;
        let location = Location::new(line, column, length).with_file(self.file.as_deref());
        let mut token = Token::new(TokenKind::STRING, location);
        token.text = text;
        Ok(token)
    }

    fn read_char(&mut self, line: usize, column: usize, start: usize) -> Result<Token> {
        let open_quote = self.here(1);
        self.advance(); // consume opening quote

        let ch = match self.current_char() {
            None => return Err(Error::lex("missing closing \"'\"", open_quote)),
            Some('\\') => self.read_escape()?,
            Some(ch) => {
                self.advance();
                ch
            }
        };
        if self.current_char() != Some('\'') {
            return Err(Error::lex("missing closing \"'\"", open_quote));
        }
        self.advance();

        let length = self.position - start;
        let location = Location::new(line, column, length).with_file(self.file.as_deref());
        let mut token = Token::new(TokenKind::CHAR, location);
        token.ch = ch;
        Ok(token)
    }
}

#[test]
fn test_two_char_operators() {
    let tokens = Lexer::new("++ += + -- -= - *= * /= / <= < >= > == = != !")
        .tokenize()
        .unwrap();
    let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
    assert_eq!(
        kinds,
        vec![
            TokenKind::INCREMENT,
            TokenKind::PLUS_EQUAL,
            TokenKind::PLUS,
            TokenKind::DECREMENT,
            TokenKind::MINUS_EQUAL,
            TokenKind::MINUS,
            TokenKind::STAR_EQUAL,
            TokenKind::STAR,
            TokenKind::SLASH_EQUAL,
            TokenKind::SLASH,
            TokenKind::LESS_EQUAL,
            TokenKind::LESS,
            TokenKind::GREATER_EQUAL,
            TokenKind::GREATER,
            TokenKind::EQUAL,
            TokenKind::ASSIGN,
            TokenKind::NOT_EQUAL,
            TokenKind::EXCLAMATION,
            TokenKind::EOF,
        ]
    );
}

#[test]
fn test_comment_is_discarded() {
    let tokens = Lexer::new("1 // comment\n2").tokenize().unwrap();
    assert_eq!(tokens.len(), 3);
    assert_eq!(tokens[0].value, 1.0);
    assert_eq!(tokens[1].value, 2.0);
    assert_eq!(tokens[1].location.line, 1);
}
