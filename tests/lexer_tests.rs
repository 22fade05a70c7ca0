use cassia_lang::lexer::Lexer;
use cassia_lang::{ErrorKind, TokenKind};

fn kinds_of(source: &str) -> Vec<TokenKind> {
    Lexer::new(source)
        .tokenize()
        .unwrap()
        .iter()
        .map(|t| t.kind)
        .collect()
}

// ============================================================================
// Tokens
// ============================================================================

#[test]
fn test_single_char_tokens() {
    let cases = vec![
        ("+", TokenKind::PLUS),
        ("-", TokenKind::MINUS),
        ("*", TokenKind::STAR),
        ("/", TokenKind::SLASH),
        ("(", TokenKind::LEFT_PAREN),
        (")", TokenKind::RIGHT_PAREN),
        ("[", TokenKind::LEFT_BRACKET),
        ("]", TokenKind::RIGHT_BRACKET),
        ("{", TokenKind::LEFT_BRACE),
        ("}", TokenKind::RIGHT_BRACE),
        (";", TokenKind::SEMICOLON),
        (".", TokenKind::DOT),
        (",", TokenKind::COMMA),
        ("<", TokenKind::LESS),
        (">", TokenKind::GREATER),
        ("=", TokenKind::ASSIGN),
        ("!", TokenKind::EXCLAMATION),
    ];

    for (source, expected) in cases {
        let kinds = kinds_of(source);
        assert_eq!(kinds, vec![expected, TokenKind::EOF], "failed for: {}", source);
    }
}

#[test]
fn test_two_char_tokens() {
    let cases = vec![
        ("++", TokenKind::INCREMENT),
        ("--", TokenKind::DECREMENT),
        ("+=", TokenKind::PLUS_EQUAL),
        ("-=", TokenKind::MINUS_EQUAL),
        ("*=", TokenKind::STAR_EQUAL),
        ("/=", TokenKind::SLASH_EQUAL),
        ("<=", TokenKind::LESS_EQUAL),
        (">=", TokenKind::GREATER_EQUAL),
        ("==", TokenKind::EQUAL),
        ("!=", TokenKind::NOT_EQUAL),
    ];

    for (source, expected) in cases {
        let kinds = kinds_of(source);
        assert_eq!(kinds, vec![expected, TokenKind::EOF], "failed for: {}", source);
    }
}

#[test]
fn test_two_char_vs_single_char() {
    assert_eq!(
        kinds_of("< = <="),
        vec![
            TokenKind::LESS,
            TokenKind::ASSIGN,
            TokenKind::LESS_EQUAL,
            TokenKind::EOF,
        ]
    );
    assert_eq!(
        kinds_of("+ ++ +="),
        vec![
            TokenKind::PLUS,
            TokenKind::INCREMENT,
            TokenKind::PLUS_EQUAL,
            TokenKind::EOF,
        ]
    );
}

#[test]
fn test_keywords_are_identifiers() {
    // keyword meaning is imposed by the parser, not the lexer
    let tokens = Lexer::new("if else for while return break struct new void")
        .tokenize()
        .unwrap();
    for token in &tokens[..tokens.len() - 1] {
        assert_eq!(token.kind, TokenKind::IDENTIFIER);
    }
}

// ============================================================================
// Literals
// ============================================================================

#[test]
fn test_numbers() {
    let tokens = Lexer::new("42 3.25 10f 2.5f 0").tokenize().unwrap();
    let values: Vec<f32> = tokens[..tokens.len() - 1].iter().map(|t| t.value).collect();
    assert_eq!(values, vec![42.0, 3.25, 10.0, 2.5, 0.0]);
}

#[test]
fn test_true_false_lex_as_numbers() {
    let tokens = Lexer::new("true false").tokenize().unwrap();
    assert_eq!(tokens[0].kind, TokenKind::NUMBER);
    assert_eq!(tokens[0].value, 1.0);
    assert_eq!(tokens[1].kind, TokenKind::NUMBER);
    assert_eq!(tokens[1].value, 0.0);
}

#[test]
fn test_string_escapes() {
    let tokens = Lexer::new(r#""a\tb\nc""#).tokenize().unwrap();
    assert_eq!(tokens[0].kind, TokenKind::STRING);
    assert_eq!(tokens[0].text, "a\tb\nc");
}

#[test]
fn test_unknown_escape_is_located() {
    let err = Lexer::new(r#"  "ab\qcd""#).tokenize().unwrap_err();
    assert_eq!(err.kind, ErrorKind::Lex);
    assert!(err.message.contains("\\q"));
    let location = err.location.unwrap();
    assert_eq!(location.line, 0);
    assert_eq!(location.column, 5);
}

#[test]
fn test_unterminated_string_points_at_opening_quote() {
    let err = Lexer::new("int x;\nstring s = \"abc").tokenize().unwrap_err();
    assert_eq!(err.kind, ErrorKind::Lex);
    let location = err.location.unwrap();
    assert_eq!(location.line, 1);
    assert_eq!(location.column, 11);
}

#[test]
fn test_char_literals() {
    let tokens = Lexer::new(r"'a' '\n'").tokenize().unwrap();
    assert_eq!(tokens[0].kind, TokenKind::CHAR);
    assert_eq!(tokens[0].ch, 'a');
    assert_eq!(tokens[1].ch, '\n');
}

#[test]
fn test_char_missing_close_quote() {
    let err = Lexer::new("'ab'").tokenize().unwrap_err();
    assert_eq!(err.kind, ErrorKind::Lex);
}

#[test]
fn test_unexpected_character() {
    let err = Lexer::new("int x = 1 # 2;").tokenize().unwrap_err();
    assert_eq!(err.kind, ErrorKind::Lex);
    assert!(err.message.contains('#'));
}

// ============================================================================
// Comments and locations
// ============================================================================

#[test]
fn test_comments_are_not_emitted() {
    let tokens = Lexer::new("1 // one\n// whole line\n2").tokenize().unwrap();
    assert_eq!(tokens.len(), 3);
    assert_eq!(tokens[0].value, 1.0);
    assert_eq!(tokens[1].value, 2.0);
    assert_eq!(tokens[1].location.line, 2);
    assert_eq!(tokens[1].location.column, 0);
}

#[test]
fn test_token_locations_span_their_lexeme() {
    let tokens = Lexer::new("int count = 12;").tokenize().unwrap();
    let spans: Vec<(usize, usize)> = tokens[..tokens.len() - 1]
        .iter()
        .map(|t| (t.location.column, t.location.length))
        .collect();
    assert_eq!(spans, vec![(0, 3), (4, 5), (10, 1), (12, 2), (14, 1)]);
}

#[test]
fn test_locations_reassemble_the_source() {
    // concatenating the located substrings yields the source minus
    // whitespace and comments
    let source = "int a = 1; // init\nwhile (a <= 10) { a += 2; }";
    let lines: Vec<&str> = source.lines().collect();
    let tokens = Lexer::new(source).tokenize().unwrap();

    let mut reassembled = String::new();
    for token in &tokens[..tokens.len() - 1] {
        let line = lines[token.location.line];
        let fragment: String = line
            .chars()
            .skip(token.location.column)
            .take(token.location.length)
            .collect();
        reassembled.push_str(&fragment);
    }

    let expected: String = source
        .lines()
        .map(|line| match line.find("//") {
            Some(pos) => &line[..pos],
            None => line,
        })
        .collect::<String>()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    assert_eq!(reassembled, expected);
}

#[test]
fn test_eof_terminates_stream() {
    let tokens = Lexer::new("").tokenize().unwrap();
    assert_eq!(tokens.len(), 1);
    assert_eq!(tokens[0].kind, TokenKind::EOF);
}
