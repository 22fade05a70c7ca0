use cassia_lang::{ErrorKind, Program};

fn run_program(source: &str) -> Program {
    let mut program = Program::new();
    if let Err(e) = program.compile(source) {
        panic!("compile failed: {}", program.render_error(&e));
    }
    if let Err(e) = program.run() {
        panic!("run failed: {}", program.render_error(&e));
    }
    program
}

fn compile_error(source: &str) -> cassia_lang::Error {
    let mut program = Program::new();
    program
        .compile(source)
        .expect_err("expected a compile error")
}

fn int_of(program: &Program, name: &str) -> i32 {
    program.get(name).unwrap().as_::<i32>().unwrap()
}

fn bool_of(program: &Program, name: &str) -> bool {
    program.get(name).unwrap().as_::<bool>().unwrap()
}

// ============================================================================
// Precedence and associativity
// ============================================================================

#[test]
fn test_multiplication_binds_tighter_than_addition() {
    let program = run_program("int a = 1 + 2 * 3; int b = (1 + 2) * 3;");
    assert_eq!(int_of(&program, "a"), 7);
    assert_eq!(int_of(&program, "b"), 9);
}

#[test]
fn test_comparisons_bind_loosest() {
    let program = run_program(
        "bool a = 1 + 2 * 3 == 7; bool b = (1 + 2) * 3 == 9; bool c = 2 < 1;",
    );
    assert!(bool_of(&program, "a"));
    assert!(bool_of(&program, "b"));
    assert!(!bool_of(&program, "c"));
}

#[test]
fn test_binary_operators_are_left_associative() {
    let program = run_program("int a = 10 - 2 - 3; int b = 24 / 4 / 3;");
    assert_eq!(int_of(&program, "a"), 5);
    assert_eq!(int_of(&program, "b"), 2);
}

#[test]
fn test_nested_parentheses() {
    let program = run_program("int a = ((2 + 3) * (4 - 1)) / 3;");
    assert_eq!(int_of(&program, "a"), 5);
}

// ============================================================================
// Unary operators
// ============================================================================

#[test]
fn test_unary_minus_versus_binary() {
    let program = run_program("int a = 4; int b = -a; int c = 5 - -a; int d = -2 * 3;");
    assert_eq!(int_of(&program, "b"), -4);
    assert_eq!(int_of(&program, "c"), 9);
    assert_eq!(int_of(&program, "d"), -6);
}

#[test]
fn test_increment_decrement() {
    let program = run_program(
        "int i = 5; int a = i++; int b = ++i; int j = 5; int c = j--; int d = --j;",
    );
    assert_eq!(int_of(&program, "a"), 5);
    assert_eq!(int_of(&program, "b"), 7);
    assert_eq!(int_of(&program, "i"), 7);
    assert_eq!(int_of(&program, "c"), 5);
    assert_eq!(int_of(&program, "d"), 3);
    assert_eq!(int_of(&program, "j"), 3);
}

#[test]
fn test_increment_requires_an_lvalue() {
    let err = compile_error("int a = 3++;");
    assert_eq!(err.kind, ErrorKind::Parse);
}

// ============================================================================
// Assignment family
// ============================================================================

#[test]
fn test_compound_assignment() {
    let program = run_program("int a = 10; a += 5; a -= 2; a *= 3; a /= 4;");
    assert_eq!(int_of(&program, "a"), 9);
}

#[test]
fn test_assignment_yields_the_assigned_slot() {
    let program = run_program("int a = 0; int b = 0; b = (a = 7) + 1;");
    assert_eq!(int_of(&program, "a"), 7);
    assert_eq!(int_of(&program, "b"), 8);
}

#[test]
fn test_chained_assignment_is_rejected() {
    let err = compile_error("int a; int b; a = b = 1;");
    assert_eq!(err.kind, ErrorKind::Parse);
    assert!(err.message.contains("not assignable"));
}

#[test]
fn test_assignment_to_literal_is_rejected() {
    let err = compile_error("1 = 2;");
    assert_eq!(err.kind, ErrorKind::Parse);
}

// ============================================================================
// Coercion
// ============================================================================

#[test]
fn test_arithmetic_follows_the_left_operand() {
    // literals are float; declared variables convert C-style
    let program = run_program("int a = 7 / 2; float f = 7 / 2; int b = a + 0.9;");
    assert_eq!(int_of(&program, "a"), 3);
    assert_eq!(program.get("f").unwrap().as_::<f32>().unwrap(), 3.5);
    assert_eq!(int_of(&program, "b"), 3);
}

#[test]
fn test_string_concatenation_and_comparison() {
    let program =
        run_program("string s = \"foo\"; s += \"bar\"; bool eq = s == \"foobar\";");
    assert_eq!(
        program.get("s").unwrap().as_::<String>().unwrap(),
        "foobar"
    );
    assert!(bool_of(&program, "eq"));
}

#[test]
fn test_bool_from_numeric_condition() {
    let program = run_program("bool t = true; bool f = false; int n = 3; bool nz = n != 0;");
    assert!(bool_of(&program, "t"));
    assert!(!bool_of(&program, "f"));
    assert!(bool_of(&program, "nz"));
}

// ============================================================================
// Structure errors
// ============================================================================

#[test]
fn test_unmatched_opening_bracket() {
    let err = compile_error("int a = (1 + 2;");
    assert_eq!(err.kind, ErrorKind::Parse);
}

#[test]
fn test_unmatched_closing_bracket() {
    let err = compile_error("int a = 1 + 2);");
    assert_eq!(err.kind, ErrorKind::Parse);
}

#[test]
fn test_missing_operand() {
    let err = compile_error("int a = 1 + ;");
    assert_eq!(err.kind, ErrorKind::Parse);
}

#[test]
fn test_missing_operator_between_operands() {
    let err = compile_error("int a = 1 2;");
    assert_eq!(err.kind, ErrorKind::Parse);
}

#[test]
fn test_unknown_identifier_span_covers_the_name() {
    let err = compile_error("int x;\nx = unknown;");
    assert_eq!(err.kind, ErrorKind::Resolution);
    let location = err.location.expect("located error");
    assert_eq!(location.line, 1);
    assert_eq!(location.column, 4);
    assert_eq!(location.length, 7);
}

// ============================================================================
// Statement boundaries
// ============================================================================

#[test]
fn test_empty_source_is_a_valid_program() {
    run_program("");
}

#[test]
fn test_empty_statements_evaluate_to_void() {
    run_program(";;;");
}

#[test]
fn test_new_produces_a_pointer_value() {
    // single-level allocation; the result is usable as a statement
    run_program("new int;");
}

#[test]
fn test_collapse_leaves_at_most_one_operand() {
    use cassia_lang::{Lexer, Parser, Scope, Statement};

    let tokens = Lexer::new("int a = 1 + 2 * (3 - 4); ; a == 5;")
        .tokenize()
        .unwrap();
    let root = Scope::root();
    Parser::new(tokens).parse_into(&root).unwrap();

    for statement in root.statements.borrow().iter() {
        match statement {
            Statement::Expression(expression) => assert!(expression.operands.len() <= 1),
            Statement::Declaration { init, .. } => {
                if let Some(expression) = init {
                    assert_eq!(expression.operands.len(), 1);
                }
            }
            _ => {}
        }
    }
}
