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

fn run_error(source: &str) -> cassia_lang::Error {
    let mut program = Program::new();
    program.compile(source).expect("source should compile");
    program.run().expect_err("expected a runtime error")
}

fn int_of(program: &Program, name: &str) -> i32 {
    program.get(name).unwrap().as_::<i32>().unwrap()
}

// ============================================================================
// Control flow
// ============================================================================

#[test]
fn test_if_else_chain() {
    let program = run_program(
        r#"
        int grade(int score){
            if(score >= 90)
                return 4;
            else if(score >= 80)
                return 3;
            else if(score >= 70)
                return 2;
            else
                return 0;
        }

        int a = grade(95);
        int b = grade(85);
        int c = grade(72);
        int d = grade(10);
        "#,
    );
    assert_eq!(int_of(&program, "a"), 4);
    assert_eq!(int_of(&program, "b"), 3);
    assert_eq!(int_of(&program, "c"), 2);
    assert_eq!(int_of(&program, "d"), 0);
}

#[test]
fn test_while_loop() {
    let program = run_program("int n = 0; int sum = 0; while(n < 5){ sum += n; n++; }");
    assert_eq!(int_of(&program, "sum"), 10);
    assert_eq!(int_of(&program, "n"), 5);
}

#[test]
fn test_braceless_bodies() {
    let program = run_program(
        r#"
        int n = 0;
        while(n < 3)
            n++;
        int sum = 0;
        for(int i = 0; i < 4; i++)
            sum += i;
        int flag = 0;
        if(sum == 6)
            flag = 1;
        else
            flag = 2;
        "#,
    );
    assert_eq!(int_of(&program, "n"), 3);
    assert_eq!(int_of(&program, "sum"), 6);
    assert_eq!(int_of(&program, "flag"), 1);
}

#[test]
fn test_for_loop_scoping() {
    let program = run_program("int last = 0; for(int i = 0; i < 4; i++){ last = i; }");
    assert_eq!(int_of(&program, "last"), 3);
    // the loop variable itself is gone
    assert!(program.get("i").is_err());
}

#[test]
fn test_loop_variable_not_visible_after_loop() {
    let mut program = Program::new();
    let err = program
        .compile("for(int i = 0; i < 3; i++){ ; } i = 1;")
        .expect_err("loop variable must not leak");
    assert_eq!(err.kind, ErrorKind::Resolution);
}

#[test]
fn test_break_leaves_the_loop() {
    let program = run_program(
        "int stopped = 0; for(int i = 0; i < 10; i++){ if(i == 3) break; stopped = i; }",
    );
    assert_eq!(int_of(&program, "stopped"), 2);
}

#[test]
fn test_break_inside_while() {
    let program = run_program("int n = 0; while(true){ n++; if(n == 4) break; }");
    assert_eq!(int_of(&program, "n"), 4);
}

#[test]
fn test_break_outside_loop_is_an_error() {
    let err = run_error("break;");
    assert_eq!(err.kind, ErrorKind::Runtime);
    assert!(err.message.contains("break"));
}

// ============================================================================
// Functions and signals
// ============================================================================

#[test]
fn test_return_unwinds_through_nested_control_flow() {
    let program = run_program(
        r#"
        int search(int limit){
            for(int i = 0; i < limit; i++){
                if(i * i >= 20){
                    return i;
                }
            }
            return -1;
        }

        int found = search(10);
        int missing = search(3);
        "#,
    );
    assert_eq!(int_of(&program, "found"), 5);
    assert_eq!(int_of(&program, "missing"), -1);
}

#[test]
fn test_plain_recursion() {
    let program = run_program(
        r#"
        int fib(int n){
            if(n < 2)
                return n;
            return fib(n - 1) + fib(n - 2);
        }

        int a = fib(10);
        "#,
    );
    assert_eq!(int_of(&program, "a"), 55);
}

#[test]
fn test_parameters_rebind_per_call() {
    let program = run_program(
        r#"
        int add(int a, int b){
            a += b;
            return a;
        }

        int x = add(1, 2);
        int y = add(10, 20);
        "#,
    );
    assert_eq!(int_of(&program, "x"), 3);
    assert_eq!(int_of(&program, "y"), 30);
}

#[test]
fn test_return_type_mismatch() {
    let err = run_error("int oops(){ return \"text\"; } int x = oops();");
    assert_eq!(err.kind, ErrorKind::Runtime);
    assert!(err.message.contains("return type"));
}

#[test]
fn test_void_function_must_not_return_a_value() {
    let err = run_error("void oops(){ return 1; } oops();");
    assert_eq!(err.kind, ErrorKind::Runtime);
}

#[test]
fn test_declared_return_requires_a_value() {
    let err = run_error("int oops(){ ; } int x = oops();");
    assert_eq!(err.kind, ErrorKind::Runtime);
}

#[test]
fn test_void_call_cannot_stand_in_an_expression() {
    let err = run_error("void noop(){ ; } int x = noop();");
    assert_eq!(err.kind, ErrorKind::Type);
    assert!(err.message.contains("value"));
}

#[test]
fn test_void_call_inside_arithmetic_is_a_typed_error() {
    let err = run_error("void noop(){ ; } int x = 1 + noop();");
    assert_eq!(err.kind, ErrorKind::Type);
    assert!(err.message.contains("void"));
}

#[test]
fn test_function_name_collision() {
    let mut program = Program::new();
    let err = program
        .compile("int f(){ return 1; } int f(){ return 2; }")
        .expect_err("redefinition must fail");
    assert_eq!(err.kind, ErrorKind::Parse);
    assert!(err.message.contains("already defined"));
}

// ============================================================================
// Scopes
// ============================================================================

#[test]
fn test_nested_scope_shadowing() {
    let program = run_program(
        "int x = 1; int seen = 0; { int x = 2; seen = x; } int after = x;",
    );
    assert_eq!(int_of(&program, "seen"), 2);
    assert_eq!(int_of(&program, "after"), 1);
}

#[test]
fn test_declarations_rebind_on_every_loop_entry() {
    let program = run_program(
        "int total = 0; for(int i = 0; i < 3; i++){ int local = 1; local += i; total += local; }",
    );
    assert_eq!(int_of(&program, "total"), 6);
}

// ============================================================================
// Script structs
// ============================================================================

#[test]
fn test_struct_methods_in_script() {
    let program = run_program(
        r#"
        struct Number{
            void set(int n){
                number = n;
            }
            int get(){
                return number;
            }
            int number;
        };

        Number x;
        x.set(42);
        int got = x.get();
        x.number = 7;
        int direct = x.number;
        "#,
    );
    assert_eq!(int_of(&program, "got"), 42);
    assert_eq!(int_of(&program, "direct"), 7);
}

#[test]
fn test_struct_members_are_zero_initialized() {
    let program = run_program("struct P{ int a; float b; }; P p; int a = p.a;");
    assert_eq!(int_of(&program, "a"), 0);
}

#[test]
fn test_struct_operators_apply_member_wise() {
    let program = run_program(
        r#"
        struct Pair{ int a; int b; };
        Pair p;
        Pair q;
        p.a = 1; p.b = 2;
        q.a = 10; q.b = 20;
        p += q;
        bool same = p == q;
        bool below = p < q;
        int pa = p.a;
        int pb = p.b;
        "#,
    );
    assert_eq!(int_of(&program, "pa"), 11);
    assert_eq!(int_of(&program, "pb"), 22);
    assert!(!program.get("same").unwrap().as_::<bool>().unwrap());
    // 11 < 10 fails, so the lexicographic AND is false
    assert!(!program.get("below").unwrap().as_::<bool>().unwrap());
}

#[test]
fn test_struct_assignment_copies_values() {
    let program = run_program(
        r#"
        struct Pair{ int a; int b; };
        Pair p;
        p.a = 1; p.b = 2;
        Pair q = p;
        q.a = 100;
        int pa = p.a;
        int qa = q.a;
        "#,
    );
    assert_eq!(int_of(&program, "pa"), 1);
    assert_eq!(int_of(&program, "qa"), 100);
}

#[test]
fn test_struct_indexing_is_a_typed_error() {
    let err = run_error("struct P{ int a; }; P p; p[0];");
    assert_eq!(err.kind, ErrorKind::Type);
    assert!(err.message.contains("[]"));
}

// ============================================================================
// Diagnostics
// ============================================================================

#[test]
fn test_error_renders_message_and_underline() {
    let mut program = Program::new();
    let err = program
        .compile("int x;\nx = unknown;")
        .expect_err("unknown identifier");
    let rendered = program.render_error(&err);
    assert!(rendered.contains("cannot find \"unknown\""));
    assert!(rendered.contains("1:4:x = unknown;"));
    assert!(rendered.contains("~~~~~~~"));
}
