use std::cell::RefCell;
use std::rc::Rc;

use cassia_lang::{ErrorKind, Program, ScriptType};

#[derive(Clone, Default)]
struct Vec3 {
    x: f32,
    y: f32,
    z: f32,
}

impl ScriptType for Vec3 {
    fn type_name() -> String {
        "Vec3".to_string()
    }
}

#[derive(Clone, Default)]
struct Counter {
    hits: i32,
}

impl ScriptType for Counter {
    fn type_name() -> String {
        "Counter".to_string()
    }
}

fn bind_vectori(program: &mut Program) {
    program
        .bind_type::<Vec<i32>>("vectori")
        .method("push_back", |v: &mut Vec<i32>, value: i32| v.push(value))
        .method("resize", |v: &mut Vec<i32>, len: i64| {
            v.resize(len as usize, 0)
        });
}

fn bind_vec3(program: &mut Program) {
    program
        .bind_type::<Vec3>("Vec3")
        .field("x", |v| &mut v.x)
        .field("y", |v| &mut v.y)
        .field("z", |v| &mut v.z)
        .method("length_squared", |v: &mut Vec3| {
            v.x * v.x + v.y * v.y + v.z * v.z
        })
        .ctor(|text: String| {
            let n: f32 = text.parse().unwrap_or(0.0);
            Vec3 { x: n, y: n, z: n }
        })
        .ctor(|n: f32| Vec3 { x: n, y: n, z: n })
        .ctor(|x: f32, y: f32, z: f32| Vec3 { x, y, z });
}

// ============================================================================
// Scenario: recursion plus a host container
// ============================================================================

#[test]
fn test_fibonacci_into_host_vector() {
    let mut program = Program::new();
    bind_vectori(&mut program);
    program
        .compile(
            r#"
            int fibonacci_impl(int a, int b, int n){
                if(n == 0)
                    return a;
                else
                    return fibonacci_impl(b, a + b, n - 1);
            }

            int fibonacci(int n){
                return fibonacci_impl(0, 1, n);
            }

            vectori list;

            for(int i = 0; i < 5; i++)
                list.push_back(fibonacci(i));
            "#,
        )
        .unwrap();
    program.run().unwrap();

    let list = program.get("list").unwrap().as_::<Vec<i32>>().unwrap();
    assert_eq!(list, vec![0, 1, 1, 2, 3]);

    let fibonacci = program.get("fibonacci").unwrap();
    assert_eq!(fibonacci.call((9,)).unwrap().as_::<i32>().unwrap(), 34);
}

// ============================================================================
// Scenario: a script struct driven from the host
// ============================================================================

#[test]
fn test_script_struct_methods_from_host() {
    let mut program = Program::new();
    program
        .compile(
            r#"
            struct Number{
                void set(int n){
                    number = n;
                }
                int get(){
                    return number;
                }

                void add(float n){
                    number = number + n;
                }

                int number;
            };

            Number x;
            x.number = 10;
            "#,
        )
        .unwrap();
    program.run().unwrap();

    let x = program.get("x").unwrap();
    assert_eq!(x.get("number").unwrap().as_::<i32>().unwrap(), 10);

    x.get("set").unwrap().call((32,)).unwrap();
    let got = x.get("get").unwrap().call(()).unwrap().as_::<i32>().unwrap();
    assert_eq!(got, 32);

    x.get("add").unwrap().call((got,)).unwrap();
    assert_eq!(
        x.get("get").unwrap().call(()).unwrap().as_::<i32>().unwrap(),
        64
    );
}

// ============================================================================
// Scenario: constructor selection
// ============================================================================

#[test]
fn test_constructor_selection() {
    let mut program = Program::new();
    bind_vec3(&mut program);
    program
        .compile(
            r#"
            Vec3 a = Vec3(1, 2, 3);
            Vec3 b = Vec3(4);
            Vec3 c = Vec3("5");
            "#,
        )
        .unwrap();
    program.run().unwrap();

    let field = |name: &str, axis: &str| {
        program
            .get(name)
            .unwrap()
            .get(axis)
            .unwrap()
            .as_::<f32>()
            .unwrap()
    };
    assert_eq!((field("a", "x"), field("a", "y"), field("a", "z")), (1.0, 2.0, 3.0));
    assert_eq!((field("b", "x"), field("b", "y"), field("b", "z")), (4.0, 4.0, 4.0));
    assert_eq!((field("c", "x"), field("c", "y"), field("c", "z")), (5.0, 5.0, 5.0));
}

#[test]
fn test_no_viable_constructor() {
    let mut program = Program::new();
    bind_vec3(&mut program);
    program.compile("Vec3 a = Vec3(1, 2);").unwrap();
    let err = program.run().unwrap_err();
    assert_eq!(err.kind, ErrorKind::Runtime);
    assert!(err.message.contains("no viable constructor"));
}

// ============================================================================
// Scenario: control-flow signals observed through a host sink
// ============================================================================

#[test]
fn test_break_stops_emission() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);

    let mut program = Program::new();
    program
        .bind("emit", move |value: i32| sink.borrow_mut().push(value))
        .unwrap();
    program
        .compile("for(int i = 0; i < 10; i++){ if(i == 3) break; emit(i); }")
        .unwrap();
    program.run().unwrap();

    assert_eq!(*log.borrow(), vec![0, 1, 2]);
}

// ============================================================================
// Field views and cloning
// ============================================================================

#[test]
fn test_field_views_write_through() {
    let mut program = Program::new();
    bind_vec3(&mut program);
    program.compile("Vec3 v; v.x = 2.5;").unwrap();
    program.run().unwrap();

    let v = program.get("v").unwrap();
    assert_eq!(v.get("x").unwrap().as_::<f32>().unwrap(), 2.5);

    // assigning through the view mutates the underlying host value
    v.get("y").unwrap().assign(7.5f32).unwrap();
    let value: Vec3 = v.as_().unwrap();
    assert_eq!(value.x, 2.5);
    assert_eq!(value.y, 7.5);
}

#[test]
fn test_cloned_host_objects_rebind_their_methods() {
    let mut program = Program::new();
    program
        .bind_type::<Counter>("Counter")
        .field("hits", |c| &mut c.hits)
        .method("bump", |c: &mut Counter| c.hits += 1);
    program
        .compile(
            r#"
            Counter a;
            a.bump();
            Counter b = a;
            b.bump();
            b.bump();
            "#,
        )
        .unwrap();
    program.run().unwrap();

    let a: Counter = program.get("a").unwrap().as_().unwrap();
    let b: Counter = program.get("b").unwrap().as_().unwrap();
    assert_eq!(a.hits, 1);
    assert_eq!(b.hits, 3);
}

// ============================================================================
// Bound values and functions
// ============================================================================

#[test]
fn test_bound_value_roundtrip() {
    let mut program = Program::new();
    program.bind_value("threshold", 10i32).unwrap();
    program
        .compile("int doubled = threshold * 2; threshold = 50;")
        .unwrap();
    program.run().unwrap();

    assert_eq!(
        program.get("doubled").unwrap().as_::<i32>().unwrap(),
        20
    );
    assert_eq!(
        program.get("threshold").unwrap().as_::<i32>().unwrap(),
        50
    );
}

#[test]
fn test_host_function_with_return_value() {
    let mut program = Program::new();
    program.bind("double", |x: i32| x * 2).unwrap();
    program.compile("int y = double(21);").unwrap();
    program.run().unwrap();
    assert_eq!(program.get("y").unwrap().as_::<i32>().unwrap(), 42);
}

#[test]
fn test_rebinding_a_function_name_fails() {
    let mut program = Program::new();
    program.bind("f", |x: i32| x).unwrap();
    let err = program.bind("f", |x: i32| x + 1).unwrap_err();
    assert!(err.message.contains("already bound"));
}

#[test]
fn test_argument_marshaling_error() {
    let mut program = Program::new();
    program.bind("wants_string", |_: String| 0i32).unwrap();
    program.compile("int x = wants_string(5);").unwrap();
    let err = program.run().unwrap_err();
    assert_eq!(err.kind, ErrorKind::Type);
    assert!(err.message.contains("cannot convert"));
}

// ============================================================================
// Host containers
// ============================================================================

#[test]
fn test_vector_element_access() {
    let mut program = Program::new();
    bind_vectori(&mut program);
    program
        .compile(
            r#"
            vectori v;
            v.push_back(5);
            v.push_back(6);
            int first = v[0];
            v[1] = 9;
            int second = v[1];
            "#,
        )
        .unwrap();
    program.run().unwrap();

    assert_eq!(program.get("first").unwrap().as_::<i32>().unwrap(), 5);
    assert_eq!(program.get("second").unwrap().as_::<i32>().unwrap(), 9);
    let v = program.get("v").unwrap().as_::<Vec<i32>>().unwrap();
    assert_eq!(v, vec![5, 9]);
}

#[test]
fn test_vector_index_out_of_range() {
    let mut program = Program::new();
    bind_vectori(&mut program);
    program
        .compile("vectori v; v.push_back(1); int x = v[1];")
        .unwrap();
    let err = program.run().unwrap_err();
    assert_eq!(err.kind, ErrorKind::Runtime);
    assert!(err.message.contains("index 1"));
    assert!(err.message.contains("[0, 1)"));
}

#[test]
fn test_index_then_member_chain() {
    // postfix chains collapse left-to-right in text order, so indexing
    // followed by member access reads, writes, and calls correctly
    let mut program = Program::new();
    bind_vec3(&mut program);
    program
        .bind_type::<Vec<Vec3>>("vec3list")
        .method("push_back", |v: &mut Vec<Vec3>, p: Vec3| v.push(p));
    program
        .compile(
            r#"
            vec3list points;
            points.push_back(Vec3(1, 2, 3));
            points.push_back(Vec3(4, 5, 6));
            float x0 = points[0].x;
            points[1].y = 50;
            float y1 = points[1].y;
            float m = points[0].length_squared();
            "#,
        )
        .unwrap();
    program.run().unwrap();

    assert_eq!(program.get("x0").unwrap().as_::<f32>().unwrap(), 1.0);
    assert_eq!(program.get("y1").unwrap().as_::<f32>().unwrap(), 50.0);
    assert_eq!(program.get("m").unwrap().as_::<f32>().unwrap(), 14.0);

    // the write through the chained view landed in the host vector
    let points = program.get("points").unwrap().as_::<Vec<Vec3>>().unwrap();
    assert_eq!(points[1].y, 50.0);
    assert_eq!(points[1].x, 4.0);
}

#[test]
fn test_member_then_index_chain() {
    let mut program = Program::new();
    bind_vectori(&mut program);
    program
        .compile(
            r#"
            struct Holder{ vectori items; };
            Holder h;
            h.items.push_back(7);
            int first = h.items[0];
            h.items[0] = 8;
            int second = h.items[0];
            "#,
        )
        .unwrap();
    program.run().unwrap();

    assert_eq!(program.get("first").unwrap().as_::<i32>().unwrap(), 7);
    assert_eq!(program.get("second").unwrap().as_::<i32>().unwrap(), 8);
}

#[test]
fn test_operator_not_available_for_host_type() {
    let mut program = Program::new();
    bind_vectori(&mut program);
    program.compile("vectori a; vectori b; a + b;").unwrap();
    let err = program.run().unwrap_err();
    assert_eq!(err.kind, ErrorKind::Type);
    assert!(err.message.contains("does not have operator \"+\""));
}

#[test]
fn test_unknown_member_on_host_type() {
    let mut program = Program::new();
    bind_vec3(&mut program);
    program.compile("Vec3 v; v.w = 1;").unwrap();
    let err = program.run().unwrap_err();
    assert_eq!(err.kind, ErrorKind::Resolution);
    assert!(err.message.contains("\"w\""));
}
