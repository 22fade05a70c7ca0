//! The host-facing program facade.
//!
//! A [`Program`] collects host bindings (free functions, seeded variables,
//! registered types), compiles source against them, runs the result, and
//! lets the host read script state back through [`Proxy`] handles.
//!
//! ```no_run
//! use cassia_lang::Program;
//!
//! let mut program = Program::new();
//! program.bind("double", |x: i32| x * 2).unwrap();
//! program.compile("int y = double(21);").unwrap();
//! program.run().unwrap();
//! assert_eq!(program.get("y").unwrap().as_::<i32>().unwrap(), 42);
//! ```

use std::cell::RefCell;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::function::{Function, IntoArgs, IntoHostCtor, IntoHostFn, IntoHostMethod};
use crate::lexer::Lexer;
use crate::object::{HostValue, Object, ScriptType, Storage};
use crate::parser::Parser;
use crate::scope::{unhandled_break_error, Flow, Scope};

#[derive(Default)]
pub struct Program {
    source: String,
    source_name: Option<String>,
    root: Option<Rc<Scope>>,
    types: HashMap<String, Object>,
    variables: HashMap<String, Object>,
    functions: HashMap<String, Function>,
}

impl Program {
    pub fn new() -> Program {
        Program::default()
    }

    /// Registers a free function callable from script. Rebinding a name is
    /// an error.
    pub fn bind<Marker>(&mut self, name: &str, f: impl IntoHostFn<Marker>) -> Result<()> {
        if self.functions.contains_key(name) {
            return Err(Error::runtime(format!(
                "function \"{}\" is already bound",
                name
            )));
        }
        self.functions.insert(name.to_string(), Function::host(f));
        Ok(())
    }

    /// Registers a named variable seeded with `value`; the script sees and
    /// may mutate it, and the host reads it back after `run`.
    pub fn bind_value<T: ScriptType>(&mut self, name: &str, value: T) -> Result<()> {
        if self.variables.contains_key(name) {
            return Err(Error::runtime(format!(
                "variable \"{}\" is already bound",
                name
            )));
        }
        self.variables
            .insert(name.to_string(), Object::from_value(value));
        Ok(())
    }

    /// Registers a host type under `name` and returns a fluent handle for
    /// attaching fields, methods and constructors.
    pub fn bind_type<T: ScriptType>(&mut self, name: &str) -> TypeHandle<T> {
        let exemplar = Object::from_value(T::default());
        let cell = exemplar.cell().expect("freshly created exemplar is owned");
        self.types.insert(name.to_string(), exemplar);
        TypeHandle {
            cell,
            _marker: PhantomData,
        }
    }

    /// Lexes and parses `source` against the current bindings. May fail
    /// with a located error; render it with [`Program::render_error`].
    pub fn compile(&mut self, source: &str) -> Result<()> {
        self.source = source.to_string();
        let tokens = Lexer::new(source)
            .with_file(self.source_name.as_deref())
            .tokenize()?;

        let root = Scope::root();
        for (name, exemplar) in &self.types {
            root.types.borrow_mut().insert(name.clone(), exemplar.clone());
        }
        for (name, cell) in &self.variables {
            root.variables
                .borrow_mut()
                .insert(name.clone(), cell.clone());
        }
        for (name, function) in &self.functions {
            root.functions
                .borrow_mut()
                .insert(name.clone(), function.clone());
        }

        Parser::new(tokens).parse_into(&root)?;
        self.root = Some(root);
        Ok(())
    }

    pub fn compile_named(&mut self, source: &str, name: &str) -> Result<()> {
        self.source_name = Some(name.to_string());
        self.compile(source)
    }

    /// Executes the root scope. A top-level `return` is swallowed; every
    /// other error propagates.
    pub fn run(&self) -> Result<()> {
        let root = self
            .root
            .as_ref()
            .ok_or_else(|| Error::runtime("program has not been compiled"))?;
        match root.run()? {
            Flow::Normal | Flow::Returned(_) => Ok(()),
            Flow::Broke => Err(unhandled_break_error()),
        }
    }

    /// Looks `name` up in the root scope: a variable proxy for variables,
    /// a callable proxy for functions.
    pub fn get(&self, name: &str) -> Result<Proxy> {
        let root = self
            .root
            .as_ref()
            .ok_or_else(|| Error::runtime("program has not been compiled"))?;
        if let Some(cell) = root.find_variable(name) {
            return Ok(Proxy {
                kind: ProxyKind::Variable(cell),
            });
        }
        if let Some(function) = root.find_function(name) {
            return Ok(Proxy {
                kind: ProxyKind::Function(function),
            });
        }
        Err(Error::resolution(format!("cannot find \"{}\"", name)))
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// One line of message plus the located span, per the diagnostic
    /// format.
    pub fn render_error(&self, error: &Error) -> String {
        error.render(&self.source)
    }
}

/// Fluent registration handle returned by [`Program::bind_type`].
///
/// ```no_run
/// # #[derive(Clone, Default)]
/// # struct Vec3 { x: f32, y: f32, z: f32 }
/// # impl cassia_lang::ScriptType for Vec3 {
/// #     fn type_name() -> String { "Vec3".to_string() }
/// # }
/// # let mut program = cassia_lang::Program::new();
/// program
///     .bind_type::<Vec3>("Vec3")
///     .field("x", |v| &mut v.x)
///     .field("y", |v| &mut v.y)
///     .ctor(|x: f32| Vec3 { x, y: x, z: x });
/// ```
pub struct TypeHandle<T: ScriptType> {
    cell: Rc<RefCell<Storage>>,
    _marker: PhantomData<T>,
}

impl<T: ScriptType> TypeHandle<T> {
    fn with_host<R>(&self, f: impl FnOnce(&mut HostValue<T>) -> R) -> R {
        let mut storage = self.cell.borrow_mut();
        match &mut *storage {
            Storage::Host(host) => {
                let host = host
                    .store_any_mut()
                    .downcast_mut::<HostValue<T>>()
                    .expect("type handle storage matches its type parameter");
                f(host)
            }
            Storage::Script(_) => unreachable!("type handle storage is host-backed"),
        }
    }

    /// Registers a named field through a projection; script-side reads
    /// and writes go through it as a reference view.
    pub fn field<M: ScriptType>(self, name: &str, project: fn(&mut T) -> &mut M) -> Self {
        self.with_host(|host| host.add_field(name, project));
        self
    }

    /// Registers a method with a `&mut T` receiver and 0 to 8 further
    /// arguments.
    pub fn method<Marker>(self, name: &str, method: impl IntoHostMethod<T, Marker>) -> Self {
        self.with_host(|host| host.add_method(name, method.into_host_method()));
        self
    }

    /// Registers a constructor; `construct` picks the first registered
    /// one whose arity and argument conversions succeed.
    pub fn ctor<Marker>(self, ctor: impl IntoHostCtor<T, Marker>) -> Self {
        self.with_host(|host| host.add_ctor(ctor.into_host_ctor()));
        self
    }
}

enum ProxyKind {
    Variable(Object),
    Function(Function),
    Method { receiver: Object, name: String },
}

/// Host-side handle to a script variable, function, or bound method.
pub struct Proxy {
    kind: ProxyKind,
}

impl Proxy {
    /// Reads a variable out, with the usual arithmetic coercions.
    pub fn as_<T: ScriptType>(&self) -> Result<T> {
        match &self.kind {
            ProxyKind::Variable(object) => object.as_(),
            _ => Err(Error::type_error("a function cannot be read as a value")),
        }
    }

    /// The underlying object handle of a variable proxy.
    pub fn object(&self) -> Result<Object> {
        match &self.kind {
            ProxyKind::Variable(object) => Ok(object.clone()),
            _ => Err(Error::type_error("a function has no value")),
        }
    }

    /// Writes a host value into the variable behind this proxy.
    pub fn assign<T: ScriptType>(&self, value: T) -> Result<()> {
        match &self.kind {
            ProxyKind::Variable(object) => object.assign(&Object::from_value(value)),
            _ => Err(Error::type_error("a function cannot be assigned")),
        }
    }

    /// Navigates to a member or method of the variable behind this proxy.
    pub fn get(&self, name: &str) -> Result<Proxy> {
        match &self.kind {
            ProxyKind::Variable(object) => {
                if object.has_method(name) {
                    Ok(Proxy {
                        kind: ProxyKind::Method {
                            receiver: object.clone(),
                            name: name.to_string(),
                        },
                    })
                } else {
                    object.member(name).map(|member| Proxy {
                        kind: ProxyKind::Variable(member),
                    })
                }
            }
            _ => Err(Error::type_error("only variables have members")),
        }
    }

    /// Calls a function or method with host values; void results come
    /// back as a void object.
    pub fn call<A: IntoArgs>(&self, args: A) -> Result<Object> {
        self.call_with_objects(args.into_args())
    }

    pub fn call_with_objects(&self, args: Vec<Object>) -> Result<Object> {
        let result = match &self.kind {
            ProxyKind::Function(function) => function.call_with(args)?,
            ProxyKind::Method { receiver, name } => receiver.call_method(name, &args)?,
            ProxyKind::Variable(_) => {
                return Err(Error::type_error("a variable is not callable"))
            }
        };
        Ok(result.unwrap_or_else(Object::void))
    }
}
