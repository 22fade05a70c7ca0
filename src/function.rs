//! The function model.
//!
//! One call path serves both worlds: a [`Function`] wraps either a
//! script-defined body (parameter names plus a definition scope) or a host
//! adapter that marshals `Object` arguments into typed Rust parameters.
//! Host functions, methods and constructors accept 0 to 8 arguments; the
//! adapters are generated by the arity macros at the bottom of this file.

use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::operands::Expression;
use crate::error::{Error, Result};
use crate::object::{HostCtor, HostMethod, Object, ScriptType};
use crate::scope::{Flow, Scope};

/// A script-defined function: an optional return-type exemplar, the
/// declared parameter names, and the definition scope holding the body.
pub struct ScriptFunction {
    pub return_type: Option<Object>,
    pub parameters: Vec<String>,
    pub definition: Rc<Scope>,
}

/// A host-bound function: a type-erased adapter produced by
/// [`IntoHostFn`].
pub struct HostFunction {
    arity: usize,
    invoke: Box<dyn Fn(&[Object]) -> Result<Option<Object>>>,
}

enum FunctionBody {
    Script(ScriptFunction),
    Host(HostFunction),
}

/// Callable handle; cloning shares the underlying definition.
#[derive(Clone)]
pub struct Function {
    body: Rc<FunctionBody>,
}

impl Function {
    pub fn script(function: ScriptFunction) -> Function {
        Function {
            body: Rc::new(FunctionBody::Script(function)),
        }
    }

    pub fn host<Marker>(f: impl IntoHostFn<Marker>) -> Function {
        Function {
            body: Rc::new(FunctionBody::Host(f.into_host_fn())),
        }
    }

    /// Evaluates the argument expressions in the caller's scope, then
    /// dispatches.
    pub fn run(&self, scope: &Scope, args: &[Expression]) -> Result<Option<Object>> {
        let values = args
            .iter()
            .map(|expr| expr.expect_value(scope))
            .collect::<Result<Vec<_>>>()?;
        self.call_with(values)
    }

    /// Invokes with already-evaluated arguments (the host-facing path).
    pub fn call_with(&self, args: Vec<Object>) -> Result<Option<Object>> {
        match &*self.body {
            FunctionBody::Script(function) => function.call(args, None),
            FunctionBody::Host(function) => {
                if args.len() != function.arity {
                    return Err(Error::runtime(format!(
                        "function expects {} argument(s), got {}",
                        function.arity,
                        args.len()
                    )));
                }
                (function.invoke)(&args)
            }
        }
    }

    /// Invokes a script-defined method on `receiver`: the receiver's
    /// members are copied into the definition scope before the body runs
    /// and copied back afterwards.
    pub(crate) fn call_as_method(
        &self,
        receiver: &Object,
        args: Vec<Object>,
    ) -> Result<Option<Object>> {
        match &*self.body {
            FunctionBody::Script(function) => function.call(args, Some(receiver)),
            FunctionBody::Host(_) => Err(Error::runtime(
                "a host function cannot be called as a script method",
            )),
        }
    }
}

impl ScriptFunction {
    fn call(&self, args: Vec<Object>, receiver: Option<&Object>) -> Result<Option<Object>> {
        if args.len() != self.parameters.len() {
            return Err(Error::runtime(format!(
                "function expects {} argument(s), got {}",
                self.parameters.len(),
                args.len()
            )));
        }

        // A frame is a fresh set of bindings layered over the definition
        // scope; the previous bindings come back on every exit path, which
        // is what makes recursion work.
        let saved: HashMap<String, Object> = self.definition.variables.borrow().clone();

        let members = match receiver {
            Some(receiver) => {
                let members = receiver.script_members()?;
                for (name, cell) in &members {
                    self.definition
                        .variables
                        .borrow_mut()
                        .insert(name.clone(), cell.snapshot()?);
                }
                members
            }
            None => Vec::new(),
        };

        for (parameter, value) in self.parameters.iter().zip(&args) {
            let exemplar = saved.get(parameter).unwrap_or_else(|| {
                panic!("parameter \"{}\" missing from definition scope", parameter)
            });
            let cell = exemplar.snapshot()?;
            cell.assign(value)?;
            self.definition
                .variables
                .borrow_mut()
                .insert(parameter.clone(), cell);
        }

        let outcome = match self.definition.run() {
            Ok(Flow::Returned(value)) => Ok(value),
            Ok(Flow::Normal) => Ok(None),
            Ok(Flow::Broke) => Err(Error::runtime("\"break\" outside of a loop")),
            Err(error) => Err(error),
        };

        if outcome.is_ok() {
            for (name, cell) in &members {
                let updated = self.definition.variables.borrow().get(name).cloned();
                if let Some(updated) = updated {
                    cell.assign(&updated)?;
                }
            }
        }
        self.definition.variables.replace(saved);

        let value = outcome?;
        match &self.return_type {
            None => match value {
                None => Ok(None),
                Some(_) => Err(Error::runtime("void function returned a value")),
            },
            Some(exemplar) => {
                let value = value.ok_or_else(|| {
                    Error::runtime(format!(
                        "function must return a value of type \"{}\"",
                        exemplar.type_name()
                    ))
                })?;
                // the returned value adopts the declared type, with the
                // same conversions assignment allows
                let result = exemplar.snapshot()?;
                result.assign(&value).map_err(|_| {
                    Error::runtime(format!(
                        "expected return type \"{}\", got \"{}\"",
                        exemplar.type_name(),
                        value.type_name()
                    ))
                })?;
                Ok(Some(result))
            }
        }
    }
}

/// Marker for adapters whose underlying function returns a value.
pub struct ValueReturn;
/// Marker for adapters whose underlying function returns nothing.
pub struct VoidReturn;

/// Conversion of a Rust function into a host-callable adapter. The
/// `Marker` parameter only disambiguates the blanket impls; inference
/// picks it from the function's signature.
pub trait IntoHostFn<Marker> {
    fn into_host_fn(self) -> HostFunction;
}

/// Conversion of a Rust function with a `&mut T` receiver into a bound
/// method.
pub trait IntoHostMethod<T, Marker> {
    fn into_host_method(self) -> Rc<dyn HostMethod<T>>;
}

/// Conversion of a Rust function producing `T` into a registered
/// constructor. Viability of a call is tested with non-failing argument
/// conversions.
pub trait IntoHostCtor<T, Marker> {
    fn into_host_ctor(self) -> HostCtor<T>;
}

struct HostMethodImpl<T> {
    arity: usize,
    invoke: Box<dyn Fn(&mut T, &[Object]) -> Result<Option<Object>>>,
}

impl<T> HostMethod<T> for HostMethodImpl<T> {
    fn invoke(&self, receiver: &mut T, args: &[Object]) -> Result<Option<Object>> {
        if args.len() != self.arity {
            return Err(Error::runtime(format!(
                "method expects {} argument(s), got {}",
                self.arity,
                args.len()
            )));
        }
        (self.invoke)(receiver, args)
    }
}

/// Conversion of a tuple of host values into call arguments, used by the
/// program proxy.
pub trait IntoArgs {
    fn into_args(self) -> Vec<Object>;
}

macro_rules! impl_host_adapters {
    ($count:expr $(, $arg:ident : $idx:tt)*) => {
        impl<F, R $(, $arg)*> IntoHostFn<(ValueReturn $(, $arg)*)> for F
        where
            F: Fn($($arg),*) -> R + 'static,
            R: ScriptType,
            $($arg: ScriptType,)*
        {
            fn into_host_fn(self) -> HostFunction {
                HostFunction {
                    arity: $count,
                    invoke: Box::new(move |args: &[Object]| {
                        let result = self($(args[$idx].as_::<$arg>()?),*);
                        Ok(Some(Object::from_value(result)))
                    }),
                }
            }
        }

        impl<F $(, $arg)*> IntoHostFn<(VoidReturn $(, $arg)*)> for F
        where
            F: Fn($($arg),*) + 'static,
            $($arg: ScriptType,)*
        {
            fn into_host_fn(self) -> HostFunction {
                HostFunction {
                    arity: $count,
                    invoke: Box::new(move |args: &[Object]| {
                        self($(args[$idx].as_::<$arg>()?),*);
                        Ok(None)
                    }),
                }
            }
        }

        impl<F, T, R $(, $arg)*> IntoHostMethod<T, (ValueReturn $(, $arg)*)> for F
        where
            F: Fn(&mut T, $($arg),*) -> R + 'static,
            T: ScriptType,
            R: ScriptType,
            $($arg: ScriptType,)*
        {
            fn into_host_method(self) -> Rc<dyn HostMethod<T>> {
                Rc::new(HostMethodImpl {
                    arity: $count,
                    invoke: Box::new(move |receiver: &mut T, args: &[Object]| {
                        let result = self(receiver $(, args[$idx].as_::<$arg>()?)*);
                        Ok(Some(Object::from_value(result)))
                    }),
                })
            }
        }

        impl<F, T $(, $arg)*> IntoHostMethod<T, (VoidReturn $(, $arg)*)> for F
        where
            F: Fn(&mut T, $($arg),*) + 'static,
            T: ScriptType,
            $($arg: ScriptType,)*
        {
            fn into_host_method(self) -> Rc<dyn HostMethod<T>> {
                Rc::new(HostMethodImpl {
                    arity: $count,
                    invoke: Box::new(move |receiver: &mut T, args: &[Object]| {
                        self(receiver $(, args[$idx].as_::<$arg>()?)*);
                        Ok(None)
                    }),
                })
            }
        }

        impl<F, T $(, $arg)*> IntoHostCtor<T, ($($arg,)*)> for F
        where
            F: Fn($($arg),*) -> T + 'static,
            T: ScriptType,
            $($arg: ScriptType,)*
        {
            fn into_host_ctor(self) -> HostCtor<T> {
                let build = move |args: &[Object]| -> Option<T> {
                    Some(self($(args[$idx].as_opt::<$arg>()?),*))
                };
                HostCtor {
                    arity: $count,
                    build: Rc::new(build),
                }
            }
        }

        impl<$($arg: ScriptType),*> IntoArgs for ($($arg,)*) {
            fn into_args(self) -> Vec<Object> {
                #[allow(unused_mut)]
                let mut args: Vec<Object> = Vec::new();
                $(args.push(Object::from_value(self.$idx));)*
                args
            }
        }
    };
}

impl_host_adapters!(0);
impl_host_adapters!(1, A0: 0);
impl_host_adapters!(2, A0: 0, A1: 1);
impl_host_adapters!(3, A0: 0, A1: 1, A2: 2);
impl_host_adapters!(4, A0: 0, A1: 1, A2: 2, A3: 3);
impl_host_adapters!(5, A0: 0, A1: 1, A2: 2, A3: 3, A4: 4);
impl_host_adapters!(6, A0: 0, A1: 1, A2: 2, A3: 3, A4: 4, A5: 5);
impl_host_adapters!(7, A0: 0, A1: 1, A2: 2, A3: 3, A4: 4, A5: 5, A6: 6);
impl_host_adapters!(8, A0: 0, A1: 1, A2: 2, A3: 3, A4: 4, A5: 5, A6: 6, A7: 7);
