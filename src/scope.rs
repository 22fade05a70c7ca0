//! Scopes and statement execution.
//!
//! A scope is an ordered statement list plus the name maps (types,
//! variables, functions) and a parent link; lookups walk outward. Control
//! flow signals (`return`, `break`) are not errors: they travel as a
//! [`Flow`] value through every statement and scope run, loops absorb
//! `Broke`, function boundaries absorb `Returned`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use crate::ast::statements::Statement;
use crate::error::{Error, Result};
use crate::function::Function;
use crate::object::Object;

/// Outcome of running a statement or a scope.
pub enum Flow {
    Normal,
    Returned(Option<Object>),
    Broke,
}

pub struct Scope {
    parent: RefCell<Weak<Scope>>,
    pub statements: RefCell<Vec<Statement>>,
    pub types: RefCell<HashMap<String, Object>>,
    pub variables: RefCell<HashMap<String, Object>>,
    pub functions: RefCell<HashMap<String, Function>>,
}

impl Scope {
    fn empty() -> Scope {
        Scope {
            parent: RefCell::new(Weak::new()),
            statements: RefCell::new(Vec::new()),
            types: RefCell::new(HashMap::new()),
            variables: RefCell::new(HashMap::new()),
            functions: RefCell::new(HashMap::new()),
        }
    }

    /// A root scope with the built-in primitive types registered.
    pub fn root() -> Rc<Scope> {
        let scope = Rc::new(Scope::empty());
        {
            let mut types = scope.types.borrow_mut();
            types.insert("int".to_string(), Object::from_value(0i32));
            types.insert("int8_t".to_string(), Object::from_value(0i8));
            types.insert("int16_t".to_string(), Object::from_value(0i16));
            types.insert("int64_t".to_string(), Object::from_value(0i64));
            types.insert("uint8_t".to_string(), Object::from_value(0u8));
            types.insert("uint16_t".to_string(), Object::from_value(0u16));
            types.insert("uint32_t".to_string(), Object::from_value(0u32));
            types.insert("uint64_t".to_string(), Object::from_value(0u64));
            types.insert("float".to_string(), Object::from_value(0f32));
            types.insert("double".to_string(), Object::from_value(0f64));
            types.insert("bool".to_string(), Object::from_value(false));
            types.insert("char".to_string(), Object::from_value('\0'));
            types.insert("string".to_string(), Object::from_value(String::new()));
            types.insert("void".to_string(), Object::void());
        }
        scope
    }

    pub fn child(parent: &Rc<Scope>) -> Rc<Scope> {
        let scope = Rc::new(Scope::empty());
        *scope.parent.borrow_mut() = Rc::downgrade(parent);
        scope
    }

    fn parent(&self) -> Option<Rc<Scope>> {
        self.parent.borrow().upgrade()
    }

    pub fn find_type(&self, name: &str) -> Option<Object> {
        self.types
            .borrow()
            .get(name)
            .cloned()
            .or_else(|| self.parent().and_then(|p| p.find_type(name)))
    }

    pub fn find_variable(&self, name: &str) -> Option<Object> {
        self.variables
            .borrow()
            .get(name)
            .cloned()
            .or_else(|| self.parent().and_then(|p| p.find_variable(name)))
    }

    pub fn find_function(&self, name: &str) -> Option<Function> {
        self.functions
            .borrow()
            .get(name)
            .cloned()
            .or_else(|| self.parent().and_then(|p| p.find_function(name)))
    }

    pub fn declare_variable(&self, name: &str, cell: Object) {
        self.variables.borrow_mut().insert(name.to_string(), cell);
    }

    /// Runs every statement in order, re-raising control-flow signals to
    /// the enclosing loop or function.
    pub fn run(&self) -> Result<Flow> {
        let statements = self.statements.borrow();
        for statement in statements.iter() {
            match statement.run(self)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }
}

impl Statement {
    pub fn run(&self, scope: &Scope) -> Result<Flow> {
        match self {
            Statement::Expression(expression) => {
                expression.evaluate(scope)?;
                Ok(Flow::Normal)
            }
            Statement::Declaration {
                name,
                exemplar,
                init,
                location,
            } => {
                let cell = exemplar.snapshot().map_err(|e| e.at(location))?;
                if let Some(init) = init {
                    let value = init.expect_value(scope)?;
                    cell.assign(&value).map_err(|e| e.at(location))?;
                }
                scope.declare_variable(name, cell);
                Ok(Flow::Normal)
            }
            Statement::Scope(inner) => inner.run(),
            Statement::Call(call) => {
                call.function
                    .run(scope, &call.arguments)
                    .map_err(|e| e.at(&call.location))?;
                Ok(Flow::Normal)
            }
            Statement::Return { value, .. } => {
                let result = match value {
                    Some(expression) => expression.evaluate(scope)?,
                    None => None,
                };
                Ok(Flow::Returned(result))
            }
            Statement::Break { .. } => Ok(Flow::Broke),
            Statement::IfElseChain {
                conditions,
                actions,
            } => {
                for (condition, action) in conditions.iter().zip(actions) {
                    if condition.expect_bool(scope)? {
                        return action.run();
                    }
                }
                if actions.len() == conditions.len() + 1 {
                    return actions.last().expect("else action").run();
                }
                Ok(Flow::Normal)
            }
            Statement::For {
                init,
                condition,
                updation,
                inner,
                body,
            } => {
                init.run(inner)?;
                loop {
                    if !condition.expect_bool(inner)? {
                        break;
                    }
                    match body.run()? {
                        Flow::Normal => {}
                        Flow::Broke => break,
                        flow @ Flow::Returned(_) => return Ok(flow),
                    }
                    updation.evaluate(inner)?;
                }
                Ok(Flow::Normal)
            }
            Statement::While { condition, body } => {
                loop {
                    if !condition.expect_bool(scope)? {
                        break;
                    }
                    match body.run()? {
                        Flow::Normal => {}
                        Flow::Broke => break,
                        flow @ Flow::Returned(_) => return Ok(flow),
                    }
                }
                Ok(Flow::Normal)
            }
        }
    }
}

/// A `break` that reached the outermost scope without a loop to catch it.
pub fn unhandled_break_error() -> Error {
    Error::runtime("\"break\" outside of a loop")
}
