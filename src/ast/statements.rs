use std::rc::Rc;

use crate::ast::operands::Expression;
use crate::error::Location;
use crate::function::Function;
use crate::object::Object;
use crate::scope::Scope;

/// A resolved call to a named function, with unevaluated argument
/// expressions.
pub struct FunctionCall {
    pub function: Function,
    pub arguments: Vec<Expression>,
    pub location: Location,
}

/// One executable step of a scope.
pub enum Statement {
    /// Bare expression; `;` alone is an empty one.
    Expression(Expression),
    /// `Type name;` / `Type name = expr;` - creates a fresh cell from the
    /// type exemplar on every execution, so loop bodies re-bind.
    Declaration {
        name: String,
        exemplar: Object,
        init: Option<Expression>,
        location: Location,
    },
    /// A braced block.
    Scope(Rc<Scope>),
    /// A statement that is exactly one free-function call.
    Call(FunctionCall),
    Return {
        value: Option<Expression>,
        location: Location,
    },
    Break {
        location: Location,
    },
    /// `if` / `else if` ... / `else`: one action more than conditions when
    /// a trailing `else` exists.
    IfElseChain {
        conditions: Vec<Expression>,
        actions: Vec<Rc<Scope>>,
    },
    /// `for (init; condition; updation) body` - `inner` holds the loop
    /// variable; `body` is its child.
    For {
        init: Box<Statement>,
        condition: Expression,
        updation: Expression,
        inner: Rc<Scope>,
        body: Rc<Scope>,
    },
    While {
        condition: Expression,
        body: Rc<Scope>,
    },
}
