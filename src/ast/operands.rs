//! The expression graph.
//!
//! An expression starts as a flat list of operands, one per token, with
//! `(` `)` `[` `]` kept as positional markers. [`Expression::collapse`]
//! turns the list into a single evaluable root in two phases:
//!
//! 1. **Bracket lift** - scan left to right tracking a depth counter over
//!    the markers and add `depth * (1 + max precedence)` to every operand's
//!    precedence, then erase the markers. Grouping becomes nothing more
//!    than a precedence rewrite.
//! 2. **Precedence descent** - for each precedence from the new maximum
//!    down to zero, scan left to right and let every operand at that level
//!    absorb its neighbors through its own `collapse` behavior. Binary
//!    operands absorb both sides, prefix the right, postfix the left,
//!    leaves nothing.
//!
//! Left-to-right scanning gives binary operators of equal precedence
//! left-to-right associativity, so `a.b.c` collapses as `(a.b).c`.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use crate::error::{Error, Location, Result};
use crate::function::Function;
use crate::object::{ArithKind, CompareKind, Object};
use crate::scope::Scope;

pub const PREC_ASSIGN: i32 = 0;
pub const PREC_COMPARE: i32 = 2;
pub const PREC_COMPOUND: i32 = 3;
pub const PREC_ADDITIVE: i32 = 4;
pub const PREC_MULTIPLICATIVE: i32 = 5;
pub const PREC_UNARY: i32 = 8;
pub const PREC_LEAF: i32 = 10;
pub const PREC_MEMBER: i32 = 11;

pub type OperandRef = Rc<RefCell<dyn Operand>>;

/// A node of the flat operand list, and after collapse a tree node.
pub trait Operand: Any {
    fn precedence(&self) -> i32;
    fn set_precedence(&mut self, precedence: i32);
    fn location(&self) -> Location;
    fn as_any(&self) -> &dyn Any;

    /// Depth delta for bracket markers; `None` for real operands.
    fn marker(&self) -> Option<i32> {
        None
    }

    /// True when `original`/`assign` are meaningful for this operand.
    fn is_lvalue(&self) -> bool {
        false
    }

    /// Absorbs neighbors as children; returns the indices to remove.
    fn collapse(&mut self, operands: &[OperandRef], index: usize) -> Result<Vec<usize>>;

    fn evaluate(&self, scope: &Scope) -> Result<Object>;

    /// Like `evaluate` but allowed to produce nothing; only call operands
    /// override this, so a void call can still stand as a statement.
    fn evaluate_maybe(&self, scope: &Scope) -> Result<Option<Object>> {
        self.evaluate(scope).map(Some)
    }

    /// Writes `value` through this operand, returning the written slot.
    fn assign(&self, _scope: &Scope, _value: &Object) -> Result<Object> {
        Err(Error::type_error("expression is not assignable").at(&self.location()))
    }

    /// The aliasing handle behind an lvalue, for in-place mutation.
    fn original(&self, _scope: &Scope) -> Result<Object> {
        Err(Error::type_error("expression does not refer to a storage location")
            .at(&self.location()))
    }
}

macro_rules! operand_basics {
    () => {
        fn precedence(&self) -> i32 {
            self.precedence
        }

        fn set_precedence(&mut self, precedence: i32) {
            self.precedence = precedence;
        }

        fn location(&self) -> Location {
            self.location.clone()
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    };
}

fn leaf_collapse() -> Result<Vec<usize>> {
    Ok(Vec::new())
}

fn missing_lhs(location: &Location) -> Error {
    Error::parse("syntax error: missing left-hand side").at(location)
}

fn missing_rhs(location: &Location) -> Error {
    Error::parse("syntax error: missing right-hand side").at(location)
}

fn child(slot: &Option<OperandRef>, location: &Location) -> Result<OperandRef> {
    slot.clone()
        .ok_or_else(|| Error::parse("syntax error: missing operand").at(location))
}

////////////////////////////////////////////////
// Leaves

pub struct NumberLiteral {
    value: f32,
    precedence: i32,
    location: Location,
}

impl NumberLiteral {
    pub fn new(value: f32, location: Location) -> OperandRef {
        Rc::new(RefCell::new(NumberLiteral {
            value,
            precedence: PREC_LEAF,
            location,
        }))
    }
}

impl Operand for NumberLiteral {
    operand_basics!();

    fn collapse(&mut self, _operands: &[OperandRef], _index: usize) -> Result<Vec<usize>> {
        leaf_collapse()
    }

    fn evaluate(&self, _scope: &Scope) -> Result<Object> {
        Ok(Object::from_value(self.value))
    }
}

pub struct StringLiteral {
    value: String,
    precedence: i32,
    location: Location,
}

impl StringLiteral {
    pub fn new(value: String, location: Location) -> OperandRef {
        Rc::new(RefCell::new(StringLiteral {
            value,
            precedence: PREC_LEAF,
            location,
        }))
    }
}

impl Operand for StringLiteral {
    operand_basics!();

    fn collapse(&mut self, _operands: &[OperandRef], _index: usize) -> Result<Vec<usize>> {
        leaf_collapse()
    }

    fn evaluate(&self, _scope: &Scope) -> Result<Object> {
        Ok(Object::from_value(self.value.clone()))
    }
}

pub struct CharLiteral {
    value: char,
    precedence: i32,
    location: Location,
}

impl CharLiteral {
    pub fn new(value: char, location: Location) -> OperandRef {
        Rc::new(RefCell::new(CharLiteral {
            value,
            precedence: PREC_LEAF,
            location,
        }))
    }
}

impl Operand for CharLiteral {
    operand_basics!();

    fn collapse(&mut self, _operands: &[OperandRef], _index: usize) -> Result<Vec<usize>> {
        leaf_collapse()
    }

    fn evaluate(&self, _scope: &Scope) -> Result<Object> {
        Ok(Object::from_value(self.value))
    }
}

pub struct VariableOp {
    pub name: String,
    precedence: i32,
    location: Location,
}

impl VariableOp {
    pub fn new(name: String, location: Location) -> OperandRef {
        Rc::new(RefCell::new(VariableOp {
            name,
            precedence: PREC_LEAF,
            location,
        }))
    }

    fn lookup(&self, scope: &Scope) -> Result<Object> {
        scope.find_variable(&self.name).ok_or_else(|| {
            Error::resolution(format!("cannot find \"{}\"", self.name)).at(&self.location)
        })
    }
}

impl Operand for VariableOp {
    operand_basics!();

    fn is_lvalue(&self) -> bool {
        true
    }

    fn collapse(&mut self, _operands: &[OperandRef], _index: usize) -> Result<Vec<usize>> {
        leaf_collapse()
    }

    fn evaluate(&self, scope: &Scope) -> Result<Object> {
        self.lookup(scope)
    }

    fn assign(&self, scope: &Scope, value: &Object) -> Result<Object> {
        let cell = self.lookup(scope)?;
        cell.assign(value).map_err(|e| e.at(&self.location))?;
        Ok(cell)
    }

    fn original(&self, scope: &Scope) -> Result<Object> {
        self.lookup(scope)
    }
}

/// A type name in an expression: evaluates to the type's exemplar, which
/// `new` and constructor calls consume.
pub struct TypeOp {
    pub name: String,
    exemplar: Object,
    precedence: i32,
    location: Location,
}

impl TypeOp {
    pub fn new(name: String, exemplar: Object, location: Location) -> OperandRef {
        Rc::new(RefCell::new(TypeOp {
            name,
            exemplar,
            precedence: PREC_LEAF,
            location,
        }))
    }
}

impl Operand for TypeOp {
    operand_basics!();

    fn collapse(&mut self, _operands: &[OperandRef], _index: usize) -> Result<Vec<usize>> {
        leaf_collapse()
    }

    fn evaluate(&self, _scope: &Scope) -> Result<Object> {
        Ok(self.exemplar.clone())
    }
}

pub struct FunctionCallOp {
    pub name: String,
    pub function: Function,
    pub args: Vec<Expression>,
    precedence: i32,
    location: Location,
}

impl FunctionCallOp {
    pub fn new(
        name: String,
        function: Function,
        args: Vec<Expression>,
        location: Location,
    ) -> OperandRef {
        Rc::new(RefCell::new(FunctionCallOp {
            name,
            function,
            args,
            precedence: PREC_LEAF,
            location,
        }))
    }
}

impl Operand for FunctionCallOp {
    operand_basics!();

    fn collapse(&mut self, _operands: &[OperandRef], _index: usize) -> Result<Vec<usize>> {
        leaf_collapse()
    }

    fn evaluate_maybe(&self, scope: &Scope) -> Result<Option<Object>> {
        self.function
            .run(scope, &self.args)
            .map_err(|e| e.at(&self.location))
    }

    fn evaluate(&self, scope: &Scope) -> Result<Object> {
        self.evaluate_maybe(scope)?.ok_or_else(|| {
            Error::type_error(format!(
                "function \"{}\" returns void, which cannot appear in an expression",
                self.name
            ))
            .at(&self.location)
        })
    }
}

/// `Type(args)`: constructor selection over the type's registered ctors.
pub struct ConstructOp {
    pub type_name: String,
    exemplar: Object,
    args: Vec<Expression>,
    precedence: i32,
    location: Location,
}

impl ConstructOp {
    pub fn new(
        type_name: String,
        exemplar: Object,
        args: Vec<Expression>,
        location: Location,
    ) -> OperandRef {
        Rc::new(RefCell::new(ConstructOp {
            type_name,
            exemplar,
            args,
            precedence: PREC_LEAF,
            location,
        }))
    }
}

impl Operand for ConstructOp {
    operand_basics!();

    fn collapse(&mut self, _operands: &[OperandRef], _index: usize) -> Result<Vec<usize>> {
        leaf_collapse()
    }

    fn evaluate(&self, scope: &Scope) -> Result<Object> {
        let values = self
            .args
            .iter()
            .map(|arg| arg.expect_value(scope))
            .collect::<Result<Vec<_>>>()?;
        self.exemplar
            .construct(&values)
            .map_err(|e| e.at(&self.location))
    }
}

/// The bare member name to the right of a `.`; always absorbed by the
/// member-access operand before it could collapse itself.
pub struct ObjectMemberOp {
    pub name: String,
    precedence: i32,
    location: Location,
}

impl ObjectMemberOp {
    pub fn new(name: String, location: Location) -> OperandRef {
        Rc::new(RefCell::new(ObjectMemberOp {
            name,
            precedence: PREC_LEAF,
            location,
        }))
    }
}

impl Operand for ObjectMemberOp {
    operand_basics!();

    fn collapse(&mut self, _operands: &[OperandRef], _index: usize) -> Result<Vec<usize>> {
        leaf_collapse()
    }

    fn evaluate(&self, _scope: &Scope) -> Result<Object> {
        Err(Error::parse("syntax error: member name cannot be used on its own")
            .at(&self.location))
    }
}

/// A member call to the right of a `.`, carrying the already-parsed
/// argument expressions.
pub struct MemberFunctionCallOp {
    pub name: String,
    pub args: Vec<Expression>,
    precedence: i32,
    location: Location,
}

impl MemberFunctionCallOp {
    pub fn new(name: String, args: Vec<Expression>, location: Location) -> OperandRef {
        Rc::new(RefCell::new(MemberFunctionCallOp {
            name,
            args,
            precedence: PREC_LEAF,
            location,
        }))
    }
}

impl Operand for MemberFunctionCallOp {
    operand_basics!();

    fn collapse(&mut self, _operands: &[OperandRef], _index: usize) -> Result<Vec<usize>> {
        leaf_collapse()
    }

    fn evaluate(&self, _scope: &Scope) -> Result<Object> {
        Err(Error::parse("syntax error: method call requires an object").at(&self.location))
    }
}

////////////////////////////////////////////////
// Member and element access

enum MemberKind {
    Field(String),
    Method { name: String, args: Vec<Expression> },
}

/// The `.` operand. Its right-hand side must be a member name or a member
/// call; the receiver must be an lvalue, so that the returned view cannot
/// dangle.
pub struct MemberAccessOp {
    target: Option<OperandRef>,
    member: Option<MemberKind>,
    precedence: i32,
    location: Location,
}

impl MemberAccessOp {
    pub fn new(location: Location) -> OperandRef {
        Rc::new(RefCell::new(MemberAccessOp {
            target: None,
            member: None,
            precedence: PREC_MEMBER,
            location,
        }))
    }

    fn receiver(&self, scope: &Scope) -> Result<Object> {
        let target = child(&self.target, &self.location)?;
        let receiver = target.borrow().original(scope)?;
        Ok(receiver)
    }
}

impl Operand for MemberAccessOp {
    operand_basics!();

    fn is_lvalue(&self) -> bool {
        matches!(self.member, Some(MemberKind::Field(_)))
    }

    fn collapse(&mut self, operands: &[OperandRef], index: usize) -> Result<Vec<usize>> {
        if index == 0 {
            return Err(missing_lhs(&self.location));
        }
        if index + 1 >= operands.len() {
            return Err(missing_rhs(&self.location));
        }
        self.target = Some(Rc::clone(&operands[index - 1]));
        let rhs = operands[index + 1].borrow();
        if let Some(member) = rhs.as_any().downcast_ref::<ObjectMemberOp>() {
            self.member = Some(MemberKind::Field(member.name.clone()));
        } else if let Some(call) = rhs.as_any().downcast_ref::<MemberFunctionCallOp>() {
            self.member = Some(MemberKind::Method {
                name: call.name.clone(),
                args: call.args.clone(),
            });
        } else {
            return Err(
                Error::parse("syntax error: expected a member name after \".\"")
                    .at(&self.location),
            );
        }
        Ok(vec![index - 1, index + 1])
    }

    fn evaluate_maybe(&self, scope: &Scope) -> Result<Option<Object>> {
        let receiver = self.receiver(scope)?;
        match self.member.as_ref() {
            Some(MemberKind::Field(name)) => Ok(Some(
                receiver.member(name).map_err(|e| e.at(&self.location))?,
            )),
            Some(MemberKind::Method { name, args }) => {
                let values = args
                    .iter()
                    .map(|arg| arg.expect_value(scope))
                    .collect::<Result<Vec<_>>>()?;
                receiver
                    .call_method(name, &values)
                    .map_err(|e| e.at(&self.location))
            }
            None => Err(missing_rhs(&self.location)),
        }
    }

    fn evaluate(&self, scope: &Scope) -> Result<Object> {
        self.evaluate_maybe(scope)?.ok_or_else(|| {
            let name = match self.member.as_ref() {
                Some(MemberKind::Method { name, .. }) => name.clone(),
                _ => String::new(),
            };
            Error::type_error(format!(
                "method \"{}\" returns void, which cannot appear in an expression",
                name
            ))
            .at(&self.location)
        })
    }

    fn assign(&self, scope: &Scope, value: &Object) -> Result<Object> {
        match self.member.as_ref() {
            Some(MemberKind::Field(name)) => {
                let receiver = self.receiver(scope)?;
                let view = receiver.member(name).map_err(|e| e.at(&self.location))?;
                view.assign(value).map_err(|e| e.at(&self.location))?;
                Ok(view)
            }
            _ => Err(Error::type_error("cannot assign to a method call").at(&self.location)),
        }
    }

    fn original(&self, scope: &Scope) -> Result<Object> {
        match self.member.as_ref() {
            Some(MemberKind::Field(name)) => {
                let receiver = self.receiver(scope)?;
                receiver.member(name).map_err(|e| e.at(&self.location))
            }
            _ => Err(Error::type_error("expression does not refer to a storage location")
                .at(&self.location)),
        }
    }
}

/// The `expr[index]` operand, inserted by the parser before the bracket
/// markers of an index expression.
///
/// Sits on the same level as member access so mixed postfix chains like
/// `a[0].b` and `a.b[0]` collapse left-to-right in text order.
pub struct ArrayAccessOp {
    target: Option<OperandRef>,
    index: Option<OperandRef>,
    precedence: i32,
    location: Location,
}

impl ArrayAccessOp {
    pub fn new(location: Location) -> OperandRef {
        Rc::new(RefCell::new(ArrayAccessOp {
            target: None,
            index: None,
            precedence: PREC_MEMBER,
            location,
        }))
    }

    fn index_value(&self, scope: &Scope) -> Result<i64> {
        let index = child(&self.index, &self.location)?;
        let value = index.borrow().evaluate(scope)?;
        value.as_::<i64>().map_err(|e| e.at(&self.location))
    }
}

impl Operand for ArrayAccessOp {
    operand_basics!();

    fn is_lvalue(&self) -> bool {
        true
    }

    fn collapse(&mut self, operands: &[OperandRef], index: usize) -> Result<Vec<usize>> {
        if index == 0 {
            return Err(missing_lhs(&self.location));
        }
        if index + 1 >= operands.len() {
            return Err(missing_rhs(&self.location));
        }
        self.target = Some(Rc::clone(&operands[index - 1]));
        self.index = Some(Rc::clone(&operands[index + 1]));
        Ok(vec![index - 1, index + 1])
    }

    fn evaluate(&self, scope: &Scope) -> Result<Object> {
        let target = child(&self.target, &self.location)?;
        let array = target.borrow().original(scope)?;
        let index = self.index_value(scope)?;
        array.get_element(index).map_err(|e| e.at(&self.location))
    }

    fn assign(&self, scope: &Scope, value: &Object) -> Result<Object> {
        let target = child(&self.target, &self.location)?;
        let array = target.borrow().original(scope)?;
        let index = self.index_value(scope)?;
        array
            .set_element(index, value)
            .map_err(|e| e.at(&self.location))?;
        array.get_element(index).map_err(|e| e.at(&self.location))
    }

    fn original(&self, scope: &Scope) -> Result<Object> {
        let target = child(&self.target, &self.location)?;
        let array = target.borrow().original(scope)?;
        let index = self.index_value(scope)?;
        array.element_view(index).map_err(|e| e.at(&self.location))
    }
}

////////////////////////////////////////////////
// Assignment family

pub struct AssignOp {
    lhs: Option<OperandRef>,
    rhs: Option<OperandRef>,
    precedence: i32,
    location: Location,
}

impl AssignOp {
    pub fn new(location: Location) -> OperandRef {
        Rc::new(RefCell::new(AssignOp {
            lhs: None,
            rhs: None,
            precedence: PREC_ASSIGN,
            location,
        }))
    }
}

fn collapse_assignment(
    lhs: &mut Option<OperandRef>,
    rhs: &mut Option<OperandRef>,
    operands: &[OperandRef],
    index: usize,
    location: &Location,
) -> Result<Vec<usize>> {
    if index == 0 {
        return Err(missing_lhs(location));
    }
    if index + 1 >= operands.len() {
        return Err(missing_rhs(location));
    }
    // An assignment node is not an lvalue, so chains like `a = b = 1` are
    // rejected here.
    if !operands[index - 1].borrow().is_lvalue() {
        return Err(
            Error::parse("syntax error: left-hand side is not assignable").at(location),
        );
    }
    *lhs = Some(Rc::clone(&operands[index - 1]));
    *rhs = Some(Rc::clone(&operands[index + 1]));
    Ok(vec![index - 1, index + 1])
}

impl Operand for AssignOp {
    operand_basics!();

    fn collapse(&mut self, operands: &[OperandRef], index: usize) -> Result<Vec<usize>> {
        let location = self.location.clone();
        collapse_assignment(&mut self.lhs, &mut self.rhs, operands, index, &location)
    }

    fn evaluate(&self, scope: &Scope) -> Result<Object> {
        let rhs = child(&self.rhs, &self.location)?;
        let value = rhs.borrow().evaluate(scope)?;
        let lhs = child(&self.lhs, &self.location)?;
        let result = lhs.borrow().assign(scope, &value)?;
        Ok(result)
    }
}

pub struct CompoundAssignOp {
    kind: ArithKind,
    lhs: Option<OperandRef>,
    rhs: Option<OperandRef>,
    precedence: i32,
    location: Location,
}

impl CompoundAssignOp {
    pub fn new(kind: ArithKind, location: Location) -> OperandRef {
        Rc::new(RefCell::new(CompoundAssignOp {
            kind,
            lhs: None,
            rhs: None,
            precedence: PREC_COMPOUND,
            location,
        }))
    }
}

impl Operand for CompoundAssignOp {
    operand_basics!();

    fn collapse(&mut self, operands: &[OperandRef], index: usize) -> Result<Vec<usize>> {
        let location = self.location.clone();
        collapse_assignment(&mut self.lhs, &mut self.rhs, operands, index, &location)
    }

    fn evaluate(&self, scope: &Scope) -> Result<Object> {
        let rhs = child(&self.rhs, &self.location)?;
        let value = rhs.borrow().evaluate(scope)?;
        let lhs = child(&self.lhs, &self.location)?;
        let target = lhs.borrow().original(scope)?;
        target
            .arith_assign(self.kind, &value)
            .map_err(|e| e.at(&self.location))?;
        Ok(target)
    }
}

////////////////////////////////////////////////
// Arithmetic and comparison

pub struct BinaryArithOp {
    kind: ArithKind,
    a: Option<OperandRef>,
    b: Option<OperandRef>,
    precedence: i32,
    location: Location,
}

impl BinaryArithOp {
    pub fn new(kind: ArithKind, location: Location) -> OperandRef {
        let precedence = match kind {
            ArithKind::Add | ArithKind::Sub => PREC_ADDITIVE,
            ArithKind::Mul | ArithKind::Div => PREC_MULTIPLICATIVE,
        };
        Rc::new(RefCell::new(BinaryArithOp {
            kind,
            a: None,
            b: None,
            precedence,
            location,
        }))
    }
}

fn collapse_binary(
    a: &mut Option<OperandRef>,
    b: &mut Option<OperandRef>,
    operands: &[OperandRef],
    index: usize,
    location: &Location,
) -> Result<Vec<usize>> {
    if index == 0 {
        return Err(missing_lhs(location));
    }
    if index + 1 >= operands.len() {
        return Err(missing_rhs(location));
    }
    *a = Some(Rc::clone(&operands[index - 1]));
    *b = Some(Rc::clone(&operands[index + 1]));
    Ok(vec![index - 1, index + 1])
}

impl Operand for BinaryArithOp {
    operand_basics!();

    fn collapse(&mut self, operands: &[OperandRef], index: usize) -> Result<Vec<usize>> {
        let location = self.location.clone();
        collapse_binary(&mut self.a, &mut self.b, operands, index, &location)
    }

    fn evaluate(&self, scope: &Scope) -> Result<Object> {
        let a = child(&self.a, &self.location)?;
        let b = child(&self.b, &self.location)?;
        let lhs = a.borrow().evaluate(scope)?;
        let rhs = b.borrow().evaluate(scope)?;
        lhs.arith(self.kind, &rhs).map_err(|e| e.at(&self.location))
    }
}

pub struct CompareOp {
    kind: CompareKind,
    a: Option<OperandRef>,
    b: Option<OperandRef>,
    precedence: i32,
    location: Location,
}

impl CompareOp {
    pub fn new(kind: CompareKind, location: Location) -> OperandRef {
        Rc::new(RefCell::new(CompareOp {
            kind,
            a: None,
            b: None,
            precedence: PREC_COMPARE,
            location,
        }))
    }
}

impl Operand for CompareOp {
    operand_basics!();

    fn collapse(&mut self, operands: &[OperandRef], index: usize) -> Result<Vec<usize>> {
        let location = self.location.clone();
        collapse_binary(&mut self.a, &mut self.b, operands, index, &location)
    }

    fn evaluate(&self, scope: &Scope) -> Result<Object> {
        let a = child(&self.a, &self.location)?;
        let b = child(&self.b, &self.location)?;
        let lhs = a.borrow().evaluate(scope)?;
        let rhs = b.borrow().evaluate(scope)?;
        lhs.compare(self.kind, &rhs)
            .map_err(|e| e.at(&self.location))
    }
}

////////////////////////////////////////////////
// Unary operators

pub struct NegateOp {
    operand: Option<OperandRef>,
    precedence: i32,
    location: Location,
}

impl NegateOp {
    pub fn new(location: Location) -> OperandRef {
        Rc::new(RefCell::new(NegateOp {
            operand: None,
            precedence: PREC_UNARY,
            location,
        }))
    }
}

fn collapse_prefix(
    slot: &mut Option<OperandRef>,
    operands: &[OperandRef],
    index: usize,
    location: &Location,
) -> Result<Vec<usize>> {
    if index + 1 >= operands.len() {
        return Err(missing_rhs(location));
    }
    *slot = Some(Rc::clone(&operands[index + 1]));
    Ok(vec![index + 1])
}

impl Operand for NegateOp {
    operand_basics!();

    fn collapse(&mut self, operands: &[OperandRef], index: usize) -> Result<Vec<usize>> {
        let location = self.location.clone();
        collapse_prefix(&mut self.operand, operands, index, &location)
    }

    fn evaluate(&self, scope: &Scope) -> Result<Object> {
        let operand = child(&self.operand, &self.location)?;
        let value = operand.borrow().evaluate(scope)?;
        value.neg().map_err(|e| e.at(&self.location))
    }
}

/// The `new` operator: evaluates its operand (usually a type exemplar)
/// and allocates one copy behind a pointer-typed object.
pub struct NewOp {
    operand: Option<OperandRef>,
    precedence: i32,
    location: Location,
}

impl NewOp {
    pub fn new(location: Location) -> OperandRef {
        Rc::new(RefCell::new(NewOp {
            operand: None,
            precedence: PREC_UNARY,
            location,
        }))
    }
}

impl Operand for NewOp {
    operand_basics!();

    fn collapse(&mut self, operands: &[OperandRef], index: usize) -> Result<Vec<usize>> {
        let location = self.location.clone();
        collapse_prefix(&mut self.operand, operands, index, &location)
    }

    fn evaluate(&self, scope: &Scope) -> Result<Object> {
        let operand = child(&self.operand, &self.location)?;
        let value = operand.borrow().evaluate(scope)?;
        value.alloc().map_err(|e| e.at(&self.location))
    }
}

/// Pre/post increment and decrement; the parser decides fixity from the
/// previous token.
pub struct IncDecOp {
    dec: bool,
    postfix: bool,
    operand: Option<OperandRef>,
    precedence: i32,
    location: Location,
}

impl IncDecOp {
    pub fn new(dec: bool, postfix: bool, location: Location) -> OperandRef {
        Rc::new(RefCell::new(IncDecOp {
            dec,
            postfix,
            operand: None,
            precedence: PREC_UNARY,
            location,
        }))
    }
}

impl Operand for IncDecOp {
    operand_basics!();

    fn collapse(&mut self, operands: &[OperandRef], index: usize) -> Result<Vec<usize>> {
        let absorbed = if self.postfix {
            if index == 0 {
                return Err(missing_lhs(&self.location));
            }
            index - 1
        } else {
            if index + 1 >= operands.len() {
                return Err(missing_rhs(&self.location));
            }
            index + 1
        };
        if !operands[absorbed].borrow().is_lvalue() {
            let symbol = if self.dec { "--" } else { "++" };
            return Err(Error::parse(format!(
                "syntax error: operand of \"{}\" must be assignable",
                symbol
            ))
            .at(&self.location));
        }
        self.operand = Some(Rc::clone(&operands[absorbed]));
        Ok(vec![absorbed])
    }

    fn evaluate(&self, scope: &Scope) -> Result<Object> {
        let operand = child(&self.operand, &self.location)?;
        let target = operand.borrow().original(scope)?;
        if self.postfix {
            let prior = target.snapshot().map_err(|e| e.at(&self.location))?;
            target.step(self.dec).map_err(|e| e.at(&self.location))?;
            Ok(prior)
        } else {
            target.step(self.dec).map_err(|e| e.at(&self.location))?;
            Ok(target)
        }
    }
}

////////////////////////////////////////////////
// Markers

/// Positional `(` `)` `[` `]` marker; erased during the bracket lift.
pub struct MarkerOp {
    delta: i32,
    location: Location,
}

impl MarkerOp {
    pub fn open(location: Location) -> OperandRef {
        Rc::new(RefCell::new(MarkerOp { delta: 1, location }))
    }

    pub fn close(location: Location) -> OperandRef {
        Rc::new(RefCell::new(MarkerOp { delta: -1, location }))
    }
}

impl Operand for MarkerOp {
    fn precedence(&self) -> i32 {
        0
    }

    fn set_precedence(&mut self, _precedence: i32) {}

    fn location(&self) -> Location {
        self.location.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn marker(&self) -> Option<i32> {
        Some(self.delta)
    }

    fn collapse(&mut self, _operands: &[OperandRef], _index: usize) -> Result<Vec<usize>> {
        Err(Error::parse("syntax error: unmatched bracket").at(&self.location))
    }

    fn evaluate(&self, _scope: &Scope) -> Result<Object> {
        Err(Error::parse("syntax error: unmatched bracket").at(&self.location))
    }
}

////////////////////////////////////////////////
// Expression

/// A flat operand sequence before collapse; afterwards empty (yields
/// nothing) or a single root.
#[derive(Clone)]
pub struct Expression {
    pub operands: Vec<OperandRef>,
    pub location: Location,
}

impl Expression {
    pub fn new(location: Location) -> Expression {
        Expression {
            operands: Vec::new(),
            location,
        }
    }

    /// Reduces the operand list to at most one root. Called once by the
    /// parser; the expression is structurally immutable afterwards.
    pub fn collapse(&mut self) -> Result<()> {
        self.lift_brackets()?;

        let highest = self
            .operands
            .iter()
            .map(|operand| operand.borrow().precedence())
            .max()
            .unwrap_or(0);

        for precedence in (0..=highest).rev() {
            let mut i = 0;
            while i < self.operands.len() {
                let matches = self.operands[i].borrow().precedence() == precedence;
                if matches {
                    let mut removed = {
                        let operand = Rc::clone(&self.operands[i]);
                        let mut operand = operand.borrow_mut();
                        operand.collapse(&self.operands, i)?
                    };
                    removed.sort_unstable_by(|a, b| b.cmp(a));
                    for index in removed {
                        assert!(index < self.operands.len(), "collapse index out of range");
                        self.operands.remove(index);
                        if index <= i {
                            i -= 1;
                        }
                    }
                }
                i += 1;
            }
        }

        if self.operands.len() > 1 {
            let location = self.operands[1].borrow().location();
            return Err(
                Error::parse("syntax error: expected an operator between operands").at(&location),
            );
        }
        Ok(())
    }

    /// Phase one: turn grouping into precedence. Every operand inside
    /// brackets gets `depth * (1 + max precedence)` added, then the
    /// markers disappear.
    fn lift_brackets(&mut self) -> Result<()> {
        let highest = self
            .operands
            .iter()
            .map(|operand| operand.borrow().precedence())
            .max()
            .unwrap_or(0);
        let lift = highest + 1;

        let mut depth = 0;
        let mut open_locations: Vec<Location> = Vec::new();
        let mut marker_indices = Vec::new();
        for (i, operand) in self.operands.iter().enumerate() {
            let operand_ref = operand.borrow();
            match operand_ref.marker() {
                Some(delta) => {
                    depth += delta;
                    if delta > 0 {
                        open_locations.push(operand_ref.location());
                    } else {
                        if depth < 0 {
                            return Err(Error::parse("syntax error: unmatched closing bracket")
                                .at(&operand_ref.location()));
                        }
                        open_locations.pop();
                    }
                    marker_indices.push(i);
                }
                None => {
                    let precedence = operand_ref.precedence();
                    drop(operand_ref);
                    operand
                        .borrow_mut()
                        .set_precedence(precedence + depth * lift);
                }
            }
        }
        if depth != 0 {
            let location = open_locations.pop().unwrap_or_else(|| self.location.clone());
            return Err(Error::parse("syntax error: unmatched opening bracket").at(&location));
        }

        for index in marker_indices.into_iter().rev() {
            self.operands.remove(index);
        }
        Ok(())
    }

    /// Evaluates the collapsed expression; an empty expression yields
    /// nothing.
    pub fn evaluate(&self, scope: &Scope) -> Result<Option<Object>> {
        match self.operands.len() {
            0 => Ok(None),
            1 => self.operands[0].borrow().evaluate_maybe(scope),
            _ => unreachable!("expression evaluated before collapse"),
        }
    }

    pub fn expect_value(&self, scope: &Scope) -> Result<Object> {
        self.evaluate(scope)?.ok_or_else(|| {
            Error::type_error("expression does not produce a value").at(&self.location)
        })
    }

    pub fn expect_bool(&self, scope: &Scope) -> Result<bool> {
        self.expect_value(scope)?
            .as_::<bool>()
            .map_err(|e| e.at(&self.location))
    }

    /// The single root operand, if the expression is non-empty.
    pub fn root(&self) -> Option<OperandRef> {
        self.operands.first().cloned()
    }
}
