//! The statement parser.
//!
//! Consumes the token stream and fills scopes with statements, variable
//! and type registrations, and function definitions. Expressions are not
//! parsed into trees here: the parser emits a flat operand list (brackets
//! included as markers, one marker per token) and lets
//! [`Expression::collapse`] do the structural work.
//!
//! Keywords arrive as plain identifier tokens; this is where they gain
//! meaning. Control-flow bodies accept either a braced scope or a single
//! inline statement.

use std::collections::BTreeMap;
use std::rc::Rc;

use crate::ast::operands::{
    ArrayAccessOp, AssignOp, BinaryArithOp, CharLiteral, CompareOp, CompoundAssignOp, ConstructOp,
    Expression, FunctionCallOp, IncDecOp, MarkerOp, MemberAccessOp, MemberFunctionCallOp,
    NegateOp, NewOp, NumberLiteral, ObjectMemberOp, StringLiteral, TypeOp, VariableOp,
};
use crate::ast::statements::{FunctionCall, Statement};
use crate::ast::tokens::{Token, TokenKind};
use crate::error::{Error, Result};
use crate::function::{Function, ScriptFunction};
use crate::object::{ArithKind, CompareKind, Object, ScriptValue};
use crate::scope::Scope;

fn describe(token: &Token) -> String {
    if token.is(TokenKind::IDENTIFIER) {
        format!("\"{}\"", token.text)
    } else {
        token.kind.name().to_string()
    }
}

/// True when the previous token ends an operand, which makes a following
/// `+`/`-` binary and a following `++`/`--` postfix.
fn ends_operand(prev: Option<TokenKind>) -> bool {
    match prev {
        Some(kind) => kind.is(
            TokenKind::NUMBER
                | TokenKind::STRING
                | TokenKind::CHAR
                | TokenKind::IDENTIFIER
                | TokenKind::RIGHT_PAREN
                | TokenKind::RIGHT_BRACKET,
        ),
        None => false,
    }
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Parser {
        assert!(
            tokens.last().map(|t| t.is(TokenKind::EOF)).unwrap_or(false),
            "token stream must end with Eof"
        );
        Parser { tokens, pos: 0 }
    }

    /// Parses every top-level statement into `root`.
    pub fn parse_into(&mut self, root: &Rc<Scope>) -> Result<()> {
        self.parse_scope_body(root)?;
        let token = self.peek().clone();
        if !token.is(TokenKind::EOF) {
            return Err(
                Error::parse(format!("unexpected {}", describe(&token))).at(&token.location)
            );
        }
        Ok(())
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn peek_at(&self, offset: usize) -> &Token {
        self.tokens
            .get(self.pos + offset)
            .unwrap_or_else(|| self.tokens.last().expect("token stream is never empty"))
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].clone();
        if !token.is(TokenKind::EOF) {
            self.pos += 1;
        }
        token
    }

    fn matches(&mut self, mask: TokenKind) -> Option<Token> {
        if self.peek().is(mask) {
            Some(self.advance())
        } else {
            None
        }
    }

    fn expect(&mut self, mask: TokenKind) -> Result<Token> {
        if self.peek().is(mask) {
            Ok(self.advance())
        } else {
            let token = self.peek();
            Err(Error::parse(format!(
                "expected {}, got {}",
                mask.name(),
                describe(token)
            ))
            .at(&token.location))
        }
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        let token = self.peek();
        token.is(TokenKind::IDENTIFIER) && token.text == keyword
    }

    fn parse_scope_body(&mut self, scope: &Rc<Scope>) -> Result<()> {
        loop {
            if self.peek().is(TokenKind::EOF | TokenKind::RIGHT_BRACE) {
                break;
            }
            if let Some(statement) = self.parse_statement(scope)? {
                scope.statements.borrow_mut().push(statement);
            }
        }
        Ok(())
    }

    /// One statement; `None` for constructs that only register things
    /// (function and struct definitions).
    fn parse_statement(&mut self, scope: &Rc<Scope>) -> Result<Option<Statement>> {
        let token = self.peek().clone();

        if token.is(TokenKind::SEMICOLON) {
            self.advance();
            return Ok(Some(Statement::Expression(Expression::new(token.location))));
        }

        if token.is(TokenKind::LEFT_BRACE) {
            self.advance();
            let inner = Scope::child(scope);
            self.parse_scope_body(&inner)?;
            self.expect(TokenKind::RIGHT_BRACE)?;
            return Ok(Some(Statement::Scope(inner)));
        }

        if token.is(TokenKind::IDENTIFIER) {
            match token.text.as_str() {
                "if" => return self.parse_if(scope).map(Some),
                "while" => return self.parse_while(scope).map(Some),
                "for" => return self.parse_for(scope).map(Some),
                "return" => return self.parse_return(scope).map(Some),
                "break" => {
                    self.advance();
                    self.expect(TokenKind::SEMICOLON)?;
                    return Ok(Some(Statement::Break {
                        location: token.location,
                    }));
                }
                "struct" => {
                    self.parse_struct(scope)?;
                    return Ok(None);
                }
                _ => {}
            }

            if scope.find_type(&token.text).is_some()
                && self.peek_at(1).is(TokenKind::IDENTIFIER)
            {
                if self.peek_at(2).is(TokenKind::LEFT_PAREN) {
                    self.parse_function(scope)?;
                    return Ok(None);
                }
                return self.parse_declaration(scope).map(Some);
            }
        }

        self.parse_expression_statement(scope).map(Some)
    }

    fn parse_declaration(&mut self, scope: &Rc<Scope>) -> Result<Statement> {
        let type_token = self.advance();
        let exemplar = scope
            .find_type(&type_token.text)
            .expect("declaration type was checked by the caller");
        if exemplar.is_void() {
            return Err(
                Error::parse("cannot declare a variable of type \"void\"").at(&type_token.location)
            );
        }
        let name_token = self.expect(TokenKind::IDENTIFIER)?;

        // reserve the name now so the initializer and following
        // expressions resolve it
        let parse_cell = exemplar.snapshot().map_err(|e| e.at(&name_token.location))?;
        scope.declare_variable(&name_token.text, parse_cell);

        let init = if self.matches(TokenKind::ASSIGN).is_some() {
            Some(self.parse_expression(scope, TokenKind::SEMICOLON)?)
        } else {
            None
        };
        self.expect(TokenKind::SEMICOLON)?;
        Ok(Statement::Declaration {
            name: name_token.text,
            exemplar,
            init,
            location: name_token.location,
        })
    }

    fn parse_if(&mut self, scope: &Rc<Scope>) -> Result<Statement> {
        self.advance();
        let mut conditions = Vec::new();
        let mut actions = Vec::new();

        self.expect(TokenKind::LEFT_PAREN)?;
        let condition = self.parse_expression(scope, TokenKind::RIGHT_PAREN)?;
        self.expect(TokenKind::RIGHT_PAREN)?;
        conditions.push(condition);
        actions.push(self.parse_body(scope)?);

        while self.peek_keyword("else") {
            let else_if = {
                let next = self.peek_at(1);
                next.is(TokenKind::IDENTIFIER) && next.text == "if"
            };
            if else_if {
                self.advance();
                self.advance();
                self.expect(TokenKind::LEFT_PAREN)?;
                let condition = self.parse_expression(scope, TokenKind::RIGHT_PAREN)?;
                self.expect(TokenKind::RIGHT_PAREN)?;
                conditions.push(condition);
                actions.push(self.parse_body(scope)?);
            } else {
                self.advance();
                actions.push(self.parse_body(scope)?);
                break;
            }
        }

        Ok(Statement::IfElseChain {
            conditions,
            actions,
        })
    }

    fn parse_while(&mut self, scope: &Rc<Scope>) -> Result<Statement> {
        self.advance();
        self.expect(TokenKind::LEFT_PAREN)?;
        let condition = self.parse_expression(scope, TokenKind::RIGHT_PAREN)?;
        self.expect(TokenKind::RIGHT_PAREN)?;
        let body = self.parse_body(scope)?;
        Ok(Statement::While { condition, body })
    }

    fn parse_for(&mut self, scope: &Rc<Scope>) -> Result<Statement> {
        self.advance();
        self.expect(TokenKind::LEFT_PAREN)?;
        let inner = Scope::child(scope);

        let init = if self.peek().is(TokenKind::SEMICOLON) {
            let location = self.advance().location;
            Statement::Expression(Expression::new(location))
        } else if self.peek().is(TokenKind::IDENTIFIER)
            && inner.find_type(&self.peek().text).is_some()
            && self.peek_at(1).is(TokenKind::IDENTIFIER)
        {
            self.parse_declaration(&inner)?
        } else {
            let expression = self.parse_expression(&inner, TokenKind::SEMICOLON)?;
            self.expect(TokenKind::SEMICOLON)?;
            Statement::Expression(expression)
        };

        let condition = self.parse_expression(&inner, TokenKind::SEMICOLON)?;
        self.expect(TokenKind::SEMICOLON)?;
        let updation = self.parse_expression(&inner, TokenKind::RIGHT_PAREN)?;
        self.expect(TokenKind::RIGHT_PAREN)?;
        let body = self.parse_body(&inner)?;

        Ok(Statement::For {
            init: Box::new(init),
            condition,
            updation,
            inner,
            body,
        })
    }

    fn parse_return(&mut self, scope: &Rc<Scope>) -> Result<Statement> {
        let token = self.advance();
        let value = if self.peek().is(TokenKind::SEMICOLON) {
            None
        } else {
            Some(self.parse_expression(scope, TokenKind::SEMICOLON)?)
        };
        self.expect(TokenKind::SEMICOLON)?;
        Ok(Statement::Return {
            value,
            location: token.location,
        })
    }

    /// A control-flow body: a braced scope or one inline statement.
    fn parse_body(&mut self, parent: &Rc<Scope>) -> Result<Rc<Scope>> {
        let body = Scope::child(parent);
        if self.matches(TokenKind::LEFT_BRACE).is_some() {
            self.parse_scope_body(&body)?;
            self.expect(TokenKind::RIGHT_BRACE)?;
        } else if let Some(statement) = self.parse_statement(&body)? {
            body.statements.borrow_mut().push(statement);
        }
        Ok(body)
    }

    /// `RetType name(T a, U b) { ... }`. The function registers before its
    /// body parses so recursive references resolve.
    fn parse_function(&mut self, scope: &Rc<Scope>) -> Result<()> {
        let return_token = self.advance();
        let return_exemplar = scope
            .find_type(&return_token.text)
            .expect("function return type was checked by the caller");
        let return_type = if return_exemplar.is_void() {
            None
        } else {
            Some(return_exemplar)
        };

        let name_token = self.expect(TokenKind::IDENTIFIER)?;
        if scope.functions.borrow().contains_key(&name_token.text) {
            return Err(Error::parse(format!(
                "function \"{}\" is already defined",
                name_token.text
            ))
            .at(&name_token.location));
        }

        self.expect(TokenKind::LEFT_PAREN)?;
        let definition = Scope::child(scope);
        let mut parameters = Vec::new();
        if !self.peek().is(TokenKind::RIGHT_PAREN) {
            loop {
                let type_token = self.expect(TokenKind::IDENTIFIER)?;
                let exemplar = scope.find_type(&type_token.text).ok_or_else(|| {
                    Error::resolution(format!("cannot find type \"{}\"", type_token.text))
                        .at(&type_token.location)
                })?;
                if exemplar.is_void() {
                    return Err(Error::parse("cannot declare a parameter of type \"void\"")
                        .at(&type_token.location));
                }
                let param_token = self.expect(TokenKind::IDENTIFIER)?;
                let cell = exemplar.snapshot().map_err(|e| e.at(&param_token.location))?;
                definition.declare_variable(&param_token.text, cell);
                parameters.push(param_token.text);
                if self.matches(TokenKind::COMMA).is_none() {
                    break;
                }
            }
        }
        self.expect(TokenKind::RIGHT_PAREN)?;

        let function = Function::script(ScriptFunction {
            return_type,
            parameters,
            definition: Rc::clone(&definition),
        });
        scope
            .functions
            .borrow_mut()
            .insert(name_token.text.clone(), function);

        self.expect(TokenKind::LEFT_BRACE)?;
        self.parse_scope_body(&definition)?;
        self.expect(TokenKind::RIGHT_BRACE)?;
        Ok(())
    }

    /// Scans ahead over a struct body and registers its member
    /// declarations before any method body parses, so a method may use a
    /// member declared below it.
    fn predeclare_struct_members(&self, body: &Rc<Scope>) -> Result<()> {
        let mut depth = 0usize;
        let mut i = self.pos;
        loop {
            let token = match self.tokens.get(i) {
                Some(token) if !token.is(TokenKind::EOF) => token,
                _ => break,
            };
            if token.is(TokenKind::LEFT_BRACE) {
                depth += 1;
            } else if token.is(TokenKind::RIGHT_BRACE) {
                if depth == 0 {
                    break;
                }
                depth -= 1;
            } else if depth == 0
                && token.is(TokenKind::IDENTIFIER)
                && self.tokens.get(i + 1).map(|t| t.is(TokenKind::IDENTIFIER)) == Some(true)
                && self
                    .tokens
                    .get(i + 2)
                    .map(|t| t.is(TokenKind::SEMICOLON | TokenKind::ASSIGN))
                    == Some(true)
            {
                if let Some(exemplar) = body.find_type(&token.text) {
                    if !exemplar.is_void() {
                        let name_token = &self.tokens[i + 1];
                        let cell = exemplar.snapshot().map_err(|e| e.at(&name_token.location))?;
                        body.declare_variable(&name_token.text, cell);
                    }
                }
            }
            i += 1;
        }
        Ok(())
    }

    /// `struct Name { declarations and methods };` registers a script type
    /// whose exemplar carries zero-initialized members and the method
    /// functions.
    fn parse_struct(&mut self, scope: &Rc<Scope>) -> Result<()> {
        self.advance();
        let name_token = self.expect(TokenKind::IDENTIFIER)?;
        self.expect(TokenKind::LEFT_BRACE)?;
        let body = Scope::child(scope);
        self.predeclare_struct_members(&body)?;
        self.parse_scope_body(&body)?;
        self.expect(TokenKind::RIGHT_BRACE)?;
        self.expect(TokenKind::SEMICOLON)?;

        let mut members = BTreeMap::new();
        for (name, cell) in body.variables.borrow().iter() {
            members.insert(
                name.clone(),
                cell.snapshot().map_err(|e| e.at(&name_token.location))?,
            );
        }
        let methods: BTreeMap<String, Function> = body
            .functions
            .borrow()
            .iter()
            .map(|(name, function)| (name.clone(), function.clone()))
            .collect();

        let exemplar = Object::from_script(ScriptValue {
            type_name: name_token.text.clone(),
            members,
            methods,
            lexical: Some(Rc::clone(&body)),
        });
        scope.types.borrow_mut().insert(name_token.text, exemplar);
        Ok(())
    }

    fn parse_expression_statement(&mut self, scope: &Rc<Scope>) -> Result<Statement> {
        let expression = self.parse_expression(scope, TokenKind::SEMICOLON)?;
        self.expect(TokenKind::SEMICOLON)?;

        if let Some(root) = expression.root() {
            let root_ref = root.borrow();
            if let Some(call) = root_ref.as_any().downcast_ref::<FunctionCallOp>() {
                return Ok(Statement::Call(FunctionCall {
                    function: call.function.clone(),
                    arguments: call.args.clone(),
                    location: root_ref.location(),
                }));
            }
        }
        Ok(Statement::Expression(expression))
    }

    /// Argument list after a consumed `(`; consumes the closing `)`.
    fn parse_call_args(&mut self, scope: &Rc<Scope>) -> Result<Vec<Expression>> {
        let mut args = Vec::new();
        if self.matches(TokenKind::RIGHT_PAREN).is_some() {
            return Ok(args);
        }
        loop {
            let arg =
                self.parse_expression(scope, TokenKind::COMMA | TokenKind::RIGHT_PAREN)?;
            if arg.operands.is_empty() {
                return Err(Error::parse("expected an expression").at(&arg.location));
            }
            args.push(arg);
            if self.matches(TokenKind::COMMA).is_some() {
                continue;
            }
            self.expect(TokenKind::RIGHT_PAREN)?;
            break;
        }
        Ok(args)
    }

    /// Builds the flat operand list, one operand per token (markers
    /// included), and collapses it. Stops before any token of
    /// `terminators` at bracket depth zero.
    fn parse_expression(
        &mut self,
        scope: &Rc<Scope>,
        terminators: TokenKind,
    ) -> Result<Expression> {
        let mut expression = Expression::new(self.peek().location.clone());
        let mut depth: i32 = 0;
        let mut prev: Option<TokenKind> = None;

        loop {
            let token = self.peek().clone();
            if depth == 0 && token.is(terminators) {
                break;
            }
            if token.is(TokenKind::EOF) {
                return Err(Error::parse("unexpected end of input").at(&token.location));
            }

            if token.is(TokenKind::NUMBER) {
                self.advance();
                expression
                    .operands
                    .push(NumberLiteral::new(token.value, token.location));
                prev = Some(TokenKind::NUMBER);
            } else if token.is(TokenKind::STRING) {
                self.advance();
                expression
                    .operands
                    .push(StringLiteral::new(token.text, token.location));
                prev = Some(TokenKind::STRING);
            } else if token.is(TokenKind::CHAR) {
                self.advance();
                expression
                    .operands
                    .push(CharLiteral::new(token.ch, token.location));
                prev = Some(TokenKind::CHAR);
            } else if token.is(TokenKind::IDENTIFIER) {
                self.advance();
                if token.text == "new" {
                    expression.operands.push(NewOp::new(token.location));
                    prev = None;
                } else if scope.find_variable(&token.text).is_some() {
                    expression
                        .operands
                        .push(VariableOp::new(token.text, token.location));
                    prev = Some(TokenKind::IDENTIFIER);
                } else if let Some(function) = scope.find_function(&token.text) {
                    self.expect(TokenKind::LEFT_PAREN)?;
                    let args = self.parse_call_args(scope)?;
                    expression.operands.push(FunctionCallOp::new(
                        token.text,
                        function,
                        args,
                        token.location,
                    ));
                    prev = Some(TokenKind::RIGHT_PAREN);
                } else if let Some(exemplar) = scope.find_type(&token.text) {
                    if self.matches(TokenKind::LEFT_PAREN).is_some() {
                        let args = self.parse_call_args(scope)?;
                        expression.operands.push(ConstructOp::new(
                            token.text,
                            exemplar,
                            args,
                            token.location,
                        ));
                        prev = Some(TokenKind::RIGHT_PAREN);
                    } else {
                        expression
                            .operands
                            .push(TypeOp::new(token.text, exemplar, token.location));
                        prev = Some(TokenKind::IDENTIFIER);
                    }
                } else {
                    return Err(Error::resolution(format!("cannot find \"{}\"", token.text))
                        .at(&token.location));
                }
            } else if token.is(TokenKind::DOT) {
                self.advance();
                let member_token = self.expect(TokenKind::IDENTIFIER)?;
                expression
                    .operands
                    .push(MemberAccessOp::new(token.location));
                if self.matches(TokenKind::LEFT_PAREN).is_some() {
                    let args = self.parse_call_args(scope)?;
                    expression.operands.push(MemberFunctionCallOp::new(
                        member_token.text,
                        args,
                        member_token.location,
                    ));
                    prev = Some(TokenKind::RIGHT_PAREN);
                } else {
                    expression
                        .operands
                        .push(ObjectMemberOp::new(member_token.text, member_token.location));
                    prev = Some(TokenKind::IDENTIFIER);
                }
            } else if token.is(TokenKind::PLUS) {
                self.advance();
                if ends_operand(prev) {
                    expression
                        .operands
                        .push(BinaryArithOp::new(ArithKind::Add, token.location));
                }
                // unary plus is a no-op
                prev = None;
            } else if token.is(TokenKind::MINUS) {
                self.advance();
                if ends_operand(prev) {
                    expression
                        .operands
                        .push(BinaryArithOp::new(ArithKind::Sub, token.location));
                } else {
                    expression.operands.push(NegateOp::new(token.location));
                }
                prev = None;
            } else if token.is(TokenKind::STAR) {
                self.advance();
                expression
                    .operands
                    .push(BinaryArithOp::new(ArithKind::Mul, token.location));
                prev = None;
            } else if token.is(TokenKind::SLASH) {
                self.advance();
                expression
                    .operands
                    .push(BinaryArithOp::new(ArithKind::Div, token.location));
                prev = None;
            } else if token.is(TokenKind::ASSIGN) {
                self.advance();
                expression.operands.push(AssignOp::new(token.location));
                prev = None;
            } else if token.is(
                TokenKind::PLUS_EQUAL
                    | TokenKind::MINUS_EQUAL
                    | TokenKind::STAR_EQUAL
                    | TokenKind::SLASH_EQUAL,
            ) {
                self.advance();
                let kind = if token.is(TokenKind::PLUS_EQUAL) {
                    ArithKind::Add
                } else if token.is(TokenKind::MINUS_EQUAL) {
                    ArithKind::Sub
                } else if token.is(TokenKind::STAR_EQUAL) {
                    ArithKind::Mul
                } else {
                    ArithKind::Div
                };
                expression
                    .operands
                    .push(CompoundAssignOp::new(kind, token.location));
                prev = None;
            } else if token.is(
                TokenKind::LESS
                    | TokenKind::LESS_EQUAL
                    | TokenKind::GREATER
                    | TokenKind::GREATER_EQUAL
                    | TokenKind::EQUAL
                    | TokenKind::NOT_EQUAL,
            ) {
                self.advance();
                let kind = if token.is(TokenKind::LESS) {
                    CompareKind::Less
                } else if token.is(TokenKind::LESS_EQUAL) {
                    CompareKind::LessEqual
                } else if token.is(TokenKind::GREATER) {
                    CompareKind::Greater
                } else if token.is(TokenKind::GREATER_EQUAL) {
                    CompareKind::GreaterEqual
                } else if token.is(TokenKind::EQUAL) {
                    CompareKind::Equal
                } else {
                    CompareKind::NotEqual
                };
                expression
                    .operands
                    .push(CompareOp::new(kind, token.location));
                prev = None;
            } else if token.is(TokenKind::INCREMENT | TokenKind::DECREMENT) {
                self.advance();
                let postfix = match prev {
                    Some(kind) => kind.is(TokenKind::IDENTIFIER | TokenKind::RIGHT_BRACKET),
                    None => false,
                };
                expression.operands.push(IncDecOp::new(
                    token.is(TokenKind::DECREMENT),
                    postfix,
                    token.location,
                ));
                prev = if postfix {
                    Some(TokenKind::IDENTIFIER)
                } else {
                    None
                };
            } else if token.is(TokenKind::LEFT_PAREN) {
                self.advance();
                depth += 1;
                expression.operands.push(MarkerOp::open(token.location));
                prev = None;
            } else if token.is(TokenKind::RIGHT_PAREN) {
                if depth == 0 {
                    return Err(Error::parse("syntax error: unmatched closing bracket")
                        .at(&token.location));
                }
                self.advance();
                depth -= 1;
                expression.operands.push(MarkerOp::close(token.location));
                prev = Some(TokenKind::RIGHT_PAREN);
            } else if token.is(TokenKind::LEFT_BRACKET) {
                if !ends_operand(prev) {
                    return Err(Error::parse("syntax error: unexpected \"[\"").at(&token.location));
                }
                self.advance();
                depth += 1;
                expression
                    .operands
                    .push(ArrayAccessOp::new(token.location.clone()));
                expression.operands.push(MarkerOp::open(token.location));
                prev = None;
            } else if token.is(TokenKind::RIGHT_BRACKET) {
                if depth == 0 {
                    return Err(Error::parse("syntax error: unmatched closing bracket")
                        .at(&token.location));
                }
                self.advance();
                depth -= 1;
                expression.operands.push(MarkerOp::close(token.location));
                prev = Some(TokenKind::RIGHT_BRACKET);
            } else {
                return Err(Error::parse(format!(
                    "unexpected {} in expression",
                    describe(&token)
                ))
                .at(&token.location));
            }
        }

        expression.collapse()?;
        Ok(expression)
    }
}
