//! Recursive descent parser for the ECMAScript surface the interpreter
//! accepts.
//!
//! The parser owns the lexer and advances it one token at a time, which
//! keeps regex-literal detection context-sensitive. Binary expressions use
//! precedence climbing over the table in [`TokenKind::binary_precedence`];
//! everything else is plain recursive descent.
//!
//! Errors never abort the parse: they accumulate in order, recovery skips
//! to the next plausible statement boundary, and the returned program may
//! be partial. The evaluator is expected to tolerate that.

use std::rc::Rc;

use crate::ast::{
    AssignOp, BinaryOp, CaseClause, CatchClause, Declaration, Expr, ExprKind, Function, Ident,
    Program, Property, PropertyKind, Stmt, StmtKind, UnaryOp,
};
use crate::error::{Error, ERR_UNEXPECTED_END_OF_INPUT, ERR_UNEXPECTED_ESCAPE};
use crate::lexer::Lexer;
use crate::position::{position_in, Idx};
use crate::regexp::transform_regexp;
use crate::token::{Token, TokenKind};

/// The parser state.
pub(crate) struct Parser<'a> {
    filename: &'a str,
    source: &'a str,
    base: u32,

    lexer: Lexer<'a>,
    /// Current token.
    current: Token,

    /// Program and function scopes; blocks do not open scopes.
    scopes: Vec<Scope>,
    errors: Vec<Error>,

    /// Scratchpad for seeking to the next statement: detects a
    /// non-advancing recovery loop and forces progress.
    recover: Recover,
}

struct Scope {
    declarations: Vec<Declaration>,
    labels: Vec<String>,
    in_function: bool,
    in_iteration: bool,
    in_switch: bool,
    /// When false, `in` is not a binary operator (`for` init clauses).
    allow_in: bool,
}

#[derive(Default)]
struct Recover {
    idx: Idx,
    count: u32,
}

impl<'a> Parser<'a> {
    pub(crate) fn new(filename: &'a str, source: &'a str, base: u32) -> Self {
        Self {
            filename,
            source,
            base,
            lexer: Lexer::new(filename, source, base),
            current: Token::new(TokenKind::Eof, String::new(), Idx(0)),
            scopes: Vec::new(),
            errors: Vec::new(),
            recover: Recover::default(),
        }
    }

    /// Parse the whole source. Always produces a program; the error list is
    /// ordered and its first element is the primary error.
    pub(crate) fn parse(mut self) -> (Program, Vec<Error>) {
        self.next();
        let program = self.parse_program();
        (program, self.errors)
    }

    // =========================================================================
    // Token handling
    // =========================================================================

    /// Advance to the next token, draining any lexical errors so the
    /// combined list stays in source order.
    fn next(&mut self) {
        self.current = self.lexer.next_token();
        if !self.lexer.errors.is_empty() {
            self.errors.append(&mut self.lexer.errors);
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.next();
            true
        } else {
            false
        }
    }

    /// Consume the expected token, recording an error (but still advancing)
    /// on a mismatch. Returns the position of the consumed token.
    fn expect(&mut self, kind: TokenKind) -> Idx {
        let idx = self.current.idx;
        if !self.check(kind) {
            self.error_unexpected_token();
        }
        self.next();
        idx
    }

    /// Eat an explicit `;` or an implicit one; `}` and end of input also
    /// terminate the statement.
    fn optional_semicolon(&mut self) {
        if self.eat(TokenKind::Semicolon) {
            return;
        }
        if self.lexer.implicit_semicolon {
            self.lexer.implicit_semicolon = false;
            return;
        }
        if !self.check(TokenKind::Eof) && !self.check(TokenKind::RBrace) {
            self.expect(TokenKind::Semicolon);
        }
    }

    /// Like [`Self::optional_semicolon`] but also tolerates `)`, for
    /// statements that may sit before a closing parenthesis.
    fn semicolon(&mut self) {
        if !self.check(TokenKind::RParen) && !self.check(TokenKind::RBrace) {
            if self.lexer.implicit_semicolon {
                self.lexer.implicit_semicolon = false;
                return;
            }
            self.expect(TokenKind::Semicolon);
        }
    }

    // =========================================================================
    // Errors and recovery
    // =========================================================================

    fn error_at(&mut self, idx: Idx, message: impl Into<String>) {
        // Index zero means "here": the scanner's current offset.
        let idx = if idx == Idx(0) {
            Idx(self.base + self.lexer.current_offset() as u32)
        } else {
            idx
        };
        let offset = idx.0.saturating_sub(self.base) as usize;
        let position = position_in(self.filename, self.source, offset);
        self.errors.push(Error::new(message, position));
    }

    fn error_unexpected_token(&mut self) {
        match self.current.kind {
            TokenKind::Eof => self.error_at(Idx(0), ERR_UNEXPECTED_END_OF_INPUT),
            TokenKind::Identifier => self.error_at(self.current.idx, "Unexpected identifier"),
            TokenKind::Number => self.error_at(self.current.idx, "Unexpected number"),
            TokenKind::String => self.error_at(self.current.idx, "Unexpected string"),
            TokenKind::Keyword => self.error_at(self.current.idx, "Unexpected reserved word"),
            TokenKind::Boolean | TokenKind::Null => {
                let message = format!("Unexpected token {}", self.current.literal);
                self.error_at(self.current.idx, message);
            }
            kind => {
                let message = format!("Unexpected token {}", kind.as_str());
                self.error_at(self.current.idx, message);
            }
        }
    }

    /// Skip ahead to the next plausible statement boundary. Returns early
    /// at a statement keyword only when the parser has made progress since
    /// the last resynchronization, or fewer than ten times in a row at the
    /// same spot; otherwise at least one token is consumed so a broken
    /// input cannot wedge the parser.
    fn next_statement(&mut self) {
        loop {
            match self.current.kind {
                TokenKind::Break
                | TokenKind::Continue
                | TokenKind::For
                | TokenKind::If
                | TokenKind::Return
                | TokenKind::Switch
                | TokenKind::Var
                | TokenKind::Do
                | TokenKind::While
                | TokenKind::With
                | TokenKind::Function
                | TokenKind::Debugger
                | TokenKind::Try => {
                    if self.current.idx == self.recover.idx && self.recover.count < 10 {
                        self.recover.count += 1;
                        return;
                    }
                    if self.current.idx > self.recover.idx {
                        self.recover.idx = self.current.idx;
                        self.recover.count = 0;
                        return;
                    }
                }
                TokenKind::Eof => return,
                _ => {}
            }
            self.next();
        }
    }

    // =========================================================================
    // Scopes
    // =========================================================================

    fn open_scope(&mut self, in_function: bool) {
        self.scopes.push(Scope {
            declarations: Vec::new(),
            labels: Vec::new(),
            in_function,
            in_iteration: false,
            in_switch: false,
            allow_in: true,
        });
    }

    fn close_scope(&mut self) -> Vec<Declaration> {
        self.scopes
            .pop()
            .map(|scope| scope.declarations)
            .unwrap_or_default()
    }

    fn scope(&self) -> &Scope {
        self.scopes.last().expect("scope stack is never empty")
    }

    fn scope_mut(&mut self) -> &mut Scope {
        self.scopes.last_mut().expect("scope stack is never empty")
    }

    fn has_label(&self, name: &str) -> bool {
        for scope in self.scopes.iter().rev() {
            if scope.labels.iter().any(|label| label == name) {
                return true;
            }
            if scope.in_function {
                break;
            }
        }
        false
    }

    // =========================================================================
    // Program
    // =========================================================================

    fn parse_program(&mut self) -> Program {
        self.open_scope(false);
        let mut body = Vec::new();
        while !self.check(TokenKind::Eof) {
            body.push(self.parse_statement());
        }
        let declarations = self.close_scope();
        Program { body, declarations }
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn parse_statement(&mut self) -> Stmt {
        let idx = self.current.idx;

        if self.check(TokenKind::Eof) {
            self.error_unexpected_token();
            return Stmt::new(StmtKind::Invalid, idx);
        }

        match self.current.kind {
            TokenKind::Semicolon => {
                self.next();
                Stmt::new(StmtKind::Empty, idx)
            }
            TokenKind::LBrace => self.parse_block_statement(),
            TokenKind::Var => self.parse_variable_statement(),
            TokenKind::Function => {
                let function = self.parse_function(true);
                Stmt::new(StmtKind::Function(function), idx)
            }
            TokenKind::If => self.parse_if_statement(),
            TokenKind::Do => self.parse_do_while_statement(),
            TokenKind::While => self.parse_while_statement(),
            TokenKind::For => self.parse_for_statement(),
            TokenKind::Break => self.parse_break_statement(),
            TokenKind::Continue => self.parse_continue_statement(),
            TokenKind::Return => self.parse_return_statement(),
            TokenKind::Switch => self.parse_switch_statement(),
            TokenKind::Throw => self.parse_throw_statement(),
            TokenKind::Try => self.parse_try_statement(),
            TokenKind::With => self.parse_with_statement(),
            TokenKind::Debugger => self.parse_debugger_statement(),
            _ => self.parse_expression_or_labelled_statement(),
        }
    }

    fn parse_block_statement(&mut self) -> Stmt {
        let idx = self.expect(TokenKind::LBrace);
        let mut list = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            list.push(self.parse_statement());
        }
        self.expect(TokenKind::RBrace);
        Stmt::new(StmtKind::Block(list), idx)
    }

    fn parse_variable_statement(&mut self) -> Stmt {
        let idx = self.expect(TokenKind::Var);
        let list = self.parse_variable_declaration_list(idx);
        self.semicolon();
        Stmt::new(StmtKind::Variable(list), idx)
    }

    fn parse_variable_declaration_list(&mut self, var_idx: Idx) -> Vec<Expr> {
        let mut list = Vec::new();
        let mut names = Vec::new();
        loop {
            list.push(self.parse_variable_declaration(&mut names));
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.scope_mut().declarations.push(Declaration::Variable {
            idx: var_idx,
            names,
        });
        list
    }

    fn parse_variable_declaration(&mut self, names: &mut Vec<String>) -> Expr {
        if !self.check(TokenKind::Identifier) {
            let idx = self.expect(TokenKind::Identifier);
            self.next_statement();
            return Expr::new(ExprKind::Invalid, idx);
        }
        let idx = self.current.idx;
        let name = self.current.literal.clone();
        self.next();
        names.push(name.clone());
        let initializer = if self.eat(TokenKind::Eq) {
            Some(Box::new(self.parse_assignment_expression()))
        } else {
            None
        };
        Expr::new(ExprKind::Variable { name, initializer }, idx)
    }

    fn parse_if_statement(&mut self) -> Stmt {
        let idx = self.expect(TokenKind::If);
        self.expect(TokenKind::LParen);
        let test = self.parse_expression();
        self.expect(TokenKind::RParen);
        let consequent = Box::new(self.parse_statement());
        let alternate = if self.eat(TokenKind::Else) {
            Some(Box::new(self.parse_statement()))
        } else {
            None
        };
        Stmt::new(
            StmtKind::If {
                test: Box::new(test),
                consequent,
                alternate,
            },
            idx,
        )
    }

    /// Parse a loop body with the iteration flag raised, so `break` and
    /// `continue` know they are legal.
    fn parse_iteration_body(&mut self) -> Stmt {
        let previous = self.scope().in_iteration;
        self.scope_mut().in_iteration = true;
        let body = self.parse_statement();
        self.scope_mut().in_iteration = previous;
        body
    }

    fn parse_do_while_statement(&mut self) -> Stmt {
        let idx = self.expect(TokenKind::Do);
        let body = Box::new(self.parse_iteration_body());
        self.expect(TokenKind::While);
        self.expect(TokenKind::LParen);
        let test = self.parse_expression();
        self.expect(TokenKind::RParen);
        // The trailing semicolon is optional, no ASI involved.
        self.eat(TokenKind::Semicolon);
        Stmt::new(
            StmtKind::DoWhile {
                body,
                test: Box::new(test),
            },
            idx,
        )
    }

    fn parse_while_statement(&mut self) -> Stmt {
        let idx = self.expect(TokenKind::While);
        self.expect(TokenKind::LParen);
        let test = self.parse_expression();
        self.expect(TokenKind::RParen);
        let body = Box::new(self.parse_iteration_body());
        Stmt::new(
            StmtKind::While {
                test: Box::new(test),
                body,
            },
            idx,
        )
    }

    fn parse_for_statement(&mut self) -> Stmt {
        let idx = self.expect(TokenKind::For);
        self.expect(TokenKind::LParen);

        let mut into: Option<Expr> = None;
        let mut initializer: Option<Expr> = None;

        if !self.check(TokenKind::Semicolon) {
            // `in` must not terminate the init clause.
            self.scope_mut().allow_in = false;
            if self.check(TokenKind::Var) {
                let var_idx = self.current.idx;
                self.next();
                let mut list = self.parse_variable_declaration_list(var_idx);
                if list.len() == 1 && self.check(TokenKind::In) {
                    // `for (var x = y in z)`: the single declarator is the
                    // loop target.
                    self.next();
                    into = Some(list.remove(0));
                } else if list.len() == 1 {
                    initializer = list.pop();
                } else {
                    let first_idx = list.first().map(|expr| expr.idx).unwrap_or(var_idx);
                    initializer = Some(Expr::new(ExprKind::Sequence(list), first_idx));
                }
            } else {
                let expression = self.parse_expression();
                if self.check(TokenKind::In) {
                    self.next();
                    match expression.kind {
                        ExprKind::Identifier { .. }
                        | ExprKind::Dot { .. }
                        | ExprKind::Bracket { .. } => into = Some(expression),
                        _ => {
                            self.scope_mut().allow_in = true;
                            self.error_at(idx, "Invalid left-hand side in for-in");
                            self.next_statement();
                            return Stmt::new(StmtKind::Invalid, idx);
                        }
                    }
                } else {
                    initializer = Some(expression);
                }
            }
            self.scope_mut().allow_in = true;
        }

        if let Some(into) = into {
            let source = self.parse_expression();
            self.expect(TokenKind::RParen);
            let body = Box::new(self.parse_iteration_body());
            return Stmt::new(
                StmtKind::ForIn {
                    into: Box::new(into),
                    source: Box::new(source),
                    body,
                },
                idx,
            );
        }

        self.expect(TokenKind::Semicolon);
        let test = if !self.check(TokenKind::Semicolon) {
            Some(Box::new(self.parse_expression()))
        } else {
            None
        };
        self.expect(TokenKind::Semicolon);
        let update = if !self.check(TokenKind::RParen) {
            Some(Box::new(self.parse_expression()))
        } else {
            None
        };
        self.expect(TokenKind::RParen);
        let body = Box::new(self.parse_iteration_body());
        Stmt::new(
            StmtKind::For {
                initializer: initializer.map(Box::new),
                test,
                update,
                body,
            },
            idx,
        )
    }

    fn parse_break_statement(&mut self) -> Stmt {
        let idx = self.expect(TokenKind::Break);

        let mut terminated = self.lexer.implicit_semicolon;
        if self.check(TokenKind::Semicolon) {
            terminated = true;
            self.next();
        }
        if terminated || self.check(TokenKind::RBrace) {
            self.lexer.implicit_semicolon = false;
            if !self.scope().in_iteration && !self.scope().in_switch {
                return self.illegal_branch(idx, "Illegal break statement");
            }
            return Stmt::new(StmtKind::Break(None), idx);
        }

        if self.check(TokenKind::Identifier) {
            let label = self.parse_ident();
            if !self.has_label(&label.name) {
                self.error_at(idx, format!("Undefined label '{}'", label.name));
                return Stmt::new(StmtKind::Invalid, idx);
            }
            self.semicolon();
            return Stmt::new(StmtKind::Break(Some(label)), idx);
        }

        self.expect(TokenKind::Identifier);
        self.illegal_branch(idx, "Illegal break statement")
    }

    fn parse_continue_statement(&mut self) -> Stmt {
        let idx = self.expect(TokenKind::Continue);

        let mut terminated = self.lexer.implicit_semicolon;
        if self.check(TokenKind::Semicolon) {
            terminated = true;
            self.next();
        }
        if terminated || self.check(TokenKind::RBrace) {
            self.lexer.implicit_semicolon = false;
            if !self.scope().in_iteration {
                return self.illegal_branch(idx, "Illegal continue statement");
            }
            return Stmt::new(StmtKind::Continue(None), idx);
        }

        if self.check(TokenKind::Identifier) {
            let label = self.parse_ident();
            if !self.has_label(&label.name) {
                self.error_at(idx, format!("Undefined label '{}'", label.name));
                return Stmt::new(StmtKind::Invalid, idx);
            }
            self.semicolon();
            return Stmt::new(StmtKind::Continue(Some(label)), idx);
        }

        self.expect(TokenKind::Identifier);
        self.illegal_branch(idx, "Illegal continue statement")
    }

    fn illegal_branch(&mut self, idx: Idx, message: &str) -> Stmt {
        self.error_at(idx, message);
        self.next_statement();
        Stmt::new(StmtKind::Invalid, idx)
    }

    fn parse_return_statement(&mut self) -> Stmt {
        let idx = self.expect(TokenKind::Return);
        if !self.scope().in_function {
            self.error_at(idx, "Illegal return statement");
        }
        let argument = if !self.lexer.implicit_semicolon
            && !self.check(TokenKind::Semicolon)
            && !self.check(TokenKind::RBrace)
            && !self.check(TokenKind::Eof)
        {
            Some(Box::new(self.parse_expression()))
        } else {
            None
        };
        self.optional_semicolon();
        Stmt::new(StmtKind::Return(argument), idx)
    }

    fn parse_switch_statement(&mut self) -> Stmt {
        let idx = self.expect(TokenKind::Switch);
        self.expect(TokenKind::LParen);
        let discriminant = self.parse_expression();
        self.expect(TokenKind::RParen);
        self.expect(TokenKind::LBrace);

        let previous = self.scope().in_switch;
        self.scope_mut().in_switch = true;

        let mut default = None;
        let mut cases = Vec::new();
        while !self.check(TokenKind::RBrace) {
            if self.check(TokenKind::Eof) {
                self.error_unexpected_token();
                self.scope_mut().in_switch = previous;
                return Stmt::new(StmtKind::Invalid, idx);
            }
            let clause = self.parse_case_clause();
            if clause.test.is_none() {
                if default.is_some() {
                    self.error_at(clause.idx, "Already saw a default in switch");
                } else {
                    default = Some(cases.len());
                }
            }
            cases.push(clause);
        }
        self.expect(TokenKind::RBrace);
        self.scope_mut().in_switch = previous;

        Stmt::new(
            StmtKind::Switch {
                discriminant: Box::new(discriminant),
                default,
                cases,
            },
            idx,
        )
    }

    fn parse_case_clause(&mut self) -> CaseClause {
        let idx = self.current.idx;
        let test = if self.eat(TokenKind::Default) {
            None
        } else {
            self.expect(TokenKind::Case);
            Some(self.parse_expression())
        };
        self.expect(TokenKind::Colon);

        let mut body = Vec::new();
        loop {
            match self.current.kind {
                TokenKind::Eof | TokenKind::RBrace | TokenKind::Case | TokenKind::Default => break,
                _ => body.push(self.parse_statement()),
            }
        }
        CaseClause { idx, test, body }
    }

    fn parse_throw_statement(&mut self) -> Stmt {
        let idx = self.expect(TokenKind::Throw);
        if self.lexer.implicit_semicolon {
            // A restricted production: the argument must start on the same
            // line. The following expression becomes its own statement.
            if self.check(TokenKind::Eof) {
                self.error_at(idx, ERR_UNEXPECTED_END_OF_INPUT);
            } else {
                self.error_at(idx, "Illegal newline after throw");
            }
            return Stmt::new(StmtKind::Invalid, idx);
        }
        let argument = self.parse_expression();
        self.semicolon();
        Stmt::new(StmtKind::Throw(Box::new(argument)), idx)
    }

    fn parse_try_statement(&mut self) -> Stmt {
        let idx = self.expect(TokenKind::Try);
        let body = Box::new(self.parse_block_statement());

        let mut catch = None;
        if self.check(TokenKind::Catch) {
            let catch_idx = self.current.idx;
            self.next();
            self.expect(TokenKind::LParen);
            if !self.check(TokenKind::Identifier) {
                self.expect(TokenKind::Identifier);
                self.next_statement();
                return Stmt::new(StmtKind::Invalid, idx);
            }
            let parameter = self.parse_ident();
            self.expect(TokenKind::RParen);
            catch = Some(CatchClause {
                idx: catch_idx,
                parameter,
                body: Box::new(self.parse_block_statement()),
            });
        }

        let finally = if self.eat(TokenKind::Finally) {
            Some(Box::new(self.parse_block_statement()))
        } else {
            None
        };

        if catch.is_none() && finally.is_none() {
            self.error_at(idx, "Missing catch or finally after try");
            return Stmt::new(StmtKind::Invalid, idx);
        }

        Stmt::new(
            StmtKind::Try {
                body,
                catch,
                finally,
            },
            idx,
        )
    }

    fn parse_with_statement(&mut self) -> Stmt {
        let idx = self.expect(TokenKind::With);
        self.expect(TokenKind::LParen);
        let object = self.parse_expression();
        self.expect(TokenKind::RParen);
        let body = Box::new(self.parse_statement());
        Stmt::new(
            StmtKind::With {
                object: Box::new(object),
                body,
            },
            idx,
        )
    }

    fn parse_debugger_statement(&mut self) -> Stmt {
        let idx = self.expect(TokenKind::Debugger);
        self.semicolon();
        Stmt::new(StmtKind::Debugger, idx)
    }

    fn parse_expression_or_labelled_statement(&mut self) -> Stmt {
        let idx = self.current.idx;
        let expression = self.parse_expression();

        if let ExprKind::Identifier { name } = &expression.kind {
            if self.check(TokenKind::Colon) {
                let name = name.clone();
                self.next();
                if self.has_label(&name) {
                    self.error_at(expression.idx, format!("Label '{name}' already exists"));
                }
                self.scope_mut().labels.push(name.clone());
                let body = Box::new(self.parse_statement());
                self.scope_mut().labels.pop();
                return Stmt::new(
                    StmtKind::Labelled {
                        label: Ident {
                            name,
                            idx: expression.idx,
                        },
                        body,
                    },
                    idx,
                );
            }
        }

        self.optional_semicolon();
        Stmt::new(StmtKind::Expression(Box::new(expression)), idx)
    }

    // =========================================================================
    // Functions
    // =========================================================================

    /// Parse a function literal. A declaration requires a name and is
    /// recorded in the enclosing scope's declaration list.
    fn parse_function(&mut self, declaration: bool) -> Rc<Function> {
        let idx = self.expect(TokenKind::Function);

        let mut name = None;
        if self.check(TokenKind::Identifier) {
            name = Some(self.parse_ident());
        } else if declaration {
            self.expect(TokenKind::Identifier);
        }

        let parameters = self.parse_function_parameters();
        self.open_scope(true);
        let body = self.parse_block_statement();
        let declarations = self.close_scope();

        let function = Rc::new(Function {
            idx,
            name,
            parameters,
            body,
            declarations,
        });
        if declaration && function.name.is_some() {
            self.scope_mut()
                .declarations
                .push(Declaration::Function(function.clone()));
        }
        function
    }

    fn parse_function_parameters(&mut self) -> Vec<Ident> {
        self.expect(TokenKind::LParen);
        let mut list = Vec::new();
        while !self.check(TokenKind::RParen) && !self.check(TokenKind::Eof) {
            if !self.check(TokenKind::Identifier) {
                self.expect(TokenKind::Identifier);
            } else {
                list.push(self.parse_ident());
            }
            if !self.check(TokenKind::RParen) {
                self.expect(TokenKind::Comma);
            }
        }
        self.expect(TokenKind::RParen);
        list
    }

    fn parse_ident(&mut self) -> Ident {
        let ident = Ident {
            name: self.current.literal.clone(),
            idx: self.current.idx,
        };
        self.next();
        ident
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn parse_expression(&mut self) -> Expr {
        let left = self.parse_assignment_expression();
        if !self.check(TokenKind::Comma) {
            return left;
        }
        let idx = left.idx;
        let mut sequence = vec![left];
        while self.eat(TokenKind::Comma) {
            sequence.push(self.parse_assignment_expression());
        }
        Expr::new(ExprKind::Sequence(sequence), idx)
    }

    fn parse_assignment_expression(&mut self) -> Expr {
        let left = self.parse_conditional_expression();

        let op = match self.current.kind {
            TokenKind::Eq => AssignOp::Assign,
            TokenKind::PlusEq => AssignOp::Add,
            TokenKind::MinusEq => AssignOp::Subtract,
            TokenKind::StarEq => AssignOp::Multiply,
            TokenKind::SlashEq => AssignOp::Divide,
            TokenKind::PercentEq => AssignOp::Remainder,
            TokenKind::LtLtEq => AssignOp::ShiftLeft,
            TokenKind::GtGtEq => AssignOp::ShiftRight,
            TokenKind::GtGtGtEq => AssignOp::UnsignedShiftRight,
            TokenKind::AmpEq => AssignOp::BitAnd,
            TokenKind::PipeEq => AssignOp::BitOr,
            TokenKind::CaretEq => AssignOp::BitXor,
            _ => return left,
        };
        self.next();
        let right = self.parse_assignment_expression();
        let idx = left.idx;
        Expr::new(
            ExprKind::Assign {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            idx,
        )
    }

    fn parse_conditional_expression(&mut self) -> Expr {
        let test = self.parse_binary_expression(1);
        if !self.eat(TokenKind::Question) {
            return test;
        }
        let consequent = self.parse_assignment_expression();
        self.expect(TokenKind::Colon);
        let alternate = self.parse_assignment_expression();
        let idx = test.idx;
        Expr::new(
            ExprKind::Conditional {
                test: Box::new(test),
                consequent: Box::new(consequent),
                alternate: Box::new(alternate),
            },
            idx,
        )
    }

    /// Precedence climbing over the binary operator table; all the
    /// operators are left-associative.
    fn parse_binary_expression(&mut self, min_precedence: u8) -> Expr {
        let mut left = self.parse_unary_expression();
        loop {
            let Some(precedence) = self.current.kind.binary_precedence() else {
                break;
            };
            if precedence < min_precedence {
                break;
            }
            if self.check(TokenKind::In) && !self.scope().allow_in {
                break;
            }
            let op = binary_op(self.current.kind);
            self.next();
            let right = self.parse_binary_expression(precedence + 1);
            let idx = left.idx;
            left = Expr::new(
                ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                idx,
            );
        }
        left
    }

    fn parse_unary_expression(&mut self) -> Expr {
        let idx = self.current.idx;
        let op = match self.current.kind {
            TokenKind::Plus => UnaryOp::Plus,
            TokenKind::Minus => UnaryOp::Minus,
            TokenKind::Bang => UnaryOp::Not,
            TokenKind::Tilde => UnaryOp::BitNot,
            TokenKind::Typeof => UnaryOp::Typeof,
            TokenKind::Void => UnaryOp::Void,
            TokenKind::Delete => UnaryOp::Delete,
            TokenKind::PlusPlus => UnaryOp::Increment,
            TokenKind::MinusMinus => UnaryOp::Decrement,
            _ => return self.parse_postfix_expression(),
        };
        self.next();
        let operand = self.parse_unary_expression();
        Expr::new(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
                postfix: false,
            },
            idx,
        )
    }

    fn parse_postfix_expression(&mut self) -> Expr {
        let operand = self.parse_left_hand_side_expression_allow_call();
        match self.current.kind {
            TokenKind::PlusPlus | TokenKind::MinusMinus => {
                // A line terminator before the operator ends the
                // expression; the operator then prefixes the next one.
                if self.lexer.implicit_semicolon {
                    return operand;
                }
                let op = if self.check(TokenKind::PlusPlus) {
                    UnaryOp::Increment
                } else {
                    UnaryOp::Decrement
                };
                self.next();
                let idx = operand.idx;
                Expr::new(
                    ExprKind::Unary {
                        op,
                        operand: Box::new(operand),
                        postfix: true,
                    },
                    idx,
                )
            }
            _ => operand,
        }
    }

    fn parse_left_hand_side_expression(&mut self) -> Expr {
        let mut left = if self.check(TokenKind::New) {
            self.parse_new_expression()
        } else {
            self.parse_primary_expression()
        };
        loop {
            match self.current.kind {
                TokenKind::Dot => left = self.parse_dot_member(left),
                TokenKind::LBracket => left = self.parse_bracket_member(left),
                _ => break,
            }
        }
        left
    }

    fn parse_left_hand_side_expression_allow_call(&mut self) -> Expr {
        let mut left = if self.check(TokenKind::New) {
            self.parse_new_expression()
        } else {
            self.parse_primary_expression()
        };
        loop {
            match self.current.kind {
                TokenKind::Dot => left = self.parse_dot_member(left),
                TokenKind::LBracket => left = self.parse_bracket_member(left),
                TokenKind::LParen => {
                    let arguments = self.parse_arguments();
                    let idx = left.idx;
                    left = Expr::new(
                        ExprKind::Call {
                            callee: Box::new(left),
                            arguments,
                        },
                        idx,
                    );
                }
                _ => break,
            }
        }
        left
    }

    fn parse_new_expression(&mut self) -> Expr {
        let idx = self.expect(TokenKind::New);
        let callee = self.parse_left_hand_side_expression();
        let arguments = if self.check(TokenKind::LParen) {
            self.parse_arguments()
        } else {
            Vec::new()
        };
        Expr::new(
            ExprKind::New {
                callee: Box::new(callee),
                arguments,
            },
            idx,
        )
    }

    fn parse_dot_member(&mut self, object: Expr) -> Expr {
        self.next();
        if !self.check(TokenKind::Identifier) {
            self.error_unexpected_token();
            return Expr::new(ExprKind::Invalid, object.idx);
        }
        let member = self.parse_ident();
        let idx = object.idx;
        Expr::new(
            ExprKind::Dot {
                object: Box::new(object),
                member,
            },
            idx,
        )
    }

    fn parse_bracket_member(&mut self, object: Expr) -> Expr {
        self.next();
        let member = self.parse_expression();
        self.expect(TokenKind::RBracket);
        let idx = object.idx;
        Expr::new(
            ExprKind::Bracket {
                object: Box::new(object),
                member: Box::new(member),
            },
            idx,
        )
    }

    fn parse_arguments(&mut self) -> Vec<Expr> {
        self.expect(TokenKind::LParen);
        let mut arguments = Vec::new();
        while !self.check(TokenKind::RParen) && !self.check(TokenKind::Eof) {
            arguments.push(self.parse_assignment_expression());
            if !self.check(TokenKind::RParen) {
                self.expect(TokenKind::Comma);
            }
        }
        self.expect(TokenKind::RParen);
        arguments
    }

    fn parse_primary_expression(&mut self) -> Expr {
        let idx = self.current.idx;
        match self.current.kind {
            TokenKind::Identifier => {
                let name = self.current.literal.clone();
                self.next();
                Expr::new(ExprKind::Identifier { name }, idx)
            }
            TokenKind::Number => {
                let literal = self.current.literal.clone();
                self.next();
                let value = number_literal_value(&literal);
                Expr::new(ExprKind::Number { value, literal }, idx)
            }
            TokenKind::String => {
                let literal = self.current.literal.clone();
                self.next();
                let value = match decode_string_literal(&literal[1..literal.len() - 1]) {
                    Ok(value) => value,
                    Err(()) => {
                        self.error_at(idx, ERR_UNEXPECTED_ESCAPE);
                        String::new()
                    }
                };
                Expr::new(ExprKind::String { value, literal }, idx)
            }
            TokenKind::Boolean => {
                let value = self.current.literal == "true";
                self.next();
                Expr::new(ExprKind::Boolean(value), idx)
            }
            TokenKind::Null => {
                self.next();
                Expr::new(ExprKind::Null, idx)
            }
            TokenKind::This => {
                self.next();
                Expr::new(ExprKind::This, idx)
            }
            TokenKind::Function => {
                let function = self.parse_function(false);
                Expr::new(ExprKind::Function(function), idx)
            }
            TokenKind::LParen => {
                self.next();
                // A parenthesized `in` is fine even in a for-init clause.
                let previous = self.scope().allow_in;
                self.scope_mut().allow_in = true;
                let expression = self.parse_expression();
                self.scope_mut().allow_in = previous;
                self.expect(TokenKind::RParen);
                expression
            }
            TokenKind::LBracket => self.parse_array_literal(),
            TokenKind::LBrace => self.parse_object_literal(),
            TokenKind::Slash | TokenKind::SlashEq => self.parse_regexp_literal(),
            _ => {
                self.error_unexpected_token();
                self.next_statement();
                Expr::new(ExprKind::Invalid, idx)
            }
        }
    }

    fn parse_array_literal(&mut self) -> Expr {
        let idx = self.expect(TokenKind::LBracket);
        let mut elements = Vec::new();
        while !self.check(TokenKind::RBracket) && !self.check(TokenKind::Eof) {
            if self.check(TokenKind::Comma) {
                // Elision.
                self.next();
                elements.push(None);
                continue;
            }
            elements.push(Some(self.parse_assignment_expression()));
            if !self.check(TokenKind::RBracket) {
                self.expect(TokenKind::Comma);
            }
        }
        self.expect(TokenKind::RBracket);
        Expr::new(ExprKind::Array(elements), idx)
    }

    fn parse_object_literal(&mut self) -> Expr {
        let idx = self.expect(TokenKind::LBrace);
        let mut properties = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            properties.push(self.parse_object_property());
            if !self.check(TokenKind::RBrace) {
                self.expect(TokenKind::Comma);
            }
        }
        self.expect(TokenKind::RBrace);
        Expr::new(ExprKind::Object(properties), idx)
    }

    fn parse_object_property(&mut self) -> Property {
        if self.check(TokenKind::Identifier) {
            let literal = self.current.literal.clone();
            let idx = self.current.idx;
            self.next();
            if !self.check(TokenKind::Colon) && (literal == "get" || literal == "set") {
                // `get`/`set` are contextual; they stay plain keys when a
                // colon follows.
                let kind = if literal == "get" {
                    PropertyKind::Get
                } else {
                    PropertyKind::Set
                };
                let key = self.parse_object_property_key();
                let parameters = self.parse_function_parameters();
                self.open_scope(true);
                let body = self.parse_block_statement();
                let declarations = self.close_scope();
                let function = Function {
                    idx,
                    name: None,
                    parameters,
                    body,
                    declarations,
                };
                return Property {
                    key,
                    kind,
                    value: Expr::new(ExprKind::Function(Rc::new(function)), idx),
                };
            }
            self.expect(TokenKind::Colon);
            return Property {
                key: literal,
                kind: PropertyKind::Value,
                value: self.parse_assignment_expression(),
            };
        }

        let key = self.parse_object_property_key();
        self.expect(TokenKind::Colon);
        Property {
            key,
            kind: PropertyKind::Value,
            value: self.parse_assignment_expression(),
        }
    }

    fn parse_object_property_key(&mut self) -> String {
        let idx = self.current.idx;
        let literal = self.current.literal.clone();
        match self.current.kind {
            TokenKind::Identifier | TokenKind::Number => {
                self.next();
                literal
            }
            TokenKind::String => {
                self.next();
                match decode_string_literal(&literal[1..literal.len() - 1]) {
                    Ok(value) => value,
                    Err(()) => {
                        self.error_at(idx, ERR_UNEXPECTED_ESCAPE);
                        String::new()
                    }
                }
            }
            _ => {
                self.error_unexpected_token();
                self.next();
                String::new()
            }
        }
    }

    fn parse_regexp_literal(&mut self) -> Expr {
        let idx = self.current.idx;
        let offset = (idx.0 - self.base) as usize;

        match self.lexer.scan_regexp(offset) {
            Ok(raw) => {
                let pattern = raw[1..raw.len() - 1].to_string();
                let flags = self.lexer.scan_regexp_flags();
                let literal = self.source[offset..self.lexer.current_offset()].to_string();
                let (value, error) = transform_regexp(&pattern);
                let value = match error {
                    Some(error) => {
                        self.error_at(idx, format!("Invalid regular expression: {}", error.message));
                        String::new()
                    }
                    None => value,
                };
                self.next();
                Expr::new(
                    ExprKind::RegExp {
                        pattern,
                        flags,
                        literal,
                        value,
                    },
                    idx,
                )
            }
            Err(()) => {
                // The lexer already recorded the missing-slash error.
                self.next();
                Expr::new(ExprKind::InvalidRegExp, idx)
            }
        }
    }
}

fn binary_op(kind: TokenKind) -> BinaryOp {
    match kind {
        TokenKind::Plus => BinaryOp::Add,
        TokenKind::Minus => BinaryOp::Subtract,
        TokenKind::Star => BinaryOp::Multiply,
        TokenKind::Slash => BinaryOp::Divide,
        TokenKind::Percent => BinaryOp::Remainder,
        TokenKind::LtLt => BinaryOp::ShiftLeft,
        TokenKind::GtGt => BinaryOp::ShiftRight,
        TokenKind::GtGtGt => BinaryOp::UnsignedShiftRight,
        TokenKind::Amp => BinaryOp::BitAnd,
        TokenKind::Pipe => BinaryOp::BitOr,
        TokenKind::Caret => BinaryOp::BitXor,
        TokenKind::AmpAmp => BinaryOp::LogicalAnd,
        TokenKind::PipePipe => BinaryOp::LogicalOr,
        TokenKind::EqEq => BinaryOp::Equal,
        TokenKind::EqEqEq => BinaryOp::StrictEqual,
        TokenKind::BangEq => BinaryOp::NotEqual,
        TokenKind::BangEqEq => BinaryOp::StrictNotEqual,
        TokenKind::Lt => BinaryOp::Less,
        TokenKind::Gt => BinaryOp::Greater,
        TokenKind::LtEq => BinaryOp::LessEqual,
        TokenKind::GtEq => BinaryOp::GreaterEqual,
        TokenKind::In => BinaryOp::In,
        TokenKind::Instanceof => BinaryOp::Instanceof,
        _ => unreachable!("not a binary operator: {kind:?}"),
    }
}

/// Convert a scanned number literal to its value. The scanner has already
/// validated the shape, so this cannot fail.
fn number_literal_value(literal: &str) -> f64 {
    if let Some(hex) = literal
        .strip_prefix("0x")
        .or_else(|| literal.strip_prefix("0X"))
    {
        return radix_value(hex, 16);
    }
    if literal.len() > 1
        && literal.starts_with('0')
        && literal.bytes().all(|digit| (b'0'..=b'7').contains(&digit))
    {
        return radix_value(&literal[1..], 8);
    }
    literal.parse().unwrap_or(f64::NAN)
}

fn radix_value(digits: &str, radix: u32) -> f64 {
    digits.chars().fold(0.0, |value, chr| {
        value * f64::from(radix) + f64::from(chr.to_digit(radix).unwrap_or(0))
    })
}

/// Decode the escape sequences of a string literal body (quotes already
/// stripped). Fails on malformed `\x`/`\u` digits.
fn decode_string_literal(raw: &str) -> Result<String, ()> {
    let mut value = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(chr) = chars.next() {
        if chr != '\\' {
            value.push(chr);
            continue;
        }
        let Some(escape) = chars.next() else {
            return Err(());
        };
        match escape {
            // Line continuation: a backslash before a line terminator
            // produces nothing.
            '\n' | '\u{2028}' | '\u{2029}' => {}
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
            }
            'n' => value.push('\n'),
            'r' => value.push('\r'),
            't' => value.push('\t'),
            'b' => value.push('\u{0008}'),
            'f' => value.push('\u{000c}'),
            'v' => value.push('\u{000b}'),
            '0' => value.push('\0'),
            'x' => value.push(hex_escape(&mut chars, 2)?),
            'u' => value.push(hex_escape(&mut chars, 4)?),
            // Everything else, quotes and backslash included, escapes to
            // itself.
            other => value.push(other),
        }
    }
    Ok(value)
}

fn hex_escape(chars: &mut std::iter::Peekable<std::str::Chars<'_>>, count: u32) -> Result<char, ()> {
    let mut value = 0;
    for _ in 0..count {
        let digit = chars.next().and_then(|chr| chr.to_digit(16)).ok_or(())?;
        value = value * 16 + digit;
    }
    char::from_u32(value).ok_or(())
}
