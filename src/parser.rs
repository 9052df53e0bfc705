use crate::ast::*;
use crate::lexer::{Keyword, LexError, Lexer, Position, Token};
use std::fmt;
use std::rc::Rc;

#[derive(Debug)]
pub struct ParseError {
    pub message: String,
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SyntaxError: {} (line {}, column {})",
            self.message, self.line, self.column
        )
    }
}

impl From<LexError> for ParseError {
    fn from(e: LexError) -> Self {
        ParseError {
            message: e.message,
            line: e.position.line,
            column: e.position.column,
        }
    }
}

/// Parse a complete program. This is the interface the engine uses for
/// `eval` and `Function(…)` source text as well as for top-level files.
pub fn parse_string(source: &str, filename: Option<&str>) -> Result<Program, ParseError> {
    let mut parser = Parser::new(source, filename)?;
    parser.parse_program()
}

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
    current_pos: Position,
    prev_line_terminator: bool,
    pushback: Option<(Token, Position, bool)>,
    file: Option<Rc<str>>,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str, filename: Option<&str>) -> Result<Self, ParseError> {
        let mut lexer = Lexer::new(source);
        let mut had_lt = false;
        let mut pos = lexer.position();
        let current = loop {
            let tok = lexer.next_token()?;
            if tok == Token::LineTerminator {
                had_lt = true;
                pos = lexer.position();
                continue;
            }
            break tok;
        };
        Ok(Self {
            lexer,
            current,
            current_pos: pos,
            prev_line_terminator: had_lt,
            pushback: None,
            file: filename.map(Rc::from),
        })
    }

    fn advance(&mut self) -> Result<Token, ParseError> {
        let old = std::mem::replace(&mut self.current, Token::Eof);
        if let Some((tok, pos, lt)) = self.pushback.take() {
            self.current = tok;
            self.current_pos = pos;
            self.prev_line_terminator = lt;
        } else {
            self.prev_line_terminator = false;
            loop {
                let pos = self.lexer.position();
                let tok = self.lexer.next_token()?;
                if tok == Token::LineTerminator {
                    self.prev_line_terminator = true;
                    continue;
                }
                self.current = tok;
                self.current_pos = pos;
                break;
            }
        }
        Ok(old)
    }

    fn eat(&mut self, expected: &Token) -> Result<(), ParseError> {
        if &self.current == expected {
            self.advance()?;
            Ok(())
        } else {
            Err(self.error(format!(
                "Expected {:?}, found {:?}",
                expected, self.current
            )))
        }
    }

    fn eat_semicolon(&mut self) -> Result<(), ParseError> {
        if self.current == Token::Semicolon {
            self.advance()?;
            return Ok(());
        }
        // Automatic semicolon insertion, §7.9
        if self.prev_line_terminator
            || self.current == Token::RightBrace
            || self.current == Token::Eof
        {
            return Ok(());
        }
        Err(self.error("Expected semicolon"))
    }

    fn error(&self, msg: impl Into<String>) -> ParseError {
        ParseError {
            message: msg.into(),
            line: self.current_pos.line,
            column: self.current_pos.column,
        }
    }

    fn loc(&self) -> SourceLocation {
        SourceLocation {
            file: self.file.clone(),
            line: self.current_pos.line,
            column: self.current_pos.column,
        }
    }

    fn statement(&self, kind: StatementKind, loc: SourceLocation) -> Statement {
        Statement { kind, loc }
    }

    pub fn parse_program(&mut self) -> Result<Program, ParseError> {
        let mut body = Vec::new();
        while self.current != Token::Eof {
            body.push(self.parse_statement()?);
        }
        let strict = directive_prologue_is_strict(&body);
        Ok(Program { body, strict })
    }

    fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        let loc = self.loc();
        match &self.current {
            Token::LeftBrace => {
                let stmts = self.parse_block()?;
                Ok(self.statement(StatementKind::Block(stmts), loc))
            }
            Token::Semicolon => {
                self.advance()?;
                Ok(self.statement(StatementKind::Empty, loc))
            }
            Token::Keyword(Keyword::Function) => self.parse_function_declaration(),
            Token::Keyword(Keyword::Var) => self.parse_variable_statement(VarKind::Var),
            Token::Keyword(Keyword::Const) => self.parse_variable_statement(VarKind::Const),
            Token::Keyword(Keyword::If) => self.parse_if_statement(),
            Token::Keyword(Keyword::While) => self.parse_while_statement(),
            Token::Keyword(Keyword::Do) => self.parse_do_while_statement(),
            Token::Keyword(Keyword::For) => self.parse_for_statement(),
            Token::Keyword(Keyword::Return) => self.parse_return_statement(),
            Token::Keyword(Keyword::Break) => self.parse_break_continue(true),
            Token::Keyword(Keyword::Continue) => self.parse_break_continue(false),
            Token::Keyword(Keyword::Throw) => self.parse_throw_statement(),
            Token::Keyword(Keyword::Try) => self.parse_try_statement(),
            Token::Keyword(Keyword::Switch) => self.parse_switch_statement(),
            Token::Keyword(Keyword::With) => self.parse_with_statement(),
            Token::Keyword(Keyword::Debugger) => {
                self.advance()?;
                self.eat_semicolon()?;
                Ok(self.statement(StatementKind::Debugger, loc))
            }
            _ => self.parse_expression_statement_or_labeled(),
        }
    }

    fn parse_block(&mut self) -> Result<Vec<Statement>, ParseError> {
        self.eat(&Token::LeftBrace)?;
        let mut stmts = Vec::new();
        while self.current != Token::RightBrace && self.current != Token::Eof {
            stmts.push(self.parse_statement()?);
        }
        self.eat(&Token::RightBrace)?;
        Ok(stmts)
    }

    fn parse_expression_statement_or_labeled(&mut self) -> Result<Statement, ParseError> {
        let loc = self.loc();
        if let Token::Identifier(name) = &self.current {
            let name = name.clone();
            let ident_pos = self.current_pos;
            let ident_lt = self.prev_line_terminator;
            self.advance()?;
            if self.current == Token::Colon {
                self.advance()?;
                let stmt = self.parse_statement()?;
                return Ok(self.statement(StatementKind::Labeled(name, Box::new(stmt)), loc));
            }
            // Not a label: push back and restore the identifier
            let after_tok = std::mem::replace(&mut self.current, Token::Identifier(name));
            let after_pos = std::mem::replace(&mut self.current_pos, ident_pos);
            let after_lt = std::mem::replace(&mut self.prev_line_terminator, ident_lt);
            self.pushback = Some((after_tok, after_pos, after_lt));
        }
        let expr = self.parse_expression()?;
        self.eat_semicolon()?;
        Ok(self.statement(StatementKind::Expression(expr), loc))
    }

    fn parse_variable_statement(&mut self, kind: VarKind) -> Result<Statement, ParseError> {
        let loc = self.loc();
        self.advance()?; // var / const
        let declarations = self.parse_variable_declaration_list()?;
        self.eat_semicolon()?;
        Ok(self.statement(
            StatementKind::Variable(VariableDeclaration { kind, declarations }),
            loc,
        ))
    }

    fn parse_variable_declaration_list(&mut self) -> Result<Vec<VariableDeclarator>, ParseError> {
        let mut decls = Vec::new();
        loop {
            let name = self.expect_identifier("variable name")?;
            let init = if self.current == Token::Assign {
                self.advance()?;
                Some(self.parse_assignment_expression()?)
            } else {
                None
            };
            decls.push(VariableDeclarator { name, init });
            if self.current == Token::Comma {
                self.advance()?;
            } else {
                break;
            }
        }
        Ok(decls)
    }

    fn expect_identifier(&mut self, what: &str) -> Result<String, ParseError> {
        match &self.current {
            Token::Identifier(name) => {
                let name = name.clone();
                self.advance()?;
                Ok(name)
            }
            _ => Err(self.error(format!("Expected {what}, found {:?}", self.current))),
        }
    }

    fn parse_if_statement(&mut self) -> Result<Statement, ParseError> {
        let loc = self.loc();
        self.advance()?; // if
        self.eat(&Token::LeftParen)?;
        let test = self.parse_expression()?;
        self.eat(&Token::RightParen)?;
        let consequent = Box::new(self.parse_statement()?);
        let alternate = if self.current == Token::Keyword(Keyword::Else) {
            self.advance()?;
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        Ok(self.statement(
            StatementKind::If(IfStatement {
                test,
                consequent,
                alternate,
            }),
            loc,
        ))
    }

    fn parse_while_statement(&mut self) -> Result<Statement, ParseError> {
        let loc = self.loc();
        self.advance()?; // while
        self.eat(&Token::LeftParen)?;
        let test = self.parse_expression()?;
        self.eat(&Token::RightParen)?;
        let body = Box::new(self.parse_statement()?);
        Ok(self.statement(StatementKind::While(WhileStatement { test, body }), loc))
    }

    fn parse_do_while_statement(&mut self) -> Result<Statement, ParseError> {
        let loc = self.loc();
        self.advance()?; // do
        let body = Box::new(self.parse_statement()?);
        self.eat(&Token::Keyword(Keyword::While))?;
        self.eat(&Token::LeftParen)?;
        let test = self.parse_expression()?;
        self.eat(&Token::RightParen)?;
        if self.current == Token::Semicolon {
            self.advance()?;
        }
        Ok(self.statement(StatementKind::DoWhile(DoWhileStatement { body, test }), loc))
    }

    fn parse_for_statement(&mut self) -> Result<Statement, ParseError> {
        let loc = self.loc();
        self.advance()?; // for
        self.eat(&Token::LeftParen)?;

        let init = match &self.current {
            Token::Semicolon => None,
            Token::Keyword(Keyword::Var) | Token::Keyword(Keyword::Const) => {
                let kind = if self.current == Token::Keyword(Keyword::Var) {
                    VarKind::Var
                } else {
                    VarKind::Const
                };
                self.advance()?;
                let decls = self.parse_variable_declaration_list()?;
                if self.current == Token::Keyword(Keyword::In) {
                    if decls.len() != 1 {
                        return Err(self.error("Invalid left-hand side in for-in"));
                    }
                    self.advance()?;
                    let right = self.parse_expression()?;
                    self.eat(&Token::RightParen)?;
                    let body = Box::new(self.parse_statement()?);
                    return Ok(self.statement(
                        StatementKind::ForIn(ForInStatement {
                            left: ForInLeft::Variable(decls.into_iter().next().unwrap()),
                            right,
                            body,
                        }),
                        loc,
                    ));
                }
                Some(ForInit::Variable(VariableDeclaration {
                    kind,
                    declarations: decls,
                }))
            }
            _ => {
                let expr = self.parse_expression_no_in()?;
                if self.current == Token::Keyword(Keyword::In) {
                    self.advance()?;
                    let right = self.parse_expression()?;
                    self.eat(&Token::RightParen)?;
                    let body = Box::new(self.parse_statement()?);
                    return Ok(self.statement(
                        StatementKind::ForIn(ForInStatement {
                            left: ForInLeft::Expression(expr),
                            right,
                            body,
                        }),
                        loc,
                    ));
                }
                Some(ForInit::Expression(expr))
            }
        };

        self.eat(&Token::Semicolon)?;
        let test = if self.current == Token::Semicolon {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.eat(&Token::Semicolon)?;
        let update = if self.current == Token::RightParen {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.eat(&Token::RightParen)?;
        let body = Box::new(self.parse_statement()?);
        Ok(self.statement(
            StatementKind::For(ForStatement {
                init,
                test,
                update,
                body,
            }),
            loc,
        ))
    }

    fn parse_return_statement(&mut self) -> Result<Statement, ParseError> {
        let loc = self.loc();
        self.advance()?; // return
        // Restricted production: no line terminator before the argument
        let arg = if self.prev_line_terminator
            || self.current == Token::Semicolon
            || self.current == Token::RightBrace
            || self.current == Token::Eof
        {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.eat_semicolon()?;
        Ok(self.statement(StatementKind::Return(arg), loc))
    }

    fn parse_break_continue(&mut self, is_break: bool) -> Result<Statement, ParseError> {
        let loc = self.loc();
        self.advance()?;
        let label = if !self.prev_line_terminator {
            if let Token::Identifier(name) = &self.current {
                let name = name.clone();
                self.advance()?;
                Some(name)
            } else {
                None
            }
        } else {
            None
        };
        self.eat_semicolon()?;
        let kind = if is_break {
            StatementKind::Break(label)
        } else {
            StatementKind::Continue(label)
        };
        Ok(self.statement(kind, loc))
    }

    fn parse_throw_statement(&mut self) -> Result<Statement, ParseError> {
        let loc = self.loc();
        self.advance()?; // throw
        if self.prev_line_terminator {
            return Err(self.error("Illegal newline after throw"));
        }
        let expr = self.parse_expression()?;
        self.eat_semicolon()?;
        Ok(self.statement(StatementKind::Throw(expr), loc))
    }

    fn parse_try_statement(&mut self) -> Result<Statement, ParseError> {
        let loc = self.loc();
        self.advance()?; // try
        let block = self.parse_block()?;
        let handler = if self.current == Token::Keyword(Keyword::Catch) {
            self.advance()?;
            self.eat(&Token::LeftParen)?;
            let param = self.expect_identifier("catch parameter")?;
            self.eat(&Token::RightParen)?;
            let body = self.parse_block()?;
            Some(CatchClause { param, body })
        } else {
            None
        };
        let finalizer = if self.current == Token::Keyword(Keyword::Finally) {
            self.advance()?;
            Some(self.parse_block()?)
        } else {
            None
        };
        if handler.is_none() && finalizer.is_none() {
            return Err(self.error("Missing catch or finally after try"));
        }
        Ok(self.statement(
            StatementKind::Try(TryStatement {
                block,
                handler,
                finalizer,
            }),
            loc,
        ))
    }

    fn parse_switch_statement(&mut self) -> Result<Statement, ParseError> {
        let loc = self.loc();
        self.advance()?; // switch
        self.eat(&Token::LeftParen)?;
        let discriminant = self.parse_expression()?;
        self.eat(&Token::RightParen)?;
        self.eat(&Token::LeftBrace)?;
        let mut cases = Vec::new();
        let mut seen_default = false;
        while self.current != Token::RightBrace && self.current != Token::Eof {
            let test = match &self.current {
                Token::Keyword(Keyword::Case) => {
                    self.advance()?;
                    let t = self.parse_expression()?;
                    Some(t)
                }
                Token::Keyword(Keyword::Default) => {
                    if seen_default {
                        return Err(self.error("More than one default clause in switch"));
                    }
                    seen_default = true;
                    self.advance()?;
                    None
                }
                _ => return Err(self.error("Expected case or default in switch")),
            };
            self.eat(&Token::Colon)?;
            let mut body = Vec::new();
            while !matches!(
                &self.current,
                Token::RightBrace
                    | Token::Keyword(Keyword::Case)
                    | Token::Keyword(Keyword::Default)
                    | Token::Eof
            ) {
                body.push(self.parse_statement()?);
            }
            cases.push(SwitchCase { test, body });
        }
        self.eat(&Token::RightBrace)?;
        Ok(self.statement(
            StatementKind::Switch(SwitchStatement {
                discriminant,
                cases,
            }),
            loc,
        ))
    }

    fn parse_with_statement(&mut self) -> Result<Statement, ParseError> {
        let loc = self.loc();
        self.advance()?; // with
        self.eat(&Token::LeftParen)?;
        let object = self.parse_expression()?;
        self.eat(&Token::RightParen)?;
        let body = Box::new(self.parse_statement()?);
        Ok(self.statement(StatementKind::With(object, body), loc))
    }

    fn parse_function_declaration(&mut self) -> Result<Statement, ParseError> {
        let loc = self.loc();
        self.advance()?; // function
        let name = self.expect_identifier("function name")?;
        let (params, body, strict) = self.parse_function_rest()?;
        Ok(self.statement(
            StatementKind::FunctionDeclaration(FunctionNode {
                name: Some(name),
                params,
                body,
                strict,
                loc: loc.clone(),
            }),
            loc,
        ))
    }

    fn parse_function_rest(
        &mut self,
    ) -> Result<(Vec<String>, Rc<Vec<Statement>>, bool), ParseError> {
        self.eat(&Token::LeftParen)?;
        let mut params = Vec::new();
        while self.current != Token::RightParen {
            params.push(self.expect_identifier("parameter name")?);
            if self.current == Token::Comma {
                self.advance()?;
            } else {
                break;
            }
        }
        self.eat(&Token::RightParen)?;
        let body = self.parse_block()?;
        let strict = directive_prologue_is_strict(&body);
        Ok((params, Rc::new(body), strict))
    }

    // Expressions

    pub fn parse_expression(&mut self) -> Result<Expression, ParseError> {
        self.parse_expression_impl(true)
    }

    fn parse_expression_no_in(&mut self) -> Result<Expression, ParseError> {
        self.parse_expression_impl(false)
    }

    fn parse_expression_impl(&mut self, allow_in: bool) -> Result<Expression, ParseError> {
        let expr = self.parse_assignment_impl(allow_in)?;
        if self.current == Token::Comma {
            let mut exprs = vec![expr];
            while self.current == Token::Comma {
                self.advance()?;
                exprs.push(self.parse_assignment_impl(allow_in)?);
            }
            Ok(Expression::Sequence(exprs))
        } else {
            Ok(expr)
        }
    }

    fn parse_assignment_expression(&mut self) -> Result<Expression, ParseError> {
        self.parse_assignment_impl(true)
    }

    fn parse_assignment_impl(&mut self, allow_in: bool) -> Result<Expression, ParseError> {
        let left = self.parse_conditional(allow_in)?;

        let op = match &self.current {
            Token::Assign => Some(AssignOp::Assign),
            Token::PlusAssign => Some(AssignOp::AddAssign),
            Token::MinusAssign => Some(AssignOp::SubAssign),
            Token::StarAssign => Some(AssignOp::MulAssign),
            Token::SlashAssign => Some(AssignOp::DivAssign),
            Token::PercentAssign => Some(AssignOp::ModAssign),
            Token::LeftShiftAssign => Some(AssignOp::LShiftAssign),
            Token::RightShiftAssign => Some(AssignOp::RShiftAssign),
            Token::UnsignedRightShiftAssign => Some(AssignOp::URShiftAssign),
            Token::AmpersandAssign => Some(AssignOp::BitAndAssign),
            Token::PipeAssign => Some(AssignOp::BitOrAssign),
            Token::CaretAssign => Some(AssignOp::BitXorAssign),
            _ => None,
        };

        if let Some(op) = op {
            if !matches!(left, Expression::Identifier(_) | Expression::Member(_, _)) {
                return Err(self.error("Invalid assignment target"));
            }
            self.advance()?;
            let right = self.parse_assignment_impl(allow_in)?;
            Ok(Expression::Assign(op, Box::new(left), Box::new(right)))
        } else {
            Ok(left)
        }
    }

    fn parse_conditional(&mut self, allow_in: bool) -> Result<Expression, ParseError> {
        let expr = self.parse_binary(0, allow_in)?;
        if self.current == Token::Question {
            self.advance()?;
            let consequent = self.parse_assignment_expression()?;
            self.eat(&Token::Colon)?;
            let alternate = self.parse_assignment_impl(allow_in)?;
            Ok(Expression::Conditional(
                Box::new(expr),
                Box::new(consequent),
                Box::new(alternate),
            ))
        } else {
            Ok(expr)
        }
    }

    /// Precedence-climbing over the §11 binary operator ladder.
    fn parse_binary(&mut self, min_prec: u8, allow_in: bool) -> Result<Expression, ParseError> {
        let mut left = self.parse_unary()?;
        loop {
            let (prec, logical) = match &self.current {
                Token::LogicalOr => (1, Some(LogicalOp::Or)),
                Token::LogicalAnd => (2, Some(LogicalOp::And)),
                Token::Pipe => (3, None),
                Token::Caret => (4, None),
                Token::Ampersand => (5, None),
                Token::Equal | Token::NotEqual | Token::StrictEqual | Token::StrictNotEqual => {
                    (6, None)
                }
                Token::LessThan
                | Token::GreaterThan
                | Token::LessThanEqual
                | Token::GreaterThanEqual
                | Token::Keyword(Keyword::Instanceof) => (7, None),
                Token::Keyword(Keyword::In) if allow_in => (7, None),
                Token::LeftShift | Token::RightShift | Token::UnsignedRightShift => (8, None),
                Token::Plus | Token::Minus => (9, None),
                Token::Star | Token::Slash | Token::Percent => (10, None),
                _ => break,
            };
            if prec < min_prec {
                break;
            }
            let tok = self.current.clone();
            self.advance()?;
            let right = self.parse_binary(prec + 1, allow_in)?;
            left = if let Some(op) = logical {
                Expression::Logical(op, Box::new(left), Box::new(right))
            } else {
                Expression::Binary(binary_op_for(&tok), Box::new(left), Box::new(right))
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expression, ParseError> {
        match &self.current {
            Token::Keyword(Keyword::Delete) => {
                self.advance()?;
                Ok(Expression::Delete(Box::new(self.parse_unary()?)))
            }
            Token::Keyword(Keyword::Void) => {
                self.advance()?;
                Ok(Expression::Void(Box::new(self.parse_unary()?)))
            }
            Token::Keyword(Keyword::Typeof) => {
                self.advance()?;
                Ok(Expression::Typeof(Box::new(self.parse_unary()?)))
            }
            Token::Plus => {
                self.advance()?;
                Ok(Expression::Unary(
                    UnaryOp::Plus,
                    Box::new(self.parse_unary()?),
                ))
            }
            Token::Minus => {
                self.advance()?;
                Ok(Expression::Unary(
                    UnaryOp::Minus,
                    Box::new(self.parse_unary()?),
                ))
            }
            Token::Tilde => {
                self.advance()?;
                Ok(Expression::Unary(
                    UnaryOp::BitNot,
                    Box::new(self.parse_unary()?),
                ))
            }
            Token::Bang => {
                self.advance()?;
                Ok(Expression::Unary(
                    UnaryOp::Not,
                    Box::new(self.parse_unary()?),
                ))
            }
            Token::Increment => {
                self.advance()?;
                Ok(Expression::Update(
                    UpdateOp::Increment,
                    true,
                    Box::new(self.parse_unary()?),
                ))
            }
            Token::Decrement => {
                self.advance()?;
                Ok(Expression::Update(
                    UpdateOp::Decrement,
                    true,
                    Box::new(self.parse_unary()?),
                ))
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> Result<Expression, ParseError> {
        let expr = self.parse_left_hand_side()?;
        // Restricted production: no line terminator before postfix ++/--
        if !self.prev_line_terminator {
            if self.current == Token::Increment {
                self.advance()?;
                return Ok(Expression::Update(
                    UpdateOp::Increment,
                    false,
                    Box::new(expr),
                ));
            }
            if self.current == Token::Decrement {
                self.advance()?;
                return Ok(Expression::Update(
                    UpdateOp::Decrement,
                    false,
                    Box::new(expr),
                ));
            }
        }
        Ok(expr)
    }

    fn parse_left_hand_side(&mut self) -> Result<Expression, ParseError> {
        let mut expr = if self.current == Token::Keyword(Keyword::New) {
            self.parse_new_expression()?
        } else {
            self.parse_primary_expression()?
        };

        loop {
            match &self.current {
                Token::Dot => {
                    self.advance()?;
                    let name = match &self.current {
                        Token::Identifier(n) => n.clone(),
                        Token::Keyword(kw) => kw.to_string(),
                        _ => return Err(self.error("Expected identifier after '.'")),
                    };
                    self.advance()?;
                    expr = Expression::Member(Box::new(expr), MemberProperty::Dot(name));
                }
                Token::LeftBracket => {
                    self.advance()?;
                    let prop = self.parse_expression()?;
                    self.eat(&Token::RightBracket)?;
                    expr =
                        Expression::Member(Box::new(expr), MemberProperty::Computed(Box::new(prop)));
                }
                Token::LeftParen => {
                    let args = self.parse_arguments()?;
                    expr = Expression::Call(Box::new(expr), args);
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_new_expression(&mut self) -> Result<Expression, ParseError> {
        self.advance()?; // new
        if self.current == Token::Keyword(Keyword::New) {
            let inner = self.parse_new_expression()?;
            return Ok(Expression::New(Box::new(inner), Vec::new()));
        }
        let mut callee = self.parse_primary_expression()?;
        loop {
            match &self.current {
                Token::Dot => {
                    self.advance()?;
                    let name = match &self.current {
                        Token::Identifier(n) => n.clone(),
                        Token::Keyword(kw) => kw.to_string(),
                        _ => return Err(self.error("Expected identifier after '.'")),
                    };
                    self.advance()?;
                    callee = Expression::Member(Box::new(callee), MemberProperty::Dot(name));
                }
                Token::LeftBracket => {
                    self.advance()?;
                    let prop = self.parse_expression()?;
                    self.eat(&Token::RightBracket)?;
                    callee = Expression::Member(
                        Box::new(callee),
                        MemberProperty::Computed(Box::new(prop)),
                    );
                }
                _ => break,
            }
        }
        let args = if self.current == Token::LeftParen {
            self.parse_arguments()?
        } else {
            Vec::new()
        };
        Ok(Expression::New(Box::new(callee), args))
    }

    fn parse_arguments(&mut self) -> Result<Vec<Expression>, ParseError> {
        self.eat(&Token::LeftParen)?;
        let mut args = Vec::new();
        while self.current != Token::RightParen {
            args.push(self.parse_assignment_expression()?);
            if self.current == Token::Comma {
                self.advance()?;
            } else {
                break;
            }
        }
        self.eat(&Token::RightParen)?;
        Ok(args)
    }

    fn parse_primary_expression(&mut self) -> Result<Expression, ParseError> {
        match &self.current {
            Token::Keyword(Keyword::This) => {
                self.advance()?;
                Ok(Expression::This)
            }
            Token::Identifier(name) => {
                let name = name.clone();
                self.advance()?;
                Ok(Expression::Identifier(name))
            }
            Token::NumericLiteral(n) | Token::LegacyOctalLiteral(n) => {
                let n = *n;
                self.advance()?;
                Ok(Expression::Literal(Literal::Number(n)))
            }
            Token::StringLiteral(s) => {
                let s = s.clone();
                self.advance()?;
                Ok(Expression::Literal(Literal::String(s)))
            }
            Token::BooleanLiteral(b) => {
                let b = *b;
                self.advance()?;
                Ok(Expression::Literal(Literal::Boolean(b)))
            }
            Token::NullLiteral => {
                self.advance()?;
                Ok(Expression::Literal(Literal::Null))
            }
            Token::Slash | Token::SlashAssign => {
                // Re-lex as a regular expression literal
                let with_assign = self.current == Token::SlashAssign;
                let tok = self.lexer.lex_regex(with_assign)?;
                if let Token::RegExpLiteral { pattern, flags } = tok {
                    self.advance()?;
                    Ok(Expression::Literal(Literal::RegExp { pattern, flags }))
                } else {
                    Err(self.error("Invalid regular expression"))
                }
            }
            Token::LeftParen => {
                self.advance()?;
                let expr = self.parse_expression()?;
                self.eat(&Token::RightParen)?;
                Ok(expr)
            }
            Token::LeftBracket => self.parse_array_literal(),
            Token::LeftBrace => self.parse_object_literal(),
            Token::Keyword(Keyword::Function) => {
                let loc = self.loc();
                self.advance()?;
                let name = if let Token::Identifier(n) = &self.current {
                    let n = n.clone();
                    self.advance()?;
                    Some(n)
                } else {
                    None
                };
                let (params, body, strict) = self.parse_function_rest()?;
                Ok(Expression::Function(FunctionNode {
                    name,
                    params,
                    body,
                    strict,
                    loc,
                }))
            }
            _ => Err(self.error(format!("Unexpected token {:?}", self.current))),
        }
    }

    fn parse_array_literal(&mut self) -> Result<Expression, ParseError> {
        self.eat(&Token::LeftBracket)?;
        let mut elements = Vec::new();
        while self.current != Token::RightBracket {
            if self.current == Token::Comma {
                // Elision
                elements.push(None);
                self.advance()?;
                continue;
            }
            elements.push(Some(self.parse_assignment_expression()?));
            if self.current == Token::Comma {
                self.advance()?;
            } else {
                break;
            }
        }
        self.eat(&Token::RightBracket)?;
        Ok(Expression::Array(elements))
    }

    fn parse_property_key(&mut self) -> Result<PropertyKey, ParseError> {
        let key = match &self.current {
            Token::Identifier(n) => PropertyKey::Identifier(n.clone()),
            Token::Keyword(kw) => PropertyKey::Identifier(kw.to_string()),
            Token::BooleanLiteral(b) => PropertyKey::Identifier(b.to_string()),
            Token::NullLiteral => PropertyKey::Identifier("null".to_string()),
            Token::StringLiteral(s) => PropertyKey::String(s.clone()),
            Token::NumericLiteral(n) | Token::LegacyOctalLiteral(n) => PropertyKey::Number(*n),
            _ => return Err(self.error("Expected property name")),
        };
        self.advance()?;
        Ok(key)
    }

    fn parse_object_literal(&mut self) -> Result<Expression, ParseError> {
        self.eat(&Token::LeftBrace)?;
        let mut props = Vec::new();
        while self.current != Token::RightBrace {
            // get/set accessor properties, unless followed by ':' or ','
            if let Token::Identifier(name) = &self.current {
                let name = name.clone();
                if (name == "get" || name == "set")
                    && !matches!(
                        self.peek_after_identifier()?,
                        Token::Colon | Token::Comma | Token::RightBrace | Token::LeftParen
                    )
                {
                    let is_getter = name == "get";
                    self.advance()?;
                    let loc = self.loc();
                    let key = self.parse_property_key()?;
                    let (params, body, strict) = self.parse_function_rest()?;
                    let func = FunctionNode {
                        name: None,
                        params,
                        body,
                        strict,
                        loc,
                    };
                    if is_getter {
                        props.push(ObjectProperty::Getter(key, func));
                    } else {
                        props.push(ObjectProperty::Setter(key, func));
                    }
                    if self.current == Token::Comma {
                        self.advance()?;
                    }
                    continue;
                }
            }
            let key = self.parse_property_key()?;
            self.eat(&Token::Colon)?;
            let value = self.parse_assignment_expression()?;
            props.push(ObjectProperty::KeyValue(key, value));
            if self.current == Token::Comma {
                self.advance()?;
            } else {
                break;
            }
        }
        self.eat(&Token::RightBrace)?;
        Ok(Expression::Object(props))
    }

    /// Peek at the token after the current identifier without consuming it.
    fn peek_after_identifier(&mut self) -> Result<Token, ParseError> {
        let ident = self.current.clone();
        let ident_pos = self.current_pos;
        let ident_lt = self.prev_line_terminator;
        self.advance()?;
        let after = self.current.clone();
        let after_tok = std::mem::replace(&mut self.current, ident);
        let after_pos = std::mem::replace(&mut self.current_pos, ident_pos);
        let after_lt = std::mem::replace(&mut self.prev_line_terminator, ident_lt);
        self.pushback = Some((after_tok, after_pos, after_lt));
        Ok(after)
    }
}

fn binary_op_for(tok: &Token) -> BinaryOp {
    match tok {
        Token::Pipe => BinaryOp::BitOr,
        Token::Caret => BinaryOp::BitXor,
        Token::Ampersand => BinaryOp::BitAnd,
        Token::Equal => BinaryOp::Eq,
        Token::NotEqual => BinaryOp::NotEq,
        Token::StrictEqual => BinaryOp::StrictEq,
        Token::StrictNotEqual => BinaryOp::StrictNotEq,
        Token::LessThan => BinaryOp::Lt,
        Token::GreaterThan => BinaryOp::Gt,
        Token::LessThanEqual => BinaryOp::LtEq,
        Token::GreaterThanEqual => BinaryOp::GtEq,
        Token::Keyword(Keyword::Instanceof) => BinaryOp::Instanceof,
        Token::Keyword(Keyword::In) => BinaryOp::In,
        Token::LeftShift => BinaryOp::LShift,
        Token::RightShift => BinaryOp::RShift,
        Token::UnsignedRightShift => BinaryOp::URShift,
        Token::Plus => BinaryOp::Add,
        Token::Minus => BinaryOp::Sub,
        Token::Star => BinaryOp::Mul,
        Token::Slash => BinaryOp::Div,
        Token::Percent => BinaryOp::Mod,
        _ => unreachable!("not a binary operator token"),
    }
}

/// §14.1 — a directive prologue consisting of the string literal
/// "use strict" puts the enclosing code in strict mode.
pub fn directive_prologue_is_strict(body: &[Statement]) -> bool {
    for stmt in body {
        if let StatementKind::Expression(Expression::Literal(Literal::String(s))) = &stmt.kind {
            if s == "use strict" {
                return true;
            }
        } else {
            break;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Program {
        parse_string(src, None).expect("parse error")
    }

    #[test]
    fn parse_variable_declaration() {
        let prog = parse("var x = 1 + 2;");
        assert_eq!(prog.body.len(), 1);
        match &prog.body[0].kind {
            StatementKind::Variable(decl) => {
                assert_eq!(decl.declarations.len(), 1);
                assert_eq!(decl.declarations[0].name, "x");
                assert!(matches!(
                    decl.declarations[0].init,
                    Some(Expression::Binary(BinaryOp::Add, _, _))
                ));
            }
            other => panic!("expected variable declaration, got {other:?}"),
        }
    }

    #[test]
    fn parse_function_declaration() {
        let prog = parse("function f(a, b) { return a + b; }");
        match &prog.body[0].kind {
            StatementKind::FunctionDeclaration(f) => {
                assert_eq!(f.name.as_deref(), Some("f"));
                assert_eq!(f.params, vec!["a".to_string(), "b".to_string()]);
                assert!(!f.strict);
            }
            other => panic!("expected function declaration, got {other:?}"),
        }
    }

    #[test]
    fn parse_strict_directive() {
        let prog = parse("'use strict'; var x;");
        assert!(prog.strict);
        let prog = parse("var x; 'use strict';");
        assert!(!prog.strict);
    }

    #[test]
    fn precedence() {
        let prog = parse("1 + 2 * 3;");
        match &prog.body[0].kind {
            StatementKind::Expression(Expression::Binary(BinaryOp::Add, _, rhs)) => {
                assert!(matches!(**rhs, Expression::Binary(BinaryOp::Mul, _, _)));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn member_call_chain() {
        let prog = parse("a.b.c(1)[2];");
        match &prog.body[0].kind {
            StatementKind::Expression(Expression::Member(inner, MemberProperty::Computed(_))) => {
                assert!(matches!(**inner, Expression::Call(_, _)));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn for_in_variants() {
        parse("for (var k in o) { }");
        parse("for (k in o) { }");
        parse("for (var i = 0; i < 10; i++) { }");
        parse("for (;;) { break; }");
    }

    #[test]
    fn object_literal_accessors() {
        let prog = parse("var o = { a: 1, get b() { return 2; }, set b(v) {} };");
        match &prog.body[0].kind {
            StatementKind::Variable(decl) => match &decl.declarations[0].init {
                Some(Expression::Object(props)) => {
                    assert_eq!(props.len(), 3);
                    assert!(matches!(props[1], ObjectProperty::Getter(_, _)));
                    assert!(matches!(props[2], ObjectProperty::Setter(_, _)));
                }
                other => panic!("unexpected {other:?}"),
            },
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn get_as_plain_property_name() {
        parse("var o = { get: 1, set: 2 };");
    }

    #[test]
    fn regex_literal() {
        let prog = parse("var re = /ab+c/gi;");
        match &prog.body[0].kind {
            StatementKind::Variable(decl) => {
                assert!(matches!(
                    decl.declarations[0].init,
                    Some(Expression::Literal(Literal::RegExp { .. }))
                ));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn asi_return() {
        let prog = parse("function f() { return\n1; }");
        match &prog.body[0].kind {
            StatementKind::FunctionDeclaration(f) => {
                assert!(matches!(f.body[0].kind, StatementKind::Return(None)));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn labeled_statement() {
        let prog = parse("outer: for (;;) { break outer; }");
        assert!(matches!(
            prog.body[0].kind,
            StatementKind::Labeled(ref l, _) if l == "outer"
        ));
    }

    #[test]
    fn syntax_error_reports_position() {
        let err = parse_string("var = 3;", Some("bad.js")).unwrap_err();
        assert!(err.message.contains("variable name"));
        assert_eq!(err.line, 1);
    }

    #[test]
    fn new_expression_forms() {
        parse("new Date();");
        parse("new a.b.C(1, 2);");
        parse("new new F()();");
    }
}
