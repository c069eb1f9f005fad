use crate::ast::{Expr, Stmt, VarKind};
use crate::error::Error;
use crate::limits::{MAX_ARGS, MAX_NESTING};
use crate::stack::ensure_sufficient_stack;
use loxmod_core::{Token, Type};

pub struct Parser<'a> {
    tokens: &'a [Token],
    current: usize,

    // How deep the tree under construction is nested, bounded by `MAX_NESTING`
    depth: usize,

    // Errors that don't need the parser to resynchronize, e.g. an invalid assignment target, and
    // errors recovered from inside blocks.
    errors: Vec<Error>,
}

// A wrapper over vector of statements to not leak Stmt to public
#[derive(Debug, PartialEq)]
pub struct StmtStream(pub(crate) Vec<Stmt>);

// Helper alias for shorter return types
type ParserResult = Result<StmtStream, Vec<Error>>;
type BlockResult = Result<Vec<Stmt>, Error>;
type StmtResult = Result<Stmt, Error>;
type ExprResult = Result<Expr, Error>;

// Function kind to differentiate between normal functions and class methods during parsing
#[derive(Debug, Clone, Copy)]
enum FunctionKind {
    Function,
    Method,
}

impl FunctionKind {
    fn as_str(self) -> &'static str {
        match self {
            FunctionKind::Function => "function",
            FunctionKind::Method => "method",
        }
    }
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token]) -> Self {
        Parser {
            tokens,
            current: 0,
            depth: 0,
            errors: Vec::new(),
        }
    }

    pub fn parse(mut self) -> ParserResult {
        let mut statements = Vec::new();

        while !self.is_at_end() {
            match self.declaration() {
                Ok(stmt) => statements.push(stmt),
                Err(err) => self.errors.push(err),
            };
        }

        if self.errors.is_empty() {
            Ok(StmtStream(statements))
        } else {
            self.errors.sort_by_key(|err| err.line());
            Err(self.errors)
        }
    }

    fn declaration(&mut self) -> StmtResult {
        let res = self.nested(Self::parse_declaration);
        if res.is_err() {
            self.synchronize();
        }

        res
    }

    fn parse_declaration(&mut self) -> StmtResult {
        if self.match_one(Type::Import) {
            self.import_declaration()
        } else if self.match_one(Type::Class) {
            self.class_declaration()
        } else if self.match_one(Type::Fun) {
            self.function(FunctionKind::Function)
        } else if self.match_one(Type::Var) {
            self.var_declaration(VarKind::Var)
        } else if self.match_one(Type::Const) {
            self.var_declaration(VarKind::Const)
        } else {
            self.statement()
        }
    }

    fn import_declaration(&mut self) -> StmtResult {
        let keyword = self.previous().clone();
        if !self.match_either(&[Type::Identifier, Type::String]) {
            return Err(Error::parser_error(self.peek(), "Expect module name after 'import'."));
        }
        let name = self.previous().clone();

        let mut alias = None;
        if self.match_one(Type::As) {
            alias = Some(
                self.consume(Type::Identifier, "Expect alias name after 'as'.")?
                    .clone(),
            );
        }

        self.consume(Type::SemiColon, "Expect ';' after import.")?;
        Ok(Stmt::Import {
            keyword,
            name,
            alias,
        })
    }

    fn class_declaration(&mut self) -> StmtResult {
        let name = self
            .consume(Type::Identifier, "Expect class name.")?
            .clone();

        let mut superclass = None;
        if self.match_one(Type::Less) {
            self.consume(Type::Identifier, "Expect superclass name.")?;
            superclass = Some(Expr::variable(self.previous().clone()));
        }

        self.consume(Type::LeftBrace, "Expect '{' before class body.")?;

        let mut methods = Vec::new();
        while !self.check(Type::RightBrace) && !self.is_at_end() {
            match self.function(FunctionKind::Method)? {
                Stmt::Function { decl } => methods.push(decl),
                _ => unreachable!("function() only produces function statements"),
            }
        }
        self.consume(Type::RightBrace, "Expect '}' after class body.")?;
        Ok(Stmt::Class {
            name,
            superclass,
            methods,
        })
    }

    fn function(&mut self, kind: FunctionKind) -> StmtResult {
        let name = self
            .consume(Type::Identifier, &format!("Expect {} name.", kind.as_str()))?
            .clone();
        self.consume(
            Type::LeftParen,
            &format!("Expect '(' after {} name.", kind.as_str()),
        )?;
        let params = self.parameters()?;
        self.consume(
            Type::LeftBrace,
            &format!("Expect '{{' before {} body.", kind.as_str()),
        )?;

        let body = self.block()?;
        Ok(Stmt::function(name, params, body))
    }

    // Parses the parameter list up to and including the closing paren.
    fn parameters(&mut self) -> Result<Vec<Token>, Error> {
        let mut params = Vec::new();
        if !self.check(Type::RightParen) {
            loop {
                if params.len() >= MAX_ARGS {
                    let err = Error::parser_error(self.peek(), "Can't have more than 255 parameters.");
                    self.errors.push(err);
                }

                params.push(
                    self.consume(Type::Identifier, "Expect parameter name.")?
                        .clone(),
                );
                if !self.match_one(Type::Comma) {
                    break;
                }
            }
        }

        self.consume(Type::RightParen, "Expect ')' after parameters.")?;
        Ok(params)
    }

    fn var_declaration(&mut self, kind: VarKind) -> StmtResult {
        let name = self
            .consume(Type::Identifier, "Expect variable name.")?
            .clone();

        let mut init = None;
        if self.match_one(Type::Equal) {
            init = Some(self.expression()?);
        } else if kind == VarKind::Const {
            return Err(Error::parser_error(self.peek(), "Expect '=' after constant name."));
        }

        self.consume(Type::SemiColon, "Expect ';' after variable declaration.")?;
        Ok(Stmt::var(name, init, kind))
    }

    fn statement(&mut self) -> StmtResult {
        self.nested(Self::parse_statement)
    }

    fn parse_statement(&mut self) -> StmtResult {
        if self.match_one(Type::If) {
            self.if_statement()
        } else if self.match_one(Type::Print) {
            self.print_statement()
        } else if self.match_one(Type::Return) {
            self.return_statement()
        } else if self.match_one(Type::While) {
            self.while_statement()
        } else if self.match_one(Type::For) {
            self.for_statement()
        } else if self.match_one(Type::Break) {
            let keyword = self.previous().clone();
            self.consume(Type::SemiColon, "Expect ';' after 'break'.")?;
            Ok(Stmt::Break { keyword })
        } else if self.match_one(Type::Continue) {
            let keyword = self.previous().clone();
            self.consume(Type::SemiColon, "Expect ';' after 'continue'.")?;
            Ok(Stmt::Continue { keyword })
        } else if self.match_one(Type::LeftBrace) {
            Ok(Stmt::block(self.block()?))
        } else {
            self.expression_statement()
        }
    }

    fn block(&mut self) -> BlockResult {
        let mut stmts = Vec::new();
        while !self.check(Type::RightBrace) && !self.is_at_end() {
            match self.declaration() {
                Ok(stmt) => stmts.push(stmt),
                Err(err) => self.errors.push(err),
            }
        }
        self.consume(Type::RightBrace, "Expect '}' after block.")?;
        Ok(stmts)
    }

    fn expression_statement(&mut self) -> StmtResult {
        let expr = self.expression()?;
        self.consume(Type::SemiColon, "Expect ';' after expression.")?;
        Ok(Stmt::expression(expr))
    }

    fn if_statement(&mut self) -> StmtResult {
        self.consume(Type::LeftParen, "Expect '(' after 'if'.")?;
        let condition = self.expression()?;
        self.consume(Type::RightParen, "Expect ')' after if condition.")?;

        let then_branch = self.statement()?;
        let mut else_branch = None;
        if self.match_one(Type::Else) {
            else_branch = Some(self.statement()?);
        }

        Ok(Stmt::if_(condition, then_branch, else_branch))
    }

    fn while_statement(&mut self) -> StmtResult {
        self.consume(Type::LeftParen, "Expect '(' after 'while'.")?;
        let condition = self.expression()?;
        self.consume(Type::RightParen, "Expect ')' after while condition.")?;
        let body = self.statement()?;
        Ok(Stmt::while_(condition, body, None))
    }

    fn for_statement(&mut self) -> StmtResult {
        self.consume(Type::LeftParen, "Expect '(' after 'for'.")?;

        let initializer = if self.match_one(Type::SemiColon) {
            None
        } else if self.match_one(Type::Var) {
            Some(self.var_declaration(VarKind::Var)?)
        } else {
            Some(self.expression_statement()?)
        };

        let condition = if !self.check(Type::SemiColon) {
            self.expression()?
        } else {
            Expr::literal(true)
        };
        self.consume(Type::SemiColon, "Expect ';' after loop condition.")?;

        let increment = if !self.check(Type::RightParen) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(Type::RightParen, "Expect ')' after for clauses.")?;

        let body = self.statement()?;
        let while_ = Stmt::while_(condition, body, increment);

        match initializer {
            // initialise the variables in their own scope first, after that it's just a while loop
            Some(initializer) => Ok(Stmt::block(vec![initializer, while_])),
            None => Ok(while_),
        }
    }

    fn print_statement(&mut self) -> StmtResult {
        let keyword = self.previous().clone();
        let expr = self.expression()?;
        self.consume(Type::SemiColon, "Expect ';' after value.")?;
        Ok(Stmt::print(keyword, expr))
    }

    fn return_statement(&mut self) -> StmtResult {
        let keyword = self.previous().clone();
        let mut value = None;
        if !self.check(Type::SemiColon) {
            value = Some(self.expression()?);
        }

        self.consume(Type::SemiColon, "Expect ';' after return value.")?;
        Ok(Stmt::return_(keyword, value))
    }

    fn expression(&mut self) -> ExprResult {
        self.nested(Self::assignment)
    }

    fn assignment(&mut self) -> ExprResult {
        let expr = self.or_expression()?;
        if self.match_one(Type::Equal) {
            let equals = self.previous().clone();
            let value = self.expression()?;

            match expr {
                Expr::Variable { name } => Ok(Expr::assign(name, value)),
                Expr::Get { name, object } => Ok(Expr::Set {
                    object,
                    name,
                    value: Box::new(value),
                }),
                expr => {
                    // Reported, but the parser is not confused so there's no need to synchronize
                    self.errors
                        .push(Error::parser_error(&equals, "Invalid assignment target."));
                    Ok(expr)
                }
            }
        } else {
            Ok(expr)
        }
    }

    fn or_expression(&mut self) -> ExprResult {
        self.left_assoc(&[Type::Or], Self::and_expression, Expr::logical)
    }

    fn and_expression(&mut self) -> ExprResult {
        self.left_assoc(&[Type::And], Self::equality, Expr::logical)
    }

    fn equality(&mut self) -> ExprResult {
        self.left_assoc(&[Type::BangEqual, Type::EqualEqual], Self::comparison, Expr::binary)
    }

    fn comparison(&mut self) -> ExprResult {
        let operators = [
            Type::Greater,
            Type::GreaterEqual,
            Type::Less,
            Type::LessEqual,
        ];
        self.left_assoc(&operators, Self::term, Expr::binary)
    }

    fn term(&mut self) -> ExprResult {
        self.left_assoc(&[Type::Plus, Type::Minus], Self::factor, Expr::binary)
    }

    fn factor(&mut self) -> ExprResult {
        let operators = [Type::Slash, Type::Star, Type::Percent];
        self.left_assoc(&operators, Self::unary, Expr::binary)
    }

    // operand ( operator operand )*, folded to the left
    fn left_assoc(
        &mut self,
        operators: &[Type],
        operand: fn(&mut Self) -> ExprResult,
        make: fn(Expr, Token, Expr) -> Expr,
    ) -> ExprResult {
        // every operator nests the expression parsed so far one level deeper
        self.chain(|parser| {
            let mut expr = operand(parser)?;
            while parser.match_either(operators) {
                let operator = parser.previous().clone();
                parser.deepen()?;
                let right = operand(parser)?;
                expr = make(expr, operator, right);
            }
            Ok(expr)
        })
    }

    fn unary(&mut self) -> ExprResult {
        if self.match_either(&[Type::Bang, Type::Minus]) {
            let operator = self.previous().clone();
            Ok(Expr::unary(operator, self.nested(Self::unary)?))
        } else {
            self.call()
        }
    }

    fn call(&mut self) -> ExprResult {
        self.chain(|parser| {
            let mut expr = parser.primary()?;
            loop {
                if parser.match_one(Type::LeftParen) {
                    parser.deepen()?;
                    expr = parser.finish_call(expr)?;
                } else if parser.match_one(Type::Dot) {
                    parser.deepen()?;
                    let name = parser
                        .consume(Type::Identifier, "Expect property name after '.'.")?
                        .clone();
                    expr = Expr::get(expr, name);
                } else {
                    break;
                }
            }
            Ok(expr)
        })
    }

    fn finish_call(&mut self, callee: Expr) -> ExprResult {
        let mut args: Vec<Expr> = Vec::new();
        if !self.check(Type::RightParen) {
            loop {
                if args.len() >= MAX_ARGS {
                    let err = Error::parser_error(self.peek(), "Can't have more than 255 arguments.");
                    self.errors.push(err);
                }

                args.push(self.expression()?);
                if !self.match_one(Type::Comma) {
                    break;
                }
            }
        }

        let paren = self.consume(Type::RightParen, "Expect ')' after arguments.")?;
        Ok(Expr::call(callee, paren.clone(), args))
    }

    fn primary(&mut self) -> ExprResult {
        if self.match_one(Type::True) {
            Ok(Expr::literal(true))
        } else if self.match_one(Type::False) {
            Ok(Expr::literal(false))
        } else if self.match_one(Type::Nil) {
            Ok(Expr::nil())
        } else if self.match_either(&[Type::Number, Type::String]) {
            Ok(Expr::Literal {
                value: self.previous().value.clone(),
            })
        } else if self.match_one(Type::LeftParen) {
            let expr = self.expression()?;
            self.consume(Type::RightParen, "Expect ')' after expression.")?;
            Ok(Expr::grouping(expr))
        } else if self.match_one(Type::Identifier) {
            Ok(Expr::variable(self.previous().clone()))
        } else if self.match_one(Type::This) {
            Ok(Expr::this(self.previous().clone()))
        } else if self.match_one(Type::Super) {
            let token = self.previous().clone();
            self.consume(Type::Dot, "Expect '.' after 'super'.")?;
            let method = self
                .consume(Type::Identifier, "Expect superclass method name.")?
                .clone();
            Ok(Expr::super_(token, method))
        } else if self.match_one(Type::Lambda) {
            self.consume(Type::LeftParen, "Expect '(' after 'lambda'.")?;
            let params = self.parameters()?;
            self.consume(Type::LeftBrace, "Expect '{' before lambda body.")?;
            let body = self.block()?;
            Ok(Expr::lambda(params, body))
        } else {
            Err(Error::parser_error(self.peek(), "Expect expression."))
        }
    }

    // Parses one level deeper, on a grown stack if the current one is running out.
    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> Result<T, Error>) -> Result<T, Error> {
        self.chain(|parser| {
            parser.deepen()?;
            ensure_sufficient_stack(|| parse(parser))
        })
    }

    // Runs `parse` and restores the nesting depth afterwards, whether it failed or not.
    fn chain<T>(&mut self, parse: impl FnOnce(&mut Self) -> Result<T, Error>) -> Result<T, Error> {
        let outer = self.depth;
        let res = parse(self);
        self.depth = outer;
        res
    }

    fn deepen(&mut self) -> Result<(), Error> {
        if self.depth >= MAX_NESTING {
            return Err(Error::parser_error(self.peek(), "Nesting is too deep."));
        }

        self.depth += 1;
        Ok(())
    }

    fn is_at_end(&self) -> bool {
        self.peek().ty == Type::Eof
    }

    fn check(&self, ty: Type) -> bool {
        if self.is_at_end() {
            false
        } else {
            self.peek().ty == ty
        }
    }

    fn consume(&mut self, ty: Type, msg: &str) -> Result<&Token, Error> {
        if self.check(ty) {
            Ok(self.advance())
        } else {
            Err(Error::parser_error(self.peek(), msg))
        }
    }

    // Discards tokens until a statement boundary so that one mistake doesn't cascade into
    // a series of bogus errors.
    fn synchronize(&mut self) {
        self.advance();

        while !self.is_at_end() {
            if self.previous().ty == Type::SemiColon {
                return;
            }

            match self.peek().ty {
                Type::Class
                | Type::Fun
                | Type::Var
                | Type::Const
                | Type::For
                | Type::If
                | Type::While
                | Type::Print
                | Type::Return
                | Type::Import
                | Type::Break
                | Type::Continue => return,
                _ => {
                    self.advance();
                }
            }
        }
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }

        self.previous()
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.current - 1]
    }

    fn match_either(&mut self, types: &[Type]) -> bool {
        for ty in types {
            if self.match_one(*ty) {
                // Already skipped in the `match_one`, just return result
                return true;
            }
        }

        false
    }

    fn match_one(&mut self, ty: Type) -> bool {
        if self.check(ty) {
            self.advance();
            true
        } else {
            false
        }
    }
}
