use crate::stack::ensure_sufficient_stack;
use loxmod_core::{Literal, Token, Type};
use std::rc::Rc;

// Tokens are cloned into the nodes because they are cheap to clone and cloning only happens
// during parsing. Function declarations are the exception: they are shared through an Rc so that
// every closure created from one refers to the same body.

#[derive(Debug, PartialEq)]
pub(crate) enum Expr {
    Assign {
        name: Token,
        value: Box<Expr>,
    },
    Binary {
        left: Box<Expr>,
        operator: Token,
        right: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        paren: Token,
        args: Vec<Expr>,
    },
    Lambda {
        decl: Rc<FunctionDecl>,
    },
    Get {
        object: Box<Expr>,
        name: Token,
    },
    Grouping {
        expression: Box<Expr>,
    },
    Literal {
        value: Literal,
    },
    Logical {
        left: Box<Expr>,
        operator: Token,
        right: Box<Expr>,
    },
    Set {
        object: Box<Expr>,
        name: Token,
        value: Box<Expr>,
    },
    Super {
        keyword: Token,
        method: Token,
    },
    This {
        keyword: Token,
    },
    Unary {
        operator: Token,
        right: Box<Expr>,
    },
    Variable {
        name: Token,
    },
}

/// Parameters and body shared by named functions, methods and lambdas. `name` is `None` only for
/// lambdas.
#[derive(Debug, PartialEq)]
pub(crate) struct FunctionDecl {
    pub(crate) name: Option<Token>,
    pub(crate) params: Vec<Token>,
    pub(crate) body: Vec<Stmt>,
}

pub(crate) trait ExprVisitor {
    type Item;
    type Error;

    fn visit_expr(&mut self, expr: &Expr) -> Result<Self::Item, Self::Error> {
        ensure_sufficient_stack(|| match expr {
            Expr::Assign { name, value } => self.visit_assign(name, value),
            Expr::Binary {
                left,
                operator,
                right,
            } => self.visit_binary(left, operator, right),
            Expr::Call {
                callee,
                paren,
                args,
            } => self.visit_call(callee, paren, args),
            Expr::Lambda { decl } => self.visit_lambda(decl),
            Expr::Get { object, name } => self.visit_get(object, name),
            Expr::Grouping { expression } => self.visit_grouping(expression),
            Expr::Literal { value } => self.visit_literal(value),
            Expr::Logical {
                left,
                operator,
                right,
            } => self.visit_logical(left, operator, right),
            Expr::Set {
                object,
                name,
                value,
            } => self.visit_set(object, name, value),
            Expr::Super { keyword, method } => self.visit_super(keyword, method),
            Expr::This { keyword } => self.visit_this(keyword),
            Expr::Unary { operator, right } => self.visit_unary(operator, right),
            Expr::Variable { name } => self.visit_variable(name),
        })
    }

    fn visit_assign(&mut self, name: &Token, value: &Expr) -> Result<Self::Item, Self::Error>;
    fn visit_binary(
        &mut self,
        left: &Expr,
        operator: &Token,
        right: &Expr,
    ) -> Result<Self::Item, Self::Error>;
    fn visit_call(
        &mut self,
        callee: &Expr,
        paren: &Token,
        args: &[Expr],
    ) -> Result<Self::Item, Self::Error>;
    fn visit_lambda(&mut self, decl: &Rc<FunctionDecl>) -> Result<Self::Item, Self::Error>;
    fn visit_get(&mut self, object: &Expr, name: &Token) -> Result<Self::Item, Self::Error>;
    fn visit_grouping(&mut self, expression: &Expr) -> Result<Self::Item, Self::Error>;
    fn visit_literal(&mut self, value: &Literal) -> Result<Self::Item, Self::Error>;
    fn visit_logical(
        &mut self,
        left: &Expr,
        operator: &Token,
        right: &Expr,
    ) -> Result<Self::Item, Self::Error>;
    fn visit_set(
        &mut self,
        object: &Expr,
        name: &Token,
        value: &Expr,
    ) -> Result<Self::Item, Self::Error>;
    fn visit_super(&mut self, keyword: &Token, method: &Token) -> Result<Self::Item, Self::Error>;
    fn visit_this(&mut self, keyword: &Token) -> Result<Self::Item, Self::Error>;
    fn visit_unary(&mut self, operator: &Token, right: &Expr) -> Result<Self::Item, Self::Error>;
    fn visit_variable(&mut self, name: &Token) -> Result<Self::Item, Self::Error>;
}

#[allow(dead_code)]
impl Expr {
    // Creator methods, these could most likely be written as a proc-macro, but I will need
    // a separate crate. So here they go.
    pub(crate) fn assign(name: Token, value: Expr) -> Self {
        Expr::Assign {
            name,
            value: Box::new(value),
        }
    }

    pub(crate) fn binary(left: Expr, operator: Token, right: Expr) -> Self {
        Expr::Binary {
            left: Box::new(left),
            operator,
            right: Box::new(right),
        }
    }

    pub(crate) fn call(callee: Expr, paren: Token, args: Vec<Expr>) -> Self {
        Expr::Call {
            callee: Box::new(callee),
            paren,
            args,
        }
    }

    pub(crate) fn lambda(params: Vec<Token>, body: Vec<Stmt>) -> Self {
        Expr::Lambda {
            decl: Rc::new(FunctionDecl {
                name: None,
                params,
                body,
            }),
        }
    }

    pub(crate) fn get(object: Expr, name: Token) -> Self {
        Expr::Get {
            object: Box::new(object),
            name,
        }
    }

    pub(crate) fn grouping(expression: Expr) -> Self {
        Expr::Grouping {
            expression: Box::new(expression),
        }
    }

    pub(crate) fn literal<T>(value: T) -> Self
    where
        Literal: From<T>,
    {
        Expr::Literal {
            value: Literal::from(value),
        }
    }

    pub(crate) fn nil() -> Self {
        Expr::Literal {
            value: Literal::Nil,
        }
    }

    pub(crate) fn logical(left: Expr, operator: Token, right: Expr) -> Self {
        Expr::Logical {
            left: Box::new(left),
            operator,
            right: Box::new(right),
        }
    }

    pub(crate) fn set(object: Expr, name: Token, value: Expr) -> Self {
        Expr::Set {
            object: Box::new(object),
            name,
            value: Box::new(value),
        }
    }

    pub(crate) fn super_(keyword: Token, method: Token) -> Self {
        Expr::Super { keyword, method }
    }

    pub(crate) fn this(keyword: Token) -> Self {
        Expr::This { keyword }
    }

    pub(crate) fn unary(operator: Token, right: Expr) -> Self {
        Expr::Unary {
            operator,
            right: Box::new(right),
        }
    }

    pub(crate) fn variable(name: Token) -> Self {
        Expr::Variable { name }
    }
}

/// Binding kind of a `var`/`const` declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum VarKind {
    Var,
    Const,
}

#[derive(Debug, PartialEq)]
pub(crate) enum Stmt {
    Import {
        keyword: Token,
        name: Token,
        alias: Option<Token>,
    },
    Block {
        statements: Vec<Stmt>,
    },
    Class {
        name: Token,
        superclass: Option<Expr>, // only Variable is allowed here
        methods: Vec<Rc<FunctionDecl>>,
    },
    Expression {
        expression: Expr,
    },
    Function {
        decl: Rc<FunctionDecl>,
    },
    If {
        condition: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },
    Print {
        keyword: Token,
        expression: Expr,
    },
    Return {
        keyword: Token,
        value: Option<Expr>,
    },
    Var {
        name: Token,
        init: Option<Expr>,
        kind: VarKind,
    },
    While {
        condition: Expr,
        body: Box<Stmt>,
        // Only set by a desugared `for`, so that `continue` still runs the increment.
        increment: Option<Expr>,
    },
    Break {
        keyword: Token,
    },
    Continue {
        keyword: Token,
    },
}

pub(crate) trait StmtVisitor {
    type Item;
    type Error;

    fn visit_stmt(&mut self, stmt: &Stmt) -> Result<Self::Item, Self::Error> {
        ensure_sufficient_stack(|| match stmt {
            Stmt::Import {
                keyword,
                name,
                alias,
            } => self.visit_import(keyword, name, alias.as_ref()),
            Stmt::Block { statements } => self.visit_block(statements),
            Stmt::Class {
                name,
                superclass,
                methods,
            } => self.visit_class(name, superclass.as_ref(), methods),
            Stmt::Expression { expression } => self.visit_expression(expression),
            Stmt::Function { decl } => self.visit_function(decl),
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => self.visit_if(condition, then_branch, else_branch.as_deref()),
            Stmt::Print {
                keyword,
                expression,
            } => self.visit_print(keyword, expression),
            Stmt::Return { keyword, value } => self.visit_return(keyword, value.as_ref()),
            Stmt::Var { name, init, kind } => self.visit_var(name, init.as_ref(), *kind),
            Stmt::While {
                condition,
                body,
                increment,
            } => self.visit_while(condition, body, increment.as_ref()),
            Stmt::Break { keyword } => self.visit_break(keyword),
            Stmt::Continue { keyword } => self.visit_continue(keyword),
        })
    }

    fn visit_import(
        &mut self,
        keyword: &Token,
        name: &Token,
        alias: Option<&Token>,
    ) -> Result<Self::Item, Self::Error>;
    fn visit_block(&mut self, statements: &[Stmt]) -> Result<Self::Item, Self::Error>;
    fn visit_class(
        &mut self,
        name: &Token,
        superclass: Option<&Expr>,
        methods: &[Rc<FunctionDecl>],
    ) -> Result<Self::Item, Self::Error>;
    fn visit_expression(&mut self, expression: &Expr) -> Result<Self::Item, Self::Error>;
    fn visit_function(&mut self, decl: &Rc<FunctionDecl>) -> Result<Self::Item, Self::Error>;
    fn visit_if(
        &mut self,
        condition: &Expr,
        then_branch: &Stmt,
        else_branch: Option<&Stmt>,
    ) -> Result<Self::Item, Self::Error>;
    fn visit_print(&mut self, keyword: &Token, expression: &Expr)
        -> Result<Self::Item, Self::Error>;
    fn visit_return(
        &mut self,
        keyword: &Token,
        value: Option<&Expr>,
    ) -> Result<Self::Item, Self::Error>;
    fn visit_var(
        &mut self,
        name: &Token,
        init: Option<&Expr>,
        kind: VarKind,
    ) -> Result<Self::Item, Self::Error>;
    fn visit_while(
        &mut self,
        condition: &Expr,
        body: &Stmt,
        increment: Option<&Expr>,
    ) -> Result<Self::Item, Self::Error>;
    fn visit_break(&mut self, keyword: &Token) -> Result<Self::Item, Self::Error>;
    fn visit_continue(&mut self, keyword: &Token) -> Result<Self::Item, Self::Error>;
}

#[allow(dead_code)]
impl Stmt {
    pub(crate) fn block(statements: Vec<Stmt>) -> Self {
        Stmt::Block { statements }
    }

    pub(crate) fn expression(expression: Expr) -> Self {
        Stmt::Expression { expression }
    }

    pub(crate) fn function(name: Token, params: Vec<Token>, body: Vec<Stmt>) -> Self {
        Stmt::Function {
            decl: Rc::new(FunctionDecl {
                name: Some(name),
                params,
                body,
            }),
        }
    }

    pub(crate) fn if_(condition: Expr, then_branch: Stmt, else_branch: Option<Stmt>) -> Self {
        Stmt::If {
            condition,
            then_branch: Box::new(then_branch),
            else_branch: else_branch.map(Box::new),
        }
    }

    pub(crate) fn while_(condition: Expr, body: Stmt, increment: Option<Expr>) -> Self {
        Stmt::While {
            condition,
            body: Box::new(body),
            increment,
        }
    }

    pub(crate) fn print(keyword: Token, expression: Expr) -> Self {
        Stmt::Print {
            keyword,
            expression,
        }
    }

    pub(crate) fn return_(keyword: Token, value: Option<Expr>) -> Self {
        Stmt::Return { keyword, value }
    }

    pub(crate) fn var(name: Token, init: Option<Expr>, kind: VarKind) -> Self {
        Stmt::Var { name, init, kind }
    }
}

/// Name a module is loaded by: an identifier's lexeme or a string literal's contents.
pub(crate) fn module_name(token: &Token) -> String {
    match (&token.ty, &token.value) {
        (Type::String, Literal::Str(name)) => name.clone(),
        _ => token.lexeme.clone(),
    }
}
