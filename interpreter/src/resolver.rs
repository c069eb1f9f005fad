use crate::ast::{module_name, Expr, ExprVisitor, FunctionDecl, Stmt, StmtVisitor, VarKind};
use crate::error::Error;
use crate::parser::StmtStream;
use ahash::{AHashMap, AHashSet};
use loxmod_core::{Literal, Token, TokenIndex};
use std::convert::Infallible;
use std::rc::Rc;
use tracing::trace;

#[derive(Debug, Clone, Copy)]
struct Binding {
    // false between the declaration and the end of its initializer
    defined: bool,
    constant: bool,
}

#[derive(Debug, Copy, Clone, PartialEq)]
enum FunctionType {
    None,
    Function,
    Lambda,
    Initializer,
    Method,
}

#[derive(Debug, Copy, Clone, PartialEq)]
enum ClassType {
    None,
    Class,
    Subclass,
}

/// Scope distances of resolved variable, `this` and `super` references, keyed by the index of the
/// token naming them. A reference without an entry is a module global.
#[derive(Debug, Default)]
pub(crate) struct Locals(AHashMap<TokenIndex, usize>);

impl Locals {
    pub(crate) fn get(&self, idx: TokenIndex) -> Option<usize> {
        self.0.get(&idx).copied()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.0.len()
    }
}

pub(crate) struct Resolver {
    scopes: Vec<AHashMap<String, Binding>>,

    // Globals live in the module's environment rather than a scope, constness is tracked on the side
    global_consts: AHashSet<String>,
    locals: Locals,
    errors: Vec<Error>,
    current_fun: FunctionType,
    current_cls: ClassType,
    loop_depth: usize,
}

type ResolveResult = Result<(), Infallible>;

impl Resolver {
    pub(crate) fn new() -> Self {
        Resolver {
            scopes: Vec::new(),
            global_consts: AHashSet::new(),
            locals: Locals::default(),
            errors: Vec::new(),
            current_fun: FunctionType::None,
            current_cls: ClassType::None,
            loop_depth: 0,
        }
    }

    /// Resolves a whole module, or more code of a module that already declared globals, e.g. one
    /// line typed at the prompt. Every error found is reported, not only the first one.
    ///
    /// `global_consts` names the module's constant globals. It is only updated if resolution
    /// succeeds, since code that fails to resolve never runs.
    pub(crate) fn resolve(
        mut self,
        stmts: &StmtStream,
        global_consts: &mut AHashSet<String>,
    ) -> Result<Locals, Vec<Error>> {
        self.global_consts = global_consts.clone();
        self.resolve_stmts(&stmts.0).unwrap_or_else(|never| match never {});

        if self.errors.is_empty() {
            *global_consts = self.global_consts;
            Ok(self.locals)
        } else {
            Err(self.errors)
        }
    }

    fn resolve_stmts(&mut self, stmts: &[Stmt]) -> ResolveResult {
        for stmt in stmts {
            self.visit_stmt(stmt)?;
        }
        Ok(())
    }

    fn error(&mut self, token: &Token, msg: &str) {
        self.errors.push(Error::resolver_error(token, msg));
    }

    fn begin_scope(&mut self) {
        self.scopes.push(AHashMap::new());
    }

    fn end_scope(&mut self) {
        self.scopes.pop();
    }

    // Binds a name the parser did not produce a declaration token for, e.g. `this` and `super`
    fn bind_synthetic(&mut self, name: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(
                String::from(name),
                Binding {
                    defined: true,
                    constant: false,
                },
            );
        }
    }

    fn declare(&mut self, token: &Token, kind: VarKind) {
        let constant = kind == VarKind::Const;
        let Some(scope) = self.scopes.last_mut() else {
            if constant {
                self.global_consts.insert(token.lexeme.clone());
            } else {
                self.global_consts.remove(&token.lexeme);
            }
            return;
        };

        if scope.contains_key(&token.lexeme) {
            self.error(token, "Already a variable with this name in this scope.");
        } else {
            scope.insert(
                token.lexeme.clone(),
                Binding {
                    defined: false,
                    constant,
                },
            );
        }
    }

    fn define(&mut self, token: &Token) {
        if let Some(binding) = self
            .scopes
            .last_mut()
            .and_then(|scope| scope.get_mut(&token.lexeme))
        {
            binding.defined = true;
        }
    }

    fn resolve_local(&mut self, token: &Token) {
        let depth = self
            .scopes
            .iter()
            .rev()
            .position(|scope| scope.contains_key(&token.lexeme));

        if let Some(distance) = depth {
            trace!(name = %token.lexeme, line = token.line, distance, "resolved local");
            self.locals.0.insert(token.idx, distance);
        }
    }

    // Whether the binding `name` refers to from the current position was declared with `const`.
    fn is_constant(&self, name: &str) -> bool {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
            .map_or_else(|| self.global_consts.contains(name), |binding| binding.constant)
    }

    fn resolve_function(&mut self, decl: &FunctionDecl, ty: FunctionType) -> ResolveResult {
        let enclosing_fun = self.current_fun;
        let enclosing_loop = self.loop_depth;
        self.current_fun = ty;

        // loops don't reach into function bodies, `break` inside one refers to nothing
        self.loop_depth = 0;

        self.begin_scope();
        for param in &decl.params {
            self.declare(param, VarKind::Var);
            self.define(param);
        }
        self.resolve_stmts(&decl.body)?;
        self.end_scope();

        self.current_fun = enclosing_fun;
        self.loop_depth = enclosing_loop;
        Ok(())
    }

    fn validate_import(&mut self, name: &Token, alias: Option<&Token>) {
        let module = module_name(name);

        if module.is_empty() {
            self.error(name, "Import name cannot be empty.");
            return;
        }

        let valid = |c: char| c.is_ascii_alphanumeric() || matches!(c, '\\' | '/' | '-' | '_' | '.');
        if !module.chars().all(valid) {
            self.error(name, "Import name must be a valid module name.");
            return;
        }

        if module.ends_with(&['/', '\\'][..]) {
            self.error(name, "Import name must not end with a slash.");
            return;
        }

        if alias.is_none() && module.contains(&['\\', '/', '-', '.'][..]) {
            self.error(
                name,
                "Expected alias: Import name contains one or more of following characters: '\\', '/', '-', '.'.",
            );
        }
    }
}

impl StmtVisitor for Resolver {
    type Item = ();
    type Error = Infallible;

    fn visit_import(
        &mut self,
        keyword: &Token,
        name: &Token,
        alias: Option<&Token>,
    ) -> ResolveResult {
        if !self.scopes.is_empty() {
            self.error(keyword, "Can only import at the top level of a module.");
            return Ok(());
        }

        self.validate_import(name, alias);

        // Imports always bind a global, which replaces any constant of the same name
        let bound = alias.map_or_else(|| module_name(name), |alias| alias.lexeme.clone());
        self.global_consts.remove(&bound);
        Ok(())
    }

    fn visit_block(&mut self, statements: &[Stmt]) -> ResolveResult {
        self.begin_scope();
        self.resolve_stmts(statements)?;
        self.end_scope();
        Ok(())
    }

    fn visit_class(
        &mut self,
        name: &Token,
        superclass: Option<&Expr>,
        methods: &[Rc<FunctionDecl>],
    ) -> ResolveResult {
        let enclosing = self.current_cls;
        self.current_cls = ClassType::Class;
        self.declare(name, VarKind::Var);
        self.define(name);

        if let Some(superclass) = superclass {
            if let Expr::Variable { name: super_name } = superclass {
                if super_name.lexeme == name.lexeme {
                    self.error(super_name, "A class can't inherit from itself.");
                }
            }

            self.current_cls = ClassType::Subclass;
            self.visit_expr(superclass)?;
            self.begin_scope();
            self.bind_synthetic("super");
        }

        self.begin_scope();
        self.bind_synthetic("this");
        for method in methods {
            let ty = match &method.name {
                Some(name) if name.lexeme == "init" => FunctionType::Initializer,
                _ => FunctionType::Method,
            };
            self.resolve_function(method, ty)?;
        }
        self.end_scope();

        if superclass.is_some() {
            self.end_scope();
        }

        self.current_cls = enclosing;
        Ok(())
    }

    fn visit_expression(&mut self, expression: &Expr) -> ResolveResult {
        self.visit_expr(expression)
    }

    fn visit_function(&mut self, decl: &Rc<FunctionDecl>) -> ResolveResult {
        // Defined before the body is resolved so that the function can call itself
        if let Some(name) = &decl.name {
            self.declare(name, VarKind::Var);
            self.define(name);
        }
        self.resolve_function(decl, FunctionType::Function)
    }

    fn visit_if(
        &mut self,
        condition: &Expr,
        then_branch: &Stmt,
        else_branch: Option<&Stmt>,
    ) -> ResolveResult {
        self.visit_expr(condition)?;
        self.visit_stmt(then_branch)?;
        if let Some(else_branch) = else_branch {
            self.visit_stmt(else_branch)?;
        }
        Ok(())
    }

    fn visit_print(&mut self, _: &Token, expression: &Expr) -> ResolveResult {
        self.visit_expr(expression)
    }

    fn visit_return(&mut self, keyword: &Token, value: Option<&Expr>) -> ResolveResult {
        if self.current_fun == FunctionType::None {
            self.error(keyword, "Can't return from top-level code.");
        }

        if let Some(value) = value {
            if self.current_fun == FunctionType::Initializer {
                self.error(keyword, "Can't return a value from an initializer.");
            }
            self.visit_expr(value)?;
        }
        Ok(())
    }

    fn visit_var(&mut self, name: &Token, init: Option<&Expr>, kind: VarKind) -> ResolveResult {
        self.declare(name, kind);
        if let Some(init) = init {
            self.visit_expr(init)?;
        }
        self.define(name);
        Ok(())
    }

    fn visit_while(
        &mut self,
        condition: &Expr,
        body: &Stmt,
        increment: Option<&Expr>,
    ) -> ResolveResult {
        self.visit_expr(condition)?;

        self.loop_depth += 1;
        self.visit_stmt(body)?;
        self.loop_depth -= 1;

        if let Some(increment) = increment {
            self.visit_expr(increment)?;
        }
        Ok(())
    }

    fn visit_break(&mut self, keyword: &Token) -> ResolveResult {
        if self.loop_depth == 0 {
            self.error(keyword, "Can't use 'break' outside of a loop.");
        }
        Ok(())
    }

    fn visit_continue(&mut self, keyword: &Token) -> ResolveResult {
        if self.loop_depth == 0 {
            self.error(keyword, "Can't use 'continue' outside of a loop.");
        }
        Ok(())
    }
}

impl ExprVisitor for Resolver {
    type Item = ();
    type Error = Infallible;

    fn visit_assign(&mut self, name: &Token, value: &Expr) -> ResolveResult {
        self.visit_expr(value)?;
        if self.is_constant(&name.lexeme) {
            self.error(name, "Cannot reassign a constant.");
        }
        self.resolve_local(name);
        Ok(())
    }

    fn visit_binary(&mut self, left: &Expr, _: &Token, right: &Expr) -> ResolveResult {
        self.visit_expr(left)?;
        self.visit_expr(right)
    }

    fn visit_call(&mut self, callee: &Expr, _: &Token, args: &[Expr]) -> ResolveResult {
        self.visit_expr(callee)?;
        for arg in args {
            self.visit_expr(arg)?;
        }
        Ok(())
    }

    fn visit_lambda(&mut self, decl: &Rc<FunctionDecl>) -> ResolveResult {
        self.resolve_function(decl, FunctionType::Lambda)
    }

    fn visit_get(&mut self, object: &Expr, _: &Token) -> ResolveResult {
        self.visit_expr(object)
    }

    fn visit_grouping(&mut self, expression: &Expr) -> ResolveResult {
        self.visit_expr(expression)
    }

    fn visit_literal(&mut self, _: &Literal) -> ResolveResult {
        Ok(())
    }

    fn visit_logical(&mut self, left: &Expr, _: &Token, right: &Expr) -> ResolveResult {
        self.visit_expr(left)?;
        self.visit_expr(right)
    }

    fn visit_set(&mut self, object: &Expr, name: &Token, value: &Expr) -> ResolveResult {
        self.visit_expr(value)?;
        if let Expr::Variable { name: object_name } = object {
            if self.is_constant(&object_name.lexeme) {
                self.error(name, "Cannot modify a field of a constant object.");
            }
        }
        self.visit_expr(object)
    }

    fn visit_super(&mut self, keyword: &Token, _: &Token) -> ResolveResult {
        match self.current_cls {
            ClassType::None => self.error(keyword, "Can't use 'super' outside of a class."),
            ClassType::Class => {
                self.error(keyword, "Can't use 'super' in a class with no superclass.")
            }
            ClassType::Subclass => self.resolve_local(keyword),
        }
        Ok(())
    }

    fn visit_this(&mut self, keyword: &Token) -> ResolveResult {
        if self.current_cls == ClassType::None {
            self.error(keyword, "Can't use 'this' outside of a class.");
        } else {
            self.resolve_local(keyword);
        }
        Ok(())
    }

    fn visit_unary(&mut self, _: &Token, right: &Expr) -> ResolveResult {
        self.visit_expr(right)
    }

    fn visit_variable(&mut self, name: &Token) -> ResolveResult {
        // Check if variable is being accessed in its own initializer,
        // which means the variables is declared, but value not bound yet
        let in_own_initializer = self
            .scopes
            .last()
            .and_then(|scope| scope.get(&name.lexeme))
            .map_or(false, |binding| !binding.defined);

        if in_own_initializer {
            self.error(name, "Can't read local variable in its own initializer.");
        }

        self.resolve_local(name);
        Ok(())
    }
}
