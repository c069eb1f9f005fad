use std::cell::RefCell;
use std::rc::Rc;

use ahash::AHashMap;
use loxmod_core::{Literal, Token, Type};
use tracing::{debug, trace};

use crate::ast::{module_name, Expr, ExprVisitor, FunctionDecl, Stmt, StmtVisitor, VarKind};
use crate::callable::{Callable, Class, Function, Instance, Method};
use crate::env::Environment;
use crate::error::{RuntimeError, RuntimeResult};
use crate::limits::MAX_CALL_DEPTH;
use crate::module::Host;
use crate::parser::StmtStream;
use crate::resolver::Locals;
use crate::stack::ensure_sufficient_stack;
use crate::value::Value;

/// What a function body was compiled against: the resolver's side-table and the module's globals.
/// Every function keeps the context of the module it was declared in.
pub(crate) struct ModuleContext {
    pub(crate) globals: Rc<RefCell<Environment>>,
    pub(crate) locals: Locals,
}

/// How a statement finished. Anything but `Normal` unwinds until a loop or a call consumes it.
#[derive(Debug, PartialEq)]
pub(crate) enum Signal {
    Normal,
    Break,
    Continue,
    Return(Value),
}

pub struct Interpreter {
    ctx: Rc<ModuleContext>,
    env: Rc<RefCell<Environment>>,
    host: Host,

    // number of calls currently on the stack
    depth: usize,
}

impl Interpreter {
    pub(crate) fn new(host: Host, globals: Rc<RefCell<Environment>>, locals: Locals) -> Self {
        Interpreter {
            env: Rc::clone(&globals),
            ctx: Rc::new(ModuleContext { globals, locals }),
            host,
            depth: 0,
        }
    }

    pub(crate) fn interpret(&mut self, stmts: &StmtStream) -> RuntimeResult<()> {
        for stmt in &stmts.0 {
            // break, continue and return never reach the top level, the resolver rejects them
            self.visit_stmt(stmt)?;
        }
        Ok(())
    }

    pub(crate) fn execute_block_with_env(
        &mut self,
        stmts: &[Stmt],
        env: Rc<RefCell<Environment>>,
    ) -> RuntimeResult<Signal> {
        let previous = std::mem::replace(&mut self.env, env);
        let res = self.execute_all(stmts);
        self.env = previous;
        res
    }

    /// Runs a function body. The body may belong to another module, so its resolution results
    /// and globals are swapped in for the duration of the call.
    pub(crate) fn execute_in_context(
        &mut self,
        stmts: &[Stmt],
        env: Rc<RefCell<Environment>>,
        ctx: Rc<ModuleContext>,
    ) -> RuntimeResult<Signal> {
        let previous = std::mem::replace(&mut self.ctx, ctx);
        let res = self.execute_block_with_env(stmts, env);
        self.ctx = previous;
        res
    }

    fn execute_all(&mut self, stmts: &[Stmt]) -> RuntimeResult<Signal> {
        for stmt in stmts {
            match self.visit_stmt(stmt)? {
                Signal::Normal => {}
                signal => return Ok(signal),
            }
        }
        Ok(Signal::Normal)
    }

    fn call(
        &mut self,
        callee: Rc<dyn Callable>,
        args: &[Value],
        paren: &Token,
    ) -> RuntimeResult<Value> {
        if callee.arity() != args.len() {
            return Err(RuntimeError::ArityMismatch {
                expected: callee.arity(),
                actual: args.len(),
                line: paren.line,
            });
        }

        if self.depth >= MAX_CALL_DEPTH {
            return Err(RuntimeError::StackOverflow { line: paren.line });
        }

        trace!(callee = callee.name(), depth = self.depth, "call");
        self.depth += 1;
        let res = ensure_sufficient_stack(|| callee.execute(self, args));
        self.depth -= 1;
        res
    }

    fn lookup_variable(&self, name: &Token) -> RuntimeResult<Value> {
        let res = match self.ctx.locals.get(name.idx) {
            Some(dist) => Environment::get_at(&self.env, dist, &name.lexeme),
            None => self.ctx.globals.borrow().get(&name.lexeme),
        };
        res.map_err(|_| RuntimeError::undefined_variable(name))
    }

    fn make_function(&self, decl: &Rc<FunctionDecl>, is_initializer: bool) -> Rc<Function> {
        Rc::new(Function::new(
            Rc::clone(decl),
            Rc::clone(&self.env),
            Rc::clone(&self.ctx),
            is_initializer,
        ))
    }

    fn number_operands(left: Value, right: Value, operator: &Token) -> RuntimeResult<(f64, f64)> {
        match (left, right) {
            (Value::Num(left), Value::Num(right)) => Ok((left, right)),
            _ => Err(RuntimeError::OperandsNotNumbers {
                line: operator.line,
            }),
        }
    }
}

impl ExprVisitor for Interpreter {
    type Item = Value;
    type Error = RuntimeError;

    fn visit_assign(&mut self, name: &Token, value: &Expr) -> RuntimeResult<Value> {
        let value = self.visit_expr(value)?;

        let res = match self.ctx.locals.get(name.idx) {
            Some(dist) => Environment::assign_at(&self.env, dist, &name.lexeme, value.clone()),
            None => self
                .ctx
                .globals
                .borrow_mut()
                .assign(&name.lexeme, value.clone()),
        };

        res.map_err(|_| RuntimeError::undefined_variable(name))?;
        Ok(value)
    }

    fn visit_binary(&mut self, left: &Expr, operator: &Token, right: &Expr) -> RuntimeResult<Value> {
        let left = self.visit_expr(left)?;
        let right = self.visit_expr(right)?;

        match operator.ty {
            Type::Plus => match (left, right) {
                (Value::Num(left), Value::Num(right)) => Ok(Value::Num(left + right)),
                (Value::Str(left), Value::Str(right)) => Ok(Value::from(format!("{}{}", left, right))),
                _ => Err(RuntimeError::InvalidAddOperands {
                    line: operator.line,
                }),
            },
            Type::Minus => {
                let (left, right) = Self::number_operands(left, right, operator)?;
                Ok(Value::Num(left - right))
            }
            Type::Star => {
                let (left, right) = Self::number_operands(left, right, operator)?;
                Ok(Value::Num(left * right))
            }
            Type::Slash => {
                let (left, right) = Self::number_operands(left, right, operator)?;
                Ok(Value::Num(left / right))
            }
            Type::Percent => {
                let (left, right) = Self::number_operands(left, right, operator)?;
                Ok(Value::Num(left % right))
            }
            Type::Greater => {
                let (left, right) = Self::number_operands(left, right, operator)?;
                Ok(Value::Bool(left > right))
            }
            Type::GreaterEqual => {
                let (left, right) = Self::number_operands(left, right, operator)?;
                Ok(Value::Bool(left >= right))
            }
            Type::Less => {
                let (left, right) = Self::number_operands(left, right, operator)?;
                Ok(Value::Bool(left < right))
            }
            Type::LessEqual => {
                let (left, right) = Self::number_operands(left, right, operator)?;
                Ok(Value::Bool(left <= right))
            }
            Type::EqualEqual => Ok(Value::Bool(left == right)),
            Type::BangEqual => Ok(Value::Bool(left != right)),
            _ => unreachable!("parser produced binary operator {:?}", operator.ty),
        }
    }

    fn visit_call(&mut self, callee: &Expr, paren: &Token, args: &[Expr]) -> RuntimeResult<Value> {
        let callee = self.visit_expr(callee)?;
        let mut evaluated_args = Vec::with_capacity(args.len());
        for arg in args {
            evaluated_args.push(self.visit_expr(arg)?);
        }

        let callable: Rc<dyn Callable> = match callee {
            Value::Callable(callable) => callable,
            Value::Class(class) => class,
            _ => return Err(RuntimeError::NotCallable { line: paren.line }),
        };

        self.call(callable, &evaluated_args, paren)
    }

    fn visit_lambda(&mut self, decl: &Rc<FunctionDecl>) -> RuntimeResult<Value> {
        Ok(Value::Callable(self.make_function(decl, false)))
    }

    fn visit_get(&mut self, object: &Expr, name: &Token) -> RuntimeResult<Value> {
        match self.visit_expr(object)? {
            Value::Instance(instance) => Instance::get(&instance, &name.lexeme)
                .ok_or_else(|| RuntimeError::undefined_property(name)),
            Value::Module(namespace) => namespace
                .get(&name.lexeme)
                .map_err(|_| RuntimeError::undefined_variable(name)),
            _ => Err(RuntimeError::NotAnInstance {
                what: "properties",
                line: name.line,
            }),
        }
    }

    fn visit_grouping(&mut self, expression: &Expr) -> RuntimeResult<Value> {
        self.visit_expr(expression)
    }

    fn visit_literal(&mut self, value: &Literal) -> RuntimeResult<Value> {
        Ok(Value::from(value))
    }

    fn visit_logical(&mut self, left: &Expr, operator: &Token, right: &Expr) -> RuntimeResult<Value> {
        let left = self.visit_expr(left)?;

        // If token is "or", execution of right is only necessary if left is falsy
        // If token is "and", execution of right is only necessary if left is truthy
        // Otherwise left already decides the result and is returned as is.
        if operator.ty == Type::Or {
            if left.is_truthy() {
                return Ok(left);
            }
        } else if !left.is_truthy() {
            return Ok(left);
        }

        self.visit_expr(right)
    }

    fn visit_set(&mut self, object: &Expr, name: &Token, value: &Expr) -> RuntimeResult<Value> {
        match self.visit_expr(object)? {
            Value::Instance(instance) => {
                let value = self.visit_expr(value)?;
                Ok(instance.borrow_mut().set(&name.lexeme, value))
            }
            Value::Module(namespace) => {
                let value = self.visit_expr(value)?;
                namespace
                    .assign(&name.lexeme, value.clone())
                    .map_err(|_| RuntimeError::undefined_variable(name))?;
                Ok(value)
            }
            _ => Err(RuntimeError::NotAnInstance {
                what: "fields",
                line: name.line,
            }),
        }
    }

    fn visit_super(&mut self, keyword: &Token, method: &Token) -> RuntimeResult<Value> {
        let dist = self
            .ctx
            .locals
            .get(keyword.idx)
            .ok_or_else(|| RuntimeError::undefined_variable(keyword))?;

        // `this` is bound in the frame right inside the one holding `super`
        let superclass = Environment::get_at(&self.env, dist, "super");
        let instance = Environment::get_at(&self.env, dist.saturating_sub(1), "this");

        match (superclass, instance) {
            (Ok(Value::Class(superclass)), Ok(Value::Instance(instance))) => superclass
                .find_method(&method.lexeme)
                .map(|function| Value::Callable(Rc::new(Method::bind(function, instance))))
                .ok_or_else(|| RuntimeError::undefined_property(method)),
            _ => Err(RuntimeError::undefined_variable(keyword)),
        }
    }

    fn visit_this(&mut self, keyword: &Token) -> RuntimeResult<Value> {
        self.lookup_variable(keyword)
    }

    fn visit_unary(&mut self, operator: &Token, right: &Expr) -> RuntimeResult<Value> {
        let right = self.visit_expr(right)?;
        match (operator.ty, right) {
            (Type::Minus, Value::Num(val)) => Ok(Value::Num(-val)),
            (Type::Minus, _) => Err(RuntimeError::OperandNotNumber {
                line: operator.line,
            }),
            (Type::Bang, val) => Ok(Value::Bool(!val.is_truthy())),
            (ty, _) => unreachable!("parser produced unary operator {:?}", ty),
        }
    }

    fn visit_variable(&mut self, name: &Token) -> RuntimeResult<Value> {
        self.lookup_variable(name)
    }
}

impl StmtVisitor for Interpreter {
    type Item = Signal;
    type Error = RuntimeError;

    fn visit_import(
        &mut self,
        keyword: &Token,
        name: &Token,
        alias: Option<&Token>,
    ) -> RuntimeResult<Signal> {
        let module = module_name(name);
        let namespace =
            self.host
                .import(&module)
                .map_err(|source| RuntimeError::Import {
                    name: module.clone(),
                    line: keyword.line,
                    source: Box::new(source),
                })?;

        let bound = alias.map_or_else(|| module.clone(), |alias| alias.lexeme.clone());
        debug!(module = %module, binding = %bound, "bound import");
        self.ctx
            .globals
            .borrow_mut()
            .define(&bound, Value::Module(namespace));
        Ok(Signal::Normal)
    }

    fn visit_block(&mut self, statements: &[Stmt]) -> RuntimeResult<Signal> {
        let env = Rc::new(RefCell::new(Environment::with(Rc::clone(&self.env))));
        self.execute_block_with_env(statements, env)
    }

    fn visit_class(
        &mut self,
        name: &Token,
        superclass: Option<&Expr>,
        methods: &[Rc<FunctionDecl>],
    ) -> RuntimeResult<Signal> {
        let superclass = match superclass {
            Some(expr) => match self.visit_expr(expr)? {
                Value::Class(class) => Some(class),
                _ => {
                    let line = match expr {
                        Expr::Variable { name: super_name } => super_name.line,
                        _ => name.line,
                    };
                    return Err(RuntimeError::SuperclassNotClass { line });
                }
            },
            None => None,
        };

        self.env.borrow_mut().define(&name.lexeme, Value::Nil);

        // Methods of a subclass close over an extra frame holding `super`
        let enclosing = superclass.as_ref().map(|superclass| {
            let mut env = Environment::with(Rc::clone(&self.env));
            env.define("super", Value::Class(Rc::clone(superclass)));
            std::mem::replace(&mut self.env, Rc::new(RefCell::new(env)))
        });

        let mut class_methods = AHashMap::new();
        for decl in methods {
            let method_name = decl.name.as_ref().map_or("", |name| name.lexeme.as_str());
            let function = self.make_function(decl, method_name == "init");
            class_methods.insert(String::from(method_name), function);
        }

        if let Some(enclosing) = enclosing {
            self.env = enclosing;
        }

        let class = Class::new(&name.lexeme, superclass, class_methods);
        self.env
            .borrow_mut()
            .define(&name.lexeme, Value::Class(class));
        Ok(Signal::Normal)
    }

    fn visit_expression(&mut self, expression: &Expr) -> RuntimeResult<Signal> {
        self.visit_expr(expression)?;
        Ok(Signal::Normal)
    }

    fn visit_function(&mut self, decl: &Rc<FunctionDecl>) -> RuntimeResult<Signal> {
        let function = self.make_function(decl, false);
        let name = function.name().to_string();
        self.env
            .borrow_mut()
            .define(&name, Value::Callable(function));
        Ok(Signal::Normal)
    }

    fn visit_if(
        &mut self,
        condition: &Expr,
        then_branch: &Stmt,
        else_branch: Option<&Stmt>,
    ) -> RuntimeResult<Signal> {
        if self.visit_expr(condition)?.is_truthy() {
            self.visit_stmt(then_branch)
        } else if let Some(else_branch) = else_branch {
            self.visit_stmt(else_branch)
        } else {
            Ok(Signal::Normal)
        }
    }

    fn visit_print(&mut self, keyword: &Token, expression: &Expr) -> RuntimeResult<Signal> {
        let value = self.visit_expr(expression)?;
        writeln!(self.host.stdout().borrow_mut(), "{}", value).map_err(|source| {
            RuntimeError::Output {
                line: keyword.line,
                source,
            }
        })?;
        Ok(Signal::Normal)
    }

    fn visit_return(&mut self, _: &Token, value: Option<&Expr>) -> RuntimeResult<Signal> {
        let value = match value {
            Some(value) => self.visit_expr(value)?,
            None => Value::Nil,
        };
        Ok(Signal::Return(value))
    }

    fn visit_var(&mut self, name: &Token, init: Option<&Expr>, _: VarKind) -> RuntimeResult<Signal> {
        // constness is checked by the resolver, at runtime both kinds are plain bindings
        let value = match init {
            Some(init) => self.visit_expr(init)?,
            None => Value::Nil,
        };

        self.env.borrow_mut().define(&name.lexeme, value);
        Ok(Signal::Normal)
    }

    fn visit_while(
        &mut self,
        condition: &Expr,
        body: &Stmt,
        increment: Option<&Expr>,
    ) -> RuntimeResult<Signal> {
        while self.visit_expr(condition)?.is_truthy() {
            match self.visit_stmt(body)? {
                Signal::Break => break,
                signal @ Signal::Return(_) => return Ok(signal),
                Signal::Normal | Signal::Continue => {}
            }

            if let Some(increment) = increment {
                self.visit_expr(increment)?;
            }
        }
        Ok(Signal::Normal)
    }

    fn visit_break(&mut self, _: &Token) -> RuntimeResult<Signal> {
        Ok(Signal::Break)
    }

    fn visit_continue(&mut self, _: &Token) -> RuntimeResult<Signal> {
        Ok(Signal::Continue)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::str;

    use pretty_assertions::assert_eq;

    use crate::error::ModuleError;
    use crate::module::{Host, Module};

    struct Run {
        result: Result<(), ModuleError>,
        out: String,
        err: String,
    }

    fn run(src: &str) -> Run {
        let out: Rc<RefCell<Vec<u8>>> = Rc::new(RefCell::new(Vec::new()));
        let err: Rc<RefCell<Vec<u8>>> = Rc::new(RefCell::new(Vec::new()));
        let host = Host::with_output(".", out.clone(), err.clone());

        let mut module = Module::from_source(&host, "__main__", src);
        let result = module.init();

        let out = str::from_utf8(&out.borrow()).unwrap().to_string();
        let err = str::from_utf8(&err.borrow()).unwrap().to_string();
        Run { result, out, err }
    }

    fn test_statements(src: &str, expected: &str) {
        let run = run(src);
        assert!(
            run.result.is_ok(),
            "Not expecting any error, found '{}'",
            run.err
        );
        assert_eq!(run.out, expected);
    }

    fn test_runtime_error(src: &str, expected: &str) {
        let run = run(src);
        match run.result {
            Err(err @ ModuleError::Runtime { .. }) => assert_eq!(err.exit_code(), 70),
            other => panic!("Expecting a runtime error for '{}', found {:?}", src, other),
        }
        assert_eq!(run.err, expected, "source: {}", src);
    }

    #[test]
    fn test_lox_programs() {
        let tests = [
            // binary and grouping expressions, with precedence
            ("print (1 + 2) * 5 + 2;", "17\n"),
            ("print 1 + 2;", "3\n"),
            ("print \"a\" + \"b\";", "ab\n"),
            ("print 7 % 4;", "3\n"),
            ("print -7.5 % 2;", "-1.5\n"),
            ("print 10 / 4;", "2.5\n"),
            // logical expressions return the deciding operand
            ("print false or true;", "true\n"),
            ("print nil or \"default\";", "default\n"),
            ("print 1 and 2;", "2\n"),
            ("print nil and undefined;", "nil\n"),
            // unary expressions
            ("print !true;", "false\n"),
            ("print !nil;", "true\n"),
            ("print !0;", "false\n"),
            ("print -10.5;", "-10.5\n"),
            // equality is type sensitive
            ("print nil == false;", "false\n"),
            ("print \"1\" == 1;", "false\n"),
            ("print 1 == 1;", "true\n"),
            // variable assignment
            ("var foo = \"bar\"; print foo;", "bar\n"),
            ("var a; print a;", "nil\n"),
            ("var a = 1; var b = a = 2; print a + b;", "4\n"),
            // printing callables
            ("print clock;", "<Native clock>\n"),
            ("fun foo() {} print foo;", "<Function foo>\n"),
            ("print lambda () {};", "<Function lambda>\n"),
            ("class Foo {} print Foo; print Foo();", "<Class Foo>\n<Instance Foo>\n"),
            // constants behave like variables at runtime
            ("const c = 3; print c * c;", "9\n"),
            (
                include_str!("../../data/if_else.lox"),
                include_str!("../../data/if_else.lox.expected"),
            ),
            (
                include_str!("../../data/while.lox"),
                include_str!("../../data/while.lox.expected"),
            ),
            (
                include_str!("../../data/for.lox"),
                include_str!("../../data/for.lox.expected"),
            ),
            (
                include_str!("../../data/binding.lox"),
                include_str!("../../data/binding.lox.expected"),
            ),
            (
                include_str!("../../data/fib.lox"),
                include_str!("../../data/fib.lox.expected"),
            ),
            (
                include_str!("../../data/make_counter.lox"),
                include_str!("../../data/make_counter.lox.expected"),
            ),
            (
                include_str!("../../data/class.lox"),
                include_str!("../../data/class.lox.expected"),
            ),
            (
                include_str!("../../data/inheritance.lox"),
                include_str!("../../data/inheritance.lox.expected"),
            ),
            (
                include_str!("../../data/lambda.lox"),
                include_str!("../../data/lambda.lox.expected"),
            ),
            (
                include_str!("../../data/break_continue.lox"),
                include_str!("../../data/break_continue.lox.expected"),
            ),
        ];

        for (src, expected) in tests {
            test_statements(src, expected);
        }
    }

    #[test]
    fn test_shadowing() {
        test_statements("var a = 1; { var a = 2; print a; } print a;", "2\n1\n");
    }

    #[test]
    fn test_closures_share_frames() {
        let src = "
            fun makeCounter() {
                var count = 0;
                return lambda () { count = count + 1; return count; };
            }
            var counter = makeCounter();
            counter();
            print counter();
            var other = makeCounter();
            print other();
        ";
        test_statements(src, "2\n1\n");
    }

    #[test]
    fn test_return_unwinds_through_loops() {
        let src = "
            fun find() {
                for (var i = 0; i < 10; i = i + 1) {
                    while (true) {
                        if (i == 3) return i;
                        break;
                    }
                }
                return -1;
            }
            print find();
        ";
        test_statements(src, "3\n");
    }

    #[test]
    fn test_initializer_returns_instance() {
        let src = "
            class Point {
                init(x) { this.x = x; return; }
            }
            var p = Point(3);
            print p.x;
            print p.init(4);
            print p.x;
        ";
        test_statements(src, "3\n<Instance Point>\n4\n");
    }

    #[test]
    fn test_binary_expression_with_wrong_types() {
        let tests = [
            (
                "print 1 + \"a\";",
                "Operands must be two numbers or two strings.\n[line 1]\n",
            ),
            (
                "print true + false;",
                "Operands must be two numbers or two strings.\n[line 1]\n",
            ),
            ("print 1 < \"2\";", "Operands must be numbers.\n[line 1]\n"),
            ("print \"a\" < \"b\";", "Operands must be numbers.\n[line 1]\n"),
            ("print 1 %\n nil;", "Operands must be numbers.\n[line 1]\n"),
        ];

        for (src, expected) in tests {
            test_runtime_error(src, expected);
        }
    }

    #[test]
    fn test_runtime_errors() {
        let tests = [
            ("-false;", "Operand must be a number.\n[line 1]\n"),
            ("print\n bar;", "Undefined variable 'bar'.\n[line 2]\n"),
            ("bar = 1;", "Undefined variable 'bar'.\n[line 1]\n"),
            ("\"str\"();", "Can only call functions and classes.\n[line 1]\n"),
            ("clock(1);", "Expected 0 arguments but got 1.\n[line 1]\n"),
            (
                "fun add(a, b) { return a + b; }\nadd(1);",
                "Expected 2 arguments but got 1.\n[line 2]\n",
            ),
            ("var a = 1; a.field;", "Only instances have properties.\n[line 1]\n"),
            ("var a = 1; a.field = 2;", "Only instances have fields.\n[line 1]\n"),
            ("class A {} A().missing;", "Undefined property 'missing'.\n[line 1]\n"),
            ("var B = 1; class A < B {}", "Superclass must be a class.\n[line 1]\n"),
            ("fun f() { f(); } f();", "Stack overflow.\n[line 1]\n"),
        ];

        for (src, expected) in tests {
            test_runtime_error(src, expected);
        }
    }

    #[test]
    fn test_runtime_error_stops_module() {
        let run = run("print 1; print nil + 1; print 2;");
        assert!(run.result.is_err());
        assert_eq!(run.out, "1\n");
    }

    #[test]
    fn test_compile_errors_prevent_execution() {
        let run = run("print 1;\nbreak;\nvar a = ;");
        match run.result {
            Err(err @ ModuleError::Compile { .. }) => assert_eq!(err.exit_code(), 65),
            other => panic!("Expecting a compile error, found {:?}", other),
        }
        assert_eq!(run.out, "");
        assert_eq!(run.err, "[line 3] Error at ';': Expect expression.\n");
    }

    #[test]
    fn test_deeply_nested_programs() {
        let tests = [
            (format!("print {}1{};", "(".repeat(500), ")".repeat(500)), "1\n"),
            (format!("print {}1;", "-".repeat(500)), "1\n"),
            (format!("print 0{};", " + 1".repeat(600)), "600\n"),
            (
                format!("{}print \"deep\";{}", "{".repeat(200), "}".repeat(200)),
                "deep\n",
            ),
            (
                format!(
                    "var a = 2; {}print a{};{}",
                    "{ a = a + 1; ".repeat(100),
                    " * 1".repeat(300),
                    "}".repeat(100)
                ),
                "102\n",
            ),
        ];

        for (src, expected) in tests {
            test_statements(&src, expected);
        }
    }

    #[test]
    fn test_too_deep_nesting_is_a_compile_error() {
        let tests = [
            (
                format!("print {}1{};", "(".repeat(100_000), ")".repeat(100_000)),
                "[line 1] Error at '(': Nesting is too deep.\n",
            ),
            (
                format!("print {}1;", "-".repeat(100_000)),
                "[line 1] Error at '-': Nesting is too deep.\n",
            ),
        ];

        for (src, expected) in tests {
            let run = run(&src);
            match run.result {
                Err(err @ ModuleError::Compile { .. }) => assert_eq!(err.exit_code(), 65),
                other => panic!("Expecting a compile error, found {:?}", other),
            }
            assert_eq!(run.out, "");
            assert_eq!(run.err, expected);
        }
    }

    #[test]
    fn test_resolver_errors_are_all_reported() {
        let run = run("break;\nreturn 1;");
        assert!(run.result.is_err());
        assert_eq!(
            run.err,
            "[line 1] Error at 'break': Can't use 'break' outside of a loop.\n\
             [line 2] Error at 'return': Can't return from top-level code.\n"
        );
    }
}
