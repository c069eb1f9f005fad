use std::cell::RefCell;
use std::fmt::{Debug, Display, Formatter};
use std::rc::Rc;

use ahash::AHashMap;

use crate::ast::FunctionDecl;
use crate::env::Environment;
use crate::error::RuntimeResult;
use crate::interpreter::{Interpreter, ModuleContext, Signal};
use crate::value::Value;

#[derive(Debug, PartialEq)]
pub enum CallableType {
    Function,
    Native,
    Class,
}

pub trait Callable {
    fn ty(&self) -> CallableType {
        CallableType::Function
    }

    fn name(&self) -> &str;
    fn arity(&self) -> usize;
    fn execute(self: Rc<Self>, interpreter: &mut Interpreter, args: &[Value])
        -> RuntimeResult<Value>;
}

impl Debug for dyn Callable {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "<{:?} {}>", self.ty(), self.name())
    }
}

pub(crate) type BoxedFunction = Box<dyn Fn(&[Value]) -> RuntimeResult<Value>>;

// `Native` bridges the native rust calls and the interpreter environment.
// This implements callable and all of these trait objects will live in the global namespace.
pub(crate) struct Native {
    func: BoxedFunction,
    name: String,
    arity: usize,
}

impl Native {
    pub(crate) fn new(func: BoxedFunction, name: &str, arity: usize) -> Self {
        Self {
            func,
            name: String::from(name),
            arity,
        }
    }
}

impl Callable for Native {
    fn ty(&self) -> CallableType {
        CallableType::Native
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn arity(&self) -> usize {
        self.arity
    }

    fn execute(self: Rc<Self>, _: &mut Interpreter, args: &[Value]) -> RuntimeResult<Value> {
        (self.func)(args)
    }
}

/// A declared function or lambda together with the frame it closes over. The declaration is
/// shared with the AST, so creating a closure never copies the body.
pub(crate) struct Function {
    decl: Rc<FunctionDecl>,
    closure: Rc<RefCell<Environment>>,

    // Resolution results and globals of the module the function was declared in. Calls made
    // from another module still see the declaring module's bindings.
    context: Rc<ModuleContext>,
    is_initializer: bool,
}

impl Function {
    pub(crate) fn new(
        decl: Rc<FunctionDecl>,
        closure: Rc<RefCell<Environment>>,
        context: Rc<ModuleContext>,
        is_initializer: bool,
    ) -> Self {
        Function {
            decl,
            closure,
            context,
            is_initializer,
        }
    }
}

impl Debug for Function {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "<Function {}>", self.name())
    }
}

// Helper method that will be called from both functions and methods
fn execute_function(
    function: &Function,
    closure: Rc<RefCell<Environment>>,
    interpreter: &mut Interpreter,
    args: &[Value],
) -> RuntimeResult<Value> {
    let mut env = Environment::with(closure);
    for (param, arg) in function.decl.params.iter().zip(args) {
        env.define(&param.lexeme, arg.clone());
    }

    let signal = interpreter.execute_in_context(
        &function.decl.body,
        Rc::new(RefCell::new(env)),
        Rc::clone(&function.context),
    )?;

    match signal {
        Signal::Return(value) => Ok(value),
        _ => Ok(Value::Nil),
    }
}

impl Callable for Function {
    fn name(&self) -> &str {
        self.decl.name.as_ref().map_or("lambda", |name| &name.lexeme)
    }

    fn arity(&self) -> usize {
        self.decl.params.len()
    }

    fn execute(self: Rc<Self>, interpreter: &mut Interpreter, args: &[Value]) -> RuntimeResult<Value> {
        execute_function(&self, Rc::clone(&self.closure), interpreter, args)
    }
}

// In the textbook a bound method is a brand new function whose closure has `this` defined. Here
// the method keeps an Rc to the class's function instead, so binding never clones the body, and
// only the small frame holding `this` is allocated per access.
pub(crate) struct Method {
    closure: Rc<RefCell<Environment>>,
    function: Rc<Function>,
    instance: Rc<RefCell<Instance>>,
}

impl Method {
    pub(crate) fn bind(function: Rc<Function>, instance: Rc<RefCell<Instance>>) -> Self {
        let closure = Rc::new(RefCell::new(Environment::with(Rc::clone(
            &function.closure,
        ))));
        closure
            .borrow_mut()
            .define("this", Value::Instance(Rc::clone(&instance)));

        Method {
            closure,
            function,
            instance,
        }
    }
}

impl Callable for Method {
    fn name(&self) -> &str {
        self.function.name()
    }

    fn arity(&self) -> usize {
        self.function.arity()
    }

    fn execute(self: Rc<Self>, interpreter: &mut Interpreter, args: &[Value]) -> RuntimeResult<Value> {
        let res = execute_function(&self.function, Rc::clone(&self.closure), interpreter, args)?;

        // An initializer always hands back the instance, even on a bare `return;`.
        if self.function.is_initializer {
            Ok(Value::Instance(Rc::clone(&self.instance)))
        } else {
            Ok(res)
        }
    }
}

pub struct Class {
    name: String,
    methods: AHashMap<String, Rc<Function>>,
    superclass: Option<Rc<Class>>,
}

impl Class {
    pub(crate) fn new(
        name: &str,
        superclass: Option<Rc<Class>>,
        methods: AHashMap<String, Rc<Function>>,
    ) -> Rc<Self> {
        Rc::new(Class {
            name: name.to_string(),
            methods,
            superclass,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn find_method(&self, name: &str) -> Option<Rc<Function>> {
        if let Some(fun) = self.methods.get(name) {
            Some(Rc::clone(fun))
        } else if let Some(superclass) = &self.superclass {
            superclass.find_method(name)
        } else {
            None
        }
    }
}

impl Debug for Class {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "<Class {}>", self.name)
    }
}

impl Callable for Class {
    fn ty(&self) -> CallableType {
        CallableType::Class
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn arity(&self) -> usize {
        match self.find_method("init") {
            Some(init) => init.arity(),
            _ => 0,
        }
    }

    fn execute(self: Rc<Self>, interpreter: &mut Interpreter, args: &[Value]) -> RuntimeResult<Value> {
        let instance = Instance::new(Rc::clone(&self));
        if let Some(init) = self.find_method("init") {
            Rc::new(Method::bind(init, Rc::clone(&instance))).execute(interpreter, args)?;
        }

        Ok(Value::Instance(instance))
    }
}

pub struct Instance {
    class: Rc<Class>,
    fields: AHashMap<String, Value>,
}

impl Instance {
    pub(crate) fn new(class: Rc<Class>) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Instance {
            class,
            fields: AHashMap::new(),
        }))
    }

    /// Fields shadow methods. Methods are bound to `instance` on every access.
    pub(crate) fn get(instance: &Rc<RefCell<Self>>, name: &str) -> Option<Value> {
        if let Some(field) = instance.borrow().fields.get(name) {
            return Some(field.clone());
        }

        let method = instance.borrow().class.find_method(name);
        method.map(|function| {
            Value::Callable(Rc::new(Method::bind(function, Rc::clone(instance))))
        })
    }

    pub(crate) fn set(&mut self, name: &str, value: Value) -> Value {
        self.fields.insert(String::from(name), value.clone());
        value
    }
}

impl Debug for Instance {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "<Instance {}>", self.class.name())
    }
}

impl Display for Instance {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "<Instance {}>", self.class.name())
    }
}
