use std::cell::RefCell;
use std::fmt::{Debug, Display, Formatter};
use std::rc::Rc;

use loxmod_core::Literal;

use crate::callable::{Callable, Class, Instance};
use crate::module::Namespace;

#[derive(Debug, Clone)]
pub enum Value {
    Callable(Rc<dyn Callable>),
    Class(Rc<Class>),
    Instance(Rc<RefCell<Instance>>),
    Module(Rc<Namespace>),
    Str(Rc<String>),
    Num(f64),
    Bool(bool),
    Nil,
}

impl Value {
    /// `nil` and `false` are falsy, everything else is truthy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }
}

impl From<Literal> for Value {
    fn from(value: Literal) -> Self {
        match value {
            Literal::Str(val) => Value::Str(Rc::new(val)),
            Literal::Num(val) => Value::Num(val),
            Literal::Bool(val) => Value::Bool(val),
            Literal::Nil => Value::Nil,
        }
    }
}

impl From<&Literal> for Value {
    fn from(value: &Literal) -> Self {
        Value::from(value.clone())
    }
}

// Thin pointers are compared so that two `Rc<dyn Callable>` to the same object are equal even if
// their vtables were instantiated in different codegen units.
fn same_object<T: ?Sized, U: ?Sized>(lhs: &Rc<T>, rhs: &Rc<U>) -> bool {
    Rc::as_ptr(lhs) as *const () == Rc::as_ptr(rhs) as *const ()
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Callable(lhs), Value::Callable(rhs)) => same_object(lhs, rhs),
            (Value::Class(lhs), Value::Class(rhs)) => Rc::ptr_eq(lhs, rhs),
            (Value::Instance(lhs), Value::Instance(rhs)) => Rc::ptr_eq(lhs, rhs),
            (Value::Module(lhs), Value::Module(rhs)) => Rc::ptr_eq(lhs, rhs),
            (Value::Str(lhs), Value::Str(rhs)) => lhs == rhs,
            (Value::Num(lhs), Value::Num(rhs)) => lhs == rhs,
            (Value::Bool(lhs), Value::Bool(rhs)) => lhs == rhs,
            (Value::Nil, Value::Nil) => true,
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(Rc::new(value))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(Rc::new(String::from(value)))
    }
}

macro_rules! impl_from_num_for_value {
    ( $( $t:ident )* ) => {
        $(
            impl From<$t> for Value {
                fn from(n: $t) -> Value {
                    Value::Num(n as f64)
                }
            }
        )*
    }
}

impl_from_num_for_value!(u8 i8 u16 i16 u32 i32 u64 i64 usize isize f32 f64);

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Callable(val) => write!(f, "{:?}", val),
            Value::Class(class) => write!(f, "<Class {}>", class.name()),
            Value::Instance(instance) => write!(f, "{}", RefCell::borrow(instance)),
            Value::Module(namespace) => write!(f, "<Module {}>", namespace.name()),
            Value::Str(val) => write!(f, "{}", val),
            Value::Num(val) => write!(f, "{}", val),
            Value::Bool(val) => write!(f, "{}", val),
            Value::Nil => write!(f, "nil"),
        }
    }
}
