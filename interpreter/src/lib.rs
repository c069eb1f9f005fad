//! Tree-walking interpreter for Lox with file based modules.
//!
//! A program is a tree of [`Module`]s sharing one [`Host`]. Each module runs its own
//! scan, parse, resolve and interpret pipeline and exposes its globals through a [`Namespace`].

mod ast;
mod callable;
mod env;
pub mod error;
mod info;
mod interpreter;
mod limits;
mod module;
mod native;
mod parser;
mod resolver;
mod stack;
mod value;

pub use callable::{Callable, CallableType, Class, Instance};
pub use error::{Error, ModuleError, RuntimeError, UndefinedVariable};
pub use info::{ModuleInfo, MAIN_MODULE};
pub use interpreter::Interpreter;
pub use module::{Host, Module, Namespace};
pub use value::Value;
