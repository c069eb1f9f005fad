use std::cell::RefCell;
use std::fmt::{Debug, Formatter};
use std::io::Write;
use std::rc::Rc;

use tracing::warn;

use crate::error::{Error, ModuleError, RuntimeError};

/// Name the root module reports its diagnostics under. Its messages carry no module prefix.
pub const MAIN_MODULE: &str = "__main__";

/// Diagnostic state of one module's pipeline run.
pub struct ModuleInfo {
    name: String,
    had_error: bool,
    had_runtime_error: bool,
    diagnostics: Vec<String>,
    sink: Rc<RefCell<dyn Write>>,
}

impl ModuleInfo {
    pub(crate) fn new(name: &str, sink: Rc<RefCell<dyn Write>>) -> Self {
        ModuleInfo {
            name: String::from(name),
            had_error: false,
            had_runtime_error: false,
            diagnostics: Vec::new(),
            sink,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_main(&self) -> bool {
        self.name == MAIN_MODULE
    }

    /// Whether a scan, parse or resolve error was reported.
    pub fn had_error(&self) -> bool {
        self.had_error
    }

    pub fn had_runtime_error(&self) -> bool {
        self.had_runtime_error
    }

    /// Every diagnostic reported so far, formatted as written to the error sink.
    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }

    /// Records a compile time error. Reporting never stops the phase that found the error.
    pub(crate) fn error(&mut self, line: usize, location: &str, msg: &str) {
        let diagnostic = if self.is_main() {
            format!("[line {}] Error{}: {}", line, location, msg)
        } else {
            format!(
                "In module '{}' on [line {}] Error{}: {}",
                self.name, line, location, msg
            )
        };

        self.had_error = true;
        self.emit(diagnostic);
    }

    /// Forgets earlier compile errors, so the next piece of code fed to the module can run.
    pub(crate) fn clear_error(&mut self) {
        self.had_error = false;
    }

    pub(crate) fn report(&mut self, err: &Error) {
        self.error(err.line(), &err.location(), &err.message());
    }

    pub(crate) fn runtime_error(&mut self, err: &RuntimeError) {
        let diagnostic = if self.is_main() {
            format!("{}\n[line {}]", err, err.line())
        } else {
            format!("{}\n[line {}] in module '{}'", err, err.line(), self.name)
        };

        self.had_runtime_error = true;
        self.emit(diagnostic);
    }

    pub(crate) fn read_error(&mut self, err: &ModuleError) {
        self.emit(err.to_string());
    }

    fn emit(&mut self, diagnostic: String) {
        if let Err(err) = writeln!(self.sink.borrow_mut(), "{}", diagnostic) {
            warn!(module = %self.name, %err, "failed to write diagnostic");
        }
        self.diagnostics.push(diagnostic);
    }
}

impl Debug for ModuleInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleInfo")
            .field("name", &self.name)
            .field("had_error", &self.had_error)
            .field("had_runtime_error", &self.had_runtime_error)
            .field("diagnostics", &self.diagnostics)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use loxmod_core::{Literal, Token, Type};
    use pretty_assertions::assert_eq;

    use crate::error::{Error, RuntimeError};
    use crate::info::{ModuleInfo, MAIN_MODULE};

    fn info(name: &str) -> (ModuleInfo, Rc<RefCell<Vec<u8>>>) {
        let sink = Rc::new(RefCell::new(Vec::new()));
        (ModuleInfo::new(name, sink.clone()), sink)
    }

    fn token(ty: Type, lexeme: &str) -> Token {
        Token::new(ty, String::from(lexeme), 4, 0, 0, Literal::Nil)
    }

    #[test]
    fn test_compile_error_format() {
        let tests = [
            (
                MAIN_MODULE,
                Error::parser_error(&token(Type::Identifier, "foo"), "Expect ';' after value."),
                "[line 4] Error at 'foo': Expect ';' after value.",
            ),
            (
                MAIN_MODULE,
                Error::parser_error(&token(Type::Eof, ""), "Expect expression."),
                "[line 4] Error at end: Expect expression.",
            ),
            (
                "math",
                Error::resolver_error(&token(Type::Break, "break"), "Can't use 'break' outside of a loop."),
                "In module 'math' on [line 4] Error at 'break': Can't use 'break' outside of a loop.",
            ),
            (
                MAIN_MODULE,
                Error::from(loxmod_core::Error::UnexpectedCharacter { ch: '#', line: 2 }),
                "[line 2] Error: Unexpected character.",
            ),
        ];

        for (name, err, expected) in tests {
            let (mut info, sink) = info(name);
            info.report(&err);

            assert!(info.had_error());
            assert!(!info.had_runtime_error());
            assert_eq!(info.diagnostics(), [expected]);
            assert_eq!(
                String::from_utf8(sink.borrow().clone()).unwrap(),
                format!("{}\n", expected)
            );
        }
    }

    #[test]
    fn test_runtime_error_format() {
        let err = RuntimeError::OperandNotNumber { line: 7 };

        let (mut main, _) = info(MAIN_MODULE);
        main.runtime_error(&err);
        assert!(main.had_runtime_error());
        assert!(!main.had_error());
        assert_eq!(main.diagnostics(), ["Operand must be a number.\n[line 7]"]);

        let (mut other, _) = info("util");
        other.runtime_error(&err);
        assert_eq!(
            other.diagnostics(),
            ["Operand must be a number.\n[line 7] in module 'util'"]
        );
    }

    #[test]
    fn test_errors_accumulate() {
        let (mut info, _) = info(MAIN_MODULE);
        info.error(1, "", "first");
        info.error(2, " at 'x'", "second");
        assert_eq!(info.diagnostics().len(), 2);
    }
}
