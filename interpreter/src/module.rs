use std::cell::RefCell;
use std::fmt::{Debug, Formatter};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use ahash::{AHashMap, AHashSet};
use loxmod_core::{Scanner, Token};
use tracing::debug;

use crate::env::Environment;
use crate::error::{Error, ModuleError, RuntimeError, UndefinedVariable};
use crate::info::{ModuleInfo, MAIN_MODULE};
use crate::interpreter::Interpreter;
use crate::native::define_natives;
use crate::parser::Parser;
use crate::resolver::Resolver;
use crate::value::Value;

/// Process wide state shared by every module: where modules are loaded from, where output goes,
/// and which modules are already loaded. Cloning a `Host` shares that state.
#[derive(Clone)]
pub struct Host {
    inner: Rc<HostInner>,
}

struct HostInner {
    root: PathBuf,
    stdout: Rc<RefCell<dyn Write>>,
    stderr: Rc<RefCell<dyn Write>>,

    // A module is registered before it runs, so an import cycle finds the partially initialized
    // namespace here instead of loading the module again.
    registry: RefCell<AHashMap<String, Rc<Namespace>>>,
}

impl Host {
    /// A host loading modules from `root` and writing to the process's stdout and stderr.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Host::with_output(
            root,
            Rc::new(RefCell::new(io::stdout())),
            Rc::new(RefCell::new(io::stderr())),
        )
    }

    pub fn with_output(
        root: impl Into<PathBuf>,
        stdout: Rc<RefCell<dyn Write>>,
        stderr: Rc<RefCell<dyn Write>>,
    ) -> Self {
        Host {
            inner: Rc::new(HostInner {
                root: root.into(),
                stdout,
                stderr,
                registry: RefCell::new(AHashMap::new()),
            }),
        }
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    /// File module `name` is loaded from.
    pub fn module_path(&self, name: &str) -> PathBuf {
        self.inner.root.join(format!("{}.lox", name))
    }

    /// Namespace of an already loaded (or currently loading) module.
    pub fn loaded(&self, name: &str) -> Option<Rc<Namespace>> {
        self.inner.registry.borrow().get(name).cloned()
    }

    pub(crate) fn stdout(&self) -> &Rc<RefCell<dyn Write>> {
        &self.inner.stdout
    }

    pub(crate) fn stderr(&self) -> &Rc<RefCell<dyn Write>> {
        &self.inner.stderr
    }

    fn register(&self, namespace: &Rc<Namespace>) {
        debug!(module = %namespace.name, "registered module");
        self.inner
            .registry
            .borrow_mut()
            .insert(namespace.name.clone(), Rc::clone(namespace));
    }

    /// Loads and runs module `name` on first request, later requests get the same namespace.
    pub(crate) fn import(&self, name: &str) -> Result<Rc<Namespace>, ModuleError> {
        if let Some(namespace) = self.loaded(name) {
            debug!(module = name, "module cache hit");
            return Ok(namespace);
        }

        debug!(module = name, path = %self.module_path(name).display(), "loading module");
        let mut module = Module::new(self, name);
        module.init()?;
        Ok(module.namespace())
    }
}

/// The globals of a module, as seen by the modules importing it.
pub struct Namespace {
    name: String,
    pub(crate) globals: Rc<RefCell<Environment>>,
}

impl Namespace {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, name: &str) -> Result<Value, UndefinedVariable> {
        self.globals.borrow().get(name)
    }

    /// Assigns an existing global, it never defines a new one.
    pub fn assign(&self, name: &str, value: Value) -> Result<(), UndefinedVariable> {
        self.globals.borrow_mut().assign(name, value)
    }
}

// Globals may hold closures over these very globals, printing them would never end
impl Debug for Namespace {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "<Module {}>", self.name)
    }
}

enum Source {
    File(PathBuf),
    Text(String),
}

/// One source file and the pipeline that turns it into an initialized namespace:
/// scan, parse, resolve, then interpret. Each phase only runs if the ones before it reported no
/// errors.
pub struct Module {
    host: Host,
    info: ModuleInfo,
    namespace: Rc<Namespace>,
    source: Source,

    // constant globals declared by code that already ran
    global_consts: AHashSet<String>,
}

impl Module {
    /// The root module of a program, loaded from `<root>/<name>.lox`. Its diagnostics are
    /// reported without a module prefix.
    pub fn main(host: &Host, name: &str) -> Self {
        Module::create(host, name, MAIN_MODULE, Source::File(host.module_path(name)))
    }

    /// A module loaded from `<root>/<name>.lox`.
    pub fn new(host: &Host, name: &str) -> Self {
        Module::create(host, name, name, Source::File(host.module_path(name)))
    }

    /// A module whose source is given directly instead of read from a file.
    pub fn from_source(host: &Host, name: &str, src: &str) -> Self {
        Module::create(host, name, name, Source::Text(String::from(src)))
    }

    /// An empty root module that is fed code a piece at a time with [`Module::eval`], as an
    /// interactive prompt does.
    pub fn prompt(host: &Host) -> Self {
        Module::create(host, MAIN_MODULE, MAIN_MODULE, Source::Text(String::new()))
    }

    fn create(host: &Host, name: &str, display: &str, source: Source) -> Self {
        let mut globals = Environment::new();
        define_natives(&mut globals);

        Module {
            host: host.clone(),
            info: ModuleInfo::new(display, Rc::clone(host.stderr())),
            namespace: Rc::new(Namespace {
                name: String::from(name),
                globals: Rc::new(RefCell::new(globals)),
            }),
            source,
            global_consts: AHashSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.namespace.name
    }

    pub fn info(&self) -> &ModuleInfo {
        &self.info
    }

    pub fn namespace(&self) -> Rc<Namespace> {
        Rc::clone(&self.namespace)
    }

    /// Runs the module's pipeline. Diagnostics are written to the host's error output as they
    /// are found; the returned error only tells which phase stopped the module.
    pub fn init(&mut self) -> Result<(), ModuleError> {
        let src = self.read()?;
        self.run(&src)
    }

    /// Runs more code in this module, against the globals left by everything run before. A
    /// compile error only rejects `src`, later code is compiled and run as usual.
    pub fn eval(&mut self, src: &str) -> Result<(), ModuleError> {
        let res = self.run(src);
        self.info.clear_error();
        res
    }

    fn run(&mut self, src: &str) -> Result<(), ModuleError> {
        debug!(module = %self.name(), "scanning");
        let mut scanner = Scanner::new();
        let mut stream = scanner.scan_tokens(src);
        let tokens: Vec<Token> = stream.by_ref().collect();
        for err in stream.into_errors() {
            self.info.report(&Error::from(err));
        }

        debug!(module = %self.name(), tokens = tokens.len(), "parsing");
        let stmts = match Parser::new(&tokens).parse() {
            Ok(stmts) => stmts,
            Err(errors) => return Err(self.compile_failure(&errors)),
        };

        // scan errors don't stop the parser, but they do stop the pipeline here
        if self.info.had_error() {
            return Err(self.compile_failure(&[]));
        }

        debug!(module = %self.name(), "resolving");
        let locals = match Resolver::new().resolve(&stmts, &mut self.global_consts) {
            Ok(locals) => locals,
            Err(errors) => return Err(self.compile_failure(&errors)),
        };

        self.host.register(&self.namespace);

        debug!(module = %self.name(), "running");
        let mut interpreter = Interpreter::new(
            self.host.clone(),
            Rc::clone(&self.namespace.globals),
            locals,
        );

        match interpreter.interpret(&stmts) {
            Ok(()) => {
                debug!(module = %self.name(), "initialized");
                Ok(())
            }
            // the imported module already reported what went wrong
            Err(RuntimeError::Import { name, source, .. }) => {
                debug!(module = %self.name(), import = %name, "import failed");
                Err(*source)
            }
            Err(err) => {
                self.info.runtime_error(&err);
                Err(ModuleError::Runtime {
                    name: self.name().to_string(),
                })
            }
        }
    }

    /// Reads a module global. Only meaningful once `init` succeeded.
    pub fn get(&self, name: &str) -> Result<Value, UndefinedVariable> {
        self.namespace.get(name)
    }

    /// Assigns an existing module global.
    pub fn set(&self, name: &str, value: Value) -> Result<(), UndefinedVariable> {
        self.namespace.assign(name, value)
    }

    fn read(&mut self) -> Result<String, ModuleError> {
        match &self.source {
            Source::Text(src) => Ok(src.clone()),
            Source::File(path) => match fs::read(path) {
                Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
                Err(source) => {
                    let err = ModuleError::Read {
                        path: path.clone(),
                        source,
                    };
                    self.info.read_error(&err);
                    Err(err)
                }
            },
        }
    }

    fn compile_failure(&mut self, errors: &[Error]) -> ModuleError {
        for err in errors {
            self.info.report(err);
        }

        ModuleError::Compile {
            name: self.name().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::fs;
    use std::path::Path;
    use std::rc::Rc;

    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use crate::error::{ModuleError, UndefinedVariable};
    use crate::module::{Host, Module};
    use crate::value::Value;

    struct Fixture {
        dir: TempDir,
        host: Host,
        out: Rc<RefCell<Vec<u8>>>,
        err: Rc<RefCell<Vec<u8>>>,
    }

    impl Fixture {
        fn new(files: &[(&str, &str)]) -> Self {
            let dir = tempfile::tempdir().unwrap();
            for (name, src) in files {
                let path = dir.path().join(name);
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent).unwrap();
                }
                fs::write(path, src).unwrap();
            }

            let out: Rc<RefCell<Vec<u8>>> = Rc::new(RefCell::new(Vec::new()));
            let err: Rc<RefCell<Vec<u8>>> = Rc::new(RefCell::new(Vec::new()));
            let host = Host::with_output(dir.path(), out.clone(), err.clone());
            Fixture {
                dir,
                host,
                out,
                err,
            }
        }

        fn run(&self, name: &str) -> Result<(), ModuleError> {
            Module::main(&self.host, name).init()
        }

        fn out(&self) -> String {
            String::from_utf8(self.out.borrow().clone()).unwrap()
        }

        fn err(&self) -> String {
            String::from_utf8(self.err.borrow().clone()).unwrap()
        }

        fn path(&self, name: &str) -> String {
            self.dir.path().join(name).display().to_string()
        }
    }

    #[test]
    fn test_import_binds_namespace() {
        let fixture = Fixture::new(&[
            (
                "main.lox",
                "import math; import math as m; print math.square(3); print m == math; print math;",
            ),
            ("math.lox", "fun square(x) { return x * x; }"),
        ]);

        assert!(fixture.run("main").is_ok(), "{}", fixture.err());
        assert_eq!(fixture.out(), "9\ntrue\n<Module math>\n");
    }

    #[test]
    fn test_imported_module_runs_once() {
        let fixture = Fixture::new(&[
            ("main.lox", "import a; import b; print a.count;"),
            ("a.lox", "print \"loading a\"; var count = 0;"),
            ("b.lox", "import a; a.count = a.count + 1;"),
        ]);

        assert!(fixture.run("main").is_ok(), "{}", fixture.err());
        assert_eq!(fixture.out(), "loading a\n1\n");
    }

    #[test]
    fn test_import_cycle_sees_partial_namespace() {
        let fixture = Fixture::new(&[
            ("main.lox", "var early = 1; import other; var late = 2;"),
            (
                "other.lox",
                "import main; print main.early; print main.late;",
            ),
        ]);

        assert!(matches!(
            fixture.run("main"),
            Err(ModuleError::Runtime { .. })
        ));
        assert_eq!(fixture.out(), "1\n");
        assert_eq!(
            fixture.err(),
            "Undefined variable 'late'.\n[line 1] in module 'other'\n"
        );
    }

    #[test]
    fn test_functions_keep_their_module() {
        let fixture = Fixture::new(&[
            (
                "main.lox",
                "import counter; var value = 100; counter.bump(); counter.bump(); print counter.value;",
            ),
            (
                "counter.lox",
                "var value = 0; fun bump() { { var step = 1; value = value + step; } }",
            ),
        ]);

        assert!(fixture.run("main").is_ok(), "{}", fixture.err());
        assert_eq!(fixture.out(), "2\n");
    }

    #[test]
    fn test_nested_path_import_with_alias() {
        let fixture = Fixture::new(&[
            ("main.lox", "import \"lib/greet\" as greet; greet.hello();"),
            ("lib/greet.lox", "fun hello() { print \"hello\"; }"),
        ]);

        assert!(fixture.run("main").is_ok(), "{}", fixture.err());
        assert_eq!(fixture.out(), "hello\n");
    }

    #[test]
    fn test_missing_file() {
        let fixture = Fixture::new(&[]);

        let err = fixture.run("missing").unwrap_err();
        assert_eq!(err.exit_code(), 71);
        assert_eq!(
            fixture.err(),
            format!("Error reading file: {}\n", fixture.path("missing.lox"))
        );
    }

    #[test]
    fn test_failed_import_keeps_exit_code() {
        let tests: [(&[(&str, &str)], u8); 3] = [
            (&[("main.lox", "import missing;")], 71),
            (&[("main.lox", "import broken;"), ("broken.lox", "var = 1;")], 65),
            (
                &[("main.lox", "import failing;"), ("failing.lox", "print nil + 1;")],
                70,
            ),
        ];

        for (files, code) in tests {
            let fixture = Fixture::new(files);
            let err = fixture.run("main").unwrap_err();
            assert_eq!(err.exit_code(), code, "files: {:?}", files);
        }
    }

    #[test]
    fn test_compile_error_in_other_module_is_prefixed() {
        let fixture = Fixture::new(&[
            ("main.lox", "import broken;"),
            ("broken.lox", "\nvar = 1;"),
        ]);

        assert!(fixture.run("main").is_err());
        assert_eq!(
            fixture.err(),
            "In module 'broken' on [line 2] Error at '=': Expect variable name.\n"
        );
    }

    #[test]
    fn test_embedding_get_and_set() {
        let fixture = Fixture::new(&[]);
        let mut module = Module::from_source(
            &fixture.host,
            "config",
            "var greeting = \"hi\"; fun greet() { print greeting; }",
        );
        module.init().unwrap();

        assert_eq!(module.get("greeting"), Ok(Value::from("hi")));
        assert_eq!(
            module.get("missing"),
            Err(UndefinedVariable {
                name: String::from("missing")
            })
        );

        module.set("greeting", Value::from("hello")).unwrap();
        assert_eq!(module.get("greeting"), Ok(Value::from("hello")));
        assert!(module.set("missing", Value::Nil).is_err());
        assert!(!module.info().had_error());
        assert!(fixture.host.loaded("config").is_some());
    }

    #[test]
    fn test_prompt_keeps_globals_between_lines() {
        let fixture = Fixture::new(&[("math.lox", "fun square(x) { return x * x; }")]);
        let mut prompt = Module::prompt(&fixture.host);

        let lines = [
            ("var a = 1;", true),
            ("fun add(x) { var y = x; return y + a; }", true),
            ("print add(2);", true),
            ("var = 1;", false),
            // a compile error only rejects its own line
            ("print a;", true),
            ("print nil + 1;", false),
            ("a = a + 1; print a;", true),
            ("import math; print math.square(a);", true),
            ("const c = 1;", true),
            ("c = 2;", false),
        ];
        for (line, ok) in lines {
            assert_eq!(prompt.eval(line).is_ok(), ok, "line: {}", line);
        }

        assert!(!prompt.info().had_error());
        assert_eq!(fixture.out(), "3\n1\n2\n4\n");
        assert_eq!(
            fixture.err(),
            "[line 1] Error at '=': Expect variable name.\n\
             Operands must be two numbers or two strings.\n[line 1]\n\
             [line 1] Error at 'c': Cannot reassign a constant.\n"
        );
        assert_eq!(prompt.get("c"), Ok(Value::from(1)));
    }

    #[test]
    fn test_module_path() {
        let host = Host::new("/scripts");
        assert_eq!(host.module_path("lib/math"), Path::new("/scripts/lib/math.lox"));
        assert_eq!(host.root(), Path::new("/scripts"));
    }
}
