use interpreter::{Host, Module};
use pretty_assertions::assert_eq;
use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use walkdir::WalkDir;

// Expected stdout lives next to the script as `<name>.lox.out`, expected diagnostics as
// `<name>.lox.err`. Scripts without an `.out` file are only imported by other scripts.
fn sibling(path: &Path, extension: &str) -> PathBuf {
    let mut filename = path.file_name().unwrap().to_os_string();
    filename.push(extension);
    path.parent().unwrap().join(filename)
}

fn read(path: &Path) -> String {
    fs::read_to_string(path).unwrap()
}

#[test]
fn test_programs() {
    let source_files = WalkDir::new("../tests")
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| matches!(entry.path().extension(), Some(extension) if extension == "lox"))
        .filter(|entry| sibling(entry.path(), ".out").exists());

    let mut total = 0;

    for entry in source_files {
        let src_path = entry.path();
        println!("🕑 Running test: {}", src_path.display());

        let out: Rc<RefCell<Vec<u8>>> = Rc::new(RefCell::new(Vec::new()));
        let err: Rc<RefCell<Vec<u8>>> = Rc::new(RefCell::new(Vec::new()));
        let host = Host::with_output(src_path.parent().unwrap(), out.clone(), err.clone());

        let name = src_path.file_stem().unwrap().to_str().unwrap();
        let result = Module::main(&host, name).init();

        let out = String::from_utf8(out.borrow().clone()).unwrap();
        let err = String::from_utf8(err.borrow().clone()).unwrap();
        assert_eq!(read(&sibling(src_path, ".out")), out, "stdout of {}", src_path.display());

        let err_path = sibling(src_path, ".err");
        if err_path.exists() {
            assert!(result.is_err(), "{} should fail", src_path.display());
            assert_eq!(read(&err_path), err, "stderr of {}", src_path.display());
        } else {
            assert!(result.is_ok(), "{} failed with:\n{}", src_path.display(), err);
        }

        println!("✅ Test complete: {}", src_path.display());
        total += 1;
    }

    assert!(total > 0, "no test scripts found");
    println!("✅ Ran {} tests", total)
}
