pub(crate) const MAX_ARGS: usize = 255;

// Nested calls allowed before a script is stopped with a stack overflow error. The host stack is
// grown on demand, so this is the only bound on recursion depth.
pub(crate) const MAX_CALL_DEPTH: usize = 4096;

// Levels of nesting the parser accepts in one module, counting blocks, statements, groupings,
// operators and calls. Deeper source is rejected with a compile error.
pub(crate) const MAX_NESTING: usize = 1024;
