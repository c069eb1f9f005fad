//! Stack growth for the recursive tree walk.
//!
//! The parser, the resolver and the interpreter all recurse once per level of source nesting, and
//! every Lox call adds several visitor frames on top. Deep but legal programs would exhaust the host
//! stack long before `MAX_NESTING` or `MAX_CALL_DEPTH` is reached, so each recursive entry point is
//! wrapped with [`ensure_sufficient_stack`], which moves execution onto a fresh stack segment when
//! the current one is close to running out.

/// Minimum stack space to keep available (100KB red zone).
const RED_ZONE: usize = 100 * 1024;

/// Stack space to allocate when growing (1MB).
const STACK_PER_RECURSION: usize = 1024 * 1024;

/// Runs `f`, growing the stack first if less than the red zone remains.
#[inline]
pub(crate) fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}
