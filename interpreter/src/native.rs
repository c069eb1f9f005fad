use crate::callable::Native;
use crate::env::Environment;
use crate::value::Value;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Defines the built-in functions in a module's global environment.
pub(crate) fn define_natives(globals: &mut Environment) {
    let clock = Native::new(
        Box::new(|_| {
            // A clock set before the epoch reads as zero rather than failing the script
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map_or(0.0, |elapsed| elapsed.as_secs_f64());
            Ok(Value::from(now))
        }),
        "clock",
        0,
    );

    globals.define("clock", Value::Callable(Rc::new(clock)));
}
