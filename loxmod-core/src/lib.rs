mod error;
mod scanner;
mod token;

pub use error::*;
pub use scanner::*;
pub use token::*;
