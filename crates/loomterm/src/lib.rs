pub mod action;
pub mod buffer;
pub mod error;
pub mod line;
pub mod parser;
pub mod session;
pub mod style;

pub use error::{Result, TerminalError};
