use thiserror::Error;

#[derive(Error, Debug)]
pub enum TerminalError {
    #[error("Session error: {0}")]
    Session(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Session closed")]
    SessionClosed,
}

pub type Result<T> = std::result::Result<T, TerminalError>;
