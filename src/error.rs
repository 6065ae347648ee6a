use std::fmt;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RazgzError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid gzip stream: {0}")]
    InvalidGzip(String),

    #[error("decompression error: {0}")]
    Decompression(String),

    #[error("block synchronization failed: {0}")]
    Sync(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("thread error: {0}")]
    Thread(String),

    #[error("multi-member gzip stream; not splittable for parallel decoding")]
    MultiMember,
}

impl RazgzError {
    pub fn invalid_gzip<T: fmt::Display>(msg: T) -> Self {
        RazgzError::InvalidGzip(msg.to_string())
    }

    pub fn decompression<T: fmt::Display>(msg: T) -> Self {
        RazgzError::Decompression(msg.to_string())
    }

    pub fn sync<T: fmt::Display>(msg: T) -> Self {
        RazgzError::Sync(msg.to_string())
    }

    pub fn invalid_argument<T: fmt::Display>(msg: T) -> Self {
        RazgzError::InvalidArgument(msg.to_string())
    }

    pub fn thread<T: fmt::Display>(msg: T) -> Self {
        RazgzError::Thread(msg.to_string())
    }
}

pub type RazgzResult<T> = Result<T, RazgzError>;
