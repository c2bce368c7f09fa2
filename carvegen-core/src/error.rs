use thiserror::Error;

#[derive(Error, Debug)]
pub enum CarveError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("format error: {0}")]
    Format(String),

    #[error("disk image too small for stored contents: needs at least {required_mb:.6} MB")]
    ImageTooSmall { required_mb: f64 },

    #[error("worker error: {0}")]
    Worker(String),
}

pub type Result<T> = std::result::Result<T, CarveError>;
