#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Malformed rigid transform: {0}")]
    MalformedTransform(String),

    #[error("Frame {0} contains no points")]
    EmptyFrame(u64),

    #[error("Model is empty, seed it with the first frame before registering")]
    EmptyModel,

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
