use thiserror::Error;

/// Errors shared by the svop crates.
#[derive(Error, Debug)]
pub enum SvopError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SvopError {
    pub fn config(msg: impl Into<String>) -> Self {
        SvopError::Configuration(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, SvopError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = SvopError::config("stimulus points must be 5, 9 or 13");
        assert!(err.to_string().contains("5, 9 or 13"));
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "ball.jpg");
        let err: SvopError = io.into();
        assert!(matches!(err, SvopError::Io(_)));
    }
}
