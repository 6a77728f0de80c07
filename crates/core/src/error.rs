use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Registry parse error: {0}")]
    RegistryParse(#[from] serde_yaml::Error),

    #[error("Invalid registry at '{path}': {reason}")]
    InvalidRegistry { path: String, reason: String },

    #[error("Registry nesting exceeds maximum depth of {max}")]
    DepthExceeded { max: usize },
}
