use thiserror::Error;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("config file not found: {0}")]
    NotInitialized(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid stack identity '{0}': expected <organization>/<project>/<stack>")]
    InvalidIdentity(String),

    #[error("policy store error: {0}")]
    Store(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PolicyError>;
