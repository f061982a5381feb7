use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Generic(String),
    #[error("Unknown policy: {0}")]
    UnknownPolicy(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("No queue for class key: {0}")]
    UnknownQueue(String),
    #[error("Frontier terminated")]
    FrontierTerminated,
    #[error(transparent)]
    UrlParseError(#[from] url::ParseError),
}

impl From<String> for AppError {
    fn from(s: String) -> Self {
        AppError::Generic(s)
    }
}

impl From<&str> for AppError {
    fn from(s: &str) -> Self {
        AppError::Generic(s.to_owned())
    }
}
