use thiserror::Error;

#[derive(Debug, Error)]
pub enum MagpieError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid reminder spec: {0}")]
    Reminder(String),
}

pub type Result<T> = std::result::Result<T, MagpieError>;
