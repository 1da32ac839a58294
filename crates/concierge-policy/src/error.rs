use thiserror::Error;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("policy config parse error: {0}")]
    ConfigParse(String),
}

impl PolicyError {
    pub fn code(&self) -> &'static str {
        match self {
            PolicyError::ConfigParse(_) => "POLICY_CONFIG_PARSE_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, PolicyError>;
