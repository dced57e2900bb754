use ds_core::llm::ChatError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PowError {
    #[error("unsupported PoW algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("PoW difficulty must be positive, got {0}")]
    InvalidDifficulty(i64),
    #[error("failed to solve PoW within {max_nonce} attempts")]
    Exhausted { max_nonce: u64 },
    #[error("encode PoW solution: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("missing credentials: {0}")]
    MissingCredentials(&'static str),
    #[error("login response missing token")]
    MissingToken,
}

#[derive(Error, Debug)]
pub enum DeepSeekError {
    #[error("{message} ({status})")]
    Api { status: u16, message: String },
    #[error(transparent)]
    Pow(#[from] PowError),
    #[error(transparent)]
    Credential(#[from] CredentialError),
    #[error("DeepSeek error: {0}")]
    Stream(String),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("transport: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("config: {0}")]
    Config(String),
    #[error("canceled")]
    Canceled,
}

pub type Result<T> = std::result::Result<T, DeepSeekError>;

impl DeepSeekError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        DeepSeekError::Api {
            status,
            message: message.into(),
        }
    }

    /// 401 and 403 are the only failures a fresh login can repair.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, DeepSeekError::Api { status: 401 | 403, .. })
    }
}

impl From<DeepSeekError> for ChatError {
    fn from(e: DeepSeekError) -> Self {
        match e {
            DeepSeekError::Api { status, message } => map_status_err(status, message),
            DeepSeekError::Transport(e) => map_reqwest_err(e),
            DeepSeekError::Credential(e) => ChatError::Auth(e.to_string()),
            e @ DeepSeekError::Stream(_) => ChatError::Protocol(e.to_string()),
            DeepSeekError::MalformedResponse(msg) => ChatError::Decode(msg),
            DeepSeekError::Canceled => ChatError::Canceled,
            e @ (DeepSeekError::Pow(_) | DeepSeekError::Config(_)) => ChatError::Other(e.to_string()),
        }
    }
}

fn map_reqwest_err(e: reqwest::Error) -> ChatError {
    if e.is_timeout() {
        ChatError::Timeout(e.to_string())
    } else if e.is_request() || e.is_connect() {
        ChatError::Network(e.to_string())
    } else if e.is_decode() {
        ChatError::Decode(e.to_string())
    } else {
        ChatError::Other(e.to_string())
    }
}

fn map_status_err(status: u16, message: String) -> ChatError {
    let s = format!("{} {}", status, message);
    match status {
        401 | 403 => ChatError::Auth(s),
        429 => ChatError::RateLimit(s),
        500 | 502 | 503 | 504 => ChatError::Network(s),
        _ => ChatError::Other(s),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_failure_is_401_or_403_only() {
        assert!(DeepSeekError::api(401, "x").is_auth_failure());
        assert!(DeepSeekError::api(403, "x").is_auth_failure());
        assert!(!DeepSeekError::api(429, "x").is_auth_failure());
        assert!(!DeepSeekError::Stream("x".into()).is_auth_failure());
    }

    #[test]
    fn status_keeps_code_and_message() {
        let e: ChatError = DeepSeekError::api(403, "Failed to create session").into();
        match e {
            ChatError::Auth(s) => assert_eq!(s, "403 Failed to create session"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            ChatError::from(DeepSeekError::api(503, "down")),
            ChatError::Network(_)
        ));
        assert!(matches!(
            ChatError::from(DeepSeekError::api(429, "slow")),
            ChatError::RateLimit(_)
        ));
    }

    #[test]
    fn stream_error_is_descriptive() {
        let e: ChatError = DeepSeekError::Stream("rate limited".into()).into();
        assert_eq!(e.to_string(), "protocol: DeepSeek error: rate limited");
    }
}
