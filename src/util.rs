use http::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("upstream returned status {0}")]
    Upstream(StatusCode),

    #[error("image transform failed: {0}")]
    Transform(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ProxyError {
    /// http status the transport shell should answer with.
    pub fn http_status(&self) -> StatusCode {
        match self {
            ProxyError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ProxyError::Upstream(status) => *status,
            ProxyError::Transform(_) | ProxyError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<url::ParseError> for ProxyError {
    fn from(e: url::ParseError) -> Self {
        ProxyError::InvalidInput(format!("url parse error: {}", e))
    }
}

impl From<http::uri::InvalidUri> for ProxyError {
    fn from(e: http::uri::InvalidUri) -> Self {
        ProxyError::InvalidInput(format!("uri parse error: {}", e))
    }
}

impl From<http::Error> for ProxyError {
    fn from(e: http::Error) -> Self {
        ProxyError::Internal(format!("http error: {}", e))
    }
}

impl From<hyper::Error> for ProxyError {
    fn from(e: hyper::Error) -> Self {
        ProxyError::Internal(format!("fetch error: {}", e))
    }
}

impl From<image::ImageError> for ProxyError {
    fn from(e: image::ImageError) -> Self {
        ProxyError::Transform(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;

pub fn setup_logger() {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));
}
