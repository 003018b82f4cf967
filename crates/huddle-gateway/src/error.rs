use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid gateway url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("gateway connect failed: {0}")]
    Connect(#[from] tokio_tungstenite::tungstenite::Error),
}
