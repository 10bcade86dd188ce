use thiserror::Error;

#[derive(Error, Debug)]
pub enum CursorError {
    #[error("Invalid cursor encoding: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("Invalid cursor payload: {0}")]
    Payload(#[from] serde_json::Error),
}
