// lottie-data: Serde structs for Lottie sticker payloads
pub mod model;
pub mod payload;

pub use model::LottieJson;
pub use payload::decode_payload;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DataError {
    #[error("payload is empty")]
    Empty,
    #[error("failed to inflate tgs payload: {0}")]
    Inflate(#[source] std::io::Error),
    #[error("inflated payload exceeds {0} bytes")]
    TooLarge(usize),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
