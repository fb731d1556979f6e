//! Core error types

use thiserror::Error;

/// Errors raised inside the icon pipeline before they are collapsed to
/// absent results at the public boundary
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid bitmap: {0}")]
    InvalidBitmap(String),

    #[error("Image encode error: {0}")]
    ImageEncode(String),
}

impl From<image::ImageError> for CoreError {
    fn from(e: image::ImageError) -> Self {
        CoreError::ImageEncode(e.to_string())
    }
}
