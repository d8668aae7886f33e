//! Provider specific decoding of responses.
//!
//! The pipeline calls [`Responder::unmarshal`], then
//! [`Responder::check_error`], and [`Responder::meta`] only when no error
//! was reported. A responder lives for a single request.

use serde::de::DeserializeOwned;

use crate::error::{BoxError, EmptyBody};

/// Normalized details of an accepted message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Meta {
    pub message: String,
    pub id: String,
}

/// Decodes and classifies the response of one provider
pub trait Responder: Send {
    /// Populates the responder from the raw body, which may be empty
    fn unmarshal(&mut self, body: &[u8]) -> Result<(), BoxError>;

    /// Returns the provider diagnostic if the response is a failure
    fn check_error(&self, status: u16, body: &[u8]) -> Result<(), BoxError>;

    fn meta(&self) -> Meta;
}

/// Returns true for 2xx status codes
pub fn is_2xx(status: u16) -> bool {
    (200..300).contains(&status)
}

/// Decodes a JSON body, or returns the default value for an empty one
pub fn decode<T: DeserializeOwned + Default>(body: &[u8]) -> Result<T, BoxError> {
    if is_blank(body) {
        return Ok(T::default());
    }
    Ok(serde_json::from_slice(body)?)
}

/// Failure status with nothing to diagnose
pub fn check_empty_body(status: u16, body: &[u8]) -> Result<(), BoxError> {
    if !is_2xx(status) && is_blank(body) {
        return Err(EmptyBody.into());
    }
    Ok(())
}

/// Empty or whitespace only
fn is_blank(body: &[u8]) -> bool {
    body.iter().all(u8::is_ascii_whitespace)
}
