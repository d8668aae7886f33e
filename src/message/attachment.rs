use serde::{Deserialize, Serialize};

use super::media;

/// A file attached to a [`Transmission`](super::Transmission)
///
/// The bytes are supplied by the caller and never interpreted, except to
/// guess their media type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub fn new<S: Into<String>>(filename: S, bytes: Vec<u8>) -> Attachment {
        Attachment {
            filename: filename.into(),
            bytes,
        }
    }

    /// Media type sniffed from the content
    pub fn media_type(&self) -> String {
        media::detect(&self.bytes)
    }

    /// Standard base64 encoding of the content, without line breaks
    pub fn base64(&self) -> String {
        base64::encode(&self.bytes)
    }
}
