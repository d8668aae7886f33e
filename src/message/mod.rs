//! The logical email handed to a [`Mailer`](crate::Mailer).
//!
//! A [`Transmission`] is built by the caller for every send and only read by
//! the drivers. It carries the recipients, the subject, the HTML and plain
//! text bodies, raw [`Attachment`]s and extra headers.
//!
//! ```rust
//! use mailbridge::message::{Attachment, Transmission};
//!
//! let tx = Transmission {
//!     recipients: vec!["hello@example.com".to_owned()],
//!     subject: "Hi".to_owned(),
//!     html: "<h1>Hi</h1>".to_owned(),
//!     attachments: vec![Attachment::new("notes.txt", b"some notes".to_vec())],
//!     ..Transmission::default()
//! };
//!
//! assert!(tx.validate().is_ok());
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::Error;

pub use self::attachment::Attachment;

mod attachment;
pub mod media;

/// An email ready to be dispatched by any driver
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Transmission {
    /// Primary recipients, at least one is required
    pub recipients: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
    pub html: String,
    pub plain_text: String,
    pub attachments: Vec<Attachment>,
    /// Extra headers, one value per name
    pub headers: BTreeMap<String, String>,
}

impl Transmission {
    /// Checks the fields every driver needs.
    ///
    /// Recipients come first, then the subject, then the HTML body. The first
    /// missing field is reported.
    pub fn validate(&self) -> Result<(), Error> {
        if self.recipients.is_empty() {
            return Err(Error::invalid("transmission requires recipients"));
        }
        if self.subject.is_empty() {
            return Err(Error::invalid("transmission requires a subject"));
        }
        if self.html.is_empty() {
            return Err(Error::invalid("transmission requires html content"));
        }
        Ok(())
    }

    pub fn has_cc(&self) -> bool {
        !self.cc.is_empty()
    }

    pub fn has_bcc(&self) -> bool {
        !self.bcc.is_empty()
    }

    pub fn has_attachments(&self) -> bool {
        !self.attachments.is_empty()
    }

    /// Recipients followed by CC and BCC, in insertion order
    pub fn all_recipients(&self) -> impl Iterator<Item = &str> {
        self.recipients
            .iter()
            .chain(self.cc.iter())
            .chain(self.bcc.iter())
            .map(String::as_str)
    }
}

/// Validates a transmission that may not be there at all
pub fn validate(tx: Option<&Transmission>) -> Result<(), Error> {
    match tx {
        Some(tx) => tx.validate(),
        None => Err(Error::invalid("can't validate a nil transmission")),
    }
}
