//! Mailbridge sends email through transactional mail providers behind a single
//! interface. It provides:
//!
//! * A provider-neutral [`Transmission`] with attachments and custom headers
//! * Drivers for the Mailgun, Postal, Postmark, SendGrid and SparkPost HTTP
//!   APIs, and for plain SMTP
//! * A shared HTTP pipeline reporting status, body, headers and provider
//!   message id for every call
//! * Tagged errors ([`Kind`]) that keep the partial response of failed calls
//!
//! ## Optional features
//!
//! * **smtp** (default): SMTP driver, using the `lettre` crate
//!
//! ## Debug mode
//!
//! [`set_debug`] turns on the debug output of the crate. Every HTTP request is
//! then logged as an equivalent `curl` command, on the `mailbridge::curl`
//! tracing target, and error messages include the failing operation.

#![deny(
    missing_copy_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unstable_features,
    unused_import_braces,
    unsafe_code
)]

use std::sync::atomic::{AtomicBool, Ordering};

pub use crate::config::Config;
pub use crate::error::{Error, Kind};
pub use crate::http::Response;
pub use crate::message::{Attachment, Transmission};
pub use crate::transport::{new_driver, DriverKind, Mailer};

pub mod config;
pub mod error;
pub mod http;
pub mod message;
pub mod transport;

static DEBUG: AtomicBool = AtomicBool::new(false);

/// Turns the debug output on or off, for the whole process
pub fn set_debug(debug: bool) {
    DEBUG.store(debug, Ordering::Relaxed);
}

/// Whether the debug output is on
pub fn is_debug() -> bool {
    DEBUG.load(Ordering::Relaxed)
}
