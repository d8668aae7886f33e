//! In-memory driver for tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::debug;

use super::Mailer;
use crate::{http::Response, message::Transmission, Error};

/// Message of the error returned by [`StubMailer::new_error`]
pub const STUB_ERROR: &str = "stub mailer error";

/// Records sent transmissions instead of delivering them
///
/// Clones share the same record.
#[derive(Debug, Clone)]
pub struct StubMailer {
    fail: bool,
    sent: Arc<Mutex<Vec<Transmission>>>,
}

impl StubMailer {
    /// Accepts every valid transmission
    pub fn new_ok() -> StubMailer {
        StubMailer {
            fail: false,
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Fails every valid transmission with an API error
    pub fn new_error() -> StubMailer {
        StubMailer {
            fail: true,
            ..StubMailer::new_ok()
        }
    }

    /// Transmissions accepted so far
    pub fn sent(&self) -> Vec<Transmission> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl Mailer for StubMailer {
    async fn send(&self, tx: &Transmission) -> Result<Response, Error> {
        tx.validate()?;
        debug!(driver = "stub", recipients = tx.recipients.len(), "sending transmission");

        if self.fail {
            return Err(Error::api(STUB_ERROR));
        }

        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(tx.clone());
        Ok(Response {
            status_code: 200,
            message: "Email sent successfully".to_owned(),
            ..Response::default()
        })
    }
}
