//! Error type shared by every driver and by the HTTP pipeline.
//!
//! Errors are tagged with a [`Kind`], carry a human message and the operation
//! that produced them, and may wrap a cause. [`kind_of`] and [`message_of`]
//! look through nested errors to find the first tagged value.

use std::{
    error::Error as StdError,
    fmt::{self, Display, Formatter},
};

use crate::http::Response;

/// Foreign error carried as the cause of an [`Error`]
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Prefix written in front of every rendered error.
pub const PREFIX: &str = "mailbridge";

/// Message returned by [`message_of`] when no error in the chain carries one.
pub const GENERIC_MESSAGE: &str = "An error has occurred.";

/// Classification of a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// An action cannot be performed. Reserved, the library does not produce it.
    Conflict,
    /// Failure inside the library (encoding, decoding, reading a body)
    Internal,
    /// Bad input: validation, malformed URLs, undecodable responses
    Invalid,
    /// The remote service or the transport failed
    Api,
}

impl Display for Kind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Kind::Conflict => "conflict",
            Kind::Internal => "internal",
            Kind::Invalid => "invalid",
            Kind::Api => "api",
        })
    }
}

/// The error returned by every fallible operation of this crate
pub struct Error {
    inner: Box<Inner>,
}

struct Inner {
    kind: Option<Kind>,
    message: String,
    operation: Option<&'static str>,
    source: Option<BoxError>,
    response: Option<Response>,
}

impl Error {
    pub(crate) fn new<M: Into<String>>(kind: Kind, message: M) -> Error {
        Error {
            inner: Box::new(Inner {
                kind: Some(kind),
                message: message.into(),
                operation: None,
                source: None,
                response: None,
            }),
        }
    }

    /// Wraps a foreign error without tagging it.
    ///
    /// [`kind_of`] reports such an error as [`Kind::Internal`].
    pub fn wrap<E: Into<BoxError>>(source: E) -> Error {
        Error {
            inner: Box::new(Inner {
                kind: None,
                message: String::new(),
                operation: None,
                source: Some(source.into()),
                response: None,
            }),
        }
    }

    pub(crate) fn invalid<M: Into<String>>(message: M) -> Error {
        Error::new(Kind::Invalid, message)
    }

    pub(crate) fn internal<M: Into<String>>(message: M) -> Error {
        Error::new(Kind::Internal, message)
    }

    pub(crate) fn api<M: Into<String>>(message: M) -> Error {
        Error::new(Kind::Api, message)
    }

    pub(crate) fn with_operation(mut self, operation: &'static str) -> Error {
        self.inner.operation = Some(operation);
        self
    }

    pub(crate) fn with_source<E: Into<BoxError>>(mut self, source: E) -> Error {
        self.inner.source = Some(source.into());
        self
    }

    pub(crate) fn with_response(mut self, response: Response) -> Error {
        self.inner.response = Some(response);
        self
    }

    /// Kind of this error, if it was tagged
    pub fn kind(&self) -> Option<Kind> {
        self.inner.kind
    }

    /// Human readable message, empty when the error only wraps a cause
    pub fn message(&self) -> &str {
        &self.inner.message
    }

    /// Operation that failed, e.g. `Client.Do`
    pub fn operation(&self) -> Option<&str> {
        self.inner.operation
    }

    /// Whatever the HTTP pipeline managed to read before failing.
    ///
    /// Present for every pipeline failure that happened after the server
    /// answered, so the status code and the provider's diagnostic body are
    /// never lost.
    pub fn response(&self) -> Option<&Response> {
        self.inner.response.as_ref()
    }

    /// Returns true if the error is tagged with the given kind
    pub fn is(&self, kind: Kind) -> bool {
        self.inner.kind == Some(kind)
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut builder = f.debug_struct("mailbridge::Error");

        if let Some(kind) = &self.inner.kind {
            builder.field("kind", kind);
        }
        if !self.inner.message.is_empty() {
            builder.field("message", &self.inner.message);
        }
        if let Some(operation) = &self.inner.operation {
            builder.field("operation", operation);
        }
        if let Some(source) = &self.inner.source {
            builder.field("source", source);
        }
        if let Some(response) = &self.inner.response {
            builder.field("status_code", &response.status_code);
        }

        builder.finish()
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ", PREFIX)?;

        if crate::is_debug() {
            if let Some(operation) = self.inner.operation {
                write!(f, "{}: ", operation)?;
            }
        }

        match (&self.inner.source, self.inner.message.is_empty()) {
            (Some(source), true) => write!(f, "{}", source),
            (Some(source), false) => write!(f, "{}: {}", self.inner.message, source),
            (None, _) => f.write_str(&self.inner.message),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner.source.as_ref().map(|e| {
            let r: &(dyn StdError + 'static) = &**e;
            r
        })
    }
}

/// Kind of the first tagged error in the chain.
///
/// Untagged and foreign errors report [`Kind::Internal`].
pub fn kind_of(err: &(dyn StdError + 'static)) -> Kind {
    match err.downcast_ref::<Error>() {
        Some(e) => match (e.kind(), e.source()) {
            (Some(kind), _) => kind,
            (None, Some(source)) => kind_of(source),
            (None, None) => Kind::Internal,
        },
        None => Kind::Internal,
    }
}

/// Message of the first error in the chain that carries one.
///
/// Falls back to [`GENERIC_MESSAGE`].
pub fn message_of(err: &(dyn StdError + 'static)) -> String {
    match err.downcast_ref::<Error>() {
        Some(e) if !e.message().is_empty() => e.message().to_owned(),
        Some(e) => match e.source() {
            Some(source) => message_of(source),
            None => GENERIC_MESSAGE.to_owned(),
        },
        None => GENERIC_MESSAGE.to_owned(),
    }
}

/// A provider answered with a failure status and nothing to diagnose
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmptyBody;

impl Display for EmptyBody {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("error, empty body")
    }
}

impl StdError for EmptyBody {}

/// The cancellation token fired before the request completed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

impl Display for Cancelled {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("request cancelled")
    }
}

impl StdError for Cancelled {}

#[cfg(test)]
mod test {
    use super::{kind_of, message_of, EmptyBody, Error, Kind, GENERIC_MESSAGE};
    use std::io;

    #[test]
    fn display_message() {
        let err = Error::invalid("transmission requires a subject");
        assert_eq!(
            err.to_string(),
            "mailbridge: transmission requires a subject"
        );
    }

    #[test]
    fn display_message_and_cause() {
        let err = Error::api("Error performing mail request").with_source(EmptyBody);
        assert_eq!(
            err.to_string(),
            "mailbridge: Error performing mail request: error, empty body"
        );
    }

    #[test]
    fn display_cause_only() {
        let err = Error::wrap(io::Error::new(io::ErrorKind::Other, "connection refused"));
        assert_eq!(err.to_string(), "mailbridge: connection refused");
    }

    #[test]
    fn kind_of_tagged() {
        let err = Error::invalid("bad");
        assert_eq!(kind_of(&err), Kind::Invalid);
        assert!(err.is(Kind::Invalid));
    }

    #[test]
    fn kind_of_walks_untagged_wrappers() {
        let err = Error::wrap(Error::api("remote"));
        assert_eq!(err.kind(), None);
        assert_eq!(kind_of(&err), Kind::Api);
    }

    #[test]
    fn kind_of_defaults_to_internal() {
        let foreign = io::Error::new(io::ErrorKind::Other, "boom");
        assert_eq!(kind_of(&foreign), Kind::Internal);
        assert_eq!(kind_of(&Error::wrap(foreign)), Kind::Internal);
    }

    #[test]
    fn message_of_walks_chain() {
        let err = Error::wrap(Error::internal("Error reading response body"));
        assert_eq!(message_of(&err), "Error reading response body");

        let foreign = io::Error::new(io::ErrorKind::Other, "boom");
        assert_eq!(message_of(&foreign), GENERIC_MESSAGE);
        assert_eq!(message_of(&Error::wrap(foreign)), GENERIC_MESSAGE);
    }

    #[test]
    fn kind_display() {
        assert_eq!(Kind::Conflict.to_string(), "conflict");
        assert_eq!(Kind::Internal.to_string(), "internal");
        assert_eq!(Kind::Invalid.to_string(), "invalid");
        assert_eq!(Kind::Api.to_string(), "api");
    }
}
