//! The HTTP pipeline shared by every API driver.
//!
//! A driver describes its call with a [`Request`], an optional [`Payload`]
//! and a [`Responder`], and hands them to [`Client::execute`]. The client
//! builds the native request, sends it, drains the body and lets the
//! responder decide what the provider said. Everything read from the server
//! ends up in the returned [`Response`], or in [`Error::response`] when the
//! call failed after the round-trip.

use std::{collections::BTreeMap, fmt::Write as _, sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE, USER_AGENT,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    config::Config,
    error::{BoxError, Cancelled},
    Error,
};

pub use self::payload::{FormData, JsonData, Payload};
pub use self::request::{BasicAuth, Request};
pub use self::responder::{check_empty_body, decode, is_2xx, Meta, Responder};

pub mod payload;
pub mod request;
pub mod responder;

/// Overall deadline of the default client
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// `User-Agent` sent with every request unless a driver overrides it
pub const DEFAULT_USER_AGENT: &str = concat!("mailbridge/", env!("CARGO_PKG_VERSION"));

/// Uniform result of a send, whatever the driver
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    pub status_code: u16,
    /// Raw response body
    pub body: Bytes,
    /// Response headers, names are lowercase
    pub headers: BTreeMap<String, Vec<String>>,
    /// Provider message id, may be empty
    pub id: String,
    pub message: String,
}

/// Drains response bodies
///
/// On failure the bytes already appended to `buf` are kept in the partial
/// response.
#[async_trait]
pub trait BodyReader: Send + Sync {
    async fn read(
        &self,
        response: &mut reqwest::Response,
        buf: &mut BytesMut,
    ) -> Result<(), BoxError>;
}

/// Reads the whole body, chunk by chunk
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadToEnd;

#[async_trait]
impl BodyReader for ReadToEnd {
    async fn read(
        &self,
        response: &mut reqwest::Response,
        buf: &mut BytesMut,
    ) -> Result<(), BoxError> {
        while let Some(chunk) = response.chunk().await? {
            buf.extend_from_slice(&chunk);
        }
        Ok(())
    }
}

/// Outcome of an operation raced against the cancellation token
enum Raced<T> {
    Done(T),
    Cancelled,
}

/// Executes requests for the API drivers
///
/// Cheap to clone, clones share the connection pool.
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    body_reader: Arc<dyn BodyReader>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client").field("http", &self.http).finish()
    }
}

impl Client {
    /// Creates a client with a 10 seconds timeout
    pub fn new() -> Result<Client, Error> {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .user_agent(DEFAULT_USER_AGENT)
            .build()
            .map_err(|e| Error::internal("Error creating http client").with_source(e))?;
        Ok(Client::with_http(http))
    }

    /// Wraps an existing client, keeping its timeout settings
    pub fn with_http(http: reqwest::Client) -> Client {
        Client {
            http,
            body_reader: Arc::new(ReadToEnd),
        }
    }

    /// Uses the client injected in the config, or a default one
    pub fn from_config(cfg: &Config) -> Result<Client, Error> {
        match &cfg.client {
            Some(http) => Ok(Client::with_http(http.clone())),
            None => Client::new(),
        }
    }

    /// Replaces the body reader
    pub fn body_reader<R: BodyReader + 'static>(mut self, reader: R) -> Client {
        self.body_reader = Arc::new(reader);
        self
    }

    /// Sends `request` and decodes the answer with `responder`.
    ///
    /// Firing `cancel` aborts the round-trip or the body drain, and the call
    /// returns an [`Kind::Api`](crate::error::Kind::Api) error caused by
    /// [`Cancelled`].
    pub async fn execute(
        &self,
        cancel: &CancellationToken,
        request: &Request,
        payload: Option<&dyn Payload>,
        responder: &mut dyn Responder,
    ) -> Result<Response, Error> {
        let native = self.prepare(request, payload)?;

        if crate::is_debug() {
            info!(
                target: "mailbridge::curl",
                "{}",
                curl_command(&native, request, payload)
            );
        }

        debug!(method = %native.method(), url = %native.url(), "sending mail request");

        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => Raced::Cancelled,
            result = self.http.execute(native) => Raced::Done(result),
        };
        let mut http_response = match sent {
            Raced::Done(Ok(http_response)) => http_response,
            Raced::Done(Err(e)) => return Err(do_error(e)),
            Raced::Cancelled => return Err(do_error(Cancelled)),
        };

        let status = http_response.status().as_u16();
        debug!(status, "received mail response");

        let mut response = Response {
            status_code: status,
            headers: collect_headers(http_response.headers()),
            ..Response::default()
        };

        let mut buf = BytesMut::new();
        let drained = tokio::select! {
            biased;
            _ = cancel.cancelled() => Raced::Cancelled,
            result = self.body_reader.read(&mut http_response, &mut buf) => Raced::Done(result),
        };
        response.body = buf.freeze();

        match drained {
            Raced::Done(Ok(())) => {}
            Raced::Done(Err(e)) => {
                return Err(Error::internal("Error reading response body")
                    .with_operation("Client.Do")
                    .with_source(e)
                    .with_response(response));
            }
            Raced::Cancelled => {
                return Err(do_error(Cancelled).with_response(response));
            }
        }

        if let Err(e) = responder.unmarshal(&response.body) {
            return Err(Error::invalid("Error unmarshalling response error")
                .with_operation("Client.Do")
                .with_source(e)
                .with_response(response));
        }

        if let Err(e) = responder.check_error(status, &response.body) {
            warn!(status, error = %e, "mail provider rejected the request");
            return Err(Error::api("Error performing mail request")
                .with_operation("Client.Do")
                .with_source(e)
                .with_response(response));
        }

        let Meta { message, id } = responder.meta();
        response.message = message;
        response.id = id;
        Ok(response)
    }

    fn prepare(
        &self,
        request: &Request,
        payload: Option<&dyn Payload>,
    ) -> Result<reqwest::Request, Error> {
        let body = match payload {
            Some(payload) => Some(payload.buffer().map_err(request_error)?),
            None => None,
        };

        let method =
            reqwest::Method::from_bytes(request.method.as_bytes()).map_err(request_error)?;
        let url = reqwest::Url::parse(&request.url).map_err(request_error)?;

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));

        if let Some(payload) = payload {
            let content_type = payload.content_type();
            if !content_type.is_empty() {
                headers.insert(
                    CONTENT_TYPE,
                    HeaderValue::from_str(&content_type).map_err(request_error)?,
                );
            }
        }

        if let Some(auth) = request.basic_auth.as_ref().filter(|a| a.is_complete()) {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&auth.header_value()).map_err(request_error)?,
            );
        }

        for (name, value) in &request.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(request_error)?;
            headers.insert(name, HeaderValue::from_str(value).map_err(request_error)?);
        }

        let mut native = reqwest::Request::new(method, url);
        *native.headers_mut() = headers;
        if let Some(body) = body {
            *native.body_mut() = Some(body.into());
        }
        Ok(native)
    }
}

fn do_error<E: Into<BoxError>>(e: E) -> Error {
    Error::api("Error doing request")
        .with_operation("Client.Do")
        .with_source(e)
}

fn request_error<E: Into<BoxError>>(e: E) -> Error {
    Error::invalid("Error creating http request")
        .with_operation("Client.MakeRequest")
        .with_source(e)
}

fn collect_headers(headers: &HeaderMap) -> BTreeMap<String, Vec<String>> {
    let mut collected: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in headers {
        collected
            .entry(name.as_str().to_owned())
            .or_default()
            .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
    }
    collected
}

/// Equivalent `curl` invocation, without credentials or file contents
fn curl_command(
    native: &reqwest::Request,
    request: &Request,
    payload: Option<&dyn Payload>,
) -> String {
    let basic_auth = request.basic_auth.as_ref().filter(|a| a.is_complete());

    let mut command = format!("curl -i -X {} {}", native.method(), native.url());

    for (name, value) in native.headers() {
        if basic_auth.is_some() && name == AUTHORIZATION {
            continue;
        }
        let _ = write!(
            command,
            " -H \"{}: {}\"",
            name,
            String::from_utf8_lossy(value.as_bytes())
        );
    }

    if let Some(auth) = basic_auth {
        let _ = write!(command, " -u {}:****", auth.user);
    }

    if let Some(payload) = payload {
        for (key, value) in payload.values() {
            let _ = write!(command, " -F {}='{}'", key, value);
        }
    }

    command
}
