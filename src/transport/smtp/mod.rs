//! The SMTP driver composes a MIME message from the transmission and hands it
//! to an [`SmtpRelay`], which runs the SMTP session.
//!
//! The default relay, [`LettreRelay`], connects to `url:port`, upgrades the
//! connection with STARTTLS when the server offers it (or uses implicit TLS on
//! port 465), and authenticates with `PLAIN` using the from address and the
//! password of the config.
//!
//! Envelope recipients are the primary recipients followed by CC and BCC, in
//! insertion order and without deduplication. BCC addresses never appear in
//! the headers.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use lettre::message::{
    header::{ContentDisposition, ContentTransferEncoding, ContentType},
    MultiPart, SinglePart,
};
use tracing::{debug, warn};

use super::Mailer;
use crate::{config::Config, error::BoxError, http::Response, message::Transmission, Error};

pub use self::relay::LettreRelay;

mod relay;

/// Port used when the config does not set one
pub const DEFAULT_PORT: u16 = 587;

/// Port of SMTP over implicit TLS
pub const SUBMISSIONS_PORT: u16 = 465;

const CRLF: &str = "\r\n";
const HTML_TYPE: &str = "text/html; charset=ascii";

/// Everything needed to run one SMTP session
#[derive(Clone, PartialEq, Eq)]
pub struct SmtpEnvelope<'a> {
    pub host: &'a str,
    pub port: u16,
    pub username: &'a str,
    pub password: &'a str,
    /// `MAIL FROM` address
    pub from: &'a str,
    /// `RCPT TO` addresses
    pub recipients: Vec<&'a str>,
}

impl fmt::Debug for SmtpEnvelope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpEnvelope")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"****")
            .field("from", &self.from)
            .field("recipients", &self.recipients)
            .finish()
    }
}

/// Delivers a composed message to an SMTP server
#[async_trait]
pub trait SmtpRelay: Send + Sync {
    async fn send_mail(
        &self,
        envelope: &SmtpEnvelope<'_>,
        message: &[u8],
    ) -> Result<(), BoxError>;
}

/// Sends transmissions over SMTP
#[derive(Clone)]
pub struct Smtp {
    cfg: Config,
    relay: Arc<dyn SmtpRelay>,
}

impl fmt::Debug for Smtp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Smtp").field("cfg", &self.cfg).finish()
    }
}

impl Smtp {
    /// Validates the config and relays through lettre
    pub fn new(cfg: Config) -> Result<Smtp, Error> {
        Smtp::with_relay(cfg, LettreRelay)
    }

    /// Validates the config and relays through `relay`
    pub fn with_relay<R: SmtpRelay + 'static>(cfg: Config, relay: R) -> Result<Smtp, Error> {
        cfg.validate_smtp()?;
        Ok(Smtp {
            cfg,
            relay: Arc::new(relay),
        })
    }

    fn port(&self) -> u16 {
        if self.cfg.port == 0 {
            DEFAULT_PORT
        } else {
            self.cfg.port
        }
    }
}

#[async_trait]
impl Mailer for Smtp {
    async fn send(&self, tx: &Transmission) -> Result<Response, Error> {
        tx.validate()?;
        self.cfg.validate_smtp()?;

        let message = compose(&self.cfg, tx, &random_boundary());
        let envelope = SmtpEnvelope {
            host: &self.cfg.url,
            port: self.port(),
            username: &self.cfg.from_address,
            password: &self.cfg.password,
            from: &self.cfg.from_address,
            recipients: tx.all_recipients().collect(),
        };

        debug!(
            driver = "smtp",
            host = envelope.host,
            port = envelope.port,
            recipients = envelope.recipients.len(),
            attachments = tx.attachments.len(),
            "starting smtp session"
        );

        self.relay
            .send_mail(&envelope, &message)
            .await
            .map_err(|e| Error::api("").with_source(e))?;

        Ok(Response {
            status_code: 200,
            message: "Email sent successfully".to_owned(),
            ..Response::default()
        })
    }
}

/// Builds the raw message, with `boundary` separating multipart sections
///
/// The HTML body alone is sent as a single `text/html` part. A plain text
/// body or attachments switch to `multipart/mixed`. Bodies go through
/// lettre's part builder, which normalizes line endings and picks a transfer
/// encoding that keeps every line within the SMTP limit.
pub fn compose(cfg: &Config, tx: &Transmission, boundary: &str) -> Vec<u8> {
    let mut out = String::new();

    push_header(&mut out, "Subject", &tx.subject);
    push_header(&mut out, "To", &tx.recipients.join(","));
    if tx.has_cc() {
        push_header(&mut out, "Cc", &tx.cc.join(","));
    }
    push_header(&mut out, "From", &cfg.sender());
    for (name, value) in &tx.headers {
        if is_header_name(name) {
            push_header(&mut out, name, value);
        } else {
            warn!(driver = "smtp", header = ?name, "dropping invalid header name");
        }
    }
    push_header(&mut out, "MIME-Version", "1.0");

    let mut message = out.into_bytes();

    if !tx.has_attachments() && tx.plain_text.is_empty() {
        message.extend(html_part(&tx.html).formatted());
        return message;
    }

    let mut body = MultiPart::mixed().boundary(boundary).build();
    if !tx.plain_text.is_empty() {
        body = body.singlepart(
            SinglePart::builder()
                .header(ContentType::TEXT_PLAIN)
                .body(tx.plain_text.clone()),
        );
    }
    body = body.singlepart(html_part(&tx.html));

    for attachment in &tx.attachments {
        let media_type = ContentType::parse(&attachment.media_type())
            .unwrap_or_else(|_| ContentType::from(mime::APPLICATION_OCTET_STREAM));
        body = body.singlepart(
            SinglePart::builder()
                .header(media_type)
                .header(ContentTransferEncoding::Base64)
                .header(ContentDisposition::attachment(&attachment.filename))
                .body(attachment.bytes.clone()),
        );
    }

    message.extend(body.formatted());
    message
}

fn html_part(html: &str) -> SinglePart {
    let content_type = ContentType::parse(HTML_TYPE).unwrap_or(ContentType::TEXT_HTML);
    SinglePart::builder()
        .header(content_type)
        .body(html.to_owned())
}

/// Printable ASCII without the colon, as RFC 5322 wants for field names
fn is_header_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b.is_ascii_graphic() && b != b':')
}

fn push_header(out: &mut String, name: &str, value: &str) {
    out.push_str(name);
    out.push_str(": ");
    // a header is a single line
    out.extend(
        value
            .chars()
            .map(|c| if c == '\r' || c == '\n' { ' ' } else { c }),
    );
    out.push_str(CRLF);
}

fn random_boundary() -> String {
    std::iter::repeat_with(fastrand::alphanumeric)
        .take(40)
        .collect()
}
