//! SendGrid driver, using the v3 mail send API.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::Mailer;
use crate::{
    config::Config,
    error::BoxError,
    http::{check_empty_body, decode, is_2xx, Client, JsonData, Meta, Request, Responder, Response},
    message::Transmission,
    Error,
};

const ENDPOINT: &str = "https://api.sendgrid.com/v3/mail/send";
const ERROR_PREFIX: &str = "error sending transmission to Sendgrid API";

/// Sends transmissions through the SendGrid mail send API
///
/// The endpoint is fixed, `url` is not used.
#[derive(Debug, Clone)]
pub struct Sendgrid {
    cfg: Config,
    client: Client,
    endpoint: String,
}

impl Sendgrid {
    pub fn new(cfg: Config) -> Result<Sendgrid, Error> {
        cfg.validate()?;
        let client = Client::from_config(&cfg)?;
        Ok(Sendgrid {
            cfg,
            client,
            endpoint: ENDPOINT.to_owned(),
        })
    }

    /// Sends to another endpoint, e.g. a local test server
    pub fn endpoint<S: Into<String>>(mut self, endpoint: S) -> Sendgrid {
        self.endpoint = endpoint.into();
        self
    }
}

#[derive(Debug, Serialize)]
struct SendgridMessage<'a> {
    from: SendgridAddress<'a>,
    personalizations: Vec<Personalization<'a>>,
    content: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<SendgridAttachment<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    headers: Option<&'a BTreeMap<String, String>>,
}

#[derive(Debug, Serialize)]
struct SendgridAddress<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    email: &'a str,
}

#[derive(Debug, Serialize)]
struct Personalization<'a> {
    to: Vec<SendgridAddress<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    cc: Vec<SendgridAddress<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    bcc: Vec<SendgridAddress<'a>>,
    subject: &'a str,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    value: &'a str,
}

#[derive(Debug, Serialize)]
struct SendgridAttachment<'a> {
    content: String,
    #[serde(rename = "type")]
    kind: String,
    filename: &'a str,
    disposition: &'static str,
}

fn addresses(list: &[String]) -> Vec<SendgridAddress<'_>> {
    list.iter()
        .map(|email| SendgridAddress { name: None, email })
        .collect()
}

impl<'a> SendgridMessage<'a> {
    fn new(cfg: &'a Config, tx: &'a Transmission) -> SendgridMessage<'a> {
        let mut content = Vec::with_capacity(2);
        if !tx.plain_text.is_empty() {
            content.push(Content {
                kind: "text/plain",
                value: &tx.plain_text,
            });
        }
        content.push(Content {
            kind: "text/html",
            value: &tx.html,
        });

        SendgridMessage {
            from: SendgridAddress {
                name: Some(&cfg.from_name),
                email: &cfg.from_address,
            },
            personalizations: vec![Personalization {
                to: addresses(&tx.recipients),
                cc: addresses(&tx.cc),
                bcc: addresses(&tx.bcc),
                subject: &tx.subject,
            }],
            content,
            attachments: tx
                .attachments
                .iter()
                .map(|a| SendgridAttachment {
                    content: a.base64(),
                    kind: a.media_type(),
                    filename: &a.filename,
                    disposition: "attachment",
                })
                .collect(),
            headers: Some(&tx.headers).filter(|h| !h.is_empty()),
        }
    }
}

#[async_trait]
impl Mailer for Sendgrid {
    async fn send(&self, tx: &Transmission) -> Result<Response, Error> {
        tx.validate()?;
        debug!(
            driver = "sendgrid",
            recipients = tx.recipients.len(),
            attachments = tx.attachments.len(),
            "sending transmission"
        );

        let payload = JsonData::new(&SendgridMessage::new(&self.cfg, tx))?;

        let mut request = Request::post(self.endpoint.as_str());
        request.add_header("Authorization", format!("Bearer {}", self.cfg.api_key));

        self.client
            .execute(
                &CancellationToken::new(),
                &request,
                Some(&payload),
                &mut SendgridResponse::default(),
            )
            .await
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SendgridResponse {
    errors: Vec<SendgridError>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SendgridError {
    message: String,
    field: Option<String>,
}

impl Responder for SendgridResponse {
    fn unmarshal(&mut self, body: &[u8]) -> Result<(), BoxError> {
        *self = decode(body)?;
        Ok(())
    }

    fn check_error(&self, status: u16, body: &[u8]) -> Result<(), BoxError> {
        check_empty_body(status, body)?;
        if is_2xx(status) && self.errors.is_empty() {
            return Ok(());
        }
        let message = match self.errors.first() {
            Some(SendgridError {
                message,
                field: Some(field),
            }) => format!("{} - message: {}, field: {}", ERROR_PREFIX, message, field),
            Some(SendgridError { message, .. }) => {
                format!("{} - message: {}", ERROR_PREFIX, message)
            }
            None => format!("{} - status: {}", ERROR_PREFIX, status),
        };
        Err(message.into())
    }

    fn meta(&self) -> Meta {
        Meta {
            message: "Successfully sent Sendgrid email".to_owned(),
            id: String::new(),
        }
    }
}
