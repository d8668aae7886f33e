//! Postal driver.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::Mailer;
use crate::{
    config::Config,
    error::BoxError,
    http::{check_empty_body, decode, Client, JsonData, Meta, Request, Responder, Response},
    message::Transmission,
    Error,
};

const ERROR_PREFIX: &str = "error sending transmission to Postal API";

/// Sends transmissions through `{url}/api/v1/send/message`
#[derive(Debug, Clone)]
pub struct Postal {
    cfg: Config,
    client: Client,
}

impl Postal {
    pub fn new(cfg: Config) -> Result<Postal, Error> {
        cfg.validate()?;
        let client = Client::from_config(&cfg)?;
        Ok(Postal { cfg, client })
    }
}

#[derive(Debug, Serialize)]
struct PostalMessage<'a> {
    to: &'a [String],
    cc: &'a [String],
    bcc: &'a [String],
    from: &'a str,
    sender: &'a str,
    subject: &'a str,
    html_body: &'a str,
    plain_body: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<PostalAttachment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    headers: Option<&'a BTreeMap<String, String>>,
}

#[derive(Debug, Serialize)]
struct PostalAttachment {
    name: String,
    content_type: String,
    data: String,
}

impl<'a> PostalMessage<'a> {
    fn new(cfg: &'a Config, tx: &'a Transmission) -> PostalMessage<'a> {
        PostalMessage {
            to: &tx.recipients,
            cc: &tx.cc,
            bcc: &tx.bcc,
            from: &cfg.from_address,
            sender: &cfg.from_name,
            subject: &tx.subject,
            html_body: &tx.html,
            plain_body: &tx.plain_text,
            attachments: tx
                .attachments
                .iter()
                .map(|a| PostalAttachment {
                    name: a.filename.clone(),
                    content_type: a.media_type(),
                    data: a.base64(),
                })
                .collect(),
            headers: Some(&tx.headers).filter(|h| !h.is_empty()),
        }
    }
}

#[async_trait]
impl Mailer for Postal {
    async fn send(&self, tx: &Transmission) -> Result<Response, Error> {
        tx.validate()?;
        debug!(
            driver = "postal",
            recipients = tx.recipients.len(),
            attachments = tx.attachments.len(),
            "sending transmission"
        );

        let payload = JsonData::new(&PostalMessage::new(&self.cfg, tx))?;

        let mut request = Request::post(format!("{}/api/v1/send/message", self.cfg.base_url()));
        request.add_header("X-Server-API-Key", self.cfg.api_key.as_str());

        self.client
            .execute(
                &CancellationToken::new(),
                &request,
                Some(&payload),
                &mut PostalResponse::default(),
            )
            .await
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PostalResponse {
    status: String,
    data: Map<String, Value>,
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl Responder for PostalResponse {
    fn unmarshal(&mut self, body: &[u8]) -> Result<(), BoxError> {
        *self = decode(body)?;
        Ok(())
    }

    fn check_error(&self, status: u16, body: &[u8]) -> Result<(), BoxError> {
        check_empty_body(status, body)?;
        if self.status == "success" {
            return Ok(());
        }

        let mut message = ERROR_PREFIX.to_owned();
        let mut separator = " - ";
        if let Some(code) = self.data.get("code") {
            message.push_str(separator);
            message.push_str("code: ");
            message.push_str(&stringify(code));
            separator = ", ";
        }
        if let Some(text) = self.data.get("message") {
            message.push_str(separator);
            message.push_str("message: ");
            message.push_str(&stringify(text));
        }
        Err(message.into())
    }

    fn meta(&self) -> Meta {
        Meta {
            message: "Successfully sent Postal email".to_owned(),
            id: self.data.get("message_id").map(stringify).unwrap_or_default(),
        }
    }
}
