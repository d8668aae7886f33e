//! SparkPost driver, using the transmissions API.

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
    http::{check_empty_body, decode, is_2xx, Client, JsonData, Meta, Request, Responder, Response},
    message::Transmission,
    Error,
};

const ERROR_PREFIX: &str = "error sending transmission to Sparkpost API";

/// Sends transmissions through `{url}/api/v1/transmissions`
#[derive(Debug, Clone)]
pub struct Sparkpost {
    cfg: Config,
    client: Client,
}

impl Sparkpost {
    pub fn new(cfg: Config) -> Result<Sparkpost, Error> {
        cfg.validate()?;
        let client = Client::from_config(&cfg)?;
        Ok(Sparkpost { cfg, client })
    }
}

#[derive(Debug, Serialize)]
struct SparkpostTransmission<'a> {
    recipients: Vec<Recipient<'a>>,
    content: Content<'a>,
}

#[derive(Debug, Serialize)]
struct Recipient<'a> {
    address: RecipientAddress<'a>,
}

#[derive(Debug, Serialize)]
struct RecipientAddress<'a> {
    email: &'a str,
    header_to: &'a str,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    html: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
    subject: &'a str,
    from: Sender<'a>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<SparkpostAttachment>,
}

#[derive(Debug, Serialize)]
struct Sender<'a> {
    email: &'a str,
    name: &'a str,
}

#[derive(Debug, Serialize)]
struct SparkpostAttachment {
    #[serde(rename = "type")]
    kind: String,
    name: String,
    data: String,
}

impl<'a> SparkpostTransmission<'a> {
    /// CC and BCC addresses are listed as recipients too, with the primary
    /// recipients as the visible `To` header
    fn new(cfg: &'a Config, tx: &'a Transmission, header_to: &'a str) -> SparkpostTransmission<'a> {
        let recipients = tx
            .all_recipients()
            .map(|email| Recipient {
                address: RecipientAddress { email, header_to },
            })
            .collect();

        let mut headers = tx.headers.clone();
        if tx.has_cc() {
            headers.insert("cc".to_owned(), tx.cc.join(","));
        }

        SparkpostTransmission {
            recipients,
            content: Content {
                html: &tx.html,
                text: Some(tx.plain_text.as_str()).filter(|t| !t.is_empty()),
                subject: &tx.subject,
                from: Sender {
                    email: &cfg.from_address,
                    name: &cfg.from_name,
                },
                headers,
                attachments: tx
                    .attachments
                    .iter()
                    .map(|a| SparkpostAttachment {
                        kind: a.media_type(),
                        name: a.filename.clone(),
                        data: a.base64(),
                    })
                    .collect(),
            },
        }
    }
}

#[async_trait]
impl Mailer for Sparkpost {
    async fn send(&self, tx: &Transmission) -> Result<Response, Error> {
        tx.validate()?;
        debug!(
            driver = "sparkpost",
            recipients = tx.recipients.len(),
            attachments = tx.attachments.len(),
            "sending transmission"
        );

        let header_to = tx.recipients.join(",");
        let payload = JsonData::new(&SparkpostTransmission::new(&self.cfg, tx, &header_to))?;

        let mut request = Request::post(format!("{}/api/v1/transmissions", self.cfg.base_url()));
        request.add_header("Authorization", self.cfg.api_key.as_str());

        self.client
            .execute(
                &CancellationToken::new(),
                &request,
                Some(&payload),
                &mut SparkpostResponse::default(),
            )
            .await
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SparkpostResponse {
    results: Map<String, Value>,
    errors: Vec<SparkpostError>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SparkpostError {
    message: String,
    code: String,
}

impl Responder for SparkpostResponse {
    fn unmarshal(&mut self, body: &[u8]) -> Result<(), BoxError> {
        *self = decode(body)?;
        Ok(())
    }

    fn check_error(&self, status: u16, body: &[u8]) -> Result<(), BoxError> {
        check_empty_body(status, body)?;
        if let Some(first) = self.errors.first() {
            return Err(format!(
                "{} - code: {}, message: {}",
                ERROR_PREFIX, first.code, first.message
            )
            .into());
        }
        if !is_2xx(status) {
            return Err(format!("{} - status: {}", ERROR_PREFIX, status).into());
        }
        Ok(())
    }

    fn meta(&self) -> Meta {
        let id = match self.results.get("id") {
            Some(Value::String(id)) => id.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        };
        Meta {
            message: "Successfully sent Sparkpost email".to_owned(),
            id,
        }
    }
}
