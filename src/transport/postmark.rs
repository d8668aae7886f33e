//! Postmark driver.

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

const ENDPOINT: &str = "https://api.postmarkapp.com/email";
const ERROR_PREFIX: &str = "error sending transmission to Postmark API";

/// Sends transmissions through the Postmark email API
///
/// The endpoint is fixed, `url` is not used.
#[derive(Debug, Clone)]
pub struct Postmark {
    cfg: Config,
    client: Client,
    endpoint: String,
}

impl Postmark {
    pub fn new(cfg: Config) -> Result<Postmark, Error> {
        cfg.validate()?;
        let client = Client::from_config(&cfg)?;
        Ok(Postmark {
            cfg,
            client,
            endpoint: ENDPOINT.to_owned(),
        })
    }

    /// Sends to another endpoint, e.g. a local test server
    pub fn endpoint<S: Into<String>>(mut self, endpoint: S) -> Postmark {
        self.endpoint = endpoint.into();
        self
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct PostmarkMessage<'a> {
    from: String,
    to: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    cc: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    bcc: String,
    subject: &'a str,
    html_body: &'a str,
    text_body: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    headers: Vec<PostmarkHeader<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<PostmarkAttachment>,
    message_stream: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct PostmarkHeader<'a> {
    name: &'a str,
    value: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct PostmarkAttachment {
    name: String,
    content: String,
    content_type: String,
}

impl<'a> PostmarkMessage<'a> {
    fn new(cfg: &Config, tx: &'a Transmission) -> PostmarkMessage<'a> {
        PostmarkMessage {
            from: cfg.sender(),
            to: tx.recipients.join(","),
            cc: tx.cc.join(","),
            bcc: tx.bcc.join(","),
            subject: &tx.subject,
            html_body: &tx.html,
            text_body: &tx.plain_text,
            headers: tx
                .headers
                .iter()
                .map(|(name, value)| PostmarkHeader { name, value })
                .collect(),
            attachments: tx
                .attachments
                .iter()
                .map(|a| PostmarkAttachment {
                    name: a.filename.clone(),
                    content: a.base64(),
                    content_type: a.media_type(),
                })
                .collect(),
            message_stream: "outbound",
        }
    }
}

#[async_trait]
impl Mailer for Postmark {
    async fn send(&self, tx: &Transmission) -> Result<Response, Error> {
        tx.validate()?;
        debug!(
            driver = "postmark",
            recipients = tx.recipients.len(),
            attachments = tx.attachments.len(),
            "sending transmission"
        );

        let payload = JsonData::new(&PostmarkMessage::new(&self.cfg, tx))?;

        let mut request = Request::post(self.endpoint.as_str());
        request.add_header("Accept", "application/json");
        request.add_header("X-Postmark-Server-Token", self.cfg.api_key.as_str());

        self.client
            .execute(
                &CancellationToken::new(),
                &request,
                Some(&payload),
                &mut PostmarkResponse::default(),
            )
            .await
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct PostmarkResponse {
    #[serde(rename = "MessageID")]
    message_id: String,
    error_code: i64,
    message: String,
}

impl Responder for PostmarkResponse {
    fn unmarshal(&mut self, body: &[u8]) -> Result<(), BoxError> {
        *self = decode(body)?;
        Ok(())
    }

    fn check_error(&self, status: u16, body: &[u8]) -> Result<(), BoxError> {
        check_empty_body(status, body)?;
        if self.error_code == 0 && is_2xx(status) {
            return Ok(());
        }
        Err(format!(
            "{} - code: {}, message: {}",
            ERROR_PREFIX, self.error_code, self.message
        )
        .into())
    }

    fn meta(&self) -> Meta {
        Meta {
            message: self.message.clone(),
            id: self.message_id.clone(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::{PostmarkMessage, PostmarkResponse};
    use crate::{
        config::Config,
        http::Responder,
        message::{Attachment, Transmission},
    };

    #[test]
    fn message() {
        let cfg = Config {
            from_address: "a@b.c".to_owned(),
            from_name: "N".to_owned(),
            api_key: "k".to_owned(),
            ..Config::default()
        };
        let mut tx = Transmission {
            recipients: vec!["r@x".to_owned(), "s@x".to_owned()],
            bcc: vec!["b@x".to_owned()],
            subject: "S".to_owned(),
            html: "<h1>H</h1>".to_owned(),
            attachments: vec![Attachment::new("a.gif", b"GIF89a".to_vec())],
            ..Transmission::default()
        };
        tx.headers.insert("X-Tag".to_owned(), "t".to_owned());

        let value = serde_json::to_value(PostmarkMessage::new(&cfg, &tx)).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "From": "N <a@b.c>",
                "To": "r@x,s@x",
                "Bcc": "b@x",
                "Subject": "S",
                "HtmlBody": "<h1>H</h1>",
                "TextBody": "",
                "Headers": [{"Name": "X-Tag", "Value": "t"}],
                "Attachments": [{
                    "Name": "a.gif",
                    "Content": "R0lGODlh",
                    "ContentType": "image/gif",
                }],
                "MessageStream": "outbound",
            })
        );
    }

    #[test]
    fn responder_success() {
        let mut res = PostmarkResponse::default();
        let body = br#"{"To": "r@x", "SubmittedAt": "2014-02-17T07:25:01.4178645-05:00", "MessageID": "0a129aee-e1cd-480d-b08d-4f48548ff48d", "ErrorCode": 0, "Message": "OK"}"#;
        res.unmarshal(body).unwrap();
        assert!(res.check_error(200, body).is_ok());
        let meta = res.meta();
        assert_eq!(meta.id, "0a129aee-e1cd-480d-b08d-4f48548ff48d");
        assert_eq!(meta.message, "OK");
    }

    #[test]
    fn responder_error() {
        let mut res = PostmarkResponse::default();
        let body = br#"{"ErrorCode": 10, "Message": "Invalid token"}"#;
        res.unmarshal(body).unwrap();
        assert_eq!(
            res.check_error(422, body).unwrap_err().to_string(),
            "error sending transmission to Postmark API - code: 10, message: Invalid token"
        );
    }
}
