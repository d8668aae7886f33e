//! Mailgun driver, using the `multipart/form-data` messages API.

use async_trait::async_trait;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::Mailer;
use crate::{
    config::Config,
    error::BoxError,
    http::{check_empty_body, decode, is_2xx, Client, FormData, Meta, Request, Responder, Response},
    message::Transmission,
    Error,
};

const ERROR_PREFIX: &str = "error sending transmission to Mailgun API";

/// Sends transmissions through `{url}/v3/{domain}/messages`
#[derive(Debug, Clone)]
pub struct Mailgun {
    cfg: Config,
    client: Client,
}

impl Mailgun {
    /// Validates the config, which must carry a domain
    pub fn new(cfg: Config) -> Result<Mailgun, Error> {
        cfg.validate()?;
        if cfg.domain.is_empty() {
            return Err(Error::invalid("driver requires a domain"));
        }
        let client = Client::from_config(&cfg)?;
        Ok(Mailgun { cfg, client })
    }

    fn form(&self, tx: &Transmission) -> FormData {
        let mut form = FormData::new();
        form.add_value("from", self.cfg.sender());
        for to in &tx.recipients {
            form.add_value("to", to.as_str());
        }
        for cc in &tx.cc {
            form.add_value("cc", cc.as_str());
        }
        for bcc in &tx.bcc {
            form.add_value("bcc", bcc.as_str());
        }
        form.add_value("subject", tx.subject.as_str());
        form.add_value("html", tx.html.as_str());
        if !tx.plain_text.is_empty() {
            form.add_value("text", tx.plain_text.as_str());
        }
        for (name, value) in &tx.headers {
            form.add_value(format!("h:{}", name), value.as_str());
        }
        for attachment in &tx.attachments {
            form.add_buffer("attachment", attachment.filename.as_str(), attachment.bytes.clone());
        }
        form
    }
}

#[async_trait]
impl Mailer for Mailgun {
    async fn send(&self, tx: &Transmission) -> Result<Response, Error> {
        tx.validate()?;
        debug!(
            driver = "mailgun",
            recipients = tx.recipients.len(),
            attachments = tx.attachments.len(),
            "sending transmission"
        );

        let form = self.form(tx);

        let mut request = Request::post(format!(
            "{}/v3/{}/messages",
            self.cfg.base_url(),
            self.cfg.domain
        ));
        request.set_basic_auth("api", self.cfg.api_key.as_str());

        self.client
            .execute(
                &CancellationToken::new(),
                &request,
                Some(&form),
                &mut MailgunResponse::default(),
            )
            .await
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MailgunResponse {
    id: String,
    message: String,
}

impl Responder for MailgunResponse {
    fn unmarshal(&mut self, body: &[u8]) -> Result<(), BoxError> {
        *self = decode(body)?;
        Ok(())
    }

    fn check_error(&self, status: u16, body: &[u8]) -> Result<(), BoxError> {
        check_empty_body(status, body)?;
        if is_2xx(status) {
            return Ok(());
        }
        Err(format!("{} - message: {}", ERROR_PREFIX, self.message).into())
    }

    fn meta(&self) -> Meta {
        Meta {
            message: self.message.clone(),
            id: self.id.clone(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::{Mailgun, MailgunResponse};
    use crate::{
        config::Config,
        error::{EmptyBody, Kind},
        http::{Payload, Responder},
        message::{Attachment, Transmission},
    };

    fn config() -> Config {
        Config {
            url: "https://api.mailgun.net".to_owned(),
            api_key: "k".to_owned(),
            domain: "d".to_owned(),
            from_address: "a@b.c".to_owned(),
            from_name: "N".to_owned(),
            ..Config::default()
        }
    }

    #[test]
    fn requires_domain() {
        let err = Mailgun::new(Config {
            domain: String::new(),
            ..config()
        })
        .unwrap_err();
        assert_eq!(err.kind(), Some(Kind::Invalid));
        assert_eq!(err.message(), "driver requires a domain");
    }

    #[test]
    fn common_rules_first() {
        let err = Mailgun::new(Config {
            api_key: String::new(),
            domain: String::new(),
            ..config()
        })
        .unwrap_err();
        assert_eq!(err.message(), "driver requires api key");
    }

    #[test]
    fn form_fields() {
        let mailgun = Mailgun::new(config()).unwrap();
        let mut tx = Transmission {
            recipients: vec!["r@x".to_owned(), "s@x".to_owned()],
            cc: vec!["c@x".to_owned()],
            subject: "S".to_owned(),
            html: "<h1>H</h1>".to_owned(),
            attachments: vec![Attachment::new("a.txt", b"a".to_vec())],
            ..Transmission::default()
        };
        tx.headers.insert("X-Tag".to_owned(), "welcome".to_owned());

        let values = mailgun.form(&tx).values();
        let expected: Vec<(String, String)> = vec![
            ("from", "N <a@b.c>"),
            ("to", "r@x"),
            ("to", "s@x"),
            ("cc", "c@x"),
            ("subject", "S"),
            ("html", "<h1>H</h1>"),
            ("h:X-Tag", "welcome"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .collect();
        assert_eq!(values, expected);
    }

    #[test]
    fn responder() {
        let mut res = MailgunResponse::default();
        res.unmarshal(br#"{"id": "<abc@m>", "message": "Queued. Thank you."}"#)
            .unwrap();
        assert!(res.check_error(200, b"{}").is_ok());
        let meta = res.meta();
        assert_eq!(meta.id, "<abc@m>");
        assert_eq!(meta.message, "Queued. Thank you.");
    }

    #[test]
    fn responder_errors() {
        let mut res = MailgunResponse::default();
        let body = br#"{"message": "Invalid private key"}"#;
        res.unmarshal(body).unwrap();
        assert_eq!(
            res.check_error(401, body).unwrap_err().to_string(),
            "error sending transmission to Mailgun API - message: Invalid private key"
        );

        let mut res = MailgunResponse::default();
        res.unmarshal(b"").unwrap();
        let err = res.check_error(500, b"").unwrap_err();
        assert!(err.downcast_ref::<EmptyBody>().is_some());
    }
}
