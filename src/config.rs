//! Driver configuration.
//!
//! One [`Config`] is shared by every driver. Which fields are required
//! depends on the driver: the HTTP API drivers need [`Config::validate`] to
//! pass, the SMTP driver needs [`Config::validate_smtp`] instead.

use std::fmt;

use serde::Deserialize;

use crate::Error;

/// Options for a single driver instance
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the provider API, or the SMTP host
    pub url: String,
    pub api_key: String,
    /// Sending domain, required by mailgun
    pub domain: String,
    pub from_address: String,
    pub from_name: String,
    /// SMTP password
    pub password: String,
    /// SMTP port
    pub port: u16,
    /// HTTP client used instead of the default one
    ///
    /// The default client has a 10 seconds timeout.
    #[serde(skip)]
    pub client: Option<reqwest::Client>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("url", &self.url)
            .field("api_key", &redact(&self.api_key))
            .field("domain", &self.domain)
            .field("from_address", &self.from_address)
            .field("from_name", &self.from_name)
            .field("password", &redact(&self.password))
            .field("port", &self.port)
            .field("client", &self.client.is_some())
            .finish()
    }
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        ""
    } else {
        "****"
    }
}

impl Config {
    /// Rules shared by the HTTP API drivers
    pub fn validate(&self) -> Result<(), Error> {
        if self.from_address.is_empty() {
            return Err(Error::invalid("driver requires from address"));
        }
        if self.from_name.is_empty() {
            return Err(Error::invalid("driver requires from name"));
        }
        if self.api_key.is_empty() {
            return Err(Error::invalid("driver requires api key"));
        }
        Ok(())
    }

    /// Rules of the SMTP driver, which does not use an API key
    pub fn validate_smtp(&self) -> Result<(), Error> {
        if self.url.is_empty() {
            return Err(Error::invalid("driver requires a url"));
        }
        if self.from_address.is_empty() {
            return Err(Error::invalid("driver requires from address"));
        }
        if self.from_name.is_empty() {
            return Err(Error::invalid("driver requires from name"));
        }
        if self.password.is_empty() {
            return Err(Error::invalid("driver requires a password"));
        }
        Ok(())
    }

    /// `url` without its trailing slash
    pub(crate) fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }

    /// `Name <address>`
    pub(crate) fn sender(&self) -> String {
        format!("{} <{}>", self.from_name, self.from_address)
    }
}

#[cfg(test)]
mod test {
    use super::Config;
    use crate::error::Kind;

    fn config() -> Config {
        Config {
            url: "https://api.mailgun.net/".to_owned(),
            api_key: "key".to_owned(),
            domain: "d".to_owned(),
            from_address: "a@b.c".to_owned(),
            from_name: "N".to_owned(),
            ..Config::default()
        }
    }

    #[test]
    fn validate() {
        assert!(config().validate().is_ok());

        let cases = vec![
            (
                Config {
                    from_address: String::new(),
                    ..config()
                },
                "driver requires from address",
            ),
            (
                Config {
                    from_name: String::new(),
                    ..config()
                },
                "driver requires from name",
            ),
            (
                Config {
                    api_key: String::new(),
                    ..config()
                },
                "driver requires api key",
            ),
        ];

        for (cfg, message) in cases {
            let err = cfg.validate().unwrap_err();
            assert_eq!(err.kind(), Some(Kind::Invalid));
            assert_eq!(err.message(), message);
        }
    }

    #[test]
    fn validate_smtp() {
        let smtp = Config {
            url: "smtp.example.com".to_owned(),
            api_key: String::new(),
            password: "p".to_owned(),
            port: 587,
            ..config()
        };
        assert!(smtp.validate_smtp().is_ok());
        assert!(smtp.validate().is_err());

        let err = Config {
            url: String::new(),
            ..smtp.clone()
        }
        .validate_smtp()
        .unwrap_err();
        assert_eq!(err.message(), "driver requires a url");

        let err = Config {
            password: String::new(),
            ..smtp
        }
        .validate_smtp()
        .unwrap_err();
        assert_eq!(err.message(), "driver requires a password");
    }

    #[test]
    fn helpers() {
        let cfg = config();
        assert_eq!(cfg.base_url(), "https://api.mailgun.net");
        assert_eq!(cfg.sender(), "N <a@b.c>");
    }

    #[test]
    fn debug_hides_secrets() {
        let rendered = format!("{:?}", config());
        assert!(!rendered.contains("key\""));
        assert!(rendered.contains("****"));
    }

    #[test]
    fn deserialize() {
        let cfg: Config = serde_json::from_str(
            r#"{"url": "https://api.sparkpost.com", "api_key": "k", "from_address": "a@b.c", "from_name": "N"}"#,
        )
        .unwrap();
        assert_eq!(cfg.url, "https://api.sparkpost.com");
        assert_eq!(cfg.port, 0);
        assert!(cfg.client.is_none());
        assert!(cfg.validate().is_ok());
    }
}
