//! ### Sending transmissions
//!
//! Every driver implements [`Mailer`], so application code does not depend on
//! the provider it talks to. The following drivers are available:
//!
//! * [`Mailgun`](mailgun::Mailgun), [`Postal`](postal::Postal),
//!   [`Postmark`](postmark::Postmark), [`Sendgrid`](sendgrid::Sendgrid) and
//!   [`Sparkpost`](sparkpost::Sparkpost) call the provider HTTP API through
//!   the shared [`Client`](crate::http::Client) pipeline.
//! * [`Smtp`](smtp::Smtp) composes a MIME message and relays it over SMTP.
//!   It requires the `smtp` feature.
//! * [`StubMailer`](stub::StubMailer) records transmissions in memory. It is
//!   useful in tests and is not available through [`new_driver`].
//!
//! Drivers are usually obtained with [`new_driver`], from a kind string and a
//! [`Config`]:
//!
//! ```rust,no_run
//! # async fn run() -> Result<(), mailbridge::Error> {
//! use mailbridge::{message::Transmission, new_driver, Config};
//!
//! let mailer = new_driver(
//!     "sparkpost",
//!     Config {
//!         url: "https://api.eu.sparkpost.com".to_owned(),
//!         api_key: "my-key".to_owned(),
//!         from_address: "hello@example.com".to_owned(),
//!         from_name: "Example".to_owned(),
//!         ..Config::default()
//!     },
//! )?;
//!
//! let response = mailer
//!     .send(&Transmission {
//!         recipients: vec!["someone@example.com".to_owned()],
//!         subject: "Hello".to_owned(),
//!         html: "<h1>Hello</h1>".to_owned(),
//!         ..Transmission::default()
//!     })
//!     .await?;
//! println!("{} {}", response.status_code, response.id);
//! # Ok(())
//! # }
//! ```

use std::{
    fmt::{self, Display},
    str::FromStr,
};

use async_trait::async_trait;

use crate::{config::Config, http::Response, message::Transmission, Error};

pub mod mailgun;
pub mod postal;
pub mod postmark;
pub mod sendgrid;
#[cfg(feature = "smtp")]
pub mod smtp;
pub mod sparkpost;
pub mod stub;

/// Sends transmissions
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Validates and sends the transmission
    ///
    /// An invalid transmission fails before any network I/O.
    async fn send(&self, tx: &Transmission) -> Result<Response, Error>;
}

/// Drivers selectable by name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverKind {
    Sparkpost,
    Mailgun,
    Sendgrid,
    Postal,
    Postmark,
    Smtp,
}

impl DriverKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DriverKind::Sparkpost => "sparkpost",
            DriverKind::Mailgun => "mailgun",
            DriverKind::Sendgrid => "sendgrid",
            DriverKind::Postal => "postal",
            DriverKind::Postmark => "postmark",
            DriverKind::Smtp => "smtp",
        }
    }
}

impl Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DriverKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sparkpost" => Ok(DriverKind::Sparkpost),
            "mailgun" => Ok(DriverKind::Mailgun),
            "sendgrid" => Ok(DriverKind::Sendgrid),
            "postal" => Ok(DriverKind::Postal),
            "postmark" => Ok(DriverKind::Postmark),
            "smtp" => Ok(DriverKind::Smtp),
            other => Err(not_supported(other)),
        }
    }
}

fn not_supported(kind: &str) -> Error {
    Error::invalid(format!("{} not supported", kind))
}

/// Creates the driver registered under `kind`
///
/// The config is validated by the driver constructor, with the rules of that
/// driver.
pub fn new_driver(kind: &str, cfg: Config) -> Result<Box<dyn Mailer>, Error> {
    let mailer: Box<dyn Mailer> = match kind.parse::<DriverKind>()? {
        DriverKind::Sparkpost => Box::new(sparkpost::Sparkpost::new(cfg)?),
        DriverKind::Mailgun => Box::new(mailgun::Mailgun::new(cfg)?),
        DriverKind::Sendgrid => Box::new(sendgrid::Sendgrid::new(cfg)?),
        DriverKind::Postal => Box::new(postal::Postal::new(cfg)?),
        DriverKind::Postmark => Box::new(postmark::Postmark::new(cfg)?),
        #[cfg(feature = "smtp")]
        DriverKind::Smtp => Box::new(smtp::Smtp::new(cfg)?),
        #[cfg(not(feature = "smtp"))]
        DriverKind::Smtp => return Err(not_supported(kind)),
    };
    Ok(mailer)
}
