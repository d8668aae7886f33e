use std::time::Duration;

use async_trait::async_trait;
use lettre::{
    address::Envelope,
    transport::smtp::{
        authentication::{Credentials, Mechanism},
        client::{Tls, TlsParameters},
    },
    Address, AsyncSmtpTransport, AsyncTransport, Tokio1Executor,
};
use tracing::debug;

use super::{SmtpEnvelope, SmtpRelay, SUBMISSIONS_PORT};
use crate::error::BoxError;

const TIMEOUT: Duration = Duration::from_secs(10);

/// Runs each session on a fresh lettre connection
#[derive(Debug, Clone, Copy, Default)]
pub struct LettreRelay;

impl LettreRelay {
    fn transport(
        envelope: &SmtpEnvelope<'_>,
    ) -> Result<AsyncSmtpTransport<Tokio1Executor>, BoxError> {
        let parameters = TlsParameters::new(envelope.host.to_owned())?;
        let tls = if envelope.port == SUBMISSIONS_PORT {
            Tls::Wrapper(parameters)
        } else {
            Tls::Opportunistic(parameters)
        };

        Ok(
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(envelope.host)
                .port(envelope.port)
                .tls(tls)
                .credentials(Credentials::new(
                    envelope.username.to_owned(),
                    envelope.password.to_owned(),
                ))
                .authentication(vec![Mechanism::Plain])
                .timeout(Some(TIMEOUT))
                .build(),
        )
    }
}

#[async_trait]
impl SmtpRelay for LettreRelay {
    async fn send_mail(
        &self,
        envelope: &SmtpEnvelope<'_>,
        message: &[u8],
    ) -> Result<(), BoxError> {
        let from = envelope.from.parse::<Address>()?;
        let to = envelope
            .recipients
            .iter()
            .map(|r| r.parse::<Address>())
            .collect::<Result<Vec<_>, _>>()?;
        let smtp_envelope = Envelope::new(Some(from), to)?;

        let transport = LettreRelay::transport(envelope)?;
        let response = transport.send_raw(&smtp_envelope, message).await?;
        debug!(
            host = envelope.host,
            code = %response.code(),
            "smtp session finished"
        );
        Ok(())
    }
}
