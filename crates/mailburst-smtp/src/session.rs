//! One complete submission: validate, connect, authenticate, send, quit.

use chrono::Local;

use crate::connection::{Client, SessionConfig, TlsTransport, Transport};
use crate::error::Result;
use crate::message::Message;

/// Sends messages one session at a time over a [`Transport`].
///
/// Every call to [`Mailer::send_one`] opens a fresh connection; nothing is
/// reused between messages.
#[derive(Debug, Clone)]
pub struct Mailer<T> {
    transport: T,
    config: SessionConfig,
}

impl Mailer<TlsTransport> {
    /// Creates a mailer that uses implicit TLS with the bundled roots.
    #[must_use]
    pub fn tls(config: SessionConfig) -> Self {
        Self::new(TlsTransport::new(), config)
    }
}

impl<T: Transport> Mailer<T> {
    /// Creates a mailer over a custom transport.
    #[must_use]
    pub const fn new(transport: T, config: SessionConfig) -> Self {
        Self { transport, config }
    }

    /// Returns the session configuration.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Returns the transport.
    #[must_use]
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Delivers `message` in a single session.
    ///
    /// Validation runs first; an invalid message never opens a connection.
    /// A failed QUIT after the server accepted the data is logged and does
    /// not fail the send.
    ///
    /// # Errors
    ///
    /// Returns the first validation, connection or protocol error.
    pub async fn send_one(&self, message: &Message) -> Result<()> {
        message.validate()?;

        let client = Client::connect(&self.transport, &self.config).await?;
        tracing::debug!(id = message.id, server = %client.server_info().hostname, "connected");

        let client = client.authenticate(&self.config).await?;
        let client = client.send_envelope(message).await?;
        let client = client
            .send_data(message, &Local::now().fixed_offset())
            .await?;

        if let Err(e) = client.quit().await {
            tracing::warn!(id = message.id, error = %e, "QUIT failed after delivery");
        }

        tracing::debug!(id = message.id, to = %message.to, "message delivered");
        Ok(())
    }
}
