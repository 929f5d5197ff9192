//! SMTP connection management with type-state pattern.

mod client;
mod config;
mod stream;

pub use client::{
    Authenticated, Client, Connected, Data, Delivered, Identified, MailTransaction,
    RecipientAdded, SessionState,
};
pub use config::{SessionConfig, SessionConfigBuilder};
pub use stream::{SmtpStream, TlsTransport, Transport, create_tls_connector};

/// Stages of one submission session, in the only order they can occur.
///
/// Errors name the stage that was being entered when they happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    /// No connection yet.
    Disconnected,
    /// TCP dialed and TLS handshake completed.
    TlsEstablished,
    /// Server greeting (220) read.
    GreetingReceived,
    /// EHLO acknowledged (250).
    EhloAcknowledged,
    /// AUTH LOGIN accepted (235).
    Authenticated,
    /// MAIL FROM and every RCPT TO accepted (250).
    EnvelopeSet,
    /// DATA accepted (354) and the payload acknowledged (250).
    DataSent,
    /// QUIT issued and the connection released.
    Closed,
}

impl Stage {
    /// Short name of the protocol step that leads into this stage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnect",
            Self::TlsEstablished => "connect",
            Self::GreetingReceived => "greeting",
            Self::EhloAcknowledged => "EHLO",
            Self::Authenticated => "AUTH LOGIN",
            Self::EnvelopeSet => "envelope",
            Self::DataSent => "DATA",
            Self::Closed => "QUIT",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server information gathered during the session.
#[derive(Debug, Clone, Default)]
pub struct ServerInfo {
    /// Server hostname from greeting.
    pub hostname: String,
    /// Lines of the EHLO reply after the first (advertised extensions).
    pub extensions: Vec<String>,
}

impl ServerInfo {
    /// Checks if the server advertised an extension keyword (case-insensitive).
    #[must_use]
    pub fn supports(&self, keyword: &str) -> bool {
        self.extensions.iter().any(|line| {
            line.split_whitespace()
                .next()
                .is_some_and(|kw| kw.eq_ignore_ascii_case(keyword))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_are_ordered() {
        assert!(Stage::Disconnected < Stage::TlsEstablished);
        assert!(Stage::GreetingReceived < Stage::EhloAcknowledged);
        assert!(Stage::EnvelopeSet < Stage::DataSent);
        assert!(Stage::DataSent < Stage::Closed);
    }

    #[test]
    fn stage_names() {
        assert_eq!(Stage::Authenticated.to_string(), "AUTH LOGIN");
        assert_eq!(Stage::EnvelopeSet.to_string(), "envelope");
    }

    #[test]
    fn server_info_supports() {
        let info = ServerInfo {
            hostname: "mx".into(),
            extensions: vec!["AUTH LOGIN PLAIN".into(), "8BITMIME".into()],
        };
        assert!(info.supports("auth"));
        assert!(info.supports("8BITMIME"));
        assert!(!info.supports("PIPELINING"));
    }
}
