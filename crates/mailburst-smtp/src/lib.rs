//! # mailburst-smtp
//!
//! A small SMTP submission client: implicit TLS, `AUTH LOGIN`, and exactly
//! one message per session.
//!
//! ## Features
//!
//! - **Type-state session**: each protocol step consumes the client and
//!   returns it in the next state, so steps cannot be reordered
//! - **Strict replies**: every step checks the exact reply code and errors
//!   name the stage that failed
//! - **Deadlines**: dialing is bounded by a connect timeout, every read and
//!   write by an I/O timeout
//! - **Pluggable transport**: [`TlsTransport`] in production, in-memory
//!   streams in tests
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailburst_smtp::{Mailer, Message, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> mailburst_smtp::Result<()> {
//!     let config = SessionConfig::new("smtp.example.com", "me@example.com", "app-password");
//!     let mailer = Mailer::tls(config);
//!
//!     let message = Message::new(1, "me@example.com", "you@example.com", "Hello", "Hi!");
//!     mailer.send_one(&message).await
//! }
//! ```
//!
//! ## Session Stages
//!
//! ```text
//! Disconnected ─ connect() ─→ TlsEstablished ─ 220 ─→ GreetingReceived
//!   ─ EHLO/250 ─→ EhloAcknowledged ─ AUTH LOGIN/334,334,235 ─→ Authenticated
//!   ─ MAIL FROM, RCPT TO/250 ─→ EnvelopeSet ─ DATA/354, payload/250 ─→ DataSent
//!   ─ QUIT/221 ─→ Closed
//! ```
//!
//! ## Modules
//!
//! - [`buffer`]: Growable fragment buffer used to build the DATA payload
//! - [`command`]: SMTP command serialization
//! - [`connection`]: Transports, stream handling and the type-state client
//! - [`message`]: Outgoing message, validation and wire format
//! - [`parser`]: Reply parser
//! - [`types`]: Reply codes and replies

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod buffer;
pub mod command;
pub mod connection;
mod error;
pub mod message;
pub mod parser;
mod session;
pub mod types;

pub use buffer::LineBuffer;
pub use connection::{
    Client, ServerInfo, SessionConfig, SessionConfigBuilder, Stage, TlsTransport, Transport,
};
pub use error::{Error, Result};
pub use message::{Message, ValidationError};
pub use session::Mailer;
pub use types::{Reply, ReplyClass, ReplyCode};
