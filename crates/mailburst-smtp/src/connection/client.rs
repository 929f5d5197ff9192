//! Type-state SMTP client.

use std::marker::PhantomData;

use base64::Engine;
use chrono::{DateTime, FixedOffset};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;

use super::{ServerInfo, SessionConfig, SmtpStream, Stage, Transport};
use crate::buffer::LineBuffer;
use crate::command::Command;
use crate::error::{Error, Result};
use crate::message::Message;
use crate::types::{Reply, ReplyCode};

/// Initial fragment capacity of the DATA payload buffer.
const PAYLOAD_CAPACITY: usize = 16;
/// Growth factor of the DATA payload buffer.
const PAYLOAD_RESIZE_FACTOR: usize = 2;

/// Type-state marker for connected state (greeting received).
#[derive(Debug)]
pub struct Connected;

/// Type-state marker for EHLO acknowledged.
#[derive(Debug)]
pub struct Identified;

/// Type-state marker for authenticated state.
#[derive(Debug)]
pub struct Authenticated;

/// Type-state marker for mail transaction started.
#[derive(Debug)]
pub struct MailTransaction;

/// Type-state marker for recipient added.
#[derive(Debug)]
pub struct RecipientAdded;

/// Type-state marker for data mode.
#[derive(Debug)]
pub struct Data;

/// Type-state marker for a message accepted by the server.
#[derive(Debug)]
pub struct Delivered;

/// Maps a type-state marker to the last stage it has completed.
pub trait SessionState {
    /// Last completed stage.
    const STAGE: Stage;
}

impl SessionState for Connected {
    const STAGE: Stage = Stage::GreetingReceived;
}

impl SessionState for Identified {
    const STAGE: Stage = Stage::EhloAcknowledged;
}

impl SessionState for Authenticated {
    const STAGE: Stage = Stage::Authenticated;
}

impl SessionState for MailTransaction {
    const STAGE: Stage = Stage::Authenticated;
}

impl SessionState for RecipientAdded {
    const STAGE: Stage = Stage::EnvelopeSet;
}

impl SessionState for Data {
    const STAGE: Stage = Stage::EnvelopeSet;
}

impl SessionState for Delivered {
    const STAGE: Stage = Stage::DataSent;
}

/// SMTP client with type-state pattern.
///
/// Each method consumes the client and either returns it in the next state or
/// fails, dropping the connection.
#[derive(Debug)]
pub struct Client<State, S> {
    stream: SmtpStream<S>,
    server_info: ServerInfo,
    _state: PhantomData<State>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> Client<Connected, S> {
    /// Dials the server through `transport` and reads the greeting.
    ///
    /// Dialing plus the TLS handshake is bounded by `connect_timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection, handshake or greeting fails.
    pub async fn connect<T>(transport: &T, config: &SessionConfig) -> Result<Self>
    where
        T: Transport<Stream = S>,
    {
        let after = config.connect_timeout;
        let stream = timeout(after, transport.connect(&config.host, config.port))
            .await
            .map_err(|_| Error::Timeout {
                stage: Stage::TlsEstablished,
                after,
            })??;

        Self::from_stream(stream, config).await
    }

    /// Creates a client from an established stream and reads the server greeting.
    ///
    /// # Errors
    ///
    /// Returns an error if reading the greeting fails or the server is not ready.
    pub async fn from_stream(stream: S, config: &SessionConfig) -> Result<Self> {
        let mut stream = SmtpStream::new(stream, config.io_timeout);
        let greeting = check_reply(
            Stage::GreetingReceived,
            ReplyCode::SERVICE_READY,
            stream.read_reply(Stage::GreetingReceived).await?,
        )?;

        // Extract hostname from greeting (first word after code)
        let hostname = greeting
            .message
            .first()
            .and_then(|msg| msg.split_whitespace().next())
            .unwrap_or("unknown")
            .to_string();

        tracing::debug!(server = %hostname, "greeting received");

        Ok(Self {
            stream,
            server_info: ServerInfo {
                hostname,
                extensions: Vec::new(),
            },
            _state: PhantomData,
        })
    }

    /// Sends EHLO and records the advertised extensions.
    ///
    /// # Errors
    ///
    /// Returns an error if the EHLO command is not acknowledged with 250.
    pub async fn ehlo(mut self, client_hostname: &str) -> Result<Client<Identified, S>> {
        let cmd = Command::Ehlo {
            hostname: client_hostname.to_string(),
        };
        let reply = self
            .command(cmd, Stage::EhloAcknowledged, ReplyCode::OK)
            .await?;

        // First line is the server's greeting, the rest are extensions
        self.server_info.extensions = reply.message.into_iter().skip(1).collect();
        Ok(self.transition())
    }

    /// Runs EHLO followed by AUTH LOGIN with the configured credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if either step is rejected.
    pub async fn authenticate(self, config: &SessionConfig) -> Result<Client<Authenticated, S>> {
        self.ehlo(&config.ehlo_hostname)
            .await?
            .auth_login(&config.username, &config.password)
            .await
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> Client<Identified, S> {
    /// Authenticates using the LOGIN mechanism.
    ///
    /// # Errors
    ///
    /// Returns an error if the server does not prompt with 334 for each
    /// credential or does not accept them with 235.
    pub async fn auth_login(
        mut self,
        username: &str,
        password: &str,
    ) -> Result<Client<Authenticated, S>> {
        let engine = base64::engine::general_purpose::STANDARD;
        let stage = Stage::Authenticated;

        self.command(Command::AuthLogin, stage, ReplyCode::AUTH_CONTINUE)
            .await?;
        self.command(
            Command::AuthResponse(engine.encode(username)),
            stage,
            ReplyCode::AUTH_CONTINUE,
        )
        .await?;
        self.command(
            Command::AuthResponse(engine.encode(password)),
            stage,
            ReplyCode::AUTH_SUCCESS,
        )
        .await?;

        tracing::debug!(username, "authenticated");
        Ok(self.transition())
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> Client<Authenticated, S> {
    /// Starts a mail transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the MAIL FROM command fails.
    pub async fn mail_from(mut self, from: &str) -> Result<Client<MailTransaction, S>> {
        let cmd = Command::MailFrom {
            from: from.to_string(),
        };
        self.command(cmd, Stage::EnvelopeSet, ReplyCode::OK).await?;
        Ok(self.transition())
    }

    /// Issues MAIL FROM and one RCPT TO per envelope recipient of `message`.
    ///
    /// The first rejected recipient aborts the envelope.
    ///
    /// # Errors
    ///
    /// Returns an error if any command is not acknowledged with 250.
    pub async fn send_envelope(self, message: &Message) -> Result<Client<RecipientAdded, S>> {
        let mut recipients = message.recipients();
        let first = recipients.next().unwrap_or_default();

        let mut client = self.mail_from(&message.from).await?.rcpt_to(first).await?;
        for recipient in recipients {
            client = client.rcpt_to(recipient).await?;
        }
        Ok(client)
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> Client<MailTransaction, S> {
    /// Adds the first recipient to the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the RCPT TO command fails.
    pub async fn rcpt_to(mut self, to: &str) -> Result<Client<RecipientAdded, S>> {
        let cmd = Command::RcptTo { to: to.to_string() };
        self.command(cmd, Stage::EnvelopeSet, ReplyCode::OK).await?;
        Ok(self.transition())
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> Client<RecipientAdded, S> {
    /// Adds another recipient to the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the RCPT TO command fails.
    pub async fn rcpt_to(mut self, to: &str) -> Result<Self> {
        let cmd = Command::RcptTo { to: to.to_string() };
        self.command(cmd, Stage::EnvelopeSet, ReplyCode::OK).await?;
        Ok(self)
    }

    /// Begins sending message data.
    ///
    /// # Errors
    ///
    /// Returns an error if the DATA command is not answered with 354.
    pub async fn data(mut self) -> Result<Client<Data, S>> {
        self.command(Command::Data, Stage::DataSent, ReplyCode::START_DATA)
            .await?;
        Ok(self.transition())
    }

    /// Issues DATA and transmits `message` dated `date` in one write.
    ///
    /// # Errors
    ///
    /// Returns an error if DATA or the payload is rejected.
    pub async fn send_data(
        self,
        message: &Message,
        date: &DateTime<FixedOffset>,
    ) -> Result<Client<Delivered, S>> {
        let client = self.data().await?;

        let mut buf = LineBuffer::new(PAYLOAD_CAPACITY, PAYLOAD_RESIZE_FACTOR);
        message.write_payload(&mut buf, date);
        client.send_payload(buf.render().as_bytes()).await
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> Client<Data, S> {
    /// Sends a fully rendered payload, end-of-data marker included.
    ///
    /// The bytes are written exactly as given: no line-ending normalization
    /// and no dot-stuffing.
    ///
    /// # Errors
    ///
    /// Returns an error if sending fails or the server does not reply 250.
    pub async fn send_payload(mut self, payload: &[u8]) -> Result<Client<Delivered, S>> {
        self.stream.write_all(payload, Stage::DataSent).await?;
        let reply = self.stream.read_reply(Stage::DataSent).await?;
        check_reply(Stage::DataSent, ReplyCode::OK, reply)?;
        Ok(self.transition())
    }
}

// Common implementation for all states
impl<State: SessionState, S: AsyncRead + AsyncWrite + Unpin> Client<State, S> {
    /// Returns the last completed stage.
    #[must_use]
    pub const fn stage(&self) -> Stage {
        State::STAGE
    }

    /// Returns the server information.
    #[must_use]
    pub const fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    /// Sends QUIT and closes the connection (available in any state).
    ///
    /// The connection is released whatever the server answers.
    ///
    /// # Errors
    ///
    /// Returns an error if QUIT could not be sent or was not answered with 221.
    pub async fn quit(mut self) -> Result<()> {
        let result = self
            .command(Command::Quit, Stage::Closed, ReplyCode::CLOSING)
            .await
            .map(|_| ());
        self.stream.shutdown().await;
        result
    }

    async fn command(&mut self, cmd: Command, stage: Stage, expected: ReplyCode) -> Result<Reply> {
        tracing::trace!(command = cmd.verb(), %stage, "sending");
        self.stream.write_all(&cmd.serialize(), stage).await?;
        let reply = self.stream.read_reply(stage).await?;
        check_reply(stage, expected, reply)
    }

    fn transition<Next>(self) -> Client<Next, S> {
        Client {
            stream: self.stream,
            server_info: self.server_info,
            _state: PhantomData,
        }
    }
}

fn check_reply(stage: Stage, expected: ReplyCode, reply: Reply) -> Result<Reply> {
    if reply.code == expected {
        Ok(reply)
    } else {
        Err(Error::UnexpectedReply {
            stage,
            expected,
            reply,
        })
    }
}
