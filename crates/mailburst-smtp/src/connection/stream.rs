//! Low-level SMTP stream handling and transports.

use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::ServerName;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::{
    TlsConnector,
    client::TlsStream,
    rustls::{ClientConfig, RootCertStore},
};

use super::Stage;
use crate::error::{Error, Result};
use crate::parser::{is_last_reply_line, parse_reply};
use crate::types::Reply;

/// Opens the secure byte stream a session runs over.
///
/// The production implementation is [`TlsTransport`]; tests plug in
/// in-memory streams.
pub trait Transport: Send + Sync {
    /// Stream type produced by this transport.
    type Stream: AsyncRead + AsyncWrite + Unpin + Send;

    /// Dials `host:port` and completes the security handshake.
    fn connect(
        &self,
        host: &str,
        port: u16,
    ) -> impl Future<Output = Result<Self::Stream>> + Send;
}

/// Implicit TLS over TCP, verified against the webpki root store.
///
/// The server name checked against the certificate is always the dialed host.
#[derive(Clone)]
pub struct TlsTransport {
    connector: TlsConnector,
}

impl TlsTransport {
    /// Creates a transport with the bundled root certificates.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connector: create_tls_connector(),
        }
    }

    /// Creates a transport from a custom connector (e.g. private roots).
    #[must_use]
    pub const fn with_connector(connector: TlsConnector) -> Self {
        Self { connector }
    }
}

impl Default for TlsTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TlsTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsTransport").finish_non_exhaustive()
    }
}

impl Transport for TlsTransport {
    type Stream = TlsStream<TcpStream>;

    async fn connect(&self, host: &str, port: u16) -> Result<Self::Stream> {
        let addr = format!("{host}:{port}");
        let tcp = match TcpStream::connect(&addr).await {
            Ok(tcp) => tcp,
            Err(source) => return Err(Error::Connect { addr, source }),
        };

        let server_name = ServerName::try_from(host.to_string())?;
        let tls = self
            .connector
            .connect(server_name, tcp)
            .await
            .map_err(Error::Tls)?;

        tracing::debug!(%addr, "TLS session established");
        Ok(tls)
    }
}

/// Creates a TLS connector with the webpki root certificates.
#[must_use]
pub fn create_tls_connector() -> TlsConnector {
    let root_store = RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };

    let config = ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    TlsConnector::from(Arc::new(config))
}

/// Line-oriented SMTP stream with a deadline on every read and write.
#[derive(Debug)]
pub struct SmtpStream<S> {
    reader: BufReader<S>,
    io_timeout: Duration,
}

impl<S: AsyncRead + AsyncWrite + Unpin> SmtpStream<S> {
    /// Wraps a connected stream.
    pub fn new(stream: S, io_timeout: Duration) -> Self {
        Self {
            reader: BufReader::new(stream),
            io_timeout,
        }
    }

    /// Reads one line, without its line terminator.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails, times out, or the server closed
    /// the connection.
    pub async fn read_line(&mut self, stage: Stage) -> Result<String> {
        let after = self.io_timeout;
        let mut line = String::new();
        let read = timeout(after, self.reader.read_line(&mut line))
            .await
            .map_err(|_| Error::Timeout { stage, after })?
            .map_err(|source| Error::Io { stage, source })?;

        if read == 0 {
            return Err(Error::Io {
                stage,
                source: io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed by server",
                ),
            });
        }

        Ok(line.trim_end().to_string())
    }

    /// Writes and flushes data.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails or times out.
    pub async fn write_all(&mut self, data: &[u8], stage: Stage) -> Result<()> {
        let after = self.io_timeout;
        let writer = self.reader.get_mut();
        let write = async {
            writer.write_all(data).await?;
            writer.flush().await?;
            Ok::<_, io::Error>(())
        };

        timeout(after, write)
            .await
            .map_err(|_| Error::Timeout { stage, after })?
            .map_err(|source| Error::Io { stage, source })
    }

    /// Reads one complete reply, following `250-` continuation lines.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails or the reply is malformed.
    pub async fn read_reply(&mut self, stage: Stage) -> Result<Reply> {
        let mut lines = Vec::new();
        loop {
            let line = self.read_line(stage).await?;
            if line.is_empty() {
                continue;
            }

            let is_last = is_last_reply_line(&line);
            lines.push(line);

            if is_last {
                break;
            }
        }

        parse_reply(&lines).map_err(|source| Error::Malformed { stage, source })
    }

    /// Shuts down the write half. Errors are ignored.
    pub async fn shutdown(&mut self) {
        let after = self.io_timeout;
        let _ = timeout(after, self.reader.get_mut().shutdown()).await;
    }

    /// Returns the underlying stream.
    pub fn into_inner(self) -> S {
        self.reader.into_inner()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::ReplyCode;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn reads_single_reply() {
        let mock = Builder::new().read(b"220 mx.example.com ESMTP\r\n").build();
        let mut stream = SmtpStream::new(mock, Duration::from_secs(5));

        let reply = stream.read_reply(Stage::GreetingReceived).await.unwrap();
        assert_eq!(reply.code, ReplyCode::SERVICE_READY);
        assert_eq!(reply.message, vec!["mx.example.com ESMTP"]);
    }

    #[tokio::test]
    async fn reads_multi_line_reply_across_reads() {
        let mock = Builder::new()
            .read(b"250-mx.example.com\r\n250-AUTH ")
            .read(b"LOGIN PLAIN\r\n250 8BITMIME\r\n")
            .build();
        let mut stream = SmtpStream::new(mock, Duration::from_secs(5));

        let reply = stream.read_reply(Stage::EhloAcknowledged).await.unwrap();
        assert_eq!(reply.code, ReplyCode::OK);
        assert_eq!(
            reply.message,
            vec!["mx.example.com", "AUTH LOGIN PLAIN", "8BITMIME"]
        );
    }

    #[tokio::test]
    async fn eof_is_an_error_naming_the_stage() {
        let mock = Builder::new().build();
        let mut stream = SmtpStream::new(mock, Duration::from_secs(5));

        let err = stream.read_reply(Stage::GreetingReceived).await.unwrap_err();
        assert_eq!(err.stage(), Some(Stage::GreetingReceived));
        assert!(err.to_string().contains("connection closed by server"));
    }

    #[tokio::test]
    async fn malformed_reply_is_reported() {
        let mock = Builder::new().read(b"hello there\r\n").build();
        let mut stream = SmtpStream::new(mock, Duration::from_secs(5));

        let err = stream.read_reply(Stage::GreetingReceived).await.unwrap_err();
        assert!(matches!(err, Error::Malformed { .. }));
    }

    #[tokio::test]
    async fn writes_are_flushed_verbatim() {
        let mock = Builder::new().write(b"QUIT\r\n").build();
        let mut stream = SmtpStream::new(mock, Duration::from_secs(5));

        stream.write_all(b"QUIT\r\n", Stage::Closed).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_read_times_out() {
        let mock = Builder::new().wait(Duration::from_secs(120)).build();
        let mut stream = SmtpStream::new(mock, Duration::from_secs(1));

        let err = stream.read_line(Stage::GreetingReceived).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Timeout {
                stage: Stage::GreetingReceived,
                ..
            }
        ));
        assert!(err.to_string().contains("timeout"));
    }
}
