//! The per-connection Session: buffered IO with per-read byte limits,
//! deadline arming, the dot-stuffed DATA reader, and the STARTTLS
//! upgrade that swaps the boxed stream in place.

use crate::envelope::Envelope;
use anyhow::Context;
use postino_server_lifecycle::{Activity, ShutdownSubscription};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter,
    ReadHalf, WriteHalf,
};
use tokio::net::TcpStream;
use tokio::sync::OwnedSemaphorePermit;
use tokio_rustls::rustls;
use tokio_rustls::TlsAcceptor;

/// Reading slack past the configured maximum message size, so a client
/// slightly over the limit gets the polite size reply rather than a
/// hard read error.
pub const DATA_SIZE_SLACK: usize = 1_048_576;

pub trait SessionStream: AsyncRead + AsyncWrite + Debug + Unpin + Send {}

impl SessionStream for TcpStream {}
impl SessionStream for tokio_rustls::server::TlsStream<TcpStream> {}
impl SessionStream for tokio_rustls::server::TlsStream<BoxedSessionStream> {}
#[cfg(test)]
impl SessionStream for tokio::io::DuplexStream {}

pub type BoxedSessionStream = Box<dyn SessionStream>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// About to send the 220 banner.
    Greeting,
    /// Reading commands.
    Cmd,
    /// Reading the message body.
    Data,
    /// About to perform the TLS handshake.
    StartTls,
    /// AUTH PLAIN was issued without credentials; reading them.
    AuthPlainCredentials,
    /// The server is draining; say 421 and hang up.
    Shutdown,
}

#[derive(Error, Debug)]
pub enum BufferError {
    #[error("line limit exceeded")]
    LineLimitExceeded,
    #[error("maximum message size exceeded")]
    MessageSizeExceeded,
    #[error("connection closed by peer")]
    Eof,
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("server shutting down")]
    ShuttingDown,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A live connection. Sessions are pooled: `attach` binds a fresh
/// connection onto a recycled instance, `reset` scrubs it on the way
/// back to the free list.
#[derive(Debug)]
pub struct Session {
    pub remote_ip: String,
    pub id: u64,
    pub state: ClientState,
    pub helo: String,
    pub esmtp: bool,
    pub is_tls: bool,
    /// consecutive unrecognized commands
    pub errors: usize,
    pub messages_sent: usize,
    pub last_error: Option<String>,
    envelope: Option<Envelope>,
    response: String,
    reader: Option<BufReader<ReadHalf<BoxedSessionStream>>>,
    writer: Option<BufWriter<WriteHalf<BoxedSessionStream>>>,
    alive: bool,
    shutdown: Option<ShutdownSubscription>,
    _activity: Option<Activity>,
    _permit: Option<OwnedSemaphorePermit>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            remote_ip: String::new(),
            id: 0,
            state: ClientState::Greeting,
            helo: String::new(),
            esmtp: false,
            is_tls: false,
            errors: 0,
            messages_sent: 0,
            last_error: None,
            envelope: None,
            response: String::new(),
            reader: None,
            writer: None,
            alive: true,
            shutdown: None,
            _activity: None,
            _permit: None,
        }
    }
}

impl Session {
    #[allow(clippy::too_many_arguments)]
    pub fn attach(
        &mut self,
        stream: BoxedSessionStream,
        id: u64,
        remote_ip: String,
        envelope: Envelope,
        activity: Activity,
        permit: OwnedSemaphorePermit,
        shutdown: ShutdownSubscription,
    ) {
        self.reset();
        self.id = id;
        self.remote_ip = remote_ip;
        self.envelope = Some(envelope);
        self.shutdown = Some(shutdown);
        self._activity = Some(activity);
        self._permit = Some(permit);
        self.bind_stream(stream);
    }

    /// Scrub all transient state ahead of reuse; also drops the activity
    /// token and capacity permit when called on the way back to the pool.
    pub fn reset(&mut self) {
        self.remote_ip.clear();
        self.id = 0;
        self.state = ClientState::Greeting;
        self.helo.clear();
        self.esmtp = false;
        self.is_tls = false;
        self.errors = 0;
        self.messages_sent = 0;
        self.last_error = None;
        self.envelope = None;
        self.response.clear();
        self.reader = None;
        self.writer = None;
        self.alive = true;
        self.shutdown = None;
        self._activity = None;
        self._permit = None;
    }

    fn bind_stream(&mut self, stream: BoxedSessionStream) {
        let (read_half, write_half) = tokio::io::split(stream);
        self.reader = Some(BufReader::new(read_half));
        self.writer = Some(BufWriter::new(write_half));
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// Idempotent; the engine loop exits at the next tick.
    pub fn kill(&mut self) {
        self.alive = false;
    }

    pub fn envelope(&self) -> &Envelope {
        self.envelope
            .as_ref()
            .expect("session holds an envelope while attached")
    }

    pub fn envelope_mut(&mut self) -> &mut Envelope {
        self.envelope
            .as_mut()
            .expect("session holds an envelope while attached")
    }

    pub fn take_envelope(&mut self) -> Option<Envelope> {
        self.envelope.take()
    }

    /// A transaction is open once MAIL FROM was accepted (the null
    /// reverse-path included) or a body/handshake is in flight.
    pub fn is_in_transaction(&self) -> bool {
        matches!(self.state, ClientState::Data | ClientState::StartTls)
            || self
                .envelope
                .as_ref()
                .is_some_and(|env| env.mail_from.is_some())
    }

    pub fn reset_transaction(&mut self) {
        if let Some(envelope) = self.envelope.as_mut() {
            envelope.reset_transaction();
        }
    }

    /// Queue a reply line; the engine flushes at the end of the state
    /// tick.
    pub fn send_response(&mut self, response: &str) {
        self.response.push_str(response);
        self.response.push_str("\r\n");
    }

    pub fn has_pending_response(&self) -> bool {
        !self.response.is_empty()
    }

    pub fn pending_response(&self) -> &str {
        &self.response
    }

    /// Write the pending reply bytes and flush, under the deadline.
    pub async fn flush_response(&mut self, deadline: Duration) -> Result<(), BufferError> {
        let result = {
            let Self {
                writer, response, ..
            } = self;
            let writer = match writer.as_mut() {
                Some(writer) => writer,
                None => return Err(BufferError::Eof),
            };
            let io = async {
                writer.write_all(response.as_bytes()).await?;
                writer.flush().await
            };
            match tokio::time::timeout(deadline, io).await {
                Err(_) => Err(BufferError::Timeout(deadline)),
                Ok(Err(err)) => Err(err.into()),
                Ok(Ok(())) => Ok(()),
            }
        };
        self.response.clear();
        if let Err(err) = &result {
            self.last_error = Some(err.to_string());
        }
        result
    }

    /// Read one line of at most `limit` bytes, tolerating a lone `\n`
    /// terminator. Wakes with `ShuttingDown` when the pool begins
    /// draining so the engine can say 421 at the state boundary.
    pub async fn read_line(
        &mut self,
        limit: usize,
        deadline: Duration,
    ) -> Result<Vec<u8>, BufferError> {
        let result = {
            let Self {
                reader, shutdown, ..
            } = self;
            let reader = match reader.as_mut() {
                Some(reader) => reader,
                None => return Err(BufferError::Eof),
            };
            let mut line = Vec::new();
            let mut limited = (&mut *reader).take(limit as u64);
            let io = tokio::time::timeout(deadline, limited.read_until(b'\n', &mut line));
            let outcome = tokio::select! {
                _ = wait_shutdown(shutdown) => Err(BufferError::ShuttingDown),
                result = io => match result {
                    Err(_) => Err(BufferError::Timeout(deadline)),
                    Ok(Err(err)) => Err(err.into()),
                    Ok(Ok(0)) => Err(BufferError::Eof),
                    Ok(Ok(n)) => {
                        if line.last() == Some(&b'\n') {
                            trim_crlf(&mut line);
                            Ok(std::mem::take(&mut line))
                        } else if n >= limit {
                            Err(BufferError::LineLimitExceeded)
                        } else {
                            Err(BufferError::Eof)
                        }
                    }
                },
            };
            if matches!(outcome, Err(BufferError::LineLimitExceeded)) {
                // consume the rest of the oversized line; the line-too-long
                // reply must not race a reset from unread socket data
                loop {
                    line.clear();
                    match tokio::time::timeout(
                        deadline,
                        (&mut *reader).take(limit as u64).read_until(b'\n', &mut line),
                    )
                    .await
                    {
                        Ok(Ok(n)) if n > 0 && line.last() != Some(&b'\n') => continue,
                        _ => break,
                    }
                }
            }
            outcome
        };
        if let Err(err) = &result {
            self.last_error = Some(err.to_string());
        }
        result
    }

    /// The dot-stuffed body reader: strips the leading dot of any line
    /// that begins with one, terminates on a lone `.`, and normalizes
    /// line endings to `\n` in the stored body. Reading is capped at
    /// `max_size` plus [`DATA_SIZE_SLACK`]; a body over `max_size` but
    /// under the cap yields `MessageSizeExceeded` once terminated.
    pub async fn read_data(
        &mut self,
        max_size: usize,
        deadline: Duration,
    ) -> Result<(), BufferError> {
        let result = {
            let Self {
                reader, envelope, ..
            } = self;
            let reader = match reader.as_mut() {
                Some(reader) => reader,
                None => return Err(BufferError::Eof),
            };
            let data = &mut envelope
                .as_mut()
                .expect("session holds an envelope while attached")
                .data;
            read_dot_stuffed(reader, data, max_size, deadline).await
        };
        if let Err(err) = &result {
            self.last_error = Some(err.to_string());
        }
        result
    }

    /// Perform the server half of a TLS handshake on the current
    /// connection. On a failed handshake the plaintext stream is put
    /// back so the client may carry on unencrypted.
    pub async fn upgrade_to_tls(
        &mut self,
        tls_config: Arc<rustls::ServerConfig>,
        deadline: Duration,
    ) -> anyhow::Result<()> {
        let reader = self.reader.take().context("session has no connection")?;
        let writer = self.writer.take().context("session has no connection")?;
        let stream = reader.into_inner().unsplit(writer.into_inner());

        let acceptor = TlsAcceptor::from(tls_config);
        match tokio::time::timeout(deadline, acceptor.accept(stream).into_fallible()).await {
            Ok(Ok(tls_stream)) => {
                self.bind_stream(Box::new(tls_stream));
                self.is_tls = true;
                Ok(())
            }
            Ok(Err((err, stream))) => {
                self.bind_stream(stream);
                Err(err).context("TLS handshake failed")
            }
            Err(_) => anyhow::bail!("TLS handshake timed out after {deadline:?}"),
        }
    }

    /// Release the connection; runs on every session exit path.
    pub async fn close_conn(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            writer.shutdown().await.ok();
        }
        self.reader = None;
        self.writer = None;
    }
}

async fn wait_shutdown(shutdown: &mut Option<ShutdownSubscription>) {
    match shutdown {
        Some(subscription) => subscription.shutting_down().await,
        None => std::future::pending().await,
    }
}

fn trim_crlf(line: &mut Vec<u8>) {
    if line.last() == Some(&b'\n') {
        line.pop();
    }
    if line.last() == Some(&b'\r') {
        line.pop();
    }
}

async fn read_dot_stuffed(
    reader: &mut BufReader<ReadHalf<BoxedSessionStream>>,
    data: &mut Vec<u8>,
    max_size: usize,
    deadline: Duration,
) -> Result<(), BufferError> {
    let hard_limit = max_size + DATA_SIZE_SLACK;
    let mut total = 0usize;
    let mut line = Vec::new();

    loop {
        line.clear();
        let remaining = hard_limit.saturating_sub(total);
        if remaining == 0 {
            return Err(BufferError::LineLimitExceeded);
        }
        let n = match tokio::time::timeout(
            deadline,
            (&mut *reader).take(remaining as u64).read_until(b'\n', &mut line),
        )
        .await
        {
            Err(_) => return Err(BufferError::Timeout(deadline)),
            Ok(Err(err)) => return Err(err.into()),
            Ok(Ok(0)) => return Err(BufferError::Eof),
            Ok(Ok(n)) => n,
        };
        total += n;
        if line.last() != Some(&b'\n') {
            return if total >= hard_limit {
                Err(BufferError::LineLimitExceeded)
            } else {
                Err(BufferError::Eof)
            };
        }
        trim_crlf(&mut line);
        if line == b"." {
            break;
        }
        let unstuffed: &[u8] = if line.first() == Some(&b'.') {
            &line[1..]
        } else {
            &line
        };
        data.extend_from_slice(unstuffed);
        data.push(b'\n');
    }

    if data.len() > max_size {
        return Err(BufferError::MessageSizeExceeded);
    }
    Ok(())
}
