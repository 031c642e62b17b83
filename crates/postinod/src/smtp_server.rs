//! The SMTP listener and the per-connection protocol engine.
//!
//! One task accepts connections; each accepted client runs the state
//! machine on its own task with a Session and an Envelope borrowed from
//! the pools. Config, TLS material, the backend and the credential store
//! all live in hot-swappable cells so a reload never tears the view an
//! in-flight session already snapshotted.

use crate::allowed_hosts::AllowedHosts;
use crate::auth::{self, AuthStore, AuthType};
use crate::backend::Backend;
use crate::client::{BufferError, ClientState, Session};
use crate::config::ServerConfig;
use crate::envelope::EnvelopePool;
use crate::pool::ClientPool;
use crate::response;
use anyhow::Context;
use chrono::Utc;
use postino_server_common::tls_helpers::make_server_config;
use postino_server_common::ConfigHandle;
use rfc5321::Address;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Barrier, Notify};
use tokio_rustls::rustls;

pub const COMMAND_VERB_MAX_LENGTH: usize = 16;
pub const COMMAND_LINE_MAX_LENGTH: usize = 1024;
pub const CREDENTIALS_MAX_LENGTH: usize = 2048;
/// Unrecognized commands tolerated before the connection is dropped.
pub const MAX_UNRECOGNIZED_COMMANDS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    New,
    Stopped,
    Running,
    StartError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verb {
    Helo,
    Ehlo,
    Help,
    XClient,
    MailFrom,
    RcptTo,
    Rset,
    Vrfy,
    Noop,
    Asterisk,
    Quit,
    Data,
    StartTls,
    Auth,
}

const VERBS: &[(Verb, &str)] = &[
    (Verb::Helo, "HELO"),
    (Verb::Ehlo, "EHLO"),
    (Verb::Help, "HELP"),
    (Verb::XClient, "XCLIENT"),
    (Verb::MailFrom, "MAIL FROM:"),
    (Verb::RcptTo, "RCPT TO:"),
    (Verb::Rset, "RSET"),
    (Verb::Vrfy, "VRFY"),
    (Verb::Noop, "NOOP"),
    (Verb::Asterisk, "*"),
    (Verb::Quit, "QUIT"),
    (Verb::Data, "DATA"),
    (Verb::StartTls, "STARTTLS"),
    (Verb::Auth, "AUTH"),
];

/// Match a command by uppercasing the first 16 bytes and testing each
/// verb as a zero-offset prefix. Returns the verb and the offset of its
/// argument.
fn match_command(input: &[u8]) -> Option<(Verb, usize)> {
    let head_len = input.len().min(COMMAND_VERB_MAX_LENGTH);
    let head = input[..head_len].to_ascii_uppercase();
    VERBS.iter().find_map(|(verb, text)| {
        head.starts_with(text.as_bytes())
            .then_some((*verb, text.len()))
    })
}

/// Listens for SMTP clients on the configured interface.
pub struct Server {
    listen_interface: String,
    config: ConfigHandle<ServerConfig>,
    tls_config: ConfigHandle<Option<Arc<rustls::ServerConfig>>>,
    backend: ConfigHandle<Arc<dyn Backend>>,
    auth_store: ConfigHandle<Option<Arc<dyn AuthStore>>>,
    client_pool: Arc<ClientPool>,
    envelope_pool: Arc<EnvelopePool>,
    hosts: AllowedHosts,
    state: parking_lot::Mutex<ServerState>,
    local_addr: parking_lot::Mutex<Option<SocketAddr>>,
    close_listener: Notify,
    listener_open: AtomicBool,
    closed_tx: mpsc::Sender<()>,
    closed_rx: tokio::sync::Mutex<mpsc::Receiver<()>>,
}

impl Server {
    pub fn new(sc: ServerConfig, backend: Arc<dyn Backend>) -> anyhow::Result<Arc<Self>> {
        let timeout = Duration::from_secs(sc.timeout);
        let auth_store = sc.auth.build_store()?;
        let (closed_tx, closed_rx) = mpsc::channel(1);

        let server = Arc::new(Self {
            listen_interface: sc.listen_interface.clone(),
            hosts: AllowedHosts::new(&sc.allowed_hosts),
            client_pool: Arc::new(ClientPool::new(sc.max_clients, timeout)),
            envelope_pool: Arc::new(EnvelopePool::new(sc.max_clients)),
            tls_config: ConfigHandle::new(None),
            backend: ConfigHandle::new(backend),
            auth_store: ConfigHandle::new(auth_store),
            state: parking_lot::Mutex::new(ServerState::New),
            local_addr: parking_lot::Mutex::new(None),
            close_listener: Notify::new(),
            listener_open: AtomicBool::new(false),
            closed_tx,
            closed_rx: tokio::sync::Mutex::new(closed_rx),
            config: ConfigHandle::new(sc),
        });
        server.configure_tls()?;
        Ok(server)
    }

    fn configure_tls(&self) -> anyhow::Result<()> {
        let sc = self.config.load();
        if sc.tls.always_on || sc.tls.start_tls_on {
            let tls_config = make_server_config(&sc.hostname, &sc.tls)
                .with_context(|| format!("configuring TLS for [{}]", self.listen_interface))?;
            self.tls_config.update(Some(tls_config));
        }
        Ok(())
    }

    /// Replace the configuration under live traffic. Sessions that
    /// already started keep the snapshot they loaded on entry; new
    /// sessions observe the new values.
    pub fn reload(&self, sc: ServerConfig) -> anyhow::Result<()> {
        let auth_store = sc.auth.build_store()?;
        self.hosts.replace(&sc.allowed_hosts);
        self.client_pool.set_timeout(Duration::from_secs(sc.timeout));
        self.auth_store.update(auth_store);
        self.config.update(sc);
        self.configure_tls()?;
        Ok(())
    }

    pub fn set_backend(&self, backend: Arc<dyn Backend>) {
        self.backend.update(backend);
    }

    pub fn state(&self) -> ServerState {
        *self.state.lock()
    }

    fn set_state(&self, state: ServerState) {
        *self.state.lock() = state;
    }

    /// The bound address, available once `start` has opened the listener.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    pub fn active_clients(&self) -> usize {
        self.client_pool.active_count()
    }

    pub fn active_envelopes(&self) -> usize {
        self.envelope_pool.active_count()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.client_pool.is_shutting_down()
    }

    /// Accept SMTP clients until `shutdown` is called or the listener
    /// fails hard. Signals `startup` once the listener is bound (or
    /// definitively failed) so callers can wait for readiness.
    pub async fn start(self: Arc<Self>, startup: Arc<Barrier>) -> anyhow::Result<()> {
        let listener = match TcpListener::bind(&self.listen_interface).await {
            Ok(listener) => listener,
            Err(err) => {
                self.set_state(ServerState::StartError);
                startup.wait().await;
                return Err(err)
                    .with_context(|| format!("[{}] cannot listen on port", self.listen_interface));
            }
        };
        let local_addr = listener.local_addr().context("resolving listener address")?;
        *self.local_addr.lock() = Some(local_addr);
        self.listener_open.store(true, Ordering::SeqCst);
        self.set_state(ServerState::Running);
        tracing::info!(listener = %self.listen_interface, "smtp listener on {local_addr}");
        startup.wait().await;

        let mut client_id: u64 = 0;
        loop {
            tokio::select! {
                _ = self.close_listener.notified() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        client_id += 1;
                        self.dispatch(stream, peer, client_id).await;
                    }
                    Err(err) if is_temporary_accept_error(&err) => {
                        tracing::info!("temporary error accepting client: {err:#}");
                    }
                    Err(err) => {
                        tracing::error!(
                            listener = %self.listen_interface,
                            "stopped accepting clients: {err:#}"
                        );
                        break;
                    }
                },
            }
        }
        drop(listener);

        tracing::info!(listener = %self.listen_interface, "shutting down client pool");
        self.client_pool.shutdown_state();
        self.client_pool.shutdown_wait().await;
        self.set_state(ServerState::Stopped);
        self.closed_tx.send(()).await.ok();
        Ok(())
    }

    /// Close the listener (forcing the accept loop to return), wait for
    /// it to acknowledge, then wait for the session pool to drain. Safe
    /// to call even when the listener never opened.
    pub async fn shutdown(&self) {
        if self.listener_open.swap(false, Ordering::SeqCst) {
            self.close_listener.notify_one();
            self.closed_rx.lock().await.recv().await;
        } else {
            self.client_pool.shutdown_state();
            self.client_pool.shutdown_wait().await;
            self.set_state(ServerState::Stopped);
        }
    }

    async fn dispatch(self: &Arc<Self>, stream: TcpStream, peer: SocketAddr, client_id: u64) {
        match self
            .client_pool
            .borrow(
                Box::new(stream),
                client_id,
                peer.ip().to_string(),
                &self.envelope_pool,
            )
            .await
        {
            Ok(mut session) => {
                let server = self.clone();
                tokio::spawn(async move {
                    server.handle_client(&mut session).await;
                    // runs on every exit path: release the connection,
                    // then the envelope, then the session
                    session.close_conn().await;
                    if let Some(envelope) = session.take_envelope() {
                        server.envelope_pool.release(envelope);
                    }
                    server.client_pool.release(session);
                });
            }
            Err(err) => {
                // the connection was dropped without a reply
                tracing::info!("couldn't borrow a client: {err}");
            }
        }
    }

    /// Drive an entire client SMTP exchange.
    async fn handle_client(&self, client: &mut Session) {
        let sc = self.config.load();
        let timeout = self.client_pool.timeout();
        tracing::info!(
            listener = %self.listen_interface,
            "handling client [{}], id: {}",
            client.remote_ip,
            client.id
        );

        let greeting = format!(
            "220 {} SMTP postino({}) #{} ({}) {}",
            sc.hostname,
            env!("CARGO_PKG_VERSION"),
            client.id,
            self.client_pool.active_count(),
            Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        );
        let helo = format!("250 {} Hello", sc.hostname);

        // EHLO is a multi-line reply; every line but the last carries the
        // dash and an explicit terminator
        let ehlo_greet = format!("250-{} Hello\r\n", sc.hostname);
        let message_size = format!("250-SIZE {}\r\n", sc.max_size);
        let pipelining = "250-PIPELINING\r\n";
        let enhanced_status_codes = "250-ENHANCEDSTATUSCODES\r\n";
        let authentication = "250 AUTH PLAIN";
        let mut advertise_tls = "250-STARTTLS\r\n";

        if sc.tls.always_on {
            match (*self.tls_config.load()).clone() {
                Some(tls_config) => match client.upgrade_to_tls(tls_config, timeout).await {
                    Ok(()) => advertise_tls = "",
                    Err(err) => {
                        // the server requires TLS but can't handshake
                        tracing::warn!("[{}] failed TLS handshake: {err:#}", client.remote_ip);
                        client.kill();
                    }
                },
                None => tracing::error!("no TLS configuration loaded"),
            }
        }
        if !sc.tls.start_tls_on {
            advertise_tls = "";
        }

        let r = &response::CANNED;
        let mut parser = rfc5321::Parser::default();

        while client.is_alive() {
            match client.state {
                ClientState::Greeting => {
                    client.send_response(&greeting);
                    client.state = ClientState::Cmd;
                }

                ClientState::Cmd => {
                    let input = match client.read_line(COMMAND_LINE_MAX_LENGTH, timeout).await {
                        Ok(input) => input,
                        Err(BufferError::ShuttingDown) => {
                            client.state = ClientState::Shutdown;
                            continue;
                        }
                        Err(BufferError::LineLimitExceeded) => {
                            client.send_response(r.fail_line_too_long);
                            client.kill();
                            // fall to the flush at the end of the tick
                            Vec::new()
                        }
                        Err(BufferError::Eof) => {
                            tracing::debug!("client [{}] closed the connection", client.remote_ip);
                            return;
                        }
                        Err(err @ BufferError::Timeout(_)) => {
                            tracing::warn!("client [{}]: {err}", client.remote_ip);
                            return;
                        }
                        Err(err) => {
                            tracing::warn!("read error from [{}]: {err:#}", client.remote_ip);
                            client.kill();
                            Vec::new()
                        }
                    };
                    if !client.is_alive() {
                        // a read error already queued its reply
                    } else if self.client_pool.is_shutting_down() {
                        client.state = ClientState::Shutdown;
                        continue;
                    } else {
                        tracing::debug!("client sent: {}", String::from_utf8_lossy(&input));
                        match match_command(&input) {
                            Some((Verb::Helo, offset)) => match parser.helo(&input[offset..]) {
                                Ok(domain) => {
                                    client.helo = domain;
                                    client.reset_transaction();
                                    client.send_response(&helo);
                                }
                                Err(err) => {
                                    tracing::warn!(client = client.id, "invalid helo: {err}");
                                    client.send_response(r.fail_syntax_error);
                                }
                            },

                            Some((Verb::Ehlo, offset)) => match parser.ehlo(&input[offset..]) {
                                Ok((domain, _params)) => {
                                    client.helo = domain;
                                    client.esmtp = true;
                                    client.reset_transaction();
                                    client.send_response(&format!(
                                        "{ehlo_greet}{message_size}{pipelining}{advertise_tls}\
                                         {enhanced_status_codes}{authentication}"
                                    ));
                                }
                                Err(err) => {
                                    tracing::warn!(client = client.id, "invalid ehlo: {err}");
                                    client.send_response(r.fail_syntax_error);
                                }
                            },

                            Some((Verb::Help, _)) => {
                                client.send_response(&format!(
                                    "214-OK\r\n214 {}",
                                    response::help_quote(client.id)
                                ));
                            }

                            Some((Verb::XClient, offset)) if sc.xclient_on => {
                                for token in input[offset..].split(|b| *b == b' ') {
                                    let Some(eq) = token.iter().position(|b| *b == b'=') else {
                                        continue;
                                    };
                                    let (key, value) = (&token[..eq], &token[eq + 1..]);
                                    if value == b"[UNAVAILABLE]" {
                                        continue;
                                    }
                                    if key == b"ADDR" {
                                        client.remote_ip =
                                            String::from_utf8_lossy(value).into_owned();
                                    }
                                    if key == b"HELO" {
                                        client.helo = String::from_utf8_lossy(value).into_owned();
                                    }
                                }
                                client.send_response(r.success_mail_cmd);
                            }

                            Some((Verb::Auth, offset)) => {
                                let text = String::from_utf8_lossy(&input[offset..]).into_owned();
                                let mut args = text.split_ascii_whitespace();
                                match (args.next(), args.next()) {
                                    (Some(mechanism), None)
                                        if mechanism.eq_ignore_ascii_case("PLAIN") =>
                                    {
                                        // credentials arrive on the next line
                                        client.state = ClientState::AuthPlainCredentials;
                                        client.send_response(r.positive_intermediate);
                                    }
                                    (Some(mechanism), Some(initial))
                                        if mechanism.eq_ignore_ascii_case("PLAIN") =>
                                    {
                                        let initial = initial.to_string();
                                        self.authenticate_plain(client, &sc, &initial).await;
                                    }
                                    _ => client.send_response(r.fail_auth_not_supported),
                                }
                            }

                            Some((Verb::MailFrom, offset)) => {
                                if sc.auth.auth_type != AuthType::None
                                    && client.envelope().auth.is_none()
                                {
                                    client.send_response(r.fail_invalid_auth);
                                } else if client.is_in_transaction() {
                                    client.send_response(r.fail_nested_mail_cmd);
                                } else {
                                    match parser.mail_from(&input[offset..]) {
                                        Ok(from) => {
                                            let from = if parser.null_path {
                                                // bounce: empty reverse-path
                                                Address::default()
                                            } else {
                                                from
                                            };
                                            client.envelope_mut().mail_from = Some(from);
                                            client.send_response(r.success_mail_cmd);
                                        }
                                        Err(err) => {
                                            tracing::warn!(
                                                client = client.id,
                                                "MAIL parse error [{}]: {err}",
                                                String::from_utf8_lossy(&input[offset..])
                                            );
                                            client.send_response(r.fail_syntax_error);
                                        }
                                    }
                                }
                            }

                            Some((Verb::RcptTo, offset)) => {
                                if client.envelope().rcpt_to.len() >= rfc5321::LIMIT_RECIPIENTS {
                                    client.send_response(r.error_too_many_recipients);
                                } else if !client.is_in_transaction() {
                                    client.send_response(r.fail_need_mail_before_rcpt);
                                } else {
                                    match parser.rcpt_to(&input[offset..]) {
                                        Ok(mut to) => {
                                            self.default_host(&mut to, &sc);
                                            let allowed = match to.ip {
                                                Some(ip) => self.hosts.allows_ip(ip),
                                                None => self.hosts.allows(&to.host),
                                            };
                                            if !allowed {
                                                client.send_response(&format!(
                                                    "{} {}",
                                                    r.error_relay_denied, to.host
                                                ));
                                            } else {
                                                client.envelope_mut().push_rcpt(to);
                                                let backend = self.backend.load();
                                                match backend.validate_rcpt(client.envelope()).await
                                                {
                                                    Ok(()) => {
                                                        client.send_response(r.success_rcpt_cmd)
                                                    }
                                                    Err(err) => {
                                                        client.envelope_mut().pop_rcpt();
                                                        client.send_response(&format!(
                                                            "{} {err:#}",
                                                            r.fail_rcpt_cmd
                                                        ));
                                                    }
                                                }
                                            }
                                        }
                                        Err(err) => {
                                            tracing::warn!(
                                                client = client.id,
                                                "RCPT parse error [{}]: {err}",
                                                String::from_utf8_lossy(&input[offset..])
                                            );
                                            client.send_response(r.fail_syntax_error);
                                        }
                                    }
                                }
                            }

                            Some((Verb::Rset, _)) => {
                                client.reset_transaction();
                                client.send_response(r.success_reset_cmd);
                            }

                            Some((Verb::Vrfy, _)) => client.send_response(r.success_verify_cmd),

                            Some((Verb::Noop, _)) | Some((Verb::Asterisk, _)) => {
                                client.send_response(r.success_noop_cmd)
                            }

                            Some((Verb::Quit, _)) => {
                                client.send_response(r.success_quit_cmd);
                                client.kill();
                            }

                            Some((Verb::Data, _)) => {
                                if client.envelope().rcpt_to.is_empty() {
                                    client.send_response(r.fail_no_recipients_data_cmd);
                                } else {
                                    client.send_response(r.success_data_cmd);
                                    client.state = ClientState::Data;
                                }
                            }

                            Some((Verb::StartTls, _)) if sc.tls.start_tls_on => {
                                client.send_response(r.success_starttls_cmd);
                                client.state = ClientState::StartTls;
                            }

                            // XCLIENT when disabled, STARTTLS when disabled,
                            // and anything else
                            Some((Verb::XClient, _)) | Some((Verb::StartTls, _)) | None => {
                                client.errors += 1;
                                if client.errors >= MAX_UNRECOGNIZED_COMMANDS {
                                    client.send_response(r.fail_max_unrecognized_cmd);
                                    client.kill();
                                } else {
                                    client.send_response(r.fail_unrecognized_cmd);
                                }
                            }
                        }
                    }
                }

                ClientState::AuthPlainCredentials => {
                    match client.read_line(CREDENTIALS_MAX_LENGTH, timeout).await {
                        Ok(input) => {
                            if self.client_pool.is_shutting_down() {
                                client.state = ClientState::Shutdown;
                                continue;
                            }
                            let line = String::from_utf8_lossy(&input).into_owned();
                            self.authenticate_plain(client, &sc, &line).await;
                            client.state = ClientState::Cmd;
                        }
                        Err(BufferError::ShuttingDown) => {
                            client.state = ClientState::Shutdown;
                            continue;
                        }
                        Err(BufferError::LineLimitExceeded) => {
                            client.send_response(r.fail_line_too_long);
                            client.kill();
                        }
                        Err(BufferError::Eof) => {
                            tracing::debug!("client [{}] closed the connection", client.remote_ip);
                            return;
                        }
                        Err(err @ BufferError::Timeout(_)) => {
                            tracing::warn!("client [{}]: {err}", client.remote_ip);
                            return;
                        }
                        Err(err) => {
                            tracing::warn!("read error from [{}]: {err:#}", client.remote_ip);
                            client.kill();
                        }
                    }
                }

                ClientState::Data => {
                    match client.read_data(sc.max_size, timeout).await {
                        Ok(()) => {
                            let backend = self.backend.load();
                            let result = backend.process(client.envelope()).await;
                            if result.is_delivered() {
                                client.messages_sent += 1;
                            }
                            client.send_response(&result.to_reply());
                            client.state = ClientState::Cmd;
                            if self.client_pool.is_shutting_down() {
                                client.state = ClientState::Shutdown;
                            }
                            client.reset_transaction();
                        }
                        Err(err) => {
                            match &err {
                                BufferError::LineLimitExceeded => client.send_response(&format!(
                                    "{} {err}",
                                    r.fail_read_limit_exceeded_data_cmd
                                )),
                                BufferError::MessageSizeExceeded => client.send_response(
                                    &format!("{} {err}", r.fail_message_size_exceeded),
                                ),
                                _ => client.send_response(&format!(
                                    "{} {err}",
                                    r.fail_read_error_data_cmd
                                )),
                            }
                            client.kill();
                            tracing::warn!(
                                "error reading data from [{}]: {err}",
                                client.remote_ip
                            );
                            client.reset_transaction();
                        }
                    }
                }

                ClientState::StartTls => {
                    if !client.is_tls && sc.tls.start_tls_on {
                        match (*self.tls_config.load()).clone() {
                            Some(tls_config) => {
                                match client.upgrade_to_tls(tls_config, timeout).await {
                                    Ok(()) => {
                                        advertise_tls = "";
                                        client.reset_transaction();
                                    }
                                    Err(err) => {
                                        // don't disconnect; the client may
                                        // choose to continue in plaintext
                                        tracing::warn!(
                                            "[{}] failed TLS handshake: {err:#}",
                                            client.remote_ip
                                        );
                                    }
                                }
                            }
                            None => tracing::error!("no TLS configuration loaded"),
                        }
                    }
                    client.state = ClientState::Cmd;
                }

                ClientState::Shutdown => {
                    client.send_response(r.error_shutdown);
                    client.kill();
                }
            }

            if client.has_pending_response() {
                tracing::debug!(
                    "writing response to client: {}",
                    client.pending_response().trim_end()
                );
                if let Err(err) = client.flush_response(timeout).await {
                    tracing::debug!("error writing response: {err}");
                    return;
                }
            }
        }
    }

    /// Decode and verify an AUTH PLAIN payload, updating the envelope's
    /// authenticated identity on success.
    async fn authenticate_plain(&self, client: &mut Session, sc: &ServerConfig, input: &str) {
        let r = &response::CANNED;
        let Some(credentials) = auth::decode_plain(input) else {
            tracing::warn!(client = client.id, "undecodable AUTH PLAIN credentials");
            client.send_response(r.fail_invalid_auth);
            return;
        };

        if sc.auth.auth_type == AuthType::None {
            // no store configured: any credentials are accepted
            client.envelope_mut().auth = Some(credentials);
            client.send_response(r.success_auth_cmd);
            return;
        }

        let store = self.auth_store.load();
        let Some(store) = (*store).as_ref() else {
            tracing::error!("auth store is not configured");
            client.send_response(r.fail_invalid_auth);
            return;
        };
        match store
            .authenticate(&credentials.username, &credentials.password)
            .await
        {
            Ok(true) => {
                client.envelope_mut().auth = Some(credentials);
                client.send_response(r.success_auth_cmd);
            }
            Ok(false) => client.send_response(r.fail_invalid_auth),
            Err(err) => {
                tracing::error!("error authenticating from store: {err:#}");
                client.send_response(r.fail_invalid_auth);
            }
        }
    }

    /// A bare `<postmaster>` recipient is addressed to this host.
    fn default_host(&self, address: &mut Address, sc: &ServerConfig) {
        if address.host.is_empty() && address.is_postmaster() {
            address.host = sc.hostname.clone();
            if !self.hosts.allows(&address.host) {
                tracing::warn!(
                    hostname = %sc.hostname,
                    "the hostname is not present in the allowed hosts list"
                );
            }
        }
    }
}

fn is_temporary_accept_error(err: &std::io::Error) -> bool {
    use std::io::ErrorKind;
    matches!(
        err.kind(),
        ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionAborted
            | ErrorKind::ConnectionReset
            | ErrorKind::Interrupted
            | ErrorKind::WouldBlock
    )
}
