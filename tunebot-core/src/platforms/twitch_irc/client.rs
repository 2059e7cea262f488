//! src/platforms/twitch_irc/client.rs

use tokio::io::{split, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_native_tls::{TlsConnector, TlsStream};
use tracing::{debug, error, info, trace, warn};

use tunebot_common::models::{ChatEvent, ChatMessage};
use crate::Error;

pub const TWITCH_IRC_HOST: &str = "irc.chat.twitch.tv";
pub const TWITCH_IRC_TLS_PORT: u16 = 6697;

/// NOTICE texts the server sends right before closing a rejected login.
const AUTH_FAILURE_NOTICES: [&str; 2] = ["Login authentication failed", "Improperly formatted auth"];

/// Minimal representation of a parsed IRC message from Twitch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTwitchMsg {
    pub tags: Option<String>,
    pub prefix: Option<String>,
    pub command: String,
    pub params: Vec<String>,
    pub trailing: Option<String>,
}

impl ParsedTwitchMsg {
    pub fn parse_irc_line(line: &str) -> Self {
        let mut rest = line.trim();
        let mut tags = None;
        let mut prefix = None;
        let mut params = Vec::new();
        let mut trailing = None;

        if let Some(stripped) = rest.strip_prefix('@') {
            match stripped.find(' ') {
                Some(pos) => {
                    tags = Some(stripped[..pos].to_string());
                    rest = &stripped[pos + 1..];
                }
                None => {
                    tags = Some(stripped.to_string());
                    rest = "";
                }
            }
        }

        if let Some(stripped) = rest.strip_prefix(':') {
            match stripped.find(' ') {
                Some(pos) => {
                    prefix = Some(stripped[..pos].to_string());
                    rest = &stripped[pos + 1..];
                }
                None => {
                    prefix = Some(stripped.to_string());
                    rest = "";
                }
            }
        }

        let mut parts = rest.splitn(2, ' ');
        let command = parts.next().unwrap_or("").to_string();
        let rest = parts.next().unwrap_or("");

        if let Some(body) = rest.strip_prefix(':') {
            trailing = Some(body.to_string());
        } else if let Some(idx) = rest.find(" :") {
            trailing = Some(rest[idx + 2..].to_string());
            params.extend(rest[..idx].split_whitespace().map(str::to_string));
        } else {
            params.extend(rest.split_whitespace().map(str::to_string));
        }

        Self { tags, prefix, command, params, trailing }
    }

    /// Nick part of a `nick!user@host` prefix.
    pub fn nick(&self) -> Option<&str> {
        let prefix = self.prefix.as_deref()?;
        Some(prefix.split('!').next().unwrap_or(prefix))
    }

    pub fn tag(&self, key: &str) -> Option<String> {
        self.tags.as_deref().and_then(|t| extract_tag_value(t, key))
    }
}

/// Decodes a PRIVMSG into a [`ChatMessage`]. `bot_login` marks the bot's
/// own lines as `is_self`.
pub fn decode_privmsg(parsed: &ParsedTwitchMsg, bot_login: &str) -> Option<ChatMessage> {
    if !parsed.command.eq_ignore_ascii_case("PRIVMSG") {
        return None;
    }
    let channel = parsed.params.first()?.clone();
    let sender_login = parsed.nick()?.to_lowercase();
    let display_name = parsed
        .tag("display-name")
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| sender_login.clone());
    let is_moderator = parsed.tag("mod").as_deref() == Some("1");
    let is_broadcaster = parsed
        .tag("badges")
        .is_some_and(|b| b.split(',').any(|badge| badge == "broadcaster/1"));

    Some(ChatMessage {
        channel,
        is_self: sender_login == bot_login,
        sender_login,
        display_name,
        text: parsed.trailing.clone().unwrap_or_default(),
        is_moderator,
        is_broadcaster,
    })
}

/// What the reader reports back about the login handshake.
pub type LoginOutcome = oneshot::Receiver<Result<(), Error>>;

/// Low-level IRC connection: one writer task and one reader task over a
/// split stream.
pub struct TwitchIrcClient {
    raw_outgoing: mpsc::UnboundedSender<String>,
    read_task: JoinHandle<()>,
    write_task: JoinHandle<()>,
}

impl TwitchIrcClient {
    /// TCP connect plus TLS handshake.
    pub async fn connect_tls(host: &str, port: u16) -> Result<TlsStream<TcpStream>, Error> {
        let tcp = TcpStream::connect((host, port))
            .await
            .map_err(|e| Error::Transport(format!("TCP connect error: {e}")))?;
        let native_connector = native_tls::TlsConnector::new()
            .map_err(|e| Error::Transport(format!("TlsConnector::new() => {e}")))?;
        TlsConnector::from(native_connector)
            .connect(host, tcp)
            .await
            .map_err(|e| Error::Transport(format!("TLS connect() => {e}")))
    }

    /// Sends PASS/NICK/CAP and spawns the read/write loops. Decoded chat
    /// events go to `events`; the returned receiver resolves once the server
    /// either welcomed or rejected the login.
    pub fn start<S>(
        stream: S,
        username: &str,
        bearer: &str,
        events: mpsc::UnboundedSender<ChatEvent>,
    ) -> (Self, LoginOutcome)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = split(stream);
        let (tx_outgoing, rx_outgoing) = mpsc::unbounded_channel::<String>();
        let (login_tx, login_rx) = oneshot::channel();

        let write_task = tokio::spawn(Self::writer_loop(write_half, rx_outgoing));

        tx_outgoing.send(format!("PASS {bearer}")).ok();
        tx_outgoing.send(format!("NICK {username}")).ok();
        tx_outgoing
            .send("CAP REQ :twitch.tv/commands twitch.tv/tags twitch.tv/membership".to_string())
            .ok();

        let read_task = tokio::spawn(Self::reader_loop(
            read_half,
            username.to_lowercase(),
            events,
            tx_outgoing.clone(),
            login_tx,
        ));

        let client = Self {
            raw_outgoing: tx_outgoing,
            read_task,
            write_task,
        };
        (client, login_rx)
    }

    async fn reader_loop<R>(
        read_half: R,
        bot_login: String,
        events: mpsc::UnboundedSender<ChatEvent>,
        tx_outgoing: mpsc::UnboundedSender<String>,
        login_tx: oneshot::Sender<Result<(), Error>>,
    ) where
        R: AsyncRead + Unpin,
    {
        let mut reader = BufReader::new(read_half);
        let mut line_buffer = String::new();
        let mut login = Some(login_tx);

        loop {
            line_buffer.clear();
            match reader.read_line(&mut line_buffer).await {
                Ok(0) => {
                    info!("(TwitchIrcClient) read_loop => EOF");
                    match login.take() {
                        Some(tx) => {
                            let _ = tx.send(Err(Error::TransportDropped(
                                "connection closed during login".into(),
                            )));
                        }
                        None => {
                            let _ = events.send(ChatEvent::Disconnected("Connection closed".into()));
                        }
                    }
                    break;
                }
                Ok(_) => {
                    let line = line_buffer.trim_end();
                    if line.is_empty() {
                        continue;
                    }
                    trace!("<< {line}");

                    let parsed = ParsedTwitchMsg::parse_irc_line(line);
                    match parsed.command.to_uppercase().as_str() {
                        "PING" => {
                            let token = parsed.trailing.as_deref().unwrap_or(TWITCH_IRC_HOST);
                            tx_outgoing.send(format!("PONG :{token}")).ok();
                            debug!("Auto PONG -> {token}");
                        }
                        "001" => {
                            if let Some(tx) = login.take() {
                                let _ = tx.send(Ok(()));
                            }
                        }
                        "NOTICE" => {
                            let text = parsed.trailing.clone().unwrap_or_default();
                            if AUTH_FAILURE_NOTICES.iter().any(|n| text.contains(n)) {
                                warn!("(TwitchIrcClient) login rejected: {text}");
                                match login.take() {
                                    Some(tx) => {
                                        let _ = tx.send(Err(Error::AuthRejected(text)));
                                    }
                                    None => {
                                        let _ = events.send(ChatEvent::Error(text));
                                    }
                                }
                                break;
                            }
                            debug!("(TwitchIrcClient) NOTICE: {text}");
                        }
                        "RECONNECT" => {
                            info!("(TwitchIrcClient) server requested reconnect");
                            let _ = events.send(ChatEvent::Disconnected("Server requested reconnect".into()));
                            break;
                        }
                        "PRIVMSG" => {
                            if let Some(msg) = decode_privmsg(&parsed, &bot_login) {
                                let _ = events.send(ChatEvent::Message(msg));
                            }
                        }
                        other => trace!("(TwitchIrcClient) ignoring {other}"),
                    }
                }
                Err(e) => {
                    error!("(TwitchIrcClient) read error => {e:?}");
                    match login.take() {
                        Some(tx) => {
                            let _ = tx.send(Err(Error::Transport(e.to_string())));
                        }
                        None => {
                            let _ = events.send(ChatEvent::Error(e.to_string()));
                        }
                    }
                    break;
                }
            }
        }

        info!("(TwitchIrcClient) reader_loop ended.");
    }

    async fn writer_loop<W>(write_half: W, mut rx_outgoing: mpsc::UnboundedReceiver<String>)
    where
        W: AsyncWrite + Unpin,
    {
        let mut writer = BufWriter::new(write_half);

        while let Some(line) = rx_outgoing.recv().await {
            if line.starts_with("PASS ") {
                trace!(">> PASS ***");
            } else {
                trace!(">> {line}");
            }
            let written = async {
                writer.write_all(line.as_bytes()).await?;
                writer.write_all(b"\r\n").await?;
                writer.flush().await
            };
            if let Err(e) = written.await {
                error!("(TwitchIrcClient) writer error => {e:?}");
                break;
            }
        }

        let _ = writer.shutdown().await;
        info!("(TwitchIrcClient) writer_loop ended.");
    }

    pub fn send_raw_line(&self, line: &str) {
        let _ = self.raw_outgoing.send(line.to_string());
    }

    pub fn join_channel(&self, channel: &str) {
        self.send_raw_line(&format!("JOIN {channel}"));
    }

    /// Line breaks in `message` become spaces; one call is one IRC line.
    pub fn send_privmsg(&self, channel: &str, message: &str) {
        let message = message.replace(['\r', '\n'], " ");
        self.send_raw_line(&format!("PRIVMSG {channel} :{message}"));
    }

    /// Stops reading, lets the writer flush a final QUIT, then closes.
    pub async fn close(self) {
        self.read_task.abort();
        self.send_raw_line("QUIT");
        let Self { raw_outgoing, write_task, .. } = self;
        drop(raw_outgoing);
        let abort = write_task.abort_handle();
        if tokio::time::timeout(std::time::Duration::from_secs(2), write_task)
            .await
            .is_err()
        {
            abort.abort();
        }
    }
}

/// Helper to extract `key=value` from a tag string like `@badge-info=;user-id=1234;...`
fn extract_tag_value(tag_str: &str, key: &str) -> Option<String> {
    tag_str
        .trim_start_matches('@')
        .split(';')
        .find_map(|kv| {
            let (left, right) = kv.split_once('=').unwrap_or((kv, ""));
            (left == key).then(|| right.to_string())
        })
}
