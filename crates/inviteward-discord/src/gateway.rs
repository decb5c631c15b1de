//! Discord Gateway client.
//!
//! Keeps a websocket session open, heartbeats at the interval the server
//! asks for, and forwards the dispatches the tracker cares about as
//! [`GatewayEvent`]s over an mpsc channel. Dropped sessions are
//! re-established with exponential backoff; every new session identifies
//! from scratch and therefore produces a fresh `Ready`.

use crate::error::{Error, Result};
use crate::model::{GuildMember, User};
use futures_util::{SinkExt, StreamExt};
use inviteward_ledger::{ChannelId, GuildId, Member, UserId};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, error, info, warn};

/// Default gateway URL.
pub const GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";

/// Gateway intent bits.
pub mod intents {
    pub const GUILDS: u64 = 1 << 0;
    pub const GUILD_MEMBERS: u64 = 1 << 1;
    pub const GUILD_INVITES: u64 = 1 << 6;
    pub const GUILD_MESSAGES: u64 = 1 << 9;
    pub const MESSAGE_CONTENT: u64 = 1 << 15;

    /// Everything the invite tracker needs.
    pub const TRACKER: u64 = GUILDS | GUILD_MEMBERS | GUILD_INVITES | GUILD_MESSAGES | MESSAGE_CONTENT;
}

mod opcode {
    pub const DISPATCH: u8 = 0;
    pub const HEARTBEAT: u8 = 1;
    pub const IDENTIFY: u8 = 2;
    pub const RECONNECT: u8 = 7;
    pub const INVALID_SESSION: u8 = 9;
    pub const HELLO: u8 = 10;
    pub const HEARTBEAT_ACK: u8 = 11;
}

/// Close codes after which reconnecting cannot help.
const FATAL_CLOSE_CODES: &[u16] = &[4004, 4010, 4011, 4012, 4013, 4014];

/// A chat message seen by the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub channel: ChannelId,
    pub guild: Option<GuildId>,
    pub author: Member,
    pub content: String,
}

/// Dispatches forwarded to the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
    /// Session established; lists the guilds the bot is in.
    Ready { user: UserId, guilds: Vec<GuildId> },
    /// A guild became available or the bot was added to one.
    GuildCreate { guild: GuildId },
    MemberAdd { guild: GuildId, member: Member },
    MemberRemove { guild: GuildId, member: Member },
    MessageCreate(IncomingMessage),
    /// An invite was created or deleted.
    InvitesChanged { guild: GuildId },
}

/// Raw gateway frame.
#[derive(Debug, Deserialize)]
struct Payload {
    op: u8,
    #[serde(default)]
    d: Value,
    #[serde(default)]
    s: Option<u64>,
    #[serde(default)]
    t: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Hello {
    heartbeat_interval: u64,
}

#[derive(Debug, Deserialize)]
struct UnavailableGuild {
    id: GuildId,
}

#[derive(Debug, Deserialize)]
struct ReadyData {
    user: User,
    #[serde(default)]
    guilds: Vec<UnavailableGuild>,
}

#[derive(Debug, Deserialize)]
struct MemberAddData {
    guild_id: GuildId,
    #[serde(flatten)]
    member: GuildMember,
}

#[derive(Debug, Deserialize)]
struct MemberRemoveData {
    guild_id: GuildId,
    user: User,
}

#[derive(Debug, Deserialize)]
struct MessageData {
    channel_id: ChannelId,
    #[serde(default)]
    guild_id: Option<GuildId>,
    author: User,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct InviteData {
    #[serde(default)]
    guild_id: Option<GuildId>,
}

/// Convert a dispatch into an event, or `None` for dispatches we ignore.
fn parse_dispatch(kind: &str, data: Value) -> Result<Option<GatewayEvent>> {
    let event = match kind {
        "READY" => {
            let ready: ReadyData = serde_json::from_value(data)?;
            GatewayEvent::Ready {
                user: ready.user.id,
                guilds: ready.guilds.into_iter().map(|g| g.id).collect(),
            }
        }
        "GUILD_CREATE" => {
            let guild: UnavailableGuild = serde_json::from_value(data)?;
            GatewayEvent::GuildCreate { guild: guild.id }
        }
        "GUILD_MEMBER_ADD" => {
            let add: MemberAddData = serde_json::from_value(data)?;
            let mut member = add.member.user.to_member();
            if let Some(nick) = add.member.nick {
                member.display_name = Some(nick);
            }
            GatewayEvent::MemberAdd {
                guild: add.guild_id,
                member,
            }
        }
        "GUILD_MEMBER_REMOVE" => {
            let remove: MemberRemoveData = serde_json::from_value(data)?;
            GatewayEvent::MemberRemove {
                guild: remove.guild_id,
                member: remove.user.to_member(),
            }
        }
        "MESSAGE_CREATE" => {
            let msg: MessageData = serde_json::from_value(data)?;
            GatewayEvent::MessageCreate(IncomingMessage {
                channel: msg.channel_id,
                guild: msg.guild_id,
                author: msg.author.to_member(),
                content: msg.content,
            })
        }
        "INVITE_CREATE" | "INVITE_DELETE" => {
            let invite: InviteData = serde_json::from_value(data)?;
            match invite.guild_id {
                Some(guild) => GatewayEvent::InvitesChanged { guild },
                None => return Ok(None),
            }
        }
        _ => return Ok(None),
    };
    Ok(Some(event))
}

/// Last heartbeat round trip, shared with command handlers.
#[derive(Debug, Clone)]
pub struct Latency(Arc<AtomicU64>);

impl Latency {
    const UNKNOWN: u64 = u64::MAX;

    pub fn new() -> Self {
        Self(Arc::new(AtomicU64::new(Self::UNKNOWN)))
    }

    /// Round trip of the most recent acknowledged heartbeat.
    pub fn get(&self) -> Option<Duration> {
        match self.0.load(Ordering::Relaxed) {
            Self::UNKNOWN => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    fn set(&self, rtt: Duration) {
        self.0.store(rtt.as_millis() as u64, Ordering::Relaxed);
    }
}

/// Gateway connection settings.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub token: String,
    pub intents: u64,
    pub url: String,
}

impl GatewayConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            intents: intents::TRACKER,
            url: GATEWAY_URL.to_string(),
        }
    }
}

/// How a session ended.
enum SessionEnd {
    /// Try again after backoff.
    Reconnect,
    /// The consumer hung up; stop.
    Shutdown,
}

/// Gateway client.
pub struct Gateway {
    config: GatewayConfig,
    latency: Latency,
}

impl Gateway {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            latency: Latency::new(),
        }
    }

    /// Handle for reading heartbeat latency.
    pub fn latency(&self) -> Latency {
        self.latency.clone()
    }

    /// Start the connection loop on a background task.
    ///
    /// The task ends when the returned receiver is dropped or Discord
    /// rejects the session for good (bad token, disallowed intents).
    pub fn spawn(self) -> (mpsc::Receiver<GatewayEvent>, tokio::task::JoinHandle<Result<()>>) {
        let (tx, rx) = mpsc::channel(256);
        let handle = tokio::spawn(async move { self.run(tx).await });
        (rx, handle)
    }

    /// Connection loop with reconnection logic.
    pub async fn run(self, tx: mpsc::Sender<GatewayEvent>) -> Result<()> {
        let mut reconnect_delay = Duration::from_millis(100);
        let max_reconnect_delay = Duration::from_secs(30);

        loop {
            info!("Connecting to gateway");
            let started = Instant::now();

            match self.session(&tx).await {
                Ok(SessionEnd::Shutdown) => {
                    info!("Event consumer closed; stopping gateway");
                    return Ok(());
                }
                Ok(SessionEnd::Reconnect) => {}
                Err(Error::Gateway(reason)) if is_fatal(&reason) => {
                    error!("Gateway rejected the session: {}", reason);
                    return Err(Error::Gateway(reason));
                }
                Err(e) => {
                    error!("Gateway session error: {}", e);
                }
            }

            // A session that lasted a while was healthy; start backoff over
            if started.elapsed() > max_reconnect_delay {
                reconnect_delay = Duration::from_millis(100);
            }
            warn!("Reconnecting to gateway in {:?}...", reconnect_delay);
            tokio::time::sleep(reconnect_delay).await;
            reconnect_delay = (reconnect_delay * 2).min(max_reconnect_delay);
        }
    }

    async fn session(&self, tx: &mpsc::Sender<GatewayEvent>) -> Result<SessionEnd> {
        let (ws, _) = tokio_tungstenite::connect_async(self.config.url.as_str()).await?;
        let (mut sink, mut stream) = ws.split();

        // First frame must be Hello
        let hello: Hello = loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    let payload: Payload = serde_json::from_str(&text)?;
                    if payload.op != opcode::HELLO {
                        return Err(Error::Gateway(format!("expected Hello, got op {}", payload.op)));
                    }
                    break serde_json::from_value(payload.d)?;
                }
                Some(Ok(Message::Close(frame))) => return Err(close_error(frame.map(|f| (f.code, f.reason.to_string())))),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
                None => return Ok(SessionEnd::Reconnect),
            }
        };
        debug!(interval_ms = hello.heartbeat_interval, "Gateway hello");

        let identify = json!({
            "op": opcode::IDENTIFY,
            "d": {
                "token": self.config.token,
                "intents": self.config.intents,
                "properties": {
                    "os": std::env::consts::OS,
                    "browser": "inviteward",
                    "device": "inviteward",
                },
            },
        });
        sink.send(Message::Text(identify.to_string())).await?;

        let mut heartbeat = tokio::time::interval(Duration::from_millis(hello.heartbeat_interval));
        // The first tick completes immediately; skip it so the first beat waits one interval
        heartbeat.tick().await;

        let mut seq: Option<u64> = None;
        let mut sent_at: Option<Instant> = None;
        let mut acked = true;

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    if !acked {
                        warn!("Heartbeat not acknowledged; reconnecting");
                        return Ok(SessionEnd::Reconnect);
                    }
                    sink.send(Message::Text(json!({ "op": opcode::HEARTBEAT, "d": seq }).to_string())).await?;
                    sent_at = Some(Instant::now());
                    acked = false;
                }
                frame = stream.next() => {
                    let text = match frame {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Ping(data))) => {
                            sink.send(Message::Pong(data)).await?;
                            continue;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            return Err(close_error(frame.map(|f| (f.code, f.reason.to_string()))));
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => return Err(e.into()),
                        None => return Ok(SessionEnd::Reconnect),
                    };

                    let payload: Payload = match serde_json::from_str(&text) {
                        Ok(payload) => payload,
                        Err(e) => {
                            warn!("Unparsable gateway frame: {}", e);
                            continue;
                        }
                    };
                    if payload.s.is_some() {
                        seq = payload.s;
                    }

                    match payload.op {
                        opcode::DISPATCH => {
                            let kind = payload.t.unwrap_or_default();
                            match parse_dispatch(&kind, payload.d) {
                                Ok(Some(event)) => {
                                    if tx.send(event).await.is_err() {
                                        return Ok(SessionEnd::Shutdown);
                                    }
                                }
                                Ok(None) => {}
                                Err(e) => warn!(event = %kind, "Failed to parse dispatch: {}", e),
                            }
                        }
                        opcode::HEARTBEAT => {
                            sink.send(Message::Text(json!({ "op": opcode::HEARTBEAT, "d": seq }).to_string())).await?;
                        }
                        opcode::HEARTBEAT_ACK => {
                            acked = true;
                            if let Some(sent) = sent_at.take() {
                                self.latency.set(sent.elapsed());
                            }
                        }
                        opcode::RECONNECT => {
                            info!("Gateway asked us to reconnect");
                            return Ok(SessionEnd::Reconnect);
                        }
                        opcode::INVALID_SESSION => {
                            warn!("Gateway invalidated the session");
                            tokio::time::sleep(Duration::from_secs(2)).await;
                            return Ok(SessionEnd::Reconnect);
                        }
                        other => debug!(op = other, "Ignoring gateway opcode"),
                    }
                }
            }
        }
    }
}

fn close_error(frame: Option<(CloseCode, String)>) -> Error {
    match frame {
        Some((code, reason)) => Error::Gateway(format!("closed with {}: {}", u16::from(code), reason)),
        None => Error::Gateway("closed without a frame".into()),
    }
}

fn is_fatal(reason: &str) -> bool {
    FATAL_CLOSE_CODES
        .iter()
        .any(|code| reason.starts_with(&format!("closed with {}:", code)))
}
