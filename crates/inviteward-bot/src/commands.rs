//! Prefix commands.
//!
//! `ping` and `invites` are open to everyone; the two report commands
//! only answer inside a guild and only to members the [`AccessGate`] lets
//! through.

use inviteward_discord::{IncomingMessage, Latency};
use inviteward_ledger::{
    invite_usage, AccessGate, GuildId, InviteTracker, Leaderboard, LedgerStore, Member, Platform,
};
use std::time::Duration;
use tracing::{info, warn};

/// Discord's per-message character limit.
pub const MESSAGE_LIMIT: usize = 2000;

const DM_ONLY: &str = "❌ This command can only be used in a server, not in DMs.";
const UNRESOLVED: &str = "❌ Could not fetch your member details. Try again.";
const DENIED: &str = "❌ You don't have the required role to access invite details.";
const NO_INVITES: &str = "❌ No invite details available.";

/// A recognised command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Ping,
    Invites,
    /// Leaderboard
    InviteDetails,
    /// Raw invite counters
    AllInviteDetails,
}

impl Command {
    /// Parse `content` as a prefixed command. Arguments are ignored.
    pub fn parse(prefix: &str, content: &str) -> Option<Self> {
        let rest = content.trim_end().strip_prefix(prefix)?;
        let name = rest.split(char::is_whitespace).next()?;
        match name {
            "ping" => Some(Self::Ping),
            "invites" => Some(Self::Invites),
            "invite_details" => Some(Self::InviteDetails),
            "all_invite_details" => Some(Self::AllInviteDetails),
            _ => None,
        }
    }
}

/// Answers commands from chat messages.
pub struct Commands {
    prefix: String,
    gate: AccessGate,
    latency: Latency,
}

impl Commands {
    pub fn new(prefix: impl Into<String>, gate: AccessGate, latency: Latency) -> Self {
        Self {
            prefix: prefix.into(),
            gate,
            latency,
        }
    }

    /// Replies to send for `msg`, already split to the message limit.
    ///
    /// Empty when the message is not a command or comes from a bot.
    pub async fn respond<P: Platform, S: LedgerStore>(
        &self,
        tracker: &InviteTracker<P, S>,
        msg: &IncomingMessage,
    ) -> Vec<String> {
        if msg.author.bot {
            return Vec::new();
        }
        let Some(command) = Command::parse(&self.prefix, &msg.content) else {
            return Vec::new();
        };

        let reply = match command {
            Command::Ping => {
                let reply = ping_reply(self.latency.get());
                info!(user = %msg.author.name, "Ping command: {}", reply);
                reply
            }
            Command::Invites => {
                let count = tracker.invites_of(msg.author.id);
                info!(user = %msg.author.name, count, "Checked invites");
                format!("📊 You've invited {} members!", count)
            }
            Command::InviteDetails | Command::AllInviteDetails => {
                match self.authorize(tracker.platform(), msg).await {
                    Ok(guild) => self.report(tracker, command, guild, &msg.author).await,
                    Err(denial) => denial.to_string(),
                }
            }
        };

        split_message(&reply, MESSAGE_LIMIT)
    }

    /// Resolve the caller and check the gate; the error is the reply.
    async fn authorize<P: Platform>(&self, platform: &P, msg: &IncomingMessage) -> Result<GuildId, &'static str> {
        let guild = msg.guild.ok_or(DM_ONLY)?;

        let member = match platform.resolve_member(guild, msg.author.id).await {
            Ok(Some(member)) => member,
            Ok(None) => return Err(UNRESOLVED),
            Err(e) => {
                warn!(user = %msg.author.id, "Member lookup failed: {}", e);
                return Err(UNRESOLVED);
            }
        };

        if !self.gate.permits(&member) {
            info!(user = %member.name, role = self.gate.role(), "Report request denied");
            return Err(DENIED);
        }
        Ok(guild)
    }

    async fn report<P: Platform, S: LedgerStore>(
        &self,
        tracker: &InviteTracker<P, S>,
        command: Command,
        guild: GuildId,
        caller: &Member,
    ) -> String {
        match command {
            Command::InviteDetails => {
                let board = Leaderboard::build(&tracker.stored_ledger(), tracker.platform(), guild).await;
                if board.is_empty() {
                    warn!(user = %caller.name, "Leaderboard requested but no data");
                } else {
                    info!(user = %caller.name, "Leaderboard requested");
                }
                board.render()
            }
            _ => match invite_usage(&tracker.snapshot(guild)) {
                Some(usage) => {
                    info!(user = %caller.name, "Invite details requested");
                    usage
                }
                None => {
                    warn!(user = %caller.name, "Invite details requested but none cached");
                    NO_INVITES.to_string()
                }
            },
        }
    }
}

fn ping_reply(latency: Option<Duration>) -> String {
    match latency {
        Some(rtt) => format!("🏓 Pong! Latency is {}ms", rtt.as_millis()),
        None => "🏓 Pong! Latency not measured yet".to_string(),
    }
}

/// Split `text` into chunks of at most `limit` characters.
///
/// Breaks between lines where possible; a single line longer than the
/// limit is cut at character boundaries.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.lines() {
        let line_len = line.chars().count();
        let joined_len = if current.is_empty() {
            line_len
        } else {
            current_len + 1 + line_len
        };

        if joined_len <= limit {
            if !current.is_empty() {
                current.push('\n');
            }
            current.push_str(line);
            current_len = joined_len;
            continue;
        }

        if !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if line_len <= limit {
            current.push_str(line);
            current_len = line_len;
        } else {
            let chars: Vec<char> = line.chars().collect();
            chunks.extend(chars.chunks(limit).map(|piece| piece.iter().collect::<String>()));
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
