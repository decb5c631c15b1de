//! Bot runtime: wires the gateway, the tracker and the liveness endpoint.

use crate::commands::Commands;
use crate::config::BotConfig;
use crate::error::Result;
use crate::health;
use inviteward_discord::{DiscordClient, Gateway, GatewayConfig, GatewayEvent};
use inviteward_ledger::{InviteTracker, JoinOutcome, JsonFileStore, LedgerStore, Platform};
use tracing::{debug, error, info, warn};

/// The invite tracking bot.
pub struct Bot {
    config: BotConfig,
}

enum Stop {
    Signal,
    GatewayEnded,
}

impl Bot {
    pub fn new(config: BotConfig) -> Self {
        Self { config }
    }

    /// Run until Ctrl-C or until the gateway gives up.
    pub async fn run(self) -> Result<()> {
        let client = DiscordClient::new(&self.config.token)?;
        let store = JsonFileStore::new(&self.config.data_file);
        let mut tracker = InviteTracker::new(client, store, self.config.tracker_config())?;

        let gateway = Gateway::new(GatewayConfig::new(self.config.token.clone()));
        let commands = Commands::new(
            self.config.prefix.clone(),
            self.config.access_gate(),
            gateway.latency(),
        );

        tokio::spawn(health::serve(self.config.health_addr));
        let (mut events, gateway_task) = gateway.spawn();

        // Sole owner of the tracker; events are handled one at a time
        let stop = loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => dispatch(&mut tracker, &commands, event).await,
                    None => break Stop::GatewayEnded,
                },
                _ = tokio::signal::ctrl_c() => break Stop::Signal,
            }
        };

        match stop {
            Stop::Signal => {
                info!("Shutting down");
                gateway_task.abort();
                Ok(())
            }
            Stop::GatewayEnded => match gateway_task.await {
                Ok(result) => Ok(result?),
                Err(e) => {
                    error!("Gateway task failed: {}", e);
                    Ok(())
                }
            },
        }
    }
}

/// Apply one gateway event to the tracker.
pub async fn dispatch<P: Platform, S: LedgerStore>(
    tracker: &mut InviteTracker<P, S>,
    commands: &Commands,
    event: GatewayEvent,
) {
    match event {
        GatewayEvent::Ready { user, guilds } => {
            info!(user = %user, guilds = guilds.len(), "Logged in");
            tracker.on_ready(&guilds).await;
        }
        GatewayEvent::GuildCreate { guild } | GatewayEvent::InvitesChanged { guild } => {
            tracker.refresh(guild).await;
        }
        GatewayEvent::MemberAdd { guild, member } => {
            let outcome = tracker.on_member_join(guild, &member).await;
            if let JoinOutcome::Unattributed(reason) = &outcome {
                debug!(member = %member.id, ?reason, "Join not attributed");
            }
        }
        GatewayEvent::MemberRemove { guild, member } => {
            tracker.on_member_remove(guild, &member).await;
        }
        GatewayEvent::MessageCreate(msg) => {
            for reply in commands.respond(tracker, &msg).await {
                if let Err(e) = tracker.platform().send_message(msg.channel, &reply).await {
                    warn!(channel = %msg.channel, "Failed to send reply: {}", e);
                }
            }
        }
    }
}
