//! Channel membership tracking on both sides of the bridge
//!
//! Chat platform voice-state updates do not carry the previous channel, so
//! departures are inferred: any update that does not place a participant in
//! the watched channel triggers a recount of the watched channel from the
//! full guild voice state, and tracked members missing from it are removed.
//! This is best-effort and can lag behind the platform under bursts of
//! updates.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::config::BridgeConfig;
use crate::events::BridgeEvent;
use crate::platform::{ChatPlatform, VoiceServer};
use crate::types::{ChannelId, PlatformSide, SessionId, UserId, VoiceState, VoiceStateUpdate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Change {
    Joined,
    Left,
}

impl Change {
    fn verb(self) -> &'static str {
        match self {
            Change::Joined => "joined",
            Change::Left => "left",
        }
    }
}

#[derive(Debug, Default)]
struct Membership {
    /// Chat platform members of the watched channel, id to display name
    chat: HashMap<UserId, String>,
    /// Voice server members of the bridge's channel
    voice: HashSet<String>,
}

/// Tracks who is in the watched channel on each platform
pub struct PresenceTracker {
    config: Arc<BridgeConfig>,
    chat: Arc<dyn ChatPlatform>,
    voice: Arc<dyn VoiceServer>,
    watched: Mutex<ChannelId>,
    members: Mutex<Membership>,
    active: watch::Receiver<Option<SessionId>>,
    occupancy: watch::Sender<usize>,
    events: mpsc::UnboundedSender<BridgeEvent>,
}

impl PresenceTracker {
    pub fn new(
        config: Arc<BridgeConfig>,
        chat: Arc<dyn ChatPlatform>,
        voice: Arc<dyn VoiceServer>,
        active: watch::Receiver<Option<SessionId>>,
        events: mpsc::UnboundedSender<BridgeEvent>,
    ) -> Self {
        let watched = config.voice_channel_id.clone();
        let (occupancy, _) = watch::channel(0);
        Self {
            config,
            chat,
            voice,
            watched: Mutex::new(watched),
            members: Mutex::new(Membership::default()),
            active,
            occupancy,
            events,
        }
    }

    pub fn watched_channel(&self) -> ChannelId {
        self.watched.lock().clone()
    }

    /// Number of chat platform members in the watched channel, updated on every change
    pub fn subscribe_occupancy(&self) -> watch::Receiver<usize> {
        self.occupancy.subscribe()
    }

    pub fn chat_member_count(&self) -> usize {
        self.members.lock().chat.len()
    }

    pub fn chat_members(&self) -> Vec<String> {
        let mut names: Vec<_> = self.members.lock().chat.values().cloned().collect();
        names.sort();
        names
    }

    pub fn voice_member_count(&self) -> usize {
        self.members.lock().voice.len()
    }

    pub fn voice_members(&self) -> Vec<String> {
        let mut names: Vec<_> = self.members.lock().voice.iter().cloned().collect();
        names.sort();
        names
    }

    fn announcements_enabled(&self) -> bool {
        self.config.announce && self.active.borrow().is_some()
    }

    fn publish_occupancy(&self, members: &Membership) {
        let count = members.chat.len();
        self.occupancy.send_if_modified(|current| {
            if *current != count {
                *current = count;
                true
            } else {
                false
            }
        });
    }

    /// Point the tracker at a chat platform channel and seed its member set
    /// from the guild state. Switching channels drops the old member set.
    pub async fn set_watched_channel(&self, channel: ChannelId) {
        let switched = {
            let mut watched = self.watched.lock();
            if *watched == channel {
                false
            } else {
                info!(from = %watched.as_str(), to = %channel, "Watching new voice channel");
                *watched = channel;
                true
            }
        };
        if switched {
            let mut members = self.members.lock();
            members.chat.clear();
            self.publish_occupancy(&members);
        }

        match self.chat.voice_states(&self.config.guild_id).await {
            Ok(states) => self.seed_chat_members(&states).await,
            Err(e) => warn!(error = %e, "Failed to read guild voice state"),
        }
    }

    /// Record every participant of a guild snapshot that sits in the watched channel
    pub async fn seed_chat_members(&self, states: &[VoiceState]) {
        let watched = self.watched_channel();
        for state in states.iter().filter(|s| s.channel.as_ref() == Some(&watched)) {
            self.record_join(&state.user).await;
        }
        debug!(members = ?self.chat_members(), "Chat platform members seeded");
    }

    /// Apply one chat platform voice-state update
    pub async fn on_voice_state_update(&self, update: &VoiceStateUpdate) {
        if update.guild != self.config.guild_id {
            debug!(guild = %update.guild, "Voice state update from a guild not in config");
            return;
        }

        let watched = self.watched_channel();
        if update.channel.as_ref() == Some(&watched) {
            self.record_join(&update.user).await;
        } else {
            self.recount(&watched).await;
        }
    }

    async fn record_join(&self, user: &UserId) {
        let known = self.members.lock().chat.contains_key(user);
        if known {
            return;
        }

        let name = match self.chat.resolve_user(user).await {
            Ok(name) => name,
            Err(e) => {
                warn!(user = %user, error = %e, "Error looking up user");
                return;
            }
        };

        let inserted = {
            let mut members = self.members.lock();
            let inserted = members.chat.insert(user.clone(), name.clone()).is_none();
            self.publish_occupancy(&members);
            inserted
        };

        if inserted {
            info!(user = %user, name = %name, "User joined watched chat channel");
            self.announce(PlatformSide::Chat, Change::Joined, &name).await;
        }
    }

    async fn recount(&self, watched: &ChannelId) {
        let states = match self.chat.voice_states(&self.config.guild_id).await {
            Ok(states) => states,
            Err(e) => {
                warn!(error = %e, "Could not find guild voice state");
                return;
            }
        };
        let present: HashSet<&UserId> = states
            .iter()
            .filter(|s| s.channel.as_ref() == Some(watched))
            .map(|s| &s.user)
            .collect();

        let departed: Vec<String> = {
            let mut members = self.members.lock();
            if members.chat.len() <= present.len() {
                return;
            }
            let gone: Vec<UserId> = members
                .chat
                .keys()
                .filter(|user| !present.contains(user))
                .cloned()
                .collect();
            let names = gone.iter().filter_map(|user| members.chat.remove(user)).collect();
            self.publish_occupancy(&members);
            names
        };

        for name in departed {
            info!(name = %name, "User left watched chat channel");
            self.announce(PlatformSide::Chat, Change::Left, &name).await;
        }
    }

    /// Replace the voice server member set with a fresh snapshot.
    ///
    /// The bridge's own user is excluded.
    pub async fn update_voice_members(&self, names: Vec<String>) {
        let self_name = self.voice.self_name().to_string();
        let fresh: HashSet<String> = names.into_iter().filter(|name| *name != self_name).collect();

        let (joined, left) = {
            let mut members = self.members.lock();
            let mut joined: Vec<String> = fresh.difference(&members.voice).cloned().collect();
            let mut left: Vec<String> = members.voice.difference(&fresh).cloned().collect();
            joined.sort();
            left.sort();
            members.voice = fresh;
            (joined, left)
        };

        for name in joined {
            debug!(name = %name, "User joined voice server channel");
            self.announce(PlatformSide::VoiceServer, Change::Joined, &name).await;
        }
        for name in left {
            debug!(name = %name, "User left voice server channel");
            self.announce(PlatformSide::VoiceServer, Change::Left, &name).await;
        }
    }

    /// Fetch the voice server membership and apply it
    pub async fn refresh_voice_members(&self) {
        match self.voice.channel_members().await {
            Ok(names) => self.update_voice_members(names).await,
            Err(e) => warn!(error = %e, "Failed to read voice server members"),
        }
    }

    async fn announce(&self, side: PlatformSide, change: Change, name: &str) {
        let event = match change {
            Change::Joined => BridgeEvent::MemberJoined {
                side,
                name: name.to_string(),
            },
            Change::Left => BridgeEvent::MemberLeft {
                side,
                name: name.to_string(),
            },
        };
        let _ = self.events.send(event);

        if !self.announcements_enabled() {
            return;
        }

        let result = match side {
            PlatformSide::Chat => {
                let text = format!("{} has {} {} channel", name, change.verb(), self.chat.display_name());
                self.voice.send_text(&text).await
            }
            PlatformSide::VoiceServer => match &self.config.announce_channel_id {
                Some(channel) => {
                    let text = format!("{} has {} {}", name, change.verb(), self.voice.display_name());
                    self.chat.send_text(channel, &text).await
                }
                None => Ok(()),
            },
        };
        if let Err(e) = result {
            warn!(side = %side, error = %e, "Failed to send announcement");
        }
    }
}
