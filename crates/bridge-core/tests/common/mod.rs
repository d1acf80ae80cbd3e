//! In-memory platforms shared by the integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use voice_bridge_core::{
    BridgeError, BridgeResult, ChannelId, ChatMessage, ChatPlatform, GuildId, PcmFrame, SpeakerStreamStart,
    UserId, VoiceConnection, VoiceServer, VoiceState, VoiceStateUpdate,
};

pub const GUILD: &str = "guild-1";
pub const CHANNEL: &str = "voice-1";
pub const PREFIX: &str = "!mumble-discord";

/// Chat platform double: one guild, scripted voice state and name lookups
#[derive(Default)]
pub struct MockChat {
    states: Mutex<HashMap<UserId, Option<ChannelId>>>,
    names: Mutex<HashMap<UserId, String>>,
    pub joins: Mutex<Vec<ChannelId>>,
    pub leaves: AtomicUsize,
    pub texts: Mutex<Vec<(ChannelId, String)>>,
    pub statuses: Mutex<Vec<String>>,
    pub fail_join: AtomicBool,
    /// How long `leave_voice` takes, in milliseconds
    pub leave_delay_ms: AtomicU64,
    /// Voice calls in order: `join <channel>`, `leave` when a leave starts, `left` when it returns
    pub calls: Mutex<Vec<String>>,
    inbound: Mutex<Vec<mpsc::Sender<PcmFrame>>>,
    outbound: Mutex<Vec<mpsc::Receiver<PcmFrame>>>,
}

impl MockChat {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_user(&self, user: &str, name: &str) {
        self.names.lock().insert(UserId::from(user), name.to_string());
    }

    /// Place `user` in `channel` and return the matching update
    pub fn move_user(&self, user: &str, channel: Option<&str>) -> VoiceStateUpdate {
        let channel = channel.map(ChannelId::from);
        self.states.lock().insert(UserId::from(user), channel.clone());
        VoiceStateUpdate {
            guild: GuildId::from(GUILD),
            user: UserId::from(user),
            channel,
        }
    }

    pub fn snapshot(&self) -> Vec<VoiceState> {
        self.states
            .lock()
            .iter()
            .map(|(user, channel)| VoiceState::new(user.clone(), channel.clone()))
            .collect()
    }

    pub fn join_count(&self) -> usize {
        self.joins.lock().len()
    }

    pub fn leave_count(&self) -> usize {
        self.leaves.load(Ordering::SeqCst)
    }

    pub fn set_leave_delay(&self, delay: Duration) {
        self.leave_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().iter().map(|(_, text)| text.clone()).collect()
    }

    /// Sender feeding the inbound side of the latest voice connection
    pub fn inbound(&self) -> Option<mpsc::Sender<PcmFrame>> {
        self.inbound.lock().last().cloned()
    }

    /// Receiver for what the bridge sent on the latest voice connection
    pub fn take_outbound(&self) -> Option<mpsc::Receiver<PcmFrame>> {
        self.outbound.lock().pop()
    }
}

#[async_trait]
impl ChatPlatform for MockChat {
    fn display_name(&self) -> &str {
        "Discord"
    }

    async fn resolve_user(&self, user: &UserId) -> BridgeResult<String> {
        self.names
            .lock()
            .get(user)
            .cloned()
            .ok_or_else(|| BridgeError::lookup(format!("user {}", user)))
    }

    async fn voice_states(&self, guild: &GuildId) -> BridgeResult<Vec<VoiceState>> {
        if guild.as_str() != GUILD {
            return Err(BridgeError::lookup(format!("guild {}", guild)));
        }
        Ok(self.snapshot())
    }

    async fn join_voice(&self, _guild: &GuildId, channel: &ChannelId) -> BridgeResult<VoiceConnection> {
        self.joins.lock().push(channel.clone());
        self.calls.lock().push(format!("join {}", channel));
        if self.fail_join.load(Ordering::SeqCst) {
            return Err(BridgeError::platform("Discord", "voice join refused"));
        }

        let (inbound_tx, inbound) = mpsc::channel(100);
        let (outbound, outbound_rx) = mpsc::channel(100);
        self.inbound.lock().push(inbound_tx);
        self.outbound.lock().push(outbound_rx);
        Ok(VoiceConnection { inbound, outbound })
    }

    async fn leave_voice(&self, _guild: &GuildId) -> BridgeResult<()> {
        self.calls.lock().push("leave".to_string());
        let delay = self.leave_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.calls.lock().push("left".to_string());
        self.leaves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn send_text(&self, channel: &ChannelId, text: &str) -> BridgeResult<()> {
        self.texts.lock().push((channel.clone(), text.to_string()));
        Ok(())
    }

    async fn set_status(&self, status: &str) -> BridgeResult<()> {
        self.statuses.lock().push(status.to_string());
        Ok(())
    }
}

/// Voice server double
pub struct MockVoice {
    pub members: Mutex<Vec<String>>,
    pub channels: Vec<String>,
    pub moves: Mutex<Vec<String>>,
    pub texts: Mutex<Vec<String>>,
    sinks: Mutex<Vec<mpsc::Receiver<PcmFrame>>>,
    speakers: Mutex<Vec<mpsc::Sender<SpeakerStreamStart>>>,
}

impl MockVoice {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            members: Mutex::new(vec!["bridge".to_string()]),
            channels: vec!["Root".to_string(), "Lobby".to_string()],
            moves: Mutex::new(Vec::new()),
            texts: Mutex::new(Vec::new()),
            sinks: Mutex::new(Vec::new()),
            speakers: Mutex::new(Vec::new()),
        })
    }

    pub fn set_members(&self, names: &[&str]) {
        *self.members.lock() = names.iter().map(|name| name.to_string()).collect();
    }

    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().clone()
    }

    pub fn take_sink(&self) -> Option<mpsc::Receiver<PcmFrame>> {
        self.sinks.lock().pop()
    }

    pub fn speaker_subscription(&self) -> Option<mpsc::Sender<SpeakerStreamStart>> {
        self.speakers.lock().last().cloned()
    }
}

#[async_trait]
impl VoiceServer for MockVoice {
    fn display_name(&self) -> &str {
        "Mumble"
    }

    fn self_name(&self) -> &str {
        "bridge"
    }

    async fn channel_members(&self) -> BridgeResult<Vec<String>> {
        Ok(self.members.lock().clone())
    }

    async fn subscribe_speakers(&self) -> BridgeResult<mpsc::Receiver<SpeakerStreamStart>> {
        let (tx, rx) = mpsc::channel(16);
        self.speakers.lock().push(tx);
        Ok(rx)
    }

    async fn audio_sink(&self) -> BridgeResult<mpsc::Sender<PcmFrame>> {
        let (tx, rx) = mpsc::channel(100);
        self.sinks.lock().push(rx);
        Ok(tx)
    }

    async fn send_text(&self, text: &str) -> BridgeResult<()> {
        self.texts.lock().push(text.to_string());
        Ok(())
    }

    async fn move_to_channel(&self, name: &str) -> BridgeResult<bool> {
        self.moves.lock().push(name.to_string());
        Ok(self.channels.iter().any(|channel| channel == name))
    }
}

pub fn command(author: &str, content: &str) -> ChatMessage {
    ChatMessage {
        guild: GuildId::from(GUILD),
        channel: ChannelId::from("text-1"),
        author: UserId::from(author),
        from_self: false,
        content: content.to_string(),
    }
}

/// Poll `condition` until it holds, panicking after two seconds
pub async fn wait_until<F>(what: &str, mut condition: F)
where
    F: FnMut() -> bool,
{
    let result = tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(result.is_ok(), "timed out waiting for {}", what);
}

/// Let spawned tasks run for a short while
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
