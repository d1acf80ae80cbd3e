//! Platform adapter seams
//!
//! The bridge never talks to a platform SDK directly. Adapters for the chat
//! platform (Platform A) and the voice server (Platform B) implement these
//! traits; codecs, transport and authentication live behind them.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::BridgeResult;
use crate::types::{ChannelId, GuildId, PcmFrame, SpeakerId, UserId, VoiceState};

/// Raw-audio duplex of one chat platform voice connection
#[derive(Debug)]
pub struct VoiceConnection {
    /// Decoded audio received from the voice channel
    pub inbound: mpsc::Receiver<PcmFrame>,
    /// Audio to be encoded and sent to the voice channel
    pub outbound: mpsc::Sender<PcmFrame>,
}

/// A voice server participant started speaking.
///
/// The source delivers raw sample packets of arbitrary length. It is never
/// explicitly ended while the speaker stays connected.
#[derive(Debug)]
pub struct SpeakerStreamStart {
    pub speaker: SpeakerId,
    pub source: mpsc::Receiver<Vec<i16>>,
}

/// Platform A: guild based chat platform with voice channels and text commands
#[async_trait]
pub trait ChatPlatform: Send + Sync + 'static {
    /// Human readable platform name used in announcements
    fn display_name(&self) -> &str;

    /// Resolve a participant to the display name used in announcements
    async fn resolve_user(&self, user: &UserId) -> BridgeResult<String>;

    /// Full voice state of a guild
    async fn voice_states(&self, guild: &GuildId) -> BridgeResult<Vec<VoiceState>>;

    /// Join a voice channel and open its audio duplex
    async fn join_voice(&self, guild: &GuildId, channel: &ChannelId) -> BridgeResult<VoiceConnection>;

    /// Leave whatever voice channel the bridge occupies in the guild
    async fn leave_voice(&self, guild: &GuildId) -> BridgeResult<()>;

    /// Send a text message to a channel
    async fn send_text(&self, channel: &ChannelId, text: &str) -> BridgeResult<()>;

    /// Update the bridge account's status line
    async fn set_status(&self, status: &str) -> BridgeResult<()>;
}

/// Platform B: voice server with per-speaker audio streams
#[async_trait]
pub trait VoiceServer: Send + Sync + 'static {
    /// Human readable platform name used in announcements
    fn display_name(&self) -> &str;

    /// Name of the bridge's own user, excluded from membership
    fn self_name(&self) -> &str;

    /// Names of every user in the channel the bridge currently sits in
    async fn channel_members(&self) -> BridgeResult<Vec<String>>;

    /// Subscribe to speaker stream start events
    async fn subscribe_speakers(&self) -> BridgeResult<mpsc::Receiver<SpeakerStreamStart>>;

    /// Sink for audio sent to the voice server
    async fn audio_sink(&self) -> BridgeResult<mpsc::Sender<PcmFrame>>;

    /// Send a text message to the bridge's current channel
    async fn send_text(&self, text: &str) -> BridgeResult<()>;

    /// Move to the named channel. Returns `false` when it does not exist.
    async fn move_to_channel(&self, name: &str) -> BridgeResult<bool>;
}
