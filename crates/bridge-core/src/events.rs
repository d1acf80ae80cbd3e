//! Events emitted by the bridge controller

use crate::audio::MixerStatsSnapshot;
use crate::config::BridgeMode;
use crate::types::{ChannelId, PlatformSide, SessionId};

/// Bridge lifecycle and presence events
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    /// Mode changed
    ModeChanged { from: BridgeMode, to: BridgeMode },
    /// A relay session joined its voice channel and started relaying
    SessionStarted { session_id: SessionId, channel: ChannelId },
    /// A relay session finished tearing down
    SessionStopped {
        session_id: SessionId,
        channel: ChannelId,
        mixer: MixerStatsSnapshot,
        /// Chat platform frames lost because the voice server sink was full
        forward_dropped: u64,
    },
    /// A relay session could not be established
    SessionFailed {
        session_id: SessionId,
        channel: ChannelId,
        error: String,
    },
    /// A participant joined the watched channel
    MemberJoined { side: PlatformSide, name: String },
    /// A participant left the watched channel
    MemberLeft { side: PlatformSide, name: String },
}
