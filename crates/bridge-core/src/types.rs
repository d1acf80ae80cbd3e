//! Core identifiers, audio constants and platform event payloads

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sample rate of every PCM frame handled by the bridge
pub const SAMPLE_RATE: u32 = 48_000;

/// Samples in one mixer frame (10 ms, mono)
pub const FRAME_SAMPLES: usize = (SAMPLE_RATE / 100) as usize;

/// Interval between two mix ticks
pub const TICK_INTERVAL: Duration = Duration::from_millis(10);

/// Frames a speaker queue holds before new frames are dropped (about one second)
pub const SPEAKER_QUEUE_FRAMES: usize = 100;

/// One block of signed 16-bit mono PCM samples
pub type PcmFrame = Vec<i16>;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new identifier
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the raw identifier
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(
    /// Participant identity on the chat platform
    UserId
);
string_id!(
    /// Guild (server) identity on the chat platform
    GuildId
);
string_id!(
    /// Voice or text channel identity on the chat platform
    ChannelId
);
string_id!(
    /// Speaker identity on the voice server
    SpeakerId
);

/// Identity of one relay session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Voice presence of one participant in a guild snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceState {
    pub user: UserId,
    /// `None` when the participant is not in any voice channel
    pub channel: Option<ChannelId>,
}

impl VoiceState {
    pub fn new(user: impl Into<UserId>, channel: Option<ChannelId>) -> Self {
        Self {
            user: user.into(),
            channel,
        }
    }
}

/// Voice presence change reported by the chat platform.
///
/// The previous channel is not reported, so a departure shows up only as an
/// update with a different (or no) channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceStateUpdate {
    pub guild: GuildId,
    pub user: UserId,
    pub channel: Option<ChannelId>,
}

/// Text message received on the chat platform
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub guild: GuildId,
    pub channel: ChannelId,
    pub author: UserId,
    /// Set when the message was written by the bridge's own account
    pub from_self: bool,
    pub content: String,
}

/// Which side of the bridge a presence change belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlatformSide {
    /// Platform A, the chat platform
    Chat,
    /// Platform B, the voice server
    VoiceServer,
}

impl fmt::Display for PlatformSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlatformSide::Chat => write!(f, "chat"),
            PlatformSide::VoiceServer => write!(f, "voice-server"),
        }
    }
}
