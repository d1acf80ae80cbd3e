//! Audio relay engine: per-speaker queues and the fixed-cadence mixer

pub mod mixer;
pub mod speaker;

pub use mixer::{mix_frames, AudioMixer, MixerConfig, MixerStats, MixerStatsSnapshot};
pub use speaker::SpeakerHandle;
