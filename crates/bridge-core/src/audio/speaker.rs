//! Per-speaker frame queues
//!
//! The mixer owns the consuming half (`SpeakerStream`), the ingestion worker
//! owns the producing half (`SpeakerHandle`). The queue is bounded and the
//! producer never waits: a full queue drops the new frame.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use tokio::time::Instant;
use tracing::trace;

use super::mixer::MixerStats;
use crate::error::{BridgeError, BridgeResult};
use crate::types::{PcmFrame, SpeakerId};

/// Mixer side of one speaker's queue
#[derive(Debug)]
pub(crate) struct SpeakerStream {
    pub(crate) generation: u64,
    rx: mpsc::Receiver<PcmFrame>,
    /// Only used to log transitions
    pub(crate) streaming: bool,
    pub(crate) last_frame_at: Instant,
}

impl SpeakerStream {
    pub(crate) fn try_next(&mut self) -> Result<PcmFrame, TryRecvError> {
        self.rx.try_recv()
    }
}

/// Producer side of one speaker's queue.
///
/// Raw packets are cut into fixed-size frames; a trailing partial frame is
/// kept until the next push completes it.
#[derive(Debug)]
pub struct SpeakerHandle {
    speaker: SpeakerId,
    generation: u64,
    tx: mpsc::Sender<PcmFrame>,
    pending: Vec<i16>,
    frame_samples: usize,
    stats: Arc<MixerStats>,
}

impl SpeakerHandle {
    pub fn speaker(&self) -> &SpeakerId {
        &self.speaker
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// Samples waiting for a full frame
    pub fn pending_samples(&self) -> usize {
        self.pending.len()
    }

    /// Append raw samples; returns the number of frames queued.
    ///
    /// Fails only when the mixer no longer holds this stream.
    pub fn push_samples(&mut self, samples: &[i16]) -> BridgeResult<usize> {
        self.pending.extend_from_slice(samples);

        let mut queued = 0;
        while self.pending.len() >= self.frame_samples {
            let rest = self.pending.split_off(self.frame_samples);
            let frame = std::mem::replace(&mut self.pending, rest);
            match self.tx.try_send(frame) {
                Ok(()) => queued += 1,
                Err(TrySendError::Full(_)) => {
                    self.stats.record_ingress_drop();
                    trace!(speaker = %self.speaker, "speaker queue full, dropping frame");
                }
                Err(TrySendError::Closed(_)) => {
                    self.pending.clear();
                    return Err(BridgeError::stream_closed(self.speaker.as_str()));
                }
            }
        }
        Ok(queued)
    }
}

/// Create both halves of a speaker queue
pub(crate) fn speaker_queue(
    speaker: SpeakerId,
    generation: u64,
    capacity: usize,
    frame_samples: usize,
    stats: Arc<MixerStats>,
) -> (SpeakerStream, SpeakerHandle) {
    let (tx, rx) = mpsc::channel(capacity);
    let stream = SpeakerStream {
        generation,
        rx,
        streaming: false,
        last_frame_at: Instant::now(),
    };
    let handle = SpeakerHandle {
        speaker,
        generation,
        tx,
        pending: Vec::with_capacity(frame_samples),
        frame_samples,
        stats,
    };
    (stream, handle)
}
