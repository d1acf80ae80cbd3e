//! Fixed-cadence mixer for voice server speakers
//!
//! Every tick the mixer pops at most one frame from each active speaker
//! queue, sums the frames sample by sample and offers the result to the chat
//! platform sink without waiting. A full sink loses the frame: recency wins
//! over completeness.
//!
//! No timestamp alignment happens across speakers. A frame is mixed with
//! whatever the other queues hold at that tick.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::speaker::{speaker_queue, SpeakerHandle, SpeakerStream};
use crate::platform::SpeakerStreamStart;
use crate::types::{PcmFrame, SpeakerId, FRAME_SAMPLES, SPEAKER_QUEUE_FRAMES, TICK_INTERVAL};

/// Audio mixer configuration
#[derive(Debug, Clone, PartialEq)]
pub struct MixerConfig {
    /// Samples per frame
    pub frame_samples: usize,
    /// Interval between ticks
    pub tick_interval: Duration,
    /// Per-speaker queue capacity in frames
    pub queue_frames: usize,
    /// Silence after which a speaker is removed from the active set
    pub silence_timeout: Duration,
    /// Clamp sums to the i16 range; when false sums wrap like 16-bit addition
    pub clamp: bool,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            frame_samples: FRAME_SAMPLES,
            tick_interval: TICK_INTERVAL,
            queue_frames: SPEAKER_QUEUE_FRAMES,
            silence_timeout: Duration::from_secs(5),
            clamp: true,
        }
    }
}

/// Mixer counters
#[derive(Debug, Default)]
pub struct MixerStats {
    ticks: AtomicU64,
    frames_mixed: AtomicU64,
    frames_sent: AtomicU64,
    frames_dropped: AtomicU64,
    ingress_dropped: AtomicU64,
}

impl MixerStats {
    pub(crate) fn record_ingress_drop(&self) {
        self.ingress_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MixerStatsSnapshot {
        MixerStatsSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            frames_mixed: self.frames_mixed.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            ingress_dropped: self.ingress_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the mixer counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MixerStatsSnapshot {
    /// Ticks executed
    pub ticks: u64,
    /// Ticks where at least one speaker contributed
    pub frames_mixed: u64,
    /// Mixed frames accepted by the sink
    pub frames_sent: u64,
    /// Mixed frames lost because the sink was full
    pub frames_dropped: u64,
    /// Speaker frames lost because a speaker queue was full
    pub ingress_dropped: u64,
}

/// Sum frames sample by sample into one frame of `frame_samples` samples.
///
/// Short frames contribute silence for their missing tail.
pub fn mix_frames(frames: &[PcmFrame], frame_samples: usize, clamp: bool) -> PcmFrame {
    let mut acc = vec![0i32; frame_samples];
    for frame in frames {
        for (sum, sample) in acc.iter_mut().zip(frame.iter()) {
            *sum += i32::from(*sample);
        }
    }

    acc.into_iter()
        .map(|sum| {
            if clamp {
                sum.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16
            } else {
                // truncation reproduces plain 16-bit wrap-around
                sum as i16
            }
        })
        .collect()
}

/// Audio mixer for the voice server speakers of one relay session
pub struct AudioMixer {
    config: MixerConfig,
    streams: Mutex<HashMap<SpeakerId, SpeakerStream>>,
    next_generation: AtomicU64,
    stats: Arc<MixerStats>,
    /// Cancels every ingestion worker spawned by `attach_source`
    shutdown: CancellationToken,
}

impl AudioMixer {
    pub fn new(config: MixerConfig) -> Self {
        Self {
            config,
            streams: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
            stats: Arc::new(MixerStats::default()),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &MixerConfig {
        &self.config
    }

    pub fn stats(&self) -> MixerStatsSnapshot {
        self.stats.snapshot()
    }

    /// Allocate a queue for a speaker and add it to the active set.
    ///
    /// A previous queue of the same speaker is replaced.
    pub fn register_stream(&self, speaker: SpeakerId) -> SpeakerHandle {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let (stream, handle) = speaker_queue(
            speaker.clone(),
            generation,
            self.config.queue_frames,
            self.config.frame_samples,
            self.stats.clone(),
        );

        let replaced = self.streams.lock().insert(speaker.clone(), stream).is_some();
        debug!(speaker = %speaker, generation, replaced, "Registered speaker stream");
        handle
    }

    /// Remove the stream a handle feeds, unless it was replaced since
    pub fn release(&self, handle: &SpeakerHandle) -> bool {
        let mut streams = self.streams.lock();
        match streams.get(handle.speaker()) {
            Some(stream) if stream.generation == handle.generation() => {
                streams.remove(handle.speaker());
                true
            }
            _ => false,
        }
    }

    pub fn active_speakers(&self) -> Vec<SpeakerId> {
        let mut speakers: Vec<_> = self.streams.lock().keys().cloned().collect();
        speakers.sort();
        speakers
    }

    /// Speakers that contributed to the last tick
    pub fn streaming_speakers(&self) -> Vec<SpeakerId> {
        let mut speakers: Vec<_> = self
            .streams
            .lock()
            .iter()
            .filter(|(_, stream)| stream.streaming)
            .map(|(speaker, _)| speaker.clone())
            .collect();
        speakers.sort();
        speakers
    }

    /// Spawn the ingestion worker for a new voice server stream.
    ///
    /// The worker ends when the source closes or the mixer shuts down. If the
    /// stream was evicted for silence and audio resumes, the speaker is
    /// registered again.
    pub fn attach_source(self: &Arc<Self>, start: SpeakerStreamStart) -> JoinHandle<()> {
        let mixer = Arc::clone(self);
        let cancel = self.shutdown.child_token();

        tokio::spawn(async move {
            let SpeakerStreamStart { speaker, mut source } = start;
            info!(speaker = %speaker, "New voice server audio stream");

            let mut handle = mixer.register_stream(speaker.clone());
            loop {
                let samples = tokio::select! {
                    _ = cancel.cancelled() => break,
                    packet = source.recv() => match packet {
                        Some(samples) => samples,
                        None => {
                            debug!(speaker = %speaker, "Audio stream source closed");
                            break;
                        }
                    },
                };

                if handle.push_samples(&samples).is_err() {
                    trace!(speaker = %speaker, "Speaker resumed after eviction");
                    handle = mixer.register_stream(speaker.clone());
                    if let Err(e) = handle.push_samples(&samples) {
                        warn!(speaker = %speaker, error = %e, "Dropping audio for re-registered speaker");
                    }
                }
            }

            mixer.release(&handle);
        })
    }

    /// Run one mix tick.
    ///
    /// Returns the mixed frame when at least one speaker contributed.
    pub fn tick(&self, now: Instant) -> Option<PcmFrame> {
        let mut frames = Vec::new();
        {
            let mut streams = self.streams.lock();
            streams.retain(|speaker, stream| match stream.try_next() {
                Ok(frame) => {
                    if !stream.streaming {
                        stream.streaming = true;
                        trace!(speaker = %speaker, "Speaker started streaming");
                    }
                    stream.last_frame_at = now;
                    frames.push(frame);
                    true
                }
                Err(TryRecvError::Empty) => {
                    if stream.streaming {
                        stream.streaming = false;
                        trace!(speaker = %speaker, "Speaker stopped streaming");
                    }
                    let silent_for = now.saturating_duration_since(stream.last_frame_at);
                    if silent_for >= self.config.silence_timeout {
                        debug!(speaker = %speaker, ?silent_for, "Evicting silent speaker stream");
                        false
                    } else {
                        true
                    }
                }
                Err(TryRecvError::Disconnected) => {
                    debug!(speaker = %speaker, "Speaker stream producer gone");
                    false
                }
            });
        }

        self.stats.ticks.fetch_add(1, Ordering::Relaxed);
        if frames.is_empty() {
            return None;
        }

        self.stats.frames_mixed.fetch_add(1, Ordering::Relaxed);
        Some(mix_frames(&frames, self.config.frame_samples, self.config.clamp))
    }

    /// Offer a mixed frame to the sink. Returns `false` once the sink is closed.
    fn forward(&self, sink: &mpsc::Sender<PcmFrame>, frame: PcmFrame) -> bool {
        match sink.try_send(frame) {
            Ok(()) => {
                self.stats.frames_sent.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(_)) => {
                let dropped = self.stats.frames_dropped.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(dropped, "Outbound buffer full, dropping mixed frame");
                true
            }
            Err(TrySendError::Closed(_)) => {
                warn!("Outbound audio sink closed, stopping mixer");
                false
            }
        }
    }

    /// Tick loop. Exits when `cancel` fires or the sink closes.
    pub async fn run(&self, sink: mpsc::Sender<PcmFrame>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        debug!(interval = ?self.config.tick_interval, "Mixer started");

        loop {
            let now = tokio::select! {
                _ = cancel.cancelled() => break,
                now = ticker.tick() => now,
            };

            if let Some(frame) = self.tick(now) {
                if !self.forward(&sink, frame) {
                    break;
                }
            }
        }

        debug!(stats = ?self.stats(), "Mixer stopped");
    }

    /// Stop every ingestion worker and clear the active set
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.streams.lock().clear();
    }
}
