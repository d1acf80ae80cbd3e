//! Relay sessions
//!
//! A relay session joins one chat platform voice channel and moves audio in
//! both directions until its cancellation token fires:
//!
//! - chat platform audio is forwarded frame by frame to the voice server sink;
//! - voice server speaker streams are fed into a session-owned `AudioMixer`
//!   whose output goes to the chat platform.
//!
//! Teardown cancels the mixer and every ingestion worker, so nothing the
//! session spawned outlives it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::audio::{AudioMixer, MixerConfig};
use crate::error::BridgeResult;
use crate::events::BridgeEvent;
use crate::platform::{ChatPlatform, VoiceConnection, VoiceServer};
use crate::types::{ChannelId, GuildId, SessionId};

/// Everything a relay session needs from its owner
#[derive(Clone)]
pub struct RelayContext {
    pub guild: GuildId,
    pub chat: Arc<dyn ChatPlatform>,
    pub voice: Arc<dyn VoiceServer>,
    pub mixer: MixerConfig,
    /// Id of the session currently relaying, `None` when disconnected
    pub active: Arc<watch::Sender<Option<SessionId>>>,
    pub events: mpsc::UnboundedSender<BridgeEvent>,
}

/// Handle to a running relay session
#[derive(Debug)]
pub struct RelaySession {
    id: SessionId,
    channel: ChannelId,
    cancel: CancellationToken,
    task: JoinHandle<()>,
    active: Arc<watch::Sender<Option<SessionId>>>,
}

impl RelaySession {
    /// Start relaying for `channel`
    pub fn spawn(ctx: RelayContext, channel: ChannelId, cancel: CancellationToken) -> Self {
        let id = SessionId::new();
        let active = ctx.active.clone();
        let task = tokio::spawn(run_session(ctx, id, channel.clone(), cancel.clone()));
        Self {
            id,
            channel,
            cancel,
            task,
            active,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn channel(&self) -> &ChannelId {
        &self.channel
    }

    /// Request shutdown without waiting
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// The worker has exited, either stopped or failed
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Request shutdown and wait up to `grace` for the worker to exit.
    ///
    /// A worker still running after `grace` is aborted, so it never outlives
    /// this call. Returns `false` in that case.
    pub async fn stop_and_wait(mut self, grace: Duration) -> bool {
        self.cancel.cancel();
        if tokio::time::timeout(grace, &mut self.task).await.is_ok() {
            return true;
        }

        warn!(session = %self.id, ?grace, "Relay session did not stop in time, aborting");
        self.task.abort();
        let _ = (&mut self.task).await;
        clear_active(&self.active, self.id);
        false
    }
}

fn clear_active(active: &watch::Sender<Option<SessionId>>, id: SessionId) {
    active.send_if_modified(|current| {
        if *current == Some(id) {
            *current = None;
            true
        } else {
            false
        }
    });
}

async fn run_session(ctx: RelayContext, id: SessionId, channel: ChannelId, cancel: CancellationToken) {
    let result = relay(&ctx, id, &channel, &cancel).await;
    clear_active(&ctx.active, id);

    if let Err(e) = result {
        warn!(session = %id, channel = %channel, error = %e, "Relay session failed");
        let _ = ctx.events.send(BridgeEvent::SessionFailed {
            session_id: id,
            channel,
            error: e.to_string(),
        });
    }
}

async fn relay(
    ctx: &RelayContext,
    id: SessionId,
    channel: &ChannelId,
    cancel: &CancellationToken,
) -> BridgeResult<()> {
    info!(session = %id, guild = %ctx.guild, channel = %channel, "Linking voice channel");

    let connection = tokio::select! {
        _ = cancel.cancelled() => return Ok(()),
        connection = ctx.chat.join_voice(&ctx.guild, channel) => connection?,
    };
    let VoiceConnection { mut inbound, outbound } = connection;

    let voice_side = async {
        let sink = ctx.voice.audio_sink().await?;
        let speakers = ctx.voice.subscribe_speakers().await?;
        BridgeResult::Ok((sink, speakers))
    };
    let (sink, mut speakers) = match voice_side.await {
        Ok(pair) => pair,
        Err(e) => {
            leave(ctx, id).await;
            return Err(e);
        }
    };

    let mixer = Arc::new(AudioMixer::new(ctx.mixer.clone()));
    let mix_cancel = cancel.child_token();
    let mix_task = tokio::spawn({
        let mixer = mixer.clone();
        let mix_cancel = mix_cancel.clone();
        async move { mixer.run(outbound, mix_cancel).await }
    });

    ctx.active.send_replace(Some(id));
    let _ = ctx.events.send(BridgeEvent::SessionStarted {
        session_id: id,
        channel: channel.clone(),
    });
    info!(session = %id, channel = %channel, "Bridge linked");

    let mut forward_dropped = 0u64;
    let mut speakers_open = true;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            frame = inbound.recv() => match frame {
                Some(frame) => match sink.try_send(frame) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        forward_dropped += 1;
                        debug!(session = %id, forward_dropped, "Voice server buffer full, dropping frame");
                    }
                    Err(TrySendError::Closed(_)) => {
                        warn!(session = %id, "Voice server audio sink closed");
                        break;
                    }
                },
                None => {
                    warn!(session = %id, "Chat voice connection closed");
                    break;
                }
            },
            start = speakers.recv(), if speakers_open => match start {
                Some(start) => {
                    let _ = mixer.attach_source(start);
                }
                None => {
                    debug!(session = %id, "Speaker subscription ended");
                    speakers_open = false;
                }
            },
        }
    }

    mix_cancel.cancel();
    mixer.shutdown();
    let _ = mix_task.await;
    leave(ctx, id).await;
    clear_active(&ctx.active, id);

    let stats = mixer.stats();
    info!(session = %id, channel = %channel, ?stats, forward_dropped, "Bridge unlinked");
    let _ = ctx.events.send(BridgeEvent::SessionStopped {
        session_id: id,
        channel: channel.clone(),
        mixer: stats,
        forward_dropped,
    });
    Ok(())
}

async fn leave(ctx: &RelayContext, id: SessionId) {
    if let Err(e) = ctx.chat.leave_voice(&ctx.guild).await {
        warn!(session = %id, error = %e, "Failed to leave voice channel");
    }
}
