//! Bridge lifecycle controller
//!
//! The controller owns the bridge mode and the single active relay session.
//! Every transition goes through its lock, whether it comes from a chat
//! command, the Auto watcher or startup/shutdown.
//!
//! | mode     | link/unlink/refresh | auto        | session start/stop       |
//! |----------|---------------------|-------------|--------------------------|
//! | Constant | ignored             | ignored     | once at startup          |
//! | Manual   | applied             | enter Auto  | by command               |
//! | Auto     | link demotes        | leave Auto  | by watched occupancy     |

mod auto;
pub mod command;

use std::sync::Arc;

use tokio::sync::{mpsc, watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{BridgeConfig, BridgeMode};
use crate::error::{BridgeError, BridgeResult};
use crate::events::BridgeEvent;
use crate::platform::{ChatPlatform, VoiceServer};
use crate::presence::PresenceTracker;
use crate::relay::{RelayContext, RelaySession};
use crate::status;
use crate::types::{ChannelId, ChatMessage, SessionId, VoiceState, VoiceStateUpdate};

pub use command::BridgeCommand;

/// Mutable bridge state, only touched under the controller lock
#[derive(Debug)]
struct BridgeState {
    mode: BridgeMode,
    /// The current relay session; at most one exists
    active_conn: Option<RelaySession>,
    /// Sessions told to stop whose teardown may still be running
    stopping: Vec<RelaySession>,
    /// Stops the Auto watcher
    auto_chan: Option<CancellationToken>,
    started: bool,
}

impl BridgeState {
    /// The stored session, unless its worker already exited
    fn live_session(&self) -> Option<&RelaySession> {
        self.active_conn.as_ref().filter(|session| !session.is_finished())
    }
}

/// Drives the relay from chat commands and presence changes
pub struct BridgeController {
    config: Arc<BridgeConfig>,
    chat: Arc<dyn ChatPlatform>,
    voice: Arc<dyn VoiceServer>,
    presence: Arc<PresenceTracker>,
    state: Mutex<BridgeState>,
    active: Arc<watch::Sender<Option<SessionId>>>,
    event_tx: mpsc::UnboundedSender<BridgeEvent>,
    event_rx: parking_lot::Mutex<Option<mpsc::UnboundedReceiver<BridgeEvent>>>,
    /// Parent of every token the controller hands out
    shutdown: CancellationToken,
}

impl BridgeController {
    pub fn new(config: BridgeConfig, chat: Arc<dyn ChatPlatform>, voice: Arc<dyn VoiceServer>) -> Arc<Self> {
        let config = Arc::new(config);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (active, active_rx) = watch::channel(None);

        let presence = Arc::new(PresenceTracker::new(
            config.clone(),
            chat.clone(),
            voice.clone(),
            active_rx,
            event_tx.clone(),
        ));

        Arc::new(Self {
            state: Mutex::new(BridgeState {
                mode: config.mode,
                active_conn: None,
                stopping: Vec::new(),
                auto_chan: None,
                started: false,
            }),
            config,
            chat,
            voice,
            presence,
            active: Arc::new(active),
            event_tx,
            event_rx: parking_lot::Mutex::new(Some(event_rx)),
            shutdown: CancellationToken::new(),
        })
    }

    /// Apply the configured starting mode and start background workers.
    ///
    /// Fails if the bridge was already started.
    pub async fn start(self: &Arc<Self>) -> BridgeResult<()> {
        {
            let mut state = self.state.lock().await;
            if state.started {
                return Err(BridgeError::invalid_state("bridge already started"));
            }
            state.started = true;

            match state.mode {
                BridgeMode::Constant => {
                    info!("Bridge starting in constant mode");
                    self.start_session_locked(&mut state, self.config.voice_channel_id.clone())
                        .await;
                }
                BridgeMode::Manual => info!("Bridge starting in manual mode"),
                BridgeMode::Auto => {
                    info!("Bridge starting in automatic mode");
                    self.enter_auto_locked(&mut state).await;
                }
            }
        }

        if let Some(interval) = self.config.status_interval() {
            tokio::spawn(status::run_status_updates(
                self.chat.clone(),
                self.voice.clone(),
                interval,
                self.shutdown.child_token(),
            ));
        }
        info!(prefix = %self.config.command_prefix, "Bridge looking for commands");
        Ok(())
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn presence(&self) -> &Arc<PresenceTracker> {
        &self.presence
    }

    /// Get event receiver (can only be called once)
    pub fn take_event_receiver(&self) -> Option<mpsc::UnboundedReceiver<BridgeEvent>> {
        self.event_rx.lock().take()
    }

    pub async fn mode(&self) -> BridgeMode {
        self.state.lock().await.mode
    }

    /// A relay session is currently relaying audio
    pub fn is_connected(&self) -> bool {
        self.active.borrow().is_some()
    }

    /// Watch the id of the session currently relaying
    pub fn subscribe_connected(&self) -> watch::Receiver<Option<SessionId>> {
        self.active.subscribe()
    }

    /// The stored relay session, if its worker is still running
    pub async fn active_session(&self) -> Option<(SessionId, ChannelId)> {
        let state = self.state.lock().await;
        state
            .live_session()
            .map(|session| (session.id(), session.channel().clone()))
    }

    /// Handle a chat platform message; anything but a recognized command is ignored
    pub async fn handle_message(self: &Arc<Self>, message: &ChatMessage) {
        if message.from_self {
            return;
        }
        let Some(command) = BridgeCommand::parse(&self.config.command_prefix, &message.content) else {
            return;
        };
        if message.guild != self.config.guild_id {
            debug!(guild = %message.guild, "Command from a guild not in config");
            return;
        }
        if self.mode().await == BridgeMode::Constant {
            debug!(command = %command, "Ignoring command in constant mode");
            return;
        }

        let Some(channel) = self.issuer_channel(message).await else {
            debug!(user = %message.author, command = %command, "Command issuer is not in a voice channel");
            return;
        };

        info!(user = %message.author, command = %command, channel = %channel, "Bridge command");
        self.execute(command, channel).await;
    }

    /// Apply a command on behalf of a participant sitting in `channel`
    pub async fn execute(self: &Arc<Self>, command: BridgeCommand, channel: ChannelId) {
        match command {
            BridgeCommand::Link => self.link(channel).await,
            BridgeCommand::Unlink => self.unlink().await,
            BridgeCommand::Refresh => self.refresh().await,
            BridgeCommand::Auto => self.toggle_auto().await,
        }
    }

    async fn issuer_channel(&self, message: &ChatMessage) -> Option<ChannelId> {
        match self.chat.voice_states(&message.guild).await {
            Ok(states) => states
                .into_iter()
                .find(|state| state.user == message.author)
                .and_then(|state| state.channel),
            Err(e) => {
                warn!(guild = %message.guild, error = %e, "Could not find guild voice state");
                None
            }
        }
    }

    async fn link(self: &Arc<Self>, channel: ChannelId) {
        let mut state = self.state.lock().await;
        if state.mode == BridgeMode::Constant {
            return;
        }
        if state.mode == BridgeMode::Auto {
            self.leave_auto_locked(&mut state);
        }
        if let Some(session) = state.live_session() {
            info!(session = %session.id(), channel = %session.channel(), "Bridge already linked");
            return;
        }

        self.presence.set_watched_channel(channel.clone()).await;
        self.start_session_locked(&mut state, channel).await;
    }

    async fn unlink(&self) {
        let mut state = self.state.lock().await;
        if state.mode == BridgeMode::Constant {
            return;
        }
        match state.active_conn.take() {
            Some(session) => {
                info!(session = %session.id(), channel = %session.channel(), "Unlinking bridge");
                retire_locked(&mut state, session);
            }
            None => debug!("Unlink without an active session"),
        }
    }

    async fn refresh(&self) {
        let mut state = self.state.lock().await;
        if state.mode == BridgeMode::Constant {
            return;
        }
        let Some(session) = state.active_conn.take() else {
            debug!("Refresh without an active session");
            return;
        };

        let channel = session.channel().clone();
        info!(session = %session.id(), channel = %channel, "Refreshing bridge");
        retire_locked(&mut state, session);
        self.start_session_locked(&mut state, channel).await;
    }

    async fn toggle_auto(self: &Arc<Self>) {
        let mut state = self.state.lock().await;
        match state.mode {
            BridgeMode::Constant => {}
            BridgeMode::Auto => self.leave_auto_locked(&mut state),
            BridgeMode::Manual => self.enter_auto_locked(&mut state).await,
        }
    }

    async fn enter_auto_locked(self: &Arc<Self>, state: &mut BridgeState) {
        self.presence
            .set_watched_channel(self.config.voice_channel_id.clone())
            .await;

        let token = self.shutdown.child_token();
        state.auto_chan = Some(token.clone());
        self.set_mode_locked(state, BridgeMode::Auto);
        auto::spawn_watcher(Arc::clone(self), token);
    }

    fn leave_auto_locked(&self, state: &mut BridgeState) {
        if let Some(token) = state.auto_chan.take() {
            token.cancel();
        }
        self.set_mode_locked(state, BridgeMode::Manual);
    }

    fn set_mode_locked(&self, state: &mut BridgeState, mode: BridgeMode) {
        if state.mode == mode {
            return;
        }
        info!(from = %state.mode, to = %mode, "Bridge mode changed");
        let _ = self.event_tx.send(BridgeEvent::ModeChanged {
            from: state.mode,
            to: mode,
        });
        state.mode = mode;
    }

    fn relay_context(&self) -> RelayContext {
        RelayContext {
            guild: self.config.guild_id.clone(),
            chat: self.chat.clone(),
            voice: self.voice.clone(),
            mixer: self.config.mixer_config(),
            active: self.active.clone(),
            events: self.event_tx.clone(),
        }
    }

    /// Wait for every retired session to finish its teardown.
    ///
    /// Leaving voice is guild-wide, so a retired session still tearing down
    /// would disconnect whatever session starts next.
    async fn reap_stopping_locked(&self, state: &mut BridgeState) {
        let grace = self.config.refresh_grace();
        for session in std::mem::take(&mut state.stopping) {
            let id = session.id();
            if session.stop_and_wait(grace).await {
                debug!(session = %id, "Relay session stopped");
            }
        }
    }

    async fn start_session_locked(&self, state: &mut BridgeState, channel: ChannelId) {
        self.reap_stopping_locked(state).await;

        let session = RelaySession::spawn(self.relay_context(), channel, self.shutdown.child_token());
        debug!(session = %session.id(), channel = %session.channel(), "Relay session spawned");
        state.active_conn = Some(session);
    }

    /// Seed chat platform membership from a full guild snapshot
    pub async fn handle_guild_snapshot(&self, states: &[VoiceState]) {
        self.presence.seed_chat_members(states).await;
    }

    pub async fn handle_voice_state_update(&self, update: &VoiceStateUpdate) {
        self.presence.on_voice_state_update(update).await;
    }

    /// Voice server users connected, disconnected or changed channel
    pub async fn handle_voice_server_change(&self) {
        self.presence.refresh_voice_members().await;
    }

    /// Voice server connection established: move to the starting channel
    pub async fn on_voice_server_connected(&self) {
        if let Some(name) = &self.config.voice_server_channel {
            match self.voice.move_to_channel(name).await {
                Ok(true) => info!(channel = %name, "Moved to starting voice server channel"),
                Ok(false) => warn!(channel = %name, "Starting voice server channel not found"),
                Err(e) => warn!(channel = %name, error = %e, "Failed to move to starting voice server channel"),
            }
        }
        self.presence.refresh_voice_members().await;
    }

    /// Stop the Auto watcher, the status reporter and the active session
    pub async fn shutdown(&self) {
        info!("Bridge shutting down");
        self.shutdown.cancel();

        let mut state = self.state.lock().await;
        state.auto_chan = None;
        if let Some(session) = state.active_conn.take() {
            retire_locked(&mut state, session);
        }
        self.reap_stopping_locked(&mut state).await;
    }
}

/// Signal a session to stop and keep it until its teardown is awaited
fn retire_locked(state: &mut BridgeState, session: RelaySession) {
    session.stop();
    state.stopping.retain(|stopped| !stopped.is_finished());
    state.stopping.push(session);
}
