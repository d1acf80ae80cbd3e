//! Auto mode watcher
//!
//! Links when the watched chat platform channel gains its first member and
//! unlinks when its last member leaves.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::BridgeController;
use crate::config::BridgeMode;

pub(super) fn spawn_watcher(controller: Arc<BridgeController>, token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut occupancy = controller.presence.subscribe_occupancy();
        info!("Auto bridge watcher started");

        loop {
            let occupied = *occupancy.borrow_and_update() > 0;
            controller.reconcile_auto(occupied, &token).await;

            tokio::select! {
                _ = token.cancelled() => break,
                changed = occupancy.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("Auto bridge watcher stopped");
    })
}

impl BridgeController {
    async fn reconcile_auto(&self, occupied: bool, token: &CancellationToken) {
        let mut state = self.state.lock().await;
        if token.is_cancelled() || state.mode != BridgeMode::Auto {
            return;
        }

        let live = state.live_session().is_some();
        if occupied && !live {
            info!(channel = %self.config.voice_channel_id, "Watched channel occupied, linking");
            self.start_session_locked(&mut state, self.config.voice_channel_id.clone())
                .await;
        } else if !occupied && live {
            if let Some(session) = state.active_conn.take() {
                info!(session = %session.id(), "Watched channel empty, unlinking");
                super::retire_locked(&mut state, session);
            }
        }
    }
}
