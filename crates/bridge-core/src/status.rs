//! Periodic presence line on the chat platform showing voice server occupancy

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::BridgeResult;
use crate::platform::{ChatPlatform, VoiceServer};

pub fn status_line(count: usize, platform: &str) -> String {
    format!("{} users in {}", count, platform)
}

async fn occupancy(voice: &dyn VoiceServer) -> BridgeResult<usize> {
    let members = voice.channel_members().await?;
    Ok(members.iter().filter(|name| name.as_str() != voice.self_name()).count())
}

/// Update the chat platform status every `interval` until cancelled.
///
/// The status is only pushed when the line changes.
pub async fn run_status_updates(
    chat: Arc<dyn ChatPlatform>,
    voice: Arc<dyn VoiceServer>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last: Option<String> = None;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let count = match occupancy(voice.as_ref()).await {
            Ok(count) => count,
            Err(e) => {
                warn!(error = %e, "Failed to read voice server members for status");
                continue;
            }
        };
        let line = status_line(count, voice.display_name());
        if last.as_deref() == Some(line.as_str()) {
            continue;
        }
        match chat.set_status(&line).await {
            Ok(()) => {
                debug!(status = %line, "Status updated");
                last = Some(line);
            }
            Err(e) => warn!(error = %e, "Failed to update status"),
        }
    }

    debug!("Status updates stopped");
}
