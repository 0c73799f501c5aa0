//! Periodic sweep trigger.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::hub::HubEvent;

/// Post [`HubEvent::Sweep`] to the hub every `interval`.
///
/// The sweep itself runs on the hub, so it never interleaves with message
/// handling. Stops on cancellation or once the hub is gone.
pub fn spawn_janitor(
    hub: mpsc::Sender<HubEvent>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let _ = ticker.tick().await;

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    trace!("janitor tick");
                    if hub.send(HubEvent::Sweep).await.is_err() {
                        break;
                    }
                }
            }
        }
        debug!("janitor stopped");
    })
}
