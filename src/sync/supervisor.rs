//! Supervises the delta stream connection: dial, watch, back off, retry.

use std::{sync::Arc, time::Duration};

use rand::Rng;
use tokio::{sync::mpsc, time::sleep};
use tracing::{info, warn};

use crate::{
    api::SyncApi,
    sync::{
        SharedSync,
        snapshot::SnapshotLoader,
        stream::{ConnectionKey, Connector, Disconnect, StreamStatus, run_connection},
    },
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
/// Upper bound of the random jitter added to every retry delay.
const JITTER_MS: u64 = 250;

/// Keep one live connection for `key` until the outbound channel closes.
///
/// Dropped connections are retried with exponential backoff. After a
/// successful reconnect the snapshot loader re-runs before any new deltas
/// are folded, so updates missed during the gap are replayed from the
/// authoritative snapshot rather than assumed lost.
pub(crate) async fn run(
    core: SharedSync,
    api: Arc<dyn SyncApi>,
    connector: Arc<dyn Connector>,
    key: ConnectionKey,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
) {
    let mut delay = INITIAL_DELAY;
    let mut had_connection = false;

    loop {
        core.set_status(StreamStatus::Connecting);
        match connector.connect(&key).await {
            Ok(transport) => {
                delay = INITIAL_DELAY;

                if had_connection {
                    resync(&core, &api, &key).await;
                }

                core.set_status(StreamStatus::Open);
                info!(user_id = %key.user_id, project_id = ?key.project_id, "delta stream open");

                match run_connection(&core, transport, &mut outbound_rx).await {
                    Disconnect::Shutdown => {
                        core.set_status(StreamStatus::Closed);
                        return;
                    }
                    Disconnect::Lost => {
                        core.set_status(StreamStatus::Closed);
                        had_connection = true;
                        if backoff_or_shutdown(&mut outbound_rx, jittered(delay)).await {
                            return;
                        }
                        delay = (delay * 2).min(MAX_DELAY);
                    }
                }
            }
            Err(err) => {
                core.set_status(StreamStatus::Closed);
                warn!(error = %err, "delta stream connection attempt failed");
                if backoff_or_shutdown(&mut outbound_rx, jittered(delay)).await {
                    return;
                }
                delay = (delay * 2).min(MAX_DELAY);
            }
        }
    }
}

/// Re-run the snapshot loader after a reconnect, buffering deltas meanwhile.
async fn resync(core: &SharedSync, api: &Arc<dyn SyncApi>, key: &ConnectionKey) {
    let Some(project_id) = key.project_id.clone() else {
        return;
    };

    core.begin_load();
    match SnapshotLoader::new(api.clone()).load(&project_id).await {
        Ok(session) => {
            info!(project_id = %project_id, "replayed snapshot after reconnect");
            core.install_snapshot(session).await;
        }
        Err(err) => {
            warn!(project_id = %project_id, error = %err, "snapshot replay failed after reconnect");
            core.fail_load(err.to_string()).await;
        }
    }
    core.finish_load().await;
}

/// Sleep out the retry delay, returning `true` when the outbound channel
/// closed meanwhile and the supervisor should wind down instead of retrying.
async fn backoff_or_shutdown(
    outbound_rx: &mut mpsc::UnboundedReceiver<String>,
    delay: Duration,
) -> bool {
    tokio::select! {
        _ = sleep(delay) => false,
        closed = drain_until_closed(outbound_rx) => closed,
    }
}

/// Discard frames queued while no connection is open; resolves once the
/// channel closes. Sends while not open get no delivery feedback.
async fn drain_until_closed(outbound_rx: &mut mpsc::UnboundedReceiver<String>) -> bool {
    while let Some(_dropped) = outbound_rx.recv().await {
        warn!("dropping outbound frame: delta stream is not open");
    }
    true
}

fn jittered(delay: Duration) -> Duration {
    delay + Duration::from_millis(rand::rng().random_range(0..JITTER_MS))
}
