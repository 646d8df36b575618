//! Periodic updater on a dedicated OS thread

use crate::capability::ProcessDataUpdater;
use errors::{DriverError, DriverResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Run `updater.update()` every `interval` until `stop` is raised.
///
/// A failed update is logged and retried on the next tick; readers keep
/// the last good data meanwhile. The thread hands the updater back on join
/// so the buffer it owns outlives the loop.
pub fn spawn_update_task(
    mut updater: Box<dyn ProcessDataUpdater>,
    interval: Duration,
    stop: Arc<AtomicBool>,
) -> DriverResult<JoinHandle<Box<dyn ProcessDataUpdater>>> {
    let name = "process-data-updater".to_string();
    std::thread::Builder::new()
        .name(name.clone())
        .spawn(move || {
            info!(
                "Updater started for {} every {:?}",
                updater.describe(),
                interval
            );
            let mut failures: u64 = 0;
            while !stop.load(Ordering::Acquire) {
                let started = Instant::now();
                match updater.update() {
                    Ok(()) => {
                        if failures > 0 {
                            info!("Updater recovered after {} failed cycles", failures);
                            failures = 0;
                        }
                    },
                    Err(e) => {
                        failures += 1;
                        warn!("Update failed [{}]: {}", e.error_code(), e);
                    },
                }
                let elapsed = started.elapsed();
                if elapsed > interval {
                    debug!("Update took {:?}, longer than {:?}", elapsed, interval);
                } else {
                    std::thread::sleep(interval - elapsed);
                }
            }
            info!("Updater stopped for {}", updater.describe());
            updater
        })
        .map_err(|e| DriverError::config(format!("failed to spawn {name}: {e}")))
}
