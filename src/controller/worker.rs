//! Shared run loop for cache-driven controllers.
//!
//! A controller waits for every informer cache it reads, then resyncs on a
//! fixed period until shutdown. The resync closure only reads local caches.

use std::time::Duration;

use futures::future::{BoxFuture, try_join_all};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::{ControllerName, Result};
use crate::informers::CacheSyncError;
use crate::shutdown::Shutdown;

/// Default resync period for controllers without their own setting
pub(crate) const DEFAULT_RESYNC: Duration = Duration::from_secs(300);

pub(crate) type CacheWait = BoxFuture<'static, std::result::Result<(), CacheSyncError>>;

pub(crate) async fn run_sync_loop<F>(
    name: ControllerName,
    caches: Vec<CacheWait>,
    resync: Duration,
    shutdown: Shutdown,
    mut resync_fn: F,
) -> Result<()>
where
    F: FnMut() + Send,
{
    info!(controller = %name, caches = caches.len(), "Waiting for informer caches to sync");
    tokio::select! {
        _ = shutdown.wait() => {
            info!(controller = %name, "Shutdown requested before caches synced");
            return Ok(());
        }
        synced = try_join_all(caches) => {
            synced?;
        }
    }
    info!(controller = %name, "Caches synced, controller running");

    let mut ticker = tokio::time::interval(resync);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = shutdown.wait() => break,
            _ = ticker.tick() => {
                debug!(controller = %name, "Resync");
                resync_fn();
            }
        }
    }

    info!(controller = %name, "Controller stopped");
    Ok(())
}
