//! Long-running loop: run a cycle, sleep a jittered interval, repeat.
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::future::Future;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::anilist::AnimeSource;
use crate::config::RunConfig;
use crate::db::AnimeStore;
use crate::updater;

/// `base` plus a uniform jitter in `[0, base * jitter_fraction)`.
pub fn next_delay<R: Rng + ?Sized>(base: Duration, jitter_fraction: f64, rng: &mut R) -> Duration {
    if !(jitter_fraction > 0.0) {
        return base;
    }
    let max_jitter = Duration::try_from_secs_f64(base.as_secs_f64() * jitter_fraction.min(1.0))
        .unwrap_or(Duration::MAX);
    let max_nanos = u64::try_from(max_jitter.as_nanos()).unwrap_or(u64::MAX);
    if max_nanos == 0 {
        return base;
    }
    base.saturating_add(Duration::from_nanos(rng.gen_range(0..max_nanos)))
}

/// Run cycles until `shutdown` resolves. Cycle failures are logged and the
/// loop carries on with the next tick.
pub async fn run<F>(source: &dyn AnimeSource, store: &dyn AnimeStore, cfg: &RunConfig, shutdown: F)
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut rng = StdRng::from_entropy();

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                warn!("shutdown requested during update cycle");
                return;
            }
            res = updater::run_cycle(source, store, cfg.pages_per_cycle) => match res {
                Ok(report) => info!(
                    pages = report.pages,
                    upserted = report.upserted,
                    failed = report.failed,
                    "data update tick ended"
                ),
                Err(err) => error!(?err, "data update tick failed; retrying on next tick"),
            },
        }

        let delay = next_delay(cfg.run_every, cfg.jitter_fraction, &mut rng);
        info!(minutes = delay.as_secs() / 60, "waiting for next tick");

        tokio::select! {
            _ = &mut shutdown => {
                info!("shutdown requested");
                return;
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
