//! Background session started a fixed delay after the game launches.

use std::thread::{self, JoinHandle};

use tracing::{info, warn};

use super::{PatchSessionResult, run_patch_session};
use crate::config::PatchConfig;

/// Run a session for `pid` on a background thread after `config.launch_delay`.
///
/// Sessions that abort because the main module is not loaded yet are retried
/// up to `config.retry_attempts` times.
pub fn spawn_delayed_session(pid: u32, config: PatchConfig) -> JoinHandle<PatchSessionResult> {
    spawn_delayed_with(pid, config, run_patch_session)
}

/// Like [`spawn_delayed_session`] with a custom session runner
pub fn spawn_delayed_with<F>(
    pid: u32,
    config: PatchConfig,
    run: F,
) -> JoinHandle<PatchSessionResult>
where
    F: Fn(u32, PatchConfig) -> PatchSessionResult + Send + 'static,
{
    thread::spawn(move || {
        let delay = config.launch_delay();
        if !delay.is_zero() {
            info!("Waiting {}s for process {} to load", delay.as_secs(), pid);
            thread::sleep(delay);
        }
        run_with_retry(pid, &config, run)
    })
}

fn run_with_retry<F>(pid: u32, config: &PatchConfig, run: F) -> PatchSessionResult
where
    F: Fn(u32, PatchConfig) -> PatchSessionResult,
{
    let max_attempts = config.retry_attempts.saturating_add(1);
    let mut attempt = 1;
    loop {
        let result = run(pid, config.clone());
        if !result.is_retryable() || attempt >= max_attempts {
            return result;
        }

        warn!(
            "Session for process {} not ready ({}), retrying in {}s (attempt {}/{})",
            pid,
            result
                .aborted
                .as_ref()
                .map_or("unknown reason", |a| a.message.as_str()),
            config.retry_delay_secs,
            attempt,
            max_attempts
        );
        attempt += 1;
        thread::sleep(config.retry_delay());
    }
}
