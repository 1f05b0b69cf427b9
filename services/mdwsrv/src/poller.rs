//! Poll loop
//!
//! connect → read the profile every `interval` → close on link loss →
//! cool down → reconnect. Transport trouble never ends the loop; only a
//! configuration error or the shutdown token does. Shutdown is observed
//! between cycles, never inside one.

use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{MdwSettings, SerialParams};
use crate::transport::Connector;
use errors::{MdwErrorTrait, MdwResult};
use register_map::{ReadOrchestrator, ReadResult};

/// Loop timing and link-loss policy
#[derive(Debug, Clone, PartialEq)]
pub struct PollerOptions {
    pub profile: String,
    pub interval: Duration,
    pub reconnect_cooldown: Duration,
    /// Consecutive all-unavailable cycles treated as a lost link
    pub max_failed_cycles: u32,
}

impl PollerOptions {
    pub fn from_settings(settings: &MdwSettings) -> Self {
        Self {
            profile: settings.read.profile.clone(),
            interval: Duration::from_millis(settings.read.interval_ms),
            reconnect_cooldown: Duration::from_millis(settings.read.reconnect_cooldown_ms),
            max_failed_cycles: settings.read.max_failed_cycles.max(1),
        }
    }
}

/// Counters returned when the loop stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollStats {
    /// Completed profile reads
    pub cycles: u64,
    /// Links opened
    pub sessions: u64,
    /// Connection attempts that failed
    pub connect_failures: u64,
}

enum SessionEnd {
    Shutdown,
    LinkLost,
}

pub struct Poller<C: Connector> {
    connector: C,
    params: SerialParams,
    orchestrator: ReadOrchestrator,
    options: PollerOptions,
}

impl<C: Connector> Poller<C> {
    pub fn new(
        connector: C,
        params: SerialParams,
        orchestrator: ReadOrchestrator,
        options: PollerOptions,
    ) -> Self {
        Self {
            connector,
            params,
            orchestrator,
            options,
        }
    }

    /// Run until `token` is cancelled, handing every cycle to `on_result`
    pub async fn run<F>(&mut self, token: CancellationToken, mut on_result: F) -> MdwResult<PollStats>
    where
        F: FnMut(&ReadResult) + Send,
    {
        let span = self.orchestrator.profile_span(&self.options.profile)?;
        info!(
            "Polling profile '{}' every {:?} on {}",
            self.options.profile, self.options.interval, self.params
        );
        debug!("Profile '{}' span: {}", self.options.profile, span);

        let mut stats = PollStats::default();

        while !token.is_cancelled() {
            match self.connector.connect(&self.params).await {
                Ok(mut link) => {
                    stats.sessions += 1;
                    let outcome = self.run_session(&mut link, &token, &mut on_result, &mut stats).await;
                    self.connector.close(link).await;
                    match outcome? {
                        SessionEnd::Shutdown => break,
                        SessionEnd::LinkLost => {},
                    }
                },
                Err(e) if !e.is_retryable() => {
                    error!("Cannot open {}: {}", self.params, e);
                    return Err(e);
                },
                Err(e) => {
                    stats.connect_failures += 1;
                    warn!("Connection to {} failed: {}", self.params, e);
                },
            }

            info!("Reconnecting in {:?}", self.options.reconnect_cooldown);
            tokio::select! {
                _ = tokio::time::sleep(self.options.reconnect_cooldown) => {},
                _ = token.cancelled() => break,
            }
        }

        info!(
            "Poll loop stopped after {} cycles ({} sessions)",
            stats.cycles, stats.sessions
        );
        Ok(stats)
    }

    async fn run_session<F>(
        &mut self,
        link: &mut C::Link,
        token: &CancellationToken,
        on_result: &mut F,
        stats: &mut PollStats,
    ) -> MdwResult<SessionEnd>
    where
        F: FnMut(&ReadResult) + Send,
    {
        let mut failed_cycles = 0u32;

        loop {
            if token.is_cancelled() {
                return Ok(SessionEnd::Shutdown);
            }

            let result = self
                .orchestrator
                .read_profile(link, &self.options.profile)
                .await?;
            stats.cycles += 1;
            on_result(&result);

            if result.all_unavailable() {
                failed_cycles += 1;
                if failed_cycles >= self.options.max_failed_cycles {
                    warn!(
                        "No variable readable for {} consecutive cycles, closing link",
                        failed_cycles
                    );
                    return Ok(SessionEnd::LinkLost);
                }
            } else {
                failed_cycles = 0;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.options.interval) => {},
                _ = token.cancelled() => return Ok(SessionEnd::Shutdown),
            }
        }
    }
}
