use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;

use crate::adapters::csv_log::CsvChangeLog;
use crate::adapters::telegram::{self, Notifier, TelegramNotifier};
use crate::adapters::vendista::{StatusSource, VendistaClient};
use crate::app::config::AppConfig;
use crate::app::error::AppError;
use crate::domain::status::TerminalStatus;
use crate::domain::terminal_state::{Clock, Observation, StatusTracker, TimestampMs};

#[derive(Debug, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> TimestampMs {
        TimestampMs(Utc::now().timestamp_millis())
    }
}

/// Drives one polling round per tick: every tracked terminal is queried
/// concurrently, the joined results are applied to the tracker one at a time,
/// and the tracker's decisions feed the change log and the notifier.
pub struct TerminalMonitor<S, N, C> {
    source: Arc<S>,
    notifier: Arc<N>,
    clock: C,
    change_log: CsvChangeLog,
    tracker: StatusTracker,
    terminal_ids: Vec<i64>,
}

impl<S, N, C> TerminalMonitor<S, N, C>
where
    S: StatusSource,
    N: Notifier,
    C: Clock,
{
    pub fn new(
        source: Arc<S>,
        notifier: Arc<N>,
        clock: C,
        change_log: CsvChangeLog,
        terminal_ids: Vec<i64>,
    ) -> Self {
        Self {
            source,
            notifier,
            clock,
            change_log,
            tracker: StatusTracker::new(),
            terminal_ids,
        }
    }

    pub async fn run_round(&mut self) {
        let mut fetches = JoinSet::new();
        for terminal_id in self.terminal_ids.clone() {
            let source = Arc::clone(&self.source);
            fetches.spawn(async move { (terminal_id, source.get_status(terminal_id).await) });
        }

        let mut results = Vec::with_capacity(self.terminal_ids.len());
        while let Some(joined) = fetches.join_next().await {
            match joined {
                Ok((terminal_id, Ok(status))) => results.push((terminal_id, status)),
                Ok((terminal_id, Err(error))) => {
                    tracing::warn!(
                        terminal_id,
                        error = %error,
                        "terminal status fetch failed; skipped for this round"
                    );
                }
                Err(error) => {
                    tracing::warn!(error = %error, "status fetch task failed");
                }
            }
        }

        for (terminal_id, status) in results {
            self.apply_observation(terminal_id, status).await;
        }
    }

    async fn apply_observation(&mut self, terminal_id: i64, observed: TerminalStatus) {
        match self.tracker.observe(terminal_id, observed, &self.clock) {
            Observation::Unchanged => {
                tracing::debug!(terminal_id, status = observed.name(), "status unchanged");
            }
            Observation::Synchronized => {
                tracing::info!(
                    terminal_id,
                    status = observed.name(),
                    "initial terminal status synchronized"
                );
            }
            Observation::Changed(change) => {
                tracing::info!(
                    terminal_id,
                    status = change.record.status.name(),
                    offline_duration = change.record.offline_duration.as_deref().unwrap_or(""),
                    "terminal status changed"
                );

                if let Err(error) = self.change_log.append(&change.record) {
                    tracing::error!(terminal_id, error = %error, "failed to append change record");
                }

                if let Some(alert) = change.alert
                    && let Err(error) = self
                        .notifier
                        .notify_transition(terminal_id, alert.previous, alert.current, alert.back_online)
                        .await
                {
                    tracing::warn!(terminal_id, error = %error, "status notification failed");
                }
            }
        }
    }
}

pub fn run(config: AppConfig) -> Result<(), AppError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(AppError::runtime)?;

    runtime.block_on(run_async(config))
}

async fn run_async(config: AppConfig) -> Result<(), AppError> {
    let source = Arc::new(
        VendistaClient::new(
            &config.vendista_base_url,
            &config.vendista_login,
            &config.vendista_password,
        )
        .map_err(AppError::runtime)?,
    );

    // A credential problem at startup is fatal; later auth failures are
    // recovered per request inside the client.
    source.authenticate().await.map_err(AppError::runtime)?;
    tracing::info!("vendista authentication succeeded");

    let notifier = Arc::new(
        TelegramNotifier::new(
            &config.telegram_base_url,
            &config.telegram_token,
            &config.telegram_group_id,
        )
        .map_err(AppError::runtime)?,
    );

    let change_log = CsvChangeLog::new(&config.csv_path);

    let mut monitor = TerminalMonitor::new(
        Arc::clone(&source),
        Arc::clone(&notifier),
        SystemClock,
        change_log.clone(),
        config.terminal_ids.clone(),
    );

    let bot_task = tokio::spawn(telegram::run_command_loop(
        Arc::clone(&notifier),
        Arc::clone(&source),
        change_log,
    ));

    tracing::info!(
        terminal_ids = ?config.terminal_ids,
        poll_interval_secs = config.poll_interval_secs,
        "terminal monitoring started"
    );

    let mut ticker =
        tokio::time::interval(Duration::from_secs(config.poll_interval_secs.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // Awaited to completion before the next tick is armed, so
                // rounds never overlap even under slow upstream responses.
                monitor.run_round().await;
            }
            result = tokio::signal::ctrl_c() => {
                if let Err(error) = result {
                    tracing::warn!(error = %error, "shutdown signal listener failed");
                }
                tracing::info!("shutdown signal received; stopping monitor");
                break;
            }
        }
    }

    bot_task.abort();
    Ok(())
}
