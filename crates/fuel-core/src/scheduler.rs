//! Periodic refresh of one coordinator.
//!
//! The scheduler runs the coordinator's refresh on a fixed interval in a
//! spawned task. Transient source failures are logged and the loop goes on;
//! a configuration failure ends the loop, is kept as [`RefreshScheduler::halted`]
//! and is handed back through [`RefreshScheduler::stop`] or
//! [`RefreshScheduler::join`].

use crate::coordinator::{CoordinatorError, PriceCoordinator};
use arc_swap::ArcSwapOption;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::instrument;

#[derive(Debug, Error)]
pub enum SchedulerError {
	#[error("Scheduler already running")]
	AlreadyRunning,
	/// The loop ended because the station binding is unusable.
	#[error("Refresh loop halted: {0}")]
	Halted(CoordinatorError),
	#[error("Refresh task failed: {0}")]
	Task(String),
}

/// Drives a coordinator on a fixed period.
pub struct RefreshScheduler {
	coordinator: Arc<PriceCoordinator>,
	interval: Duration,
	is_running: Arc<AtomicBool>,
	halted: Arc<ArcSwapOption<CoordinatorError>>,
	stop_signal: Arc<Mutex<Option<mpsc::Sender<()>>>>,
	task: Mutex<Option<JoinHandle<Result<(), CoordinatorError>>>>,
}

impl RefreshScheduler {
	pub fn new(coordinator: Arc<PriceCoordinator>, interval: Duration) -> Self {
		Self {
			coordinator,
			interval,
			is_running: Arc::new(AtomicBool::new(false)),
			halted: Arc::new(ArcSwapOption::empty()),
			stop_signal: Arc::new(Mutex::new(None)),
			task: Mutex::new(None),
		}
	}

	/// Whether the refresh loop is currently alive.
	pub fn is_running(&self) -> bool {
		self.is_running.load(Ordering::SeqCst)
	}

	/// The configuration error that ended the loop, if any.
	pub fn halted(&self) -> Option<CoordinatorError> {
		self.halted.load_full().map(|e| e.as_ref().clone())
	}

	/// Starts the refresh loop. The first refresh happens one interval from now.
	///
	/// A scheduler halted by a configuration error cannot be started again.
	pub async fn start(&self) -> Result<(), SchedulerError> {
		if let Some(e) = self.halted() {
			// Reap the ended task so its result is not left behind.
			let _ = self.join().await;
			return Err(SchedulerError::Halted(e));
		}

		if self
			.is_running
			.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
			.is_err()
		{
			return Err(SchedulerError::AlreadyRunning);
		}

		let (stop_tx, stop_rx) = mpsc::channel(1);
		*self.stop_signal.lock().await = Some(stop_tx);

		let coordinator = self.coordinator.clone();
		let interval = self.interval;
		let is_running = self.is_running.clone();
		let halted = self.halted.clone();

		let handle = tokio::spawn(async move {
			let result = Self::refresh_loop(coordinator, interval, stop_rx).await;
			if let Err(e) = &result {
				halted.store(Some(Arc::new(e.clone())));
			}
			is_running.store(false, Ordering::SeqCst);
			result
		});
		*self.task.lock().await = Some(handle);

		Ok(())
	}

	/// Stops the loop and reports how it ended.
	///
	/// A refresh in flight is abandoned; the cache keeps its last committed
	/// state.
	pub async fn stop(&self) -> Result<(), SchedulerError> {
		if let Some(stop_tx) = self.stop_signal.lock().await.take() {
			let _ = stop_tx.send(()).await;
		}
		self.join().await
	}

	/// Waits for the loop to end without asking it to.
	pub async fn join(&self) -> Result<(), SchedulerError> {
		let Some(handle) = self.task.lock().await.take() else {
			return Ok(());
		};

		match handle.await {
			Ok(Ok(())) => Ok(()),
			Ok(Err(e)) => Err(SchedulerError::Halted(e)),
			Err(e) => Err(SchedulerError::Task(e.to_string())),
		}
	}

	#[instrument(skip_all, fields(entry_id = %coordinator.entry_id()))]
	async fn refresh_loop(
		coordinator: Arc<PriceCoordinator>,
		period: Duration,
		mut stop_rx: mpsc::Receiver<()>,
	) -> Result<(), CoordinatorError> {
		let mut interval = tokio::time::interval(period);
		// Skip missed ticks instead of bursting
		interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
		// The first refresh is run by whoever started us
		interval.tick().await;

		tracing::debug!(interval_secs = period.as_secs(), "Refresh loop started");

		loop {
			tokio::select! {
				_ = interval.tick() => {
					// A stop during the notify phase leaves the committed cache in
					// place but skips the remaining observers.
					let refreshed = tokio::select! {
						result = coordinator.refresh() => Some(result),
						_ = stop_rx.recv() => None,
					};

					match refreshed {
						None => break,
						Some(Ok(())) => {},
						Some(Err(e)) if e.is_configuration() => {
							tracing::error!(error = %e, "Station configuration rejected, stopping refresh");
							return Err(e);
						},
						Some(Err(e)) => {
							tracing::warn!(error = %e, "Price refresh failed, retrying next interval");
						},
					}
				}
				_ = stop_rx.recv() => break,
			}
		}

		tracing::debug!("Refresh loop stopped");
		Ok(())
	}
}
