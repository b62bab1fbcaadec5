// src/backup_scheduler.rs - Periodic snapshots of the data root
use std::sync::{Arc, Weak};

use log::{debug, error, info, warn};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, Instant, MissedTickBehavior};

use crate::{BackupSchedule, FleetingError, RecordStorage, Result};

#[derive(Debug, Clone, Default)]
pub struct BackupSchedulerStatus {
    /// Whether the timer task is running
    pub is_running: bool,
    /// Time between scheduled backups
    pub period: Option<Duration>,
    /// Manual backups through this scheduler that wrote a snapshot
    pub backups_written: u64,
}

#[derive(Debug)]
pub enum BackupCommand {
    /// Back up immediately and report whether a snapshot was written
    BackupNow(oneshot::Sender<Result<bool>>),
    /// Stop the timer task
    Stop,
}

pub struct BackupScheduler {
    /// Weak reference to the storage, so the scheduler never keeps it alive
    storage: Weak<Mutex<RecordStorage>>,

    /// Channel to the timer task, present while it runs
    command_tx: Option<mpsc::Sender<BackupCommand>>,

    /// Handle to the timer task
    scheduler_task: Option<JoinHandle<()>>,

    status: BackupSchedulerStatus,
}

impl BackupScheduler {
    pub fn new(storage: &Arc<Mutex<RecordStorage>>) -> Self {
        Self {
            storage: Arc::downgrade(storage),
            command_tx: None,
            scheduler_task: None,
            status: BackupSchedulerStatus::default(),
        }
    }

    /// Replaces any running timer with one for `schedule`. A disabled
    /// schedule leaves the scheduler stopped.
    pub async fn reschedule(&mut self, schedule: BackupSchedule) -> Result<()> {
        self.stop().await?;

        let Some(period) = schedule.period() else {
            info!("Scheduled backups disabled");
            return Ok(());
        };

        let storage = self.storage.clone();
        if storage.upgrade().is_none() {
            error!("Storage dropped before the backup scheduler started");
            return Err(FleetingError::ApplicationError {
                message: "storage is no longer available".to_string(),
            });
        }

        let Some(first_tick) = Instant::now().checked_add(period) else {
            error!("Backup period {:?} is out of range", period);
            return Err(FleetingError::ConfigError {
                message: format!("backup period {:?} is too long", period),
            });
        };

        let (command_tx, mut command_rx) = mpsc::channel(10);
        let task = tokio::spawn(async move {
            let mut interval = time::interval_at(first_tick, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let Some(strong) = storage.upgrade() else {
                            warn!("Storage dropped, backup scheduler exiting");
                            break;
                        };
                        match run_backup(strong).await {
                            Ok(true) => info!("Scheduled backup completed"),
                            Ok(false) => debug!("Scheduled backup skipped, nothing changed"),
                            Err(e) => error!("Scheduled backup failed: {}", e),
                        }
                    }
                    cmd = command_rx.recv() => match cmd {
                        Some(BackupCommand::BackupNow(reply)) => {
                            let outcome = match storage.upgrade() {
                                Some(strong) => run_backup(strong).await,
                                None => Err(FleetingError::BackupFailed {
                                    message: "storage is no longer available".to_string(),
                                }),
                            };
                            if let Err(e) = &outcome {
                                error!("Manual backup failed: {}", e);
                            }
                            let _ = reply.send(outcome);
                        }
                        Some(BackupCommand::Stop) | None => {
                            info!("Backup scheduler stopping...");
                            break;
                        }
                    }
                }
            }
        });

        self.command_tx = Some(command_tx);
        self.scheduler_task = Some(task);
        self.status.is_running = true;
        self.status.period = Some(period);
        info!("Backup scheduler running every {:?}", period);
        Ok(())
    }

    /// Stop the timer task if it's running
    pub async fn stop(&mut self) -> Result<()> {
        let Some(task) = self.scheduler_task.take() else {
            debug!("Backup scheduler is not running");
            return Ok(());
        };

        if let Some(tx) = self.command_tx.take() {
            if let Err(e) = tx.send(BackupCommand::Stop).await {
                error!("Failed to send stop command to backup scheduler: {}", e);
            }
        }

        if let Err(e) = task.await {
            let message = format!("Failed to stop backup scheduler: {}", e);
            error!("{}", message);
            return Err(FleetingError::BackupFailed { message });
        }

        self.status.is_running = false;
        self.status.period = None;
        info!("Backup scheduler stopped");
        Ok(())
    }

    /// Back up immediately, whether or not the timer is running.
    pub async fn backup_now(&mut self) -> Result<bool> {
        let written = match &self.command_tx {
            Some(tx) => {
                let (reply_tx, reply_rx) = oneshot::channel();
                tx.send(BackupCommand::BackupNow(reply_tx))
                    .await
                    .map_err(|e| FleetingError::BackupFailed {
                        message: format!("Failed to send backup command: {}", e),
                    })?;
                reply_rx.await.map_err(|e| FleetingError::BackupFailed {
                    message: format!("Backup scheduler dropped the request: {}", e),
                })??
            }
            None => {
                let storage = self.storage.upgrade().ok_or_else(|| {
                    FleetingError::BackupFailed {
                        message: "storage is no longer available".to_string(),
                    }
                })?;
                run_backup(storage).await?
            }
        };

        if written {
            self.status.backups_written += 1;
        }
        Ok(written)
    }

    pub fn status(&self) -> BackupSchedulerStatus {
        self.status.clone()
    }
}

/// Snapshot work walks and copies the whole data root, so it runs on the
/// blocking pool while holding the storage lock.
async fn run_backup(storage: Arc<Mutex<RecordStorage>>) -> Result<bool> {
    tokio::task::spawn_blocking(move || storage.blocking_lock().backup_now())
        .await
        .map_err(|e| FleetingError::BackupFailed {
            message: format!("backup task failed: {}", e),
        })?
}
