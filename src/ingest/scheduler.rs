//! Bounded admission for file pipelines
//!
//! One semaphore gates every file pipeline in the process. `submit` waits
//! for a permit before spawning, so callers feel backpressure, and the permit
//! travels inside the spawned future so it is released however the task ends.

use crate::error::{Error, Result};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Process-wide admission gate in front of the tokio runtime
#[derive(Clone)]
pub struct Scheduler {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    tasks: Arc<Mutex<JoinSet<()>>>,
}

impl Scheduler {
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            tasks: Arc::new(Mutex::new(JoinSet::new())),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Free admission slots
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Wait for a slot, then run `task` in the background while holding it
    pub async fn submit<F>(&self, task: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| Error::ConcurrencyInterrupted(e.to_string()))?;

        let mut tasks = lock(&self.tasks);
        while let Some(finished) = tasks.try_join_next() {
            log_task_result(finished);
        }
        tasks.spawn(async move {
            let _permit = permit;
            task.await;
        });
        debug!("Admitted task ({} slots free)", self.semaphore.available_permits());
        Ok(())
    }

    /// Stop admitting; pending and future `submit` calls fail
    pub fn close(&self) {
        self.semaphore.close();
    }

    /// Wait until every admitted task has finished
    pub async fn drain(&self) -> usize {
        drain_tasks(&self.tasks).await
    }
}

fn lock(tasks: &Mutex<JoinSet<()>>) -> MutexGuard<'_, JoinSet<()>> {
    tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn log_task_result(result: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        warn!("Background task ended abnormally: {}", e);
    }
}

/// Join every task in the set, including ones spawned while draining.
/// Returns how many tasks were joined.
pub(crate) async fn drain_tasks(tasks: &Mutex<JoinSet<()>>) -> usize {
    let mut joined = 0;
    loop {
        let mut current = std::mem::take(&mut *lock(tasks));
        if current.is_empty() {
            return joined;
        }
        while let Some(finished) = current.join_next().await {
            log_task_result(finished);
            joined += 1;
        }
    }
}
