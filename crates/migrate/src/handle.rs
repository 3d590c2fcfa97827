use hubferry_protocol::{JobState, MigrationJob};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::MigrateError;

/// Handle to a job launched with
/// [`TransferCoordinator::spawn`](crate::TransferCoordinator::spawn).
///
/// Launching returns immediately; status is polled separately. Dropping the
/// handle does not stop the job.
#[derive(Debug)]
pub struct JobHandle {
    id: Uuid,
    state: watch::Receiver<JobState>,
    task: JoinHandle<MigrationJob>,
}

impl JobHandle {
    pub(crate) fn new(id: Uuid, state: watch::Receiver<JobState>, task: JoinHandle<MigrationJob>) -> Self {
        Self { id, state, task }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Latest published state.
    pub fn state(&self) -> JobState {
        *self.state.borrow()
    }

    /// Waits for the next state change. `None` once the job has ended and
    /// no further change can arrive.
    pub async fn changed(&mut self) -> Option<JobState> {
        self.state.changed().await.ok()?;
        Some(*self.state.borrow_and_update())
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for the job and returns its final record.
    pub async fn wait(self) -> Result<MigrationJob, MigrateError> {
        self.task
            .await
            .map_err(|e| MigrateError::Task(format!("job {}: {e}", self.id)))
    }
}
