// =============================================================================
// Bot Job Queue (C13)
// =============================================================================
//
// `JobQueue` is the enqueue-once-per-bot dedup abstraction (§4.13):
// idempotent job id `"bot-<botId>"`, add-if-absent, report `queued=false`
// when already scheduled, remove-then-add when terminal. `InMemoryQueue` is
// the default in-process implementation; `PollQueue` models the no-external-
// queue mode that always reports `queued=false`. Both grounded on the
// teacher's `AppState` `RwLock<HashMap<_,_>>` idiom.
// =============================================================================

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Waiting,
    Active,
    Delayed,
    Completed,
    Failed,
}

impl JobState {
    fn is_scheduled(self) -> bool {
        matches!(self, JobState::Waiting | JobState::Active | JobState::Delayed)
    }

    fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub bot_id: String,
    pub state: JobState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnqueueOutcome {
    pub job_id: String,
    pub queued: bool,
}

fn job_id(bot_id: &str) -> String {
    format!("bot-{bot_id}")
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn get_job(&self, id: &str) -> Option<Job>;
    async fn add(&self, id: &str, bot_id: &str) -> Result<(), String>;

    /// §4.13 enqueue semantics, default-implemented over `get_job`/`add` so
    /// every concrete queue shares one dedup algorithm.
    async fn enqueue_run(&self, bot_id: &str) -> EnqueueOutcome {
        let id = job_id(bot_id);
        match self.get_job(&id).await {
            None => match self.add(&id, bot_id).await {
                Ok(()) => EnqueueOutcome { job_id: id, queued: true },
                Err(e) if e == "duplicate id" => EnqueueOutcome { job_id: id, queued: false },
                Err(_) => EnqueueOutcome { job_id: id, queued: true },
            },
            Some(job) if job.state.is_scheduled() => EnqueueOutcome { job_id: id, queued: false },
            Some(job) if job.state.is_terminal() => {
                let _ = self.remove(&id).await;
                let _ = self.add(&id, bot_id).await;
                EnqueueOutcome { job_id: id, queued: true }
            }
            Some(_) => EnqueueOutcome { job_id: id, queued: false },
        }
    }

    async fn remove(&self, id: &str) -> Result<(), String>;
}

/// Default in-process queue backing `enqueue_run`.
#[derive(Default)]
pub struct InMemoryQueue {
    jobs: RwLock<HashMap<String, Job>>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test/operational helper: advance a job's state (e.g. a worker
    /// marking `active` after picking it up, or `completed` when done).
    pub fn set_state(&self, id: &str, state: JobState) {
        if let Some(job) = self.jobs.write().get_mut(id) {
            job.state = state;
        }
    }
}

#[async_trait]
impl JobQueue for InMemoryQueue {
    async fn get_job(&self, id: &str) -> Option<Job> {
        self.jobs.read().get(id).cloned()
    }

    async fn add(&self, id: &str, bot_id: &str) -> Result<(), String> {
        let mut jobs = self.jobs.write();
        if jobs.contains_key(id) {
            return Err("duplicate id".to_string());
        }
        jobs.insert(id.to_string(), Job { id: id.to_string(), bot_id: bot_id.to_string(), state: JobState::Waiting });
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<(), String> {
        self.jobs.write().remove(id);
        Ok(())
    }
}

/// No-external-queue mode: every call accepts and reports `queued=false`
/// with the same id shape (§4.13 "poll mode").
#[derive(Default)]
pub struct PollQueue;

#[async_trait]
impl JobQueue for PollQueue {
    async fn get_job(&self, _id: &str) -> Option<Job> {
        None
    }

    async fn add(&self, _id: &str, _bot_id: &str) -> Result<(), String> {
        Ok(())
    }

    async fn remove(&self, _id: &str) -> Result<(), String> {
        Ok(())
    }

    async fn enqueue_run(&self, bot_id: &str) -> EnqueueOutcome {
        EnqueueOutcome { job_id: job_id(bot_id), queued: false }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn s5_first_enqueue_queues_second_does_not() {
        let queue = InMemoryQueue::new();
        let first = queue.enqueue_run("bot1").await;
        assert_eq!(first.job_id, "bot-bot1");
        assert!(first.queued);

        queue.set_state(&first.job_id, JobState::Active);
        let second = queue.enqueue_run("bot1").await;
        assert!(!second.queued);
    }

    #[tokio::test]
    async fn terminal_job_is_requeued() {
        let queue = InMemoryQueue::new();
        let first = queue.enqueue_run("bot1").await;
        queue.set_state(&first.job_id, JobState::Completed);
        let second = queue.enqueue_run("bot1").await;
        assert!(second.queued);
    }

    #[tokio::test]
    async fn poll_queue_always_reports_not_queued() {
        let queue = PollQueue;
        let result = queue.enqueue_run("bot1").await;
        assert!(!result.queued);
        assert_eq!(result.job_id, "bot-bot1");
    }
}
