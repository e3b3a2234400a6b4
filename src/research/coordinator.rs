use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{Id, JoinSet};

use crate::research::subagent::SubagentRegistry;
use crate::types::{AppError, ResearchTask, Result};

/// Runs a batch of tasks to completion.
///
/// `Err` means the coordinator itself broke; individual task failures are
/// recorded on the tasks and never surface here.
#[async_trait]
pub trait TaskCoordinator: Send + Sync {
    async fn execute(
        &self,
        tasks: Vec<ResearchTask>,
        max_concurrent: usize,
    ) -> Result<HashMap<String, ResearchTask>>;
}

/// Semaphore-bounded fan-out over a [`JoinSet`].
///
/// All tasks are spawned at once and each waits for a permit before it
/// starts, so at most `max_concurrent` subagents run at a time. A task that
/// errors or panics ends `Failed`; its siblings are unaffected. `execute`
/// returns only after every task is terminal.
pub struct ConcurrencyCoordinator {
    registry: Arc<SubagentRegistry>,
}

impl ConcurrencyCoordinator {
    pub fn new(registry: Arc<SubagentRegistry>) -> Self {
        Self { registry }
    }
}

async fn run_task(
    mut task: ResearchTask,
    registry: Arc<SubagentRegistry>,
    semaphore: Arc<Semaphore>,
) -> ResearchTask {
    let _permit = match semaphore.acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => {
            let _ = task.start();
            let _ = task.fail("concurrency limiter closed before the task could start");
            return task;
        }
    };

    if let Err(e) = task.start() {
        tracing::warn!(task_id = %task.id, error = %e, "Task could not be started");
        return task;
    }
    tracing::info!(task_id = %task.id, task_type = %task.task_type, "Task started");

    let outcome = match registry.get(task.task_type) {
        Some(agent) => agent.execute(&task).await,
        None => Err(AppError::TaskFailure(format!(
            "no subagent registered for {} tasks",
            task.task_type
        ))),
    };

    let recorded = match outcome {
        Ok(report) => task.complete(report),
        Err(e) => {
            tracing::warn!(task_id = %task.id, task_type = %task.task_type, error = %e, "Task failed");
            task.fail(e.to_string())
        }
    };
    if let Err(e) = recorded {
        tracing::warn!(task_id = %task.id, error = %e, "Task result could not be recorded");
    }

    tracing::info!(
        task_id = %task.id,
        status = ?task.status(),
        duration_ms = task.duration_ms().unwrap_or(0),
        "Task finished"
    );
    task
}

#[async_trait]
impl TaskCoordinator for ConcurrencyCoordinator {
    async fn execute(
        &self,
        tasks: Vec<ResearchTask>,
        max_concurrent: usize,
    ) -> Result<HashMap<String, ResearchTask>> {
        if max_concurrent == 0 {
            return Err(AppError::Coordinator(
                "max_concurrent must be at least 1".to_string(),
            ));
        }

        let semaphore = Arc::new(Semaphore::new(max_concurrent));
        let mut set = JoinSet::new();
        // Pending copies, used to record a failure when a task panics
        let mut pending: HashMap<Id, ResearchTask> = HashMap::new();

        for task in tasks {
            let snapshot = task.clone();
            let handle = set.spawn(run_task(
                task,
                Arc::clone(&self.registry),
                Arc::clone(&semaphore),
            ));
            pending.insert(handle.id(), snapshot);
        }

        let mut results = HashMap::with_capacity(pending.len());
        while let Some(joined) = set.join_next_with_id().await {
            match joined {
                Ok((id, task)) => {
                    pending.remove(&id);
                    results.insert(task.id.clone(), task);
                }
                Err(join_error) => {
                    let Some(mut task) = pending.remove(&join_error.id()) else {
                        return Err(AppError::Coordinator(format!(
                            "lost track of a worker: {}",
                            join_error
                        )));
                    };
                    let reason = if join_error.is_panic() {
                        "subagent panicked"
                    } else {
                        "subagent was cancelled"
                    };
                    tracing::warn!(task_id = %task.id, task_type = %task.task_type, "{}", reason);
                    let _ = task.start();
                    let _ = task.fail(reason);
                    results.insert(task.id.clone(), task);
                }
            }
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::research::subagent::Subagent;
    use crate::types::{SubagentReport, TaskStatus, TaskType};

    struct Echo(TaskType);

    #[async_trait]
    impl Subagent for Echo {
        fn task_type(&self) -> TaskType {
            self.0
        }

        async fn execute(&self, task: &ResearchTask) -> Result<SubagentReport> {
            Ok(SubagentReport {
                insights: vec![format!("{} insight", task.task_type)],
                ..Default::default()
            })
        }
    }

    #[tokio::test]
    async fn test_zero_concurrency_is_a_coordinator_fault() {
        let coordinator = ConcurrencyCoordinator::new(Arc::new(SubagentRegistry::new()));
        let result = coordinator.execute(vec![], 0).await;
        assert!(matches!(result, Err(AppError::Coordinator(_))));
    }

    #[tokio::test]
    async fn test_missing_subagent_fails_task() {
        let registry = SubagentRegistry::new().with_override(Arc::new(Echo(TaskType::Fundamental)));
        let coordinator = ConcurrencyCoordinator::new(Arc::new(registry));
        let tasks = vec![
            ResearchTask::new("s-fundamental", TaskType::Fundamental, "Acme", vec![]),
            ResearchTask::new("s-sentiment", TaskType::Sentiment, "Acme", vec![]),
        ];

        let results = coordinator.execute(tasks, 2).await.unwrap();
        assert_eq!(results["s-fundamental"].status(), TaskStatus::Completed);
        assert_eq!(results["s-sentiment"].status(), TaskStatus::Failed);
        assert!(results["s-sentiment"].error().unwrap().contains("no subagent"));
    }
}
