use std::time::Duration;

/// Terminal state of a task within one run. There is no retry and no
/// partial-completion state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Done,
    Failed,
    /// Not executed because a dependency failed.
    Skipped,
}

#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub name: &'static str,
    pub status: TaskStatus,
    pub duration: Duration,
}

/// Per-run diagnostics collected by the runner.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub outcomes: Vec<TaskOutcome>,
}

impl RunReport {
    pub(crate) fn push(&mut self, name: &'static str, status: TaskStatus, duration: Duration) {
        self.outcomes.push(TaskOutcome {
            name,
            status,
            duration,
        });
    }

    pub fn status_of(&self, name: &str) -> Option<TaskStatus> {
        self.outcomes
            .iter()
            .find(|outcome| outcome.name == name)
            .map(|outcome| outcome.status)
    }

    pub fn failures(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.status == TaskStatus::Failed)
            .count()
    }

    pub fn is_success(&self) -> bool {
        self.failures() == 0
    }

    /// Log a one-line summary per non-successful task, then the totals.
    pub fn summarize(&self) {
        for outcome in &self.outcomes {
            match outcome.status {
                TaskStatus::Done => {}
                TaskStatus::Failed => tracing::warn!(task = outcome.name, "failed"),
                TaskStatus::Skipped => tracing::warn!(task = outcome.name, "skipped"),
            }
        }

        let done = self
            .outcomes
            .iter()
            .filter(|outcome| outcome.status == TaskStatus::Done)
            .count();

        tracing::info!(
            "{done} done, {} failed, {} skipped",
            self.failures(),
            self.outcomes.len() - done - self.failures(),
        );
    }
}
