use std::{borrow::Cow, time::Duration};

use tokio::task::JoinHandle;
use tracing::{debug, trace};

#[derive(Debug)]
pub struct TaskHandle {
    name: Cow<'static, str>,
    handle: JoinHandle<()>,
}

impl TaskHandle {
    pub fn new(name: impl Into<Cow<'static, str>>, handle: JoinHandle<()>) -> Self {
        Self {
            name: name.into(),
            handle,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Long-running background tasks owned by the server process.
#[derive(Default)]
pub struct TaskManager {
    tasks: Vec<TaskHandle>,
}

impl TaskManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, task: TaskHandle) {
        trace!(task = task.name(), "task registered");
        self.tasks.push(task);
    }

    pub fn push_handle(&mut self, name: impl Into<Cow<'static, str>>, handle: JoinHandle<()>) {
        self.push(TaskHandle::new(name, handle));
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait up to `grace` for each task to finish on its own, then abort it.
    /// Tasks are expected to watch the shared cancellation token.
    pub async fn shutdown_with_grace(self, grace: Duration) {
        for task in self.tasks {
            let TaskHandle { name, mut handle } = task;
            if grace.is_zero() {
                handle.abort();
                if let Err(err) = handle.await {
                    debug!(task = %name, ?err, "task join after abort failed");
                }
                continue;
            }

            let sleeper = tokio::time::sleep(grace);
            tokio::pin!(sleeper);
            tokio::select! {
                res = &mut handle => {
                    if let Err(err) = res {
                        debug!(task = %name, ?err, "task exited with error");
                    } else {
                        trace!(task = %name, "task finished");
                    }
                }
                _ = &mut sleeper => {
                    debug!(task = %name, "task missed shutdown grace; aborting");
                    handle.abort();
                    if let Err(err) = handle.await {
                        debug!(task = %name, ?err, "task join after abort failed");
                    }
                }
            }
        }
    }
}
