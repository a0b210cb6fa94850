use std::{
    future::Future,
    sync::{Arc, Mutex, MutexGuard},
};

use futures::{future::BoxFuture, FutureExt};

/// Work scheduled by a request, run after its response was produced
///
/// All dependants of one request share the same collector.
/// Tasks run after teardown, so they must own every value they need.
#[derive(Clone, Default)]
pub struct BackgroundTasks(Arc<Mutex<Vec<BoxFuture<'static, ()>>>>);

impl std::fmt::Debug for BackgroundTasks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("BackgroundTasks").field(&self.len()).finish()
    }
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    fn tasks(&self) -> MutexGuard<'_, Vec<BoxFuture<'static, ()>>> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_task(&self, task: impl Future<Output = ()> + Send + 'static) {
        self.tasks().push(task.boxed());
    }

    pub fn len(&self) -> usize {
        self.tasks().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs all scheduled tasks in the order they were added
    pub async fn run(self) {
        let tasks = std::mem::take(&mut *self.tasks());
        tracing::debug!("Running {} background tasks", tasks.len());

        for task in tasks {
            task.await;
        }
    }
}
