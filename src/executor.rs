use std::thread::{self, JoinHandle};

use crate::error::{ExecutorError, ExecutorResult};

/// A fixed set of dedicated threads, one per event loop.
///
/// Threads are spawned once when the server starts and are never added or
/// retired afterwards. Every loop watches the shared running flag itself;
/// the executor only spawns and joins.
#[derive(Debug, Default)]
pub(crate) struct Executor {
    threads: Vec<JoinHandle<()>>,
}

impl Executor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns `task` on a new thread with the given name.
    ///
    /// # Errors
    /// Returns an error if the thread cannot be spawned.
    pub fn spawn<F>(&mut self, name: String, task: F) -> ExecutorResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = thread::Builder::new()
            .name(name)
            .spawn(task)
            .map_err(ExecutorError::ThreadSpawn)?;
        self.threads.push(handle);
        Ok(())
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    /// Waits for every thread to finish.
    ///
    /// All threads are joined even if some panicked; the first panic is
    /// reported.
    pub fn join(&mut self) -> ExecutorResult<()> {
        let mut result = Ok(());
        for handle in self.threads.drain(..) {
            let name = handle.thread().name().unwrap_or("unnamed").to_owned();
            if handle.join().is_err() {
                log::error!("thread {} panicked", name);
                if result.is_ok() {
                    result = Err(ExecutorError::Panicked(name));
                }
            }
        }
        result
    }
}
