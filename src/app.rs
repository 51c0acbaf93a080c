use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::domain::{BatchResult, DateSpec, FetchOutcome, FetchStatus, FetchTask};
use crate::error::BatchError;
use crate::http::Fetcher;
use crate::store::StorageSink;
use crate::template::Templates;

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub max_parallel: usize,
    pub fetch_timeout: Option<Duration>,
    pub force: bool,
    pub dry_run: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            max_parallel: 1,
            fetch_timeout: None,
            force: false,
            dry_run: false,
        }
    }
}

/// Shared flag that stops a running batch from starting new tasks.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub fn plan(spec: &DateSpec, templates: &Templates) -> Vec<FetchTask> {
    templates.tasks(&spec.dates())
}

pub struct BatchFetcher<F: Fetcher, S: StorageSink> {
    fetcher: Arc<F>,
    sink: S,
    cancel: CancelToken,
}

impl<F: Fetcher + 'static, S: StorageSink> BatchFetcher<F, S> {
    pub fn new(fetcher: F, sink: S) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            sink,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Runs every task derived from `spec`. Per-task failures are recorded in
    /// the result; only invalid options abort the call.
    pub fn run(
        &self,
        spec: &DateSpec,
        templates: &Templates,
        options: &RunOptions,
        progress: &dyn ProgressSink,
    ) -> Result<BatchResult, BatchError> {
        if options.max_parallel == 0 {
            return Err(BatchError::InvalidConfig(
                "max_parallel must be at least 1".to_string(),
            ));
        }

        let tasks = plan(spec, templates);
        let total = tasks.len();
        let workers = options.max_parallel.min(total).max(1);
        info!(
            tasks = total,
            workers,
            dry_run = options.dry_run,
            "batch.start"
        );
        progress.event(ProgressEvent {
            message: format!("phase=Resolve; {total} tasks"),
            elapsed: None,
        });

        let started = Instant::now();
        let next = AtomicUsize::new(0);
        let locks = KeyLocks::default();
        let mut slots: Vec<Option<FetchOutcome>> = vec![None; total];
        let (tx, rx) = mpsc::channel::<(usize, FetchOutcome)>();

        thread::scope(|scope| {
            for _ in 0..workers {
                let tx = tx.clone();
                let tasks = &tasks;
                let next = &next;
                let locks = &locks;
                scope.spawn(move || {
                    loop {
                        if self.cancel.is_cancelled() {
                            break;
                        }
                        let index = next.fetch_add(1, Ordering::SeqCst);
                        let Some(task) = tasks.get(index) else {
                            break;
                        };
                        let outcome = self.process(task.clone(), options, locks);
                        if tx.send((index, outcome)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(tx);

            let mut done = 0usize;
            for (index, outcome) in rx {
                done += 1;
                progress.event(ProgressEvent {
                    message: format!(
                        "[{done}/{total}] {} {}",
                        outcome.status, outcome.task.storage_key
                    ),
                    elapsed: Some(started.elapsed()),
                });
                slots[index] = Some(outcome);
            }
        });

        let outcomes: Vec<FetchOutcome> = slots.into_iter().flatten().collect();
        let cancelled = self.cancel.is_cancelled() && outcomes.len() < total;
        let result = BatchResult {
            outcomes,
            cancelled,
        };
        info!(
            fetched = result.count(FetchStatus::Fetched),
            skipped = result.count(FetchStatus::Skipped),
            failed = result.count(FetchStatus::Failed),
            cancelled,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "batch.finish"
        );
        Ok(result)
    }

    fn process(&self, task: FetchTask, options: &RunOptions, locks: &KeyLocks) -> FetchOutcome {
        let _guard = locks.acquire(&task.storage_key);

        if let Err(err) = self.sink.check_key(&task.storage_key) {
            warn!(key = %task.storage_key, error = %err, "task.invalid_key");
            return FetchOutcome::failed(task, &err);
        }

        if !options.force && self.sink.exists(&task.storage_key) {
            debug!(key = %task.storage_key, "task.skip");
            return FetchOutcome::skipped(task);
        }
        if options.dry_run {
            return FetchOutcome::pending(task);
        }

        let bytes = match self.fetch(&task.remote_locator, options.fetch_timeout) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(url = %task.remote_locator, error = %err, "task.fetch_failed");
                return FetchOutcome::failed(task, &err);
            }
        };

        match self.sink.write(&task.storage_key, &bytes) {
            Ok(()) => {
                debug!(key = %task.storage_key, bytes = bytes.len(), "task.stored");
                FetchOutcome::fetched(task, bytes.len())
            }
            Err(err) => {
                warn!(key = %task.storage_key, error = %err, "task.write_failed");
                FetchOutcome::failed(task, &err)
            }
        }
    }

    fn fetch(&self, locator: &str, timeout: Option<Duration>) -> Result<Vec<u8>, BatchError> {
        let Some(timeout) = timeout else {
            return self.fetcher.fetch(locator);
        };

        // The fetch thread is detached on timeout; its late result is dropped
        // with the channel and never reaches the sink.
        let (tx, rx) = mpsc::sync_channel(1);
        let fetcher = Arc::clone(&self.fetcher);
        let locator = locator.to_string();
        thread::Builder::new()
            .name("dated-fetch-io".to_string())
            .spawn(move || {
                let _ = tx.send(fetcher.fetch(&locator));
            })
            .map_err(|err| BatchError::FetchHttp(err.to_string()))?;

        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(BatchError::Timeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(BatchError::FetchHttp(
                "fetch thread exited without a result".to_string(),
            )),
        }
    }
}

/// Serializes the exists/fetch/write sequence per storage key.
#[derive(Default)]
struct KeyLocks {
    held: Mutex<HashSet<String>>,
    released: Condvar,
}

impl KeyLocks {
    fn acquire(&self, key: &str) -> KeyGuard<'_> {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        while held.contains(key) {
            held = self
                .released
                .wait(held)
                .unwrap_or_else(PoisonError::into_inner);
        }
        held.insert(key.to_string());
        KeyGuard {
            locks: self,
            key: key.to_string(),
        }
    }
}

struct KeyGuard<'a> {
    locks: &'a KeyLocks,
    key: String,
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        let mut held = self
            .locks
            .held
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        held.remove(&self.key);
        self.locks.released.notify_all();
    }
}
