/// Bounded worker pool for independent per-iteration and per-layer tasks
use crate::error::{PipelineError, Result};
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Rayon pool built once and reused by every stage of a pipeline.
pub struct ParallelExecutor {
    pool: ThreadPool,
    threads: usize,
}

/// Progress reported by a worker back to the gathering thread.
enum TaskEvent<R> {
    Started {
        index: usize,
        at: Instant,
    },
    Finished {
        index: usize,
        elapsed: Duration,
        outcome: thread::Result<Result<R>>,
    },
}

impl ParallelExecutor {
    /// Build a pool with `threads` workers, or one per hardware thread when `None`.
    pub fn new(threads: Option<usize>) -> Result<Self> {
        let threads = threads
            .filter(|t| *t > 0)
            .unwrap_or_else(|| std::thread::available_parallelism().map_or(1, |n| n.get()));

        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("vector-field-worker-{i}"))
            .build()
            .map_err(|e| PipelineError::WorkerFailure {
                index: 0,
                reason: format!("failed to build worker pool: {e}"),
            })?;

        debug!("Worker pool ready with {} threads", threads);
        Ok(Self { pool, threads })
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Run `task` for every item and gather results in input order.
    ///
    /// Each item is moved into its own pool job and tasks share nothing but
    /// `task` itself. The first task that errors, panics or stays running
    /// past `deadline` fails the whole call; jobs that have not started yet
    /// are skipped and no partial results are returned. An overrunning task
    /// is abandoned: the call returns at its deadline and the worker thread
    /// finishes the job on its own.
    pub fn map_independent<T, R, F>(
        &self,
        stage: &str,
        items: Vec<T>,
        deadline: Duration,
        task: F,
    ) -> Result<Vec<R>>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(usize, &T) -> Result<R> + Send + Sync + 'static,
    {
        let count = items.len();
        if count == 0 {
            return Ok(Vec::new());
        }

        let task = Arc::new(task);
        let aborted = Arc::new(AtomicBool::new(false));
        let (sender, receiver) = mpsc::channel::<TaskEvent<R>>();
        let started = Instant::now();

        for (index, item) in items.into_iter().enumerate() {
            let task = Arc::clone(&task);
            let aborted = Arc::clone(&aborted);
            let sender = sender.clone();
            self.pool.spawn(move || {
                if aborted.load(Ordering::Acquire) {
                    return;
                }
                let at = Instant::now();
                // the receiver is gone once the call has failed
                let _ = sender.send(TaskEvent::Started { index, at });
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| task(index, &item)));
                let _ = sender.send(TaskEvent::Finished {
                    index,
                    elapsed: at.elapsed(),
                    outcome,
                });
            });
        }
        drop(sender);

        let mut results: Vec<Option<R>> = (0..count).map(|_| None).collect();
        let mut running: HashMap<usize, Instant> = HashMap::new();
        let mut finished = 0;

        while finished < count {
            let earliest = running
                .iter()
                .min_by_key(|(_, at)| **at)
                .map(|(index, at)| (*index, *at));

            let event = match earliest {
                Some((index, at)) => {
                    let budget = deadline.saturating_sub(at.elapsed());
                    match receiver.recv_timeout(budget) {
                        Ok(event) => event,
                        Err(RecvTimeoutError::Timeout) => {
                            let failure = PipelineError::WorkerTimeout {
                                index,
                                elapsed: at.elapsed(),
                                deadline,
                            };
                            return Err(abort(stage, &aborted, failure));
                        }
                        Err(RecvTimeoutError::Disconnected) => {
                            return Err(abort(stage, &aborted, lost_worker(index)));
                        }
                    }
                }
                None => match receiver.recv() {
                    Ok(event) => event,
                    Err(_) => return Err(abort(stage, &aborted, lost_worker(0))),
                },
            };

            match event {
                TaskEvent::Started { index, at } => {
                    running.insert(index, at);
                }
                TaskEvent::Finished {
                    index,
                    elapsed,
                    outcome,
                } => {
                    running.remove(&index);
                    finished += 1;
                    let failure = match outcome {
                        Ok(Ok(value)) if elapsed <= deadline => {
                            results[index] = Some(value);
                            continue;
                        }
                        Ok(Ok(_)) => PipelineError::WorkerTimeout {
                            index,
                            elapsed,
                            deadline,
                        },
                        Ok(Err(err)) => PipelineError::WorkerFailure {
                            index,
                            reason: err.to_string(),
                        },
                        Err(payload) => PipelineError::WorkerFailure {
                            index,
                            reason: panic_message(payload),
                        },
                    };
                    return Err(abort(stage, &aborted, failure));
                }
            }
        }

        debug!(
            "{}: {} tasks finished in {:?}",
            stage,
            count,
            started.elapsed()
        );
        results
            .into_iter()
            .collect::<Option<Vec<R>>>()
            .ok_or_else(|| lost_worker(0))
    }
}

/// Stop queued jobs from starting and report the failure that caused it.
fn abort(stage: &str, aborted: &AtomicBool, failure: PipelineError) -> PipelineError {
    aborted.store(true, Ordering::Release);
    warn!("{} aborted: {}", stage, failure);
    failure
}

fn lost_worker(index: usize) -> PipelineError {
    PipelineError::WorkerFailure {
        index,
        reason: "worker exited without reporting a result".to_string(),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {message}")
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::shape;
    use std::sync::atomic::AtomicUsize;

    fn executor() -> ParallelExecutor {
        ParallelExecutor::new(Some(4)).unwrap()
    }

    #[test]
    fn results_keep_input_order() {
        let items: Vec<u64> = (0..64).collect();
        let results = executor()
            .map_independent("square", items, Duration::from_secs(5), |index, item| {
                // later items finish first
                std::thread::sleep(Duration::from_micros(64 - *item));
                Ok((index, item * item))
            })
            .unwrap();
        for (i, (index, square)) in results.into_iter().enumerate() {
            assert_eq!(index, i);
            assert_eq!(square, (i * i) as u64);
        }
    }

    #[test]
    fn task_error_fails_the_call() {
        let items: Vec<usize> = (0..16).collect();
        let result = executor().map_independent("fail", items, Duration::from_secs(5), |_, item| {
            if *item == 9 {
                Err(shape("bad item"))
            } else {
                Ok(*item)
            }
        });
        match result {
            Err(PipelineError::WorkerFailure { index, reason }) => {
                assert_eq!(index, 9);
                assert!(reason.contains("bad item"));
            }
            other => panic!("expected worker failure, got {other:?}"),
        }
    }

    #[test]
    fn panic_is_reported_as_failure() {
        let items = vec![1, 2, 3];
        let result = executor().map_independent("panic", items, Duration::from_secs(5), |_, item| {
            if *item == 2 {
                panic!("boom");
            }
            Ok(*item)
        });
        assert!(matches!(
            result,
            Err(PipelineError::WorkerFailure { index: 1, .. })
        ));
    }

    #[test]
    fn overrunning_task_times_out() {
        let items = vec![0u8; 2];
        let result = executor().map_independent("slow", items, Duration::from_millis(1), |_, _| {
            std::thread::sleep(Duration::from_millis(30));
            Ok(())
        });
        assert!(matches!(result, Err(PipelineError::WorkerTimeout { .. })));
    }

    #[test]
    fn stuck_task_returns_control_at_the_deadline() {
        let executor = executor();
        let items = vec![0u8];
        let called = Instant::now();
        let result = executor.map_independent("stuck", items, Duration::from_millis(20), |_, _| {
            std::thread::sleep(Duration::from_secs(3));
            Ok(())
        });
        let waited = called.elapsed();

        match result {
            Err(PipelineError::WorkerTimeout {
                index,
                elapsed,
                deadline,
            }) => {
                assert_eq!(index, 0);
                assert_eq!(deadline, Duration::from_millis(20));
                assert!(elapsed >= deadline);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert!(waited < Duration::from_secs(1), "call blocked for {waited:?}");
    }

    #[test]
    fn queued_tasks_are_skipped_after_a_failure() {
        let executor = ParallelExecutor::new(Some(1)).unwrap();
        let ran = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ran);
        let items: Vec<usize> = (0..8).collect();
        let result = executor.map_independent("first fails", items, Duration::from_secs(5), move |_, item| {
            let order = counter.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(5));
            if order == 0 { Err(shape("first")) } else { Ok(*item) }
        });
        assert!(result.is_err());

        // let the single worker drain its queue
        std::thread::sleep(Duration::from_millis(100));
        assert!(ran.load(Ordering::SeqCst) < 8);
    }

    #[test]
    fn empty_input_gives_empty_output() {
        let items: Vec<u8> = Vec::new();
        let results = executor()
            .map_independent("empty", items, Duration::from_secs(1), |_, item| Ok(*item))
            .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn default_pool_uses_available_parallelism() {
        let executor = ParallelExecutor::new(None).unwrap();
        assert!(executor.threads() >= 1);
    }
}
