//! Delayed auto-test requests
//!
//! Staging a file asks for a test run a little later; staging again before
//! the delay elapses restarts the wait. Each pending request is a sleeping
//! thread holding the receiving end of a channel. Dropping the sender (by
//! rescheduling or cancelling) wakes the thread and it exits without firing.

use std::collections::HashMap;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

/// Receives "run the tests for this branch now" requests
pub trait TestTrigger: Send + Sync {
    fn request_test_run(&self, project_id: &str, branch: &str);
}

type TimerKey = (String, String);

struct PendingTimer {
    generation: u64,
    // Held only so that dropping it cancels the timer thread
    _cancel: Sender<()>,
}

#[derive(Default)]
struct TimerTable {
    next_generation: u64,
    pending: HashMap<TimerKey, PendingTimer>,
}

/// Per-(project, branch) cancellable timers in front of a [`TestTrigger`]
#[derive(Clone)]
pub struct TestScheduler {
    trigger: Arc<dyn TestTrigger>,
    delay: Duration,
    timers: Arc<Mutex<TimerTable>>,
}

fn lock(timers: &Mutex<TimerTable>) -> MutexGuard<'_, TimerTable> {
    timers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl TestScheduler {
    pub fn new(trigger: Arc<dyn TestTrigger>, delay: Duration) -> Self {
        Self {
            trigger,
            delay,
            timers: Arc::new(Mutex::new(TimerTable::default())),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Start (or restart) the timer for a branch
    pub fn schedule(&self, project_id: &str, branch: &str) {
        let key: TimerKey = (project_id.to_string(), branch.to_string());
        let (tx, rx) = mpsc::channel::<()>();

        let generation = {
            let mut table = lock(&self.timers);
            table.next_generation += 1;
            let generation = table.next_generation;
            // Replacing the entry drops the previous sender
            table.pending.insert(
                key.clone(),
                PendingTimer {
                    generation,
                    _cancel: tx,
                },
            );
            generation
        };

        let trigger = Arc::clone(&self.trigger);
        let timers = Arc::clone(&self.timers);
        let delay = self.delay;
        let spawned = thread::Builder::new()
            .name(format!("autotest-{}", key.1))
            .spawn(move || match rx.recv_timeout(delay) {
                Err(RecvTimeoutError::Timeout) => {
                    {
                        let mut table = lock(&timers);
                        match table.pending.get(&key) {
                            Some(timer) if timer.generation == generation => {
                                table.pending.remove(&key);
                            }
                            _ => return,
                        }
                    }
                    tracing::info!(project = %key.0, branch = %key.1, "requesting test run");
                    trigger.request_test_run(&key.0, &key.1);
                }
                _ => tracing::debug!(project = %key.0, branch = %key.1, "test timer cancelled"),
            });

        if let Err(e) = spawned {
            tracing::warn!(error = %e, "could not start test timer");
            lock(&self.timers).pending.remove(&(project_id.to_string(), branch.to_string()));
        }
    }

    /// Drop a pending timer. Returns whether one was pending.
    pub fn cancel(&self, project_id: &str, branch: &str) -> bool {
        let key: TimerKey = (project_id.to_string(), branch.to_string());
        lock(&self.timers).pending.remove(&key).is_some()
    }

    pub fn is_pending(&self, project_id: &str, branch: &str) -> bool {
        let key: TimerKey = (project_id.to_string(), branch.to_string());
        lock(&self.timers).pending.contains_key(&key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<(String, String)>>,
    }

    impl TestTrigger for Recorder {
        fn request_test_run(&self, project_id: &str, branch: &str) {
            self.calls
                .lock()
                .unwrap()
                .push((project_id.to_string(), branch.to_string()));
        }
    }

    fn scheduler(delay_ms: u64) -> (Arc<Recorder>, TestScheduler) {
        let recorder = Arc::new(Recorder::default());
        let scheduler = TestScheduler::new(recorder.clone(), Duration::from_millis(delay_ms));
        (recorder, scheduler)
    }

    #[test]
    fn test_fires_once_after_delay() {
        let (recorder, scheduler) = scheduler(30);
        scheduler.schedule("p1", "feature/a");
        assert!(scheduler.is_pending("p1", "feature/a"));
        thread::sleep(Duration::from_millis(400));
        assert_eq!(*recorder.calls.lock().unwrap(), vec![("p1".to_string(), "feature/a".to_string())]);
        assert!(!scheduler.is_pending("p1", "feature/a"));
    }

    #[test]
    fn test_reschedule_coalesces() {
        let (recorder, scheduler) = scheduler(150);
        scheduler.schedule("p1", "feature/a");
        thread::sleep(Duration::from_millis(20));
        scheduler.schedule("p1", "feature/a");
        thread::sleep(Duration::from_millis(600));
        assert_eq!(recorder.calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_cancel_prevents_fire() {
        let (recorder, scheduler) = scheduler(100);
        scheduler.schedule("p1", "feature/a");
        scheduler.schedule("p2", "feature/a");
        assert!(scheduler.cancel("p1", "feature/a"));
        assert!(!scheduler.cancel("p1", "feature/a"));
        thread::sleep(Duration::from_millis(500));
        assert_eq!(*recorder.calls.lock().unwrap(), vec![("p2".to_string(), "feature/a".to_string())]);
    }
}
