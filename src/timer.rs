use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, RwLock,
    },
    time::{Duration, Instant},
};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

/// Opaque token identifying an armed timer.
pub type TimerHandle = u64;

#[derive(Debug, PartialEq, Eq, Clone)]
struct TimerKey {
    execute_at: Instant,
    task_id: u64,
}

impl Ord for TimerKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.execute_at
            .cmp(&other.execute_at)
            .then(self.task_id.cmp(&other.task_id))
    }
}

impl PartialOrd for TimerKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// One-shot timer queue.
///
/// Entries are armed with [`TimerQueue::start`] and either fire through
/// [`TimerQueue::poll`] or are cancelled. Cancellation is idempotent and
/// removes a not-yet-delivered entry, so a cancelled handle can never be
/// observed firing afterwards.
pub struct TimerQueue<T> {
    tasks: RwLock<BTreeMap<TimerKey, T>>,
    id_to_deadline: RwLock<HashMap<u64, Instant>>,
    last_task_id: AtomicU64,
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TimerQueue<T> {
    pub fn new() -> Self {
        TimerQueue {
            tasks: RwLock::new(BTreeMap::new()),
            id_to_deadline: RwLock::new(HashMap::new()),
            last_task_id: AtomicU64::new(1),
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.read().map(|ts| ts.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn start(&self, after: Duration, value: T) -> TimerHandle {
        self.start_at(Instant::now() + after, value)
    }

    pub fn start_at(&self, execute_at: Instant, value: T) -> TimerHandle {
        let task_id = self.last_task_id.fetch_add(1, Ordering::Relaxed);
        self.tasks
            .write()
            .as_mut()
            .map(|ts| {
                ts.insert(
                    TimerKey {
                        execute_at,
                        task_id,
                    },
                    value,
                )
            })
            .ok();
        self.id_to_deadline
            .write()
            .as_mut()
            .map(|it| it.insert(task_id, execute_at))
            .ok();
        task_id
    }

    /// Cancel an armed timer, returning its value when it had not fired yet.
    pub fn cancel(&self, handle: TimerHandle) -> Option<T> {
        let deadline = self
            .id_to_deadline
            .write()
            .as_mut()
            .map(|it| it.remove(&handle))
            .ok()
            .flatten()?;
        self.tasks
            .write()
            .as_mut()
            .map(|ts| {
                ts.remove(&TimerKey {
                    execute_at: deadline,
                    task_id: handle,
                })
            })
            .ok()
            .flatten()
    }

    /// Remove and return every entry due at `now`, oldest first, paired with
    /// the handle it was armed under.
    pub fn poll(&self, now: Instant) -> Vec<(TimerHandle, T)> {
        let mut result = Vec::new();
        let due = {
            let mut tasks = match self.tasks.write() {
                Ok(tasks) => tasks,
                Err(_) => return result,
            };
            let keys = tasks
                .range(
                    ..=TimerKey {
                        execute_at: now,
                        task_id: u64::MAX,
                    },
                )
                .map(|(key, _)| key.clone())
                .collect::<Vec<_>>();
            if keys.is_empty() {
                return result;
            }
            result.reserve(keys.len());
            for key in keys.iter() {
                if let Some(value) = tasks.remove(key) {
                    result.push((key.task_id, value));
                }
            }
            keys
        };
        self.id_to_deadline
            .write()
            .as_mut()
            .map(|it| {
                for key in due {
                    it.remove(&key.task_id);
                }
            })
            .ok();
        result
    }
}

impl<T: Send + 'static> TimerQueue<T> {
    /// Poll the queue every `interval` and forward due entries over `sender`
    /// until the token is cancelled or the receiver goes away.
    pub async fn drive(
        self: Arc<Self>,
        interval: Duration,
        sender: UnboundedSender<(TimerHandle, T)>,
        cancel_token: CancellationToken,
    ) {
        while !cancel_token.is_cancelled() {
            for fired in self.poll(Instant::now()) {
                if sender.send(fired).is_err() {
                    return;
                }
            }
            tokio::time::sleep(interval).await;
        }
    }
}

#[test]
fn test_timer_queue() {
    let timer = TimerQueue::new();
    let now = Instant::now();
    let handle = timer.start_at(now, "task1");
    assert_eq!(handle, 1);
    assert_eq!(timer.cancel(handle), Some("task1"));
    assert_eq!(timer.cancel(handle), None);

    timer.start_at(now, "task2");
    let fired = timer.poll(now + Duration::from_secs(1));
    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0].1, "task2");

    let handle = timer.start_at(now + Duration::from_millis(1001), "task3");
    assert_eq!(timer.poll(now + Duration::from_secs(1)).len(), 0);
    assert_eq!(timer.len(), 1);

    // fired entries report the handle they were armed under
    let fired = timer.poll(now + Duration::from_secs(2));
    assert_eq!(fired, vec![(handle, "task3")]);
    assert!(timer.is_empty());
    assert_eq!(timer.cancel(handle), None);
}

#[test]
fn test_timer_queue_same_deadline() {
    let timer = TimerQueue::new();
    let now = Instant::now();
    let h1 = timer.start_at(now, "a");
    let h2 = timer.start_at(now, "b");
    assert_ne!(h1, h2);
    let fired = timer.poll(now);
    assert_eq!(fired.len(), 2);
}
