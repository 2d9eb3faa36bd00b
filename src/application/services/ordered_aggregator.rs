//! Releases completion work in the order requests were declared.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::domain::errors::AggregatorError;
use crate::domain::ports::OrderKey;

/// Callback fired once when a key becomes the head of the queue.
pub type OnFirstExpected<K> = Box<dyn FnOnce(&K) + Send>;

/// Deferred completion work.
pub type Task = Box<dyn FnOnce() + Send>;

struct Entry<K> {
    on_first: Option<OnFirstExpected<K>>,
    tasks: Vec<Task>,
}

struct State<K> {
    order: VecDeque<K>,
    entries: HashMap<K, Entry<K>>,
    draining: bool,
}

impl<K: OrderKey> State<K> {
    /// Takes the head's pending callback, if it has one.
    fn take_head_callback(&mut self) -> Option<(K, OnFirstExpected<K>)> {
        let head = self.order.front()?.clone();
        let callback = self.entries.get_mut(&head)?.on_first.take()?;
        Some((head, callback))
    }
}

/// Work released by one step of the drain loop.
enum Released<K> {
    Tasks(Vec<Task>, Option<(K, OnFirstExpected<K>)>),
    Idle,
}

/// Runs tasks in the order their keys were declared with
/// [`expect`](Self::expect), however the tasks themselves arrive.
///
/// A task for the head key runs as soon as it is submitted, followed by every
/// consecutive ready task behind it. Tasks and callbacks run outside the lock
/// and on the thread that unblocked them, so they may call back into the
/// aggregator.
pub struct ContiguousFifoAggregator<K: OrderKey> {
    state: Mutex<State<K>>,
}

impl<K: OrderKey> ContiguousFifoAggregator<K> {
    /// Creates an empty aggregator.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                order: VecDeque::new(),
                entries: HashMap::new(),
                draining: false,
            }),
        }
    }

    /// Declares that a task for `key` will arrive, queued after every key
    /// already expected. Re-declaring a key moves it to the back, along with
    /// any tasks it is already holding.
    ///
    /// `on_first` fires once when the key becomes the head of the queue,
    /// immediately if the queue is empty.
    ///
    /// # Errors
    /// Returns [`AggregatorError::BlankKey`] if the key has no identity.
    pub fn expect(
        &self,
        key: K,
        on_first: Option<OnFirstExpected<K>>,
    ) -> Result<(), AggregatorError> {
        if key.is_blank() {
            return Err(AggregatorError::BlankKey);
        }

        let callback = {
            let mut state = self.state.lock();
            let previous_head = state.order.front().cloned();
            let tasks = match state.entries.remove(&key) {
                Some(entry) => {
                    trace!(key = ?key, held = entry.tasks.len(), "Re-expecting key, moving to back");
                    state.order.retain(|queued| queued != &key);
                    entry.tasks
                }
                None => Vec::new(),
            };
            state.order.push_back(key.clone());
            state.entries.insert(key, Entry { on_first, tasks });

            if state.order.front() == previous_head.as_ref() {
                None
            } else {
                state.take_head_callback()
            }
        };

        Self::fire(callback);
        self.drain();
        Ok(())
    }

    /// Stops waiting for `key`. If it was the head, the next expected key's
    /// callback fires and any ready tasks behind it run.
    pub fn forget(&self, key: &K) {
        let (callback, removed) = {
            let mut state = self.state.lock();
            let Some(removed) = state.entries.remove(key) else {
                return;
            };
            let was_head = state.order.front() == Some(key);
            state.order.retain(|queued| queued != key);
            debug!(key = ?key, was_head, dropped = removed.tasks.len(), "Forgot expected key");
            let callback = if was_head { state.take_head_callback() } else { None };
            (callback, removed)
        };
        drop(removed);

        Self::fire(callback);
        self.drain();
    }

    /// Submits the task for `key`. Unexpected keys run immediately; expected
    /// keys run once every key declared before them has run or been
    /// forgotten. Several tasks for one key run together, in submission
    /// order.
    pub fn execute(&self, key: K, task: impl FnOnce() + Send + 'static) {
        let unexpected = {
            let mut state = self.state.lock();
            if let Some(entry) = state.entries.get_mut(&key) {
                entry.tasks.push(Box::new(task));
                None
            } else {
                Some(task)
            }
        };

        if let Some(task) = unexpected {
            trace!(key = ?key, "Running unexpected task immediately");
            task();
            return;
        }
        self.drain();
    }

    /// Number of keys still expected.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().order.len()
    }

    /// Returns true if no keys are expected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The key whose task runs next.
    #[must_use]
    pub fn head(&self) -> Option<K> {
        self.state.lock().order.front().cloned()
    }

    /// Returns true if `key` is expected.
    #[must_use]
    pub fn is_expected(&self, key: &K) -> bool {
        self.state.lock().entries.contains_key(key)
    }

    fn fire(callback: Option<(K, OnFirstExpected<K>)>) {
        if let Some((key, callback)) = callback {
            callback(&key);
        }
    }

    /// Runs ready head tasks until the head is not ready. Only one thread
    /// drains at a time; the others leave their work for it.
    fn drain(&self) {
        {
            let mut state = self.state.lock();
            if state.draining {
                return;
            }
            state.draining = true;
        }
        let _guard = DrainGuard(&self.state);

        loop {
            match self.release_head() {
                Released::Tasks(tasks, callback) => {
                    for task in tasks {
                        task();
                    }
                    Self::fire(callback);
                }
                Released::Idle => return,
            }
        }
    }

    fn release_head(&self) -> Released<K> {
        let mut state = self.state.lock();
        let ready = state
            .order
            .front()
            .and_then(|head| state.entries.get(head))
            .is_some_and(|entry| !entry.tasks.is_empty());
        if !ready {
            state.draining = false;
            return Released::Idle;
        }

        let Some(head) = state.order.pop_front() else {
            state.draining = false;
            return Released::Idle;
        };
        let Some(entry) = state.entries.remove(&head) else {
            state.draining = false;
            return Released::Idle;
        };
        trace!(key = ?head, tasks = entry.tasks.len(), remaining = state.order.len(), "Releasing tasks");
        Released::Tasks(entry.tasks, state.take_head_callback())
    }
}

impl<K: OrderKey> Default for ContiguousFifoAggregator<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// Clears the draining flag if a task panics mid-drain.
struct DrainGuard<'a, K>(&'a Mutex<State<K>>);

impl<K> Drop for DrainGuard<'_, K> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.lock().draining = false;
        }
    }
}
