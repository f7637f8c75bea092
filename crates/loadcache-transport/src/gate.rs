//! Priority admission for transport jobs
//!
//! At most `capacity` jobs hold a permit at once. Waiters are admitted in
//! ascending `(priority, arrival)` order, and a waiter's priority may change
//! while it waits.

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};
use tokio::sync::Notify;

struct Waiter {
    seq: u64,
    priority: Arc<AtomicI32>,
}

struct GateState {
    capacity: usize,
    running: usize,
    next_seq: u64,
    waiting: Vec<Waiter>,
}

impl GateState {
    fn best(&self) -> Option<u64> {
        self.waiting
            .iter()
            .min_by_key(|w| (w.priority.load(Ordering::Relaxed), w.seq))
            .map(|w| w.seq)
    }
}

struct GateShared {
    state: Mutex<GateState>,
    notify: Notify,
}

impl GateShared {
    fn try_admit(&self, seq: u64) -> bool {
        let mut state = self.state.lock();
        if state.running >= state.capacity || state.best() != Some(seq) {
            return false;
        }
        state.waiting.retain(|w| w.seq != seq);
        state.running += 1;
        if state.running < state.capacity && !state.waiting.is_empty() {
            self.notify.notify_waiters();
        }
        true
    }
}

/// Bounded, priority ordered admission gate
#[derive(Clone)]
pub struct PriorityGate {
    shared: Arc<GateShared>,
}

impl PriorityGate {
    pub fn new(capacity: usize) -> Self {
        Self {
            shared: Arc::new(GateShared {
                state: Mutex::new(GateState {
                    capacity: capacity.max(1),
                    running: 0,
                    next_seq: 0,
                    waiting: Vec::new(),
                }),
                notify: Notify::new(),
            }),
        }
    }

    /// Wait for a slot. Dropping the future before it resolves withdraws the
    /// waiter.
    pub async fn acquire(&self, priority: Arc<AtomicI32>) -> GatePermit {
        let seq = {
            let mut state = self.shared.state.lock();
            let seq = state.next_seq;
            state.next_seq += 1;
            state.waiting.push(Waiter { seq, priority });
            seq
        };
        let mut guard = WaitGuard {
            shared: &self.shared,
            seq,
            admitted: false,
        };

        loop {
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.shared.try_admit(seq) {
                guard.admitted = true;
                return GatePermit {
                    shared: self.shared.clone(),
                };
            }
            notified.await;
        }
    }

    pub fn running(&self) -> usize {
        self.shared.state.lock().running
    }

    pub fn waiting(&self) -> usize {
        self.shared.state.lock().waiting.len()
    }

    pub fn capacity(&self) -> usize {
        self.shared.state.lock().capacity
    }
}

struct WaitGuard<'a> {
    shared: &'a GateShared,
    seq: u64,
    admitted: bool,
}

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        if self.admitted {
            return;
        }
        self.shared.state.lock().waiting.retain(|w| w.seq != self.seq);
        self.shared.notify.notify_waiters();
    }
}

/// A held transport slot, released on drop
pub struct GatePermit {
    shared: Arc<GateShared>,
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock();
            state.running = state.running.saturating_sub(1);
        }
        self.shared.notify.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn wait_for_waiters(gate: &PriorityGate, n: usize) {
        for _ in 0..1000 {
            if gate.waiting() == n {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("expected {} waiters, found {}", n, gate.waiting());
    }

    #[tokio::test]
    async fn test_admits_up_to_capacity() {
        let gate = PriorityGate::new(2);
        let a = gate.acquire(Arc::new(AtomicI32::new(0))).await;
        let _b = gate.acquire(Arc::new(AtomicI32::new(0))).await;
        assert_eq!(gate.running(), 2);

        let pending = tokio::time::timeout(
            Duration::from_millis(20),
            gate.acquire(Arc::new(AtomicI32::new(0))),
        )
        .await;
        assert!(pending.is_err());
        assert_eq!(gate.waiting(), 0);

        drop(a);
        assert_eq!(gate.running(), 1);
    }

    #[tokio::test]
    async fn test_lower_priority_value_goes_first() {
        let gate = PriorityGate::new(1);
        let holder = gate.acquire(Arc::new(AtomicI32::new(0))).await;
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut tasks = Vec::new();
        for priority in [5, -3, 0] {
            let gate = gate.clone();
            let order = order.clone();
            tasks.push(tokio::spawn(async move {
                let _permit = gate.acquire(Arc::new(AtomicI32::new(priority))).await;
                order.lock().push(priority);
            }));
        }
        wait_for_waiters(&gate, 3).await;

        drop(holder);
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(*order.lock(), vec![-3, 0, 5]);
    }

    #[tokio::test]
    async fn test_priority_change_while_waiting() {
        let gate = PriorityGate::new(1);
        let holder = gate.acquire(Arc::new(AtomicI32::new(0))).await;
        let order = Arc::new(Mutex::new(Vec::new()));

        let late = Arc::new(AtomicI32::new(8));
        let mut tasks = Vec::new();
        for (name, priority) in [("early", Arc::new(AtomicI32::new(2))), ("late", late.clone())] {
            let gate = gate.clone();
            let order = order.clone();
            tasks.push(tokio::spawn(async move {
                let _permit = gate.acquire(priority).await;
                order.lock().push(name);
            }));
        }
        wait_for_waiters(&gate, 2).await;

        late.store(-8, Ordering::Relaxed);
        drop(holder);
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(*order.lock(), vec!["late", "early"]);
    }
}
