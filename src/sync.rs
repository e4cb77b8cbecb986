use core::time::Duration;
use parking_lot::{Condvar, Mutex};

/// One-shot completion signal with blocking and timed waits.
///
/// The last contract of a sequence task sets the flag; the caller's wait
/// blocks until the set is observed. The flag's mutex is the happens-before
/// edge ordering the final slot write (made before `set`) before the
/// waiter's read of the result.
#[derive(Debug, Default)]
pub(crate) struct CompletionFlag {
    set: Mutex<bool>,
    cond: Condvar,
}

impl CompletionFlag {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Mark the flag set and wake all waiters.
    pub(crate) fn set(&self) {
        let mut set = self.set.lock();
        *set = true;
        drop(set);
        self.cond.notify_all();
    }

    pub(crate) fn is_set(&self) -> bool {
        *self.set.lock()
    }

    /// Block until the flag is set. Returns immediately if it already is.
    pub(crate) fn wait(&self) {
        let mut set = self.set.lock();
        self.cond.wait_while(&mut set, |set| !*set);
    }

    /// Block until the flag is set or `timeout` elapses. Returns whether the
    /// flag was observed set.
    pub(crate) fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut set = self.set.lock();
        if !*set {
            let _ = self.cond.wait_while_for(&mut set, |set| !*set, timeout);
        }
        *set
    }
}

/// Single-use arrival barrier for parallel joins.
///
/// Sized to the branch count plus one: every branch contract arrives once,
/// and the caller's wait contributes the final arrival. Whichever arrival
/// reaches the expected count runs the completion action (taken out under
/// the lock, so it runs exactly once) and then releases all waiters. The
/// barrier's mutex orders every branch's output write before a released
/// waiter's reads.
pub(crate) struct JoinBarrier {
    state: Mutex<BarrierState>,
    cond: Condvar,
}

struct BarrierState {
    arrivals: usize,
    expected: usize,
    released: bool,
    on_complete: Option<Box<dyn FnOnce() + Send>>,
}

impl JoinBarrier {
    pub(crate) fn new(expected: usize) -> Self {
        Self {
            state: Mutex::new(BarrierState {
                arrivals: 0,
                expected,
                released: false,
                on_complete: None,
            }),
            cond: Condvar::new(),
        }
    }

    /// Install the completion action. Must happen before any arrival.
    pub(crate) fn set_on_complete(&self, action: Box<dyn FnOnce() + Send>) {
        let mut state = self.state.lock();
        assert_eq!(state.arrivals, 0, "JoinBarrier::set_on_complete: [1]");
        state.on_complete = Some(action);
    }

    /// Register one arrival without blocking. The final arrival runs the
    /// completion action and releases all waiters.
    pub(crate) fn arrive(&self) {
        self.arrive_inner();
    }

    /// Register the caller's arrival and block until the barrier releases.
    pub(crate) fn arrive_and_wait(&self) {
        if self.arrive_inner() {
            return;
        }
        self.wait_released();
    }

    /// Block until the barrier has released. Does not arrive.
    pub(crate) fn wait_released(&self) {
        let mut state = self.state.lock();
        self.cond.wait_while(&mut state, |state| !state.released);
    }

    /// Block until the barrier releases or `timeout` elapses. Does not
    /// arrive. Returns whether the release was observed.
    pub(crate) fn wait_released_timeout(&self, timeout: Duration) -> bool {
        let mut state = self.state.lock();
        if !state.released {
            let _ = self
                .cond
                .wait_while_for(&mut state, |state| !state.released, timeout);
        }
        state.released
    }

    pub(crate) fn is_released(&self) -> bool {
        self.state.lock().released
    }

    /// Returns whether this arrival was the final one.
    fn arrive_inner(&self) -> bool {
        let mut state = self.state.lock();
        state.arrivals += 1;
        assert!(
            state.arrivals <= state.expected,
            "JoinBarrier::arrive: more arrivals than the barrier was sized for"
        );
        if state.arrivals < state.expected {
            return false;
        }
        let action = state.on_complete.take();
        drop(state);
        // The action runs before waiters are released; callers must not rely
        // on any ordering between it and a waiter's wake-up.
        if let Some(action) = action {
            action();
        }
        self.state.lock().released = true;
        self.cond.notify_all();
        true
    }
}
