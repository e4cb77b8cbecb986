use crossbeam_channel::{Receiver, Sender, TryRecvError};
use derive_more::Debug;
use parking_lot::Mutex;

/// A unit of work drawn from the group by whichever thread runs it.
pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

/// One-shot schedulable unit of work.
///
/// Created from a zero-argument closure via
/// [`ContractGroup::create_contract`]. Creation does nothing; scheduling
/// moves the closure into the shared queue, after which exactly one thread
/// runs it exactly once. Tasks create one contract per stage and schedule
/// them as their data dependencies resolve.
#[must_use]
#[derive(Debug)]
pub struct Contract {
    #[debug(skip)]
    body: Mutex<Option<Job>>,
    #[debug(skip)]
    queue: Sender<Job>,
}

impl Contract {
    /// Make the contract eligible for execution.
    ///
    /// # Panics
    ///
    /// If the contract was already scheduled, or if the owning group has
    /// shut down.
    pub fn schedule(&self) {
        let body = self
            .body
            .lock()
            .take()
            .expect("contract has already been scheduled");
        if self.queue.send(body).is_err() {
            panic!("contract group has shut down");
        }
    }
}

/// The shared queue of pending contracts, drained by worker threads.
///
/// Every task on one executor feeds the same group, so contracts from
/// unrelated tasks load-balance across a common pool.
#[derive(Debug)]
pub struct ContractGroup {
    queue: Sender<Job>,
    pending: Receiver<Job>,
}

impl ContractGroup {
    pub(crate) fn new() -> Self {
        let (queue, pending) = crossbeam_channel::unbounded();
        Self { queue, pending }
    }

    /// Create a contract from a zero-argument closure. The closure does not
    /// run until the contract is scheduled and a thread picks it up.
    pub fn create_contract(&self, body: impl FnOnce() + Send + 'static) -> Contract {
        Contract {
            body: Mutex::new(Some(Box::new(body))),
            queue: self.queue.clone(),
        }
    }

    /// Run one pending contract on the calling thread, if any is queued.
    ///
    /// Returns whether a contract was run. This is the non-blocking face of
    /// the worker loop; it is also how a thread awaiting a nested task keeps
    /// the queue moving instead of parking.
    pub fn try_execute_next(&self) -> bool {
        match self.pending.try_recv() {
            Ok(body) => {
                body();
                true
            }
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => false,
        }
    }

    /// Number of contracts currently scheduled and not yet picked up.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn job_receiver(&self) -> Receiver<Job> {
        self.pending.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::ContractGroup;
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    #[test]
    fn scheduled_contract_runs_exactly_once() {
        let group = ContractGroup::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&runs);
        let contract = group.create_contract(move || {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(group.pending(), 0);
        contract.schedule();
        assert_eq!(group.pending(), 1);
        assert!(group.try_execute_next());
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(!group.try_execute_next());
    }

    #[test]
    fn contracts_drain_in_schedule_order() {
        let group = ContractGroup::new();
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let contracts: Vec<_> = (0..3)
            .map(|i| {
                let order = Arc::clone(&order);
                group.create_contract(move || order.lock().push(i))
            })
            .collect();
        for contract in &contracts {
            contract.schedule();
        }
        while group.try_execute_next() {}
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[test]
    #[should_panic(expected = "already been scheduled")]
    fn scheduling_a_contract_twice_panics() {
        let group = ContractGroup::new();
        let contract = group.create_contract(|| {});
        contract.schedule();
        contract.schedule();
    }
}
