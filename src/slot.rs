use core::{
    any::{Any, type_name},
    cell::UnsafeCell,
};
use derive_more::{Deref, DerefMut};

/// A minimal `UnsafeCell` wrapper that is `Sync` when `T: Send`.
///
/// The cell is a hand-off, not a shared location: values are only ever
/// moved in and out, under accesses the scheduling protocol keeps exclusive
/// and orders across threads by an external happens-before edge (a contract
/// being enqueued after a write, a completion flag or barrier being
/// observed before a read).
#[derive(Debug, Deref, DerefMut)]
#[repr(transparent)]
pub(crate) struct HandoffCell<T>(UnsafeCell<T>);

// SAFETY: Exclusivity is guaranteed by the scheduling protocol (at most one
// thread touches the cell at a time, with happens-before edges between
// touches), so sharing the cell across threads only requires the contents to
// be sendable.
unsafe impl<T: Send> Sync for HandoffCell<T> {}

impl<T> HandoffCell<T> {
    pub(crate) fn new(val: T) -> Self {
        Self(UnsafeCell::new(val))
    }
}

/// Type-erased, ownership-transferring storage for one in-flight value.
///
/// A sequence task owns exactly one slot, overwritten in place as data moves
/// from stage to stage; a parallel task owns one input and one output slot
/// per branch. The type tag travels with the boxed value, and extracting a
/// value as the wrong type is a loud usage error. Well-typed pipelines never
/// hit it: the chaining bounds make the stored and requested types agree at
/// every stage boundary.
pub(crate) struct ValueSlot {
    cell: HandoffCell<Option<Box<dyn Any + Send>>>,
}

impl ValueSlot {
    pub(crate) fn empty() -> Self {
        Self {
            cell: HandoffCell::new(None),
        }
    }

    /// Move `value` into the slot, dropping whatever it previously held.
    ///
    /// # Safety
    ///
    /// The caller must have exclusive logical access to the slot: no other
    /// thread may touch it concurrently, and any subsequent reader must be
    /// ordered after this call by a happens-before edge.
    pub(crate) unsafe fn store<T: Send + 'static>(&self, value: T) {
        // SAFETY: Exclusivity is the caller's precondition.
        let slot = unsafe { &mut *self.cell.get() };
        *slot = Some(Box::new(value));
    }

    /// Move the held value out of the slot, leaving it empty.
    ///
    /// # Safety
    ///
    /// Same exclusivity requirement as [`ValueSlot::store`], and the store
    /// that filled the slot must happen-before this call.
    ///
    /// # Panics
    ///
    /// If the slot is empty or holds a value of a different type.
    pub(crate) unsafe fn take<T: Send + 'static>(&self) -> T {
        // SAFETY: Exclusivity is the caller's precondition.
        let slot = unsafe { &mut *self.cell.get() };
        let held = slot
            .take()
            .unwrap_or_else(|| panic!("value slot is empty while extracting `{}`", type_name::<T>()));
        match held.downcast::<T>() {
            Ok(value) => *value,
            Err(_) => panic!(
                "value slot holds a different type than the requested `{}`",
                type_name::<T>()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ValueSlot;

    #[test]
    fn stores_and_takes_in_order() {
        let slot = ValueSlot::empty();
        // SAFETY: Single-threaded test; access is trivially exclusive.
        unsafe {
            slot.store(41i32);
            assert_eq!(slot.take::<i32>(), 41);
            slot.store("answer".to_string());
            assert_eq!(slot.take::<String>(), "answer");
        }
    }

    #[test]
    fn overwrites_in_place() {
        let slot = ValueSlot::empty();
        // SAFETY: Single-threaded test.
        unsafe {
            slot.store(1u64);
            slot.store(2u64);
            assert_eq!(slot.take::<u64>(), 2);
        }
    }

    #[test]
    #[should_panic(expected = "slot is empty")]
    fn taking_from_an_empty_slot_panics() {
        let slot = ValueSlot::empty();
        // SAFETY: Single-threaded test.
        let _ = unsafe { slot.take::<i32>() };
    }

    #[test]
    #[should_panic(expected = "different type")]
    fn taking_the_wrong_type_panics() {
        let slot = ValueSlot::empty();
        // SAFETY: Single-threaded test.
        unsafe {
            slot.store(1u8);
            let _ = slot.take::<u16>();
        }
    }
}
