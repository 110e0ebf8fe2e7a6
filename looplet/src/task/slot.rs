use crate::task::{Id, JoinError};
use std::any::{Any, TypeId, type_name};
use std::mem::{self, MaybeUninit};
use std::ptr;

/// Inline storage geometry. Values that fit both bounds are stored in place;
/// anything larger (or more aligned) spills to the heap.
pub(crate) const INLINE_CAPACITY: usize = 32;

#[repr(C, align(8))]
struct InlineBuf {
    bytes: [MaybeUninit<u8>; INLINE_CAPACITY],
}

const INLINE_ALIGN: usize = mem::align_of::<InlineBuf>();

/// A task's one-shot, type-erased result cell.
///
/// Holds exactly one of: nothing, a value of the type captured at the task's
/// creation, or the task's failure. Written once from the task's top frame,
/// consumed at most once by result retrieval. Retrieval is runtime-checked
/// against the stored [`TypeId`].
#[derive(Debug)]
pub(crate) struct ResultSlot {
    state: SlotState,
}

enum SlotState {
    Empty,
    Value(StoredValue),
    Failure(JoinError),
    Taken,
}

struct StoredValue {
    type_id: TypeId,
    type_name: &'static str,
    repr: Repr,
}

enum Repr {
    Inline {
        buf: InlineBuf,
        /// Drops the value in place; only called if the slot dies untaken.
        drop_fn: unsafe fn(*mut u8),
    },
    Boxed(Box<dyn Any>),
}

impl ResultSlot {
    pub(crate) fn new() -> Self {
        Self {
            state: SlotState::Empty,
        }
    }

    /// Store the task's produced value. Double stores are a runtime bug:
    /// fatal in debug builds, reported and ignored in release builds.
    pub(crate) fn store<T: 'static>(&mut self, value: T) {
        if !matches!(self.state, SlotState::Empty) {
            debug_assert!(false, "result slot written twice");
            tracing::error!("invariant violated: result slot written twice");
            return;
        }

        let repr = if mem::size_of::<T>() <= INLINE_CAPACITY && mem::align_of::<T>() <= INLINE_ALIGN
        {
            let mut buf = InlineBuf {
                bytes: [MaybeUninit::uninit(); INLINE_CAPACITY],
            };
            // Safety: the buffer is large enough and aligned enough for T,
            // checked just above.
            unsafe { ptr::write(buf.bytes.as_mut_ptr() as *mut T, value) };
            Repr::Inline {
                buf,
                drop_fn: drop_in_place_erased::<T>,
            }
        } else {
            Repr::Boxed(Box::new(value))
        };

        self.state = SlotState::Value(StoredValue {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            repr,
        });
    }

    /// Store the task's failure instead of a value.
    pub(crate) fn store_failure(&mut self, err: JoinError) {
        if !matches!(self.state, SlotState::Empty) {
            debug_assert!(false, "result slot written twice");
            tracing::error!("invariant violated: result slot written twice");
            return;
        }
        self.state = SlotState::Failure(err);
    }

    /// Consume the slot: the stored value, or the stored failure as an error.
    ///
    /// # Panics
    ///
    /// Panics if `T` is not the type that was stored; handles are typed at
    /// task creation, so this only fires on a runtime bug.
    pub(crate) fn take<T: 'static>(&mut self, id: Id) -> Result<T, JoinError> {
        match mem::replace(&mut self.state, SlotState::Taken) {
            SlotState::Value(value) => {
                assert_eq!(
                    value.type_id,
                    TypeId::of::<T>(),
                    "result slot type confusion: stored `{}`, requested `{}`",
                    value.type_name,
                    type_name::<T>(),
                );
                match value.repr {
                    Repr::Inline { buf, .. } => {
                        // Safety: a value of type T was written at this
                        // address by `store` and is read out exactly once;
                        // ownership transfers to the caller, so the buffer's
                        // drop_fn must not run (the state is already Taken).
                        let value = unsafe { ptr::read(buf.bytes.as_ptr() as *const T) };
                        Ok(value)
                    }
                    Repr::Boxed(boxed) => {
                        Ok(*boxed.downcast::<T>().expect("type id already checked"))
                    }
                }
            }
            SlotState::Failure(err) => Err(err),
            SlotState::Taken => Err(JoinError::consumed(id)),
            SlotState::Empty => {
                debug_assert!(false, "result slot read before completion");
                Err(JoinError::not_ready(id))
            }
        }
    }
}

impl Drop for ResultSlot {
    fn drop(&mut self) {
        // Inline values own their bytes manually; boxed values and failures
        // drop with the enum.
        if let SlotState::Value(StoredValue {
            repr: Repr::Inline { buf, drop_fn },
            ..
        }) = &mut self.state
        {
            // Safety: the slot still owns the value (it was never taken).
            unsafe { drop_fn(buf.bytes.as_mut_ptr() as *mut u8) };
        }
    }
}

unsafe fn drop_in_place_erased<T>(ptr: *mut u8) {
    // Safety: the caller passes a pointer to a live T.
    unsafe { ptr::drop_in_place(ptr as *mut T) }
}

impl std::fmt::Debug for SlotState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SlotState::Empty => f.write_str("Empty"),
            SlotState::Value(v) => write!(f, "Value({})", v.type_name),
            SlotState::Failure(err) => write!(f, "Failure({err:?})"),
            SlotState::Taken => f.write_str("Taken"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;
    use static_assertions::{const_assert, const_assert_eq};

    const_assert_eq!(INLINE_ALIGN, 8);
    const_assert!(INLINE_CAPACITY % INLINE_ALIGN == 0);

    #[test]
    fn test_store_take_inline_value() {
        let mut slot = ResultSlot::new();
        slot.store(42_i32);
        assert_eq!(slot.take::<i32>(Id::next()).unwrap(), 42);
    }

    #[test]
    fn test_store_take_unit() {
        let mut slot = ResultSlot::new();
        slot.store(());
        assert!(slot.take::<()>(Id::next()).is_ok());
    }

    #[test]
    fn test_store_take_heap_spill() {
        // 64 bytes exceeds the inline capacity.
        let big = [7_u64; 8];
        assert!(mem::size_of_val(&big) > INLINE_CAPACITY);

        let mut slot = ResultSlot::new();
        slot.store(big);
        assert_eq!(slot.take::<[u64; 8]>(Id::next()).unwrap(), big);
    }

    #[test]
    fn test_second_take_reports_consumed() {
        let id = Id::next();
        let mut slot = ResultSlot::new();
        slot.store(String::from("once"));

        assert_eq!(slot.take::<String>(id).unwrap(), "once");
        let err = slot.take::<String>(id).unwrap_err();
        assert!(!err.is_cancelled() && !err.is_panic());
    }

    #[test]
    fn test_failure_is_returned_as_error() {
        let id = Id::next();
        let mut slot = ResultSlot::new();
        slot.store_failure(JoinError::cancelled(id));

        let err = slot.take::<i32>(id).unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_untaken_inline_value_is_dropped() {
        let probe = Rc::new(());
        {
            let mut slot = ResultSlot::new();
            slot.store(Rc::clone(&probe));
            assert_eq!(Rc::strong_count(&probe), 2);
        }
        assert_eq!(Rc::strong_count(&probe), 1);
    }

    #[test]
    fn test_taken_value_is_not_double_dropped() {
        let probe = Rc::new(());
        let mut slot = ResultSlot::new();
        slot.store(Rc::clone(&probe));

        let taken = slot.take::<Rc<()>>(Id::next()).unwrap();
        assert_eq!(Rc::strong_count(&probe), 2);
        drop(taken);
        drop(slot);
        assert_eq!(Rc::strong_count(&probe), 1);
    }

    #[test]
    #[should_panic(expected = "result slot written twice")]
    fn test_double_store_is_fatal_in_debug() {
        let mut slot = ResultSlot::new();
        slot.store(1_u8);
        slot.store(2_u8);
    }
}
