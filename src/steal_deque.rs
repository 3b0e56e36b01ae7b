//! A bounded, circular, lock-free single-owner/multi-thief work-stealing
//! deque.
//!
//! Implements the Chase–Lev algorithm: a fixed circular buffer of
//! cache-line-aligned slots, with a `bottom` index mutated only by the
//! owning thread (push/pop at that end, LIFO for the owner) and a `top`
//! index mutated by CAS from both the owner (on the single-element race in
//! [`StealDeque::pop_bottom`]) and any number of concurrent thieves calling
//! [`StealDeque::steal`] (FIFO from the thieves' point of view).
//!
//! # Safety precondition
//!
//! Exactly one thread may call [`StealDeque::push_bottom`] or
//! [`StealDeque::pop_bottom`] at a time; calling either concurrently from two
//! different threads is undefined behavior. [`StealDeque::steal`] may be
//! called from any number of threads concurrently, including threads that
//! are not the owner.
//!
//! Capacity is fixed at [`StealDeque::CAPACITY`] and never grows; slots are
//! reused indefinitely and never reclaimed mid-operation, only at [`Drop`].

use std::ptr;
use std::sync::atomic::{fence, AtomicPtr, AtomicU64, Ordering};

use crossbeam_utils::CachePadded;

/// Fixed slot count. Must be a power of two so physical indexing can use a
/// bitmask instead of a modulo.
const CAPACITY: usize = 4096;
const MASK: u64 = (CAPACITY - 1) as u64;

const _: () = assert!(CAPACITY.is_power_of_two());

/// Outcome of a [`StealDeque::steal`] attempt.
///
/// `Empty` and `Retry` both carry no element, but callers that spin across
/// many deques need to tell them apart: `Empty` means this deque had nothing
/// to offer at the moment of the check, while `Retry` means a race was lost
/// against another thief or the owner and an immediate re-check of the same
/// deque may well succeed. Collapsing both into a single `None` would force
/// every caller to re-derive that distinction itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Steal<T> {
    /// The deque had no element available.
    Empty,
    /// A concurrent steal or pop won the race; try again.
    Retry,
    /// An element was stolen.
    Success(T),
}

impl<T> Steal<T> {
    /// Returns the stolen element, if any.
    pub fn success(self) -> Option<T> {
        match self {
            Steal::Success(v) => Some(v),
            _ => None,
        }
    }

    /// `true` if this is [`Steal::Retry`].
    pub fn is_retry(&self) -> bool {
        matches!(self, Steal::Retry)
    }
}

struct Slot<T>(CachePadded<AtomicPtr<T>>);

impl<T> Slot<T> {
    fn empty() -> Self {
        Slot(CachePadded::new(AtomicPtr::new(ptr::null_mut())))
    }
}

/// A bounded, single-owner, multi-thief lock-free deque.
///
/// See the module documentation for the single-owner precondition on
/// [`push_bottom`](StealDeque::push_bottom) and
/// [`pop_bottom`](StealDeque::pop_bottom).
pub struct StealDeque<T> {
    top: CachePadded<AtomicU64>,
    bottom: CachePadded<AtomicU64>,
    buffer: Box<[Slot<T>]>,
}

// SAFETY: slot writes (owner) and slot CAS/exchange-reads (thieves) are
// synchronized through `top`/`bottom`, per the algorithm's documented
// memory-ordering contract. The owner-exclusivity precondition on
// `push_bottom`/`pop_bottom` is on the caller, not enforced by the type
// system here, matching the original design.
unsafe impl<T: Send> Send for StealDeque<T> {}
unsafe impl<T: Send> Sync for StealDeque<T> {}

impl<T> Default for StealDeque<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> StealDeque<T> {
    /// Number of slots usable before [`StealDeque::push_bottom`] starts
    /// dropping elements. One slot less than the raw buffer size, since a
    /// full buffer is indistinguishable from an empty one under this
    /// implementation's indexing unless one slot is always left unused.
    pub const CAPACITY: usize = CAPACITY - 1;

    /// Creates an empty deque.
    pub fn new() -> Self {
        let buffer: Box<[Slot<T>]> = (0..CAPACITY).map(|_| Slot::empty()).collect();

        StealDeque {
            top: CachePadded::new(AtomicU64::new(0)),
            bottom: CachePadded::new(AtomicU64::new(0)),
            buffer,
        }
    }

    fn slot(&self, index: u64) -> &Slot<T> {
        &self.buffer[(index & MASK) as usize]
    }

    /// Pushes `value` onto the bottom of the deque. Must only be called by
    /// the owning thread.
    ///
    /// Returns `true` if the element was stored, `false` (element dropped)
    /// if the deque was already at [`StealDeque::CAPACITY`].
    ///
    /// # Safety precondition
    ///
    /// No other thread may be concurrently calling `push_bottom` or
    /// `pop_bottom` on this deque. Violating this is undefined behavior.
    pub fn push_bottom(&self, value: T) -> bool {
        let b = self.bottom.load(Ordering::Relaxed);
        let t = self.top.load(Ordering::Acquire);

        // `MASK == CAPACITY - 1`, which is also the full-deque threshold.
        if b.wrapping_sub(t) >= MASK {
            tracing::trace!("steal_deque: push_bottom dropped element, deque full");
            return false;
        }

        let boxed = Box::into_raw(Box::new(value));
        self.slot(b).0.store(boxed, Ordering::Relaxed);

        // Release fence: the slot write above must be visible to any thief
        // that observes the incremented `bottom` below.
        fence(Ordering::Release);
        self.bottom.store(b.wrapping_add(1), Ordering::Relaxed);
        true
    }

    /// Pops the most recently pushed element from the bottom of the deque
    /// (LIFO for the owner). Must only be called by the owning thread.
    ///
    /// Returns `None` if the deque was empty, or if a concurrent thief won
    /// the race for the last remaining element — both are ordinary,
    /// expected outcomes, not errors.
    ///
    /// # Safety precondition
    ///
    /// No other thread may be concurrently calling `push_bottom` or
    /// `pop_bottom` on this deque. Violating this is undefined behavior.
    pub fn pop_bottom(&self) -> Option<T> {
        let b = self.bottom.load(Ordering::Relaxed);
        if b == 0 {
            return None;
        }
        let b = b - 1;
        self.bottom.store(b, Ordering::Relaxed);

        // Seq-cst fence paired with the seq-cst CAS on `top` below: prevents
        // this store to `bottom` and a thief's load of `top` from both
        // appearing to have happened "before" the other.
        fence(Ordering::SeqCst);
        let t = self.top.load(Ordering::Relaxed);

        if t > b {
            // Was empty; restore bottom.
            self.bottom.store(b.wrapping_add(1), Ordering::Relaxed);
            return None;
        }

        let slot = self.slot(b);
        let claimed = slot.0.swap(ptr::null_mut(), Ordering::Relaxed);

        if t < b {
            // SAFETY: we own this slot exclusively — no thief can claim an
            // index below the current `top` that isn't this one, and `t < b`
            // means no single-element race is possible here.
            return Some(unsafe { *Box::from_raw(claimed) });
        }

        // t == b: single remaining element, must arbitrate with thieves via
        // CAS on `top`.
        if self
            .top
            .compare_exchange(t, t + 1, Ordering::SeqCst, Ordering::Relaxed)
            .is_err()
        {
            // Lost the race: a thief already claimed this index. `claimed`
            // may be null (thief already swapped it out) or, in principle,
            // still the element if the thief hasn't exchanged yet — either
            // way ownership belongs to the winning thief, not to us.
            self.bottom.store(b.wrapping_add(1), Ordering::Relaxed);
            return None;
        }

        self.bottom.store(b.wrapping_add(1), Ordering::Relaxed);
        if claimed.is_null() {
            None
        } else {
            // SAFETY: we won the top CAS, so no thief can also have claimed
            // this slot's element.
            Some(unsafe { *Box::from_raw(claimed) })
        }
    }

    /// Attempts to steal one element from the top of the deque (FIFO
    /// relative to the owner's pushes). May be called from any thread,
    /// including other thieves, but never from the owner concurrently with
    /// its own `push_bottom`/`pop_bottom` in a way that would violate the
    /// single-owner precondition documented on this type.
    pub fn steal(&self) -> Steal<T> {
        let t = self.top.load(Ordering::Acquire);

        // Seq-cst fence paired with the seq-cst fence in `pop_bottom`:
        // prevents this load of `bottom` and the owner's store to `bottom`
        // from both appearing to have happened "before" the other.
        fence(Ordering::SeqCst);
        let b = self.bottom.load(Ordering::Acquire);

        if t >= b {
            return Steal::Empty;
        }

        let slot = self.slot(t);
        let candidate = slot.0.load(Ordering::Relaxed);
        if candidate.is_null() {
            // Slot write not yet visible, or already claimed. Spurious.
            return Steal::Retry;
        }

        if self
            .top
            .compare_exchange(t, t + 1, Ordering::SeqCst, Ordering::Relaxed)
            .is_err()
        {
            return Steal::Retry;
        }

        let stolen = slot.0.swap(ptr::null_mut(), Ordering::Relaxed);
        if stolen.is_null() {
            // The owner's pop_bottom beat us to the actual element after we
            // won the index; we still advanced `top`, so this index is
            // legitimately exhausted, not contended — report empty.
            Steal::Empty
        } else {
            // SAFETY: we won the CAS on `top` for this index, so no other
            // thief can also have exchanged this slot.
            Steal::Success(unsafe { *Box::from_raw(stolen) })
        }
    }

    /// Best-effort check for emptiness. May be immediately stale.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Best-effort element count. May be immediately stale; never exceeds
    /// [`StealDeque::CAPACITY`] in a correct execution.
    pub fn len(&self) -> usize {
        let b = self.bottom.load(Ordering::Acquire);
        let t = self.top.load(Ordering::Acquire);
        if b >= t {
            (b - t) as usize
        } else {
            0
        }
    }

    /// The maximum number of elements this deque can hold before
    /// [`StealDeque::push_bottom`] starts dropping elements.
    pub fn capacity(&self) -> usize {
        Self::CAPACITY
    }
}

impl<T> Drop for StealDeque<T> {
    fn drop(&mut self) {
        let t = *self.top.get_mut();
        let b = *self.bottom.get_mut();
        let mut i = t;
        while i < b {
            let slot = &self.buffer[(i & MASK) as usize];
            let ptr = *slot.0.get_mut();
            if !ptr.is_null() {
                // SAFETY: `Drop` runs with exclusive access; any element at
                // a live index `[top, bottom)` that is still non-null is
                // still owned by the deque.
                drop(unsafe { Box::from_raw(ptr) });
            }
            i += 1;
        }
    }
}

impl<T> std::fmt::Debug for StealDeque<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StealDeque")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}
