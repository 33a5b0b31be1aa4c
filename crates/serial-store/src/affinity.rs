//! Queue affinity detection
//!
//! Answers "is this code already running on that serial execution context?"
//! without blocking. Each context carries a [`ContextTag`] whose marker is
//! assigned lazily the first time anyone asks for it. A context marks the
//! thread it runs jobs on by holding an [`AffinityScope`] for the duration of
//! each job. The check is then a plain comparison of two markers.

use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::serial_queue::ExecutionContext;

/// Marker value meaning "no context".
const UNTAGGED: u64 = 0;

static NEXT_MARKER: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CURRENT_MARKER: Cell<u64> = const { Cell::new(UNTAGGED) };
}

/// Unique identity of one serial execution context.
#[derive(Debug, Default)]
pub struct ContextTag {
    marker: AtomicU64,
}

impl ContextTag {
    pub const fn new() -> Self {
        Self {
            marker: AtomicU64::new(UNTAGGED),
        }
    }

    /// Marker for this context, assigned on first use.
    ///
    /// Idempotent: every call returns the same value for the same tag, even
    /// when the first calls race on different threads.
    pub fn marker(&self) -> u64 {
        let current = self.marker.load(Ordering::Acquire);
        if current != UNTAGGED {
            return current;
        }

        let fresh = NEXT_MARKER.fetch_add(1, Ordering::Relaxed);
        match self
            .marker
            .compare_exchange(UNTAGGED, fresh, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => fresh,
            // Another thread tagged it first; the fresh marker is simply unused.
            Err(winner) => winner,
        }
    }
}

/// Marks the current thread as running on a context until dropped.
///
/// Scopes nest: dropping restores whatever marker was active before.
#[must_use = "the thread is only marked while the scope is alive"]
pub struct AffinityScope {
    previous: u64,
    // Scopes describe the current thread and must not move to another one.
    _not_send: PhantomData<*const ()>,
}

impl Drop for AffinityScope {
    fn drop(&mut self) {
        CURRENT_MARKER.with(|current| current.set(self.previous));
    }
}

/// Mark the calling thread as executing on the context owning `tag`.
pub fn enter(tag: &ContextTag) -> AffinityScope {
    let marker = tag.marker();
    let previous = CURRENT_MARKER.with(|current| current.replace(marker));
    AffinityScope {
        previous,
        _not_send: PhantomData,
    }
}

/// Whether the calling code runs on the context owning `tag`.
pub fn is_current_tag(tag: &ContextTag) -> bool {
    let current = CURRENT_MARKER.with(Cell::get);
    current != UNTAGGED && current == tag.marker()
}

/// Whether the calling code runs on `context`.
pub fn is_current_context<C>(context: &C) -> bool
where
    C: ExecutionContext + ?Sized,
{
    is_current_tag(context.tag())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_marker_is_idempotent() {
        let tag = ContextTag::new();
        let first = tag.marker();
        assert_ne!(first, UNTAGGED);
        assert_eq!(tag.marker(), first);
    }

    #[test]
    fn test_markers_are_unique() {
        let a = ContextTag::new();
        let b = ContextTag::new();
        assert_ne!(a.marker(), b.marker());
    }

    #[test]
    fn test_racing_first_use_agrees() {
        let tag = Arc::new(ContextTag::new());
        let markers: Vec<u64> = (0..8)
            .map(|_| {
                let tag = Arc::clone(&tag);
                thread::spawn(move || tag.marker())
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect();
        assert!(markers.iter().all(|m| *m == markers[0]));
    }

    #[test]
    fn test_scope_marks_and_restores() {
        let outer = ContextTag::new();
        let inner = ContextTag::new();
        assert!(!is_current_tag(&outer));

        {
            let _outer_scope = enter(&outer);
            assert!(is_current_tag(&outer));
            {
                let _inner_scope = enter(&inner);
                assert!(is_current_tag(&inner));
                assert!(!is_current_tag(&outer));
            }
            assert!(is_current_tag(&outer));
        }

        assert!(!is_current_tag(&outer));
        assert!(!is_current_tag(&inner));
    }

    #[test]
    fn test_scope_is_thread_local() {
        let tag = Arc::new(ContextTag::new());
        let _scope = enter(&tag);

        let other = Arc::clone(&tag);
        let seen_elsewhere = thread::spawn(move || is_current_tag(&other))
            .join()
            .unwrap();
        assert!(!seen_elsewhere);
        assert!(is_current_tag(&tag));
    }
}
