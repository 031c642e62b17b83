use arc_swap::{ArcSwap, Guard};
use std::fmt::Debug;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// ConfigHandle shares a hot-swappable value of some type T without
/// a mutex around every read.
///
/// Writers replace the whole value with `update`, bumping a generation
/// counter. Readers call `borrow` to snapshot the current value; the
/// snapshot stays coherent for as long as the guard (or a cloned Arc)
/// is held, so a reload mid-session never produces a torn view.
#[derive(Clone)]
pub struct ConfigHandle<T: Clone + Send> {
    inner: Arc<Inner<T>>,
}

struct Inner<T: Clone + Send> {
    value: ArcSwap<T>,
    generation: AtomicUsize,
}

impl<T: Clone + Send + Debug> Debug for ConfigHandle<T> {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt.debug_struct("ConfigHandle")
            .field("value", &self.inner.value)
            .field("generation", &self.inner.generation)
            .finish()
    }
}

impl<T: Clone + Send> ConfigHandle<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(Inner {
                value: ArcSwap::from_pointee(value),
                generation: AtomicUsize::new(0),
            }),
        }
    }

    /// Replace the shared value. Returns the new generation number.
    /// Handles that have already borrowed keep their snapshot; the next
    /// borrow observes the new value.
    pub fn update(&self, new_value: T) -> usize {
        self.inner.value.swap(Arc::new(new_value));
        self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Snapshot the current value for read without taking a lock.
    pub fn borrow(&self) -> Guard<Arc<T>> {
        self.inner.value.load()
    }

    /// Snapshot the current value as an owned Arc, for holding across
    /// await points.
    pub fn load(&self) -> Arc<T> {
        self.inner.value.load_full()
    }

    pub fn generation(&self) -> usize {
        self.inner.generation.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn snapshots_are_stable_across_updates() {
        let handle = ConfigHandle::new(1u32);
        let other = handle.clone();

        let before = handle.load();
        assert_eq!(other.update(2), 1);
        assert_eq!(other.update(3), 2);

        // the old snapshot is unchanged, new borrows see the update
        assert_eq!(*before, 1);
        assert_eq!(**handle.borrow(), 3);
        assert_eq!(handle.generation(), 2);
    }
}
