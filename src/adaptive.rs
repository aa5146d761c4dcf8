//! Live-tunable settings.
//!
//! The engine's concurrency cap and the token bucket's rate and burst are read
//! through a [`DynamicConfig`] on every use, so a `set` takes effect on the
//! next aggregation or acquisition without rebuilding anything.
//!
//! Reads load an `ArcSwap` snapshot. Building with `adaptive-rwlock` keeps the
//! value behind a `std::sync::RwLock` instead and clones it on read.

use std::sync::Arc;

#[cfg(not(feature = "adaptive-rwlock"))]
type Slot<T> = arc_swap::ArcSwap<T>;

#[cfg(feature = "adaptive-rwlock")]
type Slot<T> = std::sync::RwLock<T>;

/// Shared handle to one setting; every clone sees every `set`.
#[derive(Debug)]
pub struct DynamicConfig<T> {
    slot: Arc<Slot<T>>,
}

impl<T> Clone for DynamicConfig<T> {
    fn clone(&self) -> Self {
        Self { slot: Arc::clone(&self.slot) }
    }
}

impl<T> DynamicConfig<T> {
    pub fn new(value: T) -> Self {
        #[cfg(not(feature = "adaptive-rwlock"))]
        let slot = Slot::<T>::from_pointee(value);
        #[cfg(feature = "adaptive-rwlock")]
        let slot = Slot::<T>::new(value);
        Self { slot: Arc::new(slot) }
    }

    /// The value as of this call. Later `set`s do not change it.
    #[cfg(not(feature = "adaptive-rwlock"))]
    pub fn get(&self) -> Arc<T> {
        self.slot.load_full()
    }

    /// The value as of this call. Later `set`s do not change it.
    #[cfg(feature = "adaptive-rwlock")]
    pub fn get(&self) -> Arc<T>
    where
        T: Clone,
    {
        let value = self.slot.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        Arc::new(value.clone())
    }

    /// Publish `value` to every handle.
    pub fn set(&self, value: T) {
        #[cfg(not(feature = "adaptive-rwlock"))]
        self.slot.store(Arc::new(value));
        #[cfg(feature = "adaptive-rwlock")]
        {
            *self.slot.write().unwrap_or_else(std::sync::PoisonError::into_inner) = value;
        }
    }
}
