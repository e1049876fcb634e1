//! Keyed async locks
//!
//! One async mutex per key, created on first use and dropped once nobody
//! holds or waits for it. Holders of different keys never contend.
//!
//! Every slot carries an optional value that lives exactly as long as the
//! slot. A holder can leave a value behind for the callers queued after it.

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::OwnedMutexGuard;

type Slot<T> = Arc<tokio::sync::Mutex<Option<T>>>;
type Slots<T> = Arc<Mutex<HashMap<String, Slot<T>>>>;

/// Set of per-key critical sections
#[derive(Debug)]
pub struct KeyedLocks<T = ()> {
    slots: Slots<T>,
}

impl<T> Default for KeyedLocks<T> {
    fn default() -> Self {
        Self {
            slots: Arc::default(),
        }
    }
}

impl<T> Clone for KeyedLocks<T> {
    fn clone(&self) -> Self {
        Self {
            slots: Arc::clone(&self.slots),
        }
    }
}

impl<T> KeyedLocks<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`
    pub async fn lock(&self, key: &str) -> KeyedGuard<T> {
        let slot = Arc::clone(lock_slots(&self.slots).entry(key.to_string()).or_default());

        // Declared before the wait so a cancelled waiter still releases the slot
        let claim = Claim {
            key: key.to_string(),
            slot,
            slots: Arc::clone(&self.slots),
        };
        let guard = Arc::clone(&claim.slot).lock_owned().await;

        KeyedGuard { guard, claim }
    }

    /// Number of keys currently locked or awaited
    pub fn active(&self) -> usize {
        lock_slots(&self.slots).len()
    }
}

fn lock_slots<T>(slots: &Slots<T>) -> MutexGuard<'_, HashMap<String, Slot<T>>> {
    // The map stays consistent even if a holder panicked
    slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Reference to a slot held by a holder or a waiter
#[derive(Debug)]
struct Claim<T> {
    key: String,
    slot: Slot<T>,
    slots: Slots<T>,
}

impl<T> Drop for Claim<T> {
    fn drop(&mut self) {
        let mut slots = lock_slots(&self.slots);
        // Only the map and this claim still reference the slot
        let last = Arc::strong_count(&self.slot) == 2
            && slots
                .get(&self.key)
                .is_some_and(|current| Arc::ptr_eq(current, &self.slot));
        if last {
            slots.remove(&self.key);
        }
    }
}

/// Exclusive access to one key and its slot value, released on drop
#[derive(Debug)]
pub struct KeyedGuard<T = ()> {
    // Field order matters: the mutex is released before the claim is checked
    guard: OwnedMutexGuard<Option<T>>,
    claim: Claim<T>,
}

impl<T> KeyedGuard<T> {
    /// Key this guard locks
    pub fn key(&self) -> &str {
        &self.claim.key
    }
}

impl<T> Deref for KeyedGuard<T> {
    type Target = Option<T>;

    fn deref(&self) -> &Option<T> {
        &self.guard
    }
}

impl<T> DerefMut for KeyedGuard<T> {
    fn deref_mut(&mut self) -> &mut Option<T> {
        &mut self.guard
    }
}
