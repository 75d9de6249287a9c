//! Lock striping.

use parking_lot::RwLock;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// A fixed set of read-write locks selected by key hash.
///
/// Keys that hash to different stripes never contend. The stripe count is
/// rounded up to a power of two so selection is a mask.
#[derive(Debug)]
pub struct Striped<T> {
    stripes: Box<[RwLock<T>]>,
    mask: usize,
}

impl<T: Default> Striped<T> {
    /// Creates `count` stripes (at least one), each holding `T::default()`.
    #[must_use]
    pub fn new(count: usize) -> Self {
        let count = count.max(1).next_power_of_two();
        let stripes = (0..count).map(|_| RwLock::new(T::default())).collect();
        Self {
            stripes,
            mask: count - 1,
        }
    }
}

impl<T> Striped<T> {
    /// Returns the stripe index for `key`.
    pub fn index_of<K: Hash + ?Sized>(&self, key: &K) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) & self.mask
    }

    /// Returns the lock guarding `key`.
    pub fn stripe<K: Hash + ?Sized>(&self, key: &K) -> &RwLock<T> {
        &self.stripes[self.index_of(key)]
    }

    /// Iterates over every stripe in index order.
    pub fn iter(&self) -> impl Iterator<Item = &RwLock<T>> {
        self.stripes.iter()
    }

    /// Returns the number of stripes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stripes.len()
    }

    /// Always false; a striped lock has at least one stripe.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stripes.is_empty()
    }
}
