//! Pooled capture of URL path parameters.
//!
//! A [`ParamVector`] is a pair of parallel arrays (names / values) sized for
//! the handful of parameters a route realistically carries. Vectors are
//! recycled through a process-wide [`ParamPool`]; dispatch acquires a
//! [`PathParams`] guard whose `Drop` resets the vector and hands it back,
//! so every exit path of a request releases its capture.

use std::sync::Arc;

use parking_lot::Mutex;

/// Ordered name/value capture for a single matched route.
///
/// Invariant: `names.len() == values.len()`. A successful match never
/// produces duplicate names; [`ParamVector::set`] overwrites an existing
/// entry instead of appending a second one.
#[derive(Debug, Default, Clone)]
pub struct ParamVector {
    names: Vec<String>,
    values: Vec<String>,
}

impl ParamVector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Value captured under `name`, if any.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.values[i].as_str())
    }

    /// Capture `value` under `name`, overwriting an existing entry.
    pub fn set(&mut self, name: &str, value: &str) {
        if let Some(i) = self.names.iter().position(|n| n == name) {
            self.values[i].clear();
            self.values[i].push_str(value);
        } else {
            self.names.push(name.to_owned());
            self.values.push(value.to_owned());
        }
    }

    /// Drop the entry for `name` via swap-with-last, keeping removal O(1)
    /// during trie backtracking.
    pub fn remove(&mut self, name: &str) {
        if let Some(i) = self.names.iter().position(|n| n == name) {
            self.names.swap_remove(i);
            self.values.swap_remove(i);
        }
    }

    /// Truncate to zero length, retaining capacity for reuse.
    pub fn reset(&mut self) {
        self.names.clear();
        self.values.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Iterate captures in insertion order (modulo swap-removes).
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().map(String::as_str))
    }
}

/// Free list of [`ParamVector`]s shared across in-flight requests.
#[derive(Debug, Default)]
pub struct ParamPool {
    free: Mutex<Vec<ParamVector>>,
}

impl ParamPool {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a vector from the free list (or allocate one) wrapped in a
    /// guard that returns it on drop.
    #[must_use]
    pub fn acquire(self: &Arc<Self>) -> PathParams {
        let vec = self.free.lock().pop().unwrap_or_default();
        PathParams {
            vec,
            pool: Some(Arc::clone(self)),
        }
    }

    fn release(&self, mut vec: ParamVector) {
        vec.reset();
        self.free.lock().push(vec);
    }

    /// Number of vectors currently idle in the pool.
    #[must_use]
    pub fn idle(&self) -> usize {
        self.free.lock().len()
    }
}

/// RAII view over a pooled [`ParamVector`].
///
/// Detached instances (not tied to a pool) back requests constructed
/// outside dispatch and the long-lived copies realtime connections keep.
#[derive(Debug, Default)]
pub struct PathParams {
    vec: ParamVector,
    pool: Option<Arc<ParamPool>>,
}

impl PathParams {
    /// A guard around an already-detached vector.
    #[must_use]
    pub fn detached(vec: ParamVector) -> Self {
        Self { vec, pool: None }
    }

    /// Copy the captures into a standalone vector that may outlive the
    /// request (the pooled storage itself never does).
    #[must_use]
    pub fn detach(&self) -> ParamVector {
        self.vec.clone()
    }
}

impl std::ops::Deref for PathParams {
    type Target = ParamVector;

    fn deref(&self) -> &ParamVector {
        &self.vec
    }
}

impl std::ops::DerefMut for PathParams {
    fn deref_mut(&mut self) -> &mut ParamVector {
        &mut self.vec
    }
}

impl Drop for PathParams {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.release(std::mem::take(&mut self.vec));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_overwrites_existing_name() {
        let mut p = ParamVector::new();
        p.set("id", "1");
        p.set("id", "2");
        assert_eq!(p.len(), 1);
        assert_eq!(p.get("id"), Some("2"));
    }

    #[test]
    fn remove_swaps_with_last() {
        let mut p = ParamVector::new();
        p.set("a", "1");
        p.set("b", "2");
        p.set("c", "3");
        p.remove("a");
        assert_eq!(p.len(), 2);
        assert_eq!(p.get("a"), None);
        assert_eq!(p.get("b"), Some("2"));
        assert_eq!(p.get("c"), Some("3"));
    }

    #[test]
    fn guard_returns_vector_to_pool_reset() {
        let pool = Arc::new(ParamPool::new());
        {
            let mut params = pool.acquire();
            params.set("id", "42");
            assert_eq!(pool.idle(), 0);
        }
        assert_eq!(pool.idle(), 1);
        let params = pool.acquire();
        assert!(params.is_empty());
    }

    #[test]
    fn detach_survives_guard_drop() {
        let pool = Arc::new(ParamPool::new());
        let detached = {
            let mut params = pool.acquire();
            params.set("room", "lobby");
            params.detach()
        };
        assert_eq!(detached.get("room"), Some("lobby"));
        assert_eq!(pool.idle(), 1);
    }
}
