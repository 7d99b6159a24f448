use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A thread-safe, reference-counted resource container with read-write locking.
///
/// `MtResource` wraps an `Arc<RwLock<T>>`. Chunks live in one so that mesh builds on worker
/// threads can hold read guards on a chunk and its neighbors while block edits wait for an
/// exclusive guard. A chunk therefore never changes under a build that is reading it.
///
/// # Examples
///
/// ```
/// use voxel_mesh_pipeline::core::MtResource;
///
/// let counter = MtResource::new(0);
/// let counter_clone = counter.clone();
///
/// let handle = std::thread::spawn(move || {
///     *counter_clone.get_mut() += 1;
/// });
///
/// handle.join().unwrap();
/// assert_eq!(*counter.get(), 1);
/// ```
///
/// # Poisoning
/// A panic on another thread while it held the lock does not make the resource unusable.
/// The guard is recovered and handed out as usual, because every writer in this crate
/// leaves the value in a consistent state between individual assignments.
pub struct MtResource<T: Send + Sync> {
    resource: Arc<RwLock<T>>,
}

impl<T: Send + Sync> MtResource<T> {
    /// Creates a new `MtResource` containing the given value.
    pub fn new(resource: T) -> Self {
        Self {
            resource: Arc::new(RwLock::new(resource)),
        }
    }

    /// Returns a read-only guard. Many readers may hold one at the same time.
    pub fn get(&self) -> RwLockReadGuard<'_, T> {
        self.resource.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns an exclusive guard. Blocks until every reader has released the resource.
    pub fn get_mut(&self) -> RwLockWriteGuard<'_, T> {
        self.resource.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether two handles point at the same underlying value.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.resource, &other.resource)
    }
}

impl<T: Send + Sync> Clone for MtResource<T> {
    fn clone(&self) -> Self {
        Self {
            resource: self.resource.clone(),
        }
    }
}

impl<T: Send + Sync + std::fmt::Debug> std::fmt::Debug for MtResource<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("MtResource").field(&*self.get()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_shares_value() {
        let a = MtResource::new(vec![1, 2, 3]);
        let b = a.clone();
        b.get_mut().push(4);
        assert_eq!(a.get().len(), 4);
        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&MtResource::new(vec![])));
    }

    #[test]
    fn test_recovers_from_poison() {
        let value = MtResource::new(5);
        let clone = value.clone();
        let _ = std::thread::spawn(move || {
            let _guard = clone.get_mut();
            panic!("poison the lock");
        })
        .join();
        assert_eq!(*value.get(), 5);
        *value.get_mut() = 6;
        assert_eq!(*value.get(), 6);
    }
}
