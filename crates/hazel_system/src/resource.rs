//! Resource storage and management.
//!
//! Resources are server-owned state keyed by type. Plugins insert them during
//! the build phase (the gateway publishes its connector registry this way)
//! and other plugins or the host read them afterwards.

use core::any::{Any, TypeId};
use hashbrown::HashMap;
use parking_lot::{
    MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLock, RwLockReadGuard, RwLockWriteGuard,
};

/// A value that can be stored in [`Resources`].
///
/// Any type that is `Send + Sync + 'static` is a resource.
pub trait Resource: Send + Sync + 'static {}

impl<T: Send + Sync + 'static> Resource for T {}

/// Read guard for a resource.
pub type ResourceRef<'a, R> = MappedRwLockReadGuard<'a, R>;

/// Write guard for a resource.
pub type ResourceRefMut<'a, R> = MappedRwLockWriteGuard<'a, R>;

/// Errors that can occur during resource operations.
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    /// The requested resource type was not found in the container.
    #[error("resource not found: {0}")]
    NotFound(&'static str),

    /// The resource is currently borrowed and cannot be accessed this way.
    #[error("resource already borrowed: {0}")]
    BorrowConflict(&'static str),
}

type BoxedResource = Box<dyn Any + Send + Sync>;

/// Container for type-keyed resources.
///
/// Each entry sits behind its own `RwLock`, allowing concurrent readers or a
/// single writer per resource type. Accessors never block: a conflicting
/// borrow is reported as [`ResourceError::BorrowConflict`].
///
/// # Example
///
/// ```
/// use hazel_system::resource::Resources;
///
/// struct Counter { value: i32 }
///
/// let mut resources = Resources::new();
/// resources.insert(Counter { value: 0 });
///
/// resources.get_mut::<Counter>().unwrap().value += 1;
/// assert_eq!(resources.get::<Counter>().unwrap().value, 1);
/// ```
#[derive(Default)]
pub struct Resources {
    storage: HashMap<TypeId, RwLock<BoxedResource>>,
}

impl Resources {
    /// Creates a new empty resource container.
    #[must_use]
    pub fn new() -> Self {
        Self {
            storage: HashMap::new(),
        }
    }

    /// Inserts a resource, returning the previous value of the same type.
    pub fn insert<R: Resource>(&mut self, resource: R) -> Option<R> {
        self.storage
            .insert(TypeId::of::<R>(), RwLock::new(Box::new(resource)))
            .and_then(|old| old.into_inner().downcast::<R>().ok())
            .map(|boxed| *boxed)
    }

    /// Returns true if a resource of type `R` exists.
    #[must_use]
    pub fn contains<R: Resource>(&self) -> bool {
        self.storage.contains_key(&TypeId::of::<R>())
    }

    /// Borrows a resource immutably.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::NotFound`] if absent and
    /// [`ResourceError::BorrowConflict`] if it is mutably borrowed.
    pub fn get<R: Resource>(&self) -> Result<ResourceRef<'_, R>, ResourceError> {
        let name = core::any::type_name::<R>();
        let entry = self
            .storage
            .get(&TypeId::of::<R>())
            .ok_or(ResourceError::NotFound(name))?;
        let guard = entry
            .try_read()
            .ok_or(ResourceError::BorrowConflict(name))?;
        RwLockReadGuard::try_map(guard, |boxed| boxed.downcast_ref::<R>())
            .map_err(|_| ResourceError::NotFound(name))
    }

    /// Borrows a resource mutably.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::NotFound`] if absent and
    /// [`ResourceError::BorrowConflict`] if it is already borrowed.
    pub fn get_mut<R: Resource>(&self) -> Result<ResourceRefMut<'_, R>, ResourceError> {
        let name = core::any::type_name::<R>();
        let entry = self
            .storage
            .get(&TypeId::of::<R>())
            .ok_or(ResourceError::NotFound(name))?;
        let guard = entry
            .try_write()
            .ok_or(ResourceError::BorrowConflict(name))?;
        RwLockWriteGuard::try_map(guard, |boxed| boxed.downcast_mut::<R>())
            .map_err(|_| ResourceError::NotFound(name))
    }

    /// Removes a resource and returns it.
    pub fn remove<R: Resource>(&mut self) -> Option<R> {
        self.storage
            .remove(&TypeId::of::<R>())
            .and_then(|entry| entry.into_inner().downcast::<R>().ok())
            .map(|boxed| *boxed)
    }

    /// Returns the number of stored resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    /// Returns true if no resources are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Drops every stored resource.
    pub fn clear(&mut self) {
        self.storage.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Counter(u32);

    #[test]
    fn insert_replaces_and_returns_previous() {
        let mut resources = Resources::new();
        assert!(resources.insert(Counter(1)).is_none());
        assert_eq!(resources.insert(Counter(2)), Some(Counter(1)));
        assert_eq!(resources.get::<Counter>().unwrap().0, 2);
    }

    #[test]
    fn missing_resource_is_not_found() {
        let resources = Resources::new();
        assert!(matches!(
            resources.get::<Counter>(),
            Err(ResourceError::NotFound(_))
        ));
    }

    #[test]
    fn write_while_reading_is_a_conflict() {
        let mut resources = Resources::new();
        resources.insert(Counter(0));

        let _read = resources.get::<Counter>().unwrap();
        assert!(matches!(
            resources.get_mut::<Counter>(),
            Err(ResourceError::BorrowConflict(_))
        ));
    }

    #[test]
    fn remove_takes_ownership() {
        let mut resources = Resources::new();
        resources.insert(Counter(7));

        assert_eq!(resources.remove::<Counter>(), Some(Counter(7)));
        assert!(!resources.contains::<Counter>());
        assert!(resources.is_empty());
    }
}
