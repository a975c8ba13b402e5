//! Resource storage.
//!
//! Two containers with different lifetimes:
//!
//! | Container | Phase | Access |
//! |-----------|-------|--------|
//! | [`Resources`] | Build | Mutable through RAII guards, removable |
//! | [`Globals`] | After `ready()` | Immutable, shared as `Arc<T>` |
//!
//! A registry starts life in [`Resources`] so dependent plugins can populate
//! it, then is moved into [`Globals`] where request-handling code clones an
//! `Arc` handle and never takes a lock on the container again.

use core::any::{Any, TypeId};
use hashbrown::HashMap;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::Arc;

/// A value that can be stored in a resource container.
///
/// Blanket-implemented for every `Send + Sync + 'static` type.
pub trait Resource: Send + Sync + 'static {
    /// Returns the type name for debugging purposes.
    fn type_name(&self) -> &'static str {
        core::any::type_name::<Self>()
    }
}

impl<T: Send + Sync + 'static> Resource for T {}

/// Marker trait for server-lifetime, read-only resources.
///
/// ```
/// use praetor_system::resource::GlobalResource;
///
/// struct Limits { max_waves: usize }
/// impl GlobalResource for Limits {}
/// ```
pub trait GlobalResource: Resource {}

/// Unique identifier for a resource type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceId(TypeId);

impl ResourceId {
    /// Creates a `ResourceId` for the given type.
    #[must_use]
    pub fn of<T: Resource>() -> Self {
        Self(TypeId::of::<T>())
    }
}

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

type Erased = Box<dyn Any + Send + Sync>;

// ─────────────────────────────────────────────────────────────────────────────
// Resources (build phase)
// ─────────────────────────────────────────────────────────────────────────────

/// Container for mutable, build-phase resources.
///
/// # Example
///
/// ```
/// use praetor_system::resource::Resources;
///
/// struct Pending { names: Vec<String> }
///
/// let mut resources = Resources::new();
/// resources.insert(Pending { names: Vec::new() });
///
/// resources.get_mut::<Pending>().unwrap().names.push("allowlist".into());
/// assert_eq!(resources.get::<Pending>().unwrap().names.len(), 1);
/// ```
#[derive(Default)]
pub struct Resources {
    storage: HashMap<ResourceId, RwLock<Erased>>,
}

impl Resources {
    /// Creates a new empty resource container.
    #[must_use]
    pub fn new() -> Self {
        Self {
            storage: HashMap::new(),
        }
    }

    /// Inserts a resource, returning the value it replaced.
    pub fn insert<T: Resource>(&mut self, resource: T) -> Option<T> {
        self.storage
            .insert(ResourceId::of::<T>(), RwLock::new(Box::new(resource)))
            .and_then(|old| old.into_inner().downcast::<T>().ok().map(|boxed| *boxed))
    }

    /// Returns `true` if a resource of type `T` exists.
    #[must_use]
    pub fn contains<T: Resource>(&self) -> bool {
        self.storage.contains_key(&ResourceId::of::<T>())
    }

    /// Gets an immutable guard to a resource.
    ///
    /// # Errors
    ///
    /// - [`ResourceError::NotFound`] if the resource type is not registered
    /// - [`ResourceError::BorrowConflict`] if the resource is mutably borrowed
    pub fn get<T: Resource>(&self) -> Result<ResourceRef<'_, T>, ResourceError> {
        let type_name = core::any::type_name::<T>();
        let entry = self
            .storage
            .get(&ResourceId::of::<T>())
            .ok_or(ResourceError::NotFound(type_name))?;
        let guard = entry
            .try_read()
            .ok_or(ResourceError::BorrowConflict(type_name))?;
        Ok(ResourceRef {
            guard,
            _marker: core::marker::PhantomData,
        })
    }

    /// Gets a mutable guard to a resource.
    ///
    /// # Errors
    ///
    /// - [`ResourceError::NotFound`] if the resource type is not registered
    /// - [`ResourceError::BorrowConflict`] if the resource is already borrowed
    pub fn get_mut<T: Resource>(&self) -> Result<ResourceRefMut<'_, T>, ResourceError> {
        let type_name = core::any::type_name::<T>();
        let entry = self
            .storage
            .get(&ResourceId::of::<T>())
            .ok_or(ResourceError::NotFound(type_name))?;
        let guard = entry
            .try_write()
            .ok_or(ResourceError::BorrowConflict(type_name))?;
        Ok(ResourceRefMut {
            guard,
            _marker: core::marker::PhantomData,
        })
    }

    /// Removes a resource from the container and returns it.
    pub fn remove<T: Resource>(&mut self) -> Option<T> {
        self.storage
            .remove(&ResourceId::of::<T>())
            .and_then(|entry| entry.into_inner().downcast::<T>().ok().map(|boxed| *boxed))
    }

    /// Returns the number of resources stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    /// Returns `true` if no resources are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }
}

/// RAII guard for immutable resource access.
pub struct ResourceRef<'a, T: Resource> {
    guard: RwLockReadGuard<'a, Erased>,
    _marker: core::marker::PhantomData<&'a T>,
}

impl<T: Resource> core::ops::Deref for ResourceRef<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.guard
            .downcast_ref::<T>()
            .expect("resource type mismatch (this is a bug)")
    }
}

/// RAII guard for mutable resource access.
pub struct ResourceRefMut<'a, T: Resource> {
    guard: RwLockWriteGuard<'a, Erased>,
    _marker: core::marker::PhantomData<&'a mut T>,
}

impl<T: Resource> core::ops::Deref for ResourceRefMut<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.guard
            .downcast_ref::<T>()
            .expect("resource type mismatch (this is a bug)")
    }
}

impl<T: Resource> core::ops::DerefMut for ResourceRefMut<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.guard
            .downcast_mut::<T>()
            .expect("resource type mismatch (this is a bug)")
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Globals (after ready)
// ─────────────────────────────────────────────────────────────────────────────

/// Container for frozen, shared resources.
///
/// Values are stored behind `Arc`, so handing one to a spawned task is a
/// reference-count bump and no lock is held across `.await` points.
#[derive(Default)]
pub struct Globals {
    storage: HashMap<ResourceId, Arc<dyn Any + Send + Sync>>,
}

impl Globals {
    /// Creates a new empty container.
    #[must_use]
    pub fn new() -> Self {
        Self {
            storage: HashMap::new(),
        }
    }

    /// Inserts a global, returning `true` if one of the same type was replaced.
    pub fn insert<T: GlobalResource>(&mut self, resource: T) -> bool {
        self.insert_arc(Arc::new(resource))
    }

    /// Inserts an already shared global.
    pub fn insert_arc<T: GlobalResource>(&mut self, resource: Arc<T>) -> bool {
        self.storage
            .insert(ResourceId::of::<T>(), resource)
            .is_some()
    }

    /// Returns `true` if a global of type `T` exists.
    #[must_use]
    pub fn contains<T: GlobalResource>(&self) -> bool {
        self.storage.contains_key(&ResourceId::of::<T>())
    }

    /// Returns a shared handle to a global.
    #[must_use]
    pub fn get<T: GlobalResource>(&self) -> Option<Arc<T>> {
        self.storage
            .get(&ResourceId::of::<T>())
            .cloned()
            .and_then(|erased| erased.downcast::<T>().ok())
    }

    /// Returns the number of globals stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    /// Returns `true` if no globals are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Counter {
        value: i32,
    }

    #[derive(Debug, PartialEq)]
    struct Limits {
        max_waves: usize,
    }
    impl GlobalResource for Limits {}

    #[test]
    fn insert_replaces_existing() {
        let mut resources = Resources::new();
        resources.insert(Counter { value: 1 });

        let old = resources.insert(Counter { value: 2 });
        assert_eq!(old, Some(Counter { value: 1 }));
        assert_eq!(resources.get::<Counter>().unwrap().value, 2);
    }

    #[test]
    fn mutable_borrow_blocks_immutable() {
        let mut resources = Resources::new();
        resources.insert(Counter { value: 42 });

        let _borrow_mut = resources.get_mut::<Counter>().unwrap();
        let result = resources.get::<Counter>();

        assert!(matches!(result, Err(ResourceError::BorrowConflict(_))));
    }

    #[test]
    fn remove_returns_resource() {
        let mut resources = Resources::new();
        resources.insert(Counter { value: 42 });

        assert_eq!(resources.remove::<Counter>(), Some(Counter { value: 42 }));
        assert!(matches!(
            resources.get::<Counter>(),
            Err(ResourceError::NotFound(_))
        ));
    }

    #[test]
    fn globals_share_one_allocation() {
        let mut globals = Globals::new();
        assert!(!globals.insert(Limits { max_waves: 8 }));

        let a = globals.get::<Limits>().unwrap();
        let b = globals.get::<Limits>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.max_waves, 8);
    }

    #[test]
    fn globals_missing_is_none() {
        let globals = Globals::new();
        assert!(globals.get::<Limits>().is_none());
        assert!(globals.is_empty());
    }
}
