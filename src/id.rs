//! Code for handling IDs
use crate::error::{ModelError, ModelResult};
use indexmap::{IndexMap, IndexSet};
use std::borrow::Borrow;

/// A trait alias for ID types
pub trait IDLike:
    Eq + std::hash::Hash + std::borrow::Borrow<str> + Clone + std::fmt::Display + From<String>
{
}
impl<T> IDLike for T where
    T: Eq + std::hash::Hash + std::borrow::Borrow<str> + Clone + std::fmt::Display + From<String>
{
}

/// Define a new ID type.
///
/// IDs are reference counted with [`std::sync::Arc`] so that a whole model can be moved to
/// another thread, e.g. for scenario sweeps.
macro_rules! define_id_type {
    ($name:ident) => {
        #[derive(
            Clone,
            std::hash::Hash,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            serde::Deserialize,
            Debug,
            serde::Serialize,
        )]
        /// An ID type (e.g. `NodeID`, `TechnologyID`, etc.)
        pub struct $name(pub std::sync::Arc<str>);

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                $name(std::sync::Arc::from(s))
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                $name(std::sync::Arc::from(s))
            }
        }

        impl $name {
            /// Create a new ID from a string slice
            pub fn new(id: &str) -> Self {
                $name(std::sync::Arc::from(id))
            }
        }
    };
}
pub(crate) use define_id_type;

#[cfg(test)]
define_id_type!(GenericID);

/// Indicates that the struct has an ID field
pub trait HasID<ID: IDLike> {
    /// Get the struct's ID
    fn get_id(&self) -> &ID;
}

/// Implement the `HasID` trait for the given type, assuming it has a field called `id`
macro_rules! define_id_getter {
    ($t:ty, $id_ty:ty) => {
        impl crate::id::HasID<$id_ty> for $t {
            fn get_id(&self) -> &$id_ty {
                &self.id
            }
        }
    };
}
pub(crate) use define_id_getter;

/// A data structure which can be used to look up the dense index of an ID
pub trait IDIndex<ID: IDLike> {
    /// Get the position of the ID in the collection.
    ///
    /// # Arguments
    ///
    /// * `id` - The ID to look up
    /// * `referrer` - The entity holding the reference, used in the error message
    ///
    /// # Returns
    ///
    /// The index of the ID in `self`, or a validation error if not found.
    fn index_of(&self, id: &ID, referrer: &str) -> ModelResult<usize>;
}

impl<ID: IDLike> IDIndex<ID> for IndexSet<ID> {
    fn index_of(&self, id: &ID, referrer: &str) -> ModelResult<usize> {
        let key: &str = id.borrow();
        self.get_index_of(key)
            .ok_or_else(|| ModelError::validation(referrer, format!("Unknown ID {id} found")))
    }
}

impl<ID: IDLike, V> IDIndex<ID> for IndexMap<ID, V> {
    fn index_of(&self, id: &ID, referrer: &str) -> ModelResult<usize> {
        let key: &str = id.borrow();
        self.get_index_of(key)
            .ok_or_else(|| ModelError::validation(referrer, format!("Unknown ID {id} found")))
    }
}

/// Collect items into an [`IndexMap`] keyed by ID, rejecting duplicates
pub fn collect_unique<ID, T, I>(items: I, kind: &str) -> ModelResult<IndexMap<ID, T>>
where
    ID: IDLike,
    T: HasID<ID>,
    I: IntoIterator<Item = T>,
{
    let mut map = IndexMap::new();
    for item in items {
        let id = item.get_id().clone();
        if map.insert(id.clone(), item).is_some() {
            return Err(ModelError::validation(&id, format!("Duplicate {kind} ID")));
        }
    }

    Ok(map)
}
