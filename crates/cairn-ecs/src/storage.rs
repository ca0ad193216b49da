//! Sparse-set component tables.
//!
//! Each registered component type gets one [`SparseSet`]: a packed `dense`
//! array of values (cache-friendly iteration), a parallel array of owning
//! entities, and a `sparse` array indexed by entity slot that points into the
//! dense arrays. Every lookup compares the stored handle, so a stale handle
//! whose slot has been recycled never resolves to the new occupant's data.

use std::any::Any;

use crate::entity::EntityId;

/// Type-erased view of a component table, used by the scene for operations
/// that do not know the component type (despawn, diagnostics).
pub(crate) trait AnyStorage: Any {
    /// Drop the entity's value, if present.
    fn remove_entity(&mut self, entity: EntityId) -> bool;
    /// Number of stored values.
    fn len(&self) -> usize;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Packed storage for one component type.
#[derive(Debug)]
pub struct SparseSet<T> {
    sparse: Vec<Option<u32>>,
    entities: Vec<EntityId>,
    dense: Vec<T>,
}

impl<T> Default for SparseSet<T> {
    fn default() -> Self {
        Self {
            sparse: Vec::new(),
            entities: Vec::new(),
            dense: Vec::new(),
        }
    }
}

impl<T> SparseSet<T> {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    fn dense_index(&self, entity: EntityId) -> Option<usize> {
        let slot = (*self.sparse.get(entity.index() as usize)?)? as usize;
        (self.entities[slot] == entity).then_some(slot)
    }

    /// Insert or overwrite the value for `entity`. Returns the previous value.
    pub fn insert(&mut self, entity: EntityId, value: T) -> Option<T> {
        if let Some(slot) = self.dense_index(entity) {
            return Some(std::mem::replace(&mut self.dense[slot], value));
        }
        let idx = entity.index() as usize;
        if idx >= self.sparse.len() {
            self.sparse.resize(idx + 1, None);
        }
        // A different generation may still occupy the slot if its owner was
        // never cleaned up; evict it so the sparse entry stays unique.
        if let Some(stale) = self.sparse[idx] {
            let stale_entity = self.entities[stale as usize];
            self.remove(stale_entity);
        }
        self.sparse[idx] = Some(self.dense.len() as u32);
        self.entities.push(entity);
        self.dense.push(value);
        None
    }

    /// Remove and return the value for `entity`.
    pub fn remove(&mut self, entity: EntityId) -> Option<T> {
        let slot = self.dense_index(entity)?;
        self.sparse[entity.index() as usize] = None;
        let last = self.dense.len() - 1;
        if slot != last {
            let moved = self.entities[last];
            self.sparse[moved.index() as usize] = Some(slot as u32);
        }
        self.entities.swap_remove(slot);
        Some(self.dense.swap_remove(slot))
    }

    /// Whether `entity` has a value in this table.
    pub fn contains(&self, entity: EntityId) -> bool {
        self.dense_index(entity).is_some()
    }

    pub fn get(&self, entity: EntityId) -> Option<&T> {
        self.dense_index(entity).map(|slot| &self.dense[slot])
    }

    pub fn get_mut(&mut self, entity: EntityId) -> Option<&mut T> {
        self.dense_index(entity).map(move |slot| &mut self.dense[slot])
    }

    /// Owning entities, in dense order.
    pub fn entities(&self) -> &[EntityId] {
        &self.entities
    }

    /// Iterate `(entity, &value)` pairs in dense order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &T)> {
        self.entities.iter().copied().zip(self.dense.iter())
    }

    /// Iterate `(entity, &mut value)` pairs in dense order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (EntityId, &mut T)> {
        self.entities.iter().copied().zip(self.dense.iter_mut())
    }

    /// Borrow the owning entities and the values as parallel slices. The
    /// values slice can be split into disjoint chunks for parallel work.
    pub fn split_mut(&mut self) -> (&[EntityId], &mut [T]) {
        (&self.entities, &mut self.dense)
    }

    pub fn len(&self) -> usize {
        self.dense.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dense.is_empty()
    }
}

impl<T: 'static> AnyStorage for SparseSet<T> {
    fn remove_entity(&mut self, entity: EntityId) -> bool {
        self.remove(entity).is_some()
    }

    fn len(&self) -> usize {
        self.dense.len()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
