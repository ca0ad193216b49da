//! The [`Scene`] is the entity store: it owns the entity allocator, the
//! component registry and one [`SparseSet`] table per registered component
//! type. It knows nothing about physics or behaviors.
//!
//! Every accessor validates the handle's generation before touching a
//! table, so operations on destroyed entities resolve to `None`/`false` or
//! [`EcsError::StaleEntity`].

use std::any::TypeId;
use std::collections::HashMap;

use tracing::{debug, warn};

use crate::component::{Component, ComponentRegistry, ComponentTypeId};
use crate::entity::{EntityAllocator, EntityId};
use crate::storage::{AnyStorage, SparseSet};
use crate::EcsError;

/// Container for entities and their component tables.
#[derive(Default)]
pub struct Scene {
    allocator: EntityAllocator,
    registry: ComponentRegistry,
    tables: HashMap<TypeId, Box<dyn AnyStorage>>,
}

impl std::fmt::Debug for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scene")
            .field("entities", &self.allocator.alive_count())
            .field("components", &self.registry.registered_names())
            .finish()
    }
}

impl Scene {
    /// Create an empty scene.
    pub fn new() -> Self {
        Self::default()
    }

    /// The component registry.
    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    /// Register a component type and create its table. Registering the same
    /// type twice is a no-op that returns the existing id.
    pub fn register_component<T: Component>(&mut self, name: &str) -> ComponentTypeId {
        if let Some(existing) = self.registry.lookup::<T>() {
            debug!(component = name, "component already registered");
            return existing;
        }
        let id = self.registry.register::<T>(name);
        self.tables
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(SparseSet::<T>::new()));
        id
    }

    // -- tables -------------------------------------------------------------

    /// Read-only access to the table for `T`, if registered.
    pub fn table<T: Component>(&self) -> Option<&SparseSet<T>> {
        self.tables
            .get(&TypeId::of::<T>())
            .and_then(|t| t.as_any().downcast_ref::<SparseSet<T>>())
    }

    /// Mutable access to the table for `T`, if registered.
    pub fn table_mut<T: Component>(&mut self) -> Option<&mut SparseSet<T>> {
        self.tables
            .get_mut(&TypeId::of::<T>())
            .and_then(|t| t.as_any_mut().downcast_mut::<SparseSet<T>>())
    }

    fn table_or_err<T: Component>(&mut self) -> Result<&mut SparseSet<T>, EcsError> {
        self.tables
            .get_mut(&TypeId::of::<T>())
            .and_then(|t| t.as_any_mut().downcast_mut::<SparseSet<T>>())
            .ok_or_else(|| EcsError::UnknownComponent(std::any::type_name::<T>().to_owned()))
    }

    // -- entity lifecycle ---------------------------------------------------

    /// Allocate a new entity with no components.
    pub fn spawn(&mut self) -> EntityId {
        self.allocator.allocate()
    }

    /// Spawn a new entity carrying one component.
    ///
    /// # Panics
    ///
    /// Panics if `T` has not been registered.
    pub fn spawn_with<T: Component>(&mut self, component: T) -> EntityId {
        let entity = self.spawn();
        if let Err(e) = self.insert_component(entity, component) {
            panic!("spawn_with: {e}");
        }
        entity
    }

    /// Destroy an entity, dropping all of its components and bumping the
    /// generation of its slot.
    pub fn despawn(&mut self, entity: EntityId) -> Result<(), EcsError> {
        if !self.allocator.is_alive(entity) {
            warn!(entity = %entity, "despawn of a stale entity ignored");
            return Err(EcsError::StaleEntity(entity));
        }
        for table in self.tables.values_mut() {
            table.remove_entity(entity);
        }
        self.allocator.deallocate(entity);
        Ok(())
    }

    /// Whether `entity` is a live handle of this scene.
    pub fn is_alive(&self, entity: EntityId) -> bool {
        self.allocator.is_alive(entity)
    }

    /// Number of live entities.
    pub fn entity_count(&self) -> usize {
        self.allocator.alive_count()
    }

    /// All live entities in slot order.
    pub fn entities(&self) -> Vec<EntityId> {
        self.allocator.iter_alive().collect()
    }

    // -- component access ---------------------------------------------------

    /// Attach (or overwrite) a component.
    pub fn insert_component<T: Component>(
        &mut self,
        entity: EntityId,
        value: T,
    ) -> Result<(), EcsError> {
        if !self.allocator.is_alive(entity) {
            return Err(EcsError::StaleEntity(entity));
        }
        self.table_or_err::<T>()?.insert(entity, value);
        Ok(())
    }

    /// Detach a component, returning it. `Ok(None)` if the entity is alive
    /// but did not carry one.
    pub fn remove_component<T: Component>(&mut self, entity: EntityId) -> Result<Option<T>, EcsError> {
        if !self.allocator.is_alive(entity) {
            return Err(EcsError::StaleEntity(entity));
        }
        Ok(self.table_or_err::<T>()?.remove(entity))
    }

    pub fn get_component<T: Component>(&self, entity: EntityId) -> Option<&T> {
        if !self.allocator.is_alive(entity) {
            return None;
        }
        self.table::<T>()?.get(entity)
    }

    pub fn get_component_mut<T: Component>(&mut self, entity: EntityId) -> Option<&mut T> {
        if !self.allocator.is_alive(entity) {
            return None;
        }
        self.table_mut::<T>()?.get_mut(entity)
    }

    /// Fetch a component or report why it is missing.
    pub fn try_component<T: Component>(&self, entity: EntityId) -> Result<&T, EcsError> {
        if !self.allocator.is_alive(entity) {
            return Err(EcsError::StaleEntity(entity));
        }
        let table = self
            .table::<T>()
            .ok_or_else(|| EcsError::UnknownComponent(std::any::type_name::<T>().to_owned()))?;
        table.get(entity).ok_or(EcsError::MissingComponent {
            entity,
            component: std::any::type_name::<T>(),
        })
    }

    pub fn has_component<T: Component>(&self, entity: EntityId) -> bool {
        self.get_component::<T>(entity).is_some()
    }

    /// Snapshot of every entity currently carrying `T`, in table order.
    ///
    /// Iterating the snapshot instead of the live table lets callers mutate
    /// the scene (including despawning) while walking it.
    pub fn entities_with<T: Component>(&self) -> Vec<EntityId> {
        self.table::<T>()
            .map(|t| t.entities().to_vec())
            .unwrap_or_default()
    }

    /// Iterate `(entity, &T)` over the live table.
    pub fn iter<T: Component>(&self) -> impl Iterator<Item = (EntityId, &T)> {
        self.table::<T>().into_iter().flat_map(|t| t.iter())
    }

    /// Iterate `(entity, &mut T)` over the live table.
    pub fn iter_mut<T: Component>(&mut self) -> impl Iterator<Item = (EntityId, &mut T)> {
        self.table_mut::<T>().into_iter().flat_map(|t| t.iter_mut())
    }

    /// Number of values stored for `T` (0 if unregistered).
    pub fn component_count<T: Component>(&self) -> usize {
        self.table::<T>().map_or(0, |t| t.len())
    }

    /// Total values stored across all tables.
    pub fn total_component_count(&self) -> usize {
        self.tables.values().map(|t| t.len()).sum()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
