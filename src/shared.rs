// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Thread-shared world behind one lock
//!
//! Every method takes the lock for the duration of the call only. Nothing
//! borrowed from the world escapes a call: component reads return owned
//! clones or run a closure while the lock is held.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::component::{Component, ComponentSet};
use crate::entity::Entity;
use crate::error::Result;
use crate::observer::{ObserverId, ObserverKind};
use crate::world::World;

/// Cloneable handle to a world shared between threads
#[derive(Clone, Default)]
pub struct SharedWorld {
    inner: Arc<Mutex<World>>,
}

impl SharedWorld {
    pub fn new(world: World) -> Self {
        Self {
            inner: Arc::new(Mutex::new(world)),
        }
    }

    /// Hold the lock across several operations
    pub fn lock(&self) -> MutexGuard<'_, World> {
        self.inner.lock()
    }

    /// Run `f` with exclusive access
    pub fn with<R>(&self, f: impl FnOnce(&mut World) -> R) -> R {
        f(&mut self.inner.lock())
    }

    pub fn create(&self) -> Entity {
        self.inner.lock().create()
    }

    pub fn destroy(&self, entity: Entity) -> bool {
        self.inner.lock().destroy(entity)
    }

    pub fn is_null(&self, entity: Entity) -> bool {
        self.inner.lock().is_null(entity)
    }

    pub fn has_component<T: Component>(&self, entity: Entity) -> bool {
        self.inner.lock().has_component::<T>(entity)
    }

    /// Clone of `entity`'s `T`
    pub fn get_cloned<T: Component + Clone>(&self, entity: Entity) -> Option<T> {
        self.inner.lock().get_component::<T>(entity).cloned()
    }

    /// Run `f` on `entity`'s `T` while the lock is held
    pub fn with_component<T: Component, R>(
        &self,
        entity: Entity,
        f: impl FnOnce(&mut T) -> R,
    ) -> Option<R> {
        self.inner.lock().get_component_mut::<T>(entity).map(f)
    }

    pub fn add_component<T: Component + Default>(&self, entity: Entity) -> Result<()> {
        self.inner.lock().add_component::<T>(entity).map(|_| ())
    }

    pub fn remove_component<T: Component>(&self, entity: Entity) -> Result<T> {
        self.inner.lock().remove_component::<T>(entity)
    }

    pub fn set<T: Component>(&self, entity: Entity, value: T) -> Result<()> {
        self.inner.lock().set(entity, value)
    }

    /// Snapshot of the entities matching `S`
    pub fn query<S: ComponentSet>(&self) -> Vec<Entity> {
        self.inner.lock().query::<S>().iter().collect()
    }

    pub fn observe<T, F>(&self, entity: Entity, kind: ObserverKind, f: F) -> Result<ObserverId>
    where
        T: Component,
        F: FnMut(Entity, &T) + Send + 'static,
    {
        self.inner.lock().observe::<T, F>(entity, kind, f)
    }

    pub fn tick(&self) -> bool {
        self.inner.lock().tick()
    }

    pub fn request_quit(&self) {
        self.inner.lock().request_quit();
    }

    pub fn entity_count(&self) -> usize {
        self.inner.lock().entity_count()
    }
}

impl From<World> for SharedWorld {
    fn from(world: World) -> Self {
        Self::new(world)
    }
}
