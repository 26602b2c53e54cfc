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

//! Component identity and type-erased type information
//!
//! Components are data attached to entities. Once stored in a column the
//! store no longer knows the concrete type, so every type gets a
//! [`ComponentInfo`] at registration: its layout plus the function pointers
//! the column needs to drop (and optionally clone) elements.

use std::alloc::Layout;
use std::any::{type_name, TypeId};
use std::ptr;

use ahash::AHashMap;
use smallvec::{smallvec, SmallVec};

/// Maximum number of components in a [`ComponentSet`] before spilling to the heap
pub const MAX_SET_COMPONENTS: usize = 8;

/// Marker trait for components
///
/// Components must be 'static (no borrowed data)
pub trait Component: 'static + Send + Sync {}

/// Automatically implement Component for all valid types
impl<T: 'static + Send + Sync> Component for T {}

/// Process-wide stable identity of a component type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(TypeId);

impl ComponentId {
    #[inline]
    pub fn of<T: Component>() -> Self {
        Self(TypeId::of::<T>())
    }

    pub fn type_id(self) -> TypeId {
        self.0
    }
}

/// Drops a value of type `T` in place
unsafe fn drop_impl<T>(ptr: *mut u8) {
    ptr::drop_in_place(ptr as *mut T);
}

/// Clones the `T` at `src` into uninitialized memory at `dst`
unsafe fn clone_impl<T: Clone>(src: *const u8, dst: *mut u8) {
    let value = (*(src as *const T)).clone();
    ptr::write(dst as *mut T, value);
}

/// Type-erased description of a component type
///
/// Moves are always a bitwise copy in Rust, so only drop and clone need
/// function pointers. A type without drop glue is trivial: relocating or
/// discarding it is pure byte work.
#[derive(Debug, Clone, Copy)]
pub struct ComponentInfo {
    id: ComponentId,
    name: &'static str,
    layout: Layout,
    drop_fn: Option<unsafe fn(*mut u8)>,
    clone_fn: Option<unsafe fn(*const u8, *mut u8)>,
}

impl ComponentInfo {
    /// Describe `T` without clone support
    pub fn of<T: Component>() -> Self {
        Self {
            id: ComponentId::of::<T>(),
            name: type_name::<T>(),
            layout: Layout::new::<T>(),
            drop_fn: if std::mem::needs_drop::<T>() {
                Some(drop_impl::<T>)
            } else {
                None
            },
            clone_fn: None,
        }
    }

    /// Describe `T` including its clone function
    pub fn cloneable<T: Component + Clone>() -> Self {
        Self {
            clone_fn: Some(clone_impl::<T>),
            ..Self::of::<T>()
        }
    }

    pub fn id(&self) -> ComponentId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn size(&self) -> usize {
        self.layout.size()
    }

    pub fn align(&self) -> usize {
        self.layout.align()
    }

    /// No drop glue: relocation and removal are raw byte operations
    pub fn is_trivial(&self) -> bool {
        self.drop_fn.is_none()
    }

    /// Zero-sized and trivial: present in type sets but backed by no column
    pub fn is_tag(&self) -> bool {
        self.layout.size() == 0 && self.is_trivial()
    }

    pub fn is_cloneable(&self) -> bool {
        self.clone_fn.is_some()
    }

    /// Drop the element at `ptr`
    ///
    /// # Safety
    /// `ptr` must point to an initialized value of this component type that
    /// is not used again afterwards.
    pub unsafe fn drop_in_place(&self, ptr: *mut u8) {
        if let Some(drop_fn) = self.drop_fn {
            drop_fn(ptr);
        }
    }

    /// Clone the element at `src` into `dst`. Returns false if the type has
    /// no clone function, in which case `dst` is untouched.
    ///
    /// # Safety
    /// `src` must point to an initialized value of this type and `dst` to
    /// writable, aligned, uninitialized memory for one element.
    pub unsafe fn clone_into(&self, src: *const u8, dst: *mut u8) -> bool {
        match self.clone_fn {
            Some(clone_fn) => {
                clone_fn(src, dst);
                true
            }
            None => false,
        }
    }
}

/// Registry of every component type the store has seen
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    infos: AHashMap<ComponentId, ComponentInfo>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the info for `T`
    pub fn register<T: Component>(&mut self) -> ComponentInfo {
        *self
            .infos
            .entry(ComponentId::of::<T>())
            .or_insert_with(ComponentInfo::of::<T>)
    }

    /// Register `T` with clone support, upgrading an earlier plain registration
    pub fn register_cloneable<T: Component + Clone>(&mut self) -> ComponentInfo {
        let info = ComponentInfo::cloneable::<T>();
        self.infos.insert(info.id(), info);
        info
    }

    pub fn get(&self, id: ComponentId) -> Option<&ComponentInfo> {
        self.infos.get(&id)
    }

    pub fn name_of(&self, id: ComponentId) -> &'static str {
        self.infos.get(&id).map_or("<unregistered>", |info| info.name())
    }

    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }
}

/// A compile-time list of component types, used to name query signatures
pub trait ComponentSet: 'static {
    /// Component ids in declaration order (not yet canonicalized)
    fn component_ids() -> SmallVec<[ComponentId; MAX_SET_COMPONENTS]>;
}

impl ComponentSet for () {
    fn component_ids() -> SmallVec<[ComponentId; MAX_SET_COMPONENTS]> {
        SmallVec::new()
    }
}

macro_rules! impl_component_set {
    ($($T:ident),*) => {
        impl<$($T: Component),*> ComponentSet for ($($T,)*) {
            fn component_ids() -> SmallVec<[ComponentId; MAX_SET_COMPONENTS]> {
                smallvec![$(ComponentId::of::<$T>()),*]
            }
        }
    };
}

// Implement for tuples of 1-8 components
impl_component_set!(A);
impl_component_set!(A, B);
impl_component_set!(A, B, C);
impl_component_set!(A, B, C, D);
impl_component_set!(A, B, C, D, E);
impl_component_set!(A, B, C, D, E, F);
impl_component_set!(A, B, C, D, E, F, G);
impl_component_set!(A, B, C, D, E, F, G, H);

#[cfg(test)]
mod tests {
    #![allow(dead_code)]
    use super::*;

    #[derive(Debug, Clone, Default)]
    struct Position {
        x: f32,
        y: f32,
    }

    struct Marker;

    #[test]
    fn test_info_flags() {
        let pos = ComponentInfo::of::<Position>();
        assert!(pos.is_trivial());
        assert!(!pos.is_tag());
        assert!(!pos.is_cloneable());
        assert_eq!(pos.size(), std::mem::size_of::<Position>());

        let marker = ComponentInfo::of::<Marker>();
        assert!(marker.is_tag());

        let name = ComponentInfo::of::<String>();
        assert!(!name.is_trivial());
    }

    #[test]
    fn test_registry_upgrade_to_cloneable() {
        let mut registry = ComponentRegistry::new();
        let plain = registry.register::<Position>();
        assert!(!plain.is_cloneable());
        registry.register_cloneable::<Position>();
        assert!(registry
            .get(ComponentId::of::<Position>())
            .unwrap()
            .is_cloneable());
        // Plain registration keeps the upgraded entry
        assert!(registry.register::<Position>().is_cloneable());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_clone_into() {
        let info = ComponentInfo::cloneable::<String>();
        let src = String::from("hello");
        let mut dst = std::mem::MaybeUninit::<String>::uninit();
        unsafe {
            assert!(info.clone_into(
                &src as *const String as *const u8,
                dst.as_mut_ptr() as *mut u8
            ));
            assert_eq!(dst.assume_init(), "hello");
        }
    }

    #[test]
    fn test_component_set_ids() {
        let ids = <(Position, Marker)>::component_ids();
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[0], ComponentId::of::<Position>());
        assert!(<()>::component_ids().is_empty());
    }
}
