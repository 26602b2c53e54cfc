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

//! Type-erased component column
//!
//! A [`Column`] is a manually managed byte buffer holding the values of one
//! component type for every row of an archetype. Rows `0..len` are
//! initialized; `len..capacity` is uninitialized spare room. Capacity only
//! grows (doubling) until the column is reset.

use std::alloc::{self, Layout};
use std::ptr::{self, NonNull};

use crate::component::{Component, ComponentId, ComponentInfo};
use crate::error::{EcsError, Result};

/// Type-erased, densely packed storage for a single component type
pub struct Column {
    info: ComponentInfo,
    data: NonNull<u8>,
    len: usize,
    capacity: usize,
}

// Column only stores raw bytes; `Component` requires Send + Sync for every
// type that can end up in one.
unsafe impl Send for Column {}
unsafe impl Sync for Column {}

impl Column {
    /// Create a column for `info` with room for `capacity` elements
    pub fn new(info: ComponentInfo, capacity: usize) -> Result<Self> {
        let mut column = Self::unallocated(info);
        column.resize(capacity)?;
        Ok(column)
    }

    fn unallocated(info: ComponentInfo) -> Self {
        // Aligned dangling pointer; valid for zero-sized reads and writes
        let data = NonNull::new(info.align() as *mut u8).unwrap_or(NonNull::dangling());
        Self {
            info,
            data,
            len: 0,
            capacity: if info.size() == 0 { usize::MAX } else { 0 },
        }
    }

    pub fn info(&self) -> &ComponentInfo {
        &self.info
    }

    pub fn component_id(&self) -> ComponentId {
        self.info.id()
    }

    pub fn element_size(&self) -> usize {
        self.info.size()
    }

    /// Number of live elements
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of elements the current buffer holds
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes occupied by live elements
    pub fn memory_used(&self) -> usize {
        self.len * self.info.size()
    }

    fn layout_for(&self, capacity: usize) -> Result<Layout> {
        let overflow = || EcsError::CapacityOverflow {
            requested: capacity,
            element_size: self.info.size(),
        };
        let bytes = self.info.size().checked_mul(capacity).ok_or_else(overflow)?;
        Layout::from_size_align(bytes, self.info.align()).map_err(|_| overflow())
    }

    /// Drop every live element and replace the buffer with a fresh one of
    /// `capacity` elements
    pub fn allocate(&mut self, capacity: usize) -> Result<()> {
        self.clear();
        self.release();
        self.resize(capacity)
    }

    /// Grow the buffer to hold `new_capacity` elements. Never shrinks.
    ///
    /// Live elements are relocated by `realloc`; every Rust value is
    /// bitwise-movable, so this is correct for non-trivial types too.
    pub fn resize(&mut self, new_capacity: usize) -> Result<()> {
        if new_capacity <= self.capacity || new_capacity == 0 {
            return Ok(());
        }
        let new_layout = self.layout_for(new_capacity)?;
        let new_data = unsafe {
            if self.capacity == 0 {
                alloc::alloc(new_layout)
            } else {
                let old_layout = self.layout_for(self.capacity)?;
                alloc::realloc(self.data.as_ptr(), old_layout, new_layout.size())
            }
        };
        self.data = match NonNull::new(new_data) {
            Some(data) => data,
            None => alloc::handle_alloc_error(new_layout),
        };
        self.capacity = new_capacity;
        Ok(())
    }

    /// Make room for one more element, doubling capacity when full
    pub fn reserve_one(&mut self) -> Result<()> {
        if self.len < self.capacity {
            return Ok(());
        }
        let doubled = self
            .capacity
            .checked_mul(2)
            .ok_or(EcsError::CapacityOverflow {
                requested: self.capacity,
                element_size: self.info.size(),
            })?;
        self.resize(doubled.max(1))
    }

    #[inline]
    fn slot_ptr(&self, row: usize) -> *mut u8 {
        debug_assert!(row < self.capacity || self.info.size() == 0);
        unsafe { self.data.as_ptr().add(row * self.info.size()) }
    }

    /// Bounds-checked pointer to a live element
    pub fn element_at(&self, row: usize) -> Result<NonNull<u8>> {
        if row >= self.len {
            return Err(EcsError::RowOutOfBounds { row, len: self.len });
        }
        // slot_ptr is derived from a non-null base
        Ok(unsafe { NonNull::new_unchecked(self.slot_ptr(row)) })
    }

    /// Typed shared access; `None` on type mismatch or out-of-range row
    pub fn get<T: Component>(&self, row: usize) -> Option<&T> {
        if self.info.id() != ComponentId::of::<T>() || row >= self.len {
            return None;
        }
        Some(unsafe { &*(self.slot_ptr(row) as *const T) })
    }

    /// Typed exclusive access; `None` on type mismatch or out-of-range row
    pub fn get_mut<T: Component>(&mut self, row: usize) -> Option<&mut T> {
        if self.info.id() != ComponentId::of::<T>() || row >= self.len {
            return None;
        }
        Some(unsafe { &mut *(self.slot_ptr(row) as *mut T) })
    }

    /// Append a typed value. Grows the buffer if needed.
    pub fn push<T: Component>(&mut self, value: T) -> Result<usize> {
        debug_assert_eq!(self.info.id(), ComponentId::of::<T>());
        self.reserve_one()?;
        let row = self.len;
        unsafe { ptr::write(self.slot_ptr(row) as *mut T, value) };
        self.len += 1;
        Ok(row)
    }

    /// Append the element at `src` by bitwise move
    ///
    /// # Safety
    /// Capacity must already be reserved. `src` must point to an initialized
    /// value of this column's type outside this column's live range; the
    /// caller gives up ownership of it.
    pub unsafe fn push_from(&mut self, src: *const u8) {
        debug_assert!(self.len < self.capacity);
        ptr::copy_nonoverlapping(src, self.slot_ptr(self.len), self.info.size());
        self.len += 1;
    }

    /// Append a clone of row `row` using `cloner`'s clone function.
    /// Returns `Ok(false)` when `cloner` has none.
    pub fn push_clone_of(&mut self, row: usize, cloner: &ComponentInfo) -> Result<bool> {
        debug_assert_eq!(cloner.id(), self.info.id());
        if !cloner.is_cloneable() {
            return Ok(false);
        }
        if row >= self.len {
            return Err(EcsError::RowOutOfBounds { row, len: self.len });
        }
        self.reserve_one()?;
        let cloned = unsafe { cloner.clone_into(self.slot_ptr(row), self.slot_ptr(self.len)) };
        if cloned {
            self.len += 1;
        }
        Ok(cloned)
    }

    /// Overwrite a live element, dropping the previous value
    pub fn replace<T: Component>(&mut self, row: usize, value: T) -> Option<()> {
        let slot = self.get_mut::<T>(row)?;
        *slot = value;
        Some(())
    }

    /// Run the destructor of the element at `row` without compacting
    ///
    /// # Safety
    /// `row` must be live. The slot is logically uninitialized afterwards and
    /// must be compacted with [`Column::swap_remove_forget`] before any other access.
    pub unsafe fn drop_at(&mut self, row: usize) {
        debug_assert!(row < self.len);
        self.info.drop_in_place(self.slot_ptr(row));
    }

    /// Compact `row` by moving the last element into it, without dropping
    /// whatever `row` held
    ///
    /// # Safety
    /// `row` must be live and its value already moved out or dropped.
    pub unsafe fn swap_remove_forget(&mut self, row: usize) {
        debug_assert!(row < self.len);
        let last = self.len - 1;
        if row != last {
            ptr::copy_nonoverlapping(self.slot_ptr(last), self.slot_ptr(row), self.info.size());
        }
        self.len = last;
    }

    /// Drop the element at `row` and move the last element into its place
    pub fn swap_remove(&mut self, row: usize) -> Result<()> {
        if row >= self.len {
            return Err(EcsError::RowOutOfBounds { row, len: self.len });
        }
        unsafe {
            self.drop_at(row);
            self.swap_remove_forget(row);
        }
        Ok(())
    }

    /// Drop every live element at or past `len`, keeping the buffer
    pub fn truncate(&mut self, len: usize) {
        if len >= self.len {
            return;
        }
        if !self.info.is_trivial() {
            for row in len..self.len {
                unsafe { self.info.drop_in_place(self.slot_ptr(row)) };
            }
        }
        self.len = len;
    }

    /// Drop every live element, keeping the buffer
    pub fn clear(&mut self) {
        self.truncate(0);
    }

    fn release(&mut self) {
        if self.info.size() == 0 || self.capacity == 0 {
            return;
        }
        if let Ok(layout) = self.layout_for(self.capacity) {
            unsafe { alloc::dealloc(self.data.as_ptr(), layout) };
        }
        self.data = NonNull::new(self.info.align() as *mut u8).unwrap_or(NonNull::dangling());
        self.capacity = 0;
    }
}

impl Drop for Column {
    fn drop(&mut self) {
        self.clear();
        self.release();
    }
}

impl std::fmt::Debug for Column {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Column")
            .field("component", &self.info.name())
            .field("len", &self.len)
            .field("capacity", &self.capacity)
            .field("element_size", &self.info.size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }

    struct DropCounter(Arc<AtomicUsize>);

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_capacity_doubles_from_initial() {
        let mut column = Column::new(ComponentInfo::of::<Position>(), 2).unwrap();
        assert_eq!(column.capacity(), 2);
        for i in 0..5 {
            column
                .push(Position {
                    x: i as f32,
                    y: 0.0,
                })
                .unwrap();
        }
        assert_eq!(column.len(), 5);
        assert_eq!(column.capacity(), 8);
        assert_eq!(column.get::<Position>(4).unwrap().x, 4.0);
        assert_eq!(column.memory_used(), 5 * std::mem::size_of::<Position>());
    }

    #[test]
    fn test_element_at_bounds() {
        let mut column = Column::new(ComponentInfo::of::<u32>(), 2).unwrap();
        column.push(7u32).unwrap();
        assert!(column.element_at(0).is_ok());
        assert_eq!(
            column.element_at(1),
            Err(EcsError::RowOutOfBounds { row: 1, len: 1 })
        );
        assert!(column.get::<u64>(0).is_none());
    }

    #[test]
    fn test_swap_remove_moves_last_into_hole() {
        let mut column = Column::new(ComponentInfo::of::<u32>(), 2).unwrap();
        for v in [10u32, 20, 30] {
            column.push(v).unwrap();
        }
        column.swap_remove(0).unwrap();
        assert_eq!(column.len(), 2);
        assert_eq!(*column.get::<u32>(0).unwrap(), 30);
        assert_eq!(*column.get::<u32>(1).unwrap(), 20);
    }

    #[test]
    fn test_non_trivial_elements_survive_growth_and_drop_once() {
        let drops = Arc::new(AtomicUsize::new(0));
        {
            let mut column = Column::new(ComponentInfo::of::<DropCounter>(), 2).unwrap();
            for _ in 0..9 {
                column.push(DropCounter(drops.clone())).unwrap();
            }
            assert_eq!(drops.load(Ordering::SeqCst), 0);
            column.swap_remove(3).unwrap();
            assert_eq!(drops.load(Ordering::SeqCst), 1);
        }
        assert_eq!(drops.load(Ordering::SeqCst), 9);
    }

    #[test]
    fn test_strings_relocate_through_resize() {
        let mut column = Column::new(ComponentInfo::of::<String>(), 2).unwrap();
        for i in 0..20 {
            column.push(format!("entity-{i}")).unwrap();
        }
        assert_eq!(column.get::<String>(17).unwrap(), "entity-17");
        column.replace(17, "renamed".to_string()).unwrap();
        assert_eq!(column.get::<String>(17).unwrap(), "renamed");
    }

    #[test]
    fn test_allocate_resets_to_capacity() {
        let mut column = Column::new(ComponentInfo::of::<u64>(), 2).unwrap();
        for v in 0..10u64 {
            column.push(v).unwrap();
        }
        column.allocate(2).unwrap();
        assert_eq!(column.len(), 0);
        assert_eq!(column.capacity(), 2);
        column.push(1u64).unwrap();
        assert_eq!(*column.get::<u64>(0).unwrap(), 1);
    }

    #[test]
    fn test_clone_row() {
        let mut column = Column::new(ComponentInfo::of::<String>(), 2).unwrap();
        column.push("a".to_string()).unwrap();
        assert!(!column
            .push_clone_of(0, &ComponentInfo::of::<String>())
            .unwrap());
        assert!(column
            .push_clone_of(0, &ComponentInfo::cloneable::<String>())
            .unwrap());
        assert_eq!(column.len(), 2);
        assert_eq!(column.get::<String>(1).unwrap(), "a");
    }

    #[test]
    fn test_zero_sized_with_drop_glue() {
        struct Flag;
        impl Drop for Flag {
            fn drop(&mut self) {}
        }
        let mut column = Column::new(ComponentInfo::of::<Flag>(), 2).unwrap();
        for _ in 0..4 {
            column.push(Flag).unwrap();
        }
        assert_eq!(column.len(), 4);
        column.swap_remove(1).unwrap();
        assert_eq!(column.len(), 3);
    }
}
