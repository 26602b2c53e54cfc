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

//! Archstore - archetype-based entity/component storage
//!
//! Entities sharing the exact same set of component types live together in
//! one archetype, with each component type stored in a densely packed,
//! type-erased column. Adding or removing a component moves the entity to
//! the neighbouring archetype through a memoized transition graph, and
//! queries are answered from a cache of matching archetypes.

pub mod archetype;
pub mod column;
pub mod component;
pub mod config;
pub mod debug;
pub mod entity;
pub mod error;
pub mod index;
pub mod observer;
pub mod prelude;
pub mod query;
pub mod schedule;
pub mod shared;
pub mod structural;
pub mod world;


pub use archetype::*;
pub use column::*;
pub use component::*;
pub use config::*;
pub use entity::*;
pub use error::*;
pub use index::*;
pub use observer::*;
pub use query::*;
pub use schedule::*;
pub use shared::*;
pub use world::*;
