//! Convenient re-exports of commonly used types.
//!
//! The prelude can be imported with:
//! ```
//! use archstore::prelude::*;
//! ```

pub use crate::component::{Component, ComponentSet};
pub use crate::config::StoreConfig;
pub use crate::debug::WorldInspector;
pub use crate::entity::{Entity, EntityRef};
pub use crate::error::{EcsError, Result};
pub use crate::observer::{ObserverId, ObserverKind};
pub use crate::query::{Query, QueryKey};
pub use crate::schedule::Stage;
pub use crate::shared::SharedWorld;
pub use crate::world::{ClearReport, Persistent, World};
