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

//! Error types

use std::fmt;

use crate::schedule::Stage;

/// Store error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EcsError {
    /// Entity is null, destroyed, or was never created by this store
    EntityNotFound,

    /// Component of this type is already attached to the entity
    ComponentAlreadyPresent(&'static str),

    /// Component of this type is not attached to the entity
    ComponentNotPresent(&'static str),

    /// Row access outside the live range of a column or archetype
    RowOutOfBounds { row: usize, len: usize },

    /// Component type was not registered with a clone function
    ComponentNotCloneable(&'static str),

    /// Column capacity in bytes does not fit the address space
    CapacityOverflow {
        requested: usize,
        element_size: usize,
    },

    /// Archetype limit from `StoreConfig::max_archetypes` reached
    ArchetypeLimitExceeded(usize),

    /// No pipeline callback registered under this name and stage
    CallbackNotFound { name: String, stage: Stage },
}

impl fmt::Display for EcsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EcsError::EntityNotFound => write!(f, "Entity not found"),
            EcsError::ComponentAlreadyPresent(name) => {
                write!(f, "Component already present: {name}")
            }
            EcsError::ComponentNotPresent(name) => write!(f, "Component not present: {name}"),
            EcsError::RowOutOfBounds { row, len } => {
                write!(f, "Row {row} out of bounds (len {len})")
            }
            EcsError::ComponentNotCloneable(name) => {
                write!(f, "Component is not registered as cloneable: {name}")
            }
            EcsError::CapacityOverflow {
                requested,
                element_size,
            } => write!(
                f,
                "Column capacity overflow: {requested} elements of {element_size} bytes"
            ),
            EcsError::ArchetypeLimitExceeded(limit) => {
                write!(f, "Archetype limit exceeded ({limit})")
            }
            EcsError::CallbackNotFound { name, stage } => {
                write!(f, "No callback '{name}' registered for stage {stage:?}")
            }
        }
    }
}

impl std::error::Error for EcsError {}

/// Result type alias
pub type Result<T> = std::result::Result<T, EcsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        assert_eq!(EcsError::EntityNotFound.to_string(), "Entity not found");
        assert_eq!(
            EcsError::ComponentNotPresent("Velocity").to_string(),
            "Component not present: Velocity"
        );
        assert_eq!(
            EcsError::RowOutOfBounds { row: 4, len: 2 }.to_string(),
            "Row 4 out of bounds (len 2)"
        );
        let err = EcsError::CallbackNotFound {
            name: "physics".to_string(),
            stage: Stage::OnUpdate,
        };
        assert_eq!(
            err.to_string(),
            "No callback 'physics' registered for stage OnUpdate"
        );
    }
}
