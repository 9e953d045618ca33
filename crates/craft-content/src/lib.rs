//! Content definitions: keys, typed schemas, behaviors and the definition store.
#![forbid(unsafe_code)]

pub mod behavior;
pub mod config;
pub mod definition;
pub mod key;
pub mod schema;
pub mod snapshot;
pub mod store;

pub use behavior::{Behavior, Facing, TriggerConfig, TriggerEdge};
pub use definition::{Appearance, BehaviorFlags, ContentDefinition, ContentKind};
pub use key::{Key, KeyError};
pub use schema::{FieldSpec, FieldType, FieldValue, FieldValues, ScalarType, Schema, SchemaViolation};
pub use snapshot::SnapshotCell;
pub use store::{DefinitionError, DefinitionSet, DefinitionSource, DefinitionStore, Excluded};
