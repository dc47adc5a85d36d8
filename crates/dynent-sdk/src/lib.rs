//! High-level engine for dynamically typed entities.
//!
//! Ties the type registry, the document adapter, the identity cache and
//! fetch plans together behind one [`Engine`]. This is the main entry point
//! for applications embedding the stack.

pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod unit;

pub use config::{CacheConfig, EngineConfig, FetchConfig};
pub use engine::Engine;
pub use error::{SdkError, SdkResult};
pub use model::Model;
pub use unit::UnitOfWork;

// Re-export key types
pub use dynent_adapter::TypeBinding;
pub use dynent_cache::{CacheLookup, CacheStats};
pub use dynent_document::{DocPath, DocSchema, DocValue, Document, InMemoryStoreDriver, SchemaNode, StoreDriver};
pub use dynent_entity::{Collection, DynamicEntity, EntityRef, Value};
pub use dynent_fetch::{FetchPlan, FetchReport, TraversalState};
pub use dynent_schema::{EntityType, SchemaDescriptor, TypeRegistry};
pub use dynent_types::{ContainerKind, PrimaryKey, Scalar, ValueKind};
