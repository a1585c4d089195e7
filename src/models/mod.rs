//! Model management: catalogue, capability boundary, loader, registry.

mod capability;
mod catalog;
mod loader;
mod registry;

pub use capability::{CapabilityProvider, InvocationError, InvocationItem, ModelCapability};
pub use catalog::{
    CatalogBuilder, CatalogError, ModelCatalog, ModelDescriptor, ModelKey, ModelKind, ParamValue,
    ParseKeyError,
};
pub use loader::{LoadError, LoadedModel, ModelLoader, UnloadError};
pub use registry::{LoadState, ModelRegistry, ReadyModel};
