//! # Vitrine Composite
//!
//! Composite scene loader for product viewers: a catalog of named parts
//! (floor, roof variants, pod variants, humans) is fetched lazily, cached
//! write-once, attached to a scene graph and shown according to exclusive
//! visibility groups and independent toggles.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      CompositeLoader                          │
//! │  ├── PartCatalog: parts, locators, groups, placements         │
//! │  ├── LoadedPartCache: write-once handles                      │
//! │  ├── in-flight loads: one shared fetch per part               │
//! │  └── ActiveSelection: visible member per group, flags,        │
//! │      latest request per group/part                            │
//! ├──────────────────────────────────────────────────────────────┤
//! │  Collaborators                                                │
//! │  ├── AssetSource: fetch(locator) -> asset                     │
//! │  ├── SceneGraph: attach(asset), set_visible(node, bool)       │
//! │  └── LoadObserver: Started / Loaded / Failed / Superseded     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use vitrine_composite::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), LoaderError> {
//!     let catalog = PartCatalog::from_file("catalog.toml")?;
//!     let source = Arc::new(DirectoryAssetSource::new("./public"));
//!     let scene = Arc::new(MemorySceneGraph::new());
//!
//!     let loader = CompositeLoader::new(catalog, source, scene)?;
//!     loader.initialize_composite(InitialSelection::new()).await?;
//!
//!     loader.select_exclusive("roof", "roof2").await?;
//!     loader.set_independent_visibility("humans", true).await?;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod events;
pub mod loader;
pub mod scene;
pub mod selection;
pub mod source;

pub use cache::{AssetHandle, LoadedPartCache};
pub use catalog::{Membership, PartCatalog, PartSpec, Placement};
pub use config::LoaderConfig;
pub use error::{FetchError, LoaderError, Result};
pub use loader::{
    CompositeLoader, CompositeLoaderState, CompositeSnapshot, InitReport, InitialSelection,
    SelectOutcome,
};

// ============================================================================
// Prelude
// ============================================================================

/// Convenient re-exports for common loader types.
pub mod prelude {
    pub use super::catalog::{Membership, PartCatalog, PartSpec, Placement};
    pub use super::config::LoaderConfig;
    pub use super::error::{FetchError, LoaderError};
    pub use super::events::{LoadEvent, LoadObserver, MemoryObserver, TracingObserver};
    pub use super::loader::{CompositeLoader, InitReport, InitialSelection, SelectOutcome};
    pub use super::scene::{MemorySceneGraph, NodeId, SceneGraph};
    pub use super::source::{AssetSource, DirectoryAssetSource, MemoryAssetSource, RawAsset};
    #[cfg(feature = "http")]
    pub use super::source::HttpAssetSource;
    pub use std::sync::Arc;
}
