//! Network data model for the hSNN execution engine
//!
//! This crate defines the immutable graph an engine build consumes:
//! [`layer::Layer`]s organized into [`structure::Structure`]s, the
//! [`connection::Connection`]s between them, each layer's
//! [`dendritic::DendriticTree`], and the [`weight_config::WeightConfig`]
//! tagged union used to seed synaptic weights.
//!
//! Construction, persistence, and visualization are external collaborators
//! (see the crate-level docs of `shnn-runtime` and `shnn-storage`); this
//! crate only owns the data model and the invariants that must hold for it
//! to be a legal input to the engine.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod connection;
pub mod dendritic;
pub mod error;
pub mod layer;
pub mod structure;
pub mod weight_config;

pub use connection::{Connection, ConnectionConfig, ConnectionId, ConnectionType, Opcode, ShapeConfig};
pub use dendritic::{DendriticLeaf, DendriticNode, DendriticNodeId, DendriticTree};
pub use error::{Error, Result};
pub use layer::{IoType, Layer, LayerConfig, LayerId, ModelName};
pub use structure::{Network, NetworkBuilder, Structure, StructureId};
pub use weight_config::{DelayConfig, DiagonalFlag, WeightConfig, MAX_DELAY_BITS};
