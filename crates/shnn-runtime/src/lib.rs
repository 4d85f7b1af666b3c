//! Execution engine for spiking/rate-coded neural-network simulation
//! (spec.md §1-§6)
//!
//! Layers out the components of spec.md §2 in dependency order: device
//! memory/streams ([`device`]), the process-wide [`resource::ResourceManager`],
//! the [`kernel::Kernel`] dispatch abstraction, [`weight_matrix::WeightMatrix`],
//! [`attributes::Attributes`], [`state::State`], [`instruction::Instruction`],
//! [`cluster::ClusterNode`]/[`cluster::Cluster`], and finally [`engine::Engine`].

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod attributes;
pub mod buffer;
pub mod cluster;
pub mod device;
pub mod engine;
pub mod error;
pub mod instruction;
pub mod kernel;
pub mod model;
pub mod resource;
pub mod snapshot;
pub mod state;
pub mod weight_matrix;

pub use attributes::{Attributes, AttributeKernelArgs, AttributeKernels, LayerSlot, ModelKind};
pub use buffer::{Buffer, BufferSlot};
pub use cluster::{run_inter_device_transfers, Cluster, ClusterKind, ClusterNode};
pub use device::{DeviceId, Event, MemoryKind, Pointer, Stream};
pub use engine::{Barrier, Engine, EngineConfig, Module, NoopBarrier, Report};
pub use error::{Result, RuntimeError};
pub use instruction::{Instruction, InstructionId, InstructionKind, NoiseKind};
pub use kernel::Kernel;
pub use model::{BitSpikingModel, FloatRateModel, ModelRegistry, NeuronModel, UpdateArgs};
pub use resource::{ResourceManager, Runtime, WorkerPool};
pub use state::{LayerLocation, State, WeightInit};
pub use weight_matrix::WeightMatrix;

/// Runtime crate version for compatibility checking between a saved
/// [`shnn_storage`] snapshot and the engine loading it
pub const RUNTIME_VERSION: u32 = 1;
