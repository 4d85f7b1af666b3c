//! Layers: rectangular grids of neurons sharing a neural model

use crate::connection::ConnectionId;
use crate::dendritic::DendriticNodeId;

/// Stable identity of a [`Layer`] within a [`crate::structure::Network`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LayerId(pub u32);

impl LayerId {
    /// Wrap a raw index
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Raw index
    pub const fn raw(&self) -> u32 {
        self.0
    }
}

/// Bitwise-or-able I/O role a layer plays for the environment
///
/// Matches spec.md §6's `get_io_type` contract: a layer may be, e.g.,
/// both `INPUT` and `OUTPUT` simultaneously.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IoType(u8);

impl IoType {
    /// Layer receives external input each `environment_rate` timesteps
    pub const INPUT: Self = Self(0b0001);
    /// Layer receives supervised "expected output" from a module
    pub const EXPECTED: Self = Self(0b0010);
    /// Layer's output is read by a module
    pub const OUTPUT: Self = Self(0b0100);
    /// Layer is purely internal: no module touches it
    pub const INTERNAL: Self = Self(0b1000);

    /// Empty set
    pub const NONE: Self = Self(0);

    /// Union of two io-type sets
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Whether `self` contains all bits of `other`
    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl core::ops::BitOr for IoType {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

/// Tag identifying which concrete neural model a layer uses
///
/// Concrete models (Izhikevich, Hodgkin-Huxley, rate-encoding, NVM, ...) are
/// external collaborators (spec.md §1); the engine only needs a stable name
/// to look up the model's attribute kernel in a registry at build time
/// (spec.md §9, "tagged-variant ... registry keyed by a model-name string").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelName(pub String);

impl ModelName {
    /// Build a model name from any string-like value
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Borrow as `&str`
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for ModelName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// User-supplied configuration for a new layer, consumed by the (out of
/// scope) network builder when it calls `add_layer`
#[derive(Debug, Clone)]
pub struct LayerConfig {
    /// Neural model tag
    pub model: ModelName,
    /// Grid rows
    pub rows: u32,
    /// Grid columns
    pub columns: u32,
    /// I/O role(s) this layer plays
    pub io_type: IoType,
}

impl LayerConfig {
    /// Start building a layer config for a model/size
    pub fn new(model: impl Into<String>, rows: u32, columns: u32) -> Self {
        Self {
            model: ModelName::new(model),
            rows,
            columns,
            io_type: IoType::INTERNAL,
        }
    }

    /// Mark this layer with the given I/O type(s)
    pub fn with_io_type(mut self, io_type: IoType) -> Self {
        self.io_type = io_type;
        self
    }

    /// Number of neurons in the layer
    pub fn size(&self) -> u32 {
        self.rows * self.columns
    }
}

/// A rectangular grid of neurons, immutable once built
///
/// Owned by its [`crate::structure::Structure`]; holds non-owning
/// back-references to its connections (spec.md §3 ownership summary).
#[derive(Debug, Clone)]
pub struct Layer {
    id: LayerId,
    model: ModelName,
    rows: u32,
    columns: u32,
    io_type: IoType,
    /// Ordered list of connections for which this layer is the destination
    input_connections: Vec<ConnectionId>,
    /// Ordered list of connections for which this layer is the source
    output_connections: Vec<ConnectionId>,
    /// Root of this layer's dendritic aggregation tree
    dendritic_root: DendriticNodeId,
}

impl Layer {
    /// Build a layer from its config and assigned dendritic root; only
    /// callable by the crate's network builder
    pub(crate) fn new(id: LayerId, config: &LayerConfig, dendritic_root: DendriticNodeId) -> Self {
        Self {
            id,
            model: config.model.clone(),
            rows: config.rows,
            columns: config.columns,
            io_type: config.io_type,
            input_connections: Vec::new(),
            output_connections: Vec::new(),
            dendritic_root,
        }
    }

    /// This layer's identity
    pub fn id(&self) -> LayerId {
        self.id
    }

    /// Neural model tag
    pub fn model(&self) -> &ModelName {
        &self.model
    }

    /// Grid rows
    pub fn rows(&self) -> u32 {
        self.rows
    }

    /// Grid columns
    pub fn columns(&self) -> u32 {
        self.columns
    }

    /// Total neuron count
    pub fn size(&self) -> u32 {
        self.rows * self.columns
    }

    /// This layer's I/O role(s)
    pub fn io_type(&self) -> IoType {
        self.io_type
    }

    /// Connections feeding into this layer, in build order
    pub fn input_connections(&self) -> &[ConnectionId] {
        &self.input_connections
    }

    /// Connections originating from this layer, in build order
    pub fn output_connections(&self) -> &[ConnectionId] {
        &self.output_connections
    }

    /// Root of this layer's dendritic tree
    pub fn dendritic_root(&self) -> DendriticNodeId {
        self.dendritic_root
    }

    pub(crate) fn push_input_connection(&mut self, id: ConnectionId) {
        self.input_connections.push(id);
    }

    pub(crate) fn push_output_connection(&mut self, id: ConnectionId) {
        self.output_connections.push(id);
    }
}
