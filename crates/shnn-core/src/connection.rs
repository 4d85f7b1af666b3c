//! Connections: directed, typed edges between layers

use crate::error::{Error, Result};
use crate::layer::{Layer, LayerId};

/// Stable identity of a [`Connection`] within a [`crate::structure::Network`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(pub u32);

impl ConnectionId {
    /// Wrap a raw index
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Raw index
    pub const fn raw(&self) -> u32 {
        self.0
    }
}

/// Accumulation opcode a connection (or dendritic node) uses to combine its
/// contribution into its parent register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// Accumulate additively
    Add,
    /// Subtract from the accumulator
    Sub,
    /// Multiply into the accumulator
    Mult,
    /// Divide the accumulator
    Div,
    /// Max-pool over the source field
    Pool,
    /// Electrical gap junction (requires equal-sized layers)
    Gap,
    /// Reward/neuromodulatory signal, not spatially accumulated
    Reward,
}

/// Per-connection shape configuration, keyed by [`ConnectionType`]
#[derive(Debug, Clone)]
pub enum ShapeConfig {
    /// No extra shape data (fully-connected, one-to-one, gap)
    None,
    /// A rectangular sub-range of the source layer
    Subset {
        /// Inclusive start row in the source layer
        row_start: u32,
        /// Exclusive end row in the source layer
        row_end: u32,
        /// Inclusive start column in the source layer
        col_start: u32,
        /// Exclusive end column in the source layer
        col_end: u32,
    },
    /// A convergent/divergent/convolutional arborized field
    Arborized {
        /// Field height
        field_rows: u32,
        /// Field width
        field_columns: u32,
        /// Row stride
        stride_rows: u32,
        /// Column stride
        stride_columns: u32,
        /// Row offset applied before striding
        offset_rows: i32,
        /// Column offset applied before striding
        offset_columns: i32,
    },
}

/// The geometric/topological family a connection belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionType {
    /// Every source neuron connects to every destination neuron
    FullyConnected,
    /// Source and destination layers have identical shape; neuron `i` maps
    /// to neuron `i`
    OneToOne,
    /// A rectangular sub-range of the source layer feeds the whole
    /// destination
    SubsetOfLayer,
    /// Each destination neuron pulls from a local field of the source
    ConvergentArborized,
    /// Each source neuron pushes to a local field of the destination
    DivergentArborized,
    /// Like convergent-arborized, but all destination neurons share one
    /// kernel
    Convolutional,
}

/// Immutable, type-specific configuration of a [`Connection`]
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Source layer
    pub from: LayerId,
    /// Destination layer
    pub to: LayerId,
    /// Topological family
    pub connection_type: ConnectionType,
    /// How this connection's contribution is combined at the destination
    pub opcode: Opcode,
    /// Delay, in timesteps, before the destination observes this
    /// connection's source output
    pub delay: u32,
    /// Whether this connection's weights are updated by a learning rule
    pub plastic: bool,
    /// Weight clamp floor (spec.md §3, "clamped to `[min_weight, max_weight]`")
    pub min_weight: f32,
    /// Weight clamp ceiling
    pub max_weight: f32,
    /// Type-specific shape data
    pub shape: ShapeConfig,
    /// Accept delays beyond the 32-word limit by clamping instead of
    /// erroring (spec.md §4.4)
    pub cap_delay: bool,
}

impl ConnectionConfig {
    /// Start a fully-connected config between two layers
    pub fn fully_connected(from: LayerId, to: LayerId, opcode: Opcode) -> Self {
        Self {
            from,
            to,
            connection_type: ConnectionType::FullyConnected,
            opcode,
            delay: 0,
            plastic: false,
            min_weight: 0.0,
            max_weight: 1.0,
            shape: ShapeConfig::None,
            cap_delay: false,
        }
    }

    /// Start a one-to-one config between two equally-shaped layers
    pub fn one_to_one(from: LayerId, to: LayerId, opcode: Opcode) -> Self {
        Self {
            connection_type: ConnectionType::OneToOne,
            ..Self::fully_connected(from, to, opcode)
        }
    }

    /// Set the delay, in timesteps
    pub fn with_delay(mut self, delay: u32) -> Self {
        self.delay = delay;
        self
    }

    /// Mark plastic with the given weight ceiling (floor stays 0.0)
    pub fn with_plasticity(mut self, max_weight: f32) -> Self {
        self.plastic = true;
        self.max_weight = max_weight;
        self
    }

    /// Mark plastic with explicit `[min_weight, max_weight]` clamp bounds
    pub fn with_plasticity_bounds(mut self, min_weight: f32, max_weight: f32) -> Self {
        self.plastic = true;
        self.min_weight = min_weight;
        self.max_weight = max_weight;
        self
    }

    /// Attach a convergent/divergent/convolutional arborized shape
    pub fn with_arborized_shape(
        mut self,
        connection_type: ConnectionType,
        shape: ShapeConfig,
    ) -> Self {
        self.connection_type = connection_type;
        self.shape = shape;
        self
    }
}

/// The number of synaptic weights implied by a connection's type and the
/// sizes of its endpoint layers
pub fn weight_count(config: &ConnectionConfig, from: &Layer, to: &Layer) -> Result<u32> {
    match config.connection_type {
        ConnectionType::FullyConnected => Ok(from.size() * to.size()),
        ConnectionType::OneToOne => {
            if from.rows() != to.rows() || from.columns() != to.columns() {
                return Err(Error::invalid_topology(
                    "one-to-one connection requires identical source/destination shape",
                ));
            }
            Ok(from.size())
        }
        ConnectionType::SubsetOfLayer => match config.shape {
            ShapeConfig::Subset {
                row_start,
                row_end,
                col_start,
                col_end,
            } => {
                if row_end <= row_start || col_end <= col_start {
                    return Err(Error::invalid_config("subset range must be non-empty"));
                }
                Ok((row_end - row_start) * (col_end - col_start) * to.size())
            }
            _ => Err(Error::invalid_config(
                "subset-of-layer connection requires a Subset shape",
            )),
        },
        ConnectionType::ConvergentArborized | ConnectionType::DivergentArborized => {
            match config.shape {
                ShapeConfig::Arborized {
                    field_rows,
                    field_columns,
                    ..
                } => Ok(field_rows * field_columns * to.size()),
                _ => Err(Error::invalid_config(
                    "arborized connection requires an Arborized shape",
                )),
            }
        }
        ConnectionType::Convolutional => match config.shape {
            ShapeConfig::Arborized {
                field_rows,
                field_columns,
                ..
            } => Ok(field_rows * field_columns),
            _ => Err(Error::invalid_config(
                "convolutional connection requires an Arborized shape",
            )),
        },
    }
}

/// Validate the structural invariants spec.md §7 assigns to `invalid-topology`
pub fn validate_topology(config: &ConnectionConfig, from: &Layer, to: &Layer) -> Result<()> {
    if config.opcode == Opcode::Gap && (from.rows() != to.rows() || from.columns() != to.columns())
    {
        return Err(Error::invalid_topology(
            "gap junction requires identically-sized layers",
        ));
    }
    if config.connection_type == ConnectionType::OneToOne
        && (from.rows() != to.rows() || from.columns() != to.columns())
    {
        return Err(Error::invalid_topology(
            "one-to-one connection requires identical source/destination shape",
        ));
    }
    if config.connection_type == ConnectionType::Convolutional {
        if let ShapeConfig::Arborized {
            field_rows,
            field_columns,
            ..
        } = config.shape
        {
            if field_rows > to.rows() || field_columns > to.columns() {
                return Err(Error::invalid_topology(
                    "convolutional field larger than destination layer",
                ));
            }
        }
    }
    Ok(())
}

/// A directed edge between two layers, immutable once built
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    config: ConnectionConfig,
    weight_count: u32,
}

impl Connection {
    pub(crate) fn new(id: ConnectionId, config: ConnectionConfig, weight_count: u32) -> Self {
        Self {
            id,
            config,
            weight_count,
        }
    }

    /// This connection's identity
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Source layer
    pub fn from(&self) -> LayerId {
        self.config.from
    }

    /// Destination layer
    pub fn to(&self) -> LayerId {
        self.config.to
    }

    /// Topological family
    pub fn connection_type(&self) -> ConnectionType {
        self.config.connection_type
    }

    /// Accumulation opcode
    pub fn opcode(&self) -> Opcode {
        self.config.opcode
    }

    /// Delay, in timesteps
    pub fn delay(&self) -> u32 {
        self.config.delay
    }

    /// Whether this connection is plastic
    pub fn is_plastic(&self) -> bool {
        self.config.plastic
    }

    /// Weight clamp ceiling
    pub fn max_weight(&self) -> f32 {
        self.config.max_weight
    }

    /// Type-specific shape data
    pub fn shape(&self) -> &ShapeConfig {
        &self.config.shape
    }

    /// Number of synaptic weights this connection owns
    pub fn weight_count(&self) -> u32 {
        self.weight_count
    }

    /// Full immutable config, for kernels that need raw shape parameters
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }
}
