//! Instruction: the atomic scheduling unit (spec.md §4.7)
//!
//! An `Instruction` carries no Stream/Event fields of its own in this
//! host-only build: every kernel in this crate schedules onto the host
//! stream synchronously (`Kernel::schedule`'s `debug_assert!`), and
//! [`crate::cluster::Cluster`] executes its `ClusterNode`s in strict
//! program order within each phase, which already gives every dependency
//! spec.md §4.8 describes via back-edges the happens-before relationship
//! it needs (documented in DESIGN.md). What varies per timestep is which
//! `InstructionKind` runs and what it touches; `execute` below is the one
//! place that knows how.

use shnn_core::{Connection, ConnectionType, Layer, LayerId, Opcode, ShapeConfig};

use crate::error::{Result, RuntimeError};
use crate::model::{ModelRegistry, UpdateArgs};
use crate::resource::WorkerPool;
use crate::state::State;

/// Stable identity of an [`Instruction`] within the [`crate::cluster::ClusterNode`]
/// that owns it (spec.md §9 "integer id in an arena").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstructionId(pub u32);

/// Random-generation family for the `UniformNoise`/`NormalNoise`/`PoissonNoise`
/// instruction variants (spec.md §4.7)
#[derive(Debug, Clone, Copy)]
pub enum NoiseKind {
    /// Uniform on `[0, max]`
    Uniform {
        /// Upper bound
        max: f32,
    },
    /// Gaussian with the given mean/std
    Normal {
        /// Mean
        mean: f32,
        /// Standard deviation
        std: f32,
    },
    /// Poisson-distributed spike count per neuron, treated as a float rate
    Poisson {
        /// Expected event rate per timestep
        rate: f32,
    },
}

/// One atomic scheduling unit (spec.md §4.7's table)
#[derive(Debug, Clone)]
pub enum InstructionKind {
    /// Broadcast `value` into a layer's root dendritic register
    Set {
        /// Target layer
        layer: LayerId,
        /// Value to broadcast
        value: f32,
        /// Replace (`true`) or add (`false`)
        overwrite: bool,
    },
    /// Populate a layer's root register with random values
    Noise {
        /// Target layer
        layer: LayerId,
        /// Distribution family and parameters
        kind: NoiseKind,
        /// Replace (`true`) or add (`false`)
        overwrite: bool,
    },
    /// Run a connection's activator: read source output (at delay) and
    /// weights, accumulate into the destination's dendritic register
    SynapseActivate {
        /// The connection to activate
        connection: shnn_core::ConnectionId,
        /// Register this connection's leaf is attached to
        register: u32,
        /// Whether this is the first contribution into `register` this
        /// timestep (direct write instead of opcode-combine)
        initializes: bool,
    },
    /// Run a plastic connection's updater
    SynapseUpdate {
        /// The connection to update
        connection: shnn_core::ConnectionId,
    },
    /// Fold a child dendritic node's register into its parent's, via the
    /// child's own opcode
    DendriticInternal {
        /// Owning layer
        layer: LayerId,
        /// Parent node's register
        parent_register: u32,
        /// Child node's register
        child_register: u32,
        /// Opcode the child uses to combine into the parent
        opcode: Opcode,
        /// Whether this is the first contribution into `parent_register`
        /// this timestep
        initializes: bool,
    },
    /// Copy the Buffer's input region into the layer's root register
    InputTransfer {
        /// Target layer
        layer: LayerId,
    },
    /// Copy the layer's most-recent output word into the Buffer's output
    /// region
    OutputTransfer {
        /// Source layer
        layer: LayerId,
    },
    /// Copy expected-output from the Buffer into Attributes
    ExpectedTransfer {
        /// Target layer
        layer: LayerId,
    },
    /// Run the layer's neuron-model state update
    StateUpdate {
        /// Target layer
        layer: LayerId,
    },
    /// Copy a source layer's latest output into the destination device's
    /// mirror buffer, once per (source layer, timestep) regardless of fan-out
    InterDeviceTransfer {
        /// Representative connection naming the source layer (deduplicated
        /// by [`crate::cluster`] construction)
        connection: shnn_core::ConnectionId,
    },
}

impl InstructionKind {
    /// Whether this instruction mutates plastic weights, so the engine can
    /// skip it when `learning_flag=false` (spec.md §4.7, §8 invariant 6)
    pub fn is_plastic(&self) -> bool {
        matches!(self, InstructionKind::SynapseUpdate { .. })
    }
}

/// One scheduled instruction: an id plus its kind
#[derive(Debug, Clone)]
pub struct Instruction {
    id: InstructionId,
    kind: InstructionKind,
}

impl Instruction {
    /// Wrap a kind under a fresh id
    pub fn new(id: InstructionId, kind: InstructionKind) -> Self {
        Self { id, kind }
    }

    /// This instruction's identity
    pub fn id(&self) -> InstructionId {
        self.id
    }

    /// The instruction's kind
    pub fn kind(&self) -> &InstructionKind {
        &self.kind
    }

    /// Whether this instruction mutates plastic weights
    pub fn is_plastic(&self) -> bool {
        self.kind.is_plastic()
    }
}

/// Fold `delta` into `existing` via `opcode`; `initializes` bypasses the
/// opcode and writes `delta` directly, used for the first contribution into
/// a register each timestep (spec.md §4.7 DendriticInternal "optionally
/// initializes the parent first" — applied uniformly to every accumulation
/// site, since the registers are cleared to `0.0` and a first non-`Add`
/// contribution against a cleared zero is rarely the intended identity).
pub fn apply_opcode(existing: f32, delta: f32, opcode: Opcode, initializes: bool) -> f32 {
    if initializes {
        return delta;
    }
    match opcode {
        Opcode::Add | Opcode::Gap | Opcode::Reward => existing + delta,
        Opcode::Sub => existing - delta,
        Opcode::Mult => existing * delta,
        Opcode::Div => {
            if delta == 0.0 {
                existing
            } else {
                existing / delta
            }
        }
        Opcode::Pool => existing.max(delta),
    }
}

/// Per-field-cell source index for an arborized (convergent/divergent) or
/// convolutional connection; `None` when the field cell falls outside the
/// source layer (clipped, contributing nothing)
#[allow(clippy::too_many_arguments)]
fn field_source_index(
    from_rows: u32,
    from_cols: u32,
    field_cols: u32,
    stride_rows: u32,
    stride_cols: u32,
    offset_rows: i32,
    offset_cols: i32,
    dest_row: u32,
    dest_col: u32,
    field_cell: u32,
) -> Option<u32> {
    let field_row = (field_cell / field_cols) as i32;
    let field_col = (field_cell % field_cols) as i32;
    let src_row = dest_row as i32 * stride_rows as i32 + offset_rows + field_row;
    let src_col = dest_col as i32 * stride_cols as i32 + offset_cols + field_col;
    if src_row < 0 || src_col < 0 {
        return None;
    }
    let (src_row, src_col) = (src_row as u32, src_col as u32);
    if src_row >= from_rows || src_col >= from_cols {
        return None;
    }
    Some(src_row * from_cols + src_col)
}

/// Per-destination-neuron dot product for one connection's activation
/// (spec.md §4.7 SynapseActivate, §8 Scenarios 2-3): always a weighted sum
/// over the connection's own receptive field, regardless of the
/// connection's opcode, which instead governs how this result folds into
/// the destination register alongside the layer's other dendritic leaves.
pub fn connection_deltas(
    conn: &Connection,
    from: &Layer,
    to: &Layer,
    matrix: &crate::weight_matrix::WeightMatrix,
    source: &[f32],
) -> Vec<f32> {
    let rows = matrix.rows();
    let cols = matrix.cols();
    match conn.connection_type() {
        ConnectionType::FullyConnected => (0..rows)
            .map(|r| (0..cols).map(|c| matrix.get(r, c) * source[c as usize]).sum())
            .collect(),
        ConnectionType::OneToOne => (0..rows).map(|r| matrix.get(r, 0) * source[r as usize]).collect(),
        ConnectionType::SubsetOfLayer => {
            let (row_start, col_start, col_end) = match *conn.shape() {
                ShapeConfig::Subset { row_start, col_start, col_end, .. } => {
                    (row_start, col_start, col_end)
                }
                _ => return vec![0.0; rows as usize],
            };
            let sub_cols = (col_end - col_start).max(1);
            (0..rows)
                .map(|r| {
                    (0..cols)
                        .map(|c| {
                            let sr = row_start + c / sub_cols;
                            let sc = col_start + c % sub_cols;
                            let idx = sr * from.columns() + sc;
                            matrix.get(r, c) * source[idx as usize]
                        })
                        .sum()
                })
                .collect()
        }
        ConnectionType::ConvergentArborized | ConnectionType::DivergentArborized => {
            let (field_cols, stride_rows, stride_cols, offset_rows, offset_cols) = match *conn.shape()
            {
                ShapeConfig::Arborized {
                    field_columns,
                    stride_rows,
                    stride_columns,
                    offset_rows,
                    offset_columns,
                    ..
                } => (field_columns, stride_rows, stride_columns, offset_rows, offset_columns),
                _ => return vec![0.0; rows as usize],
            };
            let to_cols = to.columns().max(1);
            (0..rows)
                .map(|r| {
                    let dest_row = r / to_cols;
                    let dest_col = r % to_cols;
                    (0..cols)
                        .map(|c| {
                            match field_source_index(
                                from.rows(),
                                from.columns(),
                                field_cols,
                                stride_rows,
                                stride_cols,
                                offset_rows,
                                offset_cols,
                                dest_row,
                                dest_col,
                                c,
                            ) {
                                Some(idx) => matrix.get(r, c) * source[idx as usize],
                                None => 0.0,
                            }
                        })
                        .sum()
                })
                .collect()
        }
        ConnectionType::Convolutional => {
            let (field_cols, stride_rows, stride_cols, offset_rows, offset_cols) = match *conn.shape()
            {
                ShapeConfig::Arborized {
                    field_columns,
                    stride_rows,
                    stride_columns,
                    offset_rows,
                    offset_columns,
                    ..
                } => (field_columns, stride_rows, stride_columns, offset_rows, offset_columns),
                _ => return vec![0.0; to.size() as usize],
            };
            let to_cols = to.columns().max(1);
            (0..to.size())
                .map(|lin| {
                    let dest_row = lin / to_cols;
                    let dest_col = lin % to_cols;
                    (0..cols)
                        .map(|c| {
                            match field_source_index(
                                from.rows(),
                                from.columns(),
                                field_cols,
                                stride_rows,
                                stride_cols,
                                offset_rows,
                                offset_cols,
                                dest_row,
                                dest_col,
                                c,
                            ) {
                                Some(idx) => matrix.get(0, c) * source[idx as usize],
                                None => 0.0,
                            }
                        })
                        .sum()
                })
                .collect()
        }
    }
}

/// Everything [`Instruction::execute`] needs to touch shared engine state
pub struct ExecContext<'a> {
    /// The built network (topology, shapes, opcodes)
    pub network: &'a shnn_core::Network,
    /// Owns Attributes/WeightMatrix storage
    pub state: &'a mut State,
    /// The environment-facing I/O region
    pub buffer: &'a mut crate::buffer::Buffer,
    /// Looks up neuron models by name
    pub registry: &'a ModelRegistry,
    /// Host worker pool, for parallel kernel dispatch
    pub pool: &'a WorkerPool,
    /// This device's RNG, for `Set`/`Noise` instructions
    pub rng: &'a mut rand::rngs::StdRng,
    /// Whether plastic updates run this timestep
    pub learning_enabled: bool,
}

fn slot_index(ctx: &ExecContext, layer: LayerId) -> usize {
    ctx.state.slot_index(layer)
}

impl Instruction {
    /// Run this instruction's side effect against `ctx` (spec.md §4.7)
    pub fn execute(&self, ctx: &mut ExecContext) -> Result<()> {
        match &self.kind {
            InstructionKind::Set { layer, value, overwrite } => {
                let idx = slot_index(ctx, *layer);
                let attrs = ctx.state.attributes_of_mut(*layer);
                let root = ctx.network.layer(*layer).dendritic_root();
                let register = ctx.network.dendritic_tree(*layer).node(root).register();
                for slot in attrs.register_mut(idx, register) {
                    *slot = if *overwrite { *value } else { *slot + *value };
                }
                Ok(())
            }
            InstructionKind::Noise { layer, kind, overwrite } => {
                use rand::Rng;
                use rand_distr::{Distribution, Normal, Poisson};
                let idx = slot_index(ctx, *layer);
                let root = ctx.network.layer(*layer).dendritic_root();
                let register = ctx.network.dendritic_tree(*layer).node(root).register();
                let samples: Vec<f32> = match kind {
                    NoiseKind::Uniform { max } => {
                        let n = ctx.network.layer(*layer).size();
                        (0..n).map(|_| ctx.rng.gen_range(0.0..*max)).collect()
                    }
                    NoiseKind::Normal { mean, std } => {
                        let dist = Normal::new(*mean, *std)
                            .map_err(|e| RuntimeError::invalid_config(e.to_string()))?;
                        let n = ctx.network.layer(*layer).size();
                        (0..n).map(|_| dist.sample(ctx.rng)).collect()
                    }
                    NoiseKind::Poisson { rate } => {
                        let dist = Poisson::new(*rate as f64)
                            .map_err(|e| RuntimeError::invalid_config(e.to_string()))?;
                        let n = ctx.network.layer(*layer).size();
                        (0..n).map(|_| dist.sample(ctx.rng) as f32).collect()
                    }
                };
                let attrs = ctx.state.attributes_of_mut(*layer);
                let reg = attrs.register_mut(idx, register);
                for (slot, sample) in reg.iter_mut().zip(samples) {
                    *slot = if *overwrite { sample } else { *slot + sample };
                }
                Ok(())
            }
            InstructionKind::SynapseActivate { connection, register, initializes } => {
                let conn = ctx.network.connection(*connection);
                let from = ctx.network.layer(conn.from());
                let to = ctx.network.layer(conn.to());

                let source: Vec<f32> = if ctx.state.is_inter_device(*connection) {
                    ctx.state
                        .mirror_of(conn.from())
                        .map(<[f32]>::to_vec)
                        .unwrap_or_else(|| vec![0.0; from.size() as usize])
                } else {
                    let from_idx = ctx.state.slot_index(conn.from());
                    let from_attrs = ctx.state.attributes_of(conn.from());
                    (0..from.size())
                        .map(|n| from_attrs.extract(from_idx, n, conn.delay()))
                        .collect()
                };

                let matrix = ctx.state.weights_of(*connection);
                let deltas = connection_deltas(conn, from, to, matrix, &source);

                let to_idx = ctx.state.slot_index(conn.to());
                let to_attrs = ctx.state.attributes_of_mut(conn.to());
                let reg = to_attrs.register_mut(to_idx, *register);
                for (slot, delta) in reg.iter_mut().zip(deltas) {
                    *slot = apply_opcode(*slot, delta, conn.opcode(), *initializes);
                }
                Ok(())
            }
            InstructionKind::SynapseUpdate { connection } => {
                if !ctx.learning_enabled {
                    return Ok(());
                }
                let conn = ctx.network.connection(*connection);
                if !conn.is_plastic() {
                    return Ok(());
                }
                let to = ctx.network.layer(conn.to());
                let model = ctx.registry.get(to.model().as_str()).ok_or_else(|| {
                    RuntimeError::invalid_config(format!("unknown neural model '{}'", to.model()))
                })?;
                let Some(updater) = model.updater_kernel() else {
                    return Ok(());
                };

                let to_idx = ctx.state.slot_index(conn.to());
                let from_idx = ctx.state.slot_index(conn.from());
                let post_outputs = ctx.state.attributes_of(conn.to()).extract_latest(to_idx);
                let pre_outputs = ctx.state.attributes_of(conn.from()).extract_latest(from_idx);

                let matrix = ctx.state.weights_of_mut(*connection);
                let rows = matrix.rows();
                let cols = matrix.cols();
                let min_weight = conn.config().min_weight;
                let max_weight = conn.config().max_weight;

                let mut pre_trace = matrix
                    .aux("pre_trace")
                    .map(<[f32]>::to_vec)
                    .unwrap_or_else(|| vec![0.0; cols as usize]);
                let mut post_trace = matrix
                    .aux("post_trace")
                    .map(<[f32]>::to_vec)
                    .unwrap_or_else(|| vec![0.0; rows as usize]);

                {
                    let mut args = UpdateArgs {
                        weights: matrix.weights_mut(),
                        rows,
                        cols,
                        pre_outputs: &pre_outputs,
                        post_outputs: &post_outputs,
                        pre_trace: &mut pre_trace[..cols as usize],
                        post_trace: &mut post_trace[..rows as usize],
                        min_weight,
                        max_weight,
                    };
                    updater(&mut args);
                }

                if let Some(slot) = matrix.aux_mut("pre_trace") {
                    slot[..cols as usize].copy_from_slice(&pre_trace[..cols as usize]);
                }
                if let Some(slot) = matrix.aux_mut("post_trace") {
                    slot[..rows as usize].copy_from_slice(&post_trace[..rows as usize]);
                }
                matrix.clamp_weights();
                Ok(())
            }
            InstructionKind::DendriticInternal { layer, parent_register, child_register, opcode, initializes } => {
                let idx = slot_index(ctx, *layer);
                let attrs = ctx.state.attributes_of_mut(*layer);
                let child_values: Vec<f32> = attrs.register(idx, *child_register).to_vec();
                let parent = attrs.register_mut(idx, *parent_register);
                for (slot, delta) in parent.iter_mut().zip(child_values) {
                    *slot = apply_opcode(*slot, delta, *opcode, *initializes);
                }
                Ok(())
            }
            InstructionKind::InputTransfer { layer } => {
                let idx = slot_index(ctx, *layer);
                let root = ctx.network.layer(*layer).dendritic_root();
                let register = ctx.network.dendritic_tree(*layer).node(root).register();
                let values = ctx.buffer.read_input(*layer).to_vec();
                let attrs = ctx.state.attributes_of_mut(*layer);
                let reg = attrs.register_mut(idx, register);
                for (slot, value) in reg.iter_mut().zip(values) {
                    *slot += value;
                }
                ctx.buffer.clear_dirty(*layer);
                Ok(())
            }
            InstructionKind::ExpectedTransfer { layer } => {
                if !ctx.buffer.has_input(*layer) {
                    return Ok(());
                }
                let idx = slot_index(ctx, *layer);
                let values = ctx.buffer.read_input(*layer).to_vec();
                let attrs = ctx.state.attributes_of_mut(*layer);
                let start = slot_variable_start(attrs, idx);
                let len = attrs.slot(idx).size as usize;
                attrs.expected[start..start + len].copy_from_slice(&values[..len]);
                Ok(())
            }
            InstructionKind::OutputTransfer { layer } => {
                let idx = ctx.state.slot_index(*layer);
                let values = ctx.state.attributes_of(*layer).extract_latest(idx);
                ctx.buffer.write_output(*layer, &values);
                Ok(())
            }
            InstructionKind::StateUpdate { layer } => {
                let idx = ctx.state.slot_index(*layer);
                let model = ctx
                    .registry
                    .get(ctx.network.layer(*layer).model().as_str())
                    .ok_or_else(|| {
                        RuntimeError::invalid_config(format!(
                            "unknown neural model '{}'",
                            ctx.network.layer(*layer).model()
                        ))
                    })?;
                let kernels = model.attribute_kernels();
                let size = ctx.network.layer(*layer).size();

                let root = ctx.network.layer(*layer).dendritic_root();
                let root_register = ctx.network.dendritic_tree(*layer).node(root).register();

                let attrs = ctx.state.attributes_of_mut(*layer);
                let slot = attrs.slot(idx);
                let inputs = attrs.register(idx, root_register).to_vec();
                let mut variable_arrays: Vec<(&'static str, Vec<f32>)> = Vec::new();
                for name in model.variable_names() {
                    if let Some(arr) = attrs.variables.get(name) {
                        let start = slot_variable_start(attrs, idx);
                        let end = start + slot.size as usize;
                        variable_arrays.push((name, arr[start..end].to_vec()));
                    }
                }

                let mut new_outputs = vec![0u32; size as usize];
                // Only one variable array is expected by the reference
                // models (`voltage`); splice that one through directly so
                // the kernel can mutate in place.
                let mut scratch: Vec<f32> = variable_arrays
                    .first()
                    .map(|(_, v)| v.clone())
                    .unwrap_or_default();

                {
                    let mut args = crate::attributes::AttributeKernelArgs {
                        inputs: &inputs,
                        variables: &mut scratch,
                        size,
                        history_words: slot.history_words,
                        plasticity_enabled: ctx.learning_enabled,
                        new_outputs: &mut new_outputs,
                    };
                    kernels.state_update.run(&mut args, ctx.pool);
                }

                if let Some((name, _)) = variable_arrays.first() {
                    let start = slot_variable_start(attrs, idx);
                    let end = start + slot.size as usize;
                    if let Some(arr) = attrs.variables.get_mut(*name) {
                        arr[start..end].copy_from_slice(&scratch);
                    }
                }

                attrs.shift_output_per_neuron(idx, &new_outputs);
                attrs.register_mut(idx, root_register).fill(0.0);
                Ok(())
            }
            InstructionKind::InterDeviceTransfer { connection } => {
                let conn = ctx.network.connection(*connection);
                let from_idx = ctx.state.slot_index(conn.from());
                let values = ctx.state.attributes_of(conn.from()).extract_latest(from_idx);
                ctx.state.refresh_mirror(conn.from(), values);
                Ok(())
            }
        }
    }
}

/// The variable-array offset for layer `layer_index` within a partition's
/// flat per-neuron variable arrays (same offset convention as the output
/// ring / input registers: layers are laid out back to back by `size`)
fn slot_variable_start(attrs: &crate::attributes::Attributes, layer_index: usize) -> usize {
    (0..layer_index).map(|i| attrs.slot(i).size as usize).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use shnn_core::{ConnectionConfig, LayerConfig, NetworkBuilder};

    fn fully_connected_network() -> (shnn_core::Network, shnn_core::ConnectionId) {
        let mut b = NetworkBuilder::new();
        let s = b.add_structure("s");
        let a = b.add_layer(s, LayerConfig::new("float-rate", 2, 1)).unwrap();
        let c = b.add_layer(s, LayerConfig::new("float-rate", 2, 1)).unwrap();
        let conn = b
            .connect(ConnectionConfig::fully_connected(a, c, Opcode::Add))
            .unwrap();
        (b.build(), conn)
    }

    #[test]
    fn scenario_2_fully_connected_literal_weights() {
        let (net, conn_id) = fully_connected_network();
        let conn = net.connection(conn_id);
        let from = net.layer(conn.from());
        let to = net.layer(conn.to());
        // WeightMatrix rows index the destination neuron, columns the
        // source neuron, so a per-destination weight list reads across a
        // row: dest 0 takes [0.5, 1.0] from [A0, A1], dest 1 takes
        // [0.25, 0.0].
        let mut matrix = crate::weight_matrix::WeightMatrix::zeros(2, 2, 0.0, 1.0, false);
        matrix.set(0, 0, 0.5);
        matrix.set(0, 1, 1.0);
        matrix.set(1, 0, 0.25);
        matrix.set(1, 1, 0.0);
        let source = [1.0f32, 2.0];
        let deltas = connection_deltas(conn, from, to, &matrix, &source);
        assert_eq!(deltas, vec![2.5, 0.25]);
    }

    #[test]
    fn apply_opcode_add_accumulates() {
        assert_eq!(apply_opcode(1.0, 2.0, Opcode::Add, false), 3.0);
        assert_eq!(apply_opcode(1.0, 2.0, Opcode::Add, true), 2.0);
    }

    #[test]
    fn apply_opcode_div_by_zero_is_a_no_op() {
        assert_eq!(apply_opcode(5.0, 0.0, Opcode::Div, false), 5.0);
    }

    #[test]
    fn scenario_3_convolutional_cross_kernel() {
        // 5x5 all-ones input, 3x3 cross kernel, stride 1, no offset -> 3x3
        // output of 4 everywhere (spec.md §8 Scenario 3)
        let mut b = NetworkBuilder::new();
        let s = b.add_structure("s");
        let from = b.add_layer(s, LayerConfig::new("float-rate", 5, 5)).unwrap();
        let to = b.add_layer(s, LayerConfig::new("float-rate", 3, 3)).unwrap();
        let conn_cfg = ConnectionConfig::fully_connected(from, to, Opcode::Add).with_arborized_shape(
            ConnectionType::Convolutional,
            ShapeConfig::Arborized {
                field_rows: 3,
                field_columns: 3,
                stride_rows: 1,
                stride_columns: 1,
                offset_rows: 0,
                offset_columns: 0,
            },
        );
        let conn_id = b.connect(conn_cfg).unwrap();
        let net = b.build();
        let conn = net.connection(conn_id);
        let from_layer = net.layer(conn.from());
        let to_layer = net.layer(conn.to());

        let mut matrix = crate::weight_matrix::WeightMatrix::zeros(1, 9, 0.0, 1.0, false);
        let kernel = [0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0];
        for (i, w) in kernel.iter().enumerate() {
            matrix.set(0, i as u32, *w);
        }
        let source = [1.0f32; 25];
        let deltas = connection_deltas(conn, from_layer, to_layer, &matrix, &source);
        assert_eq!(deltas, vec![4.0; 9]);
    }
}
