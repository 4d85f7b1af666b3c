//! ClusterNode/Cluster: per-layer instruction bundles grouped by a
//! structure-level scheduling policy (spec.md §4.8)
//!
//! A [`ClusterNode`] is built once, at engine-build time, by walking a
//! layer's dendritic tree bottom-up (spec.md §9's "bottom-up-safe" order:
//! a child's id is always greater than its parent's, so visiting node ids
//! in descending order guarantees every child register is fully folded
//! before its parent reads it). A [`Cluster`] groups the `ClusterNode`s of
//! one [`shnn_core::Structure`] under one [`ClusterKind`], which decides
//! *when*, relative to the rest of the network, those nodes' phases run.

use std::collections::{HashMap, VecDeque};

use shnn_core::{DendriticLeaf, DendriticNodeId, IoType, LayerId, Network, StructureId};

use crate::error::{Result, RuntimeError};
use crate::instruction::{ExecContext, Instruction, InstructionId, InstructionKind};
use crate::state::State;

/// How a [`Structure`](shnn_core::Structure)'s layers are scheduled
/// relative to one another and to the rest of the network (spec.md §4.8)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterKind {
    /// Every layer reads only the *previous* timestep's output from every
    /// other layer; the whole cluster participates in the engine's global
    /// activation/state/output phase barrier alongside every other
    /// `Parallel`/`Sequential` cluster.
    Parallel,
    /// Same read contract as `Parallel` (previous-timestep only); the
    /// distinction is advisory intra-cluster ordering, not a data-visibility
    /// difference — this build schedules both identically (documented in
    /// DESIGN.md).
    Sequential,
    /// Layers run a full activation→state→output pipeline one at a time, in
    /// dependency order, so a downstream layer may read an upstream layer's
    /// *current*-timestep output (spec.md §4.8). Validated acyclic at build
    /// time over this cluster's intra-structure connections.
    Feedforward,
}

/// One layer's compiled instruction set (spec.md §4.7, §4.8)
///
/// `InterDeviceTransfer`s are not part of any one node: they are
/// deduplicated network-wide by [`crate::state::State::inter_device_sources`]
/// and run once per timestep by the engine before any node's activation
/// phase (spec.md §4.7, §8 invariant 5, Scenario 6) — a per-node list here
/// would re-run the same copy once per consumer.
pub struct ClusterNode {
    layer: LayerId,
    /// `InputTransfer`, present iff the layer has the `INPUT` io type
    input_transfer: Option<Instruction>,
    /// `ExpectedTransfer`, present iff the layer has the `EXPECTED` io type
    expected_transfer: Option<Instruction>,
    /// `SynapseActivate`/`DendriticInternal` instructions, in the
    /// children-before-parent order the dendritic tree requires
    activation: Vec<Instruction>,
    /// The layer's single `StateUpdate`
    state_update: Instruction,
    /// `SynapseUpdate`s for this layer's plastic input connections
    weight_updates: Vec<Instruction>,
    /// `OutputTransfer`, present iff the layer has the `OUTPUT` io type
    output_transfer: Option<Instruction>,
    /// Recorded once this node's aggregation instructions have run
    input_event: crate::device::Event,
    /// Recorded once this node's state update has run
    state_event: crate::device::Event,
    /// Recorded once this node's output transfer has run
    output_event: crate::device::Event,
}

impl ClusterNode {
    /// Walk `layer`'s dendritic tree and connection lists into one compiled
    /// node (spec.md §4.7, §4.8)
    pub fn build(network: &Network, layer: LayerId) -> Self {
        let mut next_id = 0u32;
        let mut fresh = || {
            let id = InstructionId(next_id);
            next_id += 1;
            id
        };

        let layer_ref = network.layer(layer);
        let tree = network.dendritic_tree(layer);

        let io = layer_ref.io_type();
        let input_transfer = io
            .contains(IoType::INPUT)
            .then(|| Instruction::new(fresh(), InstructionKind::InputTransfer { layer }));
        let expected_transfer = io
            .contains(IoType::EXPECTED)
            .then(|| Instruction::new(fresh(), InstructionKind::ExpectedTransfer { layer }));
        let output_transfer = io
            .contains(IoType::OUTPUT)
            .then(|| Instruction::new(fresh(), InstructionKind::OutputTransfer { layer }));

        let mut activation = Vec::new();
        let register_count = tree.register_count();
        for raw in (0..register_count).rev() {
            let node = tree.node(DendriticNodeId::new(raw));
            for (i, leaf) in node.children().iter().enumerate() {
                let initializes = i == 0;
                match *leaf {
                    DendriticLeaf::Connection(connection) => {
                        activation.push(Instruction::new(
                            fresh(),
                            InstructionKind::SynapseActivate {
                                connection,
                                register: node.register(),
                                initializes,
                            },
                        ));
                    }
                    DendriticLeaf::Child(child_id) => {
                        let child = tree.node(child_id);
                        activation.push(Instruction::new(
                            fresh(),
                            InstructionKind::DendriticInternal {
                                layer,
                                parent_register: node.register(),
                                child_register: child.register(),
                                opcode: child.opcode(),
                                initializes,
                            },
                        ));
                    }
                }
            }
        }

        let state_update = Instruction::new(fresh(), InstructionKind::StateUpdate { layer });

        let weight_updates = layer_ref
            .input_connections()
            .iter()
            .filter(|&&cid| network.connection(cid).is_plastic())
            .map(|&cid| Instruction::new(fresh(), InstructionKind::SynapseUpdate { connection: cid }))
            .collect();

        Self {
            layer,
            input_transfer,
            expected_transfer,
            activation,
            state_update,
            weight_updates,
            output_transfer,
            input_event: crate::device::Event::new(),
            state_event: crate::device::Event::new(),
            output_event: crate::device::Event::new(),
        }
    }

    /// The layer this node compiles
    pub fn layer(&self) -> LayerId {
        self.layer
    }

    /// Run every instruction that feeds this layer's dendritic registers:
    /// buffer transfers, then the tree fold (spec.md §4.7's aggregation
    /// phase). Inter-device mirrors must already be fresh by the time this
    /// runs — see [`run_inter_device_transfers`].
    pub fn run_activation(&self, ctx: &mut ExecContext) -> Result<()> {
        if let Some(instr) = &self.input_transfer {
            instr.execute(ctx)?;
        }
        if let Some(instr) = &self.expected_transfer {
            instr.execute(ctx)?;
        }
        for instr in &self.activation {
            instr.execute(ctx)?;
        }
        self.input_event.record();
        Ok(())
    }

    /// Run this layer's neuron-model state update
    pub fn run_state_update(&self, ctx: &mut ExecContext) -> Result<()> {
        self.state_update.execute(ctx)?;
        self.state_event.record();
        Ok(())
    }

    /// Run this layer's plastic weight updates, if learning is enabled
    pub fn run_weight_update(&self, ctx: &mut ExecContext) -> Result<()> {
        for instr in &self.weight_updates {
            instr.execute(ctx)?;
        }
        Ok(())
    }

    /// Copy this layer's newest output into the environment-facing buffer,
    /// if it has the `OUTPUT` io type
    pub fn run_output_transfer(&self, ctx: &mut ExecContext) -> Result<()> {
        if let Some(instr) = &self.output_transfer {
            instr.execute(ctx)?;
        }
        self.output_event.record();
        Ok(())
    }

    /// Event recorded once this node's aggregation has run this timestep
    pub fn input_event(&self) -> &crate::device::Event {
        &self.input_event
    }

    /// Event recorded once this node's state update has run this timestep
    pub fn state_event(&self) -> &crate::device::Event {
        &self.state_event
    }

    /// Event recorded once this node's output transfer has run this timestep
    pub fn output_event(&self) -> &crate::device::Event {
        &self.output_event
    }
}

/// A [`shnn_core::Structure`]'s compiled `ClusterNode`s plus the dispatch
/// policy that governs their relative ordering (spec.md §4.8)
pub struct Cluster {
    kind: ClusterKind,
    nodes: Vec<ClusterNode>,
    /// Dispatch order: identity for `Parallel`/`Sequential`, a validated
    /// topological order over intra-cluster connections for `Feedforward`
    order: Vec<usize>,
}

impl Cluster {
    /// Compile every layer of `structure` into a `ClusterNode`, under
    /// `kind`'s dispatch policy
    pub fn build(network: &Network, structure: StructureId, kind: ClusterKind) -> Result<Self> {
        let layers: Vec<LayerId> = network.layers_in(structure).map(|l| l.id()).collect();
        let nodes: Vec<ClusterNode> = layers.iter().map(|&layer| ClusterNode::build(network, layer)).collect();

        let order = match kind {
            ClusterKind::Feedforward => Self::topological_order(network, &layers)?,
            ClusterKind::Parallel | ClusterKind::Sequential => (0..layers.len()).collect(),
        };

        Ok(Self { kind, nodes, order })
    }

    fn topological_order(network: &Network, layers: &[LayerId]) -> Result<Vec<usize>> {
        let index_of: HashMap<LayerId, usize> =
            layers.iter().enumerate().map(|(i, &l)| (l, i)).collect();

        let mut in_degree = vec![0usize; layers.len()];
        let mut edges: Vec<Vec<usize>> = vec![Vec::new(); layers.len()];
        for conn in network.connections() {
            if conn.from() == conn.to() {
                continue; // a self-connection never orders this node against another
            }
            if let (Some(&from_idx), Some(&to_idx)) =
                (index_of.get(&conn.from()), index_of.get(&conn.to()))
            {
                edges[from_idx].push(to_idx);
                in_degree[to_idx] += 1;
            }
        }

        let mut queue: VecDeque<usize> = (0..layers.len()).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(layers.len());
        while let Some(i) = queue.pop_front() {
            order.push(i);
            for &next in &edges[i] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    queue.push_back(next);
                }
            }
        }

        if order.len() != layers.len() {
            return Err(RuntimeError::invalid_topology(
                "feedforward cluster's intra-structure connections contain a cycle",
            ));
        }
        Ok(order)
    }

    /// This cluster's dispatch policy
    pub fn kind(&self) -> ClusterKind {
        self.kind
    }

    /// This cluster's compiled nodes, in build order
    pub fn nodes(&self) -> &[ClusterNode] {
        &self.nodes
    }

    /// Run every node's aggregation phase (spec.md §4.8); only meaningful
    /// for `Parallel`/`Sequential` clusters, which the engine's global
    /// phase barrier drives directly
    pub fn run_activation_phase(&self, ctx: &mut ExecContext) -> Result<()> {
        for node in &self.nodes {
            node.run_activation(ctx)?;
        }
        Ok(())
    }

    /// Run every node's state update (global phase, `Parallel`/`Sequential`)
    pub fn run_state_phase(&self, ctx: &mut ExecContext) -> Result<()> {
        for node in &self.nodes {
            node.run_state_update(ctx)?;
        }
        Ok(())
    }

    /// Run every node's plastic weight update (global phase,
    /// `Parallel`/`Sequential`)
    pub fn run_weight_update_phase(&self, ctx: &mut ExecContext) -> Result<()> {
        for node in &self.nodes {
            node.run_weight_update(ctx)?;
        }
        Ok(())
    }

    /// Run every node's output transfer (global phase, `Parallel`/`Sequential`)
    pub fn run_output_phase(&self, ctx: &mut ExecContext) -> Result<()> {
        for node in &self.nodes {
            node.run_output_transfer(ctx)?;
        }
        Ok(())
    }

    /// Run a `Feedforward` cluster's whole timestep: each node's full
    /// activation→state→weight-update→output pipeline, one at a time, in
    /// the validated topological order, so a downstream node's activation
    /// can read an upstream node's freshly-written current-timestep output
    /// (spec.md §4.8).
    pub fn run_feedforward_timestep(&self, ctx: &mut ExecContext) -> Result<()> {
        debug_assert_eq!(self.kind, ClusterKind::Feedforward);
        for &idx in &self.order {
            let node = &self.nodes[idx];
            node.run_activation(ctx)?;
            node.run_state_update(ctx)?;
            node.run_weight_update(ctx)?;
            node.run_output_transfer(ctx)?;
        }
        Ok(())
    }
}

/// Refreshes every distinct inter-device source layer's mirror exactly
/// once for this timestep, before any `Cluster`'s activation phase runs
/// (spec.md §4.7 `InterDeviceTransfer`, §8 invariant 5, Scenario 6: "one
/// copy from A's output buffer... regardless of how many connections
/// share that source").
pub fn run_inter_device_transfers(ctx: &mut ExecContext) -> Result<()> {
    let sources: Vec<_> = ctx.state.inter_device_sources().to_vec();
    for (i, connection) in sources.into_iter().enumerate() {
        Instruction::new(InstructionId(i as u32), InstructionKind::InterDeviceTransfer { connection })
            .execute(ctx)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Buffer;
    use crate::model::ModelRegistry;
    use crate::resource::WorkerPool;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use shnn_core::{ConnectionConfig, LayerConfig, NetworkBuilder, Opcode};
    use std::collections::HashMap as StdHashMap;

    fn build_two_layer_network() -> (Network, shnn_core::ConnectionId, StructureId) {
        let mut b = NetworkBuilder::new();
        let s = b.add_structure("s");
        let a = b.add_layer(s, LayerConfig::new("float-rate", 1, 1)).unwrap();
        let c = b.add_layer(s, LayerConfig::new("float-rate", 1, 1)).unwrap();
        let conn = b
            .connect(ConnectionConfig::one_to_one(a, c, Opcode::Add))
            .unwrap();
        (b.build(), conn, s)
    }

    #[test]
    fn feedforward_cluster_rejects_a_cycle() {
        let mut b = NetworkBuilder::new();
        let s = b.add_structure("s");
        let a = b.add_layer(s, LayerConfig::new("float-rate", 1, 1)).unwrap();
        let c = b.add_layer(s, LayerConfig::new("float-rate", 1, 1)).unwrap();
        b.connect(ConnectionConfig::one_to_one(a, c, Opcode::Add)).unwrap();
        b.connect(ConnectionConfig::one_to_one(c, a, Opcode::Add)).unwrap();
        let net = b.build();

        let err = Cluster::build(&net, s, ClusterKind::Feedforward).unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidTopology { .. }));
    }

    #[test]
    fn parallel_cluster_activation_accumulates_into_destination_register() {
        let (net, _conn, s) = build_two_layer_network();
        let devices = [crate::device::DeviceId::HOST];
        let registry = ModelRegistry::with_reference_models();
        let mut rng = StdRng::seed_from_u64(1);
        let mut state = State::build(&net, &devices, &registry, &StdHashMap::new(), &mut rng).unwrap();
        for conn in net.connections() {
            state.weights_of_mut(conn.id()).set(0, 0, 1.0);
        }

        let cluster = Cluster::build(&net, s, ClusterKind::Parallel).unwrap();
        assert_eq!(cluster.kind(), ClusterKind::Parallel);
        assert_eq!(cluster.nodes().len(), 2);

        let mut buffer = Buffer::new(&[], &[], |_| 1);
        let pool = WorkerPool::new(1).unwrap();
        let mut exec_rng = StdRng::seed_from_u64(2);
        let mut ctx = ExecContext {
            network: &net,
            state: &mut state,
            buffer: &mut buffer,
            registry: &registry,
            pool: &pool,
            rng: &mut exec_rng,
            learning_enabled: false,
        };
        cluster.run_activation_phase(&mut ctx).unwrap();
        cluster.run_state_phase(&mut ctx).unwrap();
        cluster.run_output_phase(&mut ctx).unwrap();
    }
}
