//! Structures and the network builder
//!
//! The network *build* API (`add_layer`, `connect`, `set_second_order`) is
//! an external collaborator per spec.md §1/§6: configuration parsing and
//! persistence live outside this crate. What lives here is the minimal
//! builder surface the engine needs to consume a finished [`Network`], plus
//! the invariants spec.md §7 assigns to `invalid-config`/`invalid-topology`.

use std::collections::HashMap;

use crate::connection::{validate_topology, weight_count, Connection, ConnectionConfig, ConnectionId};
use crate::dendritic::{DendriticNodeId, DendriticTree};
use crate::error::{Error, Result};
use crate::layer::{Layer, LayerConfig, LayerId};

/// Stable identity of a [`Structure`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StructureId(pub u32);

/// A named grouping of layers that share a [`crate::cluster`]-scheduling
/// policy at the runtime level (the policy tag itself, `Parallel` /
/// `Sequential` / `Feedforward`, is a runtime concern — see
/// `shnn_runtime::cluster::ClusterKind` — because it governs scheduling,
/// not network data)
#[derive(Debug, Clone)]
pub struct Structure {
    id: StructureId,
    name: String,
    layers: Vec<LayerId>,
}

impl Structure {
    /// This structure's identity
    pub fn id(&self) -> StructureId {
        self.id
    }

    /// User-facing name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Layers owned by this structure, in build order
    pub fn layers(&self) -> &[LayerId] {
        &self.layers
    }
}

/// A fully-built, immutable network: the `Layer`/`Connection`/
/// `DendriticNode` graph the engine consumes
#[derive(Debug, Clone, Default)]
pub struct Network {
    structures: Vec<Structure>,
    layers: Vec<Layer>,
    connections: Vec<Connection>,
    dendritic_trees: HashMap<LayerId, DendriticTree>,
    layer_structure: HashMap<LayerId, StructureId>,
}

impl Network {
    /// All structures, in build order
    pub fn structures(&self) -> &[Structure] {
        &self.structures
    }

    /// All layers, in build order
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// All connections, in build order
    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// Look up a layer by id
    pub fn layer(&self, id: LayerId) -> &Layer {
        &self.layers[id.raw() as usize]
    }

    /// Look up a connection by id
    pub fn connection(&self, id: ConnectionId) -> &Connection {
        &self.connections[id.raw() as usize]
    }

    /// Look up the dendritic tree owned by a layer
    pub fn dendritic_tree(&self, layer: LayerId) -> &DendriticTree {
        &self.dendritic_trees[&layer]
    }

    /// The structure a layer belongs to
    pub fn structure_of(&self, layer: LayerId) -> StructureId {
        self.layer_structure[&layer]
    }

    /// Layers belonging to one structure
    pub fn layers_in(&self, structure: StructureId) -> impl Iterator<Item = &Layer> + '_ {
        self.structures[structure.0 as usize]
            .layers
            .iter()
            .map(move |id| self.layer(*id))
    }
}

/// Incrementally assembles a [`Network`]
///
/// Validate-then-construct: every mutating call can fail immediately
/// (spec.md §7: "All errors during build propagate up and abort
/// construction").
#[derive(Debug, Default)]
pub struct NetworkBuilder {
    network: Network,
}

impl NetworkBuilder {
    /// Start an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a new, empty structure
    pub fn add_structure(&mut self, name: impl Into<String>) -> StructureId {
        let id = StructureId(self.network.structures.len() as u32);
        self.network.structures.push(Structure {
            id,
            name: name.into(),
            layers: Vec::new(),
        });
        id
    }

    /// Add a layer to a structure
    pub fn add_layer(&mut self, structure: StructureId, config: LayerConfig) -> Result<LayerId> {
        if config.rows == 0 || config.columns == 0 {
            return Err(Error::invalid_config("layer dimensions must be non-zero"));
        }
        let id = LayerId::new(self.network.layers.len() as u32);
        let mut tree = DendriticTree::new();
        let root = tree.push_node(None, crate::connection::Opcode::Add);
        self.network.layers.push(Layer::new(id, &config, root));
        self.network.dendritic_trees.insert(id, tree);
        self.network.layer_structure.insert(id, structure);
        self.network.structures[structure.0 as usize].layers.push(id);
        Ok(id)
    }

    /// Connect two layers, validating the invariants spec.md §7 names
    /// `invalid-topology`
    pub fn connect(&mut self, config: ConnectionConfig) -> Result<ConnectionId> {
        let from = self.network.layer(config.from).clone();
        let to = self.network.layer(config.to).clone();
        validate_topology(&config, &from, &to)?;
        let count = weight_count(&config, &from, &to)?;

        let max_words = crate::weight_config::MAX_DELAY_BITS + 1;
        if config.delay > crate::weight_config::MAX_DELAY_BITS && !config.cap_delay {
            return Err(Error::DelayOutOfRange {
                delay: config.delay,
                max_words,
                cap_delay: config.cap_delay,
            });
        }

        let id = ConnectionId::new(self.network.connections.len() as u32);
        let to_id = config.to;
        let from_id = config.from;
        let opcode = config.opcode;
        self.network
            .connections
            .push(Connection::new(id, config, count));

        // Every connection feeds a dendritic leaf at its destination's root
        // unless the caller later reparents it via `attach_to_node`.
        let tree = self.network.dendritic_trees.get_mut(&to_id).unwrap();
        let root = self.network.layer(to_id).dendritic_root();
        tree.attach_connection(root, id);
        let _ = opcode;

        self.network.layers[to_id.raw() as usize].push_input_connection(id);
        self.network.layers[from_id.raw() as usize].push_output_connection(id);
        Ok(id)
    }

    /// Allocate a new internal dendritic node under `parent` (or the
    /// layer's root, if `parent` is `None`), combined via `opcode`
    pub fn add_dendritic_node(
        &mut self,
        layer: LayerId,
        parent: Option<DendriticNodeId>,
        opcode: crate::connection::Opcode,
    ) -> DendriticNodeId {
        let tree = self.network.dendritic_trees.get_mut(&layer).unwrap();
        let parent = parent.unwrap_or_else(|| self.network.layer(layer).dendritic_root());
        tree.push_node(Some(parent), opcode)
    }

    /// Reparent a connection's synaptic input onto a specific dendritic node
    /// instead of the layer's root
    pub fn attach_connection_to_node(
        &mut self,
        connection: ConnectionId,
        node: DendriticNodeId,
    ) {
        let to = self.network.connection(connection).to();
        let tree = self.network.dendritic_trees.get_mut(&to).unwrap();
        tree.attach_connection(node, connection);
    }

    /// Mark a dendritic subtree as second-order (a multiplicative gate)
    pub fn set_second_order(&mut self, layer: LayerId, node: DendriticNodeId) {
        let tree = self.network.dendritic_trees.get_mut(&layer).unwrap();
        tree.mark_second_order(node);
    }

    /// Finish building, handing ownership of the [`Network`] to the caller
    pub fn build(self) -> Network {
        self.network
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Opcode;

    #[test]
    fn one_to_one_mismatch_is_invalid_topology() {
        let mut b = NetworkBuilder::new();
        let s = b.add_structure("s");
        let a = b.add_layer(s, LayerConfig::new("float", 2, 2)).unwrap();
        let c = b.add_layer(s, LayerConfig::new("float", 3, 3)).unwrap();
        let err = b
            .connect(ConnectionConfig::one_to_one(a, c, Opcode::Add))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTopology { .. }));
    }

    #[test]
    fn gap_junction_requires_matching_shape() {
        let mut b = NetworkBuilder::new();
        let s = b.add_structure("s");
        let a = b.add_layer(s, LayerConfig::new("float", 2, 2)).unwrap();
        let c = b.add_layer(s, LayerConfig::new("float", 3, 3)).unwrap();
        let err = b
            .connect(ConnectionConfig::fully_connected(a, c, Opcode::Gap))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTopology { .. }));
    }

    #[test]
    fn delay_beyond_bound_without_cap_is_rejected_at_build_time() {
        let mut b = NetworkBuilder::new();
        let s = b.add_structure("s");
        let a = b.add_layer(s, LayerConfig::new("float", 1, 1)).unwrap();
        let c = b.add_layer(s, LayerConfig::new("float", 1, 1)).unwrap();
        let cfg = ConnectionConfig::one_to_one(a, c, Opcode::Add).with_delay(32);
        let err = b.connect(cfg).unwrap_err();
        assert!(matches!(err, Error::DelayOutOfRange { .. }));
    }

    #[test]
    fn fully_connected_weight_count() {
        let mut b = NetworkBuilder::new();
        let s = b.add_structure("s");
        let a = b.add_layer(s, LayerConfig::new("float", 2, 1)).unwrap();
        let c = b.add_layer(s, LayerConfig::new("float", 2, 1)).unwrap();
        let conn = b
            .connect(ConnectionConfig::fully_connected(a, c, Opcode::Add))
            .unwrap();
        let net = b.build();
        assert_eq!(net.connection(conn).weight_count(), 4);
    }
}
