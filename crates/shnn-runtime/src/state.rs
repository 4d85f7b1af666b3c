//! State: ownership of all Attributes and WeightMatrices, partitioned
//! across devices; lookup routines (spec.md §4.6)

use std::collections::HashMap;

use shnn_core::{ConnectionId, ConnectionType, DiagonalFlag, LayerId, Network, WeightConfig};

use crate::attributes::{Attributes, LayerSlot, ModelKind};
use crate::device::DeviceId;
use crate::model::ModelRegistry;
use crate::weight_matrix::WeightMatrix;
use crate::error::{Result, RuntimeError};

/// Where one layer lives: its device, and its index inside that
/// (device, model) partition's [`Attributes`]
#[derive(Debug, Clone)]
pub struct LayerLocation {
    /// Assigned device
    pub device: DeviceId,
    /// Partition key (device, model name)
    pub partition: (DeviceId, String),
    /// This layer's index within the partition's `Attributes` slots
    pub index_in_partition: usize,
}

/// Per-connection weight-initialization policy, supplied at build time
/// (construction/config parsing is out of core scope per spec.md §1; this
/// is the minimal surface the engine needs to materialize a connection's
/// [`WeightMatrix`])
#[derive(Debug, Clone)]
pub struct WeightInit {
    /// How to seed the dense weight array
    pub config: WeightConfig,
    /// Whether to zero the diagonal (square connections only)
    pub diagonal: DiagonalFlag,
}

impl Default for WeightInit {
    fn default() -> Self {
        Self {
            config: WeightConfig::Flat {
                value: 0.0,
                fraction: 0.0,
            },
            diagonal: DiagonalFlag::default(),
        }
    }
}

/// Ownership of all [`Attributes`] and [`WeightMatrix`] instances,
/// partitioned by (device, neural-model) and by connection respectively
/// (spec.md §3 ownership summary, §4.6)
pub struct State {
    locations: HashMap<LayerId, LayerLocation>,
    partitions: HashMap<(DeviceId, String), Attributes>,
    weight_matrices: HashMap<ConnectionId, WeightMatrix>,
    inter_device: std::collections::HashSet<ConnectionId>,
    /// One representative connection per distinct inter-device source
    /// layer, network-wide — the dedup key for spec.md §4.7
    /// `InterDeviceTransfer` ("once per (source layer, timestep) regardless
    /// of fan-out", Scenario 6 invariant 5). Computed once at build time so
    /// the transfer runs exactly once per timestep no matter how many
    /// `Cluster`s/layers consume that source.
    inter_device_sources: Vec<ConnectionId>,
    /// Per-source-layer mirror of its latest output word, populated by
    /// `InterDeviceTransfer` and read by inter-device `SynapseActivate`
    /// (spec.md §4.6, §4.7, Scenario 6)
    mirrors: HashMap<LayerId, Vec<f32>>,
}

impl State {
    /// Assign each layer to a device (simple round-robin over `devices`),
    /// build one `Attributes` partition per (device, model) pair, and
    /// build a `WeightMatrix` for every connection (spec.md §4.6 steps 1-3)
    pub fn build(
        network: &Network,
        devices: &[DeviceId],
        registry: &ModelRegistry,
        weight_inits: &HashMap<ConnectionId, WeightInit>,
        rng: &mut impl rand::Rng,
    ) -> Result<Self> {
        if devices.is_empty() {
            return Err(RuntimeError::invalid_config("State::build requires at least one device"));
        }

        let mut layers_by_partition: HashMap<(DeviceId, String), Vec<LayerId>> = HashMap::new();
        let mut locations = HashMap::new();
        for (i, layer) in network.layers().iter().enumerate() {
            let device = devices[i % devices.len()];
            let key = (device, layer.model().as_str().to_string());
            let bucket = layers_by_partition.entry(key.clone()).or_default();
            locations.insert(
                layer.id(),
                LayerLocation {
                    device,
                    partition: key,
                    index_in_partition: bucket.len(),
                },
            );
            bucket.push(layer.id());
        }

        let mut partitions = HashMap::new();
        for (key, layer_ids) in &layers_by_partition {
            let model = registry.get(&key.1).ok_or_else(|| {
                RuntimeError::invalid_config(format!("unknown neural model '{}'", key.1))
            })?;

            let mut slots = Vec::with_capacity(layer_ids.len());
            let mut input_offset = 0u32;
            let mut output_offset = 0u32;
            let timesteps_per_word = if model.kind() == ModelKind::Bit { 32 } else { 1 };
            for &lid in layer_ids {
                let layer = network.layer(lid);
                let tree = network.dendritic_tree(lid);
                let register_count = tree.register_count().max(1);
                let max_delay = layer
                    .input_connections()
                    .iter()
                    .map(|c| network.connection(*c).delay())
                    .max()
                    .unwrap_or(0);
                let history_words = 1 + max_delay / timesteps_per_word;
                slots.push(LayerSlot {
                    size: layer.size(),
                    input_start: input_offset,
                    register_count,
                    output_start: output_offset,
                    history_words,
                    timesteps_per_word,
                });
                input_offset += register_count * layer.size();
                output_offset += history_words * layer.size();
            }

            let mut attrs = Attributes::new(model.kind(), slots);
            for name in model.variable_names() {
                attrs.register_variable(name);
            }
            partitions.insert(key.clone(), attrs);
        }

        let mut weight_matrices = HashMap::new();
        let mut inter_device = std::collections::HashSet::new();
        let mut seen_sources = std::collections::HashSet::new();
        let mut inter_device_sources = Vec::new();
        for conn in network.connections() {
            let to = network.layer(conn.to());
            let model = registry.get(to.model().as_str()).ok_or_else(|| {
                RuntimeError::invalid_config(format!("unknown neural model '{}'", to.model()))
            })?;

            let rows = if conn.connection_type() == ConnectionType::Convolutional {
                1
            } else {
                to.size()
            };
            let cols = conn.weight_count() / rows.max(1);

            let init = weight_inits.get(&conn.id()).cloned().unwrap_or_default();
            let mut matrix = WeightMatrix::from_config(
                rows,
                cols,
                conn.config(),
                &init.config,
                init.diagonal,
                rng,
            )?;
            model.process_weight_matrix(&mut matrix);
            weight_matrices.insert(conn.id(), matrix);

            if locations[&conn.from()].device != locations[&conn.to()].device {
                inter_device.insert(conn.id());
                if seen_sources.insert(conn.from()) {
                    inter_device_sources.push(conn.id());
                }
            }
        }

        Ok(Self {
            locations,
            partitions,
            weight_matrices,
            inter_device,
            inter_device_sources,
            mirrors: HashMap::new(),
        })
    }

    /// The device a layer was assigned to
    pub fn device_of(&self, layer: LayerId) -> DeviceId {
        self.locations[&layer].device
    }

    /// Borrow the `Attributes` partition owning `layer`
    pub fn attributes_of(&self, layer: LayerId) -> &Attributes {
        let loc = &self.locations[&layer];
        &self.partitions[&loc.partition]
    }

    /// Mutably borrow the `Attributes` partition owning `layer`
    pub fn attributes_of_mut(&mut self, layer: LayerId) -> &mut Attributes {
        let loc = self.locations[&layer].clone_key();
        self.partitions.get_mut(&loc).expect("partition exists")
    }

    /// This layer's index inside its partition's slot list
    pub fn slot_index(&self, layer: LayerId) -> usize {
        self.locations[&layer].index_in_partition
    }

    /// Borrow a connection's weight matrix
    pub fn weights_of(&self, connection: ConnectionId) -> &WeightMatrix {
        &self.weight_matrices[&connection]
    }

    /// Mutably borrow a connection's weight matrix
    pub fn weights_of_mut(&mut self, connection: ConnectionId) -> &mut WeightMatrix {
        self.weight_matrices.get_mut(&connection).expect("weight matrix exists")
    }

    /// Whether a connection crosses a device boundary
    pub fn is_inter_device(&self, connection: ConnectionId) -> bool {
        self.inter_device.contains(&connection)
    }

    /// One representative connection per distinct inter-device source
    /// layer, network-wide (spec.md §4.7, §8 invariant 5, Scenario 6):
    /// the engine runs exactly one `InterDeviceTransfer` per entry here,
    /// once per timestep, regardless of how many layers/clusters consume
    /// that source on the destination device.
    pub fn inter_device_sources(&self) -> &[ConnectionId] {
        &self.inter_device_sources
    }

    /// Overwrite `layer`'s mirror with its current output, one copy per
    /// timestep regardless of fan-out (spec.md §4.7 `InterDeviceTransfer`,
    /// Scenario 6)
    pub fn refresh_mirror(&mut self, layer: LayerId, values: Vec<f32>) {
        self.mirrors.insert(layer, values);
    }

    /// The mirrored copy of `layer`'s latest output, if one has been
    /// transferred
    pub fn mirror_of(&self, layer: LayerId) -> Option<&[f32]> {
        self.mirrors.get(&layer).map(Vec::as_slice)
    }

    /// Every partition key, for engine-build iteration order
    pub fn partition_keys(&self) -> impl Iterator<Item = &(DeviceId, String)> {
        self.partitions.keys()
    }

    /// Run `f` over every (device, model) partition's `Attributes`
    pub fn for_each_partition_mut(&mut self, mut f: impl FnMut(&(DeviceId, String), &mut Attributes)) {
        for (key, attrs) in self.partitions.iter_mut() {
            f(key, attrs);
        }
    }
}

impl LayerLocation {
    fn clone_key(&self) -> (DeviceId, String) {
        self.partition.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use shnn_core::{ConnectionConfig, LayerConfig, NetworkBuilder, Opcode};

    #[test]
    fn round_robin_assigns_layers_across_devices() {
        let mut b = NetworkBuilder::new();
        let s = b.add_structure("s");
        let a = b.add_layer(s, LayerConfig::new("float-rate", 1, 1)).unwrap();
        let c = b.add_layer(s, LayerConfig::new("float-rate", 1, 1)).unwrap();
        b.connect(ConnectionConfig::one_to_one(a, c, Opcode::Add)).unwrap();
        let net = b.build();

        let devices = [DeviceId::accelerator(0), DeviceId::HOST];
        let registry = ModelRegistry::with_reference_models();
        let mut rng = StdRng::seed_from_u64(1);
        let state = State::build(&net, &devices, &registry, &HashMap::new(), &mut rng).unwrap();

        assert_eq!(state.device_of(a), DeviceId::accelerator(0));
        assert_eq!(state.device_of(c), DeviceId::HOST);
        assert!(state.is_inter_device(net.connections()[0].id()));
    }

    #[test]
    fn inter_device_sources_dedups_one_entry_per_fanout_source() {
        // A on the host, B and C on the same accelerator, both fed by A:
        // two inter-device connections share one source layer, so
        // `inter_device_sources` must report exactly one entry (spec.md
        // §8 invariant 5, Scenario 6).
        let mut b = NetworkBuilder::new();
        let s = b.add_structure("s");
        let a = b.add_layer(s, LayerConfig::new("float-rate", 1, 1)).unwrap();
        let layer_b = b.add_layer(s, LayerConfig::new("float-rate", 1, 1)).unwrap();
        let layer_c = b.add_layer(s, LayerConfig::new("float-rate", 1, 1)).unwrap();
        b.connect(ConnectionConfig::one_to_one(a, layer_b, Opcode::Add)).unwrap();
        b.connect(ConnectionConfig::one_to_one(a, layer_c, Opcode::Add)).unwrap();
        let net = b.build();

        let devices = [DeviceId::HOST, DeviceId::accelerator(0), DeviceId::accelerator(0)];
        let registry = ModelRegistry::with_reference_models();
        let mut rng = StdRng::seed_from_u64(1);
        let state = State::build(&net, &devices, &registry, &HashMap::new(), &mut rng).unwrap();

        assert_eq!(state.device_of(a), DeviceId::HOST);
        assert_eq!(state.device_of(layer_b), DeviceId::accelerator(0));
        assert_eq!(state.device_of(layer_c), DeviceId::accelerator(0));
        assert_eq!(state.inter_device_sources().len(), 1);
        let rep = net.connection(state.inter_device_sources()[0]);
        assert_eq!(rep.from(), a);
    }

    #[test]
    fn same_device_connection_is_not_inter_device() {
        let mut b = NetworkBuilder::new();
        let s = b.add_structure("s");
        let a = b.add_layer(s, LayerConfig::new("float-rate", 1, 1)).unwrap();
        let c = b.add_layer(s, LayerConfig::new("float-rate", 1, 1)).unwrap();
        b.connect(ConnectionConfig::one_to_one(a, c, Opcode::Add)).unwrap();
        let net = b.build();

        let devices = [DeviceId::HOST];
        let registry = ModelRegistry::with_reference_models();
        let mut rng = StdRng::seed_from_u64(1);
        let state = State::build(&net, &devices, &registry, &HashMap::new(), &mut rng).unwrap();
        assert!(!state.is_inter_device(net.connections()[0].id()));
    }
}
