use std::collections::HashMap;

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};

use shnn_core::{ConnectionConfig, IoType, LayerConfig, Network, NetworkBuilder, Opcode};
use shnn_runtime::{Buffer, ClusterKind, Engine, EngineConfig, LayerId, Module, ModelRegistry};

struct NoOpModule {
    driven: LayerId,
}

impl Module for NoOpModule {
    fn feed_input(&mut self, buffer: &mut Buffer) {
        buffer.write_input(self.driven, &[1.0]);
    }
    fn report_output(&mut self, _buffer: &Buffer) {}
    fn cycle(&mut self) {}
    fn get_io_type(&self, layer: LayerId) -> IoType {
        if layer == self.driven {
            IoType::INPUT
        } else {
            IoType::NONE
        }
    }
    fn is_coactive(&self, _other: &dyn Module) -> bool {
        false
    }
}

/// Either a feed-forward chain (A1 -> A2 -> ... -> An, one-to-one) or a
/// fully-connected pair of layers, matching spec.md §8 Scenario 2's shape.
fn build_network(neurons: u32, fully_connected: bool) -> (Network, LayerId) {
    let mut b = NetworkBuilder::new();
    let s = b.add_structure("bench");

    if fully_connected {
        let from = b
            .add_layer(s, LayerConfig::new("float-rate", neurons, 1).with_io_type(IoType::INPUT))
            .unwrap();
        let to = b
            .add_layer(s, LayerConfig::new("float-rate", neurons, 1).with_io_type(IoType::OUTPUT))
            .unwrap();
        b.connect(ConnectionConfig::fully_connected(from, to, Opcode::Add)).unwrap();
        (b.build(), from)
    } else {
        let first = b
            .add_layer(s, LayerConfig::new("float-rate", 1, 1).with_io_type(IoType::INPUT))
            .unwrap();
        let mut prev = first;
        for i in 1..neurons.max(2) {
            let io = if i == neurons - 1 { IoType::OUTPUT } else { IoType::NONE };
            let next = b.add_layer(s, LayerConfig::new("float-rate", 1, 1).with_io_type(io)).unwrap();
            b.connect(ConnectionConfig::one_to_one(prev, next, Opcode::Add)).unwrap();
            prev = next;
        }
        (b.build(), first)
    }
}

fn run_timesteps(net: Network, driven: LayerId, iterations: u64) {
    let mut cluster_kinds = HashMap::new();
    for structure in net.structures() {
        cluster_kinds.insert(structure.id(), ClusterKind::Feedforward);
    }
    let mut config = EngineConfig::default();
    config.iterations = iterations;

    let mut engine = Engine::build(
        net,
        ModelRegistry::with_reference_models(),
        vec![Box::new(NoOpModule { driven })],
        HashMap::new(),
        cluster_kinds,
        config,
        1234,
    )
    .expect("bench engine build");
    engine.run().expect("bench engine run");
}

fn bench_fixed_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("shnn_runtime_fixed_step");
    let iterations = 50;

    for &n in &[8u32, 16u32, 32u32] {
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::new("chain", n), &n, |b, &n| {
            b.iter_batched(
                || build_network(n, false),
                |(net, driven)| run_timesteps(net, driven, iterations),
                BatchSize::SmallInput,
            );
        });

        if n <= 16 {
            group.bench_with_input(BenchmarkId::new("fully_connected", n), &n, |b, &n| {
                b.iter_batched(
                    || build_network(n, true),
                    |(net, driven)| run_timesteps(net, driven, iterations),
                    BatchSize::SmallInput,
                );
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_fixed_step);
criterion_main!(benches);
