//! Engine: composes [`State`] + environment [`Module`]s + [`Cluster`]s +
//! [`Buffer`] into one runnable simulation (spec.md §4.9, §5, §6)
//!
//! The run loop follows spec.md §5's two-level scheduling model: at the
//! pipeline level, a network half and an environment half hand off three
//! locks (`sensory`, `motor`, `term`) in strict alternation when
//! `multithreaded` is set; within a timestep, per-device streams (here, the
//! host-only [`crate::resource::WorkerPool`]) dispatch the phase's
//! Instructions without further blocking.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use rand::rngs::StdRng;
use rand::SeedableRng;

use shnn_core::{ConnectionId, IoType, LayerId, Network, StructureId};

use crate::buffer::Buffer;
use crate::cluster::{Cluster, ClusterKind};
use crate::device::DeviceId;
use crate::error::{Result, RuntimeError};
use crate::instruction::ExecContext;
use crate::model::ModelRegistry;
use crate::resource::{ResourceManager, WorkerPool};
use crate::state::{State, WeightInit};

/// Process synchronization the engine calls into at the start and end of
/// `run` (spec.md §1 "a pair of barrier calls at start and end", §7 "MPI
/// barrier or scheduler failures are fatal", §8 Scenario 5). A real MPI
/// binding implements this trait and is substituted for [`NoopBarrier`]
/// without the engine itself knowing about MPI.
pub trait Barrier: Send + Sync {
    /// Block until every process has reached this call
    fn barrier(&self);
}

/// The default [`Barrier`] for a single-process run: synchronizes nothing
/// and returns immediately.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopBarrier;

impl Barrier for NoopBarrier {
    fn barrier(&self) {}
}

/// An external collaborator the engine feeds and reads every
/// `environment_rate` timesteps (spec.md §6). Concrete modules (GUI
/// backends, dataset readers, reward shapers, ...) are out of core scope;
/// this is the contract the engine consumes.
pub trait Module: Send {
    /// Write this module's current input into whichever layers it drives
    fn feed_input(&mut self, buffer: &mut Buffer);
    /// Read the layers this module observes from the freshly transferred
    /// output buffer
    fn report_output(&mut self, buffer: &Buffer);
    /// Advance whatever state the module keeps between environment steps
    /// (e.g. advancing a dataset cursor)
    fn cycle(&mut self);
    /// This module's opinion on how many iterations the run should take;
    /// `0` means no opinion (spec.md §4.9, §6)
    fn expected_iterations(&self) -> u64 {
        0
    }
    /// Which io role(s) this module plays for `layer`
    fn get_io_type(&self, layer: LayerId) -> IoType;
    /// Whether `self` and `other` may be active on the same layer in the
    /// same timestep without conflict (spec.md §7 `coactive-input-conflict`)
    fn is_coactive(&self, other: &dyn Module) -> bool;
}

/// Recognized `Engine::run` options (spec.md §6)
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Accelerator device indices to use; empty means every device the
    /// `ResourceManager` discovered
    pub devices: Vec<u32>,
    /// Timesteps to run; `0` defers to modules' `expected_iterations`, and
    /// if none declare one, runs until interrupted
    pub iterations: u64,
    /// Worker-pool thread count (`0` = rayon default)
    pub worker_threads: usize,
    /// Run the two-thread pipeline (network + environment) instead of a
    /// single sequential thread
    pub multithreaded: bool,
    /// Log phase-level detail
    pub verbose: bool,
    /// Whether plastic Instructions run this call
    pub learning_flag: bool,
    /// Suppress module output reporting (network still runs)
    pub suppress_output: bool,
    /// Perform environment I/O every *k*th timestep
    pub environment_rate: u32,
    /// Upper bound on loop frequency, in Hz; `0` means unbounded
    pub refresh_rate: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            devices: Vec::new(),
            iterations: 0,
            worker_threads: 0,
            multithreaded: false,
            verbose: false,
            learning_flag: true,
            suppress_output: false,
            environment_rate: 1,
            refresh_rate: 0.0,
        }
    }
}

/// The engine's structured run report (spec.md §6)
#[derive(Debug, Clone)]
pub struct Report {
    /// Total wall-clock seconds spent in `run`
    pub total_wall_seconds: f64,
    /// Iterations per second actually achieved
    pub refresh_rate_achieved: f64,
    /// Timesteps actually executed
    pub iterations: u64,
    /// Peak bytes allocated per device, keyed by raw device id
    pub peak_memory_bytes: HashMap<u32, usize>,
    /// The configuration this run was started with
    pub args: EngineConfig,
    /// Whether the run ended via interrupt rather than exhausting `iterations`
    pub interrupted: bool,
    /// The kernel error that triggered the interrupt path, if any
    pub error: Option<String>,
    /// Number of timesteps on which modules were actually fed/read
    /// (`environment_rate` gating; spec.md §8 invariant 7)
    pub environment_calls: u64,
    /// Each module's declared `expected_iterations`, in registration order
    pub module_expected_iterations: Vec<u64>,
}

/// Owner of the pipeline's three hand-off locks (spec.md §5)
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Owner {
    Network,
    Environment,
}

/// A strict hand-off lock between the network and environment halves of
/// the pipeline, modeled the same way as [`crate::device::Event`]: a
/// `parking_lot` mutex guarding the current owner, with a condvar waking
/// waiters on every transfer.
struct Handoff {
    owner: Mutex<Owner>,
    cv: Condvar,
}

impl Handoff {
    fn new(initial: Owner) -> Self {
        Self {
            owner: Mutex::new(initial),
            cv: Condvar::new(),
        }
    }

    /// Block until `self` is owned by `who`
    fn acquire(&self, who: Owner) {
        let mut guard = self.owner.lock();
        while *guard != who {
            self.cv.wait(&mut guard);
        }
    }

    /// Hand ownership to `who`, waking anyone blocked in `acquire`
    fn release_to(&self, who: Owner) {
        let mut guard = self.owner.lock();
        *guard = who;
        self.cv.notify_all();
    }
}

/// Composes the built [`Network`], its [`State`], one [`Cluster`] per
/// [`shnn_core::Structure`], the environment-facing [`Buffer`], and the
/// registered [`Module`]s into a single runnable simulation (spec.md §4.9)
pub struct Engine {
    network: Network,
    registry: ModelRegistry,
    resource: ResourceManager,
    state: State,
    clusters: Vec<Cluster>,
    buffer: Mutex<Buffer>,
    modules: Vec<Box<dyn Module>>,
    config: EngineConfig,
    barrier: Box<dyn Barrier>,
}

impl Engine {
    /// Build an engine, following spec.md §4.9's six build steps:
    /// (1) resolve active devices, (2) allocate `State`, (3) instantiate
    /// modules and reject coactive input conflicts, (4) build the `Buffer`,
    /// (5) build `Cluster`s, (6) initialize the worker pool and per-device
    /// RNG (the latter happens as part of `ResourceManager::new`, which
    /// this build performs up front since `State::build` also needs an RNG).
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        network: Network,
        registry: ModelRegistry,
        modules: Vec<Box<dyn Module>>,
        weight_inits: HashMap<ConnectionId, WeightInit>,
        cluster_kinds: HashMap<StructureId, ClusterKind>,
        config: EngineConfig,
        seed: u64,
    ) -> Result<Self> {
        // Step 1: resolve active devices. An empty `devices` list means
        // every device the ResourceManager discovers (host-only, absent an
        // accelerator backend); an explicit list selects accelerator
        // indices, validated against what actually got built.
        let accelerator_count = config.devices.iter().copied().max().map(|m| m + 1).unwrap_or(0);
        let resource = ResourceManager::new(accelerator_count, config.worker_threads, seed)?;
        let active_devices: Vec<DeviceId> = if config.devices.is_empty() {
            resource.devices().to_vec()
        } else {
            config
                .devices
                .iter()
                .map(|&index| {
                    let id = DeviceId::accelerator(index);
                    resource.stream(id)?;
                    Ok(id)
                })
                .collect::<Result<Vec<_>>>()?
        };

        // Step 2: allocate State on those devices.
        let mut build_rng = StdRng::seed_from_u64(seed);
        let state = State::build(&network, &active_devices, &registry, &weight_inits, &mut build_rng)?;

        // Step 3: reject simultaneously-active input modules on one layer.
        {
            let refs: Vec<&dyn Module> = modules.iter().map(|m| m.as_ref()).collect();
            for i in 0..refs.len() {
                for j in (i + 1)..refs.len() {
                    for layer in network.layers() {
                        let a_in = refs[i].get_io_type(layer.id()).contains(IoType::INPUT);
                        let b_in = refs[j].get_io_type(layer.id()).contains(IoType::INPUT);
                        if a_in && b_in && refs[i].is_coactive(refs[j]) {
                            return Err(RuntimeError::CoactiveInputConflict {
                                layer_id: layer.id().raw(),
                            });
                        }
                    }
                }
            }
        }

        // Step 4: build the Buffer from the network's declared io types.
        let input_layers: Vec<LayerId> = network
            .layers()
            .iter()
            .filter(|l| l.io_type().contains(IoType::INPUT) || l.io_type().contains(IoType::EXPECTED))
            .map(|l| l.id())
            .collect();
        let output_layers: Vec<LayerId> = network
            .layers()
            .iter()
            .filter(|l| l.io_type().contains(IoType::OUTPUT))
            .map(|l| l.id())
            .collect();
        let buffer = Buffer::new(&input_layers, &output_layers, |layer| {
            network.layer(layer).size() as usize
        });

        // Step 5: build one Cluster per Structure. Cross-structure
        // dependencies and inter-device transfer dedup fall out of
        // ClusterNode::build looking at each layer's actual input
        // connections regardless of which Structure its source lives in
        // (spec.md §4.8), so no separate wiring pass is needed here.
        let mut clusters = Vec::with_capacity(network.structures().len());
        for structure in network.structures() {
            let kind = cluster_kinds
                .get(&structure.id())
                .copied()
                .unwrap_or(ClusterKind::Parallel);
            clusters.push(Cluster::build(&network, structure.id(), kind)?);
        }

        Ok(Self {
            network,
            registry,
            resource,
            state,
            clusters,
            buffer: Mutex::new(buffer),
            modules,
            config,
            barrier: Box::new(NoopBarrier),
        })
    }

    /// Replace the process-synchronization [`Barrier`] (default
    /// [`NoopBarrier`]) with one that coordinates multiple MPI ranks.
    pub fn with_barrier(mut self, barrier: Box<dyn Barrier>) -> Self {
        self.barrier = barrier;
        self
    }

    /// Signal an interrupt; polled at the end of each iteration by the
    /// network half (spec.md §6). Double-signalling is a no-op.
    pub fn interrupt(&self) {
        self.resource.runtime().signal_interrupt();
    }

    /// A cheap, `Send + Sync` handle that can signal an interrupt from a
    /// thread other than the one blocked inside [`Engine::run`], since `run`
    /// takes `&mut self` for its duration (spec.md §6).
    pub fn interrupt_handle(&self) -> std::sync::Arc<crate::resource::Runtime> {
        self.resource.runtime_handle()
    }

    /// Run until `iterations` timesteps have elapsed or the run is
    /// interrupted. Exactly one Engine may run at a time (spec.md §4.9).
    pub fn run(&mut self) -> Result<Report> {
        self.resource.runtime().try_start_engine()?;
        let report = self.run_inner();
        self.resource.runtime().finish_engine();
        report
    }

    fn run_inner(&mut self) -> Result<Report> {
        let expected = self
            .modules
            .iter()
            .map(|m| m.expected_iterations())
            .max()
            .unwrap_or(0);
        let iterations = self.config.iterations.max(expected);
        if iterations == 0 {
            log::warn!(
                "iterations unspecified and no module declared an expected iteration count; running until interrupted"
            );
        }

        self.resource.runtime().clear_interrupt();
        self.barrier.barrier();
        let start = Instant::now();

        let (ran, interrupted, error, environment_calls) = if self.config.multithreaded {
            self.run_pipelined(iterations)
        } else {
            self.run_sequential(iterations)
        };

        // spec.md §5 cancellation path and §8 Scenario 5: whether the run
        // exhausted `iterations` or was interrupted, every device has
        // finished (host streams execute synchronously; the worker pool has
        // no outstanding work once `run_sequential`/`run_pipelined` return)
        // before the closing barrier call.
        self.barrier.barrier();

        let total = start.elapsed().as_secs_f64();
        let achieved = if total > 0.0 { ran as f64 / total } else { 0.0 };

        Ok(Report {
            total_wall_seconds: total,
            refresh_rate_achieved: achieved,
            iterations: ran,
            peak_memory_bytes: self
                .resource
                .devices()
                .iter()
                .map(|d| (d.0, self.resource.peak_bytes(*d)))
                .collect(),
            args: self.config.clone(),
            interrupted,
            error,
            environment_calls,
            module_expected_iterations: self.modules.iter().map(|m| m.expected_iterations()).collect(),
        })
    }

    /// Single-thread mode: one thread performs the environment half then
    /// the network half of each timestep in sequence (spec.md §5).
    fn run_sequential(&mut self, iterations: u64) -> (u64, bool, Option<String>, u64) {
        let refresh_period = refresh_period(self.config.refresh_rate);
        let mut exec_rng = StdRng::seed_from_u64(0xE7);
        let mut i = 0u64;
        let mut environment_calls = 0u64;
        let mut interrupted = false;
        let mut error = None;

        loop {
            if iterations != 0 && i >= iterations {
                break;
            }
            if self.resource.runtime().interrupt_signaled() {
                interrupted = true;
                break;
            }
            let iter_start = Instant::now();
            let do_environment = !self.config.suppress_output && i % self.config.environment_rate as u64 == 0;

            if do_environment {
                let mut buf = self.buffer.lock();
                for module in self.modules.iter_mut() {
                    module.feed_input(&mut buf);
                }
            }

            if let Err(e) = run_compute_phases(
                &self.network,
                &mut self.state,
                &self.clusters,
                &self.registry,
                self.resource.worker_pool(),
                &mut exec_rng,
                self.config.learning_flag,
                &self.buffer,
            ) {
                error = Some(e.to_string());
                interrupted = true;
                self.resource.runtime().signal_interrupt();
                break;
            }

            if do_environment {
                let buf = self.buffer.lock();
                for module in self.modules.iter_mut() {
                    module.report_output(&buf);
                }
                drop(buf);
                for module in self.modules.iter_mut() {
                    module.cycle();
                }
                environment_calls += 1;
            }

            i += 1;
            sleep_out_remainder(iter_start, refresh_period);
        }

        (i, interrupted, error, environment_calls)
    }

    /// Two-thread pipeline mode: an environment thread and the calling
    /// (network) thread hand off `sensory`/`motor`/`term` in strict
    /// alternation (spec.md §5). The activation phase (which includes
    /// `InputTransfer`) is treated as the "feed in new input" step guarded
    /// by `sensory`; `StateUpdate`/`SynapseUpdate` run outside any lock;
    /// `OutputTransfer` is guarded by `motor`.
    fn run_pipelined(&mut self, iterations: u64) -> (u64, bool, Option<String>, u64) {
        let sensory = Handoff::new(Owner::Environment);
        let motor = Handoff::new(Owner::Environment);
        let term = Handoff::new(Owner::Environment);
        // "on construction, the environment owns both sensory_lock and
        // motor_lock; it releases sensory_lock to the network immediately"
        sensory.release_to(Owner::Network);

        let env_rate = self.config.environment_rate as u64;
        let suppress_output = self.config.suppress_output;
        let learning_enabled = self.config.learning_flag;
        let refresh_period = refresh_period(self.config.refresh_rate);
        let resource = &self.resource;
        let buffer = &self.buffer;
        let mut modules = std::mem::take(&mut self.modules);

        let network = &self.network;
        let state = &mut self.state;
        let clusters = &self.clusters;
        let registry = &self.registry;
        let mut exec_rng = StdRng::seed_from_u64(0xE7);

        let mut net_i = 0u64;
        let mut interrupted = false;
        let mut error: Option<String> = None;
        let mut environment_calls = 0u64;

        std::thread::scope(|scope| {
            let env_handle = scope.spawn(|| {
                let mut env_i = 0u64;
                let mut calls = 0u64;
                loop {
                    if iterations != 0 && env_i >= iterations {
                        break;
                    }
                    if resource.runtime().interrupt_signaled() {
                        break;
                    }

                    sensory.acquire(Owner::Environment);
                    if !suppress_output && env_i % env_rate == 0 {
                        let mut buf = buffer.lock();
                        for m in modules.iter_mut() {
                            m.feed_input(&mut buf);
                        }
                    }
                    sensory.release_to(Owner::Network);

                    motor.acquire(Owner::Environment);
                    if !suppress_output && env_i % env_rate == 0 {
                        let buf = buffer.lock();
                        for m in modules.iter_mut() {
                            m.report_output(&buf);
                        }
                        drop(buf);
                        for m in modules.iter_mut() {
                            m.cycle();
                        }
                        calls += 1;
                    }
                    motor.release_to(Owner::Network);

                    env_i += 1;
                }
                term.release_to(Owner::Network);
                calls
            });

            loop {
                if iterations != 0 && net_i >= iterations {
                    break;
                }
                if resource.runtime().interrupt_signaled() {
                    interrupted = true;
                    break;
                }
                let iter_start = Instant::now();

                sensory.acquire(Owner::Network);
                let activation_result = run_activation_and_feedforward(
                    network,
                    state,
                    clusters,
                    registry,
                    resource.worker_pool(),
                    &mut exec_rng,
                    learning_enabled,
                    buffer,
                );
                sensory.release_to(Owner::Environment);

                if let Err(e) = activation_result {
                    error = Some(e.to_string());
                    interrupted = true;
                    resource.runtime().signal_interrupt();
                    break;
                }

                if let Err(e) = run_state_and_weight_phases(
                    network,
                    state,
                    clusters,
                    registry,
                    resource.worker_pool(),
                    &mut exec_rng,
                    learning_enabled,
                ) {
                    error = Some(e.to_string());
                    interrupted = true;
                    resource.runtime().signal_interrupt();
                    break;
                }

                motor.acquire(Owner::Network);
                let output_result = run_output_phase(
                    network,
                    state,
                    clusters,
                    registry,
                    resource.worker_pool(),
                    &mut exec_rng,
                    buffer,
                );
                motor.release_to(Owner::Environment);

                if let Err(e) = output_result {
                    error = Some(e.to_string());
                    interrupted = true;
                    resource.runtime().signal_interrupt();
                    break;
                }

                net_i += 1;
                sleep_out_remainder(iter_start, refresh_period);
            }

            // A third lock ensures the network thread does not finalize
            // its report until the environment thread has terminated
            // (spec.md §5).
            term.acquire(Owner::Network);
            environment_calls = env_handle.join().unwrap_or(0);
        });

        self.modules = modules;
        (net_i, interrupted, error, environment_calls)
    }
}

fn refresh_period(refresh_rate: f64) -> Option<Duration> {
    if refresh_rate > 0.0 {
        Some(Duration::from_secs_f64(1.0 / refresh_rate))
    } else {
        None
    }
}

fn sleep_out_remainder(iter_start: Instant, period: Option<Duration>) {
    if let Some(period) = period {
        let elapsed = iter_start.elapsed();
        if elapsed < period {
            std::thread::sleep(period - elapsed);
        }
    }
}

/// Runs every non-feedforward cluster's activation phase, then every
/// feedforward cluster's whole per-node pipeline (spec.md §4.8); this is
/// the network half's "feed in new input" + immediate dendritic fold,
/// bundled together since `ClusterNode::run_activation` already folds
/// `InputTransfer`/`ExpectedTransfer` with the tree aggregation it gates.
#[allow(clippy::too_many_arguments)]
fn run_activation_and_feedforward(
    network: &Network,
    state: &mut State,
    clusters: &[Cluster],
    registry: &ModelRegistry,
    pool: &WorkerPool,
    rng: &mut StdRng,
    learning_enabled: bool,
    buffer: &Mutex<Buffer>,
) -> Result<()> {
    {
        let mut buf = buffer.lock();
        let mut ctx = ExecContext {
            network,
            state,
            buffer: &mut buf,
            registry,
            pool,
            rng,
            learning_enabled,
        };
        crate::cluster::run_inter_device_transfers(&mut ctx)?;
        for cluster in clusters {
            if cluster.kind() != ClusterKind::Feedforward {
                cluster.run_activation_phase(&mut ctx)?;
            }
        }
    }
    {
        let mut buf = buffer.lock();
        let mut ctx = ExecContext {
            network,
            state,
            buffer: &mut buf,
            registry,
            pool,
            rng,
            learning_enabled,
        };
        for cluster in clusters {
            if cluster.kind() == ClusterKind::Feedforward {
                cluster.run_feedforward_timestep(&mut ctx)?;
            }
        }
    }
    Ok(())
}

/// Runs every non-feedforward cluster's state update, then (if learning is
/// enabled) its plastic weight updates. Feedforward clusters already ran
/// both as part of `run_activation_and_feedforward`.
fn run_state_and_weight_phases(
    network: &Network,
    state: &mut State,
    clusters: &[Cluster],
    registry: &ModelRegistry,
    pool: &WorkerPool,
    rng: &mut StdRng,
    learning_enabled: bool,
) -> Result<()> {
    let mut scratch = Buffer::new(&[], &[], |_| 0);
    let mut ctx = ExecContext {
        network,
        state,
        buffer: &mut scratch,
        registry,
        pool,
        rng,
        learning_enabled,
    };
    for cluster in clusters {
        if cluster.kind() != ClusterKind::Feedforward {
            cluster.run_state_phase(&mut ctx)?;
        }
    }
    if learning_enabled {
        for cluster in clusters {
            if cluster.kind() != ClusterKind::Feedforward {
                cluster.run_weight_update_phase(&mut ctx)?;
            }
        }
    }
    Ok(())
}

/// Runs every non-feedforward cluster's output transfer, writing each
/// `OUTPUT`-typed layer's newest value into the environment-facing buffer.
fn run_output_phase(
    network: &Network,
    state: &mut State,
    clusters: &[Cluster],
    registry: &ModelRegistry,
    pool: &WorkerPool,
    rng: &mut StdRng,
    buffer: &Mutex<Buffer>,
) -> Result<()> {
    let mut buf = buffer.lock();
    let mut ctx = ExecContext {
        network,
        state,
        buffer: &mut buf,
        registry,
        pool,
        rng,
        learning_enabled: false,
    };
    for cluster in clusters {
        if cluster.kind() != ClusterKind::Feedforward {
            cluster.run_output_phase(&mut ctx)?;
        }
    }
    Ok(())
}

/// Runs the whole single-thread timestep: activation (incl. feedforward),
/// state, weight, output, in that order.
#[allow(clippy::too_many_arguments)]
fn run_compute_phases(
    network: &Network,
    state: &mut State,
    clusters: &[Cluster],
    registry: &ModelRegistry,
    pool: &WorkerPool,
    rng: &mut StdRng,
    learning_enabled: bool,
    buffer: &Mutex<Buffer>,
) -> Result<()> {
    run_activation_and_feedforward(network, state, clusters, registry, pool, rng, learning_enabled, buffer)?;
    run_state_and_weight_phases(network, state, clusters, registry, pool, rng, learning_enabled)?;
    run_output_phase(network, state, clusters, registry, pool, rng, buffer)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelRegistry;
    use shnn_core::{ConnectionConfig, LayerConfig, NetworkBuilder, Opcode};
    use std::sync::{Arc, Mutex as StdMutex};

    struct ConstantInputModule {
        input_layer: LayerId,
        output_layer: LayerId,
        value: f32,
        reports: Arc<StdMutex<Vec<f32>>>,
    }

    impl Module for ConstantInputModule {
        fn feed_input(&mut self, buffer: &mut Buffer) {
            buffer.write_input(self.input_layer, &[self.value]);
        }
        fn report_output(&mut self, buffer: &Buffer) {
            self.reports
                .lock()
                .unwrap()
                .push(buffer.read_output(self.output_layer)[0]);
        }
        fn cycle(&mut self) {}
        fn get_io_type(&self, layer: LayerId) -> IoType {
            if layer == self.input_layer {
                IoType::INPUT
            } else if layer == self.output_layer {
                IoType::OUTPUT
            } else {
                IoType::NONE
            }
        }
        fn is_coactive(&self, _other: &dyn Module) -> bool {
            false
        }
    }

    fn build_chain_network() -> (Network, LayerId, LayerId) {
        let mut b = NetworkBuilder::new();
        let s = b.add_structure("s");
        let a = b
            .add_layer(s, LayerConfig::new("float-rate", 1, 1).with_io_type(IoType::INPUT))
            .unwrap();
        let c = b
            .add_layer(s, LayerConfig::new("float-rate", 1, 1).with_io_type(IoType::OUTPUT))
            .unwrap();
        b.connect(ConnectionConfig::one_to_one(a, c, Opcode::Add)).unwrap();
        (b.build(), a, c)
    }

    #[test]
    fn sequential_run_advances_and_reports_output() {
        let (net, a, c) = build_chain_network();
        let reports = Arc::new(StdMutex::new(Vec::new()));
        let module = Box::new(ConstantInputModule {
            input_layer: a,
            output_layer: c,
            value: 1.0,
            reports: reports.clone(),
        });

        let mut cluster_kinds = HashMap::new();
        cluster_kinds.insert(net.structures()[0].id(), ClusterKind::Feedforward);

        let mut config = EngineConfig::default();
        config.iterations = 5;

        let mut engine = Engine::build(
            net,
            ModelRegistry::with_reference_models(),
            vec![module],
            HashMap::new(),
            cluster_kinds,
            config,
            1,
        )
        .unwrap();

        let report = engine.run().unwrap();
        assert_eq!(report.iterations, 5);
        assert!(!report.interrupted);
        assert_eq!(reports.lock().unwrap().len(), 5);
    }

    #[test]
    fn environment_rate_gates_module_calls() {
        let (net, a, c) = build_chain_network();
        let reports = Arc::new(StdMutex::new(Vec::new()));
        let module = Box::new(ConstantInputModule {
            input_layer: a,
            output_layer: c,
            value: 1.0,
            reports: reports.clone(),
        });

        let mut cluster_kinds = HashMap::new();
        cluster_kinds.insert(net.structures()[0].id(), ClusterKind::Feedforward);

        let mut config = EngineConfig::default();
        config.iterations = 10;
        config.environment_rate = 2;

        let mut engine = Engine::build(
            net,
            ModelRegistry::with_reference_models(),
            vec![module],
            HashMap::new(),
            cluster_kinds,
            config,
            1,
        )
        .unwrap();

        let report = engine.run().unwrap();
        assert_eq!(report.iterations, 10);
        assert_eq!(report.environment_calls, 5);
        assert_eq!(reports.lock().unwrap().len(), 5);
    }

    struct CountingBarrier(Arc<std::sync::atomic::AtomicU32>);

    impl Barrier for CountingBarrier {
        fn barrier(&self) {
            self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }
    }

    #[test]
    fn run_calls_the_process_barrier_once_at_start_and_once_at_end() {
        let (net, a, c) = build_chain_network();
        let module = Box::new(ConstantInputModule {
            input_layer: a,
            output_layer: c,
            value: 1.0,
            reports: Arc::new(StdMutex::new(Vec::new())),
        });

        let mut cluster_kinds = HashMap::new();
        cluster_kinds.insert(net.structures()[0].id(), ClusterKind::Feedforward);

        let mut config = EngineConfig::default();
        config.iterations = 3;

        let calls = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let mut engine = Engine::build(
            net,
            ModelRegistry::with_reference_models(),
            vec![module],
            HashMap::new(),
            cluster_kinds,
            config,
            1,
        )
        .unwrap()
        .with_barrier(Box::new(CountingBarrier(calls.clone())));

        engine.run().unwrap();
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[test]
    fn duplicate_engine_is_rejected_while_first_is_running() {
        // A build-then-drop engine releases the lock; this test only
        // exercises that `try_start_engine`/`finish_engine` are wired
        // through `run`, not true concurrent overlap.
        let (net, a, c) = build_chain_network();
        let module = Box::new(ConstantInputModule {
            input_layer: a,
            output_layer: c,
            value: 0.0,
            reports: Arc::new(StdMutex::new(Vec::new())),
        });
        let mut cluster_kinds = HashMap::new();
        cluster_kinds.insert(net.structures()[0].id(), ClusterKind::Feedforward);
        let mut config = EngineConfig::default();
        config.iterations = 1;
        let mut engine = Engine::build(
            net,
            ModelRegistry::with_reference_models(),
            vec![module],
            HashMap::new(),
            cluster_kinds,
            config,
            1,
        )
        .unwrap();
        engine.run().unwrap();
        // Running again after the first finished must succeed (lock released).
        assert!(engine.run().is_ok());
    }
}
