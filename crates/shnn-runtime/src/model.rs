//! Neural model registry and the two reference models used to exercise
//! the attribute-kernel contract end to end (spec.md §4.5, §6, §9)
//!
//! Concrete neuron models (Izhikevich, Hodgkin-Huxley, rate-encoding, NVM)
//! are external collaborators per spec.md §1 — only their *contract* is in
//! scope. `FloatRateModel` and `BitSpikingModel` below are minimal,
//! framework-exercising stand-ins, not a learning-algorithm zoo entry
//! (spec.md Non-goals).
//!
//! The activator/updater split (spec.md §GLOSSARY) is resolved here in
//! favor of one framework-level generic activator (`crate::instruction`)
//! shared by every model: activation only needs a source output value
//! (already model-agnostic via [`crate::attributes::Attributes::extract`])
//! and the connection's opcode, neither of which varies per neuron model.
//! What *does* vary per model is the attribute/state-update kernel and,
//! for plastic connections, the updater — both are provided here.

use std::collections::HashMap;
use std::sync::Arc;

use crate::attributes::{AttributeKernelArgs, AttributeKernels, ModelKind};
use crate::kernel::Kernel;
use crate::weight_matrix::WeightMatrix;

/// Argument tuple for a connection's weight-update ("learning") kernel
pub struct UpdateArgs<'a> {
    /// Dense weights, row-major, `rows * cols`
    pub weights: &'a mut [f32],
    /// Destination-side rows
    pub rows: u32,
    /// Source-side columns
    pub cols: u32,
    /// Source layer's latest output per neuron (one entry per column)
    pub pre_outputs: &'a [f32],
    /// Destination layer's latest output per neuron (one entry per row)
    pub post_outputs: &'a [f32],
    /// Pre-synaptic eligibility trace, one entry per column
    pub pre_trace: &'a mut [f32],
    /// Post-synaptic eligibility trace, one entry per row
    pub post_trace: &'a mut [f32],
    /// Clamp floor
    pub min_weight: f32,
    /// Clamp ceiling
    pub max_weight: f32,
}

/// A neural model: a stable name, its output encoding, the per-neuron
/// variables it needs, its attribute/state-update kernel, and (for models
/// that support plasticity) its weight updater (spec.md §4.5, §6)
pub trait NeuronModel: Send + Sync {
    /// Stable name used as the registry key (spec.md §9)
    fn name(&self) -> &'static str;

    /// Output ring encoding this model uses
    fn kind(&self) -> ModelKind;

    /// Per-neuron variable arrays this model needs allocated
    fn variable_names(&self) -> &'static [&'static str];

    /// The state-update (and optional learning) kernel pair
    fn attribute_kernels(&self) -> AttributeKernels;

    /// Hook invoked once per connection whose destination uses this model,
    /// letting the model register auxiliary weight-matrix variables
    /// (traces, STP state) before the first timestep (spec.md §4.6)
    fn process_weight_matrix(&self, _matrix: &mut WeightMatrix) {}

    /// This model's updater kernel, if it supports plasticity. A plain
    /// function pointer rather than a [`Kernel`]: `UpdateArgs` borrows
    /// per-timestep state, and a fixed `Kernel<A>` cannot be generic over
    /// the borrow's lifetime the way an elided-lifetime fn pointer can.
    fn updater_kernel(&self) -> Option<fn(&mut UpdateArgs)> {
        None
    }
}

fn float_state_update(args: &mut AttributeKernelArgs) {
    for n in 0..args.size as usize {
        let aggregated = args.inputs[n];
        args.new_outputs[n] = aggregated.to_bits();
    }
}

fn float_state_update_parallel(args: &mut AttributeKernelArgs, pool: &crate::resource::WorkerPool) {
    pool.install(|| float_state_update(args));
}

/// A minimal rate-encoded model: output = this timestep's aggregated
/// input register, passed straight through (spec.md §1 treats the actual
/// rate-encoding math as an external collaborator; this is the framework
/// stand-in used by Scenario 2, §8).
pub struct FloatRateModel;

impl NeuronModel for FloatRateModel {
    fn name(&self) -> &'static str {
        "float-rate"
    }

    fn kind(&self) -> ModelKind {
        ModelKind::Float
    }

    fn variable_names(&self) -> &'static [&'static str] {
        &[]
    }

    fn attribute_kernels(&self) -> AttributeKernels {
        AttributeKernels {
            state_update: Kernel::new("float-rate-state", float_state_update, float_state_update_parallel),
            learning: None,
        }
    }
}

const SPIKE_THRESHOLD: f32 = 1.0;

fn bit_state_update(args: &mut AttributeKernelArgs) {
    for n in 0..args.size as usize {
        let voltage = &mut args.variables[n];
        *voltage += args.inputs[n];
        if *voltage >= SPIKE_THRESHOLD {
            args.new_outputs[n] = 1;
            *voltage = 0.0;
        } else {
            args.new_outputs[n] = 0;
        }
    }
}

fn bit_state_update_parallel(args: &mut AttributeKernelArgs, pool: &crate::resource::WorkerPool) {
    pool.install(|| bit_state_update(args));
}

fn bit_updater(args: &mut UpdateArgs) {
    const A_PLUS: f32 = 0.01;
    const A_MINUS: f32 = 0.012;
    const TRACE_DECAY: f32 = 0.9;

    for c in 0..args.cols as usize {
        args.pre_trace[c] *= TRACE_DECAY;
    }
    for r in 0..args.rows as usize {
        args.post_trace[r] *= TRACE_DECAY;
    }

    for r in 0..args.rows as usize {
        for c in 0..args.cols as usize {
            let idx = r * args.cols as usize + c;
            if args.pre_outputs[c] > 0.0 {
                args.weights[idx] += A_PLUS * args.post_trace[r];
            }
            if args.post_outputs[r] > 0.0 {
                args.weights[idx] -= A_MINUS * args.pre_trace[c];
            }
            args.weights[idx] = args.weights[idx].clamp(args.min_weight, args.max_weight);
        }
    }

    for c in 0..args.cols as usize {
        if args.pre_outputs[c] > 0.0 {
            args.pre_trace[c] += 1.0;
        }
    }
    for r in 0..args.rows as usize {
        if args.post_outputs[r] > 0.0 {
            args.post_trace[r] += 1.0;
        }
    }
}

/// A minimal integrate-and-fire spiking model paired with a trace-based
/// STDP updater, used to exercise the BIT output encoding and plastic
/// `SynapseUpdate` path (spec.md §8 invariant 4, Scenario 1).
pub struct BitSpikingModel;

impl NeuronModel for BitSpikingModel {
    fn name(&self) -> &'static str {
        "bit-spiking"
    }

    fn kind(&self) -> ModelKind {
        ModelKind::Bit
    }

    fn variable_names(&self) -> &'static [&'static str] {
        &["voltage"]
    }

    fn attribute_kernels(&self) -> AttributeKernels {
        AttributeKernels {
            state_update: Kernel::new("bit-spiking-state", bit_state_update, bit_state_update_parallel),
            learning: None,
        }
    }

    fn process_weight_matrix(&self, matrix: &mut WeightMatrix) {
        matrix.register_aux("pre_trace");
        matrix.register_aux("post_trace");
    }

    fn updater_kernel(&self) -> Option<fn(&mut UpdateArgs)> {
        Some(bit_updater)
    }
}

/// Registry of available models, keyed by the stable name used in
/// [`shnn_core::layer::LayerConfig`] (spec.md §9: "tagged-variant of
/// neural-model kind plus a registry keyed by a model-name string, looked
/// up at engine-build time")
#[derive(Clone)]
pub struct ModelRegistry {
    models: HashMap<String, Arc<dyn NeuronModel>>,
}

impl ModelRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self {
            models: HashMap::new(),
        }
    }

    /// A registry pre-populated with the two reference models
    pub fn with_reference_models() -> Self {
        let mut reg = Self::new();
        reg.register(Arc::new(FloatRateModel));
        reg.register(Arc::new(BitSpikingModel));
        reg
    }

    /// Register a model under its own name
    pub fn register(&mut self, model: Arc<dyn NeuronModel>) {
        self.models.insert(model.name().to_string(), model);
    }

    /// Look up a model by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn NeuronModel>> {
        self.models.get(name).cloned()
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::with_reference_models()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::WorkerPool;

    #[test]
    fn registry_resolves_reference_models_by_name() {
        let reg = ModelRegistry::with_reference_models();
        assert_eq!(reg.get("float-rate").unwrap().kind(), ModelKind::Float);
        assert_eq!(reg.get("bit-spiking").unwrap().kind(), ModelKind::Bit);
        assert!(reg.get("unknown-model").is_none());
    }

    #[test]
    fn float_state_update_passes_input_through() {
        let pool = WorkerPool::new(1).unwrap();
        let inputs = [2.5f32];
        let mut variables: Vec<f32> = vec![];
        let mut new_outputs = [0u32];
        let mut args = AttributeKernelArgs {
            inputs: &inputs,
            variables: &mut variables,
            size: 1,
            history_words: 1,
            plasticity_enabled: false,
            new_outputs: &mut new_outputs,
        };
        let kernels = FloatRateModel.attribute_kernels();
        kernels.state_update.run(&mut args, &pool);
        assert_eq!(f32::from_bits(new_outputs[0]), 2.5);
    }

    #[test]
    fn bit_state_update_spikes_once_threshold_crossed() {
        let pool = WorkerPool::new(1).unwrap();
        let inputs = [1.0f32];
        let mut variables = vec![0.0f32];
        let mut new_outputs = [0u32];
        let mut args = AttributeKernelArgs {
            inputs: &inputs,
            variables: &mut variables,
            size: 1,
            history_words: 1,
            plasticity_enabled: false,
            new_outputs: &mut new_outputs,
        };
        let kernels = BitSpikingModel.attribute_kernels();
        kernels.state_update.run(&mut args, &pool);
        assert_eq!(new_outputs[0], 1);
        assert_eq!(variables[0], 0.0); // reset after spike
    }

    #[test]
    fn stdp_updater_potentiates_on_pre_then_post() {
        let mut weights = [0.5f32];
        let mut pre_trace = [0.0f32];
        let mut post_trace = [0.0f32];
        let mut args = UpdateArgs {
            weights: &mut weights,
            rows: 1,
            cols: 1,
            pre_outputs: &[1.0],
            post_outputs: &[1.0],
            pre_trace: &mut pre_trace,
            post_trace: &mut post_trace,
            min_weight: 0.0,
            max_weight: 1.0,
        };
        bit_updater(&mut args);
        assert!(args.weights[0] >= 0.0 && args.weights[0] <= 1.0);
    }

    #[test]
    fn stdp_updater_never_leaves_clamp_bounds() {
        let mut weights = [0.99f32];
        let mut pre_trace = [5.0f32];
        let mut post_trace = [5.0f32];
        for _ in 0..1000 {
            let mut args = UpdateArgs {
                weights: &mut weights,
                rows: 1,
                cols: 1,
                pre_outputs: &[1.0],
                post_outputs: &[1.0],
                pre_trace: &mut pre_trace,
                post_trace: &mut post_trace,
                min_weight: 0.0,
                max_weight: 1.0,
            };
            bit_updater(&mut args);
            assert!(weights[0] >= 0.0 && weights[0] <= 1.0);
        }
    }
}
