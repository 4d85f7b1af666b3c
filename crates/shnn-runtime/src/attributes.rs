//! Attributes: per-neural-model state storage for one layer, shared by
//! every layer of that model assigned to one device (spec.md §4.5)

use crate::kernel::Kernel;

/// The three output-ring encodings spec.md §4.5/§6 requires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    /// One float per neuron per word
    Float,
    /// One int32 per neuron per word
    Int,
    /// 32 packed spike bits per word
    Bit,
}

/// Per-layer geometry inside an [`Attributes`] instance's shared arrays:
/// where this layer's registers/words start, and how many it owns.
#[derive(Debug, Clone, Copy)]
pub struct LayerSlot {
    /// Layer size (`rows * columns`)
    pub size: u32,
    /// Start offset, in registers, into the input register bank
    pub input_start: u32,
    /// Register count for this layer (`R_L`, one more than the deepest
    /// dendritic-tree register index)
    pub register_count: u32,
    /// Start offset, in words, into the output ring
    pub output_start: u32,
    /// Output history depth in words (`W_L`)
    pub history_words: u32,
    /// Timesteps represented by one output word (32 for BIT, 1 otherwise)
    pub timesteps_per_word: u32,
}

impl LayerSlot {
    /// Total input registers this layer owns (`R_L * size`)
    pub fn input_len(&self) -> usize {
        (self.register_count * self.size) as usize
    }

    /// Total output words this layer owns (`W_L * size`)
    pub fn output_len(&self) -> usize {
        (self.history_words * self.size) as usize
    }

    /// Word index holding the value at `delay` timesteps in the past, per
    /// spec.md §4.5's extraction rule: `W_L - 1 - floor(delay / tpw)`
    pub fn word_for_delay(&self, delay: u32) -> u32 {
        let back = delay / self.timesteps_per_word;
        self.history_words - 1 - back.min(self.history_words - 1)
    }
}

/// One (device, neural-model) partition's state: the input register bank,
/// output ring, expected-output buffer, and per-neuron variable arrays for
/// every layer of that model on that device (spec.md §4.5)
pub struct Attributes {
    kind: ModelKind,
    slots: Vec<LayerSlot>,
    /// Concatenated input registers for every layer in this partition
    pub input_registers: Vec<f32>,
    /// Concatenated output ring words; encoding depends on `kind`
    pub output_ring: Vec<u32>,
    /// Concatenated single-word expected-output buffer (same per-layer
    /// length as one ring word), only populated for layers with the
    /// `EXPECTED` io type
    pub expected: Vec<f32>,
    /// Second-order gate buffer, sized by the sum of second-order
    /// dendritic nodes across this partition's layers
    pub second_order: Vec<f32>,
    /// Per-neuron variable arrays registered by the concrete model
    /// (voltage, recovery, trace, time-since-spike, ...), keyed by name
    pub variables: std::collections::HashMap<&'static str, Vec<f32>>,
}

impl Attributes {
    /// Build an empty partition for `kind`, over the given per-layer slots
    /// (already laid out by [`crate::state::State`])
    pub fn new(kind: ModelKind, slots: Vec<LayerSlot>) -> Self {
        let input_len: usize = slots.iter().map(LayerSlot::input_len).sum();
        let output_len: usize = slots.iter().map(LayerSlot::output_len).sum();
        let expected_len: usize = slots.iter().map(|s| s.size as usize).sum();
        let second_order_len = 0; // populated by register_second_order
        Self {
            kind,
            slots,
            input_registers: vec![0.0; input_len],
            output_ring: vec![0; output_len],
            expected: vec![0.0; expected_len],
            second_order: vec![0.0; second_order_len],
            variables: std::collections::HashMap::new(),
        }
    }

    /// This partition's model encoding
    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    /// The slot for layer at index `layer_index` within this partition
    /// (index into `slots`, assigned by `State`, not the global `LayerId`)
    pub fn slot(&self, layer_index: usize) -> LayerSlot {
        self.slots[layer_index]
    }

    /// Register a zeroed per-neuron variable array sized to this whole
    /// partition (one slot per neuron across every layer in the partition)
    pub fn register_variable(&mut self, name: &'static str) {
        let total: u32 = self.slots.iter().map(|s| s.size).sum();
        self.variables
            .entry(name)
            .or_insert_with(|| vec![0.0; total as usize]);
    }

    /// Reserve `count` additional second-order gate slots, returning the
    /// start offset assigned to the caller
    pub fn reserve_second_order(&mut self, count: u32) -> u32 {
        let start = self.second_order.len() as u32;
        self.second_order.resize(self.second_order.len() + count as usize, 0.0);
        start
    }

    /// Zero every input register this partition owns (the "clear" phase)
    pub fn clear_inputs(&mut self) {
        self.input_registers.fill(0.0);
    }

    /// Shift every layer's output ring forward by one timestep and write
    /// `new_value` for layer `layer_index`'s newest word.
    ///
    /// This is the output-shift contract (spec.md §4.5, critical): after
    /// the shift, word 0 holds the oldest value and word `W_L - 1` the
    /// newest, for FLOAT/INT. For BIT, each word is shifted left by one
    /// bit and the carry from the next (more recent) word is placed into
    /// the bit vacated at the old word's top; the new spike bit goes into
    /// the LSB of the newest word.
    pub fn shift_output(&mut self, layer_index: usize, new_spikes_or_value: u32) {
        let slot = self.slots[layer_index];
        let base = slot.output_start as usize;
        let words = slot.history_words as usize;
        let size = slot.size as usize;

        match self.kind {
            ModelKind::Float | ModelKind::Int => {
                // Shift every neuron's word history left (toward index 0
                // drops the oldest value) and place the new value at
                // index `words - 1`.
                for n in 0..size {
                    for w in 0..words.saturating_sub(1) {
                        let next = self.output_ring[base + (w + 1) * size + n];
                        self.output_ring[base + w * size + n] = next;
                    }
                    if words > 0 {
                        // Only neuron 0's value is meaningful for a scalar
                        // `new_spikes_or_value`; per-neuron callers use
                        // `shift_output_per_neuron` instead.
                        self.output_ring[base + (words - 1) * size + n] = new_spikes_or_value;
                    }
                }
            }
            ModelKind::Bit => {
                for n in 0..size {
                    let mut carry = (new_spikes_or_value >> n) & 1;
                    for w in (0..words).rev() {
                        let word = self.output_ring[base + w * size + n];
                        let new_carry = (word >> 31) & 1;
                        self.output_ring[base + w * size + n] = (word << 1) | carry;
                        carry = new_carry;
                    }
                }
            }
        }
    }

    /// Per-neuron variant of [`Self::shift_output`]: `new_values` has one
    /// entry per neuron in the layer (the bit for BIT models, the raw
    /// float/int bits otherwise).
    pub fn shift_output_per_neuron(&mut self, layer_index: usize, new_values: &[u32]) {
        let slot = self.slots[layer_index];
        let base = slot.output_start as usize;
        let words = slot.history_words as usize;
        let size = slot.size as usize;
        debug_assert_eq!(new_values.len(), size);

        match self.kind {
            ModelKind::Float | ModelKind::Int => {
                for n in 0..size {
                    for w in 0..words.saturating_sub(1) {
                        let next = self.output_ring[base + (w + 1) * size + n];
                        self.output_ring[base + w * size + n] = next;
                    }
                    if words > 0 {
                        self.output_ring[base + (words - 1) * size + n] = new_values[n];
                    }
                }
            }
            ModelKind::Bit => {
                for n in 0..size {
                    let mut carry = new_values[n] & 1;
                    for w in (0..words).rev() {
                        let word = self.output_ring[base + w * size + n];
                        let new_carry = (word >> 31) & 1;
                        self.output_ring[base + w * size + n] = (word << 1) | carry;
                        carry = new_carry;
                    }
                }
            }
        }
    }

    /// Read neuron `n` of layer `layer_index`'s output at `delay`
    /// timesteps in the past, as a float (the "extractor" of spec.md §4.5)
    pub fn extract(&self, layer_index: usize, neuron: u32, delay: u32) -> f32 {
        let slot = self.slots[layer_index];
        let word_idx = slot.word_for_delay(delay);
        let base = slot.output_start as usize;
        let raw = self.output_ring[base + (word_idx * slot.size + neuron) as usize];
        match self.kind {
            ModelKind::Float => f32::from_bits(raw),
            ModelKind::Int => raw as i32 as f32,
            ModelKind::Bit => {
                let bit = delay % slot.timesteps_per_word;
                ((raw >> bit) & 1) as f32
            }
        }
    }

    /// Read every neuron of layer `layer_index`'s newest output word, as
    /// floats (used by `OutputTransfer`)
    pub fn extract_latest(&self, layer_index: usize) -> Vec<f32> {
        let slot = self.slots[layer_index];
        (0..slot.size).map(|n| self.extract(layer_index, n, 0)).collect()
    }

    /// Immutable per-neuron view of one dendritic register (one input-bank
    /// row for layer `layer_index`, spec.md §4.5 register layout)
    pub fn register(&self, layer_index: usize, register: u32) -> &[f32] {
        let slot = self.slots[layer_index];
        let base = slot.input_start as usize + register as usize * slot.size as usize;
        &self.input_registers[base..base + slot.size as usize]
    }

    /// Mutable per-neuron view of one dendritic register, for
    /// `SynapseActivate`/`DendriticInternal`/`Set`/noise instructions to
    /// accumulate into
    pub fn register_mut(&mut self, layer_index: usize, register: u32) -> &mut [f32] {
        let slot = self.slots[layer_index];
        let base = slot.input_start as usize + register as usize * slot.size as usize;
        &mut self.input_registers[base..base + slot.size as usize]
    }
}

/// The pair of kernels a neural model exposes for its attribute update:
/// state update proper, and (optionally) a distinct learning kernel run
/// only when global learning is enabled (spec.md §4.5)
pub struct AttributeKernels {
    /// Runs every timestep: consumes aggregated input, updates per-neuron
    /// state, writes the new output, zeroes the registers it consumed
    pub state_update: Kernel<AttributeKernelArgs>,
    /// Runs only when plasticity embedded in the attribute update is
    /// active (distinct from a per-connection [`crate::instruction`]
    /// `SynapseUpdate`, which most models use instead)
    pub learning: Option<Kernel<AttributeKernelArgs>>,
}

/// Argument tuple passed to a model's attribute kernel (spec.md §4.5
/// "Neuron-model kernel contract")
pub struct AttributeKernelArgs<'a> {
    /// This layer's input registers (one `R_L`-register block)
    pub inputs: &'a [f32],
    /// This layer's per-neuron variable arrays, sliced to this layer
    pub variables: &'a mut [f32],
    /// Layer size
    pub size: u32,
    /// History depth in words
    pub history_words: u32,
    /// Whether plasticity is globally enabled this run
    pub plasticity_enabled: bool,
    /// Output values this invocation computes, one per neuron (bit for
    /// BIT models, raw float/int bits otherwise); the caller shifts them
    /// into the ring via [`Attributes::shift_output_per_neuron`]
    pub new_outputs: &'a mut [u32],
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(size: u32, words: u32, tpw: u32) -> LayerSlot {
        LayerSlot {
            size,
            input_start: 0,
            register_count: 1,
            output_start: 0,
            history_words: words,
            timesteps_per_word: tpw,
        }
    }

    #[test]
    fn float_shift_keeps_oldest_at_zero_newest_at_last() {
        let mut attrs = Attributes::new(ModelKind::Float, vec![slot(1, 3, 1)]);
        attrs.shift_output_per_neuron(0, &[1f32.to_bits()]);
        attrs.shift_output_per_neuron(0, &[2f32.to_bits()]);
        attrs.shift_output_per_neuron(0, &[3f32.to_bits()]);
        assert_eq!(attrs.extract(0, 0, 2), 1.0); // oldest, word 0
        assert_eq!(attrs.extract(0, 0, 0), 3.0); // newest, word W_L-1
    }

    #[test]
    fn bit_shift_places_new_spike_in_lsb_of_newest_word() {
        let mut attrs = Attributes::new(ModelKind::Bit, vec![slot(1, 1, 32)]);
        attrs.shift_output_per_neuron(0, &[1]);
        assert_eq!(attrs.extract(0, 0, 0), 1.0);
        attrs.shift_output_per_neuron(0, &[0]);
        // the spike from t=0 is now one bit older (delay=1), still readable
        assert_eq!(attrs.extract(0, 0, 1), 1.0);
        assert_eq!(attrs.extract(0, 0, 0), 0.0);
    }

    #[test]
    fn scenario_1_delayed_self_connection_spike_visible_only_at_delay_5() {
        // one neuron, BIT model, spike at t=0, check visibility through t=10
        let mut attrs = Attributes::new(ModelKind::Bit, vec![slot(1, 1, 32)]);
        attrs.shift_output_per_neuron(0, &[1]); // t=0 spike
        for _t in 1..=10 {
            attrs.shift_output_per_neuron(0, &[0]);
        }
        // at t=10, the t=0 spike is 10 timesteps old -> delay 10 bit is 1
        assert_eq!(attrs.extract(0, 0, 10), 1.0);
        assert_eq!(attrs.extract(0, 0, 5), 0.0);
        assert_eq!(attrs.extract(0, 0, 11), 0.0);
    }
}
