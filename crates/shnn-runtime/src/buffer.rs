//! Buffer: the environment-facing I/O region (spec.md §3, §5)

use std::collections::HashMap;

use shnn_core::LayerId;

/// One layer's region inside a [`Buffer`]'s input or output slab
#[derive(Debug, Clone, Copy)]
pub struct BufferSlot {
    /// Start offset into the slab
    pub start: usize,
    /// Number of elements (the layer's size)
    pub len: usize,
}

/// The single-producer/single-consumer region environment modules write
/// input into and read output from, protected at the pipeline level by
/// the hand-off locks (spec.md §5), not by any lock inside `Buffer`
/// itself.
pub struct Buffer {
    input_slab: Vec<f32>,
    output_slab: Vec<f32>,
    input_slots: HashMap<LayerId, BufferSlot>,
    output_slots: HashMap<LayerId, BufferSlot>,
    dirty: HashMap<LayerId, bool>,
}

impl Buffer {
    /// Build a buffer with `input_layers` feeding `input_slab` and
    /// `output_layers` reading from `output_slab`, each sized by `size_of`
    pub fn new(
        input_layers: &[LayerId],
        output_layers: &[LayerId],
        size_of: impl Fn(LayerId) -> usize,
    ) -> Self {
        let mut input_slots = HashMap::new();
        let mut dirty = HashMap::new();
        let mut offset = 0;
        for &layer in input_layers {
            let len = size_of(layer);
            input_slots.insert(layer, BufferSlot { start: offset, len });
            dirty.insert(layer, false);
            offset += len;
        }
        let input_slab = vec![0.0; offset];

        let mut output_slots = HashMap::new();
        let mut offset = 0;
        for &layer in output_layers {
            let len = size_of(layer);
            output_slots.insert(layer, BufferSlot { start: offset, len });
            offset += len;
        }
        let output_slab = vec![0.0; offset];

        Self {
            input_slab,
            output_slab,
            input_slots,
            output_slots,
            dirty,
        }
    }

    /// Whether `layer` is one of this buffer's input layers
    pub fn has_input(&self, layer: LayerId) -> bool {
        self.input_slots.contains_key(&layer)
    }

    /// Whether `layer` is one of this buffer's output layers
    pub fn has_output(&self, layer: LayerId) -> bool {
        self.output_slots.contains_key(&layer)
    }

    /// A module writes new input for `layer`; marks it dirty for
    /// `InputTransfer` to pick up
    pub fn write_input(&mut self, layer: LayerId, values: &[f32]) {
        let slot = self.input_slots[&layer];
        self.input_slab[slot.start..slot.start + slot.len].copy_from_slice(values);
        self.dirty.insert(layer, true);
    }

    /// Read `layer`'s current input region
    pub fn read_input(&self, layer: LayerId) -> &[f32] {
        let slot = self.input_slots[&layer];
        &self.input_slab[slot.start..slot.start + slot.len]
    }

    /// Whether `layer`'s input has been written since the last clear
    pub fn is_dirty(&self, layer: LayerId) -> bool {
        self.dirty.get(&layer).copied().unwrap_or(false)
    }

    /// Clear `layer`'s dirty flag after its `InputTransfer` has run
    pub fn clear_dirty(&mut self, layer: LayerId) {
        self.dirty.insert(layer, false);
    }

    /// The engine writes `layer`'s freshly-computed output for a module to
    /// read
    pub fn write_output(&mut self, layer: LayerId, values: &[f32]) {
        let slot = self.output_slots[&layer];
        self.output_slab[slot.start..slot.start + slot.len].copy_from_slice(values);
    }

    /// A module reads `layer`'s current output region
    pub fn read_output(&self, layer: LayerId) -> &[f32] {
        let slot = self.output_slots[&layer];
        &self.output_slab[slot.start..slot.start + slot.len]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_input_round_trips() {
        let a = LayerId::new(0);
        let mut buf = Buffer::new(&[a], &[], |_| 4);
        assert!(!buf.is_dirty(a));
        buf.write_input(a, &[1.0, 2.0, 3.0, 4.0]);
        assert!(buf.is_dirty(a));
        assert_eq!(buf.read_input(a), &[1.0, 2.0, 3.0, 4.0]);
        buf.clear_dirty(a);
        assert!(!buf.is_dirty(a));
    }

    #[test]
    fn output_write_then_read_round_trips() {
        let a = LayerId::new(0);
        let mut buf = Buffer::new(&[], &[a], |_| 2);
        buf.write_output(a, &[5.0, 6.0]);
        assert_eq!(buf.read_output(a), &[5.0, 6.0]);
    }
}
