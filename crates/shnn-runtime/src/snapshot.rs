//! Round-trip persistence of a [`crate::weight_matrix::WeightMatrix`] through
//! `shnn-storage`'s VCSR format (spec.md §8 "Round-trip and idempotence").
//!
//! `shnn-storage` is a general-purpose sparse-graph store; it knows nothing
//! about rows/cols/delays/plasticity bounds, so this module treats every
//! matrix row as a source vertex and every `(row, col)` weight as an edge,
//! and carries the handful of scalars the generic format doesn't model
//! (column count, clamp bounds, plasticity, per-weight delays) in a small
//! fixed prefix ahead of the VCSR payload.

use std::mem;

use shnn_storage::vcsr::{VCSRSnapshot, VCSRVertex};
use shnn_storage::{GenerationId, NeuronId, StorageError};

use crate::error::{Result, RuntimeError};
use crate::weight_matrix::WeightMatrix;

const PLASTIC_FLAG: u8 = 1;
const HAS_DELAYS_FLAG: u8 = 2;

/// Serialize `matrix` to bytes, tagging the snapshot with `generation`
/// (spec.md §8: saving network/state and loading into a fresh engine must
/// reproduce bitwise-identical weights for non-plastic connections).
pub fn to_bytes(matrix: &WeightMatrix, generation: u64) -> Vec<u8> {
    let mut snapshot = VCSRSnapshot::new(GenerationId::new(generation), matrix.rows());
    for r in 0..matrix.rows() {
        snapshot.add_vertex(VCSRVertex::new(NeuronId::new(r), 0));
    }
    for r in 0..matrix.rows() {
        for c in 0..matrix.cols() {
            snapshot.add_edge(NeuronId::new(r), NeuronId::new(c), matrix.get(r, c));
        }
    }
    snapshot.finalize();

    let mut flags = 0u8;
    if matrix.is_plastic() {
        flags |= PLASTIC_FLAG;
    }
    if matrix.delays().is_some() {
        flags |= HAS_DELAYS_FLAG;
    }

    let mut bytes = Vec::new();
    bytes.extend_from_slice(&matrix.cols().to_le_bytes());
    bytes.extend_from_slice(&matrix.min_weight().to_le_bytes());
    bytes.extend_from_slice(&matrix.max_weight().to_le_bytes());
    bytes.push(flags);
    if let Some(delays) = matrix.delays() {
        bytes.extend_from_slice(&(delays.len() as u32).to_le_bytes());
        for &d in delays {
            bytes.extend_from_slice(&d.to_le_bytes());
        }
    }
    bytes.extend_from_slice(&snapshot.to_bytes());
    bytes
}

/// Reconstruct a [`WeightMatrix`] from bytes produced by [`to_bytes`]
pub fn from_bytes(data: &[u8]) -> Result<WeightMatrix> {
    let prefix_scalars = mem::size_of::<u32>() * 2 + mem::size_of::<f32>() * 2 + 1;
    if data.len() < prefix_scalars {
        return Err(storage_err(StorageError::invalid_format(
            "snapshot shorter than fixed prefix",
        )));
    }

    let mut offset = 0;
    let cols = read_u32(data, &mut offset);
    let min_weight = read_f32(data, &mut offset);
    let max_weight = read_f32(data, &mut offset);
    let flags = data[offset];
    offset += 1;

    let delays = if flags & HAS_DELAYS_FLAG != 0 {
        let len = read_u32(data, &mut offset) as usize;
        let mut delays = Vec::with_capacity(len);
        for _ in 0..len {
            delays.push(read_u32(data, &mut offset));
        }
        Some(delays)
    } else {
        None
    };

    let snapshot = VCSRSnapshot::from_bytes(&data[offset..]).map_err(storage_err)?;
    let rows = snapshot.header.num_vertices;

    let mut matrix = WeightMatrix::zeros(rows, cols, min_weight, max_weight, flags & PLASTIC_FLAG != 0);
    for r in 0..rows {
        for (col, weight) in snapshot.neighbors(NeuronId::new(r)) {
            matrix.set(r, col.raw(), weight);
        }
    }
    matrix.set_delays(delays);
    Ok(matrix)
}

fn storage_err(source: StorageError) -> RuntimeError {
    RuntimeError::Storage { source }
}

fn read_u32(data: &[u8], offset: &mut usize) -> u32 {
    let v = u32::from_le_bytes(data[*offset..*offset + 4].try_into().unwrap());
    *offset += 4;
    v
}

fn read_f32(data: &[u8], offset: &mut usize) -> f32 {
    let v = f32::from_le_bytes(data[*offset..*offset + 4].try_into().unwrap());
    *offset += 4;
    v
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_preserves_weights_bounds_and_plasticity() {
        let mut matrix = WeightMatrix::zeros(2, 3, -1.0, 1.0, true);
        matrix.set(0, 0, 0.5);
        matrix.set(0, 2, -0.25);
        matrix.set(1, 1, 1.0);

        let bytes = to_bytes(&matrix, 7);
        let restored = from_bytes(&bytes).unwrap();

        assert_eq!(restored.rows(), matrix.rows());
        assert_eq!(restored.cols(), matrix.cols());
        assert_eq!(restored.weights(), matrix.weights());
        assert!(restored.is_plastic());
    }

    #[test]
    fn round_trip_preserves_delays() {
        let mut matrix = WeightMatrix::zeros(2, 2, 0.0, 1.0, false);
        matrix.set_delays(Some(vec![3, 1, 0, 31]));

        let bytes = to_bytes(&matrix, 1);
        let restored = from_bytes(&bytes).unwrap();
        assert_eq!(restored.delays(), Some(&[3, 1, 0, 31][..]));
    }
}
