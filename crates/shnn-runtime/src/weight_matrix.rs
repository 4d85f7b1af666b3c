//! WeightMatrix: dense per-connection weight storage plus auxiliary
//! per-weight variables (spec.md §4.4)

use std::collections::HashMap;

use rand::Rng;
use rand_distr::{Distribution, LogNormal, Normal};

use shnn_core::{ConnectionConfig, DelayConfig, DiagonalFlag, WeightConfig, MAX_DELAY_BITS};

use crate::error::{Result, RuntimeError};

fn clamp(value: f32, min: f32, max: f32) -> f32 {
    value.clamp(min.min(max), max)
}

/// Inverse-CDF sample of a bounded power law on `[0, max]` with exponent `k`
fn power_law_sample(rng: &mut impl Rng, exponent: f32, max: f32) -> f32 {
    let u: f32 = rng.gen_range(0.0..1.0);
    let k1 = exponent + 1.0;
    max * u.powf(1.0 / k1)
}

/// Fill `weights` from a [`WeightConfig`], honoring `fraction` sparsity and
/// clamping stochastic variants to `[0, max_weight]` (spec.md §4.4)
fn fill_from_config(
    weights: &mut [f32],
    rows: u32,
    cols: u32,
    config: &WeightConfig,
    max_weight: f32,
    rng: &mut impl Rng,
) -> Result<()> {
    config
        .validate()
        .map_err(|e| RuntimeError::invalid_config(e.to_string()))?;

    match config {
        WeightConfig::Flat { value, fraction } => {
            for w in weights.iter_mut() {
                *w = if rng.gen_range(0.0..1.0) < *fraction {
                    *value
                } else {
                    0.0
                };
            }
        }
        WeightConfig::UniformRandom { max, fraction } => {
            for w in weights.iter_mut() {
                *w = if rng.gen_range(0.0..1.0) < *fraction {
                    rng.gen_range(0.0..*max)
                } else {
                    0.0
                };
            }
        }
        WeightConfig::Gaussian { mean, std, fraction } => {
            let dist = Normal::new(*mean, *std)
                .map_err(|e| RuntimeError::invalid_config(e.to_string()))?;
            for w in weights.iter_mut() {
                *w = if rng.gen_range(0.0..1.0) < *fraction {
                    clamp(dist.sample(rng), 0.0, max_weight)
                } else {
                    0.0
                };
            }
        }
        WeightConfig::LogNormal { mean, std, fraction } => {
            let dist = LogNormal::new(*mean, *std)
                .map_err(|e| RuntimeError::invalid_config(e.to_string()))?;
            for w in weights.iter_mut() {
                *w = if rng.gen_range(0.0..1.0) < *fraction {
                    clamp(dist.sample(rng), 0.0, max_weight)
                } else {
                    0.0
                };
            }
        }
        WeightConfig::PowerLaw { exponent, fraction } => {
            for w in weights.iter_mut() {
                *w = if rng.gen_range(0.0..1.0) < *fraction {
                    clamp(power_law_sample(rng, *exponent, max_weight), 0.0, max_weight)
                } else {
                    0.0
                };
            }
        }
        WeightConfig::Specified { values } => {
            let parsed: std::result::Result<Vec<f32>, _> =
                values.split_whitespace().map(str::parse::<f32>).collect();
            let parsed = parsed.map_err(|e| {
                RuntimeError::invalid_config(format!("specified weights: {e}"))
            })?;
            if parsed.len() != weights.len() {
                return Err(RuntimeError::invalid_config(format!(
                    "specified weight count {} does not match connection's {} weights",
                    parsed.len(),
                    weights.len()
                )));
            }
            weights.copy_from_slice(&parsed);
        }
        WeightConfig::Surround { inner, rows: win_rows, cols: win_cols } => {
            if *win_rows > rows || *win_cols > cols {
                return Err(RuntimeError::invalid_topology(
                    "surround window larger than field (spec.md §9 open question)",
                ));
            }
            fill_from_config(weights, rows, cols, inner, max_weight, rng)?;
            let row_start = (rows - win_rows) / 2;
            let col_start = (cols - win_cols) / 2;
            for r in row_start..row_start + win_rows {
                for c in col_start..col_start + win_cols {
                    weights[(r * cols + c) as usize] = 0.0;
                }
            }
        }
    }
    Ok(())
}

/// Zero the diagonal of a square `rows == cols` weight matrix
fn zero_diagonal(weights: &mut [f32], rows: u32, cols: u32) {
    let n = rows.min(cols);
    for i in 0..n {
        weights[(i * cols + i) as usize] = 0.0;
    }
}

/// Dense (optionally augmented with sparse indices) storage for one
/// [`shnn_core::Connection`]'s synaptic weights, plus any auxiliary
/// same-shape variable layers a neuron model registers (traces, STDP/STP
/// state, per-weight delays) (spec.md §4.4)
#[derive(Debug, Clone)]
pub struct WeightMatrix {
    rows: u32,
    cols: u32,
    weights: Vec<f32>,
    transposed: Option<Vec<f32>>,
    delays: Option<Vec<u32>>,
    sparse_col_indices: Option<Vec<u32>>,
    sparse_row_ptr: Option<Vec<u32>>,
    aux: HashMap<&'static str, Vec<f32>>,
    min_weight: f32,
    max_weight: f32,
    plastic: bool,
}

impl WeightMatrix {
    /// Allocate a zeroed `rows x cols` matrix
    pub fn zeros(rows: u32, cols: u32, min_weight: f32, max_weight: f32, plastic: bool) -> Self {
        Self {
            rows,
            cols,
            weights: vec![0.0; (rows * cols) as usize],
            transposed: None,
            delays: None,
            sparse_col_indices: None,
            sparse_row_ptr: None,
            aux: HashMap::new(),
            min_weight,
            max_weight,
            plastic,
        }
    }

    /// Build and initialize a matrix for `config` from its `weight_config`
    pub fn from_config(
        rows: u32,
        cols: u32,
        config: &ConnectionConfig,
        weight_config: &WeightConfig,
        diagonal: DiagonalFlag,
        rng: &mut impl Rng,
    ) -> Result<Self> {
        let mut matrix = Self::zeros(rows, cols, config.min_weight, config.max_weight, config.plastic);
        fill_from_config(
            &mut matrix.weights,
            rows,
            cols,
            weight_config,
            config.max_weight,
            rng,
        )?;
        if !diagonal.0 && rows == cols {
            zero_diagonal(&mut matrix.weights, rows, cols);
        }
        Ok(matrix)
    }

    /// Rows (destination-side enumeration)
    pub fn rows(&self) -> u32 {
        self.rows
    }

    /// Columns (source-side enumeration)
    pub fn cols(&self) -> u32 {
        self.cols
    }

    /// Whether this connection's weights may be mutated by an updater
    pub fn is_plastic(&self) -> bool {
        self.plastic
    }

    /// Lower clamp bound applied by [`Self::clamp_weights`]
    pub fn min_weight(&self) -> f32 {
        self.min_weight
    }

    /// Upper clamp bound applied by [`Self::clamp_weights`]
    pub fn max_weight(&self) -> f32 {
        self.max_weight
    }

    /// Borrow the dense weight array, row-major
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    /// Mutably borrow the dense weight array, row-major
    pub fn weights_mut(&mut self) -> &mut [f32] {
        &mut self.weights
    }

    /// Clamp every weight into `[min_weight, max_weight]` (spec.md §3, §8
    /// invariant 4); called after every plastic update.
    pub fn clamp_weights(&mut self) {
        let (min, max) = (self.min_weight, self.max_weight);
        for w in self.weights.iter_mut() {
            *w = w.clamp(min, max);
        }
    }

    /// A weight at `(row, col)`
    pub fn get(&self, row: u32, col: u32) -> f32 {
        self.weights[(row * self.cols + col) as usize]
    }

    /// Set a weight at `(row, col)`
    pub fn set(&mut self, row: u32, col: u32, value: f32) {
        self.weights[(row * self.cols + col) as usize] = value;
    }

    /// Register a new auxiliary same-shape variable layer, zero-initialized
    /// (traces, STDP/STP state; spec.md §4.4 "additional flags")
    pub fn register_aux(&mut self, name: &'static str) {
        self.aux
            .entry(name)
            .or_insert_with(|| vec![0.0; self.weights.len()]);
    }

    /// Borrow an auxiliary variable layer by name
    pub fn aux(&self, name: &str) -> Option<&[f32]> {
        self.aux.get(name).map(Vec::as_slice)
    }

    /// Mutably borrow an auxiliary variable layer by name
    pub fn aux_mut(&mut self, name: &str) -> Option<&mut [f32]> {
        self.aux.get_mut(name).map(Vec::as_mut_slice)
    }

    /// (Re-)derive the transposed copy so parallel kernels can read a
    /// source row contiguously (spec.md §4.4); cheap to call again once
    /// weights change shape, since it's a plain re-derivation, not an
    /// incremental update.
    pub fn rebuild_transposed(&mut self) {
        let mut t = vec![0.0; self.weights.len()];
        for r in 0..self.rows {
            for c in 0..self.cols {
                t[(c * self.rows + r) as usize] = self.weights[(r * self.cols + c) as usize];
            }
        }
        self.transposed = Some(t);
    }

    /// The transposed copy, if [`Self::rebuild_transposed`] has been called
    pub fn transposed(&self) -> Option<&[f32]> {
        self.transposed.as_deref()
    }

    /// Initialize per-weight delays from `config`, measuring distance with
    /// `distance_fn(row, col)` (spec.md §4.4 "Delay initialization")
    pub fn init_delays(
        &mut self,
        config: &DelayConfig,
        distance_fn: impl Fn(u32, u32) -> f32,
    ) -> Result<()> {
        let mut delays = vec![0u32; self.weights.len()];
        for r in 0..self.rows {
            for c in 0..self.cols {
                let d = config
                    .delay_for_distance(distance_fn(r, c))
                    .map_err(|e| RuntimeError::Network { source: e })?;
                delays[(r * self.cols + c) as usize] = d.min(MAX_DELAY_BITS);
            }
        }
        self.delays = Some(delays);
        Ok(())
    }

    /// Per-weight delays, if [`Self::init_delays`] has been called
    pub fn delays(&self) -> Option<&[u32]> {
        self.delays.as_deref()
    }

    /// Overwrite the per-weight delay array directly, bypassing
    /// [`Self::init_delays`]'s distance computation (used when restoring a
    /// matrix from a [`crate::snapshot`] rather than building one fresh)
    pub fn set_delays(&mut self, delays: Option<Vec<u32>>) {
        self.delays = delays;
    }

    /// Record this matrix's CSR-style sparse structure (non-zero column
    /// indices per row, with a row-pointer array) for kernels that want to
    /// skip zero weights
    pub fn set_sparse_indices(&mut self, col_indices: Vec<u32>, row_ptr: Vec<u32>) {
        self.sparse_col_indices = Some(col_indices);
        self.sparse_row_ptr = Some(row_ptr);
    }

    /// Sparse column indices, if present
    pub fn sparse_col_indices(&self) -> Option<&[u32]> {
        self.sparse_col_indices.as_deref()
    }

    /// Sparse row-pointer array, if present
    pub fn sparse_row_ptr(&self) -> Option<&[u32]> {
        self.sparse_row_ptr.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use shnn_core::{ConnectionConfig, LayerId, Opcode};

    #[test]
    fn flat_fraction_one_fills_every_weight() {
        let mut rng = StdRng::seed_from_u64(1);
        let cfg = ConnectionConfig::fully_connected(LayerId::new(0), LayerId::new(1), Opcode::Add);
        let wcfg = WeightConfig::Flat { value: 0.5, fraction: 1.0 };
        let m = WeightMatrix::from_config(2, 2, &cfg, &wcfg, DiagonalFlag(true), &mut rng).unwrap();
        assert!(m.weights().iter().all(|&w| w == 0.5));
    }

    #[test]
    fn specified_requires_matching_count() {
        let mut rng = StdRng::seed_from_u64(1);
        let cfg = ConnectionConfig::fully_connected(LayerId::new(0), LayerId::new(1), Opcode::Add);
        let wcfg = WeightConfig::Specified { values: "1 2 3".to_string() };
        let err = WeightMatrix::from_config(2, 2, &cfg, &wcfg, DiagonalFlag(true), &mut rng).unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidConfig { .. }));
    }

    #[test]
    fn specified_scenario_2_matrix() {
        let mut rng = StdRng::seed_from_u64(1);
        let cfg = ConnectionConfig::fully_connected(LayerId::new(0), LayerId::new(1), Opcode::Add);
        let wcfg = WeightConfig::Specified { values: "0.5 0.25 1.0 0.0".to_string() };
        let m = WeightMatrix::from_config(2, 2, &cfg, &wcfg, DiagonalFlag(true), &mut rng).unwrap();
        assert_eq!(m.get(0, 0), 0.5);
        assert_eq!(m.get(0, 1), 0.25);
        assert_eq!(m.get(1, 0), 1.0);
        assert_eq!(m.get(1, 1), 0.0);
    }

    #[test]
    fn diagonal_false_zeroes_square_diagonal() {
        let mut rng = StdRng::seed_from_u64(1);
        let cfg = ConnectionConfig::fully_connected(LayerId::new(0), LayerId::new(1), Opcode::Add);
        let wcfg = WeightConfig::Flat { value: 1.0, fraction: 1.0 };
        let m = WeightMatrix::from_config(2, 2, &cfg, &wcfg, DiagonalFlag(false), &mut rng).unwrap();
        assert_eq!(m.get(0, 0), 0.0);
        assert_eq!(m.get(1, 1), 0.0);
        assert_eq!(m.get(0, 1), 1.0);
    }

    #[test]
    fn clamp_keeps_plastic_weights_in_bounds() {
        let mut m = WeightMatrix::zeros(1, 1, 0.0, 1.0, true);
        m.set(0, 0, 5.0);
        m.clamp_weights();
        assert_eq!(m.get(0, 0), 1.0);
        m.set(0, 0, -5.0);
        m.clamp_weights();
        assert_eq!(m.get(0, 0), 0.0);
    }

    #[test]
    fn transpose_swaps_axes() {
        let mut rng = StdRng::seed_from_u64(1);
        let cfg = ConnectionConfig::fully_connected(LayerId::new(0), LayerId::new(1), Opcode::Add);
        let wcfg = WeightConfig::Specified { values: "1 2 3 4 5 6".to_string() };
        let mut m = WeightMatrix::from_config(2, 3, &cfg, &wcfg, DiagonalFlag(true), &mut rng).unwrap();
        m.rebuild_transposed();
        let t = m.transposed().unwrap();
        // original row-major 2x3: [1 2 3; 4 5 6] -> transposed 3x2: [1 4; 2 5; 3 6]
        assert_eq!(t, &[1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    }

    #[test]
    fn surround_window_larger_than_field_is_rejected() {
        let mut rng = StdRng::seed_from_u64(1);
        let cfg = ConnectionConfig::fully_connected(LayerId::new(0), LayerId::new(1), Opcode::Add);
        let wcfg = WeightConfig::Surround {
            inner: Box::new(WeightConfig::Flat { value: 1.0, fraction: 1.0 }),
            rows: 5,
            cols: 5,
        };
        let err = WeightMatrix::from_config(3, 3, &cfg, &wcfg, DiagonalFlag(true), &mut rng).unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidTopology { .. }));
    }
}
