use std::path::PathBuf;
use std::time::Duration;

/// Shape of the mutation pass's soft bank, and whether the formula is
/// routed through the bit-blasting pipeline first. The seed objective
/// is per-bit under every strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// One soft constraint per atomic bit position (default).
    #[default]
    SmtBit,
    /// One whole-value soft constraint per scalar, array cell, and
    /// function entry.
    SmtBv,
    /// Bit-blast φ first and sample over the converted goal, with no
    /// mutation soft bank.
    Sat,
}

/// Options for one sampling run.
#[derive(Debug, Clone)]
pub struct SamplerConfig {
    pub formula_path: PathBuf,
    pub array_map_path: Option<PathBuf>,
    pub output_path: PathBuf,
    pub max_samples: u64,
    pub max_time: Duration,
    pub strategy: Strategy,
    /// RNG seed; 0 is reserved ("unseeded") and seeds from the wall
    /// clock.
    pub seed: u64,
    /// Also probe flips of internal Bool/BV sub-expressions.
    pub flip_internal: bool,
    /// Per-cell selection ratio (0–100) gating array soft constraints;
    /// 0 disables gating and constrains every mapped cell.
    pub soft_array_ratio: u32,
}

impl SamplerConfig {
    /// Defaults for a given input path; the output lands next to the
    /// input as `<input>.samples`.
    pub fn new(formula_path: impl Into<PathBuf>) -> Self {
        let formula_path = formula_path.into();
        let output_path = PathBuf::from(format!("{}.samples", formula_path.display()));
        Self {
            formula_path,
            array_map_path: None,
            output_path,
            max_samples: 1_000_000,
            max_time: Duration::from_secs(3600),
            strategy: Strategy::default(),
            seed: 0,
            flip_internal: false,
            soft_array_ratio: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_output_sits_next_to_the_input() {
        let cfg = SamplerConfig::new("/tmp/phi.smt2");
        assert_eq!(cfg.output_path, PathBuf::from("/tmp/phi.smt2.samples"));
        assert_eq!(cfg.max_samples, 1_000_000);
        assert_eq!(cfg.max_time, Duration::from_secs(3600));
        assert_eq!(cfg.strategy, Strategy::SmtBit);
    }
}
