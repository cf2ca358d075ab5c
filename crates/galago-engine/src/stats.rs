use std::fmt::Write as _;
use std::time::Duration;

/// Run statistics, owned by the epoch controller and printed on every
/// exit path.
#[derive(Debug, Clone, Default)]
pub struct Stats {
    /// The seed the run actually used (the wall clock's when unseeded).
    pub final_seed: u64,
    pub input_seed: Option<u64>,
    pub epochs: u64,
    /// Candidates pushed through validation, valid or not.
    pub samples: u64,
    pub valid_samples: u64,
    pub unique_valid: u64,
    /// Accepted level-1 mutations.
    pub flips: u64,
    pub solver_calls: u64,
    pub solver_time: Duration,
    pub check_time: Duration,
    pub convert_time: Duration,
    /// Atomic flip positions over indicator scalars.
    pub all_ind_bits: u64,
    pub unsat_ind_bits: u64,
    pub unsat_internal: u64,
}

impl Stats {
    /// The statistics block printed at termination.
    pub fn render(&self, elapsed: Duration) -> String {
        let mut out = String::new();
        if let Some(seed) = self.input_seed {
            let _ = writeln!(out, "Input seed: {seed}");
        }
        let _ = writeln!(out, "Final seed: {}", self.final_seed);
        let _ = writeln!(out, "Samples {}", self.samples);
        let _ = writeln!(out, "Valid samples {}", self.valid_samples);
        let _ = writeln!(out, "Unique valid samples {}", self.unique_valid);
        let _ = writeln!(out, "Total time {:.3}", elapsed.as_secs_f64());
        let _ = writeln!(out, "Solver time: {:.3}", self.solver_time.as_secs_f64());
        let _ = writeln!(out, "Convert time: {:.3}", self.convert_time.as_secs_f64());
        let _ = writeln!(out, "Check time {:.3}", self.check_time.as_secs_f64());
        let _ = writeln!(
            out,
            "Epochs {}, Flips {}, UnsatInd {}/{}, UnsatInternal {}, Calls {}",
            self.epochs,
            self.flips,
            self.unsat_ind_bits,
            self.all_ind_bits,
            self.unsat_internal,
            self.solver_calls
        );
        out
    }
}
