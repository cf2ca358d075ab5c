use galago_model::ModelError;
use thiserror::Error;

/// Error kinds surfaced to the caller.
///
/// Budget exhaustion is not an error; the engine reports it through its
/// stop outcome instead.
#[derive(Debug, Error)]
pub enum SamplerError {
    #[error("invalid sort: {0}")]
    InvalidSort(String),
    #[error("invalid input formula")]
    InvalidInputFormula,
    #[error("invalid hexadecimal value {0:?}")]
    InvalidHexValue(char),
    #[error("unsatisfiable formula")]
    UnsatisfiableFormula,
    #[error("solver was unable to solve the formula")]
    UnableToSolve,
    #[error("solution at mutation level {0} does not satisfy the formula")]
    SolutionCheckFailure(u32),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SamplerError {
    /// Stable numeric process exit code for this error kind.
    pub fn exit_code(&self) -> u8 {
        match self {
            SamplerError::InvalidSort(_) => 1,
            SamplerError::InvalidInputFormula => 2,
            SamplerError::InvalidHexValue(_) => 3,
            SamplerError::UnsatisfiableFormula => 10,
            SamplerError::UnableToSolve => 11,
            SamplerError::SolutionCheckFailure(_) => 12,
            SamplerError::Io(_) => 21,
        }
    }
}

impl From<ModelError> for SamplerError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::InvalidHex(c) => SamplerError::InvalidHexValue(c),
            ModelError::Malformed(_) => SamplerError::InvalidInputFormula,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_stable() {
        assert_eq!(SamplerError::InvalidSort(String::new()).exit_code(), 1);
        assert_eq!(SamplerError::InvalidInputFormula.exit_code(), 2);
        assert_eq!(SamplerError::InvalidHexValue('g').exit_code(), 3);
        assert_eq!(SamplerError::UnsatisfiableFormula.exit_code(), 10);
        assert_eq!(SamplerError::UnableToSolve.exit_code(), 11);
        assert_eq!(SamplerError::SolutionCheckFailure(1).exit_code(), 12);
    }

    #[test]
    fn model_errors_map_to_hex_and_input_kinds() {
        assert_eq!(
            SamplerError::from(ModelError::InvalidHex('z')).exit_code(),
            3
        );
        assert_eq!(
            SamplerError::from(ModelError::Malformed("x")).exit_code(),
            2
        );
    }
}
