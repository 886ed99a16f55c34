//! Operator conformance testing.
//!
//! Checks that a compiled operator, driven through a
//! [`CompileExecuteAdapter`](opc_core::CompileExecuteAdapter), agrees with an
//! independent reference implementation. Each [`TestScenario`] is run by the
//! [`ConformanceDriver`]:
//!
//! 1. synthesize seeded random inputs for the declared input shapes;
//! 2. evaluate the adapter and the [`ReferenceOracle`] on copies of the same
//!    inputs;
//! 3. compare every declared output under a [`Tolerance`].
//!
//! The first failure ends the scenario and is reported verbatim, together
//! with the seed needed to reproduce it.

pub mod compare;
pub mod config;
pub mod driver;
pub mod oracle;
pub mod scenario;
pub mod suite;
pub mod synth;

use opc_core::{AdapterError, OpcError, Shape};
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

pub use compare::{Comparison, Mismatch, Tolerance, assert_allclose, compare};
pub use config::HarnessConfig;
pub use driver::{ConformanceDriver, ScenarioReport, Stage, Verdict};
pub use oracle::{OperatorDef, OracleError, ReferenceOracle, builtin_oracle, operator_def};
pub use scenario::{Arity, ShapeSpec, TestScenario, TestScenarioBuilder};
pub use suite::{SuiteSummary, builtin_suite, run_suite};
pub use synth::{InputSynthesizer, ValueDomain};

/// Which side of a scenario produced a tensor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// Caller-supplied fixed inputs.
    Input,
    Reference,
    Adapter,
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Origin::Input => write!(f, "input"),
            Origin::Reference => write!(f, "reference"),
            Origin::Adapter => write!(f, "adapter"),
        }
    }
}

/// Why a scenario failed.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConformanceError {
    #[error("invalid shape: {0}")]
    InvalidShape(OpcError),

    #[error(transparent)]
    Compilation(AdapterError),

    #[error(transparent)]
    Execution(AdapterError),

    #[error("{origin} tensor {position} shape mismatch: expected {expected}, got {got}")]
    ShapeMismatch {
        origin: Origin,
        position: usize,
        expected: Shape,
        got: Shape,
    },

    #[error("{origin} tensor count mismatch: expected {expected}, got {got}")]
    TensorCount {
        origin: Origin,
        expected: usize,
        got: usize,
    },

    #[error("output {output} value mismatch {mismatch}")]
    ValueMismatch { output: usize, mismatch: Mismatch },
}

impl ConformanceError {
    /// Stable machine-readable name of the failure class.
    pub fn kind(&self) -> &'static str {
        match self {
            ConformanceError::InvalidShape(_) => "invalid_shape",
            ConformanceError::Compilation(_) => "compilation",
            ConformanceError::Execution(_) => "execution",
            ConformanceError::ShapeMismatch { .. } => "shape_mismatch",
            ConformanceError::TensorCount { .. } => "tensor_count",
            ConformanceError::ValueMismatch { .. } => "value_mismatch",
        }
    }
}

impl From<AdapterError> for ConformanceError {
    fn from(err: AdapterError) -> Self {
        match err {
            AdapterError::Compilation { .. } => ConformanceError::Compilation(err),
            AdapterError::Execution { .. } => ConformanceError::Execution(err),
        }
    }
}

impl Serialize for ConformanceError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ConformanceError", 3)?;
        state.serialize_field("kind", self.kind())?;
        state.serialize_field("message", &self.to_string())?;
        match self {
            ConformanceError::ValueMismatch { mismatch, .. } => {
                state.serialize_field("mismatch", mismatch)?;
            }
            _ => state.skip_field("mismatch")?,
        }
        state.end()
    }
}
