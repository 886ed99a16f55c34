//! Runs one scenario against an adapter and produces a report.

use opc_core::{AttributeSet, CompileExecuteAdapter, Shape, Tensor};
use serde::Serialize;
use tracing::{debug, info, info_span, warn};

use crate::compare::{Comparison, Tolerance, compare};
use crate::scenario::TestScenario;
use crate::synth::InputSynthesizer;
use crate::{ConformanceError, Origin};

/// Last stage a scenario run reached.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Initialized,
    InputsSynthesized,
    OraclesAndAdapterEvaluated,
    Compared,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum Verdict {
    Passed,
    Failed(ConformanceError),
}

/// Outcome of one scenario, with everything needed to reproduce it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScenarioReport {
    pub name: String,
    pub op: String,
    pub attrs: AttributeSet,
    pub seed: u64,
    pub adapter: String,
    pub tolerance: Tolerance,
    pub stage: Stage,
    /// Largest |expected - actual| of each output compared so far.
    pub max_abs_diff: Vec<f32>,
    pub verdict: Verdict,
}

impl ScenarioReport {
    pub fn passed(&self) -> bool {
        matches!(self.verdict, Verdict::Passed)
    }

    pub fn error(&self) -> Option<&ConformanceError> {
        match &self.verdict {
            Verdict::Passed => None,
            Verdict::Failed(err) => Some(err),
        }
    }

    pub fn ok(&self) -> Result<(), &ConformanceError> {
        self.error().map_or(Ok(()), Err)
    }
}

impl std::fmt::Display for ScenarioReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = if self.passed() { "PASS" } else { "FAIL" };
        write!(
            f,
            "{status} {} [op={}, attrs={}, seed={}, adapter={}]",
            self.name, self.op, self.attrs, self.seed, self.adapter
        )?;
        if let Some(err) = self.error() {
            write!(f, ": {err}")?;
        }
        Ok(())
    }
}

/// Drives scenarios through a [`CompileExecuteAdapter`].
pub struct ConformanceDriver<A> {
    adapter: A,
}

impl<A: CompileExecuteAdapter> ConformanceDriver<A> {
    pub fn new(adapter: A) -> Self {
        Self { adapter }
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    /// Run one scenario to completion or to its first failure.
    pub fn run(&self, scenario: &TestScenario) -> ScenarioReport {
        let span = info_span!(
            "scenario",
            name = scenario.name(),
            op = scenario.op(),
            seed = scenario.seed()
        );
        let _guard = span.enter();

        let mut run = Run {
            stage: Stage::Initialized,
            max_abs_diff: Vec::new(),
        };
        let verdict = match run.execute(&self.adapter, scenario) {
            Ok(()) => {
                info!(max_abs_diff = ?run.max_abs_diff, "passed");
                Verdict::Passed
            }
            Err(err) => {
                warn!(stage = ?run.stage, kind = err.kind(), "failed: {err}");
                Verdict::Failed(err)
            }
        };

        ScenarioReport {
            name: scenario.name().to_string(),
            op: scenario.op().to_string(),
            attrs: scenario.attrs().clone(),
            seed: scenario.seed(),
            adapter: self.adapter.name().to_string(),
            tolerance: scenario.tolerance(),
            stage: run.stage,
            max_abs_diff: run.max_abs_diff,
            verdict,
        }
    }
}

struct Run {
    stage: Stage,
    max_abs_diff: Vec<f32>,
}

impl Run {
    fn execute<A: CompileExecuteAdapter>(
        &mut self,
        adapter: &A,
        scenario: &TestScenario,
    ) -> Result<(), ConformanceError> {
        let shapes = scenario.shapes();
        shapes
            .validate(scenario.arity())
            .map_err(ConformanceError::InvalidShape)?;

        let inputs = match scenario.fixed_inputs() {
            Some(fixed) => {
                check_tensors(Origin::Input, shapes.input_shapes(), fixed)?;
                fixed.to_vec()
            }
            None => InputSynthesizer::new(scenario.seed())
                .synthesize(shapes.input_shapes(), &scenario.input_domains())
                .map_err(ConformanceError::InvalidShape)?,
        };
        self.stage = Stage::InputsSynthesized;
        debug!(inputs = inputs.len(), "inputs ready");

        // The adapter runs first so inputs it rejects never reach the oracle.
        let actual = adapter.compile_and_run(scenario.op(), scenario.attrs(), inputs.clone())?;
        debug!(outputs = actual.len(), "adapter returned");
        let expected = scenario.oracle().reference(&inputs);
        self.stage = Stage::OraclesAndAdapterEvaluated;

        check_tensors(Origin::Reference, shapes.output_shapes(), &expected)?;
        check_tensors(Origin::Adapter, shapes.output_shapes(), &actual)?;

        self.stage = Stage::Compared;
        let tolerance = scenario.tolerance();
        for (output, (e, a)) in expected.iter().zip(&actual).enumerate() {
            let comparison = compare(e, a, &tolerance).map_err(|_| ConformanceError::ShapeMismatch {
                origin: Origin::Adapter,
                position: output,
                expected: e.shape().clone(),
                got: a.shape().clone(),
            })?;
            self.max_abs_diff.push(comparison.max_abs_diff());
            if let Comparison::Mismatch(mismatch) = comparison {
                return Err(ConformanceError::ValueMismatch { output, mismatch });
            }
        }
        Ok(())
    }
}

fn check_tensors(origin: Origin, shapes: &[Shape], tensors: &[Tensor]) -> Result<(), ConformanceError> {
    if tensors.len() != shapes.len() {
        return Err(ConformanceError::TensorCount {
            origin,
            expected: shapes.len(),
            got: tensors.len(),
        });
    }
    for (position, (shape, tensor)) in shapes.iter().zip(tensors).enumerate() {
        if tensor.shape() != shape {
            return Err(ConformanceError::ShapeMismatch {
                origin,
                position,
                expected: shape.clone(),
                got: tensor.shape().clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use opc_core::AdapterError;

    /// Adapter that evaluates relu directly, or fails on request.
    struct Echo {
        fail: Option<&'static str>,
    }

    impl CompileExecuteAdapter for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn compile_and_run(
            &self,
            op: &str,
            attrs: &AttributeSet,
            inputs: Vec<Tensor>,
        ) -> Result<Vec<Tensor>, AdapterError> {
            if let Some(reason) = self.fail {
                return Err(AdapterError::compilation(op, attrs, reason));
            }
            Ok(inputs.iter().map(|t| t.map(|x| x.max(0.0))).collect())
        }
    }

    #[test]
    fn test_pass_reaches_compared() {
        let driver = ConformanceDriver::new(Echo { fail: None });
        let scenario = TestScenario::builder("relu").inputs([[32]]).build().unwrap();
        let report = driver.run(&scenario);
        assert!(report.passed(), "{report}");
        assert_eq!(report.stage, Stage::Compared);
        assert_eq!(report.max_abs_diff, vec![0.0]);
        assert_eq!(report.adapter, "echo");
    }

    #[test]
    fn test_invalid_shape_stops_at_initialized() {
        let driver = ConformanceDriver::new(Echo { fail: None });
        let scenario = TestScenario::builder("relu").inputs([[4, 0]]).build().unwrap();
        let report = driver.run(&scenario);
        assert_eq!(report.stage, Stage::Initialized);
        assert!(matches!(report.error(), Some(ConformanceError::InvalidShape(_))));
    }

    #[test]
    fn test_adapter_error_surfaced() {
        let driver = ConformanceDriver::new(Echo {
            fail: Some("no kernel"),
        });
        let scenario = TestScenario::builder("relu").inputs([[8]]).build().unwrap();
        let report = driver.run(&scenario);
        assert_eq!(report.stage, Stage::InputsSynthesized);
        let err = report.ok().unwrap_err();
        assert_eq!(err.kind(), "compilation");
        assert!(err.to_string().contains("no kernel"));
    }

    #[test]
    fn test_fixed_input_count_checked() {
        let driver = ConformanceDriver::new(Echo { fail: None });
        let scenario = TestScenario::builder("relu")
            .inputs([[2]])
            .fixed_inputs(vec![])
            .build()
            .unwrap();
        let report = driver.run(&scenario);
        assert_eq!(
            report.error(),
            Some(&ConformanceError::TensorCount {
                origin: Origin::Input,
                expected: 1,
                got: 0,
            })
        );
    }
}
