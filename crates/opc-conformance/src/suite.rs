//! The built-in scenario suite and a runner for scenario lists.

use opc_core::{AttributeSet, CompileExecuteAdapter};
use serde::Serialize;

use crate::config::HarnessConfig;
use crate::driver::{ConformanceDriver, ScenarioReport};
use crate::oracle::OracleError;
use crate::scenario::TestScenario;
use crate::synth::ValueDomain;

/// One scenario per built-in operator.
pub fn builtin_suite(config: &HarnessConfig) -> Result<Vec<TestScenario>, OracleError> {
    let wide = ValueDomain::new(-8.0, 8.0).map_err(invalid_domain)?;
    let saturating = ValueDomain::new(-6.0, 6.0).map_err(invalid_domain)?;
    // Variance must stay positive; keep every parameter row in the same range.
    let bn_params = ValueDomain::new(0.01, 1.0).map_err(invalid_domain)?;

    Ok(vec![
        TestScenario::builder("relu").config(config).inputs([[32]]).build()?,
        TestScenario::builder("relu6")
            .config(config)
            .inputs([[32, 32]])
            .domain(wide)
            .build()?,
        TestScenario::builder("sigmoid")
            .config(config)
            .inputs([[64]])
            .domain(saturating)
            .build()?,
        TestScenario::builder("scale")
            .config(config)
            .attrs(AttributeSet::new().with("scale", 2.5).with("bias", -0.5))
            .inputs([[8, 8]])
            .build()?,
        TestScenario::builder("elementwise_add")
            .config(config)
            .inputs([[16, 16], [16, 16]])
            .build()?,
        TestScenario::builder("softmax")
            .config(config)
            .attrs(AttributeSet::new().with("axis", -1))
            .inputs([[4, 16]])
            .domain(wide)
            .build()?,
        TestScenario::builder("batchnorm")
            .config(config)
            .attrs(AttributeSet::new().with("epsilon", 1e-5))
            .inputs([vec![1, 3, 2, 2], vec![4, 3]])
            .outputs([[1, 3, 2, 2]])
            .input_domain(1, bn_params)
            .build()?,
        TestScenario::builder("conv2d")
            .config(config)
            .attrs(
                AttributeSet::new()
                    .with("padding", [1, 1])
                    .with("stride", [2, 2])
                    .with("dilation", 2)
                    .with("groups", 1),
            )
            .inputs([[1, 3, 10, 10], [2, 3, 2, 2]])
            .outputs([[1, 2, 5, 5]])
            .build()?,
    ])
}

fn invalid_domain(err: opc_core::OpcError) -> OracleError {
    OracleError::InvalidAttr {
        key: "domain",
        reason: err.to_string(),
    }
}

/// Reports of a suite run, in scenario order.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SuiteSummary {
    pub reports: Vec<ScenarioReport>,
}

impl SuiteSummary {
    pub fn passed(&self) -> usize {
        self.reports.iter().filter(|r| r.passed()).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ScenarioReport> {
        self.reports.iter().filter(|r| !r.passed())
    }

    pub fn failed(&self) -> usize {
        self.failures().count()
    }

    pub fn all_passed(&self) -> bool {
        self.reports.iter().all(ScenarioReport::passed)
    }
}

impl std::fmt::Display for SuiteSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} scenarios: {} passed, {} failed",
            self.reports.len(),
            self.passed(),
            self.failed()
        )
    }
}

/// Run every scenario. A failing scenario does not stop the rest.
pub fn run_suite<'a, A: CompileExecuteAdapter>(
    driver: &ConformanceDriver<A>,
    scenarios: impl IntoIterator<Item = &'a TestScenario>,
) -> SuiteSummary {
    SuiteSummary {
        reports: scenarios.into_iter().map(|s| driver.run(s)).collect(),
    }
}
