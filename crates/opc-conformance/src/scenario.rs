//! Scenario descriptions: what to run, on which shapes, and how to judge it.

use std::collections::BTreeMap;
use std::sync::Arc;

use opc_core::{AttributeSet, OpcError, Result, Shape, Tensor};
use serde::Serialize;

use crate::compare::Tolerance;
use crate::config::HarnessConfig;
use crate::oracle::{OracleError, ReferenceOracle, operator_def};
use crate::synth::ValueDomain;

/// Number of inputs and outputs an operator takes and produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Arity {
    pub inputs: usize,
    pub outputs: usize,
}

impl Arity {
    pub const fn new(inputs: usize, outputs: usize) -> Self {
        Self { inputs, outputs }
    }
}

/// Declared input and output shapes of one scenario.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ShapeSpec {
    input_shapes: Vec<Shape>,
    output_shapes: Vec<Shape>,
}

impl ShapeSpec {
    pub fn new(input_shapes: Vec<Shape>, output_shapes: Vec<Shape>) -> Self {
        Self {
            input_shapes,
            output_shapes,
        }
    }

    /// Unary or elementwise scenarios: every output has the first input's
    /// shape.
    pub fn same_as_input(input_shapes: Vec<Shape>, outputs: usize) -> Self {
        let output_shapes = input_shapes
            .first()
            .map(|s| vec![s.clone(); outputs])
            .unwrap_or_default();
        Self::new(input_shapes, output_shapes)
    }

    pub fn input_shapes(&self) -> &[Shape] {
        &self.input_shapes
    }

    pub fn output_shapes(&self) -> &[Shape] {
        &self.output_shapes
    }

    /// Check every shape is well formed and, when an arity is known, that
    /// the counts agree with it.
    pub fn validate(&self, arity: Option<Arity>) -> Result<()> {
        if self.input_shapes.is_empty() {
            return Err(OpcError::InvalidArgument("no input shapes declared".into()));
        }
        if self.output_shapes.is_empty() {
            return Err(OpcError::InvalidArgument("no output shapes declared".into()));
        }
        for shape in self.input_shapes.iter().chain(&self.output_shapes) {
            shape.validate()?;
        }
        if let Some(arity) = arity {
            if arity.inputs != self.input_shapes.len() {
                return Err(OpcError::InvalidArgument(format!(
                    "operator takes {} inputs, {} input shapes declared",
                    arity.inputs,
                    self.input_shapes.len()
                )));
            }
            if arity.outputs != self.output_shapes.len() {
                return Err(OpcError::InvalidArgument(format!(
                    "operator produces {} outputs, {} output shapes declared",
                    arity.outputs,
                    self.output_shapes.len()
                )));
            }
        }
        Ok(())
    }
}

/// One conformance check: an operator, its attributes, its shapes and its
/// reference oracle.
pub struct TestScenario {
    name: String,
    op: String,
    attrs: AttributeSet,
    shapes: ShapeSpec,
    oracle: Arc<dyn ReferenceOracle>,
    arity: Option<Arity>,
    seed: u64,
    tolerance: Tolerance,
    domain: ValueDomain,
    input_domains: BTreeMap<usize, ValueDomain>,
    fixed_inputs: Option<Vec<Tensor>>,
}

impl TestScenario {
    pub fn builder(op: impl Into<String>) -> TestScenarioBuilder {
        TestScenarioBuilder::new(op.into())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn op(&self) -> &str {
        &self.op
    }

    pub fn attrs(&self) -> &AttributeSet {
        &self.attrs
    }

    pub fn shapes(&self) -> &ShapeSpec {
        &self.shapes
    }

    pub fn oracle(&self) -> &dyn ReferenceOracle {
        self.oracle.as_ref()
    }

    pub fn arity(&self) -> Option<Arity> {
        self.arity
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn tolerance(&self) -> Tolerance {
        self.tolerance
    }

    /// Value domain of each declared input, in order.
    pub fn input_domains(&self) -> Vec<ValueDomain> {
        (0..self.shapes.input_shapes.len())
            .map(|i| self.input_domains.get(&i).copied().unwrap_or(self.domain))
            .collect()
    }

    /// Caller-supplied inputs that replace synthesis, if any.
    pub fn fixed_inputs(&self) -> Option<&[Tensor]> {
        self.fixed_inputs.as_deref()
    }
}

impl std::fmt::Debug for TestScenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestScenario")
            .field("name", &self.name)
            .field("op", &self.op)
            .field("attrs", &self.attrs)
            .field("shapes", &self.shapes)
            .field("seed", &self.seed)
            .field("tolerance", &self.tolerance)
            .field("fixed_inputs", &self.fixed_inputs.is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for [`TestScenario`].
///
/// Without an explicit oracle the built-in oracle and arity for the operator
/// are used. Seed, tolerance and domain fall back to the harness config
/// (or its defaults) when not set individually.
pub struct TestScenarioBuilder {
    op: String,
    name: Option<String>,
    attrs: AttributeSet,
    inputs: Vec<Shape>,
    outputs: Option<Vec<Shape>>,
    oracle: Option<Arc<dyn ReferenceOracle>>,
    arity: Option<Arity>,
    config: HarnessConfig,
    seed: Option<u64>,
    tolerance: Option<Tolerance>,
    domain: Option<ValueDomain>,
    input_domains: BTreeMap<usize, ValueDomain>,
    fixed_inputs: Option<Vec<Tensor>>,
}

impl TestScenarioBuilder {
    fn new(op: String) -> Self {
        Self {
            op,
            name: None,
            attrs: AttributeSet::new(),
            inputs: Vec::new(),
            outputs: None,
            oracle: None,
            arity: None,
            config: HarnessConfig::default(),
            seed: None,
            tolerance: None,
            domain: None,
            input_domains: BTreeMap::new(),
            fixed_inputs: None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn attrs(mut self, attrs: AttributeSet) -> Self {
        self.attrs = attrs;
        self
    }

    pub fn inputs<S: Into<Shape>>(mut self, shapes: impl IntoIterator<Item = S>) -> Self {
        self.inputs = shapes.into_iter().map(Into::into).collect();
        self
    }

    /// Declared output shapes. Defaults to one output shaped like the first
    /// input.
    pub fn outputs<S: Into<Shape>>(mut self, shapes: impl IntoIterator<Item = S>) -> Self {
        self.outputs = Some(shapes.into_iter().map(Into::into).collect());
        self
    }

    pub fn oracle(mut self, oracle: impl ReferenceOracle + 'static) -> Self {
        self.oracle = Some(Arc::new(oracle));
        self
    }

    pub fn arity(mut self, arity: Arity) -> Self {
        self.arity = Some(arity);
        self
    }

    pub fn config(mut self, config: &HarnessConfig) -> Self {
        self.config = *config;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn tolerance(mut self, tolerance: Tolerance) -> Self {
        self.tolerance = Some(tolerance);
        self
    }

    /// Domain for every input without its own override.
    pub fn domain(mut self, domain: ValueDomain) -> Self {
        self.domain = Some(domain);
        self
    }

    pub fn input_domain(mut self, index: usize, domain: ValueDomain) -> Self {
        self.input_domains.insert(index, domain);
        self
    }

    /// Use these tensors instead of synthesized inputs.
    pub fn fixed_inputs(mut self, inputs: Vec<Tensor>) -> Self {
        self.fixed_inputs = Some(inputs);
        self
    }

    pub fn build(self) -> std::result::Result<TestScenario, OracleError> {
        let (oracle, arity) = match self.oracle {
            Some(oracle) => (oracle, self.arity),
            None => {
                let def = operator_def(&self.op)
                    .ok_or_else(|| OracleError::UnknownOperator(self.op.clone()))?;
                (def.oracle(&self.attrs)?, Some(self.arity.unwrap_or(def.arity)))
            }
        };
        let shapes = match self.outputs {
            Some(outputs) => ShapeSpec::new(self.inputs, outputs),
            None => ShapeSpec::same_as_input(self.inputs, arity.map_or(1, |a| a.outputs)),
        };
        Ok(TestScenario {
            name: self.name.unwrap_or_else(|| self.op.clone()),
            op: self.op,
            attrs: self.attrs,
            shapes,
            oracle,
            arity,
            seed: self.seed.unwrap_or(self.config.seed),
            tolerance: self.tolerance.unwrap_or(self.config.tolerance),
            domain: self.domain.unwrap_or(self.config.domain),
            input_domains: self.input_domains,
            fixed_inputs: self.fixed_inputs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_defaults() {
        let s = TestScenario::builder("relu").inputs([[32]]).build().unwrap();
        assert_eq!(s.name(), "relu");
        assert_eq!(s.seed(), 42);
        assert_eq!(s.tolerance(), Tolerance::default());
        assert_eq!(s.arity(), Some(Arity::new(1, 1)));
        assert_eq!(s.shapes().output_shapes(), &[Shape::new(vec![32])]);
        assert!(s.shapes().validate(s.arity()).is_ok());
    }

    #[test]
    fn test_config_and_overrides() {
        let config = HarnessConfig {
            seed: 9,
            tolerance: Tolerance::new(1e-3, 0.0),
            domain: ValueDomain::UNIT,
        };
        let wide = ValueDomain::new(-8.0, 8.0).unwrap();
        let s = TestScenario::builder("batchnorm")
            .seed(5)
            .config(&config)
            .inputs([vec![1, 3, 2, 2], vec![4, 3]])
            .input_domain(0, wide)
            .build()
            .unwrap();
        assert_eq!(s.seed(), 5);
        assert_eq!(s.tolerance(), Tolerance::new(1e-3, 0.0));
        assert_eq!(s.input_domains(), vec![wide, ValueDomain::UNIT]);
    }

    #[test]
    fn test_unknown_operator_needs_oracle() {
        let err = TestScenario::builder("gelu").inputs([[4]]).build().unwrap_err();
        assert_eq!(err, OracleError::UnknownOperator("gelu".into()));

        let s = TestScenario::builder("gelu")
            .inputs([[4]])
            .oracle(|inputs: &[Tensor]| vec![inputs[0].clone()])
            .build()
            .unwrap();
        assert_eq!(s.arity(), None);
        assert_eq!(s.shapes().output_shapes().len(), 1);
    }

    #[test]
    fn test_shape_spec_validation() {
        let ok = ShapeSpec::new(
            vec![Shape::new(vec![1, 3, 2, 2]), Shape::new(vec![4, 3])],
            vec![Shape::new(vec![1, 3, 2, 2])],
        );
        assert!(ok.validate(Some(Arity::new(2, 1))).is_ok());
        assert!(ok.validate(Some(Arity::new(1, 1))).is_err());
        assert!(ok.validate(Some(Arity::new(2, 2))).is_err());

        let zero = ShapeSpec::same_as_input(vec![Shape::new(vec![3, 0])], 1);
        assert!(matches!(zero.validate(None), Err(OpcError::InvalidShape { .. })));

        let rank0 = ShapeSpec::same_as_input(vec![Shape::new(vec![])], 1);
        assert!(rank0.validate(None).is_err());

        assert!(ShapeSpec::default().validate(None).is_err());
    }
}
