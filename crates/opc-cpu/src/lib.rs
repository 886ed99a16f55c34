//! Pure Rust CPU backend: a reference compile-and-execute adapter.
//!
//! `CpuBackend` implements [`CompileExecuteAdapter`] as a two-phase pipeline:
//!
//! 1. **compile**: lower the operator name and attributes to an [`OpKind`],
//!    infer output shapes and cache the resulting [`Program`];
//! 2. **execute**: check the inputs against the program and run the kernel.
//!
//! Kernels favour clarity over speed. They are written independently of the
//! reference oracles in `opc-conformance` so the two paths can check each
//! other.

pub mod kernels;
pub mod ops;
pub mod shape_inference;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use opc_core::{AdapterError, AttrError, AttributeSet, CompileExecuteAdapter, OpcError, Shape, Tensor};
use smallvec::SmallVec;
use tracing::debug;

pub use ops::{Conv2dParams, OpKind};
pub use shape_inference::{ShapeError, infer_shape};

use ops::OpKey;

/// Error raised while compiling an operator; surfaces as
/// [`AdapterError::Compilation`].
#[derive(thiserror::Error, Debug)]
pub enum CompileError {
    #[error("unsupported operator `{0}`")]
    UnsupportedOp(String),

    #[error("`{op}` expects {expected} inputs, got {got}")]
    Arity {
        op: &'static str,
        expected: usize,
        got: usize,
    },

    #[error(transparent)]
    Attr(#[from] AttrError),

    #[error("invalid attribute `{key}`: {reason}")]
    InvalidAttr { key: &'static str, reason: String },

    #[error(transparent)]
    Shape(#[from] ShapeError),
}

/// Error raised while running a compiled program; surfaces as
/// [`AdapterError::Execution`].
#[derive(thiserror::Error, Debug)]
pub enum ExecError {
    #[error("expected {expected} inputs, got {got}")]
    InputCount { expected: usize, got: usize },

    #[error("input {index} has shape {got}, program was compiled for {expected}")]
    InputShape {
        index: usize,
        expected: Shape,
        got: Shape,
    },

    #[error("numerical failure: {0}")]
    Numerical(String),

    #[error(transparent)]
    Output(#[from] OpcError),
}

/// A compiled operator, specialized to concrete input shapes.
#[derive(Clone, Debug)]
pub struct Program {
    pub op: OpKind,
    pub input_shapes: Vec<Shape>,
    pub output_shape: Shape,
}

impl Program {
    /// Run the program. Inputs must match the shapes it was compiled for.
    pub fn run(&self, inputs: &[Tensor]) -> Result<Vec<Tensor>, ExecError> {
        if inputs.len() != self.input_shapes.len() {
            return Err(ExecError::InputCount {
                expected: self.input_shapes.len(),
                got: inputs.len(),
            });
        }
        for (index, (input, expected)) in inputs.iter().zip(&self.input_shapes).enumerate() {
            if input.shape() != expected {
                return Err(ExecError::InputShape {
                    index,
                    expected: expected.clone(),
                    got: input.shape().clone(),
                });
            }
        }
        let data = kernels::eval(&self.op, inputs, &self.output_shape)?;
        Ok(vec![Tensor::from_vec(data, self.output_shape.clone())?])
    }
}

/// Cache key: lowered op plus the input shapes it was specialized for.
#[derive(Clone, PartialEq, Eq, Hash)]
struct ProgramKey {
    op: OpKey,
    input_shapes: SmallVec<[Shape; 2]>,
}

/// Reference CPU compile-and-execute backend.
#[derive(Default)]
pub struct CpuBackend {
    programs: Mutex<HashMap<ProgramKey, Arc<Program>>>,
}

impl CpuBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile `op` for the given input shapes, reusing a cached program
    /// when one exists.
    pub fn compile(
        &self,
        op: &str,
        attrs: &AttributeSet,
        input_shapes: &[&Shape],
    ) -> Result<Arc<Program>, CompileError> {
        let kind = OpKind::lower(op, attrs)?;
        if input_shapes.len() != kind.num_inputs() {
            return Err(CompileError::Arity {
                op: kind.name(),
                expected: kind.num_inputs(),
                got: input_shapes.len(),
            });
        }

        let key = ProgramKey {
            op: OpKey::from_op(&kind),
            input_shapes: input_shapes.iter().map(|s| (*s).clone()).collect(),
        };
        let mut programs = self.programs.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(program) = programs.get(&key) {
            debug!(op, "program cache hit");
            return Ok(Arc::clone(program));
        }

        let output_shape = infer_shape(&kind, input_shapes)?;
        debug!(op, output = %output_shape, "compiled program");
        let program = Arc::new(Program {
            op: kind,
            input_shapes: key.input_shapes.to_vec(),
            output_shape,
        });
        programs.insert(key, Arc::clone(&program));
        Ok(program)
    }

    /// Number of programs currently cached.
    pub fn cached_programs(&self) -> usize {
        self.programs.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl std::fmt::Debug for CpuBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpuBackend").finish_non_exhaustive()
    }
}

impl CompileExecuteAdapter for CpuBackend {
    fn name(&self) -> &str {
        "cpu-ref"
    }

    fn compile_and_run(
        &self,
        op: &str,
        attrs: &AttributeSet,
        inputs: Vec<Tensor>,
    ) -> Result<Vec<Tensor>, AdapterError> {
        let shapes: Vec<&Shape> = inputs.iter().map(Tensor::shape).collect();
        let program = self
            .compile(op, attrs, &shapes)
            .map_err(|e| AdapterError::compilation(op, attrs, e.to_string()))?;
        program
            .run(&inputs)
            .map_err(|e| AdapterError::execution(op, attrs, e.to_string()))
    }
}

/// Create a boxed CPU backend, ready to hand to a conformance driver.
pub fn cpu_backend() -> Box<dyn CompileExecuteAdapter> {
    Box::new(CpuBackend::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_caches_programs() {
        let backend = CpuBackend::new();
        let shape = Shape::new(vec![32]);
        let a = backend.compile("relu", &AttributeSet::new(), &[&shape]).unwrap();
        let b = backend.compile("relu", &AttributeSet::new(), &[&shape]).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(backend.cached_programs(), 1);

        let other = Shape::new(vec![32, 32]);
        backend.compile("relu", &AttributeSet::new(), &[&other]).unwrap();
        assert_eq!(backend.cached_programs(), 2);
    }

    #[test]
    fn test_attrs_are_part_of_cache_key() {
        let backend = CpuBackend::new();
        let x = Shape::new(vec![1, 3, 2, 2]);
        let p = Shape::new(vec![4, 3]);
        let eps5 = AttributeSet::new().with("epsilon", 1e-5f32);
        let eps3 = AttributeSet::new().with("epsilon", 1e-3f32);
        let a = backend.compile("batchnorm", &eps5, &[&x, &p]).unwrap();
        let b = backend.compile("batchnorm", &eps3, &[&x, &p]).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_arity_is_compile_error() {
        let backend = CpuBackend::new();
        let s = Shape::new(vec![4]);
        let err = backend
            .compile("elementwise_add", &AttributeSet::new(), &[&s])
            .unwrap_err();
        assert!(matches!(err, CompileError::Arity { expected: 2, got: 1, .. }));
    }

    #[test]
    fn test_program_rejects_wrong_input_shape() {
        let backend = CpuBackend::new();
        let program = backend
            .compile("relu", &AttributeSet::new(), &[&Shape::new(vec![4])])
            .unwrap();
        let wrong = Tensor::zeros(&Shape::new(vec![2, 2]));
        assert!(matches!(
            program.run(&[wrong]),
            Err(ExecError::InputShape { index: 0, .. })
        ));
    }

    #[test]
    fn test_adapter_maps_errors() {
        let backend = CpuBackend::new();
        let attrs = AttributeSet::new();
        let err = backend
            .compile_and_run("no_such_op", &attrs, vec![Tensor::zeros(&Shape::new(vec![1]))])
            .unwrap_err();
        assert!(matches!(err, AdapterError::Compilation { .. }));

        let x = Tensor::zeros(&Shape::new(vec![1, 1, 1, 1]));
        let p = Tensor::from_f32(&[0.0, -1.0, 1.0, 0.0], &Shape::new(vec![4, 1])).unwrap();
        let err = backend.compile_and_run("batchnorm", &attrs, vec![x, p]).unwrap_err();
        assert!(matches!(err, AdapterError::Execution { .. }));
    }
}
