//! Fault-injecting adapter shared by the integration tests.

#![allow(dead_code)]

use opc_core::{AdapterError, AttributeSet, CompileExecuteAdapter, Shape, Tensor};
use opc_cpu::CpuBackend;

/// How [`Faulty`] corrupts the CPU backend's behavior.
#[derive(Clone, Debug)]
pub enum Fault {
    /// Every output is replaced by zeros of the same shape.
    ZeroOutputs,
    /// `relu6` is compiled as `relu`.
    NoUpperClamp,
    /// `batchnorm` is compiled with this epsilon instead of the requested one.
    BatchNormEpsilon(f32),
    /// Outputs are flattened to rank 1.
    FlattenOutputs,
    /// An extra copy of the first output is appended.
    ExtraOutput,
    RejectCompile(&'static str),
    FailExecution(&'static str),
}

pub struct Faulty {
    inner: CpuBackend,
    fault: Fault,
}

impl Faulty {
    pub fn new(fault: Fault) -> Self {
        Self {
            inner: CpuBackend::new(),
            fault,
        }
    }
}

impl CompileExecuteAdapter for Faulty {
    fn name(&self) -> &str {
        "faulty-cpu"
    }

    fn compile_and_run(
        &self,
        op: &str,
        attrs: &AttributeSet,
        inputs: Vec<Tensor>,
    ) -> Result<Vec<Tensor>, AdapterError> {
        match &self.fault {
            Fault::ZeroOutputs => Ok(self
                .inner
                .compile_and_run(op, attrs, inputs)?
                .iter()
                .map(|t| Tensor::zeros(t.shape()))
                .collect()),
            Fault::NoUpperClamp if op == "relu6" => self.inner.compile_and_run("relu", attrs, inputs),
            Fault::BatchNormEpsilon(eps) if op == "batchnorm" => {
                let attrs = attrs.clone().with("epsilon", *eps);
                self.inner.compile_and_run(op, &attrs, inputs)
            }
            Fault::FlattenOutputs => self
                .inner
                .compile_and_run(op, attrs, inputs)?
                .into_iter()
                .map(|t| {
                    let flat = Shape::new(vec![t.numel()]);
                    Tensor::from_vec(t.into_data(), flat)
                        .map_err(|e| AdapterError::execution(op, attrs, e.to_string()))
                })
                .collect(),
            Fault::ExtraOutput => {
                let mut outputs = self.inner.compile_and_run(op, attrs, inputs)?;
                outputs.push(outputs[0].clone());
                Ok(outputs)
            }
            Fault::RejectCompile(reason) => Err(AdapterError::compilation(op, attrs, *reason)),
            Fault::FailExecution(reason) => Err(AdapterError::execution(op, attrs, *reason)),
            _ => self.inner.compile_and_run(op, attrs, inputs),
        }
    }
}

pub fn tensor(dims: &[usize], f: impl FnMut(usize) -> f32) -> Tensor {
    Tensor::from_fn(&Shape::new(dims.to_vec()), f)
}
