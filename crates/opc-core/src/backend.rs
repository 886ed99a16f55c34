//! The boundary to a tensor compiler under test.
//!
//! An adapter takes an operator name, its attributes and concrete inputs,
//! compiles the operator for its target and runs it. Everything behind this
//! trait (IR, scheduling, code generation, execution engine) is opaque to the
//! conformance driver.

use crate::{AttributeSet, Tensor};

/// Failure reported by a [`CompileExecuteAdapter`].
///
/// Both variants carry the operator name and attributes that triggered them
/// so a failing scenario can be reproduced from the error alone.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum AdapterError {
    #[error("compilation of `{op}` with attrs {attrs} failed: {reason}")]
    Compilation {
        op: String,
        attrs: AttributeSet,
        reason: String,
    },

    #[error("execution of `{op}` with attrs {attrs} failed: {reason}")]
    Execution {
        op: String,
        attrs: AttributeSet,
        reason: String,
    },
}

impl AdapterError {
    pub fn compilation(op: &str, attrs: &AttributeSet, reason: impl Into<String>) -> Self {
        AdapterError::Compilation {
            op: op.into(),
            attrs: attrs.clone(),
            reason: reason.into(),
        }
    }

    pub fn execution(op: &str, attrs: &AttributeSet, reason: impl Into<String>) -> Self {
        AdapterError::Execution {
            op: op.into(),
            attrs: attrs.clone(),
            reason: reason.into(),
        }
    }

    /// Name of the operator that failed.
    pub fn op(&self) -> &str {
        match self {
            AdapterError::Compilation { op, .. } | AdapterError::Execution { op, .. } => op,
        }
    }
}

/// Compile-and-run capability of an external tensor compiler.
///
/// Calls are synchronous. Inputs are passed by value: the adapter owns its
/// copy and cannot affect any other consumer of the same data.
pub trait CompileExecuteAdapter {
    /// Short identifier used in reports and logs.
    fn name(&self) -> &str;

    /// Compile `op` with `attrs` and run it on `inputs`, returning the
    /// operator's outputs in declaration order.
    fn compile_and_run(
        &self,
        op: &str,
        attrs: &AttributeSet,
        inputs: Vec<Tensor>,
    ) -> Result<Vec<Tensor>, AdapterError>;
}

impl<A: CompileExecuteAdapter + ?Sized> CompileExecuteAdapter for &A {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn compile_and_run(
        &self,
        op: &str,
        attrs: &AttributeSet,
        inputs: Vec<Tensor>,
    ) -> Result<Vec<Tensor>, AdapterError> {
        (**self).compile_and_run(op, attrs, inputs)
    }
}

impl<A: CompileExecuteAdapter + ?Sized> CompileExecuteAdapter for Box<A> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn compile_and_run(
        &self,
        op: &str,
        attrs: &AttributeSet,
        inputs: Vec<Tensor>,
    ) -> Result<Vec<Tensor>, AdapterError> {
        (**self).compile_and_run(op, attrs, inputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Shape;

    struct Identity;

    impl CompileExecuteAdapter for Identity {
        fn name(&self) -> &str {
            "identity"
        }

        fn compile_and_run(
            &self,
            op: &str,
            attrs: &AttributeSet,
            inputs: Vec<Tensor>,
        ) -> Result<Vec<Tensor>, AdapterError> {
            if op != "identity" {
                return Err(AdapterError::compilation(op, attrs, "unsupported operator"));
            }
            Ok(inputs)
        }
    }

    #[test]
    fn test_adapter_through_box_and_ref() {
        let boxed: Box<dyn CompileExecuteAdapter> = Box::new(Identity);
        let x = Tensor::zeros(&Shape::new(vec![2]));
        let out = (&boxed)
            .compile_and_run("identity", &AttributeSet::new(), vec![x.clone()])
            .unwrap();
        assert_eq!(out, vec![x]);
        assert_eq!(boxed.name(), "identity");
    }

    #[test]
    fn test_error_carries_op_and_attrs() {
        let attrs = AttributeSet::new().with("axis", 1);
        let err = Identity
            .compile_and_run("softmax", &attrs, Vec::new())
            .unwrap_err();
        assert_eq!(err.op(), "softmax");
        let msg = err.to_string();
        assert!(msg.contains("softmax") && msg.contains("axis=1"), "{msg}");
    }
}
