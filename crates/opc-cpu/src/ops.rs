//! Operator lowering: operator name + attributes → [`OpKind`].
//!
//! This is the front half of the CPU compiler. Unknown operators, missing or
//! ill-typed attributes and out-of-range attribute values are rejected here,
//! before any shape is looked at.

use opc_core::AttributeSet;

use crate::CompileError;

/// Spatial parameters of a 2D convolution, as (height, width) pairs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Conv2dParams {
    pub stride: [usize; 2],
    pub padding: [usize; 2],
    pub dilation: [usize; 2],
    pub groups: usize,
}

/// The set of operations the CPU backend can compile.
#[derive(Clone, Debug, PartialEq)]
pub enum OpKind {
    // ── Activations ─────────────────────────────────────────────────────
    Relu,
    Relu6,
    Sigmoid,
    Softmax { axis: i64 },

    // ── Elementwise ─────────────────────────────────────────────────────
    /// `x * scale + bias`.
    Scale { scale: f32, bias: f32 },
    ElementwiseAdd,

    // ── Normalization ───────────────────────────────────────────────────
    /// Inputs: X [N, C, H, W] and stacked parameters [4, C] holding
    /// mean, variance, scale and bias rows.
    BatchNorm { epsilon: f32 },

    // ── Convolution ─────────────────────────────────────────────────────
    /// Inputs: X [N, C, H, W] and weights [O, C / groups, KH, KW].
    Conv2d(Conv2dParams),
}

pub const DEFAULT_BATCHNORM_EPSILON: f32 = 1e-5;

impl OpKind {
    /// Lower an operator name and its attributes.
    pub fn lower(name: &str, attrs: &AttributeSet) -> Result<Self, CompileError> {
        let op = match name {
            "relu" => OpKind::Relu,
            "relu6" => OpKind::Relu6,
            "sigmoid" => OpKind::Sigmoid,
            "softmax" => OpKind::Softmax {
                axis: attrs.get_int_or("axis", -1)?,
            },
            "scale" => OpKind::Scale {
                scale: attrs.get_float_or("scale", 1.0)?,
                bias: attrs.get_float_or("bias", 0.0)?,
            },
            "elementwise_add" => OpKind::ElementwiseAdd,
            "batchnorm" => {
                let epsilon = attrs.get_float_or("epsilon", DEFAULT_BATCHNORM_EPSILON)?;
                if !(epsilon.is_finite() && epsilon >= 0.0) {
                    return Err(CompileError::InvalidAttr {
                        key: "epsilon",
                        reason: format!("must be a finite non-negative value, got {epsilon}"),
                    });
                }
                OpKind::BatchNorm { epsilon }
            }
            "conv2d" => OpKind::Conv2d(Conv2dParams {
                stride: pair(attrs, "stride", 1, 1)?,
                padding: pair(attrs, "padding", 0, 0)?,
                dilation: pair(attrs, "dilation", 1, 1)?,
                groups: positive(attrs.get_int_or("groups", 1)?, "groups")?,
            }),
            other => return Err(CompileError::UnsupportedOp(other.to_string())),
        };
        Ok(op)
    }

    /// Number of inputs the operator consumes.
    pub fn num_inputs(&self) -> usize {
        match self {
            OpKind::ElementwiseAdd | OpKind::BatchNorm { .. } | OpKind::Conv2d(_) => 2,
            _ => 1,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            OpKind::Relu => "relu",
            OpKind::Relu6 => "relu6",
            OpKind::Sigmoid => "sigmoid",
            OpKind::Softmax { .. } => "softmax",
            OpKind::Scale { .. } => "scale",
            OpKind::ElementwiseAdd => "elementwise_add",
            OpKind::BatchNorm { .. } => "batchnorm",
            OpKind::Conv2d(_) => "conv2d",
        }
    }
}

/// Read an (h, w) attribute given either as a scalar or a two-element list.
fn pair(
    attrs: &AttributeSet,
    key: &'static str,
    default: i64,
    min: i64,
) -> Result<[usize; 2], CompileError> {
    let values = attrs.get_ints_or(key, &[default])?;
    let (h, w) = match values.as_slice() {
        [v] => (*v, *v),
        [h, w] => (*h, *w),
        _ => {
            return Err(CompileError::InvalidAttr {
                key,
                reason: format!("expected 1 or 2 values, got {}", values.len()),
            });
        }
    };
    if h < min || w < min {
        return Err(CompileError::InvalidAttr {
            key,
            reason: format!("values must be >= {min}, got [{h}, {w}]"),
        });
    }
    Ok([h as usize, w as usize])
}

fn positive(value: i64, key: &'static str) -> Result<usize, CompileError> {
    if value < 1 {
        return Err(CompileError::InvalidAttr {
            key,
            reason: format!("must be >= 1, got {value}"),
        });
    }
    Ok(value as usize)
}

/// Hashable key for an [`OpKind`] (floats compared by bit pattern).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) enum OpKey {
    Relu,
    Relu6,
    Sigmoid,
    Softmax { axis: i64 },
    Scale { scale_bits: u32, bias_bits: u32 },
    ElementwiseAdd,
    BatchNorm { epsilon_bits: u32 },
    Conv2d(Conv2dParams),
}

impl OpKey {
    pub(crate) fn from_op(op: &OpKind) -> Self {
        match op {
            OpKind::Relu => OpKey::Relu,
            OpKind::Relu6 => OpKey::Relu6,
            OpKind::Sigmoid => OpKey::Sigmoid,
            OpKind::Softmax { axis } => OpKey::Softmax { axis: *axis },
            OpKind::Scale { scale, bias } => OpKey::Scale {
                scale_bits: scale.to_bits(),
                bias_bits: bias.to_bits(),
            },
            OpKind::ElementwiseAdd => OpKey::ElementwiseAdd,
            OpKind::BatchNorm { epsilon } => OpKey::BatchNorm {
                epsilon_bits: epsilon.to_bits(),
            },
            OpKind::Conv2d(params) => OpKey::Conv2d(*params),
        }
    }
}
