//! Shape inference for lowered ops.
//!
//! Given an [`OpKind`] and input shapes, computes the output shape. The CPU
//! compiler runs this once per program; a failure here is a compilation
//! error, never an execution error.

use opc_core::Shape;

use crate::ops::{Conv2dParams, OpKind};

/// Error returned when input shapes are incompatible with an op.
#[derive(Debug, thiserror::Error)]
pub enum ShapeError {
    #[error("shape mismatch: {0}")]
    Mismatch(String),

    #[error("invalid axis {axis} for ndim {ndim}")]
    InvalidAxis { axis: i64, ndim: usize },

    #[error("{op} expects a rank-{expected} input {index}, got {shape}")]
    Rank {
        op: &'static str,
        index: usize,
        expected: usize,
        shape: Shape,
    },
}

/// Infer the output shape for a given op and input shapes.
pub fn infer_shape(op: &OpKind, inputs: &[&Shape]) -> Result<Shape, ShapeError> {
    let x = *inputs
        .first()
        .ok_or(ShapeError::Mismatch("missing input 0".into()))?;

    match op {
        // Unary ops preserve shape.
        OpKind::Relu | OpKind::Relu6 | OpKind::Sigmoid | OpKind::Scale { .. } => Ok(x.clone()),

        OpKind::Softmax { axis } => {
            x.resolve_axis(*axis).ok_or(ShapeError::InvalidAxis {
                axis: *axis,
                ndim: x.ndim(),
            })?;
            Ok(x.clone())
        }

        // No broadcasting: both operands must have the same shape.
        OpKind::ElementwiseAdd => {
            let y = second(inputs)?;
            if x != y {
                return Err(ShapeError::Mismatch(format!("cannot add {x} and {y}")));
            }
            Ok(x.clone())
        }

        OpKind::BatchNorm { .. } => {
            require_rank(op, 0, x, 4)?;
            let params = second(inputs)?;
            let channels = x.0[1];
            if params.0 != [4, channels] {
                return Err(ShapeError::Mismatch(format!(
                    "batchnorm parameters must be [4, {channels}] for input {x}, got {params}"
                )));
            }
            Ok(x.clone())
        }

        OpKind::Conv2d(params) => {
            let w = second(inputs)?;
            require_rank(op, 0, x, 4)?;
            require_rank(op, 1, w, 4)?;
            conv2d_output_shape(x, w, params)
        }
    }
}

fn second<'a>(inputs: &[&'a Shape]) -> Result<&'a Shape, ShapeError> {
    inputs
        .get(1)
        .copied()
        .ok_or(ShapeError::Mismatch("missing input 1".into()))
}

fn require_rank(op: &OpKind, index: usize, shape: &Shape, expected: usize) -> Result<(), ShapeError> {
    if shape.ndim() != expected {
        return Err(ShapeError::Rank {
            op: op.name(),
            index,
            expected,
            shape: shape.clone(),
        });
    }
    Ok(())
}

/// `[N, C, H, W] ⊛ [O, C/g, KH, KW] → [N, O, OH, OW]`.
fn conv2d_output_shape(x: &Shape, w: &Shape, p: &Conv2dParams) -> Result<Shape, ShapeError> {
    let (n, c, h, wd) = (x.0[0], x.0[1], x.0[2], x.0[3]);
    let (o, cg, kh, kw) = (w.0[0], w.0[1], w.0[2], w.0[3]);

    if c % p.groups != 0 || o % p.groups != 0 {
        return Err(ShapeError::Mismatch(format!(
            "channels in={c} out={o} are not divisible by groups={}",
            p.groups
        )));
    }
    if cg * p.groups != c {
        return Err(ShapeError::Mismatch(format!(
            "weight {w} expects {} input channels, input {x} has {c}",
            cg * p.groups
        )));
    }

    let out_h = conv_out_dim(h, kh, p.stride[0], p.padding[0], p.dilation[0]);
    let out_w = conv_out_dim(wd, kw, p.stride[1], p.padding[1], p.dilation[1]);
    match (out_h, out_w) {
        (Some(oh), Some(ow)) => Ok(Shape::new(vec![n, o, oh, ow])),
        _ => Err(ShapeError::Mismatch(format!(
            "kernel {w} does not fit input {x} with {p:?}"
        ))),
    }
}

/// `(in + 2*pad - dilation*(k-1) - 1) / stride + 1`, or `None` if the
/// dilated kernel is larger than the padded input.
pub(crate) fn conv_out_dim(
    input: usize,
    kernel: usize,
    stride: usize,
    pad: usize,
    dilation: usize,
) -> Option<usize> {
    let padded = input + 2 * pad;
    let span = dilation * (kernel.checked_sub(1)?) + 1;
    let room = padded.checked_sub(span)?;
    Some(room / stride + 1)
}
