//! CPU kernels, the execution half of the CPU backend.
//!
//! Each kernel receives inputs whose shapes have already been checked against
//! the compiled program, so shape arithmetic here indexes without re-validating
//! ranks. Runtime conditions the compiler cannot see (e.g. a negative variance
//! in batchnorm parameters) are reported as [`ExecError`].

use opc_core::{Shape, Tensor};

use crate::ExecError;
use crate::ops::{Conv2dParams, OpKind};

/// Evaluate `op` over `inputs`, producing the flat output buffer.
pub fn eval(op: &OpKind, inputs: &[Tensor], output_shape: &Shape) -> Result<Vec<f32>, ExecError> {
    match op {
        OpKind::Relu => unary(inputs, |x| x.max(0.0)),
        OpKind::Relu6 => unary(inputs, |x| x.clamp(0.0, 6.0)),
        OpKind::Sigmoid => unary(inputs, sigmoid),
        OpKind::Scale { scale, bias } => {
            let (scale, bias) = (*scale, *bias);
            let a = require_input(inputs, 0)?;
            Ok(a.data().iter().map(|&x| x * scale + bias).collect())
        }
        OpKind::ElementwiseAdd => binary_elementwise(inputs, |a, b| a + b),
        OpKind::Softmax { axis } => softmax(inputs, *axis),
        OpKind::BatchNorm { epsilon } => batch_norm(inputs, *epsilon),
        OpKind::Conv2d(params) => conv2d(inputs, params, output_shape),
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

fn require_input(inputs: &[Tensor], idx: usize) -> Result<&Tensor, ExecError> {
    inputs.get(idx).ok_or(ExecError::InputCount {
        expected: idx + 1,
        got: inputs.len(),
    })
}

fn unary(inputs: &[Tensor], f: fn(f32) -> f32) -> Result<Vec<f32>, ExecError> {
    let a = require_input(inputs, 0)?;
    Ok(a.data().iter().map(|&x| f(x)).collect())
}

fn binary_elementwise(inputs: &[Tensor], f: fn(f32, f32) -> f32) -> Result<Vec<f32>, ExecError> {
    let a = require_input(inputs, 0)?;
    let b = require_input(inputs, 1)?;
    Ok(a.data()
        .iter()
        .zip(b.data())
        .map(|(&x, &y)| f(x, y))
        .collect())
}

/// Softmax along one axis. Each lane is the run of `len` elements spaced
/// `stride` apart that starts at an offset whose coordinate on the axis is 0.
fn softmax(inputs: &[Tensor], axis: i64) -> Result<Vec<f32>, ExecError> {
    let a = require_input(inputs, 0)?;
    let shape = a.shape();
    let ax = shape.resolve_axis(axis).ok_or_else(|| {
        ExecError::Numerical(format!("axis {axis} out of range for ndim {}", shape.ndim()))
    })?;
    let len = shape.dims()[ax];
    let stride = shape.strides()[ax];

    let mut out = a.data().to_vec();
    for start in (0..out.len()).filter(|i| (i / stride) % len == 0) {
        let lane = |k: usize| start + k * stride;
        let peak = (0..len).map(|k| out[lane(k)]).fold(f32::NEG_INFINITY, f32::max);
        let mut total = 0.0f32;
        for k in 0..len {
            let e = (out[lane(k)] - peak).exp();
            out[lane(k)] = e;
            total += e;
        }
        for k in 0..len {
            out[lane(k)] /= total;
        }
    }
    Ok(out)
}

/// Batch normalization folded into a per-channel affine `x * a + b` with
/// `a = scale / sqrt(var + eps)` and `b = bias - mean * a`.
fn batch_norm(inputs: &[Tensor], epsilon: f32) -> Result<Vec<f32>, ExecError> {
    let x = require_input(inputs, 0)?;
    let p = require_input(inputs, 1)?;
    let channels = x.shape().0[1];
    let spatial: usize = x.shape().0[2..].iter().product();
    let params = p.data();
    let row = |r: usize, ch: usize| params[r * channels + ch];

    let mut mul = Vec::with_capacity(channels);
    let mut add = Vec::with_capacity(channels);
    for ch in 0..channels {
        let denom = row(1, ch) + epsilon;
        if denom.is_nan() || denom <= 0.0 {
            return Err(ExecError::Numerical(format!(
                "channel {ch}: variance {} + epsilon {epsilon} is not positive",
                row(1, ch)
            )));
        }
        let a = row(2, ch) / denom.sqrt();
        mul.push(a);
        add.push(row(3, ch) - row(0, ch) * a);
    }

    Ok(x.data()
        .iter()
        .enumerate()
        .map(|(i, &v)| {
            let ch = (i / spatial) % channels;
            v * mul[ch] + add[ch]
        })
        .collect())
}

/// Direct convolution over an explicitly zero-padded copy of the input.
fn conv2d(inputs: &[Tensor], p: &Conv2dParams, output_shape: &Shape) -> Result<Vec<f32>, ExecError> {
    let x = require_input(inputs, 0)?;
    let w = require_input(inputs, 1)?;
    let (n, c, h, wd) = (x.shape().0[0], x.shape().0[1], x.shape().0[2], x.shape().0[3]);
    let (o, cg, kh, kw) = (w.shape().0[0], w.shape().0[1], w.shape().0[2], w.shape().0[3]);
    let (oh, ow) = (output_shape.0[2], output_shape.0[3]);
    let [sh, sw] = p.stride;
    let [ph, pw] = p.padding;
    let [dh, dw] = p.dilation;
    let og = o / p.groups;

    let (hp, wp) = (h + 2 * ph, wd + 2 * pw);
    let mut padded = vec![0.0f32; n * c * hp * wp];
    for plane in 0..n * c {
        for row in 0..h {
            let src = plane * h * wd + row * wd;
            let dst = plane * hp * wp + (row + ph) * wp + pw;
            padded[dst..dst + wd].copy_from_slice(&x.data()[src..src + wd]);
        }
    }

    let wdata = w.data();
    let mut out = vec![0.0f32; n * o * oh * ow];
    for b in 0..n {
        for oc in 0..o {
            let group = oc / og;
            for y in 0..oh {
                for xo in 0..ow {
                    let mut acc = 0.0f32;
                    for ic in 0..cg {
                        let in_c = group * cg + ic;
                        let plane = (b * c + in_c) * hp * wp;
                        let wbase = (oc * cg + ic) * kh * kw;
                        for ky in 0..kh {
                            let row = plane + (y * sh + ky * dh) * wp;
                            for kx in 0..kw {
                                acc += padded[row + xo * sw + kx * dw] * wdata[wbase + ky * kw + kx];
                            }
                        }
                    }
                    out[((b * o + oc) * oh + y) * ow + xo] = acc;
                }
            }
        }
    }
    Ok(out)
}
