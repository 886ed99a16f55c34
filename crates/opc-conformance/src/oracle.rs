//! Reference oracles: trusted, straightforward implementations of each
//! operator's semantics.
//!
//! Oracles are written with plain index loops and accumulate in f64. They
//! share no code with any compiled backend, so agreement between the two is
//! meaningful.

use std::sync::Arc;

use opc_core::{AttrError, AttributeSet, Shape, Tensor};

use crate::scenario::Arity;

/// Computes expected outputs from a scenario's inputs.
///
/// Oracles never see malformed input counts or shapes: the driver validates
/// both before calling. An oracle handed inputs that contradict its own
/// operator's rank requirements panics, since that is a bug in the scenario.
pub trait ReferenceOracle: Send + Sync {
    fn reference(&self, inputs: &[Tensor]) -> Vec<Tensor>;
}

impl<F> ReferenceOracle for F
where
    F: Fn(&[Tensor]) -> Vec<Tensor> + Send + Sync,
{
    fn reference(&self, inputs: &[Tensor]) -> Vec<Tensor> {
        self(inputs)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum OracleError {
    #[error("no reference oracle for operator `{0}`")]
    UnknownOperator(String),

    #[error(transparent)]
    Attr(#[from] AttrError),

    #[error("attribute `{key}`: {reason}")]
    InvalidAttr { key: &'static str, reason: String },
}

// ── Oracles ─────────────────────────────────────────────────────────────

pub struct Relu;

impl ReferenceOracle for Relu {
    fn reference(&self, inputs: &[Tensor]) -> Vec<Tensor> {
        vec![inputs[0].map(|x| if x > 0.0 { x } else { 0.0 })]
    }
}

/// `min(max(x, 0), 6)`.
pub struct Relu6;

impl ReferenceOracle for Relu6 {
    fn reference(&self, inputs: &[Tensor]) -> Vec<Tensor> {
        vec![inputs[0].map(|x| {
            if x <= 0.0 {
                0.0
            } else if x >= 6.0 {
                6.0
            } else {
                x
            }
        })]
    }
}

pub struct Sigmoid;

impl ReferenceOracle for Sigmoid {
    fn reference(&self, inputs: &[Tensor]) -> Vec<Tensor> {
        vec![inputs[0].map(|x| (1.0 / (1.0 + (-(x as f64)).exp())) as f32)]
    }
}

/// `x * scale + bias`.
pub struct Scale {
    pub scale: f32,
    pub bias: f32,
}

impl ReferenceOracle for Scale {
    fn reference(&self, inputs: &[Tensor]) -> Vec<Tensor> {
        let (s, b) = (self.scale as f64, self.bias as f64);
        vec![inputs[0].map(|x| (x as f64 * s + b) as f32)]
    }
}

/// Addition of two tensors of identical shape.
pub struct ElementwiseAdd;

impl ReferenceOracle for ElementwiseAdd {
    fn reference(&self, inputs: &[Tensor]) -> Vec<Tensor> {
        let (a, b) = (&inputs[0], &inputs[1]);
        assert_eq!(a.shape(), b.shape(), "elementwise_add operands differ in shape");
        vec![Tensor::from_fn(a.shape(), |i| a.data()[i] + b.data()[i])]
    }
}

pub struct Softmax {
    pub axis: i64,
}

impl ReferenceOracle for Softmax {
    fn reference(&self, inputs: &[Tensor]) -> Vec<Tensor> {
        let x = &inputs[0];
        let shape = x.shape();
        let Some(axis) = shape.resolve_axis(self.axis) else {
            panic!("softmax axis {} out of range for {shape}", self.axis);
        };
        let len = shape.dims()[axis];
        let stride = shape.strides()[axis];

        let mut out = Tensor::zeros(shape);
        for flat in 0..x.numel() {
            let pos = shape.unravel(flat)[axis];
            let base = flat - pos * stride;
            let lane = (0..len).map(|k| x.data()[base + k * stride] as f64);
            let max = lane.clone().fold(f64::NEG_INFINITY, f64::max);
            let denom: f64 = lane.map(|v| (v - max).exp()).sum();
            out.data_mut()[flat] = ((x.data()[flat] as f64 - max).exp() / denom) as f32;
        }
        vec![out]
    }
}

/// Inference-mode batch normalization over NCHW input.
///
/// The second input stacks the per-channel parameters as rows
/// `[mean, variance, scale, bias]`, giving shape `[4, C]`.
pub struct BatchNorm {
    pub epsilon: f32,
}

impl ReferenceOracle for BatchNorm {
    fn reference(&self, inputs: &[Tensor]) -> Vec<Tensor> {
        let (x, params) = (&inputs[0], &inputs[1]);
        let dims = x.shape().dims();
        assert_eq!(dims.len(), 4, "batchnorm expects NCHW input, got {}", x.shape());
        let channels = dims[1];
        let eps = self.epsilon as f64;

        let out = Tensor::from_fn(x.shape(), |flat| {
            let c = x.shape().unravel(flat)[1];
            let p = |row: usize| params.data()[row * channels + c] as f64;
            let (mean, var, scale, bias) = (p(0), p(1), p(2), p(3));
            ((x.data()[flat] as f64 - mean) / (var + eps).sqrt() * scale + bias) as f32
        });
        vec![out]
    }
}

/// 2D convolution, NCHW input and OIHW weights, no bias.
pub struct Conv2d {
    pub stride: [usize; 2],
    pub padding: [usize; 2],
    pub dilation: [usize; 2],
    pub groups: usize,
}

impl Conv2d {
    fn out_dim(&self, axis: usize, input: usize, kernel: usize) -> usize {
        let span = self.dilation[axis] * (kernel - 1) + 1;
        let padded = input + 2 * self.padding[axis];
        assert!(span <= padded, "conv2d kernel span {span} exceeds padded input {padded}");
        (padded - span) / self.stride[axis] + 1
    }
}

impl ReferenceOracle for Conv2d {
    fn reference(&self, inputs: &[Tensor]) -> Vec<Tensor> {
        let (x, w) = (&inputs[0], &inputs[1]);
        let &[n, c, h, wd] = x.shape().dims() else {
            panic!("conv2d expects NCHW input, got {}", x.shape());
        };
        let &[o, cg, kh, kw] = w.shape().dims() else {
            panic!("conv2d expects OIHW weights, got {}", w.shape());
        };
        assert_eq!(c, cg * self.groups, "conv2d channel/group mismatch");

        let out_shape = Shape::new(vec![n, o, self.out_dim(0, h, kh), self.out_dim(1, wd, kw)]);
        let per_group = o / self.groups;

        let out = Tensor::from_fn(&out_shape, |flat| {
            let idx = out_shape.unravel(flat);
            let (b, oc, oy, ox) = (idx[0], idx[1], idx[2], idx[3]);
            let group = oc / per_group;
            let mut acc = 0.0f64;
            for ic in 0..cg {
                let in_c = group * cg + ic;
                for ky in 0..kh {
                    let iy = (oy * self.stride[0] + ky * self.dilation[0]) as isize
                        - self.padding[0] as isize;
                    if iy < 0 || iy >= h as isize {
                        continue;
                    }
                    for kx in 0..kw {
                        let ix = (ox * self.stride[1] + kx * self.dilation[1]) as isize
                            - self.padding[1] as isize;
                        if ix < 0 || ix >= wd as isize {
                            continue;
                        }
                        let xv = x.get(&[b, in_c, iy as usize, ix as usize]).unwrap_or(0.0);
                        let wv = w.get(&[oc, ic, ky, kx]).unwrap_or(0.0);
                        acc += xv as f64 * wv as f64;
                    }
                }
            }
            acc as f32
        });
        vec![out]
    }
}

// ── Operator registry ───────────────────────────────────────────────────

type BuildFn = fn(&AttributeSet) -> Result<Arc<dyn ReferenceOracle>, OracleError>;

/// A built-in operator: its name, input/output counts and oracle factory.
#[derive(Clone, Copy)]
pub struct OperatorDef {
    pub name: &'static str,
    pub arity: Arity,
    build: BuildFn,
}

impl OperatorDef {
    /// Build the oracle for one attribute set.
    pub fn oracle(&self, attrs: &AttributeSet) -> Result<Arc<dyn ReferenceOracle>, OracleError> {
        (self.build)(attrs)
    }
}

impl std::fmt::Debug for OperatorDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperatorDef")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}

const UNARY: Arity = Arity::new(1, 1);
const BINARY: Arity = Arity::new(2, 1);

pub const BUILTIN_OPERATORS: &[OperatorDef] = &[
    OperatorDef { name: "relu", arity: UNARY, build: build_relu },
    OperatorDef { name: "relu6", arity: UNARY, build: build_relu6 },
    OperatorDef { name: "sigmoid", arity: UNARY, build: build_sigmoid },
    OperatorDef { name: "scale", arity: UNARY, build: build_scale },
    OperatorDef { name: "elementwise_add", arity: BINARY, build: build_add },
    OperatorDef { name: "softmax", arity: UNARY, build: build_softmax },
    OperatorDef { name: "batchnorm", arity: BINARY, build: build_batchnorm },
    OperatorDef { name: "conv2d", arity: BINARY, build: build_conv2d },
];

/// Look up a built-in operator by name.
pub fn operator_def(name: &str) -> Option<&'static OperatorDef> {
    BUILTIN_OPERATORS.iter().find(|def| def.name == name)
}

/// Build the built-in oracle for `name` configured by `attrs`.
pub fn builtin_oracle(name: &str, attrs: &AttributeSet) -> Result<Arc<dyn ReferenceOracle>, OracleError> {
    operator_def(name)
        .ok_or_else(|| OracleError::UnknownOperator(name.to_string()))?
        .oracle(attrs)
}

fn build_relu(_: &AttributeSet) -> Result<Arc<dyn ReferenceOracle>, OracleError> {
    Ok(Arc::new(Relu))
}

fn build_relu6(_: &AttributeSet) -> Result<Arc<dyn ReferenceOracle>, OracleError> {
    Ok(Arc::new(Relu6))
}

fn build_sigmoid(_: &AttributeSet) -> Result<Arc<dyn ReferenceOracle>, OracleError> {
    Ok(Arc::new(Sigmoid))
}

fn build_add(_: &AttributeSet) -> Result<Arc<dyn ReferenceOracle>, OracleError> {
    Ok(Arc::new(ElementwiseAdd))
}

fn build_scale(attrs: &AttributeSet) -> Result<Arc<dyn ReferenceOracle>, OracleError> {
    Ok(Arc::new(Scale {
        scale: attrs.get_float_or("scale", 1.0)?,
        bias: attrs.get_float_or("bias", 0.0)?,
    }))
}

fn build_softmax(attrs: &AttributeSet) -> Result<Arc<dyn ReferenceOracle>, OracleError> {
    Ok(Arc::new(Softmax {
        axis: attrs.get_int_or("axis", -1)?,
    }))
}

fn build_batchnorm(attrs: &AttributeSet) -> Result<Arc<dyn ReferenceOracle>, OracleError> {
    let epsilon = attrs.get_float_or("epsilon", 1e-5)?;
    if !epsilon.is_finite() || epsilon < 0.0 {
        return Err(OracleError::InvalidAttr {
            key: "epsilon",
            reason: format!("expected a finite value >= 0, got {epsilon}"),
        });
    }
    Ok(Arc::new(BatchNorm { epsilon }))
}

fn build_conv2d(attrs: &AttributeSet) -> Result<Arc<dyn ReferenceOracle>, OracleError> {
    let groups = attrs.get_int_or("groups", 1)?;
    if groups < 1 {
        return Err(OracleError::InvalidAttr {
            key: "groups",
            reason: format!("expected >= 1, got {groups}"),
        });
    }
    Ok(Arc::new(Conv2d {
        stride: hw(attrs, "stride", 1, 1)?,
        padding: hw(attrs, "padding", 0, 0)?,
        dilation: hw(attrs, "dilation", 1, 1)?,
        groups: groups as usize,
    }))
}

/// Read an `[h, w]` attribute; a single value applies to both axes.
fn hw(attrs: &AttributeSet, key: &'static str, default: i64, min: i64) -> Result<[usize; 2], OracleError> {
    let values = attrs.get_ints_or(key, &[default])?;
    let pair = match values[..] {
        [v] => [v, v],
        [h, w] => [h, w],
        _ => {
            return Err(OracleError::InvalidAttr {
                key,
                reason: format!("expected 1 or 2 values, got {values:?}"),
            });
        }
    };
    if pair.iter().any(|&v| v < min) {
        return Err(OracleError::InvalidAttr {
            key,
            reason: format!("values must be >= {min}, got {values:?}"),
        });
    }
    Ok([pair[0] as usize, pair[1] as usize])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(data: &[f32], dims: &[usize]) -> Tensor {
        Tensor::from_f32(data, &Shape::new(dims.to_vec())).unwrap()
    }

    fn run(name: &str, attrs: AttributeSet, inputs: &[Tensor]) -> Vec<Tensor> {
        builtin_oracle(name, &attrs).unwrap().reference(inputs)
    }

    #[test]
    fn test_relu_family() {
        let x = t(&[-2.0, 0.0, 3.0, 7.0], &[4]);
        assert_eq!(run("relu", AttributeSet::new(), &[x.clone()])[0].data(), &[0.0, 0.0, 3.0, 7.0]);
        assert_eq!(run("relu6", AttributeSet::new(), &[x])[0].data(), &[0.0, 0.0, 3.0, 6.0]);
    }

    #[test]
    fn test_sigmoid_and_scale() {
        let x = t(&[0.0, 2.0], &[2]);
        let s = run("sigmoid", AttributeSet::new(), &[x.clone()]);
        assert_eq!(s[0].data()[0], 0.5);
        let out = run(
            "scale",
            AttributeSet::new().with("scale", 2.5).with("bias", -0.5),
            &[x],
        );
        assert_eq!(out[0].data(), &[-0.5, 4.5]);
    }

    #[test]
    fn test_softmax_middle_axis() {
        // [2, 2, 1]: softmax over axis 1 pairs (0, 1) and (2, 3).
        let x = t(&[0.0, 0.0, 1.0, 3.0], &[2, 2, 1]);
        let out = run("softmax", AttributeSet::new().with("axis", 1), &[x]);
        let d = out[0].data();
        assert!((d[0] - 0.5).abs() < 1e-6 && (d[1] - 0.5).abs() < 1e-6);
        assert!((d[2] + d[3] - 1.0).abs() < 1e-6);
        assert!(d[3] > d[2]);
    }

    #[test]
    fn test_batchnorm_formula() {
        let x = t(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0], &[1, 2, 2, 2]);
        // Channel 0: mean 1, var 4, scale 2, bias 0. Channel 1: identity.
        let params = t(&[1.0, 0.0, 4.0, 1.0, 2.0, 1.0, 0.0, 0.0], &[4, 2]);
        let out = run("batchnorm", AttributeSet::new().with("epsilon", 0.0), &[x, params]);
        assert_eq!(out[0].shape(), &Shape::new(vec![1, 2, 2, 2]));
        assert_eq!(out[0].data(), &[0.0, 1.0, 2.0, 3.0, 5.0, 6.0, 7.0, 8.0]);
    }

    #[test]
    fn test_conv2d_padding_stride_dilation() {
        let x = Tensor::full(&Shape::new(vec![1, 3, 10, 10]), 1.0);
        let w = Tensor::full(&Shape::new(vec![2, 3, 2, 2]), 1.0);
        let attrs = AttributeSet::new()
            .with("padding", [1, 1])
            .with("stride", [2, 2])
            .with("dilation", 2)
            .with("groups", 1);
        let out = run("conv2d", attrs, &[x, w]);
        assert_eq!(out[0].shape(), &Shape::new(vec![1, 2, 5, 5]));
        // Top-left window taps rows/cols {-1, 1}: only (1, 1) is in bounds.
        assert_eq!(out[0].get(&[0, 0, 0, 0]), Some(3.0));
        // Interior windows see all four taps on every channel.
        assert_eq!(out[0].get(&[0, 1, 2, 2]), Some(12.0));
    }

    #[test]
    fn test_registry() {
        assert_eq!(operator_def("batchnorm").unwrap().arity, Arity::new(2, 1));
        assert_eq!(BUILTIN_OPERATORS.len(), 8);
        assert!(matches!(
            builtin_oracle("gelu", &AttributeSet::new()),
            Err(OracleError::UnknownOperator(_))
        ));
        assert!(matches!(
            builtin_oracle("conv2d", &AttributeSet::new().with("stride", [0, 1])),
            Err(OracleError::InvalidAttr { key: "stride", .. })
        ));
        assert!(matches!(
            builtin_oracle("softmax", &AttributeSet::new().with("axis", 1.5)),
            Err(OracleError::Attr(_))
        ));
    }

    #[test]
    fn test_closure_oracle() {
        let double = |inputs: &[Tensor]| vec![inputs[0].map(|x| 2.0 * x)];
        let out = double.reference(&[t(&[1.0, -1.0], &[2])]);
        assert_eq!(out[0].data(), &[2.0, -2.0]);
    }
}
