//! Elementwise tolerance comparison of expected vs. actual tensors.
//!
//! An element pair passes when `|expected - actual| <= atol + rtol * |expected|`.
//! NaN only matches NaN; a NaN against a number counts as an infinite
//! difference. Equal infinities match.

use opc_core::{OpcError, Tensor};
use serde::{Deserialize, Serialize};

/// Allowed numerical deviation between reference and compiled outputs.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tolerance {
    pub atol: f32,
    pub rtol: f32,
}

impl Tolerance {
    pub const DEFAULT_ATOL: f32 = 1e-4;
    pub const DEFAULT_RTOL: f32 = 1e-5;

    pub fn new(atol: f32, rtol: f32) -> Self {
        Self { atol, rtol }
    }

    /// Exact equality (NaN still matches NaN).
    pub fn exact() -> Self {
        Self::new(0.0, 0.0)
    }

    /// Allowed deviation for a given expected value.
    pub fn bound(&self, expected: f32) -> f32 {
        self.atol + self.rtol * expected.abs()
    }

    /// Whether `actual` is within tolerance of `expected`.
    ///
    /// A non-finite difference only passes when it is zero, so an infinite
    /// or NaN `expected` never widens its own bound.
    pub fn allows(&self, expected: f32, actual: f32) -> bool {
        let diff = abs_diff(expected, actual);
        diff == 0.0 || (diff.is_finite() && diff <= self.bound(expected))
    }
}

impl Default for Tolerance {
    fn default() -> Self {
        Self::new(Self::DEFAULT_ATOL, Self::DEFAULT_RTOL)
    }
}

/// First element that violated the tolerance, plus the worst deviation seen
/// anywhere in the tensor.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Mismatch {
    pub index: Vec<usize>,
    pub flat_index: usize,
    pub expected: f32,
    pub actual: f32,
    pub abs_diff: f32,
    pub bound: f32,
    pub max_abs_diff: f32,
}

impl std::fmt::Display for Mismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "at index [")?;
        for (i, d) in self.index.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{d}")?;
        }
        write!(
            f,
            "]: expected {}, actual {} (|diff| {} > {}; max |diff| {})",
            self.expected, self.actual, self.abs_diff, self.bound, self.max_abs_diff
        )
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Comparison {
    Match { max_abs_diff: f32 },
    Mismatch(Mismatch),
}

impl Comparison {
    pub fn is_match(&self) -> bool {
        matches!(self, Comparison::Match { .. })
    }

    pub fn max_abs_diff(&self) -> f32 {
        match self {
            Comparison::Match { max_abs_diff } => *max_abs_diff,
            Comparison::Mismatch(m) => m.max_abs_diff,
        }
    }
}

/// |a - b| with NaN and infinity handled as described in the module docs.
pub fn abs_diff(a: f32, b: f32) -> f32 {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => 0.0,
        (true, false) | (false, true) => f32::INFINITY,
        (false, false) if a == b => 0.0,
        (false, false) => (a - b).abs(),
    }
}

/// Compare `actual` against `expected`.
///
/// Shapes must be identical; nothing is broadcast or reshaped.
pub fn compare(expected: &Tensor, actual: &Tensor, tol: &Tolerance) -> Result<Comparison, OpcError> {
    if expected.shape() != actual.shape() {
        return Err(OpcError::ShapeMismatch {
            expected: expected.shape().clone(),
            got: actual.shape().clone(),
        });
    }

    let mut first: Option<(usize, f32, f32, f32)> = None;
    let mut max_abs_diff = 0.0f32;
    for (i, (&e, &a)) in expected.data().iter().zip(actual.data()).enumerate() {
        let diff = abs_diff(e, a);
        max_abs_diff = max_abs_diff.max(diff);
        if first.is_none() && !tol.allows(e, a) {
            first = Some((i, e, a, diff));
        }
    }

    Ok(match first {
        None => Comparison::Match { max_abs_diff },
        Some((flat_index, e, a, diff)) => Comparison::Mismatch(Mismatch {
            index: expected.shape().unravel(flat_index),
            flat_index,
            expected: e,
            actual: a,
            abs_diff: diff,
            bound: tol.bound(e),
            max_abs_diff,
        }),
    })
}

/// Assert two f32 slices are element-wise close (`b` is the expected side).
pub fn assert_allclose(a: &[f32], b: &[f32], atol: f32, rtol: f32) {
    assert_eq!(
        a.len(),
        b.len(),
        "length mismatch: actual={} expected={}",
        a.len(),
        b.len()
    );
    let tol = Tolerance::new(atol, rtol);
    for (i, (&x, &y)) in a.iter().zip(b).enumerate() {
        assert!(
            tol.allows(y, x),
            "mismatch at [{i}]: actual={x} expected={y} diff={} tol={}",
            abs_diff(y, x),
            tol.bound(y)
        );
    }
}
