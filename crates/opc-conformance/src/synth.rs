//! Seeded random input synthesis.

use opc_core::{OpcError, Result, Shape, Tensor};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

/// Half-open interval `[low, high)` that synthesized values are drawn from.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ValueDomain {
    low: f32,
    high: f32,
}

impl ValueDomain {
    /// `[-1, 1)`, the default for every input.
    pub const SYMMETRIC: ValueDomain = ValueDomain { low: -1.0, high: 1.0 };
    /// `[0, 1)`.
    pub const UNIT: ValueDomain = ValueDomain { low: 0.0, high: 1.0 };

    pub fn new(low: f32, high: f32) -> Result<Self> {
        if !(low.is_finite() && high.is_finite()) || low >= high {
            return Err(OpcError::InvalidArgument(format!(
                "value domain [{low}, {high}) must be finite and non-empty"
            )));
        }
        Ok(Self { low, high })
    }

    pub fn low(&self) -> f32 {
        self.low
    }

    pub fn high(&self) -> f32 {
        self.high
    }
}

impl Default for ValueDomain {
    fn default() -> Self {
        Self::SYMMETRIC
    }
}

impl std::fmt::Display for ValueDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.low, self.high)
    }
}

/// Produces random f32 tensors from a fixed seed.
///
/// The same seed, shapes and domains always yield bit-identical tensors.
pub struct InputSynthesizer {
    rng: StdRng,
    seed: u64,
}

impl InputSynthesizer {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            seed,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// One tensor of the given shape.
    pub fn tensor(&mut self, shape: &Shape, domain: ValueDomain) -> Result<Tensor> {
        shape.validate()?;
        let rng = &mut self.rng;
        Ok(Tensor::from_fn(shape, |_| {
            rng.random_range(domain.low..domain.high)
        }))
    }

    /// One tensor per shape, in order. Every shape is validated before any
    /// value is drawn.
    pub fn synthesize(&mut self, shapes: &[Shape], domains: &[ValueDomain]) -> Result<Vec<Tensor>> {
        if shapes.len() != domains.len() {
            return Err(OpcError::InvalidArgument(format!(
                "{} shapes but {} value domains",
                shapes.len(),
                domains.len()
            )));
        }
        for shape in shapes {
            shape.validate()?;
        }
        shapes
            .iter()
            .zip(domains)
            .map(|(shape, domain)| self.tensor(shape, *domain))
            .collect()
    }
}

impl std::fmt::Debug for InputSynthesizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputSynthesizer")
            .field("seed", &self.seed)
            .finish_non_exhaustive()
    }
}
