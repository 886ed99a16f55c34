//! Harness configuration: seed, tolerance and default value domain.

use serde::Serialize;
use tracing::warn;

use crate::compare::Tolerance;
use crate::synth::ValueDomain;

pub const SEED_ENV: &str = "OPC_SEED";
pub const ATOL_ENV: &str = "OPC_ATOL";
pub const RTOL_ENV: &str = "OPC_RTOL";

pub const DEFAULT_SEED: u64 = 42;

/// Defaults applied to scenarios that don't set their own values.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct HarnessConfig {
    pub seed: u64,
    pub tolerance: Tolerance,
    pub domain: ValueDomain,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED,
            tolerance: Tolerance::default(),
            domain: ValueDomain::SYMMETRIC,
        }
    }
}

impl HarnessConfig {
    /// Defaults, overridden by `OPC_SEED`, `OPC_ATOL` and `OPC_RTOL`.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a key lookup. Unparseable values are logged and
    /// ignored.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(seed) = parse(&lookup, SEED_ENV, |s| s.parse::<u64>().ok()) {
            self.seed = seed;
        }
        if let Some(atol) = parse(&lookup, ATOL_ENV, non_negative) {
            self.tolerance.atol = atol;
        }
        if let Some(rtol) = parse(&lookup, RTOL_ENV, non_negative) {
            self.tolerance.rtol = rtol;
        }
        self
    }
}

fn non_negative(s: &str) -> Option<f32> {
    s.parse::<f32>().ok().filter(|v| v.is_finite() && *v >= 0.0)
}

fn parse<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    parse_value: impl Fn(&str) -> Option<T>,
) -> Option<T> {
    let raw = lookup(key)?;
    let value = parse_value(raw.trim());
    if value.is_none() {
        warn!(key, value = %raw, "ignoring unparseable override");
    }
    value
}
