//! Injected randomness
//!
//! The engine never touches an ambient generator. Each run gets its own
//! [`RandomSource`] from a [`RandomFactory`], so a fixed seed or a scripted
//! source reproduces a run exactly.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::types::DelayConfig;
use crate::amounts;
use crate::errors::SwapResult;

pub trait RandomSource: Send {
    /// Uniform real in `[lower, upper]`
    fn uniform(&mut self, lower: f64, upper: f64) -> f64;

    /// Uniform index in `0..len`, `len` is never zero
    fn index(&mut self, len: usize) -> usize;
}

/// Builds a fresh source for every run
pub type RandomFactory = Arc<dyn Fn() -> Box<dyn RandomSource> + Send + Sync>;

/// [`RandomSource`] backed by any `rand` generator
pub struct RngSource<R> {
    rng: R,
}

impl<R: Rng + Send> RngSource<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl RngSource<StdRng> {
    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }

    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy())
    }
}

impl<R: Rng + Send> RandomSource for RngSource<R> {
    fn uniform(&mut self, lower: f64, upper: f64) -> f64 {
        if upper <= lower {
            return lower;
        }
        self.rng.gen_range(lower..=upper)
    }

    fn index(&mut self, len: usize) -> usize {
        if len <= 1 {
            return 0;
        }
        self.rng.gen_range(0..len)
    }
}

/// Seeded factory when `seed != 0`, entropy otherwise.
/// Seeded runs derive a distinct stream per run from a shared counter.
pub fn default_factory(seed: u64) -> RandomFactory {
    if seed == 0 {
        return Arc::new(|| Box::new(RngSource::from_entropy()) as Box<dyn RandomSource>);
    }
    let counter = Arc::new(std::sync::atomic::AtomicU64::new(0));
    Arc::new(move || {
        let n = counter.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        Box::new(RngSource::seeded(seed.wrapping_add(n))) as Box<dyn RandomSource>
    })
}

/// Draws swap amounts, wallets and delays for one run
pub struct RandomAmountGenerator {
    source: Box<dyn RandomSource>,
}

impl RandomAmountGenerator {
    pub fn new(source: Box<dyn RandomSource>) -> Self {
        Self { source }
    }

    /// Uniform draw in `[lower, upper]`, rounded to 4 decimals and scaled by
    /// `10^decimals`
    pub fn amount(&mut self, lower: f64, upper: f64, decimals: u8) -> SwapResult<u64> {
        let draw = self.source.uniform(lower, upper);
        amounts::draw_to_base_units(draw, decimals)
    }

    /// Uniform pick with replacement
    pub fn wallet_index(&mut self, len: usize) -> usize {
        self.source.index(len)
    }

    pub fn delay_ms(&mut self, delay: &DelayConfig) -> u64 {
        match delay {
            DelayConfig::Fixed { delay_ms } => *delay_ms,
            DelayConfig::Random { min_ms, max_ms } => {
                let drawn = self.source.uniform(*min_ms as f64, *max_ms as f64);
                drawn.round() as u64
            }
        }
    }
}

/// Replays fixed sequences. Once exhausted, the last value repeats.
#[cfg(test)]
pub struct ScriptedSource {
    draws: Vec<f64>,
    indices: Vec<usize>,
    draw_pos: usize,
    index_pos: usize,
}

#[cfg(test)]
impl ScriptedSource {
    pub fn new(draws: Vec<f64>, indices: Vec<usize>) -> Self {
        Self {
            draws,
            indices,
            draw_pos: 0,
            index_pos: 0,
        }
    }

    /// Factory handing every run the same script
    pub fn factory(draws: Vec<f64>, indices: Vec<usize>) -> RandomFactory {
        Arc::new(move || {
            Box::new(ScriptedSource::new(draws.clone(), indices.clone())) as Box<dyn RandomSource>
        })
    }
}

#[cfg(test)]
impl RandomSource for ScriptedSource {
    fn uniform(&mut self, lower: f64, _upper: f64) -> f64 {
        let value = self
            .draws
            .get(self.draw_pos)
            .or_else(|| self.draws.last())
            .copied()
            .unwrap_or(lower);
        self.draw_pos += 1;
        value
    }

    fn index(&mut self, len: usize) -> usize {
        let value = self
            .indices
            .get(self.index_pos)
            .or_else(|| self.indices.last())
            .copied()
            .unwrap_or(0);
        self.index_pos += 1;
        value % len.max(1)
    }
}
