//! HNSW construction/search parameters and layer assignment.
//!
//! Grounded on the teacher's `vector/custom_hnsw/types.rs::HNSWParams`,
//! adapted to `spec.md` §4.1: `ef_construction` and `ef_search` are
//! tracked separately (the teacher conflates them into one `ef`), and
//! `max_level` here is a sanity cap on the geometric draw rather than a
//! field the graph is required to reach.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Construction/search parameters, fixed for the lifetime of an index
/// (`spec.md` §4.1 "Parameters").
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct HnswParams {
    /// Connectivity: neighbors kept per node at levels above 0. Level 0
    /// keeps `m * 2` (`spec.md` §3 "Node").
    pub m: u32,

    /// Candidate-set width during insert. Conventionally `>= m`.
    pub ef_construction: u32,

    /// Candidate-set width at query time.
    pub ef_search: u32,

    /// `1 / ln(m)`, the geometric distribution's rate parameter, stored
    /// so the header can persist it and search-time level assignment
    /// (there is none) never needs to reconstruct `m` from it.
    pub ml: f32,

    /// Seed for the construction-time layer-assignment PRNG. Not
    /// persisted bit-for-bit reproducibly across schedules (`spec.md`
    /// §5 "Determinism": build determinism is not guaranteed).
    pub seed: u64,

    /// Hard cap on a single draw from the geometric distribution, so a
    /// pathological `u` close to zero cannot produce an absurd level.
    /// Independent of the graph's *current* maximum level, which is
    /// runtime state the entry point tracks (`spec.md` §4.1 step 4).
    pub max_level: u8,
}

impl Default for HnswParams {
    fn default() -> Self {
        let m = 16;
        Self {
            m,
            ef_construction: 128,
            ef_search: 64,
            ml: 1.0 / (m as f32).ln(),
            seed: 42,
            max_level: 16,
        }
    }
}

impl HnswParams {
    pub fn new(m: u32, ef_construction: u32, ef_search: u32) -> Result<Self, ConfigError> {
        if m == 0 || m > 128 {
            return Err(ConfigError::InvalidM(m));
        }
        if ef_construction < m {
            return Err(ConfigError::InvalidEfConstruction { m, ef_construction });
        }
        Ok(Self {
            m,
            ef_construction,
            ef_search,
            ml: 1.0 / (m as f32).ln(),
            seed: 42,
            max_level: 16,
        })
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Neighbor cap at a given level: `m*2` on level 0, `m` above.
    pub fn neighbor_cap(&self, level: u8) -> usize {
        if level == 0 {
            self.m as usize * 2
        } else {
            self.m as usize
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.m == 0 || self.m > 128 {
            return Err(ConfigError::InvalidM(self.m));
        }
        if self.ef_construction < self.m {
            return Err(ConfigError::InvalidEfConstruction {
                m: self.m,
                ef_construction: self.ef_construction,
            });
        }
        Ok(())
    }
}

/// Draw a new node's level from the geometric distribution described in
/// `spec.md` §4.1 "Layer assignment": `L = floor(-ln(u) * ml)`, `u`
/// sampled uniformly from `(0, 1]`, capped by `params.max_level`.
pub fn assign_level<R: Rng>(rng: &mut R, params: &HnswParams) -> u8 {
    // gen_range is exclusive of 1.0; nudge away from 0 so ln(u) is finite.
    let u: f32 = rng.gen_range(f32::MIN_POSITIVE..=1.0);
    let level = (-u.ln() * params.ml).floor();
    let level = if level.is_finite() { level.max(0.0) } else { 0.0 };
    (level as u8).min(params.max_level)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn default_params_are_valid() {
        assert!(HnswParams::default().validate().is_ok());
    }

    #[test]
    fn ef_construction_below_m_is_rejected() {
        assert!(HnswParams::new(16, 10, 64).is_err());
    }

    #[test]
    fn assigned_levels_stay_within_cap() {
        let params = HnswParams::default();
        let mut rng = StdRng::seed_from_u64(params.seed);
        for _ in 0..1000 {
            let level = assign_level(&mut rng, &params);
            assert!(level <= params.max_level);
        }
    }

    #[test]
    fn most_draws_land_on_level_zero() {
        let params = HnswParams::default();
        let mut rng = StdRng::seed_from_u64(params.seed);
        let zeros = (0..1000).filter(|_| assign_level(&mut rng, &params) == 0).count();
        assert!(zeros > 500, "expected most draws at level 0, got {zeros}/1000");
    }
}
