use rand::prelude::{SeedableRng, StdRng};

const STREAM_MULTIPLIER: u64 = 0xD6E8_FEB8_6659_FD93;

/// Mixes a run seed with stream identifiers (iteration, rollout, ply...) into an independent seed.
pub fn derive_seed(seed: u64, stream: &[u64]) -> u64 {
    stream
        .iter()
        .fold(splitmix64(seed), |acc, &part| {
            splitmix64(acc.wrapping_mul(STREAM_MULTIPLIER).wrapping_add(splitmix64(part)))
        })
}

pub fn create_rng_from_seed(seed: u64, stream: &[u64]) -> StdRng {
    StdRng::seed_from_u64(derive_seed(seed, stream))
}

fn splitmix64(value: u64) -> u64 {
    let mut z = value.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
