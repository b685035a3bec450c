use crate::Align64;
use crate::chess::util::rand;
use std::array::from_fn;
use std::sync::LazyLock;

pub const LAYER1_SIZE: usize = 256;

/// `color · 384 + pieceType · 64 + square` per perspective.
pub const PIECE_STRIDE: usize = 64;
pub const COLOR_STRIDE: usize = 6 * PIECE_STRIDE;
pub const FEATURE_COUNT: usize = 2 * COLOR_STRIDE;

pub const OUTPUT_BUCKETS: usize = 8;
/// Output head selected by `(pieceCount − 2) / BUCKET_DIVISOR`.
pub const BUCKET_DIVISOR: u32 = 32u32.div_ceil(OUTPUT_BUCKETS as u32);

pub const EVAL_SCALE: i32 = 400;
/// CReLU ceiling; the forward pass divides by `QA · 64`.
pub const QA: i32 = 255;
pub const QAB: i32 = QA * 64;

/// First-layer and output tables, one output head per bucket. Rows are
/// 64-byte aligned for the vectorized kernels.
pub struct Network {
    pub feature_weights: Vec<Align64<[i16; LAYER1_SIZE]>>,
    pub feature_bias: Align64<[i16; LAYER1_SIZE]>,
    pub output_weights: [[Align64<[i16; LAYER1_SIZE]>; 2]; OUTPUT_BUCKETS],
    pub output_bias: [i32; OUTPUT_BUCKETS],
}

/// Embedded weights. Training and on-disk loading live outside this
/// crate, so the tables come from the same deterministic xorshift stream
/// the Zobrist keys use; every accumulator identity holds for any values.
pub static NETWORK: LazyLock<Network> = LazyLock::new(Network::generate);

fn next_weight(state: &mut u64) -> i16 {
    *state = rand(*state);
    (*state % 61) as i16 - 30
}

impl Network {
    fn generate() -> Network {
        let mut state: u64 = 0x5851_f42d_4c95_7f2d;

        let feature_weights = (0..FEATURE_COUNT)
            .map(|_| Align64(from_fn(|_| next_weight(&mut state))))
            .collect();

        let feature_bias = Align64(from_fn(|_| next_weight(&mut state)));

        let output_weights =
            from_fn(|_| from_fn(|_| Align64(from_fn(|_| next_weight(&mut state)))));

        let output_bias = from_fn(|_| {
            state = rand(state);
            (state % 2048) as i32 - 1024
        });

        Network {
            feature_weights,
            feature_bias,
            output_weights,
            output_bias,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_shape() {
        assert_eq!(NETWORK.feature_weights.len(), FEATURE_COUNT);
        assert_eq!(FEATURE_COUNT, 768);
        assert_eq!(BUCKET_DIVISOR, 4);
        assert_eq!(QAB, 16_320);

        // Weights stay small enough that 32 active features plus the bias
        // can never overflow the 16-bit accumulator lanes.
        for row in NETWORK.feature_weights.iter() {
            assert!(row.0.iter().all(|&w| (-30..=30).contains(&w)));
        }

        assert!(NETWORK.feature_bias.0.iter().all(|&w| (-30..=30).contains(&w)));
    }

    #[test]
    fn test_network_is_deterministic() {
        let again = Network::generate();

        assert_eq!(NETWORK.feature_bias.0, again.feature_bias.0);
        assert_eq!(NETWORK.output_bias, again.output_bias);
        assert_eq!(NETWORK.feature_weights[0].0, again.feature_weights[0].0);
        assert_eq!(
            NETWORK.feature_weights[FEATURE_COUNT - 1].0,
            again.feature_weights[FEATURE_COUNT - 1].0
        );
    }
}
