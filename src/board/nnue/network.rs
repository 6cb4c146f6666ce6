//! Network parameters and the raw forward pass.
//!
//! The serialized layout is `FeatureWeights[14][768][1600]`,
//! `FeatureBias[1600]`, `OutputWeights[8][3200]`, `OutputBias[8]`, all
//! little-endian i16. With the `embedded_nnue` feature the blob is
//! compiled into the binary; otherwise a deterministic pseudo-random
//! fallback net is synthesized so that the engine (and every invariant
//! test) works without the asset, just without playing strength.

use std::alloc::{alloc_zeroed, handle_alloc_error, Layout};

use once_cell::sync::Lazy;

use super::simd;
use super::{FEATURE_SIZE, HIDDEN_SIZE, INPUT_BUCKETS, OUTPUT_BUCKETS, QA, QB, SCALE};
use crate::search::MATE_THRESHOLD;

/// Wrapper forcing 64-byte alignment for SIMD-friendly loads
#[repr(C, align(64))]
pub struct Align64<T>(pub T);

pub type FeatureWeights = Align64<[[[i16; HIDDEN_SIZE]; FEATURE_SIZE]; INPUT_BUCKETS]>;
pub type OutputWeights = Align64<[[i16; 2 * HIDDEN_SIZE]; OUTPUT_BUCKETS]>;

pub struct Network {
    pub feature_weights: Box<FeatureWeights>,
    pub feature_bias: Box<Align64<[i16; HIDDEN_SIZE]>>,
    pub output_weights: Box<OutputWeights>,
    pub output_bias: [i16; OUTPUT_BUCKETS],
}

/// The process-wide network, initialized once
pub static NETWORK: Lazy<Network> = Lazy::new(Network::load_default);

/// Heap-allocate a zeroed `T` without building it on the stack first;
/// the weight and history tables run to tens of megabytes
pub(crate) fn boxed_zeroed<T>() -> Box<T> {
    let layout = Layout::new::<T>();
    // SAFETY: the weight tables are plain i16 arrays, for which the
    // all-zero bit pattern is a valid value, and the pointer comes from
    // the global allocator with T's layout.
    unsafe {
        let ptr = alloc_zeroed(layout).cast::<T>();
        if ptr.is_null() {
            handle_alloc_error(layout);
        }
        Box::from_raw(ptr)
    }
}

impl Network {
    fn load_default() -> Network {
        #[cfg(feature = "embedded_nnue")]
        {
            static BLOB: &[u8] = include_bytes!("nets/default.bin");
            Network::from_bytes(BLOB).expect("embedded network blob is valid")
        }
        #[cfg(not(feature = "embedded_nnue"))]
        {
            Network::fallback()
        }
    }

    /// Parse a serialized network
    pub fn from_bytes(data: &[u8]) -> Result<Network, usize> {
        let expected = 2
            * (INPUT_BUCKETS * FEATURE_SIZE * HIDDEN_SIZE
                + HIDDEN_SIZE
                + OUTPUT_BUCKETS * 2 * HIDDEN_SIZE
                + OUTPUT_BUCKETS);
        if data.len() != expected {
            return Err(data.len());
        }

        let mut values = data
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]));
        let mut next = move || values.next().expect("length checked above");

        let mut feature_weights: Box<FeatureWeights> = boxed_zeroed();
        for bucket in feature_weights.0.iter_mut() {
            for feature in bucket.iter_mut() {
                for w in feature.iter_mut() {
                    *w = next();
                }
            }
        }

        let mut feature_bias: Box<Align64<[i16; HIDDEN_SIZE]>> = boxed_zeroed();
        for b in feature_bias.0.iter_mut() {
            *b = next();
        }

        let mut output_weights: Box<OutputWeights> = boxed_zeroed();
        for bucket in output_weights.0.iter_mut() {
            for w in bucket.iter_mut() {
                *w = next();
            }
        }

        let mut output_bias = [0i16; OUTPUT_BUCKETS];
        for b in &mut output_bias {
            *b = next();
        }

        Ok(Network {
            feature_weights,
            feature_bias,
            output_weights,
            output_bias,
        })
    }

    /// Deterministic stand-in weights: small values from a fixed-seed
    /// xorshift. Keeps every accumulator identity intact and the output
    /// layer far from overflow.
    fn fallback() -> Network {
        let mut state = 0x9E37_79B9_7F4A_7C15u64;
        let mut next = move || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state
        };

        let mut feature_weights: Box<FeatureWeights> = boxed_zeroed();
        for bucket in feature_weights.0.iter_mut() {
            for feature in bucket.iter_mut() {
                for w in feature.iter_mut() {
                    *w = (next() % 33) as i16 - 16;
                }
            }
        }

        let mut feature_bias: Box<Align64<[i16; HIDDEN_SIZE]>> = boxed_zeroed();
        for b in feature_bias.0.iter_mut() {
            *b = (next() % 17) as i16 - 8;
        }

        let mut output_weights: Box<OutputWeights> = boxed_zeroed();
        for bucket in output_weights.0.iter_mut() {
            for w in bucket.iter_mut() {
                *w = (next() % 65) as i16 - 32;
            }
        }

        let mut output_bias = [0i16; OUTPUT_BUCKETS];
        for b in &mut output_bias {
            *b = (next() % 129) as i16 - 64;
        }

        Network {
            feature_weights,
            feature_bias,
            output_weights,
            output_bias,
        }
    }

    /// One bucket's feature weight row
    #[inline]
    #[must_use]
    pub fn feature_row(&self, bucket: usize, feature: usize) -> &[i16; HIDDEN_SIZE] {
        &self.feature_weights.0[bucket][feature]
    }

    /// Output layer over perspective-ordered accumulators: squared
    /// clipped ReLU, dot with the bucket's weights, bias and scaling.
    /// `phase` is `minors + 2*rooks + 4*queens`.
    #[must_use]
    pub fn forward(
        &self,
        ours: &[i16; HIDDEN_SIZE],
        theirs: &[i16; HIDDEN_SIZE],
        bucket: usize,
        phase: i32,
    ) -> i32 {
        let weights = &self.output_weights.0[bucket];
        let (our_weights, their_weights) = weights.split_at(HIDDEN_SIZE);
        let sum: i64 = simd::screlu_dot(ours, our_weights.try_into().expect("half of output row"))
            + simd::screlu_dot(theirs, their_weights.try_into().expect("half of output row"));

        let output = (sum / i64::from(QA) + i64::from(self.output_bias[bucket]))
            * i64::from(SCALE)
            / i64::from(QA * QB);
        let scaled = output * i64::from(52 + phase.min(24)) / 64;
        scaled.clamp(i64::from(-(MATE_THRESHOLD - 1)), i64::from(MATE_THRESHOLD - 1)) as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_is_deterministic() {
        let a = Network::fallback();
        let b = Network::fallback();
        assert_eq!(a.feature_bias.0[17], b.feature_bias.0[17]);
        assert_eq!(
            a.feature_weights.0[3][100][7],
            b.feature_weights.0[3][100][7]
        );
        assert_eq!(a.output_bias, b.output_bias);
    }

    #[test]
    fn test_from_bytes_length_check() {
        assert!(Network::from_bytes(&[0u8; 16]).is_err());
    }

    #[test]
    fn test_forward_zero_accumulators() {
        let net = Network::fallback();
        let zeros = [0i16; HIDDEN_SIZE];
        let out = net.forward(&zeros, &zeros, 0, 24);
        // Only the bias term survives
        let expected =
            i32::from(net.output_bias[0]) * SCALE / (QA * QB) * (52 + 24) / 64;
        assert_eq!(out, expected.clamp(-(MATE_THRESHOLD - 1), MATE_THRESHOLD - 1));
    }

    #[test]
    fn test_forward_is_clamped() {
        let net = Network::fallback();
        let ours = [i16::MAX; HIDDEN_SIZE];
        let theirs = [i16::MIN; HIDDEN_SIZE];
        let out = net.forward(&ours, &theirs, 3, 24);
        assert!(out.abs() < MATE_THRESHOLD);
    }
}
