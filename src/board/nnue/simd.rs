//! Vectorized kernels for NNUE evaluation.
//!
//! Accumulator rows are added and subtracted as i16 vectors, and the
//! output layer computes a `SCReLU` dot product. The scalar versions are
//! the normative semantics; AVX2 (x86_64) and NEON (aarch64) paths
//! produce identical results.

use super::{HIDDEN_SIZE, QA};

// ============================================================================
// Public API - dispatches to platform-specific implementations
// ============================================================================

/// `acc[i] += weights[i]` across the hidden layer
#[inline]
pub fn add_weights(acc: &mut [i16; HIDDEN_SIZE], weights: &[i16; HIDDEN_SIZE]) {
    #[cfg(target_arch = "aarch64")]
    unsafe {
        add_weights_neon(acc, weights);
    }

    #[cfg(all(target_arch = "x86_64", target_feature = "avx2"))]
    unsafe {
        add_weights_avx2(acc, weights);
    }

    #[cfg(not(any(
        target_arch = "aarch64",
        all(target_arch = "x86_64", target_feature = "avx2")
    )))]
    add_weights_scalar(acc, weights);
}

/// `acc[i] -= weights[i]` across the hidden layer
#[inline]
pub fn sub_weights(acc: &mut [i16; HIDDEN_SIZE], weights: &[i16; HIDDEN_SIZE]) {
    #[cfg(target_arch = "aarch64")]
    unsafe {
        sub_weights_neon(acc, weights);
    }

    #[cfg(all(target_arch = "x86_64", target_feature = "avx2"))]
    unsafe {
        sub_weights_avx2(acc, weights);
    }

    #[cfg(not(any(
        target_arch = "aarch64",
        all(target_arch = "x86_64", target_feature = "avx2")
    )))]
    sub_weights_scalar(acc, weights);
}

/// `sum of clamp(acc[i], 0, QA)^2 * weights[i]`, accumulated in i64
#[inline]
#[must_use]
pub fn screlu_dot(acc: &[i16; HIDDEN_SIZE], weights: &[i16; HIDDEN_SIZE]) -> i64 {
    #[cfg(all(target_arch = "x86_64", target_feature = "avx2"))]
    unsafe {
        screlu_dot_avx2(acc, weights)
    }

    #[cfg(not(all(target_arch = "x86_64", target_feature = "avx2")))]
    screlu_dot_scalar(acc, weights)
}

// ============================================================================
// Scalar implementations (normative)
// ============================================================================

#[allow(dead_code)]
#[inline]
fn add_weights_scalar(acc: &mut [i16; HIDDEN_SIZE], weights: &[i16; HIDDEN_SIZE]) {
    for (a, &w) in acc.iter_mut().zip(weights.iter()) {
        *a = a.wrapping_add(w);
    }
}

#[allow(dead_code)]
#[inline]
fn sub_weights_scalar(acc: &mut [i16; HIDDEN_SIZE], weights: &[i16; HIDDEN_SIZE]) {
    for (a, &w) in acc.iter_mut().zip(weights.iter()) {
        *a = a.wrapping_sub(w);
    }
}

#[allow(dead_code)]
#[inline]
fn screlu_dot_scalar(acc: &[i16; HIDDEN_SIZE], weights: &[i16; HIDDEN_SIZE]) -> i64 {
    let mut sum = 0i64;
    for (&a, &w) in acc.iter().zip(weights.iter()) {
        let clamped = i64::from(a).clamp(0, i64::from(QA));
        sum += clamped * clamped * i64::from(w);
    }
    sum
}

// ============================================================================
// NEON implementations (aarch64)
// ============================================================================

#[cfg(target_arch = "aarch64")]
unsafe fn add_weights_neon(acc: &mut [i16; HIDDEN_SIZE], weights: &[i16; HIDDEN_SIZE]) {
    use std::arch::aarch64::{vaddq_s16, vld1q_s16, vst1q_s16};

    let acc_ptr = acc.as_mut_ptr();
    let weights_ptr = weights.as_ptr();
    for i in (0..HIDDEN_SIZE).step_by(8) {
        let a = vld1q_s16(acc_ptr.add(i));
        let w = vld1q_s16(weights_ptr.add(i));
        vst1q_s16(acc_ptr.add(i), vaddq_s16(a, w));
    }
}

#[cfg(target_arch = "aarch64")]
unsafe fn sub_weights_neon(acc: &mut [i16; HIDDEN_SIZE], weights: &[i16; HIDDEN_SIZE]) {
    use std::arch::aarch64::{vld1q_s16, vst1q_s16, vsubq_s16};

    let acc_ptr = acc.as_mut_ptr();
    let weights_ptr = weights.as_ptr();
    for i in (0..HIDDEN_SIZE).step_by(8) {
        let a = vld1q_s16(acc_ptr.add(i));
        let w = vld1q_s16(weights_ptr.add(i));
        vst1q_s16(acc_ptr.add(i), vsubq_s16(a, w));
    }
}

// ============================================================================
// AVX2 implementations (x86_64)
// ============================================================================

#[cfg(all(target_arch = "x86_64", target_feature = "avx2"))]
#[target_feature(enable = "avx2")]
unsafe fn add_weights_avx2(acc: &mut [i16; HIDDEN_SIZE], weights: &[i16; HIDDEN_SIZE]) {
    use std::arch::x86_64::{_mm256_add_epi16, _mm256_loadu_si256, _mm256_storeu_si256, __m256i};

    let acc_ptr = acc.as_mut_ptr();
    let weights_ptr = weights.as_ptr();
    for i in (0..HIDDEN_SIZE).step_by(16) {
        let a = _mm256_loadu_si256(acc_ptr.add(i) as *const __m256i);
        let w = _mm256_loadu_si256(weights_ptr.add(i) as *const __m256i);
        _mm256_storeu_si256(acc_ptr.add(i) as *mut __m256i, _mm256_add_epi16(a, w));
    }
}

#[cfg(all(target_arch = "x86_64", target_feature = "avx2"))]
#[target_feature(enable = "avx2")]
unsafe fn sub_weights_avx2(acc: &mut [i16; HIDDEN_SIZE], weights: &[i16; HIDDEN_SIZE]) {
    use std::arch::x86_64::{_mm256_loadu_si256, _mm256_storeu_si256, _mm256_sub_epi16, __m256i};

    let acc_ptr = acc.as_mut_ptr();
    let weights_ptr = weights.as_ptr();
    for i in (0..HIDDEN_SIZE).step_by(16) {
        let a = _mm256_loadu_si256(acc_ptr.add(i) as *const __m256i);
        let w = _mm256_loadu_si256(weights_ptr.add(i) as *const __m256i);
        _mm256_storeu_si256(acc_ptr.add(i) as *mut __m256i, _mm256_sub_epi16(a, w));
    }
}

#[cfg(all(target_arch = "x86_64", target_feature = "avx2"))]
#[target_feature(enable = "avx2")]
unsafe fn screlu_dot_avx2(acc: &[i16; HIDDEN_SIZE], weights: &[i16; HIDDEN_SIZE]) -> i64 {
    use std::arch::x86_64::*;

    let acc_ptr = acc.as_ptr();
    let weights_ptr = weights.as_ptr();

    let zero = _mm256_setzero_si256();
    let qa = _mm256_set1_epi16(QA as i16);
    let mut sum = _mm256_setzero_si256();

    for i in (0..HIDDEN_SIZE).step_by(16) {
        let a = _mm256_loadu_si256(acc_ptr.add(i) as *const __m256i);
        let w = _mm256_loadu_si256(weights_ptr.add(i) as *const __m256i);
        let clamped = _mm256_min_epi16(_mm256_max_epi16(a, zero), qa);

        // Widen to i32, square, multiply by the sign-extended weight and
        // accumulate each product into an i64 lane
        let lo = _mm256_unpacklo_epi16(clamped, zero);
        let hi = _mm256_unpackhi_epi16(clamped, zero);
        let w_lo = _mm256_unpacklo_epi16(w, _mm256_cmpgt_epi16(zero, w));
        let w_hi = _mm256_unpackhi_epi16(w, _mm256_cmpgt_epi16(zero, w));
        let prod_lo = _mm256_mullo_epi32(_mm256_mullo_epi32(lo, lo), w_lo);
        let prod_hi = _mm256_mullo_epi32(_mm256_mullo_epi32(hi, hi), w_hi);

        for prod in [prod_lo, prod_hi] {
            sum = _mm256_add_epi64(
                sum,
                _mm256_cvtepi32_epi64(_mm256_extracti128_si256(prod, 0)),
            );
            sum = _mm256_add_epi64(
                sum,
                _mm256_cvtepi32_epi64(_mm256_extracti128_si256(prod, 1)),
            );
        }
    }

    let mut lanes = [0i64; 4];
    _mm256_storeu_si256(lanes.as_mut_ptr() as *mut __m256i, sum);
    lanes.iter().sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_sub_roundtrip() {
        let mut acc = [100i16; HIDDEN_SIZE];
        let weights: [i16; HIDDEN_SIZE] = std::array::from_fn(|i| (i % 61) as i16 - 30);
        add_weights(&mut acc, &weights);
        sub_weights(&mut acc, &weights);
        assert!(acc.iter().all(|&v| v == 100));
    }

    #[test]
    fn test_screlu_clamps_negative_and_large() {
        let mut acc = [0i16; HIDDEN_SIZE];
        let mut weights = [0i16; HIDDEN_SIZE];
        acc[0] = -50; // clamps to 0
        acc[1] = 300; // clamps to QA
        acc[2] = 10;
        weights[0] = 7;
        weights[1] = 2;
        weights[2] = 3;
        let expected = 0 + i64::from(QA) * i64::from(QA) * 2 + 10 * 10 * 3;
        assert_eq!(screlu_dot(&acc, &weights), expected);
    }

    #[test]
    fn test_dispatch_matches_scalar() {
        let acc: [i16; HIDDEN_SIZE] = std::array::from_fn(|i| ((i * 37) % 600) as i16 - 200);
        let weights: [i16; HIDDEN_SIZE] = std::array::from_fn(|i| ((i * 13) % 120) as i16 - 60);
        assert_eq!(screlu_dot(&acc, &weights), screlu_dot_scalar(&acc, &weights));
    }
}
