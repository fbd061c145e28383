//! Arithmetic primitives shared by both engines.
//!
//! The engines differ only in where results are written, never in how they
//! are computed: both call these functions, and every call detects the same
//! `DotKernel`, so for the same input they produce bit-identical outputs.

use crate::activation::Activation;
use crate::model_spec::DenseLayer;

/// Dot-product implementation selected from the CPU features found at run time.
///
/// Detection is deterministic for a given machine, so every caller in a
/// process uses the same kernel and sums in the same order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DotKernel {
    Scalar,
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    Avx2Fma,
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    Avx512Fma,
}

impl DotKernel {
    #[inline(always)]
    pub(crate) fn detect() -> Self {
        #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
        {
            if std::is_x86_feature_detected!("avx512f") && std::is_x86_feature_detected!("fma") {
                return DotKernel::Avx512Fma;
            }
            if std::is_x86_feature_detected!("avx2") && std::is_x86_feature_detected!("fma") {
                return DotKernel::Avx2Fma;
            }
        }

        DotKernel::Scalar
    }

    /// Dot product of two slices of equal length.
    #[inline(always)]
    pub(crate) fn dot(self, a: &[f32], b: &[f32]) -> f32 {
        debug_assert_eq!(a.len(), b.len());
        let len = a.len().min(b.len());
        match self {
            DotKernel::Scalar => dot_scalar(&a[..len], &b[..len]),
            // SAFETY: both slices hold at least `len` values, and `detect` only
            // selects a SIMD kernel when the CPU supports its features.
            #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
            DotKernel::Avx2Fma => unsafe { simd::dot_avx2_fma(a.as_ptr(), b.as_ptr(), len) },
            #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
            DotKernel::Avx512Fma => unsafe { simd::dot_avx512_fma(a.as_ptr(), b.as_ptr(), len) },
        }
    }
}

/// Dot product with the fastest kernel available on this CPU.
#[inline(always)]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    DotKernel::detect().dot(a, b)
}

/// Dot product with four independent accumulators.
#[inline(always)]
fn dot_scalar(a: &[f32], b: &[f32]) -> f32 {
    let mut sums = [0.0f32; 4];

    let a_chunks = a.chunks_exact(4);
    let b_chunks = b.chunks_exact(4);
    let a_tail = a_chunks.remainder();
    let b_tail = b_chunks.remainder();

    for (ca, cb) in a_chunks.zip(b_chunks) {
        sums[0] = ca[0].mul_add(cb[0], sums[0]);
        sums[1] = ca[1].mul_add(cb[1], sums[1]);
        sums[2] = ca[2].mul_add(cb[2], sums[2]);
        sums[3] = ca[3].mul_add(cb[3], sums[3]);
    }

    let mut sum = (sums[0] + sums[1]) + (sums[2] + sums[3]);
    for (&av, &bv) in a_tail.iter().zip(b_tail) {
        sum = av.mul_add(bv, sum);
    }
    sum
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
mod simd {
    #[cfg(target_arch = "x86")]
    use core::arch::x86::*;
    #[cfg(target_arch = "x86_64")]
    use core::arch::x86_64::*;

    /// Sums vector lanes in lane order.
    #[inline(always)]
    fn lane_sum(lanes: &[f32]) -> f32 {
        lanes.iter().fold(0.0, |sum, &lane| sum + lane)
    }

    /// Multiplies the tail past `start` into `sum` one value at a time.
    #[inline(always)]
    unsafe fn tail(a: *const f32, b: *const f32, start: usize, len: usize, mut sum: f32) -> f32 {
        for i in start..len {
            let av = unsafe { *a.add(i) };
            let bv = unsafe { *b.add(i) };
            sum = av.mul_add(bv, sum);
        }
        sum
    }

    #[target_feature(enable = "avx2,fma")]
    pub(super) unsafe fn dot_avx2_fma(a: *const f32, b: *const f32, len: usize) -> f32 {
        let mut acc = _mm256_setzero_ps();
        let mut i = 0usize;

        while i + 8 <= len {
            let va = unsafe { _mm256_loadu_ps(a.add(i)) };
            let vb = unsafe { _mm256_loadu_ps(b.add(i)) };
            acc = _mm256_fmadd_ps(va, vb, acc);
            i += 8;
        }

        let mut lanes = [0.0f32; 8];
        unsafe { _mm256_storeu_ps(lanes.as_mut_ptr(), acc) };
        unsafe { tail(a, b, i, len, lane_sum(&lanes)) }
    }

    #[target_feature(enable = "avx512f,fma")]
    pub(super) unsafe fn dot_avx512_fma(a: *const f32, b: *const f32, len: usize) -> f32 {
        let mut acc = _mm512_setzero_ps();
        let mut i = 0usize;

        while i + 16 <= len {
            let va = unsafe { _mm512_loadu_ps(a.add(i)) };
            let vb = unsafe { _mm512_loadu_ps(b.add(i)) };
            acc = _mm512_fmadd_ps(va, vb, acc);
            i += 16;
        }

        let mut lanes = [0.0f32; 16];
        unsafe { _mm512_storeu_ps(lanes.as_mut_ptr(), acc) };
        unsafe { tail(a, b, i, len, lane_sum(&lanes)) }
    }
}

/// Computes `output = input · W + b` for every row of the batch.
///
/// `input` holds `rows * in_features` values and `output` exactly
/// `rows * out_features`; callers validate the shapes beforehand.
pub fn affine_into(layer: &DenseLayer, input: &[f32], output: &mut [f32]) {
    let in_features = layer.in_features();
    let out_features = layer.out_features();
    let kernel = DotKernel::detect();
    debug_assert_eq!(input.len() / in_features, output.len() / out_features);

    for (x_row, out_row) in input
        .chunks_exact(in_features)
        .zip(output.chunks_exact_mut(out_features))
    {
        for ((out, w_row), &bias) in out_row
            .iter_mut()
            .zip(layer.weights().chunks_exact(in_features))
            .zip(layer.bias())
        {
            *out = bias + kernel.dot(w_row, x_row);
        }
    }
}

/// Same as [`affine_into`] with the activation applied as each row is written.
///
/// Used when the planner fuses the activation into the affine step: the
/// pre-activation row is finished in cache and overwritten before the next
/// row is produced.
pub fn affine_activation_into(
    layer: &DenseLayer,
    activation: Activation,
    input: &[f32],
    output: &mut [f32],
) {
    let in_features = layer.in_features();
    let out_features = layer.out_features();
    let kernel = DotKernel::detect();

    for (x_row, out_row) in input
        .chunks_exact(in_features)
        .zip(output.chunks_exact_mut(out_features))
    {
        for ((out, w_row), &bias) in out_row
            .iter_mut()
            .zip(layer.weights().chunks_exact(in_features))
            .zip(layer.bias())
        {
            *out = bias + kernel.dot(w_row, x_row);
        }
        activation.apply_in_place(out_row);
    }
}
