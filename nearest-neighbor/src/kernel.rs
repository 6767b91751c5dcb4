//! Inner product kernels.
//!
//! The scalar kernels are the reference. The vectorized kernels process one
//! lane block per iteration and must produce the same ranking; the quantized
//! kernel accumulates in 32-bit lanes so its result is bit-identical.

pub mod scalar {
    pub fn dot_i16(a: &[i16], b: &[i16]) -> i32 {
        a.iter()
            .zip(b)
            .map(|(&a, &b)| i32::from(a) * i32::from(b))
            .sum()
    }

    pub fn dot_f32(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(&a, &b)| a * b).sum()
    }
}

pub mod simd {
    use wide::{f32x4, i32x4};

    /// Each block of 8 components is widened into two `i32x4` halves.
    pub fn dot_i16(a: &[i16], b: &[i16]) -> i32 {
        debug_assert_eq!(a.len() % 8, 0);
        let widen = |chunk: &[i16]| {
            (
                i32x4::new([
                    i32::from(chunk[0]),
                    i32::from(chunk[1]),
                    i32::from(chunk[2]),
                    i32::from(chunk[3]),
                ]),
                i32x4::new([
                    i32::from(chunk[4]),
                    i32::from(chunk[5]),
                    i32::from(chunk[6]),
                    i32::from(chunk[7]),
                ]),
            )
        };
        a.chunks_exact(8)
            .zip(b.chunks_exact(8))
            .fold(i32x4::splat(0), |acc, (a, b)| {
                let (a_lo, a_hi) = widen(a);
                let (b_lo, b_hi) = widen(b);
                acc + a_lo * b_lo + a_hi * b_hi
            })
            .to_array()
            .iter()
            .sum()
    }

    pub fn dot_f32(a: &[f32], b: &[f32]) -> f32 {
        debug_assert_eq!(a.len() % 4, 0);
        a.chunks_exact(4)
            .map(|chunk| f32x4::new([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .zip(
                b.chunks_exact(4)
                    .map(|chunk| f32x4::new([chunk[0], chunk[1], chunk[2], chunk[3]])),
            )
            .fold(f32x4::splat(0.), |acc, (a, b)| a.mul_add(b, acc))
            .reduce_add()
    }
}
