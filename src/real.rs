//! Element type abstraction over single and double precision floats.
//!
//! The engine stores everything in 32-byte-wide SIMD vectors: 8 lanes of
//! `f32` or 4 lanes of `f64`. The `Real` trait carries the lane width, the
//! comparison tolerance, the activation function and the vectorized dot
//! kernel for each precision.

use std::fmt::{Debug, Display};
use std::io::{Read, Write};
use std::ops::{Add, AddAssign, Div, Mul, MulAssign, Neg, Sub};
use wide::{f32x8, f64x4};

/// SIMD register width in bytes
pub const VECTOR_BYTES: usize = 32;

mod sealed {
    pub trait Sealed {}
    impl Sealed for f32 {}
    impl Sealed for f64 {}
}

/// Floating-point element of a network: `f32` or `f64`
pub trait Real:
    sealed::Sealed
    + Copy
    + Debug
    + Display
    + Default
    + PartialOrd
    + Send
    + Sync
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + AddAssign
    + MulAssign
    + 'static
{
    /// Elements per 32-byte vector register
    const LANES: usize;
    /// Absolute tolerance for element-wise comparison
    const TOLERANCE: f64;
    /// Size of one serialized element in bytes
    const ELEM_SIZE: u32;
    const ZERO: Self;
    const ONE: Self;

    fn from_f64(value: f64) -> Self;
    fn to_f64(self) -> f64;
    fn abs(self) -> Self;
    fn exp(self) -> Self;

    /// Hyperbolic tangent rescaled to (-1, 1): `f(x) = 1 - 2/(1 + e^{2x})`
    #[inline]
    fn activate(x: Self) -> Self {
        Self::ONE - Self::from_f64(2.0) / (Self::ONE + (x + x).exp())
    }

    /// Activation derivative in terms of the output value: `(1-y)(1+y)`
    #[inline]
    fn derivative(y: Self) -> Self {
        (Self::ONE - y) * (Self::ONE + y)
    }

    #[inline]
    fn approx_eq(self, other: Self) -> bool {
        (self - other).abs().to_f64() < Self::TOLERANCE
    }

    fn all_approx_eq(a: &[Self], b: &[Self]) -> bool {
        a.len() == b.len() && a.iter().zip(b).all(|(&x, &y)| x.approx_eq(y))
    }

    /// Vectorized dot product over equally sized slices. Full lanes are
    /// accumulated in vector registers and horizontally summed; any
    /// remainder columns fall back to the scalar loop.
    fn dot_aligned(weights: &[Self], input: &[Self]) -> Self;

    fn write_elem<W: Write>(self, writer: &mut W) -> std::io::Result<()>;
    fn read_elem<R: Read>(reader: &mut R) -> std::io::Result<Self>;
}

impl Real for f64 {
    const LANES: usize = 4;
    const TOLERANCE: f64 = 1e-6;
    const ELEM_SIZE: u32 = 8;
    const ZERO: Self = 0.0;
    const ONE: Self = 1.0;

    #[inline]
    fn from_f64(value: f64) -> Self {
        value
    }

    #[inline]
    fn to_f64(self) -> f64 {
        self
    }

    #[inline]
    fn abs(self) -> Self {
        f64::abs(self)
    }

    #[inline]
    fn exp(self) -> Self {
        f64::exp(self)
    }

    #[inline]
    fn dot_aligned(weights: &[f64], input: &[f64]) -> f64 {
        debug_assert_eq!(weights.len(), input.len());

        let chunks = input.len() / 4;
        let mut acc = f64x4::splat(0.0);
        for c in 0..chunks {
            let i = c * 4;
            let w = f64x4::new([weights[i], weights[i + 1], weights[i + 2], weights[i + 3]]);
            let x = f64x4::new([input[i], input[i + 1], input[i + 2], input[i + 3]]);
            acc += w * x;
        }
        let lanes: [f64; 4] = acc.into();
        let mut sum = lanes[0] + lanes[1] + lanes[2] + lanes[3];

        for i in chunks * 4..input.len() {
            sum += weights[i] * input[i];
        }
        sum
    }

    fn write_elem<W: Write>(self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(&self.to_le_bytes())
    }

    fn read_elem<R: Read>(reader: &mut R) -> std::io::Result<Self> {
        let mut buf = [0u8; 8];
        reader.read_exact(&mut buf)?;
        Ok(f64::from_le_bytes(buf))
    }
}

impl Real for f32 {
    const LANES: usize = 8;
    const TOLERANCE: f64 = 1e-3;
    const ELEM_SIZE: u32 = 4;
    const ZERO: Self = 0.0;
    const ONE: Self = 1.0;

    #[inline]
    fn from_f64(value: f64) -> Self {
        value as f32
    }

    #[inline]
    fn to_f64(self) -> f64 {
        self as f64
    }

    #[inline]
    fn abs(self) -> Self {
        f32::abs(self)
    }

    #[inline]
    fn exp(self) -> Self {
        f32::exp(self)
    }

    #[inline]
    fn dot_aligned(weights: &[f32], input: &[f32]) -> f32 {
        debug_assert_eq!(weights.len(), input.len());

        let chunks = input.len() / 8;
        let mut acc = f32x8::splat(0.0);
        for c in 0..chunks {
            let i = c * 8;
            let w = f32x8::new([
                weights[i],
                weights[i + 1],
                weights[i + 2],
                weights[i + 3],
                weights[i + 4],
                weights[i + 5],
                weights[i + 6],
                weights[i + 7],
            ]);
            let x = f32x8::new([
                input[i],
                input[i + 1],
                input[i + 2],
                input[i + 3],
                input[i + 4],
                input[i + 5],
                input[i + 6],
                input[i + 7],
            ]);
            acc += w * x;
        }
        let lanes: [f32; 8] = acc.into();
        let mut sum: f32 = lanes.iter().sum();

        for i in chunks * 8..input.len() {
            sum += weights[i] * input[i];
        }
        sum
    }

    fn write_elem<W: Write>(self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(&self.to_le_bytes())
    }

    fn read_elem<R: Read>(reader: &mut R) -> std::io::Result<Self> {
        let mut buf = [0u8; 4];
        reader.read_exact(&mut buf)?;
        Ok(f32::from_le_bytes(buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activation_is_tanh() {
        // 1 - 2/(1 + e^{2x}) is algebraically tanh(x)
        for &x in &[-3.0f64, -0.7, 0.0, 0.4, 2.5] {
            assert!((f64::activate(x) - x.tanh()).abs() < 1e-12);
        }
        assert_eq!(f64::activate(0.0), 0.0);
    }

    #[test]
    fn test_activation_bounds() {
        // Saturates to exactly -1.0 / 1.0 in f32 once e^{2x} under/overflows,
        // so the closed interval is the correct bound
        for i in -100..=100 {
            let y = f32::activate(i as f32 * 0.5);
            assert!((-1.0..=1.0).contains(&y));
        }
        assert_eq!(f32::activate(-50.0), -1.0);
        assert_eq!(f32::activate(50.0), 1.0);
    }

    #[test]
    fn test_derivative_from_output() {
        // d/dx tanh(x) = 1 - tanh(x)^2 = (1 - y)(1 + y)
        let x = 0.8f64;
        let y = f64::activate(x);
        assert!((f64::derivative(y) - (1.0 - x.tanh() * x.tanh())).abs() < 1e-12);
    }

    #[test]
    fn test_dot_matches_scalar_f64() {
        // 11 elements: two full lanes of 4 plus a remainder of 3
        let w: Vec<f64> = (0..11).map(|i| 0.1 * i as f64 - 0.4).collect();
        let x: Vec<f64> = (0..11).map(|i| 0.03 * i as f64 + 0.2).collect();

        let scalar: f64 = w.iter().zip(&x).map(|(a, b)| a * b).sum();
        let vector = f64::dot_aligned(&w, &x);
        assert!((scalar - vector).abs() < f64::TOLERANCE);
    }

    #[test]
    fn test_dot_matches_scalar_f32() {
        let w: Vec<f32> = (0..21).map(|i| 0.07 * i as f32 - 0.5).collect();
        let x: Vec<f32> = (0..21).map(|i| 0.013 * i as f32 + 0.1).collect();

        let scalar: f32 = w.iter().zip(&x).map(|(a, b)| a * b).sum();
        let vector = f32::dot_aligned(&w, &x);
        assert!(((scalar - vector) as f64).abs() < f32::TOLERANCE);
    }

    #[test]
    fn test_elem_round_trip() {
        let mut buf = Vec::new();
        0.125f32.write_elem(&mut buf).unwrap();
        (-7.5f64).write_elem(&mut buf).unwrap();

        let mut cursor = std::io::Cursor::new(buf);
        assert_eq!(f32::read_elem(&mut cursor).unwrap(), 0.125);
        assert_eq!(f64::read_elem(&mut cursor).unwrap(), -7.5);
    }

    #[test]
    fn test_tolerance_per_precision() {
        assert!(1.0f64.approx_eq(1.0 + 1e-7));
        assert!(!1.0f64.approx_eq(1.0 + 1e-5));
        assert!(1.0f32.approx_eq(1.0 + 1e-4));
        assert!(!1.0f32.approx_eq(1.0 + 1e-2));
    }
}
