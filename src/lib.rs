//! # evonet
//!
//! Fast feed-forward neural networks with SIMD-aligned storage, trained by
//! back-propagation or by a genetic population search.
//!
//! ## Features
//!
//! - **Aligned**: matrix rows are padded to 32-byte vector boundaries
//! - **Fast**: vectorized forward path with a scalar reference path
//! - **Parallel**: batch evaluation and population scoring via Rayon
//! - **Evolvable**: fitness-proportional mating with per-parameter
//!   crossover and multiplicative mutation
//! - **Reproducible**: seeded random streams
//!
//! ## Quick Start
//!
//! ```rust
//! use evonet::{AlignedMatrix, Population};
//!
//! // XOR-like task: 4 samples of 2 inputs, 1 output
//! let inputs = AlignedMatrix::from_unaligned(
//!     &[-1.0, -1.0, -1.0, 1.0, 1.0, -1.0, 1.0, 1.0],
//!     4,
//!     2,
//! )
//! .unwrap();
//! let expected = AlignedMatrix::from_unaligned(&[-0.5, 0.5, 0.5, -0.5], 4, 1).unwrap();
//!
//! let mut population = Population::<f64>::new(200, 0.05, &[2, 2, 1]).unwrap();
//! let mut best = f64::MAX;
//! for _ in 0..10 {
//!     best = population.train(&inputs, &expected, 0.25, true).unwrap();
//! }
//! println!("best error: {best}");
//! ```
//!
//! ## Back-propagation
//!
//! ```rust
//! use evonet::{AlignedMatrix, Init, Network, Randomizer};
//!
//! let mut rand = Randomizer::seeded(42);
//! let mut net = Network::<f64>::new(&[2, 8, 1], Init::Gradient, &mut rand).unwrap();
//!
//! let inputs = AlignedMatrix::from_unaligned(
//!     &[-1.0, -1.0, -1.0, 1.0, 1.0, -1.0, 1.0, 1.0],
//!     4,
//!     2,
//! )
//! .unwrap();
//! let expected = AlignedMatrix::from_unaligned(&[-0.5, 0.5, 0.5, -0.5], 4, 1).unwrap();
//!
//! for _ in 0..100 {
//!     net.back_propagation(&inputs, &expected, 0.2).unwrap();
//! }
//! ```

pub mod align;
pub mod config;
pub mod error;
mod file;
pub mod layer;
pub mod network;
pub mod population;
pub mod random;
pub mod real;

// Re-export main types
pub use align::AlignedMatrix;
pub use config::Config;
pub use error::Error;
pub use layer::{Init, Layer};
pub use network::Network;
pub use population::{Individual, Population};
pub use random::Randomizer;
pub use real::Real;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_quick_evolution() {
        let inputs =
            AlignedMatrix::from_unaligned(&[-1.0, -1.0, -1.0, 1.0, 1.0, -1.0, 1.0, 1.0], 4, 2)
                .unwrap();
        let expected = AlignedMatrix::from_unaligned(&[-0.5, 0.5, 0.5, -0.5], 4, 1).unwrap();

        let mut population = Population::<f64>::with_seed(100, 0.1, &[2, 2, 1], 1).unwrap();
        let first = population.train(&inputs, &expected, 0.25, true).unwrap();
        let mut last = first;
        for _ in 0..10 {
            last = population.train(&inputs, &expected, 0.25, true).unwrap();
        }
        assert!(last <= first);
    }
}
