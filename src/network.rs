//! Multi-layer network: a validated chain of dense layers.

use crate::align::AlignedMatrix;
use crate::error::Error;
use crate::layer::{Init, Layer};
use crate::random::Randomizer;
use crate::real::Real;
use rayon::prelude::*;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Default momentum coefficient for back-propagation
pub const DEFAULT_MOMENTUM: f64 = 0.3;

/// A feed-forward network over a fixed, linear layer stack.
///
/// The topology is a shape descriptor, e.g. `[2, 2, 1]` for two inputs,
/// one hidden layer of two neurons and one output. It is validated once
/// at construction; every operation re-checks the dimensions of the
/// buffers it is handed.
#[derive(Debug)]
pub struct Network<T: Real> {
    shape: Vec<usize>,
    layers: Vec<Layer<T>>,
    momentum: f64,
}

fn validate_shape(shape: &[usize]) -> Result<(), Error> {
    if shape.len() < 2 {
        return Err(Error::ShapeMismatch(format!(
            "a network needs at least an input and an output width, got {:?}",
            shape
        )));
    }
    if shape.iter().any(|&w| w == 0) {
        return Err(Error::ShapeMismatch(format!(
            "layer widths must be positive, got {:?}",
            shape
        )));
    }
    Ok(())
}

impl<T: Real> Network<T> {
    /// Create a network with randomly initialized layers
    pub fn new(shape: &[usize], init: Init, rand: &mut Randomizer) -> Result<Self, Error> {
        validate_shape(shape)?;

        let layers = shape
            .windows(2)
            .map(|w| Layer::new(w[0], w[1], init, rand))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            shape: shape.to_vec(),
            layers,
            momentum: DEFAULT_MOMENTUM,
        })
    }

    /// Create a child as a per-parameter random merge of two parents of
    /// identical topology
    pub fn crossover(first: &Self, second: &Self, rand: &mut Randomizer) -> Result<Self, Error> {
        first.check_same_topology(second)?;

        let layers = first
            .layers
            .iter()
            .zip(&second.layers)
            .map(|(a, b)| Layer::from_merged_parents(a, b, rand))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            shape: first.shape.clone(),
            layers,
            momentum: first.momentum,
        })
    }

    /// Overwrite this network with a random merge of two parents
    pub fn set_from_merged_parents(
        &mut self,
        first: &Self,
        second: &Self,
        rand: &mut Randomizer,
    ) -> Result<(), Error> {
        self.check_same_topology(first)?;
        first.check_same_topology(second)?;

        for ((dst, a), b) in self.layers.iter_mut().zip(&first.layers).zip(&second.layers) {
            dst.set_from_merged_parents(a, b, rand)?;
        }
        Ok(())
    }

    #[inline]
    pub fn input(&self) -> usize {
        self.shape[0]
    }

    #[inline]
    pub fn output(&self) -> usize {
        self.shape[self.shape.len() - 1]
    }

    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Momentum coefficient used by back-propagation
    pub fn set_momentum(&mut self, momentum: f64) {
        self.momentum = momentum;
    }

    fn check_same_topology(&self, other: &Self) -> Result<(), Error> {
        if self.shape != other.shape {
            return Err(Error::ShapeMismatch(format!(
                "network {:?} vs {:?}",
                self.shape, other.shape
            )));
        }
        Ok(())
    }

    fn check_batch(
        &self,
        input: &AlignedMatrix<T>,
        output: &AlignedMatrix<T>,
        output_cols: usize,
    ) -> Result<(), Error> {
        if input.rows() != output.rows() {
            return Err(Error::ShapeMismatch(format!(
                "{} input rows vs {} output rows",
                input.rows(),
                output.rows()
            )));
        }
        if input.cols() != self.input() || output.cols() != output_cols {
            return Err(Error::ShapeMismatch(format!(
                "batch {}x{} does not fit a {:?} network",
                input.cols(),
                output.cols(),
                self.shape
            )));
        }
        Ok(())
    }

    fn forward_into_with(
        &self,
        input: &[T],
        output: &mut [T],
        kernel: fn(&Layer<T>, &[T], &mut [T]),
    ) {
        debug_assert!(input.len() >= self.input());
        debug_assert!(output.len() >= self.output());

        let last = self.layers.len() - 1;
        if last == 0 {
            kernel(&self.layers[0], input, output);
            return;
        }

        let mut current: Vec<T> = vec![T::ZERO; self.shape[1]];
        kernel(&self.layers[0], input, &mut current);
        for (k, layer) in self.layers.iter().enumerate().skip(1) {
            if k == last {
                kernel(layer, &current, output);
            } else {
                let mut next = vec![T::ZERO; self.shape[k + 1]];
                kernel(layer, &current, &mut next);
                current = next;
            }
        }
    }

    /// Reference forward pass through the whole chain
    pub fn forward_scalar_into(&self, input: &[T], output: &mut [T]) {
        self.forward_into_with(input, output, Layer::forward_scalar);
    }

    /// Vectorized forward pass through the whole chain
    pub fn forward_into(&self, input: &[T], output: &mut [T]) {
        self.forward_into_with(input, output, Layer::forward_simd);
    }

    /// Convenience single-sample evaluation returning a fresh vector
    pub fn forward(&self, input: &[T]) -> Vec<T> {
        let mut output = vec![T::ZERO; self.output()];
        self.forward_into(input, &mut output);
        output
    }

    /// Row-by-row scalar batch evaluation (the reference path)
    pub fn batch_forward_scalar(
        &self,
        input: &AlignedMatrix<T>,
        output: &mut AlignedMatrix<T>,
    ) -> Result<(), Error> {
        self.check_batch(input, output, self.output())?;
        for (in_row, out_row) in input.rows_iter().zip(output.rows_iter_mut()) {
            self.forward_scalar_into(in_row, out_row);
        }
        Ok(())
    }

    /// Row-by-row vectorized batch evaluation on the calling thread
    pub fn batch_forward(
        &self,
        input: &AlignedMatrix<T>,
        output: &mut AlignedMatrix<T>,
    ) -> Result<(), Error> {
        self.check_batch(input, output, self.output())?;
        for (in_row, out_row) in input.rows_iter().zip(output.rows_iter_mut()) {
            self.forward_into(in_row, out_row);
        }
        Ok(())
    }

    /// Vectorized batch evaluation fanned out across the worker pool.
    /// Rows are independent; each worker writes only its own output row.
    pub fn par_batch_forward(
        &self,
        input: &AlignedMatrix<T>,
        output: &mut AlignedMatrix<T>,
    ) -> Result<(), Error> {
        self.check_batch(input, output, self.output())?;
        output
            .par_rows_mut()
            .zip(input.par_rows())
            .for_each(|(out_row, in_row)| self.forward_into(in_row, out_row));
        Ok(())
    }

    /// Mean over rows of the per-row mean squared output error
    pub fn error(
        &self,
        actual: &AlignedMatrix<T>,
        expected: &AlignedMatrix<T>,
    ) -> Result<f64, Error> {
        if actual.rows() != expected.rows() || actual.cols() != expected.cols() {
            return Err(Error::ShapeMismatch(format!(
                "{}x{} actual vs {}x{} expected",
                actual.rows(),
                actual.cols(),
                expected.rows(),
                expected.cols()
            )));
        }

        let mut total = 0.0;
        for (a_row, e_row) in actual.rows_iter().zip(expected.rows_iter()) {
            let mut row_err = 0.0;
            for (&a, &e) in a_row.iter().zip(e_row) {
                let diff = (e - a).to_f64();
                row_err += diff * diff;
            }
            total += row_err / a_row.len() as f64;
        }
        Ok(total / actual.rows() as f64)
    }

    /// Perturb every layer in place
    pub fn mutate(&mut self, rate: f64, rand: &mut Randomizer) {
        for layer in &mut self.layers {
            layer.mutate(rate, rand);
        }
    }

    /// One back-propagation pass over the batch. For each sample the
    /// forward outputs of every layer are cached, the terminal gradient is
    /// `expected - actual`, and the gradient handed to each earlier layer
    /// is computed before that layer's weights move. Returns the mean
    /// squared error of the batch measured before the updates.
    pub fn back_propagation(
        &mut self,
        input: &AlignedMatrix<T>,
        expected: &AlignedMatrix<T>,
        learning_rate: f64,
    ) -> Result<f64, Error> {
        self.check_batch(input, expected, self.output())?;

        let depth = self.layers.len();
        let mut values: Vec<Vec<T>> = self.shape.iter().map(|&w| vec![T::ZERO; w]).collect();
        let mut grads: Vec<Vec<T>> = self.shape.iter().map(|&w| vec![T::ZERO; w]).collect();

        let mut total_error = 0.0;
        for (in_row, exp_row) in input.rows_iter().zip(expected.rows_iter()) {
            // forward pass, caching every layer's output
            values[0].copy_from_slice(in_row);
            for k in 0..depth {
                let (lower, upper) = values.split_at_mut(k + 1);
                self.layers[k].forward_simd(&lower[k], &mut upper[0]);
            }

            // terminal gradient is the raw output error
            let mut sample_error = 0.0;
            for ((g, &e), &a) in grads[depth].iter_mut().zip(exp_row).zip(&values[depth]) {
                let diff = e - a;
                *g = diff;
                sample_error += diff.to_f64() * diff.to_f64();
            }
            total_error += sample_error / self.output() as f64;

            // backward pass
            for k in (0..depth).rev() {
                let (lower, upper) = grads.split_at_mut(k + 1);
                if k > 0 {
                    self.layers[k].backward_deltas(&values[k], &upper[0], &mut lower[k]);
                }
                self.layers[k].apply_gradient(&values[k], &upper[0], learning_rate, self.momentum);
            }
        }

        Ok(total_error / input.rows() as f64)
    }

    /// Write all layer records, outermost layer first
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), Error> {
        for layer in &self.layers {
            layer.write_to(writer)?;
        }
        Ok(())
    }

    /// Read a network of a known topology from a byte stream
    pub fn read_from<R: Read>(reader: &mut R, shape: &[usize]) -> Result<Self, Error> {
        validate_shape(shape)?;

        let layers = shape
            .windows(2)
            .map(|w| Layer::read_from(reader, w[0], w[1]))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            shape: shape.to_vec(),
            layers,
            momentum: DEFAULT_MOMENTUM,
        })
    }

    /// Save to a file in the binary layer-record format
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
        let mut writer = BufWriter::new(File::create(&path)?);
        self.write_to(&mut writer)?;
        log::info!("Network {:?} saved: {}", self.shape, path.as_ref().display());
        Ok(())
    }

    /// Load a network of a known topology from a file
    pub fn load<P: AsRef<Path>>(path: P, shape: &[usize]) -> Result<Self, Error> {
        let mut reader = BufReader::new(File::open(&path)?);
        let network = Self::read_from(&mut reader, shape)?;
        log::info!("Network {:?} loaded: {}", shape, path.as_ref().display());
        Ok(network)
    }

    /// Structural and parameter equality within the tolerance
    pub fn approx_eq(&self, other: &Self) -> bool {
        self.shape == other.shape
            && self
                .layers
                .iter()
                .zip(&other.layers)
                .all(|(a, b)| a.approx_eq(b))
    }

    /// Explicit deep copy of the trainable parameters
    pub fn deep_clone(&self) -> Self {
        Self {
            shape: self.shape.clone(),
            layers: self.layers.iter().map(Layer::deep_clone).collect(),
            momentum: self.momentum,
        }
    }
}
