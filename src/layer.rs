//! A single dense layer: weights, biases, and the forward/backward kernels.

use crate::align::AlignedMatrix;
use crate::error::Error;
use crate::file;
use crate::random::Randomizer;
use crate::real::Real;
use std::io::{Read, Write};

/// Weight floor below which a link is considered dead during mutation
const DEAD_LINK_FLOOR: f64 = 1e-5;
/// Reseed magnitude for dead links, flipped across zero
const DEAD_LINK_RESEED: f64 = 1e-2;

/// Weight initialization policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Init {
    /// Wide uniform range scaled by fan-in, suited to evolutionary search
    Evolution,
    /// Narrow uniform range scaled by fan-in, suited to gradient descent
    Gradient,
}

impl Init {
    fn abs_max(self, fan_in: usize) -> f64 {
        match self {
            Init::Evolution => 2.0 / (fan_in as f64).sqrt(),
            Init::Gradient => 1.0 / fan_in as f64,
        }
    }
}

/// One dense layer mapping `input` values to `output` activations.
///
/// Row `i` of the weight matrix holds the weights feeding output neuron
/// `i`. The transposed reverse-weight matrix is cached lazily for the
/// backward pass and invalidated by any weight mutation.
#[derive(Debug)]
pub struct Layer<T: Real> {
    input: usize,
    output: usize,
    weights: AlignedMatrix<T>,
    /// Bias added to each output neuron before activation
    output_bias: Vec<T>,
    /// Bias over the inputs, reserved for the reverse/generative pass
    input_bias: Vec<T>,
    reverse: Option<AlignedMatrix<T>>,
    reverse_dirty: bool,
    /// Previous gradient deltas, allocated on the first update
    delta: Option<AlignedMatrix<T>>,
}

impl<T: Real> Layer<T> {
    /// Create a randomly initialized layer
    pub fn new(input: usize, output: usize, init: Init, rand: &mut Randomizer) -> Result<Self, Error> {
        if input == 0 || output == 0 {
            return Err(Error::ShapeMismatch(format!(
                "layer widths must be positive, got {}x{}",
                input, output
            )));
        }

        let abs_max = init.abs_max(input);
        let mut weights = AlignedMatrix::zeroed(output, input);
        for row in weights.rows_iter_mut() {
            for w in row {
                *w = T::from_f64(rand.range(abs_max));
            }
        }
        let output_bias = (0..output).map(|_| T::from_f64(rand.range(abs_max))).collect();
        let input_bias = (0..input).map(|_| T::from_f64(rand.range(abs_max))).collect();

        Ok(Self {
            input,
            output,
            weights,
            output_bias,
            input_bias,
            reverse: None,
            reverse_dirty: true,
            delta: None,
        })
    }

    /// Create a child layer by a per-parameter unbiased coin flip
    pub fn from_merged_parents(
        first: &Self,
        second: &Self,
        rand: &mut Randomizer,
    ) -> Result<Self, Error> {
        first.check_same_shape(second)?;

        let mut child = Self {
            input: first.input,
            output: first.output,
            weights: AlignedMatrix::zeroed(first.output, first.input),
            output_bias: vec![T::ZERO; first.output],
            input_bias: vec![T::ZERO; first.input],
            reverse: None,
            reverse_dirty: true,
            delta: None,
        };
        child.set_from_merged_parents(first, second, rand)?;
        Ok(child)
    }

    /// Overwrite this layer with a random merge of two parents. Every
    /// weight and bias is inherited whole from one parent or the other,
    /// no blending.
    pub fn set_from_merged_parents(
        &mut self,
        first: &Self,
        second: &Self,
        rand: &mut Randomizer,
    ) -> Result<(), Error> {
        first.check_same_shape(second)?;
        self.check_same_shape(first)?;

        for ((dst, a), b) in self
            .weights
            .rows_iter_mut()
            .zip(first.weights.rows_iter())
            .zip(second.weights.rows_iter())
        {
            for ((d, &wa), &wb) in dst.iter_mut().zip(a).zip(b) {
                *d = if rand.next_bool() { wa } else { wb };
            }
        }
        for ((d, &a), &b) in self
            .output_bias
            .iter_mut()
            .zip(&first.output_bias)
            .zip(&second.output_bias)
        {
            *d = if rand.next_bool() { a } else { b };
        }
        for ((d, &a), &b) in self
            .input_bias
            .iter_mut()
            .zip(&first.input_bias)
            .zip(&second.input_bias)
        {
            *d = if rand.next_bool() { a } else { b };
        }

        self.reverse_dirty = true;
        Ok(())
    }

    #[inline]
    pub fn input(&self) -> usize {
        self.input
    }

    #[inline]
    pub fn output(&self) -> usize {
        self.output
    }

    fn check_same_shape(&self, other: &Self) -> Result<(), Error> {
        if self.input != other.input || self.output != other.output {
            return Err(Error::ShapeMismatch(format!(
                "layer {}x{} vs {}x{}",
                self.input, self.output, other.input, other.output
            )));
        }
        Ok(())
    }

    /// Reference forward pass: plain scalar dot products
    pub fn forward_scalar(&self, input: &[T], output: &mut [T]) {
        debug_assert!(input.len() >= self.input);
        debug_assert!(output.len() >= self.output);

        for (row, (out, &bias)) in self
            .weights
            .rows_iter()
            .zip(output.iter_mut().zip(&self.output_bias))
        {
            let mut sum = bias;
            for (&w, &x) in row.iter().zip(input) {
                sum += w * x;
            }
            *out = T::activate(sum);
        }
    }

    /// Vectorized forward pass; agrees with [`Self::forward_scalar`]
    /// within the per-precision tolerance
    pub fn forward_simd(&self, input: &[T], output: &mut [T]) {
        debug_assert!(input.len() >= self.input);
        debug_assert!(output.len() >= self.output);

        let input = &input[..self.input];
        for (row, (out, &bias)) in self
            .weights
            .rows_iter()
            .zip(output.iter_mut().zip(&self.output_bias))
        {
            *out = T::activate(bias + T::dot_aligned(row, input));
        }
    }

    /// Perturb every weight and bias in place. Near-dead links (below the
    /// 1e-5 floor) are first reseeded across zero so they stay evolvable,
    /// then every parameter is multiplied by a quotient in
    /// `(1 - rate, 1 + rate)`.
    pub fn mutate(&mut self, rate: f64, rand: &mut Randomizer) {
        fn perturb<T: Real>(value: &mut T, rate: f64, rand: &mut Randomizer) {
            let mut v = value.to_f64();
            if v.abs() < DEAD_LINK_FLOOR {
                v = if v < 0.0 {
                    DEAD_LINK_RESEED
                } else {
                    -DEAD_LINK_RESEED
                };
            }
            *value = T::from_f64(v * rand.offset(rate));
        }

        for row in self.weights.rows_iter_mut() {
            for w in row {
                perturb(w, rate, rand);
            }
        }
        for b in &mut self.output_bias {
            perturb(b, rate, rand);
        }
        for c in &mut self.input_bias {
            perturb(c, rate, rand);
        }
        self.reverse_dirty = true;
    }

    /// Transposed weight cache, rebuilt on demand after mutations. Only
    /// the owning layer ever rebuilds it (single-writer discipline).
    fn reverse_weights(&mut self) -> &AlignedMatrix<T> {
        if self.reverse_dirty || self.reverse.is_none() {
            let mut rev = self
                .reverse
                .take()
                .unwrap_or_else(|| AlignedMatrix::zeroed(self.input, self.output));
            for i in 0..self.input {
                for j in 0..self.output {
                    rev[(i, j)] = self.weights[(j, i)];
                }
            }
            self.reverse = Some(rev);
            self.reverse_dirty = false;
        }
        match &self.reverse {
            Some(rev) => rev,
            None => unreachable!(),
        }
    }

    /// Gradient propagated to this layer's input:
    /// `in_grad[i] = derivative(input[i]) * sum_j weights[j][i] * out_grad[j]`
    pub fn backward_deltas(&mut self, input: &[T], out_grad: &[T], in_grad: &mut [T]) {
        debug_assert!(input.len() >= self.input);
        debug_assert!(out_grad.len() >= self.output);
        debug_assert!(in_grad.len() >= self.input);

        let n_out = self.output;
        let reverse = self.reverse_weights();
        for (row, (grad, &value)) in reverse
            .rows_iter()
            .zip(in_grad.iter_mut().zip(input))
        {
            *grad = T::derivative(value) * T::dot_aligned(row, &out_grad[..n_out]);
        }
    }

    /// Momentum gradient step:
    /// `delta = momentum * prev_delta + rate * out_grad[i] * input[j]`,
    /// added to the weight and kept as the next `prev_delta`. Biases move
    /// by `rate * out_grad[i]`.
    pub fn apply_gradient(&mut self, input: &[T], out_grad: &[T], rate: f64, momentum: f64) {
        debug_assert!(input.len() >= self.input);
        debug_assert!(out_grad.len() >= self.output);

        let lr = T::from_f64(rate);
        let mo = T::from_f64(momentum);
        let (n_in, n_out) = (self.input, self.output);
        let delta = self
            .delta
            .get_or_insert_with(|| AlignedMatrix::zeroed(n_out, n_in));

        for ((w_row, d_row), &g) in self
            .weights
            .rows_iter_mut()
            .zip(delta.rows_iter_mut())
            .zip(out_grad)
        {
            for ((w, d), &x) in w_row.iter_mut().zip(d_row).zip(input) {
                let step = mo * *d + lr * g * x;
                *d = step;
                *w += step;
            }
        }
        for (b, &g) in self.output_bias.iter_mut().zip(out_grad) {
            *b += lr * g;
        }
        self.reverse_dirty = true;
    }

    /// Write the layer record: input width, output width, element size,
    /// raw weight rows (aligned width, padding included), output bias,
    /// input bias
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), Error> {
        file::write_u32(writer, self.input as u32)?;
        file::write_u32(writer, self.output as u32)?;
        file::write_u32(writer, T::ELEM_SIZE)?;
        self.weights.write_rows(writer)?;
        for &b in &self.output_bias {
            b.write_elem(writer)?;
        }
        for &c in &self.input_bias {
            c.write_elem(writer)?;
        }
        Ok(())
    }

    /// Read a layer record, failing with a format error if any declared
    /// dimension or the element size disagrees with the expected shape
    pub fn read_from<R: Read>(reader: &mut R, input: usize, output: usize) -> Result<Self, Error> {
        file::expect_u32(reader, input as u32, "layer input width")?;
        file::expect_u32(reader, output as u32, "layer output width")?;
        file::expect_u32(reader, T::ELEM_SIZE, "layer element size")?;

        let mut weights = AlignedMatrix::zeroed(output, input);
        weights.read_rows(reader)?;

        let mut output_bias = vec![T::ZERO; output];
        for b in &mut output_bias {
            *b = T::read_elem(reader)?;
        }
        let mut input_bias = vec![T::ZERO; input];
        for c in &mut input_bias {
            *c = T::read_elem(reader)?;
        }

        Ok(Self {
            input,
            output,
            weights,
            output_bias,
            input_bias,
            reverse: None,
            reverse_dirty: true,
            delta: None,
        })
    }

    /// Element-wise comparison within the per-precision tolerance
    pub fn approx_eq(&self, other: &Self) -> bool {
        self.input == other.input
            && self.output == other.output
            && self.weights.approx_eq(&other.weights)
            && T::all_approx_eq(&self.output_bias, &other.output_bias)
            && T::all_approx_eq(&self.input_bias, &other.input_bias)
    }

    /// Explicit deep copy of the trainable parameters; caches are not
    /// carried over
    pub fn deep_clone(&self) -> Self {
        Self {
            input: self.input,
            output: self.output,
            weights: self.weights.deep_clone(),
            output_bias: self.output_bias.clone(),
            input_bias: self.input_bias.clone(),
            reverse: None,
            reverse_dirty: true,
            delta: None,
        }
    }
}
