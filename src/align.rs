//! Row-major matrix storage with SIMD-aligned rows.
//!
//! Every row starts at a 32-byte boundary: the row stride is the logical
//! column count padded up to a multiple of the lane width. Padding elements
//! are zeroed at allocation and preserved through serialization so vector
//! loads over the tail never see garbage.

use crate::error::Error;
use crate::file;
use crate::real::{Real, VECTOR_BYTES};
use rayon::prelude::*;
use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::io::{Read, Write};
use std::ops::{Index, IndexMut};
use std::ptr::NonNull;

/// Owned dense matrix whose rows are padded to the SIMD lane width.
///
/// Deliberately not `Clone`: the buffers are large and exclusively owned.
/// Use [`AlignedMatrix::deep_clone`] when a copy is really wanted.
pub struct AlignedMatrix<T: Real> {
    ptr: NonNull<T>,
    rows: usize,
    cols: usize,
    stride: usize,
}

// Safety: the matrix exclusively owns its buffer and hands out references
// only through &self / &mut self.
unsafe impl<T: Real> Send for AlignedMatrix<T> {}
unsafe impl<T: Real> Sync for AlignedMatrix<T> {}

impl<T: Real> AlignedMatrix<T> {
    /// Row stride for a logical column count: padded to a full lane
    pub fn aligned_width(cols: usize) -> usize {
        cols.div_ceil(T::LANES) * T::LANES
    }

    fn layout(len: usize) -> Layout {
        Layout::from_size_align(len * std::mem::size_of::<T>(), VECTOR_BYTES)
            .expect("matrix dimensions overflow the allocation size")
    }

    /// Allocate a zero-filled `rows x cols` matrix
    pub fn zeroed(rows: usize, cols: usize) -> Self {
        assert!(rows > 0 && cols > 0, "matrix dimensions must be positive");

        let stride = Self::aligned_width(cols);
        let layout = Self::layout(rows * stride);
        // Safety: layout is non-zero sized; alloc failure aborts via
        // handle_alloc_error
        let ptr = unsafe {
            let raw = alloc_zeroed(layout);
            if raw.is_null() {
                std::alloc::handle_alloc_error(layout);
            }
            NonNull::new_unchecked(raw as *mut T)
        };

        Self {
            ptr,
            rows,
            cols,
            stride,
        }
    }

    /// Copy an unaligned row-major buffer into the padded layout
    pub fn from_unaligned(data: &[T], rows: usize, cols: usize) -> Result<Self, Error> {
        if rows == 0 || cols == 0 {
            return Err(Error::ShapeMismatch(format!(
                "matrix dimensions must be positive, got {}x{}",
                rows, cols
            )));
        }
        if data.len() != rows * cols {
            return Err(Error::ShapeMismatch(format!(
                "source buffer holds {} elements, {}x{} needs {}",
                data.len(),
                rows,
                cols,
                rows * cols
            )));
        }

        let mut matrix = Self::zeroed(rows, cols);
        for (dst, src) in matrix.rows_iter_mut().zip(data.chunks(cols)) {
            dst.copy_from_slice(src);
        }
        Ok(matrix)
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Padded row stride in elements
    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    #[inline]
    fn data(&self) -> &[T] {
        // Safety: the buffer holds exactly rows * stride initialized elements
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.rows * self.stride) }
    }

    #[inline]
    fn data_mut(&mut self) -> &mut [T] {
        // Safety: as above, and &mut self guarantees exclusivity
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.rows * self.stride) }
    }

    /// Bounds-checked row access (logical columns only)
    pub fn row(&self, row: usize) -> Result<&[T], Error> {
        if row >= self.rows {
            return Err(Error::RowOutOfRange {
                row,
                rows: self.rows,
            });
        }
        let start = row * self.stride;
        Ok(&self.data()[start..start + self.cols])
    }

    /// Bounds-checked mutable row access (logical columns only)
    pub fn row_mut(&mut self, row: usize) -> Result<&mut [T], Error> {
        if row >= self.rows {
            return Err(Error::RowOutOfRange {
                row,
                rows: self.rows,
            });
        }
        let start = row * self.stride;
        let cols = self.cols;
        Ok(&mut self.data_mut()[start..start + cols])
    }

    /// Iterate rows as logical-width slices
    pub fn rows_iter(&self) -> impl Iterator<Item = &[T]> {
        let cols = self.cols;
        self.data().chunks(self.stride).map(move |r| &r[..cols])
    }

    /// Iterate rows as logical-width mutable slices
    pub fn rows_iter_mut(&mut self) -> impl Iterator<Item = &mut [T]> {
        let cols = self.cols;
        let stride = self.stride;
        self.data_mut()
            .chunks_mut(stride)
            .map(move |r| &mut r[..cols])
    }

    /// Parallel row iterator; rows are disjoint so no locking is needed
    pub fn par_rows(&self) -> impl IndexedParallelIterator<Item = &[T]> {
        let cols = self.cols;
        self.data().par_chunks(self.stride).map(move |r| &r[..cols])
    }

    /// Parallel mutable row iterator over disjoint rows
    pub fn par_rows_mut(&mut self) -> impl IndexedParallelIterator<Item = &mut [T]> {
        let cols = self.cols;
        let stride = self.stride;
        self.data_mut()
            .par_chunks_mut(stride)
            .map(move |r| &mut r[..cols])
    }

    /// Element-wise comparison of the logical columns within the
    /// per-precision tolerance
    pub fn approx_eq(&self, other: &Self) -> bool {
        self.rows == other.rows
            && self.cols == other.cols
            && self
                .rows_iter()
                .zip(other.rows_iter())
                .all(|(a, b)| T::all_approx_eq(a, b))
    }

    /// Explicit deep copy, padding included
    pub fn deep_clone(&self) -> Self {
        let mut copy = Self::zeroed(self.rows, self.cols);
        copy.data_mut().copy_from_slice(self.data());
        copy
    }

    /// Write the framed matrix: row count, element size, row stride, then
    /// the raw rows (padding included, for byte-exact round trips)
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), Error> {
        file::write_u32(writer, self.rows as u32)?;
        file::write_u32(writer, T::ELEM_SIZE)?;
        file::write_u32(writer, self.stride as u32)?;
        self.write_rows(writer)
    }

    /// Read a framed matrix, validating every declared dimension against
    /// the shape the reader expects
    pub fn read_from<R: Read>(reader: &mut R, rows: usize, cols: usize) -> Result<Self, Error> {
        let mut matrix = Self::zeroed(rows, cols);
        file::expect_u32(reader, rows as u32, "matrix row count")?;
        file::expect_u32(reader, T::ELEM_SIZE, "matrix element size")?;
        file::expect_u32(reader, matrix.stride as u32, "matrix row stride")?;
        matrix.read_rows(reader)?;
        Ok(matrix)
    }

    /// Write only the raw row data (used inside layer records)
    pub(crate) fn write_rows<W: Write>(&self, writer: &mut W) -> Result<(), Error> {
        for &value in self.data() {
            value.write_elem(writer)?;
        }
        Ok(())
    }

    /// Fill the buffer from raw row data
    pub(crate) fn read_rows<R: Read>(&mut self, reader: &mut R) -> Result<(), Error> {
        for value in self.data_mut() {
            *value = T::read_elem(reader)?;
        }
        Ok(())
    }
}

impl<T: Real> Index<(usize, usize)> for AlignedMatrix<T> {
    type Output = T;

    #[inline]
    fn index(&self, (row, col): (usize, usize)) -> &T {
        debug_assert!(row < self.rows && col < self.cols);
        &self.data()[row * self.stride + col]
    }
}

impl<T: Real> IndexMut<(usize, usize)> for AlignedMatrix<T> {
    #[inline]
    fn index_mut(&mut self, (row, col): (usize, usize)) -> &mut T {
        debug_assert!(row < self.rows && col < self.cols);
        let stride = self.stride;
        &mut self.data_mut()[row * stride + col]
    }
}

impl<T: Real> Drop for AlignedMatrix<T> {
    fn drop(&mut self) {
        let layout = Self::layout(self.rows * self.stride);
        unsafe {
            dealloc(self.ptr.as_ptr() as *mut u8, layout);
        }
    }
}

impl<T: Real> std::fmt::Debug for AlignedMatrix<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlignedMatrix")
            .field("rows", &self.rows)
            .field("cols", &self.cols)
            .field("stride", &self.stride)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_stride_padding() {
        assert_eq!(AlignedMatrix::<f64>::aligned_width(2), 4);
        assert_eq!(AlignedMatrix::<f64>::aligned_width(4), 4);
        assert_eq!(AlignedMatrix::<f64>::aligned_width(5), 8);
        assert_eq!(AlignedMatrix::<f32>::aligned_width(2), 8);
        assert_eq!(AlignedMatrix::<f32>::aligned_width(8), 8);
        assert_eq!(AlignedMatrix::<f32>::aligned_width(9), 16);
    }

    #[test]
    fn test_rows_are_aligned() {
        let m = AlignedMatrix::<f64>::zeroed(5, 3);
        for i in 0..5 {
            let addr = m.row(i).unwrap().as_ptr() as usize;
            assert_eq!(addr % VECTOR_BYTES, 0);
        }
    }

    #[test]
    fn test_from_unaligned_copies_rows() {
        let data: Vec<f64> = (0..6).map(|i| i as f64).collect();
        let m = AlignedMatrix::from_unaligned(&data, 3, 2).unwrap();

        assert_eq!(m.row(0).unwrap(), &[0.0, 1.0]);
        assert_eq!(m.row(1).unwrap(), &[2.0, 3.0]);
        assert_eq!(m.row(2).unwrap(), &[4.0, 5.0]);
        // padding beyond the logical columns stays zeroed
        assert_eq!(m.stride(), 4);
        assert_eq!(m[(2, 1)], 5.0);
    }

    #[test]
    fn test_from_unaligned_length_check() {
        let data = vec![0.0f64; 5];
        assert!(matches!(
            AlignedMatrix::from_unaligned(&data, 3, 2),
            Err(Error::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_row_out_of_range() {
        let m = AlignedMatrix::<f32>::zeroed(2, 4);
        assert!(m.row(1).is_ok());
        assert!(matches!(
            m.row(2),
            Err(Error::RowOutOfRange { row: 2, rows: 2 })
        ));
    }

    #[test]
    fn test_round_trip() {
        let data: Vec<f32> = (0..12).map(|i| i as f32 * 0.5).collect();
        let m = AlignedMatrix::from_unaligned(&data, 4, 3).unwrap();

        let mut buf = Vec::new();
        m.write_to(&mut buf).unwrap();

        let restored = AlignedMatrix::<f32>::read_from(&mut Cursor::new(buf), 4, 3).unwrap();
        assert!(m.approx_eq(&restored));
    }

    #[test]
    fn test_read_rejects_wrong_shape() {
        let m = AlignedMatrix::<f64>::zeroed(4, 3);
        let mut buf = Vec::new();
        m.write_to(&mut buf).unwrap();

        let err = AlignedMatrix::<f64>::read_from(&mut Cursor::new(buf), 5, 3).unwrap_err();
        assert!(matches!(err, Error::Format(_)));
    }

    #[test]
    fn test_read_rejects_wrong_element_size() {
        let m = AlignedMatrix::<f64>::zeroed(2, 4);
        let mut buf = Vec::new();
        m.write_to(&mut buf).unwrap();

        // same row count, but f32 reader expects element size 4
        let err = AlignedMatrix::<f32>::read_from(&mut Cursor::new(buf), 2, 4).unwrap_err();
        assert!(matches!(err, Error::Format(_)));
    }

    #[test]
    fn test_deep_clone_is_independent() {
        let mut m = AlignedMatrix::<f64>::zeroed(2, 2);
        m[(0, 0)] = 1.5;

        let copy = m.deep_clone();
        m[(0, 0)] = -1.5;
        assert_eq!(copy[(0, 0)], 1.5);
        assert!(!m.approx_eq(&copy));
    }

    #[test]
    fn test_parallel_rows_match_serial() {
        let data: Vec<f64> = (0..40).map(|i| i as f64).collect();
        let m = AlignedMatrix::from_unaligned(&data, 10, 4).unwrap();

        let serial: Vec<f64> = m.rows_iter().map(|r| r.iter().sum()).collect();
        let parallel: Vec<f64> = m.par_rows().map(|r| r.iter().sum()).collect();
        assert_eq!(serial, parallel);
    }
}
