// SPDX-License-Identifier: MPL-2.0

//! Gray level raster abstraction consumed by every stage of the pipeline.

use image::{GrayImage, Luma};
use nalgebra::DMatrix;
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Pixel ({row}, {col}) is outside of a {rows}x{cols} raster")]
pub struct OutOfBounds {
    pub row: usize,
    pub col: usize,
    pub rows: usize,
    pub cols: usize,
}

/// Read access to a 2D grid of 8 bits intensities.
pub trait Raster {
    fn rows(&self) -> usize;
    fn cols(&self) -> usize;

    /// Intensity at (row, col), `None` outside of the raster.
    fn get(&self, row: usize, col: usize) -> Option<u8>;

    fn shape(&self) -> (usize, usize) {
        (self.rows(), self.cols())
    }

    fn is_empty(&self) -> bool {
        self.rows() == 0 || self.cols() == 0
    }

    /// Iterate over `(row, col, value)` in row-major order.
    fn pixels(&self) -> RowMajor<'_, Self>
    where
        Self: Sized,
    {
        RowMajor {
            raster: self,
            row: 0,
            col: 0,
        }
    }
}

/// Write access, bounds checked.
pub trait RasterMut: Raster {
    fn set(&mut self, row: usize, col: usize, value: u8) -> Result<(), OutOfBounds>;
}

/// Check that two rasters have the same number of rows and columns.
pub fn same_shape<A: Raster, B: Raster>(a: &A, b: &B) -> bool {
    a.shape() == b.shape()
}

/// Row-major iterator returned by [`Raster::pixels`].
pub struct RowMajor<'a, R> {
    raster: &'a R,
    row: usize,
    col: usize,
}

impl<'a, R: Raster> Iterator for RowMajor<'a, R> {
    type Item = (usize, usize, u8);
    fn next(&mut self) -> Option<Self::Item> {
        if self.raster.cols() == 0 {
            return None;
        }
        let value = self.raster.get(self.row, self.col)?;
        let item = (self.row, self.col, value);
        self.col += 1;
        if self.col == self.raster.cols() {
            self.col = 0;
            self.row += 1;
        }
        Some(item)
    }
}

fn out_of_bounds<R: Raster>(raster: &R, row: usize, col: usize) -> OutOfBounds {
    OutOfBounds {
        row,
        col,
        rows: raster.rows(),
        cols: raster.cols(),
    }
}

// Matrices --------------------------------------------------------------------

impl Raster for DMatrix<u8> {
    fn rows(&self) -> usize {
        self.nrows()
    }
    fn cols(&self) -> usize {
        self.ncols()
    }
    fn get(&self, row: usize, col: usize) -> Option<u8> {
        // Inherent matrix indexing, not a recursive call.
        self.get((row, col)).copied()
    }
}

impl RasterMut for DMatrix<u8> {
    fn set(&mut self, row: usize, col: usize, value: u8) -> Result<(), OutOfBounds> {
        let err = out_of_bounds(self, row, col);
        let px = self.get_mut((row, col)).ok_or(err)?;
        *px = value;
        Ok(())
    }
}

// Images ----------------------------------------------------------------------

// Images are indexed (x, y) so row is y and col is x.
// `ImageBuffer::rows` is an inherent iterator, hence the explicit sizes below.

fn image_contains(img: &GrayImage, row: usize, col: usize) -> bool {
    row < img.height() as usize && col < img.width() as usize
}

impl Raster for GrayImage {
    fn rows(&self) -> usize {
        self.height() as usize
    }
    fn cols(&self) -> usize {
        self.width() as usize
    }
    fn get(&self, row: usize, col: usize) -> Option<u8> {
        if image_contains(self, row, col) {
            Some(self.get_pixel(col as u32, row as u32)[0])
        } else {
            None
        }
    }
}

impl RasterMut for GrayImage {
    fn set(&mut self, row: usize, col: usize, value: u8) -> Result<(), OutOfBounds> {
        if image_contains(self, row, col) {
            self.put_pixel(col as u32, row as u32, Luma([value]));
            Ok(())
        } else {
            Err(out_of_bounds(self, row, col))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matrix_and_image_agree_on_orientation() {
        // 2 rows, 3 cols.
        let mat = DMatrix::from_row_slice(2, 3, &[1u8, 2, 3, 4, 5, 6]);
        let img = GrayImage::from_raw(3, 2, vec![1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(mat.shape(), (2, 3));
        assert_eq!(Raster::shape(&img), (2, 3));
        for row in 0..2 {
            for col in 0..3 {
                assert_eq!(Raster::get(&mat, row, col), Raster::get(&img, row, col));
            }
        }
        assert_eq!(Raster::get(&mat, 1, 0), Some(4));
        assert_eq!(Raster::get(&img, 2, 0), None);
        assert_eq!(Raster::get(&mat, 0, 3), None);
    }

    #[test]
    fn set_is_bounds_checked() {
        let mut mat = DMatrix::<u8>::zeros(2, 2);
        assert!(mat.set(1, 1, 9).is_ok());
        assert_eq!(Raster::get(&mat, 1, 1), Some(9));
        let err = mat.set(2, 0, 1).unwrap_err();
        assert_eq!((err.row, err.rows), (2, 2));

        let mut img = GrayImage::new(2, 2);
        assert!(img.set(0, 1, 7).is_ok());
        assert_eq!(img.get_pixel(1, 0)[0], 7);
        assert!(img.set(0, 2, 7).is_err());
    }

    #[test]
    fn pixels_are_row_major() {
        let mat = DMatrix::from_row_slice(2, 2, &[10u8, 20, 30, 40]);
        let values: Vec<_> = mat.pixels().collect();
        assert_eq!(
            values,
            vec![(0, 0, 10), (0, 1, 20), (1, 0, 30), (1, 1, 40)]
        );
        assert_eq!(DMatrix::<u8>::zeros(0, 4).pixels().count(), 0);
    }
}
