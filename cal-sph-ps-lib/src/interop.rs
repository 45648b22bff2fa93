// SPDX-License-Identifier: MPL-2.0

//! Interoperability conversions between the image and matrix types.

use crate::raster::Raster;
use image::{DynamicImage, GrayImage, ImageBuffer, Rgb, RgbImage};
use nalgebra::DMatrix;

// Matrix -> Image -------------------------------------------------------------
// -----------------------------------------------------------------------------

/// Convert any raster into a gray level image.
///
/// Matrices are column major while images are row major,
/// so this is a transposition of the storage.
#[allow(clippy::cast_possible_truncation)]
pub fn gray_image<R: Raster>(raster: &R) -> GrayImage {
    let (rows, cols) = raster.shape();
    GrayImage::from_fn(cols as u32, rows as u32, |x, y| {
        image::Luma([raster.get(y as usize, x as usize).unwrap_or(0)])
    })
}

/// Convert an RGB matrix, typically encoded normals, into an RGB image.
#[allow(clippy::cast_possible_truncation)]
pub fn rgb_image(mat: &DMatrix<(u8, u8, u8)>) -> RgbImage {
    let (rows, cols) = mat.shape();
    ImageBuffer::from_fn(cols as u32, rows as u32, |x, y| {
        let (r, g, b) = mat[(y as usize, x as usize)];
        Rgb([r, g, b])
    })
}

pub trait ToImage {
    fn to_image(&self) -> DynamicImage;
}

impl ToImage for DMatrix<u8> {
    fn to_image(&self) -> DynamicImage {
        DynamicImage::ImageLuma8(gray_image(self))
    }
}

impl ToImage for DMatrix<(u8, u8, u8)> {
    fn to_image(&self) -> DynamicImage {
        DynamicImage::ImageRgb8(rgb_image(self))
    }
}

// Image -> Matrix -------------------------------------------------------------
// -----------------------------------------------------------------------------

/// Convert a gray image into a matrix.
/// Inverse operation of `gray_image`.
pub fn matrix_from_gray(img: GrayImage) -> DMatrix<u8> {
    let (width, height) = img.dimensions();
    DMatrix::from_row_slice(height as usize, width as usize, &img.into_raw())
}

/// Gray level matrix of an image of any type.
///
/// Color images are converted with the luma weights of the `image` crate,
/// 16 bits images are reduced to 8 bits.
pub trait IntoGrayMatrix {
    fn into_gray_matrix(self) -> DMatrix<u8>;
}

impl IntoGrayMatrix for DynamicImage {
    fn into_gray_matrix(self) -> DMatrix<u8> {
        match self {
            DynamicImage::ImageLuma8(img) => matrix_from_gray(img),
            other => matrix_from_gray(other.into_luma8()),
        }
    }
}
