// SPDX-License-Identifier: MPL-2.0

//! Localization of the calibration sphere in a thresholded photo.

use crate::raster::Raster;
use nalgebra::DMatrix;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Value of a foreground pixel in a binary mask.
pub const FOREGROUND: u8 = 255;

/// Position and size of the calibration sphere in image coordinates.
///
/// `center_x` is a column index and `center_y` a row index.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SphereCalibration {
    pub center_x: i64,
    pub center_y: i64,
    pub radius: f64,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("The binary mask has no foreground pixel")]
    NoForegroundPixels,
    #[error("The foreground is a single pixel, the sphere radius would be 0")]
    ZeroRadius,
    #[error("The calibration image is empty")]
    EmptyImage,
    #[error("Brightest pixel is outside of the sphere (nx = {nx}, ny = {ny})")]
    HighlightOutsideSphere { nx: f64, ny: f64 },
}

#[derive(Error, Debug)]
pub enum ParseRecordError {
    #[error("Expected {expected} numbers but got {found}")]
    WrongCount { expected: usize, found: usize },
    #[error("Invalid sphere radius: {0}")]
    InvalidRadius(f64),
    #[error("Error parsing integer")]
    Int(#[from] std::num::ParseIntError),
    #[error("Error parsing float")]
    Float(#[from] std::num::ParseFloatError),
}

impl SphereCalibration {
    pub fn center(&self) -> (i64, i64) {
        (self.center_x, self.center_y)
    }
}

impl fmt::Display for SphereCalibration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.center_x, self.center_y, self.radius)
    }
}

impl FromStr for SphereCalibration {
    type Err = ParseRecordError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<_> = s.split_whitespace().collect();
        if parts.len() != 3 {
            return Err(ParseRecordError::WrongCount {
                expected: 3,
                found: parts.len(),
            });
        }
        let radius: f64 = parts[2].parse()?;
        if !radius.is_finite() || radius <= 0.0 {
            return Err(ParseRecordError::InvalidRadius(radius));
        }
        Ok(SphereCalibration {
            center_x: parts[0].parse()?,
            center_y: parts[1].parse()?,
            radius,
        })
    }
}

/// Binarize an image: samples `>= threshold` become [`FOREGROUND`], others 0.
pub fn threshold_mask<R: Raster>(image: &R, threshold: u8) -> DMatrix<u8> {
    let (rows, cols) = image.shape();
    let mut mask = DMatrix::zeros(rows, cols);
    for (row, col, value) in image.pixels() {
        if value >= threshold {
            mask[(row, col)] = FOREGROUND;
        }
    }
    mask
}

/// Inclusive bounding box of the foreground pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BoundingBox {
    left: usize,
    right: usize,
    top: usize,
    bottom: usize,
}

impl BoundingBox {
    fn of_pixel(row: usize, col: usize) -> Self {
        BoundingBox {
            left: col,
            right: col,
            top: row,
            bottom: row,
        }
    }

    fn extend(&mut self, row: usize, col: usize) {
        self.left = self.left.min(col);
        self.right = self.right.max(col);
        self.top = self.top.min(row);
        self.bottom = self.bottom.max(row);
    }
}

/// Estimate the sphere center and radius from a binary mask.
///
/// The center is the middle of the foreground bounding box (floor division)
/// and the radius the mean of its width and height extents, divided by 2.
/// Circularity of the blob is not checked, an elongated blob
/// simply yields a biased radius.
/// A single pixel foreground fails since the radius must be positive.
pub fn locate<R: Raster>(mask: &R) -> Result<SphereCalibration, CalibrationError> {
    let mut bbox: Option<BoundingBox> = None;
    for (row, col, value) in mask.pixels() {
        if value == FOREGROUND {
            match bbox.as_mut() {
                None => bbox = Some(BoundingBox::of_pixel(row, col)),
                Some(b) => b.extend(row, col),
            }
        }
    }
    let BoundingBox {
        left,
        right,
        top,
        bottom,
    } = bbox.ok_or(CalibrationError::NoForegroundPixels)?;

    let extent = (right - left) + (bottom - top);
    if extent == 0 {
        return Err(CalibrationError::ZeroRadius);
    }
    let sphere = SphereCalibration {
        center_x: ((left + right) / 2) as i64,
        center_y: ((top + bottom) / 2) as i64,
        radius: extent as f64 / 4.0,
    };
    log::debug!(
        "Sphere bounding box: x in [{}, {}], y in [{}, {}]",
        left,
        right,
        top,
        bottom
    );
    Ok(sphere)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Filled disk of radius r centered at (cx, cy), on a rows x cols grid.
    fn disk(rows: usize, cols: usize, cx: i64, cy: i64, r: i64) -> DMatrix<u8> {
        DMatrix::from_fn(rows, cols, |y, x| {
            let dx = x as i64 - cx;
            let dy = y as i64 - cy;
            if dx * dx + dy * dy <= r * r {
                FOREGROUND
            } else {
                0
            }
        })
    }

    #[test]
    fn locate_filled_disks() {
        for &(cx, cy, r) in &[(20, 20, 2), (30, 25, 7), (41, 33, 15), (50, 50, 30)] {
            let mask = disk(100, 90, cx, cy, r);
            let sphere = locate(&mask).unwrap();
            assert!((sphere.center_x - cx).abs() <= 1, "{:?}", sphere);
            assert!((sphere.center_y - cy).abs() <= 1, "{:?}", sphere);
            assert!((sphere.radius - r as f64).abs() <= 0.5, "{:?}", sphere);
        }
    }

    #[test]
    fn locate_uses_bounding_box() {
        // Single 5x3 rectangle: cols 2..=6, rows 4..=6
        let mask = DMatrix::from_fn(10, 10, |y, x| {
            if (2..=6).contains(&x) && (4..=6).contains(&y) {
                FOREGROUND
            } else {
                0
            }
        });
        let sphere = locate(&mask).unwrap();
        assert_eq!(sphere.center(), (4, 5));
        assert_relative_eq!(sphere.radius, (4.0 + 2.0) / 4.0);
    }

    #[test]
    fn locate_ignores_non_foreground_values() {
        let mut mask = DMatrix::from_element(5, 5, 254u8);
        mask[(2, 3)] = FOREGROUND;
        mask[(2, 4)] = FOREGROUND;
        let sphere = locate(&mask).unwrap();
        assert_eq!(sphere.center(), (3, 2));
        assert_relative_eq!(sphere.radius, 0.25);
    }

    #[test]
    fn single_pixel_foreground_fails() {
        let mut mask = DMatrix::<u8>::zeros(9, 9);
        mask[(4, 4)] = FOREGROUND;
        assert_eq!(locate(&mask), Err(CalibrationError::ZeroRadius));
    }

    #[test]
    fn located_sphere_record_parses_back() {
        let mut mask = DMatrix::<u8>::zeros(9, 9);
        mask[(4, 4)] = FOREGROUND;
        mask[(5, 4)] = FOREGROUND;
        let sphere = locate(&mask).unwrap();
        assert!(sphere.radius > 0.0);
        let parsed: SphereCalibration = sphere.to_string().parse().unwrap();
        assert_eq!(parsed, sphere);

        let disk = DMatrix::from_fn(40, 40, |y, x| {
            let (dx, dy) = (x as i64 - 20, y as i64 - 17);
            if dx * dx + dy * dy <= 81 {
                FOREGROUND
            } else {
                0
            }
        });
        let sphere = locate(&disk).unwrap();
        assert_eq!(sphere.to_string().parse::<SphereCalibration>().unwrap(), sphere);
    }

    #[test]
    fn empty_masks_fail() {
        let mask = DMatrix::<u8>::zeros(8, 8);
        assert_eq!(locate(&mask), Err(CalibrationError::NoForegroundPixels));
        let mask = DMatrix::<u8>::zeros(0, 0);
        assert_eq!(locate(&mask), Err(CalibrationError::NoForegroundPixels));
    }

    #[test]
    fn threshold_is_inclusive() {
        let img = DMatrix::from_row_slice(1, 4, &[0u8, 99, 100, 250]);
        let mask = threshold_mask(&img, 100);
        assert_eq!(mask, DMatrix::from_row_slice(1, 4, &[0u8, 0, 255, 255]));
    }

    #[test]
    fn calibration_record_text() {
        let sphere = SphereCalibration {
            center_x: 120,
            center_y: 98,
            radius: 45.25,
        };
        let text = sphere.to_string();
        assert_eq!(text, "120 98 45.25");
        assert_eq!(text.parse::<SphereCalibration>().unwrap(), sphere);
        assert!(" 1 2 3.5\n".parse::<SphereCalibration>().is_ok());
        assert!(matches!(
            "1 2".parse::<SphereCalibration>(),
            Err(ParseRecordError::WrongCount { found: 2, .. })
        ));
        assert!(matches!(
            "1 2 -3".parse::<SphereCalibration>(),
            Err(ParseRecordError::InvalidRadius(_))
        ));
        assert!("1.5 2 3".parse::<SphereCalibration>().is_err());
    }
}
