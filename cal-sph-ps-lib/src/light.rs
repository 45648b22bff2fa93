// SPDX-License-Identifier: MPL-2.0

//! Light direction estimation from the specular highlight of a calibration sphere.

use crate::raster::Raster;
use crate::sphere::{CalibrationError, ParseRecordError, SphereCalibration};
use nalgebra::{DMatrix, Vector3};
use std::convert::TryFrom;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Minimum number of lights for the reconstruction to be well posed.
pub const MIN_LIGHTS: usize = 3;

/// Light direction scaled by the brightness of the source.
///
/// The norm of the vector is the intensity (0-255) of the highlight
/// it was estimated from, not a radiometric quantity.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LightVector {
    pub dx: f64,
    pub dy: f64,
    pub dz: f64,
}

impl LightVector {
    pub fn new(dx: f64, dy: f64, dz: f64) -> Self {
        LightVector { dx, dy, dz }
    }

    pub fn to_vector(self) -> Vector3<f64> {
        Vector3::new(self.dx, self.dy, self.dz)
    }

    pub fn brightness(&self) -> f64 {
        self.to_vector().norm()
    }

    /// Unit direction, `None` for the zero vector.
    pub fn direction(&self) -> Option<Vector3<f64>> {
        self.to_vector().try_normalize(0.0)
    }
}

impl From<Vector3<f64>> for LightVector {
    fn from(v: Vector3<f64>) -> Self {
        LightVector::new(v.x, v.y, v.z)
    }
}

impl fmt::Display for LightVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.dx, self.dy, self.dz)
    }
}

impl FromStr for LightVector {
    type Err = ParseRecordError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let coords: Vec<f64> = s
            .split_whitespace()
            .map(|c| c.parse())
            .collect::<Result<_, _>>()?;
        match coords.as_slice() {
            &[dx, dy, dz] => Ok(LightVector::new(dx, dy, dz)),
            _ => Err(ParseRecordError::WrongCount {
                expected: 3,
                found: coords.len(),
            }),
        }
    }
}

/// Brightest pixel of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Highlight {
    pub row: usize,
    pub col: usize,
    pub intensity: u8,
}

/// Find the brightest pixel of an image, `None` if the image is empty.
///
/// Ties are broken by keeping the first maximum in row-major order.
pub fn brightest_pixel<R: Raster>(image: &R) -> Option<Highlight> {
    let mut best: Option<Highlight> = None;
    for (row, col, intensity) in image.pixels() {
        match best {
            Some(h) if intensity <= h.intensity => {}
            _ => {
                best = Some(Highlight {
                    row,
                    col,
                    intensity,
                })
            }
        }
    }
    best
}

/// Estimate the light vector for one calibration photo of the sphere.
///
/// The surface normal at the highlight is the light direction
/// (camera looking along -z, visible hemisphere only),
/// and it is scaled by the highlight intensity.
pub fn estimate<R: Raster>(
    photo: &R,
    sphere: &SphereCalibration,
) -> Result<LightVector, CalibrationError> {
    let highlight = brightest_pixel(photo).ok_or(CalibrationError::EmptyImage)?;
    let nx = (highlight.col as f64 - sphere.center_x as f64) / sphere.radius;
    let ny = (highlight.row as f64 - sphere.center_y as f64) / sphere.radius;
    let planar_sqr = nx * nx + ny * ny;
    // Written so that NaN offsets (zero radius) are rejected too.
    if !(planar_sqr <= 1.0) {
        return Err(CalibrationError::HighlightOutsideSphere { nx, ny });
    }
    let nz = (1.0 - planar_sqr).sqrt();
    if highlight.intensity == 0 {
        log::warn!("Calibration photo is completely black, light vector is zero");
    }
    let b = highlight.intensity as f64;
    log::debug!(
        "Highlight {} at (row {}, col {}) -> normal ({:.4}, {:.4}, {:.4})",
        highlight.intensity,
        highlight.row,
        highlight.col,
        nx,
        ny,
        nz
    );
    Ok(LightVector::new(b * nx, b * ny, b * nz))
}

/// Estimate one light per calibration photo, in order.
pub fn estimate_all<R: Raster>(
    photos: &[R],
    sphere: &SphereCalibration,
) -> Result<LightDirectionSet, EstimateAllError> {
    let lights = photos
        .iter()
        .enumerate()
        .map(|(i, photo)| estimate(photo, sphere).map_err(|e| EstimateAllError::Photo(i, e)))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(LightDirectionSet::new(lights)?)
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EstimateAllError {
    #[error("Calibration photo #{0}: {1}")]
    Photo(usize, #[source] CalibrationError),
    #[error(transparent)]
    LightSet(#[from] LightSetError),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LightSetError {
    #[error("At least {min} lights are required but got {0}", min = MIN_LIGHTS)]
    NotEnoughLights(usize),
    #[error("Light on line {line}: {msg}")]
    Parse { line: usize, msg: String },
}

/// Ordered lights, index-aligned with the object photos.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(try_from = "Vec<LightVector>", into = "Vec<LightVector>")
)]
pub struct LightDirectionSet {
    lights: Vec<LightVector>,
}

impl LightDirectionSet {
    pub fn new(lights: Vec<LightVector>) -> Result<Self, LightSetError> {
        if lights.len() < MIN_LIGHTS {
            return Err(LightSetError::NotEnoughLights(lights.len()));
        }
        Ok(LightDirectionSet { lights })
    }

    pub fn len(&self) -> usize {
        self.lights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lights.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LightVector> {
        self.lights.iter()
    }

    pub fn as_slice(&self) -> &[LightVector] {
        &self.lights
    }

    /// N x 3 matrix of unit directions, `None` if a light is the zero vector.
    pub fn direction_matrix(&self) -> Option<DMatrix<f64>> {
        let dirs = self
            .lights
            .iter()
            .map(|l| l.direction())
            .collect::<Option<Vec<_>>>()?;
        Some(DMatrix::from_fn(self.len(), 3, |k, j| dirs[k][j]))
    }

    /// N x 3 matrix, row k is light k.
    pub fn matrix(&self) -> DMatrix<f64> {
        DMatrix::from_fn(self.len(), 3, |k, j| {
            let l = &self.lights[k];
            [l.dx, l.dy, l.dz][j]
        })
    }
}

impl TryFrom<Vec<LightVector>> for LightDirectionSet {
    type Error = LightSetError;
    fn try_from(lights: Vec<LightVector>) -> Result<Self, Self::Error> {
        LightDirectionSet::new(lights)
    }
}

impl From<LightDirectionSet> for Vec<LightVector> {
    fn from(set: LightDirectionSet) -> Self {
        set.lights
    }
}

impl fmt::Display for LightDirectionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for l in &self.lights {
            writeln!(f, "{}", l)?;
        }
        Ok(())
    }
}

impl FromStr for LightDirectionSet {
    type Err = LightSetError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lights = s
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| {
                line.parse().map_err(|e: ParseRecordError| LightSetError::Parse {
                    line: i + 1,
                    msg: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        LightDirectionSet::new(lights)
    }
}
