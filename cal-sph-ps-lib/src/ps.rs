// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Lambertian photometric stereo with calibrated lights.
//!
//! Each lit pixel follows the image formation model `i_k = L_k · g`,
//! where `L_k` is the k-th light vector and `g = albedo * normal`.
//! With N >= 3 non coplanar lights, `g` is recovered by least squares,
//! independently for every pixel.

use crate::light::{LightDirectionSet, MIN_LIGHTS};
use crate::linalg::{self, LeastSquares, LinalgError};
use crate::raster::{self, Raster};
use nalgebra::{DMatrix, Vector3};
use rayon::prelude::*;
use thiserror::Error;

/// Configuration (parameters) of the photometric stereo algorithm.
#[derive(Debug, Clone)]
pub struct Config {
    /// A pixel with an intensity `<= threshold` in any photo
    /// is considered in shadow and not reconstructed.
    pub threshold: u8,
    /// Relative tolerance on the smallest singular value of the matrix
    /// of unit light directions. Brightness does not enter the rank check,
    /// so a dim light still counts as long as its direction is independent.
    pub rank_epsilon: f64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            threshold: 0,
            rank_epsilon: 1e-6,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReconstructionError {
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),
    #[error("At least {min} lights are required but got {0}", min = MIN_LIGHTS)]
    NotEnoughLights(usize),
    #[error("Light directions are coplanar or null (singular values: {0:?})")]
    DegenerateLightSet(Vec<f64>),
    #[error("Light matrix inversion failed: {0}")]
    Solver(LinalgError),
}

/// Normals and albedo of every pixel.
///
/// Shadowed pixels have a zero normal and a zero albedo.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconstruction {
    pub normals: DMatrix<Vector3<f64>>,
    pub albedo: DMatrix<f64>,
    /// Number of pixels left undefined.
    pub shadowed: usize,
}

impl Reconstruction {
    pub fn shape(&self) -> (usize, usize) {
        self.albedo.shape()
    }

    pub fn is_valid(&self, row: usize, col: usize) -> bool {
        self.albedo[(row, col)] > 0.0
    }

    /// 255 where the reconstruction is defined, 0 elsewhere.
    pub fn valid_mask(&self) -> DMatrix<u8> {
        self.albedo.map(|a| if a > 0.0 { 255 } else { 0 })
    }
}

/// "Observations" contains the data provided outside the core of the algorithm.
/// These are immutable references, shared by all the workers.
struct Obs<'a, R> {
    photos: &'a [R],
    solver: &'a LeastSquares,
    threshold: u8,
}

impl<'a, R: Raster> Obs<'a, R> {
    /// Scaled normal `g` at one pixel, zero if the pixel is shadowed.
    ///
    /// `intensities` is a scratch buffer owned by the calling worker.
    fn scaled_normal(&self, row: usize, col: usize, intensities: &mut [f64]) -> Vector3<f64> {
        for (i, photo) in intensities.iter_mut().zip(self.photos) {
            // Shapes were checked up front.
            let value = photo.get(row, col).unwrap_or(0);
            if value <= self.threshold {
                return Vector3::zeros();
            }
            *i = value as f64;
        }
        let g = self.solver.solve(intensities);
        if g.iter().all(|x| x.is_finite()) {
            g
        } else {
            Vector3::zeros()
        }
    }
}

/// Compute the normals and albedo from a sequence of photos
/// lit by the corresponding lights.
///
/// Fails before any per-pixel work if the inputs are inconsistent
/// or if the lights do not span the 3D space.
/// Results do not depend on the number of threads.
pub fn reconstruct<R: Raster + Sync>(
    config: &Config,
    photos: &[R],
    lights: &LightDirectionSet,
) -> Result<Reconstruction, ReconstructionError> {
    let (rows, cols) = check_dimensions(photos, lights)?;
    check_directions_rank(lights, config.rank_epsilon)?;
    // Directions span R³, only an exactly singular scaled matrix can fail here.
    let solver = LeastSquares::new(&lights.matrix(), 0.0).map_err(|e| match e {
        LinalgError::RankDeficient(sv) => ReconstructionError::DegenerateLightSet(sv),
        other => ReconstructionError::Solver(other),
    })?;
    log::debug!(
        "Light matrix singular values: {}",
        solver.singular_values().transpose()
    );
    log::info!(
        "Reconstructing {}x{} pixels from {} photos (condition number {:.2})",
        rows,
        cols,
        photos.len(),
        solver.condition_number()
    );

    let obs = Obs {
        photos,
        solver: &solver,
        threshold: config.threshold,
    };

    // Row-major buffer of scaled normals, one row per task.
    let mut scaled_normals = vec![Vector3::<f64>::zeros(); rows * cols];
    scaled_normals
        .par_chunks_mut(cols)
        .enumerate()
        .for_each(|(row, out)| {
            let mut intensities = vec![0.0; photos.len()];
            for (col, g) in out.iter_mut().enumerate() {
                *g = obs.scaled_normal(row, col, &mut intensities);
            }
        });

    // Split scaled normals into albedo and unit normals.
    let mut shadowed = 0;
    let mut normals = DMatrix::from_element(rows, cols, Vector3::zeros());
    let mut albedo = DMatrix::zeros(rows, cols);
    for (idx, g) in scaled_normals.iter().enumerate() {
        let (row, col) = (idx / cols, idx % cols);
        let rho = g.norm();
        if rho > 0.0 {
            albedo[(row, col)] = rho;
            normals[(row, col)] = g.unscale(rho);
        } else {
            shadowed += 1;
        }
    }
    log::info!(
        "{} pixels out of {} left undefined (threshold {})",
        shadowed,
        rows * cols,
        config.threshold
    );

    Ok(Reconstruction {
        normals,
        albedo,
        shadowed,
    })
}

/// Fail with `DegenerateLightSet` unless the unit light directions span R³.
fn check_directions_rank(
    lights: &LightDirectionSet,
    rel_epsilon: f64,
) -> Result<(), ReconstructionError> {
    let directions = lights
        .direction_matrix()
        .ok_or_else(|| ReconstructionError::DegenerateLightSet(vec![]))?;
    let singular_values = linalg::sorted_singular_values(&directions);
    if linalg::has_full_column_rank(&singular_values, rel_epsilon) {
        Ok(())
    } else {
        Err(ReconstructionError::DegenerateLightSet(
            singular_values.iter().cloned().collect(),
        ))
    }
}

fn check_dimensions<R: Raster>(
    photos: &[R],
    lights: &LightDirectionSet,
) -> Result<(usize, usize), ReconstructionError> {
    if lights.len() < MIN_LIGHTS {
        return Err(ReconstructionError::NotEnoughLights(lights.len()));
    }
    if photos.len() != lights.len() {
        return Err(ReconstructionError::DimensionMismatch(format!(
            "{} photos for {} lights",
            photos.len(),
            lights.len()
        )));
    }
    let shape = photos[0].shape();
    if photos[0].is_empty() {
        return Err(ReconstructionError::DimensionMismatch(format!(
            "photos are empty ({}x{})",
            shape.0, shape.1
        )));
    }
    for (k, photo) in photos.iter().enumerate().skip(1) {
        if !raster::same_shape(photo, &photos[0]) {
            return Err(ReconstructionError::DimensionMismatch(format!(
                "photo #{} is {}x{} but photo #0 is {}x{}",
                k,
                photo.rows(),
                photo.cols(),
                shape.0,
                shape.1
            )));
        }
    }
    Ok(shape)
}
