// SPDX-License-Identifier: MPL-2.0

//! 8 bits encodings of the reconstruction, for visualization and storage.

use crate::ps::Reconstruction;
use crate::raster::Raster;
use nalgebra::{DMatrix, Vector3};
use thiserror::Error;

/// Map a normal component from [-1, 1] to [0, 255], clamping out of range values.
pub fn encode_component(n: f64) -> u8 {
    ((n + 1.0) * 127.5).round().max(0.0).min(255.0) as u8
}

/// Encode normals as RGB triplets.
///
/// The zero sentinel of undefined pixels stays (0, 0, 0).
/// No unit normal encodes to black since its components cannot all be -1.
pub fn encode_normals(normals: &DMatrix<Vector3<f64>>) -> DMatrix<(u8, u8, u8)> {
    normals.map(|n| {
        if n == Vector3::zeros() {
            (0, 0, 0)
        } else {
            (
                encode_component(n.x),
                encode_component(n.y),
                encode_component(n.z),
            )
        }
    })
}

/// How albedo values are brought into [0, 255].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AlbedoEncoding {
    /// Multiply by a fixed factor, then round and clamp.
    ///
    /// Since light vectors carry the highlight brightness,
    /// an albedo of 1 is a surface as bright as the highlight,
    /// and `Fixed(255.0)` maps it to white.
    Fixed(f64),
    /// Map the largest albedo of the image to 255.
    NormalizeMax,
}

impl Default for AlbedoEncoding {
    fn default() -> Self {
        AlbedoEncoding::Fixed(255.0)
    }
}

/// Encode albedo as gray levels. Undefined pixels are always 0.
pub fn encode_albedo(albedo: &DMatrix<f64>, encoding: AlbedoEncoding) -> DMatrix<u8> {
    let scale = match encoding {
        AlbedoEncoding::Fixed(scale) => scale,
        AlbedoEncoding::NormalizeMax => {
            let max = albedo.iter().cloned().fold(0.0, f64::max);
            if max > 0.0 {
                255.0 / max
            } else {
                0.0
            }
        }
    };
    albedo.map(|a| {
        if a > 0.0 {
            (a * scale).round().max(0.0).min(255.0) as u8
        } else {
            0
        }
    })
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NeedleError {
    #[error("Needle step must be at least 1")]
    ZeroStep,
    #[error("Needle length must be finite, got {0}")]
    NonFiniteLength(f64),
    #[error("Base image is {base:?} but normals are {normals:?}")]
    ShapeMismatch {
        base: (usize, usize),
        normals: (usize, usize),
    },
}

/// Draw a "needle map" of the normals over a copy of `base`.
///
/// Every `step` rows and columns, a white segment starts at the pixel
/// and goes along the image projection `(nx, ny)` of its normal,
/// scaled by `length`. Its root is marked by a black pixel.
/// Undefined normals get no needle.
pub fn needle_map<R: Raster>(
    base: &R,
    rec: &Reconstruction,
    step: usize,
    length: f64,
) -> Result<DMatrix<u8>, NeedleError> {
    if step == 0 {
        return Err(NeedleError::ZeroStep);
    }
    if !length.is_finite() {
        return Err(NeedleError::NonFiniteLength(length));
    }
    if base.shape() != rec.shape() {
        return Err(NeedleError::ShapeMismatch {
            base: base.shape(),
            normals: rec.shape(),
        });
    }
    let (rows, cols) = base.shape();
    let mut canvas = DMatrix::from_fn(rows, cols, |r, c| base.get(r, c).unwrap_or(0));
    for row in (0..rows).step_by(step) {
        for col in (0..cols).step_by(step) {
            if !rec.is_valid(row, col) {
                continue;
            }
            let n = rec.normals[(row, col)];
            let from = (col as f64, row as f64);
            let to = (from.0 + length * n.x, from.1 + length * n.y);
            draw_segment(&mut canvas, from, to, 255);
            canvas[(row, col)] = 0;
        }
    }
    Ok(canvas)
}

/// Rasterize a segment given in (x, y) coordinates, clipped to the canvas.
///
/// `from` must lie in the canvas, so the segment is first cut
/// to the length of the canvas diagonal.
fn draw_segment(canvas: &mut DMatrix<u8>, from: (f64, f64), to: (f64, f64), value: u8) {
    let (rows, cols) = canvas.shape();
    let (mut dx, mut dy) = (to.0 - from.0, to.1 - from.1);
    let diagonal = (rows as f64).hypot(cols as f64);
    let seg_length = dx.hypot(dy);
    if seg_length > diagonal {
        dx *= diagonal / seg_length;
        dy *= diagonal / seg_length;
    }
    let nb_steps = dx.abs().max(dy.abs()).ceil() as usize;
    for s in 0..=nb_steps {
        let t = if nb_steps == 0 {
            0.0
        } else {
            s as f64 / nb_steps as f64
        };
        let x = (from.0 + t * dx).round();
        let y = (from.1 + t * dy).round();
        if x >= 0.0 && y >= 0.0 && (x as usize) < cols && (y as usize) < rows {
            canvas[(y as usize, x as usize)] = value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_components() {
        assert_eq!(encode_component(-1.0), 0);
        assert_eq!(encode_component(1.0), 255);
        assert_eq!(encode_component(0.0), 128); // 127.5 rounds away from zero
        assert_eq!(encode_component(-3.0), 0);
        assert_eq!(encode_component(1.5), 255);
        let mut normals = DMatrix::from_element(1, 2, Vector3::new(0.0, -1.0, 1.0));
        assert_eq!(encode_normals(&normals)[(0, 1)], (128, 0, 255));
        normals[(0, 0)] = Vector3::zeros();
        let encoded = encode_normals(&normals);
        assert_eq!(encoded[(0, 0)], (0, 0, 0));
        assert_eq!(encoded[(0, 1)], (128, 0, 255));
    }

    #[test]
    fn albedo_fixed_and_normalized() {
        let albedo = DMatrix::from_row_slice(1, 4, &[0.0, 0.5, 1.0, 2.0]);
        let fixed = encode_albedo(&albedo, AlbedoEncoding::default());
        assert_eq!(fixed, DMatrix::from_row_slice(1, 4, &[0u8, 128, 255, 255]));
        let norm = encode_albedo(&albedo, AlbedoEncoding::NormalizeMax);
        assert_eq!(norm, DMatrix::from_row_slice(1, 4, &[0u8, 64, 128, 255]));
        let dark = DMatrix::zeros(2, 2);
        assert_eq!(
            encode_albedo(&dark, AlbedoEncoding::NormalizeMax),
            DMatrix::<u8>::zeros(2, 2)
        );
    }

    fn rec_pointing_right(rows: usize, cols: usize) -> Reconstruction {
        let mut normals = DMatrix::from_element(rows, cols, Vector3::new(1.0, 0.0, 0.0));
        let mut albedo = DMatrix::from_element(rows, cols, 1.0);
        normals[(0, 0)] = Vector3::zeros();
        albedo[(0, 0)] = 0.0;
        Reconstruction {
            normals,
            albedo,
            shadowed: 1,
        }
    }

    #[test]
    fn needles_follow_normals() {
        let base = DMatrix::from_element(9, 9, 100u8);
        let rec = rec_pointing_right(9, 9);
        let map = needle_map(&base, &rec, 4, 3.0).unwrap();
        // Needle rooted at (4, 4) pointing toward +x.
        assert_eq!(map[(4, 4)], 0);
        assert_eq!(map[(4, 5)], 255);
        assert_eq!(map[(4, 7)], 255);
        assert_eq!(map[(4, 8)], 0);
        assert_eq!(map[(5, 5)], 100);
        // Clipped needle at the right border.
        assert_eq!(map[(8, 8)], 0);
        // No needle on the undefined pixel.
        assert_eq!(map[(0, 0)], 100);
        assert_eq!(map[(0, 1)], 100);
    }

    #[test]
    fn huge_needles_stop_at_the_border() {
        let base = DMatrix::from_element(9, 9, 100u8);
        let rec = rec_pointing_right(9, 9);
        let map = needle_map(&base, &rec, 4, 1e12).unwrap();
        assert_eq!(map[(4, 4)], 0);
        assert_eq!(map[(4, 6)], 255);
        assert_eq!(map[(4, 8)], 0);
        assert_eq!(map[(5, 5)], 100);

        let mut canvas = DMatrix::from_element(3, 5, 0u8);
        draw_segment(&mut canvas, (0.0, 1.0), (-1e300, 1.0), 9);
        assert_eq!(canvas[(1, 0)], 9);
        assert_eq!(canvas.iter().filter(|&&v| v == 9).count(), 1);
    }

    #[test]
    fn needle_map_rejects_bad_input() {
        let base = DMatrix::from_element(9, 9, 100u8);
        let rec = rec_pointing_right(9, 9);
        assert_eq!(needle_map(&base, &rec, 0, 3.0), Err(NeedleError::ZeroStep));
        assert_eq!(
            needle_map(&base, &rec, 2, f64::INFINITY),
            Err(NeedleError::NonFiniteLength(f64::INFINITY))
        );
        assert!(matches!(
            needle_map(&base, &rec, 2, f64::NAN),
            Err(NeedleError::NonFiniteLength(_))
        ));
        let small = DMatrix::from_element(3, 9, 100u8);
        assert!(matches!(
            needle_map(&small, &rec, 2, 3.0),
            Err(NeedleError::ShapeMismatch { .. })
        ));
    }
}
