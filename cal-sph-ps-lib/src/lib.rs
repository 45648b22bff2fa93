// SPDX-License-Identifier: MPL-2.0

//! # Calibrated sphere photometric stereo
//!
//! Recover per-pixel normals and albedo of an object photographed under
//! several point lights, whose directions are estimated beforehand
//! from the specular highlight on a calibration sphere.
//!
//! The pipeline is made of three independent stages:
//!
//! 1. [`sphere::locate`] finds the calibration sphere in a binary mask.
//! 2. [`light::estimate`] turns a calibration photo into a [`light::LightVector`].
//! 3. [`ps::reconstruct`] solves for normals and albedo of the object.

// #![warn(missing_docs)]

pub mod encode;
pub mod interop;
pub mod light;
pub mod linalg;
pub mod ps;
pub mod raster;
pub mod sphere;
