// SPDX-License-Identifier: MPL-2.0

use cal_sph_ps_lib as sph;
use sph::encode::{self, AlbedoEncoding};
use sph::interop::{IntoGrayMatrix, ToImage};
use sph::light::{self, LightDirectionSet};
use sph::ps;
use sph::sphere::{self, SphereCalibration};

use glob::glob;
use nalgebra::DMatrix;
use std::path::{Path, PathBuf};

mod logger;

// Default values for some of the program arguments.
const DEFAULT_OUT_DIR: &str = "out";
const DEFAULT_SPHERE_THRESHOLD: u8 = 128;
const DEFAULT_SHADOW_THRESHOLD: u8 = 0;
const DEFAULT_NEEDLE_LENGTH: f64 = 10.0;
const DEFAULT_ALBEDO_SCALE: f64 = 255.0;
const DEFAULT_VERBOSITY: u32 = 2;

type Error = Box<dyn std::error::Error>;

/// Entry point of the program.
fn main() {
    if let Err(err) = parse_args().and_then(run) {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }
}

fn display_help() {
    eprintln!(
        r#"
sph-ps

Photometric stereo with lights calibrated on a specular sphere.

USAGE:
    sph-ps sphere [FLAGS...] SPHERE_IMAGE
    sph-ps lights [FLAGS...] SPHERE_IMAGES...
    sph-ps normals [FLAGS...] OBJECT_IMAGES...
    For example:
        sph-ps sphere --threshold 120 --out sphere.txt sphere0.pgm
        sph-ps lights --sphere sphere.txt --out lights.txt "sphere[1-3].pgm"
        sph-ps normals --lights lights.txt --threshold 80 --step 10 "object[1-3].pgm"

FLAGS:
    --help                 # Print this message and exit
    --version              # Print version and exit
    --verbosity int        # Log level from 0 (errors) to 4 (trace) (default: {})

  sphere:
    --threshold int        # Intensity separating the sphere from the background (default: {})
    --out file.txt         # Where to write "centerX centerY radius"

  lights:
    --sphere file.txt      # Sphere parameters written by the sphere command
    --out file.txt         # Where to write one "dx dy dz" line per image

  normals:
    --lights file.txt      # Light vectors written by the lights command, in image order
    --threshold int        # Pixels <= threshold in any image are left undefined (default: {})
    --out-dir dir/         # Output directory for normals, albedo and mask images (default: {})
    --albedo-scale float   # Albedo multiplier before clamping to 255 (default: {})
    --albedo-normalize     # Map the max albedo to 255 instead of using --albedo-scale
    --step int             # Also draw a needle map with one needle every step pixels
    --needle-length float  # Length of the needles in pixels (default: {})
"#,
        DEFAULT_VERBOSITY,
        DEFAULT_SPHERE_THRESHOLD,
        DEFAULT_SHADOW_THRESHOLD,
        DEFAULT_OUT_DIR,
        DEFAULT_ALBEDO_SCALE,
        DEFAULT_NEEDLE_LENGTH,
    )
}

#[derive(Debug)]
/// Type holding command line arguments.
struct Args {
    verbosity: u32,
    command: Command,
}

#[derive(Debug)]
enum Command {
    Sphere {
        threshold: u8,
        out: PathBuf,
        image_path: PathBuf,
    },
    Lights {
        sphere: SphereCalibration,
        out: PathBuf,
        images_paths: Vec<PathBuf>,
    },
    Normals {
        config: ps::Config,
        lights: LightDirectionSet,
        out_dir: PathBuf,
        albedo: AlbedoEncoding,
        needles: Option<(usize, f64)>,
        images_paths: Vec<PathBuf>,
    },
}

/// Function parsing the command line arguments and returning an Args object or an error.
fn parse_args() -> Result<Args, Error> {
    let mut args = pico_args::Arguments::from_env();

    // Retrieve command line arguments.
    let help = args.contains(["-h", "--help"]);
    let version = args.contains(["-v", "--version"]);

    // Check if the --help or --version flags are present.
    if help {
        display_help();
        std::process::exit(0);
    } else if version {
        println!("{}", std::env!("CARGO_PKG_VERSION"));
        std::process::exit(0);
    }

    let verbosity = args
        .opt_value_from_str("--verbosity")?
        .unwrap_or(DEFAULT_VERBOSITY);

    let command = match args.subcommand()?.as_deref() {
        Some("sphere") => {
            let threshold = args
                .opt_value_from_str("--threshold")?
                .unwrap_or(DEFAULT_SPHERE_THRESHOLD);
            let out: String = args.value_from_str("--out")?;
            let mut images_paths = absolute_file_paths(&args.free()?)?;
            if images_paths.len() != 1 {
                return Err(format!(
                    "sphere expects exactly one image but got {}",
                    images_paths.len()
                )
                .into());
            }
            Command::Sphere {
                threshold,
                out: out.into(),
                image_path: images_paths.remove(0),
            }
        }
        Some("lights") => {
            let sphere_path: String = args.value_from_str("--sphere")?;
            let out: String = args.value_from_str("--out")?;
            let sphere = std::fs::read_to_string(&sphere_path)?
                .parse::<SphereCalibration>()
                .map_err(|e| format!("{}: {}", sphere_path, e))?;
            Command::Lights {
                sphere,
                out: out.into(),
                images_paths: absolute_file_paths(&args.free()?)?,
            }
        }
        Some("normals") => {
            let lights_path: String = args.value_from_str("--lights")?;
            let threshold = args
                .opt_value_from_str("--threshold")?
                .unwrap_or(DEFAULT_SHADOW_THRESHOLD);
            let out_dir: String = args
                .opt_value_from_str("--out-dir")?
                .unwrap_or_else(|| DEFAULT_OUT_DIR.into());
            let albedo_scale = args
                .opt_value_from_str("--albedo-scale")?
                .unwrap_or(DEFAULT_ALBEDO_SCALE);
            let albedo = if args.contains("--albedo-normalize") {
                AlbedoEncoding::NormalizeMax
            } else {
                AlbedoEncoding::Fixed(albedo_scale)
            };
            let step: Option<usize> = args.opt_value_from_str("--step")?;
            let needle_length = args
                .opt_value_from_str("--needle-length")?
                .unwrap_or(DEFAULT_NEEDLE_LENGTH);

            // Load lights.
            let lights = std::fs::read_to_string(&lights_path)?
                .parse::<LightDirectionSet>()
                .map_err(|e| format!("{}: {}", lights_path, e))?;

            Command::Normals {
                config: ps::Config {
                    threshold,
                    ..ps::Config::default()
                },
                lights,
                out_dir: out_dir.into(),
                albedo,
                needles: step.map(|s| (s, needle_length)),
                images_paths: absolute_file_paths(&args.free()?)?,
            }
        }
        Some(other) => return Err(format!("Unknown command: {}", other).into()),
        None => {
            display_help();
            return Err("Missing command".into());
        }
    };

    Ok(Args { verbosity, command })
}

/// Retrieve the absolute paths of all files matching the arguments.
fn absolute_file_paths(args: &[String]) -> Result<Vec<PathBuf>, Error> {
    let mut abs_paths = Vec::new();
    for path_glob in args {
        let mut paths = paths_from_glob(path_glob)?;
        abs_paths.append(&mut paths);
    }
    if abs_paths.is_empty() {
        return Err("There is no such image. Use --help to know how to use this tool.".into());
    }
    abs_paths
        .iter()
        .map(|p| p.canonicalize().map_err(|e| e.into()))
        .collect()
}

/// Retrieve the paths of files matching the glob pattern.
fn paths_from_glob(p: &str) -> Result<Vec<PathBuf>, Error> {
    let paths = glob(p)?;
    Ok(paths.into_iter().filter_map(|x| x.ok()).collect())
}

/// Start actual program with command line arguments successfully parsed.
fn run(args: Args) -> Result<(), Error> {
    logger::StderrLogger::init(logger::verbosity_filter(args.verbosity))?;
    match args.command {
        Command::Sphere {
            threshold,
            out,
            image_path,
        } => {
            let image = load_images(&[image_path])?.remove(0);
            let mask = sphere::threshold_mask(&image, threshold);
            let sphere = sphere::locate(&mask).map_err(|e| format!("sphere: {}", e))?;
            log::info!(
                "Sphere center: ({}, {}), radius: {}",
                sphere.center_x,
                sphere.center_y,
                sphere.radius
            );
            std::fs::write(&out, format!("{}\n", sphere))?;
            log::info!("Sphere parameters written to {}", out.display());
            Ok(())
        }
        Command::Lights {
            sphere,
            out,
            images_paths,
        } => {
            let images = load_images(&images_paths)?;
            let lights =
                light::estimate_all(&images, &sphere).map_err(|e| format!("lights: {}", e))?;
            for (path, l) in images_paths.iter().zip(lights.iter()) {
                log::info!("{:?}: ({:.3}, {:.3}, {:.3})", path, l.dx, l.dy, l.dz);
            }
            std::fs::write(&out, lights.to_string())?;
            log::info!("Light directions written to {}", out.display());
            Ok(())
        }
        Command::Normals {
            config,
            lights,
            out_dir,
            albedo,
            needles,
            images_paths,
        } => {
            std::fs::create_dir_all(&out_dir)?;
            let images = load_images(&images_paths)?;

            // Compute photometric stereo.
            let now = std::time::Instant::now();
            let rec = ps::reconstruct(&config, &images, &lights)
                .map_err(|e| format!("normals: {}", e))?;
            log::info!("Reconstruction took {:.1} s", now.elapsed().as_secs_f32());

            // Visualization of normals and albedo images.
            save(&encode::encode_normals(&rec.normals), out_dir.join("normals.png"))?;
            save(&encode::encode_albedo(&rec.albedo, albedo), out_dir.join("albedo.png"))?;
            save(&rec.valid_mask(), out_dir.join("mask.png"))?;
            if let Some((step, length)) = needles {
                let needle_map = encode::needle_map(&images[0], &rec, step, length)?;
                save(&needle_map, out_dir.join("needles.png"))?;
            }
            log::info!("Normals and albedo images written to {}", out_dir.display());
            Ok(())
        }
    }
}

fn save<Im: ToImage, P: AsRef<Path>>(img: &Im, path: P) -> Result<(), Error> {
    img.to_image().save(path)?;
    Ok(())
}

/// Load all images into memory, as gray levels.
fn load_images<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<DMatrix<u8>>, Error> {
    log::info!("Loading {} images ...", paths.len());
    let pb = indicatif::ProgressBar::new(paths.len() as u64);
    let mut images = Vec::with_capacity(paths.len());
    for path in paths {
        log::debug!("    {:?}", path.as_ref());
        let img = image::open(path.as_ref())
            .map_err(|e| format!("{:?}: {}", path.as_ref(), e))?
            .into_gray_matrix();
        images.push(img);
        pb.inc(1);
    }
    pb.finish();
    Ok(images)
}
