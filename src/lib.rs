//! Webcam hand keypoint recorder.
//!
//! `handrec` captures frames from a V4L2 webcam, tracks up to two hands per frame with a palm
//! detection and hand landmark network pair, and writes the landmark coordinates of every
//! recorded frame to disk as NumPy arrays. The resulting directory tree is meant to be used as a
//! training set for gesture recognition models.
//!
//! # Coordinates
//!
//! Image coordinates have X pointing right and Y pointing down, with the origin at the top left
//! corner of the image. Landmark networks additionally output a Z coordinate that grows away
//! from the camera and uses the same scale as X.
//!
//! # Environment Variables
//!
//! Some parts of `handrec` can be overridden by setting environment variables:
//!
//! * `HANDREC_JPEG_BACKEND`: Configures the JPEG image decoder to use. Allowed values are:
//!   * `mozjpeg`: uses the [mozjpeg] library to decode JPEG images (the default).
//!   * `zune-jpeg`: uses the [zune-jpeg] crate.
//!   * `jpeg-decoder`: uses the [jpeg-decoder] crate.
//! * `HANDREC_WEBCAM_NAME`: Forces the device to use for [`Webcam`]s created without an explicit
//!   device name. If unset, the first device that supports a compatible image format will be used.
//! * `RUST_LOG`: Overrides the default log filter (see [`init_logger!`]).
//!
//! [mozjpeg]: https://github.com/mozilla/mozjpeg
//! [zune-jpeg]: https://github.com/etemesi254/zune-jpeg
//! [jpeg-decoder]: https://github.com/image-rs/jpeg-decoder/
//! [`Webcam`]: video::webcam::Webcam

use log::LevelFilter;

pub mod collect;
pub mod config;
pub mod detection;
pub mod gui;
pub mod hand;
pub mod image;
pub mod iter;
pub mod landmark;
pub mod nn;
pub mod num;
pub mod timer;
pub mod video;

pub use gui::run;
pub use handrec_macros::main;

/// macro-use only, not part of public API.
#[doc(hidden)]
pub fn init_logger(calling_crate: &'static str) {
    let log_level = LevelFilter::Debug;
    env_logger::Builder::new()
        .filter(Some(calling_crate), log_level)
        .filter(Some(env!("CARGO_CRATE_NAME")), log_level)
        .filter(Some("wgpu"), LevelFilter::Warn)
        .parse_default_env()
        .try_init()
        .ok();
}

/// Initializes logging to *stderr*.
///
/// The calling crate and `handrec` will log at *debug* level, `wgpu` will log at *warn* level.
/// The `RUST_LOG` environment variable is applied on top of that.
///
/// If a global logger is already registered, this macro will do nothing.
#[macro_export]
macro_rules! init_logger {
    () => {
        $crate::init_logger(env!("CARGO_CRATE_NAME"))
    };
}
