//! Detection and landmark estimation of human hands.
//!
//! Hands are found with a palm detector ([`detection`]), which is cheap to re-run only every few
//! frames, and then followed frame-to-frame by a landmark network ([`landmark`]) that estimates
//! 21 keypoints per hand. [`tracking::HandTracker`] combines both.
//!
//! All networks are read from ONNX files in a model directory at runtime:
//!
//! - `palm_detection_lite.onnx` / `palm_detection_full.onnx`
//! - `hand_landmark_lite.onnx` / `hand_landmark_full.onnx`

pub mod detection;
pub mod landmark;
pub mod tracking;

use std::path::Path;

use anyhow::Context;

use crate::nn::{Cnn, ColorMapper, NeuralNetwork};

/// Loads one of the hand networks from `models_dir`.
///
/// All of them take RGB input with color values in range 0.0 to 1.0.
fn load_cnn(models_dir: &Path, file_name: &str) -> anyhow::Result<Cnn> {
    let path = models_dir.join(file_name);
    log::debug!("loading {}", path.display());
    let nn = NeuralNetwork::load(&path)
        .with_context(|| format!("failed to load network '{}'", path.display()))?;
    Cnn::new(nn, ColorMapper::linear(0.0..=1.0))
}
