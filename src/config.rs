//! Command-line configuration.

use std::path::PathBuf;

use anyhow::bail;
use clap::Parser;

use crate::image::Resolution;

/// Records hand keypoints from a webcam as a gesture recognition dataset.
///
/// Type a gesture name into the camera window and press Enter to record it. Every recorded frame
/// is stored as `<data-dir>/<gesture>/<sequence>/<frame>.npy`.
#[derive(Debug, Clone, Parser)]
#[command(name = "handrec", version)]
pub struct Config {
    /// Root directory of the recorded dataset
    #[arg(long, default_value = "data")]
    pub data_dir: PathBuf,

    /// Number of sequences to record per gesture
    #[arg(long, default_value_t = 60)]
    pub sequences: u32,

    /// Number of frames per sequence
    #[arg(long, default_value_t = 30)]
    pub frames: u32,

    /// Seconds to count down before each sequence
    #[arg(long, default_value_t = 3)]
    pub countdown: u32,

    /// Directory containing the palm detection and hand landmark ONNX models
    #[arg(long, default_value = "3rdparty/onnx")]
    pub models: PathBuf,

    /// Use the faster, less accurate networks
    #[arg(long)]
    pub lite: bool,

    /// Name of the webcam device to open (overrides `HANDREC_WEBCAM_NAME`)
    #[arg(long)]
    pub camera: Option<String>,

    /// Preferred capture width
    #[arg(long, requires = "height")]
    pub width: Option<u32>,

    /// Preferred capture height
    #[arg(long, requires = "width")]
    pub height: Option<u32>,

    /// Preferred capture frame rate
    #[arg(long, default_value_t = 30)]
    pub fps: u32,

    /// Minimum palm detection confidence needed to start tracking a hand
    #[arg(long, default_value_t = 0.6)]
    pub min_detection_confidence: f32,

    /// Minimum hand presence confidence needed to keep tracking a hand
    #[arg(long, default_value_t = 0.6)]
    pub min_tracking_confidence: f32,

    /// Do not mirror the camera image
    #[arg(long)]
    pub no_mirror: bool,

    /// Continue numbering after the sequences already recorded for a gesture
    #[arg(long)]
    pub resume: bool,
}

impl Config {
    /// Parses the configuration from the process arguments and validates it.
    ///
    /// Exits the process with a usage message if the arguments cannot be parsed.
    pub fn from_args() -> anyhow::Result<Self> {
        let config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    /// Checks for values that parse correctly but cannot be used.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.sequences == 0 {
            bail!("--sequences must be at least 1");
        }
        if self.frames == 0 {
            bail!("--frames must be at least 1");
        }
        if self.fps == 0 {
            bail!("--fps must be at least 1");
        }
        if let Some(res) = self.resolution() {
            if res.width() == 0 || res.height() == 0 {
                bail!("capture resolution {} is empty", res);
            }
        }
        for (flag, value) in [
            ("--min-detection-confidence", self.min_detection_confidence),
            ("--min-tracking-confidence", self.min_tracking_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                bail!("{} must be between 0.0 and 1.0, got {}", flag, value);
            }
        }
        Ok(())
    }

    /// Returns the preferred capture resolution, if both `--width` and `--height` are given.
    pub fn resolution(&self) -> Option<Resolution> {
        match (self.width, self.height) {
            (Some(w), Some(h)) => Some(Resolution::new(w, h)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        Config::try_parse_from(["handrec"].iter().chain(args)).unwrap()
    }

    #[test]
    fn defaults() {
        let config = parse(&[]);
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert_eq!(config.sequences, 60);
        assert_eq!(config.frames, 30);
        assert_eq!(config.countdown, 3);
        assert_eq!(config.models, PathBuf::from("3rdparty/onnx"));
        assert!(!config.lite);
        assert_eq!(config.camera, None);
        assert_eq!(config.resolution(), None);
        assert_eq!(config.fps, 30);
        assert_eq!(config.min_detection_confidence, 0.6);
        assert_eq!(config.min_tracking_confidence, 0.6);
        assert!(!config.no_mirror);
        assert!(!config.resume);
        config.validate().unwrap();
    }

    #[test]
    fn flags() {
        let config = parse(&[
            "--data-dir",
            "/tmp/gestures",
            "--sequences",
            "5",
            "--frames",
            "10",
            "--lite",
            "--camera",
            "USB Camera",
            "--width",
            "1280",
            "--height",
            "720",
            "--no-mirror",
            "--resume",
        ]);
        assert_eq!(config.data_dir, PathBuf::from("/tmp/gestures"));
        assert_eq!(config.sequences, 5);
        assert_eq!(config.frames, 10);
        assert!(config.lite);
        assert_eq!(config.camera.as_deref(), Some("USB Camera"));
        assert_eq!(config.resolution(), Some(Resolution::new(1280, 720)));
        assert!(config.no_mirror);
        assert!(config.resume);
    }

    #[test]
    fn width_requires_height() {
        assert!(Config::try_parse_from(["handrec", "--width", "640"]).is_err());
    }

    #[test]
    fn rejects_unusable_values() {
        assert!(parse(&["--sequences", "0"]).validate().is_err());
        assert!(parse(&["--frames", "0"]).validate().is_err());
        assert!(parse(&["--min-detection-confidence", "1.5"])
            .validate()
            .is_err());
        assert!(parse(&["--min-tracking-confidence=-0.1"])
            .validate()
            .is_err());
        assert!(parse(&["--min-tracking-confidence", "1.0"])
            .validate()
            .is_ok());
    }
}
