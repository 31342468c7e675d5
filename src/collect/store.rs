//! On-disk dataset layout.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context};
use ndarray_npy::write_npy;

use super::keypoints::Keypoints;

/// Writes keypoint vectors to `<root>/<gesture>/<sequence>/<frame>.npy`.
///
/// Directories are created on demand. Existing files are overwritten.
#[derive(Debug, Clone)]
pub struct DataStore {
    root: PathBuf,
}

impl DataStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the directory for `gesture`, including all missing parents.
    ///
    /// Succeeds if the directory already exists.
    pub fn create_gesture(&self, gesture: &str) -> anyhow::Result<PathBuf> {
        validate_gesture_name(gesture)?;
        let dir = self.gesture_dir(gesture);
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create gesture directory {}", dir.display()))?;
        Ok(dir)
    }

    pub fn gesture_dir(&self, gesture: &str) -> PathBuf {
        self.root.join(gesture)
    }

    pub fn sequence_dir(&self, gesture: &str, sequence: u32) -> PathBuf {
        self.gesture_dir(gesture).join(sequence.to_string())
    }

    pub fn frame_path(&self, gesture: &str, sequence: u32, frame: u32) -> PathBuf {
        self.sequence_dir(gesture, sequence)
            .join(format!("{}.npy", frame))
    }

    /// Writes `keypoints` as a 1-D `float64` NumPy array and returns the path of the new file.
    pub fn save_frame(
        &self,
        gesture: &str,
        sequence: u32,
        frame: u32,
        keypoints: &Keypoints,
    ) -> anyhow::Result<PathBuf> {
        validate_gesture_name(gesture)?;
        let dir = self.sequence_dir(gesture, sequence);
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create sequence directory {}", dir.display()))?;

        let path = self.frame_path(gesture, sequence, frame);
        write_npy(&path, &keypoints.to_array())
            .with_context(|| format!("failed to write {}", path.display()))?;
        log::trace!("wrote {}", path.display());
        Ok(path)
    }

    /// Returns the lowest sequence index of `gesture` that has no directory yet.
    pub fn next_free_sequence(&self, gesture: &str) -> anyhow::Result<u32> {
        validate_gesture_name(gesture)?;
        let mut sequence = 0;
        while self.sequence_dir(gesture, sequence).exists() {
            sequence += 1;
        }
        Ok(sequence)
    }
}

/// Checks that `name` can be used as a single directory name below the dataset root.
pub fn validate_gesture_name(name: &str) -> anyhow::Result<()> {
    if name.is_empty() {
        bail!("gesture name must not be empty");
    }
    if name == "." || name == ".." {
        bail!("invalid gesture name '{}'", name);
    }
    if name.contains(['/', '\\', '\0']) {
        bail!("gesture name '{}' must not contain path separators", name);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use ndarray::Array1;
    use ndarray_npy::read_npy;

    use super::*;

    #[test]
    fn layout() {
        let store = DataStore::new("data");
        assert_eq!(store.gesture_dir("wave"), Path::new("data/wave"));
        assert_eq!(store.sequence_dir("wave", 3), Path::new("data/wave/3"));
        assert_eq!(store.frame_path("wave", 3, 29), Path::new("data/wave/3/29.npy"));
    }

    #[test]
    fn gesture_names() {
        assert!(validate_gesture_name("hello").is_ok());
        assert!(validate_gesture_name("").is_err());
        assert!(validate_gesture_name(".").is_err());
        assert!(validate_gesture_name("..").is_err());
        assert!(validate_gesture_name("a/b").is_err());
        assert!(validate_gesture_name("a\\b").is_err());
    }

    #[test]
    fn create_gesture_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DataStore::new(tmp.path().join("nested").join("data"));
        let dir = store.create_gesture("wave").unwrap();
        assert!(dir.is_dir());
        store.create_gesture("wave").unwrap();
        assert!(store.create_gesture("..").is_err());
    }

    #[test]
    fn save_frame_writes_npy() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DataStore::new(tmp.path());
        let path = store
            .save_frame("wave", 2, 7, &Keypoints::empty())
            .unwrap();
        assert_eq!(path, tmp.path().join("wave").join("2").join("7.npy"));

        let array: Array1<f64> = read_npy(&path).unwrap();
        assert_eq!(array.len(), 126);
        assert!(array.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn next_free_sequence() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DataStore::new(tmp.path());
        assert_eq!(store.next_free_sequence("wave").unwrap(), 0);

        store.create_gesture("wave").unwrap();
        assert_eq!(store.next_free_sequence("wave").unwrap(), 0);

        for seq in [0, 1, 3] {
            fs::create_dir_all(store.sequence_dir("wave", seq)).unwrap();
        }
        assert_eq!(store.next_free_sequence("wave").unwrap(), 2);
    }
}
