//! Gesture dataset collection.
//!
//! The operator names a gesture, then records a fixed number of sequences of hand keypoints for
//! it. [`session::Session`] drives the interaction, [`keypoints`] turns tracked hands into
//! fixed-size vectors, [`store::DataStore`] writes them to disk, and [`overlay`] renders the
//! operator UI onto the camera frame.
//!
//! The resulting dataset has the layout `<root>/<gesture>/<sequence>/<frame>.npy`.

pub mod keypoints;
pub mod overlay;
pub mod session;
pub mod store;
