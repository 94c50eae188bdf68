//! Builds control networks from pairwise image feature matches.
//!
//! Matches of every image pair are merged into a correspondence graph, grouped into tracks of
//! the same ground feature, and triangulated into 3D control points. Ground control points can
//! be appended from survey files or other networks.

pub mod camera;
pub mod data;
pub mod datum;
pub mod gcp;
pub mod graph;
pub mod matchfile;
pub mod network;
pub mod output;
pub mod pointmatching;
pub mod reconstruction;
pub mod report;
pub mod stereo;
pub mod triangulation;

pub use camera::{CameraModel, PinholeCamera};
pub use network::{ControlMeasure, ControlNetwork, ControlPoint, PointKind};
pub use reconstruction::{
    NetworkBuild, NetworkConfiguration, NetworkError, build_control_network,
};
pub use report::{LogListener, ProgressListener, Warning};
