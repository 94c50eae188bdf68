use std::{
    fmt,
    path::{Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
};

use rayon::prelude::*;

use crate::{
    camera::CameraModel,
    graph::{CorrespondenceGraph, GraphError},
    network::ControlNetwork,
    pointmatching::{self, IngestionSummary},
    report::{self, ProgressListener, Warning},
    triangulation::{self, TriangulationOutcome},
};

#[derive(Debug, Clone, PartialEq)]
pub struct NetworkConfiguration {
    /// Estimate 3D positions of the materialized points.
    pub triangulate: bool,
    /// Match files with fewer matches are rejected entirely.
    pub min_matches: usize,
    /// Prefix of match filenames, see [`crate::matchfile::match_filename`].
    pub match_prefix: String,
    /// Minimum convergence angle (radians) for an image pair to be intersected.
    pub min_angle: f64,
}

impl Default for NetworkConfiguration {
    fn default() -> NetworkConfiguration {
        NetworkConfiguration {
            triangulate: true,
            min_matches: 30,
            match_prefix: "run".to_string(),
            min_angle: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TriangulationSummary {
    pub triangulated: usize,
    pub fallback: usize,
    pub skipped: usize,
    /// Mean miss distance of intersected rays, over triangulated points.
    pub mean_error: f64,
}

#[derive(Debug)]
pub struct NetworkBuild {
    pub network: ControlNetwork,
    pub ingestion: IngestionSummary,
    pub triangulation: TriangulationSummary,
}

fn image_name(path: &Path) -> String {
    path.file_stem()
        .unwrap_or(path.as_os_str())
        .to_string_lossy()
        .to_string()
}

/// Builds a control network from pairwise match files of `image_files`.
///
/// Match files are expected at [`crate::matchfile::match_filename`] for each pair `i < j`.
/// Missing or low quality data is reported through `progress_listener` and skipped; the only
/// fatal error is a correspondence graph that can't produce a network.
pub fn build_control_network<C: CameraModel, PL: ProgressListener>(
    config: &NetworkConfiguration,
    camera_models: &[C],
    image_files: &[PathBuf],
    progress_listener: Option<&PL>,
) -> Result<NetworkBuild, NetworkError> {
    let mut graph = CorrespondenceGraph::new();
    for path in image_files {
        graph.add_node(&image_name(path));
    }

    let ingestion = pointmatching::ingest_matches(
        &mut graph,
        image_files,
        &config.match_prefix,
        config.min_matches,
        progress_listener,
    );
    log::debug!(
        "Loaded {} matches from {} files, graph has {} features",
        ingestion.loaded,
        ingestion.files_loaded,
        graph.features_len()
    );

    let mut network = graph.materialize()?;
    drop(graph);

    let triangulation = if config.triangulate {
        triangulate_network(&mut network, camera_models, config.min_angle, progress_listener)
    } else {
        TriangulationSummary::default()
    };

    Ok(NetworkBuild {
        network,
        ingestion,
        triangulation,
    })
}

fn triangulate_network<C: CameraModel, PL: ProgressListener>(
    network: &mut ControlNetwork,
    camera_models: &[C],
    min_angle: f64,
    progress_listener: Option<&PL>,
) -> TriangulationSummary {
    let points_count = network.len() as f32;
    let counter = AtomicUsize::new(0);
    let outcomes = network
        .points_mut()
        .par_iter_mut()
        .enumerate()
        .map(|(point_i, point)| {
            let outcome = triangulation::triangulate_control_point(point, camera_models, min_angle);
            let value = counter.fetch_add(1, Ordering::Relaxed) as f32 / points_count;
            report::status(progress_listener, value);
            (point_i, outcome)
        })
        .collect::<Vec<_>>();

    let mut summary = TriangulationSummary::default();
    let mut error_sum = 0.0;
    for (point_i, outcome) in outcomes {
        match outcome {
            Ok(TriangulationOutcome::Intersected { mean_error, .. }) => {
                summary.triangulated += 1;
                error_sum += mean_error;
            }
            Ok(TriangulationOutcome::Fallback) => {
                summary.fallback += 1;
                report::warn(progress_listener, Warning::TriangulationFailed { point_i });
            }
            Err(err) => {
                summary.skipped += 1;
                report::warn(
                    progress_listener,
                    Warning::UntriangulatedPoint {
                        point_i,
                        error: err.to_string(),
                    },
                );
            }
        }
    }
    if summary.triangulated > 0 {
        summary.mean_error = error_sum / summary.triangulated as f64;
    }
    summary
}

#[derive(Debug)]
pub enum NetworkError {
    Graph(GraphError),
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            NetworkError::Graph(ref err) => write!(f, "Failed to build control network: {}", err),
        }
    }
}

impl std::error::Error for NetworkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match *self {
            NetworkError::Graph(ref err) => Some(err),
        }
    }
}

impl From<GraphError> for NetworkError {
    fn from(e: GraphError) -> NetworkError {
        NetworkError::Graph(e)
    }
}
