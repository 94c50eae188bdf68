use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::{
    graph::CorrespondenceGraph,
    matchfile::{self, InterestPoint, MatchFileError, Matches},
    report::{self, ProgressListener, Warning},
};

const MIN_FEATURE_SCALE: f32 = 10.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestionSummary {
    pub loaded: usize,
    pub rejected: usize,
    pub files_loaded: usize,
    pub files_rejected: usize,
    pub files_missing: usize,
    pub files_unreadable: usize,
    /// Files that were read, but refer to images the graph doesn't have.
    pub files_incompatible: usize,
}

struct PairFile {
    image1: usize,
    image2: usize,
    path: PathBuf,
}

/// Finds match files for every image pair `i < j`.
fn find_pair_files<PL: ProgressListener>(
    image_files: &[PathBuf],
    prefix: &str,
    progress_listener: Option<&PL>,
    summary: &mut IngestionSummary,
) -> Vec<PairFile> {
    let mut pair_files = vec![];
    for i in 0..image_files.len() {
        for j in i + 1..image_files.len() {
            let path = matchfile::match_filename(prefix, &image_files[i], &image_files[j]);
            if !path.exists() {
                summary.files_missing += 1;
                report::warn(progress_listener, Warning::MissingMatchFile(path));
                continue;
            }
            pair_files.push(PairFile {
                image1: i,
                image2: j,
                path,
            });
        }
    }
    pair_files
}

/// Descriptors are only needed to find matches; scale has to be positive for bundle adjustment.
fn prepare_points(points: &mut [InterestPoint]) {
    points.iter_mut().for_each(|ip| {
        ip.descriptor = vec![];
        if ip.scale <= 0.0 {
            ip.scale = MIN_FEATURE_SCALE;
        }
    });
}

/// Loads all available match files into `graph`.
///
/// Files are read in parallel, but added to the graph one at a time in pair order.
pub fn ingest_matches<PL: ProgressListener>(
    graph: &mut CorrespondenceGraph,
    image_files: &[PathBuf],
    prefix: &str,
    min_matches: usize,
    progress_listener: Option<&PL>,
) -> IngestionSummary {
    let mut summary = IngestionSummary::default();
    let pair_files = find_pair_files(image_files, prefix, progress_listener, &mut summary);

    let loaded_files = pair_files
        .par_iter()
        .map(|pair_file| matchfile::read_match_file(&pair_file.path))
        .collect::<Vec<_>>();

    for (pair_file, matches) in pair_files.iter().zip(loaded_files) {
        ingest_file(
            graph,
            pair_file,
            matches,
            min_matches,
            progress_listener,
            &mut summary,
        );
    }

    if summary.rejected != 0 {
        report::warn(
            progress_listener,
            Warning::RejectedMatches {
                rejected: summary.rejected,
                loaded: summary.loaded,
            },
        );
    }
    summary
}

fn ingest_file<PL: ProgressListener>(
    graph: &mut CorrespondenceGraph,
    pair_file: &PairFile,
    matches: Result<Matches, MatchFileError>,
    min_matches: usize,
    progress_listener: Option<&PL>,
    summary: &mut IngestionSummary,
) {
    let path = &pair_file.path;
    let (mut ip1, mut ip2) = match matches {
        Ok(matches) => matches,
        Err(err) => {
            summary.files_unreadable += 1;
            report::warn(progress_listener, unreadable(path, err.to_string()));
            return;
        }
    };

    if ip1.len() < min_matches {
        log::debug!("{} has {} matches [rejected]", path.display(), ip1.len());
        summary.rejected += ip1.len();
        summary.files_rejected += 1;
        return;
    }
    log::debug!("{} has {} matches", path.display(), ip1.len());

    prepare_points(&mut ip1);
    prepare_points(&mut ip2);
    match graph.ingest_pair(pair_file.image1, pair_file.image2, &ip1, &ip2) {
        Ok(count) => {
            summary.loaded += count;
            summary.files_loaded += 1;
        }
        Err(err) => {
            summary.files_incompatible += 1;
            report::warn(
                progress_listener,
                Warning::IncompatibleMatchFile {
                    path: path.to_path_buf(),
                    error: err.to_string(),
                },
            );
        }
    }
}

fn unreadable(path: &Path, error: String) -> Warning {
    Warning::UnreadableMatchFile {
        path: path.to_path_buf(),
        error,
    }
}
