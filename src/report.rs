use std::{fmt, path::PathBuf};

/// Receives progress and recoverable problems from the network builder.
///
/// Every stage accepts an `Option<&PL>`; without a listener, warnings go to the `log` facade.
pub trait ProgressListener
where
    Self: Sync + Sized,
{
    fn report_status(&self, pos: f32);
    fn report_warning(&self, warning: &Warning);
}

#[derive(Debug, Clone, PartialEq)]
pub enum Warning {
    MissingMatchFile(PathBuf),
    UnreadableMatchFile { path: PathBuf, error: String },
    IncompatibleMatchFile { path: PathBuf, error: String },
    RejectedMatches { rejected: usize, loaded: usize },
    TriangulationFailed { point_i: usize },
    UntriangulatedPoint { point_i: usize, error: String },
    UnknownImage(String),
    MissingGcpFile(PathBuf),
    UnparseableGcpLine(String),
    EmptyGroundControlPoint(String),
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Warning::MissingMatchFile(path) => {
                write!(f, "Missing match file: {}", path.display())
            }
            Warning::UnreadableMatchFile { path, error } => {
                write!(f, "Failed to read match file {}: {}", path.display(), error)
            }
            Warning::IncompatibleMatchFile { path, error } => write!(
                f,
                "Match file {} doesn't fit the image list: {}",
                path.display(),
                error
            ),
            Warning::RejectedMatches { rejected, loaded } => write!(
                f,
                "Didn't load {} matches due to inadequacy, loaded {} matches. \
                Decrease the minimum matches parameter to load smaller sets of matches",
                rejected, loaded
            ),
            Warning::TriangulationFailed { point_i } => {
                write!(f, "Unable to triangulate point {}", point_i)
            }
            Warning::UntriangulatedPoint { point_i, error } => {
                write!(f, "Skipped triangulation of point {}: {}", point_i, error)
            }
            Warning::UnknownImage(name) => write!(f, "No image found matching {}", name),
            Warning::MissingGcpFile(path) => {
                write!(f, "Missing ground control file: {}", path.display())
            }
            Warning::UnparseableGcpLine(line) => {
                write!(f, "Could not parse a ground control point from line: {}", line)
            }
            Warning::EmptyGroundControlPoint(id) => write!(
                f,
                "Ground control point {} has no measures in known images, skipping",
                id
            ),
        }
    }
}

#[inline]
pub(crate) fn warn<PL: ProgressListener>(progress_listener: Option<&PL>, warning: Warning) {
    match progress_listener {
        Some(pl) => pl.report_warning(&warning),
        None => log::warn!("{}", warning),
    }
}

#[inline]
pub(crate) fn status<PL: ProgressListener>(progress_listener: Option<&PL>, pos: f32) {
    if let Some(pl) = progress_listener {
        pl.report_status(pos);
    }
}

/// Forwards warnings to the `log` facade and ignores progress.
pub struct LogListener;

impl ProgressListener for LogListener {
    fn report_status(&self, _pos: f32) {}

    fn report_warning(&self, warning: &Warning) {
        log::warn!("{}", warning);
    }
}
