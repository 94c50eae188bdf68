use std::{
    collections::HashMap,
    fmt,
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};

use nalgebra::Vector3;

use crate::{
    data::Point2D,
    datum::Datum,
    network::{ControlMeasure, ControlNetwork, ControlPoint},
    report::{self, ProgressListener, Warning},
};

/// Resolves image names from ground control data to image ids.
struct ImageLookup {
    images: HashMap<String, usize>,
}

impl ImageLookup {
    fn new(image_files: &[PathBuf]) -> ImageLookup {
        let mut images = HashMap::new();
        for (image_i, path) in image_files.iter().enumerate() {
            images.insert(path.to_string_lossy().to_string(), image_i);
            if let Some(file_name) = path.file_name() {
                images.insert(file_name.to_string_lossy().to_string(), image_i);
            }
        }
        ImageLookup { images }
    }

    fn find(&self, name: &str) -> Option<usize> {
        self.images.get(name).copied()
    }
}

fn positive_sigma(values: &[f64], line: &str) -> Result<(), GcpError> {
    if values.iter().all(|value| *value > 0.0) {
        Ok(())
    } else {
        Err(GcpError::NonPositiveSigma(line.to_string()))
    }
}

/// Parses a ground control line.
///
/// Returns `Ok(None)` for lines that should be skipped.
fn parse_line<PL: ProgressListener>(
    line: &str,
    lookup: &ImageLookup,
    datum: &Datum,
    progress_listener: Option<&PL>,
) -> Result<Option<ControlPoint>, GcpError> {
    if line.trim().is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let normalized = line.replace(',', " ");
    let fields = normalized.split_whitespace().collect::<Vec<_>>();

    let header = fields
        .get(..7)
        .and_then(|header| {
            let id = header[0].parse::<i64>().ok()?;
            let values = header[1..]
                .iter()
                .map(|value| value.parse::<f64>().ok())
                .collect::<Option<Vec<_>>>()?;
            Some((id, values))
        });
    let (id, values) = match header {
        Some(header) => header,
        None => {
            report::warn(
                progress_listener,
                Warning::UnparseableGcpLine(line.to_string()),
            );
            return Ok(None);
        }
    };

    // Image measures follow until the first group that doesn't parse.
    let mut measures = vec![];
    for group in fields[7..].chunks_exact(5) {
        let values = group[1..]
            .iter()
            .map(|value| value.parse::<f64>().ok())
            .collect::<Option<Vec<_>>>();
        let values = match values {
            Some(values) => values,
            None => break,
        };
        positive_sigma(&values[2..4], line)?;
        measures.push((group[0], values));
    }
    positive_sigma(&values[3..6], line)?;

    let lon_lat_height = Vector3::new(values[1], values[0], values[2]);
    let position = datum.geodetic_to_cartesian(&lon_lat_height);
    let sigma = Vector3::new(values[3], values[4], values[5]);
    log::debug!("Ground control point {} location: {}", id, position);

    let mut point = ControlPoint::ground_control(&id.to_string(), position, sigma);
    for (name, values) in measures {
        match lookup.find(name) {
            Some(image_i) => {
                log::debug!("Added measure: {} #{}", name, image_i);
                point.add_measure(ControlMeasure::new(
                    Point2D::new(values[0], values[1]),
                    Point2D::new(values[2], values[3]),
                    image_i,
                    name,
                ));
            }
            None => report::warn(progress_listener, Warning::UnknownImage(name.to_string())),
        }
    }
    if point.is_empty() {
        report::warn(
            progress_listener,
            Warning::EmptyGroundControlPoint(point.id().to_string()),
        );
        return Ok(None);
    }
    Ok(Some(point))
}

/// Appends ground control points from text files to `cnet`.
///
/// All files are parsed before anything is added; if any line has a non-positive sigma, the
/// whole call fails and `cnet` is unchanged. Points without a measure in a known image are
/// skipped. Returns the number of added points.
pub fn add_ground_control_points<P: AsRef<Path>, PL: ProgressListener>(
    cnet: &mut ControlNetwork,
    image_files: &[PathBuf],
    gcp_files: &[P],
    datum: &Datum,
    progress_listener: Option<&PL>,
) -> Result<usize, GcpError> {
    let lookup = ImageLookup::new(image_files);
    let mut points = vec![];
    for gcp_file in gcp_files {
        let gcp_file = gcp_file.as_ref();
        if !gcp_file.exists() {
            report::warn(
                progress_listener,
                Warning::MissingGcpFile(gcp_file.to_path_buf()),
            );
            continue;
        }
        log::debug!("Loading: {}", gcp_file.display());
        let reader = BufReader::new(File::open(gcp_file)?);
        for line in reader.lines() {
            let line = line?;
            if let Some(point) = parse_line(&line, &lookup, datum, progress_listener)? {
                points.push(point);
            }
        }
    }

    let count = points.len();
    points
        .into_iter()
        .for_each(|point| cnet.add_control_point(point));
    Ok(count)
}

/// Appends points of already built networks to `cnet` as ground control.
///
/// Measures are matched to `image_files` by their image name; measures of unknown images are
/// dropped, as are points left without measures. Returns the number of added points.
pub fn add_ground_control_cnets<I, PL>(
    cnet: &mut ControlNetwork,
    image_files: &[PathBuf],
    gcp_cnets: I,
    progress_listener: Option<&PL>,
) -> usize
where
    I: IntoIterator<Item = ControlNetwork>,
    PL: ProgressListener,
{
    let lookup = ImageLookup::new(image_files);
    let mut count = 0;
    for gcp_cnet in gcp_cnets {
        for mut point in gcp_cnet {
            for measure in point.take_measures() {
                match lookup.find(measure.serial()) {
                    Some(image_i) => point.add_measure(measure.reindex(image_i)),
                    None => report::warn(
                        progress_listener,
                        Warning::UnknownImage(measure.serial().to_string()),
                    ),
                }
            }
            if point.is_empty() {
                report::warn(
                    progress_listener,
                    Warning::EmptyGroundControlPoint(point.id().to_string()),
                );
                continue;
            }
            let point = point.into_ground_control();
            if let Some(position) = point.position() {
                log::debug!("Added ground control point: {}", position);
            }
            cnet.add_control_point(point);
            count += 1;
        }
    }
    count
}

#[derive(Debug)]
pub enum GcpError {
    NonPositiveSigma(String),
    Io(std::io::Error),
}

impl fmt::Display for GcpError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            GcpError::NonPositiveSigma(ref line) => write!(
                f,
                "Standard deviations must be positive when loading ground control points: {}",
                line
            ),
            GcpError::Io(ref err) => err.fmt(f),
        }
    }
}

impl std::error::Error for GcpError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match *self {
            GcpError::NonPositiveSigma(_) => None,
            GcpError::Io(ref err) => Some(err),
        }
    }
}

impl From<std::io::Error> for GcpError {
    fn from(e: std::io::Error) -> GcpError {
        GcpError::Io(e)
    }
}
