use std::{
    collections::HashMap,
    fmt,
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};

use nalgebra::{Matrix3, Rotation3, UnitQuaternion, UnitVector3, Vector3};

use crate::data::Point2D;

/// Maps between image pixels and world-space rays.
///
/// Every query takes the pixel so that models whose center or orientation vary across the
/// image (e.g. pushbroom sensors) can be expressed.
pub trait CameraModel
where
    Self: Send + Sync,
{
    fn camera_center(&self, pixel: &Point2D<f64>) -> Vector3<f64>;

    fn pixel_to_vector(&self, pixel: &Point2D<f64>) -> Result<UnitVector3<f64>, CameraError>;

    fn camera_pose(&self, pixel: &Point2D<f64>) -> UnitQuaternion<f64>;

    fn point_to_pixel(&self, point: &Vector3<f64>) -> Result<Point2D<f64>, CameraError>;
}

#[derive(Debug, Clone)]
pub struct PinholeCamera {
    focal_length: (f64, f64),
    principal_point: (f64, f64),
    center: Vector3<f64>,
    rotation: Rotation3<f64>,
}

impl PinholeCamera {
    /// `rotation` converts camera coordinates (x right, y down, z forward) into world coordinates.
    pub fn new(
        focal_length: (f64, f64),
        principal_point: (f64, f64),
        center: Vector3<f64>,
        rotation: Rotation3<f64>,
    ) -> PinholeCamera {
        PinholeCamera {
            focal_length,
            principal_point,
            center,
            rotation,
        }
    }

    pub fn from_axis_angle(
        focal_length: (f64, f64),
        principal_point: (f64, f64),
        center: Vector3<f64>,
        axis_angle: Vector3<f64>,
    ) -> PinholeCamera {
        PinholeCamera::new(
            focal_length,
            principal_point,
            center,
            Rotation3::new(axis_angle),
        )
    }

    pub fn k(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.focal_length.0,
            0.0,
            self.principal_point.0,
            0.0,
            self.focal_length.1,
            self.principal_point.1,
            0.0,
            0.0,
            1.0,
        )
    }
}

impl CameraModel for PinholeCamera {
    fn camera_center(&self, _pixel: &Point2D<f64>) -> Vector3<f64> {
        self.center
    }

    fn pixel_to_vector(&self, pixel: &Point2D<f64>) -> Result<UnitVector3<f64>, CameraError> {
        if !pixel.is_finite() {
            return Err(CameraError::PixelToRay("Pixel coordinates are not finite"));
        }
        if self.focal_length.0 == 0.0 || self.focal_length.1 == 0.0 {
            return Err(CameraError::PixelToRay("Focal length is zero"));
        }
        let direction = Vector3::new(
            (pixel.x - self.principal_point.0) / self.focal_length.0,
            (pixel.y - self.principal_point.1) / self.focal_length.1,
            1.0,
        );
        Ok(UnitVector3::new_normalize(self.rotation * direction))
    }

    fn camera_pose(&self, _pixel: &Point2D<f64>) -> UnitQuaternion<f64> {
        UnitQuaternion::from_rotation_matrix(&self.rotation)
    }

    fn point_to_pixel(&self, point: &Vector3<f64>) -> Result<Point2D<f64>, CameraError> {
        let point_camera = self.rotation.inverse() * (point - self.center);
        if point_camera.z <= 0.0 {
            return Err(CameraError::PointBehindCamera);
        }
        Ok(Point2D::new(
            self.focal_length.0 * point_camera.x / point_camera.z + self.principal_point.0,
            self.focal_length.1 * point_camera.y / point_camera.z + self.principal_point.1,
        ))
    }
}

/// Reads one pinhole camera per image.
///
/// Each line is `image_name fx fy cx cy center_x center_y center_z rot_x rot_y rot_z`, separated
/// by commas or whitespace; the rotation is an axis-angle vector. Images are matched by their
/// full path, file name or stem, and the result follows the order of `image_files`.
pub fn load_pinhole_cameras<P: AsRef<Path>>(
    path: P,
    image_files: &[PathBuf],
) -> Result<Vec<PinholeCamera>, CameraError> {
    let reader = BufReader::new(File::open(path)?);
    let mut cameras = HashMap::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.replace(',', " ");
        let mut fields = line.split_whitespace();
        let name = match fields.next() {
            Some(name) => name.to_string(),
            None => continue,
        };
        let values = fields
            .map(|value| value.parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| CameraError::Parse(format!("Invalid camera parameters: {}", line)))?;
        if values.len() != 10 {
            return Err(CameraError::Parse(format!(
                "Expected 10 camera parameters, got {}: {}",
                values.len(),
                line
            )));
        }
        let camera = PinholeCamera::from_axis_angle(
            (values[0], values[1]),
            (values[2], values[3]),
            Vector3::new(values[4], values[5], values[6]),
            Vector3::new(values[7], values[8], values[9]),
        );
        cameras.insert(name, camera);
    }

    image_files
        .iter()
        .map(|image| {
            let keys = [
                Some(image.to_string_lossy().to_string()),
                image
                    .file_name()
                    .map(|name| name.to_string_lossy().to_string()),
                image.file_stem().map(|stem| stem.to_string_lossy().to_string()),
            ];
            keys.iter()
                .flatten()
                .find_map(|key| cameras.get(key))
                .cloned()
                .ok_or_else(|| CameraError::MissingCamera(image.display().to_string()))
        })
        .collect()
}

#[derive(Debug)]
pub enum CameraError {
    PixelToRay(&'static str),
    PointBehindCamera,
    MissingCamera(String),
    Parse(String),
    Io(std::io::Error),
}

impl fmt::Display for CameraError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            CameraError::PixelToRay(msg) => write!(f, "Failed to compute pixel ray: {}", msg),
            CameraError::PointBehindCamera => f.write_str("Point is behind the camera"),
            CameraError::MissingCamera(ref image) => {
                write!(f, "No camera model found for image {}", image)
            }
            CameraError::Parse(ref msg) => f.write_str(msg),
            CameraError::Io(ref err) => err.fmt(f),
        }
    }
}

impl std::error::Error for CameraError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match *self {
            CameraError::Io(ref err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CameraError {
    fn from(e: std::io::Error) -> CameraError {
        CameraError::Io(e)
    }
}
