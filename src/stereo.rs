use std::fmt;

use nalgebra::{UnitVector3, Vector3};

use crate::{
    camera::{CameraError, CameraModel},
    data::Point2D,
};

const PARALLEL_EPSILON: f64 = 1e-12;

/// Intersects rays of two cameras.
pub struct StereoModel<'a> {
    left: &'a dyn CameraModel,
    right: &'a dyn CameraModel,
}

struct RayPair {
    left_center: Vector3<f64>,
    left_ray: UnitVector3<f64>,
    right_center: Vector3<f64>,
    right_ray: UnitVector3<f64>,
}

impl<'a> StereoModel<'a> {
    pub fn new(left: &'a dyn CameraModel, right: &'a dyn CameraModel) -> StereoModel<'a> {
        StereoModel { left, right }
    }

    fn rays(
        &self,
        left_pixel: &Point2D<f64>,
        right_pixel: &Point2D<f64>,
    ) -> Result<RayPair, StereoError> {
        Ok(RayPair {
            left_center: self.left.camera_center(left_pixel),
            left_ray: self.left.pixel_to_vector(left_pixel)?,
            right_center: self.right.camera_center(right_pixel),
            right_ray: self.right.pixel_to_vector(right_pixel)?,
        })
    }

    /// Angle between the two rays, in radians.
    pub fn convergence_angle(
        &self,
        left_pixel: &Point2D<f64>,
        right_pixel: &Point2D<f64>,
    ) -> Result<f64, StereoError> {
        let rays = self.rays(left_pixel, right_pixel)?;
        let cos = rays.left_ray.dot(&rays.right_ray).clamp(-1.0, 1.0);
        Ok(cos.acos())
    }

    /// Returns the midpoint of the closest approach between both rays, and the distance between
    /// the rays at that point.
    pub fn triangulate(
        &self,
        left_pixel: &Point2D<f64>,
        right_pixel: &Point2D<f64>,
    ) -> Result<(Vector3<f64>, f64), StereoError> {
        let rays = self.rays(left_pixel, right_pixel)?;
        let d1 = rays.left_ray.into_inner();
        let d2 = rays.right_ray.into_inner();
        let w0 = rays.left_center - rays.right_center;

        // Both directions are unit vectors, so a = c = 1.
        let b = d1.dot(&d2);
        let d = d1.dot(&w0);
        let e = d2.dot(&w0);
        let denom = 1.0 - b * b;
        if denom < PARALLEL_EPSILON {
            return Err(StereoError::ParallelRays);
        }
        let s = (b * e - d) / denom;
        let t = (e - b * d) / denom;
        if s <= 0.0 || t <= 0.0 {
            return Err(StereoError::BehindCamera);
        }

        let closest_left = rays.left_center + d1 * s;
        let closest_right = rays.right_center + d2 * t;
        let error = (closest_left - closest_right).norm();
        Ok(((closest_left + closest_right) / 2.0, error))
    }
}

#[derive(Debug)]
pub enum StereoError {
    Camera(CameraError),
    ParallelRays,
    BehindCamera,
}

impl fmt::Display for StereoError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            StereoError::Camera(ref err) => err.fmt(f),
            StereoError::ParallelRays => f.write_str("Rays are parallel"),
            StereoError::BehindCamera => f.write_str("Rays intersect behind a camera"),
        }
    }
}

impl std::error::Error for StereoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match *self {
            StereoError::Camera(ref err) => Some(err),
            StereoError::ParallelRays | StereoError::BehindCamera => None,
        }
    }
}

impl From<CameraError> for StereoError {
    fn from(e: CameraError) -> StereoError {
        StereoError::Camera(e)
    }
}
