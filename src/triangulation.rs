use std::fmt;

use nalgebra::Vector3;

use crate::{
    camera::CameraModel,
    network::{ControlMeasure, ControlPoint},
    stereo::StereoModel,
};

const CAMERA_CENTER_TOLERANCE: f64 = 1e-6;
const FALLBACK_DISTANCE: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TriangulationOutcome {
    /// Position is the mean of `pairs` ray intersections.
    Intersected { pairs: usize, mean_error: f64 },
    /// No usable image pair; position was placed in front of the first camera.
    Fallback,
}

/// Sets the position of `point` from its measures.
///
/// Only adjacent measures are intersected, so the cost is linear in the number of measures.
/// Degenerate geometry never fails; the error cases are points that can't be processed at all.
pub fn triangulate_control_point<C: CameraModel>(
    point: &mut ControlPoint,
    camera_models: &[C],
    minimum_angle: f64,
) -> Result<TriangulationOutcome, TriangulationError> {
    if point.is_empty() {
        return Err(TriangulationError::NoMeasures);
    }
    let camera = |measure: &ControlMeasure| {
        camera_models
            .get(measure.image_i())
            .ok_or(TriangulationError::MissingCamera(measure.image_i()))
    };
    let cameras = point.iter().map(camera).collect::<Result<Vec<_>, _>>()?;

    let mut position_sum = Vector3::<f64>::zeros();
    let mut error_sum = 0.0;
    let mut count = 0usize;
    for (j, k) in (0..point.len()).zip(1..point.len()) {
        let (measure_j, measure_k) = (&point[j], &point[k]);
        let (camera_j, camera_k) = (cameras[j], cameras[k]);
        let (pixel_j, pixel_k) = (measure_j.pixel(), measure_k.pixel());

        let baseline = camera_j.camera_center(&pixel_j) - camera_k.camera_center(&pixel_k);
        if baseline.norm() <= CAMERA_CENTER_TOLERANCE {
            continue;
        }

        let stereo = StereoModel::new(camera_j, camera_k);
        let angle = match stereo.convergence_angle(&pixel_j, &pixel_k) {
            Ok(angle) => angle,
            Err(_) => continue,
        };
        if angle <= minimum_angle {
            continue;
        }
        if let Ok((position, error)) = stereo.triangulate(&pixel_j, &pixel_k) {
            position_sum += position;
            error_sum += error;
            count += 1;
        }
    }

    if count == 0 {
        let first = &point[0];
        let camera = cameras[0];
        let pixel = first.pixel();
        let center = camera.camera_center(&pixel);
        let offset = match camera.pixel_to_vector(&pixel) {
            Ok(ray) => ray.into_inner() * FALLBACK_DISTANCE,
            Err(_) => camera.camera_pose(&pixel) * Vector3::new(0.0, 0.0, FALLBACK_DISTANCE),
        };
        point.set_position(center + offset);
        return Ok(TriangulationOutcome::Fallback);
    }

    point.set_position(position_sum / count as f64);
    Ok(TriangulationOutcome::Intersected {
        pairs: count,
        mean_error: error_sum / count as f64,
    })
}

#[derive(Debug)]
pub enum TriangulationError {
    NoMeasures,
    MissingCamera(usize),
}

impl fmt::Display for TriangulationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            TriangulationError::NoMeasures => f.write_str("Point has no measures"),
            TriangulationError::MissingCamera(image_i) => {
                write!(f, "No camera model for image {}", image_i)
            }
        }
    }
}

impl std::error::Error for TriangulationError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        camera::{CameraError, PinholeCamera},
        data::Point2D,
    };
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use nalgebra::{UnitQuaternion, UnitVector3};

    fn camera_at(center: Vector3<f64>) -> PinholeCamera {
        PinholeCamera::from_axis_angle((700.0, 700.0), (320.0, 240.0), center, Vector3::zeros())
    }

    fn observe<C: CameraModel>(
        cameras: &[C],
        images: &[usize],
        point3d: &Vector3<f64>,
    ) -> ControlPoint {
        let mut point = ControlPoint::free();
        for &image_i in images {
            let pixel = cameras[image_i].point_to_pixel(point3d).unwrap();
            point.add_measure(ControlMeasure::new(
                pixel,
                Point2D::new(1.0, 1.0),
                image_i,
                "image",
            ));
        }
        point
    }

    #[test]
    fn two_view_intersection() {
        let cameras = vec![
            camera_at(Vector3::new(-1.0, 0.0, 0.0)),
            camera_at(Vector3::new(1.0, 0.2, 0.0)),
        ];
        let expected = Vector3::new(0.4, -0.3, 8.0);
        let mut point = observe(&cameras, &[0, 1], &expected);

        let outcome = triangulate_control_point(&mut point, &cameras, 0.0).unwrap();
        match outcome {
            TriangulationOutcome::Intersected { pairs, mean_error } => {
                assert_eq!(pairs, 1);
                assert_abs_diff_eq!(mean_error, 0.0, epsilon = 1e-9);
            }
            TriangulationOutcome::Fallback => panic!("Point should be triangulated"),
        }
        assert_relative_eq!(point.position().unwrap(), expected, epsilon = 1e-9);
    }

    #[test]
    fn averages_adjacent_pairs() {
        let cameras = vec![
            camera_at(Vector3::new(-1.0, 0.0, 0.0)),
            camera_at(Vector3::new(0.0, 0.0, 0.0)),
            camera_at(Vector3::new(1.0, 0.0, 0.0)),
        ];
        let expected = Vector3::new(0.1, 0.2, 6.0);
        let mut point = observe(&cameras, &[0, 1, 2], &expected);

        let outcome = triangulate_control_point(&mut point, &cameras, 0.0).unwrap();
        assert!(matches!(
            outcome,
            TriangulationOutcome::Intersected { pairs: 2, .. }
        ));
        assert_relative_eq!(point.position().unwrap(), expected, epsilon = 1e-9);
    }

    #[test]
    fn coincident_centers_fall_back() {
        let cameras = vec![
            camera_at(Vector3::new(2.0, 0.0, 0.0)),
            camera_at(Vector3::new(2.0, 0.0, 5e-7)),
        ];
        let mut point = ControlPoint::free();
        point.add_measure(ControlMeasure::new(
            Point2D::new(320.0, 240.0),
            Point2D::new(1.0, 1.0),
            0,
            "a",
        ));
        point.add_measure(ControlMeasure::new(
            Point2D::new(400.0, 240.0),
            Point2D::new(1.0, 1.0),
            1,
            "b",
        ));

        let outcome = triangulate_control_point(&mut point, &cameras, 0.0).unwrap();
        assert_eq!(outcome, TriangulationOutcome::Fallback);
        assert_relative_eq!(
            point.position().unwrap(),
            Vector3::new(2.0, 0.0, 10.0),
            epsilon = 1e-12
        );
    }

    #[test]
    fn narrow_angle_is_rejected() {
        let cameras = vec![
            camera_at(Vector3::new(0.0, 0.0, 0.0)),
            camera_at(Vector3::new(0.01, 0.0, 0.0)),
        ];
        let target = Vector3::new(0.0, 0.0, 100.0);
        let mut point = observe(&cameras, &[0, 1], &target);
        // Baseline of 0.01 at a distance of 100 converges at about 1e-4 radians.
        let outcome = triangulate_control_point(&mut point, &cameras, 1e-3).unwrap();
        assert_eq!(outcome, TriangulationOutcome::Fallback);
        assert_relative_eq!(
            point.position().unwrap(),
            Vector3::new(0.0, 0.0, 10.0),
            epsilon = 1e-9
        );

        let mut point = observe(&cameras, &[0, 1], &target);
        let outcome = triangulate_control_point(&mut point, &cameras, 1e-5).unwrap();
        assert!(matches!(outcome, TriangulationOutcome::Intersected { .. }));
        assert_relative_eq!(point.position().unwrap(), target, epsilon = 1e-3);
    }

    #[test]
    fn skips_unusable_pair() {
        let cameras = vec![
            camera_at(Vector3::new(0.0, 0.0, 0.0)),
            camera_at(Vector3::new(0.0, 0.0, 0.0)),
            camera_at(Vector3::new(1.0, 0.0, 0.0)),
        ];
        let expected = Vector3::new(0.5, 0.5, 5.0);
        let mut point = observe(&cameras, &[0, 1, 2], &expected);

        let outcome = triangulate_control_point(&mut point, &cameras, 0.0).unwrap();
        assert!(matches!(
            outcome,
            TriangulationOutcome::Intersected { pairs: 1, .. }
        ));
        assert_relative_eq!(point.position().unwrap(), expected, epsilon = 1e-9);
    }

    struct BlindCamera {
        center: Vector3<f64>,
        pose: UnitQuaternion<f64>,
    }

    impl CameraModel for BlindCamera {
        fn camera_center(&self, _pixel: &Point2D<f64>) -> Vector3<f64> {
            self.center
        }

        fn pixel_to_vector(&self, _pixel: &Point2D<f64>) -> Result<UnitVector3<f64>, CameraError> {
            Err(CameraError::PixelToRay("no ray"))
        }

        fn camera_pose(&self, _pixel: &Point2D<f64>) -> UnitQuaternion<f64> {
            self.pose
        }

        fn point_to_pixel(&self, _point: &Vector3<f64>) -> Result<Point2D<f64>, CameraError> {
            Err(CameraError::PointBehindCamera)
        }
    }

    #[test]
    fn fallback_without_ray_uses_pose() {
        let cameras = vec![
            BlindCamera {
                center: Vector3::new(1.0, 2.0, 3.0),
                pose: UnitQuaternion::from_scaled_axis(Vector3::new(
                    std::f64::consts::FRAC_PI_2,
                    0.0,
                    0.0,
                )),
            },
            BlindCamera {
                center: Vector3::new(4.0, 2.0, 3.0),
                pose: UnitQuaternion::identity(),
            },
        ];
        let mut point = ControlPoint::free();
        for image_i in 0..2 {
            point.add_measure(ControlMeasure::new(
                Point2D::new(10.0, 10.0),
                Point2D::new(1.0, 1.0),
                image_i,
                "blind",
            ));
        }

        let outcome = triangulate_control_point(&mut point, &cameras, 0.0).unwrap();
        assert_eq!(outcome, TriangulationOutcome::Fallback);
        // Rotating +z by 90 degrees around x points towards -y.
        assert_relative_eq!(
            point.position().unwrap(),
            Vector3::new(1.0, -8.0, 3.0),
            epsilon = 1e-9
        );
    }

    #[test]
    fn structural_errors() {
        let cameras = vec![camera_at(Vector3::zeros())];
        let mut empty = ControlPoint::free();
        assert!(matches!(
            triangulate_control_point(&mut empty, &cameras, 0.0),
            Err(TriangulationError::NoMeasures)
        ));

        let mut point = ControlPoint::free();
        point.add_measure(ControlMeasure::new(
            Point2D::new(1.0, 1.0),
            Point2D::new(1.0, 1.0),
            3,
            "unknown",
        ));
        assert!(matches!(
            triangulate_control_point(&mut point, &cameras, 0.0),
            Err(TriangulationError::MissingCamera(3))
        ));
        assert!(point.position().is_none());
    }
}
