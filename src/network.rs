use std::{ops::Index, slice};

use nalgebra::Vector3;

use crate::data::Point2D;

#[derive(Debug, Clone, PartialEq)]
pub struct ControlMeasure {
    pixel: Point2D<f64>,
    sigma: Point2D<f64>,
    image_i: usize,
    serial: String,
}

impl ControlMeasure {
    pub fn new(
        pixel: Point2D<f64>,
        sigma: Point2D<f64>,
        image_i: usize,
        serial: &str,
    ) -> ControlMeasure {
        ControlMeasure {
            pixel,
            sigma,
            image_i,
            serial: serial.to_string(),
        }
    }

    #[inline]
    pub fn pixel(&self) -> Point2D<f64> {
        self.pixel
    }

    #[inline]
    pub fn sigma(&self) -> Point2D<f64> {
        self.sigma
    }

    #[inline]
    pub fn image_i(&self) -> usize {
        self.image_i
    }

    /// Name of the image this measure was taken in.
    #[inline]
    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub(crate) fn reindex(mut self, image_i: usize) -> ControlMeasure {
        self.image_i = image_i;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointKind {
    /// Position is estimated from image observations.
    Free,
    /// Position is known from survey data.
    GroundControl,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ControlPoint {
    id: String,
    kind: PointKind,
    position: Option<Vector3<f64>>,
    sigma: Option<Vector3<f64>>,
    measures: Vec<ControlMeasure>,
}

impl ControlPoint {
    pub fn free() -> ControlPoint {
        ControlPoint {
            id: String::new(),
            kind: PointKind::Free,
            position: None,
            sigma: None,
            measures: vec![],
        }
    }

    pub fn ground_control(id: &str, position: Vector3<f64>, sigma: Vector3<f64>) -> ControlPoint {
        ControlPoint {
            id: id.to_string(),
            kind: PointKind::GroundControl,
            position: Some(position),
            sigma: Some(sigma),
            measures: vec![],
        }
    }

    /// Turns an imported point into ground control, keeping its position, sigma and measures.
    pub fn into_ground_control(self) -> ControlPoint {
        ControlPoint {
            kind: PointKind::GroundControl,
            ..self
        }
    }

    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn with_id(self, id: &str) -> ControlPoint {
        ControlPoint {
            id: id.to_string(),
            ..self
        }
    }

    #[inline]
    pub fn kind(&self) -> PointKind {
        self.kind
    }

    #[inline]
    pub fn position(&self) -> Option<Vector3<f64>> {
        self.position
    }

    #[inline]
    pub fn set_position(&mut self, position: Vector3<f64>) {
        self.position = Some(position);
    }

    #[inline]
    pub fn sigma(&self) -> Option<Vector3<f64>> {
        self.sigma
    }

    #[inline]
    pub fn set_sigma(&mut self, sigma: Vector3<f64>) {
        self.sigma = Some(sigma);
    }

    pub fn add_measure(&mut self, measure: ControlMeasure) {
        self.measures.push(measure);
    }

    pub(crate) fn take_measures(&mut self) -> Vec<ControlMeasure> {
        std::mem::take(&mut self.measures)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.measures.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.measures.is_empty()
    }

    pub fn iter(&self) -> slice::Iter<'_, ControlMeasure> {
        self.measures.iter()
    }
}

impl Index<usize> for ControlPoint {
    type Output = ControlMeasure;

    fn index(&self, index: usize) -> &ControlMeasure {
        &self.measures[index]
    }
}

impl<'a> IntoIterator for &'a ControlPoint {
    type Item = &'a ControlMeasure;
    type IntoIter = slice::Iter<'a, ControlMeasure>;

    fn into_iter(self) -> Self::IntoIter {
        self.measures.iter()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControlNetwork {
    points: Vec<ControlPoint>,
}

impl ControlNetwork {
    pub fn new() -> ControlNetwork {
        ControlNetwork::default()
    }

    pub fn add_control_point(&mut self, point: ControlPoint) {
        self.points.push(point);
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> slice::Iter<'_, ControlPoint> {
        self.points.iter()
    }

    pub(crate) fn points_mut(&mut self) -> &mut [ControlPoint] {
        &mut self.points
    }

    pub fn count_kind(&self, kind: PointKind) -> usize {
        self.points.iter().filter(|point| point.kind == kind).count()
    }

    pub fn measures_len(&self) -> usize {
        self.points.iter().map(|point| point.len()).sum()
    }
}

impl Index<usize> for ControlNetwork {
    type Output = ControlPoint;

    fn index(&self, index: usize) -> &ControlPoint {
        &self.points[index]
    }
}

impl IntoIterator for ControlNetwork {
    type Item = ControlPoint;
    type IntoIter = std::vec::IntoIter<ControlPoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.into_iter()
    }
}

impl<'a> IntoIterator for &'a ControlNetwork {
    type Item = &'a ControlPoint;
    type IntoIter = slice::Iter<'a, ControlPoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}
