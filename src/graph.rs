use std::{
    collections::{BTreeSet, HashMap},
    fmt,
};

use crate::{
    data::Point2D,
    matchfile::InterestPoint,
    network::{ControlMeasure, ControlNetwork, ControlPoint},
};

pub type FeatureHandle = usize;

/// Key for exact floating-point location equality; `-0.0` and `0.0` map to the same key.
///
/// NaN never equals itself, so locations with a NaN coordinate have no key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct LocationKey(u64, u64);

impl LocationKey {
    fn new(location: &Point2D<f64>) -> Option<LocationKey> {
        if location.x.is_nan() || location.y.is_nan() {
            return None;
        }
        let canonical = |value: f64| if value == 0.0 { 0.0f64 } else { value };
        Some(LocationKey(
            canonical(location.x).to_bits(),
            canonical(location.y).to_bits(),
        ))
    }
}

#[derive(Debug, Clone)]
pub struct FeatureNode {
    location: Point2D<f64>,
    scale: f64,
    image_i: usize,
    connections: BTreeSet<FeatureHandle>,
}

impl FeatureNode {
    #[inline]
    pub fn location(&self) -> Point2D<f64> {
        self.location
    }

    #[inline]
    pub fn scale(&self) -> f64 {
        self.scale
    }

    #[inline]
    pub fn image_i(&self) -> usize {
        self.image_i
    }

    pub fn connections(&self) -> impl Iterator<Item = FeatureHandle> + '_ {
        self.connections.iter().copied()
    }
}

/// Features observed in one image.
#[derive(Debug, Clone)]
pub struct CameraTrackTable {
    image_i: usize,
    name: String,
    features: Vec<FeatureHandle>,
    index: HashMap<LocationKey, FeatureHandle>,
}

impl CameraTrackTable {
    fn new(image_i: usize, name: &str) -> CameraTrackTable {
        CameraTrackTable {
            image_i,
            name: name.to_string(),
            features: vec![],
            index: HashMap::new(),
        }
    }

    #[inline]
    pub fn image_i(&self) -> usize {
        self.image_i
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn find(&self, location: &Point2D<f64>) -> Option<FeatureHandle> {
        let key = LocationKey::new(location)?;
        self.index.get(&key).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = FeatureHandle> + '_ {
        self.features.iter().copied()
    }
}

/// Links features of all images into tracks.
///
/// Nodes are stored in an arena, tables and connections only hold handles into it.
#[derive(Debug, Clone, Default)]
pub struct CorrespondenceGraph {
    tables: Vec<CameraTrackTable>,
    nodes: Vec<FeatureNode>,
}

impl CorrespondenceGraph {
    pub fn new() -> CorrespondenceGraph {
        CorrespondenceGraph::default()
    }

    /// Registers the next image and returns its id; ids follow registration order.
    pub fn add_node(&mut self, name: &str) -> usize {
        let image_i = self.tables.len();
        self.tables.push(CameraTrackTable::new(image_i, name));
        image_i
    }

    #[inline]
    pub fn images_len(&self) -> usize {
        self.tables.len()
    }

    #[inline]
    pub fn features_len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn table(&self, image_i: usize) -> Option<&CameraTrackTable> {
        self.tables.get(image_i)
    }

    #[inline]
    pub fn feature(&self, handle: FeatureHandle) -> Option<&FeatureNode> {
        self.nodes.get(handle)
    }

    pub fn find_feature(&self, image_i: usize, location: &Point2D<f64>) -> Option<&FeatureNode> {
        let handle = self.tables.get(image_i)?.find(location)?;
        self.nodes.get(handle)
    }

    fn find_or_insert(&mut self, image_i: usize, ip: &InterestPoint) -> FeatureHandle {
        let location = ip.location();
        let key = LocationKey::new(&location);
        let table = &mut self.tables[image_i];
        if let Some(handle) = key.and_then(|key| table.index.get(&key)) {
            return *handle;
        }
        let handle = self.nodes.len();
        self.nodes.push(FeatureNode {
            location,
            scale: ip.scale as f64,
            image_i,
            connections: BTreeSet::new(),
        });
        table.features.push(handle);
        if let Some(key) = key {
            table.index.insert(key, handle);
        }
        handle
    }

    /// Adds an unconnected feature, reusing an existing feature at the same location.
    pub fn add_feature(
        &mut self,
        image_i: usize,
        ip: &InterestPoint,
    ) -> Result<FeatureHandle, GraphError> {
        if image_i >= self.tables.len() {
            return Err(GraphError::UnknownImage(image_i));
        }
        Ok(self.find_or_insert(image_i, ip))
    }

    fn connect(&mut self, a: FeatureHandle, b: FeatureHandle) {
        self.nodes[a].connections.insert(b);
        self.nodes[b].connections.insert(a);
    }

    /// Adds matches between two images; `matches_a[i]` corresponds to `matches_b[i]`.
    ///
    /// Returns the number of ingested pairs.
    pub fn ingest_pair(
        &mut self,
        image_a: usize,
        image_b: usize,
        matches_a: &[InterestPoint],
        matches_b: &[InterestPoint],
    ) -> Result<usize, GraphError> {
        if image_a >= self.tables.len() || image_b >= self.tables.len() {
            return Err(GraphError::UnknownImage(image_a.max(image_b)));
        }
        if image_a == image_b {
            return Err(GraphError::Internal("Cannot match an image with itself"));
        }
        if matches_a.len() != matches_b.len() {
            return Err(GraphError::Internal(
                "Matched point lists have different lengths",
            ));
        }

        for (ip_a, ip_b) in matches_a.iter().zip(matches_b.iter()) {
            let feature_a = self.find_or_insert(image_a, ip_a);
            let feature_b = self.find_or_insert(image_b, ip_b);
            self.connect(feature_a, feature_b);
        }
        Ok(matches_a.len())
    }

    fn collect_track(&self, start: FeatureHandle, visited: &mut [bool]) -> Vec<FeatureHandle> {
        let mut track = vec![];
        let mut stack = vec![start];
        visited[start] = true;
        while let Some(handle) = stack.pop() {
            track.push(handle);
            for connected in self.nodes[handle].connections() {
                if !visited[connected] {
                    visited[connected] = true;
                    stack.push(connected);
                }
            }
        }
        track
    }

    fn track_to_point(&self, track: &[FeatureHandle]) -> Option<ControlPoint> {
        // One measure per image, represented by its earliest inserted feature.
        let mut per_image = vec![None; self.tables.len()];
        for &handle in track {
            let image_i = self.nodes[handle].image_i;
            if per_image[image_i].is_none_or(|existing| handle < existing) {
                per_image[image_i] = Some(handle);
            }
        }
        let measures = per_image
            .iter()
            .flatten()
            .map(|&handle| {
                let node = &self.nodes[handle];
                ControlMeasure::new(
                    node.location,
                    Point2D::new(node.scale, node.scale),
                    node.image_i,
                    self.tables[node.image_i].name.as_str(),
                )
            })
            .collect::<Vec<_>>();

        if measures.len() < 2 {
            return None;
        }
        let mut point = ControlPoint::free();
        measures
            .into_iter()
            .for_each(|measure| point.add_measure(measure));
        Some(point)
    }

    /// Converts every track seen by at least two images into a control point.
    ///
    /// Tracks are discovered in image registration order, then feature insertion order.
    pub fn materialize(&self) -> Result<ControlNetwork, GraphError> {
        if self.tables.is_empty() {
            return Err(GraphError::Internal("No images were registered"));
        }
        if self.nodes.is_empty() {
            return Err(GraphError::Internal("No features were loaded"));
        }

        let mut network = ControlNetwork::new();
        let mut visited = vec![false; self.nodes.len()];
        for table in &self.tables {
            for handle in table.iter() {
                if visited[handle] {
                    continue;
                }
                let track = self.collect_track(handle, &mut visited);
                if let Some(point) = self.track_to_point(&track) {
                    network.add_control_point(point);
                }
            }
        }
        Ok(network)
    }
}

#[derive(Debug)]
pub enum GraphError {
    Internal(&'static str),
    UnknownImage(usize),
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            GraphError::Internal(msg) => f.write_str(msg),
            GraphError::UnknownImage(image_i) => write!(f, "Image {} is not registered", image_i),
        }
    }
}

impl std::error::Error for GraphError {}

impl From<&'static str> for GraphError {
    fn from(msg: &'static str) -> GraphError {
        GraphError::Internal(msg)
    }
}
