use crate::transform::Transform;
use nalgebra::{Point3, Vector3};
use rayon::prelude::*;

/// Structure-of-arrays point set.
///
/// `colors` and `normals`, when present, hold exactly one entry per point.
/// Colors are RGB in `[0, 1]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud {
    pub points: Vec<Point3<f64>>,
    pub colors: Option<Vec<Point3<f64>>>,
    pub normals: Option<Vec<Vector3<f64>>>,
}

impl PointCloud {
    pub fn new(points: Vec<Point3<f64>>) -> Self {
        Self {
            points,
            colors: None,
            normals: None,
        }
    }

    pub fn with_colors(mut self, colors: Vec<Point3<f64>>) -> crate::Result<Self> {
        if colors.len() == self.points.len() {
            self.colors = Some(colors);
            Ok(self)
        } else {
            Err(crate::Error::InvalidInput(format!(
                "Color count {} does not match point count {}",
                colors.len(),
                self.points.len()
            )))
        }
    }

    pub fn with_normals(mut self, normals: Vec<Vector3<f64>>) -> crate::Result<Self> {
        if normals.len() == self.points.len() {
            self.normals = Some(normals);
            Ok(self)
        } else {
            Err(crate::Error::InvalidInput(format!(
                "Normal count {} does not match point count {}",
                normals.len(),
                self.points.len()
            )))
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Apply a rigid transform to every point. Normals are rotated, colors carried.
    pub fn transformed(&self, transform: &Transform) -> PointCloud {
        PointCloud {
            points: self
                .points
                .par_iter()
                .map(|p| transform.transform_point(p))
                .collect(),
            colors: self.colors.clone(),
            normals: self
                .normals
                .as_ref()
                .map(|n| n.par_iter().map(|v| transform.transform_vector(v)).collect()),
        }
    }

    /// Append another cloud.
    ///
    /// An attribute survives only if both clouds carry it; otherwise it is
    /// dropped from the result so the per-point arrays stay aligned.
    pub fn append(&mut self, other: &PointCloud) {
        let was_empty = self.is_empty();
        self.points.extend_from_slice(&other.points);

        self.colors = match (self.colors.take(), other.colors.as_ref()) {
            (Some(mut mine), Some(theirs)) => {
                mine.extend_from_slice(theirs);
                Some(mine)
            }
            (None, Some(theirs)) if was_empty => Some(theirs.clone()),
            _ => None,
        };

        self.normals = match (self.normals.take(), other.normals.as_ref()) {
            (Some(mut mine), Some(theirs)) => {
                mine.extend_from_slice(theirs);
                Some(mine)
            }
            (None, Some(theirs)) if was_empty => Some(theirs.clone()),
            _ => None,
        };
    }

    /// Axis-aligned bounding box as `(min, max)`, `None` for an empty cloud.
    pub fn bounds(&self) -> Option<(Point3<f64>, Point3<f64>)> {
        let first = *self.points.first()?;
        let (min, max) = self.points.iter().fold((first, first), |(lo, hi), p| {
            (
                Point3::new(lo.x.min(p.x), lo.y.min(p.y), lo.z.min(p.z)),
                Point3::new(hi.x.max(p.x), hi.y.max(p.y), hi.z.max(p.z)),
            )
        });
        Some((min, max))
    }

    pub fn centroid(&self) -> Option<Point3<f64>> {
        if self.is_empty() {
            return None;
        }
        let sum = self
            .points
            .iter()
            .fold(Vector3::zeros(), |acc, p| acc + p.coords);
        Some(Point3::from(sum / self.len() as f64))
    }

    /// Keep the points whose index satisfies `keep`, with their attributes.
    pub fn select<F: Fn(usize) -> bool>(&self, keep: F) -> PointCloud {
        let indices: Vec<usize> = (0..self.len()).filter(|&i| keep(i)).collect();
        PointCloud {
            points: indices.iter().map(|&i| self.points[i]).collect(),
            colors: self
                .colors
                .as_ref()
                .map(|c| indices.iter().map(|&i| c[i]).collect()),
            normals: self
                .normals
                .as_ref()
                .map(|n| indices.iter().map(|&i| n[i]).collect()),
        }
    }
}
