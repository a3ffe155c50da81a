//! Nearest-neighbour queries backed by an R*-tree.

use nalgebra::Point3;
use rstar::{PointDistance, RTree, RTreeObject, AABB};

// Wrapper for RTree
#[derive(Debug, Clone, Copy)]
struct IndexedPoint(usize, Point3<f64>);

impl RTreeObject for IndexedPoint {
    type Envelope = AABB<[f64; 3]>;
    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.1.x, self.1.y, self.1.z])
    }
}

impl PointDistance for IndexedPoint {
    fn distance_2(&self, point: &[f64; 3]) -> f64 {
        let dx = self.1.x - point[0];
        let dy = self.1.y - point[1];
        let dz = self.1.z - point[2];
        dx * dx + dy * dy + dz * dz
    }
}

/// A neighbour hit: index into the indexed slice and squared distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub index: usize,
    pub distance_squared: f64,
}

impl Neighbor {
    pub fn distance(&self) -> f64 {
        self.distance_squared.sqrt()
    }
}

/// Immutable spatial index over a set of points.
///
/// Queries take `&self`, so one index can be shared across rayon workers.
pub struct NeighborIndex {
    tree: RTree<IndexedPoint>,
}

impl NeighborIndex {
    pub fn new(points: &[Point3<f64>]) -> Self {
        let wrappers: Vec<IndexedPoint> = points
            .iter()
            .enumerate()
            .map(|(i, p)| IndexedPoint(i, *p))
            .collect();
        Self {
            tree: RTree::bulk_load(wrappers),
        }
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    pub fn nearest(&self, query: &Point3<f64>) -> Option<Neighbor> {
        let q = [query.x, query.y, query.z];
        self.tree.nearest_neighbor(&q).map(|hit| Neighbor {
            index: hit.0,
            distance_squared: hit.distance_2(&q),
        })
    }

    /// Nearest point no farther than `radius`.
    pub fn nearest_within(&self, query: &Point3<f64>, radius: f64) -> Option<Neighbor> {
        self.nearest(query)
            .filter(|n| n.distance_squared <= radius * radius)
    }

    /// The `k` nearest points, closest first. Includes an exact match of `query`.
    pub fn k_nearest(&self, query: &Point3<f64>, k: usize) -> Vec<Neighbor> {
        let q = [query.x, query.y, query.z];
        self.tree
            .nearest_neighbor_iter_with_distance_2(&q)
            .take(k)
            .map(|(hit, d2)| Neighbor {
                index: hit.0,
                distance_squared: d2,
            })
            .collect()
    }

    /// Every point within `radius` of `query`, in no particular order.
    pub fn within_radius(&self, query: &Point3<f64>, radius: f64) -> Vec<Neighbor> {
        let q = [query.x, query.y, query.z];
        self.tree
            .locate_within_distance(q, radius * radius)
            .map(|hit| Neighbor {
                index: hit.0,
                distance_squared: hit.distance_2(&q),
            })
            .collect()
    }

    /// Whether any indexed point lies within `radius` of `query`.
    pub fn any_within(&self, query: &Point3<f64>, radius: f64) -> bool {
        self.nearest_within(query, radius).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_nearest_within_radius() {
        let index = NeighborIndex::new(&[
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 2.0, 0.0),
        ]);
        let hit = index.nearest(&Point3::new(0.9, 0.1, 0.0)).unwrap();
        assert_eq!(hit.index, 1);

        assert!(index
            .nearest_within(&Point3::new(0.0, 1.2, 0.0), 0.5)
            .is_none());
        let hit = index
            .nearest_within(&Point3::new(0.0, 1.7, 0.0), 0.5)
            .unwrap();
        assert_eq!(hit.index, 2);
        assert_relative_eq!(hit.distance(), 0.3, epsilon = 1e-12);
    }

    #[test]
    fn test_k_nearest_is_sorted() {
        let points: Vec<_> = (0..10).map(|i| Point3::new(i as f64, 0.0, 0.0)).collect();
        let index = NeighborIndex::new(&points);
        let hits = index.k_nearest(&Point3::new(4.2, 0.0, 0.0), 3);
        let indices: Vec<usize> = hits.iter().map(|h| h.index).collect();
        assert_eq!(indices, vec![4, 5, 3]);
    }

    #[test]
    fn test_within_radius_finds_all() {
        let points: Vec<_> = (0..10).map(|i| Point3::new(i as f64 * 0.1, 0.0, 0.0)).collect();
        let index = NeighborIndex::new(&points);
        let mut hits: Vec<usize> = index
            .within_radius(&Point3::new(0.42, 0.0, 0.0), 0.15)
            .iter()
            .map(|h| h.index)
            .collect();
        hits.sort_unstable();
        assert_eq!(hits, vec![3, 4, 5]);
    }

    #[test]
    fn test_empty_index() {
        let index = NeighborIndex::new(&[]);
        assert!(index.is_empty());
        assert!(index.nearest(&Point3::origin()).is_none());
    }
}
