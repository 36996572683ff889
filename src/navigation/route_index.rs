//! Nearest-point lookup against the planned route geometry.
//!
//! Short routes are scanned point by point. Longer ones are loaded into an
//! R-tree over an equirectangular projection centred on the route, and the
//! candidate it returns is measured with haversine.

use rstar::{PointDistance, RTree, RTreeObject, AABB};

use crate::geo_utils::{haversine_distance, EARTH_RADIUS_M};
use crate::Coordinate;

/// Route point projected to local meters, with its index in the route.
#[derive(Debug, Clone, Copy)]
struct ProjectedPoint {
    idx: usize,
    x: f64,
    y: f64,
}

impl RTreeObject for ProjectedPoint {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.x, self.y])
    }
}

impl PointDistance for ProjectedPoint {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.x - point[0];
        let dy = self.y - point[1];
        dx * dx + dy * dy
    }
}

pub(crate) struct RouteIndex {
    points: Vec<Coordinate>,
    tree: Option<RTree<ProjectedPoint>>,
    cos_ref_lat: f64,
}

impl RouteIndex {
    /// Index `points`, building an R-tree only above `brute_force_limit`.
    pub(crate) fn new(points: Vec<Coordinate>, brute_force_limit: usize) -> Self {
        let cos_ref_lat = if points.is_empty() {
            1.0
        } else {
            let mean_lat = points.iter().map(|p| p.lat).sum::<f64>() / points.len() as f64;
            mean_lat.to_radians().cos()
        };

        let mut index = Self {
            points,
            tree: None,
            cos_ref_lat,
        };

        if index.points.len() > brute_force_limit {
            let projected: Vec<ProjectedPoint> = index
                .points
                .iter()
                .enumerate()
                .map(|(idx, p)| {
                    let [x, y] = index.project(*p);
                    ProjectedPoint { idx, x, y }
                })
                .collect();
            index.tree = Some(RTree::bulk_load(projected));
        }

        index
    }

    pub(crate) fn empty() -> Self {
        Self::new(Vec::new(), 0)
    }

    fn project(&self, p: Coordinate) -> [f64; 2] {
        [
            p.lng.to_radians() * self.cos_ref_lat * EARTH_RADIUS_M,
            p.lat.to_radians() * EARTH_RADIUS_M,
        ]
    }

    #[cfg(test)]
    fn is_indexed(&self) -> bool {
        self.tree.is_some()
    }

    /// Distance in meters to the closest route point, `None` for an empty route.
    pub(crate) fn nearest_distance(&self, location: Coordinate) -> Option<f64> {
        match &self.tree {
            Some(tree) => tree
                .nearest_neighbor(&self.project(location))
                .map(|nearest| haversine_distance(location, self.points[nearest.idx])),
            None => self
                .points
                .iter()
                .map(|p| haversine_distance(location, *p))
                .reduce(f64::min),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Gently curving ~3km route around Zurich.
    fn curved_route(n: usize) -> Vec<Coordinate> {
        (0..n)
            .map(|i| {
                let t = i as f64 / n as f64;
                Coordinate::new(47.37 + t * 0.02, 8.54 + (t * 6.0).sin() * 0.01)
            })
            .collect()
    }

    #[test]
    fn test_empty_route() {
        assert_eq!(RouteIndex::empty().nearest_distance(Coordinate::new(0.0, 0.0)), None);
    }

    #[test]
    fn test_brute_force_below_limit() {
        let index = RouteIndex::new(curved_route(50), 64);
        assert!(!index.is_indexed());
        let d = index.nearest_distance(curved_route(50)[10]).unwrap();
        assert_eq!(d, 0.0);
    }

    #[test]
    fn test_tree_agrees_with_brute_force() {
        let route = curved_route(500);
        let indexed = RouteIndex::new(route.clone(), 64);
        let scanned = RouteIndex::new(route, usize::MAX);
        assert!(indexed.is_indexed());
        assert!(!scanned.is_indexed());

        let probes = [
            Coordinate::new(47.375, 8.545),
            Coordinate::new(47.38, 8.56),
            Coordinate::new(47.36, 8.53),
            Coordinate::new(47.40, 8.60),
        ];
        for probe in probes {
            let a = indexed.nearest_distance(probe).unwrap();
            let b = scanned.nearest_distance(probe).unwrap();
            assert!((a - b).abs() <= (b * 0.01).max(1.0), "{} vs {}", a, b);
        }
    }
}
