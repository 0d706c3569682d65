//! Even-odd point-in-polygon test used by the zone state machine.

/// A planar point in image coordinates.
pub type Point = (f64, f64);

/// An ordered, non-self-intersecting polygon of at least three vertices.
/// Winding order is irrelevant to the containment test.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    vertices: Vec<Point>,
}

impl Polygon {
    pub fn new(vertices: Vec<Point>) -> anyhow::Result<Self> {
        if vertices.len() < 3 {
            anyhow::bail!("zone polygon needs at least 3 vertices, got {}", vertices.len());
        }
        Ok(Self { vertices })
    }

    pub fn vertices(&self) -> &[Point] {
        &self.vertices
    }

    /// Ray-casting even-odd test. A point exactly on an edge (including a
    /// vertex) is always outside, matching shapely's strict-interior
    /// `contains` the original `worker.py` relies on: the boundary check
    /// below runs before the crossing count, so the ray-cast's own
    /// edge-case behavior never has a chance to disagree with it.
    pub fn contains(&self, point: Point) -> bool {
        let n = self.vertices.len();
        if (0..n).any(|i| on_segment(point, self.vertices[i], self.vertices[(i + 1) % n])) {
            return false;
        }

        let (x, y) = point;
        let mut inside = false;

        let mut p1 = self.vertices[n - 1];
        for &p2 in &self.vertices {
            if (p2.1 > y) != (p1.1 > y) {
                let slope = (p2.0 - p1.0) / (p2.1 - p1.1);
                let x_at_y = slope * (y - p1.1) + p1.0;
                if x < x_at_y {
                    inside = !inside;
                }
            }
            p1 = p2;
        }

        inside
    }
}

const BOUNDARY_EPS: f64 = 1e-9;

/// True if `p` lies on the closed segment `[a, b]`: collinear (zero cross
/// product, within tolerance) and within the segment's bounding box.
fn on_segment(p: Point, a: Point, b: Point) -> bool {
    let cross = (b.0 - a.0) * (p.1 - a.1) - (b.1 - a.1) * (p.0 - a.0);
    if cross.abs() > BOUNDARY_EPS {
        return false;
    }
    let within_x = p.0 >= a.0.min(b.0) - BOUNDARY_EPS && p.0 <= a.0.max(b.0) + BOUNDARY_EPS;
    let within_y = p.1 >= a.1.min(b.1) - BOUNDARY_EPS && p.1 <= a.1.max(b.1) + BOUNDARY_EPS;
    within_x && within_y
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect() -> Polygon {
        Polygon::new(vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)]).unwrap()
    }

    #[test]
    fn point_well_inside_is_contained() {
        assert!(rect().contains((5.0, 5.0)));
    }

    #[test]
    fn point_well_outside_is_not_contained() {
        assert!(!rect().contains((20.0, 20.0)));
    }

    #[test]
    fn point_on_vertical_edge_is_outside() {
        // scenario 6: polygon vertex on point — (10, 5) lies on the right edge.
        assert!(!rect().contains((10.0, 5.0)));
    }

    #[test]
    fn point_on_horizontal_edge_is_outside() {
        assert!(!rect().contains((5.0, 0.0)));
    }

    #[test]
    fn point_on_vertex_is_outside() {
        assert!(!rect().contains((10.0, 10.0)));
    }

    #[test]
    fn containment_is_stable_across_repeated_calls() {
        let z = rect();
        let first = z.contains((10.0, 5.0));
        for _ in 0..50 {
            assert_eq!(z.contains((10.0, 5.0)), first);
        }
    }

    #[test]
    fn rejects_degenerate_polygon() {
        assert!(Polygon::new(vec![(0.0, 0.0), (1.0, 1.0)]).is_err());
    }
}
