//! Geometric helpers for 3D collision checks on a pallet.
//!
//! All functions work on the effective (possibly rotated) footprint of a
//! placed case.

use crate::pallet::PlacedCase;

/// Checks whether two placed cases overlap in space.
///
/// Axis-aligned bounding boxes do NOT overlap when they are separated along
/// at least one axis; touching faces do not count as overlap.
pub fn intersects(a: &PlacedCase, b: &PlacedCase) -> bool {
    let (ax, ay, az) = a.position;
    let (aw, ad, ah) = a.dims;
    let (bx, by, bz) = b.position;
    let (bw, bd, bh) = b.dims;

    !(ax + aw <= bx
        || bx + bw <= ax
        || ay + ad <= by
        || by + bd <= ay
        || az + ah <= bz
        || bz + bh <= az)
}

/// Length of the overlap of `[a1, a2]` and `[b1, b2]`, at least 0.0.
///
/// # Example
/// ```
/// use case_picking::geometry::overlap_1d;
///
/// assert_eq!(overlap_1d(0.0, 5.0, 3.0, 8.0), 2.0);
/// ```
pub fn overlap_1d(a1: f64, a2: f64, b1: f64, b2: f64) -> f64 {
    (a2.min(b2) - a1.max(b1)).max(0.0)
}

/// Overlap area of two placed cases projected on the XY plane.
pub fn overlap_area_xy(a: &PlacedCase, b: &PlacedCase) -> f64 {
    let overlap_x = overlap_1d(
        a.position.0,
        a.position.0 + a.dims.0,
        b.position.0,
        b.position.0 + b.dims.0,
    );
    let overlap_y = overlap_1d(
        a.position.1,
        a.position.1 + a.dims.1,
        b.position.1,
        b.position.1 + b.dims.1,
    );
    overlap_x * overlap_y
}

/// Checks whether a point lies inside (or on the boundary of) a placed case.
pub fn point_inside(point: (f64, f64, f64), placed: &PlacedCase) -> bool {
    let (px, py, pz) = point;
    let (bx, by, bz) = placed.position;
    let (bw, bd, bh) = placed.dims;

    px >= bx && px <= bx + bw && py >= by && py <= by + bd && pz >= bz && pz <= bz + bh
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Case;

    fn placed(position: (f64, f64, f64), dims: (f64, f64, f64)) -> PlacedCase {
        PlacedCase {
            case: Case::new(1, dims, 1.0, 1.0).unwrap(),
            order_line: 1,
            position,
            dims,
            layer: 0,
        }
    }

    #[test]
    fn touching_cases_do_not_intersect() {
        let a = placed((0.0, 0.0, 0.0), (10.0, 10.0, 10.0));
        let b = placed((10.0, 0.0, 0.0), (10.0, 10.0, 10.0));
        assert!(!intersects(&a, &b));

        let c = placed((5.0, 5.0, 5.0), (10.0, 10.0, 10.0));
        assert!(intersects(&a, &c));
    }

    #[test]
    fn xy_overlap_ignores_height() {
        let a = placed((0.0, 0.0, 0.0), (10.0, 10.0, 10.0));
        let b = placed((5.0, 5.0, 10.0), (10.0, 10.0, 10.0));
        assert!((overlap_area_xy(&a, &b) - 25.0).abs() < 1e-9);
    }

    #[test]
    fn point_on_top_face_is_inside() {
        let a = placed((0.0, 0.0, 0.0), (10.0, 10.0, 10.0));
        assert!(point_inside((5.0, 5.0, 10.0), &a));
        assert!(!point_inside((15.0, 5.0, 10.0), &a));
    }
}
