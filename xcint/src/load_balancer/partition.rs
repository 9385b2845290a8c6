extern crate nalgebra as na;

use na::Vector3;

/// Axis-aligned box around a set of points.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BoundingBox {
    pub lo: Vector3<f64>,
    pub hi: Vector3<f64>,
}

impl BoundingBox {
    pub fn of(points: &[Vector3<f64>]) -> Self {
        let mut lo = Vector3::repeat(f64::INFINITY);
        let mut hi = Vector3::repeat(f64::NEG_INFINITY);
        for p in points {
            lo = lo.inf(p);
            hi = hi.sup(p);
        }
        Self { lo, hi }
    }

    pub fn center(&self) -> Vector3<f64> {
        0.5 * (self.lo + self.hi)
    }

    pub fn longest_axis(&self) -> usize {
        (self.hi - self.lo).imax()
    }
}

/// Split one atom's points into spatially compact batches of at most
/// `batch_size` points by recursive bisection along the longest extent.
pub(crate) fn bisect_batches(
    points: Vec<Vector3<f64>>,
    weights: Vec<f64>,
    batch_size: usize,
) -> Vec<(Vec<Vector3<f64>>, Vec<f64>)> {
    let mut items: Vec<(Vector3<f64>, f64)> = points.into_iter().zip(weights).collect();
    let mut batches = Vec::new();
    split(&mut items, batch_size.max(1), &mut batches);
    batches
}

fn split(
    items: &mut [(Vector3<f64>, f64)],
    batch_size: usize,
    out: &mut Vec<(Vec<Vector3<f64>>, Vec<f64>)>,
) {
    if items.is_empty() {
        return;
    }
    if items.len() <= batch_size {
        out.push(items.iter().cloned().unzip());
        return;
    }

    let pts: Vec<Vector3<f64>> = items.iter().map(|(p, _)| *p).collect();
    let axis = BoundingBox::of(&pts).longest_axis();
    let mid = items.len() / 2;
    items.select_nth_unstable_by(mid, |a, b| a.0[axis].total_cmp(&b.0[axis]));

    let (left, right) = items.split_at_mut(mid);
    split(left, batch_size, out);
    split(right, batch_size, out);
}
