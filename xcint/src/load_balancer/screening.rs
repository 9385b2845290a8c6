extern crate nalgebra as na;

use super::partition::BoundingBox;
use crate::task::BasisScreening;
use basis::BasisSet;
use na::Vector3;

/// Shells whose cutoff sphere contains at least one of `points`.
///
/// A sphere around the batch settles most shells without visiting the
/// individual points.
pub(crate) fn screen_batch(points: &[Vector3<f64>], basis: &BasisSet) -> BasisScreening {
    if points.is_empty() {
        return BasisScreening::new(Vec::new(), basis);
    }

    let center = BoundingBox::of(points).center();
    let radius = points
        .iter()
        .map(|p| (p - center).norm())
        .fold(0.0_f64, f64::max);

    let shell_list = basis
        .iter()
        .enumerate()
        .filter(|(_, shell)| {
            let rc = shell.cutoff_radius();
            let dist = (shell.center - center).norm();
            if dist - radius > rc {
                false
            } else if dist + radius <= rc {
                true
            } else {
                let rc2 = rc * rc;
                points.iter().any(|p| (p - shell.center).norm_squared() <= rc2)
            }
        })
        .map(|(ish, _)| ish)
        .collect();

    BasisScreening::new(shell_list, basis)
}
