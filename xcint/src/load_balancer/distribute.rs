use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Assign work items to `nranks` ranks, largest cost first, each to the rank
/// with the smallest accumulated cost (lowest rank on ties).
///
/// The result is deterministic, so every rank computes the same assignment.
pub(crate) fn assign_ranks(costs: &[usize], nranks: usize) -> Vec<usize> {
    let nranks = nranks.max(1);
    let mut order: Vec<usize> = (0..costs.len()).collect();
    order.sort_by_key(|&i| Reverse(costs[i]));

    let mut heap: BinaryHeap<Reverse<(usize, usize)>> = (0..nranks).map(|r| Reverse((0, r))).collect();
    let mut owner = vec![0; costs.len()];
    for i in order {
        if let Some(Reverse((load, rank))) = heap.pop() {
            owner[i] = rank;
            heap.push(Reverse((load + costs[i], rank)));
        }
    }
    owner
}
