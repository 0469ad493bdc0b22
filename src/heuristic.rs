//! Savings-based pallet-merge heuristic.
//!
//! Every invocation starts from one pallet per order line and walks the
//! routing edges in biased-randomised order of decreasing saving. Whenever
//! the two endpoints of an edge sit on different pallets and the packing
//! oracle accepts the combined load, the two pallets are merged.
//!
//! All mutable state of an invocation lives in a `PalletArena` owned by that
//! invocation: pallet slots plus the binding of each order line to the slot
//! hosting it. Nothing is shared between invocations.

use std::collections::HashMap;

use rand::Rng;
use tracing::{debug, error, trace};

use crate::error::SolverError;
use crate::model::{Edge, OrderLine, Problem};
use crate::packing::{Packing, PackingOracle};
use crate::pallet::Pallet;
use crate::selection::BiasedSelector;

/// Pallets of one heuristic invocation and the order line bindings.
struct PalletArena {
    slots: Vec<Option<Pallet>>,
    binding: HashMap<usize, usize>,
}

impl PalletArena {
    fn new(pallets: Vec<Pallet>) -> Self {
        let mut binding = HashMap::new();
        for (slot, pallet) in pallets.iter().enumerate() {
            for &line in &pallet.order_lines {
                binding.insert(line, slot);
            }
        }
        Self {
            slots: pallets.into_iter().map(Some).collect(),
            binding,
        }
    }

    fn slot_of(&self, order_line: usize) -> Option<usize> {
        self.binding.get(&order_line).copied()
    }

    fn get(&self, slot: usize) -> Option<&Pallet> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    /// Moves the load of `from` onto `into` and rebinds the moved order lines.
    fn merge(&mut self, into: usize, from: usize, packing: Packing) {
        let Some(absorbed) = self.slots.get_mut(from).and_then(Option::take) else {
            return;
        };
        let Some(survivor) = self.slots.get_mut(into).and_then(Option::as_mut) else {
            self.slots[from] = Some(absorbed);
            return;
        };
        for line in survivor.absorb(&absorbed, packing) {
            self.binding.insert(line, into);
        }
    }

    fn into_pallets(self) -> Vec<Pallet> {
        self.slots.into_iter().flatten().collect()
    }
}

/// One pallet per order line, loaded through the oracle.
///
/// Fails if any order line does not fit an empty pallet on its own.
pub(crate) fn single_line_pallets<O>(
    problem: &Problem,
    oracle: &O,
) -> Result<Vec<Pallet>, SolverError>
where
    O: PackingOracle + ?Sized,
{
    let spec = problem.pallet();
    problem
        .order_lines()
        .iter()
        .map(|line| {
            let mut pallet = Pallet::new(spec);
            match oracle.attempt_pack(&pallet, &[line]) {
                Some(packing) => {
                    pallet.load(line, packing);
                    Ok(pallet)
                }
                None => {
                    error!(
                        order_line = line.id,
                        location = %line.location,
                        weight = line.total_weight(),
                        "Order line does not fit an empty pallet"
                    );
                    Err(SolverError::OrderLineDoesNotFit {
                        order_line: line.id,
                        location: line.location,
                    })
                }
            }
        })
        .collect()
}

/// Order lines of `pallet` in the order the picker visits them.
pub(crate) fn payload_of<'p>(problem: &'p Problem, pallet: &Pallet) -> Vec<&'p OrderLine> {
    pallet
        .visiting_order()
        .into_iter()
        .filter_map(|location| problem.line_at(location))
        .collect()
}

/// Edges sorted by decreasing saving; ties keep input order.
fn ranked_edges(problem: &Problem) -> Vec<Edge> {
    let mut edges = problem.edges().to_vec();
    edges.sort_by(|a, b| b.saving.total_cmp(&a.saving));
    edges
}

fn attempt_merge<O>(problem: &Problem, oracle: &O, host: &Pallet, hosted: &Pallet) -> Option<Packing>
where
    O: PackingOracle + ?Sized,
{
    oracle.attempt_pack(host, &payload_of(problem, hosted))
}

/// Runs one pass of the merge heuristic with bias `beta`.
///
/// The capacity check before a merge only consults the bounds of the edge's
/// origin pallet, and the swapped attempt is not checked again. All pallets
/// of a run share one `PalletSpec`, so the bounds agree either way.
pub fn merge_heuristic<O, R>(
    problem: &Problem,
    oracle: &O,
    beta: f64,
    rng: &mut R,
) -> Result<Vec<Pallet>, SolverError>
where
    O: PackingOracle + ?Sized,
    R: Rng + ?Sized,
{
    let mut arena = PalletArena::new(single_line_pallets(problem, oracle)?);
    let mut merged = 0usize;
    let mut swapped = 0usize;
    let mut over_capacity = 0usize;
    let mut rejected = 0usize;

    for edge in BiasedSelector::new(ranked_edges(problem), beta, rng)? {
        let (Some(origin), Some(end)) = (problem.line_at(edge.origin), problem.line_at(edge.end))
        else {
            continue;
        };
        let (Some(host_slot), Some(hosted_slot)) = (arena.slot_of(origin.id), arena.slot_of(end.id))
        else {
            continue;
        };
        if host_slot == hosted_slot {
            continue;
        }
        let (Some(host), Some(hosted)) = (arena.get(host_slot), arena.get(hosted_slot)) else {
            continue;
        };
        if !host.can_absorb(hosted) {
            over_capacity += 1;
            continue;
        }

        let outcome = match attempt_merge(problem, oracle, host, hosted) {
            Some(packing) => Some((host_slot, hosted_slot, packing)),
            None => attempt_merge(problem, oracle, hosted, host).map(|packing| {
                swapped += 1;
                (hosted_slot, host_slot, packing)
            }),
        };

        match outcome {
            Some((into, from, packing)) => {
                trace!(
                    origin = %edge.origin,
                    end = %edge.end,
                    saving = edge.saving,
                    "Merged pallets"
                );
                arena.merge(into, from, packing);
                merged += 1;
            }
            None => rejected += 1,
        }
    }

    let pallets = arena.into_pallets();
    debug!(
        beta,
        pallets = pallets.len(),
        merged,
        swapped,
        over_capacity,
        rejected,
        "Heuristic pass complete"
    );
    Ok(pallets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::solution_cost;
    use crate::model::{DistanceMatrix, Location, PalletSpec};
    use crate::packing::LayerPacker;
    use crate::selection::GREEDY_BETA;
    use crate::testing::{OnlyOnto, RejectAll, StackAll, covered_lines, line, problem};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn path_cost(stops: &[Location], distances: &DistanceMatrix) -> f64 {
        let mut route = vec![Location::DEPOT];
        route.extend_from_slice(stops);
        route.push(Location::DEPOT);
        route.windows(2).map(|w| distances.get(w[0], w[1])).sum()
    }

    #[test]
    fn greedy_pass_merges_four_lines_into_one_pallet() {
        let p = problem(
            (1..=4).map(|id| line(id, 5.0, 1.0)).collect(),
            PalletSpec::default(),
        );
        let mut rng = StdRng::seed_from_u64(1);

        let pallets = merge_heuristic(&p, &StackAll, GREEDY_BETA, &mut rng).unwrap();

        assert_eq!(pallets.len(), 1);
        assert_eq!(covered_lines(&pallets), vec![1, 2, 3, 4]);
        let expected = path_cost(&pallets[0].visiting_order(), p.distances());
        assert!((solution_cost(&pallets, p.distances()) - expected).abs() < 1e-9);
    }

    #[test]
    fn reference_packer_merges_small_cases() {
        let p = problem(
            (1..=4).map(|id| line(id, 5.0, 1.0)).collect(),
            PalletSpec::default(),
        );
        let mut rng = StdRng::seed_from_u64(5);

        let pallets = merge_heuristic(&p, &LayerPacker::default(), GREEDY_BETA, &mut rng).unwrap();

        assert_eq!(pallets.len(), 1);
        assert_eq!(pallets[0].cases.len(), 4);
        assert_eq!(pallets[0].layers.len(), 4);
    }

    #[test]
    fn every_line_lands_on_exactly_one_pallet() {
        let p = problem(
            (1..=7).map(|id| line(id, 60.0 + id as f64, 1.0)).collect(),
            PalletSpec::default(),
        );
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let pallets = merge_heuristic(&p, &StackAll, 0.2, &mut rng).unwrap();
            assert_eq!(covered_lines(&pallets), (1..=7).collect::<Vec<_>>());
            for pallet in &pallets {
                assert_eq!(pallet.layers.len(), pallet.order_lines.len());
            }
        }
    }

    #[test]
    fn merged_pallets_stay_within_capacity() {
        let spec = PalletSpec::new((120.0, 80.0, 150.0), 450.0).unwrap();
        let p = problem((1..=5).map(|id| line(id, 200.0, 1.0)).collect(), spec);
        for seed in 0..10 {
            let mut rng = StdRng::seed_from_u64(seed);
            let pallets = merge_heuristic(&p, &StackAll, 0.3, &mut rng).unwrap();
            assert_eq!(pallets.len(), 3);
            for pallet in &pallets {
                assert!(pallet.weight <= pallet.max_weight());
                assert!(pallet.volume <= pallet.max_volume());
            }
        }
    }

    #[test]
    fn volume_bound_blocks_merges() {
        // Each case fills the whole pallet volume.
        let spec = PalletSpec::new((10.0, 10.0, 10.0), 1000.0).unwrap();
        let p = problem((1..=3).map(|id| line(id, 1.0, 1.0)).collect(), spec);
        let mut rng = StdRng::seed_from_u64(9);
        let pallets = merge_heuristic(&p, &StackAll, GREEDY_BETA, &mut rng).unwrap();
        assert_eq!(pallets.len(), 3);
    }

    #[test]
    fn rejected_merge_is_retried_swapped() {
        let lines = vec![line(1, 5.0, 1.0), line(2, 5.0, 1.0)];
        let edges = vec![Edge::new(Location(1), Location(2), 4.0)];
        let p = Problem::new(
            lines,
            edges,
            crate::testing::row_matrix(3),
            PalletSpec::default(),
        )
        .unwrap();
        let mut rng = StdRng::seed_from_u64(0);

        // Line 1 hosts the edge, but only a pallet with line 2 accepts payload.
        let pallets = merge_heuristic(&p, &OnlyOnto(2), GREEDY_BETA, &mut rng).unwrap();

        assert_eq!(pallets.len(), 1);
        assert_eq!(pallets[0].order_lines, vec![2, 1]);
        assert_eq!(pallets[0].visiting_order(), vec![Location(2), Location(1)]);
    }

    #[test]
    fn failed_merges_leave_singletons() {
        let p = problem(
            (1..=3).map(|id| line(id, 5.0, 1.0)).collect(),
            PalletSpec::default(),
        );
        let mut rng = StdRng::seed_from_u64(3);
        let pallets = merge_heuristic(&p, &OnlyOnto(99), 0.5, &mut rng).unwrap();
        assert_eq!(pallets.len(), 3);
        assert_eq!(covered_lines(&pallets), vec![1, 2, 3]);
    }

    #[test]
    fn overweight_line_aborts_the_run() {
        let spec = PalletSpec::new((120.0, 80.0, 150.0), 450.0).unwrap();
        let p = problem(vec![line(1, 5.0, 1.0), line(2, 500.0, 1.0)], spec);
        let mut rng = StdRng::seed_from_u64(0);

        let err = merge_heuristic(&p, &LayerPacker::default(), GREEDY_BETA, &mut rng).unwrap_err();
        assert_eq!(
            err,
            SolverError::OrderLineDoesNotFit {
                order_line: 2,
                location: Location(2),
            }
        );
    }

    #[test]
    fn unpackable_input_is_fatal_even_without_edges() {
        let p = Problem::new(
            vec![line(1, 5.0, 1.0)],
            Vec::new(),
            crate::testing::row_matrix(2),
            PalletSpec::default(),
        )
        .unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        assert!(merge_heuristic(&p, &RejectAll, 0.5, &mut rng).is_err());
    }

    #[test]
    fn edges_rank_by_decreasing_saving() {
        let p = problem(
            (1..=3).map(|id| line(id, 5.0, 1.0)).collect(),
            PalletSpec::default(),
        );
        let savings: Vec<f64> = ranked_edges(&p).iter().map(|e| e.saving).collect();
        assert!(savings.windows(2).all(|w| w[0] >= w[1]));
        assert_eq!(savings.first(), Some(&5.0));
    }
}
