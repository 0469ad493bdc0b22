//! Sequential baseline: packing first, routing ignored.
//!
//! Used to compare the merge heuristic against a procedure that does not
//! look at savings at all.

use tracing::debug;

use crate::error::SolverError;
use crate::heuristic::{payload_of, single_line_pallets};
use crate::model::Problem;
use crate::packing::PackingOracle;
use crate::pallet::Pallet;

/// Builds a single solution by merging pallets in order of decreasing
/// strength of their first packed case.
///
/// Every ordered pair of distinct active pallets is tried once; there is no
/// reverse retry. Absorbed pallets are deactivated and dropped at the end.
pub fn sequential<O>(problem: &Problem, oracle: &O) -> Result<Vec<Pallet>, SolverError>
where
    O: PackingOracle + ?Sized,
{
    let mut pallets = single_line_pallets(problem, oracle)?;
    pallets.sort_by(|a, b| {
        let strength = |p: &Pallet| p.first_case_strength().unwrap_or(f64::NEG_INFINITY);
        strength(b).total_cmp(&strength(a))
    });

    let n = pallets.len();
    let mut merged = 0usize;
    for i in 0..n {
        for j in 0..n {
            if i == j || !pallets[i].active || !pallets[j].active {
                continue;
            }
            let (host, other) = host_and_other(&mut pallets, i, j);
            if !host.can_absorb(other) {
                continue;
            }
            if let Some(packing) = oracle.attempt_pack(host, &payload_of(problem, other)) {
                host.absorb(other, packing);
                pallets[j].active = false;
                merged += 1;
            }
        }
    }

    pallets.retain(|p| p.active);
    debug!(pallets = pallets.len(), merged, "Sequential baseline complete");
    Ok(pallets)
}

fn host_and_other(pallets: &mut [Pallet], i: usize, j: usize) -> (&mut Pallet, &Pallet) {
    if i < j {
        let (left, right) = pallets.split_at_mut(j);
        (&mut left[i], &right[0])
    } else {
        let (left, right) = pallets.split_at_mut(i);
        (&mut right[0], &left[j])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PalletSpec;
    use crate::packing::LayerPacker;
    use crate::testing::{RejectAll, StackAll, covered_lines, line, problem};

    #[test]
    fn strongest_pallet_hosts_first() {
        let p = problem(
            vec![line(1, 5.0, 1.0), line(2, 5.0, 9.0), line(3, 5.0, 4.0)],
            PalletSpec::default(),
        );
        let pallets = sequential(&p, &StackAll).unwrap();
        assert_eq!(pallets.len(), 1);
        assert_eq!(pallets[0].order_lines, vec![2, 3, 1]);
    }

    #[test]
    fn respects_capacity_of_host() {
        let spec = PalletSpec::new((120.0, 80.0, 150.0), 450.0).unwrap();
        let p = problem((1..=4).map(|id| line(id, 200.0, id as f64)).collect(), spec);
        let pallets = sequential(&p, &StackAll).unwrap();
        assert_eq!(pallets.len(), 2);
        assert_eq!(covered_lines(&pallets), vec![1, 2, 3, 4]);
        // Strength order 4, 3, 2, 1 pairs the two strongest lines.
        assert_eq!(pallets[0].order_lines, vec![4, 3]);
        assert_eq!(pallets[1].order_lines, vec![2, 1]);
        for pallet in &pallets {
            assert!(pallet.weight <= pallet.max_weight());
        }
    }

    #[test]
    fn works_with_reference_packer() {
        let p = problem(
            (1..=5).map(|id| line(id, 10.0, 2.0)).collect(),
            PalletSpec::default(),
        );
        let pallets = sequential(&p, &LayerPacker::default()).unwrap();
        assert_eq!(pallets.len(), 1);
        assert_eq!(pallets[0].cases.len(), 5);
    }

    #[test]
    fn unpackable_line_is_fatal() {
        let p = problem(vec![line(1, 5.0, 1.0)], PalletSpec::default());
        assert!(sequential(&p, &RejectAll).is_err());
    }
}
