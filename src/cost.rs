//! Walking distance of a solution.
//!
//! A picker starts at the depot, visits the locations of a pallet bottom
//! layer first and returns to the depot. The cost of a solution is the sum
//! of these tours over all pallets.

use crate::model::{DistanceMatrix, Location};
use crate::pallet::Pallet;

/// Tour length for a single pallet; a pallet without layer entries costs 0.
pub fn pallet_cost(pallet: &Pallet, distances: &DistanceMatrix) -> f64 {
    tour_length(&pallet.visiting_order(), distances)
}

/// Sum of `pallet_cost` over all pallets. Pure and order independent.
pub fn solution_cost(pallets: &[Pallet], distances: &DistanceMatrix) -> f64 {
    pallets.iter().map(|p| pallet_cost(p, distances)).sum()
}

fn tour_length(stops: &[Location], distances: &DistanceMatrix) -> f64 {
    let (Some(&first), Some(&last)) = (stops.first(), stops.last()) else {
        return 0.0;
    };
    let legs: f64 = stops
        .windows(2)
        .map(|pair| distances.get(pair[0], pair[1]))
        .sum();
    distances.get(Location::DEPOT, first) + legs + distances.get(last, Location::DEPOT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PalletSpec;

    fn matrix() -> DistanceMatrix {
        // Deliberately asymmetric.
        DistanceMatrix::from_rows(vec![
            vec![0.0, 2.0, 4.0, 6.0],
            vec![3.0, 0.0, 1.0, 5.0],
            vec![5.0, 2.0, 0.0, 1.0],
            vec![7.0, 4.0, 3.0, 0.0],
        ])
        .unwrap()
    }

    fn pallet_with_layers(entries: &[(usize, usize, usize)]) -> Pallet {
        let mut pallet = Pallet::new(PalletSpec::default());
        for &(line, location, layer) in entries {
            pallet.order_lines.push(line);
            pallet.layers.assign(line, Location(location), layer);
        }
        pallet
    }

    #[test]
    fn single_line_is_a_round_trip() {
        let m = matrix();
        let pallet = pallet_with_layers(&[(1, 2, 0)]);
        // d(0, 2) = 4 out, d(2, 0) = 5 back.
        assert!((pallet_cost(&pallet, &m) - (4.0 + 5.0)).abs() < 1e-9);
    }

    #[test]
    fn tour_follows_layers_bottom_up() {
        let m = matrix();
        // Inserted top first, visited bottom first: 0 -> 3 -> 1 -> 2 -> 0.
        let pallet = pallet_with_layers(&[(1, 2, 2), (2, 3, 0), (3, 1, 1)]);
        let expected = 6.0 + 4.0 + 1.0 + 5.0;
        assert!((pallet_cost(&pallet, &m) - expected).abs() < 1e-9);
    }

    #[test]
    fn equal_layers_keep_insertion_order() {
        let m = matrix();
        let forward = pallet_with_layers(&[(1, 1, 0), (2, 2, 0)]);
        let backward = pallet_with_layers(&[(2, 2, 0), (1, 1, 0)]);
        assert!((pallet_cost(&forward, &m) - (2.0 + 1.0 + 5.0)).abs() < 1e-9);
        assert!((pallet_cost(&backward, &m) - (4.0 + 2.0 + 3.0)).abs() < 1e-9);
    }

    #[test]
    fn empty_pallet_costs_nothing() {
        let m = matrix();
        assert_eq!(pallet_cost(&Pallet::new(PalletSpec::default()), &m), 0.0);
        assert_eq!(solution_cost(&[], &m), 0.0);
    }

    #[test]
    fn solution_cost_is_deterministic_and_order_invariant() {
        let m = matrix();
        let a = pallet_with_layers(&[(1, 1, 0), (2, 3, 1)]);
        let b = pallet_with_layers(&[(3, 2, 0)]);
        let forward = solution_cost(&[a.clone(), b.clone()], &m);
        let again = solution_cost(&[a.clone(), b.clone()], &m);
        let reversed = solution_cost(&[b, a], &m);
        assert_eq!(forward, again);
        assert!((forward - reversed).abs() < 1e-9);
        assert!((forward - ((2.0 + 5.0 + 7.0) + (4.0 + 5.0))).abs() < 1e-9);
    }
}
