//! Fixtures shared by the unit tests of the search modules.

use crate::model::{Case, DistanceMatrix, Edge, Location, OrderLine, PalletSpec, Problem};
use crate::packing::{Packing, PackingOracle};
use crate::pallet::{Pallet, PlacedCase};

/// Accepts every payload and stacks each payload line on a new layer.
pub struct StackAll;

impl PackingOracle for StackAll {
    fn attempt_pack(&self, host: &Pallet, payload: &[&OrderLine]) -> Option<Packing> {
        Some(stack_on_top(host, payload))
    }
}

/// Rejects every payload, even on an empty pallet.
pub struct RejectAll;

impl PackingOracle for RejectAll {
    fn attempt_pack(&self, _host: &Pallet, _payload: &[&OrderLine]) -> Option<Packing> {
        None
    }
}

/// Loads empty pallets, but merges only onto a pallet already hosting `line`.
pub struct OnlyOnto(pub usize);

impl PackingOracle for OnlyOnto {
    fn attempt_pack(&self, host: &Pallet, payload: &[&OrderLine]) -> Option<Packing> {
        (host.is_empty() || host.hosts(self.0)).then(|| stack_on_top(host, payload))
    }
}

fn stack_on_top(host: &Pallet, payload: &[&OrderLine]) -> Packing {
    let mut cases = host.cases.clone();
    let mut layers = host.layers.clone();
    let mut next = layers.entries().iter().map(|e| e.layer + 1).max().unwrap_or(0);
    for line in payload {
        for case in &line.cases {
            cases.push(PlacedCase {
                case: case.clone(),
                order_line: line.id,
                position: (0.0, 0.0, next as f64),
                dims: case.dims,
                layer: next,
            });
        }
        layers.assign(line.id, line.location, next);
        next += 1;
    }
    Packing { cases, layers }
}

/// Order line `id` at location `id` with a single 10x10x10 case.
pub fn line(id: usize, weight: f64, strength: f64) -> OrderLine {
    let case = Case::new(id, (10.0, 10.0, 10.0), weight, strength).unwrap();
    OrderLine::new(id, Location(id), vec![case]).unwrap()
}

/// Locations on a row, `d(i, j) = 10 * |i - j|`, plus a small detour on the way back.
pub fn row_matrix(n: usize) -> DistanceMatrix {
    DistanceMatrix::from_rows(
        (0..n)
            .map(|i| {
                (0..n)
                    .map(|j| {
                        let base = 10.0 * (i as f64 - j as f64).abs();
                        if j < i { base + 1.0 } else { base }
                    })
                    .collect()
            })
            .collect(),
    )
    .unwrap()
}

/// Problem with an edge between every ordered pair of lines, saving `i + j`.
pub fn problem(lines: Vec<OrderLine>, pallet: PalletSpec) -> Problem {
    let n = lines.iter().map(|l| l.location.index()).max().unwrap_or(0) + 1;
    let mut edges = Vec::new();
    for a in &lines {
        for b in &lines {
            if a.id != b.id {
                let saving = (a.location.index() + b.location.index()) as f64;
                edges.push(Edge::new(a.location, b.location, saving));
            }
        }
    }
    Problem::new(lines, edges, row_matrix(n), pallet).unwrap()
}

/// Every order line id of a solution, sorted.
pub fn covered_lines(pallets: &[Pallet]) -> Vec<usize> {
    let mut ids: Vec<usize> = pallets
        .iter()
        .flat_map(|p| p.order_lines.iter().copied())
        .collect();
    ids.sort_unstable();
    ids
}
