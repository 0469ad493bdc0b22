//! Pallets and their packed content.
//!
//! A `Pallet` owns everything the picker builds on it: the order lines it
//! hosts, the placed cases and the layer assignment that decides in which
//! order the hosted locations are visited. Content only changes through
//! `absorb`, which replaces cases and layers with a fresh oracle result so
//! the layer assignment is never stale.

use crate::model::{Case, Location, OrderLine, PalletSpec};
use crate::packing::Packing;
use crate::types::Weighted;

/// A case with its position on a pallet.
///
/// `dims` is the effective footprint after an optional rotation around Z,
/// `layer` the rank of the case's z-level among all z-levels of the pallet.
#[derive(Clone, Debug, PartialEq)]
pub struct PlacedCase {
    pub case: Case,
    pub order_line: usize,
    pub position: (f64, f64, f64),
    pub dims: (f64, f64, f64),
    pub layer: usize,
}

impl PlacedCase {
    /// Z coordinate of the top face.
    pub fn top_z(&self) -> f64 {
        self.position.2 + self.dims.2
    }

    /// Projection of the centre of mass on the bottom face.
    pub fn base_center(&self) -> (f64, f64, f64) {
        (
            self.position.0 + self.dims.0 / 2.0,
            self.position.1 + self.dims.1 / 2.0,
            self.position.2,
        )
    }
}

impl Weighted for PlacedCase {
    fn weight(&self) -> f64 {
        self.case.weight()
    }
}

/// Layer of one hosted order line.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LayerEntry {
    pub order_line: usize,
    pub location: Location,
    pub layer: usize,
}

/// Mapping from hosted order line to its vertical layer, in insertion order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LayerMap {
    entries: Vec<LayerEntry>,
}

impl LayerMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or overwrites the layer of an order line, keeping its first insertion slot.
    pub fn assign(&mut self, order_line: usize, location: Location, layer: usize) {
        match self.entries.iter_mut().find(|e| e.order_line == order_line) {
            Some(entry) => entry.layer = layer,
            None => self.entries.push(LayerEntry {
                order_line,
                location,
                layer,
            }),
        }
    }

    pub fn layer_of(&self, order_line: usize) -> Option<usize> {
        self.entries
            .iter()
            .find(|e| e.order_line == order_line)
            .map(|e| e.layer)
    }

    pub fn entries(&self) -> &[LayerEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries sorted by layer ascending; ties keep insertion order.
    pub fn visiting_order(&self) -> Vec<LayerEntry> {
        let mut ordered = self.entries.clone();
        ordered.sort_by_key(|e| e.layer);
        ordered
    }
}

/// A pallet under construction.
#[derive(Clone, Debug)]
pub struct Pallet {
    spec: PalletSpec,
    pub weight: f64,
    pub volume: f64,
    pub order_lines: Vec<usize>,
    pub cases: Vec<PlacedCase>,
    pub layers: LayerMap,
    pub active: bool,
}

impl Pallet {
    /// Creates an empty, active pallet at full capacity.
    pub fn new(spec: PalletSpec) -> Self {
        Self {
            spec,
            weight: 0.0,
            volume: 0.0,
            order_lines: Vec::new(),
            cases: Vec::new(),
            layers: LayerMap::new(),
            active: true,
        }
    }

    pub fn spec(&self) -> PalletSpec {
        self.spec
    }

    pub fn max_volume(&self) -> f64 {
        self.spec.max_volume()
    }

    pub fn max_weight(&self) -> f64 {
        self.spec.max_weight
    }

    pub fn is_empty(&self) -> bool {
        self.order_lines.is_empty()
    }

    pub fn hosts(&self, order_line: usize) -> bool {
        self.order_lines.contains(&order_line)
    }

    /// Sum of the weights of the placed cases.
    pub fn packed_weight(&self) -> f64 {
        self.cases.iter().map(|p| p.weight()).sum()
    }

    /// Capacity check of this pallet's own bounds against the combined load.
    ///
    /// Volume is checked first, then weight. Only `self`'s bounds are
    /// consulted.
    pub fn can_absorb(&self, other: &Pallet) -> bool {
        if self.volume + other.volume > self.max_volume() {
            return false;
        }
        self.weight + other.weight <= self.max_weight()
    }

    /// Loads a single order line onto this (empty) pallet.
    pub fn load(&mut self, line: &OrderLine, packing: Packing) {
        self.cases = packing.cases;
        self.layers = packing.layers;
        self.weight = line.total_weight();
        self.volume = line.volume();
        self.order_lines.push(line.id);
    }

    /// Takes over the load of `other`, with `packing` as the new content.
    ///
    /// Returns the ids of the order lines that moved onto this pallet.
    pub fn absorb(&mut self, other: &Pallet, packing: Packing) -> Vec<usize> {
        self.cases = packing.cases;
        self.layers = packing.layers;
        self.weight += other.weight;
        self.volume += other.volume;
        let mut moved = Vec::with_capacity(other.order_lines.len());
        for &line in &other.order_lines {
            if !self.hosts(line) {
                self.order_lines.push(line);
            }
            moved.push(line);
        }
        moved
    }

    /// Locations in the order the picker visits them.
    pub fn visiting_order(&self) -> Vec<Location> {
        self.layers
            .visiting_order()
            .into_iter()
            .map(|e| e.location)
            .collect()
    }

    /// Hosted order line ids in visiting order.
    pub fn lines_in_visiting_order(&self) -> Vec<usize> {
        self.layers
            .visiting_order()
            .into_iter()
            .map(|e| e.order_line)
            .collect()
    }

    /// Strength of the first packed case, the sort key of the sequential baseline.
    pub fn first_case_strength(&self) -> Option<f64> {
        self.cases.first().map(|p| p.case.strength)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visiting_order_is_stable_by_layer() {
        let mut layers = LayerMap::new();
        layers.assign(1, Location(5), 1);
        layers.assign(2, Location(3), 0);
        layers.assign(3, Location(4), 1);
        layers.assign(4, Location(7), 0);

        let order: Vec<usize> = layers
            .visiting_order()
            .into_iter()
            .map(|e| e.order_line)
            .collect();
        assert_eq!(order, vec![2, 4, 1, 3]);
    }

    #[test]
    fn reassigning_keeps_insertion_slot() {
        let mut layers = LayerMap::new();
        layers.assign(1, Location(1), 0);
        layers.assign(2, Location(2), 0);
        layers.assign(1, Location(1), 3);
        assert_eq!(layers.len(), 2);
        assert_eq!(layers.entries()[0].order_line, 1);
        assert_eq!(layers.layer_of(1), Some(3));
    }

    #[test]
    fn capacity_check_uses_own_bounds() {
        let small = PalletSpec::new((10.0, 10.0, 10.0), 10.0).unwrap();
        let large = PalletSpec::new((100.0, 100.0, 100.0), 1000.0).unwrap();

        let mut host = Pallet::new(small);
        host.weight = 6.0;
        host.volume = 100.0;
        let mut other = Pallet::new(large);
        other.weight = 6.0;
        other.volume = 100.0;

        assert!(!host.can_absorb(&other));
        assert!(other.can_absorb(&host));
    }

    #[test]
    fn absorb_sums_loads_and_members() {
        let spec = PalletSpec::default();
        let mut host = Pallet::new(spec);
        host.weight = 3.0;
        host.volume = 30.0;
        host.order_lines.push(1);
        let mut other = Pallet::new(spec);
        other.weight = 4.5;
        other.volume = 12.0;
        other.order_lines.extend([2, 3]);

        let mut layers = LayerMap::new();
        layers.assign(1, Location(1), 0);
        layers.assign(2, Location(2), 1);
        layers.assign(3, Location(3), 1);
        let moved = host.absorb(
            &other,
            Packing {
                cases: Vec::new(),
                layers,
            },
        );

        assert_eq!(moved, vec![2, 3]);
        assert_eq!(host.order_lines, vec![1, 2, 3]);
        assert!((host.weight - 7.5).abs() < 1e-9);
        assert!((host.volume - 42.0).abs() < 1e-9);
        assert_eq!(
            host.visiting_order(),
            vec![Location(1), Location(2), Location(3)]
        );
    }
}
