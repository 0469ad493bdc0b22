//! Input data model for the case picking problem.
//!
//! This module defines the immutable inputs of a run:
//! - `Case`: a physical item with dimensions, weight and stackability rank
//! - `OrderLine`: a demand unit bound to one warehouse location
//! - `Edge`: a routing relation between two locations carrying a saving
//! - `DistanceMatrix`: the walking distances between locations
//! - `PalletSpec`: the capacity shared by every pallet built in a run
//! - `Problem`: all of the above, validated together

use std::collections::{HashMap, HashSet};
use std::fmt;

use thiserror::Error;

use crate::types::{Dimensional, Vec3, Weighted};

/// Validation error for input data.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Invalid dimension: {0}")]
    InvalidDimension(String),
    #[error("Invalid weight: {0}")]
    InvalidWeight(String),
    #[error("Invalid order line: {0}")]
    InvalidOrderLine(String),
    #[error("Invalid routing data: {0}")]
    InvalidRouting(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

fn validate_dimension(value: f64, name: &str) -> Result<(), ValidationError> {
    if value <= 0.0 || value.is_nan() || value.is_infinite() {
        return Err(ValidationError::InvalidDimension(format!(
            "{} must be positive, got: {}",
            name, value
        )));
    }
    Ok(())
}

fn validate_weight_value(value: f64) -> Result<(), ValidationError> {
    if value <= 0.0 || value.is_nan() || value.is_infinite() {
        return Err(ValidationError::InvalidWeight(format!(
            "Weight must be positive, got: {}",
            value
        )));
    }
    Ok(())
}

fn validate_dims(dims: (f64, f64, f64), prefix: &str) -> Result<(), ValidationError> {
    validate_dimension(dims.0, &format!("{prefix}width"))?;
    validate_dimension(dims.1, &format!("{prefix}depth"))?;
    validate_dimension(dims.2, &format!("{prefix}height"))?;
    Ok(())
}

/// Index into the distance matrix. The depot is location 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Location(pub usize);

impl Location {
    pub const DEPOT: Location = Location(0);

    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// A physical case to be picked and packed.
///
/// # Fields
/// * `id` - Identification number of the case
/// * `dims` - Dimensions (width, depth, height)
/// * `weight` - Weight in kg
/// * `strength` - Stackability rank; higher values tolerate more load on top
#[derive(Clone, Debug, PartialEq)]
pub struct Case {
    pub id: usize,
    pub dims: (f64, f64, f64),
    pub weight: f64,
    pub strength: f64,
}

impl Case {
    /// Creates a new case with validation.
    ///
    /// # Examples
    /// ```
    /// use case_picking::model::Case;
    ///
    /// assert!(Case::new(1, (10.0, 20.0, 30.0), 5.0, 2.0).is_ok());
    /// assert!(Case::new(1, (-10.0, 20.0, 30.0), 5.0, 2.0).is_err());
    /// ```
    pub fn new(
        id: usize,
        dims: (f64, f64, f64),
        weight: f64,
        strength: f64,
    ) -> Result<Self, ValidationError> {
        validate_dims(dims, "Case ")?;
        validate_weight_value(weight)?;
        if !strength.is_finite() {
            return Err(ValidationError::InvalidConfiguration(format!(
                "Strength of case {} must be finite, got: {}",
                id, strength
            )));
        }
        Ok(Self {
            id,
            dims,
            weight,
            strength,
        })
    }

    #[inline]
    pub fn dims_as_vec3(&self) -> Vec3 {
        Vec3::from_tuple(self.dims)
    }
}

impl Dimensional for Case {
    fn dimensions(&self) -> Vec3 {
        self.dims_as_vec3()
    }
}

impl Weighted for Case {
    fn weight(&self) -> f64 {
        self.weight
    }
}

/// A customer demand item tied to one warehouse location.
///
/// Total weight and volume are derived from the cases once, at construction.
/// The pallet currently hosting the line is tracked by the run that builds
/// pallets, never on the line itself.
#[derive(Clone, Debug, PartialEq)]
pub struct OrderLine {
    pub id: usize,
    pub location: Location,
    pub cases: Vec<Case>,
    weight: f64,
    volume: f64,
}

impl OrderLine {
    pub fn new(id: usize, location: Location, cases: Vec<Case>) -> Result<Self, ValidationError> {
        if cases.is_empty() {
            return Err(ValidationError::InvalidOrderLine(format!(
                "Order line {} has no cases",
                id
            )));
        }
        let weight = cases.iter().map(|c| c.weight).sum();
        let volume = cases.iter().map(|c| c.volume()).sum();
        Ok(Self {
            id,
            location,
            cases,
            weight,
            volume,
        })
    }

    /// Total weight of all cases.
    pub fn total_weight(&self) -> f64 {
        self.weight
    }

    /// Total volume of all cases.
    pub fn volume(&self) -> f64 {
        self.volume
    }
}

/// Directed routing relation between two locations.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Edge {
    pub origin: Location,
    pub end: Location,
    pub saving: f64,
}

impl Edge {
    pub fn new(origin: Location, end: Location, saving: f64) -> Self {
        Self {
            origin,
            end,
            saving,
        }
    }
}

/// Dense matrix of walking distances. Symmetry is not assumed.
#[derive(Clone, Debug, PartialEq)]
pub struct DistanceMatrix {
    size: usize,
    values: Vec<f64>,
}

impl DistanceMatrix {
    /// Builds the matrix from rows; every row must have as many entries as there are rows.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self, ValidationError> {
        let size = rows.len();
        if size == 0 {
            return Err(ValidationError::InvalidRouting(
                "Distance matrix must not be empty".to_string(),
            ));
        }
        let mut values = Vec::with_capacity(size * size);
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != size {
                return Err(ValidationError::InvalidRouting(format!(
                    "Distance matrix row {} has {} entries, expected {}",
                    i,
                    row.len(),
                    size
                )));
            }
            if let Some(bad) = row.iter().find(|d| !d.is_finite() || **d < 0.0) {
                return Err(ValidationError::InvalidRouting(format!(
                    "Distance matrix row {} contains invalid distance {}",
                    i, bad
                )));
            }
            values.extend(row);
        }
        Ok(Self { size, values })
    }

    /// Number of locations covered, depot included.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn contains(&self, location: Location) -> bool {
        location.index() < self.size
    }

    /// Distance from `from` to `to`.
    ///
    /// Both locations must lie inside the matrix; `Problem::new` guarantees
    /// this for every location an order line or edge refers to.
    #[inline]
    pub fn get(&self, from: Location, to: Location) -> f64 {
        self.values[from.index() * self.size + to.index()]
    }
}

/// Pallet configuration applied uniformly to every pallet of a run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PalletSpec {
    pub size: (f64, f64, f64),
    pub max_weight: f64,
}

impl PalletSpec {
    pub const DEFAULT_SIZE: (f64, f64, f64) = (120.0, 80.0, 150.0);
    pub const DEFAULT_MAX_WEIGHT: f64 = 450.0;

    pub fn new(size: (f64, f64, f64), max_weight: f64) -> Result<Self, ValidationError> {
        validate_dims(size, "Pallet ")?;
        validate_weight_value(max_weight)?;
        Ok(Self { size, max_weight })
    }

    pub fn max_volume(&self) -> f64 {
        let (w, d, h) = self.size;
        w * d * h
    }
}

impl Default for PalletSpec {
    fn default() -> Self {
        Self {
            size: Self::DEFAULT_SIZE,
            max_weight: Self::DEFAULT_MAX_WEIGHT,
        }
    }
}

impl Dimensional for PalletSpec {
    fn dimensions(&self) -> Vec3 {
        Vec3::from_tuple(self.size)
    }
}

/// A validated problem instance.
///
/// Order line ids and locations are unique, so `line_at` resolves an edge
/// endpoint to exactly one order line.
#[derive(Clone, Debug)]
pub struct Problem {
    order_lines: Vec<OrderLine>,
    edges: Vec<Edge>,
    distances: DistanceMatrix,
    pallet: PalletSpec,
    line_at: HashMap<Location, usize>,
}

impl Problem {
    pub fn new(
        order_lines: Vec<OrderLine>,
        edges: Vec<Edge>,
        distances: DistanceMatrix,
        pallet: PalletSpec,
    ) -> Result<Self, ValidationError> {
        if order_lines.is_empty() {
            return Err(ValidationError::InvalidOrderLine(
                "At least one order line must be specified".to_string(),
            ));
        }

        let mut ids = HashSet::with_capacity(order_lines.len());
        let mut line_at = HashMap::with_capacity(order_lines.len());
        for (idx, line) in order_lines.iter().enumerate() {
            if !ids.insert(line.id) {
                return Err(ValidationError::InvalidOrderLine(format!(
                    "Duplicate order line id {}",
                    line.id
                )));
            }
            if line.location == Location::DEPOT {
                return Err(ValidationError::InvalidOrderLine(format!(
                    "Order line {} is placed at the depot",
                    line.id
                )));
            }
            if !distances.contains(line.location) {
                return Err(ValidationError::InvalidRouting(format!(
                    "Location {} of order line {} is outside the distance matrix",
                    line.location, line.id
                )));
            }
            if line_at.insert(line.location, idx).is_some() {
                return Err(ValidationError::InvalidOrderLine(format!(
                    "Location {} hosts more than one order line",
                    line.location
                )));
            }
        }

        for edge in &edges {
            if !edge.saving.is_finite() {
                return Err(ValidationError::InvalidRouting(format!(
                    "Edge {} -> {} has a non-finite saving",
                    edge.origin, edge.end
                )));
            }
            for endpoint in [edge.origin, edge.end] {
                if !line_at.contains_key(&endpoint) {
                    return Err(ValidationError::InvalidRouting(format!(
                        "Edge {} -> {} references {} which hosts no order line",
                        edge.origin, edge.end, endpoint
                    )));
                }
            }
        }

        Ok(Self {
            order_lines,
            edges,
            distances,
            pallet,
            line_at,
        })
    }

    pub fn order_lines(&self) -> &[OrderLine] {
        &self.order_lines
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn distances(&self) -> &DistanceMatrix {
        &self.distances
    }

    pub fn pallet(&self) -> PalletSpec {
        self.pallet
    }

    /// The order line sitting at `location`.
    pub fn line_at(&self, location: Location) -> Option<&OrderLine> {
        self.line_at
            .get(&location)
            .map(|&idx| &self.order_lines[idx])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn case(id: usize) -> Case {
        Case::new(id, (10.0, 10.0, 10.0), 2.0, 1.0).unwrap()
    }

    fn matrix(n: usize) -> DistanceMatrix {
        DistanceMatrix::from_rows(
            (0..n)
                .map(|i| (0..n).map(|j| (i as f64 - j as f64).abs()).collect())
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn order_line_totals_are_derived_from_cases() {
        let line = OrderLine::new(
            7,
            Location(1),
            vec![
                Case::new(1, (10.0, 10.0, 10.0), 2.0, 1.0).unwrap(),
                Case::new(2, (5.0, 4.0, 2.0), 3.5, 1.0).unwrap(),
            ],
        )
        .unwrap();
        assert!((line.total_weight() - 5.5).abs() < 1e-9);
        assert!((line.volume() - 1040.0).abs() < 1e-9);
    }

    #[test]
    fn order_line_without_cases_is_rejected() {
        assert!(OrderLine::new(1, Location(1), Vec::new()).is_err());
    }

    #[test]
    fn case_rejects_non_finite_strength() {
        assert!(Case::new(1, (1.0, 1.0, 1.0), 1.0, f64::NAN).is_err());
    }

    #[test]
    fn distance_matrix_is_asymmetric_and_row_major() {
        let m = DistanceMatrix::from_rows(vec![vec![0.0, 4.0], vec![7.0, 0.0]]).unwrap();
        assert_eq!(m.get(Location(0), Location(1)), 4.0);
        assert_eq!(m.get(Location(1), Location(0)), 7.0);
    }

    #[test]
    fn distance_matrix_rejects_ragged_rows() {
        let err = DistanceMatrix::from_rows(vec![vec![0.0, 1.0], vec![1.0]]).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidRouting(_)));
    }

    #[test]
    fn problem_resolves_lines_by_location() {
        let lines = vec![
            OrderLine::new(10, Location(2), vec![case(1)]).unwrap(),
            OrderLine::new(11, Location(1), vec![case(2)]).unwrap(),
        ];
        let edges = vec![Edge::new(Location(1), Location(2), 3.0)];
        let problem = Problem::new(lines, edges, matrix(3), PalletSpec::default()).unwrap();
        assert_eq!(problem.line_at(Location(2)).map(|l| l.id), Some(10));
        assert_eq!(problem.line_at(Location(1)).map(|l| l.id), Some(11));
        assert!(problem.line_at(Location::DEPOT).is_none());
    }

    #[test]
    fn problem_rejects_shared_locations() {
        let lines = vec![
            OrderLine::new(1, Location(1), vec![case(1)]).unwrap(),
            OrderLine::new(2, Location(1), vec![case(2)]).unwrap(),
        ];
        let err = Problem::new(lines, Vec::new(), matrix(3), PalletSpec::default()).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidOrderLine(_)));
    }

    #[test]
    fn problem_rejects_edges_to_empty_locations() {
        let lines = vec![OrderLine::new(1, Location(1), vec![case(1)]).unwrap()];
        let edges = vec![Edge::new(Location(1), Location(2), 1.0)];
        let err = Problem::new(lines, edges, matrix(3), PalletSpec::default()).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidRouting(_)));
    }

    #[test]
    fn problem_rejects_locations_outside_matrix() {
        let lines = vec![OrderLine::new(1, Location(5), vec![case(1)]).unwrap()];
        let err = Problem::new(lines, Vec::new(), matrix(3), PalletSpec::default()).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidRouting(_)));
    }

    #[test]
    fn pallet_spec_volume() {
        let spec = PalletSpec::default();
        assert!((spec.max_volume() - 1_440_000.0).abs() < 1e-6);
        assert!(PalletSpec::new((0.0, 1.0, 1.0), 10.0).is_err());
    }
}
