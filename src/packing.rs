//! Packing oracle: decides whether cases fit on a pallet and in which layers.
//!
//! The search engine only sees the `PackingOracle` trait. `LayerPacker` is
//! the reference implementation, a grid-based stable-position heuristic that
//! respects:
//! - the pallet weight limit and dimensions
//! - collision freedom
//! - support of the base area and of the centre of gravity
//! - stacking order (a case only rests on cases at least as strong)
//! - centre-of-mass balance

use std::cmp::Ordering;
use std::fmt;

use tracing::trace;

use crate::geometry::{intersects, overlap_1d, point_inside};
use crate::model::{Case, OrderLine};
use crate::pallet::{LayerMap, Pallet, PlacedCase};
use crate::types::{Dimensional, EPSILON_GENERAL, EPSILON_HEIGHT, Vec3};

/// Complete content of a pallet after a successful packing attempt.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Packing {
    pub cases: Vec<PlacedCase>,
    pub layers: LayerMap,
}

/// Feasibility oracle for loading order lines onto a pallet.
///
/// `attempt_pack` must not mutate anything: it either returns the full new
/// content of `host` with every case of `payload` added, or `None` when the
/// payload does not fit. `None` is an ordinary outcome, not an error.
pub trait PackingOracle {
    fn attempt_pack(&self, host: &Pallet, payload: &[&OrderLine]) -> Option<Packing>;
}

/// Configuration of the `LayerPacker`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PackingConfig {
    /// Step of the candidate position grid (smaller = more precise, slower)
    pub grid_step: f64,
    /// Minimum share of the base area that must rest on other cases (0.0 to 1.0)
    pub support_ratio: f64,
    /// Tolerance for height comparisons
    pub height_epsilon: f64,
    /// General numerical tolerance
    pub general_epsilon: f64,
    /// Maximum deviation of the centre of mass from the pallet centre, as ratio of the half diagonal
    pub balance_limit_ratio: f64,
    /// Whether cases may be turned by 90° around the vertical axis
    pub allow_item_rotation: bool,
}

impl PackingConfig {
    pub const DEFAULT_GRID_STEP: f64 = 5.0;
    pub const DEFAULT_SUPPORT_RATIO: f64 = 0.6;
    pub const DEFAULT_HEIGHT_EPSILON: f64 = EPSILON_HEIGHT;
    pub const DEFAULT_GENERAL_EPSILON: f64 = EPSILON_GENERAL;
    pub const DEFAULT_BALANCE_LIMIT_RATIO: f64 = 0.45;
    pub const DEFAULT_ALLOW_ITEM_ROTATION: bool = true;

    pub fn builder() -> PackingConfigBuilder {
        PackingConfigBuilder::default()
    }
}

impl Default for PackingConfig {
    fn default() -> Self {
        Self {
            grid_step: Self::DEFAULT_GRID_STEP,
            support_ratio: Self::DEFAULT_SUPPORT_RATIO,
            height_epsilon: Self::DEFAULT_HEIGHT_EPSILON,
            general_epsilon: Self::DEFAULT_GENERAL_EPSILON,
            balance_limit_ratio: Self::DEFAULT_BALANCE_LIMIT_RATIO,
            allow_item_rotation: Self::DEFAULT_ALLOW_ITEM_ROTATION,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct PackingConfigBuilder {
    config: PackingConfig,
}

impl PackingConfigBuilder {
    pub fn grid_step(mut self, step: f64) -> Self {
        self.config.grid_step = step;
        self
    }

    pub fn support_ratio(mut self, ratio: f64) -> Self {
        self.config.support_ratio = ratio;
        self
    }

    pub fn height_epsilon(mut self, epsilon: f64) -> Self {
        self.config.height_epsilon = epsilon;
        self
    }

    pub fn general_epsilon(mut self, epsilon: f64) -> Self {
        self.config.general_epsilon = epsilon;
        self
    }

    pub fn balance_limit_ratio(mut self, ratio: f64) -> Self {
        self.config.balance_limit_ratio = ratio;
        self
    }

    pub fn allow_item_rotation(mut self, allow: bool) -> Self {
        self.config.allow_item_rotation = allow;
        self
    }

    pub fn build(self) -> PackingConfig {
        self.config
    }
}

/// Why a case could not be added to a pallet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectReason {
    TooHeavyForPallet,
    DimensionsExceedPallet,
    NoStablePosition,
}

impl RejectReason {
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::TooHeavyForPallet => "too_heavy_for_pallet",
            RejectReason::DimensionsExceedPallet => "dimensions_exceed_pallet",
            RejectReason::NoStablePosition => "no_stable_position",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::TooHeavyForPallet => write!(f, "case exceeds the remaining pallet weight"),
            RejectReason::DimensionsExceedPallet => {
                write!(f, "case does not fit the pallet in at least one dimension")
            }
            RejectReason::NoStablePosition => write!(f, "no stable position left on the pallet"),
        }
    }
}

/// Reference packing oracle.
///
/// Existing placements of the host are kept untouched; payload cases are
/// added line by line in the given order, strongest and heaviest first
/// within a line. Because earlier cases constrain later ones, packing `a`
/// onto `b` can fail while packing `b` onto `a` succeeds.
#[derive(Copy, Clone, Debug, Default)]
pub struct LayerPacker {
    config: PackingConfig,
}

impl LayerPacker {
    pub fn new(config: PackingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PackingConfig {
        &self.config
    }

    fn place_line(
        &self,
        line: &OrderLine,
        stack: &mut Stack,
        load: &mut f64,
        max_weight: f64,
    ) -> Result<(), RejectReason> {
        let mut cases: Vec<&Case> = line.cases.iter().collect();
        cases.sort_by(|a, b| {
            b.strength
                .total_cmp(&a.strength)
                .then_with(|| b.weight.total_cmp(&a.weight))
                .then_with(|| b.volume().total_cmp(&a.volume()))
                .then_with(|| a.id.cmp(&b.id))
        });

        for case in cases {
            if *load + case.weight > max_weight + self.config.general_epsilon {
                return Err(RejectReason::TooHeavyForPallet);
            }
            let eps = self.config.general_epsilon;
            if !self.orientations(case).any(|dims| dims.fits_within(&stack.dims, eps)) {
                return Err(RejectReason::DimensionsExceedPallet);
            }
            let (position, dims) = stack
                .find_stable_position(case, self.orientations(case))
                .ok_or(RejectReason::NoStablePosition)?;
            stack.placed.push(PlacedCase {
                case: case.clone(),
                order_line: line.id,
                position: position.as_tuple(),
                dims: dims.as_tuple(),
                layer: 0,
            });
            *load += case.weight;
        }
        Ok(())
    }

    fn orientations(&self, case: &Case) -> impl Iterator<Item = Vec3> + use<> {
        let dims = case.dims_as_vec3();
        let rotated = (self.config.allow_item_rotation
            && (dims.x - dims.y).abs() > self.config.general_epsilon)
            .then(|| dims.rotated_xy());
        std::iter::once(dims).chain(rotated)
    }

    /// Ranks z-levels bottom-up and derives every order line's layer as the
    /// lowest layer of its cases. Host lines keep their insertion slots
    /// ahead of the payload lines.
    fn assign_layers(
        &self,
        placed: &mut [PlacedCase],
        host: &Pallet,
        payload: &[&OrderLine],
    ) -> LayerMap {
        let mut levels: Vec<f64> = placed.iter().map(|p| p.position.2).collect();
        levels.sort_by(f64::total_cmp);
        levels.dedup_by(|a, b| (*a - *b).abs() < self.config.height_epsilon);

        for p in placed.iter_mut() {
            p.layer = levels
                .iter()
                .position(|level| (p.position.2 - level).abs() < self.config.height_epsilon)
                .unwrap_or(levels.len());
        }

        let lowest = |order_line: usize| {
            placed
                .iter()
                .filter(|p| p.order_line == order_line)
                .map(|p| p.layer)
                .min()
                .unwrap_or(0)
        };

        let mut layers = LayerMap::new();
        for entry in host.layers.entries() {
            layers.assign(entry.order_line, entry.location, lowest(entry.order_line));
        }
        for line in payload {
            layers.assign(line.id, line.location, lowest(line.id));
        }
        layers
    }
}

impl PackingOracle for LayerPacker {
    fn attempt_pack(&self, host: &Pallet, payload: &[&OrderLine]) -> Option<Packing> {
        let spec = host.spec();
        let mut stack = Stack {
            dims: spec.dimensions(),
            placed: host.cases.clone(),
            config: &self.config,
        };
        let mut load = host.packed_weight();

        for line in payload {
            if let Err(reason) = self.place_line(line, &mut stack, &mut load, spec.max_weight) {
                trace!(
                    order_line = line.id,
                    reason = reason.code(),
                    "Packing attempt rejected: {}",
                    reason
                );
                return None;
            }
        }

        let mut cases = stack.placed;
        let layers = self.assign_layers(&mut cases, host, payload);
        Some(Packing { cases, layers })
    }
}

/// Cases already standing on a pallet of the given dimensions.
struct Stack<'a> {
    dims: Vec3,
    placed: Vec<PlacedCase>,
    config: &'a PackingConfig,
}

/// Ranking of a candidate position; lower is better in the order z, y, x, balance.
#[derive(Clone, Copy)]
struct PlacementScore {
    z: f64,
    y: f64,
    x: f64,
    balance: f64,
}

impl PlacementScore {
    fn beats(&self, other: &PlacementScore, config: &PackingConfig) -> bool {
        let by_axis = compare_with_epsilon(self.z, other.z, config.height_epsilon)
            .then_with(|| compare_with_epsilon(self.y, other.y, config.general_epsilon))
            .then_with(|| compare_with_epsilon(self.x, other.x, config.general_epsilon));
        match by_axis {
            Ordering::Less => true,
            Ordering::Greater => false,
            Ordering::Equal => self.balance + config.general_epsilon < other.balance,
        }
    }
}

type Candidate = (Vec3, Vec3, PlacementScore);

impl Stack<'_> {
    /// Scans every z-level, then y and x on the grid, for each orientation and
    /// returns the best stable position together with the used dimensions.
    ///
    /// Positions inside the balance limit win over positions outside it.
    fn find_stable_position(
        &self,
        case: &Case,
        orientations: impl Iterator<Item = Vec3>,
    ) -> Option<(Vec3, Vec3)> {
        let eps = self.config.general_epsilon;

        let mut z_levels: Vec<f64> = self.placed.iter().map(PlacedCase::top_z).collect();
        z_levels.push(0.0);
        z_levels.sort_by(f64::total_cmp);
        z_levels.dedup_by(|a, b| (*a - *b).abs() < self.config.height_epsilon);

        let balance_limit = self.balance_limit();
        let mut best_in_limit: Option<Candidate> = None;
        let mut best_any: Option<Candidate> = None;

        for dims in orientations {
            let xs = axis_positions(self.dims.x, dims.x, self.config.grid_step, eps);
            let ys = axis_positions(self.dims.y, dims.y, self.config.grid_step, eps);

            for &z in &z_levels {
                if z + dims.z > self.dims.z + eps {
                    continue;
                }
                for &y in &ys {
                    if y + dims.y > self.dims.y + eps {
                        continue;
                    }
                    for &x in &xs {
                        if x + dims.x > self.dims.x + eps {
                            continue;
                        }

                        let candidate = PlacedCase {
                            case: case.clone(),
                            order_line: 0,
                            position: (x, y, z),
                            dims: dims.as_tuple(),
                            layer: 0,
                        };
                        if !self.is_stable(&candidate) {
                            continue;
                        }

                        let balance = self.balance_after(&candidate);
                        let score = PlacementScore { z, y, x, balance };
                        let position = Vec3::new(x, y, z);

                        keep_better(&mut best_any, (position, dims, score), self.config);
                        if balance <= balance_limit + eps {
                            keep_better(&mut best_in_limit, (position, dims, score), self.config);
                        }
                    }
                }
            }
        }

        best_in_limit
            .or(best_any)
            .map(|(position, dims, _)| (position, dims))
    }

    fn is_stable(&self, candidate: &PlacedCase) -> bool {
        if self.placed.iter().any(|p| intersects(p, candidate)) {
            return false;
        }
        if candidate.position.2 <= self.config.height_epsilon {
            return true;
        }
        // Overhangs whose centre of gravity is unsupported are rejected as well.
        self.has_sufficient_support(candidate)
            && self.respects_strength(candidate)
            && self.is_center_supported(candidate)
    }

    /// Cases directly below `candidate` whose top touches its bottom face.
    fn supporters<'s>(
        &'s self,
        candidate: &'s PlacedCase,
    ) -> impl Iterator<Item = (&'s PlacedCase, f64)> + 's {
        let (bx, by, bz) = candidate.position;
        let (bw, bd, _) = candidate.dims;
        self.placed.iter().filter_map(move |p| {
            if (bz - p.top_z()).abs() > self.config.height_epsilon {
                return None;
            }
            let over_x = overlap_1d(bx, bx + bw, p.position.0, p.position.0 + p.dims.0);
            let over_y = overlap_1d(by, by + bd, p.position.1, p.position.1 + p.dims.1);
            (over_x > 0.0 && over_y > 0.0).then_some((p, over_x * over_y))
        })
    }

    fn has_sufficient_support(&self, candidate: &PlacedCase) -> bool {
        let base_area = Vec3::from(candidate.dims).base_area();
        if base_area <= self.config.general_epsilon {
            return false;
        }
        let support_area: f64 = self.supporters(candidate).map(|(_, area)| area).sum();
        support_area / base_area >= self.config.support_ratio
    }

    /// A case must not rest on a weaker case.
    fn respects_strength(&self, candidate: &PlacedCase) -> bool {
        let mut supported = false;
        for (below, _) in self.supporters(candidate) {
            supported = true;
            if below.case.strength + self.config.general_epsilon < candidate.case.strength {
                return false;
            }
        }
        supported
    }

    fn is_center_supported(&self, candidate: &PlacedCase) -> bool {
        let center = candidate.base_center();
        self.placed.iter().any(|p| {
            (candidate.position.2 - p.top_z()).abs() <= self.config.height_epsilon
                && point_inside(center, p)
        })
    }

    /// Distance in the XY plane between the centre of mass including
    /// `candidate` and the pallet centre.
    fn balance_after(&self, candidate: &PlacedCase) -> f64 {
        let mut total = 0.0;
        let mut moment_x = 0.0;
        let mut moment_y = 0.0;
        for p in self.placed.iter().chain(std::iter::once(candidate)) {
            let w = p.case.weight;
            let (cx, cy, _) = p.base_center();
            total += w;
            moment_x += cx * w;
            moment_y += cy * w;
        }
        let center = self.dims * 0.5;
        ((moment_x / total - center.x).powi(2) + (moment_y / total - center.y).powi(2)).sqrt()
    }

    fn balance_limit(&self) -> f64 {
        let half = self.dims * 0.5;
        (half.x.powi(2) + half.y.powi(2)).sqrt() * self.config.balance_limit_ratio
    }
}

fn keep_better(best: &mut Option<Candidate>, candidate: Candidate, config: &PackingConfig) {
    let replace = match best {
        None => true,
        Some((_, _, current)) => candidate.2.beats(current, config),
    };
    if replace {
        *best = Some(candidate);
    }
}

/// Candidate offsets along one axis: a grid of `step` plus the far end.
fn axis_positions(container_len: f64, object_len: f64, step: f64, epsilon: f64) -> Vec<f64> {
    let max_pos = (container_len - object_len).max(0.0);
    if max_pos <= epsilon {
        return vec![0.0];
    }

    let mut positions = Vec::new();
    let mut pos = 0.0;
    while pos <= max_pos + epsilon {
        positions.push(pos.min(max_pos));
        pos += step;
    }
    if positions
        .last()
        .is_none_or(|&last| (last - max_pos).abs() > epsilon)
    {
        positions.push(max_pos);
    }
    positions.dedup_by(|a, b| (*a - *b).abs() < epsilon);
    positions
}

fn compare_with_epsilon(a: f64, b: f64, eps: f64) -> Ordering {
    if (a - b).abs() <= eps {
        Ordering::Equal
    } else if a < b {
        Ordering::Less
    } else {
        Ordering::Greater
    }
}
