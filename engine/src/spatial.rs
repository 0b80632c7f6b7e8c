//! Pure grid geometry: distance, area-of-effect shapes, line of sight and pathfinding.
//!
//! Nothing here holds state. Shape enumerations come back in row-major
//! order (y ascending, then x ascending) so repeated calls are identical.

use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeSet, BinaryHeap, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EngineError, Result};

const EPSILON: f64 = 1e-9;
/// Largest radius/length an area shape may have.
pub const MAX_AOE_EXTENT: f64 = 1000.0;
pub const DEFAULT_MAX_ITERATIONS: usize = 10_000;
/// The grid spans `-MAX_COORD..=MAX_COORD` on both axes.
pub const MAX_COORD: i32 = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Reject NaN/infinite or off-grid coordinates, naming the argument.
    pub fn validate(&self, name: &str) -> Result<()> {
        if !self.x.is_finite() || !self.y.is_finite() {
            return Err(EngineError::validation(
                name,
                format!("coordinates must be finite, got ({}, {})", self.x, self.y),
            ));
        }
        let bound = f64::from(MAX_COORD);
        if self.x.abs() > bound || self.y.abs() > bound {
            return Err(EngineError::validation(
                name,
                format!("({}, {}) lies outside ±{}", self.x, self.y, MAX_COORD),
            ));
        }
        Ok(())
    }

    /// Nearest grid tile.
    pub fn to_tile(self) -> Tile {
        Tile::new(self.x.round() as i32, self.y.round() as i32)
    }
}

impl From<Tile> for Point {
    fn from(t: Tile) -> Self {
        Point::new(f64::from(t.x), f64::from(t.y))
    }
}

/// Integer grid square. Orders row-major: by `y`, then `x`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "TileRepr")]
pub struct Tile {
    pub x: i32,
    pub y: i32,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TileRepr {
    Key(String),
    Coords { x: i32, y: i32 },
}

impl TryFrom<TileRepr> for Tile {
    type Error = EngineError;

    fn try_from(repr: TileRepr) -> Result<Self> {
        let tile = match repr {
            TileRepr::Key(key) => return key.parse(),
            TileRepr::Coords { x, y } => Tile::new(x, y),
        };
        tile.validate("tile")?;
        Ok(tile)
    }
}

impl Tile {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// "x,y" tile key.
    pub fn key(&self) -> String {
        format!("{},{}", self.x, self.y)
    }

    pub fn in_bounds(&self) -> bool {
        (-MAX_COORD..=MAX_COORD).contains(&self.x) && (-MAX_COORD..=MAX_COORD).contains(&self.y)
    }

    pub fn validate(&self, name: &str) -> Result<()> {
        if !self.in_bounds() {
            return Err(EngineError::validation(
                name,
                format!("{} lies outside ±{}", self, MAX_COORD),
            ));
        }
        Ok(())
    }

    /// Saturates at the `i32` range; callers bound-check the result.
    pub fn offset(&self, dx: i32, dy: i32) -> Tile {
        Tile::new(self.x.saturating_add(dx), self.y.saturating_add(dy))
    }

    /// Grid steps between tiles when diagonals count as one step.
    pub fn chebyshev(&self, other: &Tile) -> u32 {
        self.x.abs_diff(other.x).max(self.y.abs_diff(other.y))
    }

    pub fn manhattan(&self, other: &Tile) -> u32 {
        self.x.abs_diff(other.x).saturating_add(self.y.abs_diff(other.y))
    }

    pub fn is_adjacent(&self, other: &Tile) -> bool {
        self != other && self.chebyshev(other) == 1
    }

    fn neighbors(&self, diagonal: bool) -> impl Iterator<Item = Tile> + '_ {
        static ORTHO: [(i32, i32); 4] = [(0, -1), (-1, 0), (1, 0), (0, 1)];
        static DIAG: [(i32, i32); 4] = [(-1, -1), (1, -1), (-1, 1), (1, 1)];
        let diag: &[(i32, i32)] = if diagonal { &DIAG } else { &[] };
        ORTHO
            .iter()
            .chain(diag.iter())
            .map(move |&(dx, dy)| self.offset(dx, dy))
            .filter(Tile::in_bounds)
    }
}

impl Ord for Tile {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.y, self.x).cmp(&(other.y, other.x))
    }
}

impl PartialOrd for Tile {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

impl FromStr for Tile {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        let bad = || EngineError::validation("tile", format!("expected \"x,y\" key, got '{}'", s));
        let (x, y) = s.split_once(',').ok_or_else(bad)?;
        let x = x.trim().parse().map_err(|_| bad())?;
        let y = y.trim().parse().map_err(|_| bad())?;
        let tile = Tile::new(x, y);
        tile.validate("tile")?;
        Ok(tile)
    }
}

/// Euclidean distance.
pub fn distance(p1: Point, p2: Point) -> Result<f64> {
    p1.validate("p1")?;
    p2.validate("p2")?;
    Ok((p1.x - p2.x).hypot(p1.y - p2.y))
}

fn validate_extent(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() {
        return Err(EngineError::validation(name, format!("must be finite, got {}", value)));
    }
    if value < 0.0 {
        return Err(EngineError::validation(name, format!("must be >= 0, got {}", value)));
    }
    if value > MAX_AOE_EXTENT {
        return Err(EngineError::validation(
            name,
            format!("must be <= {}, got {}", MAX_AOE_EXTENT, value),
        ));
    }
    Ok(())
}

/// Every tile within `radius` of the center tile, boundary inclusive.
///
/// The center snaps to its nearest tile first.
pub fn circle_tiles(center: Point, radius: f64) -> Result<Vec<Tile>> {
    center.validate("center")?;
    validate_extent("radius", radius)?;
    let c = center.to_tile();
    let r = radius.floor() as i32;
    let limit = radius * radius + EPSILON;

    let mut tiles = Vec::new();
    for y in (c.y - r)..=(c.y + r) {
        for x in (c.x - r)..=(c.x + r) {
            let dx = f64::from(x - c.x);
            let dy = f64::from(y - c.y);
            if dx * dx + dy * dy <= limit {
                tiles.push(Tile::new(x, y));
            }
        }
    }
    Ok(tiles)
}

/// Tiles inside a wedge of `angle_degrees` opening along `direction`, out to `length`.
///
/// The origin tile is always part of the cone.
pub fn cone_tiles(
    origin: Point,
    direction: Point,
    length: f64,
    angle_degrees: f64,
) -> Result<Vec<Tile>> {
    origin.validate("origin")?;
    direction.validate("direction")?;
    let norm = direction.x.hypot(direction.y);
    if norm < EPSILON {
        return Err(EngineError::validation("direction", "direction vector must be non-zero"));
    }
    validate_extent("length", length)?;
    if !angle_degrees.is_finite() || angle_degrees <= 0.0 || angle_degrees > 360.0 {
        return Err(EngineError::validation(
            "angle",
            format!("must be within (0, 360], got {}", angle_degrees),
        ));
    }

    let o = origin.to_tile();
    let (ux, uy) = (direction.x / norm, direction.y / norm);
    let half = angle_degrees.to_radians() / 2.0;
    let r = length.floor() as i32;

    let mut tiles = Vec::new();
    for y in (o.y - r)..=(o.y + r) {
        for x in (o.x - r)..=(o.x + r) {
            let t = Tile::new(x, y);
            if t == o {
                tiles.push(t);
                continue;
            }
            let dx = f64::from(x - o.x);
            let dy = f64::from(y - o.y);
            let d = dx.hypot(dy);
            if d > length + EPSILON {
                continue;
            }
            let cos = ((dx * ux + dy * uy) / d).clamp(-1.0, 1.0);
            if cos.acos() <= half + EPSILON {
                tiles.push(t);
            }
        }
    }
    Ok(tiles)
}

/// Bresenham rasterization from `a` to `b`, both endpoints included.
pub fn line_tiles(a: Tile, b: Tile) -> Result<Vec<Tile>> {
    a.validate("a")?;
    b.validate("b")?;
    // both ends are on the grid, so every delta below fits in i32
    let dx = (b.x - a.x).abs();
    let dy = -(b.y - a.y).abs();
    let sx = if a.x < b.x { 1 } else { -1 };
    let sy = if a.y < b.y { 1 } else { -1 };
    let mut err = dx + dy;
    let (mut x, mut y) = (a.x, a.y);

    let mut tiles = Vec::with_capacity(dx.max(-dy) as usize + 1);
    loop {
        tiles.push(Tile::new(x, y));
        if x == b.x && y == b.y {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
    Ok(tiles)
}

/// True unless an obstacle other than the endpoints sits on the rasterized line.
pub fn has_line_of_sight(a: Tile, b: Tile, obstacles: &BTreeSet<Tile>) -> Result<bool> {
    if a == b {
        return Ok(true);
    }
    Ok(line_tiles(a, b)?
        .iter()
        .filter(|t| **t != a && **t != b)
        .all(|t| !obstacles.contains(t)))
}

#[derive(Debug, Clone, Copy)]
pub struct PathOptions<'a> {
    pub max_iterations: usize,
    /// Entering one of these tiles costs two steps.
    pub difficult: Option<&'a BTreeSet<Tile>>,
    pub diagonal: bool,
}

impl Default for PathOptions<'_> {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            difficult: None,
            diagonal: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Path {
    /// Start to end, inclusive.
    pub tiles: Vec<Tile>,
    /// Movement cost in steps (difficult tiles count double).
    pub cost: u32,
    pub iterations: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathOutcome {
    Found(Path),
    Unreachable { iterations: usize },
    BudgetExhausted { iterations: usize },
}

impl PathOutcome {
    pub fn path(&self) -> Option<&Path> {
        match self {
            PathOutcome::Found(p) => Some(p),
            _ => None,
        }
    }

    pub fn into_path(self) -> Option<Path> {
        match self {
            PathOutcome::Found(p) => Some(p),
            _ => None,
        }
    }

    pub fn iterations(&self) -> usize {
        match self {
            PathOutcome::Found(p) => p.iterations,
            PathOutcome::Unreachable { iterations }
            | PathOutcome::BudgetExhausted { iterations } => *iterations,
        }
    }
}

/// Cost of entering `tile` in steps.
pub fn step_cost(tile: &Tile, difficult: Option<&BTreeSet<Tile>>) -> u32 {
    match difficult {
        Some(set) if set.contains(tile) => 2,
        _ => 1,
    }
}

/// A* over the unbounded grid, avoiding `obstacles`.
///
/// Each expanded node counts as one iteration; when the budget runs out
/// before reaching `end` the search gives up with `BudgetExhausted`.
pub fn find_path(
    start: Tile,
    end: Tile,
    obstacles: &BTreeSet<Tile>,
    options: &PathOptions<'_>,
) -> PathOutcome {
    if start == end {
        return PathOutcome::Found(Path {
            tiles: vec![start],
            cost: 0,
            iterations: 0,
        });
    }
    if obstacles.contains(&end) || !start.in_bounds() || !end.in_bounds() {
        return PathOutcome::Unreachable { iterations: 0 };
    }

    let heuristic = |t: &Tile| {
        if options.diagonal {
            t.chebyshev(&end)
        } else {
            t.manhattan(&end)
        }
    };

    let mut g: HashMap<Tile, u32> = HashMap::new();
    let mut prev: HashMap<Tile, Tile> = HashMap::new();
    let mut open: BinaryHeap<Reverse<(u32, u32, Tile)>> = BinaryHeap::new();
    g.insert(start, 0);
    open.push(Reverse((heuristic(&start), heuristic(&start), start)));

    let mut iterations = 0usize;
    while let Some(Reverse((f, h, current))) = open.pop() {
        let cost = g.get(&current).copied().unwrap_or(u32::MAX);
        if f != cost.saturating_add(h) {
            continue;
        }
        if current == end {
            let tiles = reconstruct(&prev, start, end);
            debug!(%start, %end, cost, iterations, "path found");
            return PathOutcome::Found(Path {
                tiles,
                cost,
                iterations,
            });
        }
        if iterations >= options.max_iterations {
            debug!(%start, %end, iterations, "path budget exhausted");
            return PathOutcome::BudgetExhausted { iterations };
        }
        iterations += 1;

        for next in current.neighbors(options.diagonal) {
            if obstacles.contains(&next) {
                continue;
            }
            let new_cost = cost.saturating_add(step_cost(&next, options.difficult));
            if new_cost < g.get(&next).copied().unwrap_or(u32::MAX) {
                g.insert(next, new_cost);
                prev.insert(next, current);
                let nh = heuristic(&next);
                open.push(Reverse((new_cost.saturating_add(nh), nh, next)));
            }
        }
    }

    PathOutcome::Unreachable { iterations }
}

fn reconstruct(prev: &HashMap<Tile, Tile>, start: Tile, end: Tile) -> Vec<Tile> {
    let mut tiles = vec![end];
    let mut cur = end;
    while cur != start {
        match prev.get(&cur) {
            Some(p) => {
                cur = *p;
                tiles.push(cur);
            }
            None => break,
        }
    }
    tiles.reverse();
    tiles
}
