use cgmath::Point3;
use noise::{NoiseFn, Perlin};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;

/// Side length of one forest grid cell.
pub const GRID_SIZE: f32 = 10.0;
/// Cells whose center is within this distance of the player are populated.
pub const VIEW_DISTANCE: f32 = 150.0;
/// Cells farther than this factor times the view distance are unloaded.
pub const UNLOAD_FACTOR: f32 = 1.5;

pub const TREE_DENSITY: f64 = 0.45;
pub const ROCK_DENSITY: f64 = 0.05;
pub const TALL_GRASS_DENSITY: f64 = 0.5;

// Extra clearance around obstacle radii when testing player collision.
const PLAYER_CLEARANCE: f32 = 1.0;

// Salts keep the tree/rock/grass rolls for the same cell independent.
const TREE_SALT: u64 = 1;
const ROCK_SALT: u64 = 2;
const GRASS_SALT: u64 = 3;

pub type CellKey = (i32, i32);

/// Grid cell containing a world-space position.
pub fn cell_key(x: f32, z: f32, cell_size: f32) -> CellKey {
    (
        (x / cell_size).floor() as i32,
        (z / cell_size).floor() as i32,
    )
}

/// Deterministic per-cell RNG. The same cell always rolls the same
/// results, so regenerating a cell after unloading it reproduces the
/// original layout no matter what path the player took.
pub fn cell_rng(gx: i32, gz: i32, salt: u64) -> StdRng {
    let hash = (gx as i64).wrapping_mul(73_856_093) ^ (gz as i64).wrapping_mul(19_349_663);
    StdRng::seed_from_u64((hash as u64).wrapping_add(salt.wrapping_mul(0x9E37_79B9)))
}

/// A static occluder: trees and rocks share this shape. The radius is used
/// both for collision and for line-of-sight occlusion.
#[derive(Clone, Copy, Debug)]
pub struct Obstacle {
    pub position: Point3<f32>,
    pub radius: f32,
}

/// A patch of tall grass the player can hide in. No collision.
#[derive(Clone, Copy, Debug)]
pub struct GrassPatch {
    pub position: Point3<f32>,
    pub radius: f32,
}

/// Grid-keyed static world content around the player: the obstacle index
/// queried by creeper raycasts and player collision, plus tall grass for
/// stealth. Cells are generated at most once while loaded; the per-cell
/// rolls are pure functions of the cell coordinates.
pub struct Forest {
    pub trees: HashMap<CellKey, Obstacle>,
    pub rocks: HashMap<CellKey, Obstacle>,
    pub tall_grass: HashMap<CellKey, GrassPatch>,
    density_field: Perlin,
}

impl Forest {
    pub fn new(seed: u32) -> Self {
        Self {
            trees: HashMap::new(),
            rocks: HashMap::new(),
            tall_grass: HashMap::new(),
            density_field: Perlin::new(seed),
        }
    }

    /// Populate cells near the player and drop cells far behind them.
    pub fn update_cells(&mut self, player_pos: Point3<f32>) {
        let (pgx, pgz) = cell_key(player_pos.x, player_pos.z, GRID_SIZE);
        let range = (VIEW_DISTANCE / GRID_SIZE).ceil() as i32;

        for gx in (pgx - range)..=(pgx + range) {
            for gz in (pgz - range)..=(pgz + range) {
                let center = cell_center(gx, gz);
                let dx = center.0 - player_pos.x;
                let dz = center.1 - player_pos.z;
                if (dx * dx + dz * dz).sqrt() <= VIEW_DISTANCE {
                    self.generate_cell(gx, gz);
                }
            }
        }

        let limit = VIEW_DISTANCE * UNLOAD_FACTOR;
        let keep = |key: &CellKey| {
            let center = cell_center(key.0, key.1);
            let dx = center.0 - player_pos.x;
            let dz = center.1 - player_pos.z;
            (dx * dx + dz * dz).sqrt() <= limit
        };
        self.trees.retain(|key, _| keep(key));
        self.rocks.retain(|key, _| keep(key));
        self.tall_grass.retain(|key, _| keep(key));
    }

    /// Roll the content of one cell. Idempotent: a loaded cell is never
    /// regenerated, and the rolls are deterministic per cell.
    pub fn generate_cell(&mut self, gx: i32, gz: i32) {
        let key = (gx, gz);

        if !self.trees.contains_key(&key) {
            let mut rng = cell_rng(gx, gz, TREE_SALT);
            // Smooth density field makes dense groves and open clearings
            // instead of uniform scatter.
            let field = self
                .density_field
                .get([f64::from(gx) * 0.11 + 0.37, f64::from(gz) * 0.11 + 0.37]);
            let density = (TREE_DENSITY * (1.0 + 0.4 * field)).clamp(0.0, 1.0);
            if rng.gen::<f64>() < density {
                let (x, z) = jitter_in_cell(gx, gz, &mut rng);
                self.trees.insert(
                    key,
                    Obstacle {
                        position: Point3::new(x, 0.0, z),
                        radius: 1.5 + rng.gen::<f32>() * 1.5,
                    },
                );
            }
        }

        if !self.rocks.contains_key(&key) {
            let mut rng = cell_rng(gx, gz, ROCK_SALT);
            if rng.gen::<f64>() < ROCK_DENSITY {
                let (x, z) = jitter_in_cell(gx, gz, &mut rng);
                self.rocks.insert(
                    key,
                    Obstacle {
                        position: Point3::new(x, 0.0, z),
                        radius: 1.0 + rng.gen::<f32>() * 2.0,
                    },
                );
            }
        }

        if !self.tall_grass.contains_key(&key) {
            let mut rng = cell_rng(gx, gz, GRASS_SALT);
            if rng.gen::<f64>() < TALL_GRASS_DENSITY {
                let (x, z) = jitter_in_cell(gx, gz, &mut rng);
                self.tall_grass.insert(
                    key,
                    GrassPatch {
                        position: Point3::new(x, 0.0, z),
                        radius: 4.0 + rng.gen::<f32>() * 3.0,
                    },
                );
            }
        }
    }

    pub fn tree_obstacles(&self) -> impl Iterator<Item = &Obstacle> {
        self.trees.values()
    }

    pub fn rock_obstacles(&self) -> impl Iterator<Item = &Obstacle> {
        self.rocks.values()
    }

    /// Player collision test over the 3x3 cell neighborhood.
    pub fn is_position_blocked(&self, position: Point3<f32>) -> bool {
        let (gx, gz) = cell_key(position.x, position.z, GRID_SIZE);
        for dx in -1..=1 {
            for dz in -1..=1 {
                let key = (gx + dx, gz + dz);
                if let Some(tree) = self.trees.get(&key) {
                    if xz_distance(position, tree.position) < tree.radius + PLAYER_CLEARANCE {
                        return true;
                    }
                }
                if let Some(rock) = self.rocks.get(&key) {
                    if xz_distance(position, rock.position) < rock.radius + PLAYER_CLEARANCE {
                        return true;
                    }
                }
            }
        }
        false
    }

    /// Whether the position is inside a tall-grass patch.
    pub fn is_in_tall_grass(&self, position: Point3<f32>) -> bool {
        let (gx, gz) = cell_key(position.x, position.z, GRID_SIZE);
        for dx in -1..=1 {
            for dz in -1..=1 {
                if let Some(patch) = self.tall_grass.get(&(gx + dx, gz + dz)) {
                    if xz_distance(position, patch.position) < patch.radius {
                        return true;
                    }
                }
            }
        }
        false
    }

    /// Whether any tree sits within `clearance` of the position (measured
    /// to the trunk edge). Used to keep spawns out of the canopy.
    pub fn tree_within(&self, position: Point3<f32>, clearance: f32) -> bool {
        let (gx, gz) = cell_key(position.x, position.z, GRID_SIZE);
        let range = ((clearance + 3.0) / GRID_SIZE).ceil() as i32;
        for dx in -range..=range {
            for dz in -range..=range {
                if let Some(tree) = self.trees.get(&(gx + dx, gz + dz)) {
                    if xz_distance(position, tree.position) < tree.radius + clearance {
                        return true;
                    }
                }
            }
        }
        false
    }

    /// Nearest hit of the ground-plane ray `from -> to` against all loaded
    /// tree and rock occluders, treated as vertical cylinders. Returns the
    /// hit distance along the ray, or `None` when the line is clear.
    pub fn occlusion_hit(&self, from: Point3<f32>, to: Point3<f32>) -> Option<f32> {
        let dx = to.x - from.x;
        let dz = to.z - from.z;
        let length = (dx * dx + dz * dz).sqrt();
        if length <= f32::EPSILON {
            return None;
        }
        let dir = (dx / length, dz / length);

        let mut nearest: Option<f32> = None;
        for obstacle in self.tree_obstacles().chain(self.rock_obstacles()) {
            if let Some(t) = ray_circle_hit(
                (from.x, from.z),
                dir,
                (obstacle.position.x, obstacle.position.z),
                obstacle.radius,
                length,
            ) {
                if nearest.map_or(true, |n| t < n) {
                    nearest = Some(t);
                }
            }
        }
        nearest
    }
}

fn cell_center(gx: i32, gz: i32) -> (f32, f32) {
    (
        gx as f32 * GRID_SIZE + GRID_SIZE * 0.5,
        gz as f32 * GRID_SIZE + GRID_SIZE * 0.5,
    )
}

fn jitter_in_cell(gx: i32, gz: i32, rng: &mut StdRng) -> (f32, f32) {
    (
        gx as f32 * GRID_SIZE + (rng.gen::<f32>() - 0.5) * GRID_SIZE + GRID_SIZE * 0.5,
        gz as f32 * GRID_SIZE + (rng.gen::<f32>() - 0.5) * GRID_SIZE + GRID_SIZE * 0.5,
    )
}

pub fn xz_distance(a: Point3<f32>, b: Point3<f32>) -> f32 {
    let dx = a.x - b.x;
    let dz = a.z - b.z;
    (dx * dx + dz * dz).sqrt()
}

/// 2D ray/circle intersection. `dir` must be normalized; hits beyond
/// `max_t` are ignored. A ray starting inside the circle hits at 0.
fn ray_circle_hit(
    origin: (f32, f32),
    dir: (f32, f32),
    center: (f32, f32),
    radius: f32,
    max_t: f32,
) -> Option<f32> {
    let mx = center.0 - origin.0;
    let mz = center.1 - origin.1;
    let t_center = mx * dir.0 + mz * dir.1;
    if t_center < 0.0 {
        return None;
    }
    let closest_sq = mx * mx + mz * mz - t_center * t_center;
    if closest_sq > radius * radius {
        return None;
    }
    let thickness = (radius * radius - closest_sq).sqrt();
    let t = (t_center - thickness).max(0.0);
    if t <= max_t {
        Some(t)
    } else {
        None
    }
}
