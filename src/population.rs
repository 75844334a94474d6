use cgmath::Point3;
use log::{debug, info};
use rand::Rng;
use rodio::OutputStreamHandle;
use std::collections::HashMap;
use std::sync::Arc;

use crate::assets::{AudioSource, ModelLoadQueue, ModelSource, SceneSink, ScreamBufferCache};
use crate::audio::{AudioEngine, Listener, ScreamVoice};
use crate::creeper::{Creeper, CreeperParams, LoadStatus, DEFAULT_SPAWN_DELAY};
use crate::player::PlayerState;
use crate::world::{cell_rng, xz_distance, CellKey, Forest};

/// Creeper spawn grid, independent of the forest grid.
pub const CREEPER_CELL_SIZE: f32 = 40.0;
pub const CREEPER_VIEW_DISTANCE: f32 = 150.0;
pub const CREEPER_DENSITY: f64 = 0.12;
pub const MAX_CREEPERS: usize = 10;
/// Creepers never spawn closer than this to the start or to the player.
pub const MIN_SPAWN_DISTANCE: f32 = 40.0;

const DESPAWN_FACTOR: f32 = 1.5;
const TREE_CLEARANCE: f32 = 3.0;
const SPAWN_ATTEMPTS: usize = 4;
const CREEPER_SALT: u64 = 7;

const DETECTION_RANGE_MIN: f32 = 38.0;
const DETECTION_RANGE_MAX: f32 = 50.0;
const FADE_DELAY_MIN: f32 = 0.5;
const FADE_DELAY_MAX: f32 = 2.0;

#[derive(Clone, Copy, Debug)]
pub struct PopulationParams {
    pub cell_size: f32,
    pub view_distance: f32,
    pub density: f64,
    pub max_creepers: usize,
    pub min_spawn_distance: f32,
    pub base_spawn_delay: f32,
}

impl Default for PopulationParams {
    fn default() -> Self {
        Self {
            cell_size: CREEPER_CELL_SIZE,
            view_distance: CREEPER_VIEW_DISTANCE,
            density: CREEPER_DENSITY,
            max_creepers: MAX_CREEPERS,
            min_spawn_distance: MIN_SPAWN_DISTANCE,
            base_spawn_delay: DEFAULT_SPAWN_DELAY,
        }
    }
}

/// The shared asset machinery, owned explicitly and passed by reference
/// instead of living in module globals: the one-at-a-time model load
/// queue and the load-once scream buffer.
pub struct AssetServices {
    pub model_queue: ModelLoadQueue,
    pub scream_cache: ScreamBufferCache,
    pub audio_source: Arc<dyn AudioSource>,
}

impl AssetServices {
    pub fn new(
        model_source: Arc<dyn ModelSource>,
        audio_source: Arc<dyn AudioSource>,
        model_name: &str,
        scream_name: &str,
    ) -> Self {
        Self {
            model_queue: ModelLoadQueue::new(model_source, model_name),
            scream_cache: ScreamBufferCache::new(Arc::clone(&audio_source), scream_name),
            audio_source,
        }
    }
}

/// Maintains a bounded, spatially local set of creepers as the player
/// moves: deterministic per-cell spawn rolls, lazy model loading through
/// the queue, despawn once a cell falls far enough behind.
pub struct CreeperPopulation {
    params: PopulationParams,
    creepers: Vec<Creeper>,
    /// Occupied spawn cells. Removed on despawn, so a revisited cell can
    /// roll (deterministically) again.
    cells: HashMap<CellKey, u32>,
    next_id: u32,
    output: Option<OutputStreamHandle>,
    /// Closest creeper distance in the ground plane, from the last update.
    pub closest_distance: Option<f32>,
}

impl CreeperPopulation {
    pub fn new(params: PopulationParams, engine: Option<&AudioEngine>) -> Self {
        Self {
            params,
            creepers: Vec::new(),
            cells: HashMap::new(),
            next_id: 0,
            output: engine.map(AudioEngine::handle),
            closest_distance: None,
        }
    }

    /// Spawn the designated main creeper on a ring around the start
    /// position. It belongs to no cell and never despawns.
    pub fn spawn_main(
        &mut self,
        start: Point3<f32>,
        services: &mut AssetServices,
    ) -> u32 {
        let mut rng = rand::thread_rng();
        let angle = rng.gen_range(0.0..std::f32::consts::TAU);
        let distance = rng.gen_range(30.0..50.0);
        let position = Point3::new(
            start.x + angle.cos() * distance,
            0.0,
            start.z + angle.sin() * distance,
        );
        let id = self.allocate_id();
        let mut creeper = Creeper::new(
            id,
            position,
            CreeperParams::default(),
            ScreamVoice::new(self.output.clone()),
        );
        creeper.is_main = true;
        creeper.load_status = LoadStatus::Loading;
        services.model_queue.enqueue(id);
        services.scream_cache.request();
        info!("main creeper #{id} placed {distance:.0} units from start");
        self.creepers.push(creeper);
        id
    }

    /// One frame: resolve finished loads, scan spawn cells, update every
    /// agent in insertion order, despawn far cells, then aggregate danger
    /// so heartbeat consumers see this frame's positions.
    pub fn update(
        &mut self,
        dt: f32,
        listener: &Listener,
        player: &PlayerState,
        forest: &Forest,
        services: &mut AssetServices,
        scene: &mut dyn SceneSink,
    ) {
        for (id, result) in services.model_queue.update(dt) {
            match self.creepers.iter_mut().find(|c| c.id == id) {
                Some(creeper) => {
                    creeper.attach_model(result);
                    if let Some(figure) = &creeper.figure {
                        scene.add(id, figure);
                    }
                }
                // The owning cell despawned while the load was in flight;
                // the result is simply discarded.
                None => debug!("discarding model load for despawned creeper #{id}"),
            }
        }

        self.scan_cells(listener.position, forest, services);

        for creeper in &mut self.creepers {
            creeper.poll_scream_buffer(&services.scream_cache, &services.audio_source);
            creeper.update(dt, player, listener, forest);
        }

        self.despawn_far_cells(listener.position, scene);

        self.closest_distance = self
            .creepers
            .iter()
            .map(|c| xz_distance(c.position, listener.position))
            .min_by(|a, b| a.total_cmp(b));
    }

    fn scan_cells(
        &mut self,
        player_pos: Point3<f32>,
        forest: &Forest,
        services: &mut AssetServices,
    ) {
        let cell_size = self.params.cell_size;
        let pgx = (player_pos.x / cell_size).floor() as i32;
        let pgz = (player_pos.z / cell_size).floor() as i32;
        let range = (self.params.view_distance / cell_size).ceil() as i32;

        for gx in (pgx - range)..=(pgx + range) {
            for gz in (pgz - range)..=(pgz + range) {
                if self.creepers.len() >= self.params.max_creepers {
                    return;
                }
                let key = (gx, gz);
                if self.cells.contains_key(&key) {
                    continue;
                }

                let center = Point3::new(
                    gx as f32 * cell_size + cell_size * 0.5,
                    0.0,
                    gz as f32 * cell_size + cell_size * 0.5,
                );
                if xz_distance(center, player_pos) > self.params.view_distance {
                    continue;
                }
                // Keep spawns away from both the start area and wherever
                // the player currently is.
                if xz_distance(center, Point3::new(0.0, 0.0, 0.0)) < self.params.min_spawn_distance
                    || xz_distance(center, player_pos) < self.params.min_spawn_distance
                {
                    continue;
                }

                let mut rng = cell_rng(gx, gz, CREEPER_SALT);
                if rng.gen::<f64>() >= self.params.density {
                    continue;
                }

                let mut spawned = false;
                for _ in 0..SPAWN_ATTEMPTS {
                    let position = Point3::new(
                        center.x + (rng.gen::<f32>() - 0.5) * cell_size,
                        0.0,
                        center.z + (rng.gen::<f32>() - 0.5) * cell_size,
                    );
                    if forest.tree_within(position, TREE_CLEARANCE) {
                        continue;
                    }
                    if xz_distance(position, player_pos) < self.params.min_spawn_distance
                        || xz_distance(position, Point3::new(0.0, 0.0, 0.0))
                            < self.params.min_spawn_distance
                    {
                        continue;
                    }
                    self.spawn_in_cell(key, position, services);
                    spawned = true;
                    break;
                }
                if !spawned {
                    // All attempts landed in trees or too close; skip the
                    // cell silently. The deterministic roll repeats the
                    // same outcome if it is ever re-evaluated.
                    debug!("no clear spawn position in cell {key:?}");
                }
            }
        }
    }

    fn spawn_in_cell(
        &mut self,
        cell: CellKey,
        position: Point3<f32>,
        services: &mut AssetServices,
    ) {
        let mut rng = rand::thread_rng();
        let fade_delay = rng.gen_range(FADE_DELAY_MIN..FADE_DELAY_MAX);
        let params = CreeperParams {
            detection_range: rng.gen_range(DETECTION_RANGE_MIN..DETECTION_RANGE_MAX),
            // Detection can never activate before the model is even
            // visible, so the fade delay is folded into the spawn delay.
            spawn_delay: self.params.base_spawn_delay + fade_delay,
            fade_delay,
            initially_visible: false,
            initial_opacity: 0.0,
            ..CreeperParams::default()
        };
        let id = self.allocate_id();
        let mut creeper = Creeper::new(id, position, params, ScreamVoice::new(self.output.clone()));
        creeper.home_cell = Some(cell);
        creeper.load_status = LoadStatus::Loading;
        services.model_queue.enqueue(id);
        services.scream_cache.request();
        info!(
            "creeper #{id} spawned in cell {cell:?} at ({:.0}, {:.0}), {} active",
            position.x,
            position.z,
            self.creepers.len() + 1
        );
        self.cells.insert(cell, id);
        self.creepers.push(creeper);
    }

    fn despawn_far_cells(&mut self, player_pos: Point3<f32>, scene: &mut dyn SceneSink) {
        let limit = self.params.view_distance * DESPAWN_FACTOR;
        let cell_size = self.params.cell_size;
        let cells = &mut self.cells;
        self.creepers.retain(|creeper| {
            let Some(cell) = creeper.home_cell else {
                return true;
            };
            let center = Point3::new(
                cell.0 as f32 * cell_size + cell_size * 0.5,
                0.0,
                cell.1 as f32 * cell_size + cell_size * 0.5,
            );
            if xz_distance(center, player_pos) <= limit {
                return true;
            }
            info!("creeper #{} despawned (cell {cell:?} out of range)", creeper.id);
            scene.remove(creeper.id);
            cells.remove(&cell);
            false
        });
    }

    fn allocate_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Snapshot of every creeper's ground position, for the radar.
    pub fn creeper_positions(&self) -> HashMap<u32, (f32, f32)> {
        self.creepers
            .iter()
            .map(|c| (c.id, (c.position.x, c.position.z)))
            .collect()
    }

    pub fn creepers(&self) -> &[Creeper] {
        &self.creepers
    }

    pub fn creeper_mut(&mut self, id: u32) -> Option<&mut Creeper> {
        self.creepers.iter_mut().find(|c| c.id == id)
    }

    pub fn len(&self) -> usize {
        self.creepers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.creepers.is_empty()
    }

    /// Debug command: force the creeper nearest the player into a chase.
    pub fn force_chase_nearest(&mut self, player_pos: Point3<f32>) {
        if let Some(creeper) = self
            .creepers
            .iter_mut()
            .min_by(|a, b| {
                xz_distance(a.position, player_pos).total_cmp(&xz_distance(b.position, player_pos))
            })
        {
            creeper.force_chase(player_pos);
        }
    }

    /// Debug command: make the nearest creeper scream (cooldown permitting).
    pub fn scream_nearest(&mut self, listener: &Listener) {
        if let Some(creeper) = self.creepers.iter_mut().min_by(|a, b| {
            xz_distance(a.position, listener.position)
                .total_cmp(&xz_distance(b.position, listener.position))
        }) {
            creeper.trigger_scream(listener);
        }
    }

    /// Debug command: one status line per creeper.
    pub fn list(&self, listener: &Listener) -> Vec<String> {
        self.creepers
            .iter()
            .map(|c| c.status_line(listener))
            .collect()
    }
}
