//! Creeper population manager tests

#[cfg(test)]
mod tests {
    use cgmath::Point3;
    use nightwood::assets::{
        AssetError, AudioClip, AudioSource, Figure, FigureKind, LoadedModel, ModelSource,
        SceneSink,
    };
    use nightwood::audio::Listener;
    use nightwood::creeper::LoadStatus;
    use nightwood::player::PlayerState;
    use nightwood::population::{
        AssetServices, CreeperPopulation, PopulationParams, MAX_CREEPERS, MIN_SPAWN_DISTANCE,
    };
    use nightwood::world::{xz_distance, Forest, Obstacle};
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    struct InstantModelSource;

    impl ModelSource for InstantModelSource {
        fn load_model(&self, _name: &str) -> Result<LoadedModel, AssetError> {
            Ok(LoadedModel {
                figure: Figure {
                    kind: FigureKind::Model,
                    ground_offset: 0.1,
                    parts: Vec::new(),
                },
                animations: Vec::new(),
            })
        }
    }

    struct FailingModelSource;

    impl ModelSource for FailingModelSource {
        fn load_model(&self, name: &str) -> Result<LoadedModel, AssetError> {
            Err(AssetError::NotFound(name.to_string()))
        }
    }

    struct TinyAudioSource;

    impl AudioSource for TinyAudioSource {
        fn load_clip(&self, _name: &str) -> Result<AudioClip, AssetError> {
            Ok(AudioClip {
                sample_rate: 8_000,
                samples: vec![0.1; 160],
            })
        }
    }

    #[derive(Default)]
    struct RecordingScene {
        added: Vec<u32>,
        removed: Vec<u32>,
    }

    impl SceneSink for RecordingScene {
        fn add(&mut self, id: u32, _figure: &Figure) {
            self.added.push(id);
        }
        fn remove(&mut self, id: u32) {
            self.removed.push(id);
        }
    }

    fn services(model: Arc<dyn ModelSource>) -> AssetServices {
        AssetServices::new(model, Arc::new(TinyAudioSource), "runner.glb", "scream.wav")
    }

    fn listener_at(x: f32, z: f32) -> Listener {
        Listener {
            position: Point3::new(x, 0.0, z),
            yaw: 0.0,
        }
    }

    fn dense_params() -> PopulationParams {
        PopulationParams {
            density: 1.0,
            ..PopulationParams::default()
        }
    }

    // -----------------------------------------------------------------------
    // Spawn invariants
    // -----------------------------------------------------------------------

    #[test]
    fn spawns_respect_the_minimum_distance_and_the_cap() {
        let forest = Forest::new(1);
        let mut population = CreeperPopulation::new(dense_params(), None);
        let mut services = services(Arc::new(InstantModelSource));
        let mut scene = RecordingScene::default();
        let listener = listener_at(500.0, 500.0);

        population.update(
            0.016,
            &listener,
            &PlayerState::default(),
            &forest,
            &mut services,
            &mut scene,
        );

        assert_eq!(population.len(), MAX_CREEPERS);
        for creeper in population.creepers() {
            assert!(
                xz_distance(creeper.position, listener.position) >= MIN_SPAWN_DISTANCE,
                "creeper #{} spawned {:.1} units from the player",
                creeper.id,
                xz_distance(creeper.position, listener.position)
            );
            assert_eq!(creeper.load_status, LoadStatus::Loading);
            assert!(!creeper.visible);
            assert_eq!(creeper.opacity, 0.0);
        }
    }

    #[test]
    fn spawns_keep_clear_of_the_world_origin() {
        let forest = Forest::new(1);
        let mut population = CreeperPopulation::new(dense_params(), None);
        let mut services = services(Arc::new(InstantModelSource));
        let mut scene = RecordingScene::default();
        let listener = listener_at(0.0, 0.0);

        population.update(
            0.016,
            &listener,
            &PlayerState::default(),
            &forest,
            &mut services,
            &mut scene,
        );

        assert!(!population.is_empty());
        let origin = Point3::new(0.0, 0.0, 0.0);
        for creeper in population.creepers() {
            assert!(xz_distance(creeper.position, origin) >= MIN_SPAWN_DISTANCE);
        }
    }

    #[test]
    fn cell_decisions_are_deterministic() {
        let forest = Forest::new(1);
        let listener = listener_at(500.0, 500.0);

        let mut cells_seen = Vec::new();
        for _ in 0..2 {
            let mut population = CreeperPopulation::new(dense_params(), None);
            let mut services = services(Arc::new(InstantModelSource));
            let mut scene = RecordingScene::default();
            population.update(
                0.016,
                &listener,
                &PlayerState::default(),
                &forest,
                &mut services,
                &mut scene,
            );
            let cells: Vec<_> = population
                .creepers()
                .iter()
                .filter_map(|c| c.home_cell)
                .collect();
            cells_seen.push(cells);
        }
        assert_eq!(cells_seen[0], cells_seen[1]);
    }

    #[test]
    fn tree_cover_blocks_every_spawn_attempt() {
        let mut forest = Forest::new(1);
        // Blanket the area in canopy: every world cell gets a fat trunk.
        for gx in 30..=70 {
            for gz in 30..=70 {
                forest.trees.insert(
                    (gx, gz),
                    Obstacle {
                        position: Point3::new(gx as f32 * 10.0 + 5.0, 0.0, gz as f32 * 10.0 + 5.0),
                        radius: 20.0,
                    },
                );
            }
        }

        let mut population = CreeperPopulation::new(dense_params(), None);
        let mut services = services(Arc::new(InstantModelSource));
        let mut scene = RecordingScene::default();
        population.update(
            0.016,
            &listener_at(500.0, 500.0),
            &PlayerState::default(),
            &forest,
            &mut services,
            &mut scene,
        );
        assert!(population.is_empty());
    }

    // -----------------------------------------------------------------------
    // Despawn
    // -----------------------------------------------------------------------

    #[test]
    fn far_cells_despawn_but_the_main_creeper_stays() {
        let forest = Forest::new(1);
        let mut population = CreeperPopulation::new(dense_params(), None);
        let mut services = services(Arc::new(InstantModelSource));
        let mut scene = RecordingScene::default();

        let start = Point3::new(500.0, 0.0, 500.0);
        let main_id = population.spawn_main(start, &mut services);

        population.update(
            0.016,
            &listener_at(500.0, 500.0),
            &PlayerState::default(),
            &forest,
            &mut services,
            &mut scene,
        );
        let spawned = population.len();
        assert!(spawned > 1);

        // The player leaves the area entirely; every cell-owned creeper
        // goes away, the main one survives.
        population.update(
            0.016,
            &listener_at(5000.0, 5000.0),
            &PlayerState::default(),
            &forest,
            &mut services,
            &mut scene,
        );
        assert_eq!(scene.removed.len(), spawned - 1);
        assert!(population
            .creepers()
            .iter()
            .any(|c| c.id == main_id && c.is_main));
        assert!(population
            .creepers()
            .iter()
            .all(|c| c.is_main || c.home_cell.is_some()));
    }

    // -----------------------------------------------------------------------
    // Load dispatch
    // -----------------------------------------------------------------------

    #[test]
    fn failed_loads_leave_fallback_figures_in_the_scene() {
        let forest = Forest::new(1);
        let mut population = CreeperPopulation::new(dense_params(), None);
        let mut services = services(Arc::new(FailingModelSource));
        let mut scene = RecordingScene::default();
        let listener = listener_at(500.0, 500.0);

        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            population.update(
                0.05,
                &listener,
                &PlayerState::default(),
                &forest,
                &mut services,
                &mut scene,
            );
            let all_resolved = !population.is_empty()
                && population
                    .creepers()
                    .iter()
                    .all(|c| c.load_status == LoadStatus::Fallback);
            if all_resolved {
                break;
            }
            assert!(Instant::now() < deadline, "loads never resolved");
            thread::sleep(Duration::from_millis(2));
        }

        assert_eq!(scene.added.len(), population.len());
        for creeper in population.creepers() {
            let figure = creeper.figure.as_ref().expect("figure attached");
            assert_eq!(figure.kind, FigureKind::Fallback);
            assert!(!figure.parts.is_empty());
        }
    }
}
