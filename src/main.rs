use cgmath::Point3;
use log::{debug, info};
use std::collections::HashMap;
use std::io::BufRead;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use nightwood::assets::{
    AudioSource, ModelSource, NullModelSource, NullSceneSink, ProceduralAudioSource,
};
use nightwood::audio::{AudioEngine, HeartbeatLoop, HeartbeatMonitor, Listener};
use nightwood::lightning::{LightningManager, RadarSink};
use nightwood::player::Player;
use nightwood::population::{AssetServices, CreeperPopulation, PopulationParams};
use nightwood::world::Forest;

const OBJECTIVE_POSITION: (f32, f32) = (350.0, 350.0);
const OBJECTIVE_RADIUS: f32 = 8.0;

/// Radar stand-in for the headless build: just reports reveals.
struct LogRadar {
    revealed: usize,
}

impl RadarSink for LogRadar {
    fn on_lightning_flash(&mut self, positions: &HashMap<u32, (f32, f32)>) {
        self.revealed = positions.len();
        info!("lightning flash: {} creepers on the radar", self.revealed);
    }

    fn on_lightning_end(&mut self) {
        debug!("lightning over, radar fading");
    }
}

fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

fn main() {
    env_logger::init();

    let mut forest = Forest::new(rand::random());
    let start = Point3::new(0.0, 0.0, 10.0);
    let mut player = Player::new(start);
    forest.update_cells(player.position);

    let engine = AudioEngine::new();
    let model_source: Arc<dyn ModelSource> = Arc::new(NullModelSource);
    let audio_source: Arc<dyn AudioSource> = Arc::new(ProceduralAudioSource::default());
    let mut services = AssetServices::new(model_source, audio_source, "runner.glb", "scream.wav");
    let mut scene = NullSceneSink;

    let mut population = CreeperPopulation::new(PopulationParams::default(), engine.as_ref());
    population.spawn_main(start, &mut services);

    let mut lightning = LightningManager::new();
    let mut radar = LogRadar { revealed: 0 };
    let mut heartbeat = HeartbeatMonitor::default();
    let mut heartbeat_loop = HeartbeatLoop::new(engine.as_ref().map(AudioEngine::handle).as_ref());

    let commands = spawn_stdin_reader();
    println!("nightwood running. commands: status, list, chase, scream, crouch, stand,");
    println!("walk, run, sprint, move <x> <z>, quit");

    let mut last_frame = Instant::now();
    'game: loop {
        let now = Instant::now();
        let dt = (now - last_frame).as_secs_f32().min(0.1);
        last_frame = now;

        loop {
            match commands.try_recv() {
                Ok(line) => {
                    if !handle_command(&line, &mut player, &mut population) {
                        break 'game;
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => break 'game,
            }
        }

        player.update(dt, &forest);
        forest.update_cells(player.position);

        let listener = Listener {
            position: player.position,
            yaw: player.yaw,
        };
        population.update(
            dt,
            &listener,
            &player.state,
            &forest,
            &mut services,
            &mut scene,
        );

        let positions = population.creeper_positions();
        lightning.update(dt, &positions, &mut radar);

        heartbeat.update(dt, population.closest_distance);
        heartbeat_loop.update(&heartbeat);

        let dx = player.position.x - OBJECTIVE_POSITION.0;
        let dz = player.position.z - OBJECTIVE_POSITION.1;
        if (dx * dx + dz * dz).sqrt() <= OBJECTIVE_RADIUS {
            println!("you reached the objective. dawn breaks.");
            break;
        }

        thread::sleep(Duration::from_millis(16));
    }
}

/// Returns false when the loop should exit.
fn handle_command(line: &str, player: &mut Player, population: &mut CreeperPopulation) -> bool {
    let mut parts = line.split_whitespace();
    let listener = Listener {
        position: player.position,
        yaw: player.yaw,
    };
    match parts.next() {
        Some("quit") | Some("exit") => return false,
        Some("status") => {
            println!(
                "player at ({:.1}, {:.1}), {:?}, noise {:.2}, stamina {:.0}{}",
                player.position.x,
                player.position.z,
                player.state.stance,
                player.state.noise_level,
                player.stamina.current,
                if player.state.is_in_grass {
                    ", hidden in grass"
                } else {
                    ""
                },
            );
            println!(
                "{} creepers active, closest {}",
                population.len(),
                population
                    .closest_distance
                    .map_or("n/a".to_string(), |d| format!("{d:.1} units")),
            );
        }
        Some("list") => {
            for line in population.list(&listener) {
                println!("{line}");
            }
        }
        Some("chase") => population.force_chase_nearest(player.position),
        Some("scream") => population.scream_nearest(&listener),
        Some("crouch") => player.input.crouch = true,
        Some("stand") => player.input.crouch = false,
        Some("walk") => player.input.forward = !player.input.forward,
        Some("run") => player.input.run = !player.input.run,
        Some("sprint") => player.input.sprint = !player.input.sprint,
        Some("move") => {
            let x = parts.next().and_then(|v| v.parse::<f32>().ok());
            let z = parts.next().and_then(|v| v.parse::<f32>().ok());
            if let (Some(x), Some(z)) = (x, z) {
                player.position = Point3::new(x, 0.0, z);
                println!("teleported to ({x:.1}, {z:.1})");
            } else {
                println!("usage: move <x> <z>");
            }
        }
        Some(other) => println!("unknown command: {other}"),
        None => {}
    }
    true
}
