use log::{debug, info, warn};
use rodio::{Decoder, Source};
use std::collections::VecDeque;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Mutex};
use std::thread;
use thiserror::Error;

use crate::audio;

/// Quiet period between two consecutive model loads, in seconds. Spreads
/// load-triggered hitches across frames when a burst of creepers spawns.
pub const LOAD_SETTLE_DELAY: f32 = 0.1;

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("asset not found: {0}")]
    NotFound(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode {0}")]
    Decode(String),
}

/// Decoded mono audio data.
#[derive(Clone, Debug)]
pub struct AudioClip {
    pub sample_rate: u32,
    pub samples: Vec<f32>,
}

impl AudioClip {
    pub fn duration(&self) -> f32 {
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

#[derive(Clone, Debug)]
pub struct AnimationClip {
    pub name: String,
    pub duration: f32,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FigureKind {
    Model,
    Fallback,
}

#[derive(Clone, Copy, Debug)]
pub enum PartShape {
    Cylinder {
        top_radius: f32,
        bottom_radius: f32,
        height: f32,
    },
    Cuboid {
        x: f32,
        y: f32,
        z: f32,
    },
    Sphere {
        radius: f32,
    },
}

#[derive(Clone, Copy, Debug)]
pub struct FigurePart {
    pub shape: PartShape,
    pub offset: [f32; 3],
}

/// A scene-graph-attachable creeper body. For real models only the ground
/// offset matters to the core; fallback figures carry their primitive
/// parts so a renderer can draw something.
#[derive(Clone, Debug)]
pub struct Figure {
    pub kind: FigureKind,
    pub ground_offset: f32,
    pub parts: Vec<FigurePart>,
}

#[derive(Clone, Debug)]
pub struct LoadedModel {
    pub figure: Figure,
    pub animations: Vec<AnimationClip>,
}

/// Substitute body used when the model load fails: a simple geometric
/// humanoid so the agent is never invisible forever.
pub fn fallback_figure() -> Figure {
    Figure {
        kind: FigureKind::Fallback,
        ground_offset: 0.0,
        parts: vec![
            FigurePart {
                shape: PartShape::Cylinder {
                    top_radius: 0.4,
                    bottom_radius: 0.5,
                    height: 2.2,
                },
                offset: [0.0, 1.1, 0.0],
            },
            FigurePart {
                shape: PartShape::Cuboid {
                    x: 0.4,
                    y: 0.4,
                    z: 0.4,
                },
                offset: [0.0, 2.6, 0.0],
            },
            FigurePart {
                shape: PartShape::Sphere { radius: 0.05 },
                offset: [-0.1, 2.7, 0.15],
            },
            FigurePart {
                shape: PartShape::Sphere { radius: 0.05 },
                offset: [0.1, 2.7, 0.15],
            },
            FigurePart {
                shape: PartShape::Cylinder {
                    top_radius: 0.1,
                    bottom_radius: 0.15,
                    height: 1.5,
                },
                offset: [-0.6, 1.5, 0.0],
            },
            FigurePart {
                shape: PartShape::Cylinder {
                    top_radius: 0.1,
                    bottom_radius: 0.15,
                    height: 1.5,
                },
                offset: [0.6, 1.5, 0.0],
            },
        ],
    }
}

/// Yields a creeper body plus its animation clips for a model identifier.
/// Loads run on a worker thread, so implementations may block.
pub trait ModelSource: Send + Sync {
    fn load_model(&self, name: &str) -> Result<LoadedModel, AssetError>;
}

/// Yields a decodable audio buffer for a sample identifier.
pub trait AudioSource: Send + Sync {
    fn load_clip(&self, name: &str) -> Result<AudioClip, AssetError>;
}

/// Where creeper visuals get inserted and removed. Rendering is somebody
/// else's problem.
pub trait SceneSink {
    fn add(&mut self, id: u32, figure: &Figure);
    fn remove(&mut self, id: u32);
}

pub struct NullSceneSink;

impl SceneSink for NullSceneSink {
    fn add(&mut self, _id: u32, _figure: &Figure) {}
    fn remove(&mut self, _id: u32) {}
}

/// A model source with nothing behind it. Every load fails, which pushes
/// all agents down the fallback-figure path.
pub struct NullModelSource;

impl ModelSource for NullModelSource {
    fn load_model(&self, name: &str) -> Result<LoadedModel, AssetError> {
        Err(AssetError::NotFound(name.to_string()))
    }
}

/// Reads wav files below a root directory and downmixes them to mono.
pub struct WavAudioSource {
    pub root: PathBuf,
}

impl AudioSource for WavAudioSource {
    fn load_clip(&self, name: &str) -> Result<AudioClip, AssetError> {
        let path = self.root.join(name);
        let file = File::open(&path).map_err(|source| AssetError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let decoder = Decoder::new(BufReader::new(file))
            .map_err(|e| AssetError::Decode(format!("{}: {e}", path.display())))?;
        let channels = decoder.channels() as usize;
        let sample_rate = decoder.sample_rate();
        let interleaved: Vec<f32> = decoder.convert_samples().collect();
        let samples = if channels <= 1 {
            interleaved
        } else {
            interleaved
                .chunks(channels)
                .map(|frame| frame.iter().sum::<f32>() / channels as f32)
                .collect()
        };
        if samples.is_empty() {
            return Err(AssetError::Decode(format!("{}: empty clip", path.display())));
        }
        Ok(AudioClip {
            sample_rate,
            samples,
        })
    }
}

/// Synthesizes a scream instead of reading one from disk. Used by the
/// headless binary so it works without any asset files.
pub struct ProceduralAudioSource {
    pub sample_rate: u32,
}

impl Default for ProceduralAudioSource {
    fn default() -> Self {
        Self { sample_rate: 44_100 }
    }
}

impl AudioSource for ProceduralAudioSource {
    fn load_clip(&self, _name: &str) -> Result<AudioClip, AssetError> {
        Ok(audio::synth_scream(self.sample_rate))
    }
}

type LoadResult = (u32, Result<LoadedModel, AssetError>);

/// Strict FIFO serializer for model loads: at most one load is in flight
/// process-wide, and a settle delay separates consecutive loads.
/// Completion is reported for failures too, so the queue never stalls.
pub struct ModelLoadQueue {
    source: Arc<dyn ModelSource>,
    model_name: String,
    pending: VecDeque<u32>,
    in_flight: Option<u32>,
    settle_remaining: f32,
    tx: Sender<LoadResult>,
    rx: Receiver<LoadResult>,
}

impl ModelLoadQueue {
    pub fn new(source: Arc<dyn ModelSource>, model_name: &str) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            source,
            model_name: model_name.to_string(),
            pending: VecDeque::new(),
            in_flight: None,
            settle_remaining: 0.0,
            tx,
            rx,
        }
    }

    /// Queue an agent for loading. Starts immediately when the queue is
    /// idle and settled.
    pub fn enqueue(&mut self, id: u32) {
        self.pending.push_back(id);
        self.start_next_if_idle();
    }

    /// Advance the settle timer, drain finished loads and kick off the
    /// next one. Called once per frame.
    pub fn update(&mut self, dt: f32) -> Vec<LoadResult> {
        self.settle_remaining = (self.settle_remaining - dt).max(0.0);

        let mut completed = Vec::new();
        while let Ok((id, result)) = self.rx.try_recv() {
            debug!(
                "model load for creeper #{id} finished ({} queued)",
                self.pending.len()
            );
            self.in_flight = None;
            self.settle_remaining = LOAD_SETTLE_DELAY;
            completed.push((id, result));
        }

        self.start_next_if_idle();
        completed
    }

    fn start_next_if_idle(&mut self) {
        if self.in_flight.is_some() || self.settle_remaining > 0.0 {
            return;
        }
        let Some(id) = self.pending.pop_front() else {
            return;
        };
        self.in_flight = Some(id);
        info!(
            "loading model for creeper #{id} ({} remaining in queue)",
            self.pending.len()
        );
        let source = Arc::clone(&self.source);
        let name = self.model_name.clone();
        let tx = self.tx.clone();
        thread::spawn(move || {
            let result = source.load_model(&name);
            // The queue may already be gone on shutdown.
            let _ = tx.send((id, result));
        });
    }

    pub fn in_flight(&self) -> Option<u32> {
        self.in_flight
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Observed state of the shared scream buffer.
#[derive(Clone)]
pub enum BufferStatus {
    Pending,
    Ready(Arc<AudioClip>),
    Failed,
}

enum CacheSlot {
    Idle,
    Loading,
    Ready(Arc<AudioClip>),
    Failed,
}

/// Load-once, share-forever cache for the scream sample. The first
/// requester triggers the fetch; everyone else observes the same
/// resolution. The decoded clip is reverb-processed once here so the
/// per-instance voices can share the result.
pub struct ScreamBufferCache {
    source: Arc<dyn AudioSource>,
    clip_name: String,
    slot: Arc<Mutex<CacheSlot>>,
}

impl ScreamBufferCache {
    pub fn new(source: Arc<dyn AudioSource>, clip_name: &str) -> Self {
        Self {
            source,
            clip_name: clip_name.to_string(),
            slot: Arc::new(Mutex::new(CacheSlot::Idle)),
        }
    }

    pub fn clip_name(&self) -> &str {
        &self.clip_name
    }

    /// Start the shared fetch if nobody has yet.
    pub fn request(&self) {
        let Ok(mut slot) = self.slot.lock() else {
            return;
        };
        if !matches!(*slot, CacheSlot::Idle) {
            return;
        }
        *slot = CacheSlot::Loading;
        info!("loading shared scream buffer");

        let source = Arc::clone(&self.source);
        let name = self.clip_name.clone();
        let shared = Arc::clone(&self.slot);
        thread::spawn(move || {
            let outcome = source.load_clip(&name);
            let Ok(mut slot) = shared.lock() else {
                return;
            };
            match outcome {
                Ok(clip) => {
                    info!("shared scream buffer loaded, reused by all creepers");
                    *slot = CacheSlot::Ready(Arc::new(audio::apply_scream_reverb(&clip)));
                }
                Err(e) => {
                    warn!("shared scream buffer failed: {e}");
                    *slot = CacheSlot::Failed;
                }
            }
        });
    }

    pub fn status(&self) -> BufferStatus {
        match self.slot.lock() {
            Ok(slot) => match &*slot {
                CacheSlot::Idle | CacheSlot::Loading => BufferStatus::Pending,
                CacheSlot::Ready(clip) => BufferStatus::Ready(Arc::clone(clip)),
                CacheSlot::Failed => BufferStatus::Failed,
            },
            Err(_) => BufferStatus::Failed,
        }
    }
}

/// Kick off an independent clip fetch on a worker thread. Used by agents
/// falling back to an individual load after the shared buffer failed.
pub fn fetch_clip_async(
    source: Arc<dyn AudioSource>,
    name: String,
) -> Receiver<Result<AudioClip, AssetError>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(source.load_clip(&name));
    });
    rx
}

/// Poll an in-flight individual fetch without blocking.
pub fn poll_fetch(
    rx: &Receiver<Result<AudioClip, AssetError>>,
) -> Option<Result<AudioClip, AssetError>> {
    match rx.try_recv() {
        Ok(result) => Some(result),
        Err(TryRecvError::Empty) => None,
        Err(TryRecvError::Disconnected) => Some(Err(AssetError::Decode(
            "fetch worker disappeared".to_string(),
        ))),
    }
}
