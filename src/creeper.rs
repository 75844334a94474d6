use cgmath::{InnerSpace, Point3};
use log::{debug, info, warn};
use rand::rngs::ThreadRng;
use rand::Rng;
use std::sync::mpsc::Receiver;
use std::sync::Arc;

use crate::assets::{
    fallback_figure, fetch_clip_async, poll_fetch, AnimationClip, AssetError, AudioClip,
    AudioSource, BufferStatus, Figure, LoadedModel, ScreamBufferCache,
};
use crate::audio::{apply_scream_reverb, Listener, ScreamVoice};
use crate::player::{PlayerState, Stance};
use crate::world::{CellKey, Forest};

pub const DEFAULT_WANDER_SPEED: f32 = 2.0;
pub const DEFAULT_CHASE_SPEED: f32 = 8.0;
pub const DEFAULT_DETECTION_RANGE: f32 = 45.0;
pub const DEFAULT_SPAWN_DELAY: f32 = 15.0;

const WANDER_ARRIVE_DISTANCE: f32 = 2.0;
const WANDER_TIME_CAP: f32 = 8.0;
const WANDER_MIN_DISTANCE: f32 = 20.0;
const WANDER_MAX_DISTANCE: f32 = 50.0;
const STOP_THRESHOLD: f32 = 0.5;
// A hit this close to the player still counts as a clear line.
const OCCLUSION_SLACK: f32 = 2.0;
const FADE_DURATION: f32 = 1.5;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CreeperState {
    Idle,
    Wandering,
    Chasing,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum LoadStatus {
    Unloaded,
    Loading,
    Loaded,
    Fallback,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AnimationRole {
    Idle,
    Walk,
    Run,
}

const IDLE_NAMES: &[&str] = &["idle", "standing", "rest", "default"];
const WALK_NAMES: &[&str] = &["walk", "walking", "move", "forward"];
const RUN_NAMES: &[&str] = &["run", "running", "sprint", "fast"];

const CROSSFADE_SECONDS: f32 = 0.3;

/// Animation clips with their roles resolved once at load time. Unmapped
/// roles fall back to the first available clip.
pub struct AnimationSet {
    pub clips: Vec<AnimationClip>,
    roles: [Option<usize>; 3],
    current: Option<usize>,
    pub time: f32,
    pub time_scale: f32,
    crossfade_remaining: f32,
}

impl AnimationSet {
    pub fn resolve(clips: Vec<AnimationClip>) -> Self {
        let roles = [
            find_clip(&clips, IDLE_NAMES),
            find_clip(&clips, WALK_NAMES),
            find_clip(&clips, RUN_NAMES),
        ];
        Self {
            clips,
            roles,
            current: None,
            time: 0.0,
            time_scale: 1.0,
            crossfade_remaining: 0.0,
        }
    }

    pub fn clip_index_for(&self, role: AnimationRole) -> Option<usize> {
        self.roles[role as usize].or(if self.clips.is_empty() {
            None
        } else {
            Some(0)
        })
    }

    /// Switch to the clip mapped to `role`, crossfading when it changes.
    pub fn set_role(&mut self, role: AnimationRole, time_scale: f32) {
        self.time_scale = time_scale;
        let Some(index) = self.clip_index_for(role) else {
            return;
        };
        if self.current != Some(index) {
            debug!("switching to animation '{}'", self.clips[index].name);
            self.current = Some(index);
            self.time = 0.0;
            self.crossfade_remaining = CROSSFADE_SECONDS;
        }
    }

    pub fn advance(&mut self, dt: f32) {
        self.time += dt * self.time_scale;
        self.crossfade_remaining = (self.crossfade_remaining - dt).max(0.0);
    }

    pub fn current_clip(&self) -> Option<&AnimationClip> {
        self.current.and_then(|i| self.clips.get(i))
    }
}

/// Find a clip by priority list: exact lowercase match first, then a
/// suffix match so names like "Human Armature|Run" still resolve.
fn find_clip(clips: &[AnimationClip], names: &[&str]) -> Option<usize> {
    for name in names {
        if let Some(i) = clips.iter().position(|c| c.name.to_lowercase() == *name) {
            return Some(i);
        }
        let suffix = format!("|{name}");
        if let Some(i) = clips.iter().position(|c| {
            let lower = c.name.to_lowercase();
            lower.ends_with(&suffix) || lower.ends_with(name)
        }) {
            return Some(i);
        }
    }
    None
}

enum ScreamClipState {
    /// Waiting on the shared decode.
    WaitingShared,
    /// Shared decode failed; this agent is fetching its own copy.
    Fetching(Receiver<Result<AudioClip, AssetError>>),
    Ready(Arc<AudioClip>),
    /// Every acquisition path failed; this agent never screams.
    Missing,
}

#[derive(Clone, Copy, Debug)]
pub struct CreeperParams {
    pub wander_speed: f32,
    pub chase_speed: f32,
    pub detection_range: f32,
    /// Seconds after creation before detection can activate.
    pub spawn_delay: f32,
    /// Seconds after creation before the fade-in starts.
    pub fade_delay: f32,
    pub initially_visible: bool,
    pub initial_opacity: f32,
}

impl Default for CreeperParams {
    fn default() -> Self {
        Self {
            wander_speed: DEFAULT_WANDER_SPEED,
            chase_speed: DEFAULT_CHASE_SPEED,
            detection_range: DEFAULT_DETECTION_RANGE,
            spawn_delay: DEFAULT_SPAWN_DELAY,
            fade_delay: 0.0,
            initially_visible: true,
            initial_opacity: 1.0,
        }
    }
}

/// One stalking agent: its own position, state machine, detection state,
/// visual lifecycle and scream voice. Instances are independent except
/// for the shared obstacle index, player state and load queue.
pub struct Creeper {
    pub id: u32,
    pub is_main: bool,
    pub home_cell: Option<CellKey>,
    pub position: Point3<f32>,
    /// Facing, radians around Y.
    pub yaw: f32,

    pub state: CreeperState,
    /// Seconds since the last state transition.
    pub state_timer: f32,
    idle_time: f32,
    pub target_position: Point3<f32>,
    pub can_see_player: bool,
    pub detection_active: bool,
    pub is_moving: bool,

    pub wander_speed: f32,
    pub chase_speed: f32,
    pub detection_range: f32,
    pub spawn_delay: f32,
    elapsed: f32,

    pub load_status: LoadStatus,
    pub figure: Option<Figure>,
    pub animations: Option<AnimationSet>,
    pub visible: bool,
    pub opacity: f32,
    pub target_opacity: f32,
    fade_delay: f32,

    pub voice: ScreamVoice,
    scream_clip: ScreamClipState,
    rng: ThreadRng,
}

impl Creeper {
    pub fn new(id: u32, position: Point3<f32>, params: CreeperParams, voice: ScreamVoice) -> Self {
        let mut rng = rand::thread_rng();
        let chase_speed = if params.chase_speed > params.wander_speed {
            params.chase_speed
        } else {
            // Chasing slower than wandering is never intended.
            warn!(
                "creeper #{id}: chase speed {} <= wander speed {}, correcting",
                params.chase_speed, params.wander_speed
            );
            params.wander_speed * 2.0
        };
        let idle_time = rng.gen_range(3.0..7.0);
        Self {
            id,
            is_main: false,
            home_cell: None,
            position,
            yaw: rng.gen_range(0.0..std::f32::consts::TAU),
            state: CreeperState::Idle,
            state_timer: 0.0,
            idle_time,
            target_position: position,
            can_see_player: false,
            detection_active: false,
            is_moving: false,
            wander_speed: params.wander_speed,
            chase_speed,
            detection_range: params.detection_range,
            spawn_delay: params.spawn_delay,
            elapsed: 0.0,
            load_status: LoadStatus::Unloaded,
            figure: None,
            animations: None,
            visible: params.initially_visible,
            opacity: params.initial_opacity,
            target_opacity: 1.0,
            fade_delay: params.fade_delay,
            voice,
            scream_clip: ScreamClipState::WaitingShared,
            rng,
        }
    }

    /// One simulation tick. At most one state transition is evaluated.
    pub fn update(
        &mut self,
        dt: f32,
        player: &PlayerState,
        listener: &Listener,
        forest: &Forest,
    ) {
        self.elapsed += dt;
        self.state_timer += dt;

        let player_pos = listener.position;
        let distance = (player_pos - self.position).magnitude();

        if !self.detection_active && self.elapsed > self.spawn_delay {
            self.detection_active = true;
            info!("creeper #{} can now detect the player", self.id);
        }
        self.can_see_player =
            self.detection_active && self.check_line_of_sight(player_pos, player, forest);

        let chase_condition = self.can_see_player && distance < self.detection_range;
        match self.state {
            CreeperState::Chasing if !chase_condition => {
                // Lost sight or out of range: drop back to idle.
                self.state = CreeperState::Idle;
                self.state_timer = 0.0;
                self.idle_time = self.rng.gen_range(2.0..5.0);
                self.is_moving = false;
                self.voice.stop();
                debug!("creeper #{} lost sight of the player", self.id);
            }
            CreeperState::Idle | CreeperState::Wandering if chase_condition => {
                self.state = CreeperState::Chasing;
                self.state_timer = 0.0;
                info!("creeper #{} spotted the player, chasing", self.id);
                self.try_scream(listener);
                self.chase_tick(dt, player_pos, listener);
            }
            CreeperState::Chasing => self.chase_tick(dt, player_pos, listener),
            CreeperState::Idle => {
                self.is_moving = false;
                if self.state_timer > self.idle_time {
                    self.state = CreeperState::Wandering;
                    self.state_timer = 0.0;
                    self.target_position = self.random_wander_point();
                    debug!("creeper #{} starts wandering", self.id);
                }
            }
            CreeperState::Wandering => {
                let remaining = (self.target_position - self.position).magnitude();
                if remaining < WANDER_ARRIVE_DISTANCE || self.state_timer > WANDER_TIME_CAP {
                    self.state = CreeperState::Idle;
                    self.state_timer = 0.0;
                    self.idle_time = self.rng.gen_range(3.0..7.0);
                    self.is_moving = false;
                } else {
                    let target = self.target_position;
                    self.move_towards(target, self.wander_speed, dt);
                    self.face_towards(target);
                    self.is_moving = true;
                }
            }
        }

        self.update_fade(dt);
        self.update_animation(dt);
        self.voice.update(dt, self.position, listener);
    }

    fn chase_tick(&mut self, dt: f32, player_pos: Point3<f32>, listener: &Listener) {
        // Chase the ground projection, not the camera height.
        let target = Point3::new(player_pos.x, 0.0, player_pos.z);
        self.move_towards(target, self.chase_speed, dt);
        self.face_towards(target);
        self.is_moving = true;
        self.try_scream(listener);
    }

    /// Effective detection range after stealth modifiers.
    pub fn effective_detection_range(&self, player: &PlayerState) -> f32 {
        let mut range = self.detection_range;
        if player.stance == Stance::Crouching {
            range *= 0.5;
        }
        if player.is_in_grass && player.stance == Stance::Crouching {
            range *= 0.1;
        }
        range *= 1.0 + player.noise_level * 0.5;
        range
    }

    /// Line-of-sight check: range gate first, then an occlusion ray from
    /// one unit above the creeper toward the player.
    pub fn check_line_of_sight(
        &self,
        player_pos: Point3<f32>,
        player: &PlayerState,
        forest: &Forest,
    ) -> bool {
        let distance = (player_pos - self.position).magnitude();
        if distance > self.effective_detection_range(player) {
            return false;
        }
        let ray_origin = Point3::new(self.position.x, self.position.y + 1.0, self.position.z);
        if let Some(hit) = forest.occlusion_hit(ray_origin, player_pos) {
            if hit < distance - OCCLUSION_SLACK {
                return false;
            }
        }
        true
    }

    fn move_towards(&mut self, target: Point3<f32>, speed: f32, dt: f32) {
        let direction = target - self.position;
        let distance = direction.magnitude();
        if distance > STOP_THRESHOLD {
            // Clamp the step so a tick never overshoots the target.
            let step = (speed * dt).min(distance);
            self.position += direction * (step / distance);
        }
    }

    fn face_towards(&mut self, target: Point3<f32>) {
        let mut direction = target - self.position;
        direction.y = 0.0;
        if direction.magnitude2() > 0.0 {
            self.yaw = direction.x.atan2(direction.z);
        }
    }

    fn random_wander_point(&mut self) -> Point3<f32> {
        let angle = self.rng.gen_range(0.0..std::f32::consts::TAU);
        let distance = self.rng.gen_range(WANDER_MIN_DISTANCE..WANDER_MAX_DISTANCE);
        Point3::new(
            self.position.x + angle.cos() * distance,
            0.0,
            self.position.z + angle.sin() * distance,
        )
    }

    fn try_scream(&mut self, listener: &Listener) {
        if let ScreamClipState::Ready(clip) = &self.scream_clip {
            let clip = Arc::clone(clip);
            self.voice.try_play(&clip, self.position, listener);
        }
    }

    /// Advance scream-buffer acquisition: shared decode, then an
    /// individual fetch, then silence.
    pub fn poll_scream_buffer(&mut self, cache: &ScreamBufferCache, source: &Arc<dyn AudioSource>) {
        self.scream_clip = match std::mem::replace(&mut self.scream_clip, ScreamClipState::Missing)
        {
            ScreamClipState::WaitingShared => match cache.status() {
                BufferStatus::Ready(clip) => {
                    debug!("creeper #{} using shared scream buffer", self.id);
                    ScreamClipState::Ready(clip)
                }
                BufferStatus::Failed => {
                    warn!(
                        "creeper #{} shared scream buffer failed, fetching individually",
                        self.id
                    );
                    ScreamClipState::Fetching(fetch_clip_async(
                        Arc::clone(source),
                        cache.clip_name().to_string(),
                    ))
                }
                BufferStatus::Pending => ScreamClipState::WaitingShared,
            },
            ScreamClipState::Fetching(rx) => match poll_fetch(&rx) {
                None => ScreamClipState::Fetching(rx),
                Some(Ok(clip)) => {
                    debug!("creeper #{} loaded an individual scream buffer", self.id);
                    ScreamClipState::Ready(Arc::new(apply_scream_reverb(&clip)))
                }
                Some(Err(e)) => {
                    warn!("creeper #{} has no scream buffer ({e})", self.id);
                    ScreamClipState::Missing
                }
            },
            settled => settled,
        };
    }

    /// Used by tests and debug tooling to skip asset acquisition.
    pub fn set_scream_clip(&mut self, clip: Arc<AudioClip>) {
        self.scream_clip = ScreamClipState::Ready(clip);
    }

    pub fn has_scream_clip(&self) -> bool {
        matches!(self.scream_clip, ScreamClipState::Ready(_))
    }

    /// Resolve a finished model load. Failures produce the fallback
    /// figure so the agent never stays invisible forever.
    pub fn attach_model(&mut self, result: Result<LoadedModel, AssetError>) {
        match result {
            Ok(model) => {
                info!("creeper #{} model loaded", self.id);
                self.figure = Some(model.figure);
                self.animations = Some(AnimationSet::resolve(model.animations));
                self.load_status = LoadStatus::Loaded;
            }
            Err(e) => {
                warn!("creeper #{} model load failed ({e}), using fallback figure", self.id);
                self.figure = Some(fallback_figure());
                self.animations = None;
                self.load_status = LoadStatus::Fallback;
            }
        }
    }

    fn update_fade(&mut self, dt: f32) {
        if self.elapsed < self.fade_delay {
            return;
        }
        if !self.visible && self.target_opacity > 0.0 {
            self.visible = true;
        }
        if self.opacity < self.target_opacity {
            self.opacity = (self.opacity + dt / FADE_DURATION).min(self.target_opacity);
        }
    }

    fn update_animation(&mut self, dt: f32) {
        let Some(animations) = &mut self.animations else {
            return;
        };
        let (role, time_scale) = match self.state {
            CreeperState::Idle => (AnimationRole::Idle, 0.6),
            CreeperState::Wandering => (AnimationRole::Walk, 0.8),
            CreeperState::Chasing => (AnimationRole::Run, 1.8),
        };
        animations.set_role(role, time_scale);
        animations.advance(dt);
    }

    /// Debug command: teleport next to the player and start chasing.
    pub fn force_chase(&mut self, player_pos: Point3<f32>) {
        self.state = CreeperState::Chasing;
        self.state_timer = 0.0;
        self.position = Point3::new(player_pos.x + 15.0, 0.0, player_pos.z + 15.0);
        self.visible = true;
        info!("creeper #{} forced into chase", self.id);
    }

    /// Debug command: scream regardless of AI state (cooldown still holds).
    pub fn trigger_scream(&mut self, listener: &Listener) {
        self.try_scream(listener);
    }

    pub fn status_line(&self, listener: &Listener) -> String {
        let distance = (listener.position - self.position).magnitude();
        format!(
            "creeper #{}{}: {:?}, {:.1} units away, {}{}",
            self.id,
            if self.is_main { " (main)" } else { "" },
            self.state,
            distance,
            if self.visible { "visible" } else { "hidden" },
            if self.voice.is_screaming {
                ", screaming"
            } else {
                ""
            },
        )
    }
}
