use cgmath::Point3;
use log::{debug, warn};
use rand::rngs::ThreadRng;
use rand::Rng;
use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, OutputStreamHandle, Sink, Source, SpatialSink};
use std::sync::Arc;
use thiserror::Error;

use crate::assets::AudioClip;

// Panner model: inverse distance falloff.
pub const SCREAM_REF_DISTANCE: f32 = 1.0;
pub const SCREAM_ROLLOFF: f32 = 1.5;

// Volume envelope: full volume inside the near radius, linear falloff to
// silence at the far radius.
pub const MIN_SCREAM_DISTANCE: f32 = 3.0;
pub const MAX_SCREAM_DISTANCE: f32 = 25.0;
pub const BASE_SCREAM_VOLUME: f32 = 6.0;

pub const MIN_SCREAM_INTERVAL: f32 = 2.0;
pub const MAX_SCREAM_INTERVAL: f32 = 5.0;

/// Screams quieter than this are skipped outright.
pub const AUDIBLE_THRESHOLD: f32 = 0.05;
/// A creeper this close has caught the player; the scream cuts out.
pub const CATCH_DISTANCE: f32 = 2.0;

const REVERB_SECONDS: f32 = 2.5;
const REVERB_DRY_MIX: f32 = 0.7;
const REVERB_WET_MIX: f32 = 0.3;
const REVERB_TAPS: usize = 64;

const EAR_OFFSET: f32 = 0.1;
const SCREAM_EMITTER_HEIGHT: f32 = 1.0;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("invalid playback rate {0}")]
    InvalidRate(f32),
}

/// Owns the output device. Absence of a device is not an error: every
/// consumer keeps running silently.
pub struct AudioEngine {
    _stream: OutputStream,
    handle: OutputStreamHandle,
}

impl AudioEngine {
    pub fn new() -> Option<Self> {
        match OutputStream::try_default() {
            Ok((stream, handle)) => Some(Self {
                _stream: stream,
                handle,
            }),
            Err(e) => {
                warn!("could not initialize audio output: {e}");
                None
            }
        }
    }

    pub fn handle(&self) -> OutputStreamHandle {
        self.handle.clone()
    }
}

/// The listening head: player position and facing.
#[derive(Clone, Copy, Debug)]
pub struct Listener {
    pub position: Point3<f32>,
    /// Facing, radians around Y.
    pub yaw: f32,
}

impl Listener {
    fn ear_positions(&self) -> ([f32; 3], [f32; 3]) {
        let right = (self.yaw.cos(), -self.yaw.sin());
        let left = [
            self.position.x - right.0 * EAR_OFFSET,
            self.position.y,
            self.position.z - right.1 * EAR_OFFSET,
        ];
        let right = [
            self.position.x + right.0 * EAR_OFFSET,
            self.position.y,
            self.position.z + right.1 * EAR_OFFSET,
        ];
        (left, right)
    }
}

/// Inverse-distance panner gain, reference distance 1, clamped at the
/// maximum scream distance.
pub fn inverse_distance_gain(distance: f32) -> f32 {
    let d = distance.clamp(SCREAM_REF_DISTANCE, MAX_SCREAM_DISTANCE);
    SCREAM_REF_DISTANCE / (SCREAM_REF_DISTANCE + SCREAM_ROLLOFF * (d - SCREAM_REF_DISTANCE))
}

/// Distance envelope for scream loudness: full inside the near radius,
/// linear to zero at the far radius, silent beyond.
pub fn scream_volume(distance: f32) -> f32 {
    if distance <= MIN_SCREAM_DISTANCE {
        BASE_SCREAM_VOLUME
    } else if distance <= MAX_SCREAM_DISTANCE {
        let falloff =
            1.0 - (distance - MIN_SCREAM_DISTANCE) / (MAX_SCREAM_DISTANCE - MIN_SCREAM_DISTANCE);
        BASE_SCREAM_VOLUME * falloff
    } else {
        0.0
    }
}

/// Impulse response of a medium-sized creepy space: exponentially decaying
/// noise with a sparse sparkle, about 2.5 seconds long.
pub fn render_reverb_impulse(sample_rate: u32, rng: &mut impl Rng) -> Vec<f32> {
    let length = (sample_rate as f32 * REVERB_SECONDS) as usize;
    let mut impulse = Vec::with_capacity(length);
    for i in 0..length {
        let decay = (1.0 - i as f32 / length as f32).powf(2.5);
        let noise = (rng.gen::<f32>() * 2.0 - 1.0) * 0.1;
        let sparkle = if rng.gen::<f32>() < 0.3 { 1.0 } else { 0.3 };
        impulse.push(noise * decay * sparkle);
    }
    impulse
}

/// Pre-render the reverb into a clip: sparse-tap convolution against the
/// synthetic impulse, mixed 70% dry / 30% wet. Done once per shared
/// buffer, never per scream.
pub fn apply_scream_reverb(clip: &AudioClip) -> AudioClip {
    let mut rng = rand::thread_rng();
    let impulse = render_reverb_impulse(clip.sample_rate, &mut rng);

    // Sample the impulse at evenly spaced taps and normalize their energy;
    // a full convolution would cost seconds of CPU for no audible gain.
    let mut taps: Vec<(usize, f32)> = (0..REVERB_TAPS)
        .map(|i| {
            let idx = (i + 1) * impulse.len() / (REVERB_TAPS + 1);
            (idx, impulse[idx])
        })
        .collect();
    let energy: f32 = taps.iter().map(|(_, g)| g.abs()).sum();
    if energy > f32::EPSILON {
        for (_, g) in &mut taps {
            *g /= energy;
        }
    }

    let tail = taps.last().map_or(0, |(idx, _)| *idx);
    let mut out = vec![0.0f32; clip.samples.len() + tail];
    for (i, &dry) in clip.samples.iter().enumerate() {
        out[i] += REVERB_DRY_MIX * dry;
    }
    for &(delay, gain) in &taps {
        for (i, &dry) in clip.samples.iter().enumerate() {
            out[i + delay] += REVERB_WET_MIX * gain * dry;
        }
    }

    AudioClip {
        sample_rate: clip.sample_rate,
        samples: out,
    }
}

/// Synthesized scream: a downward sine sweep buried in noise. Stand-in
/// asset for the headless binary.
pub fn synth_scream(sample_rate: u32) -> AudioClip {
    let mut rng = rand::thread_rng();
    let length = (sample_rate as f32 * 1.2) as usize;
    let mut samples = Vec::with_capacity(length);
    let mut phase = 0.0f32;
    for i in 0..length {
        let t = i as f32 / length as f32;
        let freq = 900.0 * (250.0f32 / 900.0).powf(t);
        phase += std::f32::consts::TAU * freq / sample_rate as f32;
        let envelope = if t < 0.05 { t / 0.05 } else { 1.0 - (t - 0.05) / 0.95 };
        let noise = rng.gen::<f32>() * 2.0 - 1.0;
        samples.push((phase.sin() * 0.6 + noise * 0.4) * envelope * 0.8);
    }
    AudioClip {
        sample_rate,
        samples,
    }
}

/// One heartbeat period (two thumps), loopable.
pub fn synth_heartbeat(sample_rate: u32) -> AudioClip {
    let period = 0.9f32;
    let length = (sample_rate as f32 * period) as usize;
    let mut samples = vec![0.0f32; length];
    for (start, amplitude) in [(0.0f32, 0.5f32), (0.28, 0.35)] {
        let offset = (sample_rate as f32 * start) as usize;
        let thump_len = (sample_rate as f32 * 0.12) as usize;
        for i in 0..thump_len {
            let t = i as f32 / sample_rate as f32;
            let envelope = (-t * 28.0).exp();
            let idx = offset + i;
            if idx < length {
                samples[idx] += (std::f32::consts::TAU * 60.0 * t).sin() * envelope * amplitude;
            }
        }
    }
    AudioClip {
        sample_rate,
        samples,
    }
}

enum VoiceBackend {
    /// HRTF-style positional path.
    Spatial(OutputStreamHandle),
    /// Non-spatialized fallback after spatial construction failed.
    Plain(OutputStreamHandle),
    /// No output at all; state bookkeeping still runs.
    Silent,
}

enum ActiveSink {
    Spatial(SpatialSink),
    Plain(Sink),
    Silent,
}

struct ActiveScream {
    sink: ActiveSink,
    ends_at: f32,
}

/// A creeper's dedicated scream voice: its own playback path, cooldown
/// scheduling, distance envelope and per-play speed/pitch randomization.
/// Dropping the active sink cuts the sound.
pub struct ScreamVoice {
    backend: VoiceBackend,
    active: Option<ActiveScream>,
    pub is_screaming: bool,
    clock: f32,
    next_scream_time: f32,
    /// Speed factor of the most recent scream, 0.6..1.6.
    pub last_speed: f32,
    /// Detune of the most recent scream in cents, log2(pitch) * 1200.
    pub last_detune_cents: f32,
    pub last_volume: f32,
    rng: ThreadRng,
}

impl ScreamVoice {
    pub fn new(handle: Option<OutputStreamHandle>) -> Self {
        let backend = match handle {
            Some(h) => VoiceBackend::Spatial(h),
            None => VoiceBackend::Silent,
        };
        Self {
            backend,
            active: None,
            is_screaming: false,
            clock: 0.0,
            next_scream_time: 0.0,
            last_speed: 1.0,
            last_detune_cents: 0.0,
            last_volume: 0.0,
            rng: rand::thread_rng(),
        }
    }

    pub fn clock(&self) -> f32 {
        self.clock
    }

    pub fn next_scream_time(&self) -> f32 {
        self.next_scream_time
    }

    /// Attempt a scream. Refused while one is playing, while the cooldown
    /// holds, or when the computed volume is inaudible.
    pub fn try_play(
        &mut self,
        clip: &Arc<AudioClip>,
        position: Point3<f32>,
        listener: &Listener,
    ) -> bool {
        if self.is_screaming || self.clock < self.next_scream_time {
            return false;
        }

        let distance = crate::world::xz_distance(position, listener.position);
        let mut volume = scream_volume(distance);
        volume *= self.rng.gen_range(0.95..1.05);
        if volume < AUDIBLE_THRESHOLD {
            return false;
        }

        // Speed and pitch roll independently, so a scream can be
        // slow-and-shrill or fast-and-demonic. Both end up multiplying the
        // playback rate, the same way a buffer source composes
        // playbackRate with detune.
        let speed = self.rng.gen_range(0.6..1.6);
        let pitch: f32 = self.rng.gen_range(0.5..2.0);
        self.last_speed = speed;
        self.last_detune_cents = pitch.log2() * 1200.0;
        self.last_volume = volume;
        let rate = speed * pitch;

        let sink = self.build_sink(clip, rate, volume, distance, position, listener);
        self.active = Some(ActiveScream {
            sink,
            ends_at: self.clock + clip.duration() / rate,
        });
        self.is_screaming = true;
        debug!(
            "scream started: speed {speed:.2}x, pitch {:.2}x, volume {volume:.2}",
            2f32.powf(self.last_detune_cents / 1200.0)
        );
        true
    }

    fn build_sink(
        &mut self,
        clip: &Arc<AudioClip>,
        rate: f32,
        volume: f32,
        distance: f32,
        position: Point3<f32>,
        listener: &Listener,
    ) -> ActiveSink {
        let source = SamplesBuffer::new(1, clip.sample_rate, clip.samples.clone()).speed(rate);
        loop {
            match &self.backend {
                VoiceBackend::Spatial(handle) => {
                    let emitter = emitter_position(position);
                    let (left, right) = listener.ear_positions();
                    match SpatialSink::try_new(handle, emitter, left, right) {
                        Ok(sink) => {
                            sink.set_volume(volume * inverse_distance_gain(distance));
                            sink.append(source);
                            return ActiveSink::Spatial(sink);
                        }
                        Err(e) => {
                            // Construction failure disables the whole
                            // spatialization path, not just this scream.
                            warn!("spatial audio unavailable ({e}), using plain playback");
                            let handle = handle.clone();
                            self.backend = VoiceBackend::Plain(handle);
                        }
                    }
                }
                VoiceBackend::Plain(handle) => match Sink::try_new(handle) {
                    Ok(sink) => {
                        sink.set_volume(volume.clamp(0.0, 1.0));
                        sink.append(source);
                        return ActiveSink::Plain(sink);
                    }
                    Err(e) => {
                        warn!("plain audio playback failed ({e}), voice is silent");
                        self.backend = VoiceBackend::Silent;
                    }
                },
                VoiceBackend::Silent => return ActiveSink::Silent,
            }
        }
    }

    /// Per-tick bookkeeping: track the emitter and listener, refresh the
    /// volume from the current distance, cut the scream when the creeper
    /// catches up, and schedule the next one when playback ends.
    pub fn update(&mut self, dt: f32, position: Point3<f32>, listener: &Listener) {
        self.clock += dt;
        if !self.is_screaming {
            return;
        }

        let distance = crate::world::xz_distance(position, listener.position);
        if distance < CATCH_DISTANCE {
            self.stop();
            return;
        }

        let volume = scream_volume(distance);
        let mut ended = false;
        if let Some(active) = &self.active {
            match &active.sink {
                ActiveSink::Spatial(sink) => {
                    sink.set_emitter_position(emitter_position(position));
                    let (left, right) = listener.ear_positions();
                    sink.set_left_ear_position(left);
                    sink.set_right_ear_position(right);
                    sink.set_volume(volume * inverse_distance_gain(distance));
                }
                ActiveSink::Plain(sink) => sink.set_volume(volume.clamp(0.0, 1.0)),
                ActiveSink::Silent => {}
            }
            ended = self.clock >= active.ends_at;
        }

        if ended {
            self.active = None;
            self.is_screaming = false;
            self.next_scream_time =
                self.clock + self.rng.gen_range(MIN_SCREAM_INTERVAL..MAX_SCREAM_INTERVAL);
        }
    }

    /// Cut the scream immediately. Dropping the sink stops playback.
    pub fn stop(&mut self) {
        if !self.is_screaming {
            return;
        }
        self.active = None;
        self.is_screaming = false;
        debug!("scream stopped");
    }
}

fn emitter_position(position: Point3<f32>) -> [f32; 3] {
    [
        position.x,
        position.y + SCREAM_EMITTER_HEIGHT,
        position.z,
    ]
}

pub const HEARTBEAT_MAX_RATE: f32 = 3.6;
const HEARTBEAT_NEAR: f32 = 5.0;
const HEARTBEAT_FAR: f32 = 50.0;
const HEARTBEAT_SLEW_PER_SECOND: f32 = 0.06;
const HEARTBEAT_APPLIED_MIN: f32 = 0.8;
const HEARTBEAT_APPLIED_MAX: f32 = 1.8;
const HEARTBEAT_APPLY_EPSILON: f32 = 0.005;

/// Target heartbeat rate for the nearest creeper distance: base rate when
/// nothing is close, 3.6x at point-blank range, linear in between.
pub fn target_heartbeat_rate(closest_distance: Option<f32>) -> f32 {
    match closest_distance {
        None => 1.0,
        Some(d) if d >= HEARTBEAT_FAR => 1.0,
        Some(d) if d <= HEARTBEAT_NEAR => HEARTBEAT_MAX_RATE,
        Some(d) => {
            let normalized = (d - HEARTBEAT_NEAR) / (HEARTBEAT_FAR - HEARTBEAT_NEAR);
            HEARTBEAT_MAX_RATE - normalized * (HEARTBEAT_MAX_RATE - 1.0)
        }
    }
}

/// Slews the heartbeat playback rate toward the danger-derived target.
/// The applied rate is clamped to a band the loop can follow, and any
/// invalid application resets everything to the safe default.
pub struct HeartbeatMonitor {
    current: f32,
    target: f32,
    pub applied_rate: f32,
}

impl Default for HeartbeatMonitor {
    fn default() -> Self {
        Self {
            current: 1.0,
            target: 1.0,
            applied_rate: 1.0,
        }
    }
}

impl HeartbeatMonitor {
    pub fn update(&mut self, dt: f32, closest_distance: Option<f32>) {
        self.target = target_heartbeat_rate(closest_distance);
        let step = HEARTBEAT_SLEW_PER_SECOND * dt;
        if self.current < self.target {
            self.current = (self.current + step).min(self.target);
        } else {
            self.current = (self.current - step).max(self.target);
        }

        let clamped = self
            .current
            .clamp(HEARTBEAT_APPLIED_MIN, HEARTBEAT_APPLIED_MAX);
        if (self.applied_rate - clamped).abs() > HEARTBEAT_APPLY_EPSILON {
            if let Err(e) = self.apply(clamped) {
                warn!("heartbeat rate change failed ({e}), resetting to 1.0");
                self.current = 1.0;
                self.target = 1.0;
                self.applied_rate = 1.0;
            }
        }
    }

    fn apply(&mut self, rate: f32) -> Result<(), AudioError> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(AudioError::InvalidRate(rate));
        }
        self.applied_rate = rate;
        Ok(())
    }
}

/// Keeps a looping heartbeat fed to the output, one period at a time so
/// each period picks up the monitor's current rate.
pub struct HeartbeatLoop {
    sink: Option<Sink>,
    clip: AudioClip,
}

impl HeartbeatLoop {
    pub fn new(handle: Option<&OutputStreamHandle>) -> Self {
        let sink = handle.and_then(|h| match Sink::try_new(h) {
            Ok(sink) => Some(sink),
            Err(e) => {
                warn!("heartbeat playback unavailable: {e}");
                None
            }
        });
        Self {
            sink,
            clip: synth_heartbeat(44_100),
        }
    }

    pub fn update(&mut self, monitor: &HeartbeatMonitor) {
        let Some(sink) = &self.sink else {
            return;
        };
        // Keep two periods queued; the next one is rendered at the rate
        // the monitor has settled on by then.
        while sink.len() < 2 {
            let source = SamplesBuffer::new(1, self.clip.sample_rate, self.clip.samples.clone())
                .speed(monitor.applied_rate);
            sink.append(source);
        }
    }

    pub fn is_audible(&self) -> bool {
        self.sink.is_some()
    }
}
