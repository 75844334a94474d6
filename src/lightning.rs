use log::debug;
use rand::rngs::ThreadRng;
use rand::Rng;
use std::collections::HashMap;

/// Receives creeper positions when lightning reveals them. The radar
/// overlay itself lives outside this crate.
pub trait RadarSink {
    fn on_lightning_flash(&mut self, positions: &HashMap<u32, (f32, f32)>);
    fn on_lightning_end(&mut self);
}

pub struct NullRadar;

impl RadarSink for NullRadar {
    fn on_lightning_flash(&mut self, _positions: &HashMap<u32, (f32, f32)>) {}
    fn on_lightning_end(&mut self) {}
}

#[derive(Clone, Copy, Debug)]
pub struct FlashPulse {
    pub start: f32,
    pub duration: f32,
    pub intensity: f32,
}

#[derive(Debug)]
struct FlashSequence {
    time: f32,
    total: f32,
    pulses: Vec<FlashPulse>,
}

/// Drives multi-stroke lightning flashes on a random cadence. Exposes the
/// current light intensity for a renderer and notifies the radar once per
/// sequence with the creeper positions at flash time.
pub struct LightningManager {
    time_to_next: f32,
    sequence: Option<FlashSequence>,
    was_active: bool,
    pub light_intensity: f32,
    rng: ThreadRng,
}

impl LightningManager {
    pub fn new() -> Self {
        let mut rng = rand::thread_rng();
        let time_to_next = Self::rand_gap(&mut rng);
        Self {
            time_to_next,
            sequence: None,
            was_active: false,
            light_intensity: 0.0,
            rng,
        }
    }

    fn rand_gap(rng: &mut ThreadRng) -> f32 {
        rng.gen_range(5.0..12.0)
    }

    fn build_sequence(rng: &mut ThreadRng) -> FlashSequence {
        let strokes = rng.gen_range(2..=5);
        let mut t = 0.0;
        let mut pulses = Vec::with_capacity(strokes);
        for i in 0..strokes {
            let duration = rng.gen_range(0.035..0.125);
            let gap = if i == strokes - 1 {
                0.0
            } else {
                rng.gen_range(0.04..0.12)
            };
            pulses.push(FlashPulse {
                start: t,
                duration,
                intensity: rng.gen_range(2.5..4.5),
            });
            t += duration + gap;
        }
        FlashSequence {
            time: 0.0,
            total: t,
            pulses,
        }
    }

    pub fn is_active(&self) -> bool {
        self.sequence.is_some()
    }

    pub fn update(
        &mut self,
        dt: f32,
        creeper_positions: &HashMap<u32, (f32, f32)>,
        radar: &mut dyn RadarSink,
    ) {
        let is_active = self.sequence.is_some();
        let mut ended = false;

        if let Some(seq) = &mut self.sequence {
            seq.time += dt;
            let current = seq
                .pulses
                .iter()
                .find(|p| seq.time >= p.start && seq.time <= p.start + p.duration)
                .copied();
            if let Some(pulse) = current {
                let local = (seq.time - pulse.start) / pulse.duration;
                // Sharp attack, quadratic decay.
                let ramp = if local < 0.15 {
                    local / 0.15
                } else {
                    (1.0 - local).powi(2)
                };
                self.light_intensity = pulse.intensity * ramp;

                if !self.was_active {
                    debug!(
                        "lightning reveals {} creepers on the radar",
                        creeper_positions.len()
                    );
                    radar.on_lightning_flash(creeper_positions);
                }
            } else {
                self.light_intensity = 0.0;
            }
            ended = seq.time >= seq.total;
        } else {
            self.time_to_next -= dt;
            if self.time_to_next <= 0.0 {
                self.sequence = Some(Self::build_sequence(&mut self.rng));
            }
        }

        if ended {
            self.sequence = None;
            self.light_intensity = 0.0;
            self.time_to_next = Self::rand_gap(&mut self.rng);
            radar.on_lightning_end();
        }

        self.was_active = is_active;
    }
}

impl Default for LightningManager {
    fn default() -> Self {
        Self::new()
    }
}
