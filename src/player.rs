use cgmath::{InnerSpace, Point3, Vector3};

use crate::world::Forest;

pub const CROUCH_SPEED: f32 = 2.0;
pub const WALK_SPEED: f32 = 4.0;
pub const RUN_SPEED: f32 = 8.0;
pub const SPRINT_SPEED: f32 = 12.0;

// How fast the noise level chases its target while moving, and how fast it
// dies off once the player stands still.
const NOISE_RISE_RATE: f32 = 2.0;
const NOISE_DECAY_RATE: f32 = 0.8;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Stance {
    Standing,
    Crouching,
}

/// What every creeper reads when it checks for the player. Written only by
/// the movement code below.
#[derive(Clone, Copy, Debug)]
pub struct PlayerState {
    pub stance: Stance,
    pub is_in_grass: bool,
    /// 0..1, raised by movement, decays toward 0 when stationary.
    pub noise_level: f32,
    pub visibility_multiplier: f32,
}

impl Default for PlayerState {
    fn default() -> Self {
        Self {
            stance: Stance::Standing,
            is_in_grass: false,
            noise_level: 0.0,
            visibility_multiplier: 1.0,
        }
    }
}

#[derive(Clone, Copy, Default, Debug)]
pub struct MoveInput {
    pub forward: bool,
    pub backward: bool,
    pub left: bool,
    pub right: bool,
    pub run: bool,
    pub sprint: bool,
    pub crouch: bool,
}

impl MoveInput {
    fn any_direction(&self) -> bool {
        self.forward || self.backward || self.left || self.right
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Stamina {
    pub current: f32,
    pub max: f32,
    pub sprint_cost: f32,
    pub regen_rate: f32,
    pub min_sprint_stamina: f32,
}

impl Default for Stamina {
    fn default() -> Self {
        Self {
            current: 100.0,
            max: 100.0,
            sprint_cost: 25.0,
            regen_rate: 15.0,
            min_sprint_stamina: 10.0,
        }
    }
}

/// First-person player controller: position, facing, stamina and the
/// derived stealth state.
pub struct Player {
    pub position: Point3<f32>,
    /// Facing, radians around Y.
    pub yaw: f32,
    pub input: MoveInput,
    pub stamina: Stamina,
    pub state: PlayerState,
    sprinting: bool,
}

impl Player {
    pub fn new(position: Point3<f32>) -> Self {
        Self {
            position,
            yaw: 0.0,
            input: MoveInput::default(),
            stamina: Stamina::default(),
            state: PlayerState::default(),
            sprinting: false,
        }
    }

    pub fn update(&mut self, dt: f32, forest: &Forest) {
        self.state.stance = if self.input.crouch {
            Stance::Crouching
        } else {
            Stance::Standing
        };

        let moving = self.input.any_direction();
        self.update_sprint(dt, moving);

        let speed = if self.state.stance == Stance::Crouching {
            CROUCH_SPEED
        } else if self.sprinting {
            SPRINT_SPEED
        } else if self.input.run {
            RUN_SPEED
        } else {
            WALK_SPEED
        };

        if moving {
            let forward = Vector3::new(self.yaw.sin(), 0.0, self.yaw.cos());
            let right = Vector3::new(self.yaw.cos(), 0.0, -self.yaw.sin());
            let mut wish = Vector3::new(0.0, 0.0, 0.0);
            if self.input.forward {
                wish += forward;
            }
            if self.input.backward {
                wish -= forward;
            }
            if self.input.right {
                wish += right;
            }
            if self.input.left {
                wish -= right;
            }
            if wish.magnitude2() > 0.0 {
                let step = wish.normalize() * speed * dt;
                // Axis-separated moves so the player slides along trunks
                // instead of sticking to them.
                let try_x = Point3::new(self.position.x + step.x, self.position.y, self.position.z);
                if !forest.is_position_blocked(try_x) {
                    self.position = try_x;
                }
                let try_z = Point3::new(self.position.x, self.position.y, self.position.z + step.z);
                if !forest.is_position_blocked(try_z) {
                    self.position = try_z;
                }
            }
        }

        self.update_noise(dt, moving, speed);
        self.state.is_in_grass = forest.is_in_tall_grass(self.position);
    }

    fn update_sprint(&mut self, dt: f32, moving: bool) {
        let wants_sprint =
            self.input.sprint && moving && self.state.stance == Stance::Standing;
        if wants_sprint {
            if !self.sprinting && self.stamina.current >= self.stamina.min_sprint_stamina {
                self.sprinting = true;
            }
        } else {
            self.sprinting = false;
        }

        if self.sprinting {
            self.stamina.current -= self.stamina.sprint_cost * dt;
            if self.stamina.current <= 0.0 {
                self.stamina.current = 0.0;
                self.sprinting = false;
            }
        } else {
            self.stamina.current =
                (self.stamina.current + self.stamina.regen_rate * dt).min(self.stamina.max);
        }
    }

    fn update_noise(&mut self, dt: f32, moving: bool, speed: f32) {
        if moving {
            let target = if speed >= SPRINT_SPEED {
                1.0
            } else if speed >= RUN_SPEED {
                0.6
            } else if speed >= WALK_SPEED {
                0.3
            } else {
                0.1
            };
            if self.state.noise_level < target {
                self.state.noise_level =
                    (self.state.noise_level + NOISE_RISE_RATE * dt).min(target);
            } else {
                self.state.noise_level =
                    (self.state.noise_level - NOISE_DECAY_RATE * dt).max(target);
            }
        } else {
            self.state.noise_level =
                (self.state.noise_level - NOISE_DECAY_RATE * dt).max(0.0);
        }
    }

    pub fn is_sprinting(&self) -> bool {
        self.sprinting
    }
}
