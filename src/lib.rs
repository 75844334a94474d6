//! Simulation core for a night-forest survival game: a player creeps through
//! procedurally placed trees, rocks and tall grass while screaming "creeper"
//! agents wander the dark and give chase when they spot them.
//!
//! Rendering is deliberately absent. The crate owns the creeper AI (state
//! machines, line-of-sight detection with stealth modifiers, spatialized
//! scream audio, model load serialization, population management) and talks
//! to the outside world through small traits: a scene sink, model/audio asset
//! sources and a radar sink for lightning reveals.

pub mod assets;
pub mod audio;
pub mod creeper;
pub mod lightning;
pub mod player;
pub mod population;
pub mod world;
