//! Core trajectory machinery: wall geometry, initial-state sampling, the
//! intersection solver / reflection engine, and the adaptive integrator.

pub mod collide;
pub mod integrate;
pub mod state;
pub mod wall;

pub use collide::{Intersection, Reflection, WallSide};
pub use integrate::{classify_step, CollisionEvent, RunResult, Sample, StepOutcome, Trajectory};
pub use state::{sample_initial, ParticleState, StateOverrides};
pub use wall::WallGeometry;
