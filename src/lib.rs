//! Ballistic tracer transport in a sinusoidally corrugated tube.
//!
//! A single tracer moves in free flight through a channel bounded by
//! `|z| <= radius(x)` with `radius(x) = Z0 + A cos(2π x / S)`, bouncing
//! specularly off the wall. The crate provides:
//!
//! - [`core::WallGeometry`]: the corrugated boundary and its tangent slope;
//! - [`core::sample_initial`]: initial states consistent with the wall and
//!   a flow-shifted Gaussian velocity distribution;
//! - [`core::Trajectory`]: the adaptive-step integrator with exact
//!   wall-intersection root-finding and specular reflection;
//! - [`sink`]: the append-only collision log (CSV file or in-memory);
//! - [`ensemble`]: N independent runs in parallel under one seed.
//!
//! Runs are embarrassingly parallel: nothing is shared between particles
//! except the sink, which is appended to run-by-run.

pub mod core;
pub mod ensemble;
pub mod error;
pub mod sink;

pub use crate::core::{
    sample_initial, CollisionEvent, ParticleState, RunResult, Sample, StateOverrides, Trajectory,
    WallGeometry,
};
pub use crate::ensemble::{run_ensemble, EnsembleConfig, EnsembleSummary};
pub use crate::error::{Error, Result};
pub use crate::sink::{CsvSink, MemorySink, Record, RecordSink};
