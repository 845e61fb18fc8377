use crate::core::collide::{resolve_collision, WallSide};
use crate::core::{ParticleState, WallGeometry};
use crate::error::{Error, Result};

/// Small epsilon guarding the step-size divisions against zero speed and
/// zero wall clearance.
const EPS_STEP: f64 = 1e-9;

/// Fraction of the wall wavelength capping any single free-flight step.
const STEP_WAVELENGTH_FRACTION: f64 = 0.2;

/// Consecutive same-side collision cap; beyond it the run is aborted as
/// diverging rather than looped indefinitely.
const MAX_CONSECUTIVE_BOUNCES: u32 = 1000;

/// A recorded wall bounce: exact position, elapsed time, post-bounce
/// velocity. Immutable history, ordered by elapsed time within a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionEvent {
    /// Ordinal within the run, starting at 1 (0 marks the initial sample).
    pub index: u32,
    pub time: f64,
    pub x: f64,
    pub z: f64,
    /// Post-reflection velocity.
    pub vx: f64,
    pub vz: f64,
}

/// One row of a run's sampled history: the initial state, each collision,
/// and the final state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// 0 for the initial sample, the collision ordinal for bounce rows,
    /// one past the last collision for the final sample.
    pub collision_number: u32,
    pub time: f64,
    pub x: f64,
    pub z: f64,
    pub vx: f64,
    pub vz: f64,
}

/// Full history of one particle run, owned exclusively by that run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunResult {
    pub samples: Vec<Sample>,
    pub events: Vec<CollisionEvent>,
}

/// Classification of one tentative free-flight step. The branches are
/// mutually exclusive and checked in this order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepOutcome {
    /// Tentative endpoint violates `|z| <= radius(x)`.
    WallCollision,
    /// The step consumes exactly the remaining simulation time.
    TimeExhausted,
    /// The segment stays inside the envelope but crosses the waist plane
    /// `z = ±waist()`; `dt_to_waist` is the closed-form crossing time.
    /// Always strictly interior to the step: the step is clamped to the
    /// remaining time and exhaustion is classified first, so
    /// `0 < dt_to_waist < dt <= time_left`.
    WaistCrossing { dt_to_waist: f64 },
    /// Plain interior free flight.
    FreeFlight,
}

/// Classify a tentative step of length `dt` out of `state`.
///
/// Pure decision table over (state, wall, dt); the integrator matches on
/// the result and never re-derives the branch conditions.
pub fn classify_step(wall: &WallGeometry, state: &ParticleState, dt: f64) -> StepOutcome {
    let x1 = state.x + state.vx * dt;
    let z1 = state.z + state.vz * dt;

    if !wall.contains(x1, z1) {
        return StepOutcome::WallCollision;
    }
    if dt >= state.time_left {
        return StepOutcome::TimeExhausted;
    }
    if let Some(dt_to_waist) = waist_crossing(wall, state, dt) {
        return StepOutcome::WaistCrossing { dt_to_waist };
    }
    StepOutcome::FreeFlight
}

/// Closed-form crossing time of the waist plane `z = ±waist()` within the
/// segment, if the segment crosses one. Not a physical collision: the
/// caller truncates the step there purely to keep downstream statistics
/// consistent.
fn waist_crossing(wall: &WallGeometry, state: &ParticleState, dt: f64) -> Option<f64> {
    if state.vz == 0.0 {
        return None;
    }
    let z1 = state.z + state.vz * dt;
    let mut best: Option<f64> = None;
    for plane in [wall.waist(), -wall.waist()] {
        if (state.z - plane) * (z1 - plane) < 0.0 {
            let t = (plane - state.z) / state.vz;
            if t > 0.0 && best.is_none_or(|b| t < b) {
                best = Some(t);
            }
        }
    }
    best
}

/// Single-particle trajectory state machine: `Running` while simulation
/// time remains, `Terminated` once it reaches exactly zero. No re-entry
/// after termination.
#[derive(Debug)]
pub struct Trajectory<'a> {
    wall: &'a WallGeometry,
    state: ParticleState,
    total_time: f64,
    elapsed: f64,
    samples: Vec<Sample>,
    events: Vec<CollisionEvent>,
    prev_collision_x: Option<f64>,
    same_side_run: u32,
    last_side: Option<WallSide>,
    terminated: bool,
}

impl<'a> Trajectory<'a> {
    /// Start a run from an initial state produced by the sampler. The
    /// state's `time_left` is the total simulation time. A start placed
    /// outside the wall by an explicit override is accepted verbatim; the
    /// first step resolves it as an immediate collision.
    pub fn new(wall: &'a WallGeometry, state: ParticleState) -> Result<Self> {
        if state.vx == 0.0 && state.vz == 0.0 {
            return Err(Error::InvalidParam(
                "initial velocity must be nonzero in at least one axis".into(),
            ));
        }
        let total_time = state.time_left;
        let initial = Sample {
            collision_number: 0,
            time: 0.0,
            x: state.x,
            z: state.z,
            vx: state.vx,
            vz: state.vz,
        };
        Ok(Self {
            wall,
            state,
            total_time,
            elapsed: 0.0,
            samples: vec![initial],
            events: Vec::new(),
            prev_collision_x: None,
            same_side_run: 0,
            last_side: None,
            terminated: false,
        })
    }

    /// Drive the run to completion and hand back its full history.
    pub fn run(mut self) -> Result<RunResult> {
        if self.state.time_left == 0.0 {
            self.emit_final_sample();
        }
        while !self.terminated {
            self.step()?;
        }
        Ok(RunResult {
            samples: self.samples,
            events: self.events,
        })
    }

    /// Adaptive step size: capped by a fixed fraction of the wavelength and
    /// by the wall clearance over the current speed, so steps shrink near
    /// the boundary and tunneling through thin regions is prevented. Both
    /// divisions are epsilon-guarded.
    fn step_size(&self) -> f64 {
        let gap = (self.wall.radius(self.state.x) - self.state.z.abs()).max(0.0);
        let by_wavelength = STEP_WAVELENGTH_FRACTION * self.wall.wavelength();
        let by_proximity = (gap + EPS_STEP) / (self.state.speed() + EPS_STEP);
        by_wavelength.min(by_proximity).min(self.state.time_left)
    }

    fn step(&mut self) -> Result<()> {
        let dt = self.step_size();
        match classify_step(self.wall, &self.state, dt) {
            StepOutcome::WallCollision => self.collide(dt),
            StepOutcome::TimeExhausted => {
                self.advance(dt);
                self.emit_final_sample();
                Ok(())
            }
            StepOutcome::WaistCrossing { dt_to_waist } => {
                self.advance(dt_to_waist);
                Ok(())
            }
            StepOutcome::FreeFlight => {
                self.advance(dt);
                Ok(())
            }
        }
    }

    fn collide(&mut self, dt: f64) -> Result<()> {
        let r = resolve_collision(self.wall, &self.state, dt, self.prev_collision_x)?;

        if self.last_side == Some(r.side) {
            self.same_side_run += 1;
            if self.same_side_run > MAX_CONSECUTIVE_BOUNCES {
                return Err(Error::DivergingRun(format!(
                    "more than {MAX_CONSECUTIVE_BOUNCES} consecutive collisions on one wall side"
                )));
            }
        } else {
            self.last_side = Some(r.side);
            self.same_side_run = 1;
        }

        let index = self.events.len() as u32 + 1;
        let time = self.elapsed + r.dt_to_collision;
        self.events.push(CollisionEvent {
            index,
            time,
            x: r.collision_x,
            z: r.collision_z,
            vx: r.vx,
            vz: r.vz,
        });
        self.samples.push(Sample {
            collision_number: index,
            time,
            x: r.collision_x,
            z: r.collision_z,
            vx: r.vx,
            vz: r.vz,
        });

        self.prev_collision_x = Some(r.collision_x);
        self.state.x = r.end_x;
        self.state.z = r.end_z;
        self.state.vx = r.vx;
        self.state.vz = r.vz;
        self.clamp_to_wall();
        self.elapsed += dt;
        self.state.time_left -= dt;

        if self.state.time_left <= 0.0 {
            self.state.time_left = 0.0;
            self.emit_final_sample();
        }
        Ok(())
    }

    /// Linear free flight over `dt`, with a safety clamp of `|z|` onto the
    /// wall as a fallback against numerical drift. Crossings are handled by
    /// the collision branch; the clamp only absorbs roundoff.
    fn advance(&mut self, dt: f64) {
        self.state.x += self.state.vx * dt;
        self.state.z += self.state.vz * dt;
        self.clamp_to_wall();
        self.elapsed += dt;
        self.state.time_left = if dt >= self.state.time_left {
            0.0
        } else {
            self.state.time_left - dt
        };
    }

    fn clamp_to_wall(&mut self) {
        let r = self.wall.radius(self.state.x);
        if self.state.z > r {
            self.state.z = r;
        } else if self.state.z < -r {
            self.state.z = -r;
        }
    }

    /// Append the final sample at exactly the requested total time and
    /// switch to `Terminated`.
    fn emit_final_sample(&mut self) {
        self.samples.push(Sample {
            collision_number: self.events.len() as u32 + 1,
            time: self.total_time,
            x: self.state.x,
            z: self.state.z,
            vx: self.state.vx,
            vz: self.state.vz,
        });
        self.terminated = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wall() -> WallGeometry {
        WallGeometry::new(1.0, 0.1, 0.5).unwrap()
    }

    fn state(x: f64, z: f64, vx: f64, vz: f64, time_left: f64) -> ParticleState {
        ParticleState {
            x,
            z,
            vx,
            vz,
            time_left,
        }
    }

    #[test]
    fn classify_prefers_collision_over_exhaustion() {
        let wall = wall();
        // Endpoint far above the wall and dt equal to the remaining time.
        let s = state(0.0, 0.5, 0.0, 10.0, 0.1);
        assert_eq!(classify_step(&wall, &s, 0.1), StepOutcome::WallCollision);
    }

    #[test]
    fn classify_time_exhaustion() {
        let wall = wall();
        let s = state(0.0, 0.0, 1.0, 0.0, 0.05);
        assert_eq!(classify_step(&wall, &s, 0.05), StepOutcome::TimeExhausted);
    }

    #[test]
    fn classify_waist_crossing() {
        let wall = wall();
        // From z = 0.35 dropping below waist 0.4? No: moving up through it.
        let s = state(0.0, 0.35, 0.0, 1.0, 10.0);
        let dt = 0.1; // endpoint z = 0.45 < radius(0) = 0.6, crosses waist 0.4
        match classify_step(&wall, &s, dt) {
            StepOutcome::WaistCrossing { dt_to_waist } => {
                assert!((dt_to_waist - 0.05).abs() < 1e-12);
            }
            other => panic!("expected waist crossing, got {other:?}"),
        }
    }

    #[test]
    fn classify_free_flight() {
        let wall = wall();
        let s = state(0.0, 0.0, 1.0, 0.0, 10.0);
        assert_eq!(classify_step(&wall, &s, 0.05), StepOutcome::FreeFlight);
    }

    #[test]
    fn straight_axis_run_has_no_collisions() -> Result<()> {
        let wall = wall();
        let result = Trajectory::new(&wall, state(0.0, 0.0, 1.0, 0.0, 0.5))?.run()?;
        assert!(result.events.is_empty());
        let last = result.samples.last().unwrap();
        assert_eq!(last.time, 0.5);
        assert!((last.x - 0.5).abs() < 1e-12);
        assert_eq!(last.z, 0.0);
        assert_eq!((last.vx, last.vz), (1.0, 0.0));
        Ok(())
    }

    #[test]
    fn states_stay_inside_the_wall() -> Result<()> {
        let wall = wall();
        let result = Trajectory::new(&wall, state(0.2, 0.1, 1.0, 1.7, 3.0))?.run()?;
        assert!(!result.events.is_empty(), "expected bounces in 3 time units");
        for s in &result.samples {
            assert!(
                s.z.abs() <= wall.radius(s.x) + 1e-6,
                "sample outside wall: x={}, z={}, radius={}",
                s.x,
                s.z,
                wall.radius(s.x)
            );
        }
        Ok(())
    }

    #[test]
    fn collision_times_strictly_increase() -> Result<()> {
        let wall = wall();
        let result = Trajectory::new(&wall, state(0.2, 0.1, 1.0, 1.7, 3.0))?.run()?;
        for pair in result.events.windows(2) {
            assert!(
                pair[0].time < pair[1].time,
                "collision times not increasing: {} then {}",
                pair[0].time,
                pair[1].time
            );
        }
        let last = result.samples.last().unwrap();
        assert_eq!(last.time, 3.0);
        Ok(())
    }

    #[test]
    fn speed_is_preserved_across_every_bounce() -> Result<()> {
        let wall = wall();
        let initial = state(0.2, 0.1, 1.0, 1.7, 3.0);
        let speed0 = initial.speed();
        let result = Trajectory::new(&wall, initial)?.run()?;
        for ev in &result.events {
            let speed = ev.vx.hypot(ev.vz);
            assert!(
                (speed - speed0).abs() < 1e-6,
                "speed drifted at collision {}: {} vs {}",
                ev.index,
                speed,
                speed0
            );
        }
        Ok(())
    }

    #[test]
    fn vertical_bounce_flips_vz_and_keeps_vx() -> Result<()> {
        let wall = wall();
        let result = Trajectory::new(&wall, state(0.9, 0.59, 0.0, 1.0, 0.1))?.run()?;
        assert!(!result.events.is_empty(), "expected a top-wall bounce");
        let ev = &result.events[0];
        assert_eq!(ev.vx, 0.0, "vx must stay zero for a vertical trajectory");
        assert!(
            ev.vz < 0.0 && (ev.vz + 1.0).abs() < 1e-7,
            "vz must flip sign at the top wall, got {}",
            ev.vz
        );
        Ok(())
    }

    #[test]
    fn waist_shortcut_lands_on_the_waist_plane() {
        let wall = wall();
        let s = state(0.0, 0.35, 0.3, 1.0, 10.0);
        let dt = 0.1;
        if let StepOutcome::WaistCrossing { dt_to_waist } = classify_step(&wall, &s, dt) {
            let z_at = s.z + s.vz * dt_to_waist;
            assert!((z_at - wall.waist()).abs() < 1e-12);
            let x_at = s.x + s.vx * dt_to_waist;
            assert!(wall.contains(x_at, z_at), "waist point must stay inside");
        } else {
            panic!("expected a waist crossing");
        }
    }

    #[test]
    fn runaway_same_side_bouncing_aborts_the_run() -> Result<()> {
        let wall = wall();
        // Vertical tracer starting past the top wall: the next step is a
        // guaranteed top-side collision.
        let mut t = Trajectory::new(&wall, state(0.9, 0.59, 0.0, 1.0, 10.0))?;
        // Prime the guard as if the run had already ricocheted off the top
        // wall for the maximum allowed streak.
        t.last_side = Some(WallSide::Top);
        t.same_side_run = MAX_CONSECUTIVE_BOUNCES;
        let err = t.step().unwrap_err();
        assert!(
            matches!(err, Error::DivergingRun(_)),
            "expected a diverging-run abort, got {err:?}"
        );
        Ok(())
    }

    #[test]
    fn exhaustion_takes_precedence_over_a_waist_crossing() -> Result<()> {
        let wall = wall();
        // The segment crosses the waist plane z = 0.4 on its way to
        // z = 0.41, but dt consumes all the remaining time; the run must
        // end there rather than truncate at the waist.
        let s = state(0.0, 0.35, 0.0, 1.0, 0.06);
        assert_eq!(classify_step(&wall, &s, 0.06), StepOutcome::TimeExhausted);

        let result = Trajectory::new(&wall, s)?.run()?;
        assert!(result.events.is_empty());
        let last = result.samples.last().unwrap();
        assert_eq!(last.time, 0.06);
        assert!((last.z - 0.41).abs() < 1e-12, "final z was {}", last.z);
        Ok(())
    }

    #[test]
    fn zero_velocity_initial_state_rejected() {
        let wall = wall();
        let err = Trajectory::new(&wall, state(0.0, 0.0, 0.0, 0.0, 1.0)).unwrap_err();
        assert!(err.to_string().contains("nonzero"));
    }

    #[test]
    fn zero_total_time_yields_two_identical_samples() -> Result<()> {
        let wall = wall();
        let result = Trajectory::new(&wall, state(0.1, 0.2, 1.0, 0.5, 0.0))?.run()?;
        assert!(result.events.is_empty());
        assert_eq!(result.samples.len(), 2);
        assert_eq!(result.samples[0].time, 0.0);
        assert_eq!(result.samples[1].time, 0.0);
        Ok(())
    }
}
