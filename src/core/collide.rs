use crate::core::{ParticleState, WallGeometry};
use crate::error::{Error, Result};

/// Absolute tolerance for root-finding, in domain units.
pub const ROOT_TOL: f64 = 1e-7;

/// Newton iteration cap per root-finding attempt.
const MAX_NEWTON_ITERS: usize = 64;

/// Bounded-retry budget for reseeded root-finding attempts.
const MAX_ROOT_RETRIES: usize = 3;

/// Each retry reseeds this factor times the free-flight x-distance further
/// along the trajectory, pushing the solver off a stale fixed point.
const RESEED_FACTOR: f64 = 1.5;

/// Which branch of the wall the trajectory meets: `z = +radius(x)` (top)
/// or `z = -radius(x)` (bottom).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WallSide {
    Top,
    Bottom,
}

impl WallSide {
    /// Branch sign: +1 for top, -1 for bottom.
    #[inline]
    pub fn sign(self) -> f64 {
        match self {
            WallSide::Top => 1.0,
            WallSide::Bottom => -1.0,
        }
    }

    /// Side hit by a trajectory leaving `(x, z)` with radial velocity `vz`.
    ///
    /// `z == 0` exactly leaves the side ambiguous; the tie-break is the side
    /// the velocity is heading toward. `z == 0` with `vz == 0` stays on the
    /// axis forever and cannot cross either wall.
    pub fn of(z: f64, vz: f64) -> Result<Self> {
        if z > 0.0 {
            Ok(WallSide::Top)
        } else if z < 0.0 {
            Ok(WallSide::Bottom)
        } else if vz > 0.0 {
            Ok(WallSide::Top)
        } else if vz < 0.0 {
            Ok(WallSide::Bottom)
        } else {
            Err(Error::MathError(
                "wall side undefined: z = 0 with vz = 0 cannot cross the wall".into(),
            ))
        }
    }
}

/// Exact wall-crossing point of a straight free-flight segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Intersection {
    pub x: f64,
    pub z: f64,
    pub side: WallSide,
}

/// Result of resolving one wall collision within a step of length `dt_step`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reflection {
    /// State position at the end of the step, after the leftover time was
    /// spent with the post-reflection velocity.
    pub end_x: f64,
    pub end_z: f64,
    /// Exact collision point on the wall.
    pub collision_x: f64,
    pub collision_z: f64,
    /// Post-reflection velocity.
    pub vx: f64,
    pub vz: f64,
    /// Time from the step start to the collision.
    pub dt_to_collision: f64,
    pub side: WallSide,
}

/// Find where the straight trajectory out of `state` meets the wall.
///
/// The caller has already determined that the tentative endpoint of a step
/// of length `dt_step` violates `|z| <= radius(x)`. `prev_collision_x` is
/// the x-coordinate of the immediately preceding collision, if any; a root
/// coincident with it is the solver re-converging on its own last exit
/// point and triggers a reseeded retry.
pub fn find_intersection(
    wall: &WallGeometry,
    state: &ParticleState,
    dt_step: f64,
    prev_collision_x: Option<f64>,
) -> Result<Intersection> {
    // Pick the branch from the envelope the endpoint actually violates; a
    // steep near-axis step can reach the opposite wall, where the plain
    // sign-of-z rule would chase a crossing that does not exist. The
    // sign-based rule (with its z = 0 tie-break) remains the fallback.
    let x1 = state.x + state.vx * dt_step;
    let z1 = state.z + state.vz * dt_step;
    let side = if z1 > wall.radius(x1) {
        WallSide::Top
    } else if z1 < -wall.radius(x1) {
        WallSide::Bottom
    } else {
        WallSide::of(state.z, state.vz)?
    };

    // Vertical trajectory: the collision is directly above/below.
    if state.vx == 0.0 {
        return Ok(Intersection {
            x: state.x,
            z: side.sign() * wall.radius(state.x),
            side,
        });
    }

    let line_slope = state.vz / state.vx;
    // g(x) = side * radius(x) - line(x); a crossing is a root of g.
    let g = |x: f64| side.sign() * wall.radius(x) - (state.z + line_slope * (x - state.x));
    let dg = |x: f64| side.sign() * wall.slope(x) - line_slope;

    let flight_dx = (state.vx * dt_step).abs().max(ROOT_TOL);
    let direction = state.vx.signum();

    let is_stale = |root: f64| {
        prev_collision_x.is_some_and(|prev| (root - prev).abs() <= ROOT_TOL)
    };

    for attempt in 0..=MAX_ROOT_RETRIES {
        let seed = state.x + attempt as f64 * RESEED_FACTOR * flight_dx * direction;
        let Some(root) = newton_root(&g, &dg, seed) else {
            continue;
        };
        // A root coincident with the previous collision is the trajectory
        // re-converging on its own last exit point; reseed further along.
        if is_stale(root) {
            continue;
        }
        return Ok(Intersection {
            x: root,
            z: side.sign() * wall.radius(root),
            side,
        });
    }

    // Newton exhausted its reseeded attempts (near-tangent incidence kills
    // its derivative). The segment endpoints still bracket the crossing, so
    // fall back to bisection over the flight interval.
    if g(state.x) * g(x1) <= 0.0 {
        let root = bisect_root(&g, state.x, x1);
        if g(root).abs() <= ROOT_TOL * 10.0 && !is_stale(root) {
            return Ok(Intersection {
                x: root,
                z: side.sign() * wall.radius(root),
                side,
            });
        }
    }

    Err(Error::MathError(format!(
        "wall intersection search did not converge from x = {} after {} reseeded attempts",
        state.x,
        MAX_ROOT_RETRIES + 1
    )))
}

/// Specular reflection of `(vx, vz)` about the unit normal `(nx, nz)`:
/// `v' = v - 2 (v·n) n`. Preserves speed.
#[inline]
pub fn reflect_velocity(vx: f64, vz: f64, nx: f64, nz: f64) -> (f64, f64) {
    let vn = vx * nx + vz * nz;
    (vx - 2.0 * vn * nx, vz - 2.0 * vn * nz)
}

/// Inward unit normal of the wall at axial position `x` on the given side.
///
/// The sign flip between branches keeps the normal pointing into the
/// channel interior.
#[inline]
pub fn wall_normal(wall: &WallGeometry, x: f64, side: WallSide) -> (f64, f64) {
    let m = wall.slope(x);
    let inv_len = 1.0 / (1.0 + m * m).sqrt();
    (m * inv_len, -side.sign() * inv_len)
}

/// Resolve the wall collision inside a step of length `dt_step`.
///
/// Finds the exact crossing, reflects the velocity specularly, and spends
/// the leftover step time with the post-reflection velocity.
pub fn resolve_collision(
    wall: &WallGeometry,
    state: &ParticleState,
    dt_step: f64,
    prev_collision_x: Option<f64>,
) -> Result<Reflection> {
    let hit = find_intersection(wall, state, dt_step, prev_collision_x)?;

    // Degenerate vertical trajectory: the bounce inverts the radial
    // velocity and leaves vx at exactly zero, so the particle retraces the
    // vertical line it arrived on.
    let (rvx, rvz) = if state.vx == 0.0 {
        (0.0, -state.vz)
    } else {
        let (nx, nz) = wall_normal(wall, hit.x, hit.side);
        reflect_velocity(state.vx, state.vz, nx, nz)
    };

    let speed = state.speed();
    if speed == 0.0 {
        return Err(Error::MathError(
            "cannot time a collision for a zero-velocity state".into(),
        ));
    }
    let dist = (hit.x - state.x).hypot(hit.z - state.z);
    let dt_to_collision = (dist / speed).min(dt_step);
    let dt_leftover = dt_step - dt_to_collision;

    Ok(Reflection {
        end_x: hit.x + rvx * dt_leftover,
        end_z: hit.z + rvz * dt_leftover,
        collision_x: hit.x,
        collision_z: hit.z,
        vx: rvx,
        vz: rvz,
        dt_to_collision,
        side: hit.side,
    })
}

/// Newton iteration on `g` from `seed`; `None` when the iteration fails to
/// reach `|g| <= ROOT_TOL` within the cap or hits a flat derivative.
fn newton_root(g: &impl Fn(f64) -> f64, dg: &impl Fn(f64) -> f64, seed: f64) -> Option<f64> {
    let mut x = seed;
    for _ in 0..MAX_NEWTON_ITERS {
        let gx = g(x);
        if gx.abs() <= ROOT_TOL {
            return Some(x);
        }
        let dgx = dg(x);
        if dgx.abs() < f64::EPSILON || !dgx.is_finite() {
            return None;
        }
        x -= gx / dgx;
        if !x.is_finite() {
            return None;
        }
    }
    None
}

/// Plain bisection on a sign-changing interval; converges unconditionally
/// once `g(a)` and `g(b)` differ in sign.
fn bisect_root(g: &impl Fn(f64) -> f64, mut a: f64, mut b: f64) -> f64 {
    let mut ga = g(a);
    for _ in 0..128 {
        let mid = 0.5 * (a + b);
        let gm = g(mid);
        if gm.abs() <= ROOT_TOL || (b - a).abs() <= ROOT_TOL {
            return mid;
        }
        if ga * gm <= 0.0 {
            b = mid;
        } else {
            a = mid;
            ga = gm;
        }
    }
    0.5 * (a + b)
}
