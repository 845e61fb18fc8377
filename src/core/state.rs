use crate::core::WallGeometry;
use crate::error::{Error, Result};
use rand::Rng;
use rand_distr::{Distribution, Normal};

/// Tracer state advanced in place by the integrator.
///
/// Invariant: at every timestep boundary `|z| <= wall.radius(x)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticleState {
    /// Axial position.
    pub x: f64,
    /// Radial position (signed; the channel is `|z| <= radius(x)`).
    pub z: f64,
    /// Axial velocity.
    pub vx: f64,
    /// Radial velocity.
    pub vz: f64,
    /// Remaining simulation time for this run.
    pub time_left: f64,
}

impl ParticleState {
    /// Current speed `|v|`.
    #[inline]
    pub fn speed(&self) -> f64 {
        self.vx.hypot(self.vz)
    }
}

/// Explicit overrides for any of the four initial state components.
/// A `Some` value is used verbatim, bypassing sampling for that component.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StateOverrides {
    pub x: Option<f64>,
    pub z: Option<f64>,
    pub vx: Option<f64>,
    pub vz: Option<f64>,
}

impl StateOverrides {
    /// Fully explicit initial state (no sampling at all).
    pub fn exact(x: f64, z: f64, vx: f64, vz: f64) -> Self {
        Self {
            x: Some(x),
            z: Some(z),
            vx: Some(vx),
            vz: Some(vz),
        }
    }
}

/// Attempt cap for both the radial rejection loop and the zero-velocity
/// re-draw loop.
const MAX_SAMPLE_ATTEMPTS: usize = 1_000_000;

/// Draw an initial state consistent with the wall geometry and the
/// prescribed velocity distribution.
///
/// Sampling contract:
/// - `x ~ U[0, wavelength)` unless overridden;
/// - `z ~ U[-envelope, envelope]`, rejection-sampled until `|z| <= radius(x)`
///   (the valid z-range depends on x, so no inverse-CDF shortcut);
/// - `vx = flow_velocity + N(0, variance)`, `vz = N(0, variance)`;
/// - all four draws independent; overrides are used verbatim.
///
/// A sampled state with zero velocity in both axes is re-drawn, since it
/// would divide by zero in step-size selection. Overrides pinning both
/// velocity components to zero are `Error::InvalidParam`.
pub fn sample_initial<R: Rng + ?Sized>(
    rng: &mut R,
    wall: &WallGeometry,
    flow_velocity: f64,
    velocity_variance: f64,
    total_time: f64,
    overrides: &StateOverrides,
) -> Result<ParticleState> {
    if !flow_velocity.is_finite() {
        return Err(Error::InvalidParam("flow velocity must be finite".into()));
    }
    if !velocity_variance.is_finite() || velocity_variance < 0.0 {
        return Err(Error::InvalidParam(
            "velocity variance must be finite and >= 0".into(),
        ));
    }
    if !total_time.is_finite() || total_time < 0.0 {
        return Err(Error::InvalidParam(
            "total time must be finite and >= 0".into(),
        ));
    }
    if overrides.vx == Some(0.0) && overrides.vz == Some(0.0) {
        return Err(Error::InvalidParam(
            "initial velocity must be nonzero in at least one axis".into(),
        ));
    }

    // The distribution is parameterized by variance; Normal takes a std dev.
    let sigma = velocity_variance.sqrt();
    let normal = Normal::new(0.0, sigma)
        .map_err(|e| Error::InvalidParam(format!("bad velocity distribution: {e}")))?;

    let x = match overrides.x {
        Some(x) if x.is_finite() => x,
        Some(_) => return Err(Error::InvalidParam("x override must be finite".into())),
        None => rng.random_range(0.0..wall.wavelength()),
    };

    let z = match overrides.z {
        // Used verbatim, even slightly outside the wall: the integrator's
        // first step resolves the crossing as an immediate collision.
        Some(z) if z.is_finite() => z,
        Some(_) => return Err(Error::InvalidParam("z override must be finite".into())),
        None => {
            let bound = wall.envelope();
            let mut attempts = 0usize;
            loop {
                if attempts >= MAX_SAMPLE_ATTEMPTS {
                    return Err(Error::InvalidParam(
                        "failed to rejection-sample a radial position inside the wall".into(),
                    ));
                }
                attempts += 1;
                let z = rng.random_range(-bound..=bound);
                if wall.contains(x, z) {
                    break z;
                }
            }
        }
    };

    let mut attempts = 0usize;
    let (vx, vz) = loop {
        if attempts >= MAX_SAMPLE_ATTEMPTS {
            return Err(Error::InvalidParam(
                "failed to sample a nonzero initial velocity".into(),
            ));
        }
        attempts += 1;
        let vx = match overrides.vx {
            Some(v) if v.is_finite() => v,
            Some(_) => return Err(Error::InvalidParam("vx override must be finite".into())),
            None => flow_velocity + normal.sample(rng),
        };
        let vz = match overrides.vz {
            Some(v) if v.is_finite() => v,
            Some(_) => return Err(Error::InvalidParam("vz override must be finite".into())),
            None => normal.sample(rng),
        };
        if vx != 0.0 || vz != 0.0 {
            break (vx, vz);
        }
        // Both components overridden to zero is caught above. A degenerate
        // distribution (zero variance, zero flow) exhausts the attempt cap.
    };

    Ok(ParticleState {
        x,
        z,
        vx,
        vz,
        time_left: total_time,
    })
}
