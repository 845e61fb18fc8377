use crate::error::{Error, Result};
use std::f64::consts::TAU;

/// Sinusoidally corrugated tube wall: radius as a function of axial position.
///
/// The channel occupies `|z| <= radius(x)` with
/// `radius(x) = mean_radius + amplitude * cos(2π x / wavelength)`.
///
/// Invariant: `amplitude < mean_radius`, so the channel never pinches to
/// zero or negative width.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WallGeometry {
    wavelength: f64,
    amplitude: f64,
    mean_radius: f64,
}

impl WallGeometry {
    /// Create a wall geometry after validating invariants.
    ///
    /// Errors:
    /// - `Error::InvalidParam` if `wavelength <= 0`, `amplitude < 0`,
    ///   `amplitude >= mean_radius`, or any value is NaN/inf.
    pub fn new(wavelength: f64, amplitude: f64, mean_radius: f64) -> Result<Self> {
        if !wavelength.is_finite() || wavelength <= 0.0 {
            return Err(Error::InvalidParam(
                "wavelength must be finite and > 0".into(),
            ));
        }
        if !amplitude.is_finite() || amplitude < 0.0 {
            return Err(Error::InvalidParam(
                "amplitude must be finite and >= 0".into(),
            ));
        }
        if !mean_radius.is_finite() || mean_radius <= amplitude {
            return Err(Error::InvalidParam(
                "mean radius must be finite and > amplitude (channel must not pinch shut)".into(),
            ));
        }
        Ok(Self {
            wavelength,
            amplitude,
            mean_radius,
        })
    }

    /// Corrugation wavelength (period along the flow axis).
    #[inline]
    pub fn wavelength(&self) -> f64 {
        self.wavelength
    }

    /// Corrugation amplitude.
    #[inline]
    pub fn amplitude(&self) -> f64 {
        self.amplitude
    }

    /// Mean channel radius.
    #[inline]
    pub fn mean_radius(&self) -> f64 {
        self.mean_radius
    }

    /// Wall radius at axial position `x`. Defined for all real `x`,
    /// periodic with period `wavelength`.
    #[inline]
    pub fn radius(&self, x: f64) -> f64 {
        self.mean_radius + self.amplitude * (TAU * x / self.wavelength).cos()
    }

    /// Tangent slope `d radius / dx` at axial position `x`.
    #[inline]
    pub fn slope(&self, x: f64) -> f64 {
        -self.amplitude * (TAU / self.wavelength) * (TAU * x / self.wavelength).sin()
    }

    /// Minimum channel radius, reached at the narrowest cross-section.
    #[inline]
    pub fn waist(&self) -> f64 {
        self.mean_radius - self.amplitude
    }

    /// Maximum channel radius (outer bound of any valid `|z|`).
    #[inline]
    pub fn envelope(&self) -> f64 {
        self.mean_radius + self.amplitude
    }

    /// Whether the point `(x, z)` lies inside or on the wall.
    #[inline]
    pub fn contains(&self, x: f64, z: f64) -> bool {
        z.abs() <= self.radius(x)
    }
}
