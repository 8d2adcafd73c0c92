//! Simulated GPS noise.
//!
//! Wraps any [`PositionSource`] and displaces each fix by an independent
//! Gaussian offset (Box–Muller) in the north and east directions.  Seeded,
//! so a given seed always produces the same noisy walk, useful for
//! checking that de-duplication holds up under jitter.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use wf_core::{Coordinate, EARTH_RADIUS_M, Millis, PositionFix};

use crate::{PositionResult, PositionSource};

/// Metres per degree of latitude on the haversine sphere.
const METRES_PER_DEGREE: f64 = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;

pub struct JitterSource<S: PositionSource> {
    inner:   S,
    sigma_m: f64,
    rng:     SmallRng,
}

impl<S: PositionSource> JitterSource<S> {
    /// `sigma_m` is the standard deviation of each axis offset, metres.
    pub fn new(inner: S, sigma_m: f64, seed: u64) -> Self {
        Self {
            inner,
            sigma_m: sigma_m.max(0.0),
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn gaussian(&mut self) -> f64 {
        let u1: f64 = self.rng.gen_range(f64::EPSILON..1.0);
        let u2: f64 = self.rng.gen_range(0.0..1.0);
        (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
    }

    fn displace(&mut self, fix: PositionFix) -> PositionFix {
        let north_m = self.gaussian() * self.sigma_m;
        let east_m = self.gaussian() * self.sigma_m;

        let lat = fix.coordinate.latitude;
        let cos_lat = lat.to_radians().cos().max(1e-6);
        let coordinate = Coordinate::new(
            (lat + north_m / METRES_PER_DEGREE).clamp(-90.0, 90.0),
            fix.coordinate.longitude + east_m / (METRES_PER_DEGREE * cos_lat),
        );

        PositionFix {
            coordinate,
            accuracy_m: fix.accuracy_m.max(self.sigma_m),
            timestamp_ms: fix.timestamp_ms,
        }
    }
}

impl<S: PositionSource> PositionSource for JitterSource<S> {
    fn start(&mut self, now: Millis) -> PositionResult<()> {
        self.inner.start(now)
    }

    fn poll(&mut self, now: Millis) -> PositionResult<Option<PositionFix>> {
        Ok(self.inner.poll(now)?.map(|fix| self.displace(fix)))
    }

    fn stop(&mut self) {
        self.inner.stop()
    }

    fn is_running(&self) -> bool {
        self.inner.is_running()
    }
}
