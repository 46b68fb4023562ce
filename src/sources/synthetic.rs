//! Seeded synthetic capacity profiles for scenarios without recorded data.

use rand::{Rng, SeedableRng, rngs::StdRng};

use super::profile::{MINUTES_PER_DAY, ProfileTable};
use crate::error::PowerError;

/// Minimum wind multiplier (calm).
const WIND_MULTIPLIER_MIN: f64 = 0.0;
/// Maximum wind multiplier (gusts above the mean).
const WIND_MULTIPLIER_MAX: f64 = 2.0;

/// Gaussian noise via the Box-Muller transform.
///
/// # Returns
///
/// A sample with mean 0 and standard deviation `std_dev`, or 0 when
/// `std_dev <= 0`.
pub fn gaussian_noise(rng: &mut StdRng, std_dev: f64) -> f64 {
    if std_dev <= 0.0 {
        return 0.0;
    }

    let u1: f64 = rng.random::<f64>().clamp(1e-9, 1.0);
    let u2: f64 = rng.random::<f64>();
    let z0 = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    z0 * std_dev
}

/// Half-sine daylight fraction at `minute_of_day`.
///
/// Zero outside `[sunrise_min, sunset_min)`, peaking at 1.0 half-way between.
pub fn daylight_frac(minute_of_day: u64, sunrise_min: u64, sunset_min: u64) -> f64 {
    if sunset_min <= sunrise_min || minute_of_day < sunrise_min || minute_of_day >= sunset_min {
        return 0.0;
    }
    let span = (sunset_min - sunrise_min) as f64;
    let x = (minute_of_day - sunrise_min) as f64 / span;
    (std::f64::consts::PI * x).sin()
}

/// Solar capacity over one day, starting at `start_min`.
///
/// # Arguments
///
/// * `peak_w` - Capacity at solar noon under a clear sky
/// * `sunrise_min` / `sunset_min` - Daylight window in minutes after midnight
/// * `noise_std` - Relative noise (e.g. 0.05 for +/-5%)
/// * `interval_min` - Sampling interval of the generated table
/// * `start_min` - Time of day of the first sample
/// * `seed` - Seed for reproducible noise
pub fn solar_profile(
    peak_w: f64,
    sunrise_min: u64,
    sunset_min: u64,
    noise_std: f64,
    interval_min: u64,
    start_min: u64,
    seed: u64,
) -> Result<ProfileTable, PowerError> {
    if interval_min == 0 {
        return Err(PowerError::InvalidSampleInterval);
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let samples = (MINUTES_PER_DAY / interval_min).max(1);

    let values = (0..samples)
        .map(|i| {
            let minute = (start_min + i * interval_min) % MINUTES_PER_DAY;
            let frac = daylight_frac(minute, sunrise_min, sunset_min);
            if frac <= 0.0 {
                return 0.0;
            }
            let noise = 1.0 + gaussian_noise(&mut rng, noise_std);
            (peak_w.max(0.0) * frac * noise).max(0.0)
        })
        .collect();
    ProfileTable::from_samples(values, interval_min)
}

/// Wind capacity over one day with AR(1) correlated gusts.
///
/// The multiplier evolves as `m = alpha * m + (1 - alpha) * (1 + eps)` and is
/// clamped to `[0, 2]`, so the long-run mean capacity is `mean_w`.
pub fn wind_profile(
    mean_w: f64,
    alpha: f64,
    gust_std: f64,
    interval_min: u64,
    seed: u64,
) -> Result<ProfileTable, PowerError> {
    if interval_min == 0 {
        return Err(PowerError::InvalidSampleInterval);
    }
    let alpha = alpha.clamp(0.0, 1.0);
    let mut rng = StdRng::seed_from_u64(seed);
    let samples = (MINUTES_PER_DAY / interval_min).max(1);
    let mut multiplier = 1.0;

    let values = (0..samples)
        .map(|_| {
            let eps = gaussian_noise(&mut rng, gust_std);
            multiplier = alpha * multiplier + (1.0 - alpha) * (1.0 + eps);
            multiplier = multiplier.clamp(WIND_MULTIPLIER_MIN, WIND_MULTIPLIER_MAX);
            mean_w.max(0.0) * multiplier
        })
        .collect();
    ProfileTable::from_samples(values, interval_min)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daylight_is_zero_at_night_and_peaks_at_noon() {
        assert_eq!(daylight_frac(0, 360, 1080), 0.0);
        assert_eq!(daylight_frac(1080, 360, 1080), 0.0);
        assert!(daylight_frac(720, 360, 1080) > 0.999);
        assert!((daylight_frac(540, 360, 1080) - daylight_frac(900, 360, 1080)).abs() < 1e-9);
    }

    #[test]
    fn solar_profile_starts_at_start_time() {
        let t = solar_profile(1000.0, 360, 1080, 0.0, 60, 720, 1).ok();
        let values = t.as_ref().map(|t| t.values().to_vec()).unwrap_or_default();
        assert_eq!(values.len(), 24);
        assert!(values[0] > 999.0);
        assert_eq!(values[12], 0.0);
    }

    #[test]
    fn solar_profile_is_deterministic_per_seed() {
        let a = solar_profile(1000.0, 360, 1080, 0.1, 10, 0, 7).ok();
        let b = solar_profile(1000.0, 360, 1080, 0.1, 10, 0, 7).ok();
        let c = solar_profile(1000.0, 360, 1080, 0.1, 10, 0, 8).ok();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn wind_profile_stays_within_bounds() {
        let t = wind_profile(500.0, 0.8, 0.5, 5, 42).ok();
        let values = t.as_ref().map(|t| t.values().to_vec()).unwrap_or_default();
        assert_eq!(values.len(), 288);
        assert!(values.iter().all(|&v| (0.0..=1000.0).contains(&v)));
    }

    #[test]
    fn zero_interval_is_rejected() {
        assert!(solar_profile(1.0, 0, 10, 0.0, 0, 0, 0).is_err());
        assert!(wind_profile(1.0, 0.5, 0.1, 0, 0).is_err());
    }
}
