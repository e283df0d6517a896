//! Propensity evaluation and waiting-time sampling.

use circuit_common::RateLaw;
use rand::Rng;

/// Instantaneous rate of a reaction channel, given the values of its argument species.
///
/// `args` holds the channel's dependency columns in declaration order.
pub trait Propensity: Send + Sync {
    fn rate(&self, args: &[f64]) -> f64;
}

impl<F> Propensity for F
where
    F: Fn(&[f64]) -> f64 + Send + Sync,
{
    fn rate(&self, args: &[f64]) -> f64 {
        self(args)
    }
}

impl Propensity for RateLaw {
    fn rate(&self, args: &[f64]) -> f64 {
        match self {
            RateLaw::Constant { k } => *k,
            RateLaw::Linear { k, .. } => k * args[0],
            RateLaw::MassAction { k, .. } => args.iter().fold(*k, |acc, x| acc * x),
            RateLaw::HillActivation { beta, k, n, .. } => {
                let x_n = args[0].powf(*n);
                let denom = k.powf(*n) + x_n;
                if denom > 0.0 { beta * x_n / denom } else { 0.0 }
            }
            RateLaw::HillRepression { beta, k, n, .. } => beta / (1.0 + (args[0] / k).powf(*n)),
        }
    }
}

/// Uniform draw on (0, 1], so `ln(u)` is always finite.
#[inline]
fn open_unit<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    1.0 - rng.random::<f64>()
}

/// Waiting time of a channel with constant propensity `a`: `-ln(U) / a`, or infinity when `a <= 0`.
pub fn exponential_waiting_time<R: Rng + ?Sized>(a: f64, rng: &mut R) -> f64 {
    if a > 0.0 {
        -open_unit(rng).ln() / a
    } else {
        f64::INFINITY
    }
}

/// Waiting time of a channel whose reaction volume grows as `size * exp(mu * t)`.
///
/// Solves `integral_0^tau a * size * exp(mu * t) dt = -ln(U)`, giving
/// `tau = ln(1 - mu * ln(U) / (a * size)) / mu`.
pub fn growing_volume_waiting_time<R: Rng + ?Sized>(a: f64, mu: f64, size: f64, rng: &mut R) -> f64 {
    if a > 0.0 {
        let x = -mu * open_unit(rng).ln() / (a * size);
        x.ln_1p() / mu
    } else {
        f64::INFINITY
    }
}

/// Index and value of the smallest finite waiting time.
///
/// Scans in increasing index order and only replaces the incumbent on strict
/// improvement, so ties go to the lowest index. Returns `None` when every
/// channel is silent.
pub fn next_reaction(taus: &[f64]) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &tau) in taus.iter().enumerate() {
        if !tau.is_finite() {
            continue;
        }
        match best {
            Some((_, incumbent)) if tau >= incumbent => {}
            _ => best = Some((i, tau)),
        }
    }
    best
}
