//! Numerical floors and special functions shared by the families.
//!
//! Variances, rates and probabilities that reach zero (or cross it)
//! are clamped to the floors below before entering `ln`, `digamma` or
//! a reciprocal. Non-finite values are never floored: they are
//! reported as errors by the callers.

use special::Gamma as SpecialGamma;

pub const LN_2PI: f64 = 1.837_877_066_409_345_5;

/// smallest variance used in logs and reciprocals
pub const VAR_FLOOR: f64 = 1e-10;

/// only stands in for Gamma rates that reached zero; vague priors use
/// rates far below any fixed small constant
pub const RATE_FLOOR: f64 = f64::MIN_POSITIVE;

/// probabilities are kept in `[PROB_FLOOR, 1 - PROB_FLOOR]` inside logs
pub const PROB_FLOOR: f64 = 1e-10;

/// Probabilities may drift outside `[0, 1]` by at most this much
/// before it counts as a domain violation rather than round-off
pub const PROB_TOLERANCE: f64 = 1e-8;

#[inline]
pub fn floor_var(x: f64) -> f64 {
    x.max(VAR_FLOOR)
}

#[inline]
pub fn floor_rate(x: f64) -> f64 {
    x.max(RATE_FLOOR)
}

#[inline]
pub fn clamp_prob(p: f64) -> f64 {
    p.clamp(PROB_FLOOR, 1. - PROB_FLOOR)
}

#[inline]
pub fn digamma(x: f64) -> f64 {
    SpecialGamma::digamma(x)
}

#[inline]
pub fn ln_gamma(x: f64) -> f64 {
    SpecialGamma::ln_gamma(x).0
}

#[inline]
pub fn ln_beta(a: f64, b: f64) -> f64 {
    ln_gamma(a) + ln_gamma(b) - ln_gamma(a + b)
}

/// `1 / (1 + exp(-x))` without overflow
#[inline]
pub fn sigmoid(x: f64) -> f64 {
    if x >= 0. {
        1. / (1. + (-x).exp())
    } else {
        let e = x.exp();
        e / (1. + e)
    }
}

/// `ln(1 + exp(x))` without overflow
#[inline]
pub fn softplus(x: f64) -> f64 {
    if x > 30. {
        x
    } else if x < -30. {
        x.exp()
    } else {
        x.exp().ln_1p()
    }
}

/// Entropy of a Bernoulli with success probability `p`
#[inline]
pub fn bernoulli_entropy(p: f64) -> f64 {
    let p = clamp_prob(p);
    -p * p.ln() - (1. - p) * (1. - p).ln()
}

/// Entropy of a univariate Gaussian with variance `var`
#[inline]
pub fn gaussian_entropy(var: f64) -> f64 {
    0.5 * (LN_2PI + 1. + floor_var(var).ln())
}
