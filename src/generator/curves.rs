//! Closed-form response curves and carryover.
//!
//! These are the shared numeric building blocks for the budget and media-mix
//! generators and for the saturation/adstock feature transforms:
//!
//! - Hill (Michaelis-Menten when `n = 1`): `V = Vmax * x^n / (K^n + x^n)`
//! - exponential saturation: `a * (1 - c * e^(-b x))`
//! - logistic S-curve: `L / (1 + e^(-k (x - x0)))`
//! - adstock: `y[0] = x[0]`, `y[i] = x[i] + decay * y[i-1]`
//!
//! Parameters are validated when a curve is constructed, never while
//! evaluating it.

use serde::{Deserialize, Serialize};

use crate::error::GeneratorError;

use super::Result;

fn require_positive(name: &str, value: f64) -> Result<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(GeneratorError::InvalidParameter(format!(
            "{} must be positive and finite, got {}",
            name, value
        )))
    }
}

/// Hill response for `x >= 0`; negative spend yields zero.
pub fn hill(x: f64, vmax: f64, k: f64, n: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    // x^n / (K^n + x^n) rewritten as 1 / (1 + (K/x)^n) to stay finite for large x.
    vmax / (1.0 + (k / x).powf(n))
}

/// Saturating Hill curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HillCurve {
    /// Asymptotic maximum response.
    pub vmax: f64,
    /// Half-saturation point: `response(k) == vmax / 2`.
    pub k: f64,
    /// Slope (shape) parameter.
    pub n: f64,
}

impl HillCurve {
    pub fn new(vmax: f64, k: f64, n: f64) -> Result<Self> {
        Ok(Self {
            vmax: require_positive("vmax", vmax)?,
            k: require_positive("k", k)?,
            n: require_positive("n", n)?,
        })
    }

    pub fn response(&self, x: f64) -> f64 {
        hill(x, self.vmax, self.k, self.n)
    }

    /// Derivative of the response with respect to spend.
    pub fn marginal(&self, x: f64) -> f64 {
        if x <= 0.0 {
            // The slope at zero is only non-zero for n <= 1.
            return if self.n < 1.0 {
                f64::INFINITY
            } else if self.n == 1.0 {
                self.vmax / self.k
            } else {
                0.0
            };
        }
        let kn = self.k.powf(self.n);
        let xn = x.powf(self.n);
        self.vmax * self.n * kn * x.powf(self.n - 1.0) / (kn + xn).powi(2)
    }

    /// Spend needed to reach `response`, `None` outside `[0, vmax)`.
    pub fn inverse(&self, response: f64) -> Option<f64> {
        if !(0.0..self.vmax).contains(&response) {
            return None;
        }
        Some(self.k * (response / (self.vmax - response)).powf(1.0 / self.n))
    }
}

/// `a * (1 - c * e^(-b x))`, increasing and bounded by `a`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExponentialSaturation {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl ExponentialSaturation {
    /// `c` must lie in `(0, 1]` so the response starts at or above zero.
    pub fn new(a: f64, b: f64, c: f64) -> Result<Self> {
        if !(c > 0.0 && c <= 1.0) {
            return Err(GeneratorError::InvalidParameter(format!(
                "c must be in (0, 1], got {}",
                c
            )));
        }
        Ok(Self {
            a: require_positive("a", a)?,
            b: require_positive("b", b)?,
            c,
        })
    }

    pub fn response(&self, x: f64) -> f64 {
        self.a * (1.0 - self.c * (-self.b * x.max(0.0)).exp())
    }
}

/// `L / (1 + e^(-k (x - x0)))`, with value `L / 2` at the inflection `x0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LogisticCurve {
    pub l: f64,
    pub k: f64,
    pub x0: f64,
}

impl LogisticCurve {
    pub fn new(l: f64, k: f64, x0: f64) -> Result<Self> {
        if !x0.is_finite() {
            return Err(GeneratorError::InvalidParameter(format!(
                "x0 must be finite, got {}",
                x0
            )));
        }
        Ok(Self {
            l: require_positive("l", l)?,
            k: require_positive("k", k)?,
            x0,
        })
    }

    pub fn response(&self, x: f64) -> f64 {
        logistic(x, self.l, self.k, self.x0)
    }
}

pub fn logistic(x: f64, l: f64, k: f64, x0: f64) -> f64 {
    l / (1.0 + (-k * (x - x0)).exp())
}

/// Standard sigmoid, used for converting latent scores into probabilities.
pub fn sigmoid(x: f64) -> f64 {
    logistic(x, 1.0, 1.0, 0.0)
}

/// First-order carryover recurrence. `decay` is expected in `[0, 1)`.
pub fn adstock(values: &[f64], decay: f64) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    let mut carry = 0.0;
    for (i, x) in values.iter().enumerate() {
        carry = if i == 0 { *x } else { x + decay * carry };
        out.push(carry);
    }
    out
}

/// Undoes [`adstock`]: `x[i] = y[i] - decay * y[i-1]`.
pub fn inverse_adstock(adstocked: &[f64], decay: f64) -> Vec<f64> {
    adstocked
        .iter()
        .enumerate()
        .map(|(i, y)| if i == 0 { *y } else { y - decay * adstocked[i - 1] })
        .collect()
}

/// Validated adstock decay.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Adstock {
    pub decay: f64,
}

impl Adstock {
    pub fn new(decay: f64) -> Result<Self> {
        if !(0.0..1.0).contains(&decay) {
            return Err(GeneratorError::InvalidParameter(format!(
                "adstock decay must be in [0, 1), got {}",
                decay
            )));
        }
        Ok(Self { decay })
    }

    pub fn apply(&self, values: &[f64]) -> Vec<f64> {
        adstock(values, self.decay)
    }

    /// Total long-run multiplier of a unit impulse: `1 / (1 - decay)`.
    pub fn long_run_multiplier(&self) -> f64 {
        1.0 / (1.0 - self.decay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hill_properties() {
        let curve = HillCurve::new(1000.0, 50.0, 2.0).unwrap();
        assert_eq!(curve.response(0.0), 0.0);
        assert!((curve.response(50.0) - 500.0).abs() < 1e-9);

        let mut prev = 0.0;
        for i in 0..500 {
            let v = curve.response(i as f64 * 3.7);
            assert!(v >= prev);
            prev = v;
        }
        assert!(curve.response(1e12) <= 1000.0);
        assert!(curve.response(1e12) > 999.0);
    }

    #[test]
    fn test_hill_inverse_and_marginal() {
        let curve = HillCurve::new(10.0, 4.0, 1.5).unwrap();
        let x = curve.inverse(curve.response(7.0)).unwrap();
        assert!((x - 7.0).abs() < 1e-9);
        assert!(curve.inverse(10.0).is_none());
        assert!(curve.marginal(2.0) > curve.marginal(20.0));
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        assert!(HillCurve::new(-1.0, 1.0, 1.0).is_err());
        assert!(HillCurve::new(1.0, 0.0, 1.0).is_err());
        assert!(ExponentialSaturation::new(1.0, 1.0, 1.5).is_err());
        assert!(LogisticCurve::new(1.0, -2.0, 0.0).is_err());
        assert!(Adstock::new(1.0).is_err());
        assert!(Adstock::new(-0.1).is_err());
    }

    #[test]
    fn test_exponential_bounded() {
        let curve = ExponentialSaturation::new(200.0, 0.01, 1.0).unwrap();
        assert_eq!(curve.response(0.0), 0.0);
        assert!(curve.response(100.0) < curve.response(200.0));
        assert!(curve.response(1e6) <= 200.0);
    }

    #[test]
    fn test_logistic_inflection() {
        let curve = LogisticCurve::new(8.0, 0.5, 30.0).unwrap();
        assert!((curve.response(30.0) - 4.0).abs() < 1e-12);
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_adstock_recurrence() {
        let out = Adstock::new(0.7).unwrap().apply(&[100.0, 0.0, 0.0]);
        assert!((out[0] - 100.0).abs() < 1e-12);
        assert!((out[1] - 70.0).abs() < 1e-12);
        assert!((out[2] - 49.0).abs() < 1e-9);

        let back = inverse_adstock(&out, 0.7);
        assert!((back[2]).abs() < 1e-9);
    }
}
