//! Three-parameter logistic (3PL) response model.
//!
//! Pure functions over `(a, b, c, theta)` shared by the ability estimators and
//! the item selectors.

use crate::item::ItemParams;

/// Numerically stable logistic function.
fn logistic(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// Probability of a correct response.
///
/// P(theta) = c + (1 - c) / (1 + exp(-a * (theta - b)))
///
/// For `a > 0` and `c` in `[0, 1)` the result lies in `(c, 1)`, up to
/// floating-point saturation at extreme `a * (theta - b)`.
pub fn probability_correct(a: f64, b: f64, c: f64, theta: f64) -> f64 {
    c + (1.0 - c) * logistic(a * (theta - b))
}

/// Fisher information of a 3PL item at `theta`.
///
/// I(theta) = a^2 * (p - c)^2 * (1 - p) / ((1 - c)^2 * p)
pub fn information(a: f64, b: f64, c: f64, theta: f64) -> f64 {
    if a == 0.0 {
        return 0.0;
    }
    let p = probability_correct(a, b, c, theta);
    if p <= 0.0 {
        return 0.0;
    }
    let num = a * a * (p - c).powi(2) * (1.0 - p);
    let den = (1.0 - c).powi(2) * p;
    num / den
}

/// First and second derivatives of one response's log-likelihood with respect to theta.
///
/// With `u` = 1 for a correct response and 0 otherwise:
///
/// d1 = a (u - p)(p - c) / (p (1 - c))
/// d2 = a^2 (p - c)(1 - p)(u c - p^2) / ((1 - c)^2 p^2)
///
/// `d2` is positive for a correct response when `p^2 < c`, which is where the
/// 3PL log-likelihood stops being concave.
pub fn log_likelihood_derivatives(a: f64, b: f64, c: f64, theta: f64, correct: bool) -> (f64, f64) {
    let p = probability_correct(a, b, c, theta).clamp(f64::MIN_POSITIVE, 1.0);
    let u = if correct { 1.0 } else { 0.0 };
    let one_minus_c = 1.0 - c;
    let d1 = a * (u - p) * (p - c) / (p * one_minus_c);
    let d2 = a * a * (p - c) * (1.0 - p) * (u * c - p * p) / (one_minus_c * one_minus_c * p * p);
    (d1, d2)
}

/// Log-likelihood of a single response.
pub fn log_likelihood(a: f64, b: f64, c: f64, theta: f64, correct: bool) -> f64 {
    let p = probability_correct(a, b, c, theta);
    if correct {
        p.max(f64::MIN_POSITIVE).ln()
    } else {
        (1.0 - p).max(f64::MIN_POSITIVE).ln()
    }
}

/// Sum of item information for a set of items at `theta`.
pub fn test_information<'a, I>(items: I, theta: f64) -> f64
where
    I: IntoIterator<Item = &'a ItemParams>,
{
    items
        .into_iter()
        .map(|p| information(p.a, p.b, p.c, theta))
        .sum()
}
