//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

/// Evaluate a polynomial at `value`.
///
/// The coefficients are ordered lowest power first, i.e. `coeffs[i]` multiplies `value^i`. An
/// empty coefficient slice evaluates to zero.
pub fn poly_eval<T>(coeffs: &[T], value: T) -> T
where
    T: Float
{
    // Horner's method, starting from the highest power
    coeffs
        .iter()
        .rev()
        .fold(T::zero(), |acc, c| acc * value + *c)
}

/// Evaluate the first derivative of a polynomial at `value`.
///
/// Coefficients are ordered as in `poly_eval`.
pub fn poly_deriv_eval<T>(coeffs: &[T], value: T) -> T
where
    T: Float
{
    coeffs
        .iter()
        .enumerate()
        .skip(1)
        .rev()
        .fold(T::zero(), |acc, (i, c)| {
            // i is always small so this cast can't fail
            acc * value + *c * T::from(i).unwrap_or_else(T::zero)
        })
}

/// Return the euclidian norm (distance between) of two points.
///
/// If the points do not have the same number of dimensions `None` is returned.
pub fn norm<T>(point_0: &[T], point_1: &[T]) -> Option<T>
where
    T: Float
{
    if point_0.len() != point_1.len() {
        return None;
    }

    Some(
        point_0
            .iter()
            .zip(point_1.iter())
            .fold(T::zero(), |sum, (a, b)| sum + (*a - *b).powi(2))
            .sqrt(),
    )
}

/// Calculates the least nonnegative remainder of `lhs (mod rhs)`.
/// 
/// This function is taken from the std library as num is missing it.
///
/// In particular, the return value `r` satisfies `0.0 <= r < rhs.abs()` in
/// most cases. However, due to a floating point round-off error it can
/// result in `r == rhs.abs()`, violating the mathematical definition, if
/// `self` is much smaller than `rhs.abs()` in magnitude and `self < 0.0`.
pub fn rem_euclid<T>(lhs: T, rhs: T) -> T
where
    T: Float
{
    let r = lhs % rhs;
    if r < T::zero() { r + rhs.abs() } else { r }
}

/// Wrap an angle into the range [-pi, pi).
pub fn wrap_to_pi<T>(value: T) -> T
where
    T: Float
{
    let pi_t = T::from(std::f64::consts::PI).unwrap_or_else(T::zero);
    let tau_t = pi_t + pi_t;

    rem_euclid(value + pi_t, tau_t) - pi_t
}
