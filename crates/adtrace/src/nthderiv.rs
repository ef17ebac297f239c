//! Analytic n-th derivative oracle.
//!
//! Closed-form univariate n-th derivatives of elementary functions. This is
//! a pure, stateless function library: no graph, no tracing. The algebra
//! adapters consume it (the scalar adapter takes its first derivatives from
//! here), and it doubles as an independent reference in tests.
//!
//! Every function has the signature `f(x, n) -> Result<f64, TraceError>`:
//! order 0 is the ordinary function value, a negative order is
//! [`TraceError::InvalidOrder`], and an argument outside the function's
//! declared domain is [`TraceError::Domain`]. Both are checked before any
//! computation.

use crate::error::TraceError;
use num_complex::Complex64;
use std::f64::consts::{FRAC_PI_2, LN_10, LN_2};

/// Rough domain of definition of an oracle function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    AllReals,
    Positive,
    GreaterThanNegOne,
    AbsLessThanOne,
}

impl Domain {
    /// Whether `x` lies inside the domain.
    pub fn contains(&self, x: f64) -> bool {
        match self {
            Domain::AllReals => true,
            Domain::Positive => x > 0.0,
            Domain::GreaterThanNegOne => x > -1.0,
            Domain::AbsLessThanOne => x.abs() < 1.0,
        }
    }

    /// Human-readable description, used in error messages.
    pub fn describe(&self) -> &'static str {
        match self {
            Domain::AllReals => "all real numbers",
            Domain::Positive => "positive real numbers",
            Domain::GreaterThanNegOne => "real numbers greater than -1",
            Domain::AbsLessThanOne => "real numbers with absolute value less than 1",
        }
    }
}

fn check(func: &'static str, domain: Domain, x: f64, n: i32) -> Result<u32, TraceError> {
    if n < 0 {
        return Err(TraceError::InvalidOrder { order: n });
    }
    if !domain.contains(x) {
        return Err(TraceError::Domain {
            func,
            x,
            domain: domain.describe(),
        });
    }
    Ok(n as u32)
}

fn factorial(n: u32) -> f64 {
    (1..=n).map(f64::from).product()
}

/// Pochhammer rising factorial `(a)_n = a (a+1) ... (a+n-1)`.
fn poch(a: f64, n: u32) -> f64 {
    (0..n).map(|k| a + f64::from(k)).product()
}

fn neg1_pow(n: u32) -> f64 {
    if n % 2 == 0 { 1.0 } else { -1.0 }
}

pub fn exp(x: f64, n: i32) -> Result<f64, TraceError> {
    check("exp", Domain::AllReals, x, n)?;
    Ok(x.exp())
}

pub fn exp2(x: f64, n: i32) -> Result<f64, TraceError> {
    let n = check("exp2", Domain::AllReals, x, n)?;
    Ok(x.exp2() * LN_2.powi(n as i32))
}

pub fn expm1(x: f64, n: i32) -> Result<f64, TraceError> {
    let n = check("expm1", Domain::AllReals, x, n)?;
    if n == 0 { Ok(x.exp_m1()) } else { Ok(x.exp()) }
}

pub fn log(x: f64, n: i32) -> Result<f64, TraceError> {
    let n = check("log", Domain::Positive, x, n)?;
    if n == 0 {
        Ok(x.ln())
    } else {
        Ok(neg1_pow(n - 1) * factorial(n - 1) * x.powi(-(n as i32)))
    }
}

pub fn log2(x: f64, n: i32) -> Result<f64, TraceError> {
    Ok(log(x, n)? / LN_2)
}

pub fn log10(x: f64, n: i32) -> Result<f64, TraceError> {
    Ok(log(x, n)? / LN_10)
}

pub fn log1p(x: f64, n: i32) -> Result<f64, TraceError> {
    let n = check("log1p", Domain::GreaterThanNegOne, x, n)?;
    if n == 0 {
        Ok(x.ln_1p())
    } else {
        Ok(neg1_pow(n - 1) * factorial(n - 1) * (1.0 + x).powi(-(n as i32)))
    }
}

pub fn sqrt(x: f64, n: i32) -> Result<f64, TraceError> {
    let n = check("sqrt", Domain::Positive, x, n)?;
    if n == 0 {
        Ok(x.sqrt())
    } else {
        Ok(poch(1.5 - f64::from(n), n) * x.powf(0.5 - f64::from(n)))
    }
}

pub fn reciprocal(x: f64, n: i32) -> Result<f64, TraceError> {
    let n = check("reciprocal", Domain::AllReals, x, n)?;
    Ok(neg1_pow(n) * factorial(n) * x.powi(-(n as i32) - 1))
}

pub fn square(x: f64, n: i32) -> Result<f64, TraceError> {
    let n = check("square", Domain::AllReals, x, n)?;
    Ok(match n {
        0 => x * x,
        1 => 2.0 * x,
        2 => 2.0,
        _ => 0.0,
    })
}

pub fn negative(x: f64, n: i32) -> Result<f64, TraceError> {
    let n = check("negative", Domain::AllReals, x, n)?;
    Ok(match n {
        0 => -x,
        1 => -1.0,
        _ => 0.0,
    })
}

pub fn absolute(x: f64, n: i32) -> Result<f64, TraceError> {
    let n = check("absolute", Domain::AllReals, x, n)?;
    Ok(match n {
        0 => x.abs(),
        1 if x == 0.0 => 0.0,
        1 => x.signum(),
        _ => 0.0,
    })
}

pub fn sin(x: f64, n: i32) -> Result<f64, TraceError> {
    let n = check("sin", Domain::AllReals, x, n)?;
    Ok((x + f64::from(n) * FRAC_PI_2).sin())
}

pub fn cos(x: f64, n: i32) -> Result<f64, TraceError> {
    let n = check("cos", Domain::AllReals, x, n)?;
    Ok((x + f64::from(n) * FRAC_PI_2).cos())
}

pub fn sinh(x: f64, n: i32) -> Result<f64, TraceError> {
    let n = check("sinh", Domain::AllReals, x, n)?;
    if n % 2 == 0 { Ok(x.sinh()) } else { Ok(x.cosh()) }
}

pub fn cosh(x: f64, n: i32) -> Result<f64, TraceError> {
    let n = check("cosh", Domain::AllReals, x, n)?;
    if n % 2 == 0 { Ok(x.cosh()) } else { Ok(x.sinh()) }
}

pub fn arctan(x: f64, n: i32) -> Result<f64, TraceError> {
    let n = check("arctan", Domain::AllReals, x, n)?;
    if n == 0 {
        return Ok(x.atan());
    }
    let i = Complex64::new(0.0, 1.0);
    let a = Complex64::new(0.0, 0.5) * neg1_pow(n) * factorial(n - 1);
    let b = (Complex64::new(x, 0.0) - i).powi(-(n as i32))
        - (Complex64::new(x, 0.0) + i).powi(-(n as i32));
    Ok((a * b).re)
}

pub fn arctanh(x: f64, n: i32) -> Result<f64, TraceError> {
    let n = check("arctanh", Domain::AbsLessThanOne, x, n)?;
    if n == 0 {
        return Ok(x.atanh());
    }
    let a = (1.0 - x).powi(-(n as i32));
    let b = neg1_pow(n - 1) * (1.0 + x).powi(-(n as i32));
    Ok(0.5 * factorial(n - 1) * (a + b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_order_zero_is_function_value() {
        assert_relative_eq!(exp(1.3, 0).unwrap(), 1.3_f64.exp());
        assert_relative_eq!(log(2.7, 0).unwrap(), 2.7_f64.ln());
        assert_relative_eq!(sin(0.4, 0).unwrap(), 0.4_f64.sin());
        assert_relative_eq!(sqrt(2.0, 0).unwrap(), 2.0_f64.sqrt());
        assert_relative_eq!(arctan(0.7, 0).unwrap(), 0.7_f64.atan());
    }

    #[test]
    fn test_negative_order_rejected() {
        let err = sin(1.0, -1).unwrap_err();
        assert!(matches!(err, TraceError::InvalidOrder { order: -1 }));
    }

    #[test]
    fn test_domain_errors() {
        assert!(matches!(log(-1.0, 1), Err(TraceError::Domain { .. })));
        assert!(matches!(log(0.0, 0), Err(TraceError::Domain { .. })));
        assert!(matches!(sqrt(-4.0, 1), Err(TraceError::Domain { .. })));
        assert!(matches!(arctanh(1.5, 0), Err(TraceError::Domain { .. })));
        assert!(matches!(log1p(-2.0, 1), Err(TraceError::Domain { .. })));
    }

    #[test]
    fn test_sin_derivative_cycle() {
        let x = 0.8;
        assert_relative_eq!(sin(x, 1).unwrap(), x.cos(), epsilon = 1e-14);
        assert_relative_eq!(sin(x, 2).unwrap(), -x.sin(), epsilon = 1e-14);
        assert_relative_eq!(sin(x, 3).unwrap(), -x.cos(), epsilon = 1e-14);
        assert_relative_eq!(sin(x, 4).unwrap(), x.sin(), epsilon = 1e-14);
    }

    #[test]
    fn test_log_derivatives() {
        let x = 1.7;
        assert_relative_eq!(log(x, 1).unwrap(), 1.0 / x, epsilon = 1e-14);
        assert_relative_eq!(log(x, 2).unwrap(), -1.0 / (x * x), epsilon = 1e-14);
        assert_relative_eq!(log(x, 3).unwrap(), 2.0 / (x * x * x), epsilon = 1e-14);
    }

    #[test]
    fn test_sqrt_first_derivative() {
        let x = 4.0;
        assert_relative_eq!(sqrt(x, 1).unwrap(), 0.5 / x.sqrt(), epsilon = 1e-14);
    }

    #[test]
    fn test_reciprocal_derivatives() {
        let x = 2.0;
        assert_relative_eq!(reciprocal(x, 0).unwrap(), 0.5);
        assert_relative_eq!(reciprocal(x, 1).unwrap(), -0.25);
        assert_relative_eq!(reciprocal(x, 2).unwrap(), 0.25);
    }

    #[test]
    fn test_arctan_first_derivative() {
        let x = 0.6;
        assert_relative_eq!(
            arctan(x, 1).unwrap(),
            1.0 / (1.0 + x * x),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_arctanh_first_derivative() {
        let x = 0.3;
        assert_relative_eq!(
            arctanh(x, 1).unwrap(),
            1.0 / (1.0 - x * x),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_hyperbolic_alternation() {
        let x = 0.9;
        assert_relative_eq!(sinh(x, 1).unwrap(), x.cosh());
        assert_relative_eq!(sinh(x, 2).unwrap(), x.sinh());
        assert_relative_eq!(cosh(x, 1).unwrap(), x.sinh());
        assert_relative_eq!(cosh(x, 3).unwrap(), x.sinh());
    }

    #[test]
    fn test_piecewise_flat_functions() {
        assert_relative_eq!(square(3.0, 1).unwrap(), 6.0);
        assert_relative_eq!(square(3.0, 5).unwrap(), 0.0);
        assert_relative_eq!(negative(3.0, 1).unwrap(), -1.0);
        assert_relative_eq!(absolute(-3.0, 1).unwrap(), -1.0);
        assert_relative_eq!(absolute(0.0, 1).unwrap(), 0.0);
    }
}
