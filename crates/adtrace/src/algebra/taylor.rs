//! Truncated univariate Taylor polynomial algebra.
//!
//! [`Utp`] propagates Taylor coefficients through the elementary operations
//! with the classical recurrences. Tracing a procedure once over scalars and
//! then pushing `Utp` values through the recorded graph yields higher-order
//! directional derivatives: coefficient `k` of the output is the k-th
//! derivative divided by k!.
//!
//! Evaluators lift bare `f64` arguments (traced constants) to constant
//! polynomials of the matching truncation order, so mixed constant/Taylor
//! graphs replay without retracing.

use crate::error::TraceError;
use crate::registry::{Registry, ops};
use crate::value::{Aux, Value, boxed};
use std::any::{Any, TypeId};

/// Univariate truncated Taylor polynomial over `f64`.
///
/// `coeffs[k]` is the k-th Taylor coefficient; the truncation order is
/// `coeffs.len() - 1`. Operations zero-extend the shorter operand.
#[derive(Debug, Clone, PartialEq)]
pub struct Utp {
    coeffs: Vec<f64>,
}

impl Utp {
    /// Construct from raw coefficients. Must be non-empty.
    pub fn new(coeffs: Vec<f64>) -> Result<Self, TraceError> {
        if coeffs.is_empty() {
            return Err(TraceError::Configuration(
                "a Taylor polynomial needs at least the constant coefficient".into(),
            ));
        }
        Ok(Self { coeffs })
    }

    /// The constant `c`, truncated at `order`.
    pub fn constant(c: f64, order: usize) -> Self {
        let mut coeffs = vec![0.0; order + 1];
        coeffs[0] = c;
        Self { coeffs }
    }

    /// The identity variable expanded at `x0`, truncated at `order`:
    /// coefficients `[x0, 1, 0, ..]`.
    pub fn variable(x0: f64, order: usize) -> Self {
        let mut coeffs = vec![0.0; order + 1];
        coeffs[0] = x0;
        if order >= 1 {
            coeffs[1] = 1.0;
        }
        Self { coeffs }
    }

    /// Truncation order.
    pub fn order(&self) -> usize {
        self.coeffs.len() - 1
    }

    /// All coefficients.
    pub fn coeffs(&self) -> &[f64] {
        &self.coeffs
    }

    /// Coefficient `k`, zero beyond the truncation order.
    pub fn coeff(&self, k: usize) -> f64 {
        self.coeffs.get(k).copied().unwrap_or(0.0)
    }

    /// Value of the k-th derivative at the expansion point: `k! * coeffs[k]`.
    pub fn derivative(&self, k: usize) -> f64 {
        let kfac: f64 = (1..=k).map(|j| j as f64).product();
        kfac * self.coeff(k)
    }

    fn joint_len(&self, rhs: &Utp) -> usize {
        self.coeffs.len().max(rhs.coeffs.len())
    }

    /// Elementwise sum.
    pub fn add(&self, rhs: &Utp) -> Utp {
        let n = self.joint_len(rhs);
        Utp {
            coeffs: (0..n).map(|k| self.coeff(k) + rhs.coeff(k)).collect(),
        }
    }

    /// Elementwise difference.
    pub fn sub(&self, rhs: &Utp) -> Utp {
        let n = self.joint_len(rhs);
        Utp {
            coeffs: (0..n).map(|k| self.coeff(k) - rhs.coeff(k)).collect(),
        }
    }

    /// Negation.
    pub fn neg(&self) -> Utp {
        Utp {
            coeffs: self.coeffs.iter().map(|c| -c).collect(),
        }
    }

    /// Truncated Cauchy product.
    pub fn mul(&self, rhs: &Utp) -> Utp {
        let n = self.joint_len(rhs);
        let mut coeffs = vec![0.0; n];
        for (k, c) in coeffs.iter_mut().enumerate() {
            *c = (0..=k).map(|j| self.coeff(j) * rhs.coeff(k - j)).sum();
        }
        Utp { coeffs }
    }

    /// Truncated quotient. The divisor's leading coefficient must be nonzero.
    pub fn div(&self, rhs: &Utp) -> Result<Utp, TraceError> {
        let b0 = rhs.coeff(0);
        if b0 == 0.0 {
            return Err(TraceError::Domain {
                func: "div",
                x: b0,
                domain: "nonzero leading Taylor coefficient",
            });
        }
        let n = self.joint_len(rhs);
        let mut q = vec![0.0; n];
        for k in 0..n {
            let correction: f64 = (1..=k).map(|j| rhs.coeff(j) * q[k - j]).sum();
            q[k] = (self.coeff(k) - correction) / b0;
        }
        Utp::new(q)
    }

    /// Exponential recurrence.
    pub fn exp(&self) -> Utp {
        let n = self.coeffs.len();
        let mut e = vec![0.0; n];
        e[0] = self.coeff(0).exp();
        for k in 1..n {
            e[k] = (1..=k)
                .map(|j| j as f64 * self.coeff(j) * e[k - j])
                .sum::<f64>()
                / k as f64;
        }
        Utp { coeffs: e }
    }

    /// Logarithm recurrence; the leading coefficient must be positive.
    pub fn ln(&self) -> Result<Utp, TraceError> {
        let a0 = self.coeff(0);
        if a0 <= 0.0 {
            return Err(TraceError::Domain {
                func: "log",
                x: a0,
                domain: "positive leading Taylor coefficient",
            });
        }
        let n = self.coeffs.len();
        let mut l = vec![0.0; n];
        l[0] = a0.ln();
        for k in 1..n {
            let correction: f64 = (1..k).map(|j| j as f64 * l[j] * self.coeff(k - j)).sum();
            l[k] = (k as f64 * self.coeff(k) - correction) / (k as f64 * a0);
        }
        Utp::new(l)
    }

    /// Square-root recurrence; the leading coefficient must be positive.
    pub fn sqrt(&self) -> Result<Utp, TraceError> {
        let a0 = self.coeff(0);
        if a0 <= 0.0 {
            return Err(TraceError::Domain {
                func: "sqrt",
                x: a0,
                domain: "positive leading Taylor coefficient",
            });
        }
        let n = self.coeffs.len();
        let mut s = vec![0.0; n];
        s[0] = a0.sqrt();
        for k in 1..n {
            let correction: f64 = (1..k).map(|j| s[j] * s[k - j]).sum();
            s[k] = (self.coeff(k) - correction) / (2.0 * s[0]);
        }
        Utp::new(s)
    }

    /// Coupled sine/cosine recurrence; returns `(sin, cos)`.
    pub fn sin_cos(&self) -> (Utp, Utp) {
        let n = self.coeffs.len();
        let mut s = vec![0.0; n];
        let mut c = vec![0.0; n];
        s[0] = self.coeff(0).sin();
        c[0] = self.coeff(0).cos();
        for k in 1..n {
            let ds: f64 = (1..=k).map(|j| j as f64 * self.coeff(j) * c[k - j]).sum();
            let dc: f64 = (1..=k).map(|j| j as f64 * self.coeff(j) * s[k - j]).sum();
            s[k] = ds / k as f64;
            c[k] = -dc / k as f64;
        }
        (Utp { coeffs: s }, Utp { coeffs: c })
    }
}

impl Value for Utp {
    fn clone_boxed(&self) -> Box<dyn Value> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn zeros_like(&self) -> Box<dyn Value> {
        Box::new(Utp {
            coeffs: vec![0.0; self.coeffs.len()],
        })
    }

    fn add_assign_value(&mut self, rhs: &dyn Value) -> Result<(), TraceError> {
        let rhs = rhs
            .as_any()
            .downcast_ref::<Utp>()
            .ok_or(TraceError::TypeMismatch {
                expected: "utp",
                actual: rhs.type_label(),
            })?;
        if rhs.coeffs.len() > self.coeffs.len() {
            self.coeffs.resize(rhs.coeffs.len(), 0.0);
        }
        for (slot, r) in self.coeffs.iter_mut().zip(rhs.coeffs.iter()) {
            *slot += r;
        }
        Ok(())
    }

    fn type_label(&self) -> &'static str {
        "utp"
    }
}

/// Install the Taylor evaluators into `registry`.
pub fn register(registry: &mut Registry) {
    let t = TypeId::of::<Utp>();

    registry.register_forward(ops::ADD, t, fwd_add);
    registry.register_forward(ops::SUB, t, fwd_sub);
    registry.register_forward(ops::MUL, t, fwd_mul);
    registry.register_forward(ops::DIV, t, fwd_div);
    registry.register_forward(ops::NEG, t, fwd_neg);
    registry.register_forward(ops::SIN, t, fwd_sin);
    registry.register_forward(ops::COS, t, fwd_cos);
    registry.register_forward(ops::EXP, t, fwd_exp);
    registry.register_forward(ops::LOG, t, fwd_log);
    registry.register_forward(ops::SQRT, t, fwd_sqrt);

    registry.register_pullback(ops::ADD, t, pb_add);
    registry.register_pullback(ops::SUB, t, pb_sub);
    registry.register_pullback(ops::MUL, t, pb_mul);
    registry.register_pullback(ops::DIV, t, pb_div);
    registry.register_pullback(ops::NEG, t, pb_neg);
    registry.register_pullback(ops::SIN, t, pb_sin);
    registry.register_pullback(ops::COS, t, pb_cos);
    registry.register_pullback(ops::EXP, t, pb_exp);
    registry.register_pullback(ops::LOG, t, pb_log);
    registry.register_pullback(ops::SQRT, t, pb_sqrt);
}

/// Lift a traced value to `Utp`: pass polynomials through, embed bare
/// scalars as constants at the given truncation order.
fn lift(value: &dyn Value, order: usize) -> Result<Utp, TraceError> {
    if let Some(utp) = value.as_any().downcast_ref::<Utp>() {
        return Ok(utp.clone());
    }
    if let Some(c) = value.as_any().downcast_ref::<f64>() {
        return Ok(Utp::constant(*c, order));
    }
    Err(TraceError::TypeMismatch {
        expected: "utp or f64",
        actual: value.type_label(),
    })
}

fn joint_order(args: &[&dyn Value]) -> usize {
    args.iter()
        .filter_map(|v| v.as_any().downcast_ref::<Utp>())
        .map(Utp::order)
        .max()
        .unwrap_or(0)
}

fn unary(op: &'static str, args: &[&dyn Value]) -> Result<Utp, TraceError> {
    if args.len() != 1 {
        return Err(TraceError::Arity {
            op,
            expected: 1,
            actual: args.len(),
        });
    }
    lift(args[0], joint_order(args))
}

fn binary(op: &'static str, args: &[&dyn Value]) -> Result<(Utp, Utp), TraceError> {
    if args.len() != 2 {
        return Err(TraceError::Arity {
            op,
            expected: 2,
            actual: args.len(),
        });
    }
    let order = joint_order(args);
    Ok((lift(args[0], order)?, lift(args[1], order)?))
}

fn adjoint_utp(adjoint: &dyn Value) -> Result<Utp, TraceError> {
    adjoint
        .as_any()
        .downcast_ref::<Utp>()
        .cloned()
        .ok_or(TraceError::TypeMismatch {
            expected: "utp",
            actual: adjoint.type_label(),
        })
}

/// Shape a contribution to the runtime type of the argument it flows into:
/// a bare scalar argument (an embedded constant) receives the constant
/// coefficient of the polynomial contribution.
fn shaped(arg: &dyn Value, contribution: Utp) -> Box<dyn Value> {
    if arg.as_any().is::<f64>() {
        boxed(contribution.coeff(0))
    } else {
        boxed(contribution)
    }
}

fn fwd_add(args: &[&dyn Value], _aux: &[Aux]) -> Result<Box<dyn Value>, TraceError> {
    let (a, b) = binary("add", args)?;
    Ok(boxed(a.add(&b)))
}

fn fwd_sub(args: &[&dyn Value], _aux: &[Aux]) -> Result<Box<dyn Value>, TraceError> {
    let (a, b) = binary("sub", args)?;
    Ok(boxed(a.sub(&b)))
}

fn fwd_mul(args: &[&dyn Value], _aux: &[Aux]) -> Result<Box<dyn Value>, TraceError> {
    let (a, b) = binary("mul", args)?;
    Ok(boxed(a.mul(&b)))
}

fn fwd_div(args: &[&dyn Value], _aux: &[Aux]) -> Result<Box<dyn Value>, TraceError> {
    let (a, b) = binary("div", args)?;
    Ok(boxed(a.div(&b)?))
}

fn fwd_neg(args: &[&dyn Value], _aux: &[Aux]) -> Result<Box<dyn Value>, TraceError> {
    Ok(boxed(unary("neg", args)?.neg()))
}

fn fwd_sin(args: &[&dyn Value], _aux: &[Aux]) -> Result<Box<dyn Value>, TraceError> {
    Ok(boxed(unary("sin", args)?.sin_cos().0))
}

fn fwd_cos(args: &[&dyn Value], _aux: &[Aux]) -> Result<Box<dyn Value>, TraceError> {
    Ok(boxed(unary("cos", args)?.sin_cos().1))
}

fn fwd_exp(args: &[&dyn Value], _aux: &[Aux]) -> Result<Box<dyn Value>, TraceError> {
    Ok(boxed(unary("exp", args)?.exp()))
}

fn fwd_log(args: &[&dyn Value], _aux: &[Aux]) -> Result<Box<dyn Value>, TraceError> {
    Ok(boxed(unary("log", args)?.ln()?))
}

fn fwd_sqrt(args: &[&dyn Value], _aux: &[Aux]) -> Result<Box<dyn Value>, TraceError> {
    Ok(boxed(unary("sqrt", args)?.sqrt()?))
}

fn pb_add(
    adjoint: &dyn Value,
    args: &[&dyn Value],
    _value: &dyn Value,
    _aux: &[Aux],
) -> Result<Vec<Box<dyn Value>>, TraceError> {
    binary("add", args)?;
    let ybar = adjoint_utp(adjoint)?;
    Ok(vec![
        shaped(args[0], ybar.clone()),
        shaped(args[1], ybar),
    ])
}

fn pb_sub(
    adjoint: &dyn Value,
    args: &[&dyn Value],
    _value: &dyn Value,
    _aux: &[Aux],
) -> Result<Vec<Box<dyn Value>>, TraceError> {
    binary("sub", args)?;
    let ybar = adjoint_utp(adjoint)?;
    Ok(vec![
        shaped(args[0], ybar.clone()),
        shaped(args[1], ybar.neg()),
    ])
}

fn pb_mul(
    adjoint: &dyn Value,
    args: &[&dyn Value],
    _value: &dyn Value,
    _aux: &[Aux],
) -> Result<Vec<Box<dyn Value>>, TraceError> {
    let (a, b) = binary("mul", args)?;
    let ybar = adjoint_utp(adjoint)?;
    Ok(vec![
        shaped(args[0], ybar.mul(&b)),
        shaped(args[1], ybar.mul(&a)),
    ])
}

fn pb_div(
    adjoint: &dyn Value,
    args: &[&dyn Value],
    value: &dyn Value,
    _aux: &[Aux],
) -> Result<Vec<Box<dyn Value>>, TraceError> {
    let (_, b) = binary("div", args)?;
    let ybar = adjoint_utp(adjoint)?;
    let y = lift(value, ybar.order())?;
    let abar = ybar.div(&b)?;
    let bbar = ybar.mul(&y).div(&b)?.neg();
    Ok(vec![shaped(args[0], abar), shaped(args[1], bbar)])
}

fn pb_neg(
    adjoint: &dyn Value,
    args: &[&dyn Value],
    _value: &dyn Value,
    _aux: &[Aux],
) -> Result<Vec<Box<dyn Value>>, TraceError> {
    unary("neg", args)?;
    let ybar = adjoint_utp(adjoint)?;
    Ok(vec![shaped(args[0], ybar.neg())])
}

fn pb_sin(
    adjoint: &dyn Value,
    args: &[&dyn Value],
    _value: &dyn Value,
    _aux: &[Aux],
) -> Result<Vec<Box<dyn Value>>, TraceError> {
    let x = unary("sin", args)?;
    let ybar = adjoint_utp(adjoint)?;
    Ok(vec![shaped(args[0], ybar.mul(&x.sin_cos().1))])
}

fn pb_cos(
    adjoint: &dyn Value,
    args: &[&dyn Value],
    _value: &dyn Value,
    _aux: &[Aux],
) -> Result<Vec<Box<dyn Value>>, TraceError> {
    let x = unary("cos", args)?;
    let ybar = adjoint_utp(adjoint)?;
    Ok(vec![shaped(args[0], ybar.mul(&x.sin_cos().0).neg())])
}

fn pb_exp(
    adjoint: &dyn Value,
    args: &[&dyn Value],
    value: &dyn Value,
    _aux: &[Aux],
) -> Result<Vec<Box<dyn Value>>, TraceError> {
    unary("exp", args)?;
    let ybar = adjoint_utp(adjoint)?;
    let y = lift(value, ybar.order())?;
    Ok(vec![shaped(args[0], ybar.mul(&y))])
}

fn pb_log(
    adjoint: &dyn Value,
    args: &[&dyn Value],
    _value: &dyn Value,
    _aux: &[Aux],
) -> Result<Vec<Box<dyn Value>>, TraceError> {
    let x = unary("log", args)?;
    let ybar = adjoint_utp(adjoint)?;
    Ok(vec![shaped(args[0], ybar.div(&x)?)])
}

fn pb_sqrt(
    adjoint: &dyn Value,
    args: &[&dyn Value],
    value: &dyn Value,
    _aux: &[Aux],
) -> Result<Vec<Box<dyn Value>>, TraceError> {
    unary("sqrt", args)?;
    let ybar = adjoint_utp(adjoint)?;
    let y = lift(value, ybar.order())?;
    let two = Utp::constant(2.0, y.order());
    Ok(vec![shaped(args[0], ybar.div(&two.mul(&y))?)])
}
