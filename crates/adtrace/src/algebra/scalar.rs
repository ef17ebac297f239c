//! Scalar (`f64`) algebra adapter.
//!
//! Forward and pullback evaluators for the elementary operation set over
//! plain `f64` values. Elementary-function pullbacks take their first
//! derivative from the [`nthderiv`](crate::nthderiv) oracle; domain errors
//! (log of a non-positive value, etc.) surface from there and are never
//! masked.

use crate::error::TraceError;
use crate::nthderiv;
use crate::registry::{Registry, ops};
use crate::value::{Aux, Value, ValueTuple, as_f64, boxed};
use std::any::TypeId;

/// Install the f64 evaluators into `registry`.
pub fn register(registry: &mut Registry) {
    let t = TypeId::of::<f64>();

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
    registry.register_forward(ops::POWI, t, fwd_powi);
    registry.register_forward(ops::SINCOS, t, fwd_sincos);

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
    registry.register_pullback(ops::POWI, t, pb_powi);
    registry.register_pullback(ops::SINCOS, t, pb_sincos);
}

fn unary(op: &'static str, args: &[&dyn Value]) -> Result<f64, TraceError> {
    if args.len() != 1 {
        return Err(TraceError::Arity {
            op,
            expected: 1,
            actual: args.len(),
        });
    }
    as_f64(args[0])
}

fn binary(op: &'static str, args: &[&dyn Value]) -> Result<(f64, f64), TraceError> {
    if args.len() != 2 {
        return Err(TraceError::Arity {
            op,
            expected: 2,
            actual: args.len(),
        });
    }
    Ok((as_f64(args[0])?, as_f64(args[1])?))
}

fn powi_exponent(aux: &[Aux]) -> Result<i32, TraceError> {
    aux.first()
        .and_then(Aux::as_int)
        .and_then(|k| i32::try_from(k).ok())
        .ok_or(TraceError::MissingAux {
            op: ops::POWI.name(),
            index: 0,
        })
}

fn fwd_add(args: &[&dyn Value], _aux: &[Aux]) -> Result<Box<dyn Value>, TraceError> {
    let (a, b) = binary("add", args)?;
    Ok(boxed(a + b))
}

fn fwd_sub(args: &[&dyn Value], _aux: &[Aux]) -> Result<Box<dyn Value>, TraceError> {
    let (a, b) = binary("sub", args)?;
    Ok(boxed(a - b))
}

fn fwd_mul(args: &[&dyn Value], _aux: &[Aux]) -> Result<Box<dyn Value>, TraceError> {
    let (a, b) = binary("mul", args)?;
    Ok(boxed(a * b))
}

fn fwd_div(args: &[&dyn Value], _aux: &[Aux]) -> Result<Box<dyn Value>, TraceError> {
    let (a, b) = binary("div", args)?;
    Ok(boxed(a / b))
}

fn fwd_neg(args: &[&dyn Value], _aux: &[Aux]) -> Result<Box<dyn Value>, TraceError> {
    Ok(boxed(-unary("neg", args)?))
}

fn fwd_sin(args: &[&dyn Value], _aux: &[Aux]) -> Result<Box<dyn Value>, TraceError> {
    Ok(boxed(nthderiv::sin(unary("sin", args)?, 0)?))
}

fn fwd_cos(args: &[&dyn Value], _aux: &[Aux]) -> Result<Box<dyn Value>, TraceError> {
    Ok(boxed(nthderiv::cos(unary("cos", args)?, 0)?))
}

fn fwd_exp(args: &[&dyn Value], _aux: &[Aux]) -> Result<Box<dyn Value>, TraceError> {
    Ok(boxed(nthderiv::exp(unary("exp", args)?, 0)?))
}

fn fwd_log(args: &[&dyn Value], _aux: &[Aux]) -> Result<Box<dyn Value>, TraceError> {
    Ok(boxed(nthderiv::log(unary("log", args)?, 0)?))
}

fn fwd_sqrt(args: &[&dyn Value], _aux: &[Aux]) -> Result<Box<dyn Value>, TraceError> {
    Ok(boxed(nthderiv::sqrt(unary("sqrt", args)?, 0)?))
}

fn fwd_powi(args: &[&dyn Value], aux: &[Aux]) -> Result<Box<dyn Value>, TraceError> {
    let x = unary("powi", args)?;
    Ok(boxed(x.powi(powi_exponent(aux)?)))
}

fn fwd_sincos(args: &[&dyn Value], _aux: &[Aux]) -> Result<Box<dyn Value>, TraceError> {
    let x = unary("sincos", args)?;
    Ok(boxed(ValueTuple(vec![boxed(x.sin()), boxed(x.cos())])))
}

fn pb_add(
    adjoint: &dyn Value,
    args: &[&dyn Value],
    _value: &dyn Value,
    _aux: &[Aux],
) -> Result<Vec<Box<dyn Value>>, TraceError> {
    binary("add", args)?;
    let ybar = as_f64(adjoint)?;
    Ok(vec![boxed(ybar), boxed(ybar)])
}

fn pb_sub(
    adjoint: &dyn Value,
    args: &[&dyn Value],
    _value: &dyn Value,
    _aux: &[Aux],
) -> Result<Vec<Box<dyn Value>>, TraceError> {
    binary("sub", args)?;
    let ybar = as_f64(adjoint)?;
    Ok(vec![boxed(ybar), boxed(-ybar)])
}

fn pb_mul(
    adjoint: &dyn Value,
    args: &[&dyn Value],
    _value: &dyn Value,
    _aux: &[Aux],
) -> Result<Vec<Box<dyn Value>>, TraceError> {
    let (a, b) = binary("mul", args)?;
    let ybar = as_f64(adjoint)?;
    Ok(vec![boxed(ybar * b), boxed(ybar * a)])
}

fn pb_div(
    adjoint: &dyn Value,
    args: &[&dyn Value],
    value: &dyn Value,
    _aux: &[Aux],
) -> Result<Vec<Box<dyn Value>>, TraceError> {
    let (_, b) = binary("div", args)?;
    let ybar = as_f64(adjoint)?;
    let y = as_f64(value)?;
    Ok(vec![boxed(ybar / b), boxed(-ybar * y / b)])
}

fn pb_neg(
    adjoint: &dyn Value,
    args: &[&dyn Value],
    _value: &dyn Value,
    _aux: &[Aux],
) -> Result<Vec<Box<dyn Value>>, TraceError> {
    unary("neg", args)?;
    Ok(vec![boxed(-as_f64(adjoint)?)])
}

fn pb_sin(
    adjoint: &dyn Value,
    args: &[&dyn Value],
    _value: &dyn Value,
    _aux: &[Aux],
) -> Result<Vec<Box<dyn Value>>, TraceError> {
    let x = unary("sin", args)?;
    Ok(vec![boxed(as_f64(adjoint)? * nthderiv::sin(x, 1)?)])
}

fn pb_cos(
    adjoint: &dyn Value,
    args: &[&dyn Value],
    _value: &dyn Value,
    _aux: &[Aux],
) -> Result<Vec<Box<dyn Value>>, TraceError> {
    let x = unary("cos", args)?;
    Ok(vec![boxed(as_f64(adjoint)? * nthderiv::cos(x, 1)?)])
}

fn pb_exp(
    adjoint: &dyn Value,
    args: &[&dyn Value],
    _value: &dyn Value,
    _aux: &[Aux],
) -> Result<Vec<Box<dyn Value>>, TraceError> {
    let x = unary("exp", args)?;
    Ok(vec![boxed(as_f64(adjoint)? * nthderiv::exp(x, 1)?)])
}

fn pb_log(
    adjoint: &dyn Value,
    args: &[&dyn Value],
    _value: &dyn Value,
    _aux: &[Aux],
) -> Result<Vec<Box<dyn Value>>, TraceError> {
    let x = unary("log", args)?;
    Ok(vec![boxed(as_f64(adjoint)? * nthderiv::log(x, 1)?)])
}

fn pb_sqrt(
    adjoint: &dyn Value,
    args: &[&dyn Value],
    _value: &dyn Value,
    _aux: &[Aux],
) -> Result<Vec<Box<dyn Value>>, TraceError> {
    let x = unary("sqrt", args)?;
    Ok(vec![boxed(as_f64(adjoint)? * nthderiv::sqrt(x, 1)?)])
}

fn pb_powi(
    adjoint: &dyn Value,
    args: &[&dyn Value],
    _value: &dyn Value,
    aux: &[Aux],
) -> Result<Vec<Box<dyn Value>>, TraceError> {
    let x = unary("powi", args)?;
    let k = powi_exponent(aux)?;
    let grad = f64::from(k) * x.powi(k - 1);
    Ok(vec![boxed(as_f64(adjoint)? * grad)])
}

/// Pullback of the two-output (sin x, cos x) node. The evaluator sees both
/// output adjoints at once: contributions through either output mix into
/// the single argument.
fn pb_sincos(
    adjoint: &dyn Value,
    args: &[&dyn Value],
    _value: &dyn Value,
    _aux: &[Aux],
) -> Result<Vec<Box<dyn Value>>, TraceError> {
    let x = unary("sincos", args)?;
    let tuple = adjoint
        .as_any()
        .downcast_ref::<ValueTuple>()
        .ok_or(TraceError::TypeMismatch {
            expected: "tuple",
            actual: adjoint.type_label(),
        })?;
    if tuple.arity() != 2 {
        return Err(TraceError::TypeMismatch {
            expected: "tuple of arity 2",
            actual: "tuple",
        });
    }
    let sbar = as_f64(tuple.0[0].as_ref())?;
    let cbar = as_f64(tuple.0[1].as_ref())?;
    Ok(vec![boxed(sbar * x.cos() - cbar * x.sin())])
}
