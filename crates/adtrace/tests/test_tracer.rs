//! Integration tests for graph tracing, forward replay, and pullback.
//!
//! Analytic gradients from the tracer are checked against hand-derived
//! formulas and central-difference numerical gradients.

use adtrace::value::boxed;
use adtrace::{Session, TraceError, ValueTuple};
use approx::assert_relative_eq;

/// Compute numerical gradient using central difference.
///
/// grad_i ≈ (f(x + eps*e_i) - f(x - eps*e_i)) / (2*eps)
fn numerical_gradient<F>(f: F, x: &[f64], eps: f64) -> Vec<f64>
where
    F: Fn(&[f64]) -> f64,
{
    let mut grad = vec![0.0; x.len()];
    let mut x_plus = x.to_vec();
    let mut x_minus = x.to_vec();

    for i in 0..x.len() {
        x_plus[i] = x[i] + eps;
        x_minus[i] = x[i] - eps;
        grad[i] = (f(&x_plus) - f(&x_minus)) / (2.0 * eps);
        x_plus[i] = x[i];
        x_minus[i] = x[i];
    }
    grad
}

#[test]
fn test_end_to_end_product_of_sum() {
    // y = x1 * (x2 + x3) at (2, 3, 4)
    let session = Session::new();
    let x1 = session.leaf(2.0);
    let x2 = session.leaf(3.0);
    let x3 = session.leaf(4.0);
    let sum = &x2 + &x3;
    let y = &x1 * &sum;

    assert_eq!(y.scalar_value().unwrap(), 14.0);

    session.set_independent(&[&x1, &x2, &x3]).unwrap();
    session.set_dependent(&[&y]).unwrap();
    session.pullback(vec![boxed(1.0)]).unwrap();

    assert_eq!(x1.scalar_adjoint().unwrap(), 7.0);
    assert_eq!(x2.scalar_adjoint().unwrap(), 2.0);
    assert_eq!(x3.scalar_adjoint().unwrap(), 2.0);
}

#[test]
fn test_adjoint_fan_in_sum() {
    // y = x*x + x at x = 3: dy/dx = 2x + 1 = 7
    let session = Session::new();
    let x = session.leaf(3.0);
    let sq = &x * &x;
    let y = &sq + &x;

    session.set_independent(&[&x]).unwrap();
    session.set_dependent(&[&y]).unwrap();
    session.pullback(vec![boxed(1.0)]).unwrap();

    assert_eq!(x.scalar_adjoint().unwrap(), 7.0);
}

#[test]
fn test_chain_rule_sin_of_square() {
    // y = sin(x*x) at x = 2: dy/dx = 2x cos(x^2)
    let session = Session::new();
    let x = session.leaf(2.0);
    let y = (&x * &x).sin().unwrap();

    session.set_independent(&[&x]).unwrap();
    session.set_dependent(&[&y]).unwrap();
    session.pullback(vec![boxed(1.0)]).unwrap();

    assert_relative_eq!(
        x.scalar_adjoint().unwrap(),
        2.0 * 2.0 * 4.0_f64.cos(),
        epsilon = 1e-12
    );
}

#[test]
fn test_push_forward_replays_new_inputs() {
    let session = Session::new();
    let x1 = session.leaf(2.0);
    let x2 = session.leaf(3.0);
    let x3 = session.leaf(4.0);
    let sum = &x2 + &x3;
    let y = &x1 * &sum;
    session.set_independent(&[&x1, &x2, &x3]).unwrap();
    session.set_dependent(&[&y]).unwrap();

    session
        .push_forward(vec![boxed(1.0), boxed(10.0), boxed(20.0)])
        .unwrap();
    assert_eq!(y.scalar_value().unwrap(), 30.0);
    // intermediate nodes were refreshed too
    assert_eq!(sum.scalar_value().unwrap(), 30.0);
}

#[test]
fn test_push_forward_idempotent() {
    let session = Session::new();
    let x = session.leaf(1.5);
    let y = (&x * &x).exp().unwrap();
    session.set_independent(&[&x]).unwrap();
    session.set_dependent(&[&y]).unwrap();

    session.push_forward(vec![boxed(0.7)]).unwrap();
    let first = y.scalar_value().unwrap();
    session.push_forward(vec![boxed(0.7)]).unwrap();
    let second = y.scalar_value().unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_zero_seed_gives_zero_adjoints() {
    let session = Session::new();
    let x = session.leaf(3.0);
    let y = (&x * &x).sin().unwrap();
    session.set_independent(&[&x]).unwrap();
    session.set_dependent(&[&y]).unwrap();

    session.pullback(vec![boxed(0.0)]).unwrap();
    assert_eq!(x.scalar_adjoint().unwrap(), 0.0);
}

#[test]
fn test_pullback_reruns_from_scratch() {
    // adjoints are zero-initialized per pass, never carried over
    let session = Session::new();
    let x = session.leaf(3.0);
    let y = &x * &x;
    session.set_independent(&[&x]).unwrap();
    session.set_dependent(&[&y]).unwrap();

    session.pullback(vec![boxed(1.0)]).unwrap();
    let first = x.scalar_adjoint().unwrap();
    session.pullback(vec![boxed(1.0)]).unwrap();
    let second = x.scalar_adjoint().unwrap();
    assert_eq!(first, 6.0);
    assert_eq!(second, 6.0);
}

#[test]
fn test_multi_output_scatter() {
    // (s, c) = sincos(x); z = s * c; dz/dx = cos(2x)
    let x0 = 0.4;
    let session = Session::new();
    let x = session.leaf(x0);
    let sc = x.sincos().unwrap();
    let s = sc.select(0).unwrap();
    let c = sc.select(1).unwrap();
    let z = &s * &c;

    assert_relative_eq!(z.scalar_value().unwrap(), x0.sin() * x0.cos());

    session.set_independent(&[&x]).unwrap();
    session.set_dependent(&[&z]).unwrap();
    session.pullback(vec![boxed(1.0)]).unwrap();

    assert_relative_eq!(
        x.scalar_adjoint().unwrap(),
        (2.0 * x0).cos(),
        epsilon = 1e-12
    );

    // the tuple node's adjoint collected both selection paths
    let tuple_adjoint = sc.adjoint_as::<ValueTuple>().unwrap();
    let sbar = tuple_adjoint
        .get(0)
        .and_then(|v| v.as_any().downcast_ref::<f64>())
        .copied()
        .unwrap();
    let cbar = tuple_adjoint
        .get(1)
        .and_then(|v| v.as_any().downcast_ref::<f64>())
        .copied()
        .unwrap();
    assert_relative_eq!(sbar, x0.cos(), epsilon = 1e-12);
    assert_relative_eq!(cbar, x0.sin(), epsilon = 1e-12);
}

#[test]
fn test_multiple_dependents_seeded_separately() {
    // y1 = x1 + x2, y2 = x1 * x2; seeds (1, 0) then (0, 1)
    let session = Session::new();
    let x1 = session.leaf(3.0);
    let x2 = session.leaf(5.0);
    let y1 = &x1 + &x2;
    let y2 = &x1 * &x2;
    session.set_independent(&[&x1, &x2]).unwrap();
    session.set_dependent(&[&y1, &y2]).unwrap();

    session.pullback(vec![boxed(1.0), boxed(0.0)]).unwrap();
    assert_eq!(x1.scalar_adjoint().unwrap(), 1.0);
    assert_eq!(x2.scalar_adjoint().unwrap(), 1.0);

    session.pullback(vec![boxed(0.0), boxed(1.0)]).unwrap();
    assert_eq!(x1.scalar_adjoint().unwrap(), 5.0);
    assert_eq!(x2.scalar_adjoint().unwrap(), 3.0);
}

#[test]
fn test_numerical_gradient_composite() {
    // f(x) = exp(sin(x) * x) + sqrt(x)
    let eval = |x: &[f64]| -> f64 { (x[0].sin() * x[0]).exp() + x[0].sqrt() };
    let x0 = [1.3];
    let numerical = numerical_gradient(eval, &x0, 1e-6);

    let session = Session::new();
    let x = session.leaf(x0[0]);
    let y = &(&x.sin().unwrap() * &x).exp().unwrap() + &x.sqrt().unwrap();
    session.set_independent(&[&x]).unwrap();
    session.set_dependent(&[&y]).unwrap();
    session.pullback(vec![boxed(1.0)]).unwrap();

    assert_relative_eq!(y.scalar_value().unwrap(), eval(&x0), epsilon = 1e-12);
    assert_relative_eq!(x.scalar_adjoint().unwrap(), numerical[0], epsilon = 1e-5);
}

#[test]
fn test_numerical_gradient_multivariate() {
    // f(x1, x2) = x1 / x2 + log(x1 * x2)
    let eval = |x: &[f64]| -> f64 { x[0] / x[1] + (x[0] * x[1]).ln() };
    let x0 = [2.0, 0.7];
    let numerical = numerical_gradient(eval, &x0, 1e-6);

    let session = Session::new();
    let x1 = session.leaf(x0[0]);
    let x2 = session.leaf(x0[1]);
    let y = &(&x1 / &x2) + &(&x1 * &x2).ln().unwrap();
    session.set_independent(&[&x1, &x2]).unwrap();
    session.set_dependent(&[&y]).unwrap();
    session.pullback(vec![boxed(1.0)]).unwrap();

    assert_relative_eq!(x1.scalar_adjoint().unwrap(), numerical[0], epsilon = 1e-5);
    assert_relative_eq!(x2.scalar_adjoint().unwrap(), numerical[1], epsilon = 1e-5);
}

#[test]
fn test_pullback_seed_count_mismatch() {
    let session = Session::new();
    let x = session.leaf(1.0);
    let y = &x * &x;
    session.set_independent(&[&x]).unwrap();
    session.set_dependent(&[&y]).unwrap();

    let err = session.pullback(vec![]).unwrap_err();
    assert!(matches!(err, TraceError::Configuration(_)));
}

#[test]
fn test_push_forward_input_count_mismatch() {
    let session = Session::new();
    let x = session.leaf(1.0);
    session.set_independent(&[&x]).unwrap();

    let err = session
        .push_forward(vec![boxed(1.0), boxed(2.0)])
        .unwrap_err();
    assert!(matches!(err, TraceError::Configuration(_)));
}

#[test]
fn test_gradient_then_replay_then_gradient() {
    // values and adjoints stay mutually consistent across passes
    let session = Session::new();
    let x = session.leaf(2.0);
    let y = (&x * &x).sin().unwrap();
    session.set_independent(&[&x]).unwrap();
    session.set_dependent(&[&y]).unwrap();

    session.pullback(vec![boxed(1.0)]).unwrap();
    assert_relative_eq!(
        x.scalar_adjoint().unwrap(),
        4.0 * 4.0_f64.cos(),
        epsilon = 1e-12
    );

    session.push_forward(vec![boxed(1.0)]).unwrap();
    session.pullback(vec![boxed(1.0)]).unwrap();
    assert_relative_eq!(
        x.scalar_adjoint().unwrap(),
        2.0 * 1.0_f64.cos(),
        epsilon = 1e-12
    );
}

#[test]
fn test_powi_gradient() {
    let session = Session::new();
    let x = session.leaf(1.5);
    let y = x.powi(4).unwrap();
    session.set_independent(&[&x]).unwrap();
    session.set_dependent(&[&y]).unwrap();
    session.pullback(vec![boxed(1.0)]).unwrap();

    assert_relative_eq!(
        x.scalar_adjoint().unwrap(),
        4.0 * 1.5_f64.powi(3),
        epsilon = 1e-12
    );
}
