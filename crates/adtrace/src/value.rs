//! Type-erased traced values.
//!
//! The graph engine is agnostic to which concrete algebra is being
//! differentiated: a node's value may be a scalar, a Taylor polynomial, or a
//! tuple of either for multi-output operations. The `Value` trait erases the
//! concrete type while preserving what replay needs: cloning, downcasting,
//! a zero-like constructor for adjoint initialization, and in-place additive
//! accumulation for the fan-in sum.

use crate::error::TraceError;
use std::any::Any;
use std::fmt::Debug;

/// A value carried by a computation graph node.
///
/// Implemented by each algebra's value type (and by [`ValueTuple`] for
/// multi-output operations). Not `Send`: the computation graph is
/// single-threaded and values are never shared across threads.
pub trait Value: Debug {
    /// Clone into a boxed trait object.
    fn clone_boxed(&self) -> Box<dyn Value>;

    /// Downcast to the concrete type.
    fn as_any(&self) -> &dyn Any;

    /// Mutable downcast to the concrete type.
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// The additive identity with the same shape as `self`.
    ///
    /// Used to zero-initialize adjoints before accumulation.
    fn zeros_like(&self) -> Box<dyn Value>;

    /// In-place accumulation: `self += rhs`.
    ///
    /// Fails with [`TraceError::TypeMismatch`] if `rhs` is not the same
    /// concrete type (or shape) as `self`.
    fn add_assign_value(&mut self, rhs: &dyn Value) -> Result<(), TraceError>;

    /// Short type label for diagnostics.
    fn type_label(&self) -> &'static str;
}

impl Clone for Box<dyn Value> {
    fn clone(&self) -> Self {
        self.clone_boxed()
    }
}

impl Value for f64 {
    fn clone_boxed(&self) -> Box<dyn Value> {
        Box::new(*self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn zeros_like(&self) -> Box<dyn Value> {
        Box::new(0.0)
    }

    fn add_assign_value(&mut self, rhs: &dyn Value) -> Result<(), TraceError> {
        let rhs = rhs
            .as_any()
            .downcast_ref::<f64>()
            .ok_or(TraceError::TypeMismatch {
                expected: "f64",
                actual: rhs.type_label(),
            })?;
        *self += rhs;
        Ok(())
    }

    fn type_label(&self) -> &'static str {
        "f64"
    }
}

/// Ordered tuple of values, produced by multi-output operations.
///
/// A multi-output operation produces a single node whose value is a
/// `ValueTuple` and whose adjoint is the matching tuple of per-output
/// sensitivities. Downstream consumers pick slots out with the structural
/// `select` operation.
#[derive(Debug, Clone)]
pub struct ValueTuple(pub Vec<Box<dyn Value>>);

impl ValueTuple {
    /// Number of outputs in the tuple.
    pub fn arity(&self) -> usize {
        self.0.len()
    }

    /// Borrow slot `index`, if in range.
    pub fn get(&self, index: usize) -> Option<&dyn Value> {
        self.0.get(index).map(|v| v.as_ref())
    }
}

impl Value for ValueTuple {
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
        Box::new(ValueTuple(self.0.iter().map(|v| v.zeros_like()).collect()))
    }

    fn add_assign_value(&mut self, rhs: &dyn Value) -> Result<(), TraceError> {
        let rhs = rhs
            .as_any()
            .downcast_ref::<ValueTuple>()
            .ok_or(TraceError::TypeMismatch {
                expected: "tuple",
                actual: rhs.type_label(),
            })?;
        if rhs.0.len() != self.0.len() {
            return Err(TraceError::TypeMismatch {
                expected: "tuple of matching arity",
                actual: "tuple",
            });
        }
        for (slot, r) in self.0.iter_mut().zip(rhs.0.iter()) {
            slot.add_assign_value(r.as_ref())?;
        }
        Ok(())
    }

    fn type_label(&self) -> &'static str {
        "tuple"
    }
}

/// Auxiliary, non-traced operation argument.
///
/// Carried alongside a node's traced arguments: a selection index, a constant
/// integer exponent, a constant coefficient. Never differentiated.
#[derive(Debug, Clone, PartialEq)]
pub enum Aux {
    Index(usize),
    Int(i64),
    Float(f64),
}

impl Aux {
    /// Interpret as a selection index.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Aux::Index(i) => Some(*i),
            _ => None,
        }
    }

    /// Interpret as a constant integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Aux::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Interpret as a constant float.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Aux::Float(x) => Some(*x),
            _ => None,
        }
    }
}

/// Box a concrete value as a trait object.
pub fn boxed<V: Value + 'static>(value: V) -> Box<dyn Value> {
    Box::new(value)
}

/// Downcast a value reference to `f64`.
pub fn as_f64(value: &dyn Value) -> Result<f64, TraceError> {
    value
        .as_any()
        .downcast_ref::<f64>()
        .copied()
        .ok_or(TraceError::TypeMismatch {
            expected: "f64",
            actual: value.type_label(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_f64_zeros_like() {
        let v: Box<dyn Value> = boxed(3.5);
        let z = v.zeros_like();
        assert_eq!(as_f64(z.as_ref()).unwrap(), 0.0);
    }

    #[test]
    fn test_f64_accumulate() {
        let mut v: Box<dyn Value> = boxed(1.5);
        v.add_assign_value(&2.5).unwrap();
        assert_eq!(as_f64(v.as_ref()).unwrap(), 4.0);
    }

    #[test]
    fn test_accumulate_type_mismatch() {
        let mut v: Box<dyn Value> = boxed(1.0);
        let tuple = ValueTuple(vec![boxed(1.0)]);
        let err = v.add_assign_value(&tuple).unwrap_err();
        assert!(matches!(err, TraceError::TypeMismatch { .. }));
    }

    #[test]
    fn test_tuple_zeros_like() {
        let t = ValueTuple(vec![boxed(1.0), boxed(2.0)]);
        let z = t.zeros_like();
        let z = z.as_any().downcast_ref::<ValueTuple>().unwrap();
        assert_eq!(as_f64(z.get(0).unwrap()).unwrap(), 0.0);
        assert_eq!(as_f64(z.get(1).unwrap()).unwrap(), 0.0);
    }

    #[test]
    fn test_tuple_accumulate_slotwise() {
        let mut t = ValueTuple(vec![boxed(1.0), boxed(2.0)]);
        let rhs = ValueTuple(vec![boxed(10.0), boxed(20.0)]);
        t.add_assign_value(&rhs).unwrap();
        assert_eq!(as_f64(t.get(0).unwrap()).unwrap(), 11.0);
        assert_eq!(as_f64(t.get(1).unwrap()).unwrap(), 22.0);
    }

    #[test]
    fn test_tuple_arity_mismatch() {
        let mut t = ValueTuple(vec![boxed(1.0)]);
        let rhs = ValueTuple(vec![boxed(1.0), boxed(2.0)]);
        assert!(t.add_assign_value(&rhs).is_err());
    }

    #[test]
    fn test_aux_accessors() {
        assert_eq!(Aux::Index(3).as_index(), Some(3));
        assert_eq!(Aux::Int(-2).as_int(), Some(-2));
        assert_eq!(Aux::Float(0.5).as_float(), Some(0.5));
        assert_eq!(Aux::Int(1).as_index(), None);
    }
}
