//! Reduction operators for inscan reductions.
//!
//! A `ReductionOperator` names one of the built-in combiners (or carries a
//! user supplied one). Before a construct starts the operator is resolved
//! into a [`Combiner`]: the identity plus one shared function object, so the
//! hot loops never match on the operator kind again.

use num_traits::{PrimInt, WrappingAdd, WrappingMul};
use std::fmt;
use std::sync::Arc;

/// Value domain of the built-in operators.
///
/// Every primitive integer qualifies. Sum and product wrap on overflow so
/// the result is the same for every grouping of the iteration space.
pub trait ScanValue:
    PrimInt + WrappingAdd + WrappingMul + Send + Sync + fmt::Debug + 'static
{
}

impl<T> ScanValue for T where
    T: PrimInt + WrappingAdd + WrappingMul + Send + Sync + fmt::Debug + 'static
{
}

type CombineFn<T> = Arc<dyn Fn(T, T) -> T + Send + Sync>;

/// A user supplied associative combine with its identity.
///
/// Associativity is a caller contract; it cannot be checked at runtime.
#[derive(Clone)]
pub struct CustomOperator<T> {
    pub name: &'static str,
    pub identity: T,
    combine: CombineFn<T>,
}

impl<T> CustomOperator<T> {
    pub fn new<F>(name: &'static str, identity: T, combine: F) -> Self
    where
        F: Fn(T, T) -> T + Send + Sync + 'static,
    {
        Self {
            name,
            identity,
            combine: Arc::new(combine),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for CustomOperator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomOperator")
            .field("name", &self.name)
            .field("identity", &self.identity)
            .finish()
    }
}

/// Reduction identifiers accepted by an inscan reduction.
#[derive(Clone, Debug)]
pub enum ReductionOperator<T> {
    /// `+`, identity 0
    Sum,
    /// `*`, identity 1
    Product,
    /// `min`, identity is the largest value of the type
    Min,
    /// `max`, identity is the smallest value of the type
    Max,
    /// `&`, identity all-ones
    BitAnd,
    /// `|`, identity 0
    BitOr,
    /// `^`, identity 0
    BitXor,
    /// `&&` over the normalised domain {0, 1}, identity 1
    LogicalAnd,
    /// `||` over the normalised domain {0, 1}, identity 0
    LogicalOr,
    Custom(CustomOperator<T>),
}

impl<T: ScanValue> ReductionOperator<T> {
    /// All built-in operators, in declaration order.
    pub fn builtins() -> [Self; 9] {
        [
            Self::Sum,
            Self::Product,
            Self::Min,
            Self::Max,
            Self::BitAnd,
            Self::BitOr,
            Self::BitXor,
            Self::LogicalAnd,
            Self::LogicalOr,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Sum => "+",
            Self::Product => "*",
            Self::Min => "min",
            Self::Max => "max",
            Self::BitAnd => "&",
            Self::BitOr => "|",
            Self::BitXor => "^",
            Self::LogicalAnd => "&&",
            Self::LogicalOr => "||",
            Self::Custom(custom) => custom.name,
        }
    }

    pub fn identity(&self) -> T {
        match self {
            Self::Sum | Self::BitOr | Self::BitXor | Self::LogicalOr => T::zero(),
            Self::Product | Self::LogicalAnd => T::one(),
            Self::Min => T::max_value(),
            Self::Max => T::min_value(),
            Self::BitAnd => !T::zero(),
            Self::Custom(custom) => custom.identity,
        }
    }

    /// Resolves the operator into a [`Combiner`] for one construct instance.
    pub fn resolve(&self) -> Combiner<T> {
        let combine: CombineFn<T> = match self {
            Self::Sum => Arc::new(|a: T, b: T| a.wrapping_add(&b)),
            Self::Product => Arc::new(|a: T, b: T| a.wrapping_mul(&b)),
            Self::Min => Arc::new(|a: T, b: T| a.min(b)),
            Self::Max => Arc::new(|a: T, b: T| a.max(b)),
            Self::BitAnd => Arc::new(|a: T, b: T| a & b),
            Self::BitOr => Arc::new(|a: T, b: T| a | b),
            Self::BitXor => Arc::new(|a: T, b: T| a ^ b),
            Self::LogicalAnd => Arc::new(|a: T, b: T| truth(!a.is_zero() && !b.is_zero())),
            Self::LogicalOr => Arc::new(|a: T, b: T| truth(!a.is_zero() || !b.is_zero())),
            Self::Custom(custom) => Arc::clone(&custom.combine),
        };
        Combiner {
            name: self.name(),
            identity: self.identity(),
            combine,
        }
    }
}

fn truth<T: ScanValue>(value: bool) -> T {
    if value {
        T::one()
    } else {
        T::zero()
    }
}

impl<T: ScanValue> From<ReductionOperator<T>> for Combiner<T> {
    fn from(operator: ReductionOperator<T>) -> Self {
        operator.resolve()
    }
}

impl<T: Copy> From<CustomOperator<T>> for Combiner<T> {
    fn from(custom: CustomOperator<T>) -> Self {
        Combiner {
            name: custom.name,
            identity: custom.identity,
            combine: custom.combine,
        }
    }
}

/// A resolved reduction operator: identity plus combine function.
///
/// Cheap to clone; every worker of a team shares the same function object.
#[derive(Clone)]
pub struct Combiner<T> {
    name: &'static str,
    identity: T,
    combine: CombineFn<T>,
}

impl<T: Copy> Combiner<T> {
    /// Builds a combiner for any `Copy` value domain, e.g. floats or tuples.
    pub fn custom<F>(name: &'static str, identity: T, combine: F) -> Self
    where
        F: Fn(T, T) -> T + Send + Sync + 'static,
    {
        CustomOperator::new(name, identity, combine).into()
    }

    #[inline]
    pub fn identity(&self) -> T {
        self.identity
    }

    #[inline]
    pub fn combine(&self, a: T, b: T) -> T {
        (self.combine)(a, b)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Left-to-right fold starting from the identity.
    pub fn fold<I: IntoIterator<Item = T>>(&self, values: I) -> T {
        values
            .into_iter()
            .fold(self.identity, |acc, value| self.combine(acc, value))
    }
}

impl<T: fmt::Debug> fmt::Debug for Combiner<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Combiner")
            .field("name", &self.name)
            .field("identity", &self.identity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_builtin_identities() {
        assert_eq!(ReductionOperator::<i32>::Sum.identity(), 0);
        assert_eq!(ReductionOperator::<i32>::Product.identity(), 1);
        assert_eq!(ReductionOperator::<i32>::Min.identity(), i32::MAX);
        assert_eq!(ReductionOperator::<i32>::Max.identity(), i32::MIN);
        assert_eq!(ReductionOperator::<u8>::BitAnd.identity(), 0xff);
        assert_eq!(ReductionOperator::<i64>::LogicalAnd.identity(), 1);
        assert_eq!(ReductionOperator::<i64>::LogicalOr.identity(), 0);
    }

    #[test]
    fn test_sum_wraps_instead_of_overflowing() {
        let sum = ReductionOperator::<i32>::Sum.resolve();
        assert_eq!(sum.combine(i32::MAX, 1), i32::MIN);
    }

    #[test]
    fn test_logical_operators_normalise() {
        let and = ReductionOperator::<i32>::LogicalAnd.resolve();
        let or = ReductionOperator::<i32>::LogicalOr.resolve();
        assert_eq!(and.combine(7, -3), 1);
        assert_eq!(and.combine(7, 0), 0);
        assert_eq!(or.combine(0, 42), 1);
        assert_eq!(or.combine(0, 0), 0);
    }

    #[test]
    fn test_custom_operator_keeps_order() {
        // Affine maps x -> a*x + b composed left to right; not commutative.
        let compose = Combiner::custom("compose", (1i64, 0i64), |(a1, b1), (a2, b2)| {
            (a1 * a2, b1 * a2 + b2)
        });
        let folded = compose.fold(vec![(2, 1), (3, 0), (1, 5)]);
        assert_eq!(folded, (6, 8));
        assert_eq!(compose.name(), "compose");
    }

    #[test]
    fn test_fold_of_nothing_is_identity() {
        let max = ReductionOperator::<i16>::Max.resolve();
        assert_eq!(max.fold(Vec::new()), i16::MIN);
    }

    proptest! {
        #[test]
        fn test_identity_is_neutral(x in any::<i32>()) {
            for op in ReductionOperator::<i32>::builtins() {
                let combiner = op.resolve();
                let x = match op {
                    ReductionOperator::LogicalAnd | ReductionOperator::LogicalOr => (x != 0) as i32,
                    _ => x,
                };
                prop_assert_eq!(
                    combiner.combine(combiner.identity(), x),
                    x,
                    "operator {}",
                    op.name()
                );
            }
        }

        #[test]
        fn test_builtins_are_associative(a in any::<i64>(), b in any::<i64>(), c in any::<i64>()) {
            for op in ReductionOperator::<i64>::builtins() {
                let f = op.resolve();
                prop_assert_eq!(
                    f.combine(f.combine(a, b), c),
                    f.combine(a, f.combine(b, c)),
                    "operator {}", op.name()
                );
            }
        }
    }
}
