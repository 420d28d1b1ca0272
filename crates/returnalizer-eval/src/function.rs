//! The `Function` trait and its capability flags.

use returnalizer_common::{CalcError, Value};

use crate::broadcast;

bitflags::bitflags! {
    /// Describes how a function consumes its arguments.
    ///
    /// The registry uses these to pick an evaluation path; `dispatch` lifts
    /// `ELEMENTWISE` functions over array arguments so individual
    /// implementations only ever see scalars.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct FnCaps: u16 {
        /// Same output for the same input, no side effects.
        const PURE          = 0b0000_0001;
        /// Reduces one or more ranges to a single value (`SUM`, `MEDIAN`).
        const REDUCTION     = 0b0000_0010;
        /// Applied to each element of its array arguments independently (`ROUND`).
        const ELEMENTWISE   = 0b0000_0100;
        /// Selects or counts rows of a range (`FILTER`, `COUNTIFS`).
        const LOOKUP        = 0b0000_1000;
        /// Only numeric cells participate; text and booleans in ranges are skipped.
        const NUMERIC_ONLY  = 0b0001_0000;
        /// Produces an array result (`SEQUENCE`, `MODE.MULT`).
        const DYNAMIC_ARRAY = 0b0010_0000;
        /// Arguments may be errors without short-circuiting (`IFERROR`).
        const ERROR_AWARE   = 0b0100_0000;
    }
}

/// Spreadsheet-style callable. Object safe so the registry can hold
/// `Arc<dyn Function>`.
pub trait Function: Send + Sync + 'static {
    fn caps(&self) -> FnCaps {
        FnCaps::PURE
    }
    fn name(&self) -> &'static str;
    fn aliases(&self) -> &'static [&'static str] {
        &[]
    }
    fn min_args(&self) -> usize {
        0
    }
    /// `None` for variadic functions.
    fn max_args(&self) -> Option<usize> {
        Some(self.min_args())
    }

    /// Core work. A returned `Err` becomes an error value at the call site.
    fn eval(&self, args: &[Value]) -> Result<Value, CalcError>;

    /// Arity check, elementwise lifting, then [`Function::eval`].
    fn dispatch(&self, args: &[Value]) -> Value {
        if args.len() < self.min_args() || self.max_args().is_some_and(|max| args.len() > max) {
            return Value::Error(CalcError::new_value().with_message(format!(
                "{} received {} argument(s)",
                self.name(),
                args.len()
            )));
        }
        let result = if self.caps().contains(FnCaps::ELEMENTWISE)
            && args.iter().any(|a| matches!(a, Value::Array(_)))
        {
            broadcast::lift(args, |scalars| self.eval(scalars))
        } else {
            self.eval(args)
        };
        result.unwrap_or_else(Value::Error)
    }
}
