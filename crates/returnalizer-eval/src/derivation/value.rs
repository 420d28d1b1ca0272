use returnalizer_common::{CalcError, CalcErrorKind, PricePoint, ReturnPoint, Value};

use super::{Derivation, DerivationMode};
use crate::broadcast::{self, BinaryOp};
use crate::builtins::Builtin;
use crate::function_registry;

/// Immediate interpretation: every node is a computed [`Value`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ValueMode<'a> {
    prices: &'a [PricePoint],
    returns: &'a [ReturnPoint],
}

impl<'a> ValueMode<'a> {
    pub fn new(prices: &'a [PricePoint], returns: &'a [ReturnPoint]) -> Self {
        Self { prices, returns }
    }

    pub fn over_prices(prices: &'a [PricePoint]) -> Self {
        Self { prices, returns: &[] }
    }

    pub fn over_returns(returns: &'a [ReturnPoint]) -> Self {
        Self { prices: &[], returns }
    }
}

impl Derivation for ValueMode<'_> {
    type Node = Value;

    fn mode(&self) -> DerivationMode {
        DerivationMode::Value
    }

    fn number(&mut self, n: f64) -> Value {
        Value::Number(n)
    }

    fn text(&mut self, s: &str) -> Value {
        Value::Text(s.to_string())
    }

    fn price(&mut self, index: usize) -> Value {
        match self.prices.get(index) {
            Some(p) => Value::Number(p.price),
            None => Value::Error(
                CalcError::new(CalcErrorKind::Ref).with_message(format!("no price at index {index}")),
            ),
        }
    }

    fn returns(&mut self) -> Value {
        Value::column(self.returns.iter().map(|p| p.value))
    }

    fn return_rows(&mut self) -> Value {
        Value::Array(
            self.returns
                .iter()
                .map(|p| vec![Value::Date(p.timestamp), Value::Number(p.value)])
                .collect(),
        )
    }

    fn binary(&mut self, op: BinaryOp, left: Value, right: Value) -> Value {
        broadcast::binary_op(op, &left, &right)
    }

    fn call(&mut self, func: Builtin, args: Vec<Value>) -> Value {
        match function_registry::get(func.name()) {
            Some(f) => f.dispatch(&args),
            None => Value::Error(CalcError::new(CalcErrorKind::Name)),
        }
    }

    fn define(&mut self, name: &str, node: Value) -> Value {
        tracing::trace!(name, value = %node, "defined");
        node
    }

    fn helper_column<F>(&mut self, _name: &str, mut row: F) -> Value
    where
        F: FnMut(&mut Self, Value) -> Value,
    {
        let returns = self.returns;
        Value::Array(
            returns
                .iter()
                .map(|p| vec![row(self, Value::Number(p.value)).into_scalar()])
                .collect(),
        )
    }
}
