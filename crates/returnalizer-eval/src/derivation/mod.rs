//! One derivation, two interpretations.
//!
//! Every statistic in [`crate::engine`] is a generic function over
//! [`Derivation`]. With [`ValueMode`] each call computes immediately; with
//! [`FormulaMode`] each call builds an expression node and `define` records
//! a workbook-level name. Both implementations funnel arithmetic through
//! [`crate::broadcast`] and function calls through the registry, which is
//! what makes the two modes agree bit for bit.

use std::fmt;
use std::str::FromStr;

use returnalizer_formula::{ASTNode, ReferenceType};

use crate::broadcast::BinaryOp;
use crate::builtins::Builtin;

mod formula;
mod value;

pub use formula::{FormulaMode, FormulaSet, NamedFormula};
pub use value::ValueMode;

/// Which interpretation a caller wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DerivationMode {
    /// Compute numbers now.
    #[default]
    Value,
    /// Emit spreadsheet expressions that compute them later.
    Formula,
}

impl fmt::Display for DerivationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DerivationMode::Value => "value",
            DerivationMode::Formula => "formula",
        })
    }
}

impl FromStr for DerivationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "value" | "values" => Ok(DerivationMode::Value),
            "formula" | "formulas" => Ok(DerivationMode::Formula),
            other => Err(format!("unknown derivation mode {other:?}")),
        }
    }
}

/// Where prices and returns live in an emitted workbook.
///
/// Prices sit on `data_sheet` below a header row: dates in `date_column`,
/// prices in `price_column`. Returns form the table `table` with a
/// `date_header` and a `return_header` column, one row per return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnsLayout {
    pub data_sheet: String,
    pub header_row: u32,
    pub date_column: u32,
    pub price_column: u32,
    pub table: String,
    pub date_header: String,
    pub return_header: String,
}

impl Default for ReturnsLayout {
    fn default() -> Self {
        Self {
            data_sheet: "Data".to_string(),
            header_row: 1,
            date_column: 1,
            price_column: 2,
            table: "tReturns".to_string(),
            date_header: "Date".to_string(),
            return_header: "Return".to_string(),
        }
    }
}

impl ReturnsLayout {
    /// Worksheet row (1-based) holding price `index` (0-based).
    pub fn price_row(&self, index: usize) -> u32 {
        self.header_row + 1 + index as u32
    }

    pub fn price_cell(&self, index: usize) -> ASTNode {
        ASTNode::cell(self.data_sheet.clone(), self.price_row(index), self.price_column)
    }

    /// `Data!B2`-style address of price `index`.
    pub fn price_address(&self, index: usize) -> String {
        ReferenceType::Cell {
            sheet: Some(self.data_sheet.clone()),
            row: self.price_row(index),
            col: self.price_column,
        }
        .to_string()
    }
}

/// The adapter every statistic is written against.
///
/// `Node` is the mode's currency: a [`Value`](returnalizer_common::Value)
/// in value mode, an [`ASTNode`] in formula mode.
pub trait Derivation {
    type Node: Clone + fmt::Debug;

    fn mode(&self) -> DerivationMode;

    fn number(&mut self, n: f64) -> Self::Node;
    fn text(&mut self, s: &str) -> Self::Node;

    /// Price observation `index` of the source series.
    fn price(&mut self, index: usize) -> Self::Node;
    /// The whole return column.
    fn returns(&mut self) -> Self::Node;
    /// Return rows as `(date, return)` pairs.
    fn return_rows(&mut self) -> Self::Node;

    fn binary(&mut self, op: BinaryOp, left: Self::Node, right: Self::Node) -> Self::Node;
    fn call(&mut self, func: Builtin, args: Vec<Self::Node>) -> Self::Node;

    /// Bind `node` to a workbook-level name. Returns the node later
    /// derivations should use to refer to it.
    fn define(&mut self, name: &str, node: Self::Node) -> Self::Node;

    /// A column computed per return row. `row` receives the current return
    /// and builds the cell; the result is the whole column.
    fn helper_column<F>(&mut self, name: &str, row: F) -> Self::Node
    where
        Self: Sized,
        F: FnMut(&mut Self, Self::Node) -> Self::Node;

    /* ─────────────── operator shorthands ─────────────── */

    fn add(&mut self, l: Self::Node, r: Self::Node) -> Self::Node {
        self.binary(BinaryOp::Add, l, r)
    }
    fn sub(&mut self, l: Self::Node, r: Self::Node) -> Self::Node {
        self.binary(BinaryOp::Sub, l, r)
    }
    fn mul(&mut self, l: Self::Node, r: Self::Node) -> Self::Node {
        self.binary(BinaryOp::Mul, l, r)
    }
    fn div(&mut self, l: Self::Node, r: Self::Node) -> Self::Node {
        self.binary(BinaryOp::Div, l, r)
    }
    fn concat(&mut self, l: Self::Node, r: Self::Node) -> Self::Node {
        self.binary(BinaryOp::Concat, l, r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_addresses_prices_below_the_header() {
        let layout = ReturnsLayout::default();
        assert_eq!(layout.price_row(0), 2);
        assert_eq!(layout.price_address(2), "Data!B4");
    }

    #[test]
    fn mode_parses_case_insensitively() {
        assert_eq!("Formula".parse::<DerivationMode>(), Ok(DerivationMode::Formula));
        assert_eq!("value".parse::<DerivationMode>(), Ok(DerivationMode::Value));
        assert!("cells".parse::<DerivationMode>().is_err());
    }
}
