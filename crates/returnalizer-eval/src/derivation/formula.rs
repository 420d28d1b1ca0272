use std::collections::BTreeSet;

use returnalizer_formula::{ASTNode, canonical_formula};

use super::{Derivation, DerivationMode, ReturnsLayout};
use crate::broadcast::BinaryOp;
use crate::builtins::Builtin;

/// A workbook-level name or table column bound to an expression.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedFormula {
    pub name: String,
    pub node: ASTNode,
}

impl NamedFormula {
    /// Canonical text, with the leading `=`.
    pub fn formula(&self) -> String {
        canonical_formula(&self.node)
    }
}

/// Everything formula mode records: defined names in definition order,
/// helper columns of the returns table, and the per-row return formulas.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormulaSet {
    names: Vec<NamedFormula>,
    helper_columns: Vec<NamedFormula>,
    return_formulas: Vec<ASTNode>,
}

impl FormulaSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name`; a second definition of the same name (case-insensitive)
    /// replaces the first in place.
    pub fn define(&mut self, name: &str, node: ASTNode) {
        match self.names.iter_mut().find(|n| n.name.eq_ignore_ascii_case(name)) {
            Some(existing) => existing.node = node,
            None => self.names.push(NamedFormula {
                name: name.to_string(),
                node,
            }),
        }
    }

    pub fn add_helper_column(&mut self, name: &str, node: ASTNode) {
        match self
            .helper_columns
            .iter_mut()
            .find(|n| n.name.eq_ignore_ascii_case(name))
        {
            Some(existing) => existing.node = node,
            None => self.helper_columns.push(NamedFormula {
                name: name.to_string(),
                node,
            }),
        }
    }

    pub fn set_return_formulas(&mut self, formulas: Vec<ASTNode>) {
        self.return_formulas = formulas;
    }

    pub fn get(&self, name: &str) -> Option<&ASTNode> {
        self.names
            .iter()
            .find(|n| n.name.eq_ignore_ascii_case(name))
            .map(|n| &n.node)
    }

    pub fn names(&self) -> &[NamedFormula] {
        &self.names
    }

    pub fn helper_columns(&self) -> &[NamedFormula] {
        &self.helper_columns
    }

    pub fn return_formulas(&self) -> &[ASTNode] {
        &self.return_formulas
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty() && self.helper_columns.is_empty() && self.return_formulas.is_empty()
    }

    /// Fold `other` into `self`; `other` wins on name clashes.
    pub fn extend(&mut self, other: FormulaSet) {
        for n in other.names {
            self.define(&n.name, n.node);
        }
        for c in other.helper_columns {
            self.add_helper_column(&c.name, c.node);
        }
        if !other.return_formulas.is_empty() {
            self.return_formulas = other.return_formulas;
        }
    }

    /// Names referenced by some expression but defined nowhere in the set.
    pub fn undefined_names(&self) -> Vec<String> {
        let mut missing = BTreeSet::new();
        let exprs = self
            .names
            .iter()
            .chain(&self.helper_columns)
            .map(|n| &n.node)
            .chain(&self.return_formulas);
        for node in exprs {
            for name in node.referenced_names() {
                if self.get(name).is_none() {
                    missing.insert(name.to_string());
                }
            }
        }
        missing.into_iter().collect()
    }
}

/// Recording interpretation: every node is an expression, `define`
/// registers a name and hands back a reference to it.
#[derive(Debug, Clone, Default)]
pub struct FormulaMode {
    layout: ReturnsLayout,
    set: FormulaSet,
}

impl FormulaMode {
    pub fn new(layout: ReturnsLayout) -> Self {
        Self {
            layout,
            set: FormulaSet::default(),
        }
    }

    pub fn layout(&self) -> &ReturnsLayout {
        &self.layout
    }

    pub fn formulas(&self) -> &FormulaSet {
        &self.set
    }

    pub fn formulas_mut(&mut self) -> &mut FormulaSet {
        &mut self.set
    }

    pub fn into_formulas(self) -> FormulaSet {
        self.set
    }
}

impl Derivation for FormulaMode {
    type Node = ASTNode;

    fn mode(&self) -> DerivationMode {
        DerivationMode::Formula
    }

    fn number(&mut self, n: f64) -> ASTNode {
        ASTNode::number(n)
    }

    fn text(&mut self, s: &str) -> ASTNode {
        ASTNode::text(s)
    }

    fn price(&mut self, index: usize) -> ASTNode {
        self.layout.price_cell(index)
    }

    fn returns(&mut self) -> ASTNode {
        ASTNode::table_column(&self.layout.table, &self.layout.return_header)
    }

    fn return_rows(&mut self) -> ASTNode {
        ASTNode::table_columns(
            &self.layout.table,
            &self.layout.date_header,
            &self.layout.return_header,
        )
    }

    fn binary(&mut self, op: BinaryOp, left: ASTNode, right: ASTNode) -> ASTNode {
        ASTNode::binary(op.symbol(), left, right)
    }

    fn call(&mut self, func: Builtin, args: Vec<ASTNode>) -> ASTNode {
        ASTNode::function(func.name(), args)
    }

    fn define(&mut self, name: &str, node: ASTNode) -> ASTNode {
        tracing::trace!(name, formula = %canonical_formula(&node), "defined");
        self.set.define(name, node);
        ASTNode::name(name)
    }

    fn helper_column<F>(&mut self, name: &str, mut row: F) -> ASTNode
    where
        F: FnMut(&mut Self, ASTNode) -> ASTNode,
    {
        let this_row = ASTNode::this_row(&self.layout.table, &self.layout.return_header);
        let cell = row(self, this_row);
        self.set.add_helper_column(name, cell);
        ASTNode::table_column(&self.layout.table, name)
    }
}
