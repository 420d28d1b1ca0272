//! Lightweight in-memory workbook: the evaluation context for recorded
//! formulas, and the fixture tests build by hand.

use rustc_hash::FxHashMap;

use returnalizer_common::{PriceSeries, ReturnSeries, Value};
use returnalizer_formula::ASTNode;

use crate::derivation::{FormulaSet, ReturnsLayout};
use crate::engine::returns::return_formulas;
use crate::interpreter::Interpreter;
use crate::traits::{
    CellContent, ColumnSource, NamedRangeResolver, ReferenceResolver, TableResolver,
};

type CellKey = (u32, u32); // 1-based (row, col)

#[derive(Debug, Clone)]
enum Cell {
    Value(Value),
    Formula(ASTNode),
}

#[derive(Debug, Clone)]
enum Column {
    Values(Vec<Value>),
    RowFormulas(Vec<ASTNode>),
    Derived(ASTNode),
}

#[derive(Debug, Clone, Default)]
struct Table {
    len: usize,
    columns: Vec<(String, Column)>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryWorkbook {
    sheets: FxHashMap<String, FxHashMap<CellKey, Cell>>,
    tables: FxHashMap<String, Table>,
    names: FxHashMap<String, ASTNode>,
}

impl MemoryWorkbook {
    /* ─────────────── constructors ─────────────── */
    pub fn new() -> Self {
        Self::default()
    }

    /// The workbook formula mode describes: prices on the data sheet, the
    /// returns table fed by per-row formulas, helper columns and every
    /// defined name of `set`.
    pub fn for_prices(prices: &PriceSeries, layout: &ReturnsLayout, set: &FormulaSet) -> Self {
        let sheet = layout.data_sheet.as_str();
        let mut wb = Self::new()
            .with_cell_value(sheet, layout.header_row, layout.date_column, Value::Text(layout.date_header.clone()))
            .with_cell_value(sheet, layout.header_row, layout.price_column, Value::Text("Price".into()));
        for (i, p) in prices.points().iter().enumerate() {
            let row = layout.price_row(i);
            wb = wb
                .with_cell_value(sheet, row, layout.date_column, Value::Date(p.timestamp))
                .with_cell_value(sheet, row, layout.price_column, Value::Number(p.price));
        }
        let formulas = if set.return_formulas().is_empty() {
            return_formulas(prices.len(), layout)
        } else {
            set.return_formulas().to_vec()
        };
        let dates = prices
            .points()
            .iter()
            .skip(1)
            .map(|p| Value::Date(p.timestamp))
            .collect();
        wb = wb
            .with_table(&layout.table, formulas.len())
            .with_column_values(&layout.table, &layout.date_header, dates)
            .with_row_formulas(&layout.table, &layout.return_header, formulas);
        wb.with_formula_set(layout, set)
    }

    /// Like [`MemoryWorkbook::for_prices`] when only returns are known: the
    /// return column holds plain values.
    pub fn for_returns(returns: &ReturnSeries, layout: &ReturnsLayout, set: &FormulaSet) -> Self {
        let points = returns.points();
        let wb = Self::new()
            .with_table(&layout.table, points.len())
            .with_column_values(
                &layout.table,
                &layout.date_header,
                points.iter().map(|p| Value::Date(p.timestamp)).collect(),
            )
            .with_column_values(
                &layout.table,
                &layout.return_header,
                points.iter().map(|p| Value::Number(p.value)).collect(),
            );
        wb.with_formula_set(layout, set)
    }

    fn with_formula_set(mut self, layout: &ReturnsLayout, set: &FormulaSet) -> Self {
        for helper in set.helper_columns() {
            self = self.with_derived_column(&layout.table, &helper.name, helper.node.clone());
        }
        for named in set.names() {
            self = self.with_name(&named.name, named.node.clone());
        }
        self
    }

    /* ─────────────── cell helpers ─────────────── */
    pub fn with_cell_value<S: AsRef<str>>(mut self, sheet: S, row: u32, col: u32, v: Value) -> Self {
        self.sheet_mut(sheet.as_ref()).insert((row, col), Cell::Value(v));
        self
    }

    pub fn with_cell_formula<S: AsRef<str>>(mut self, sheet: S, row: u32, col: u32, f: ASTNode) -> Self {
        self.sheet_mut(sheet.as_ref()).insert((row, col), Cell::Formula(f));
        self
    }

    fn sheet_mut(&mut self, sheet: &str) -> &mut FxHashMap<CellKey, Cell> {
        self.sheets.entry(sheet.to_ascii_lowercase()).or_default()
    }

    /* ─────────────── tables ─────────────── */
    pub fn with_table(mut self, name: &str, len: usize) -> Self {
        self.tables.entry(name.to_ascii_lowercase()).or_default().len = len;
        self
    }

    pub fn with_column_values(self, table: &str, column: &str, values: Vec<Value>) -> Self {
        self.with_column(table, column, Column::Values(values))
    }

    pub fn with_row_formulas(self, table: &str, column: &str, formulas: Vec<ASTNode>) -> Self {
        self.with_column(table, column, Column::RowFormulas(formulas))
    }

    pub fn with_derived_column(self, table: &str, column: &str, template: ASTNode) -> Self {
        self.with_column(table, column, Column::Derived(template))
    }

    fn with_column(mut self, table: &str, column: &str, data: Column) -> Self {
        let t = self.tables.entry(table.to_ascii_lowercase()).or_default();
        match t.columns.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(column)) {
            Some((_, existing)) => *existing = data,
            None => t.columns.push((column.to_string(), data)),
        }
        self
    }

    /* ─────────────── named ranges ─────────────── */
    pub fn with_name(mut self, name: &str, definition: ASTNode) -> Self {
        self.names.insert(name.to_ascii_uppercase(), definition);
        self
    }

    /* ─────────────── evaluation ─────────────── */
    pub fn interpreter(&self) -> Interpreter<'_> {
        Interpreter::new(self, "Data")
    }

    pub fn evaluate(&self, node: &ASTNode) -> Value {
        self.interpreter().evaluate_ast(node)
    }

    pub fn evaluate_name(&self, name: &str) -> Value {
        self.interpreter().evaluate_name(name)
    }
}

impl ReferenceResolver for MemoryWorkbook {
    fn resolve_cell(&self, sheet: &str, row: u32, col: u32) -> Option<CellContent<'_>> {
        let cell = self.sheets.get(&sheet.to_ascii_lowercase())?.get(&(row, col))?;
        Some(match cell {
            Cell::Value(v) => CellContent::Value(v),
            Cell::Formula(f) => CellContent::Formula(f),
        })
    }
}

impl TableResolver for MemoryWorkbook {
    fn table_columns(&self, table: &str) -> Option<Vec<&str>> {
        let t = self.tables.get(&table.to_ascii_lowercase())?;
        Some(t.columns.iter().map(|(n, _)| n.as_str()).collect())
    }

    fn table_len(&self, table: &str) -> Option<usize> {
        self.tables.get(&table.to_ascii_lowercase()).map(|t| t.len)
    }

    fn resolve_column(&self, table: &str, column: &str) -> Option<ColumnSource<'_>> {
        let t = self.tables.get(&table.to_ascii_lowercase())?;
        let (_, data) = t.columns.iter().find(|(n, _)| n.eq_ignore_ascii_case(column))?;
        Some(match data {
            Column::Values(v) => ColumnSource::Values(v),
            Column::RowFormulas(f) => ColumnSource::RowFormulas(f),
            Column::Derived(template) => ColumnSource::Derived(template),
        })
    }
}

impl NamedRangeResolver for MemoryWorkbook {
    fn resolve_name(&self, name: &str) -> Option<&ASTNode> {
        self.names.get(&name.to_ascii_uppercase())
    }
}
