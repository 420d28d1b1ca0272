use returnalizer_common::Value;
use returnalizer_formula::ASTNode;

/// Content of one worksheet cell.
#[derive(Debug, Clone, Copy)]
pub enum CellContent<'a> {
    Value(&'a Value),
    Formula(&'a ASTNode),
}

/// How a table column produces its cells.
#[derive(Debug, Clone, Copy)]
pub enum ColumnSource<'a> {
    /// Stored values, one per row.
    Values(&'a [Value]),
    /// One formula per row, evaluated without a row context.
    RowFormulas(&'a [ASTNode]),
    /// A single template evaluated once per row; `[@Column]` refers to
    /// that row.
    Derived(&'a ASTNode),
}

/* ───────────────────── resolver traits ───────────────────── */

pub trait ReferenceResolver {
    /// 1-based `row`/`col`. `None` is a blank cell.
    fn resolve_cell(&self, sheet: &str, row: u32, col: u32) -> Option<CellContent<'_>>;
}

pub trait TableResolver {
    /// Column names in table order.
    fn table_columns(&self, table: &str) -> Option<Vec<&str>>;
    fn table_len(&self, table: &str) -> Option<usize>;
    fn resolve_column(&self, table: &str, column: &str) -> Option<ColumnSource<'_>>;
}

pub trait NamedRangeResolver {
    /// Definition of a workbook-level name, case-insensitive.
    fn resolve_name(&self, name: &str) -> Option<&ASTNode>;
}

pub trait EvaluationContext: ReferenceResolver + TableResolver + NamedRangeResolver {}
impl<T> EvaluationContext for T where T: ReferenceResolver + TableResolver + NamedRangeResolver {}
