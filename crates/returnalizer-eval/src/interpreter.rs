use std::cell::RefCell;
use std::rc::Rc;

use returnalizer_common::{CalcError, CalcErrorKind, Value};
use returnalizer_formula::{ASTNode, ASTNodeType, ReferenceType, TableReference, TableSpecifier};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::broadcast::{self, BinaryOp};
use crate::function_registry;
use crate::traits::{CellContent, ColumnSource, EvaluationContext};

/// State shared between an interpreter and the per-row interpreters it
/// spawns for derived columns.
#[derive(Default)]
struct Shared {
    names: RefCell<FxHashMap<String, Value>>,
    columns: RefCell<FxHashMap<(String, String), Rc<Vec<Value>>>>,
    cells: RefCell<FxHashMap<(String, u32, u32), Value>>,
    in_progress: RefCell<FxHashSet<String>>,
}

/// Tree-walking evaluator for recorded expressions.
///
/// Errors are values: a failing sub-expression yields [`Value::Error`] and
/// propagates through operators and functions the way a spreadsheet does.
pub struct Interpreter<'a> {
    pub context: &'a dyn EvaluationContext,
    current_sheet: &'a str,
    current_row: Option<(String, usize)>,
    subexpr_cache: RefCell<FxHashMap<u64, Value>>, // key: AST fingerprint
    shared: Rc<Shared>,
}

impl<'a> Interpreter<'a> {
    pub fn new(context: &'a dyn EvaluationContext, current_sheet: &'a str) -> Self {
        Self {
            context,
            current_sheet,
            current_row: None,
            subexpr_cache: RefCell::new(FxHashMap::default()),
            shared: Rc::new(Shared::default()),
        }
    }

    /// An interpreter positioned on `row` (0-based) of `table`, sharing name,
    /// column and cell caches with `self`.
    fn for_row(&self, table: &str, row: usize) -> Interpreter<'a> {
        Interpreter {
            context: self.context,
            current_sheet: self.current_sheet,
            current_row: Some((table.to_ascii_lowercase(), row)),
            subexpr_cache: RefCell::new(FxHashMap::default()),
            shared: Rc::clone(&self.shared),
        }
    }

    pub fn current_sheet(&self) -> &'a str {
        self.current_sheet
    }

    /* ===================  public  =================== */
    pub fn evaluate_ast(&self, node: &ASTNode) -> Value {
        // Row context makes `[@Col]` position-dependent, so identical
        // fingerprints may evaluate differently.
        if self.current_row.is_some() {
            return self.evaluate_ast_uncached(node);
        }
        let fp = node.fingerprint();
        if let Some(v) = self.subexpr_cache.borrow().get(&fp) {
            return v.clone();
        }
        let out = self.evaluate_ast_uncached(node);
        self.subexpr_cache.borrow_mut().insert(fp, out.clone());
        out
    }

    /// Evaluate a workbook-level name. Unknown names are `#NAME?`.
    pub fn evaluate_name(&self, name: &str) -> Value {
        let key = name.to_ascii_uppercase();
        if let Some(v) = self.shared.names.borrow().get(&key) {
            return v.clone();
        }
        let Some(def) = self.context.resolve_name(name) else {
            return Value::Error(
                CalcError::new(CalcErrorKind::Name).with_message(format!("unknown name {name}")),
            );
        };
        let out = self.guarded(format!("name:{key}"), || self.evaluate_ast(def));
        self.shared.names.borrow_mut().insert(key, out.clone());
        out
    }

    pub fn debug_subexpr_cache_len(&self) -> usize {
        self.subexpr_cache.borrow().len()
    }

    fn evaluate_ast_uncached(&self, node: &ASTNode) -> Value {
        match &node.node_type {
            ASTNodeType::Literal(v) => v.clone(),
            ASTNodeType::Reference { reference, .. } => self.eval_reference(reference),
            ASTNodeType::BinaryOp { op, left, right } => self.eval_binary(op, left, right),
            ASTNodeType::Function { name, args } => self.eval_function(name, args),
        }
    }

    /// Run `f` unless `key` is already being evaluated further up the stack.
    fn guarded<F>(&self, key: String, f: F) -> Value
    where
        F: FnOnce() -> Value,
    {
        if !self.shared.in_progress.borrow_mut().insert(key.clone()) {
            return Value::Error(
                CalcError::new(CalcErrorKind::Circ).with_message(format!("circular reference via {key}")),
            );
        }
        let out = f();
        self.shared.in_progress.borrow_mut().remove(&key);
        out
    }

    /* ===================  reference  =================== */
    fn eval_reference(&self, reference: &ReferenceType) -> Value {
        match reference {
            ReferenceType::Cell { sheet, row, col } => {
                let sheet = sheet.as_deref().unwrap_or(self.current_sheet);
                self.eval_cell(sheet, *row, *col)
            }
            ReferenceType::NamedRange(name) => self.evaluate_name(name),
            ReferenceType::Table(table_ref) => self.eval_table(table_ref),
        }
    }

    fn eval_cell(&self, sheet: &str, row: u32, col: u32) -> Value {
        let key = (sheet.to_ascii_lowercase(), row, col);
        if let Some(v) = self.shared.cells.borrow().get(&key) {
            return v.clone();
        }
        let out = match self.context.resolve_cell(sheet, row, col) {
            None => Value::Empty,
            Some(CellContent::Value(v)) => v.clone(),
            Some(CellContent::Formula(f)) => self
                .guarded(format!("cell:{}!{}{}", sheet, ReferenceType::number_to_column(col), row), || {
                    self.evaluate_ast(f).into_scalar()
                }),
        };
        self.shared.cells.borrow_mut().insert(key, out.clone());
        out
    }

    fn eval_table(&self, table_ref: &TableReference) -> Value {
        let table = table_ref.name.as_str();
        match &table_ref.specifier {
            TableSpecifier::Column(col) => match self.column_values(table, col) {
                Ok(cells) => Value::Array(cells.iter().map(|v| vec![v.clone()]).collect()),
                Err(e) => Value::Error(e),
            },
            TableSpecifier::ColumnRange(first, last) => match self.column_block(table, first, last) {
                Ok(rows) => Value::Array(rows),
                Err(e) => Value::Error(e),
            },
            TableSpecifier::ThisRow(col) => {
                let Some((row_table, row)) = &self.current_row else {
                    return Value::Error(
                        CalcError::new_value().with_message(format!("[@{col}] used outside a table row")),
                    );
                };
                if !row_table.eq_ignore_ascii_case(table) {
                    return Value::Error(CalcError::new_value());
                }
                match self.column_values(table, col) {
                    Ok(cells) => cells.get(*row).cloned().unwrap_or(Value::Empty),
                    Err(e) => Value::Error(e),
                }
            }
        }
    }

    fn column_values(&self, table: &str, column: &str) -> Result<Rc<Vec<Value>>, CalcError> {
        let key = (table.to_ascii_lowercase(), column.to_ascii_lowercase());
        if let Some(v) = self.shared.columns.borrow().get(&key) {
            return Ok(Rc::clone(v));
        }
        let source = self.context.resolve_column(table, column).ok_or_else(|| {
            CalcError::new(CalcErrorKind::Ref).with_message(format!("no column {table}[{column}]"))
        })?;
        let guard_key = format!("column:{table}[{column}]");
        if self.shared.in_progress.borrow().contains(&guard_key) {
            return Err(CalcError::new(CalcErrorKind::Circ)
                .with_message(format!("circular reference via {guard_key}")));
        }
        self.shared.in_progress.borrow_mut().insert(guard_key.clone());
        let cells: Vec<Value> = match source {
            ColumnSource::Values(values) => values.to_vec(),
            ColumnSource::RowFormulas(formulas) => formulas
                .iter()
                .map(|f| self.evaluate_ast(f).into_scalar())
                .collect(),
            ColumnSource::Derived(template) => {
                let len = self.context.table_len(table).unwrap_or(0);
                (0..len)
                    .map(|row| self.for_row(table, row).evaluate_ast(template).into_scalar())
                    .collect()
            }
        };
        self.shared.in_progress.borrow_mut().remove(&guard_key);
        let cells = Rc::new(cells);
        self.shared.columns.borrow_mut().insert(key, Rc::clone(&cells));
        Ok(cells)
    }

    fn column_block(&self, table: &str, first: &str, last: &str) -> Result<Vec<Vec<Value>>, CalcError> {
        let names = self
            .context
            .table_columns(table)
            .ok_or_else(|| CalcError::new(CalcErrorKind::Ref).with_message(format!("no table {table}")))?;
        let position = |c: &str| names.iter().position(|n| n.eq_ignore_ascii_case(c));
        let (Some(a), Some(b)) = (position(first), position(last)) else {
            return Err(CalcError::new(CalcErrorKind::Ref));
        };
        let (a, b) = (a.min(b), a.max(b));
        let columns = names[a..=b]
            .iter()
            .map(|c| self.column_values(table, c))
            .collect::<Result<Vec<_>, _>>()?;
        let len = self.context.table_len(table).unwrap_or(0);
        Ok((0..len)
            .map(|r| {
                columns
                    .iter()
                    .map(|col| col.get(r).cloned().unwrap_or(Value::Empty))
                    .collect()
            })
            .collect())
    }

    /* ===================  operators  =================== */
    fn eval_binary(&self, op: &str, left: &ASTNode, right: &ASTNode) -> Value {
        let Some(op) = BinaryOp::parse(op) else {
            return Value::Error(CalcError::new_value().with_message(format!("binary op '{op}'")));
        };
        let l = self.evaluate_ast(left);
        let r = self.evaluate_ast(right);
        broadcast::binary_op(op, &l, &r)
    }

    /* ===================  function calls  =================== */
    fn eval_function(&self, name: &str, args: &[ASTNode]) -> Value {
        let Some(fun) = function_registry::get(name) else {
            return Value::Error(
                CalcError::new(CalcErrorKind::Name).with_message(format!("unknown function {name}")),
            );
        };
        let values: Vec<Value> = args.iter().map(|a| self.evaluate_ast(a)).collect();
        fun.dispatch(&values)
    }
}
