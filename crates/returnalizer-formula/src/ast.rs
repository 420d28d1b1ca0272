use crate::hasher::FormulaHasher;
use once_cell::sync::Lazy;
use returnalizer_common::Value;
use std::fmt::{self, Display};
use std::hash::{Hash, Hasher};

// Column lookup table for common columns (A-ZZ = 702 columns)
static COLUMN_LOOKUP: Lazy<Vec<String>> = Lazy::new(|| {
    let mut cols = Vec::with_capacity(702);
    // Single letters A-Z
    for c in b'A'..=b'Z' {
        cols.push(String::from(c as char));
    }
    // Double letters AA-ZZ
    for c1 in b'A'..=b'Z' {
        for c2 in b'A'..=b'Z' {
            cols.push(format!("{}{}", c1 as char, c2 as char));
        }
    }
    cols
});

/// Which part of a table a structured reference selects.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TableSpecifier {
    /// One data column: `tReturns[Return]`.
    Column(String),
    /// A contiguous block of data columns: `tReturns[[Date]:[Return]]`.
    ColumnRange(String, String),
    /// The current row of one column, used inside helper-column formulas: `[@Return]`.
    ThisRow(String),
}

/// A structured table reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableReference {
    pub name: String,
    pub specifier: TableSpecifier,
}

/// What a reference node points at.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReferenceType {
    /// A single cell, 1-based row and column.
    Cell {
        sheet: Option<String>,
        row: u32,
        col: u32,
    },
    Table(TableReference),
    /// A workbook-level defined name bound to another expression.
    NamedRange(String),
}

impl ReferenceType {
    /// Convert a 1-based column number to its letter form (`2` → `B`).
    pub fn number_to_column(col: u32) -> String {
        if col >= 1 && (col as usize) <= COLUMN_LOOKUP.len() {
            return COLUMN_LOOKUP[(col - 1) as usize].clone();
        }
        let mut n = col;
        let mut out = Vec::new();
        while n > 0 {
            let rem = (n - 1) % 26;
            out.push((b'A' + rem as u8) as char);
            n = (n - 1) / 26;
        }
        out.iter().rev().collect()
    }

    /// Convert a column letter form to its 1-based number (`AA` → `27`).
    pub fn column_to_number(column: &str) -> Option<u32> {
        if column.is_empty() {
            return None;
        }
        let mut n: u32 = 0;
        for ch in column.chars() {
            if !ch.is_ascii_alphabetic() {
                return None;
            }
            n = n
                .checked_mul(26)?
                .checked_add(ch.to_ascii_uppercase() as u32 - 'A' as u32 + 1)?;
        }
        Some(n)
    }
}

impl Display for ReferenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceType::Cell { sheet, row, col } => {
                let col_str = Self::number_to_column(*col);
                if let Some(sheet_name) = sheet {
                    // Only quote sheet name if it contains spaces or special characters
                    if sheet_name.contains(' ')
                        || sheet_name.contains('!')
                        || sheet_name.contains('\'')
                    {
                        write!(f, "'{sheet_name}'!{col_str}{row}")
                    } else {
                        write!(f, "{sheet_name}!{col_str}{row}")
                    }
                } else {
                    write!(f, "{col_str}{row}")
                }
            }
            ReferenceType::Table(table_ref) => match &table_ref.specifier {
                TableSpecifier::Column(column) => {
                    write!(f, "{}[{}]", table_ref.name, column.trim())
                }
                TableSpecifier::ColumnRange(start, end) => {
                    write!(f, "{}[[{}]:[{}]]", table_ref.name, start.trim(), end.trim())
                }
                TableSpecifier::ThisRow(column) => write!(f, "[@{}]", column.trim()),
            },
            ReferenceType::NamedRange(name) => f.write_str(name),
        }
    }
}

/// The different types of AST nodes.
#[derive(Debug, Clone, PartialEq, Hash)]
pub enum ASTNodeType {
    Literal(Value),
    Reference {
        original: String, // Original reference string (preserved for display/debugging)
        reference: ReferenceType,
    },
    BinaryOp {
        op: String,
        left: Box<ASTNode>,
        right: Box<ASTNode>,
    },
    Function {
        name: String,
        args: Vec<ASTNode>,
    },
}

impl Display for ASTNodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ASTNodeType::Literal(value) => write!(f, "Literal({value})"),
            ASTNodeType::Reference { reference, .. } => write!(f, "Reference({reference})"),
            ASTNodeType::BinaryOp { op, left, right } => {
                write!(f, "BinaryOp({op}, {left}, {right})")
            }
            ASTNodeType::Function { name, args } => {
                write!(f, "Function({name}, [")?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{a}")?;
                }
                f.write_str("])")
            }
        }
    }
}

/// A node of a recorded derivation.
#[derive(Debug, Clone, PartialEq)]
pub struct ASTNode {
    pub node_type: ASTNodeType,
}

impl ASTNode {
    pub fn new(node_type: ASTNodeType) -> Self {
        ASTNode { node_type }
    }

    pub fn number(n: f64) -> Self {
        Self::new(ASTNodeType::Literal(Value::Number(n)))
    }

    pub fn text<S: Into<String>>(s: S) -> Self {
        Self::new(ASTNodeType::Literal(Value::Text(s.into())))
    }

    pub fn literal(v: Value) -> Self {
        Self::new(ASTNodeType::Literal(v))
    }

    pub fn reference(reference: ReferenceType) -> Self {
        Self::new(ASTNodeType::Reference {
            original: reference.to_string(),
            reference,
        })
    }

    pub fn cell<S: Into<String>>(sheet: S, row: u32, col: u32) -> Self {
        Self::reference(ReferenceType::Cell {
            sheet: Some(sheet.into()),
            row,
            col,
        })
    }

    pub fn name<S: Into<String>>(name: S) -> Self {
        Self::reference(ReferenceType::NamedRange(name.into()))
    }

    pub fn table_column(table: &str, column: &str) -> Self {
        Self::reference(ReferenceType::Table(TableReference {
            name: table.to_string(),
            specifier: TableSpecifier::Column(column.to_string()),
        }))
    }

    pub fn table_columns(table: &str, first: &str, last: &str) -> Self {
        Self::reference(ReferenceType::Table(TableReference {
            name: table.to_string(),
            specifier: TableSpecifier::ColumnRange(first.to_string(), last.to_string()),
        }))
    }

    pub fn this_row(table: &str, column: &str) -> Self {
        Self::reference(ReferenceType::Table(TableReference {
            name: table.to_string(),
            specifier: TableSpecifier::ThisRow(column.to_string()),
        }))
    }

    pub fn function<S: Into<String>>(name: S, args: Vec<ASTNode>) -> Self {
        Self::new(ASTNodeType::Function {
            name: name.into(),
            args,
        })
    }

    pub fn binary<S: Into<String>>(op: S, left: ASTNode, right: ASTNode) -> Self {
        Self::new(ASTNodeType::BinaryOp {
            op: op.into(),
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn fingerprint(&self) -> u64 {
        self.calculate_hash()
    }

    /// Calculate a structural hash for this ASTNode
    pub fn calculate_hash(&self) -> u64 {
        let mut hasher = FormulaHasher::new();
        self.hash_node(&mut hasher);
        hasher.finish()
    }

    fn hash_node(&self, hasher: &mut FormulaHasher) {
        match &self.node_type {
            ASTNodeType::Literal(value) => {
                hasher.write(&[1]); // Discriminant for Literal
                value.hash(hasher);
            }
            ASTNodeType::Reference { reference, .. } => {
                hasher.write(&[2]); // Discriminant for Reference
                reference.hash(hasher);
            }
            ASTNodeType::BinaryOp { op, left, right } => {
                hasher.write(&[4]); // Discriminant for BinaryOp
                hasher.write(op.as_bytes());
                left.hash_node(hasher);
                right.hash_node(hasher);
            }
            ASTNodeType::Function { name, args } => {
                hasher.write(&[5]); // Discriminant for Function
                // Use uppercase function name to be case-insensitive
                let name_upper = name.to_ascii_uppercase();
                hasher.write(name_upper.as_bytes());
                hasher.write_usize(args.len());
                for arg in args {
                    arg.hash_node(hasher);
                }
            }
        }
    }

    pub fn get_dependencies(&self) -> Vec<&ReferenceType> {
        let mut dependencies = Vec::new();
        self.collect_dependencies(&mut dependencies);
        dependencies
    }

    pub fn get_dependency_strings(&self) -> Vec<String> {
        self.get_dependencies()
            .into_iter()
            .map(|dep| format!("{dep}"))
            .collect()
    }

    /// Defined names this expression refers to, in first-use order, deduplicated.
    pub fn referenced_names(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for dep in self.get_dependencies() {
            if let ReferenceType::NamedRange(name) = dep {
                if !out.contains(&name.as_str()) {
                    out.push(name.as_str());
                }
            }
        }
        out
    }

    fn collect_dependencies<'a>(&'a self, dependencies: &mut Vec<&'a ReferenceType>) {
        match &self.node_type {
            ASTNodeType::Reference { reference, .. } => {
                dependencies.push(reference);
            }
            ASTNodeType::BinaryOp { left, right, .. } => {
                left.collect_dependencies(dependencies);
                right.collect_dependencies(dependencies);
            }
            ASTNodeType::Function { args, .. } => {
                for arg in args {
                    arg.collect_dependencies(dependencies);
                }
            }
            ASTNodeType::Literal(_) => {}
        }
    }
}

impl Display for ASTNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.node_type)
    }
}

impl std::hash::Hash for ASTNode {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        let hash = self.calculate_hash();
        state.write_u64(hash);
    }
}
