//! Report assembly: the sheets a spreadsheet export would hold, each cell
//! carrying its value and, in formula mode, the formula that produces it.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use returnalizer_common::{AnalysisError, CalcError, PriceSeries, StatId, StatKind, Value};
use returnalizer_eval::engine::binning::{
    BIN_COUNT, BIN_FIRST, BIN_FREQUENCY, BIN_LABEL, BIN_LAST, BIN_LOWER, BIN_RELATIVE, BIN_WIDTH,
};
use returnalizer_eval::engine::outliers::{OUTLIER_COUNT, OUTLIER_ROWS};
use returnalizer_eval::{
    Analysis, AnalysisOptions, DerivationMode, FormulaAnalysis, FormulaMode, ValueAnalysis,
    ValueMode, analyze, canonical_formula,
};
use returnalizer_formula::ASTNode;
use serde::Serialize;

use crate::config::ReportConfig;
use crate::error::ReportError;
use crate::histogram::HistogramSpec;
use crate::summary::{NO_DATA, closing_lines, derive_summary};

pub const DATA_SHEET: &str = "Data";
pub const RETURNS_SHEET: &str = "Returns";
pub const STATS_SHEET: &str = "Descriptive Stats";
pub const OUTLIERS_SHEET: &str = "Outliers";
pub const FREQUENCY_SHEET: &str = "Frequency";
pub const HISTOGRAM_SHEET: &str = "Histogram";
pub const SUMMARY_SHEET: &str = "Summary";

pub const PCT_FORMAT: &str = "0.00%";
pub const PCT1_FORMAT: &str = "0.0%";
pub const INT_FORMAT: &str = "0";
pub const RAW_FORMAT: &str = "0.000000";
pub const DATE_FORMAT: &str = "yyyy-mm-dd";

const HISTOGRAM_BAR: usize = 40;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cell {
    pub value: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<&'static str>,
}

impl Cell {
    pub fn value(value: Value) -> Self {
        Self {
            value,
            formula: None,
            format: None,
        }
    }

    pub fn text<S: Into<String>>(s: S) -> Self {
        Self::value(Value::Text(s.into()))
    }

    pub fn empty() -> Self {
        Self::value(Value::Empty)
    }

    pub fn with_format(mut self, format: &'static str) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_formula(mut self, formula: Option<String>) -> Self {
        self.formula = formula;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sheet {
    pub name: String,
    pub rows: Vec<Vec<Cell>>,
}

impl Sheet {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            rows: Vec::new(),
        }
    }

    fn push(&mut self, row: Vec<Cell>) {
        self.rows.push(row);
    }

    /// 0-based lookup.
    pub fn cell(&self, row: usize, col: usize) -> Option<&Cell> {
        self.rows.get(row).and_then(|r| r.get(col))
    }

    /// Place `cell` at `(row, col)`, padding with empty cells.
    fn set(&mut self, row: usize, col: usize, cell: Cell) {
        while self.rows.len() <= row {
            self.rows.push(Vec::new());
        }
        let r = &mut self.rows[row];
        while r.len() <= col {
            r.push(Cell::empty());
        }
        r[col] = cell;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DefinedName {
    pub name: String,
    pub formula: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    #[serde(with = "crate::config::mode_serde")]
    pub mode: DerivationMode,
    pub sheets: Vec<Sheet>,
    /// Workbook-level names, formula mode only.
    pub defined_names: Vec<DefinedName>,
    /// Computed columns of the returns table, formula mode only.
    pub helper_columns: Vec<DefinedName>,
    pub histogram: Option<HistogramSpec>,
    pub summary: Vec<String>,
    pub warnings: Vec<String>,
}

impl Report {
    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }
}

#[derive(Debug, Clone)]
pub struct ReportBuilder {
    options: AnalysisOptions,
    mode: DerivationMode,
    price_header: String,
}

impl ReportBuilder {
    pub fn new(mode: DerivationMode) -> Self {
        Self {
            options: AnalysisOptions::default(),
            mode,
            price_header: "Close".to_string(),
        }
    }

    pub fn from_config(config: &ReportConfig) -> Self {
        Self {
            options: config.analysis_options(),
            mode: config.mode,
            price_header: config.csv.price_column.clone(),
        }
    }

    pub fn with_options(mut self, options: AnalysisOptions) -> Self {
        self.options = options;
        self
    }

    pub fn build(&self, prices: &PriceSeries) -> Result<Report, ReportError> {
        let _span =
            tracing::info_span!("build_report", mode = %self.mode, prices = prices.len()).entered();
        let mut report = Report {
            mode: self.mode,
            sheets: vec![self.data_sheet(prices)],
            defined_names: Vec::new(),
            helper_columns: Vec::new(),
            histogram: None,
            summary: Vec::new(),
            warnings: Vec::new(),
        };
        if prices.len() < 2 {
            tracing::warn!(prices = prices.len(), "not enough prices for returns; summary only");
            report.summary = vec![NO_DATA.to_string()];
            report.sheets.push(summary_sheet(&report.summary, &[]));
            return Ok(report);
        }

        let (values, formulas) = match analyze(prices, &self.options, self.mode)? {
            Analysis::Values(v) => (v, None),
            Analysis::Formulas(f) => (f.evaluate(prices)?, Some(f)),
        };
        let ctx = Formulas::new(formulas.as_ref(), prices);

        if values.frequency.exceeds_cap {
            report.warnings.push(format!(
                "{} bins exceed the soft cap of {}",
                values.frequency.bins.len(),
                self.options.bins.max_bins
            ));
        }
        if let Some(f) = &formulas {
            report.defined_names = f
                .formulas()
                .names()
                .iter()
                .map(|n| DefinedName {
                    name: n.name.clone(),
                    formula: n.formula(),
                })
                .collect();
            report.helper_columns = f
                .formulas()
                .helper_columns()
                .iter()
                .map(|n| DefinedName {
                    name: n.name.clone(),
                    formula: n.formula(),
                })
                .collect();
        }

        report.sheets.push(returns_sheet(&values, &ctx));
        report.sheets.push(stats_sheet(&values, &ctx));
        report.sheets.push(outliers_sheet(&values, &ctx));
        report.sheets.push(frequency_sheet(&values, &ctx));

        let histogram = HistogramSpec::new(FREQUENCY_SHEET, &values.frequency, formulas.is_some());
        let mut hist = Sheet::new(HISTOGRAM_SHEET);
        for line in histogram.render_text(HISTOGRAM_BAR) {
            hist.push(vec![Cell::text(line)]);
        }
        report.sheets.push(hist);
        report.histogram = Some(histogram);

        let (lines, line_formulas) = summary(&values, &ctx)?;
        report.summary = lines.iter().cloned().chain(closing_lines()).collect();
        report.sheets.push(summary_sheet(&report.summary, &line_formulas));

        tracing::info!(
            sheets = report.sheets.len(),
            names = report.defined_names.len(),
            "report built"
        );
        Ok(report)
    }

    fn data_sheet(&self, prices: &PriceSeries) -> Sheet {
        let layout = &self.options.layout;
        let mut sheet = Sheet::new(&layout.data_sheet);
        sheet.push(vec![Cell::text(&layout.date_header), Cell::text(&self.price_header)]);
        for p in prices.points() {
            sheet.push(vec![
                Cell::value(Value::Date(p.timestamp)).with_format(DATE_FORMAT),
                Cell::value(Value::Number(p.price)),
            ]);
        }
        sheet
    }
}

/// Formula-mode context: the recorded analysis and a workbook to evaluate
/// ad-hoc formulas against. Empty in value mode.
struct Formulas<'a> {
    analysis: Option<&'a FormulaAnalysis>,
    prices: &'a PriceSeries,
}

impl<'a> Formulas<'a> {
    fn new(analysis: Option<&'a FormulaAnalysis>, prices: &'a PriceSeries) -> Self {
        Self { analysis, prices }
    }

    /// `=Name` when `name` is defined.
    fn name_ref(&self, name: &str) -> Option<String> {
        let a = self.analysis?;
        a.formulas().get(name).map(|_| canonical_formula(&ASTNode::name(name)))
    }

    fn return_formula(&self, i: usize) -> Option<String> {
        self.analysis?
            .formulas()
            .return_formulas()
            .get(i)
            .map(canonical_formula)
    }

    fn stat_formula(&self, id: StatId) -> Option<String> {
        self.analysis?.stats.get(id).map(|e| e.formula())
    }
}

fn stat_format(kind: StatKind) -> &'static str {
    match kind {
        StatKind::Count => INT_FORMAT,
        StatKind::Ratio => PCT_FORMAT,
        StatKind::Raw => RAW_FORMAT,
    }
}

fn returns_sheet(values: &ValueAnalysis, ctx: &Formulas<'_>) -> Sheet {
    let mut sheet = Sheet::new(RETURNS_SHEET);
    sheet.push(vec![Cell::text("Date"), Cell::text("Return")]);
    for (i, r) in values.returns.points().iter().enumerate() {
        sheet.push(vec![
            Cell::value(Value::Date(r.timestamp)).with_format(DATE_FORMAT),
            Cell::value(Value::Number(r.value))
                .with_format(PCT_FORMAT)
                .with_formula(ctx.return_formula(i)),
        ]);
    }
    sheet
}

/// Panel rows in report order. The median appears twice, once as
/// `Median (Q2)` between the quartiles.
fn stats_rows(values: &ValueAnalysis) -> Vec<(String, StatId)> {
    let mut rows: Vec<(String, StatId)> = Vec::new();
    let mut add = |id: StatId| rows.push((id.label(), id));
    for id in [
        StatId::Count,
        StatId::Mean,
        StatId::Median,
        StatId::Mode,
        StatId::Range,
        StatId::Variance,
        StatId::StdDev,
    ] {
        add(id);
    }
    for id in values.stats.ids().filter(|id| id.percentile_level().is_some()) {
        add(id);
    }
    add(StatId::Min);
    add(StatId::Q1);
    rows.push(("Median (Q2)".to_string(), StatId::Median));
    for id in [
        StatId::Q3,
        StatId::Max,
        StatId::Iqr,
        StatId::LowerBound,
        StatId::UpperBound,
    ] {
        rows.push((id.label(), id));
    }
    rows
}

fn stats_sheet(values: &ValueAnalysis, ctx: &Formulas<'_>) -> Sheet {
    let mut sheet = Sheet::new(STATS_SHEET);
    sheet.push(vec![Cell::text("Metric"), Cell::text("Value")]);
    for (label, id) in stats_rows(values) {
        let value = match values.stats.value(id) {
            Some(n) => Value::Number(n),
            // Undefined for this sample, as the spreadsheet would show it.
            None => Value::Error(CalcError::new_div()),
        };
        sheet.push(vec![
            Cell::text(label),
            Cell::value(value)
                .with_format(stat_format(id.kind()))
                .with_formula(ctx.stat_formula(id)),
        ]);
    }
    sheet
}

fn outliers_sheet(values: &ValueAnalysis, ctx: &Formulas<'_>) -> Sheet {
    let mut sheet = Sheet::new(OUTLIERS_SHEET);
    let report = &values.outliers;
    sheet.push(vec![Cell::text("Outliers (IQR rule)")]);
    sheet.push(vec![
        Cell::text("Count"),
        Cell::value(Value::Number(report.count() as f64))
            .with_format(INT_FORMAT)
            .with_formula(ctx.name_ref(OUTLIER_COUNT)),
    ]);
    sheet.push(vec![Cell::text("Date"), Cell::text("Return")]);
    let spill = ctx.name_ref(OUTLIER_ROWS);
    if report.records.is_empty() {
        // FILTER's empty result still occupies its anchor cell.
        if spill.is_some() {
            sheet.push(vec![Cell::empty().with_formula(spill)]);
        }
        return sheet;
    }
    for (i, rec) in report.records.iter().enumerate() {
        let anchor = if i == 0 { spill.clone() } else { None };
        sheet.push(vec![
            Cell::value(Value::Date(rec.timestamp))
                .with_format(DATE_FORMAT)
                .with_formula(anchor),
            Cell::value(Value::Number(rec.value)).with_format(PCT_FORMAT),
        ]);
    }
    sheet
}

fn frequency_sheet(values: &ValueAnalysis, ctx: &Formulas<'_>) -> Sheet {
    let table = &values.frequency;
    let mut sheet = Sheet::new(FREQUENCY_SHEET);
    sheet.push(vec![
        Cell::text("Class Lower"),
        Cell::text("Class Interval"),
        Cell::text("Frequency"),
        Cell::text("Relative Frequency"),
    ]);
    for (i, bin) in table.bins.iter().enumerate() {
        let anchor = |name: &str| if i == 0 { ctx.name_ref(name) } else { None };
        sheet.push(vec![
            Cell::value(Value::Number(bin.lower_edge))
                .with_format(PCT_FORMAT)
                .with_formula(anchor(BIN_LOWER)),
            Cell::text(bin.label.clone()).with_formula(anchor(BIN_LABEL)),
            Cell::value(Value::Number(bin.count as f64)).with_formula(anchor(BIN_FREQUENCY)),
            Cell::value(Value::Number(bin.relative_frequency))
                .with_format(PCT1_FORMAT)
                .with_formula(anchor(BIN_RELATIVE)),
        ]);
    }

    // Parameter block in F:G.
    let lower = table.bins.first().map(|b| b.lower_edge);
    let upper = table.bins.last().map(|b| b.upper_edge);
    let number = |n: Option<f64>| n.map_or(Value::Empty, Value::Number);
    let params = [
        ("Bin width", Value::Number(table.width), PCT_FORMAT, BIN_WIDTH),
        ("Lower Edge", number(lower), PCT_FORMAT, BIN_FIRST),
        ("Upper Edge", number(upper), PCT_FORMAT, BIN_LAST),
        ("Bin Count", Value::Number(table.bins.len() as f64), INT_FORMAT, BIN_COUNT),
    ];
    for (row, (label, value, format, name)) in params.into_iter().enumerate() {
        sheet.set(row, 5, Cell::text(label));
        // The edges are index bounds scaled by the width.
        let formula = match name {
            BIN_FIRST => ctx.name_ref(name).map(|_| format!("={BIN_FIRST}*{BIN_WIDTH}")),
            BIN_LAST => ctx.name_ref(name).map(|_| format!("=({BIN_LAST}+1)*{BIN_WIDTH}")),
            _ => ctx.name_ref(name),
        };
        sheet.set(row, 6, Cell::value(value).with_format(format).with_formula(formula));
    }
    sheet
}

/// Dynamic summary lines as text, plus their formulas in formula mode.
fn summary(
    values: &ValueAnalysis,
    ctx: &Formulas<'_>,
) -> Result<(Vec<String>, Vec<Option<String>>), AnalysisError> {
    match ctx.analysis {
        None => {
            let mut d = ValueMode::over_returns(values.returns.points());
            let count = values.nodes.outliers.count.clone();
            let text: Vec<String> = derive_summary(&mut d, &values.nodes.stats, count)
                .into_iter()
                .map(|v| v.into_scalar().to_string())
                .collect();
            let n = text.len();
            Ok((text, vec![None; n]))
        }
        Some(a) => {
            let mut d = FormulaMode::new(a.layout().clone());
            let nodes = derive_summary(&mut d, &a.nodes.stats, a.nodes.outliers.count.clone());
            let wb = a.workbook(ctx.prices)?;
            let text = nodes.iter().map(|n| wb.evaluate(n).into_scalar().to_string()).collect();
            let formulas = nodes.iter().map(|n| Some(canonical_formula(n))).collect();
            Ok((text, formulas))
        }
    }
}

fn summary_sheet(lines: &[String], formulas: &[Option<String>]) -> Sheet {
    let mut sheet = Sheet::new(SUMMARY_SHEET);
    for (i, line) in lines.iter().enumerate() {
        let formula = formulas.get(i).cloned().flatten();
        sheet.push(vec![Cell::text(line.clone()).with_formula(formula)]);
    }
    sheet
}

/// Persist `report` as pretty JSON, creating parent directories.
pub fn write_report_json<P: AsRef<Path>>(report: &Report, path: P) -> Result<(), ReportError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut out = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut out, report)?;
    out.write_all(b"\n")?;
    out.flush()?;
    tracing::info!(path = %path.display(), "report written");
    Ok(())
}
