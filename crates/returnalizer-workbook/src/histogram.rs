//! Column-chart description of the frequency table, plus a plain-text
//! rendering for terminals.

use returnalizer_eval::FrequencyTable;
use serde::Serialize;

const BAR: char = '#';

/// A chart over the Frequency sheet. `categories_ref`/`values_ref` point at
/// the label and count columns: spill references (`$B$2#`) when the sheet
/// holds formulas, fixed ranges otherwise.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramSpec {
    pub chart_type: &'static str,
    pub title: String,
    pub series_name: &'static str,
    pub x_axis: &'static str,
    pub y_axis: &'static str,
    pub categories: Vec<String>,
    pub values: Vec<u64>,
    pub categories_ref: String,
    pub values_ref: String,
}

impl HistogramSpec {
    pub fn new(sheet: &str, table: &FrequencyTable, spill: bool) -> Self {
        let (categories_ref, values_ref) = if spill {
            (format!("={sheet}!$B$2#"), format!("={sheet}!$C$2#"))
        } else {
            let last = table.bins.len() + 1;
            (
                format!("={sheet}!$B$2:$B${last}"),
                format!("={sheet}!$C$2:$C${last}"),
            )
        };
        Self {
            chart_type: "column",
            title: title(table.width),
            series_name: "Frequency",
            x_axis: "Return Interval",
            y_axis: "Frequency",
            categories: table.bins.iter().map(|b| b.label.clone()).collect(),
            values: table.bins.iter().map(|b| b.count).collect(),
            categories_ref,
            values_ref,
        }
    }

    /// One line per bin: label, a bar scaled to `max_bar` characters, count.
    pub fn render_text(&self, max_bar: usize) -> Vec<String> {
        let peak = self.values.iter().copied().max().unwrap_or(0);
        let label_width = self.categories.iter().map(|c| c.chars().count()).max().unwrap_or(0);
        let mut lines = vec![self.title.clone()];
        for (label, &count) in self.categories.iter().zip(&self.values) {
            let len = match count {
                0 => 0,
                // Non-empty bins always get at least one mark.
                _ => ((count as f64 / peak as f64) * max_bar as f64).round().max(1.0) as usize,
            };
            let bar: String = std::iter::repeat_n(BAR, len).collect();
            lines.push(format!("{label:>label_width$} | {bar} {count}"));
        }
        lines
    }
}

/// `"Return Distribution (10% bins)"` for a width of `0.10`.
pub fn title(width: f64) -> String {
    let pct = width * 100.0;
    let label = if (pct - pct.round()).abs() < 1e-9 {
        format!("{:.0}%", pct.round())
    } else {
        let s = format!("{pct:.2}");
        format!("{}%", s.trim_end_matches('0').trim_end_matches('.'))
    };
    format!("Return Distribution ({label} bins)")
}
