//! Narrative summary lines.
//!
//! The dynamic lines are derived once against [`Derivation`]: in value mode
//! they come out as text, in formula mode as `TEXT(...)&...` cell formulas
//! that re-render when the returns change.

use returnalizer_common::StatId;
use returnalizer_eval::{Builtin, Derivation, StatsPanel};

pub const NO_DATA: &str = "No data.";
/// Shown where a statistic is undefined (standard deviation of one return).
pub const UNDEFINED: &str = "n/a";

const INSIGHT: &str = "Distribution insight: Wide spread and fat tails are typical for equities; \
large positive outliers drive the right tail, while drawdowns produce left-tail risk.";

const CONCLUSION: [&str; 2] = [
    "Based on historical monthly returns, the series exhibits high volatility but strong upside over time. \
A data-driven approach suggests it can be part of a growth portfolio, provided risk controls \
(position sizing, rebalancing) are used.",
    "Uncertainty about what any single holding will do supports a diversified approach: \
treat it as one of several holdings, not a concentrated bet.",
];

/// Lines whose content depends on the statistics.
pub fn derive_summary<D: Derivation>(
    d: &mut D,
    stats: &StatsPanel<D::Node>,
    outlier_count: D::Node,
) -> Vec<D::Node> {
    let mut lines = Vec::new();

    if let Some(n) = stats.get(StatId::Count) {
        let n = count(d, n.clone());
        lines.push(join(d, vec![Part::Lit("Sample size: "), Part::Node(n), Part::Lit(" months.")]));
    }

    let mut parts = vec![Part::Lit("Mean monthly return: ")];
    parts.push(Part::Node(pct_of(d, stats, StatId::Mean)));
    parts.push(Part::Lit("; Std Dev (monthly): "));
    parts.push(Part::Node(pct_of(d, stats, StatId::StdDev)));
    parts.push(Part::Lit("."));
    lines.push(join(d, parts));

    // Min, lower percentiles, median, upper percentiles, max.
    let percentiles: Vec<(StatId, f64)> = stats
        .ids()
        .filter_map(|id| id.percentile_level().map(|p| (id, p)))
        .collect();
    let mut quantiles = vec![("Min".to_string(), StatId::Min)];
    quantiles.extend(
        percentiles
            .iter()
            .filter(|(_, p)| *p < 0.5)
            .map(|(id, _)| (short_label(*id), *id)),
    );
    quantiles.push(("Median".to_string(), StatId::Median));
    quantiles.extend(
        percentiles
            .iter()
            .filter(|(_, p)| *p >= 0.5)
            .map(|(id, _)| (short_label(*id), *id)),
    );
    quantiles.push(("Max".to_string(), StatId::Max));
    let mut parts = Vec::new();
    for (i, (label, id)) in quantiles.into_iter().enumerate() {
        let sep = if i == 0 { "" } else { ", " };
        parts.push(Part::Owned(format!("{sep}{label}: ")));
        parts.push(Part::Node(pct_of(d, stats, id)));
    }
    parts.push(Part::Lit("."));
    lines.push(join(d, parts));

    let iqr = pct_of(d, stats, StatId::Iqr);
    let lower = pct_of(d, stats, StatId::LowerBound);
    let upper = pct_of(d, stats, StatId::UpperBound);
    let outliers = count(d, outlier_count);
    lines.push(join(
        d,
        vec![
            Part::Lit("IQR: "),
            Part::Node(iqr),
            Part::Lit("; IQR outlier bounds: ["),
            Part::Node(lower),
            Part::Lit(", "),
            Part::Node(upper),
            Part::Lit("]. Outliers detected: "),
            Part::Node(outliers),
            Part::Lit("."),
        ],
    ));
    lines
}

/// The fixed paragraphs following the dynamic lines.
pub fn closing_lines() -> Vec<String> {
    let mut out = vec![INSIGHT.to_string(), String::new(), "Conclusion:".to_string()];
    out.extend(CONCLUSION.iter().map(|s| s.to_string()));
    out
}

/// `"20th percentile"` becomes `"20th pct"`.
fn short_label(id: StatId) -> String {
    id.label().replace(" percentile", " pct")
}

enum Part<N> {
    Lit(&'static str),
    Owned(String),
    Node(N),
}

fn join<D: Derivation>(d: &mut D, parts: Vec<Part<D::Node>>) -> D::Node {
    let mut acc: Option<D::Node> = None;
    for part in parts {
        let node = match part {
            Part::Lit(s) => d.text(s),
            Part::Owned(s) => d.text(&s),
            Part::Node(n) => n,
        };
        acc = Some(match acc {
            Some(prev) => d.concat(prev, node),
            None => node,
        });
    }
    acc.unwrap_or_else(|| d.text(""))
}

fn count<D: Derivation>(d: &mut D, node: D::Node) -> D::Node {
    let fmt = d.text("0");
    d.call(Builtin::Text, vec![node, fmt])
}

fn pct<D: Derivation>(d: &mut D, node: D::Node) -> D::Node {
    let fmt = d.text("0.00%");
    let text = d.call(Builtin::Text, vec![node, fmt]);
    let fallback = d.text(UNDEFINED);
    d.call(Builtin::IfError, vec![text, fallback])
}

fn pct_of<D: Derivation>(d: &mut D, stats: &StatsPanel<D::Node>, id: StatId) -> D::Node {
    match stats.get(id) {
        Some(node) => pct(d, node.clone()),
        None => d.text(UNDEFINED),
    }
}
