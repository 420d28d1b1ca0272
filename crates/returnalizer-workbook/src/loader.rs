//! Price series from CSV.
//!
//! The file must have a header row naming a date column and a price column
//! (`Date` and `Close` by default). Other columns are ignored. Rows may come
//! in any order; they are sorted by date before validation.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use chrono::NaiveDate;
use returnalizer_common::{PricePoint, PriceSeries};
use serde::{Deserialize, Serialize};

use crate::error::ReportError;

/// Date layouts tried, in order, when no explicit format is configured.
const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%Y-%m-%d %H:%M:%S"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CsvPriceOptions {
    pub date_column: String,
    pub price_column: String,
    /// Field delimiter. Use `'\t'` for TSV.
    pub delimiter: char,
    /// A `chrono` format string; when absent the common layouts are tried.
    pub date_format: Option<String>,
}

impl Default for CsvPriceOptions {
    fn default() -> Self {
        Self {
            date_column: "Date".to_string(),
            price_column: "Close".to_string(),
            delimiter: ',',
            date_format: None,
        }
    }
}

pub fn load_prices_csv<P: AsRef<Path>>(
    path: P,
    options: &CsvPriceOptions,
) -> Result<PriceSeries, ReportError> {
    let path = path.as_ref();
    let _span = tracing::debug_span!("load_prices_csv", path = %path.display()).entered();
    let file = File::open(path)?;
    read_prices(BufReader::new(file), options)
}

pub fn read_prices<R: Read>(reader: R, options: &CsvPriceOptions) -> Result<PriceSeries, ReportError> {
    let delimiter = u8::try_from(options.delimiter).map_err(|_| {
        ReportError::invalid_record(0, format!("delimiter {:?} is not a single byte", options.delimiter))
    })?;
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .trim(csv::Trim::All)
        // Ragged rows are fine as long as both columns are present.
        .flexible(true)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    let find = |name: &str| {
        headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(name))
            .ok_or_else(|| ReportError::MissingColumn {
                name: name.to_string(),
            })
    };
    let date_idx = find(&options.date_column)?;
    let price_idx = find(&options.price_column)?;

    let mut points = Vec::new();
    let mut skipped = 0usize;
    for (i, rec) in rdr.records().enumerate() {
        let rec = rec?;
        // 1-based, counting the header.
        let record = i as u64 + 2;
        let raw_date = rec.get(date_idx).unwrap_or("");
        let raw_price = rec.get(price_idx).unwrap_or("");
        if raw_date.is_empty() && raw_price.is_empty() {
            continue;
        }
        if raw_price.is_empty() {
            skipped += 1;
            tracing::warn!(record, date = raw_date, "row without a price skipped");
            continue;
        }
        let timestamp = parse_date(raw_date, options.date_format.as_deref())
            .ok_or_else(|| ReportError::invalid_record(record, format!("unparseable date {raw_date:?}")))?;
        let price: f64 = raw_price
            .parse()
            .map_err(|_| ReportError::invalid_record(record, format!("unparseable price {raw_price:?}")))?;
        points.push(PricePoint::new(timestamp, price));
    }
    points.sort_by_key(|p| p.timestamp);
    tracing::debug!(rows = points.len(), skipped, "prices loaded");
    Ok(PriceSeries::new(points)?)
}

fn parse_date(s: &str, format: Option<&str>) -> Option<NaiveDate> {
    match format {
        Some(f) => parse_with(s, f),
        None => DATE_FORMATS.iter().find_map(|f| parse_with(s, f)),
    }
}

fn parse_with(s: &str, format: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, format).ok().or_else(|| {
        chrono::NaiveDateTime::parse_from_str(s, format)
            .ok()
            .map(|dt| dt.date())
    })
}
