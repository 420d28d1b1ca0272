use chrono::{Months, NaiveDate};

use crate::AnalysisError;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// One observation of the source price series.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricePoint {
    pub timestamp: NaiveDate,
    pub price: f64,
}

impl PricePoint {
    pub fn new(timestamp: NaiveDate, price: f64) -> Self {
        Self { timestamp, price }
    }
}

/// A simple period-over-period return, stamped with the later period.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReturnPoint {
    pub timestamp: NaiveDate,
    pub value: f64,
}

impl ReturnPoint {
    pub fn new(timestamp: NaiveDate, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Price observations ordered by strictly ascending timestamp.
#[cfg_attr(feature = "serde", derive(Serialize))]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PriceSeries {
    points: Vec<PricePoint>,
}

impl PriceSeries {
    /// Validate ordering, uniqueness and finiteness. The input must already be
    /// sorted; loaders that read unordered files sort before calling this.
    pub fn new(points: Vec<PricePoint>) -> Result<Self, AnalysisError> {
        for (i, p) in points.iter().enumerate() {
            if !p.price.is_finite() {
                return Err(AnalysisError::InvalidPrice {
                    timestamp: p.timestamp,
                    price: p.price,
                });
            }
            if i > 0 {
                let prev = points[i - 1].timestamp;
                if p.timestamp == prev {
                    return Err(AnalysisError::DuplicateTimestamp {
                        timestamp: p.timestamp,
                    });
                }
                if p.timestamp < prev {
                    return Err(AnalysisError::UnorderedTimestamps {
                        timestamp: p.timestamp,
                    });
                }
            }
        }
        Ok(Self { points })
    }

    /// Convenience for fixtures: consecutive month-start dates from `start`.
    pub fn monthly(start: NaiveDate, prices: &[f64]) -> Result<Self, AnalysisError> {
        let points = prices
            .iter()
            .enumerate()
            .map(|(i, &p)| PricePoint::new(month_offset(start, i), p))
            .collect();
        Self::new(points)
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn prices(&self) -> impl Iterator<Item = f64> + '_ {
        self.points.iter().map(|p| p.price)
    }
}

/// Ordered returns derived from a [`PriceSeries`].
#[cfg_attr(feature = "serde", derive(Serialize))]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReturnSeries {
    points: Vec<ReturnPoint>,
}

impl ReturnSeries {
    pub fn from_points(points: Vec<ReturnPoint>) -> Self {
        Self { points }
    }

    /// Build a series from bare values with synthetic month-start stamps.
    pub fn from_values(start: NaiveDate, values: &[f64]) -> Self {
        Self {
            points: values
                .iter()
                .enumerate()
                .map(|(i, &v)| ReturnPoint::new(month_offset(start, i), v))
                .collect(),
        }
    }

    pub fn points(&self) -> &[ReturnPoint] {
        &self.points
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

fn month_offset(start: NaiveDate, i: usize) -> NaiveDate {
    start
        .checked_add_months(Months::new(i as u32))
        .unwrap_or(NaiveDate::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn rejects_duplicate_timestamps() {
        let err = PriceSeries::new(vec![
            PricePoint::new(d(2024, 1, 1), 1.0),
            PricePoint::new(d(2024, 1, 1), 2.0),
        ])
        .unwrap_err();
        assert_eq!(
            err,
            AnalysisError::DuplicateTimestamp {
                timestamp: d(2024, 1, 1)
            }
        );
    }

    #[test]
    fn rejects_descending_timestamps() {
        let err = PriceSeries::new(vec![
            PricePoint::new(d(2024, 2, 1), 1.0),
            PricePoint::new(d(2024, 1, 1), 2.0),
        ])
        .unwrap_err();
        assert!(matches!(err, AnalysisError::UnorderedTimestamps { .. }));
    }

    #[test]
    fn rejects_non_finite_prices() {
        let err = PriceSeries::new(vec![PricePoint::new(d(2024, 1, 1), f64::NAN)]).unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidPrice { .. }));
    }

    #[test]
    fn monthly_fixture_steps_by_month() {
        let s = PriceSeries::monthly(d(2024, 11, 1), &[1.0, 2.0, 3.0]).unwrap();
        let stamps: Vec<_> = s.points().iter().map(|p| p.timestamp).collect();
        assert_eq!(stamps, vec![d(2024, 11, 1), d(2024, 12, 1), d(2025, 1, 1)]);
    }
}
