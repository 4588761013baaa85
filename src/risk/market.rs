//! Market model: reference index time series keyed by market object code

use chrono::NaiveDateTime;
use std::collections::BTreeMap;

use super::observer::RiskFactorObserver;
use crate::error::ObservationError;
use crate::projection::StateSpace;

/// Step-function time series.
///
/// The value at `t` is the last observation at or before `t`; times before
/// the first observation take the first value.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TimeSeries {
    points: BTreeMap<NaiveDateTime, f64>,
}

impl TimeSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_points(points: impl IntoIterator<Item = (NaiveDateTime, f64)>) -> Self {
        Self {
            points: points.into_iter().collect(),
        }
    }

    pub fn insert(&mut self, time: NaiveDateTime, value: f64) {
        self.points.insert(time, value);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn value_at(&self, time: NaiveDateTime) -> Option<f64> {
        self.points
            .range(..=time)
            .next_back()
            .or_else(|| self.points.iter().next())
            .map(|(_, v)| *v)
    }
}

/// Reference indices of one scenario
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MarketModel {
    series: BTreeMap<String, TimeSeries>,
}

impl MarketModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series(mut self, id: impl Into<String>, series: TimeSeries) -> Self {
        self.insert(id, series);
        self
    }

    pub fn insert(&mut self, id: impl Into<String>, series: TimeSeries) {
        self.series.insert(id.into(), series);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.series.contains_key(id)
    }

    /// Registered market object codes, sorted
    pub fn keys(&self) -> Vec<String> {
        self.series.keys().cloned().collect()
    }

    pub fn state_at(&self, id: &str, time: NaiveDateTime) -> Result<f64, ObservationError> {
        let series = self.series.get(id).ok_or_else(|| ObservationError::NotFound {
            id: id.to_string(),
            available: self.keys(),
        })?;
        series.value_at(time).ok_or_else(|| ObservationError::Model {
            id: id.to_string(),
            reason: "time series has no observations".to_string(),
        })
    }
}

impl RiskFactorObserver for MarketModel {
    fn observe(&self, id: &str, time: NaiveDateTime, _state: &StateSpace) -> Result<f64, ObservationError> {
        self.state_at(id, time)
    }
}
