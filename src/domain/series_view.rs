//! Cursor-relative access over an indicator series.
//!
//! A view pairs a series with the candle window it was computed from and
//! tracks a cursor in candle-index space. `get(offset)` reads the value
//! `offset` ticks before the cursor; `value(offset, field)` produces a
//! new, independently movable view, shifted and/or narrowed to one record
//! field, without mutating the original. Reads past the series start (the
//! warm-up region) or outside the window yield `None`, never a default.

use super::candle::{index_of, Candle, TimestampMs};
use super::indicator::{IndicatorSeries, IndicatorValue};

#[derive(Clone)]
pub struct SeriesView<'a> {
    series: &'a IndicatorSeries,
    candles: &'a [Candle],
    /// Candle index of the first series point.
    align: isize,
    /// Cursor in candle-index space; may move outside the window.
    cursor: isize,
    field: Option<String>,
}

impl<'a> SeriesView<'a> {
    /// View with the cursor on the first candle of the window. The series
    /// keys must be a suffix of the window's timestamps, which holds for
    /// everything the indicator engine produces.
    pub fn new(series: &'a IndicatorSeries, candles: &'a [Candle]) -> Self {
        let align = series
            .first_timestamp()
            .and_then(|t| index_of(candles, t))
            .map(|i| i as isize)
            .unwrap_or(candles.len() as isize);
        SeriesView {
            series,
            candles,
            align,
            cursor: 0,
            field: None,
        }
    }

    pub fn cursor_timestamp(&self) -> Option<TimestampMs> {
        self.candle().map(|c| c.timestamp)
    }

    /// Move the cursor to the candle with the given timestamp. Returns
    /// false (cursor unchanged) if the window has no such candle.
    pub fn seek(&mut self, timestamp: TimestampMs) -> bool {
        match index_of(self.candles, timestamp) {
            Some(idx) => {
                self.cursor = idx as isize;
                true
            }
            None => false,
        }
    }

    /// Advance the cursor one tick. The cursor may run past the window
    /// end; reads there return `None`.
    pub fn advance(&mut self) {
        self.cursor += 1;
    }

    /// Value `offset` ticks before the cursor. `None` once the offset
    /// reaches past the available history, or when the view is narrowed
    /// to a field the record does not carry.
    pub fn get(&self, offset: usize) -> Option<IndicatorValue> {
        let candle_idx = self.cursor - offset as isize;
        let series_idx = candle_idx - self.align;
        if series_idx < 0 {
            return None;
        }
        let point = self.series.points.get(series_idx as usize)?;
        match &self.field {
            None => Some(point.value.clone()),
            Some(field) => point
                .value
                .scalar(Some(field))
                .map(IndicatorValue::Simple),
        }
    }

    /// Scalar shortcut for `get`: a `Simple` value, or the narrowed field.
    /// An unnarrowed structured record has no scalar reading.
    pub fn scalar(&self, offset: usize) -> Option<f64> {
        match self.get(offset) {
            Some(IndicatorValue::Simple(v)) => Some(v),
            _ => None,
        }
    }

    /// A new, independently movable view shifted `offset` ticks back and
    /// optionally narrowed to one field of a structured record. The
    /// original view is not mutated.
    pub fn value(&self, offset: usize, field: Option<&str>) -> SeriesView<'a> {
        SeriesView {
            series: self.series,
            candles: self.candles,
            align: self.align,
            cursor: self.cursor - offset as isize,
            field: field.map(str::to_string).or_else(|| self.field.clone()),
        }
    }

    /// The candle aligned with the cursor's current timestamp, or `None`
    /// if the cursor has moved outside the window.
    pub fn candle(&self) -> Option<&'a Candle> {
        if self.cursor < 0 {
            return None;
        }
        self.candles.get(self.cursor as usize)
    }

    fn field_at(&self, offset: usize, field: &str) -> Option<f64> {
        let candle_idx = self.cursor - offset as isize;
        let series_idx = candle_idx - self.align;
        if series_idx < 0 {
            return None;
        }
        self.series
            .points
            .get(series_idx as usize)?
            .value
            .scalar(Some(field))
    }

    /// `x` crossed over `y` between the previous and current cursor
    /// positions: prev.x < prev.y and cur.x > cur.y. Any missing value at
    /// either position makes the result false.
    pub fn crossover(&self, x: &str, y: &str) -> bool {
        match (
            self.field_at(1, x),
            self.field_at(1, y),
            self.field_at(0, x),
            self.field_at(0, y),
        ) {
            (Some(px), Some(py), Some(cx), Some(cy)) => px < py && cx > cy,
            _ => false,
        }
    }

    /// Mirror of [`crossover`](Self::crossover).
    pub fn crossunder(&self, x: &str, y: &str) -> bool {
        match (
            self.field_at(1, x),
            self.field_at(1, y),
            self.field_at(0, x),
            self.field_at(0, y),
        ) {
            (Some(px), Some(py), Some(cx), Some(cy)) => px > py && cx < cy,
            _ => false,
        }
    }
}
