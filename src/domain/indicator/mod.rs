//! Indicator series engine.
//!
//! This module provides types for computing and indexing derived values
//! over a candle window:
//! - `IndicatorValue`: scalar or structured per-timestamp value
//! - `IndicatorKind`: closed registry of indicator identities + parameters
//!   (serves as the cache key)
//! - `IndicatorSeries`: timestamp-keyed series, shorter than the candle
//!   window by the indicator's warm-up length
//! - `IndicatorEngine`: computes each kind once per window and caches it
//!
//! Series keys are always a suffix of the window's candle timestamps and
//! are never re-indexed to zero. Composite kinds merge sub-series on
//! shared timestamp keys; a sub-indicator's missing leading values are
//! simply absent from the record at that timestamp.

pub mod sma;
pub mod ema;
pub mod rsi;
pub mod stddev;
pub mod macd;
pub mod bollinger;

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::Deserialize;

use super::candle::{Candle, TimestampMs};
use super::error::GridtraderError;
use super::series_view::SeriesView;

#[derive(Debug, Clone, PartialEq)]
pub enum IndicatorValue {
    Simple(f64),
    Record(BTreeMap<String, f64>),
}

impl IndicatorValue {
    /// Scalar access: a `Simple` value directly, or one field of a record.
    /// Absent fields resolve to `None`, never to zero.
    pub fn scalar(&self, field: Option<&str>) -> Option<f64> {
        match (self, field) {
            (IndicatorValue::Simple(v), None) => Some(*v),
            (IndicatorValue::Simple(_), Some(_)) => None,
            (IndicatorValue::Record(map), Some(name)) => map.get(name).copied(),
            (IndicatorValue::Record(_), None) => None,
        }
    }

    pub fn record(fields: impl IntoIterator<Item = (&'static str, f64)>) -> Self {
        IndicatorValue::Record(
            fields
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorPoint {
    pub timestamp: TimestampMs,
    pub value: IndicatorValue,
}

/// Indicator identity and parameters. A closed set: configuration resolves
/// to one of these variants or fails, there is no open class dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndicatorKind {
    Sma(usize),
    Ema(usize),
    Rsi(usize),
    Stddev(usize),
    Macd {
        fast: usize,
        slow: usize,
        signal: usize,
    },
    Bollinger {
        period: usize,
        stddev_mult_x100: u32,
    },
    Composite(Vec<(String, IndicatorKind)>),
}

impl fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorKind::Sma(period) => write!(f, "SMA({})", period),
            IndicatorKind::Ema(period) => write!(f, "EMA({})", period),
            IndicatorKind::Rsi(period) => write!(f, "RSI({})", period),
            IndicatorKind::Stddev(period) => write!(f, "STDDEV({})", period),
            IndicatorKind::Macd { fast, slow, signal } => {
                write!(f, "MACD({},{},{})", fast, slow, signal)
            }
            IndicatorKind::Bollinger {
                period,
                stddev_mult_x100,
            } => {
                let mult = *stddev_mult_x100 as f64 / 100.0;
                write!(f, "BOLLINGER({},{})", period, mult)
            }
            IndicatorKind::Composite(subs) => {
                write!(f, "COMPOSITE(")?;
                for (i, (alias, kind)) in subs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}={}", alias, kind)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Declarative indicator configuration: `{kind, parameters}`, with
/// composites nesting `alias -> {kind, parameters}`.
#[derive(Debug, Clone, Deserialize)]
pub struct IndicatorSpec {
    pub kind: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, f64>,
    #[serde(default)]
    pub indicators: BTreeMap<String, IndicatorSpec>,
}

impl IndicatorSpec {
    fn param_usize(&self, name: &str, default: usize) -> Result<usize, GridtraderError> {
        match self.parameters.get(name) {
            None => Ok(default),
            Some(v) if *v >= 1.0 && v.fract() == 0.0 => Ok(*v as usize),
            Some(v) => Err(GridtraderError::InvalidArgument {
                reason: format!("indicator parameter '{}' must be a positive integer, got {}", name, v),
            }),
        }
    }

    /// Resolve the declarative form into a typed kind. Unknown kind
    /// identifiers fail; the registry is closed.
    pub fn resolve(&self) -> Result<IndicatorKind, GridtraderError> {
        match self.kind.as_str() {
            "sma" => Ok(IndicatorKind::Sma(self.param_usize("period", 14)?)),
            "ema" => Ok(IndicatorKind::Ema(self.param_usize("period", 14)?)),
            "rsi" => Ok(IndicatorKind::Rsi(self.param_usize("period", 14)?)),
            "stddev" => Ok(IndicatorKind::Stddev(self.param_usize("period", 20)?)),
            "macd" => Ok(IndicatorKind::Macd {
                fast: self.param_usize("fast", 12)?,
                slow: self.param_usize("slow", 26)?,
                signal: self.param_usize("signal", 9)?,
            }),
            "bollinger" => {
                let mult = self.parameters.get("stddev_mult").copied().unwrap_or(2.0);
                if mult <= 0.0 {
                    return Err(GridtraderError::InvalidArgument {
                        reason: format!("bollinger stddev_mult must be positive, got {}", mult),
                    });
                }
                Ok(IndicatorKind::Bollinger {
                    period: self.param_usize("period", 20)?,
                    stddev_mult_x100: (mult * 100.0).round() as u32,
                })
            }
            "composite" => {
                if self.indicators.is_empty() {
                    return Err(GridtraderError::InvalidArgument {
                        reason: "composite indicator requires at least one sub-indicator".into(),
                    });
                }
                let subs = self
                    .indicators
                    .iter()
                    .map(|(alias, spec)| Ok((alias.clone(), spec.resolve()?)))
                    .collect::<Result<Vec<_>, GridtraderError>>()?;
                Ok(IndicatorKind::Composite(subs))
            }
            other => Err(GridtraderError::InvalidArgument {
                reason: format!("unknown indicator kind '{}'", other),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSeries {
    pub kind: IndicatorKind,
    pub points: Vec<IndicatorPoint>,
}

impl IndicatorSeries {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first_timestamp(&self) -> Option<TimestampMs> {
        self.points.first().map(|p| p.timestamp)
    }

    pub fn value_at(&self, timestamp: TimestampMs) -> Option<&IndicatorValue> {
        self.points
            .binary_search_by_key(&timestamp, |p| p.timestamp)
            .ok()
            .map(|i| &self.points[i].value)
    }
}

/// Compute one indicator series over a candle window. Dispatch is a
/// closed match over [`IndicatorKind`].
pub fn compute(kind: &IndicatorKind, candles: &[Candle]) -> IndicatorSeries {
    match kind {
        IndicatorKind::Sma(period) => sma::calculate_sma(candles, *period),
        IndicatorKind::Ema(period) => ema::calculate_ema(candles, *period),
        IndicatorKind::Rsi(period) => rsi::calculate_rsi(candles, *period),
        IndicatorKind::Stddev(period) => stddev::calculate_stddev(candles, *period),
        IndicatorKind::Macd { fast, slow, signal } => {
            macd::calculate_macd(candles, *fast, *slow, *signal)
        }
        IndicatorKind::Bollinger {
            period,
            stddev_mult_x100,
        } => bollinger::calculate_bollinger(candles, *period, *stddev_mult_x100 as f64 / 100.0),
        IndicatorKind::Composite(subs) => compute_composite(kind, subs, candles),
    }
}

/// Merge sub-series on timestamp keys into one record per timestamp. A
/// scalar sub contributes its alias as the field name; a record sub is
/// flattened as `alias.field`. Missing leading values are absent from the
/// record, never defaulted to zero.
fn compute_composite(
    kind: &IndicatorKind,
    subs: &[(String, IndicatorKind)],
    candles: &[Candle],
) -> IndicatorSeries {
    let computed: Vec<(&str, IndicatorSeries)> = subs
        .iter()
        .map(|(alias, sub_kind)| (alias.as_str(), compute(sub_kind, candles)))
        .collect();

    let mut merged: BTreeMap<TimestampMs, BTreeMap<String, f64>> = BTreeMap::new();
    for (alias, series) in &computed {
        for point in &series.points {
            let record = merged.entry(point.timestamp).or_default();
            match &point.value {
                IndicatorValue::Simple(v) => {
                    record.insert(alias.to_string(), *v);
                }
                IndicatorValue::Record(fields) => {
                    for (field, v) in fields {
                        record.insert(format!("{}.{}", alias, field), *v);
                    }
                }
            }
        }
    }

    IndicatorSeries {
        kind: kind.clone(),
        points: merged
            .into_iter()
            .map(|(timestamp, record)| IndicatorPoint {
                timestamp,
                value: IndicatorValue::Record(record),
            })
            .collect(),
    }
}

/// Computes each requested kind once per candle window and caches it for
/// the caller's session.
pub struct IndicatorEngine<'a> {
    candles: &'a [Candle],
    cache: HashMap<IndicatorKind, IndicatorSeries>,
}

impl<'a> IndicatorEngine<'a> {
    pub fn new(candles: &'a [Candle]) -> Self {
        IndicatorEngine {
            candles,
            cache: HashMap::new(),
        }
    }

    pub fn candles(&self) -> &'a [Candle] {
        self.candles
    }

    /// Compute and cache the series for `kind` if not already present.
    pub fn ensure(&mut self, kind: &IndicatorKind) {
        if !self.cache.contains_key(kind) {
            let series = compute(kind, self.candles);
            self.cache.insert(kind.clone(), series);
        }
    }

    pub fn series(&self, kind: &IndicatorKind) -> Option<&IndicatorSeries> {
        self.cache.get(kind)
    }

    /// Cursor view over a cached series, aligned to the engine's window.
    pub fn view(&self, kind: &IndicatorKind) -> Option<SeriesView<'_>> {
        self.series(kind)
            .map(|series| SeriesView::new(series, self.candles))
    }
}
