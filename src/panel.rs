use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::EvalError;

/// Calendar trading day in `YYYYMMDD` form, stored packed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TradeDate(u32);

impl TradeDate {
    pub fn parse(text: &str) -> Result<Self, EvalError> {
        let invalid = |reason: &str| EvalError::InvalidDate {
            text: text.to_string(),
            reason: reason.to_string(),
        };
        if text.len() != 8 || !text.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("expected 8 digits (YYYYMMDD)"));
        }
        let packed: u32 = text
            .parse()
            .map_err(|_| invalid("expected 8 digits (YYYYMMDD)"))?;
        Self::from_yyyymmdd(packed)
    }

    pub fn from_yyyymmdd(packed: u32) -> Result<Self, EvalError> {
        let year = (packed / 10_000) as i32;
        let month = (packed / 100) % 100;
        let day = packed % 100;
        if NaiveDate::from_ymd_opt(year, month, day).is_none() {
            return Err(EvalError::InvalidDate {
                text: format!("{packed:08}"),
                reason: "not a calendar date".to_string(),
            });
        }
        Ok(Self(packed))
    }

    #[inline]
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TradeDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08}", self.0)
    }
}

impl TryFrom<String> for TradeDate {
    type Error = EvalError;

    fn try_from(text: String) -> Result<Self, Self::Error> {
        Self::parse(&text)
    }
}

impl From<TradeDate> for String {
    fn from(date: TradeDate) -> Self {
        date.to_string()
    }
}

/// Shared (symbols x dates) universe every panel vector in a bundle is keyed on.
///
/// Symbols keep their insertion order; dates are strictly ascending. Both axes
/// are fixed at construction, so vectors sharing an index can never disagree on
/// keys and no operator can introduce a key its inputs did not have.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelIndex {
    symbols: Vec<String>,
    dates: Vec<TradeDate>,
    symbol_slots: HashMap<String, usize>,
}

impl PanelIndex {
    pub fn new(symbols: Vec<String>, dates: Vec<TradeDate>) -> Result<Self, EvalError> {
        let mut symbol_slots = HashMap::with_capacity(symbols.len());
        for (slot, symbol) in symbols.iter().enumerate() {
            if symbol_slots.insert(symbol.clone(), slot).is_some() {
                return Err(EvalError::InvalidIndex {
                    reason: format!("duplicate symbol `{symbol}`"),
                });
            }
        }
        for pair in dates.windows(2) {
            if pair[1] <= pair[0] {
                return Err(EvalError::InvalidIndex {
                    reason: format!("dates not strictly ascending at `{}`", pair[1]),
                });
            }
        }
        Ok(Self {
            symbols,
            dates,
            symbol_slots,
        })
    }

    /// Convenience constructor parsing `YYYYMMDD` date strings.
    pub fn from_parts(
        symbols: &[&str],
        dates: &[&str],
    ) -> Result<Arc<Self>, EvalError> {
        let symbols = symbols.iter().map(|s| s.to_string()).collect();
        let dates = dates
            .iter()
            .map(|d| TradeDate::parse(d))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Arc::new(Self::new(symbols, dates)?))
    }

    #[inline]
    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    #[inline]
    pub fn date_count(&self) -> usize {
        self.dates.len()
    }

    /// Total cell count, `symbol_count * date_count`.
    #[inline]
    pub fn len(&self) -> usize {
        self.symbols.len() * self.dates.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty() || self.dates.is_empty()
    }

    #[inline]
    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    #[inline]
    pub fn dates(&self) -> &[TradeDate] {
        &self.dates
    }

    #[inline]
    pub fn symbol_slot(&self, symbol: &str) -> Option<usize> {
        self.symbol_slots.get(symbol).copied()
    }

    #[inline]
    pub fn cell(&self, symbol_row: usize, date_col: usize) -> usize {
        symbol_row * self.dates.len() + date_col
    }
}

/// Dense panel of `f64` keyed by (symbol, date).
///
/// Row-major per symbol: `values[symbol_row * date_count + date_col]`. A cell
/// with no observation holds NaN; NaN is the one undefined marker throughout
/// the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct PanelVector {
    index: Arc<PanelIndex>,
    values: Vec<f64>,
}

impl PanelVector {
    pub fn from_values(index: Arc<PanelIndex>, values: Vec<f64>) -> Self {
        assert_eq!(
            values.len(),
            index.len(),
            "panel vector length must match the universe size"
        );
        Self { index, values }
    }

    pub fn filled(index: Arc<PanelIndex>, value: f64) -> Self {
        let values = vec![value; index.len()];
        Self { index, values }
    }

    #[inline]
    pub fn index(&self) -> &Arc<PanelIndex> {
        &self.index
    }

    #[inline]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    #[inline]
    pub fn values_mut(&mut self) -> &mut [f64] {
        &mut self.values
    }

    pub fn into_values(self) -> Vec<f64> {
        self.values
    }

    /// One symbol's full date series, ascending.
    #[inline]
    pub fn row(&self, symbol_row: usize) -> &[f64] {
        let width = self.index.date_count();
        &self.values[symbol_row * width..(symbol_row + 1) * width]
    }

    #[inline]
    pub fn value_at(&self, symbol_row: usize, date_col: usize) -> f64 {
        self.values[self.index.cell(symbol_row, date_col)]
    }

    pub fn non_finite_count(&self) -> usize {
        self.values.iter().filter(|v| !v.is_finite()).count()
    }

    /// Flatten into persistence rows keyed (date, symbol, factor); NaN cells
    /// carry no observation and are skipped.
    pub fn to_rows(&self, factor: &str) -> Vec<FactorValueRow> {
        let mut rows = Vec::new();
        for (symbol_row, symbol) in self.index.symbols().iter().enumerate() {
            for (date_col, date) in self.index.dates().iter().enumerate() {
                let value = self.value_at(symbol_row, date_col);
                if value.is_nan() {
                    continue;
                }
                rows.push(FactorValueRow {
                    date: *date,
                    symbol: symbol.clone(),
                    factor: factor.to_string(),
                    value,
                });
            }
        }
        rows
    }
}

/// One output observation at the persistence boundary, deduplicated downstream
/// on (date, symbol, factor).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorValueRow {
    pub date: TradeDate,
    pub symbol: String,
    pub factor: String,
    pub value: f64,
}

/// Named raw-field panels sharing one key universe.
#[derive(Debug, Clone)]
pub struct InputBundle {
    index: Arc<PanelIndex>,
    fields: HashMap<String, PanelVector>,
    field_names: Vec<String>,
}

impl InputBundle {
    pub fn new(index: Arc<PanelIndex>) -> Self {
        Self {
            index,
            fields: HashMap::new(),
            field_names: Vec::new(),
        }
    }

    /// Insert a field panel; it must be keyed on this bundle's universe.
    /// Field names are normalized (trimmed, lower-cased). Re-inserting a name
    /// replaces the previous panel.
    pub fn insert(&mut self, name: &str, vector: PanelVector) -> Result<(), EvalError> {
        let name = normalize_field_name(name);
        if !Arc::ptr_eq(&self.index, vector.index()) && *self.index != **vector.index() {
            return Err(EvalError::UniverseMismatch { field: name });
        }
        if self.fields.insert(name.clone(), vector).is_none() {
            self.field_names.push(name);
        }
        Ok(())
    }

    pub fn insert_values(&mut self, name: &str, values: Vec<f64>) -> Result<(), EvalError> {
        if values.len() != self.index.len() {
            return Err(EvalError::UniverseMismatch {
                field: normalize_field_name(name),
            });
        }
        self.insert(name, PanelVector::from_values(self.index.clone(), values))
    }

    #[inline]
    pub fn index(&self) -> &Arc<PanelIndex> {
        &self.index
    }

    /// Lookup under the normalized name, so `CLOSE` and `close` are the
    /// same field.
    pub fn field(&self, name: &str) -> Result<&PanelVector, EvalError> {
        let name = normalize_field_name(name);
        self.fields.get(&name).ok_or(EvalError::MissingField { field: name })
    }

    #[inline]
    pub fn get(&self, name: &str) -> Option<&PanelVector> {
        self.fields.get(&normalize_field_name(name))
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(&normalize_field_name(name))
    }

    /// Field names in insertion order.
    #[inline]
    pub fn field_names(&self) -> &[String] {
        &self.field_names
    }
}

pub(crate) fn normalize_field_name(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}
