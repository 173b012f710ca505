//! Raw sheet rows and the cleaning rules that turn them into production entries.
//!
//! Pipeline, applied per fetch:
//! 1. Trim every header (first header wins on collision)
//! 2. Check the mapped columns exist
//! 3. Drop rows whose cow name is blank
//! 4. Type the date and liters fields
//! 5. Drop rows where either failed
//!
//! Dropped rows are counted in [`CleaningStats`], never reported as errors.

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::Deserialize;

use crate::error::LoadError;

// ============================================================================
// Raw input
// ============================================================================

/// A single cell as returned by the sheet.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Text(String),
    Number(f64),
    Empty,
}

impl RawValue {
    /// Text rendering used for name fields.
    pub fn as_text(&self) -> String {
        match self {
            RawValue::Text(s) => s.clone(),
            RawValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
            RawValue::Number(n) => n.to_string(),
            RawValue::Empty => String::new(),
        }
    }

    pub fn is_blank(&self) -> bool {
        match self {
            RawValue::Text(s) => s.trim().is_empty(),
            RawValue::Number(_) => false,
            RawValue::Empty => true,
        }
    }
}

impl From<serde_json::Value> for RawValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => RawValue::Empty,
            serde_json::Value::String(s) if s.is_empty() => RawValue::Empty,
            serde_json::Value::String(s) => RawValue::Text(s),
            serde_json::Value::Number(n) => n.as_f64().map(RawValue::Number).unwrap_or(RawValue::Empty),
            serde_json::Value::Bool(b) => RawValue::Text(if b { "TRUE" } else { "FALSE" }.to_string()),
            other => RawValue::Text(other.to_string()),
        }
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        if value.is_empty() {
            RawValue::Empty
        } else {
            RawValue::Text(value.to_string())
        }
    }
}

/// One unvalidated row: header → cell, in sheet column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    fields: Vec<(String, RawValue)>,
}

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, header: impl Into<String>, value: RawValue) {
        self.fields.push((header.into(), value));
    }

    /// Exact-header lookup; call [`RawRecord::normalized`] first for trimmed lookups.
    pub fn get(&self, header: &str) -> Option<&RawValue> {
        self.fields
            .iter()
            .find(|(h, _)| h == header)
            .map(|(_, v)| v)
    }

    pub fn headers(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(h, _)| h.as_str())
    }

    /// Trim every header. When two headers collide after trimming the first one wins.
    pub fn normalized(self) -> RawRecord {
        let mut fields: Vec<(String, RawValue)> = Vec::with_capacity(self.fields.len());
        for (header, value) in self.fields {
            let header = normalize_header(&header);
            if fields.iter().any(|(h, _)| *h == header) {
                continue;
            }
            fields.push((header, value));
        }
        RawRecord { fields }
    }
}

impl<K: Into<String>, V: Into<RawValue>> FromIterator<(K, V)> for RawRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        RawRecord {
            fields: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

// ============================================================================
// Schema + locale configuration
// ============================================================================

/// Which sheet headers feed which entry field (compared after trimming).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMapping {
    #[serde(default = "default_cow_column")]
    pub cow_name: String,
    #[serde(default = "default_date_column")]
    pub date: String,
    #[serde(default = "default_liters_column")]
    pub liters: String,
}

fn default_cow_column() -> String {
    "Nombre Vaca".to_string()
}
fn default_date_column() -> String {
    "Fecha".to_string()
}
fn default_liters_column() -> String {
    "Cantidad litros".to_string()
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self {
            cow_name: default_cow_column(),
            date: default_date_column(),
            liters: default_liters_column(),
        }
    }
}

impl ColumnMapping {
    fn normalized(&self) -> ColumnMapping {
        ColumnMapping {
            cow_name: normalize_header(&self.cow_name),
            date: normalize_header(&self.date),
            liters: normalize_header(&self.liters),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DateOrder {
    #[default]
    DayFirst,
    MonthFirst,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DecimalStyle {
    /// `1,234.5`
    #[default]
    Dot,
    /// `1.234,5`
    Comma,
}

impl DecimalStyle {
    fn decimal_char(self) -> char {
        match self {
            DecimalStyle::Dot => '.',
            DecimalStyle::Comma => ',',
        }
    }

    fn group_char(self) -> char {
        match self {
            DecimalStyle::Dot => ',',
            DecimalStyle::Comma => '.',
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Locale {
    #[serde(default)]
    pub date_order: DateOrder,
    #[serde(default)]
    pub decimal: DecimalStyle,
}

// ============================================================================
// Clean output
// ============================================================================

/// One validated production record.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductionEntry {
    pub cow_name: String,
    pub date: NaiveDate,
    pub liters: f64,
}

/// What the cleaning pass saw and dropped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleaningStats {
    pub fetched: usize,
    pub blank_rows: usize,
    /// Field-level counts; a row failing both is counted in both.
    pub invalid_date: usize,
    pub invalid_liters: usize,
    pub kept: usize,
}

impl CleaningStats {
    pub fn dropped(&self) -> usize {
        self.fetched - self.kept
    }
}

/// The cleaned dataset handed to the presentation layer.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub entries: Vec<ProductionEntry>,
    pub stats: CleaningStats,
    pub fetched_at: DateTime<Utc>,
}

impl Dataset {
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
            stats: CleaningStats::default(),
            fetched_at: Utc::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

// ============================================================================
// Field rules
// ============================================================================

pub fn normalize_header(header: &str) -> String {
    header.trim().to_string()
}

/// Trim and capitalize: first character uppercase, the rest lowercase.
///
/// Idempotent, so case variants of the same cow collapse to one name.
pub fn normalize_cow_name(raw: &str) -> String {
    let mut chars = raw.trim().chars();
    let Some(first) = chars.next() else {
        return String::new();
    };

    let mut out = String::with_capacity(raw.len());
    // Multi-char uppercase expansions (e.g. 'ß' -> "SS") keep only the lead capital.
    let mut upper = first.to_uppercase();
    if let Some(head) = upper.next() {
        out.push(head);
    }
    out.extend(upper.flat_map(|c| c.to_lowercase()));
    out.extend(chars.flat_map(|c| c.to_lowercase()));
    out
}

/// Parse a date cell. Text follows `order` (ISO year-first is always accepted);
/// numbers are spreadsheet serial dates.
pub fn parse_date(raw: &RawValue, order: DateOrder) -> Option<NaiveDate> {
    match raw {
        RawValue::Text(text) => parse_date_text(text, order),
        RawValue::Number(serial) => parse_serial_date(*serial),
        RawValue::Empty => None,
    }
}

fn parse_date_text(text: &str, order: DateOrder) -> Option<NaiveDate> {
    let text = text.trim();
    // Drop a trailing time component ("05/01/2024 06:30", "2024-01-05T06:30:00").
    let date_part = text
        .split(|c: char| c.is_whitespace() || c == 'T')
        .next()
        .unwrap_or("");

    let separator = date_part.chars().find(|c| !c.is_ascii_digit())?;
    if !matches!(separator, '/' | '-' | '.') {
        return None;
    }

    let parts: Vec<&str> = date_part.split(separator).collect();
    if parts.len() != 3
        || parts
            .iter()
            .any(|p| p.is_empty() || !p.chars().all(|c| c.is_ascii_digit()))
    {
        return None;
    }

    let (year, month, day) = if parts[0].len() == 4 {
        (parts[0], parts[1], parts[2])
    } else {
        match order {
            DateOrder::DayFirst => (parts[2], parts[1], parts[0]),
            DateOrder::MonthFirst => (parts[2], parts[0], parts[1]),
        }
    };

    if month.len() > 2 || day.len() > 2 {
        return None;
    }
    let year = parse_year(year)?;
    let month: u32 = month.parse().ok()?;
    let day: u32 = day.parse().ok()?;

    NaiveDate::from_ymd_opt(year, month, day)
}

/// Two-digit years use the POSIX pivot: 00-68 -> 2000s, 69-99 -> 1900s.
fn parse_year(text: &str) -> Option<i32> {
    let value: i32 = text.parse().ok()?;
    match text.len() {
        4 => Some(value),
        2 if value < 69 => Some(2000 + value),
        2 => Some(1900 + value),
        _ => None,
    }
}

/// Spreadsheet serial day numbers count from 1899-12-30.
fn parse_serial_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 || serial > 2_958_465.0 {
        return None;
    }
    NaiveDate::from_ymd_opt(1899, 12, 30)?.checked_add_days(Days::new(serial.floor() as u64))
}

/// Parse a liters cell into a finite, non-negative number.
pub fn parse_liters(raw: &RawValue, decimal: DecimalStyle) -> Option<f64> {
    let value = match raw {
        RawValue::Number(n) => *n,
        RawValue::Text(text) => parse_number_text(text, decimal)?,
        RawValue::Empty => return None,
    };
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    // Normalize -0.0
    Some(value + 0.0)
}

const LOOSE_GROUP_SEPARATORS: &[char] = &[' ', '\u{a0}', '\u{202f}', '\'', '_'];

fn parse_number_text(text: &str, decimal: DecimalStyle) -> Option<f64> {
    let text = text.trim();
    let (negative, body) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    // Scientific notation: `1.5e3`, `2E-1`
    let (body, exponent) = match body.find(&['e', 'E'][..]) {
        Some(at) => {
            let exp = &body[at + 1..];
            let digits = exp.strip_prefix(['+', '-']).unwrap_or(exp);
            if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            (&body[..at], exp.parse::<i32>().ok()?)
        }
        None => (body, 0),
    };

    let decimal_char = decimal.decimal_char();
    let group_char = decimal.group_char();

    let mut halves = body.splitn(2, decimal_char);
    let int_part = halves.next().unwrap_or("");
    let frac_part = halves.next();

    if let Some(frac) = frac_part {
        if !frac.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
    }

    let int_part: String = int_part
        .chars()
        .map(|c| if LOOSE_GROUP_SEPARATORS.contains(&c) { group_char } else { c })
        .collect();
    let int_digits = if int_part.contains(group_char) {
        let groups: Vec<&str> = int_part.split(group_char).collect();
        let well_formed = groups.iter().enumerate().all(|(i, g)| {
            let len_ok = if i == 0 { (1..=3).contains(&g.len()) } else { g.len() == 3 };
            len_ok && g.chars().all(|c| c.is_ascii_digit())
        });
        if !well_formed {
            return None;
        }
        groups.concat()
    } else if int_part.chars().all(|c| c.is_ascii_digit()) {
        int_part
    } else {
        return None;
    };

    let frac_digits = frac_part.unwrap_or("");
    if int_digits.is_empty() && frac_digits.is_empty() {
        return None;
    }

    let value: f64 = format!(
        "{}.{}",
        if int_digits.is_empty() { "0" } else { &int_digits },
        if frac_digits.is_empty() { "0" } else { frac_digits }
    )
    .parse()
    .ok()?;
    let value = value * 10f64.powi(exponent);

    Some(if negative { -value } else { value })
}

// ============================================================================
// Pipeline
// ============================================================================

/// Run the full cleaning pass over fetched rows.
///
/// An empty input is an empty dataset. Missing mapped columns are a
/// load-level failure; everything else is a per-row drop.
pub fn clean_records(
    records: Vec<RawRecord>,
    mapping: &ColumnMapping,
    locale: &Locale,
) -> Result<Dataset, LoadError> {
    let mapping = mapping.normalized();
    if let Some(first) = records.first() {
        let mut seen: Vec<String> = Vec::new();
        for header in first.headers().map(normalize_header) {
            if seen.contains(&header) {
                log::warn!("Duplicate column {:?} after trimming; keeping the first", header);
            } else {
                seen.push(header);
            }
        }
    }
    let records: Vec<RawRecord> = records.into_iter().map(RawRecord::normalized).collect();

    if let Some(first) = records.first() {
        check_columns(first, &mapping)?;
    }

    let mut stats = CleaningStats {
        fetched: records.len(),
        ..CleaningStats::default()
    };
    let mut entries = Vec::with_capacity(records.len());

    for (index, record) in records.iter().enumerate() {
        let name = record
            .get(&mapping.cow_name)
            .map(RawValue::as_text)
            .unwrap_or_default();
        if name.trim().is_empty() {
            stats.blank_rows += 1;
            continue;
        }

        let date = record
            .get(&mapping.date)
            .and_then(|v| parse_date(v, locale.date_order));
        let liters = record
            .get(&mapping.liters)
            .and_then(|v| parse_liters(v, locale.decimal));

        if date.is_none() {
            stats.invalid_date += 1;
        }
        if liters.is_none() {
            stats.invalid_liters += 1;
        }

        match (date, liters) {
            (Some(date), Some(liters)) => entries.push(ProductionEntry {
                cow_name: normalize_cow_name(&name),
                date,
                liters,
            }),
            _ => {
                log::debug!(
                    "Dropping row {} ({}): date={:?} liters={:?}",
                    index + 2,
                    name.trim(),
                    record.get(&mapping.date),
                    record.get(&mapping.liters)
                );
            }
        }
    }

    stats.kept = entries.len();
    Ok(Dataset {
        entries,
        stats,
        fetched_at: Utc::now(),
    })
}

fn check_columns(record: &RawRecord, mapping: &ColumnMapping) -> Result<(), LoadError> {
    let missing: Vec<String> = [&mapping.cow_name, &mapping.date, &mapping.liters]
        .into_iter()
        .filter(|column| record.get(column).is_none())
        .cloned()
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(LoadError::MissingColumns { missing })
    }
}
