use std::collections::HashMap;
use std::io::Write;

use crate::config::ScanConfig;
use crate::error::{Result, ScanError};
use crate::tokenizer::Row;
use crate::writer::OutputWriter;

// ============================================================================
//  TRAIT
// ============================================================================

/// What a handler did with a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOutcome {
    Handled,
    /// The row did not satisfy the handler; `required` is the minimum
    /// field count it needed.
    Skipped { required: usize },
    /// The row was wide enough but field `field` could not be interpreted.
    Invalid { field: usize },
}

/// Per-row unit plugged into the tokenizer.
///
/// `on_row` runs once for every data row. `finish` runs once at end of
/// stream and emits whatever the handler accumulated. Both write through the
/// shared [`OutputWriter`]; the driver flushes it afterwards.
pub trait RowHandler {
    fn on_row<W: Write>(&mut self, row: &Row<'_>, out: &mut OutputWriter<W>) -> Result<RowOutcome>;
    fn finish<W: Write>(&mut self, out: &mut OutputWriter<W>) -> Result<()>;
}

#[inline(always)]
fn write_decimal<W: Write>(out: &mut OutputWriter<W>, value: u64, record_sep: u8) -> Result<()> {
    let mut line = value.to_string().into_bytes();
    line.push(record_sep);
    out.write(&line)
}

// ============================================================================
//  FREQUENCY AGGREGATOR
// ============================================================================

/// How field values become aggregation keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyMode {
    /// Exact byte content; `3` and `03` are distinct keys.
    #[default]
    Bytes,
    /// Signed decimal integers in canonical form; `3` and `03` collide.
    /// Fields that do not parse are treated as malformed rows.
    Integer,
}

/// Order in which aggregate lines are emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmitOrder {
    #[default]
    FirstSeen,
    /// Bytewise ascending key.
    Key,
    /// Descending count, ties in order of first occurrence.
    Count,
}

/// Counts occurrences of one field's value.
pub struct FrequencyAggregator {
    field: usize,
    key_mode: KeyMode,
    order: EmitOrder,
    field_sep: u8,
    record_sep: u8,
    // key -> slot in `counts`; slot order is first-occurrence order
    index: HashMap<Vec<u8>, usize>,
    counts: Vec<u64>,
    key_buf: Vec<u8>,
}

impl FrequencyAggregator {
    pub fn new(field: usize, key_mode: KeyMode, order: EmitOrder, field_sep: u8, record_sep: u8) -> Self {
        Self {
            field,
            key_mode,
            order,
            field_sep,
            record_sep,
            index: HashMap::new(),
            counts: Vec::new(),
            key_buf: Vec::with_capacity(24),
        }
    }

    /// Keys and counts in first-occurrence order.
    pub fn entries(&self) -> Vec<(&[u8], u64)> {
        let mut out: Vec<(&[u8], u64)> = vec![(&[][..], 0); self.counts.len()];
        for (key, &slot) in &self.index {
            out[slot] = (key.as_slice(), self.counts[slot]);
        }
        out
    }

    pub fn distinct(&self) -> usize {
        self.counts.len()
    }

    #[inline(always)]
    fn bump(&mut self, key: &[u8]) {
        if let Some(&slot) = self.index.get(key) {
            self.counts[slot] += 1;
        } else {
            self.index.insert(key.to_vec(), self.counts.len());
            self.counts.push(1);
        }
    }
}

impl RowHandler for FrequencyAggregator {
    #[inline]
    fn on_row<W: Write>(&mut self, row: &Row<'_>, _out: &mut OutputWriter<W>) -> Result<RowOutcome> {
        let required = self.field + 1;
        let value = match row.field(self.field) {
            Some(v) => v,
            None => return Ok(RowOutcome::Skipped { required }),
        };

        match self.key_mode {
            KeyMode::Bytes => self.bump(value),
            KeyMode::Integer => {
                let n = match parse_integer(value) {
                    Some(n) => n,
                    None => return Ok(RowOutcome::Invalid { field: self.field }),
                };
                let mut key = std::mem::take(&mut self.key_buf);
                key.clear();
                write!(key, "{}", n)?;
                self.bump(&key);
                self.key_buf = key;
            }
        }
        Ok(RowOutcome::Handled)
    }

    fn finish<W: Write>(&mut self, out: &mut OutputWriter<W>) -> Result<()> {
        let mut entries = self.entries();
        match self.order {
            EmitOrder::FirstSeen => {}
            EmitOrder::Key => entries.sort_by(|a, b| a.0.cmp(b.0)),
            // stable sort keeps first-seen order among equal counts
            EmitOrder::Count => entries.sort_by(|a, b| b.1.cmp(&a.1)),
        }

        let mut line = Vec::with_capacity(64);
        for (key, count) in entries {
            line.clear();
            line.extend_from_slice(key);
            line.push(self.field_sep);
            write!(line, "{}", count)?;
            line.push(self.record_sep);
            out.write(&line)?;
        }
        Ok(())
    }
}

/// Signed decimal integer, optional `+`/`-`, no whitespace.
fn parse_integer(bytes: &[u8]) -> Option<i64> {
    std::str::from_utf8(bytes).ok()?.parse().ok()
}

// ============================================================================
//  CONDITIONAL COUNTER
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchMode {
    /// Field starts with the pattern. A one-byte pattern tests the first byte.
    #[default]
    Prefix,
    /// Field equals the pattern.
    Exact,
}

/// Counts rows whose field matches a fixed pattern.
pub struct ConditionalCounter {
    field: usize,
    pattern: Vec<u8>,
    mode: MatchMode,
    record_sep: u8,
    count: u64,
}

impl ConditionalCounter {
    pub fn new(field: usize, pattern: Vec<u8>, mode: MatchMode, record_sep: u8) -> Self {
        Self { field, pattern, mode, record_sep, count: 0 }
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}

impl RowHandler for ConditionalCounter {
    #[inline]
    fn on_row<W: Write>(&mut self, row: &Row<'_>, _out: &mut OutputWriter<W>) -> Result<RowOutcome> {
        let value = match row.field(self.field) {
            Some(v) => v,
            None => return Ok(RowOutcome::Skipped { required: self.field + 1 }),
        };
        let hit = match self.mode {
            MatchMode::Prefix => value.starts_with(&self.pattern),
            MatchMode::Exact => value == self.pattern.as_slice(),
        };
        if hit {
            self.count += 1;
        }
        Ok(RowOutcome::Handled)
    }

    fn finish<W: Write>(&mut self, out: &mut OutputWriter<W>) -> Result<()> {
        write_decimal(out, self.count, self.record_sep)
    }
}

// ============================================================================
//  COLUMN PROJECTOR
// ============================================================================

/// Re-emits each row with its fields in a configured order.
pub struct ColumnProjector {
    columns: Vec<usize>,
    required: usize,
    field_sep: u8,
    record_sep: u8,
    scratch: Vec<u8>,
}

impl ColumnProjector {
    pub fn new(columns: Vec<usize>, field_sep: u8, record_sep: u8) -> Self {
        let required = columns.iter().max().map_or(0, |m| m + 1);
        Self { columns, required, field_sep, record_sep, scratch: Vec::with_capacity(256) }
    }
}

impl RowHandler for ColumnProjector {
    #[inline]
    fn on_row<W: Write>(&mut self, row: &Row<'_>, out: &mut OutputWriter<W>) -> Result<RowOutcome> {
        if row.field_count() < self.required {
            return Ok(RowOutcome::Skipped { required: self.required });
        }

        self.scratch.clear();
        for (i, &col) in self.columns.iter().enumerate() {
            if i > 0 {
                self.scratch.push(self.field_sep);
            }
            if let Some(value) = row.field(col) {
                self.scratch.extend_from_slice(value);
            }
        }
        self.scratch.push(self.record_sep);
        out.write(&self.scratch)?;
        Ok(RowOutcome::Handled)
    }

    fn finish<W: Write>(&mut self, _out: &mut OutputWriter<W>) -> Result<()> {
        Ok(())
    }
}

// ============================================================================
//  RUNTIME ENUM WRAPPER (lets the CLI pick a handler dynamically)
// ============================================================================

pub enum RuntimeHandler {
    Frequency(FrequencyAggregator),
    Conditional(ConditionalCounter),
    Projector(ColumnProjector),
}

impl RowHandler for RuntimeHandler {
    #[inline]
    fn on_row<W: Write>(&mut self, row: &Row<'_>, out: &mut OutputWriter<W>) -> Result<RowOutcome> {
        match self {
            RuntimeHandler::Frequency(h) => h.on_row(row, out),
            RuntimeHandler::Conditional(h) => h.on_row(row, out),
            RuntimeHandler::Projector(h) => h.on_row(row, out),
        }
    }

    fn finish<W: Write>(&mut self, out: &mut OutputWriter<W>) -> Result<()> {
        match self {
            RuntimeHandler::Frequency(h) => h.finish(out),
            RuntimeHandler::Conditional(h) => h.finish(out),
            RuntimeHandler::Projector(h) => h.finish(out),
        }
    }
}

/// Handler selection plus parameters, validated against a [`ScanConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerSpec {
    CountValues { field: usize, key_mode: KeyMode, order: EmitOrder },
    CountMatches { field: usize, pattern: Vec<u8>, mode: MatchMode },
    Reorder { columns: Vec<usize> },
}

impl HandlerSpec {
    pub fn name(&self) -> &'static str {
        match self {
            HandlerSpec::CountValues { .. } => "count-values",
            HandlerSpec::CountMatches { .. } => "count-matches",
            HandlerSpec::Reorder { .. } => "reorder",
        }
    }

    pub fn build(&self, cfg: &ScanConfig) -> Result<RuntimeHandler> {
        let check_index = |index: usize| {
            if index >= cfg.max_fields {
                Err(ScanError::config(format!(
                    "field index {} is outside the {} fields a row can hold",
                    index, cfg.max_fields
                )))
            } else {
                Ok(())
            }
        };

        match self {
            HandlerSpec::CountValues { field, key_mode, order } => {
                check_index(*field)?;
                Ok(RuntimeHandler::Frequency(FrequencyAggregator::new(
                    *field, *key_mode, *order, cfg.field_sep, cfg.record_sep,
                )))
            }
            HandlerSpec::CountMatches { field, pattern, mode } => {
                check_index(*field)?;
                if pattern.is_empty() {
                    return Err(ScanError::config("match pattern is empty"));
                }
                if pattern.contains(&cfg.field_sep) || pattern.contains(&cfg.record_sep) {
                    return Err(ScanError::config("match pattern contains a separator byte"));
                }
                Ok(RuntimeHandler::Conditional(ConditionalCounter::new(
                    *field, pattern.clone(), *mode, cfg.record_sep,
                )))
            }
            HandlerSpec::Reorder { columns } => {
                if columns.is_empty() {
                    return Err(ScanError::config("column list is empty"));
                }
                for &c in columns {
                    check_index(c)?;
                }
                Ok(RuntimeHandler::Projector(ColumnProjector::new(
                    columns.clone(), cfg.field_sep, cfg.record_sep,
                )))
            }
        }
    }
}
