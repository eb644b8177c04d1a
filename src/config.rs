use std::str::FromStr;

use crate::error::{Result, ScanError};

// ============================================================================
//  DEFAULTS
// ============================================================================

pub const DEFAULT_BUFFER_SIZE: usize = 512 * 1024;
pub const DEFAULT_MAX_FIELDS: usize = 1 << 16;
pub const DEFAULT_FIELD_SEP: u8 = b',';
pub const DEFAULT_RECORD_SEP: u8 = b'\n';

/// What the driver does with a row that does not satisfy the handler's
/// minimum field requirement (or the header width under `strict_width`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MalformedPolicy {
    /// Drop silently. The fast path.
    #[default]
    Skip,
    /// Drop, then print `bad lines: N` to stderr at end of stream.
    Report,
    /// Abort the run on the first one.
    Fail,
}

impl FromStr for MalformedPolicy {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" | "silent" => Ok(MalformedPolicy::Skip),
            "report" => Ok(MalformedPolicy::Report),
            "fail" | "strict" => Ok(MalformedPolicy::Fail),
            other => Err(ScanError::config(format!("unknown malformed-row policy '{}'", other))),
        }
    }
}

/// Settings shared by every stage of one scan.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Bytes requested per chunk read.
    pub buffer_size: usize,
    /// Capacity of the output write buffer.
    pub write_buffer_size: usize,
    /// Capacity of the offsets table; a row with more fields is an error.
    pub max_fields: usize,
    pub field_sep: u8,
    pub record_sep: u8,
    /// Consume and discard the first record before scanning.
    pub skip_header: bool,
    /// Require every data row to have exactly as many fields as the header.
    pub strict_width: bool,
    pub malformed: MalformedPolicy,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            write_buffer_size: DEFAULT_BUFFER_SIZE,
            max_fields: DEFAULT_MAX_FIELDS,
            field_sep: DEFAULT_FIELD_SEP,
            record_sep: DEFAULT_RECORD_SEP,
            skip_header: true,
            strict_width: false,
            malformed: MalformedPolicy::Skip,
        }
    }
}

impl ScanConfig {
    /// Rejects configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.buffer_size == 0 {
            return Err(ScanError::config("buffer size must be greater than zero"));
        }
        if self.write_buffer_size == 0 {
            return Err(ScanError::config("write buffer size must be greater than zero"));
        }
        if self.max_fields == 0 {
            return Err(ScanError::config("max fields per row must be greater than zero"));
        }
        if self.field_sep == self.record_sep {
            return Err(ScanError::config(format!(
                "field and record separators must differ (both are {:?})",
                self.field_sep as char
            )));
        }
        if self.strict_width && !self.skip_header {
            return Err(ScanError::config("strict width needs a header row to take the width from"));
        }
        Ok(())
    }
}

// ============================================================================
//  PARSERS
// ============================================================================

/// Parses a human size such as `512K`, `4MB`, `1g` or a plain byte count.
pub fn parse_size(input: &str) -> Option<usize> {
    let input = input.trim().to_uppercase();
    let digits: String = input.chars().take_while(|c| c.is_ascii_digit()).collect();
    let unit_part: String = input.chars().skip(digits.len()).collect();
    if digits.is_empty() { return None; }
    let num = digits.parse::<usize>().ok()?;
    match unit_part.trim() {
        "GB" | "G" => num.checked_mul(1024 * 1024 * 1024),
        "MB" | "M" => num.checked_mul(1024 * 1024),
        "KB" | "K" => num.checked_mul(1024),
        "B"  | ""  => Some(num),
        _ => None,
    }
}

/// Parses a separator byte given on the command line.
pub fn parse_separator(input: &str) -> Result<u8> {
    let named = match input.to_ascii_lowercase().as_str() {
        "tab" | "\\t" => Some(b'\t'),
        "comma" => Some(b','),
        "pipe" => Some(b'|'),
        "newline" | "\\n" => Some(b'\n'),
        "\\r" => Some(b'\r'),
        "\\0" | "nul" => Some(0),
        _ => None,
    };
    if let Some(b) = named {
        return Ok(b);
    }

    if let Some(hex) = input.strip_prefix("0x").or_else(|| input.strip_prefix("0X")) {
        return u8::from_str_radix(hex, 16)
            .map_err(|_| ScanError::config(format!("invalid hex separator '{}'", input)));
    }

    match input.as_bytes() {
        [b] if b.is_ascii() => Ok(*b),
        _ => Err(ScanError::config(format!(
            "separator must be a single ASCII character, an escape or 0xNN, got '{}'",
            input
        ))),
    }
}

/// Parses a column list such as `7,6,5,4,3,2,1,0`, `7-0` or `2,6`.
/// Ranges expand in either direction. Every index must be below
/// `max_fields`, which also bounds how far a single range can expand.
pub fn parse_columns(input: &str, max_fields: usize) -> Result<Vec<usize>> {
    let mut columns = Vec::new();
    for part in input.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        if let Some((a, b)) = part.split_once('-') {
            let from = parse_index(a, max_fields)?;
            let to = parse_index(b, max_fields)?;
            if from <= to {
                columns.extend(from..=to);
            } else {
                columns.extend((to..=from).rev());
            }
        } else {
            columns.push(parse_index(part, max_fields)?);
        }
    }
    if columns.is_empty() {
        return Err(ScanError::config("column list is empty"));
    }
    Ok(columns)
}

fn parse_index(s: &str, max_fields: usize) -> Result<usize> {
    let index = s
        .trim()
        .parse::<usize>()
        .map_err(|_| ScanError::config(format!("invalid column index '{}'", s.trim())))?;
    if index >= max_fields {
        return Err(ScanError::config(format!(
            "column index {} is outside the {} fields a row can hold",
            index, max_fields
        )));
    }
    Ok(index)
}
