use memchr::memchr2_iter;

use crate::error::{Result, ScanError};

// ============================================================================
//  OFFSETS TABLE
// ============================================================================

/// Scratch arena of per-field `[start, end)` offsets into the current chunk.
///
/// Allocated once and overwritten in place for every row. Only indices
/// `[0, field_count)` of the row being handled are valid; anything past
/// that is left over from an earlier row. [`Row`] is the only way handlers
/// see the table, and it enforces that bound.
pub struct OffsetsTable {
    starts: Box<[usize]>,
    ends: Box<[usize]>,
}

impl OffsetsTable {
    pub fn new(max_fields: usize) -> Self {
        Self {
            starts: vec![0; max_fields].into_boxed_slice(),
            ends: vec![0; max_fields].into_boxed_slice(),
        }
    }

    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.starts.len()
    }

    #[inline(always)]
    fn set(&mut self, index: usize, start: usize, end: usize) {
        self.starts[index] = start;
        self.ends[index] = end;
    }
}

// ============================================================================
//  ROW VIEW
// ============================================================================

/// A borrowed view of one recognized row. Nothing is copied.
#[derive(Clone, Copy)]
pub struct Row<'a> {
    table: &'a OffsetsTable,
    field_count: usize,
    chunk: &'a [u8],
}

impl<'a> Row<'a> {
    /// Number of fields in this row (last field index + 1).
    #[inline(always)]
    pub fn field_count(&self) -> usize {
        self.field_count
    }

    /// Byte span of field `index` within the chunk, or `None` past the row's width.
    #[inline(always)]
    pub fn span(&self, index: usize) -> Option<(usize, usize)> {
        if index < self.field_count {
            Some((self.table.starts[index], self.table.ends[index]))
        } else {
            None
        }
    }

    /// Raw bytes of field `index`, separators excluded.
    #[inline(always)]
    pub fn field(&self, index: usize) -> Option<&'a [u8]> {
        self.span(index).map(|(s, e)| &self.chunk[s..e])
    }

    /// The whole row without its record separator.
    pub fn bytes(&self) -> &'a [u8] {
        let start = self.table.starts[0];
        let end = self.table.ends[self.field_count - 1];
        &self.chunk[start..end]
    }
}

// ============================================================================
//  TOKENIZER
// ============================================================================

/// Field tokenizer. Finds separators in a chunk and records offsets,
/// invoking a callback at every row boundary.
pub struct Tokenizer {
    table: OffsetsTable,
    field_sep: u8,
    record_sep: u8,
}

impl Tokenizer {
    pub fn new(max_fields: usize, field_sep: u8, record_sep: u8) -> Self {
        Self {
            table: OffsetsTable::new(max_fields),
            field_sep,
            record_sep,
        }
    }

    /// Scans `chunk`, calling `on_row` once per row, and returns the number
    /// of rows seen.
    ///
    /// The chunk is expected to end on a record separator. When `is_final`
    /// is set, trailing bytes with no separator are treated as one last row;
    /// otherwise they are ignored.
    pub fn scan<F>(&mut self, chunk: &[u8], is_final: bool, mut on_row: F) -> Result<u64>
    where
        F: FnMut(Row<'_>) -> Result<()>,
    {
        let limit = self.table.capacity();
        let mut read_offset = 0;
        let mut field_count = 0;
        let mut rows = 0;

        for i in memchr2_iter(self.field_sep, self.record_sep, chunk) {
            if field_count == limit {
                return Err(ScanError::TooManyFields { limit });
            }
            self.table.set(field_count, read_offset, i);
            read_offset = i + 1;

            if chunk[i] == self.field_sep {
                field_count += 1;
            } else {
                on_row(Row { table: &self.table, field_count: field_count + 1, chunk })?;
                rows += 1;
                field_count = 0;
            }
        }

        if is_final && read_offset < chunk.len() {
            if field_count == limit {
                return Err(ScanError::TooManyFields { limit });
            }
            self.table.set(field_count, read_offset, chunk.len());
            on_row(Row { table: &self.table, field_count: field_count + 1, chunk })?;
            rows += 1;
        }

        Ok(rows)
    }
}

/// Counts the fields of a single record, trailing record separator ignored.
pub fn count_fields(record: &[u8], field_sep: u8, record_sep: u8) -> usize {
    let body = record.strip_suffix(&[record_sep]).unwrap_or(record);
    memchr::memchr_iter(field_sep, body).count() + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows_of(tok: &mut Tokenizer, chunk: &[u8], is_final: bool) -> Vec<Vec<Vec<u8>>> {
        let mut rows = Vec::new();
        tok.scan(chunk, is_final, |row| {
            let fields = (0..row.field_count()).map(|i| row.field(i).unwrap().to_vec()).collect();
            rows.push(fields);
            Ok(())
        })
        .unwrap();
        rows
    }

    #[test]
    fn offsets_are_ordered_and_match_field_text() {
        let chunk = b"A,BB,,DDDD\nx,y\n";
        let mut tok = Tokenizer::new(16, b',', b'\n');
        let mut seen = 0;
        tok.scan(chunk, false, |row| {
            for i in 0..row.field_count().saturating_sub(1) {
                let (s, e) = row.span(i).unwrap();
                let (next_s, _) = row.span(i + 1).unwrap();
                assert!(s <= e);
                assert!(e <= next_s - 1);
            }
            if seen == 0 {
                assert_eq!(row.field_count(), 4);
                assert_eq!(row.field(0).unwrap(), b"A");
                assert_eq!(row.field(1).unwrap(), b"BB");
                assert_eq!(row.field(2).unwrap(), b"");
                assert_eq!(row.field(3).unwrap(), b"DDDD");
                assert_eq!(row.bytes(), b"A,BB,,DDDD");
            } else {
                assert_eq!(row.field_count(), 2);
                assert_eq!(row.field(0).unwrap(), b"x");
                assert_eq!(row.field(1).unwrap(), b"y");
            }
            seen += 1;
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, 2);
    }

    #[test]
    fn next_row_starts_one_past_record_separator() {
        let mut tok = Tokenizer::new(8, b',', b'\n');
        let rows = rows_of(&mut tok, b"a,b\nc,d\ne\n", false);
        assert_eq!(rows, vec![
            vec![b"a".to_vec(), b"b".to_vec()],
            vec![b"c".to_vec(), b"d".to_vec()],
            vec![b"e".to_vec()],
        ]);
    }

    #[test]
    fn stale_offsets_are_not_visible() {
        let mut tok = Tokenizer::new(8, b',', b'\n');
        let mut widths = Vec::new();
        tok.scan(b"1,2,3,4\n5\n", false, |row| {
            widths.push(row.field_count());
            if row.field_count() == 1 {
                assert!(row.field(1).is_none());
                assert!(row.field(3).is_none());
            }
            Ok(())
        })
        .unwrap();
        assert_eq!(widths, vec![4, 1]);
    }

    #[test]
    fn unterminated_tail_only_counts_when_final() {
        let mut tok = Tokenizer::new(8, b',', b'\n');
        assert_eq!(rows_of(&mut tok, b"a,b\nc,d", false).len(), 1);
        let rows = rows_of(&mut tok, b"a,b\nc,d", true);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1], vec![b"c".to_vec(), b"d".to_vec()]);
    }

    #[test]
    fn empty_lines_are_single_empty_field_rows() {
        let mut tok = Tokenizer::new(8, b',', b'\n');
        let rows = rows_of(&mut tok, b"\n\n", true);
        assert_eq!(rows, vec![vec![Vec::new()], vec![Vec::new()]]);
    }

    #[test]
    fn custom_separators() {
        let mut tok = Tokenizer::new(8, b'|', 0);
        let rows = rows_of(&mut tok, b"a|b\0c|d,e\0", true);
        assert_eq!(rows[1], vec![b"c".to_vec(), b"d,e".to_vec()]);
    }

    #[test]
    fn too_many_fields() {
        let mut tok = Tokenizer::new(3, b',', b'\n');
        assert!(tok.scan(b"a,b,c\n", false, |_| Ok(())).is_ok());
        let err = tok.scan(b"a,b,c,d\n", false, |_| Ok(())).unwrap_err();
        assert!(matches!(err, ScanError::TooManyFields { limit: 3 }));
        let err = tok.scan(b"a,b,c,d", true, |_| Ok(())).unwrap_err();
        assert!(matches!(err, ScanError::TooManyFields { limit: 3 }));
    }

    #[test]
    fn callback_errors_stop_the_scan() {
        let mut tok = Tokenizer::new(4, b',', b'\n');
        let mut calls = 0;
        let res = tok.scan(b"a\nb\nc\n", false, |_| {
            calls += 1;
            if calls == 2 { Err(ScanError::config("stop")) } else { Ok(()) }
        });
        assert!(res.is_err());
        assert_eq!(calls, 2);
    }

    #[test]
    fn field_counting() {
        assert_eq!(count_fields(b"h1,h2,h3,h4\n", b',', b'\n'), 4);
        assert_eq!(count_fields(b"h1", b',', b'\n'), 1);
        assert_eq!(count_fields(b"\n", b',', b'\n'), 1);
    }
}
