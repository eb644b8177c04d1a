use std::io::{Read, Write};
use std::time::{Duration, Instant};

use crate::config::{MalformedPolicy, ScanConfig};
use crate::error::{Result, ScanError};
use crate::handler::{RowHandler, RowOutcome};
use crate::reader::ChunkReader;
use crate::tokenizer::{count_fields, Tokenizer};
use crate::writer::OutputWriter;

/// Counters gathered over one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub chunks: u64,
    pub bytes_read: u64,
    /// Field count of the skipped header, if one was read.
    pub header_fields: Option<usize>,
    /// Data rows seen by the tokenizer.
    pub rows: u64,
    pub rows_handled: u64,
    /// Rows dropped for being too narrow (or off-width under `strict_width`).
    pub rows_malformed: u64,
    pub bytes_written: u64,
    pub flushes: u64,
    pub output_crc32: u32,
    pub elapsed: Duration,
}

/// Single-pass driver: header skip, chunk loop, row dispatch, finalization.
pub struct Pipeline<H: RowHandler> {
    config: ScanConfig,
    handler: H,
}

impl<H: RowHandler> Pipeline<H> {
    /// Validates `config` up front so no stream is touched with a bad setup.
    pub fn new(config: ScanConfig, handler: H) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, handler })
    }

    /// Processes `input` to completion, writing all output to `output`.
    ///
    /// A pipeline runs once: the handler's accumulated state belongs to this
    /// stream only. Any error abandons the run; output already flushed
    /// downstream stays there, accumulated aggregates are lost.
    pub fn run<R: Read, W: Write>(self, input: R, output: W) -> Result<RunReport> {
        let start = Instant::now();
        let Pipeline { config, mut handler } = self;
        let cfg = &config;

        let mut reader = ChunkReader::new(input, cfg.buffer_size, cfg.record_sep);
        let mut writer = OutputWriter::with_capacity(output, cfg.write_buffer_size);
        let mut tokenizer = Tokenizer::new(cfg.max_fields, cfg.field_sep, cfg.record_sep);
        let mut report = RunReport::default();

        let mut header_lines = 0u64;
        if cfg.skip_header {
            let mut header = Vec::new();
            if reader.read_record(&mut header)? > 0 {
                header_lines = 1;
                let fields = count_fields(&header, cfg.field_sep, cfg.record_sep);
                if fields > cfg.max_fields {
                    return Err(ScanError::TooManyFields { limit: cfg.max_fields });
                }
                report.header_fields = Some(fields);
                log::debug!("Header skipped ({} fields)", fields);
            }
        }
        let expected_width = if cfg.strict_width { report.header_fields } else { None };
        let policy = cfg.malformed;

        loop {
            let chunk = reader.next_chunk()?;
            let is_final = chunk.is_final;
            let len = chunk.bytes.len();

            let rows = tokenizer.scan(chunk.bytes, is_final, |row| {
                report.rows += 1;

                let outcome = match expected_width {
                    Some(width) if row.field_count() != width => RowOutcome::Skipped { required: width },
                    _ => handler.on_row(&row, &mut writer)?,
                };

                let line = report.rows + header_lines;
                match outcome {
                    RowOutcome::Handled => report.rows_handled += 1,
                    RowOutcome::Skipped { required } => {
                        report.rows_malformed += 1;
                        if policy == MalformedPolicy::Fail {
                            return Err(ScanError::MalformedRow {
                                line,
                                fields: row.field_count(),
                                expected: required,
                            });
                        }
                    }
                    RowOutcome::Invalid { field } => {
                        report.rows_malformed += 1;
                        if policy == MalformedPolicy::Fail {
                            return Err(ScanError::InvalidValue { line, field });
                        }
                    }
                }
                Ok(())
            })?;

            if len > 0 {
                log::debug!("Chunk of {} bytes: {} rows (final: {})", len, rows, is_final);
            }
            if is_final {
                break;
            }
        }

        handler.finish(&mut writer)?;
        writer.flush()?;

        report.chunks = reader.chunks();
        report.bytes_read = reader.bytes_read();
        report.bytes_written = writer.bytes_written();
        report.flushes = writer.flushes();
        report.output_crc32 = writer.checksum();
        report.elapsed = start.elapsed();

        log::info!(
            "Scanned {} rows in {} chunks ({} handled, {} malformed)",
            report.rows, report.chunks, report.rows_handled, report.rows_malformed
        );
        Ok(report)
    }
}
