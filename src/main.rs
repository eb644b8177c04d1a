use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};
use num_format::{Locale, ToFormattedString};

use colscan::codec::InputCodec;
use colscan::config::{parse_columns, parse_separator, parse_size, MalformedPolicy, ScanConfig};
use colscan::handler::{EmitOrder, HandlerSpec, KeyMode, MatchMode};
use colscan::{Pipeline, RunReport, ScanError};

#[derive(Parser, Debug)]
#[command(name = "colscan")]
#[command(about = "Streaming column scanner: count field values, count matches or reorder columns")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Bytes read per chunk (e.g. 512K, 4MB)
    #[arg(long, global = true, env = "COLSCAN_BUFFER_SIZE", default_value = "512K", value_parser = size_arg)]
    buffer_size: usize,

    /// Capacity of the output write buffer
    #[arg(long, global = true, env = "COLSCAN_WRITE_BUFFER_SIZE", default_value = "512K", value_parser = size_arg)]
    write_buffer_size: usize,

    /// Maximum number of fields in one row
    #[arg(long, global = true, env = "COLSCAN_MAX_FIELDS", default_value_t = colscan::config::DEFAULT_MAX_FIELDS)]
    max_fields: usize,

    /// Field separator: a character, an escape like \t, or 0xNN
    #[arg(long, global = true, default_value = ",", value_parser = separator_arg)]
    field_sep: u8,

    /// Record separator
    #[arg(long, global = true, default_value = "\\n", value_parser = separator_arg)]
    record_sep: u8,

    /// Treat the first record as data instead of a header
    #[arg(long, global = true)]
    no_header: bool,

    /// Rows must have exactly as many fields as the header
    #[arg(long, global = true)]
    strict_width: bool,

    /// What to do with rows that are too narrow: skip, report or fail
    #[arg(long, global = true, default_value = "skip", value_parser = policy_arg)]
    on_malformed: MalformedPolicy,

    /// Input decoding: plain, gzip, zstd, xz, brotli or auto
    #[arg(long, global = true, default_value = "plain", value_parser = codec_arg)]
    codec: InputCodec,

    /// Print a run summary to stderr
    #[arg(long, global = true)]
    stats: bool,

    /// More logging on stderr (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Count occurrences of each value of one field
    CountValues {
        /// Zero-based index of the field to count
        #[arg(long)]
        field: usize,

        /// Compare values as integers so "3" and "03" are the same key
        #[arg(long)]
        integer_keys: bool,

        /// Output order
        #[arg(long, value_enum, default_value_t = OrderArg::FirstSeen)]
        order: OrderArg,

        #[command(flatten)]
        source: Source,
    },
    /// Count rows whose field matches a pattern
    CountMatches {
        /// Bytes to look for
        #[arg(long)]
        pattern: String,

        /// Zero-based index of the field to test
        #[arg(long, default_value_t = 0)]
        field: usize,

        /// Require the whole field to equal the pattern instead of starting with it
        #[arg(long)]
        exact: bool,

        #[command(flatten)]
        source: Source,
    },
    /// Re-emit rows with their fields in a new order
    Reorder {
        /// Output column order, e.g. "7-0" or "2,6"
        #[arg(long)]
        columns: String,

        #[command(flatten)]
        source: Source,
    },
}

#[derive(Args, Debug)]
struct Source {
    /// Input file, "-" for stdin
    #[arg(default_value = "-")]
    input: PathBuf,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum OrderArg {
    FirstSeen,
    Key,
    Count,
}

impl Command {
    fn into_parts(self, max_fields: usize) -> colscan::Result<(HandlerSpec, PathBuf)> {
        let parts = match self {
            Command::CountValues { field, integer_keys, order, source } => {
                let key_mode = if integer_keys { KeyMode::Integer } else { KeyMode::Bytes };
                let order = match order {
                    OrderArg::FirstSeen => EmitOrder::FirstSeen,
                    OrderArg::Key => EmitOrder::Key,
                    OrderArg::Count => EmitOrder::Count,
                };
                (HandlerSpec::CountValues { field, key_mode, order }, source.input)
            }
            Command::CountMatches { pattern, field, exact, source } => {
                let mode = if exact { MatchMode::Exact } else { MatchMode::Prefix };
                (HandlerSpec::CountMatches { field, pattern: pattern.into_bytes(), mode }, source.input)
            }
            Command::Reorder { columns, source } => {
                let columns = parse_columns(&columns, max_fields)?;
                (HandlerSpec::Reorder { columns }, source.input)
            }
        };
        Ok(parts)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("[!]  Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> colscan::Result<()> {
    let config = ScanConfig {
        buffer_size: cli.buffer_size,
        write_buffer_size: cli.write_buffer_size,
        max_fields: cli.max_fields,
        field_sep: cli.field_sep,
        record_sep: cli.record_sep,
        skip_header: !cli.no_header,
        strict_width: cli.strict_width,
        malformed: cli.on_malformed,
    };

    let (spec, input) = cli.command.into_parts(config.max_fields)?;
    let handler = spec.build(&config)?;
    let pipeline = Pipeline::new(config, handler)?;

    log::info!(
        "Running {} (buffer {}, write buffer {}, codec {:?})",
        spec.name(),
        format_bytes(cli.buffer_size as u64),
        format_bytes(cli.write_buffer_size as u64),
        cli.codec
    );

    let stdout = io::stdout();
    let report = if input == Path::new("-") {
        let stdin = io::stdin();
        let source = cli.codec.wrap(stdin.lock())?;
        pipeline.run(source, stdout.lock())?
    } else {
        if !input.exists() {
            return Err(ScanError::Config(format!("input file '{}' not found", input.display())));
        }
        let file = File::open(&input)?;
        let source = cli.codec.wrap(BufReader::new(file))?;
        pipeline.run(source, stdout.lock())?
    };

    if cli.on_malformed == MalformedPolicy::Report {
        eprintln!("bad lines: {}", report.rows_malformed);
    }
    if cli.stats {
        print_stats(spec.name(), &input, &report);
    }
    Ok(())
}

// --- ARGUMENT PARSERS ---

fn size_arg(s: &str) -> Result<usize, String> {
    parse_size(s).ok_or_else(|| format!("invalid size '{}' (expected e.g. 512K, 4MB, 1G)", s))
}

fn separator_arg(s: &str) -> Result<u8, String> {
    parse_separator(s).map_err(|e| e.to_string())
}

fn policy_arg(s: &str) -> Result<MalformedPolicy, String> {
    s.parse().map_err(|e: ScanError| e.to_string())
}

fn codec_arg(s: &str) -> Result<InputCodec, String> {
    s.parse().map_err(|e: ScanError| e.to_string())
}

// --- REPORTING ---

fn format_bytes(n: u64) -> String {
    format!("{} bytes", n.to_formatted_string(&Locale::en))
}

fn print_stats(command: &str, input: &Path, report: &RunReport) {
    let secs = report.elapsed.as_secs_f64();
    let throughput = if secs > 0.0 { report.bytes_read as f64 / secs / (1024.0 * 1024.0) } else { 0.0 };
    let source = if input == Path::new("-") { "<stdin>".to_string() } else { input.display().to_string() };

    eprintln!("\n[+]  {} completed", command);
    eprintln!("       Input:          {}", source);
    eprintln!("       Chunks:         {}", report.chunks.to_formatted_string(&Locale::en));
    eprintln!("       Bytes Read:     {}", format_bytes(report.bytes_read));
    if let Some(fields) = report.header_fields {
        eprintln!("       Header Fields:  {}", fields);
    }
    eprintln!("       Rows:           {}", report.rows.to_formatted_string(&Locale::en));
    eprintln!("       Rows Handled:   {}", report.rows_handled.to_formatted_string(&Locale::en));
    eprintln!("       Rows Malformed: {}", report.rows_malformed.to_formatted_string(&Locale::en));
    eprintln!("       Bytes Written:  {}", format_bytes(report.bytes_written));
    eprintln!("       Flushes:        {}", report.flushes.to_formatted_string(&Locale::en));
    eprintln!("       Output CRC32:   {:08x}", report.output_crc32);
    eprintln!("       Time:           {:.2}s ({:.1} MiB/s)", secs, throughput);
}
