use std::io::{self, Write};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use num_format::{Locale, ToFormattedString};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use colscan::config::{parse_size, ScanConfig};
use colscan::handler::{EmitOrder, HandlerSpec, KeyMode, MatchMode};
use colscan::Pipeline;

const HEADER: &[u8] = b"vendor,pickup,dropoff,passengers,distance,rate,store_fwd,total\n";

#[derive(Parser, Debug)]
#[command(name = "run_benchmarks")]
#[command(about = "Throughput suite for the colscan handlers across buffer sizes")]
#[command(version)]
struct Args {
    /// Number of synthetic data rows
    #[arg(long, default_value_t = 1_000_000)]
    rows: usize,

    /// Comma-separated buffer sizes to compare (e.g. 4K,64K,512K)
    #[arg(long, default_value = "4K,64K,512K,4M")]
    buffer_sizes: String,

    /// Seed for the data generator
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

// Struct to store results for final ranking
struct BenchmarkResult {
    name: String,
    buffer_size: usize,
    time: f64,
    crc: u32,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let mut buffer_sizes = Vec::new();
    for part in args.buffer_sizes.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        match parse_size(part) {
            Some(n) if n > 0 => buffer_sizes.push(n),
            _ => {
                eprintln!("[!]  Error: Invalid buffer size: '{}'.", part);
                return ExitCode::FAILURE;
            }
        }
    }
    if buffer_sizes.is_empty() {
        eprintln!("[!]  Error: Buffer size list is empty.");
        return ExitCode::FAILURE;
    }

    print!("\n[*]  Generating {} rows...", args.rows.to_formatted_string(&Locale::en));
    io::stdout().flush().ok();
    let data = generate(args.rows, args.seed);
    println!(" {}", format_bytes(data.len()));

    let suites = [
        HandlerSpec::CountValues { field: 3, key_mode: KeyMode::Bytes, order: EmitOrder::FirstSeen },
        HandlerSpec::CountValues { field: 3, key_mode: KeyMode::Integer, order: EmitOrder::FirstSeen },
        HandlerSpec::CountMatches { field: 6, pattern: b"Y".to_vec(), mode: MatchMode::Prefix },
        HandlerSpec::Reorder { columns: (0..8).rev().collect() },
        HandlerSpec::Reorder { columns: vec![2, 6] },
    ];

    println!("\nBENCHMARK SUITE");
    println!("--------------------------------------------------");
    println!("Rows:               {}", args.rows.to_formatted_string(&Locale::en));
    println!("Input Size:         {}", format_bytes(data.len()));
    println!("Buffer Sizes:       {:?}", buffer_sizes);
    println!("--------------------------------------------------");

    let mut all_consistent = true;

    for spec in &suites {
        println!("\n- HANDLER: {} {:?}", spec.name(), spec);
        let mut results = Vec::new();

        for &buffer_size in &buffer_sizes {
            match run_once(spec, buffer_size, &data) {
                Ok(r) => results.push(r),
                Err(e) => {
                    eprintln!("[!]  {} failed at buffer {}: {}", spec.name(), buffer_size, e);
                    all_consistent = false;
                }
            }
        }

        if results.is_empty() {
            continue;
        }

        let consistent = results.iter().all(|r| r.crc == results[0].crc);
        all_consistent &= consistent;

        results.sort_by(|a, b| a.time.total_cmp(&b.time));
        println!("{}", "-".repeat(70));
        for (i, res) in results.iter().enumerate() {
            let mbps = if res.time > 0.0 { data.len() as f64 / res.time / (1024.0 * 1024.0) } else { 0.0 };
            println!("{}. {:<14} buffer {:>12} : {:>8.3}s | {:>8.1} MiB/s | crc {:08x}",
                i + 1,
                res.name,
                format_bytes(res.buffer_size),
                res.time,
                mbps,
                res.crc
            );
        }
        println!("{}", "-".repeat(70));
        if consistent {
            println!("RESULT: output identical across {} buffer sizes", results.len());
        } else {
            println!("RESULT: OUTPUT MISMATCH between buffer sizes");
        }
    }

    if all_consistent { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}

fn run_once(spec: &HandlerSpec, buffer_size: usize, data: &[u8]) -> colscan::Result<BenchmarkResult> {
    let config = ScanConfig { buffer_size, ..ScanConfig::default() };
    let handler = spec.build(&config)?;
    let pipeline = Pipeline::new(config, handler)?;

    let start = Instant::now();
    let report = pipeline.run(data, io::sink())?;
    let time = start.elapsed().as_secs_f64();

    Ok(BenchmarkResult { name: spec.name().to_string(), buffer_size, time, crc: report.output_crc32 })
}

// --- HELPERS ---

/// Builds a taxi-trip-like CSV with a header and `rows` 8-column records.
fn generate(rows: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut data = Vec::with_capacity(HEADER.len() + rows * 72);
    data.extend_from_slice(HEADER);

    for _ in 0..rows {
        let vendor = rng.gen_range(1..=2);
        let day = rng.gen_range(1..=28);
        let hour = rng.gen_range(0..24);
        let minute = rng.gen_range(0..60);
        let trip = rng.gen_range(1..90);
        let passengers = rng.gen_range(0..=6);
        let distance = rng.gen_range(0.1f64..30.0);
        let rate = rng.gen_range(1..=6);
        let store_fwd = if rng.gen_bool(0.02) { 'Y' } else { 'N' };
        let total = rng.gen_range(3.0f64..150.0);

        let line = format!(
            "{},2020-01-{:02} {:02}:{:02}:00,2020-01-{:02} {:02}:{:02}:00,{},{:.2},{},{},{:.2}\n",
            vendor, day, hour, minute, day, (hour + (minute + trip) / 60) % 24, (minute + trip) % 60,
            passengers, distance, rate, store_fwd, total
        );
        data.extend_from_slice(line.as_bytes());
    }
    data
}

fn format_bytes(n: usize) -> String {
    format!("{} bytes", n.to_formatted_string(&Locale::en))
}
