use std::fs::File;
use std::io::{self, BufReader, Read, Write};

use colscan::codec::InputCodec;
use colscan::config::{MalformedPolicy, ScanConfig};
use colscan::handler::{EmitOrder, HandlerSpec, KeyMode, MatchMode};
use colscan::{Pipeline, ScanError};

/// Source that never returns more than `step` bytes per read.
struct Trickle<'a> {
    data: &'a [u8],
    step: usize,
}

impl Read for Trickle<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.step.min(buf.len()).min(self.data.len());
        buf[..n].copy_from_slice(&self.data[..n]);
        self.data = &self.data[n..];
        Ok(n)
    }
}

fn run_spec<R: Read>(cfg: ScanConfig, spec: &HandlerSpec, input: R) -> colscan::Result<Vec<u8>> {
    let handler = spec.build(&cfg)?;
    let pipeline = Pipeline::new(cfg, handler)?;
    let mut out = Vec::new();
    pipeline.run(input, &mut out)?;
    Ok(out)
}

fn count_values(field: usize) -> HandlerSpec {
    HandlerSpec::CountValues { field, key_mode: KeyMode::Bytes, order: EmitOrder::FirstSeen }
}

fn taxi_sample() -> Vec<u8> {
    let mut data = b"vendor,pickup,dropoff,passengers,distance,rate,store_fwd,total\n".to_vec();
    for i in 0..500u32 {
        let line = format!(
            "{},2020-01-01 00:{:02}:00,2020-01-01 01:{:02}:00,{},{}.{},{},{},{}.50\n",
            i % 2 + 1,
            i % 60,
            (i * 7) % 60,
            i % 7,
            i % 30,
            i % 10,
            i % 5 + 1,
            if i % 13 == 0 { 'Y' } else { 'N' },
            i % 97
        );
        data.extend_from_slice(line.as_bytes());
    }
    // a couple of broken rows
    data.extend_from_slice(b"2,2020-01-01\n\n");
    data
}

#[test]
fn aggregator_scenario() {
    let out = run_spec(
        ScanConfig::default(),
        &count_values(3),
        &b"h1,h2,h3,h4\nA,B,C,1\nA,B,C,1\nD,E,F,2\n"[..],
    )
    .unwrap();
    assert_eq!(String::from_utf8(out).unwrap(), "1,2\n2,1\n");
}

#[test]
fn projector_scenario() {
    let spec = HandlerSpec::Reorder { columns: vec![3, 2, 1, 0] };
    let out = run_spec(ScanConfig::default(), &spec, &b"x,y,z,w\nv0,v1,v2,v3\n"[..]).unwrap();
    assert_eq!(out, b"v3,v2,v1,v0\n");
}

#[test]
fn short_row_is_skipped() {
    let out = run_spec(
        ScanConfig::default(),
        &count_values(3),
        &b"h1,h2,h3,h4\nA,B\nA,B,C,7\n"[..],
    )
    .unwrap();
    assert_eq!(out, b"7,1\n");
}

#[test]
fn output_is_independent_of_chunking() {
    let data = taxi_sample();
    let specs = [
        count_values(3),
        HandlerSpec::CountValues { field: 3, key_mode: KeyMode::Integer, order: EmitOrder::Count },
        HandlerSpec::CountMatches { field: 6, pattern: b"Y".to_vec(), mode: MatchMode::Prefix },
        HandlerSpec::Reorder { columns: (0..8).rev().collect() },
        HandlerSpec::Reorder { columns: vec![2, 6] },
    ];

    for spec in &specs {
        let reference = run_spec(ScanConfig::default(), spec, &data[..]).unwrap();
        assert!(!reference.is_empty());

        for buffer_size in [1, 2, 7, 63, 64, 65, 1000, 4096] {
            for step in [1, 5, 4096] {
                let cfg = ScanConfig { buffer_size, write_buffer_size: 128, ..ScanConfig::default() };
                let out = run_spec(cfg, spec, Trickle { data: &data, step }).unwrap();
                assert_eq!(out, reference, "{:?} buffer {} step {}", spec, buffer_size, step);
            }
        }
    }
}

#[test]
fn reverse_twice_reproduces_input() {
    let data = taxi_sample();
    let body_end = data.len() - b"2,2020-01-01\n\n".len();
    let rows = &data[..body_end];
    let reverse = HandlerSpec::Reorder { columns: (0..8).rev().collect() };
    let cfg = ScanConfig { skip_header: false, buffer_size: 333, write_buffer_size: 100, ..ScanConfig::default() };

    let once = run_spec(cfg.clone(), &reverse, rows).unwrap();
    assert_ne!(once, rows);
    let twice = run_spec(cfg, &reverse, &once[..]).unwrap();
    assert_eq!(twice, rows);
}

#[test]
fn counter_counts_flagged_rows() {
    let data = taxi_sample();
    let spec = HandlerSpec::CountMatches { field: 6, pattern: b"Y".to_vec(), mode: MatchMode::Prefix };
    let out = run_spec(ScanConfig::default(), &spec, &data[..]).unwrap();
    let expected = (0..500u32).filter(|i| i % 13 == 0).count();
    assert_eq!(out, format!("{}\n", expected).into_bytes());
}

#[test]
fn report_policy_counts_bad_lines() {
    let data = taxi_sample();
    let cfg = ScanConfig { strict_width: true, malformed: MalformedPolicy::Report, ..ScanConfig::default() };
    let handler = count_values(3).build(&cfg).unwrap();
    let pipeline = Pipeline::new(cfg, handler).unwrap();
    let report = pipeline.run(&data[..], io::sink()).unwrap();
    assert_eq!(report.header_fields, Some(8));
    assert_eq!(report.rows, 502);
    assert_eq!(report.rows_handled, 500);
    assert_eq!(report.rows_malformed, 2);
}

#[test]
fn fail_policy_stops_at_first_bad_line() {
    let data = taxi_sample();
    let cfg = ScanConfig { malformed: MalformedPolicy::Fail, ..ScanConfig::default() };
    let err = run_spec(cfg, &count_values(3), &data[..]).unwrap_err();
    assert!(matches!(err, ScanError::MalformedRow { line: 502, fields: 2, expected: 4 }));
}

#[test]
fn each_run_starts_from_empty_counts() {
    let spec = count_values(0);
    let cfg = ScanConfig { skip_header: false, ..ScanConfig::default() };

    let first = run_spec(cfg.clone(), &spec, &b"x,1\n"[..]).unwrap();
    let second = run_spec(cfg, &spec, &b"x,2\n"[..]).unwrap();
    assert_eq!(first, b"x,1\n");
    assert_eq!(second, b"x,1\n");
}

#[test]
fn integer_keys_fail_on_unparsable_value() {
    let cfg = ScanConfig { malformed: MalformedPolicy::Fail, ..ScanConfig::default() };
    let spec = HandlerSpec::CountValues { field: 1, key_mode: KeyMode::Integer, order: EmitOrder::FirstSeen };
    let err = run_spec(cfg, &spec, &b"k,v\nx,abc\n"[..]).unwrap_err();
    assert!(matches!(err, ScanError::InvalidValue { line: 2, field: 1 }));
}

#[test]
fn unterminated_last_row_is_counted() {
    let out = run_spec(ScanConfig::default(), &count_values(0), &b"k\na\nb\na"[..]).unwrap();
    assert_eq!(out, b"a,2\nb,1\n");
}

#[test]
fn tab_separated_input() {
    let cfg = ScanConfig { field_sep: b'\t', ..ScanConfig::default() };
    let spec = HandlerSpec::Reorder { columns: vec![1, 0] };
    let out = run_spec(cfg, &spec, &b"a\tb\n1\t2\n3\t4,5\n"[..]).unwrap();
    assert_eq!(out, b"2\t1\n4,5\t3\n");
}

#[test]
fn gzip_file_through_auto_codec() {
    let data = taxi_sample();
    let mut tmp = tempfile::NamedTempFile::new().unwrap();
    {
        let mut enc = flate2::write::GzEncoder::new(tmp.as_file_mut(), flate2::Compression::default());
        enc.write_all(&data).unwrap();
        enc.finish().unwrap();
    }

    let file = File::open(tmp.path()).unwrap();
    let source = InputCodec::Auto.wrap(BufReader::new(file)).unwrap();
    let cfg = ScanConfig { buffer_size: 1000, ..ScanConfig::default() };
    let from_gzip = run_spec(cfg, &count_values(3), source).unwrap();

    let plain = run_spec(ScanConfig::default(), &count_values(3), &data[..]).unwrap();
    assert_eq!(from_gzip, plain);
}

#[test]
fn zstd_stream_matches_plain() {
    let data = taxi_sample();
    let compressed = zstd::encode_all(&data[..], 3).unwrap();
    let source = InputCodec::Zstd.wrap(&compressed[..]).unwrap();
    let spec = HandlerSpec::Reorder { columns: vec![2, 6] };
    let from_zstd = run_spec(ScanConfig::default(), &spec, source).unwrap();
    let plain = run_spec(ScanConfig::default(), &spec, &data[..]).unwrap();
    assert_eq!(from_zstd, plain);
}
