// Throughput of the sampled value data path.
//
// Encodes and decodes session datagrams for PMU streams of increasing width, with and
// without signatures and redundant ASDUs. A 40 cell, 4 ASDU, SHA-256 signed stream at
// 240 frames per second is the heaviest case we expect to see on one connection.

use chrono::{DateTime, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::time::Duration;

use sv_pmu_core::iec61850_90_5::common::{AngleFormat, ParseOptions, SignatureAlgorithm, StatusFlags};
use sv_pmu_core::iec61850_90_5::config::{ConfigurationCell, ConfigurationFrame, FLOAT_POLAR_FORMAT};
use sv_pmu_core::iec61850_90_5::data_frame::{AsduEncoder, DataFrame};
use sv_pmu_core::iec61850_90_5::header::SessionParameters;
use sv_pmu_core::iec61850_90_5::parser::FrameParser;
use sv_pmu_core::iec61850_90_5::phasors::{DataCell, PhasorFloatPolar, PhasorValue};
use sv_pmu_core::iec61850_90_5::units::{NominalFrequency, PhasorUnits};

const PHASORS_PER_CELL: usize = 6;

fn create_configuration(num_cells: usize) -> ConfigurationFrame {
    let cells = (0..num_cells)
        .map(|i| {
            let phasors = (0..PHASORS_PER_CELL)
                .map(|p| {
                    let units = if p < PHASORS_PER_CELL / 2 {
                        PhasorUnits::voltage()
                    } else {
                        PhasorUnits::current()
                    };
                    (format!("PH{}", p), units)
                })
                .collect();
            ConfigurationCell::new(
                &format!("PMU{}", i),
                i as u16 + 1,
                FLOAT_POLAR_FORMAT,
                phasors,
                vec!["MW".to_string(), "MVAR".to_string()],
                vec!["BRK".to_string()],
                NominalFrequency::Hz60,
            )
        })
        .collect();
    ConfigurationFrame::new(1, DateTime::<Utc>::UNIX_EPOCH, 240, cells)
}

fn create_frame(num_cells: usize, sample: u16) -> DataFrame {
    let cells = (0..num_cells)
        .map(|i| DataCell {
            status: StatusFlags(0),
            phasors: (0..PHASORS_PER_CELL)
                .map(|p| {
                    PhasorValue::FloatPolar(PhasorFloatPolar {
                        magnitude: 1000.0 + i as f32,
                        angle: p as f32 * 0.5,
                    })
                })
                .collect(),
            frequency: 60.0,
            dfdt: 0.01,
            analogs: vec![12.5, -3.25],
            digitals: vec![0x0001],
        })
        .collect();
    let timestamp = DateTime::from_timestamp(1_700_000_000, 0).unwrap_or_default();
    let mut frame = DataFrame::new("1_BenchStation", timestamp, cells);
    frame.sample_count = sample;
    frame
}

fn session(algorithm: SignatureAlgorithm, asdu_count: u8) -> SessionParameters {
    SessionParameters {
        signature_algorithm: algorithm,
        asdu_count,
        ..Default::default()
    }
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("asdu_encode");
    group.measurement_time(Duration::from_secs(10));

    for &num_cells in &[1, 10, 40] {
        let configuration = create_configuration(num_cells);
        let frame = create_frame(num_cells, 0);

        for algorithm in [SignatureAlgorithm::None, SignatureAlgorithm::Sha256] {
            group.throughput(Throughput::Elements(1));
            group.bench_with_input(
                BenchmarkId::new(format!("cells_{}", num_cells), algorithm),
                &algorithm,
                |b, &algorithm| {
                    let mut encoder =
                        AsduEncoder::new(session(algorithm, 4), AngleFormat::Degrees).unwrap();
                    b.iter(|| black_box(encoder.encode(&frame, &configuration).unwrap()));
                },
            );
        }
    }

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("session_decode");
    group.measurement_time(Duration::from_secs(10));

    for &num_cells in &[1, 10, 40] {
        let configuration = create_configuration(num_cells);
        let mut encoder =
            AsduEncoder::new(session(SignatureAlgorithm::Sha256, 4), AngleFormat::Degrees).unwrap();
        let datagram = encoder
            .encode(&create_frame(num_cells, 0), &configuration)
            .unwrap();

        for redundant in [false, true] {
            let options = ParseOptions {
                parse_redundant_asdus: redundant,
                ..Default::default()
            };
            group.throughput(Throughput::Bytes(datagram.len() as u64));
            group.bench_with_input(
                BenchmarkId::new(format!("cells_{}", num_cells), if redundant { "redundant" } else { "newest" }),
                &options,
                |b, options| {
                    let mut parser = FrameParser::new(options.clone());
                    parser.set_configuration(configuration.clone());
                    b.iter(|| black_box(parser.parse(&datagram).unwrap()));
                },
            );
        }
    }

    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
