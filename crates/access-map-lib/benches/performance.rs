//! Performance benchmarks for access-map-lib
//!
//! Run with: cargo bench --package access-map-lib

use access_map_lib::{
    AccessibilityField, AccessibilityFilter, AccessibilityReport, BoundingBox, ClusterFeature,
    Config, ReportCollection,
};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};

/// Generate reports scattered over a city-sized area with mixed accessibility data
fn generate_reports(count: usize, base_lat: f64, base_lon: f64) -> Vec<AccessibilityReport> {
    (0..count)
        .map(|i| {
            let t = i as f64 / count as f64;
            // Low-discrepancy spread with some dense pockets
            let lat = base_lat + ((i as f64 * 0.618_033_988_7) % 1.0) * 0.2 + (t * 40.0).sin() * 0.002;
            let lon = base_lon + ((i as f64 * 0.754_877_666_2) % 1.0) * 0.25 + (t * 25.0).cos() * 0.002;

            let mut report = AccessibilityReport::new(format!("report-{i:06}"), lat, lon)
                .with_location_name(format!("Place {i}"));
            for (n, field) in AccessibilityField::ALL.iter().enumerate() {
                let value = match (i + n) % 4 {
                    0 => Some(true),
                    1 => Some(false),
                    _ => None,
                };
                report = report.with_field(*field, value);
            }
            report
        })
        .collect()
}

fn collection_with(count: usize) -> ReportCollection {
    let mut collection = ReportCollection::new(Config::default()).unwrap();
    collection.replace_reports(generate_reports(count, 37.45, 126.85));
    collection
}

// ============================================================================
// Core Benchmarks - Key performance indicators
// ============================================================================

fn bench_cluster_by_zoom(c: &mut Criterion) {
    let mut group = c.benchmark_group("cluster");

    let collection = collection_with(20_000);
    let city = BoundingBox::new(126.85, 37.45, 127.10, 37.65);
    let filter = AccessibilityFilter::default();

    group.throughput(Throughput::Elements(collection.len() as u64));
    for zoom in [10u8, 13, 16, 19] {
        group.bench_with_input(BenchmarkId::new("city_20k", zoom), &zoom, |b, &zoom| {
            b.iter(|| collection.cluster(&city, zoom, &filter));
        });
    }

    // Street-level viewport culls most of the set
    let street = BoundingBox::new(126.97, 37.55, 126.99, 37.56);
    group.bench_function("street_20k_z17", |b| {
        b.iter(|| collection.cluster(&street, 17, &filter));
    });

    group.finish();
}

fn bench_filtered(c: &mut Criterion) {
    let mut group = c.benchmark_group("filtered");

    let collection = collection_with(20_000);
    let city = BoundingBox::new(126.85, 37.45, 127.10, 37.65);
    let filter = AccessibilityFilter::default()
        .with_field(AccessibilityField::Ramp, true)
        .with_field(AccessibilityField::Elevator, true);

    group.bench_function("ramp_and_elevator_z13", |b| {
        b.iter(|| collection.cluster(&city, 13, &filter));
    });

    group.finish();
}

fn bench_expansion(c: &mut Criterion) {
    let mut group = c.benchmark_group("expansion");
    group.sample_size(20);

    let collection = collection_with(5_000);
    let city = BoundingBox::new(126.85, 37.45, 127.10, 37.65);
    let filter = AccessibilityFilter::default();
    let output = collection.cluster(&city, 12, &filter);

    // Largest cluster at zoom 12
    let largest = output
        .features
        .iter()
        .filter_map(|f| match f {
            ClusterFeature::Cluster(c) => Some(c),
            ClusterFeature::Point(_) => None,
        })
        .max_by_key(|c| c.point_count)
        .map(|c| c.cluster_id)
        .unwrap();

    group.bench_function("largest_cluster_5k_z12", |b| {
        b.iter(|| collection.expansion_zoom(&city, 12, &filter, largest));
    });

    group.finish();
}

fn bench_replace(c: &mut Criterion) {
    let mut group = c.benchmark_group("replace");
    group.sample_size(20);

    let reports = generate_reports(20_000, 37.45, 126.85);
    group.throughput(Throughput::Elements(reports.len() as u64));
    group.bench_function("replace_20k", |b| {
        let mut collection = ReportCollection::new(Config::default()).unwrap();
        b.iter(|| collection.replace_reports(reports.clone()));
    });

    group.finish();
}

// ============================================================================
// Criterion Configuration
// ============================================================================

criterion_group!(
    benches,
    bench_cluster_by_zoom,
    bench_filtered,
    bench_expansion,
    bench_replace,
);

criterion_main!(benches);
