use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use adaptive_signal_control::flow::FlowAggregator;

/// Fills an aggregator with one full window per lane across a handful of
/// intersections, mimicking a network that has been stepping for a while.
fn generate_filled_aggregator(capacity: usize, lanes_per_intersection: usize) -> FlowAggregator {
    let aggregator = FlowAggregator::new(capacity);
    for intersection in 0..4 {
        for lane in 0..lanes_per_intersection {
            let intersection_id = format!("tl_{}", intersection);
            let lane_id = format!("lane_{}", lane);
            for sample in 0..capacity {
                aggregator.record_sample(&intersection_id, &lane_id, (sample % 5) as f64);
            }
        }
    }
    aggregator
}

fn bench_flow_aggregator(c: &mut Criterion) {
    let capacities = [60, 300, 900];

    let mut group = c.benchmark_group("Flow_Aggregator_Benchmarks");

    for &capacity in capacities.iter() {
        let aggregator = generate_filled_aggregator(capacity, 8);

        // Recording into a full window exercises the eviction path.
        group.bench_with_input(
            BenchmarkId::new("record_sample_full_window", capacity),
            &capacity,
            |b, &_capacity| {
                b.iter(|| {
                    aggregator.record_sample(black_box("tl_0"), black_box("lane_0"), 3.0);
                });
            },
        );

        group.bench_with_input(
            BenchmarkId::new("average_flow", capacity),
            &capacity,
            |b, &_capacity| {
                b.iter(|| {
                    let rate = aggregator.average_flow(black_box("tl_0"), black_box("lane_0"));
                    black_box(rate);
                });
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_flow_aggregator);
criterion_main!(benches);
