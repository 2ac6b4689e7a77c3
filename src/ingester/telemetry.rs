//! Ingester telemetry instruments and recording helpers.

use opentelemetry::global;
use opentelemetry::metrics::{Counter, Histogram};
use opentelemetry::KeyValue;
use std::sync::OnceLock;

struct IngesterInstruments {
    write_requests: Counter<u64>,
    write_rejections: Counter<u64>,
    write_fields: Histogram<u64>,
    flush_duration_seconds: Histogram<f64>,
    flush_samples: Histogram<u64>,
    flush_shards: Counter<u64>,
    hook_outcomes: Counter<u64>,
}

fn instruments() -> &'static IngesterInstruments {
    static INSTRUMENTS: OnceLock<IngesterInstruments> = OnceLock::new();
    INSTRUMENTS.get_or_init(|| {
        let meter = global::meter("lightlog.ingester");
        IngesterInstruments {
            write_requests: meter
                .u64_counter("lightlog.ingester.write.requests")
                .with_description("Samples accepted into the write buffer")
                .init(),
            write_rejections: meter
                .u64_counter("lightlog.ingester.write.rejections")
                .with_description("Writes rejected before reaching the buffer")
                .init(),
            write_fields: meter
                .u64_histogram("lightlog.ingester.write.fields")
                .with_description("Metric fields per accepted sample")
                .init(),
            flush_duration_seconds: meter
                .f64_histogram("lightlog.ingester.flush.duration")
                .with_description("Disk phase of a flush cycle")
                .with_unit("s")
                .init(),
            flush_samples: meter
                .u64_histogram("lightlog.ingester.flush.samples")
                .with_description("Samples drained per flush cycle")
                .init(),
            flush_shards: meter
                .u64_counter("lightlog.ingester.flush.shards")
                .with_description("Shard persist attempts by outcome")
                .init(),
            hook_outcomes: meter
                .u64_counter("lightlog.hook.outcomes")
                .with_description("External hook runs by hook and status")
                .init(),
        }
    })
}

pub fn record_write(fields: u64) {
    let i = instruments();
    i.write_requests.add(1, &[]);
    i.write_fields.record(fields, &[]);
}

pub fn record_write_rejection(reason: &'static str) {
    instruments()
        .write_rejections
        .add(1, &[KeyValue::new("reason", reason)]);
}

pub fn record_flush(duration_seconds: f64, samples: u64, shards_written: u64, shards_failed: u64) {
    let i = instruments();
    i.flush_duration_seconds.record(duration_seconds, &[]);
    i.flush_samples.record(samples, &[]);
    i.flush_shards
        .add(shards_written, &[KeyValue::new("outcome", "written")]);
    if shards_failed > 0 {
        i.flush_shards
            .add(shards_failed, &[KeyValue::new("outcome", "failed")]);
    }
}

pub fn record_hook_outcome(hook: &'static str, status: &'static str) {
    instruments().hook_outcomes.add(
        1,
        &[KeyValue::new("hook", hook), KeyValue::new("status", status)],
    );
}
