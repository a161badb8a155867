//! Benchmarks for state and discovery payload encoding.
//!
//! Runs without an async runtime so only the serialization cost is measured.

use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use dht_mqtt::{AnnouncePolicy, Announcer, Discovery, Reading, StatePayload, TemperatureUnit};
use serde_json::json;
use std::collections::HashMap;

fn reading() -> Reading {
    Reading::from_celsius(21.5, 48.2, TemperatureUnit::Celsius)
}

fn bench_state_payload(c: &mut Criterion) {
    let mut group = c.benchmark_group("state_payload");
    let reading = reading();

    group.throughput(Throughput::Elements(1));

    group.bench_function("combined", |b| {
        b.iter(|| {
            let payload = StatePayload::combined(black_box(&reading)).encode().unwrap();
            black_box(payload)
        })
    });

    // Separate topics encode two documents per reading
    group.bench_function("separate", |b| {
        b.iter(|| {
            let temperature = StatePayload::temperature(black_box(&reading))
                .encode()
                .unwrap();
            let humidity = StatePayload::humidity(black_box(&reading)).encode().unwrap();
            black_box((temperature, humidity))
        })
    });

    group.bench_function("fahrenheit_conversion", |b| {
        b.iter(|| {
            let reading =
                Reading::from_celsius(black_box(21.5), black_box(48.2), TemperatureUnit::Fahrenheit);
            black_box(StatePayload::combined(&reading).encode().unwrap())
        })
    });

    group.finish();
}

fn bench_announcer_setup(c: &mut Criterion) {
    let mut group = c.benchmark_group("announcer_setup");

    let mut metadata = HashMap::new();
    for name in ["temperature", "humidity"] {
        let payload = json!({
            "name": format!("Living room {name}"),
            "device_class": name,
            "state_topic": "home/livingroom/climate",
            "value_template": format!("{{{{ value_json.{name} }}}}"),
        });
        metadata.insert(
            name.to_string(),
            Discovery {
                base_topic: format!("homeassistant/sensor/livingroom_{name}"),
                payload: payload.as_object().unwrap().clone(),
            },
        );
    }

    group.throughput(Throughput::Elements(2));
    group.bench_function("two_topics", |b| {
        b.iter(|| {
            let policy = AnnouncePolicy::every(15, ["temperature", "humidity"]);
            black_box(Announcer::new(policy, black_box(&metadata)).unwrap())
        })
    });

    group.finish();
}

criterion_group!(benches, bench_state_payload, bench_announcer_setup);
criterion_main!(benches);
