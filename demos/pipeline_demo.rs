// Unless explicitly stated otherwise all files in this repository are licensed
// under the MIT/Apache-2.0 License, at your convenience
//
//! A runnable illustration of the public API: a three-module tree wired
//! with one sync connection and one async connection, executed for a
//! couple of seconds and then shut down gracefully.
//!
//! Run with: `cargo run --example pipeline_demo`

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use flowgraph::config::EngineConfig;
use flowgraph::graph::ExecutionGraph;
use flowgraph::method::SinkConfig;
use flowgraph::module::GraphBuilder;
use flowgraph::record::{DataTypeId, RecordBox};

#[derive(Debug, Clone, Copy)]
struct Reading(f64);

#[derive(Debug, Clone, Copy)]
struct Alarm(f64);

fn main() {
    tracing_subscriber::fmt::init();

    let mut builder = GraphBuilder::new();
    let sensor_module = builder.new_module();
    let filter_module = builder.new_module();
    let alarm_module = builder.new_module();

    // A source: no consumers, always ready, fires every outer sweep of
    // its process. Produces a noisy "sensor reading" every tick.
    builder
        .module(sensor_module)
        .add_method(
            "sensor",
            Box::new(|_: &[RecordBox]| Ok(Some(vec![RecordBox::new(Reading(fastrand::f64() * 100.0))]))),
            &[DataTypeId::of::<Reading>()],
            &[],
            &[],
        )
        .unwrap();

    // A sync consumer: same process as the sensor, so the handoff is a
    // plain function call, not a queued cross-thread delivery.
    builder
        .module(filter_module)
        .add_method(
            "threshold_filter",
            Box::new(|inputs: &[RecordBox]| {
                let Reading(value) = *inputs[0].downcast_ref::<Reading>().unwrap();
                if value > 90.0 {
                    Ok(Some(vec![RecordBox::new(Alarm(value))]))
                } else {
                    Ok(None)
                }
            }),
            &[DataTypeId::of::<Alarm>()],
            &[DataTypeId::of::<Reading>()],
            &[],
        )
        .unwrap();

    // An async sink on its own process: a sticky slot of capacity 1, so
    // a slow consumer always re-reads the most recent alarm rather than
    // blocking the producer.
    let alarm_count = Arc::new(AtomicU64::new(0));
    let alarm_count_for_sink = alarm_count.clone();
    builder
        .module(alarm_module)
        .add_method(
            "alarm_log",
            Box::new(move |inputs: &[RecordBox]| {
                let Alarm(value) = *inputs[0].downcast_ref::<Alarm>().unwrap();
                alarm_count_for_sink.fetch_add(1, Ordering::Relaxed);
                tracing::info!(value, "alarm threshold exceeded");
                Ok(None)
            }),
            &[],
            &[DataTypeId::of::<Alarm>()],
            &[SinkConfig {
                capacity: std::num::NonZeroUsize::new(1).unwrap(),
                sticky: true,
            }],
        )
        .unwrap();

    let root = builder.new_module();
    builder
        .module(root)
        .add_modules(&[sensor_module, filter_module, alarm_module])
        .unwrap();
    builder
        .module(root)
        .create_connection(
            &[DataTypeId::of::<Reading>()],
            &[sensor_module],
            &[filter_module],
            true,
        )
        .unwrap();
    builder
        .module(root)
        .create_connection(
            &[DataTypeId::of::<Alarm>()],
            &[filter_module],
            &[alarm_module],
            false,
        )
        .unwrap();

    let graph = ExecutionGraph::new(builder, EngineConfig::continuous(Duration::from_secs(1))).unwrap();

    std::thread::scope(|scope| {
        scope.spawn(|| {
            if let Err(err) = graph.execute() {
                eprintln!("pipeline failed: {err}");
            }
        });
        std::thread::sleep(Duration::from_secs(2));
        graph.request_shutdown();
    });

    println!(
        "alarms logged: {}",
        alarm_count.load(Ordering::Relaxed)
    );
}
