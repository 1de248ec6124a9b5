//! S3 / S4 (spec.md §8): MERGE pairs independent producers into one
//! consumer's slots; SPLIT fans one producer's output tuple out to
//! independent consumers, each seeing only its own component.

use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use flowgraph::config::EngineConfig;
use flowgraph::graph::ExecutionGraph;
use flowgraph::method::SinkConfig;
use flowgraph::module::GraphBuilder;
use flowgraph::record::{DataTypeId, RecordBox};

#[derive(Debug, Clone, Copy)]
struct AVal(i32);
#[derive(Debug, Clone, Copy)]
struct BVal(i32);

fn wait_until(deadline: Instant, mut cond: impl FnMut() -> bool) -> bool {
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}

fn outbox_source(
    data_type: &[DataTypeId],
) -> (Box<dyn flowgraph::Callable>, Arc<Mutex<VecDeque<i32>>>) {
    let outbox = Arc::new(Mutex::new(VecDeque::new()));
    let outbox_for_callable = outbox.clone();
    let is_a = data_type[0] == DataTypeId::of::<AVal>();
    let callable: Box<dyn flowgraph::Callable> = Box::new(move |_: &[RecordBox]| {
        let Some(value) = outbox_for_callable.lock().unwrap().pop_front() else {
            return Ok(None);
        };
        if is_a {
            Ok(Some(vec![RecordBox::new(AVal(value))]))
        } else {
            Ok(Some(vec![RecordBox::new(BVal(value))]))
        }
    });
    (callable, outbox)
}

/// Crossed delivery order (A1, A2, B1) must leave C seeing exactly one
/// execution of `(A1, B1)` with `A2` retained for the next `(A2, B2)`.
#[test]
fn merge_pairs_producers_positionally_and_buffers_the_unmatched_side() {
    let mut builder = GraphBuilder::new();
    let module_a = builder.new_module();
    let module_b = builder.new_module();
    let module_c = builder.new_module();

    let (a_callable, a_outbox) = outbox_source(&[DataTypeId::of::<AVal>()]);
    let (b_callable, b_outbox) = outbox_source(&[DataTypeId::of::<BVal>()]);

    builder
        .module(module_a)
        .add_method("emit_a", a_callable, &[DataTypeId::of::<AVal>()], &[], &[])
        .unwrap();
    builder
        .module(module_b)
        .add_method("emit_b", b_callable, &[DataTypeId::of::<BVal>()], &[], &[])
        .unwrap();

    let pairs = Arc::new(Mutex::new(Vec::<(i32, i32)>::new()));
    let pairs_for_c = pairs.clone();
    builder
        .module(module_c)
        .add_method(
            "merge_sink",
            Box::new(move |inputs: &[RecordBox]| {
                let a = inputs[0].downcast_ref::<AVal>().unwrap().0;
                let b = inputs[1].downcast_ref::<BVal>().unwrap().0;
                pairs_for_c.lock().unwrap().push((a, b));
                Ok(None)
            }),
            &[],
            &[DataTypeId::of::<AVal>(), DataTypeId::of::<BVal>()],
            // Slot 0 (A) needs room for two buffered values so a second A
            // arrival does not evict the first before B catches up.
            &[
                SinkConfig {
                    capacity: NonZeroUsize::new(2).unwrap(),
                    sticky: false,
                },
                SinkConfig {
                    capacity: NonZeroUsize::new(1).unwrap(),
                    sticky: false,
                },
            ],
        )
        .unwrap();

    let root = builder.new_module();
    builder
        .module(root)
        .add_modules(&[module_a, module_b, module_c])
        .unwrap();
    builder
        .module(root)
        .create_connection(
            &[DataTypeId::of::<AVal>(), DataTypeId::of::<BVal>()],
            &[module_a, module_b],
            &[module_c],
            false,
        )
        .unwrap();

    let graph = ExecutionGraph::new(builder, EngineConfig::reactive(Duration::from_millis(300))).unwrap();

    std::thread::scope(|scope| {
        scope.spawn(|| graph.execute().unwrap());

        a_outbox.lock().unwrap().push_back(1);
        assert!(wait_until(Instant::now() + Duration::from_secs(1), || {
            a_outbox.lock().unwrap().is_empty()
        }));
        a_outbox.lock().unwrap().push_back(2);
        assert!(wait_until(Instant::now() + Duration::from_secs(1), || {
            a_outbox.lock().unwrap().is_empty()
        }));

        // Both A values are in by now, but C has no B yet: it cannot run.
        std::thread::sleep(Duration::from_millis(150));
        assert!(pairs.lock().unwrap().is_empty(), "merge consumer ran without its B side");

        b_outbox.lock().unwrap().push_back(10);
        assert!(wait_until(Instant::now() + Duration::from_secs(2), || {
            pairs.lock().unwrap().len() >= 1
        }));
        assert_eq!(pairs.lock().unwrap()[0], (1, 10));

        b_outbox.lock().unwrap().push_back(20);
        assert!(wait_until(Instant::now() + Duration::from_secs(2), || {
            pairs.lock().unwrap().len() >= 2
        }));
        assert_eq!(pairs.lock().unwrap()[1], (2, 20));

        graph.request_shutdown();
    });
}

/// A single producer's `(A, B)` output, SPLIT across two consumers, each
/// of which only ever sees its own component.
#[test]
fn split_routes_each_producer_slot_to_its_own_consumer() {
    let gate = Arc::new(Mutex::new(false));
    let gate_for_p = gate.clone();

    let mut builder = GraphBuilder::new();
    let module_p = builder.new_module();
    let module_ca = builder.new_module();
    let module_cb = builder.new_module();

    builder
        .module(module_p)
        .add_method(
            "split_source",
            Box::new(move |_: &[RecordBox]| {
                if *gate_for_p.lock().unwrap() {
                    Ok(Some(vec![RecordBox::new(AVal(7)), RecordBox::new(BVal(9))]))
                } else {
                    Ok(None)
                }
            }),
            &[DataTypeId::of::<AVal>(), DataTypeId::of::<BVal>()],
            &[],
            &[],
        )
        .unwrap();

    let seen_a = Arc::new(Mutex::new(Vec::<i32>::new()));
    let seen_a_for_ca = seen_a.clone();
    builder
        .module(module_ca)
        .add_method(
            "sink_a",
            Box::new(move |inputs: &[RecordBox]| {
                seen_a_for_ca
                    .lock()
                    .unwrap()
                    .push(inputs[0].downcast_ref::<AVal>().unwrap().0);
                Ok(None)
            }),
            &[],
            &[DataTypeId::of::<AVal>()],
            &[],
        )
        .unwrap();

    let seen_b = Arc::new(Mutex::new(Vec::<i32>::new()));
    let seen_b_for_cb = seen_b.clone();
    builder
        .module(module_cb)
        .add_method(
            "sink_b",
            Box::new(move |inputs: &[RecordBox]| {
                seen_b_for_cb
                    .lock()
                    .unwrap()
                    .push(inputs[0].downcast_ref::<BVal>().unwrap().0);
                Ok(None)
            }),
            &[],
            &[DataTypeId::of::<BVal>()],
            &[],
        )
        .unwrap();

    let root = builder.new_module();
    builder
        .module(root)
        .add_modules(&[module_p, module_ca, module_cb])
        .unwrap();
    builder
        .module(root)
        .create_connection(
            &[DataTypeId::of::<AVal>(), DataTypeId::of::<BVal>()],
            &[module_p],
            &[module_ca, module_cb],
            false,
        )
        .unwrap();

    let graph = ExecutionGraph::new(builder, EngineConfig::reactive(Duration::from_millis(300))).unwrap();

    std::thread::scope(|scope| {
        scope.spawn(|| graph.execute().unwrap());
        *gate.lock().unwrap() = true;
        assert!(wait_until(Instant::now() + Duration::from_secs(2), || {
            !seen_a.lock().unwrap().is_empty() && !seen_b.lock().unwrap().is_empty()
        }));
        graph.request_shutdown();
    });

    assert_eq!(seen_a.lock().unwrap()[0], 7);
    assert_eq!(seen_b.lock().unwrap()[0], 9);
}
