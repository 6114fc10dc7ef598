mod support;

use std::collections::HashMap;

use loader::{Priority, Stage};
use proptest::prelude::*;

use support::{MockFetcher, req, scheduler};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .expect("runtime")
}

fn request_specs() -> impl Strategy<Value = Vec<(usize, usize, u64)>> {
    prop::collection::vec((0usize..5, 0usize..4, 1u64..200), 1..16)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Without dependencies every request is dispatched once, and dispatch
    /// order never goes back to an earlier stage or, within a stage, to a
    /// higher priority.
    #[test]
    fn dispatch_follows_stage_then_priority_order(specs in request_specs()) {
        let mock = MockFetcher::new();
        let mut placement = HashMap::new();

        runtime().block_on(async {
            let sched = scheduler(&mock);
            for (i, (p, s, delay)) in specs.iter().enumerate() {
                let id = format!("r{i}");
                let (priority, stage) = (Priority::ALL[*p], Stage::ALL[*s]);
                placement.insert(id.clone(), (stage, priority));
                mock.delay(&id, *delay);
                sched.add_request(req(&id, priority, stage));
            }
            sched.process_queue().await.expect("run");
        });

        let order: Vec<(Stage, Priority)> = mock
            .dispatched()
            .iter()
            .map(|id| placement[id])
            .collect();

        prop_assert_eq!(order.len(), specs.len());
        prop_assert!(order.windows(2).all(|w| w[0] <= w[1]), "{:?}", order);
    }

    /// Every dependent is dispatched only after its dependency completed.
    #[test]
    fn dependents_wait_for_completion(chain_len in 2usize..6, stage_idx in 0usize..4) {
        let mock = MockFetcher::new();
        let stage = Stage::ALL[stage_idx];

        runtime().block_on(async {
            let sched = scheduler(&mock);
            // reverse registration so FIFO order alone would be wrong
            for i in (0..chain_len).rev() {
                let mut r = req(&format!("n{i}"), Priority::High, stage);
                if i > 0 {
                    r = r.depends_on(format!("n{}", i - 1));
                }
                sched.add_request(r);
            }
            sched.process_queue().await.expect("run");
        });

        let expected: Vec<String> = (0..chain_len).map(|i| format!("n{i}")).collect();
        prop_assert_eq!(mock.dispatched(), expected.clone());
        prop_assert_eq!(mock.completed(), expected);
    }
}
