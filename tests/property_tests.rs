//! Property-based tests for result line parsing and batch ordering.

mod common;

use std::sync::Arc;

use proptest::prelude::*;
use tae::infrastructure::process::parse_result_line;
use tae::services::decorators::BoundedEvaluator;
use tae::{ConstantEvaluator, Evaluator, RunOutcome, RunResult};

fn wrapper_kind() -> impl Strategy<Value = RunResult> {
    prop_oneof![
        Just(RunResult::Sat),
        Just(RunResult::Unsat),
        Just(RunResult::Timeout),
        Just(RunResult::Crashed),
    ]
}

fn run_length() -> impl Strategy<Value = f64> {
    prop_oneof![Just(-1.0), 0.0..1e9f64]
}

proptest! {
    /// A printed result line parses back into the values it was built from
    #[test]
    fn proptest_result_line_reparses(
        kind in wrapper_kind(),
        runtime in 0.0..1e6f64,
        run_length in run_length(),
        quality in -1e6..1e6f64,
        seed in any::<i64>(),
        extra in prop::string::string_regex("[a-zA-Z0-9 _=.-]{0,40}").expect("Valid regex"),
    ) {
        let request = common::request("inst", 1, 10.0);
        let outcome = RunOutcome::new(request, kind, runtime, run_length, quality, seed)
            .unwrap()
            .with_additional_data(extra.clone());

        let line = format!("Result for SMAC: {}", outcome.result_line());
        let parsed = parse_result_line(&line).expect("line matches").expect("line parses");

        prop_assert_eq!(parsed.kind, kind);
        prop_assert_eq!(parsed.runtime.to_bits(), runtime.to_bits());
        prop_assert_eq!(parsed.run_length.to_bits(), run_length.to_bits());
        prop_assert_eq!(parsed.quality.to_bits(), quality.to_bits());
        prop_assert_eq!(parsed.seed, seed);
        prop_assert_eq!(parsed.additional_data, extra.trim());
    }

    /// Bounded execution returns outcomes aligned with the requests
    #[test]
    fn proptest_bounded_preserves_order(
        seeds in prop::collection::hash_set(any::<i64>(), 0..24),
        limit in 1usize..5,
    ) {
        let requests: Vec<_> = seeds.into_iter().map(|seed| common::request("inst", seed, 5.0)).collect();
        let bounded = BoundedEvaluator::new(Arc::new(ConstantEvaluator::default()), limit).unwrap();

        let outcomes = tokio_test::block_on(bounded.evaluate(requests.clone(), None)).unwrap();

        prop_assert_eq!(outcomes.len(), requests.len());
        for (request, outcome) in requests.iter().zip(&outcomes) {
            prop_assert_eq!(outcome.request(), request);
        }
    }
}
