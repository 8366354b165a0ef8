//! Tests for `StepExecutor` against the in-memory backend.
//!
//! These tests validate that:
//! - A satisfied probe never produces a write
//! - Writes the account may not send are always queued, never submitted
//! - Queuing the same action twice keeps one ledger entry
//! - Dry runs never reach the backend and number their ids from 1
//! - Client-side nonces are strictly increasing

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::Arc;

use ledgerline_executor::{
    Address, ExecutorConfig, InMemoryBackend, PendingActionLedger, QueueForLater, ReadProbe,
    StepExecutor, StepOutcome, StepRequest, StepTarget, SubmissionKind, TxId, WriteCall,
};
use serde_json::json;

const ME: &str = "0x00000000000000000000000000000000000000aa";
const SOMEONE_ELSE: &str = "0x00000000000000000000000000000000000000bb";
const RATES: &str = "0x0000000000000000000000000000000000000001";

struct Harness {
    backend: InMemoryBackend,
    ledger: Arc<PendingActionLedger>,
    executor: StepExecutor,
}

fn harness(config: ExecutorConfig) -> Harness {
    let backend = InMemoryBackend::new();
    let ledger = Arc::new(PendingActionLedger::in_memory());
    let executor = StepExecutor::new(
        Arc::new(backend.clone()),
        config,
        Arc::new(QueueForLater::new(Arc::clone(&ledger))),
    );
    Harness {
        backend,
        ledger,
        executor,
    }
}

fn config() -> ExecutorConfig {
    ExecutorConfig::new(Address::new(ME))
}

fn rates() -> StepTarget {
    StepTarget::new("Rates", Address::new(RATES))
}

fn set_rate(value: u64) -> StepRequest {
    StepRequest::new(rates(), WriteCall::new("setRate", vec![json!(value)]))
        .with_probe(ReadProbe::equals("rate", Vec::new(), json!(value)))
}

async fn seed_rates(backend: &InMemoryBackend, owner: &str, rate: u64) {
    let target = Address::new(RATES);
    backend.set(&target, "owner", Vec::new(), json!(owner)).await;
    backend.set(&target, "rate", Vec::new(), json!(rate)).await;
    backend
        .on_submit("setRate", move |submission, state| {
            if let SubmissionKind::Invoke { call, .. } = &submission.kind {
                state.set(&target, "rate", &[], call.args[0].clone());
            }
        })
        .await;
}

#[tokio::test]
async fn satisfied_probe_is_noop_without_writes() {
    let h = harness(config());
    seed_rates(&h.backend, ME, 5).await;

    let outcome = h.executor.ensure(set_rate(5)).await.unwrap();

    assert_eq!(outcome, StepOutcome::NoOp);
    assert_eq!(h.backend.submission_count().await, 0);
}

#[tokio::test]
async fn second_ensure_after_submit_is_noop() {
    let h = harness(config());
    seed_rates(&h.backend, ME, 1).await;

    assert!(h.executor.ensure(set_rate(5)).await.unwrap().is_submitted());
    assert!(h.executor.ensure(set_rate(5)).await.unwrap().is_noop());
    assert_eq!(h.backend.submission_count().await, 1);
}

#[tokio::test]
async fn non_owner_private_write_is_always_queued() {
    let h = harness(config());
    seed_rates(&h.backend, SOMEONE_ELSE, 1).await;

    for value in [2, 3, 4] {
        let outcome = h.executor.ensure(set_rate(value)).await.unwrap();
        assert!(outcome.is_queued(), "expected queued, got {outcome:?}");
    }

    assert_eq!(h.backend.submission_count().await, 0);
    assert_eq!(h.ledger.len().await, 3);
}

#[tokio::test]
async fn public_write_skips_ownership() {
    let h = harness(config());
    seed_rates(&h.backend, SOMEONE_ELSE, 1).await;

    let outcome = h.executor.ensure(set_rate(5).public()).await.unwrap();

    assert!(outcome.is_submitted());
    assert_eq!(h.backend.invoked_functions().await, vec!["setRate"]);
}

#[tokio::test]
async fn queuing_same_action_twice_keeps_one_entry() {
    let h = harness(ExecutorConfig {
        explorer_url: Some("https://explorer.test".to_string()),
        ..config()
    });
    seed_rates(&h.backend, SOMEONE_ELSE, 1).await;

    let first = h.executor.ensure(set_rate(5)).await.unwrap();
    let second = h.executor.ensure(set_rate(5)).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(h.ledger.len().await, 1);

    let (_, action) = h.ledger.entries().await.into_iter().next().unwrap();
    assert_eq!(action.target, "Rates");
    assert_eq!(action.action, "setRate(5)");
    assert!(!action.complete);
    assert!(action.data.starts_with("0x"));
    assert_eq!(
        action.link.as_deref(),
        Some("https://explorer.test/address/0x0000000000000000000000000000000000000001#writecontract")
    );
}

#[tokio::test]
async fn requeued_action_marked_complete_is_reopened() {
    let h = harness(config());
    seed_rates(&h.backend, SOMEONE_ELSE, 1).await;

    let StepOutcome::Queued { key } = h.executor.ensure(set_rate(5)).await.unwrap() else {
        panic!("expected the write to be queued");
    };
    let mut done = h.ledger.get(&key).await.unwrap();
    done.complete = true;
    h.ledger.upsert(key.clone(), done).await.unwrap();
    assert!(h.ledger.incomplete().await.is_empty());

    // The owner never sent it: the rate is still 1.
    let second = h.executor.ensure(set_rate(5)).await.unwrap();

    assert!(second.is_queued());
    assert!(!h.ledger.get(&key).await.unwrap().complete);
    assert_eq!(h.ledger.incomplete().await.len(), 1);
    assert_eq!(h.ledger.len().await, 1);
}

#[tokio::test]
async fn dry_run_never_submits_and_numbers_from_one() {
    let h = harness(ExecutorConfig {
        dry_run: true,
        ..config()
    });
    seed_rates(&h.backend, ME, 1).await;

    let first = h.executor.ensure(set_rate(5)).await.unwrap();
    let deploy = h.executor.deploy("Rates", "0x6000", Vec::new()).await.unwrap();
    let third = h.executor.ensure(set_rate(6)).await.unwrap();

    assert_eq!(first, StepOutcome::Submitted { id: TxId::DryRun(1) });
    assert_eq!(deploy.id, TxId::DryRun(2));
    assert!(deploy.contract_address.is_none());
    assert_eq!(third, StepOutcome::Submitted { id: TxId::DryRun(3) });
    assert_eq!(h.backend.submission_count().await, 0);
}

#[tokio::test]
async fn ensure_all_keeps_request_order() {
    let h = harness(ExecutorConfig {
        concurrency: 2,
        ..config()
    });
    let target = Address::new(RATES);
    h.backend.set(&target, "owner", Vec::new(), json!(ME)).await;
    for (slot, value) in [("a", 1), ("b", 2), ("c", 3), ("d", 4)] {
        h.backend
            .set(&target, "slot", vec![json!(slot)], json!(value))
            .await;
    }

    let requests: Vec<StepRequest> = [("a", 1), ("b", 9), ("c", 3), ("d", 8)]
        .into_iter()
        .map(|(slot, value)| {
            StepRequest::new(rates(), WriteCall::new("setSlot", vec![json!(slot), json!(value)]))
                .with_probe(ReadProbe::equals("slot", vec![json!(slot)], json!(value)))
        })
        .collect();

    let outcomes = h.executor.ensure_all(requests).await.unwrap();

    let shape: Vec<bool> = outcomes.iter().map(StepOutcome::is_noop).collect();
    assert_eq!(shape, vec![true, false, true, false]);

    let written: Vec<serde_json::Value> = h
        .backend
        .submissions()
        .await
        .into_iter()
        .filter_map(|s| match s.kind {
            SubmissionKind::Invoke { call, .. } => Some(call.args[0].clone()),
            SubmissionKind::Deploy { .. } => None,
        })
        .collect();
    assert_eq!(written, vec![json!("b"), json!("d")]);
}

#[tokio::test]
async fn nonce_sequencer_assigns_increasing_nonces() {
    let h = harness(config());
    let executor = h.executor.with_nonce_sequencer();
    seed_rates(&h.backend, ME, 0).await;

    for value in 1..=4 {
        executor.ensure(set_rate(value)).await.unwrap();
    }

    let nonces: Vec<u64> = h
        .backend
        .submissions()
        .await
        .iter()
        .map(|s| s.nonce.expect("sequenced submissions carry a nonce"))
        .collect();
    assert_eq!(nonces, vec![0, 1, 2, 3]);
}

#[tokio::test]
async fn backend_failure_is_fatal() {
    let h = harness(config());
    seed_rates(&h.backend, ME, 1).await;
    h.backend.fail_submissions("insufficient funds").await;

    let result = h.executor.ensure(set_rate(5)).await;

    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("insufficient funds"));
}
