//! End-to-end scenarios across lifecycle, reconciliation and runtime

use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;

use nation_core::{
    AccountId, ContractId, LocalId, NationContent, NationError, NationRecord, TransactionJob, TxHash,
    TxJobStatus, TxJobType,
};
use nation_ledger::LedgerCall;
use nation_runtime::RuntimeConfig;
use nation_state::ReentryPolicy;
use nation_store::{RecordPatch, RecordStore, WriteBatch};

use crate::{ChaosConfig, TestWorld};

const ME: &str = "0xme";

async fn set_job(world: &TestWorld, id: LocalId, status: TxJobStatus) {
    let job = TransactionJob::pending(TxHash::from("0xjob"), TxJobType::Join, AccountId::new(ME));
    world
        .store()
        .atomically(WriteBatch::new().update(id, RecordPatch::new().attach_job(job).job_status(status)))
        .await
        .unwrap();
}

fn only(records: Vec<NationRecord>) -> NationRecord {
    assert_eq!(records.len(), 1, "expected exactly one record");
    records.into_iter().next().unwrap()
}

#[tokio::test]
async fn test_submitted_draft_confirmed_by_reconciliation() {
    let world = TestWorld::new();
    world.publish_many(42);
    let runtime = world.runtime(ME);

    let draft = runtime.controller().create_draft(NationContent::named("Test")).await.unwrap();
    assert_eq!(draft.local_id, LocalId::new(1));
    assert_eq!(draft.id_in_smart_contract, None);

    world.ledger().force_next_hash(TxHash::from("0xabc"));
    let pending = runtime.controller().submit(draft.local_id).await.unwrap();
    let job = pending.tx.unwrap();
    assert_eq!(job.tx_hash, TxHash::from("0xabc"));
    assert_eq!(job.job_type, TxJobType::Create);
    assert_eq!(job.status, TxJobStatus::Pending);

    world.mine();
    runtime.reconcile_now().await.unwrap();

    let record = runtime.controller().nation_by_id(LocalId::new(1)).await.unwrap();
    assert_eq!(record.id_in_smart_contract, Some(ContractId::new(42)));
    assert!(record.created);
}

#[tokio::test]
async fn test_unknown_record_created_once_across_passes() {
    let world = TestWorld::new();
    world.publish_many(8);
    let runtime = world.runtime(ME);

    runtime.reconcile_now().await.unwrap();
    runtime.reconcile_now().await.unwrap();

    let sevens: Vec<_> = world
        .records_of(ME)
        .into_iter()
        .filter(|r| r.id_in_smart_contract == Some(ContractId::new(7)))
        .collect();
    assert_eq!(sevens.len(), 1);
    assert!(sevens[0].created);
    assert!(world.duplicate_contract_ids(ME).is_empty());
}

#[tokio::test]
async fn test_join_while_pending_leaves_store_unchanged() {
    let world = TestWorld::new();
    world.publish("Elsewhere");
    let runtime = world.runtime(ME);
    runtime.reconcile_now().await.unwrap();
    let id = only(world.records_of(ME)).local_id;

    runtime.controller().join(id).await.unwrap();
    let before = world.records();
    let pending_calls = world.ledger().pending_count();

    assert_eq!(runtime.controller().join(id).await.unwrap_err(), NationError::StateLocked(id));
    assert_eq!(world.records(), before);
    assert_eq!(world.ledger().pending_count(), pending_calls);
}

#[derive(Clone, Copy, Debug)]
enum GatedOp {
    Join,
    Leave,
    Submit,
}

/// Run one gated operation against a record whose job has `status`
async fn gated(status: Option<TxJobStatus>, op: GatedOp) -> Result<NationRecord, NationError> {
    let world = TestWorld::new();
    world.publish("x");
    let runtime = world.runtime(ME);
    runtime.reconcile_now().await.unwrap();
    let confirmed = only(world.records_of(ME)).local_id;
    let draft = runtime.controller().create_draft(NationContent::named("d")).await.unwrap().local_id;

    if let Some(status) = status {
        set_job(&world, confirmed, status).await;
        set_job(&world, draft, status).await;
    }

    match op {
        GatedOp::Join => runtime.controller().join(confirmed).await,
        GatedOp::Leave => runtime.controller().leave(confirmed).await,
        GatedOp::Submit => runtime.controller().submit(draft).await,
    }
}

#[tokio::test]
async fn test_mutation_gate_follows_job_status() {
    let statuses = [None, Some(TxJobStatus::Pending), Some(TxJobStatus::Confirmed), Some(TxJobStatus::Failed)];
    for status in statuses {
        let locked = status == Some(TxJobStatus::Pending);
        for op in [GatedOp::Join, GatedOp::Leave, GatedOp::Submit] {
            match gated(status, op).await {
                Err(NationError::StateLocked(_)) => assert!(locked, "{op:?} locked with job {status:?}"),
                Ok(record) => {
                    assert!(!locked, "{op:?} ran with job {status:?}");
                    assert!(record.tx.unwrap().is_pending());
                }
                Err(e) => panic!("{op:?} failed unexpectedly: {e}"),
            }
        }
    }
}

#[tokio::test]
async fn test_failed_commit_leaves_no_partial_batch() {
    let world = TestWorld::new();
    world.publish_many(3);
    let runtime = world.runtime(ME);
    runtime.controller().save_and_submit(NationContent::named("Mine")).await.unwrap();
    world.mine();

    let before = world.records();
    world.store().fail_next_commit();
    let err = runtime.reconcile_now().await.unwrap_err();
    assert!(matches!(err, NationError::WriteFailed(_)));
    assert_eq!(world.records(), before);

    let report = runtime.reconcile_now().await.unwrap();
    assert_eq!(report.confirmed_drafts, 1);
    assert_eq!(report.discovered, 3);
    assert_eq!(runtime.stats().failures, 1);
}

#[tokio::test]
async fn test_failed_ledger_call_attaches_no_job() {
    let world = TestWorld::new();
    let runtime = world.runtime(ME);
    let draft = runtime.controller().create_draft(NationContent::named("x")).await.unwrap();
    world.ledger().fail(LedgerCall::Create);

    assert!(runtime.controller().submit(draft.local_id).await.is_err());
    assert!(only(world.records()).tx.is_none());
}

#[tokio::test]
async fn test_idempotent_under_hostile_delivery() {
    let world = TestWorld::new().with_chaos(ChaosConfig::hostile(9));
    world.publish_many(12);
    let runtime = world.runtime(ME);

    let first = runtime.reconcile_now().await.unwrap();
    assert_eq!(first.discovered, 12);
    let once = world.records();

    let second = runtime.reconcile_now().await.unwrap();
    assert_eq!(second.discovered, 0);
    assert_eq!(world.records(), once);
    assert!(world.duplicate_contract_ids(ME).is_empty());
}

#[tokio::test]
async fn test_overlapping_passes_are_serialized() {
    let world = TestWorld::new().with_chaos(ChaosConfig::with_seed(3));
    world.publish_many(6);
    let a = world.runtime(ME);
    let b = world.runtime(ME);

    let (ra, rb) = tokio::join!(a.reconcile_now(), b.reconcile_now());
    let discovered = ra.unwrap().discovered + rb.unwrap().discovered;

    assert_eq!(discovered, 6);
    assert_eq!(world.records_of(ME).len(), 6);
    assert!(world.duplicate_contract_ids(ME).is_empty());
}

#[tokio::test]
async fn test_rejected_reentry_across_runtimes() {
    let world = TestWorld::new();
    world.publish("x");
    let silent = RuntimeConfig {
        start_block: Some(u64::MAX),
        collect_timeout_ms: 30_000,
        reentry: ReentryPolicy::Reject,
        ..Default::default()
    };
    let running = Arc::new(world.runtime_with(ME, silent.clone()));
    let second = world.runtime_with(ME, silent);

    let task = {
        let running = Arc::clone(&running);
        tokio::spawn(async move { running.reconcile_now().await })
    };
    while !running.engine().is_running() {
        tokio::task::yield_now().await;
    }

    assert_eq!(
        second.reconcile_now().await.unwrap_err(),
        NationError::ReconcileInProgress(AccountId::new(ME))
    );

    running.shutdown().await;
    assert_eq!(task.await.unwrap().unwrap_err(), NationError::Cancelled);
    while world.ledger().subscriber_count() > 0 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn test_parallel_accounts_get_distinct_ids() {
    let world = TestWorld::new();
    world.publish_many(5);
    let alice = world.runtime("0xalice");
    let bob = world.runtime("0xbob");

    let (ra, rb) = tokio::join!(alice.reconcile_now(), bob.reconcile_now());
    ra.unwrap();
    rb.unwrap();

    assert_eq!(world.records_of("0xalice").len(), 5);
    assert_eq!(world.records_of("0xbob").len(), 5);
    let ids: Vec<u64> = world.records().iter().map(|r| r.local_id.get()).collect();
    assert_eq!(ids, (1..=10).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_background_loop_picks_up_new_nations() {
    let world = TestWorld::new().with_config(RuntimeConfig {
        reconcile_interval_ms: 10,
        collect_timeout_ms: 2_000,
        ..Default::default()
    });
    let runtime = world.runtime(ME);
    assert!(runtime.spawn_reconcile_loop());

    world.publish_many(3);
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while world.records_of(ME).len() < 3 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    runtime.shutdown().await;

    assert_eq!(world.records_of(ME).len(), 3);
    assert!(runtime.stats().passes >= 1);
}

#[tokio::test]
async fn test_drafts_after_many_passes_continue_from_max() {
    let world = TestWorld::new().with_chaos(ChaosConfig::with_seed(11));
    world.publish_many(5);
    let alice = world.runtime("0xalice");
    let bob = world.runtime("0xbob");

    for _ in 0..3 {
        alice.reconcile_now().await.unwrap();
        bob.reconcile_now().await.unwrap();
    }
    let top = world.records().iter().map(|r| r.local_id.get()).max().unwrap();
    assert_eq!(top, 10);

    let draft = alice.controller().create_draft(NationContent::named("late")).await.unwrap();
    assert_eq!(draft.local_id, LocalId::new(11));

    // A failed pass gives its reservation back too
    world.publish("one more");
    world.store().fail_next_commit();
    assert!(bob.reconcile_now().await.is_err());
    let next = bob.controller().create_draft(NationContent::named("later")).await.unwrap();
    assert_eq!(next.local_id, LocalId::new(12));
}

#[tokio::test]
async fn test_pending_submissions_stay_with_their_account() {
    let world = TestWorld::new();
    world.publish("Shared");
    let alice = world.runtime("0xalice");
    let bob = world.runtime("0xbob");

    let mine = alice.controller().save_and_submit(NationContent::named("Alice's")).await.unwrap();
    let theirs = bob.controller().save_and_submit(NationContent::named("Bob's")).await.unwrap();
    world.mine();

    for _ in 0..2 {
        alice.reconcile_now().await.unwrap();
        bob.reconcile_now().await.unwrap();
    }

    let mine = alice.controller().nation_by_id(mine.local_id).await.unwrap();
    let theirs = bob.controller().nation_by_id(theirs.local_id).await.unwrap();
    assert_eq!(mine.account_id, AccountId::new("0xalice"));
    assert!(mine.joined && mine.created);
    assert!(theirs.joined && theirs.created);
    assert_ne!(mine.id_in_smart_contract, theirs.id_in_smart_contract);

    // Each account holds every ledger nation exactly once
    for account in ["0xalice", "0xbob"] {
        assert_eq!(world.records_of(account).len(), 3);
        assert!(world.duplicate_contract_ids(account).is_empty());
    }

    // Bob's view of Alice's nation is his own record, not hers
    let bobs_copy = world
        .records_of("0xbob")
        .into_iter()
        .find(|r| r.id_in_smart_contract == mine.id_in_smart_contract)
        .unwrap();
    assert_ne!(bobs_copy.local_id, mine.local_id);
    assert!(!bobs_copy.joined);
    assert_eq!(bobs_copy.citizens, 1);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_second_pass_changes_nothing(nations in 0usize..10, drafts in 0usize..4, seed in any::<u64>()) {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        let (once, twice, duplicates) = rt.block_on(async {
            let world = TestWorld::new().with_chaos(ChaosConfig::with_seed(seed));
            world.publish_many(nations);
            let runtime = world.runtime(ME);
            for i in 0..drafts {
                runtime
                    .controller()
                    .save_and_submit(NationContent::named(format!("draft-{i}")))
                    .await
                    .unwrap();
            }
            world.mine();

            runtime.reconcile_now().await.unwrap();
            let once = world.records();
            runtime.reconcile_now().await.unwrap();
            (once, world.records(), world.duplicate_contract_ids(ME))
        });

        prop_assert_eq!(once.len(), nations + drafts);
        prop_assert!(once.iter().all(|r| r.created));
        prop_assert_eq!(once, twice);
        prop_assert!(duplicates.is_empty());
    }
}
