mod common;

use std::sync::Arc;

use chrono::Duration;
use common::{at, kinds, t, Harness};
use shiftwatch_core::{
    BlockCause, BreakChange, BreakPlan, BreakPlanStatus, BreakState, BreakType, ClockOutReason,
    CoreError, Event, MemoryRepository, PlannedBreak, Repository, ShiftError, StartBreak,
};

async fn clocked_in_with_lunch(h: &mut Harness) -> String {
    h.clock.set(at(9, 0, 0));
    let entry = h.engine.clock_in("alice").await.unwrap();
    let plan = BreakPlan {
        time_entry_id: entry.id.clone(),
        date: at(9, 0, 0).date_naive(),
        breaks: vec![PlannedBreak::new(BreakType::Lunch, t(12, 0), t(13, 0))],
    };
    h.engine.schedule_breaks("alice", plan).await.unwrap();
    h.drain();
    entry.id
}

#[tokio::test]
async fn late_clock_in_records_minutes() {
    let h = Harness::new();
    h.clock.set(at(9, 5, 0));
    let entry = h.engine.clock_in("alice").await.unwrap();
    assert!(entry.was_late);
    assert_eq!(entry.late_by, Some(5));

    let updated = h
        .engine
        .set_late_reason("alice", "bus broke down".into())
        .await
        .unwrap();
    assert_eq!(updated.late_reason.as_deref(), Some("bus broke down"));
}

#[tokio::test]
async fn scheduled_lunch_auto_starts_once() {
    let mut h = Harness::new();
    let entry_id = clocked_in_with_lunch(&mut h).await;

    h.tick_at(at(11, 59, 45)).await;
    h.tick_at(at(12, 0, 0)).await;
    h.tick_at(at(12, 0, 15)).await;
    h.tick_at(at(12, 0, 30)).await;

    let started: Vec<_> = h
        .drain()
        .into_iter()
        .filter(|e| matches!(e, Event::BreakStateChanged { change: BreakChange::Started, .. }))
        .collect();
    assert_eq!(started.len(), 1);

    let breaks = h.repo.breaks_for_entry(&entry_id).unwrap();
    let active: Vec<_> = breaks.iter().filter(|b| b.is_unresolved()).collect();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].break_type, BreakType::Lunch);
    assert!(active[0].auto_started);
}

#[tokio::test]
async fn paused_gap_is_excluded_and_not_late() {
    let mut h = Harness::new();
    clocked_in_with_lunch(&mut h).await;

    h.clock.set(at(12, 0, 0));
    let lunch = h
        .engine
        .start_break("alice", StartBreak::of_type(BreakType::Lunch))
        .await
        .unwrap();
    h.clock.set(at(12, 10, 0));
    let paused = h.engine.pause_break("alice", &lunch.id).await.unwrap();
    assert_eq!(paused.paused_duration, Some(50 * 60));

    h.clock.set(at(12, 40, 0));
    h.engine.resume_break("alice", &lunch.id).await.unwrap();
    h.clock.set(at(13, 5, 0));
    let ended = h.engine.end_break("alice", &lunch.id).await.unwrap();
    assert_eq!(ended.active_secs, Some(35 * 60));
    assert!(!ended.is_late);

    let changes: Vec<_> = h
        .drain()
        .into_iter()
        .filter_map(|e| match e {
            Event::BreakStateChanged { change, .. } => Some(change),
            _ => None,
        })
        .collect();
    assert_eq!(
        changes,
        vec![
            BreakChange::Started,
            BreakChange::Paused,
            BreakChange::Resumed,
            BreakChange::Ended
        ]
    );
}

#[tokio::test]
async fn auto_clock_out_fires_exactly_once() {
    let mut h = Harness::new();
    h.clock.set(at(9, 0, 0));
    let entry = h.engine.clock_in("alice").await.unwrap();
    h.drain();

    h.tick_at(at(17, 45, 0)).await;
    h.tick_at(at(17, 55, 0)).await;
    h.tick_at(at(18, 0, 0)).await;
    h.tick_at(at(18, 0, 15)).await;
    h.tick_at(at(18, 5, 0)).await;

    let events = h.drain();
    assert_eq!(
        kinds(&events),
        vec![
            "ShiftWarning",
            "ShiftWarning",
            "SessionStateChanged",
            "AutoClockOutExecuted"
        ]
    );
    match &events[3] {
        Event::AutoClockOutExecuted { entry: closed, .. } => {
            assert_eq!(closed.id, entry.id);
            assert_eq!(closed.clock_out_reason, Some(ClockOutReason::EndOfShift));
            assert_eq!(closed.total_hours, Some(9.0));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn active_break_blocks_auto_clock_out() {
    let mut h = Harness::new();
    h.clock.set(at(9, 0, 0));
    let entry = h.engine.clock_in("alice").await.unwrap();
    h.clock.set(at(17, 50, 0));
    let away = h
        .engine
        .start_break("alice", StartBreak::away("courier at the door"))
        .await
        .unwrap();
    h.drain();

    h.tick_at(at(18, 0, 0)).await;
    h.tick_at(at(18, 0, 15)).await;
    let events = h.drain();
    let blocked: Vec<_> = events
        .iter()
        .filter(|e| matches!(e, Event::AutoClockOutBlocked { .. }))
        .collect();
    assert_eq!(blocked.len(), 1);
    assert!(matches!(
        blocked[0],
        Event::AutoClockOutBlocked { cause: BlockCause::ActiveBreak { break_id }, .. } if *break_id == away.id
    ));
    let stored = h.repo.time_entry(&entry.id).unwrap().unwrap();
    assert!(stored.is_open());
    assert!(stored.clock_out_reason.is_none());

    // Once the break is resolved the next tick closes the session.
    h.clock.set(at(18, 3, 0));
    h.engine.end_break("alice", &away.id).await.unwrap();
    h.tick_at(at(18, 3, 15)).await;
    assert!(kinds(&h.drain()).contains(&"AutoClockOutExecuted"));
    assert!(!h.repo.time_entry(&entry.id).unwrap().unwrap().is_open());
}

#[tokio::test]
async fn manual_clock_out_rejected_during_break() {
    let h = Harness::new();
    h.clock.set(at(9, 0, 0));
    let entry = h.engine.clock_in("alice").await.unwrap();
    h.clock.set(at(11, 0, 0));
    let brk = h
        .engine
        .start_break("alice", StartBreak::of_type(BreakType::Morning))
        .await
        .unwrap();

    let before = h.repo.time_entry(&entry.id).unwrap();
    let err = h
        .engine
        .clock_out("alice", ClockOutReason::Personal, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::Shift(ShiftError::ActiveBreakBlocksClockOut { ref break_id }) if *break_id == brk.id
    ));
    assert_eq!(h.repo.time_entry(&entry.id).unwrap(), before);
}

#[tokio::test]
async fn manual_clock_out_cancels_shift_timers() {
    let mut h = Harness::new();
    h.clock.set(at(9, 0, 0));
    h.engine.clock_in("alice").await.unwrap();
    h.clock.set(at(16, 0, 0));
    let closed = h
        .engine
        .clock_out("alice", ClockOutReason::Emergency, None)
        .await
        .unwrap();
    assert!(closed.was_early_clock_out);
    assert_eq!(closed.early_clock_out_by, Some(120));
    h.drain();

    h.tick_at(at(17, 45, 0)).await;
    h.tick_at(at(18, 0, 0)).await;
    assert!(h.drain().is_empty());

    let err = h.engine.clock_in("alice").await.unwrap_err();
    assert!(err.is_conflict());
}

#[tokio::test]
async fn auto_clock_out_retries_then_alerts() {
    let mut h = Harness::new();
    h.clock.set(at(9, 0, 0));
    h.engine.clock_in("alice").await.unwrap();
    h.tick_at(at(17, 56, 0)).await;
    h.drain();

    h.repo.fail_next_writes(3);
    h.tick_at(at(18, 0, 0)).await;
    h.tick_at(at(18, 0, 15)).await;
    assert!(h.drain().is_empty());
    h.tick_at(at(18, 0, 30)).await;
    let events = h.drain();
    assert!(matches!(
        events.as_slice(),
        [Event::AutoClockOutBlocked { cause: BlockCause::RetriesExhausted { attempts: 3, .. }, .. }]
    ));

    h.tick_at(at(18, 0, 45)).await;
    assert_eq!(
        kinds(&h.drain()),
        vec!["SessionStateChanged", "AutoClockOutExecuted"]
    );
}

#[tokio::test]
async fn timers_are_rebuilt_after_restart() {
    let repo = Arc::new(MemoryRepository::new());
    let entry_id = {
        let mut first = Harness::with_repo(repo.clone());
        let entry_id = clocked_in_with_lunch(&mut first).await;
        first.tick_at(at(17, 45, 0)).await;
        assert_eq!(kinds(&first.drain()), vec!["ShiftWarning"]);
        first.engine.shutdown().await;
        entry_id
    };

    let mut second = Harness::with_repo(repo.clone());
    assert_eq!(second.engine.recover().unwrap(), 1);
    second.tick_at(at(17, 46, 0)).await;
    assert!(second.drain().is_empty(), "15 minute warning must not repeat");
    second.tick_at(at(17, 55, 0)).await;
    assert!(matches!(
        second.drain().as_slice(),
        [Event::ShiftWarning { level_minutes: 5, .. }]
    ));
    second.tick_at(at(18, 0, 0)).await;
    assert!(kinds(&second.drain()).contains(&"AutoClockOutExecuted"));
    assert!(!repo.time_entry(&entry_id).unwrap().unwrap().is_open());
}

#[tokio::test]
async fn snapshot_answers_and_is_broadcast() {
    let mut h = Harness::new();
    let entry_id = clocked_in_with_lunch(&mut h).await;
    h.clock.set(at(12, 0, 0));
    h.engine
        .start_break("alice", StartBreak::of_type(BreakType::Lunch))
        .await
        .unwrap();
    h.clock.set(at(12, 20, 0));
    h.drain();

    let snap = h.engine.snapshot("alice").await.unwrap();
    assert_eq!(snap.open_entry.as_ref().map(|e| e.id.as_str()), Some(entry_id.as_str()));
    assert_eq!(snap.break_remaining_secs, Some(40 * 60));
    assert_eq!(snap.seconds_to_shift_end, Some((5 * 60 + 40) * 60));
    assert_eq!(snap.active_break.unwrap().state(), BreakState::Active);
    assert_eq!(
        snap.open_entry.unwrap().break_plan,
        BreakPlanStatus::Scheduled
    );
    assert_eq!(kinds(&h.drain()), vec!["SnapshotProvided"]);

    let nobody = h.engine.snapshot("bob").await.unwrap();
    assert!(nobody.open_entry.is_none());
    assert!(nobody.shift_window.is_some());
}

#[tokio::test]
async fn staff_members_are_independent() {
    let mut h = Harness::new();
    h.clock.set(at(9, 0, 0));
    let (a, b) = tokio::join!(h.engine.clock_in("alice"), h.engine.clock_in("bob"));
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_ne!(a.id, b.id);

    h.clock.set(at(10, 0, 0));
    h.engine
        .start_break("alice", StartBreak::away("doctor"))
        .await
        .unwrap();
    // Bob is unaffected by Alice's break.
    h.engine
        .clock_out("bob", ClockOutReason::Sick, None)
        .await
        .unwrap();

    let err = h
        .engine
        .start_break("alice", StartBreak::of_type(BreakType::Morning))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::Shift(ShiftError::ConcurrentBreakExists { .. })
    ));

    let events = h.drain();
    let for_staff = |id: &str| events.iter().filter(|e| e.staff_id() == id).count();
    assert_eq!(for_staff("alice"), 2);
    assert_eq!(for_staff("bob"), 2);
}

#[tokio::test]
async fn sequence_numbers_increase_per_publish() {
    let h = Harness::new();
    let mut rx = h.engine.subscribe();
    h.clock.set(at(9, 0, 0));
    h.engine.clock_in("alice").await.unwrap();
    h.clock.set(at(10, 0, 0));
    let brk = h
        .engine
        .start_break("alice", StartBreak::of_type(BreakType::Morning))
        .await
        .unwrap();
    h.clock.set(at(10, 5, 0));
    h.engine.pause_break("alice", &brk.id).await.unwrap();

    let mut seqs = Vec::new();
    while let Ok(envelope) = rx.try_recv() {
        seqs.push(envelope.seq);
    }
    assert_eq!(seqs.len(), 3);
    assert!(seqs.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test]
async fn breaks_of_other_staff_are_not_found() {
    let h = Harness::new();
    h.clock.set(at(9, 0, 0));
    h.engine.clock_in("alice").await.unwrap();
    h.engine.clock_in("bob").await.unwrap();
    let brk = h
        .engine
        .start_break("alice", StartBreak::away("lunch run"))
        .await
        .unwrap();

    let err = h.engine.end_break("bob", &brk.id).await.unwrap_err();
    assert!(matches!(err, CoreError::Shift(ShiftError::BreakNotFound(_))));
    h.clock.set(at(9, 0, 0) + Duration::minutes(20));
    h.engine.end_break("alice", &brk.id).await.unwrap();
}

#[tokio::test]
async fn commands_require_an_open_session() {
    let h = Harness::new();
    let err = h
        .engine
        .clock_out("carol", ClockOutReason::EndOfShift, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Shift(ShiftError::NotClockedIn { .. })));
    assert!(h.engine.propose_breaks("carol").await.is_err());
}

#[tokio::test]
async fn skipped_plan_still_allows_ad_hoc_breaks() {
    let h = Harness::new();
    h.clock.set(at(9, 0, 0));
    h.engine.clock_in("alice").await.unwrap();
    let entry = h.engine.skip_breaks("alice").await.unwrap();
    assert_eq!(entry.break_plan, BreakPlanStatus::Skipped);

    h.clock.set(at(12, 30, 0));
    let lunch = h
        .engine
        .start_break("alice", StartBreak::of_type(BreakType::Lunch))
        .await
        .unwrap();
    assert_eq!(lunch.duration_minutes, 60);
    assert!(lunch.scheduled_start.is_none());
}

#[tokio::test]
async fn engine_refuses_work_after_shutdown() {
    let h = Harness::new();
    h.engine.shutdown().await;
    assert!(matches!(
        h.engine.clock_in("alice").await.unwrap_err(),
        CoreError::EngineStopped
    ));
}

#[tokio::test]
async fn idle_actors_are_released_after_a_tick() {
    let h = Harness::new();
    h.clock.set(at(9, 0, 0));
    h.engine.clock_in("alice").await.unwrap();
    h.engine.snapshot("ghost").await.unwrap();
    assert_eq!(h.engine.actor_count(), 2);

    h.tick_at(at(9, 1, 0)).await;
    assert_eq!(h.engine.actor_count(), 1);

    h.clock.set(at(10, 0, 0));
    h.engine
        .clock_out("alice", ClockOutReason::Personal, None)
        .await
        .unwrap();
    h.tick_at(at(10, 1, 0)).await;
    assert_eq!(h.engine.actor_count(), 0);

    let snapshot = h.engine.snapshot("alice").await.unwrap();
    assert!(snapshot.open_entry.is_none());
    assert_eq!(h.engine.actor_count(), 1);
}
