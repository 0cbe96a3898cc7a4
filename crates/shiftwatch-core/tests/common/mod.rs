#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use shiftwatch_core::{
    EngineConfig, Envelope, Event, ManualClock, MemoryRepository, MemoryScheduleStore,
    ShiftEngine, WeeklySchedule,
};
use tokio::sync::broadcast::{self, error::TryRecvError};

/// 2024-03-04 is a Monday.
pub fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, h, m, s).unwrap()
}

pub fn t(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

pub struct Harness {
    pub engine: ShiftEngine,
    pub clock: Arc<ManualClock>,
    pub repo: Arc<MemoryRepository>,
    pub events: broadcast::Receiver<Envelope>,
}

impl Harness {
    /// Nine-to-six, Monday to Friday, UTC.
    pub fn new() -> Self {
        Self::with_repo(Arc::new(MemoryRepository::new()))
    }

    pub fn with_repo(repo: Arc<MemoryRepository>) -> Self {
        let schedules = Arc::new(MemoryScheduleStore::with_fallback(WeeklySchedule::standard(
            t(9, 0),
            t(18, 0),
        )));
        let clock = Arc::new(ManualClock::new(at(8, 0, 0)));
        let engine = ShiftEngine::new(
            EngineConfig::default(),
            repo.clone(),
            schedules,
            clock.clone(),
        );
        let events = engine.subscribe();
        Self {
            engine,
            clock,
            repo,
            events,
        }
    }

    /// Move the clock and run one background tick at that instant.
    pub async fn tick_at(&self, now: DateTime<Utc>) {
        self.clock.set(now);
        self.engine.tick(now).await.unwrap();
    }

    /// Everything published since the last drain.
    pub fn drain(&mut self) -> Vec<Event> {
        let mut out = Vec::new();
        loop {
            match self.events.try_recv() {
                Ok(envelope) => out.push(envelope.event),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
                Err(TryRecvError::Lagged(_)) => continue,
            }
        }
        out
    }
}

pub fn kinds(events: &[Event]) -> Vec<&'static str> {
    events.iter().map(Event::kind).collect()
}
