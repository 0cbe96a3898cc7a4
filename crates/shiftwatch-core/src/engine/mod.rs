//! The shift engine: a registry of per-staff actors.
//!
//! ```text
//! caller ── clock_in("alice") ──► [alice queue] ──► StaffActor ──► repository
//!                                                      │
//! run() ── tick(now) ──► every staff queue             └──► Bus ──► subscribers
//! ```
//!
//! Commands for one staff member are processed strictly in order; different
//! staff members proceed in parallel with nothing shared but the repository.
//! Background work (break auto-start, shift countdown) is queued as a `Tick`
//! command so it never races a user command for the same staff member.
//! Actors of staff without an open session are released after each tick.

mod actor;
mod command;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::breaks::{BreakPlan, BreakRuntime, BreakScheduler, StartBreak};
use crate::bus::Bus;
use crate::clock::Clock;
use crate::error::{CoreError, Result};
use crate::events::{Envelope, StaffSnapshot};
use crate::models::{Break, ClockOutReason, TimeEntry};
use crate::schedule::ScheduleStore;
use crate::session::SessionManager;
use crate::storage::{EngineConfig, Repository};

use actor::StaffActor;
use command::{Command, Reply};

/// Shared by every actor.
pub(crate) struct Context {
    pub(crate) sessions: SessionManager,
    pub(crate) runtime: BreakRuntime,
    pub(crate) scheduler: BreakScheduler,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) bus: Bus,
    pub(crate) config: EngineConfig,
}

pub struct ShiftEngine {
    ctx: Arc<Context>,
    actors: Mutex<HashMap<String, mpsc::Sender<Command>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    token: CancellationToken,
}

impl ShiftEngine {
    pub fn new(
        config: EngineConfig,
        repo: Arc<dyn Repository>,
        schedules: Arc<dyn ScheduleStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let zone = config.zone();
        let sessions = SessionManager::new(repo.clone(), schedules, zone);
        let runtime = BreakRuntime::new(repo, zone, config.breaks.clone());
        let scheduler = BreakScheduler::new(sessions.clone(), runtime.clone(), config.breaks.clone());
        let bus = Bus::new(config.bus_capacity);
        Self {
            ctx: Arc::new(Context {
                sessions,
                runtime,
                scheduler,
                clock,
                bus,
                config,
            }),
            actors: Mutex::new(HashMap::new()),
            tasks: Mutex::new(Vec::new()),
            token: CancellationToken::new(),
        }
    }

    pub fn bus(&self) -> &Bus {
        &self.ctx.bus
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.ctx.bus.subscribe()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.ctx.config
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub async fn clock_in(&self, staff_id: &str) -> Result<TimeEntry> {
        self.request(staff_id, |reply| Command::ClockIn { reply }).await
    }

    pub async fn clock_out(
        &self,
        staff_id: &str,
        reason: ClockOutReason,
        notes: Option<String>,
    ) -> Result<TimeEntry> {
        self.request(staff_id, |reply| Command::ClockOut {
            reason,
            notes,
            reply,
        })
        .await
    }

    /// Explain a late clock-in on the open entry, or today's last entry.
    pub async fn set_late_reason(&self, staff_id: &str, reason: String) -> Result<TimeEntry> {
        self.request(staff_id, |reply| Command::SetLateReason { reason, reply })
            .await
    }

    pub async fn start_break(&self, staff_id: &str, request: StartBreak) -> Result<Break> {
        self.request(staff_id, |reply| Command::StartBreak { request, reply })
            .await
    }

    pub async fn pause_break(&self, staff_id: &str, break_id: &str) -> Result<Break> {
        let break_id = break_id.to_string();
        self.request(staff_id, |reply| Command::PauseBreak { break_id, reply })
            .await
    }

    pub async fn resume_break(&self, staff_id: &str, break_id: &str) -> Result<Break> {
        let break_id = break_id.to_string();
        self.request(staff_id, |reply| Command::ResumeBreak { break_id, reply })
            .await
    }

    pub async fn end_break(&self, staff_id: &str, break_id: &str) -> Result<Break> {
        let break_id = break_id.to_string();
        self.request(staff_id, |reply| Command::EndBreak { break_id, reply })
            .await
    }

    pub async fn propose_breaks(&self, staff_id: &str) -> Result<BreakPlan> {
        self.request(staff_id, |reply| Command::ProposeBreaks { reply })
            .await
    }

    pub async fn schedule_breaks(&self, staff_id: &str, plan: BreakPlan) -> Result<Vec<Break>> {
        self.request(staff_id, |reply| Command::ScheduleBreaks { plan, reply })
            .await
    }

    pub async fn skip_breaks(&self, staff_id: &str) -> Result<TimeEntry> {
        self.request(staff_id, |reply| Command::SkipBreaks { reply })
            .await
    }

    /// Current state of one staff member; also published on the bus.
    pub async fn snapshot(&self, staff_id: &str) -> Result<StaffSnapshot> {
        self.request(staff_id, |reply| Command::Snapshot { reply })
            .await
    }

    /// Spawn actors for every staff member with an open entry.
    ///
    /// Timers are derived from persisted state on the first tick, so this
    /// is all a restart needs. Returns the number of open sessions.
    pub fn recover(&self) -> Result<usize> {
        let open = self.ctx.sessions.repository().open_time_entries()?;
        for entry in &open {
            self.actor(&entry.staff_id)?;
        }
        if !open.is_empty() {
            info!(sessions = open.len(), "recovered open sessions");
        }
        Ok(open.len())
    }

    /// Run background work for every staff member at `now` and wait for it.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<()> {
        if let Err(e) = self.recover() {
            warn!(error = %e, "could not refresh open sessions before tick");
        }
        let senders: Vec<(String, mpsc::Sender<Command>)> = self
            .lock_actors()
            .iter()
            .map(|(id, tx)| (id.clone(), tx.clone()))
            .collect();

        let mut pending = Vec::with_capacity(senders.len());
        for (staff_id, tx) in senders {
            let (done, wait) = oneshot::channel();
            if tx.send(Command::Tick { now, done }).await.is_err() {
                debug!(staff_id, "actor gone, skipping tick");
                continue;
            }
            pending.push((staff_id, tx, wait));
        }
        let mut idle = Vec::new();
        for (staff_id, tx, wait) in pending {
            if !wait.await.unwrap_or(false) {
                idle.push((staff_id, tx));
            }
        }
        self.release(idle);
        Ok(())
    }

    /// Number of live staff actors.
    pub fn actor_count(&self) -> usize {
        self.lock_actors().len()
    }

    /// Drop actors of staff without an open session. The actor exits once
    /// the last sender is gone; the next command for that staff member
    /// spawns a fresh one.
    fn release(&self, idle: Vec<(String, mpsc::Sender<Command>)>) {
        if !idle.is_empty() {
            let mut actors = self.lock_actors();
            for (staff_id, tx) in &idle {
                if actors
                    .get(staff_id)
                    .is_some_and(|current| current.same_channel(tx))
                {
                    actors.remove(staff_id);
                    debug!(staff_id = %staff_id, "idle actor released");
                }
            }
        }
        self.lock_tasks().retain(|handle| !handle.is_finished());
    }

    /// Tick on the configured interval until shut down.
    pub fn run(self: &Arc<Self>) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        let token = self.token.clone();
        let period = self.ctx.config.scan_interval();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        let now = engine.ctx.clock.now();
                        if let Err(e) = engine.tick(now).await {
                            warn!(error = %e, "tick failed");
                        }
                    }
                }
            }
            debug!("tick loop stopped");
        })
    }

    /// Stop every actor and the tick loop.
    pub async fn shutdown(&self) {
        self.token.cancel();
        self.lock_actors().clear();
        let handles: Vec<JoinHandle<()>> = self.lock_tasks().drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "actor task ended abnormally");
            }
        }
        info!("engine stopped");
    }

    async fn request<T>(
        &self,
        staff_id: &str,
        make: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T> {
        let tx = self.actor(staff_id)?;
        let (reply, response) = oneshot::channel();
        tx.send(make(reply))
            .await
            .map_err(|_| CoreError::EngineStopped)?;
        response.await.map_err(|_| CoreError::EngineStopped)?
    }

    /// The staff member's queue, spawning the actor on first use.
    fn actor(&self, staff_id: &str) -> Result<mpsc::Sender<Command>> {
        if self.token.is_cancelled() {
            return Err(CoreError::EngineStopped);
        }
        let mut actors = self.lock_actors();
        if let Some(tx) = actors.get(staff_id).filter(|tx| !tx.is_closed()) {
            return Ok(tx.clone());
        }

        let (tx, rx) = mpsc::channel(self.ctx.config.command_queue_capacity.max(1));
        let actor = StaffActor::new(staff_id.to_string(), Arc::clone(&self.ctx), rx);
        let handle = tokio::spawn(actor.run(self.token.child_token()));
        actors.insert(staff_id.to_string(), tx.clone());
        let mut tasks = self.lock_tasks();
        tasks.retain(|handle| !handle.is_finished());
        tasks.push(handle);
        Ok(tx)
    }

    fn lock_actors(&self) -> MutexGuard<'_, HashMap<String, mpsc::Sender<Command>>> {
        match self.actors.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_tasks(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        match self.tasks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
