//! Event subscribers.
//!
//! ```text
//! StaffActor ── publish ──► Bus ──► spawn_subscriber worker ──► Subscribe::on_event
//! ```
//!
//! Each subscriber gets its own receiver and worker task, so a slow one
//! only lags itself. Lagged receivers skip the missed events and log it;
//! the snapshot request is the way to resync.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::bus::Bus;
use crate::events::{BlockCause, Envelope, Event};

#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    async fn on_event(&self, envelope: &Envelope);

    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Run `subscriber` on its own task until `token` is cancelled or the bus closes.
pub fn spawn_subscriber(
    bus: &Bus,
    subscriber: Arc<dyn Subscribe>,
    token: CancellationToken,
) -> JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                msg = rx.recv() => match msg {
                    Ok(envelope) => subscriber.on_event(&envelope).await,
                    Err(RecvError::Closed) => break,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(subscriber = subscriber.name(), skipped, "subscriber lagged");
                        continue;
                    }
                }
            }
        }
    })
}

/// Renders every event through `tracing`.
pub struct LogSubscriber;

#[async_trait]
impl Subscribe for LogSubscriber {
    async fn on_event(&self, envelope: &Envelope) {
        let seq = envelope.seq;
        match &envelope.event {
            Event::SessionStateChanged {
                staff_id,
                change,
                entry,
                ..
            } => {
                info!(seq, staff_id, ?change, time_entry_id = %entry.id, "[session]");
            }
            Event::BreakStateChanged {
                staff_id,
                change,
                brk,
                ..
            } => {
                info!(seq, staff_id, ?change, break_id = %brk.id, break_type = %brk.break_type, "[break]");
            }
            Event::ShiftWarning {
                staff_id,
                level_minutes,
                ..
            } => {
                info!(seq, staff_id, level_minutes, "[shift-warning]");
            }
            Event::AutoClockOutExecuted {
                staff_id, entry, ..
            } => {
                info!(seq, staff_id, time_entry_id = %entry.id, total_hours = ?entry.total_hours, "[auto-clock-out]");
            }
            Event::AutoClockOutBlocked {
                staff_id, cause, ..
            } => match cause {
                BlockCause::ActiveBreak { break_id } => {
                    warn!(seq, staff_id, break_id, "[auto-clock-out-blocked] unresolved break");
                }
                BlockCause::RetriesExhausted { attempts, error } => {
                    error!(seq, staff_id, attempts, error, "[auto-clock-out-blocked] retries exhausted");
                }
            },
            Event::BreakAutoStartFailed {
                staff_id,
                break_id,
                attempts,
                error,
                ..
            } => {
                error!(seq, staff_id, break_id, attempts, error, "[break-auto-start-failed]");
            }
            Event::SnapshotProvided { snapshot, .. } => {
                info!(seq, staff_id = %snapshot.staff_id, open = snapshot.open_entry.is_some(), "[snapshot]");
            }
        }
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
