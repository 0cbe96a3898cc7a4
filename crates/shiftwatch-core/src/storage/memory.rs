//! In-process repository.
//!
//! Holds everything in mutex-guarded vectors. Enforces the same uniqueness
//! rules and write guards as the SQLite schema and can simulate outages for
//! exercising the retry paths.

use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use super::Repository;
use crate::error::{CoreError, DatabaseError, Result, ShiftError};
use crate::models::{Break, TimeEntry};

#[derive(Debug, Default)]
struct Inner {
    entries: Vec<TimeEntry>,
    breaks: Vec<Break>,
    failing_writes: u32,
}

#[derive(Debug, Default)]
pub struct MemoryRepository {
    inner: Mutex<Inner>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` writes fail with a transient error.
    pub fn fail_next_writes(&self, count: u32) {
        self.lock().failing_writes = count;
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> Result<MutexGuard<'_, Inner>> {
        let mut guard = self.lock();
        if guard.failing_writes > 0 {
            guard.failing_writes -= 1;
            return Err(DatabaseError::Unavailable("simulated outage".into()).into());
        }
        Ok(guard)
    }
}

impl Inner {
    fn entry_state(&self, id: &str) -> Result<bool> {
        self.entries
            .iter()
            .find(|e| e.id == id)
            .map(TimeEntry::is_open)
            .ok_or_else(|| ShiftError::TimeEntryNotFound(id.to_string()).into())
    }

    fn unresolved_break(&self, time_entry_id: &str) -> Option<&Break> {
        self.breaks
            .iter()
            .find(|b| b.time_entry_id == time_entry_id && b.is_unresolved())
    }

    fn check_insert_break(&self, brk: &Break) -> Result<()> {
        if !self.entry_state(&brk.time_entry_id)? {
            return Err(ShiftError::TimeEntryClosed(brk.time_entry_id.clone()).into());
        }
        if brk.is_unresolved() {
            if let Some(existing) = self.unresolved_break(&brk.time_entry_id) {
                return Err(DatabaseError::ConstraintViolation(format!(
                    "break {} is already unresolved",
                    existing.id
                ))
                .into());
            }
        }
        Ok(())
    }
}

fn conflict(table: &'static str, id: &str) -> CoreError {
    DatabaseError::WriteConflict {
        table,
        id: id.to_string(),
    }
    .into()
}

impl Repository for MemoryRepository {
    fn insert_time_entry(&self, entry: &TimeEntry) -> Result<()> {
        let mut inner = self.write()?;
        if entry.is_open()
            && inner
                .entries
                .iter()
                .any(|e| e.staff_id == entry.staff_id && e.is_open())
        {
            return Err(DatabaseError::ConstraintViolation(format!(
                "open time entry for {}",
                entry.staff_id
            ))
            .into());
        }
        inner.entries.push(entry.clone());
        Ok(())
    }

    fn update_time_entry(&self, entry: &TimeEntry, seen: DateTime<Utc>) -> Result<()> {
        let mut inner = self.write()?;
        if !inner.entry_state(&entry.id)? {
            return Err(ShiftError::TimeEntryClosed(entry.id.clone()).into());
        }
        if entry.clock_out.is_some() {
            if let Some(active) = inner.unresolved_break(&entry.id) {
                return Err(ShiftError::ActiveBreakBlocksClockOut {
                    break_id: active.id.clone(),
                }
                .into());
            }
        }
        let slot = inner
            .entries
            .iter_mut()
            .find(|e| e.id == entry.id)
            .ok_or_else(|| ShiftError::TimeEntryNotFound(entry.id.clone()))?;
        if slot.updated_at != seen {
            return Err(conflict("time_entries", &entry.id));
        }
        *slot = entry.clone();
        Ok(())
    }

    fn set_late_reason(&self, id: &str, reason: &str, at: DateTime<Utc>) -> Result<()> {
        let mut inner = self.write()?;
        let slot = inner
            .entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| ShiftError::TimeEntryNotFound(id.to_string()))?;
        slot.late_reason = Some(reason.to_string());
        slot.updated_at = at;
        Ok(())
    }

    fn time_entry(&self, id: &str) -> Result<Option<TimeEntry>> {
        Ok(self.lock().entries.iter().find(|e| e.id == id).cloned())
    }

    fn open_time_entry(&self, staff_id: &str) -> Result<Option<TimeEntry>> {
        Ok(self
            .lock()
            .entries
            .iter()
            .find(|e| e.staff_id == staff_id && e.is_open())
            .cloned())
    }

    fn time_entries_between(
        &self,
        staff_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<TimeEntry>> {
        let mut found: Vec<TimeEntry> = self
            .lock()
            .entries
            .iter()
            .filter(|e| e.staff_id == staff_id && e.clock_in >= from && e.clock_in < to)
            .cloned()
            .collect();
        found.sort_by_key(|e| e.clock_in);
        Ok(found)
    }

    fn open_time_entries(&self) -> Result<Vec<TimeEntry>> {
        Ok(self
            .lock()
            .entries
            .iter()
            .filter(|e| e.is_open())
            .cloned()
            .collect())
    }

    fn insert_break(&self, brk: &Break) -> Result<()> {
        let mut inner = self.write()?;
        inner.check_insert_break(brk)?;
        inner.breaks.push(brk.clone());
        Ok(())
    }

    fn insert_breaks(&self, breaks: &[Break]) -> Result<()> {
        let mut inner = self.write()?;
        for brk in breaks {
            inner.check_insert_break(brk)?;
        }
        inner.breaks.extend(breaks.iter().cloned());
        Ok(())
    }

    fn update_break(&self, brk: &Break, seen: DateTime<Utc>) -> Result<()> {
        let mut inner = self.write()?;
        let stored = inner
            .breaks
            .iter()
            .position(|b| b.id == brk.id)
            .ok_or_else(|| ShiftError::BreakNotFound(brk.id.clone()))?;
        let entry_id = inner.breaks[stored].time_entry_id.clone();
        if !inner.entry_state(&entry_id)? {
            return Err(ShiftError::TimeEntryClosed(entry_id).into());
        }
        let slot = &mut inner.breaks[stored];
        if slot.actual_end.is_some() || slot.updated_at != seen {
            return Err(conflict("breaks", &brk.id));
        }
        *slot = brk.clone();
        Ok(())
    }

    fn break_by_id(&self, id: &str) -> Result<Option<Break>> {
        Ok(self.lock().breaks.iter().find(|b| b.id == id).cloned())
    }

    fn breaks_for_entry(&self, time_entry_id: &str) -> Result<Vec<Break>> {
        Ok(self
            .lock()
            .breaks
            .iter()
            .filter(|b| b.time_entry_id == time_entry_id)
            .cloned()
            .collect())
    }
}
