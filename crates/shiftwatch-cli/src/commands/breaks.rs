use clap::Subcommand;
use shiftwatch_core::error::Result;
use shiftwatch_core::{BreakType, ShiftEngine, ShiftError, StartBreak};

use super::{print_json, with_engine, CliResult};

#[derive(Subcommand)]
pub enum BreakAction {
    /// Start a break now
    Start {
        /// Staff ID
        staff: String,
        /// morning, lunch, afternoon or away
        #[arg(value_parser = parse_type)]
        break_type: BreakType,
        /// Reason for an away break
        #[arg(long)]
        reason: Option<String>,
        /// Start this planned break instead of the first planned one of the type
        #[arg(long)]
        id: Option<String>,
    },
    /// Pause the active break (once per break)
    Pause {
        /// Staff ID
        staff: String,
        /// Break ID; defaults to the active break
        break_id: Option<String>,
    },
    /// Resume a paused break
    Resume {
        staff: String,
        break_id: Option<String>,
    },
    /// End the active or paused break
    End {
        staff: String,
        break_id: Option<String>,
    },
}

fn parse_type(value: &str) -> std::result::Result<BreakType, String> {
    BreakType::parse(value).ok_or_else(|| format!("unknown break type: {value}"))
}

fn start_request(break_type: BreakType, reason: Option<String>, id: Option<String>) -> StartBreak {
    match (break_type, id) {
        (BreakType::Away, _) => StartBreak::away(reason.unwrap_or_default()),
        (_, Some(id)) => StartBreak::planned(id, break_type),
        (_, None) => StartBreak::of_type(break_type),
    }
}

/// The given break, or the staff member's active one.
async fn target(engine: &ShiftEngine, staff: &str, break_id: Option<String>) -> Result<String> {
    if let Some(id) = break_id {
        return Ok(id);
    }
    let snapshot = engine.snapshot(staff).await?;
    match (snapshot.open_entry, snapshot.active_break) {
        (None, _) => Err(ShiftError::NotClockedIn {
            staff_id: staff.to_string(),
        }
        .into()),
        (Some(entry), None) => Err(ShiftError::BreakNotFound(format!(
            "no active break on entry {}",
            entry.id
        ))
        .into()),
        (Some(_), Some(active)) => Ok(active.id),
    }
}

pub async fn run(action: BreakAction) -> CliResult {
    let brk = match action {
        BreakAction::Start {
            staff,
            break_type,
            reason,
            id,
        } => {
            let request = start_request(break_type, reason, id);
            with_engine(|engine| async move { engine.start_break(&staff, request).await }).await?
        }
        BreakAction::Pause { staff, break_id } => {
            with_engine(|engine| async move {
                let id = target(&engine, &staff, break_id).await?;
                engine.pause_break(&staff, &id).await
            })
            .await?
        }
        BreakAction::Resume { staff, break_id } => {
            with_engine(|engine| async move {
                let id = target(&engine, &staff, break_id).await?;
                engine.resume_break(&staff, &id).await
            })
            .await?
        }
        BreakAction::End { staff, break_id } => {
            with_engine(|engine| async move {
                let id = target(&engine, &staff, break_id).await?;
                engine.end_break(&staff, &id).await
            })
            .await?
        }
    };
    print_json(&brk)
}
