use clap::Subcommand;
use shiftwatch_core::ClockOutReason;

use super::{print_json, with_engine, CliResult};

#[derive(Subcommand)]
pub enum ClockAction {
    /// Start a session
    In {
        /// Staff ID
        staff: String,
    },
    /// Close the open session
    Out {
        /// Staff ID
        staff: String,
        /// end_of_shift, emergency, sick, personal or other
        #[arg(long, default_value = "end_of_shift", value_parser = parse_reason)]
        reason: ClockOutReason,
        /// Free-form notes (required with --reason other)
        #[arg(long)]
        notes: Option<String>,
    },
    /// Explain a late clock-in
    LateReason {
        /// Staff ID
        staff: String,
        /// Explanation
        reason: String,
    },
}

fn parse_reason(value: &str) -> Result<ClockOutReason, String> {
    ClockOutReason::parse(value).ok_or_else(|| format!("unknown clock-out reason: {value}"))
}

pub async fn run(action: ClockAction) -> CliResult {
    let entry = match action {
        ClockAction::In { staff } => {
            with_engine(|engine| async move { engine.clock_in(&staff).await }).await?
        }
        ClockAction::Out {
            staff,
            reason,
            notes,
        } => {
            with_engine(|engine| async move { engine.clock_out(&staff, reason, notes).await })
                .await?
        }
        ClockAction::LateReason { staff, reason } => {
            with_engine(|engine| async move { engine.set_late_reason(&staff, reason).await })
                .await?
        }
    };
    print_json(&entry)
}
