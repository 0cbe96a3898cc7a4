use clap::Subcommand;
use shiftwatch_core::schedule::parse_time_of_day;
use shiftwatch_core::{BreakType, PlannedBreak};

use super::{print_json, with_engine, CliResult};

#[derive(Subcommand)]
pub enum PlanAction {
    /// Print the default break windows for today's shift
    Propose {
        /// Staff ID
        staff: String,
    },
    /// Commit a break plan for the open session
    Commit {
        /// Staff ID
        staff: String,
        /// A break as TYPE=START-END, e.g. lunch=12:00-13:00 or
        /// "lunch=12:00 PM-1:00 PM". Repeatable; without any the
        /// proposal is committed as-is.
        #[arg(long = "break", value_parser = parse_planned)]
        breaks: Vec<PlannedBreak>,
    },
    /// Decline scheduled breaks for today
    Skip {
        /// Staff ID
        staff: String,
    },
}

fn parse_planned(value: &str) -> Result<PlannedBreak, String> {
    let (kind, range) = value
        .split_once('=')
        .ok_or_else(|| format!("expected TYPE=START-END, got {value}"))?;
    let break_type = BreakType::parse(kind.trim())
        .ok_or_else(|| format!("unknown break type: {kind}"))?;
    let (start, end) = range
        .split_once('-')
        .ok_or_else(|| format!("expected START-END, got {range}"))?;
    let start = parse_time_of_day(start).map_err(|e| e.to_string())?;
    let end = parse_time_of_day(end).map_err(|e| e.to_string())?;
    Ok(PlannedBreak::new(break_type, start, end))
}

pub async fn run(action: PlanAction) -> CliResult {
    match action {
        PlanAction::Propose { staff } => {
            let plan = with_engine(|engine| async move { engine.propose_breaks(&staff).await }).await?;
            print_json(&plan)
        }
        PlanAction::Commit { staff, breaks } => {
            let rows = with_engine(|engine| async move {
                let mut plan = engine.propose_breaks(&staff).await?;
                if !breaks.is_empty() {
                    plan.breaks = breaks;
                }
                engine.schedule_breaks(&staff, plan).await
            })
            .await?;
            print_json(&rows)
        }
        PlanAction::Skip { staff } => {
            let entry = with_engine(|engine| async move { engine.skip_breaks(&staff).await }).await?;
            print_json(&entry)
        }
    }
}
