use clap::Args;

use super::{print_json, with_engine, CliResult};

#[derive(Args)]
pub struct StatusArgs {
    /// Staff ID
    pub staff: String,
}

pub async fn run(args: StatusArgs) -> CliResult {
    let staff = args.staff;
    let snapshot = with_engine(|engine| async move { engine.snapshot(&staff).await }).await?;
    print_json(&snapshot)
}
