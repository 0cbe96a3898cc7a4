use std::collections::HashSet;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::Args;
use shiftwatch_core::{spawn_subscriber, Envelope, LogSubscriber, Subscribe};
use tracing::{info, warn};

use super::{open_engine, CliResult};

#[derive(Args)]
pub struct WatchArgs {
    /// Only print events for these staff members
    #[arg(long = "staff")]
    pub staff: Vec<String>,
    /// Stop after this many seconds instead of waiting for Ctrl-C
    #[arg(long)]
    pub seconds: Option<u64>,
}

/// Prints each envelope as one JSON line on stdout.
struct JsonLines {
    staff: HashSet<String>,
}

impl JsonLines {
    fn wants(&self, envelope: &Envelope) -> bool {
        self.staff.is_empty() || self.staff.contains(envelope.event.staff_id())
    }
}

#[async_trait]
impl Subscribe for JsonLines {
    async fn on_event(&self, envelope: &Envelope) {
        if !self.wants(envelope) {
            return;
        }
        match serde_json::to_string(envelope) {
            Ok(line) => {
                let mut out = std::io::stdout().lock();
                if writeln!(out, "{line}").and_then(|_| out.flush()).is_err() {
                    warn!(seq = envelope.seq, "stdout closed, dropping event");
                }
            }
            Err(e) => warn!(seq = envelope.seq, error = %e, "could not encode event"),
        }
    }

    fn name(&self) -> &'static str {
        "json-lines"
    }
}

pub async fn run(args: WatchArgs) -> CliResult {
    let engine = open_engine()?;
    let recovered = engine.recover()?;
    info!(recovered, "watching");

    let token = engine.token().child_token();
    let printer = Arc::new(JsonLines {
        staff: args.staff.into_iter().collect(),
    });
    let subscribers = [
        spawn_subscriber(engine.bus(), printer, token.clone()),
        spawn_subscriber(engine.bus(), Arc::new(LogSubscriber), token.clone()),
    ];
    let ticker = engine.run();

    match args.seconds {
        Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
        None => tokio::signal::ctrl_c().await?,
    }

    engine.shutdown().await;
    token.cancel();
    if let Err(e) = ticker.await {
        warn!(error = %e, "tick loop ended abnormally");
    }
    for handle in subscribers {
        if let Err(e) = handle.await {
            warn!(error = %e, "subscriber ended abnormally");
        }
    }
    Ok(())
}
