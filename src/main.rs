use std::env;
use std::io;

use audit_ledger::csv::{OutcomeWriter, read_invocations};
use audit_ledger::{Engine, MemoryLedger};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

/// Invocations buffered between the csv reader and the engine.
const CHANNEL_CAPACITY: usize = 16;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("warn".parse().unwrap()))
        .with_writer(std::io::stderr)
        .init();

    let path = env::args()
        .nth(1)
        .expect("usage: audit-ledger <invocations.csv>");

    if !path.ends_with(".csv") {
        warn!(path, "input file seems to not be a csv file");
    }

    let rows = match read_invocations(path) {
        Ok(rows) => rows,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    let engine = Engine::new(MemoryLedger::new());
    let (inv_sender, inv_receiver) = tokio::sync::mpsc::channel(CHANNEL_CAPACITY);

    tokio::spawn(async move {
        for result in rows {
            match result {
                Ok(invocation) => {
                    if inv_sender.send(invocation).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("{e}");
                }
            }
        }
    });

    let stdout = io::stdout();
    let mut outcomes = OutcomeWriter::new(stdout.lock());
    engine
        .run(ReceiverStream::new(inv_receiver), |invocation, result| {
            if let Err(e) = outcomes.write(invocation, &result) {
                warn!(op = %invocation.op, "{e}");
            }
        })
        .await;

    if let Err(e) = outcomes.flush() {
        error!("{e}");
        std::process::exit(1);
    }
}
