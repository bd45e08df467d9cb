//! Harness CLI.

use std::io;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use frankendump_harness::event_log::{Event, EventLog};
use frankendump_harness::scenario;

#[derive(Parser)]
#[command(
    name = "frankendump-harness",
    about = "End-to-end FrankenDump scenarios over in-memory fixtures"
)]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Resolve a certificate chain from the fixture E-ticket save.
    Cert {
        /// Signature issuer to resolve, e.g. "Root-CA00000003-XS00000020".
        #[arg(long, default_value = "Root-CA00000003-XS00000020")]
        issuer: String,
    },
    /// Stream a deterministic payload across the loopback USB bus and
    /// verify the host-side hash.
    Loopback {
        /// Total payload size in bytes.
        #[arg(long, default_value_t = 0x20000)]
        size: u64,
        /// Chunk size in bytes (page-aligned buffer).
        #[arg(long, default_value_t = 0x1000)]
        chunk: usize,
    },
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut events = EventLog::new(io::stdout());
    match cli.command {
        CliCommand::Cert { issuer } => {
            events.emit(&Event {
                scenario: "cert",
                event: "started",
                detail: Some(serde_json::json!({ "issuer": issuer })),
            });
            let report = scenario::cert_report(&issuer)?;
            events.emit(&Event {
                scenario: "cert",
                event: "report",
                detail: Some(serde_json::to_value(&report)?),
            });
        }
        CliCommand::Loopback { size, chunk } => {
            events.emit(&Event {
                scenario: "loopback",
                event: "started",
                detail: Some(serde_json::json!({ "size": size, "chunk": chunk })),
            });
            let report = scenario::run_loopback(size, chunk)?;
            let verified = report.verified;
            events.emit(&Event {
                scenario: "loopback",
                event: "report",
                detail: Some(serde_json::to_value(&report)?),
            });
            if !verified {
                return Err("host-side hash does not match the streamed payload".into());
            }
        }
    }
    Ok(())
}
