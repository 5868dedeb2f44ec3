use anyhow::{Context, Result};
use serde_json::json;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::info;

use crate::cli::{CommonConfigArgs, DefrostArgs};
use crate::cli_utils::scriptorium_prefix;
use scriptorium::{DefrostOptions, DefrostReport, Defroster, Interrupt};

const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

pub async fn run(common: &CommonConfigArgs, args: &DefrostArgs) -> Result<ExitCode> {
    let (loaded, host) = super::open_host(common)?;

    let concurrency = args
        .concurrency
        .filter(|n| *n > 0)
        .unwrap_or_else(|| loaded.config.defrost_concurrency());
    let background = args.background || !loaded.config.defrost.blocking;

    let interrupt = Interrupt::new();
    let options = DefrostOptions::default()
        .with_concurrency(concurrency)
        .blocking(!background)
        .with_interrupt(interrupt.clone());
    let defroster = Arc::new(Defroster::new(host));

    let report = if background {
        run_background(&defroster, options, &interrupt).await?
    } else {
        run_blocking(defroster, options, &interrupt).await?
    };

    if args.json {
        print_json(&report)?;
    } else {
        print_text(&report);
    }

    if report.has_failures() || report.interrupted {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

/// Blocking batch on the blocking pool; Ctrl+C releases the wait
async fn run_blocking(
    defroster: Arc<Defroster>,
    options: DefrostOptions,
    interrupt: &Interrupt,
) -> Result<DefrostReport> {
    let mut task = tokio::task::spawn_blocking(move || defroster.defrost(options));

    let joined = tokio::select! {
        joined = &mut task => joined,
        Ok(()) = signal::ctrl_c() => {
            info!("Received Ctrl+C, interrupting defrost...");
            interrupt.interrupt();
            task.await
        }
    };

    let handle = joined
        .context("Defrost task failed")?
        .context("Failed to enumerate documents")?;
    Ok(handle.report())
}

/// Non-blocking batch polled for progress until it finishes or Ctrl+C
async fn run_background(
    defroster: &Defroster,
    options: DefrostOptions,
    interrupt: &Interrupt,
) -> Result<DefrostReport> {
    let handle = defroster
        .defrost(options)
        .context("Failed to enumerate documents")?;
    let mut ticker = tokio::time::interval(PROGRESS_INTERVAL);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if handle.is_done() {
                    break;
                }
                let (completed, total) = handle.progress();
                eprintln!("{} defrosting {}/{}", scriptorium_prefix(), completed, total);
            }
            Ok(()) = signal::ctrl_c() => {
                info!("Received Ctrl+C, interrupting defrost...");
                interrupt.interrupt();
                handle.wait();
                break;
            }
        }
    }

    Ok(handle.report())
}

fn print_text(report: &DefrostReport) {
    let prefix = scriptorium_prefix();

    if report.interrupted {
        eprintln!(
            "{} Interrupted after {}/{} documents",
            prefix, report.completed, report.total
        );
    }

    for failure in &report.failures {
        eprintln!("{} ✗ {}", prefix, failure.error.report().trim_end());
    }

    println!(
        "✓ Defrosted {}/{} documents in {}ms ({} failed)",
        report.succeeded(),
        report.total,
        report.elapsed.as_millis(),
        report.failures.len()
    );
}

fn print_json(report: &DefrostReport) -> Result<()> {
    let failures: Vec<_> = report
        .failures
        .iter()
        .map(|failure| {
            json!({
                "document": failure.document,
                "kind": failure.error.kind().as_str(),
                "message": failure.error.message(),
                "stack": failure
                    .error
                    .stack()
                    .frames()
                    .iter()
                    .map(|frame| frame.to_string())
                    .collect::<Vec<_>>(),
            })
        })
        .collect();

    let value = json!({
        "total": report.total,
        "completed": report.completed,
        "succeeded": report.succeeded(),
        "interrupted": report.interrupted,
        "elapsed_ms": report.elapsed.as_millis() as u64,
        "failures": failures,
    });

    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}
