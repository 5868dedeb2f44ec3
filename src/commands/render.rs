use anyhow::Result;
use std::process::ExitCode;

use crate::cli::{CommonConfigArgs, RenderArgs};
use crate::cli_utils::scriptorium_prefix;
use scriptorium::Template;

pub fn run(common: &CommonConfigArgs, args: &RenderArgs) -> Result<ExitCode> {
    let (_, host) = super::open_host(common)?;

    let artifact = match host.executable(&args.name) {
        Ok(artifact) => artifact,
        Err(err) => {
            eprintln!("{} {}", scriptorium_prefix(), err.report());
            return Ok(ExitCode::FAILURE);
        }
    };

    match artifact.program::<Template>() {
        Some(template) => {
            print!("{}", template.text());
            Ok(ExitCode::SUCCESS)
        }
        None => anyhow::bail!(
            "{} was built by a non-text adapter and cannot be rendered",
            args.name
        ),
    }
}
