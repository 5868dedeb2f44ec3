use anyhow::{Context, Result};
use std::process::ExitCode;

use crate::cli::{CommonConfigArgs, ListArgs};

pub fn run(common: &CommonConfigArgs, args: &ListArgs) -> Result<ExitCode> {
    let (_, host) = super::open_host(common)?;
    let names = host
        .provider()
        .list_names()
        .context("Failed to enumerate documents")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&names)?);
    } else {
        for name in &names {
            println!("{}", name);
        }
    }

    Ok(ExitCode::SUCCESS)
}
