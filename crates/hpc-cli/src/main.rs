mod cli;
mod commands;
mod config;
mod logging;
mod output;

use std::io;

use anyhow::Context;
use clap::Parser;
use hpc_client::RemoteJobClient;

use crate::cli::{Args, Command};
use crate::commands::Settings;
use crate::config::{load_file_config, resolve_options, resolve_target};
use crate::logging::init_tracing;
use crate::output::Printer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _log_guard = init_tracing(args.log_dir.as_deref()).context("failed to init logging")?;

    let file = load_file_config(args.config.as_ref())?;
    let settings = Settings {
        project_root: args.project_root.clone().or(file.project_root.clone()),
        defaults: file.defaults.clone(),
    };
    let mut printer = Printer::new(io::stdout().lock(), args.json);

    if let Command::Render(job) = &args.command {
        return commands::render(&settings, job, &mut printer);
    }

    let target = resolve_target(&args, &file.connection)?;
    let options = resolve_options(&file)?;
    let destination = target.destination();
    let client = RemoteJobClient::connect(target, options)
        .await
        .with_context(|| format!("failed to connect to {destination}"))?;

    let result = commands::dispatch(&client, args.command, &settings, &mut printer).await;
    if let Err(err) = client.close().await {
        tracing::warn!(error = %err, "failed to close ssh session");
    }
    result
}
