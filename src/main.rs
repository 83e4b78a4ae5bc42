//! Binary entry point for the skylift CLI.

use std::io::{self, Write};
use std::process;

use clap::Parser;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use skylift::cli::{Cli, CreateCommand};
use skylift::{
    Ec2Config, Ec2Gateway, EffectiveConfig, ProcessBootstrapper, ProvisionError,
    ProvisionOrchestrator, ProvisionSummary,
};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Provision(#[from] ProvisionError),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    match cli {
        Cli::Create(command) => create_command(*command).await,
    }
}

async fn create_command(args: CreateCommand) -> Result<(), CliError> {
    let persisted =
        Ec2Config::load_without_cli_args().map_err(|err| CliError::Config(err.to_string()))?;
    let config = EffectiveConfig::resolve(&args, &persisted);

    let gateway = Ec2Gateway::new(&config.region).await;
    let bootstrapper = ProcessBootstrapper::from_config(&config);
    let orchestrator = ProvisionOrchestrator::new(gateway, bootstrapper);

    let summary = orchestrator.execute(&config).await?;
    report_summary(io::stdout(), &summary);
    Ok(())
}

fn report_summary(mut target: impl Write, summary: &ProvisionSummary) {
    writeln!(target, "Instance ID: {}", summary.server_id).ok();
    writeln!(target, "State: {}", summary.state.as_str()).ok();
    if let Some(public_ip) = summary.public_ip.as_deref() {
        writeln!(target, "Public IP: {public_ip}").ok();
    }
    if let Some(private_ip) = summary.private_ip.as_deref() {
        writeln!(target, "Private IP: {private_ip}").ok();
    }
    if let Some(public_dns) = summary.public_dns.as_deref() {
        writeln!(target, "Public DNS: {public_dns}").ok();
    }
    writeln!(target, "Bootstrapped via: {}", summary.bootstrap_address).ok();
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}
