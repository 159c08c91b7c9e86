pub mod config;
pub mod ids;
pub mod lock;
pub mod telemetry;

use anyhow::Context;
use concord::{Fixed, InstanceIdentity};
use config::{Action, Config};
use std::process::ExitCode;

/// Executes the validated command.
pub fn run(config: Config) -> anyhow::Result<ExitCode> {
    match config.action {
        Action::Ids { count, dated } => {
            let identity = resolve_identity(config.instance_id)?;
            ids::print_ids(&identity, count, dated)?;
            Ok(ExitCode::SUCCESS)
        }
        Action::Inspect { id, dated } => {
            ids::inspect(id, dated)?;
            Ok(ExitCode::SUCCESS)
        }
        Action::Lock(job) => {
            let identity = resolve_identity(config.instance_id)?;
            lock::run_locked(&identity, &job)
        }
    }
}

/// Pins the instance identity, from configuration or the host address.
fn resolve_identity(configured: Option<u32>) -> anyhow::Result<InstanceIdentity<Fixed>> {
    let instance = match configured {
        Some(instance) => instance,
        None => InstanceIdentity::host()
            .get()
            .context("cannot derive the instance identity; set INSTANCE_ID")?,
    };
    tracing::debug!(instance, "instance identity");
    Ok(InstanceIdentity::new(Fixed(instance)))
}
