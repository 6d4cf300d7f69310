//! Compose stack commands

use anyhow::{bail, Result};
use dockhand_core::{ComposeAction, ComposeFile, ComposeOperation, ComposeRequest, ContainerService};
use std::path::Path;
use tokio::sync::mpsc;

use super::read_input;
use crate::output::{self, OutputFormat};

/// Validate a definition file; needs no engine
pub fn compose_test(file: &Path, format: OutputFormat) -> Result<()> {
    let definition = read_input(file)?;
    let parsed = ComposeFile::parse(&definition)?;
    match format {
        OutputFormat::Json => output::print_json(&parsed)?,
        OutputFormat::Table => {
            let order = parsed.service_order()?;
            println!(
                "Definition is valid: {} service(s), {} network(s), {} volume(s)",
                parsed.services.len(),
                parsed.networks.len(),
                parsed.volumes.len()
            );
            println!("Start order: {}", order.join(" -> "));
        }
    }
    Ok(())
}

/// Create a stack, streaming progress lines as they happen
pub async fn compose_up(svc: &ContainerService, name: &str, file: &Path) -> Result<()> {
    let req = ComposeRequest {
        name: name.to_string(),
        definition: read_input(file)?,
    };

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let printer = tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            println!("{}", line);
        }
    });

    let result = svc.create_compose(&req, Some(&tx)).await;
    drop(tx);
    let _ = printer.await;

    let log = result?;
    if let Some(step) = log.failed_step {
        bail!("Stack {} stopped at: {}", name, step);
    }
    Ok(())
}

pub async fn compose_update(svc: &ContainerService, name: &str, file: &Path) -> Result<()> {
    let definition = read_input(file)?;
    svc.update_compose(name, &definition).await?;
    println!("Updated stack {}", name);
    Ok(())
}

pub async fn compose_operate(svc: &ContainerService, op: &ComposeOperation) -> Result<()> {
    svc.operate_compose(op).await?;
    let verb = match op.action {
        ComposeAction::Start => "Started",
        ComposeAction::Stop => "Stopped",
        ComposeAction::Restart => "Restarted",
        ComposeAction::Remove => "Removed",
    };
    println!("{} stack {}", verb, op.name);
    Ok(())
}
