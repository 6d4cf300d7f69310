//! Mutating commands: lifecycle operations, create/update, prune, networks, volumes

use anyhow::{bail, Result};
use dockhand_core::{
    BatchReport, ContainerService, ContainerSpec, NetworkSpec, OperationKind, OperationRequest,
    VolumeSpec,
};
use dockhand_engine::PruneKind;
use std::collections::HashMap;
use std::path::Path;

use super::read_json;
use crate::output::{self, format_bytes, OutputFormat};

/// Print a batch report; any failed member fails the command
fn finish_batch(report: &BatchReport, verb: &str, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => output::print_json(report)?,
        OutputFormat::Table => {
            for name in &report.succeeded {
                println!("{} {}", verb, name);
            }
            for failure in &report.failed {
                eprintln!("{} [{}]: {}", failure.name, failure.kind, failure.reason);
            }
        }
    }
    if !report.is_success() {
        bail!("{} of {} failed", report.failed.len(), report.failed.len() + report.succeeded.len());
    }
    Ok(())
}

/// Apply a lifecycle operation to one or more containers
pub async fn operate(
    svc: &ContainerService,
    operation: OperationKind,
    names: &[String],
    force: bool,
    retain_networks: bool,
    format: OutputFormat,
) -> Result<()> {
    let req = OperationRequest {
        names: names.to_vec(),
        operation,
        new_name: None,
        force,
        retain_networks,
    };
    let report = svc.operate_batch(&req).await?;
    finish_batch(&report, &format!("{}:", operation), format)
}

pub async fn rename(svc: &ContainerService, name: &str, new_name: &str) -> Result<()> {
    svc.operate(&OperationRequest::rename(name, new_name)).await?;
    println!("Renamed {} to {}", name, new_name);
    Ok(())
}

/// Create and start a container from a JSON spec
pub async fn create(svc: &ContainerService, spec_file: &Path) -> Result<()> {
    let spec: ContainerSpec = read_json(spec_file)?;
    svc.create_container(&spec).await?;
    println!("Created {}", spec.name);
    Ok(())
}

/// Apply a JSON spec to an existing container
pub async fn update(svc: &ContainerService, spec_file: &Path) -> Result<()> {
    let spec: ContainerSpec = read_json(spec_file)?;
    svc.update_container(&spec).await?;
    println!("Updated {}", spec.name);
    Ok(())
}

pub async fn clean_log(svc: &ContainerService, name: &str) -> Result<()> {
    svc.clean_container_log(name).await?;
    println!("Cleared log of {}", name);
    Ok(())
}

pub async fn prune(svc: &ContainerService, kind: PruneKind, format: OutputFormat) -> Result<()> {
    let report = svc.prune(kind).await?;
    match format {
        OutputFormat::Json => output::print_json(&report)?,
        OutputFormat::Table => println!(
            "Pruned {} {}, reclaimed {}",
            report.reclaimed_count,
            report.kind,
            format_bytes(report.space_reclaimed)
        ),
    }
    Ok(())
}

pub async fn network_create(svc: &ContainerService, spec: &NetworkSpec) -> Result<()> {
    let id = svc.create_network(spec).await?;
    println!("Created network {} ({})", spec.name, id);
    Ok(())
}

pub async fn network_rm(svc: &ContainerService, names: &[String], format: OutputFormat) -> Result<()> {
    let report = svc.delete_networks(names).await?;
    finish_batch(&report, "Removed network", format)
}

pub async fn volume_create(
    svc: &ContainerService,
    name: &str,
    driver: &str,
    labels: HashMap<String, String>,
    driver_opts: HashMap<String, String>,
) -> Result<()> {
    let spec = VolumeSpec {
        name: name.to_string(),
        driver: driver.to_string(),
        driver_opts,
        labels,
    };
    svc.create_volume(&spec).await?;
    println!("Created volume {}", name);
    Ok(())
}

pub async fn volume_rm(svc: &ContainerService, names: &[String], format: OutputFormat) -> Result<()> {
    let report = svc.delete_volumes(names).await?;
    finish_batch(&report, "Removed volume", format)
}
