//! Read-only commands: listings, inspection, stats, limits

use anyhow::Result;
use dockhand_core::{ContainerService, PageRequest, ResourceKind};
use dockhand_engine::ContainerStatus;

use super::now;
use crate::output::{self, format_bytes, OutputFormat};

/// Listing filters shared by every `ls`-style command
#[derive(Debug, Clone)]
pub struct ListArgs {
    pub page: usize,
    pub page_size: usize,
    pub name: Option<String>,
}

impl ListArgs {
    fn request(&self) -> PageRequest {
        let req = PageRequest::new(self.page, self.page_size);
        match &self.name {
            Some(name) => req.with_name(name.clone()),
            None => req,
        }
    }
}

/// List containers
pub async fn ps(
    svc: &ContainerService,
    args: &ListArgs,
    state: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    let mut req = args.request();
    if let Some(state) = state {
        req = req.with_state(ContainerStatus::from(state));
    }
    let page = svc.page_containers(&req).await?;
    match format {
        OutputFormat::Json => output::print_json(&page)?,
        OutputFormat::Table => output::print_containers(&page, now()),
    }
    Ok(())
}

pub async fn list_networks(svc: &ContainerService, args: &ListArgs, format: OutputFormat) -> Result<()> {
    let page = svc.page_networks(&args.request()).await?;
    match format {
        OutputFormat::Json => output::print_json(&page)?,
        OutputFormat::Table => output::print_networks(&page),
    }
    Ok(())
}

pub async fn list_volumes(svc: &ContainerService, args: &ListArgs, format: OutputFormat) -> Result<()> {
    let page = svc.page_volumes(&args.request()).await?;
    match format {
        OutputFormat::Json => output::print_json(&page)?,
        OutputFormat::Table => output::print_volumes(&page),
    }
    Ok(())
}

pub async fn list_composes(svc: &ContainerService, args: &ListArgs, format: OutputFormat) -> Result<()> {
    let page = svc.page_composes(&args.request()).await?;
    match format {
        OutputFormat::Json => output::print_json(&page)?,
        OutputFormat::Table => output::print_composes(&page),
    }
    Ok(())
}

/// Full detail of one resource, always as JSON
pub async fn inspect(svc: &ContainerService, kind: ResourceKind, name: &str) -> Result<()> {
    let detail = svc.inspect(kind, name).await?;
    output::print_json(&detail)
}

/// One stats sample
pub async fn stats(svc: &ContainerService, name: &str, format: OutputFormat) -> Result<()> {
    let stats = svc.stats(name).await?;
    match format {
        OutputFormat::Json => output::print_json(&stats)?,
        OutputFormat::Table => {
            println!("CPU        {:.2}%", stats.cpu_percent);
            println!(
                "Memory     {} / {}",
                format_bytes(stats.mem_usage_bytes),
                format_bytes(stats.mem_limit_bytes)
            );
            println!(
                "Net I/O    {} / {}",
                format_bytes(stats.net_rx_bytes),
                format_bytes(stats.net_tx_bytes)
            );
            println!(
                "Block I/O  {} / {}",
                format_bytes(stats.block_read_bytes),
                format_bytes(stats.block_write_bytes)
            );
        }
    }
    Ok(())
}

/// Host ceilings for container limits
pub async fn limits(svc: &ContainerService, format: OutputFormat) -> Result<()> {
    let limit = svc.load_resource_limit().await?;
    match format {
        OutputFormat::Json => output::print_json(&limit)?,
        OutputFormat::Table => {
            println!("CPU cores  {}", limit.max_cpu_cores);
            println!("Memory     {}", format_bytes(limit.max_memory_bytes));
        }
    }
    Ok(())
}

/// Editable configuration of a container, as JSON accepted by `update`
pub async fn spec(svc: &ContainerService, name: &str) -> Result<()> {
    let spec = svc.container_spec(name).await?;
    output::print_json(&spec)
}

pub async fn volume_options(svc: &ContainerService, format: OutputFormat) -> Result<()> {
    let options = svc.list_volume_options().await?;
    match format {
        OutputFormat::Json => output::print_json(&options)?,
        OutputFormat::Table => {
            for option in &options {
                println!("{:<36} {}", option.name, option.driver);
            }
        }
    }
    Ok(())
}
