//! Terminal rendering for command results

use anyhow::Result;
use dockhand_core::{ComposeSummary, Page};
use dockhand_engine::{ContainerSummary, NetworkSummary, VolumeSummary};
use serde::Serialize;

/// How results are printed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

impl OutputFormat {
    pub fn from_flag(json: bool) -> Self {
        if json {
            Self::Json
        } else {
            Self::Table
        }
    }
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Human-readable byte count (binary units)
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

/// Age of a unix timestamp relative to `now`, e.g. `3h`
pub fn format_age(created: i64, now: i64) -> String {
    let secs = (now - created).max(0);
    match secs {
        s if s < 60 => format!("{}s", s),
        s if s < 3600 => format!("{}m", s / 60),
        s if s < 86400 => format!("{}h", s / 3600),
        s => format!("{}d", s / 86400),
    }
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let cut: String = s.chars().take(width.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}

fn footer(shown: usize, total: usize) {
    if shown < total {
        println!("\n{} of {} shown", shown, total);
    }
}

pub fn print_containers(page: &Page<ContainerSummary>, now: i64) {
    if page.items.is_empty() {
        println!("No containers found.");
        return;
    }

    const NAME_WIDTH: usize = 28;
    const IMAGE_WIDTH: usize = 28;
    const STATUS_WIDTH: usize = 10;

    println!(
        "{:<NAME_WIDTH$} {:<IMAGE_WIDTH$} {:<STATUS_WIDTH$} {:>6}  STACK",
        "NAME", "IMAGE", "STATUS", "AGE"
    );
    for c in &page.items {
        println!(
            "{:<NAME_WIDTH$} {:<IMAGE_WIDTH$} {:<STATUS_WIDTH$} {:>6}  {}",
            truncate(&c.name, NAME_WIDTH),
            truncate(&c.image, IMAGE_WIDTH),
            c.status.to_string(),
            format_age(c.created, now),
            c.compose_project().unwrap_or("-"),
        );
    }
    footer(page.items.len(), page.total);
}

pub fn print_networks(page: &Page<NetworkSummary>) {
    if page.items.is_empty() {
        println!("No networks found.");
        return;
    }

    println!("{:<30} {:<10} {:<20} {:>10}", "NAME", "DRIVER", "SUBNET", "CONTAINERS");
    for n in &page.items {
        println!(
            "{:<30} {:<10} {:<20} {:>10}",
            truncate(&n.name, 30),
            n.driver,
            n.subnet.as_deref().unwrap_or("-"),
            n.containers.len(),
        );
    }
    footer(page.items.len(), page.total);
}

pub fn print_volumes(page: &Page<VolumeSummary>) {
    if page.items.is_empty() {
        println!("No volumes found.");
        return;
    }

    println!("{:<36} {:<10} MOUNTPOINT", "NAME", "DRIVER");
    for v in &page.items {
        println!("{:<36} {:<10} {}", truncate(&v.name, 36), v.driver, v.mountpoint);
    }
    footer(page.items.len(), page.total);
}

pub fn print_composes(page: &Page<ComposeSummary>) {
    if page.items.is_empty() {
        println!("No compose stacks found.");
        return;
    }

    println!("{:<24} {:<10} {:>8}  WORKDIR", "NAME", "STATUS", "RUNNING");
    for s in &page.items {
        let status = if s.is_running() { "running" } else { "stopped" };
        println!(
            "{:<24} {:<10} {:>8}  {}",
            truncate(&s.name, 24),
            status,
            format!("{}/{}", s.running, s.members.len()),
            s.working_dir.as_deref().unwrap_or("-"),
        );
    }
    footer(page.items.len(), page.total);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KiB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.0 GiB");
    }

    #[test]
    fn test_format_age() {
        assert_eq!(format_age(100, 130), "30s");
        assert_eq!(format_age(0, 7200), "2h");
        assert_eq!(format_age(0, 3 * 86400 + 5), "3d");
        assert_eq!(format_age(500, 100), "0s");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a-very-long-container-name", 8), "a-very-…");
    }
}
