//! Compose definition model, validation and provisioning plan

use crate::service::is_valid_name;
use crate::{CoreError, Result};
use dockhand_engine::{
    CreateContainerConfig, CreateNetworkConfig, CreateVolumeConfig, MountConfig, MountType,
    PortConfig, ResourceLimits, COMPOSE_CONFIG_FILES_LABEL, COMPOSE_NETWORK_LABEL,
    COMPOSE_PROJECT_LABEL, COMPOSE_SERVICE_LABEL, COMPOSE_VOLUME_LABEL, COMPOSE_WORKDIR_LABEL,
};
use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::marker::PhantomData;
use std::path::Path;

/// Name of the network services join when they list none
pub const DEFAULT_NETWORK: &str = "default";

/// A parsed compose definition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComposeFile {
    /// Stack name pinned by the definition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "unique_map")]
    pub services: BTreeMap<String, ServiceDef>,
    #[serde(default, deserialize_with = "unique_map")]
    pub networks: BTreeMap<String, Option<NetworkDef>>,
    #[serde(default, deserialize_with = "unique_map")]
    pub volumes: BTreeMap<String, Option<VolumeDef>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceDef {
    pub image: Option<String>,
    pub container_name: Option<String>,
    pub command: Option<CommandLine>,
    pub entrypoint: Option<CommandLine>,
    pub environment: Option<KeyValues>,
    pub labels: Option<KeyValues>,
    pub ports: Vec<PortEntry>,
    pub volumes: Vec<MountEntry>,
    pub networks: Option<ServiceNetworks>,
    pub depends_on: Option<DependsOn>,
    pub restart: Option<String>,
    pub hostname: Option<String>,
    pub working_dir: Option<String>,
    pub privileged: bool,
    pub tty: bool,
    pub stdin_open: bool,
    pub cpus: Option<Scalar>,
    pub mem_limit: Option<Scalar>,
}

/// YAML scalar that may be written as a bool, number or string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl std::fmt::Display for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Int(i) => write!(f, "{}", i),
            Scalar::Float(x) => write!(f, "{}", x),
            Scalar::Str(s) => write!(f, "{}", s),
        }
    }
}

/// `command:` / `entrypoint:` in shell or exec form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandLine {
    Shell(String),
    Exec(Vec<String>),
}

impl CommandLine {
    pub fn to_args(&self) -> std::result::Result<Vec<String>, String> {
        match self {
            CommandLine::Exec(args) => Ok(args.clone()),
            CommandLine::Shell(line) => shell_words::split(line).map_err(|e| e.to_string()),
        }
    }
}

/// `environment:` / `labels:` as a `KEY=value` list or a mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyValues {
    List(Vec<String>),
    Map(BTreeMap<String, Option<Scalar>>),
}

impl KeyValues {
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        match self {
            KeyValues::List(items) => items
                .iter()
                .map(|item| match item.split_once('=') {
                    Some((k, v)) => (k.to_string(), v.to_string()),
                    None => (item.clone(), String::new()),
                })
                .collect(),
            KeyValues::Map(map) => map
                .iter()
                .map(|(k, v)| {
                    (
                        k.clone(),
                        v.as_ref().map(|v| v.to_string()).unwrap_or_default(),
                    )
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PortEntry {
    Number(u32),
    Short(String),
    Long(LongPort),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LongPort {
    pub target: u16,
    #[serde(default)]
    pub published: Option<Scalar>,
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub host_ip: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MountEntry {
    Short(String),
    Long(LongMount),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LongMount {
    #[serde(rename = "type", default)]
    pub mount_type: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    pub target: String,
    #[serde(default)]
    pub read_only: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServiceNetworks {
    List(Vec<String>),
    Map(BTreeMap<String, Option<ServiceNetworkDef>>),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceNetworkDef {
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependsOn {
    List(Vec<String>),
    Map(BTreeMap<String, serde_yaml::Value>),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkDef {
    pub driver: Option<String>,
    pub external: bool,
    pub name: Option<String>,
    pub ipam: Option<IpamDef>,
    pub labels: Option<KeyValues>,
    pub driver_opts: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IpamDef {
    pub config: Vec<IpamPool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IpamPool {
    pub subnet: Option<String>,
    pub gateway: Option<String>,
    pub ip_range: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeDef {
    pub driver: Option<String>,
    pub external: bool,
    pub name: Option<String>,
    pub driver_opts: BTreeMap<String, String>,
    pub labels: Option<KeyValues>,
}

/// Mapping that rejects repeated keys instead of keeping the last one
struct UniqueMap<V>(BTreeMap<String, V>);

impl<'de, V: Deserialize<'de>> Deserialize<'de> for UniqueMap<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct UniqueVisitor<V>(PhantomData<V>);

        impl<'de, V: Deserialize<'de>> Visitor<'de> for UniqueVisitor<V> {
            type Value = UniqueMap<V>;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a mapping with unique keys")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut access: A,
            ) -> std::result::Result<Self::Value, A::Error> {
                let mut map = BTreeMap::new();
                while let Some((key, value)) = access.next_entry::<String, V>()? {
                    if map.contains_key(&key) {
                        return Err(de::Error::custom(format!("duplicate key `{}`", key)));
                    }
                    map.insert(key, value);
                }
                Ok(UniqueMap(map))
            }
        }

        deserializer.deserialize_map(UniqueVisitor(PhantomData))
    }
}

fn unique_map<'de, D, V>(deserializer: D) -> std::result::Result<BTreeMap<String, V>, D::Error>
where
    D: Deserializer<'de>,
    V: Deserialize<'de>,
{
    let map: Option<UniqueMap<V>> = Option::deserialize(deserializer)?;
    Ok(map.map(|m| m.0).unwrap_or_default())
}

/// Stack names follow the engine's project naming: `[a-z0-9][a-z0-9_-]*`
pub fn is_valid_stack_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c.is_ascii_digit() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
}

fn invalid(msg: impl Into<String>) -> CoreError {
    CoreError::ComposeParse(msg.into())
}

impl ServiceDef {
    /// Network keys this service joins, with per-network aliases
    pub fn network_keys(&self) -> Vec<(String, Vec<String>)> {
        match &self.networks {
            None => vec![(DEFAULT_NETWORK.to_string(), Vec::new())],
            Some(ServiceNetworks::List(names)) => {
                let mut names: Vec<_> = names.iter().map(|n| (n.clone(), Vec::new())).collect();
                names.sort();
                names
            }
            Some(ServiceNetworks::Map(map)) => map
                .iter()
                .map(|(k, v)| (k.clone(), v.clone().unwrap_or_default().aliases))
                .collect(),
        }
    }

    pub fn dependencies(&self) -> Vec<String> {
        match &self.depends_on {
            None => Vec::new(),
            Some(DependsOn::List(names)) => names.clone(),
            Some(DependsOn::Map(map)) => map.keys().cloned().collect(),
        }
    }

    fn port_configs(&self) -> std::result::Result<Vec<PortConfig>, String> {
        let mut ports = Vec::new();
        for entry in &self.ports {
            ports.extend(parse_port(entry)?);
        }
        Ok(ports)
    }

    fn mount_specs(&self) -> std::result::Result<Vec<MountSpec>, String> {
        self.volumes.iter().map(parse_mount).collect()
    }

    fn limits(&self) -> std::result::Result<ResourceLimits, String> {
        let mut limits = ResourceLimits::default();
        if let Some(cpus) = &self.cpus {
            let cpus: f64 = match cpus {
                Scalar::Int(i) => *i as f64,
                Scalar::Float(f) => *f,
                Scalar::Str(s) => s
                    .trim()
                    .parse()
                    .map_err(|_| format!("invalid cpus value {:?}", s))?,
                Scalar::Bool(_) => return Err("invalid cpus value".to_string()),
            };
            if cpus <= 0.0 {
                return Err(format!("cpus must be positive, got {}", cpus));
            }
            limits.nano_cpus = (cpus * 1e9).round() as i64;
        }
        if let Some(mem) = &self.mem_limit {
            limits.memory_bytes = parse_size(&mem.to_string())?;
        }
        Ok(limits)
    }
}

/// Mount as written, before volume names are scoped to the stack
#[derive(Debug, Clone, PartialEq)]
struct MountSpec {
    kind: MountType,
    /// Path for binds, stack volume key for volumes, empty for anonymous
    source: String,
    target: String,
    read_only: bool,
}

fn is_path_source(source: &str) -> bool {
    source.starts_with('/') || source.starts_with('.') || source.starts_with('~')
}

fn parse_mount(entry: &MountEntry) -> std::result::Result<MountSpec, String> {
    let spec = match entry {
        MountEntry::Short(text) => {
            let parts: Vec<&str> = text.split(':').collect();
            let (source, target, mode) = match parts.as_slice() {
                [target] => ("", *target, ""),
                [source, target] => (*source, *target, ""),
                [source, target, mode] => (*source, *target, *mode),
                _ => return Err(format!("invalid volume spec {:?}", text)),
            };
            let kind = if is_path_source(source) {
                MountType::Bind
            } else {
                MountType::Volume
            };
            MountSpec {
                kind,
                source: source.to_string(),
                target: target.to_string(),
                read_only: mode.split(',').any(|m| m == "ro"),
            }
        }
        MountEntry::Long(long) => {
            let source = long.source.clone().unwrap_or_default();
            let kind = match long.mount_type.as_deref() {
                Some(t) => MountType::from(t),
                None if is_path_source(&source) => MountType::Bind,
                None => MountType::Volume,
            };
            MountSpec {
                kind,
                source,
                target: long.target.clone(),
                read_only: long.read_only,
            }
        }
    };

    if !spec.target.starts_with('/') {
        return Err(format!(
            "mount target {:?} must be an absolute path",
            spec.target
        ));
    }
    if spec.kind == MountType::Bind && spec.source.is_empty() {
        return Err(format!("bind mount for {} needs a source", spec.target));
    }
    Ok(spec)
}

fn parse_port_number(text: &str) -> std::result::Result<u16, String> {
    match text.trim().parse::<u16>() {
        Ok(0) | Err(_) => Err(format!("invalid port {:?}", text)),
        Ok(p) => Ok(p),
    }
}

fn parse_port_range(text: &str) -> std::result::Result<(u16, u16), String> {
    match text.split_once('-') {
        Some((start, end)) => {
            let (start, end) = (parse_port_number(start)?, parse_port_number(end)?);
            if start > end {
                return Err(format!("invalid port range {:?}", text));
            }
            Ok((start, end))
        }
        None => {
            let port = parse_port_number(text)?;
            Ok((port, port))
        }
    }
}

/// Expand one `ports:` entry into engine port bindings
pub(crate) fn parse_port(entry: &PortEntry) -> std::result::Result<Vec<PortConfig>, String> {
    match entry {
        PortEntry::Number(n) => {
            let port = u16::try_from(*n)
                .ok()
                .filter(|p| *p > 0)
                .ok_or_else(|| format!("invalid port {}", n))?;
            Ok(vec![PortConfig {
                host_port: None,
                container_port: port,
                protocol: "tcp".to_string(),
                host_ip: None,
            }])
        }
        PortEntry::Long(long) => {
            if long.target == 0 {
                return Err("port target must be greater than zero".to_string());
            }
            let host_port = match &long.published {
                None => None,
                Some(p) => Some(parse_port_number(&p.to_string())?),
            };
            Ok(vec![PortConfig {
                host_port,
                container_port: long.target,
                protocol: long.protocol.clone().unwrap_or_else(|| "tcp".to_string()),
                host_ip: long.host_ip.clone(),
            }])
        }
        PortEntry::Short(text) => {
            let (body, protocol) = match text.rsplit_once('/') {
                Some((body, proto)) => (body, proto.to_lowercase()),
                None => (text.as_str(), "tcp".to_string()),
            };
            if !matches!(protocol.as_str(), "tcp" | "udp" | "sctp") {
                return Err(format!("unknown protocol in port {:?}", text));
            }

            let parts: Vec<&str> = body.rsplitn(3, ':').collect();
            let (host_ip, host, container) = match parts.as_slice() {
                [container] => (None, None, *container),
                [container, host] => (None, Some(*host), *container),
                [container, host, ip] => (Some(ip.to_string()), Some(*host), *container),
                _ => return Err(format!("invalid port {:?}", text)),
            };

            let (c_start, c_end) = parse_port_range(container)?;
            let host_range = match host {
                Some(h) if !h.is_empty() => Some(parse_port_range(h)?),
                _ => None,
            };
            if let Some((h_start, h_end)) = host_range {
                if h_end - h_start != c_end - c_start {
                    return Err(format!("port ranges in {:?} differ in length", text));
                }
            }

            Ok((0..=(c_end - c_start))
                .map(|offset| PortConfig {
                    host_port: host_range.map(|(h, _)| h + offset),
                    container_port: c_start + offset,
                    protocol: protocol.clone(),
                    host_ip: host_ip.clone(),
                })
                .collect())
        }
    }
}

/// Parse `512m`, `1g`, `1024` into bytes (binary units)
pub(crate) fn parse_size(text: &str) -> std::result::Result<i64, String> {
    let lower = text.trim().to_lowercase();
    let split = lower
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(lower.len());
    let (number, unit) = lower.split_at(split);
    let value: f64 = number
        .parse()
        .map_err(|_| format!("invalid size {:?}", text))?;
    let multiplier: f64 = match unit.trim() {
        "" | "b" => 1.0,
        "k" | "kb" => 1024.0,
        "m" | "mb" => 1024.0 * 1024.0,
        "g" | "gb" => 1024.0 * 1024.0 * 1024.0,
        _ => return Err(format!("invalid size unit in {:?}", text)),
    };
    Ok((value * multiplier) as i64)
}

impl ComposeFile {
    /// Parse and validate a YAML definition
    pub fn parse(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Err(invalid("definition is empty"));
        }
        let file: ComposeFile = serde_yaml::from_str(text)?;
        file.validate()?;
        Ok(file)
    }

    /// Structural checks that need no engine
    pub fn validate(&self) -> Result<()> {
        if let Some(name) = &self.name {
            if !is_valid_stack_name(name) {
                return Err(invalid(format!("invalid stack name {:?}", name)));
            }
        }
        if self.services.is_empty() {
            return Err(invalid("at least one service is required"));
        }
        for key in self.networks.keys().chain(self.volumes.keys()) {
            if !is_valid_name(key) {
                return Err(invalid(format!("invalid resource key {:?}", key)));
            }
        }

        let mut container_names = HashSet::new();
        for (name, service) in &self.services {
            if !is_valid_name(name) {
                return Err(invalid(format!("invalid service name {:?}", name)));
            }
            match service.image.as_deref().map(str::trim) {
                Some(image) if !image.is_empty() => {}
                _ => return Err(invalid(format!("service {} has no image", name))),
            }
            if let Some(container_name) = &service.container_name {
                if !is_valid_name(container_name) {
                    return Err(invalid(format!(
                        "service {}: invalid container_name {:?}",
                        name, container_name
                    )));
                }
                if !container_names.insert(container_name.clone()) {
                    return Err(invalid(format!(
                        "container_name {} is used by more than one service",
                        container_name
                    )));
                }
            }
            for line in [&service.command, &service.entrypoint].into_iter().flatten() {
                line.to_args()
                    .map_err(|e| invalid(format!("service {}: {}", name, e)))?;
            }
            service
                .port_configs()
                .map_err(|e| invalid(format!("service {}: {}", name, e)))?;
            service
                .limits()
                .map_err(|e| invalid(format!("service {}: {}", name, e)))?;

            for mount in service
                .mount_specs()
                .map_err(|e| invalid(format!("service {}: {}", name, e)))?
            {
                if mount.kind == MountType::Volume
                    && !mount.source.is_empty()
                    && !self.volumes.contains_key(&mount.source)
                {
                    return Err(invalid(format!(
                        "service {} uses undeclared volume {}",
                        name, mount.source
                    )));
                }
            }
            for (network, _) in service.network_keys() {
                if network != DEFAULT_NETWORK && !self.networks.contains_key(&network) {
                    return Err(invalid(format!(
                        "service {} uses undeclared network {}",
                        name, network
                    )));
                }
            }
            for dep in service.dependencies() {
                if dep == *name {
                    return Err(invalid(format!("service {} depends on itself", name)));
                }
                if !self.services.contains_key(&dep) {
                    return Err(invalid(format!(
                        "service {} depends on unknown service {}",
                        name, dep
                    )));
                }
            }
        }

        self.service_order()?;
        Ok(())
    }

    /// Services ordered so each comes after everything it depends on
    pub fn service_order(&self) -> Result<Vec<String>> {
        let mut pending: BTreeMap<&str, BTreeSet<String>> = self
            .services
            .iter()
            .map(|(name, s)| (name.as_str(), s.dependencies().into_iter().collect()))
            .collect();
        let mut order = Vec::with_capacity(pending.len());

        while !pending.is_empty() {
            let ready: Vec<&str> = pending
                .iter()
                .filter(|(_, deps)| deps.is_empty())
                .map(|(name, _)| *name)
                .collect();
            if ready.is_empty() {
                let stuck: Vec<&str> = pending.keys().copied().collect();
                return Err(invalid(format!(
                    "dependency cycle between services: {}",
                    stuck.join(", ")
                )));
            }
            for name in ready {
                pending.remove(name);
                for deps in pending.values_mut() {
                    deps.remove(name);
                }
                order.push(name.to_string());
            }
        }
        Ok(order)
    }

    /// Whether any service sits on the implicit default network
    fn uses_default_network(&self) -> bool {
        self.services
            .values()
            .any(|s| s.network_keys().iter().any(|(n, _)| n == DEFAULT_NETWORK))
    }

    /// Engine-level resources needed to bring the stack `stack` up
    pub(crate) fn plan(&self, stack: &str, files: Option<&StackFiles>) -> Result<StackPlan> {
        let mut base_labels = HashMap::from([(COMPOSE_PROJECT_LABEL.to_string(), stack.to_string())]);
        if let Some(files) = files {
            base_labels.insert(
                COMPOSE_WORKDIR_LABEL.to_string(),
                files.working_dir.to_string_lossy().into_owned(),
            );
            base_labels.insert(
                COMPOSE_CONFIG_FILES_LABEL.to_string(),
                files.definition.to_string_lossy().into_owned(),
            );
        }

        let mut networks = Vec::new();
        let mut network_names = HashMap::new();
        let mut declared: Vec<(String, NetworkDef)> = self
            .networks
            .iter()
            .map(|(k, v)| (k.clone(), v.clone().unwrap_or_default()))
            .collect();
        if self.uses_default_network() && !self.networks.contains_key(DEFAULT_NETWORK) {
            declared.push((DEFAULT_NETWORK.to_string(), NetworkDef::default()));
        }
        for (key, def) in declared {
            let name = match (&def.name, def.external) {
                (Some(name), _) => name.clone(),
                (None, true) => key.clone(),
                (None, false) => format!("{}_{}", stack, key),
            };
            let mut labels = HashMap::from([
                (COMPOSE_PROJECT_LABEL.to_string(), stack.to_string()),
                (COMPOSE_NETWORK_LABEL.to_string(), key.clone()),
            ]);
            labels.extend(def.labels.iter().flat_map(KeyValues::to_pairs));
            let pool = def
                .ipam
                .as_ref()
                .and_then(|ipam| ipam.config.first().cloned())
                .unwrap_or_default();

            network_names.insert(key.clone(), name.clone());
            networks.push(PlannedNetwork {
                external: def.external,
                config: CreateNetworkConfig {
                    name,
                    driver: def.driver.clone().unwrap_or_else(|| "bridge".to_string()),
                    subnet: pool.subnet,
                    gateway: pool.gateway,
                    ip_range: pool.ip_range,
                    labels,
                    options: def.driver_opts.clone().into_iter().collect(),
                },
            });
        }

        let mut volumes = Vec::new();
        let mut volume_names = HashMap::new();
        for (key, def) in &self.volumes {
            let def = def.clone().unwrap_or_default();
            let name = match (&def.name, def.external) {
                (Some(name), _) => name.clone(),
                (None, true) => key.clone(),
                (None, false) => format!("{}_{}", stack, key),
            };
            let mut labels = HashMap::from([
                (COMPOSE_PROJECT_LABEL.to_string(), stack.to_string()),
                (COMPOSE_VOLUME_LABEL.to_string(), key.clone()),
            ]);
            labels.extend(def.labels.iter().flat_map(KeyValues::to_pairs));

            volume_names.insert(key.clone(), name.clone());
            volumes.push(PlannedVolume {
                external: def.external,
                config: CreateVolumeConfig {
                    name,
                    driver: def.driver.clone().unwrap_or_else(|| "local".to_string()),
                    driver_opts: def.driver_opts.clone().into_iter().collect(),
                    labels,
                },
            });
        }

        let mut services = Vec::new();
        let mut taken = HashSet::new();
        for service_name in self.service_order()? {
            let Some(def) = self.services.get(&service_name) else {
                continue;
            };
            let container_name = def
                .container_name
                .clone()
                .unwrap_or_else(|| format!("{}-{}-1", stack, service_name));
            if !taken.insert(container_name.clone()) {
                return Err(invalid(format!(
                    "container name {} is used by more than one service",
                    container_name
                )));
            }

            let mut labels: HashMap<String, String> = def
                .labels
                .iter()
                .flat_map(KeyValues::to_pairs)
                .collect();
            labels.extend(base_labels.clone());
            labels.insert(COMPOSE_SERVICE_LABEL.to_string(), service_name.clone());

            let mounts = def
                .mount_specs()
                .map_err(invalid)?
                .into_iter()
                .map(|m| MountConfig {
                    source: match m.kind {
                        MountType::Volume => volume_names
                            .get(&m.source)
                            .cloned()
                            .unwrap_or(m.source),
                        _ => match files {
                            Some(files) if m.source.starts_with('.') => files
                                .working_dir
                                .join(&m.source)
                                .to_string_lossy()
                                .into_owned(),
                            _ => m.source,
                        },
                    },
                    mount_type: m.kind,
                    target: m.target,
                    read_only: m.read_only,
                })
                .collect();

            let mut attachments: Vec<(String, Vec<String>)> = def
                .network_keys()
                .into_iter()
                .filter_map(|(key, aliases)| {
                    let name = network_names.get(&key)?.clone();
                    let mut all = vec![service_name.clone()];
                    all.extend(aliases);
                    Some((name, all))
                })
                .collect();
            let (network_mode, network_aliases) = if attachments.is_empty() {
                (None, Vec::new())
            } else {
                let (name, aliases) = attachments.remove(0);
                (Some(name), aliases)
            };

            let env = def
                .environment
                .iter()
                .flat_map(KeyValues::to_pairs)
                .collect();

            services.push(PlannedService {
                service: service_name.clone(),
                extra_networks: attachments,
                config: CreateContainerConfig {
                    image: def.image.clone().unwrap_or_default(),
                    name: Some(container_name),
                    cmd: def.command.as_ref().map(CommandLine::to_args).transpose().map_err(invalid)?,
                    entrypoint: def
                        .entrypoint
                        .as_ref()
                        .map(CommandLine::to_args)
                        .transpose()
                        .map_err(invalid)?,
                    env,
                    working_dir: def.working_dir.clone(),
                    mounts,
                    ports: def.port_configs().map_err(invalid)?,
                    labels,
                    hostname: def.hostname.clone(),
                    tty: def.tty,
                    stdin_open: def.stdin_open,
                    network_mode,
                    network_aliases,
                    restart_policy: def.restart.clone(),
                    resources: def.limits().map_err(invalid)?,
                    privileged: def.privileged,
                },
            });
        }

        Ok(StackPlan {
            networks,
            volumes,
            services,
        })
    }
}

/// Where a stack's definition lives on disk
#[derive(Debug, Clone)]
pub(crate) struct StackFiles {
    pub working_dir: std::path::PathBuf,
    pub definition: std::path::PathBuf,
}

impl StackFiles {
    pub fn new(definition: &Path) -> Self {
        Self {
            working_dir: definition
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default(),
            definition: definition.to_path_buf(),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct PlannedNetwork {
    pub external: bool,
    pub config: CreateNetworkConfig,
}

#[derive(Debug, Clone)]
pub(crate) struct PlannedVolume {
    pub external: bool,
    pub config: CreateVolumeConfig,
}

#[derive(Debug, Clone)]
pub(crate) struct PlannedService {
    pub service: String,
    pub config: CreateContainerConfig,
    /// Networks joined after create, with aliases
    pub extra_networks: Vec<(String, Vec<String>)>,
}

impl PlannedService {
    pub fn container_name(&self) -> &str {
        self.config.name.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub(crate) struct StackPlan {
    pub networks: Vec<PlannedNetwork>,
    pub volumes: Vec<PlannedVolume>,
    pub services: Vec<PlannedService>,
}
