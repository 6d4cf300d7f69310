//! dockhand - container control plane CLI

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use dockhand_cli::commands::{self, parse_key_value, ListArgs};
use dockhand_cli::output::OutputFormat;
use dockhand_config::GlobalConfig;
use dockhand_core::{
    ComposeAction, ComposeOperation, ContainerService, LogRequest, NetworkSpec, OperationKind,
    ResourceKind,
};
use dockhand_engine::{create_engine, PruneKind};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "dockhand")]
#[command(author, version, about = "Container control plane", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Config file (defaults to the user config directory)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone)]
struct PageArgs {
    /// Page number, starting at 1
    #[arg(long, default_value_t = 1)]
    page: usize,
    /// Items per page
    #[arg(long, default_value_t = 50)]
    page_size: usize,
    /// Case-insensitive name filter
    #[arg(long)]
    name: Option<String>,
}

impl From<PageArgs> for ListArgs {
    fn from(args: PageArgs) -> Self {
        ListArgs {
            page: args.page,
            page_size: args.page_size,
            name: args.name,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List containers
    Ps {
        #[command(flatten)]
        page: PageArgs,
        /// Only containers in this state (running, exited, paused, ...)
        #[arg(long)]
        state: Option<String>,
    },

    /// Show full detail of a container, network, volume or compose stack
    Inspect {
        kind: ResourceKind,
        name: String,
    },

    /// Show one resource usage sample of a container
    Stats { container: String },

    /// Show host CPU and memory ceilings
    Limits,

    /// Print the editable configuration of a container as JSON
    Spec { container: String },

    /// Create and start a container from a JSON spec (`-` for stdin)
    Create { spec: PathBuf },

    /// Apply a JSON spec to an existing container (`-` for stdin)
    Update { spec: PathBuf },

    /// Apply a lifecycle operation (start, stop, restart, pause, unpause, kill, remove)
    Op {
        operation: OperationKind,
        #[arg(required = true)]
        containers: Vec<String>,
        /// Remove even if running
        #[arg(short, long)]
        force: bool,
        /// Keep stack networks when removing the last member of a stack
        #[arg(long)]
        retain_networks: bool,
    },

    /// Rename a container
    Rename { container: String, new_name: String },

    /// Truncate a container's log file
    CleanLog { container: String },

    /// Reclaim unused containers, images, volumes or networks
    Prune { kind: PruneKind },

    /// Manage networks
    Network {
        #[command(subcommand)]
        command: NetworkCommands,
    },

    /// Manage volumes
    Volume {
        #[command(subcommand)]
        command: VolumeCommands,
    },

    /// Manage compose stacks
    Compose {
        #[command(subcommand)]
        command: ComposeCommands,
    },

    /// Stream a container's log
    Logs {
        container: String,
        /// all, a duration (30m, 24h, 7d), an RFC 3339 timestamp or unix seconds
        #[arg(long)]
        since: Option<String>,
        /// Only the last N lines
        #[arg(long)]
        tail: Option<u64>,
        /// Keep streaming new lines
        #[arg(short, long)]
        follow: bool,
    },

    /// Show the effective configuration
    Config,
}

#[derive(Subcommand)]
enum NetworkCommands {
    /// List networks
    Ls {
        #[command(flatten)]
        page: PageArgs,
    },
    /// Create a network
    Create {
        name: String,
        #[arg(long, default_value = "bridge")]
        driver: String,
        #[arg(long)]
        subnet: Option<String>,
        #[arg(long)]
        gateway: Option<String>,
        #[arg(long)]
        ip_range: Option<String>,
        /// KEY=value, repeatable
        #[arg(long = "label", value_parser = parse_key_value)]
        labels: Vec<(String, String)>,
        /// Driver option KEY=value, repeatable
        #[arg(long = "opt", value_parser = parse_key_value)]
        options: Vec<(String, String)>,
    },
    /// Remove networks
    Rm {
        #[arg(required = true)]
        names: Vec<String>,
    },
}

#[derive(Subcommand)]
enum VolumeCommands {
    /// List volumes
    Ls {
        #[command(flatten)]
        page: PageArgs,
    },
    /// Volume names and drivers, for mount pickers
    Options,
    /// Create a volume
    Create {
        name: String,
        #[arg(long, default_value = "local")]
        driver: String,
        /// KEY=value, repeatable
        #[arg(long = "label", value_parser = parse_key_value)]
        labels: Vec<(String, String)>,
        /// Driver option KEY=value, repeatable
        #[arg(long = "opt", value_parser = parse_key_value)]
        options: Vec<(String, String)>,
    },
    /// Remove volumes
    Rm {
        #[arg(required = true)]
        names: Vec<String>,
    },
}

#[derive(Subcommand)]
enum ComposeCommands {
    /// List compose stacks
    Ls {
        #[command(flatten)]
        page: PageArgs,
    },
    /// Validate a definition without touching the engine
    Test { file: PathBuf },
    /// Create a stack from a definition
    Up { name: String, file: PathBuf },
    /// Converge a stack onto a new definition
    Update { name: String, file: PathBuf },
    /// Start every member
    Start { name: String },
    /// Stop every member
    Stop { name: String },
    /// Restart every member
    Restart { name: String },
    /// Remove every member and the stack networks
    Down {
        name: String,
        /// Keep stack networks
        #[arg(long)]
        retain_networks: bool,
        /// Also remove the stack's named volumes
        #[arg(long)]
        volumes: bool,
        /// Also delete the stored definition
        #[arg(long)]
        remove_files: bool,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config = match &cli.config {
        Some(path) => GlobalConfig::load_from(path)?,
        None => GlobalConfig::load().unwrap_or_default(),
    };
    config.validate()?;
    let format = OutputFormat::from_flag(cli.json);

    // Commands that need no engine
    match &cli.command {
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
            return Ok(());
        }
        Commands::Compose {
            command: ComposeCommands::Test { file },
        } => return commands::compose_test(file, format),
        _ => {}
    }

    let engine = create_engine(&config)
        .await
        .context("Container engine unavailable")?;
    let svc = ContainerService::from_global(Arc::new(engine), &config);

    match cli.command {
        Commands::Ps { page, state } => {
            commands::ps(&svc, &page.into(), state.as_deref(), format).await?
        }
        Commands::Inspect { kind, name } => commands::inspect(&svc, kind, &name).await?,
        Commands::Stats { container } => commands::stats(&svc, &container, format).await?,
        Commands::Limits => commands::limits(&svc, format).await?,
        Commands::Spec { container } => commands::spec(&svc, &container).await?,
        Commands::Create { spec } => commands::create(&svc, &spec).await?,
        Commands::Update { spec } => commands::update(&svc, &spec).await?,
        Commands::Op {
            operation,
            containers,
            force,
            retain_networks,
        } => {
            commands::operate(&svc, operation, &containers, force, retain_networks, format).await?
        }
        Commands::Rename {
            container,
            new_name,
        } => commands::rename(&svc, &container, &new_name).await?,
        Commands::CleanLog { container } => commands::clean_log(&svc, &container).await?,
        Commands::Prune { kind } => commands::prune(&svc, kind, format).await?,
        Commands::Network { command } => match command {
            NetworkCommands::Ls { page } => {
                commands::list_networks(&svc, &page.into(), format).await?
            }
            NetworkCommands::Create {
                name,
                driver,
                subnet,
                gateway,
                ip_range,
                labels,
                options,
            } => {
                let spec = NetworkSpec {
                    name,
                    driver,
                    subnet,
                    gateway,
                    ip_range,
                    labels: labels.into_iter().collect(),
                    options: options.into_iter().collect(),
                };
                commands::network_create(&svc, &spec).await?
            }
            NetworkCommands::Rm { names } => commands::network_rm(&svc, &names, format).await?,
        },
        Commands::Volume { command } => match command {
            VolumeCommands::Ls { page } => {
                commands::list_volumes(&svc, &page.into(), format).await?
            }
            VolumeCommands::Options => commands::volume_options(&svc, format).await?,
            VolumeCommands::Create {
                name,
                driver,
                labels,
                options,
            } => {
                commands::volume_create(
                    &svc,
                    &name,
                    &driver,
                    labels.into_iter().collect(),
                    options.into_iter().collect(),
                )
                .await?
            }
            VolumeCommands::Rm { names } => commands::volume_rm(&svc, &names, format).await?,
        },
        Commands::Compose { command } => match command {
            ComposeCommands::Ls { page } => {
                commands::list_composes(&svc, &page.into(), format).await?
            }
            ComposeCommands::Test { .. } => unreachable!(), // Handled above
            ComposeCommands::Up { name, file } => commands::compose_up(&svc, &name, &file).await?,
            ComposeCommands::Update { name, file } => {
                commands::compose_update(&svc, &name, &file).await?
            }
            ComposeCommands::Start { name } => {
                commands::compose_operate(&svc, &ComposeOperation::new(&name, ComposeAction::Start))
                    .await?
            }
            ComposeCommands::Stop { name } => {
                commands::compose_operate(&svc, &ComposeOperation::new(&name, ComposeAction::Stop))
                    .await?
            }
            ComposeCommands::Restart { name } => {
                commands::compose_operate(
                    &svc,
                    &ComposeOperation::new(&name, ComposeAction::Restart),
                )
                .await?
            }
            ComposeCommands::Down {
                name,
                retain_networks,
                volumes,
                remove_files,
            } => {
                let op = ComposeOperation {
                    retain_networks,
                    remove_volumes: volumes,
                    remove_files,
                    ..ComposeOperation::new(&name, ComposeAction::Remove)
                };
                commands::compose_operate(&svc, &op).await?
            }
        },
        Commands::Logs {
            container,
            since,
            tail,
            follow,
        } => {
            let req = LogRequest {
                container,
                since,
                tail,
                follow,
            };
            commands::logs(&svc, req).await?
        }
        Commands::Config => unreachable!(), // Handled above
    }

    Ok(())
}
