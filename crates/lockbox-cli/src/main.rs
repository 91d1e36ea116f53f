//! lockbox - lightweight chroot/WSL-backed container manager CLI

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "lockbox")]
#[command(author, version, about = "Lightweight root-fs isolated container manager", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build an image from a context directory
    Build {
        path: PathBuf,
        #[arg(short = 't', long)]
        tag: String,
    },

    /// Create and start a container
    Run {
        image: String,
        #[arg(trailing_var_arg = true)]
        cmd: Vec<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(short = 'p', long = "port")]
        ports: Vec<String>,
        #[arg(short = 'v', long = "volume")]
        volumes: Vec<String>,
        #[arg(short = 'e', long = "env")]
        env: Vec<String>,
        #[arg(short = 'd', long)]
        detach: bool,
        #[arg(long, default_value = "no")]
        restart: String,
        #[arg(short = 'l', long = "label")]
        labels: Vec<String>,
        #[arg(long)]
        network: Option<String>,
        #[arg(long, overrides_with = "no_service")]
        service: bool,
        #[arg(long)]
        no_service: bool,
    },

    /// Signal a container to stop
    Stop { ident: String },

    /// Remove and recreate a container with its existing record
    Restart { ident: String },

    /// Stop (if live) and destroy a container
    Rm { ident: String },

    /// Print a container's state record
    Inspect { ident: String },

    /// Run a command inside a container
    Exec {
        ident: String,
        #[arg(trailing_var_arg = true)]
        cmd: Vec<String>,
        #[arg(short = 'i', long)]
        interactive: bool,
        #[arg(short = 't', long)]
        tty: bool,
    },

    /// Tail a container's supervisor log
    Logs {
        ident: String,
        #[arg(short = 'f', long)]
        follow: bool,
    },

    /// List running containers
    Ps,

    /// List built image archives
    Images,

    /// Compose-style multi-container orchestration
    Create {
        #[command(subcommand)]
        action: CreateAction,
    },

    /// Supervisor entry point (hidden; re-invoked by `run`/host service)
    #[command(hide = true)]
    InternalDaemon { cid: String },

    /// Auto-update monitor entry point (hidden; re-invoked by `create up`)
    #[command(hide = true)]
    MonitorDaemon { manifest: String, project: String },
}

#[derive(Subcommand)]
enum CreateAction {
    /// Build dependency order, start services, inject DNS
    Up {
        #[arg(short = 'f', long, default_value = "lockbox-create.yml")]
        file: String,
        #[arg(long)]
        force_recreate: bool,
        #[arg(long)]
        no_recreate: bool,
        #[arg(long, default_value_t = true)]
        build: bool,
        #[arg(long)]
        no_build: bool,
        #[arg(long)]
        remove_orphans: bool,
    },

    /// Stop the monitor and tear down every service container
    Down {
        #[arg(short = 'f', long, default_value = "lockbox-create.yml")]
        file: String,
        #[arg(long, default_value = "none")]
        rmi: String,
        #[arg(long)]
        remove_orphans: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match cli.command {
        Commands::Build { path, tag } => commands::build(&path, &tag).await?,
        Commands::Run {
            image,
            cmd,
            name,
            ports,
            volumes,
            env,
            detach,
            restart,
            labels,
            network,
            service,
            no_service,
        } => {
            let service_enabled = service && !no_service;
            commands::run(image, cmd, name, ports, volumes, env, detach, restart, labels, network, service_enabled)
                .await?
        }
        Commands::Stop { ident } => commands::stop(&ident).await?,
        Commands::Restart { ident } => commands::restart(&ident).await?,
        Commands::Rm { ident } => commands::rm(&ident).await?,
        Commands::Inspect { ident } => commands::inspect(&ident).await?,
        Commands::Exec { ident, cmd, interactive, tty: _ } => commands::exec(&ident, cmd, interactive).await?,
        Commands::Logs { ident, follow } => commands::logs(&ident, follow).await?,
        Commands::Ps => commands::ps().await?,
        Commands::Images => commands::images().await?,
        Commands::Create { action } => match action {
            CreateAction::Up {
                file,
                force_recreate,
                no_recreate,
                build,
                no_build,
                remove_orphans,
            } => commands::up(file, force_recreate, no_recreate, build, no_build, remove_orphans).await?,
            CreateAction::Down { file, rmi, remove_orphans } => commands::down(file, rmi, remove_orphans).await?,
        },
        Commands::InternalDaemon { cid } => commands::internal_daemon(cid).await?,
        Commands::MonitorDaemon { manifest, project } => commands::monitor_daemon(manifest, project).await?,
    }

    Ok(())
}
