//! porfavor - documentation hosting server
//!
//! Runs the web front end and the publish endpoint, or with the `publish`
//! subcommand, uploads a local directory to a running server.

use anyhow::Context;
use clap::{Parser, Subcommand};
use porfavor::publish::{DEFAULT_PUBLISH_PORT, PublishClient, collect_docs};
use porfavor::{ConfigOverrides, ServerConfig};
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{Command, Stdio};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "porfavor")]
#[command(version)]
#[command(about = "Run the documentation hosting server", long_about = None)]
struct Cli {
    /// Directory to serve files under it [default: .]
    #[arg(long, value_name = "DIR")]
    work_dir: Option<PathBuf>,

    /// Host ip address of the server [default: 0.0.0.0]
    #[arg(long)]
    host: Option<String>,

    /// Port for the web server [default: 5000]
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// Port for the publish endpoint [default: 12341]
    #[arg(long)]
    publish_port: Option<u16>,

    /// Serve UI assets from this directory instead of the bundled ones
    #[arg(long, value_name = "DIR")]
    static_dir: Option<PathBuf>,

    /// Log filter, e.g. `info` or `porfavor=debug`
    #[arg(long)]
    log_level: Option<String>,

    /// Log output file when running with --daemon
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,

    /// Run in the background
    #[arg(short = 'D', long)]
    daemon: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a directory of generated docs as a project
    Publish {
        /// Project name
        project: String,
        /// Directory whose files are published
        dir: PathBuf,
        /// Publish endpoint address
        #[arg(long, default_value_t = format!("127.0.0.1:{DEFAULT_PUBLISH_PORT}"))]
        server: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Some(Commands::Publish {
        project,
        dir,
        server,
    }) = cli.command
    {
        return publish(&project, dir, &server).await;
    }

    let config = ServerConfig::load(ConfigOverrides {
        work_dir: cli.work_dir,
        bind_addr: cli.host,
        port: cli.port,
        publish_port: cli.publish_port,
        static_dir: cli.static_dir,
        log_level: cli.log_level,
        log_file: cli.log_file,
    })?;

    if cli.daemon {
        return daemonize(&config);
    }

    porfavor::start_server(config).await
}

async fn publish(project: &str, dir: PathBuf, server: &str) -> anyhow::Result<()> {
    let docs = tokio::task::spawn_blocking({
        let dir = dir.clone();
        move || collect_docs(&dir)
    })
    .await?
    .with_context(|| format!("failed to read {}", dir.display()))?;

    let count = docs.len();
    let mut client = PublishClient::connect(server)
        .await
        .with_context(|| format!("failed to connect to {server}"))?;
    client.publish(project, docs).await?;

    println!("Published {count} files to project '{project}'");
    Ok(())
}

/// Re-launch this process detached without the daemon flag.
fn daemonize(config: &ServerConfig) -> anyhow::Result<()> {
    let exe = std::env::current_exe().context("cannot locate own executable")?;
    let args: Vec<OsString> = std::env::args_os()
        .skip(1)
        .filter(|arg| arg != "-D" && arg != "--daemon")
        .collect();

    let (stdout, stderr) = match &config.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;
            (Stdio::from(file.try_clone()?), Stdio::from(file))
        }
        None => (Stdio::null(), Stdio::null()),
    };

    let mut command = Command::new(exe);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(stderr);

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        // Own process group: terminal signals to the parent do not reach it.
        command.process_group(0);
    }

    let child = command.spawn().context("failed to start background server")?;
    println!("porfavor running in background (pid {})", child.id());
    Ok(())
}
