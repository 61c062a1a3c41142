use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use console::style;
use std::path::PathBuf;

use devwp::config::DevwpConfig;
use devwp::store::MultisiteType;
use devwp::{AppContext, DevwpApi};

mod cmd;

#[derive(Parser)]
#[command(name = "devwp")]
#[command(version, about = "Local WordPress development environment manager")]
pub struct Cli {
    /// Path to devwp.toml (defaults to the user config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Skip confirmation prompts
    #[arg(long, global = true)]
    pub yes: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create, update, delete and list sites
    Sites {
        #[command(subcommand)]
        command: SitesCommands,
    },
    /// Read and write stored settings
    Settings {
        #[command(subcommand)]
        command: Option<SettingsCommands>,
    },
    /// Inspect and control the container group
    Containers {
        #[command(subcommand)]
        command: Option<ContainersCommands>,
    },
    /// Run wp-cli against a site, e.g. `devwp wp demo.test plugin list`
    Wp {
        domain: String,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        args: Vec<String>,
    },
    /// Show or change the Xdebug mode of the PHP service
    Xdebug {
        #[command(subcommand)]
        command: Option<XdebugCommands>,
    },
    /// Open a site URL or a local path with the system handler
    Open { target: String },
    /// Show version and data locations
    Info,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum MultisiteArg {
    Subdomain,
    Subdirectory,
}

impl From<MultisiteArg> for MultisiteType {
    fn from(arg: MultisiteArg) -> Self {
        match arg {
            MultisiteArg::Subdomain => MultisiteType::Subdomain,
            MultisiteArg::Subdirectory => MultisiteType::Subdirectory,
        }
    }
}

#[derive(Subcommand, Clone)]
pub enum SitesCommands {
    /// List site directories under the webroot
    List,
    /// Show the stored record of a site
    Show { domain: String },
    /// Create a site: directory, hosts entry, proxy config, database, WordPress
    Create {
        domain: String,
        /// Extra hostnames, space separated
        #[arg(long)]
        aliases: Option<String>,
        /// Document root relative to the site directory
        #[arg(long)]
        web_root: Option<String>,
        #[arg(long, value_enum)]
        multisite: Option<MultisiteArg>,
    },
    /// Rewrite hosts entry, proxy config and record of an existing site
    Update {
        domain: String,
        #[arg(long)]
        aliases: Option<String>,
        #[arg(long)]
        web_root: Option<String>,
        #[arg(long, value_enum)]
        multisite: Option<MultisiteArg>,
    },
    /// Delete a site and everything devwp created for it
    Delete { domain: String },
}

#[derive(Subcommand, Clone)]
pub enum SettingsCommands {
    List,
    Get { key: String },
    Set { key: String, value: String },
    Delete { key: String },
}

#[derive(Subcommand, Clone)]
pub enum ContainersCommands {
    /// List containers with state and version
    List,
    /// Restart one container by id or name
    Restart { id: String },
    /// Bring the group up
    Start,
    /// Take the group down
    Stop,
    /// Poll status until interrupted
    Watch {
        /// Stop after this many updates
        #[arg(long)]
        count: Option<usize>,
    },
}

#[derive(Subcommand, Clone, Copy)]
pub enum XdebugCommands {
    Status,
    On,
    Off,
    Toggle,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match DevwpConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {:#}", style("error:").red().bold(), e);
            std::process::exit(2);
        }
    };
    let log_dir = config.log_dir();

    let _guard = match devwp::logging::init(&log_dir, cli.verbose) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("{} {:#}", style("warning:").yellow(), e);
            None
        }
    };

    match run(&cli, config).await {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(e) => {
            tracing::error!(error = %format!("{:#}", e), "command failed");
            eprintln!("{} {:#}", style("error:").red().bold(), e);
            eprintln!(
                "{}",
                style(format!("See the logs in {}", log_dir.display())).dim()
            );
            std::process::exit(1);
        }
    }
}

async fn run(cli: &Cli, config: DevwpConfig) -> Result<i32> {
    // `info` must work even when the store cannot be opened
    if let Commands::Info = cli.command {
        return cmd::cmd_info(config, cli.config.as_deref()).await.map(|_| 0);
    }

    let ctx = AppContext::open(config, cli.verbose)?;
    let api = DevwpApi::new(ctx);

    match &cli.command {
        Commands::Sites { command } => cmd::cmd_sites(&api, cli, command.clone()).await?,
        Commands::Settings { command } => cmd::cmd_settings(&api, command.clone()).await?,
        Commands::Containers { command } => cmd::cmd_containers(&api, command.clone()).await?,
        Commands::Wp { domain, args } => return cmd::cmd_wp(&api, domain, args.clone()).await,
        Commands::Xdebug { command } => cmd::cmd_xdebug(&api, *command).await?,
        Commands::Open { target } => cmd::cmd_open(&api, target)?,
        Commands::Info => {}
    }
    Ok(0)
}
