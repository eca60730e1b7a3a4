use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use polyshell::config::Config;
use polyshell::orchestrator::Orchestrator;
use polyshell::remote::{Agent, AgentExit, AgentOptions, Server};
use polyshell::session::SessionStore;
use polyshell::shell::ShellVariant;
use polyshell::{paths, translator};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Polyshell - run and translate commands across Linux, macOS, mobile and Windows shells
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect to a server and execute the commands it sends
    Agent {
        /// Server URL, e.g. ws://10.0.0.5:8765
        #[arg(short, long)]
        server: Option<String>,

        /// Platform to register as (detected when omitted)
        #[arg(short, long)]
        platform: Option<ShellVariant>,
    },

    /// Accept agents and dispatch commands to them
    Server {
        #[arg(long)]
        host: Option<String>,

        #[arg(short, long)]
        port: Option<u16>,

        /// Directory for session and event logs
        #[arg(long)]
        session_root: Option<PathBuf>,

        /// Read `<platform> <command>` lines from stdin and dispatch them
        #[arg(long)]
        console: bool,
    },

    /// Translate a command between shells
    Translate {
        #[arg(short, long)]
        from: ShellVariant,

        #[arg(short, long)]
        to: ShellVariant,

        #[arg(required = true, trailing_var_arg = true)]
        command: Vec<String>,
    },

    /// Show a command's translation for every other shell
    Suggest {
        #[arg(short, long)]
        from: ShellVariant,

        #[arg(required = true, trailing_var_arg = true)]
        command: Vec<String>,
    },

    /// Execute a command on one local shell
    Exec {
        /// Shell to run on (defaults to the configured variant)
        #[arg(short, long)]
        shell: Option<ShellVariant>,

        #[arg(required = true, trailing_var_arg = true)]
        command: Vec<String>,
    },

    /// Translate a command, then execute it on the target shell
    Run {
        #[arg(short, long)]
        from: ShellVariant,

        #[arg(short, long)]
        to: ShellVariant,

        #[arg(required = true, trailing_var_arg = true)]
        command: Vec<String>,
    },

    /// Translate and execute a command on every shell
    All {
        #[arg(short, long)]
        from: ShellVariant,

        #[arg(required = true, trailing_var_arg = true)]
        command: Vec<String>,
    },

    /// Convert a path between shells
    Path {
        #[arg(short, long)]
        from: ShellVariant,

        #[arg(short, long)]
        to: ShellVariant,

        path: String,
    },

    /// List the common command table
    Commands,

    /// Show every local shell's state
    Status,
}

fn init_logging(debug: bool) -> Result<()> {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).context("Failed to set global default subscriber")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.debug)?;

    let config = match &args.config {
        Some(path) => Config::load_from_file(path)?,
        None => Config::load_default()?,
    };

    match args.command {
        Command::Agent { server, platform } => run_agent(config, server, platform).await,
        Command::Server {
            host,
            port,
            session_root,
            console,
        } => {
            let mut config = config;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(root) = session_root {
                config.server.session_root = root;
            }
            run_server(config, console).await
        }
        Command::Translate { from, to, command } => {
            println!("{}", translator::translate(&command.join(" "), from, to));
            Ok(())
        }
        Command::Suggest { from, command } => {
            for (variant, suggestion) in translator::suggest_translations(&command.join(" "), from) {
                println!("{:<8} {}", variant.as_str(), suggestion);
            }
            Ok(())
        }
        Command::Exec { shell, command } => {
            let mut orchestrator = Orchestrator::new(&config.shell);
            let result = orchestrator.execute(&command.join(" "), shell).await;
            print!("{}", result.output);
            eprint!("{}", result.error);
            if !result.success {
                std::process::exit(result.exit_code.max(1));
            }
            Ok(())
        }
        Command::Run { from, to, command } => {
            let mut orchestrator = Orchestrator::new(&config.shell);
            let run = orchestrator.translate_and_execute(&command.join(" "), from, to).await;
            info!("{} -> {}", run.original_command, run.translated_command);
            print!("{}", run.result.output);
            eprint!("{}", run.result.error);
            if !run.result.success {
                std::process::exit(run.result.exit_code.max(1));
            }
            Ok(())
        }
        Command::All { from, command } => {
            let mut orchestrator = Orchestrator::new(&config.shell);
            let results = orchestrator.execute_on_all(&command.join(" "), from).await;
            println!("{}", serde_json::to_string_pretty(&results)?);
            Ok(())
        }
        Command::Path { from, to, path } => {
            println!("{}", paths::convert(&path, from, to));
            Ok(())
        }
        Command::Commands => {
            for (name, variants) in translator::common_commands() {
                println!("{name}");
                for (variant, command) in variants {
                    println!("  {:<8} {}", variant.as_str(), command);
                }
            }
            Ok(())
        }
        Command::Status => {
            let orchestrator = Orchestrator::new(&config.shell);
            println!("{}", serde_json::to_string_pretty(&orchestrator.status())?);
            Ok(())
        }
    }
}

async fn run_agent(config: Config, server: Option<String>, platform: Option<ShellVariant>) -> Result<()> {
    let mut agent_config = config.agent;
    if let Some(url) = server {
        agent_config.server_url = url;
    }
    if platform.is_some() {
        agent_config.platform = platform;
    }

    let options = AgentOptions::from_config(&agent_config);
    info!(platform = %options.platform, "Starting agent for {}", options.server_url);
    let mut agent = Agent::new(options, &config.shell);

    let token = agent.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });

    match agent.run().await {
        AgentExit::Shutdown | AgentExit::Cancelled => Ok(()),
        AgentExit::RetriesExhausted { attempts } => {
            anyhow::bail!("could not reach {} after {} attempts", agent_config.server_url, attempts)
        }
    }
}

async fn run_server(config: Config, console: bool) -> Result<()> {
    let store = SessionStore::new(&config.server.session_root)?;
    let server = Server::new(store);

    let address = config.server.bind_address();
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {address}"))?;

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                shutdown.cancel();
            }
        });
    }

    if console {
        let server = server.clone();
        let shutdown = shutdown.clone();
        let timeout = Duration::from_secs(config.server.dispatch_timeout_secs);
        tokio::spawn(async move {
            run_console(server, timeout).await;
            shutdown.cancel();
        });
    }

    server.serve(listener, shutdown).await;
    Ok(())
}

/// Operator console: one `<platform> <command>` per line
async fn run_console(server: Server, timeout: Duration) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!("Failed to read console input: {}", e);
                break;
            }
        };

        let line = line.trim();
        match line {
            "" => continue,
            "quit" | "exit" => break,
            "status" => {
                match serde_json::to_string_pretty(&server.status()) {
                    Ok(status) => println!("{status}"),
                    Err(e) => error!("Failed to render status: {}", e),
                }
                continue;
            }
            _ => {}
        }

        let Some((platform, command)) = line.split_once(char::is_whitespace) else {
            warn!("Expected `<platform> <command>`, got `{}`", line);
            continue;
        };
        let platform: ShellVariant = match platform.parse() {
            Ok(platform) => platform,
            Err(e) => {
                warn!("{}", e);
                continue;
            }
        };

        let result = server.dispatch(platform, command.trim(), timeout).await;
        if result.success {
            print!("{}", result.output);
        } else {
            println!("[{}] exit {}: {}", platform, result.exit_code, result.error.trim_end());
        }
    }
}
