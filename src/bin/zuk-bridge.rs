//! zuk-bridge CLI: run commands against a JSON-RPC engine process.
//!
//! Usage:
//!   zuk-bridge [--config path] [--engine program] exec <query>... [--input file]... [--json]
//!   zuk-bridge random [--amount n]
//!   zuk-bridge suggest <query>... [--context file]... [--amount n]
//!   zuk-bridge context

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::Level;
use zuk_bridge::output::BinaryDisplay;
use zuk_bridge::{
    Block, BridgeConfig, CommandResult, ContextProvider, EngineFacade, NormalizedResult, Payload,
    RpcBackend, SystemContext,
};

#[derive(Parser)]
#[command(
    name = "zuk-bridge",
    version,
    about = "Run commands through a zuk engine and print normalized results"
)]
struct Cli {
    /// Path to a YAML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Engine program to spawn (overrides the config file)
    #[arg(long, global = true)]
    engine: Option<String>,
    /// Argument passed to the engine program (repeatable)
    #[arg(long = "engine-arg", global = true, allow_hyphen_values = true)]
    engine_args: Vec<String>,
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a command
    Exec {
        /// Command text; multiple words are joined with spaces
        #[arg(required = true)]
        query: Vec<String>,
        /// File pushed to the engine as an input stream (repeatable)
        #[arg(short, long)]
        input: Vec<PathBuf>,
        /// Print the normalized result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print example commands
    Random {
        #[arg(short, long)]
        amount: Option<usize>,
    },
    /// Suggest commands for partial input
    Suggest {
        #[arg(required = true)]
        query: Vec<String>,
        /// File used as suggestion context (repeatable)
        #[arg(short, long)]
        context: Vec<PathBuf>,
        #[arg(short, long)]
        amount: Option<usize>,
    },
    /// Print the context descriptor sent with every command
    Context,
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<BridgeConfig, String> {
    let mut config =
        BridgeConfig::load_or_default(cli.config.as_deref()).map_err(|e| e.to_string())?;
    if let Some(program) = &cli.engine {
        config.engine.program = program.clone();
        config.engine.args = cli.engine_args.clone();
    } else if !cli.engine_args.is_empty() {
        config.engine.args = cli.engine_args.clone();
    }
    Ok(config)
}

fn open_facade(config: &BridgeConfig) -> Result<EngineFacade, String> {
    let subprocess = config.subprocess().map_err(|e| {
        format!("{} (set engine.program in the config file or pass --engine)", e)
    })?;
    let backend = RpcBackend::spawn(subprocess).with_context_provider(Arc::new(
        SystemContext::with_overrides(config.context.clone()),
    ));
    Ok(EngineFacade::new(Arc::new(backend)).with_highlight_policy(config.highlight_policy))
}

fn read_files(paths: &[PathBuf]) -> Result<Vec<Vec<u8>>, String> {
    paths
        .iter()
        .map(|path| {
            std::fs::read(path).map_err(|e| format!("cannot read '{}': {}", path.display(), e))
        })
        .collect()
}

fn print_result(result: &NormalizedResult) {
    for output in result.outputs() {
        if !output.title.is_empty() {
            println!("[{}]", output.title);
        }
        for block in &output.blocks {
            match block {
                Block::Comment(comment) => {
                    if let Some(title) = &comment.title {
                        println!("{}:", title);
                    }
                    println!("{}", comment.text);
                }
                Block::Data(data) => {
                    if let Some(title) = &data.title {
                        println!("{}:", title);
                    }
                    match &data.data {
                        Payload::Text(text) => println!("{}", text),
                        Payload::Binary(bytes) => match data.display.binary {
                            Some(BinaryDisplay::Base64) => println!("{}", BASE64.encode(bytes)),
                            Some(BinaryDisplay::Hex) => {
                                let hex: String =
                                    bytes.iter().map(|b| format!("{:02x}", b)).collect();
                                println!("{}", hex);
                            }
                            _ => {
                                let name = data.file_name.as_deref().unwrap_or("data");
                                println!("<{}: {} bytes, {}>", name, bytes.len(), data.media_type);
                            }
                        },
                    }
                }
                Block::Spoiler(spoiler) => println!("{}: <hidden>", spoiler.title),
            }
        }
    }
}

async fn cmd_exec(facade: &EngineFacade, query: &str, inputs: &[PathBuf], json: bool) -> i32 {
    let streams = match read_files(inputs) {
        Ok(streams) => streams,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let result = match facade.exec(query, streams).await {
        Ok(result) => result,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    if json {
        match serde_json::to_string_pretty(&result) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("Error: {}", e);
                return 1;
            }
        }
    } else if result.is_no_command() {
        eprintln!("No command matched '{}'", query);
    } else {
        print_result(&result);
    }

    match result {
        CommandResult::Ok { .. } => 0,
        CommandResult::Fail { .. } | CommandResult::NoCommand => 1,
    }
}

async fn cmd_random(facade: &EngineFacade, amount: usize) -> i32 {
    match facade.random_suggestions(amount).await {
        Ok(list) => {
            for item in list {
                println!("{}", item);
            }
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

async fn cmd_suggest(
    facade: &EngineFacade,
    query: &str,
    context: &[PathBuf],
    amount: usize,
) -> i32 {
    let streams = match read_files(context) {
        Ok(streams) => streams,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    if let Err(e) = facade.set_suggestion_streams(streams).await {
        eprintln!("Error: {}", e);
        return 1;
    }
    match facade.suggestions(query, amount).await {
        Ok(list) => {
            for item in list {
                println!("{}", item);
            }
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_context(config: &BridgeConfig) -> i32 {
    let context = SystemContext::with_overrides(config.context.clone()).context();
    match serde_json::to_string_pretty(&context) {
        Ok(text) => {
            println!("{}", text);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn run(command: Commands, config: &BridgeConfig) -> i32 {
    if let Commands::Context = command {
        return cmd_context(config);
    }

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to create tokio runtime: {}", e);
            return 1;
        }
    };
    let facade = match open_facade(config) {
        Ok(facade) => facade,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    rt.block_on(async {
        match command {
            Commands::Exec { query, input, json } => {
                cmd_exec(&facade, &query.join(" "), &input, json).await
            }
            Commands::Random { amount } => {
                cmd_random(&facade, amount.unwrap_or(config.suggestion_amount)).await
            }
            Commands::Suggest {
                query,
                context,
                amount,
            } => {
                let amount = amount.unwrap_or(config.suggestion_amount);
                cmd_suggest(&facade, &query.join(" "), &context, amount).await
            }
            Commands::Context => cmd_context(config),
        }
    })
}

fn config_label(path: Option<&Path>) -> String {
    path.map(|p| p.display().to_string())
        .or_else(|| BridgeConfig::default_path().map(|p| p.display().to_string()))
        .unwrap_or_else(|| "<none>".to_string())
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    tracing::debug!(config = %config_label(cli.config.as_deref()), "configuration loaded");

    let code = run(cli.command, &config);
    std::process::exit(code);
}
