//! forge - run the score-server pipeline from the command line
//!
//! ## Commands
//!
//! - `functions`: list the pipeline functions and their parameters
//! - `call`: invoke a function (`test`, `docker`, `service`)
//! - `config`: print the resolved configuration

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use forge_ci::telemetry::init_tracing;
use forge_ci::{ArgValue, ForgeConfig, ForgeContext, FunctionOutput, FunctionRegistry, Secret};
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "forge")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Test, package, publish and serve score-server", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON log lines and JSON results
    #[arg(long, global = true)]
    json: bool,

    /// Repository checkout the pipeline runs against
    #[arg(short, long, global = true, env = "FORGE_WORKSPACE", default_value = ".")]
    workspace: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List pipeline functions
    Functions,

    /// Call a pipeline function
    Call {
        /// Function name (test, docker, service)
        function: String,

        /// Source directory (default: workspace root)
        #[arg(long)]
        src: Option<PathBuf>,

        /// Name of the environment variable holding the registry token
        #[arg(long, value_name = "ENV")]
        token: Option<String>,

        /// Keep a started service in the foreground until Ctrl-C
        #[arg(long)]
        up: bool,
    },

    /// Print the resolved configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    init_tracing(cli.json, level);

    let workspace = cli
        .workspace
        .canonicalize()
        .with_context(|| format!("Workspace not found: {}", cli.workspace.display()))?;
    let config = ForgeConfig::load(&workspace).context("Failed to load forge config")?;
    let registry = FunctionRegistry::score_server();

    match cli.command {
        Commands::Functions => cmd_functions(&registry, cli.json),
        Commands::Config => cmd_config(&config, cli.json),
        Commands::Call {
            function,
            src,
            token,
            up,
        } => {
            let args = call_args(src, token.as_deref(), |var| std::env::var(var).ok())?;
            let ctx = ForgeContext::local(workspace, config);
            cmd_call(&registry, ctx, &function, args, up, cli.json).await
        }
    }
}

/// Build function arguments from CLI flags. `lookup` reads environment variables.
fn call_args<F>(src: Option<PathBuf>, token_env: Option<&str>, lookup: F) -> Result<BTreeMap<String, ArgValue>>
where
    F: Fn(&str) -> Option<String>,
{
    let mut args = BTreeMap::new();
    if let Some(src) = src {
        args.insert("src".to_string(), ArgValue::Directory(src));
    }
    if let Some(var) = token_env {
        let value = lookup(var)
            .filter(|v| !v.is_empty())
            .with_context(|| format!("Environment variable {var} is not set"))?;
        args.insert("token".to_string(), ArgValue::Secret(Secret::new(value)));
    }
    Ok(args)
}

fn cmd_functions(registry: &FunctionRegistry, json: bool) -> Result<()> {
    if json {
        let specs: Vec<_> = registry.functions().collect();
        println!("{}", serde_json::to_string_pretty(&specs)?);
        return Ok(());
    }

    for spec in registry.functions() {
        println!("{:<10}{}", spec.name, spec.description);
        for param in &spec.params {
            let mut notes = Vec::new();
            if param.optional {
                notes.push("optional".to_string());
            }
            if let Some(default) = param.default_path {
                notes.push(format!("default: {default}"));
            }
            if !param.ignore.is_empty() {
                notes.push(format!("ignores: {}", param.ignore.join(", ")));
            }
            let notes = if notes.is_empty() {
                String::new()
            } else {
                format!(" ({})", notes.join("; "))
            };
            println!("{:<10}--{} <{}>{}  {}", "", param.name, param.kind, notes, param.description);
        }
    }
    Ok(())
}

fn cmd_config(config: &ForgeConfig, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(config)?);
    } else {
        let value = serde_json::to_value(config)?;
        if let Some(map) = value.as_object() {
            for (key, value) in map {
                println!("{key:<24}{value}");
            }
        }
    }
    Ok(())
}

async fn cmd_call(
    registry: &FunctionRegistry,
    ctx: ForgeContext,
    function: &str,
    args: BTreeMap<String, ArgValue>,
    up: bool,
    json: bool,
) -> Result<()> {
    let output = registry
        .call(function, ctx.clone(), args)
        .await
        .with_context(|| format!("forge call {function} failed"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_output(function, &output);
    }

    if let (true, FunctionOutput::Service(service)) = (up, &output) {
        info!(service = %service.id, "Press Ctrl-C to stop the service");
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl-C")?;
        ctx.services()
            .stop(service)
            .await
            .context("Failed to stop service")?;
    }
    Ok(())
}

fn print_output(function: &str, output: &FunctionOutput) {
    match output {
        FunctionOutput::Unit => println!("{function}: ok"),
        FunctionOutput::Image(image) => {
            println!("image    {}", image.id);
            println!("platform {}", image.platform);
            for reference in image.references() {
                println!("ref      {reference}");
            }
        }
        FunctionOutput::Service(service) => {
            println!("service  {}", service.id);
            for endpoint in service.endpoints() {
                println!("endpoint {endpoint}");
            }
        }
    }
}
