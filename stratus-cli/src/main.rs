mod manifest;

use std::collections::HashSet;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use colored::Colorize;
use log::debug;
use tokio_util::sync::CancellationToken;

use stratus_core::provider::Provider;
use stratus_core::resource::{ResourceId, State};
use stratus_provider_tencentcloud::config::{ENV_REGION, ProviderConfig};
use stratus_provider_tencentcloud::TencentCloudProvider;

#[derive(Parser)]
#[command(name = "stratus")]
#[command(about = "Manage TencentCloud infrastructure declaratively", long_about = None)]
struct Cli {
    /// Region to operate in
    #[arg(long, global = true, env = ENV_REGION)]
    region: Option<String>,

    /// Base URL used instead of the public product endpoints
    #[arg(long, global = true, env = "TENCENTCLOUD_ENDPOINT")]
    endpoint: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the observed state of a resource as JSON
    Read {
        /// Resource type (e.g., instance, cbs_storage)
        resource_type: String,
        /// Cloud-side identifier (e.g., ins-xxx)
        identifier: String,
    },
    /// Create every resource declared in a manifest
    Apply {
        /// Path to the JSON manifest
        #[arg(default_value = "stratus.json")]
        file: PathBuf,
    },
    /// Delete a resource
    Destroy {
        /// Resource type (e.g., instance, cbs_storage)
        resource_type: String,
        /// Cloud-side identifier (e.g., ins-xxx)
        identifier: String,

        /// Skip confirmation prompt (auto-approve)
        #[arg(long)]
        auto_approve: bool,
    },
    /// Evaluate the data sources declared in a manifest
    Query {
        /// Path to the JSON manifest
        #[arg(default_value = "stratus.json")]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    let result = match build_provider(cli.region, cli.endpoint) {
        Ok(provider) => match cli.command {
            Commands::Read {
                resource_type,
                identifier,
            } => run_read(&provider, &resource_type, &identifier).await,
            Commands::Apply { file } => run_apply(&provider, &file).await,
            Commands::Destroy {
                resource_type,
                identifier,
                auto_approve,
            } => run_destroy(&provider, &resource_type, &identifier, auto_approve).await,
            Commands::Query { file } => run_query(&provider, &file).await,
        },
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

/// Credentials come from the environment; flags override region and endpoint
fn build_provider(
    region: Option<String>,
    endpoint: Option<String>,
) -> Result<TencentCloudProvider, String> {
    let mut config = ProviderConfig::from_env().map_err(|e| e.to_string())?;
    if let Some(region) = region {
        config.region = region;
    }
    if let Some(endpoint) = endpoint {
        config = config.with_endpoint(endpoint);
    }

    // Ctrl-C stops any wait in progress instead of killing the process mid-call
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", "Interrupted, cancelling...".yellow());
            on_interrupt.cancel();
        }
    });

    let provider = TencentCloudProvider::new(config)
        .map_err(|e| e.to_string())?
        .with_cancellation(cancel);
    println!(
        "{}",
        format!("Using TencentCloud provider (region: {})", provider.region()).cyan()
    );
    Ok(provider)
}

fn data_source_names(provider: &TencentCloudProvider) -> HashSet<&'static str> {
    provider
        .resource_types()
        .iter()
        .filter(|t| t.is_data_source())
        .map(|t| t.name())
        .collect()
}

fn print_json(value: &serde_json::Value) -> Result<(), String> {
    let text = serde_json::to_string_pretty(value).map_err(|e| e.to_string())?;
    println!("{}", text);
    Ok(())
}

async fn run_read(
    provider: &TencentCloudProvider,
    resource_type: &str,
    identifier: &str,
) -> Result<(), String> {
    let id = ResourceId::new(resource_type, identifier);
    let state = provider
        .read(&id, Some(identifier))
        .await
        .map_err(|e| e.to_string())?;

    if !state.exists {
        println!(
            "{}",
            format!("{} {} does not exist.", resource_type, identifier).yellow()
        );
    }
    print_json(&state.to_json())
}

async fn run_apply(provider: &TencentCloudProvider, file: &PathBuf) -> Result<(), String> {
    let data_sources = data_source_names(provider);
    let resources = manifest::load(file, |t| data_sources.contains(t))?;
    let resources: Vec<_> = resources
        .into_iter()
        .filter(|r| !r.is_data_source())
        .collect();

    if resources.is_empty() {
        println!("{}", "No resources defined in manifest.".yellow());
        return Ok(());
    }

    println!("{}", "Applying changes...".cyan().bold());
    println!();

    let mut states: Vec<State> = Vec::new();
    let mut failure_count = 0;

    for resource in &resources {
        debug!("Creating {}", resource.id);
        match provider.create(resource).await {
            Ok(state) => {
                println!(
                    "  {} {} ({})",
                    "✓".green(),
                    resource.id,
                    state.identifier.as_deref().unwrap_or("-")
                );
                states.push(state);
            }
            Err(e) => {
                println!("  {} {} - {}", "✗".red(), resource.id, e);
                failure_count += 1;
            }
        }
    }

    println!();
    if failure_count == 0 {
        println!(
            "{}",
            format!("Apply complete! {} resources created.", states.len())
                .green()
                .bold()
        );
    } else {
        println!(
            "{}",
            format!(
                "Apply failed. {} succeeded, {} failed.",
                states.len(),
                failure_count
            )
            .red()
            .bold()
        );
    }

    print_json(&serde_json::Value::Array(
        states.iter().map(State::to_json).collect(),
    ))?;

    if failure_count > 0 {
        return Err(format!("{} resource(s) failed to apply", failure_count));
    }
    Ok(())
}

async fn run_destroy(
    provider: &TencentCloudProvider,
    resource_type: &str,
    identifier: &str,
    auto_approve: bool,
) -> Result<(), String> {
    let id = ResourceId::new(resource_type, identifier);

    println!("{}", "Destroy Plan:".red().bold());
    println!();
    println!("  {} {} {}", "-".red().bold(), resource_type, identifier);
    println!();

    // Confirmation prompt
    if !auto_approve {
        println!(
            "{}",
            "Do you really want to destroy this resource?".yellow().bold()
        );
        println!(
            "  {}",
            "This action cannot be undone. Type 'yes' to confirm.".yellow()
        );
        print!("\n  Enter a value: ");
        std::io::Write::flush(&mut std::io::stdout()).map_err(|e| e.to_string())?;

        let mut input = String::new();
        std::io::stdin()
            .read_line(&mut input)
            .map_err(|e| e.to_string())?;

        if input.trim() != "yes" {
            println!();
            println!("{}", "Destroy cancelled.".yellow());
            return Ok(());
        }
        println!();
    }

    println!("{}", "Destroying resources...".red().bold());
    provider
        .delete(&id, identifier)
        .await
        .map_err(|e| e.to_string())?;

    println!("  {} {} {}", "✓".green(), resource_type, identifier);
    println!();
    println!("{}", "Destroy complete!".green().bold());
    Ok(())
}

async fn run_query(provider: &TencentCloudProvider, file: &PathBuf) -> Result<(), String> {
    let data_sources = data_source_names(provider);
    let resources = manifest::load(file, |t| data_sources.contains(t))?;

    let mut results = Vec::new();
    for resource in resources.iter().filter(|r| r.is_data_source()) {
        let state = provider
            .read_data_source(resource)
            .await
            .map_err(|e| e.to_string())?;
        results.push(state.to_json());
    }

    if results.is_empty() {
        println!("{}", "No data sources defined in manifest.".yellow());
        return Ok(());
    }
    print_json(&serde_json::Value::Array(results))
}
