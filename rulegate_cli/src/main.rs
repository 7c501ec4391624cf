use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use rulegate_core::{load_policies, EngineConfig, Policy, PolicyEnforcer, PolicyError, Value};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "rulegate", version = "0.1.0")]
struct Cli {
    /// Engine configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Args)]
struct PolicyArgs {
    /// Policy document (JSON); may be repeated
    #[arg(long = "policy")]
    policies: Vec<PathBuf>,
}

#[derive(Debug, Args)]
struct ResourceArgs {
    #[command(flatten)]
    policy: PolicyArgs,

    /// Resource to evaluate (JSON)
    #[arg(long)]
    resource: PathBuf,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Check a resource against every policy; exit code 1 when denied
    Enforce(ResourceArgs),
    /// Print the policies that allow a resource
    Match(ResourceArgs),
    /// Show why each policy allows or denies a resource
    Explain {
        #[command(flatten)]
        args: ResourceArgs,

        /// Print evaluations as JSON
        #[arg(long)]
        json: bool,
    },
    /// Report unknown operators and malformed nested rules
    Validate(PolicyArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => match EngineConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error: cannot read config {}: {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => EngineConfig::default(),
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(cli.command, config) {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands, config: EngineConfig) -> Result<ExitCode, PolicyError> {
    match command {
        Commands::Enforce(args) => {
            let enforcer = build_enforcer(&config, &args.policy)?;
            let resource = read_resource(&args.resource)?;
            if enforcer.enforce_value(&resource) {
                println!("allowed");
                Ok(ExitCode::SUCCESS)
            } else {
                println!("denied");
                Ok(ExitCode::from(1))
            }
        }
        Commands::Match(args) => {
            let enforcer = build_enforcer(&config, &args.policy)?;
            let resource = read_resource(&args.resource)?;
            let matched = enforcer.match_value(&resource);
            info!("{} of {} policies matched", matched.len(), enforcer.policies().len());
            println!("{}", serde_json::to_string_pretty(&matched)?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Explain { args, json } => {
            let enforcer = build_enforcer(&config, &args.policy)?;
            let resource = read_resource(&args.resource)?;
            let evaluations = enforcer.explain(&resource);
            if json {
                println!("{}", serde_json::to_string_pretty(&evaluations)?);
            } else {
                for evaluation in &evaluations {
                    match &evaluation.denial {
                        None => println!("{}: allowed", evaluation.policy),
                        Some(denial) => println!("{}: denied, {}", evaluation.policy, denial),
                    }
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Validate(args) => {
            let enforcer = build_enforcer(&config, &args)?;
            let mut clean = true;
            for policy in enforcer.policies() {
                let findings = policy.validate(enforcer.registry());
                if findings.is_empty() {
                    println!("{}: ok", policy.name);
                    continue;
                }
                clean = false;
                for finding in findings {
                    println!("{}: {}", policy.name, finding);
                }
            }
            Ok(if clean {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            })
        }
    }
}

/// Policies from the config followed by any given on the command line.
fn build_enforcer(config: &EngineConfig, args: &PolicyArgs) -> Result<PolicyEnforcer, PolicyError> {
    let mut policies: Vec<Policy> = config.load_policies()?;
    policies.extend(load_policies(&args.policies)?);
    Ok(PolicyEnforcer::with_registry(
        config.registry().into(),
        policies,
    ))
}

fn read_resource(path: &Path) -> Result<Value, PolicyError> {
    let content = fs::read_to_string(path)?;
    let json: serde_json::Value = serde_json::from_str(&content)?;
    Ok(Value::from(json))
}
