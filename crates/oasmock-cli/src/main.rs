//! oasmock CLI - Mock responses straight from OpenAPI documents

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use oasmock_core::record::{request_schema, response_schema};
use oasmock_core::{Config, Method, Request};
use oasmock_engine::{DocumentStore, MatchOutcome, MockEngine, State, match_request};

#[derive(Parser)]
#[command(name = "oasmock")]
#[command(about = "Mock responses straight from OpenAPI documents")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, global = true, default_value = "terminal")]
    output: OutputFormat,

    /// Verbose output (debug logs on stderr)
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Where services come from.
#[derive(clap::Args)]
struct Sources {
    /// Config file (default: .oasmock.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Service directory or document; repeatable, overrides the config
    #[arg(short, long = "service-dir")]
    service_dir: Vec<PathBuf>,
}

/// The request to answer: a request record file, or method + URL.
#[derive(clap::Args)]
struct RequestArgs {
    /// JSON request record
    #[arg(short, long, conflicts_with = "url")]
    request: Option<PathBuf>,

    /// Request URL, e.g. http://petstore.swagger.io/v1/pets
    #[arg(long)]
    url: Option<String>,

    /// HTTP method used with --url
    #[arg(short = 'X', long, default_value = "get")]
    method: Method,

    /// JSON request body used with --url
    #[arg(long, requires = "url")]
    body: Option<String>,

    /// Request header `name: value` used with --url; repeatable
    #[arg(short = 'H', long = "header", requires = "url")]
    headers: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Produce a mock response for a request
    Respond {
        #[command(flatten)]
        request: RequestArgs,

        /// Literal state file (one JSON object or an array of them)
        #[arg(long)]
        state: Option<PathBuf>,

        /// Sampler seed (overrides the config)
        #[arg(long)]
        seed: Option<u64>,

        #[command(flatten)]
        sources: Sources,
    },

    /// Show which operation a request matches
    Match {
        #[command(flatten)]
        request: RequestArgs,

        #[command(flatten)]
        sources: Sources,
    },

    /// Load and validate every configured service
    Check {
        #[command(flatten)]
        sources: Sources,
    },

    /// Initialize config file
    Init,

    /// Export JSON Schema for the interchange records
    Schema {
        #[arg(default_value = "request")]
        record: RecordKind,
    },

    /// Show usage guide (services, state files, matching rules)
    Guide,
}

#[derive(Clone, Copy, ValueEnum, PartialEq, Eq)]
enum OutputFormat {
    Terminal,
    Json,
    Silent,
}

#[derive(Clone, Copy, ValueEnum)]
enum RecordKind {
    Request,
    Response,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(3)
        }
    }
}

fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

fn load_config(sources: &Sources) -> Result<Config> {
    let mut cfg = if let Some(path) = &sources.config {
        Config::load(Path::new(path))?
    } else {
        Config::load_default()?
    };
    if !sources.service_dir.is_empty() {
        cfg.services.clone_from(&sources.service_dir);
    }
    tracing::debug!(services = ?cfg.services, seed = ?cfg.seed, "config loaded");
    Ok(cfg)
}

fn read_request(args: &RequestArgs) -> Result<Request> {
    if let Some(path) = &args.request {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading request {}", path.display()))?;
        return serde_json::from_str(&content)
            .with_context(|| format!("parsing request {}", path.display()));
    }
    let Some(url) = &args.url else {
        bail!("either --request or --url is required");
    };
    let mut request = Request::from_url(args.method, url)?;
    for header in &args.headers {
        let Some((name, value)) = header.split_once(':') else {
            bail!("header '{header}' is not `name: value`");
        };
        request = request.with_header(name.trim(), value.trim());
    }
    if let Some(body) = &args.body {
        request = request.with_body(body);
    }
    Ok(request)
}

fn read_states(path: &Path) -> Result<Vec<State>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading state {}", path.display()))?;
    let value: Value = serde_json::from_str(&content)
        .with_context(|| format!("parsing state {}", path.display()))?;
    let items = match value {
        Value::Array(items) => items,
        other => vec![other],
    };
    items
        .into_iter()
        .map(|v| State::from_value(v).map_err(anyhow::Error::from))
        .collect()
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Respond {
            request,
            state,
            seed,
            sources,
        } => {
            let mut cfg = load_config(&sources)?;
            if seed.is_some() {
                cfg.seed = seed;
            }
            let request = read_request(&request)?;
            let engine = MockEngine::from_config(&cfg)?;

            if let Some(path) = state {
                let states = read_states(&path)?;
                // state is bound to whichever operation the request lands on
                if let MatchOutcome::Matched(m) = match_request(engine.store(), &request) {
                    let slot = engine.state(&m.service).endpoint(&m.template).method(m.method);
                    for s in states {
                        slot.set(s)?;
                    }
                }
            }

            let generated = match engine.respond_detailed(&request) {
                Ok(g) => g,
                Err(e) => {
                    match cli.output {
                        OutputFormat::Json => {
                            let out = serde_json::json!({"error": e.to_string()});
                            println!("{}", serde_json::to_string_pretty(&out)?);
                        }
                        OutputFormat::Terminal => eprintln!("{e}"),
                        OutputFormat::Silent => {}
                    }
                    return Ok(1);
                }
            };

            match cli.output {
                OutputFormat::Terminal => {
                    let resp = &generated.response;
                    println!("{} ({})", resp.status_code, generated.code);
                    for (name, value) in &resp.headers {
                        println!("{name}: {value}");
                    }
                    if let Some(body) = &resp.body {
                        println!();
                        match resp.json() {
                            Some(json) => println!("{}", serde_json::to_string_pretty(&json)?),
                            None => println!("{body}"),
                        }
                    }
                }
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&generated.response)?);
                }
                OutputFormat::Silent => {}
            }
            Ok(0)
        }

        Commands::Match { request, sources } => {
            let cfg = load_config(&sources)?;
            let request = read_request(&request)?;
            let store = DocumentStore::from_config(&cfg)?;

            match match_request(&store, &request) {
                MatchOutcome::Matched(m) => {
                    match cli.output {
                        OutputFormat::Terminal => {
                            println!("{} {} {}", m.service, m.method, m.template);
                            for (name, value) in &m.path_params {
                                println!("  {name} = {value}");
                            }
                            println!("  responses: {}", m.response_codes().join(", "));
                        }
                        OutputFormat::Json => {
                            let mut out = serde_json::to_value(&m)?;
                            out["responses"] = serde_json::json!(m.response_codes());
                            println!("{}", serde_json::to_string_pretty(&out)?);
                        }
                        OutputFormat::Silent => {}
                    }
                    Ok(0)
                }
                MatchOutcome::OperationMissing { service, template } => {
                    if cli.output != OutputFormat::Silent {
                        eprintln!(
                            "{service} declares {template}, but not for {}",
                            request.method
                        );
                    }
                    Ok(1)
                }
                MatchOutcome::Unmatched => {
                    if cli.output != OutputFormat::Silent {
                        eprintln!("Can't find a matcher for this request");
                    }
                    Ok(1)
                }
            }
        }

        Commands::Check { sources } => {
            let cfg = load_config(&sources)?;
            let mut store = DocumentStore::new();
            let mut failed = Vec::new();
            for location in &cfg.services {
                if let Err(e) = store.load(location) {
                    failed.push(format!("{}: {e}", location.display()));
                }
            }

            match cli.output {
                OutputFormat::Terminal => {
                    for service in store.iter() {
                        let paths = service
                            .document
                            .get("paths")
                            .and_then(Value::as_object)
                            .map_or(0, serde_json::Map::len);
                        println!("[OK] {} ({paths} paths)", service.name);
                    }
                    for f in &failed {
                        println!("[NG] {f}");
                    }
                    if store.is_empty() && failed.is_empty() {
                        println!("No services found in {:?}", cfg.services);
                    }
                }
                OutputFormat::Json => {
                    let out = serde_json::json!({
                        "services": store.names(),
                        "errors": failed,
                    });
                    println!("{}", serde_json::to_string_pretty(&out)?);
                }
                OutputFormat::Silent => {}
            }
            Ok(i32::from(!failed.is_empty()))
        }

        Commands::Init => {
            let config_path = ".oasmock.toml";
            if Path::new(config_path).exists() {
                eprintln!("{config_path} already exists");
                return Ok(1);
            }

            std::fs::write(config_path, Config::example())?;
            println!("Created {config_path}");
            println!("\nEdit the file to configure:");
            println!("  - services: directories or files with OpenAPI documents");
            println!("  - seed: fixed sampler seed for reproducible bodies");
            println!("  - sampler: array and string length limits");
            Ok(0)
        }

        Commands::Schema { record } => {
            let schema = match record {
                RecordKind::Request => request_schema(),
                RecordKind::Response => response_schema(),
            };
            println!("{schema}");
            Ok(0)
        }

        Commands::Guide => {
            print!("{}", include_str!("../docs/GUIDE.md"));
            Ok(0)
        }
    }
}
