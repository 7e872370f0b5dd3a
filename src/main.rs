//! hookgate - verify or sign webhook requests from the command line.

use std::env;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use hookgate::audit::{AuditEntry, AuditLogger};
use hookgate::auth::{FileNonceLedger, MemoryNonceLedger, NonceLedger, Signer, WebhookGate};
use hookgate::config::{Policy, Settings};
use hookgate::error::GateError;
use hookgate::protocol::{RequestContext, RequestDocument};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const NAME: &str = env!("CARGO_PKG_NAME");

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return ExitCode::SUCCESS;
    }

    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("{} {}", NAME, VERSION);
        return ExitCode::SUCCESS;
    }

    let config_path = get_config_path(&args);
    let positional = positional_args(&args);
    let Some(command) = positional.first().cloned() else {
        print_help();
        return ExitCode::FAILURE;
    };

    let settings = match Settings::load(&config_path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logging(&settings) {
        eprintln!("Error initializing logging: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Configuration loaded from: {}", config_path);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error creating runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(async {
        match command.as_str() {
            "check-config" => check_config(&settings),
            "verify" => verify(&settings, positional.get(1)).await,
            "sign" => sign(&settings, positional.get(1)),
            "purge-nonces" => purge_nonces(&settings),
            other => Err(format!("Unknown command '{}'", other).into()),
        }
    });

    match result {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

type CommandResult = Result<ExitCode, Box<dyn std::error::Error>>;

/// Validate the configuration and secret source.
fn check_config(settings: &Settings) -> CommandResult {
    let policy = Policy::configure(&settings.gate)?;
    println!("{:#?}", policy);
    Ok(ExitCode::SUCCESS)
}

/// Run the gate against a request description.
async fn verify(settings: &Settings, request_path: Option<&String>) -> CommandResult {
    let ctx = read_request(request_path)?;
    let gate = build_gate(Policy::configure(&settings.gate)?)?;

    let audit_logger = if settings.audit.enabled {
        Some(AuditLogger::new(&settings.audit.log_path)?)
    } else {
        None
    };

    let request_id = Uuid::new_v4();
    let start_time = Instant::now();
    let outcome = gate.assert_authorized(&ctx).await;
    let duration_ms = start_time.elapsed().as_millis() as u64;

    if let Some(logger) = &audit_logger {
        logger.log(&AuditEntry::from_outcome(request_id, &ctx, &outcome, duration_ms))?;
    }

    let (line, code) = render_outcome(outcome)?;
    println!("{}", line);
    Ok(ExitCode::from(code))
}

/// Verdict line and exit status: 0 authorized, 2 denied.
fn render_outcome(outcome: Result<(), GateError>) -> Result<(String, u8), GateError> {
    match outcome {
        Ok(()) => Ok(("authorized".to_string(), 0)),
        Err(GateError::Auth { kind }) => Ok((format!("denied: {} ({})", kind.code(), kind), 2)),
        Err(e) => Err(e),
    }
}

/// Print the headers a client must send for a request.
fn sign(settings: &Settings, request_path: Option<&String>) -> CommandResult {
    let ctx = read_request(request_path)?;
    let policy = Policy::configure(&settings.gate)?;
    if !policy.enabled() {
        return Err("Cannot sign: the gate is disabled".into());
    }

    let signer = Signer::from_policy(&policy);
    let timestamp = chrono::Utc::now().timestamp();
    let nonce = Uuid::new_v4().to_string();
    let signed = signer.sign(timestamp, &nonce, &ctx.body, &ctx.method, &ctx.target);

    for (name, value) in signer.header_pairs(&signed) {
        println!("{}: {}", name, value);
    }
    Ok(ExitCode::SUCCESS)
}

/// Remove expired nonce records.
fn purge_nonces(settings: &Settings) -> CommandResult {
    let dir = settings
        .gate
        .nonce_dir
        .as_ref()
        .ok_or("nonce_dir is not configured")?;
    let removed = FileNonceLedger::open(dir)?.purge_expired()?;
    println!("removed {} expired nonce records", removed);
    Ok(ExitCode::SUCCESS)
}

/// A disabled gate denies before reaching the ledger, so it gets an
/// in-memory one instead of requiring `nonce_dir`.
fn build_gate(policy: Policy) -> Result<WebhookGate, GateError> {
    let ledger: Arc<dyn NonceLedger> = if policy.enabled() {
        let dir = policy.nonce_dir().ok_or_else(|| GateError::Config {
            message: "nonce_dir is not configured".to_string(),
        })?;
        Arc::new(FileNonceLedger::open(dir)?)
    } else {
        Arc::new(MemoryNonceLedger::new())
    };
    Ok(WebhookGate::new(policy, ledger))
}

fn read_request(path: Option<&String>) -> Result<RequestContext, Box<dyn std::error::Error>> {
    let path = path.ok_or("Missing request file argument")?;
    let content = std::fs::read_to_string(Path::new(path))
        .map_err(|e| format!("Failed to read request file '{}': {}", path, e))?;
    let document: RequestDocument = serde_json::from_str(&content)?;
    Ok(document.into())
}

fn print_help() {
    println!(
        r#"{} {}
Inbound webhook authentication gate.

USAGE:
    {} [OPTIONS] <COMMAND> [ARGS]

COMMANDS:
    check-config           Validate configuration and the secret source
    verify <REQUEST>       Authorize a request described in a JSON file
    sign <REQUEST>         Print signature headers for a request JSON file
    purge-nonces           Remove expired records from the nonce directory

OPTIONS:
    -c, --config <PATH>    Path to configuration file
                           [default: /etc/hookgate/hookgate.toml]
    -h, --help             Print help information
    -V, --version          Print version information
"#,
        NAME, VERSION, NAME
    );
}

fn get_config_path(args: &[String]) -> String {
    for (i, arg) in args.iter().enumerate() {
        if (arg == "--config" || arg == "-c") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return path.to_string();
        }
    }
    "/etc/hookgate/hookgate.toml".to_string()
}

/// Arguments that are neither options nor option values.
fn positional_args(args: &[String]) -> Vec<String> {
    let mut positional = Vec::new();
    let mut skip_next = false;
    for arg in args.iter().skip(1) {
        if skip_next {
            skip_next = false;
            continue;
        }
        if arg == "--config" || arg == "-c" {
            skip_next = true;
            continue;
        }
        if arg.starts_with('-') {
            continue;
        }
        positional.push(arg.clone());
    }
    positional
}

/// Initialize logging based on settings.
///
/// Logs go to stderr so `sign` output stays machine-readable.
fn init_logging(settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level));

    match settings.logging.format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .try_init()?;
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty().with_writer(std::io::stderr))
                .try_init()?;
        }
    }

    Ok(())
}
