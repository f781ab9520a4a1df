//! Backoffice CLI - a terminal client for the backoffice RPC endpoint.
//!
//! Signs in, keeps the session in the local credential store and sends
//! named actions to the backend on the user's behalf.

use std::io;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use backoffice_core::auth::{
    hash_password, Credentials, FileStore, KeyringStore, LoginOutcome, MemoryStore, SealedStore,
};
use backoffice_core::{Backoffice, Capability, Config, CredentialStore, Destination, Navigator, Notice};

/// Passphrase that turns on encryption of the credential file
const ENV_STORE_PASSPHRASE: &str = "BACKOFFICE_STORE_PASSPHRASE";

/// Optional log file path
const ENV_LOG_FILE: &str = "BACKOFFICE_LOG_FILE";

const USAGE: &str = "\
Usage: backoffice [--keyring] <command> [args]

Commands:
  status                         Show the current session
  login [--username U] [--id-token T]
                                 Sign in (prompts for a password unless --id-token)
  logout                         Sign out
  whoami                         Ask the server who you are
  call <action> [key=value ...]  Send an action; values are JSON or plain strings
  can <capability>               Check a capability for the current role
  hash-password                  Print an offline password hash for the config file";

/// Terminal stand-in for page navigation and toasts.
struct TerminalNavigator;

impl Navigator for TerminalNavigator {
    fn navigate(&self, destination: &Destination) {
        eprintln!("-> {}", destination);
    }

    fn notify(&self, notice: &Notice) {
        match notice {
            Notice::Denied(msg) => eprintln!("Access denied: {}", msg),
            Notice::Error(msg) => eprintln!("Error: {}", msg),
        }
    }
}

/// Initialize the tracing subscriber for logging
fn init_tracing() -> Result<Option<WorkerGuard>> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let stderr_layer = fmt::layer().with_writer(io::stderr);

    match std::env::var(ENV_LOG_FILE) {
        Ok(path) if !path.is_empty() => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("Failed to open log file {}", path))?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Ok(Some(guard))
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .init();
            Ok(None)
        }
    }
}

fn open_store(use_keyring: bool) -> Result<Arc<dyn CredentialStore>> {
    if use_keyring {
        debug!("Using OS keychain credential store");
        return Ok(Arc::new(KeyringStore::new()));
    }
    let file = FileStore::in_dir(Config::cache_dir()?);
    match std::env::var(ENV_STORE_PASSPHRASE) {
        Ok(passphrase) if !passphrase.is_empty() => {
            debug!(path = %file.path().display(), "Using sealed credential file");
            Ok(Arc::new(SealedStore::new(file, &passphrase)?))
        }
        _ => {
            debug!(path = %file.path().display(), "Using credential file");
            Ok(Arc::new(file))
        }
    }
}

/// Parse `key=value` pairs; values that parse as JSON keep their type.
fn parse_payload(pairs: &[String]) -> Result<Value> {
    let mut map = Map::new();
    for pair in pairs {
        let (key, raw) = pair
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("Expected key=value, got {:?}", pair))?;
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        map.insert(key.to_string(), value);
    }
    Ok(Value::Object(map))
}

fn flag_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    let _log_guard = init_tracing()?;

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let use_keyring = if let Some(i) = args.iter().position(|a| a == "--keyring") {
        args.remove(i);
        true
    } else {
        false
    };
    let Some(command) = args.first().cloned() else {
        eprintln!("{}", USAGE);
        std::process::exit(2);
    };
    let rest = &args[1..];

    if command == "hash-password" {
        let password = rpassword::prompt_password("Password to hash: ")?;
        println!("{}", hash_password(&password)?);
        return Ok(());
    }

    let config = Config::load()?;
    let needs_endpoint = match command.as_str() {
        "whoami" | "call" => true,
        "login" => config.offline_password_hashes.is_empty(),
        _ => false,
    };
    if needs_endpoint {
        if let Err(e) = config.validate() {
            eprintln!("{}", e.user_message());
            std::process::exit(2);
        }
    }

    // Legacy flag lives only as long as the process
    let legacy: Arc<dyn CredentialStore> = Arc::new(MemoryStore::new());
    let app = Backoffice::new(
        &config,
        open_store(use_keyring)?,
        Some(legacy),
        Arc::new(TerminalNavigator),
    )?;
    info!(command = %command, "backoffice starting");

    match command.as_str() {
        "status" => match app.sessions().get_session()? {
            Some(session) => println!(
                "Signed in as {} ({}), {} minutes left",
                session.principal_id,
                session.role,
                session.minutes_until_expiry()
            ),
            None => println!("Not signed in"),
        },
        "login" => {
            let credentials = match flag_value(rest, "--id-token") {
                Some(id_token) => Credentials::IdToken { id_token },
                None => Credentials::Password {
                    username: flag_value(rest, "--username"),
                    password: rpassword::prompt_password("Password: ")?,
                },
            };
            match app.auth.login(credentials).await {
                Ok(LoginOutcome::Approved(session)) => {
                    println!("Signed in as {} ({})", session.principal_id, session.role)
                }
                Ok(LoginOutcome::Pending { message }) => println!(
                    "Waiting for approval{}",
                    message.map(|m| format!(": {}", m)).unwrap_or_default()
                ),
                Ok(LoginOutcome::Blocked { message }) | Ok(LoginOutcome::Rejected { message }) => {
                    eprintln!("Sign-in refused: {}", message.unwrap_or_else(|| "no reason given".into()));
                    std::process::exit(1);
                }
                Err(e) => {
                    eprintln!("{}", e.user_message());
                    std::process::exit(1);
                }
            }
        }
        "logout" => {
            app.auth.logout()?;
            println!("Signed out");
        }
        "whoami" => {
            if !app.auth.is_authenticated() {
                TerminalNavigator.navigate(&app.auth.entry_destination("whoami"));
                std::process::exit(1);
            }
            match app.auth.me().await {
                Ok(profile) => println!(
                    "{} ({})",
                    profile.principal_id().unwrap_or("unknown"),
                    profile.role.unwrap_or_default()
                ),
                Err(e) => {
                    eprintln!("{}", e.user_message());
                    std::process::exit(1);
                }
            }
        }
        "call" => {
            let action = rest
                .first()
                .ok_or_else(|| anyhow::anyhow!("call needs an action name"))?;
            let payload = parse_payload(&rest[1..])?;
            match app.auth.call(action, payload).await {
                Ok(body) => println!("{}", serde_json::to_string_pretty(&body)?),
                Err(e) => {
                    app.auth.report_error(&e, action);
                    std::process::exit(1);
                }
            }
        }
        "can" => {
            let name = rest
                .first()
                .ok_or_else(|| anyhow::anyhow!("can needs a capability name"))?;
            let capability = Capability::parse(name)
                .ok_or_else(|| anyhow::anyhow!("Unknown capability {:?}", name))?;
            let allowed = app.guard.can(capability);
            println!("{} {} {}", app.guard.current_role(), if allowed { "can" } else { "cannot" }, name);
            if !allowed {
                std::process::exit(1);
            }
        }
        _ => {
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_payload_keeps_json_types() {
        let args: Vec<String> = ["qty=3", "name=Green tea", "paid=true", "note=\"x\""]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let payload = parse_payload(&args).unwrap();
        assert_eq!(payload["qty"], 3);
        assert_eq!(payload["name"], "Green tea");
        assert_eq!(payload["paid"], true);
        assert_eq!(payload["note"], "x");

        assert!(parse_payload(&["oops".to_string()]).is_err());
    }

    #[test]
    fn test_flag_value() {
        let args: Vec<String> = ["--username", "ops", "--id-token"].iter().map(|s| s.to_string()).collect();
        assert_eq!(flag_value(&args, "--username").as_deref(), Some("ops"));
        assert_eq!(flag_value(&args, "--id-token"), None);
    }
}
