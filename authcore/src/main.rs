//! Authcore operator CLI
//!
//! Small tools around the auth core:
//! - `hash-password` / `verify-password`: exercise the configured hasher
//! - `issue-token` / `decode-token`: mint and inspect signed tokens
//! - `register`: create an account in PostgreSQL, logging instead of mailing
//! - `migrate`: create the `users` table in PostgreSQL

use anyhow::{anyhow, bail, Context, Result};
use authcore::auth::{Claims, PasswordService, TokenCodec, TokenPurpose};
use authcore::mail::LogMailer;
use authcore::repositories::PgUserStore;
use authcore::services::AccountService;
use authcore::state::AuthState;
use authcore::{config, db};
use authcore_shared::RegisterRequest;
use clap::{Arg, ArgMatches, Command};
use secrecy::{ExposeSecret, SecretString};
use std::io::BufRead;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    init_tracing();

    let matches = cli().get_matches();
    let config = config::AppConfig::load()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        env = if config::AppConfig::is_production() { "production" } else { "development" },
        "Starting authcore"
    );

    match matches.subcommand() {
        Some(("hash-password", sub)) => {
            let passwords = PasswordService::new(&config.hashing)?;
            let password = read_password(sub)?;
            let hash = passwords.hash_async(password).await?;
            println!("{hash}");
        }
        Some(("verify-password", sub)) => {
            let passwords = PasswordService::new(&config.hashing)?;
            let hash = required(sub, "hash")?;
            let password = read_password(sub)?;
            let valid = passwords.verify_async(password, hash.clone()).await?;
            println!("valid: {valid}");
            if valid && passwords.needs_rehash(&hash) {
                println!("needs rehash: true");
            }
            if !valid {
                std::process::exit(1);
            }
        }
        Some(("issue-token", sub)) => {
            let codec = TokenCodec::new(&config.auth.secret);
            let purpose = parse_purpose(sub)?;
            let mut claims = Claims::new(required(sub, "sub")?).with_purpose(purpose);
            if let Some(role) = sub.get_one::<String>("role") {
                claims = claims.with_role(role.clone());
            }
            let ttl = sub.get_one::<u64>("ttl").copied().unwrap_or(match purpose {
                TokenPurpose::Session => config.auth.session_ttl_secs,
                TokenPurpose::EmailVerification => config.auth.verification_ttl_secs,
            });
            let token = codec.issue(claims, Duration::from_secs(ttl))?;
            println!("{token}");
        }
        Some(("decode-token", sub)) => {
            let codec = TokenCodec::new(&config.auth.secret);
            let token = required(sub, "token")?;
            let claims = if sub.contains_id("purpose") {
                codec.decode_for(&token, parse_purpose(sub)?)
            } else {
                codec.decode(&token)
            }
            .map_err(|e| anyhow!("Token rejected: {} ({})", e, e.code()))?;
            println!("{}", serde_json::to_string_pretty(&claims)?);
            if let Some(expires_at) = claims.expires_at() {
                println!("expires at: {}", expires_at.to_rfc3339());
            }
        }
        Some(("register", sub)) => {
            let pool = db::create_pool(&config.database).await?;
            let state = AuthState::new(
                config,
                Arc::new(PgUserStore::new(pool)),
                Arc::new(LogMailer),
            )?;
            let request = RegisterRequest {
                email: required(sub, "email")?,
                password: read_password(sub)?,
                username: sub.get_one::<String>("username").cloned(),
                phone_number: sub.get_one::<String>("phone").cloned(),
            };
            let profile = AccountService::new(state)
                .register(request)
                .await
                .map_err(|e| anyhow!("Registration failed: {}", e))?;
            println!("{}", serde_json::to_string_pretty(&profile)?);
        }
        Some(("migrate", _)) => {
            let pool = db::create_pool(&config.database).await?;
            db::run_migrations(&pool).await?;
        }
        _ => bail!("no subcommand given, see --help"),
    }

    Ok(())
}

fn cli() -> Command {
    let password = Arg::new("password")
        .long("password")
        .help("Plaintext password, read from stdin when omitted")
        .env("AUTHCORE_PASSWORD")
        .hide_env_values(true);

    let purpose = Arg::new("purpose")
        .long("purpose")
        .help("Token purpose")
        .value_parser(["session", "email_verification"]);

    Command::new("authcore")
        .about("Credential and token tooling")
        .version(env!("CARGO_PKG_VERSION"))
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("hash-password")
                .about("Hash a password with the configured Argon2id parameters")
                .arg(password.clone()),
        )
        .subcommand(
            Command::new("verify-password")
                .about("Check a password against a stored hash")
                .arg(Arg::new("hash").required(true).help("Stored hash"))
                .arg(password.clone()),
        )
        .subcommand(
            Command::new("register")
                .about("Create an unverified account; the verification email is only logged")
                .arg(Arg::new("email").required(true))
                .arg(Arg::new("username").long("username"))
                .arg(Arg::new("phone").long("phone").help("Phone number"))
                .arg(password),
        )
        .subcommand(
            Command::new("issue-token")
                .about("Sign a token with the configured secret")
                .arg(Arg::new("sub").required(true).help("Subject: user id or email"))
                .arg(Arg::new("role").long("role").help("Role claim"))
                .arg(purpose.clone().default_value("session"))
                .arg(
                    Arg::new("ttl")
                        .long("ttl")
                        .help("Lifetime in seconds, defaults to the configured TTL")
                        .value_parser(clap::value_parser!(u64)),
                ),
        )
        .subcommand(
            Command::new("decode-token")
                .about("Verify a token and print its claims")
                .arg(Arg::new("token").required(true))
                .arg(purpose),
        )
        .subcommand(Command::new("migrate").about("Run database migrations"))
}

fn required(matches: &ArgMatches, id: &str) -> Result<String> {
    matches
        .get_one::<String>(id)
        .cloned()
        .with_context(|| format!("missing required argument: {id}"))
}

fn parse_purpose(matches: &ArgMatches) -> Result<TokenPurpose> {
    match matches.get_one::<String>("purpose").map(String::as_str) {
        None | Some("session") => Ok(TokenPurpose::Session),
        Some("email_verification") => Ok(TokenPurpose::EmailVerification),
        Some(other) => bail!("unknown token purpose: {other}"),
    }
}

fn read_password(matches: &ArgMatches) -> Result<SecretString> {
    if let Some(password) = matches.get_one::<String>("password") {
        return Ok(SecretString::new(password.clone()));
    }

    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read password from stdin")?;
    let password = SecretString::new(line.trim_end_matches(['\r', '\n']).to_string());
    if password.expose_secret().is_empty() {
        bail!("empty password");
    }
    Ok(password)
}

/// Initialize tracing/logging
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if config::AppConfig::is_production() {
            "authcore=info".into()
        } else {
            "authcore=debug,sqlx=warn".into()
        }
    });

    let subscriber = tracing_subscriber::registry().with(env_filter);

    if config::AppConfig::is_production() {
        // JSON logging for production (better for log aggregation)
        subscriber
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(tracing_subscriber::fmt::layer().pretty().with_writer(std::io::stderr))
            .init();
    }
}
