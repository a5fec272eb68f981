//! Flickr digest CLI - mail a digest of new photos from registered accounts.

use anyhow::{Context, Result};
use chrono::Duration;
use clap::{ArgGroup, Parser};
use colored::Colorize;
use dialoguer::{theme::ColorfulTheme, Input};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use flickr_digest::credentials::{AuthorizationRequest, FileStore, Onboarding};
use flickr_digest::digest::{DigestGenerator, EmailSender, SmtpConfig, SMTP_HINT};
use flickr_digest::error::{DigestError, Error};
use flickr_digest::flickr::FlickrClient;
use flickr_digest::pipeline::{DigestRun, RunOptions, RunSummary};
use flickr_digest::state::{State, StateFile};

/// Flickr digest - email new photos from your Flickr accounts.
///
/// Without an action flag, checks every registered account for new photos
/// and mails the digest.
#[derive(Parser)]
#[command(name = "flickr-digest")]
#[command(about = "Email digest of new Flickr photos")]
#[command(version)]
#[command(group(ArgGroup::new("action").multiple(false)))]
pub struct Cli {
    /// Authorize a Flickr account, pasting the verifier at the prompt
    #[arg(short = 'i', long, group = "action")]
    user_add_interactive: bool,

    /// Start a two-step authorization; finish it with --user-auth-verifier
    #[arg(short = 'a', long, group = "action")]
    user_add: bool,

    /// Finish a two-step authorization
    #[arg(long, value_name = "VERIFIER", group = "action")]
    user_auth_verifier: Option<String>,

    /// Authorize an account from a pre-OAuth auth token
    #[arg(short = 'o', long, value_name = "TOKEN", group = "action")]
    user_old_auth: Option<String>,

    /// Remove an authorized account
    #[arg(short = 'd', long, value_name = "USERNAME", group = "action")]
    user_delete: Option<String>,

    /// Look back this many hours instead of since the last run
    #[arg(long, value_name = "HOURS")]
    lookback: Option<u32>,

    /// Only report errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Enable verbose logging and print the rendered digest
    #[arg(short, long)]
    verbose: bool,

    /// Render the digest but neither send it nor update the state file
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Trace the SMTP conversation
    #[arg(long)]
    smtp_debug: bool,

    /// State file (API keys, SMTP settings, last run)
    #[arg(long, env = "FLICKR_DIGEST_STATE", default_value = "state.toml")]
    state: PathBuf,

    /// Directory of authorized accounts
    #[arg(long, env = "FLICKR_DIGEST_USERS", default_value = "users")]
    users_dir: PathBuf,

    /// Directory of pending two-step authorizations
    #[arg(long, env = "FLICKR_DIGEST_PENDING", default_value = "tmp_users")]
    pending_dir: PathBuf,

    /// Digest template; the built-in one is used when the file is missing
    #[arg(long, env = "FLICKR_DIGEST_TEMPLATE", default_value = "email.hbs")]
    template: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let mut directives = if cli.quiet {
        "warn".to_string()
    } else if cli.verbose {
        "flickr_digest=debug,info".to_string()
    } else {
        "flickr_digest=info,warn".to_string()
    };
    if cli.smtp_debug {
        directives.push_str(",lettre=trace");
    }
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let state_file = StateFile::new(&cli.state);
    let mut state = state_file
        .load()
        .with_context(|| format!("Failed to load {}", cli.state.display()))?;
    let credentials = state_file.require_api_credentials(&mut state)?;

    let client = FlickrClient::new(credentials)?;
    let users = FileStore::new(&cli.users_dir);
    let pending = FileStore::new(&cli.pending_dir);
    let onboarding = Onboarding::new(&client, &users, &pending);

    if cli.user_add_interactive {
        let user = onboarding.add_interactive(prompt_verifier).await?;
        print_authorized(&user.to_string());
    } else if cli.user_add {
        let request = onboarding.start_two_step().await?;
        println!("Open this URL in a browser and authorize the application:");
        println!("\n  {}\n", request.url.cyan());
        println!(
            "Then run: flickr-digest --user-auth-verifier {}",
            "<oauth_verifier>".bold()
        );
    } else if let Some(verifier) = cli.user_auth_verifier.as_deref() {
        let user = onboarding.finish_two_step(verifier.trim()).await?;
        print_authorized(&user.to_string());
    } else if let Some(token) = cli.user_old_auth.as_deref() {
        let user = onboarding.add_legacy(token.trim()).await?;
        print_authorized(&user.to_string());
    } else if let Some(username) = cli.user_delete.as_deref() {
        onboarding.delete(username)?;
        println!("{} Removed user {username}", "✓".green().bold());
    } else {
        run_digest(&cli, &client, &users, &state_file, &mut state).await?;
    }

    Ok(())
}

fn prompt_verifier(request: &AuthorizationRequest) -> dialoguer::Result<String> {
    println!("Open this URL in a browser and authorize the application:");
    println!("\n  {}\n", request.url.cyan());
    Input::with_theme(&ColorfulTheme::default())
        .with_prompt("Paste the oauth_verifier parameter here")
        .interact_text()
}

fn print_authorized(user: &str) {
    println!("{} Authorized user {}", "✓".green().bold(), user.bold());
}

async fn run_digest(
    cli: &Cli,
    client: &FlickrClient,
    users: &FileStore,
    state_file: &StateFile,
    state: &mut State,
) -> Result<()> {
    let generator = DigestGenerator::from_path_or_builtin(&cli.template)?;
    let config = SmtpConfig::from_state(state).map_err(mail_failure)?;
    let sender = EmailSender::new(config);
    let options = RunOptions {
        lookback: cli.lookback.map(|hours| Duration::hours(i64::from(hours))),
        dry_run: cli.dry_run,
    };

    let run = DigestRun::new(client, users, &generator, &sender, state_file, options);
    let summary = match run.run(state).await {
        Ok(summary) => summary,
        Err(Error::Digest(e)) if e.is_mail_error() => return Err(mail_failure(e)),
        Err(e) => return Err(e.into()),
    };

    if cli.verbose {
        if let Some(html) = &summary.html {
            println!("{html}");
        }
    }
    if !cli.quiet {
        print_summary(&summary);
    }
    Ok(())
}

fn mail_failure(e: DigestError) -> anyhow::Error {
    eprintln!("{} {SMTP_HINT}", "✗".red().bold());
    Error::Digest(e).into()
}

fn print_summary(summary: &RunSummary) {
    if summary.total == 0 {
        println!("📭 No new photos");
        return;
    }

    println!("\n📊 Digest Summary");
    println!("   Users checked: {}", summary.users_checked);
    println!("   Users with new photos: {}", summary.users_with_photos);
    println!("   Photos: {}", summary.total);
    if summary.skipped_private > 0 {
        println!("   Private (skipped): {}", summary.skipped_private);
    }
    if summary.sent {
        println!("{} Digest sent", "✓".green().bold());
    } else {
        println!("{} Dry run, digest not sent", "ℹ".blue().bold());
    }
}
