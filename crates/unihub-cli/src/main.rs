//! UniHub CLI - sign in to UniHub and manage your account from the terminal.
//!
//! One-shot commands over the unihub-core session stack. Credentials persist
//! under the local data directory, so the session survives between runs the
//! same way a browser session would.

mod commands;

use std::io;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

fn print_usage() {
    eprintln!("UniHub command-line client");
    eprintln!();
    eprintln!("Usage: unihub <command>");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  login [--remember]        Sign in (--remember stays signed in for 30 days)");
    eprintln!("  logout                    Sign out and forget stored credentials");
    eprintln!("  status                    Show session state and cached identity");
    eprintln!("  profile                   Fetch and show your profile");
    eprintln!("  profile --set k=v ...     Update profile fields (username, first_name,");
    eprintln!("                            last_name, date_of_birth, academic_year)");
    eprintln!("  signup                    Create an account; a verification code is emailed");
    eprintln!("  verify-otp [email]        Enter the emailed verification code");
    eprintln!("  reset-password            Request a password reset email");
    eprintln!("  reset-password --confirm  Finish a reset with the emailed uid and token");
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();
    info!("unihub starting");

    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("login") => commands::login(args.iter().any(|a| a == "--remember")).await,
        Some("logout") => commands::logout().await,
        Some("status") => commands::status().await,
        Some("profile") => {
            let edits: Vec<String> = args
                .iter()
                .skip(2)
                .filter(|a| *a != "--set")
                .cloned()
                .collect();
            commands::profile(edits).await
        }
        Some("signup") => commands::signup().await,
        Some("verify-otp") => commands::verify_otp(args.get(2).cloned()).await,
        Some("reset-password") => {
            commands::reset_password(args.iter().any(|a| a == "--confirm")).await
        }
        Some("--help") | Some("-h") | None => {
            print_usage();
            Ok(())
        }
        Some(other) => {
            eprintln!("Unknown command: {}", other);
            eprintln!();
            print_usage();
            std::process::exit(2);
        }
    }
}
