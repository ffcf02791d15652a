//! Command implementations for the unihub binary.
//!
//! Every command wires the same stack: config, credential store, API client,
//! session manager, profile cache. Interactive input comes from stdin, with
//! passwords read without echo.

use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use tracing::debug;

use unihub_core::api::types::{PasswordResetConfirmRequest, SignupRequest};
use unihub_core::{
    ApiClient, Config, CredentialStore, ProfileCache, ProfileUpdate, SessionManager, SessionState,
    UserProfile,
};

/// How long `login` waits for the profile mirror to warm up before exiting.
const PROFILE_WARMUP_TIMEOUT: Duration = Duration::from_secs(5);

/// The wired session stack plus config, shared by every command.
struct App {
    config: Config,
    session: Arc<SessionManager>,
    profile: Arc<ProfileCache>,
}

fn open() -> Result<App> {
    let config = Config::load()?;
    let store = Arc::new(match Config::state_dir() {
        Ok(dir) => CredentialStore::open(&dir),
        Err(e) => {
            debug!(error = %e, "No state directory, credentials stay in memory");
            CredentialStore::in_memory()
        }
    });
    let api = Arc::new(ApiClient::new(&config.api_base_url())?);
    let session = Arc::new(SessionManager::new(Arc::clone(&api), Arc::clone(&store)));
    let profile = Arc::new(ProfileCache::new(api, Arc::clone(&session), store));
    Ok(App {
        config,
        session,
        profile,
    })
}

pub async fn login(remember: bool) -> Result<()> {
    let mut app = open()?;
    if app.session.initialize().await == SessionState::Authenticated {
        match app.profile.hydrate_from_mirror() {
            Some(user) => println!("Already signed in as {}", user.display_name()),
            None => println!("Already signed in"),
        }
        return Ok(());
    }

    let email = prompt_with_default("Email", app.config.last_email.as_deref())?;
    if email.is_empty() {
        bail!("Email is required");
    }
    let password = rpassword::prompt_password("Password: ")?;
    if password.is_empty() {
        bail!("Password is required");
    }

    let mut profile_rx = app.profile.subscribe();
    let _watcher = Arc::clone(&app.profile).attach();

    let user = app
        .session
        .login(&email, &password, remember)
        .await
        .map_err(|e| anyhow::anyhow!("Sign-in failed: {}", e))?;
    println!("Signed in as {}", user.display_name());

    app.config.last_email = Some(email);
    if let Err(e) = app.config.save() {
        debug!(error = %e, "Could not save config");
    }

    // The watcher is fetching the profile into the local mirror; give it a
    // bounded moment so `status` can answer offline next time.
    let _ = tokio::time::timeout(PROFILE_WARMUP_TIMEOUT, profile_rx.wait_for(|p| p.is_some()))
        .await;
    Ok(())
}

pub async fn logout() -> Result<()> {
    let app = open()?;
    app.session.logout();
    app.profile.clear_user_profile();
    println!("Signed out");
    Ok(())
}

pub async fn status() -> Result<()> {
    let app = open()?;
    // Local reads only - no network, no refresh attempt spent.
    let access_valid = app.session.access_token().is_some();
    if !access_valid && !app.session.has_refresh_credential() {
        println!("Session:  unauthenticated");
        return Ok(());
    }

    println!("Session:  authenticated");
    match app.session.access_expires_at() {
        Some(expires) if access_valid => {
            println!("Access:   valid until {}", expires.format("%Y-%m-%d %H:%M UTC"));
        }
        _ => println!("Access:   expired, renews on next use"),
    }
    if let Some(user) = app.profile.hydrate_from_mirror() {
        println!("User:     {} ({})", user.display_name(), user.email);
    }
    Ok(())
}

pub async fn profile(edits: Vec<String>) -> Result<()> {
    let app = open()?;
    if app.session.initialize().await != SessionState::Authenticated {
        bail!("Not signed in - run `unihub login` first");
    }

    if edits.is_empty() {
        let user = app.profile.fetch_user_profile().await?;
        print_profile(&user);
    } else {
        let patch = parse_profile_edits(&edits)?;
        let user = app.profile.update_profile(&patch).await?;
        println!("Profile updated");
        print_profile(&user);
    }
    Ok(())
}

pub async fn signup() -> Result<()> {
    let app = open()?;
    println!("Create a UniHub account. Optional fields can be left blank.");

    let email = prompt("Email")?;
    let username = prompt("Username")?;
    let first_name = prompt("First name")?;
    let last_name = prompt("Last name")?;
    let date_of_birth = match prompt("Date of birth YYYY-MM-DD (optional)")? {
        s if s.is_empty() => None,
        s => Some(
            s.parse::<NaiveDate>()
                .context("Invalid date, expected YYYY-MM-DD")?,
        ),
    };
    let academic_year = match prompt("Academic year (optional)")? {
        s if s.is_empty() => None,
        s => Some(s.parse::<i32>().context("Invalid academic year")?),
    };
    let password = rpassword::prompt_password("Password: ")?;
    let password2 = rpassword::prompt_password("Repeat password: ")?;

    let request = SignupRequest {
        email,
        username,
        password,
        password2,
        first_name,
        last_name,
        date_of_birth,
        academic_year,
    };
    let response = app.session.signup(&request).await?;
    println!("{}", response.message);
    println!(
        "Check {} for the code, then run `unihub verify-otp {}`.",
        response.email, response.email
    );
    Ok(())
}

pub async fn verify_otp(email: Option<String>) -> Result<()> {
    let app = open()?;
    let email = match email {
        Some(email) => email,
        None => prompt("Email")?,
    };
    if email.is_empty() {
        bail!("Email is required");
    }
    let otp = prompt("Verification code")?;
    if otp.is_empty() {
        bail!("Verification code is required");
    }

    let message = app.session.verify_otp(&email, &otp).await?;
    println!("{}", message);
    println!("Run `unihub login` to sign in.");
    Ok(())
}

pub async fn reset_password(confirm: bool) -> Result<()> {
    let app = open()?;
    if confirm {
        let uid = prompt("Reset uid")?;
        let token = prompt("Reset token")?;
        let new_password = rpassword::prompt_password("New password: ")?;
        let confirm_password = rpassword::prompt_password("Repeat new password: ")?;
        let request = PasswordResetConfirmRequest {
            uid,
            token,
            new_password,
            confirm_password,
        };
        let message = app.session.confirm_password_reset(&request).await?;
        println!("{}", message);
    } else {
        let email = prompt("Email")?;
        if email.is_empty() {
            bail!("Email is required");
        }
        let message = app.session.request_password_reset(&email).await?;
        println!("{}", message);
    }
    Ok(())
}

fn print_profile(user: &UserProfile) {
    println!("Id:             {}", user.id);
    println!("Username:       {}", user.username);
    println!("Email:          {}", user.email);
    println!("Name:           {}", user.full_name());
    if let Some(dob) = user.date_of_birth {
        println!("Date of birth:  {}", dob);
    }
    if let Some(year) = user.academic_year {
        println!("Academic year:  {}", year);
    }
}

fn parse_profile_edits(edits: &[String]) -> Result<ProfileUpdate> {
    let mut patch = ProfileUpdate::default();
    for edit in edits {
        let (field, value) = edit
            .split_once('=')
            .with_context(|| format!("Expected field=value, got '{}'", edit))?;
        match field {
            "username" => patch.username = Some(value.to_string()),
            "first_name" => patch.first_name = Some(value.to_string()),
            "last_name" => patch.last_name = Some(value.to_string()),
            "date_of_birth" => {
                patch.date_of_birth = Some(
                    value
                        .parse::<NaiveDate>()
                        .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", value))?,
                );
            }
            "academic_year" => {
                patch.academic_year = Some(
                    value
                        .parse()
                        .with_context(|| format!("Invalid academic year '{}'", value))?,
                );
            }
            other => bail!("Unknown profile field '{}'", other),
        }
    }
    if patch.is_empty() {
        bail!("Nothing to update");
    }
    Ok(patch)
}

fn prompt(label: &str) -> Result<String> {
    print!("{}: ", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn prompt_with_default(label: &str, default: Option<&str>) -> Result<String> {
    let value = match default {
        Some(d) => prompt(&format!("{} [{}]", label, d))?,
        None => prompt(label)?,
    };
    if value.is_empty() {
        if let Some(d) = default {
            return Ok(d.to_string());
        }
    }
    Ok(value)
}
