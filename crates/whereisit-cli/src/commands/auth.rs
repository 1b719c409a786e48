//! Auth commands - register, sign in, sign out and session status
//!
//! Provides the `whereisit auth` subcommands:
//! 1. `register`       - Creates an identity, pushes the profile, opens a session
//! 2. `login`          - Email/password sign-in
//! 3. `login-provider` - Browser consent flow with the external provider
//! 4. `logout`         - Ends both sessions and forgets the stored identity
//! 5. `status`         - Shows the current session

use std::io::BufRead;

use anyhow::{Context, Result};
use clap::Subcommand;
use tracing::info;

use whereisit_core::domain::{NewProfile, UserProfile};

use crate::app::App;
use crate::commands::user_facing;
use crate::output::{get_formatter, user_line, OutputFormat, OutputFormatter};

/// Environment variable read before prompting for a password
pub const PASSWORD_ENV: &str = "WHEREISIT_PASSWORD";

#[derive(Debug, Subcommand)]
pub enum AuthCommand {
    /// Create an account
    Register {
        /// Email address for the account
        #[arg(long)]
        email: String,
        /// Display name
        #[arg(long)]
        name: String,
        /// Avatar URL
        #[arg(long)]
        photo_url: Option<String>,
    },
    /// Sign in with email and password
    Login {
        /// Email address
        #[arg(long)]
        email: String,
    },
    /// Sign in through the external provider in a browser
    LoginProvider,
    /// Sign out and forget the stored identity
    Logout,
    /// Show the current session
    Status,
}

impl AuthCommand {
    pub async fn execute(&self, app: &App, format: OutputFormat) -> Result<()> {
        let fmt = get_formatter(format == OutputFormat::Json);
        match self {
            AuthCommand::Register {
                email,
                name,
                photo_url,
            } => {
                let password = read_password()?;
                let profile = NewProfile {
                    display_name: name.clone(),
                    photo_url: photo_url.clone(),
                };
                let user = app
                    .bridge
                    .sign_up(email, &password, profile)
                    .await
                    .map_err(user_facing)?;
                report_signed_in(&*fmt, format, "Account created", &user);
                Ok(())
            }
            AuthCommand::Login { email } => {
                let password = read_password()?;
                let user = app
                    .bridge
                    .sign_in(email, &password)
                    .await
                    .map_err(user_facing)?;
                report_signed_in(&*fmt, format, "Signed in", &user);
                Ok(())
            }
            AuthCommand::LoginProvider => {
                fmt.info("Opening your browser to complete sign-in...");
                let user = app
                    .bridge
                    .sign_in_with_external_provider()
                    .await
                    .map_err(user_facing)?;
                report_signed_in(&*fmt, format, "Signed in", &user);
                Ok(())
            }
            AuthCommand::Logout => self.execute_logout(app, &*fmt, format).await,
            AuthCommand::Status => {
                self.execute_status(app, &*fmt, format);
                Ok(())
            }
        }
    }

    async fn execute_logout(
        &self,
        app: &App,
        fmt: &dyn OutputFormatter,
        format: OutputFormat,
    ) -> Result<()> {
        let was = app.session().user().map(|user| user.email.to_string());
        let report = app.bridge.sign_out().await;
        info!(clean = report.is_clean(), "Sign-out finished");

        if format == OutputFormat::Json {
            fmt.print_json(&serde_json::json!({
                "success": true,
                "email": was,
                "backend_error": report.backend_error.as_ref().map(|e| e.to_string()),
                "identity_error": report.identity_error.as_ref().map(|e| e.to_string()),
            }));
            return Ok(());
        }

        match was {
            Some(email) => fmt.success(&format!("Signed out {email}")),
            None => fmt.success("Signed out"),
        }
        if let Some(e) = &report.backend_error {
            fmt.warn(&format!("The server did not confirm the logout: {e}"));
        }
        if let Some(e) = &report.identity_error {
            fmt.warn(&format!("The stored identity may not have been removed: {e}"));
        }
        Ok(())
    }

    fn execute_status(&self, app: &App, fmt: &dyn OutputFormatter, format: OutputFormat) {
        let session = app.session();

        if format == OutputFormat::Json {
            fmt.print_json(&serde_json::json!({
                "status": session.status(),
                "user": session.user(),
            }));
            return;
        }

        match session.user() {
            Some(user) => {
                fmt.success(&format!("Signed in as {}", user_line(user)));
                if user.is_admin() {
                    fmt.info("Administrator access");
                }
            }
            None => {
                fmt.info(&format!("Session: {}", session.status()));
                fmt.info("Run 'whereisit auth login --email <address>' to sign in");
            }
        }
    }
}

fn report_signed_in(
    fmt: &dyn OutputFormatter,
    format: OutputFormat,
    headline: &str,
    user: &UserProfile,
) {
    if format == OutputFormat::Json {
        fmt.print_json(&serde_json::json!({"success": true, "user": user}));
    } else {
        fmt.success(&format!("{headline}: {}", user_line(user)));
    }
}

/// Password from `WHEREISIT_PASSWORD`, or the first line of stdin
fn read_password() -> Result<String> {
    if let Ok(password) = std::env::var(PASSWORD_ENV) {
        return Ok(password);
    }
    eprint!("Password: ");
    read_password_from(std::io::stdin().lock())
}

fn read_password_from(mut input: impl BufRead) -> Result<String> {
    let mut line = String::new();
    input
        .read_line(&mut line)
        .context("Failed to read password from stdin")?;
    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        anyhow::bail!("No password given; set {PASSWORD_ENV} or type it on stdin");
    }
    Ok(password)
}
