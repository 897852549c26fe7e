//! Auth command - sign in, registration and session management.

use std::path::PathBuf;

use anyhow::{Context as _, Result, bail};
use clap::{Args, Subcommand};
use console::{Style, style};
use serde::Serialize;

use lungvision_client::validation::{password_error, password_requirements};
use lungvision_client::{
    AffiliationType, DoctorRegistration, MessageKind, PurposeOfUse, RegisterRequest,
    ResearcherRegistration, Role, SessionContext, Specialization, UploadFile, User,
};

use super::{Context, PASSWORD_ENV, read_secret};

/// Arguments for the auth command.
#[derive(Args, Debug)]
pub struct AuthArgs {
    #[command(subcommand)]
    pub command: AuthCommand,
}

#[derive(Subcommand, Debug)]
pub enum AuthCommand {
    /// Sign in with email and password
    Login {
        /// Account email
        #[arg(long)]
        email: String,

        /// Portal to sign in through (doctor or researcher)
        #[arg(long)]
        role: Option<Role>,
    },

    /// Create a basic account
    Register {
        /// Account email
        #[arg(long)]
        email: String,

        /// Full name (letters and spaces)
        #[arg(long)]
        full_name: String,
    },

    /// Submit doctor onboarding
    RegisterDoctor(DoctorArgs),

    /// Submit researcher onboarding
    RegisterResearcher(ResearcherArgs),

    /// End the session and remove stored tokens
    Logout,

    /// Show the signed-in account
    Status,

    /// Ask the server whether the stored access token is still valid
    Verify,

    /// Exchange the refresh token for a new access token
    Refresh,
}

/// Fields shared by both onboarding flows.
#[derive(Args, Debug)]
pub struct ProfileArgs {
    /// Account email
    #[arg(long)]
    pub email: String,

    /// Full name (letters and spaces)
    #[arg(long)]
    pub full_name: String,

    /// Country of practice or study
    #[arg(long)]
    pub country: String,

    /// Contact phone number
    #[arg(long)]
    pub phone: Option<String>,

    /// Accept the terms of service
    #[arg(long)]
    pub accept_terms: bool,
}

#[derive(Args, Debug)]
pub struct DoctorArgs {
    #[command(flatten)]
    pub profile: ProfileArgs,

    /// Medical license number
    #[arg(long)]
    pub license_number: String,

    /// Specialization code (e.g. pulmonologist, radiologist)
    #[arg(long)]
    pub specialization: Specialization,

    /// Hospital or clinic affiliation
    #[arg(long)]
    pub hospital: String,

    /// Scan of the medical license (PDF, JPG or PNG, max 5 MB)
    #[arg(long)]
    pub license_file: PathBuf,
}

#[derive(Args, Debug)]
pub struct ResearcherArgs {
    #[command(flatten)]
    pub profile: ProfileArgs,

    /// Research institution
    #[arg(long)]
    pub institution: String,

    /// Affiliation code (e.g. phd_student, faculty)
    #[arg(long)]
    pub affiliation_type: AffiliationType,

    /// Purpose code (e.g. academic_research, model_testing)
    #[arg(long)]
    pub purpose: PurposeOfUse,

    /// ORCID identifier
    #[arg(long)]
    pub orcid: Option<String>,

    /// Institutional ID document (PDF, JPG or PNG, max 5 MB)
    #[arg(long)]
    pub id_file: PathBuf,
}

/// Status response for JSON output.
#[derive(Debug, Serialize)]
struct StatusOutput<'a> {
    authenticated: bool,
    server: &'a str,
    token_file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<User>,
}

/// Run the auth command.
pub async fn run(args: AuthArgs, ctx: &Context) -> Result<()> {
    let session = ctx.session()?;
    match args.command {
        AuthCommand::Login { email, role } => cmd_login(&session, ctx, &email, role).await,
        AuthCommand::Register { email, full_name } => {
            cmd_register(&session, ctx, email, full_name).await
        }
        AuthCommand::RegisterDoctor(args) => cmd_register_doctor(&session, ctx, args).await,
        AuthCommand::RegisterResearcher(args) => {
            cmd_register_researcher(&session, ctx, args).await
        }
        AuthCommand::Logout => cmd_logout(&session, ctx).await,
        AuthCommand::Status => cmd_status(&session, ctx).await,
        AuthCommand::Verify => cmd_verify(&session, ctx).await,
        AuthCommand::Refresh => cmd_refresh(&session, ctx).await,
    }
}

async fn cmd_login(
    session: &SessionContext,
    ctx: &Context,
    email: &str,
    role: Option<Role>,
) -> Result<()> {
    let password = read_secret("Password", PASSWORD_ENV)?;
    let result = match role {
        Some(role) => session.login_as(role, email, &password).await,
        None => session.login(email, &password).await,
    };
    let user = result.map_err(|e| ctx.fail(e))?;

    if ctx.json_output {
        return ctx.print_json(&user);
    }
    print_message(session);
    print_user(&user);
    Ok(())
}

async fn cmd_register(
    session: &SessionContext,
    ctx: &Context,
    email: String,
    full_name: String,
) -> Result<()> {
    let password = read_new_password(ctx)?;
    let request = RegisterRequest::new(full_name, email, password);
    let response = session.register(&request).await.map_err(|e| ctx.fail(e))?;

    if ctx.json_output {
        return ctx.print_json(&response);
    }
    print_message(session);
    if !response.detail.is_empty() {
        println!("  {}", response.detail);
    }
    Ok(())
}

async fn cmd_register_doctor(
    session: &SessionContext,
    ctx: &Context,
    args: DoctorArgs,
) -> Result<()> {
    let password = read_new_password(ctx)?;
    let registration = DoctorRegistration {
        full_name: args.profile.full_name,
        email: args.profile.email,
        confirm_password: password.clone(),
        password,
        country: args.profile.country,
        terms_accepted: args.profile.accept_terms,
        phone_number: args.profile.phone,
        medical_license_number: args.license_number,
        specialization: args.specialization,
        hospital_affiliation: args.hospital,
        medical_license_file: read_document(&args.license_file)?,
    };
    let response = session
        .register_doctor(&registration)
        .await
        .map_err(|e| ctx.fail(e))?;

    if ctx.json_output {
        return ctx.print_json(&response);
    }
    print_message(session);
    if let Some(user) = &response.user {
        print_user(user);
    }
    Ok(())
}

async fn cmd_register_researcher(
    session: &SessionContext,
    ctx: &Context,
    args: ResearcherArgs,
) -> Result<()> {
    let password = read_new_password(ctx)?;
    let registration = ResearcherRegistration {
        full_name: args.profile.full_name,
        email: args.profile.email,
        confirm_password: password.clone(),
        password,
        country: args.profile.country,
        terms_accepted: args.profile.accept_terms,
        phone_number: args.profile.phone,
        research_institution: args.institution,
        affiliation_type: args.affiliation_type,
        purpose_of_use: args.purpose,
        orcid_id: args.orcid,
        institutional_id_file: read_document(&args.id_file)?,
    };
    let response = session
        .register_researcher(&registration)
        .await
        .map_err(|e| ctx.fail(e))?;

    if ctx.json_output {
        return ctx.print_json(&response);
    }
    print_message(session);
    if let Some(user) = &response.user {
        print_user(user);
    }
    Ok(())
}

async fn cmd_logout(session: &SessionContext, ctx: &Context) -> Result<()> {
    let had_session = session.client().tokens().has_valid_tokens();
    session.logout().await;

    if ctx.json_output {
        return ctx.print_json(&serde_json::json!({ "logged_out": had_session }));
    }
    if had_session {
        println!("Logged out.");
    } else {
        println!("No active session.");
    }
    Ok(())
}

async fn cmd_status(session: &SessionContext, ctx: &Context) -> Result<()> {
    let user = session.current_user().await.map_err(|e| ctx.fail(e))?;
    let output = StatusOutput {
        authenticated: user.is_some(),
        server: session.client().base_url().as_str(),
        token_file: ctx.loaded.token_file().display().to_string(),
        user,
    };

    if ctx.json_output {
        return ctx.print_json(&output);
    }

    let dim = Style::new().dim();
    println!();
    println!("{}", style("Lung Vision Session").bold());
    println!("{}", dim.apply_to("─".repeat(40)));
    println!("  {} {}", dim.apply_to("Server:"), output.server);
    println!("  {} {}", dim.apply_to("Tokens:"), output.token_file);
    match &output.user {
        Some(user) => {
            println!(
                "  {} {}",
                dim.apply_to("Status:"),
                Style::new().green().apply_to("● signed in")
            );
            print_user(user);
        }
        None => {
            println!(
                "  {} {}",
                dim.apply_to("Status:"),
                Style::new().red().apply_to("○ not logged in")
            );
            println!();
            println!("Run 'lungvision auth login --email <email>' to sign in.");
        }
    }
    println!();
    Ok(())
}

async fn cmd_verify(session: &SessionContext, ctx: &Context) -> Result<()> {
    let valid = session.verify().await;

    if ctx.json_output {
        return ctx.print_json(&serde_json::json!({ "valid": valid }));
    }
    if valid {
        println!("{}", Style::new().green().apply_to("Access token is valid."));
    } else {
        println!("{}", Style::new().red().apply_to("Access token is missing or invalid."));
    }
    Ok(())
}

async fn cmd_refresh(session: &SessionContext, ctx: &Context) -> Result<()> {
    let response = session.refresh().await.map_err(|e| ctx.fail(e))?;

    if ctx.json_output {
        return ctx.print_json(&serde_json::json!({
            "refreshed": true,
            "rotated_refresh_token": response.refresh.is_some(),
        }));
    }
    println!("Access token refreshed.");
    if response.refresh.is_some() {
        println!("Refresh token rotated.");
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Prompt for a new password twice and check it against the strength rules.
fn read_new_password(ctx: &Context) -> Result<String> {
    let password = read_secret("Password", PASSWORD_ENV)?;

    if password_error(&password).is_some() {
        if !ctx.json_output {
            eprintln!("Password does not meet the requirements:");
            for requirement in password_requirements(&password) {
                let mark = if requirement.met {
                    Style::new().green().apply_to("✓")
                } else {
                    Style::new().red().apply_to("✗")
                };
                eprintln!("  {} {}", mark, requirement.label);
            }
        }
        bail!(password_error(&password).unwrap_or("Invalid password"));
    }

    // Scripted runs supply the password once.
    if std::env::var(PASSWORD_ENV).is_ok_and(|v| !v.is_empty()) {
        return Ok(password);
    }
    let confirm = rpassword::prompt_password("Confirm password: ")
        .context("Failed to read password")?;
    if confirm != password {
        bail!("Passwords don't match");
    }
    Ok(password)
}

fn read_document(path: &std::path::Path) -> Result<UploadFile> {
    UploadFile::from_path(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn print_message(session: &SessionContext) {
    if let Some(message) = session.message() {
        let styled = match message.kind {
            MessageKind::Success => Style::new().green().apply_to(message.text),
            MessageKind::Error => Style::new().red().apply_to(message.text),
        };
        println!("{}", styled);
    }
}

fn print_user(user: &User) {
    let dim = Style::new().dim();
    println!("  {} {}", dim.apply_to("Name:"), user.full_name);
    println!("  {} {}", dim.apply_to("Email:"), user.email);
    println!("  {} {}", dim.apply_to("Role:"), user.role.label());
    if let Some(status) = user.account_status {
        println!("  {} {}", dim.apply_to("Account:"), status.label());
    }
}
