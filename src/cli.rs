//! Command line entry points: running the server and seeding the first user.

use clap::{Parser, Subcommand};
use tracing::info;

use crate::{
    app,
    config::AppConfig,
    error::ApiError,
    state::AppState,
    users::{dto::CreateUserRequest, services},
    validation::Input,
};

/// Logbook - authenticated REST API for users and their log records
#[derive(Parser, Debug)]
#[command(name = "logbook")]
#[command(version, about, long_about = None)]
#[command(after_help = r#"ENVIRONMENT VARIABLES:
    DATABASE_URL               Postgres URL (in-memory store when unset)
    DATABASE_MAX_CONNECTIONS   Pool size (default: 10)
    APP_HOST                   Bind address (default: 0.0.0.0)
    APP_PORT                   Listen port (default: 8080)
    RECORD_VISIBILITY          all | owner (default: all)
    RUST_LOG                   Log filter
    LOG_FORMAT                 Set to "json" for JSON logs
"#)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the HTTP server (default)
    Serve,
    /// Create a user that can obtain a token
    CreateUser {
        #[arg(long)]
        email: String,
        #[arg(long, env = "LOGBOOK_USER_PASSWORD", hide_env_values = true)]
        password: String,
    },
}

pub async fn run(cli: Cli, config: AppConfig) -> anyhow::Result<()> {
    let state = AppState::init(config).await?;
    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let config = state.config.clone();
            app::serve(app::build_app(state), &config).await
        }
        Command::CreateUser { email, password } => create_user(&state, email, password).await,
    }
}

async fn create_user(state: &AppState, email: String, password: String) -> anyhow::Result<()> {
    let req = CreateUserRequest {
        email: Input::Value(email),
        password: Input::Value(password),
    };
    match services::register(state, req).await {
        Ok(user) => {
            info!(user_id = user.id, email = %user.email, "user created");
            println!("created user {} <{}>", user.id, user.email);
            Ok(())
        }
        Err(ApiError::Validation(errors)) => {
            let details = serde_json::to_string(&errors)?;
            anyhow::bail!("invalid user: {details}")
        }
        Err(e) => Err(e.into()),
    }
}
