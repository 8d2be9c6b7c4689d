//! User commands - register, check credentials, show profile

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use dialoguer::{Input, Password};
use tally_core::domain::Registration;

use super::{get_context, log_outcome, Actor};
use crate::output;

#[derive(Subcommand)]
pub enum UserCommands {
    /// Register a new user
    Register {
        /// Username (prompted if omitted)
        username: Option<String>,
        /// Email address (prompted if omitted)
        #[arg(long)]
        email: Option<String>,
        /// Password (prompted if omitted)
        #[arg(long, env = "TALLY_PASSWORD", hide_env_values = true)]
        password: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check a username and password
    Login {
        username: String,
        /// Password (prompted if omitted)
        #[arg(long, env = "TALLY_PASSWORD", hide_env_values = true)]
        password: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the acting user
    Show {
        #[command(flatten)]
        actor: Actor,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(command: UserCommands) -> Result<()> {
    let ctx = get_context()?;

    match command {
        UserCommands::Register { username, email, password, json } => {
            let username = match username {
                Some(u) => u,
                None => Input::<String>::new().with_prompt("Username").interact_text()?,
            };
            let email = match email {
                Some(e) => e,
                None => Input::<String>::new().with_prompt("Email").interact_text()?,
            };
            let password = match password {
                Some(p) => p,
                None => Password::new()
                    .with_prompt("Password")
                    .with_confirmation("Confirm password", "Passwords do not match")
                    .interact()?,
            };

            let result = ctx
                .user_service
                .register(Registration::new(username, email, password));
            log_outcome(&ctx.logger, "user_register", None, &result);
            let user = result?;

            if json {
                return output::json(&user);
            }
            output::success(&format!("Registered user {} (id {})", user.username, user.id));
        }
        UserCommands::Login { username, password, json } => {
            let password = match password {
                Some(p) => p,
                None => Password::new().with_prompt("Password").interact()?,
            };

            let result = ctx.user_service.login(&username, &password);
            log_outcome(&ctx.logger, "user_login", None, &result);
            let user = result?;

            if json {
                return output::json(&user);
            }
            output::success(&format!("Credentials valid for {}", user.username));
            output::info(&format!("Act as this user with: export TALLY_USER={}", user.username));
        }
        UserCommands::Show { actor, json } => {
            let user = actor.resolve(&ctx)?;
            if json {
                return output::json(&user);
            }
            println!("{}", user.username.bold());
            println!("  ID:      {}", user.id);
            println!("  Email:   {}", user.email);
            println!("  Role:    {}", user.role);
            println!("  Since:   {}", output::format_time(&user.created_at));
        }
    }

    Ok(())
}
