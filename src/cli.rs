use anyhow::{bail, Context, Result};
use clap::builder::styling::{AnsiColor, Color, Style};
use clap::builder::Styles;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use jukebox_server::config::JWT_SECRET_ENV;
use jukebox_server::user::{SqliteUserStore, TokenSigner, User, UserStore};

fn get_styles() -> Styles {
    Styles::styled()
        .usage(
            Style::new()
                .bold()
                .underline()
                .fg_color(Some(Color::Ansi(AnsiColor::Cyan))),
        )
        .header(
            Style::new()
                .bold()
                .underline()
                .fg_color(Some(Color::Ansi(AnsiColor::Cyan))),
        )
        .literal(
            Style::new()
                .bold()
                .fg_color(Some(Color::Ansi(AnsiColor::Green))),
        )
        .error(
            Style::new()
                .bold()
                .fg_color(Some(Color::Ansi(AnsiColor::Red))),
        )
        .placeholder(Style::new().fg_color(Some(Color::Ansi(AnsiColor::BrightBlack))))
}

fn parse_path(s: &str) -> Result<PathBuf> {
    let original_path = PathBuf::from(s);
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
#[command(styles = get_styles(), about = "Manage jukebox users and connection tokens")]
struct CliArgs {
    /// Directory containing user.db, the same one the server uses.
    #[clap(long, value_parser = parse_path)]
    pub db_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// User management.
    #[command(subcommand)]
    User(UserCommand),

    /// Prints a signed connection token for a user and channel.
    Token {
        username: String,
        channel: String,

        /// Secret the server signs tokens with. Falls back to $JWT_SECRET.
        #[clap(long)]
        jwt_secret: Option<String>,

        /// How long the token stays valid, in hours.
        #[clap(long, default_value_t = 24 * 30)]
        valid_hours: u64,
    },
}

#[derive(Subcommand, Debug)]
enum UserCommand {
    /// Creates a user.
    Add { username: String, name: String },

    /// Lets a user join a channel, optionally as one of its owners.
    Grant {
        username: String,
        channel: String,
        #[clap(long)]
        owner: bool,
    },

    /// Removes a user's access to a channel.
    Revoke { username: String, channel: String },

    /// Shows every user and the channels they can join.
    List,
}

fn find_user(store: &SqliteUserStore, username: &str) -> Result<User> {
    match store.get_user_by_username(username)? {
        Some(user) => Ok(user),
        None => bail!("User '{}' not found", username),
    }
}

fn run_user_command(store: &SqliteUserStore, command: UserCommand) -> Result<()> {
    match command {
        UserCommand::Add { username, name } => {
            let user = store.create_user(&username, &name)?;
            println!("Created user '{}' ({})", user.username, user.id);
        }
        UserCommand::Grant {
            username,
            channel,
            owner,
        } => {
            let user = find_user(store, &username)?;
            store.grant_channel(&user.id, &channel, owner)?;
            let role = if owner { "owner" } else { "member" };
            println!("'{}' is now {} of '{}'", username, role, channel);
        }
        UserCommand::Revoke { username, channel } => {
            let user = find_user(store, &username)?;
            if store.revoke_channel(&user.id, &channel)? {
                println!("Revoked '{}' from '{}'", username, channel);
            } else {
                println!("'{}' had no access to '{}'", username, channel);
            }
        }
        UserCommand::List => {
            for user in store.get_all_users()? {
                println!("{} ({}) {}", user.username, user.name, user.id);
                for membership in store.get_channels(&user.id)? {
                    let marker = if membership.is_owner { " [owner]" } else { "" };
                    println!("  - {}{}", membership.channel, marker);
                }
            }
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    let db_path = cli_args.db_dir.join("user.db");
    let store = SqliteUserStore::new(&db_path)
        .with_context(|| format!("Failed to open user database at {:?}", db_path))?;

    match cli_args.command {
        Command::User(command) => run_user_command(&store, command),
        Command::Token {
            username,
            channel,
            jwt_secret,
            valid_hours,
        } => {
            let secret = match jwt_secret.or_else(|| std::env::var(JWT_SECRET_ENV).ok()) {
                Some(secret) if !secret.is_empty() => secret,
                _ => bail!("No JWT secret given (use --jwt-secret or ${})", JWT_SECRET_ENV),
            };
            let user = find_user(&store, &username)?;
            if store.get_membership(&user.id, &channel)?.is_none() {
                bail!("'{}' has no access to '{}'", username, channel);
            }
            let token = TokenSigner::new(&secret).issue(
                &user.id,
                &channel,
                Duration::from_secs(valid_hours * 3600),
            )?;
            println!("{}", token);
            Ok(())
        }
    }
}
