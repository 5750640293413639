//! IMS administration CLI
//!
//! Database setup, account management and ledger verification, run against
//! the same `DATABASE_URL` as the server.

use std::io::{self, BufRead, Write};
use std::process;

use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use ims::{
    config::AppConfig,
    database::{create_database_pool, run_migrations, Database},
    i18n::Language,
    ledger::verify_history,
    models::{CreateUser, RoleName},
    services::{audit, catalog, users, Actor},
};
use serde_json::json;

type CliResult = Result<(), Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "ims-admin")]
#[command(about = "Administration tool for the IMS inventory service")]
#[command(version)]
struct Cli {
    /// Database connection URL (defaults to DATABASE_URL)
    #[arg(long)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply migrations and seed roles and default categories
    Init,

    /// Create a user account
    CreateUser {
        #[arg(long)]
        username: String,

        #[arg(long)]
        email: String,

        /// Read from stdin when omitted
        #[arg(long)]
        password: Option<String>,

        /// admin, manager or staff
        #[arg(long, default_value = "staff")]
        role: RoleName,

        /// en or bg
        #[arg(long, default_value = "en", value_parser = parse_language)]
        language: Language,
    },

    /// List user accounts with their roles
    ListUsers,

    /// Delete a user account
    DeleteUser {
        email: String,

        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },

    /// Replay every product's movement history and report breaks
    VerifyLedger,
}

fn parse_language(value: &str) -> Result<Language, String> {
    Language::from_code(value).ok_or_else(|| format!("unsupported language {value:?}, expected en or bg"))
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> CliResult {
    let mut config = match cli.database_url {
        Some(url) => AppConfig::from_lookup(|key| match key {
            "DATABASE_URL" => Some(url.clone()),
            other => std::env::var(other).ok(),
        })?,
        None => AppConfig::from_env()?,
    };
    config.database_max_connections = 2;

    let db = create_database_pool(&config.database_url, config.database_max_connections).await?;

    match cli.command {
        Commands::Init => handle_init(&db).await,
        Commands::CreateUser { username, email, password, role, language } => {
            let password = match password {
                Some(password) => password,
                None => prompt("Password: ")?,
            };
            let input = CreateUser { username, email, password, role, language };
            handle_create_user(&db, &config, input).await
        }
        Commands::ListUsers => handle_list_users(&db).await,
        Commands::DeleteUser { email, yes } => handle_delete_user(&db, &email, yes).await,
        Commands::VerifyLedger => handle_verify_ledger(&db).await,
    }
}

fn prompt(label: &str) -> io::Result<String> {
    print!("{label}");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

async fn handle_init(db: &Database) -> CliResult {
    run_migrations(db).await?;
    let report = users::seed_defaults(db).await?;
    println!("Migrations applied.");
    println!("Seeded {} roles and {} categories.", report.roles, report.categories);
    Ok(())
}

async fn handle_create_user(db: &Database, config: &AppConfig, input: CreateUser) -> CliResult {
    let role = input.role;
    let user = users::create_user(db, input, config.password_min_length).await?;
    audit::record(
        db,
        &Actor::system(),
        "user_created",
        Some("user"),
        Some(user.id),
        Some(json!({ "username": user.username, "role": role.as_str() })),
    )
    .await;
    println!("Created user {} <{}> with role {}.", user.username, user.email, role);
    Ok(())
}

async fn handle_list_users(db: &Database) -> CliResult {
    let listings = users::list_users(db).await?;
    if listings.is_empty() {
        println!("No users.");
        return Ok(());
    }

    println!("{:<20} {:<32} {:<16} {:<6} {:<4} {}", "USERNAME", "EMAIL", "ROLES", "ACTIVE", "2FA", "LAST LOGIN");
    for listing in &listings {
        println!(
            "{:<20} {:<32} {:<16} {:<6} {:<4} {}",
            listing.user.username,
            listing.user.email,
            listing.role_names,
            if listing.user.is_active { "yes" } else { "no" },
            if listing.user.has_two_factor() { "yes" } else { "no" },
            listing.last_login_text()
        );
    }
    Ok(())
}

async fn handle_delete_user(db: &Database, email: &str, yes: bool) -> CliResult {
    let Some(user) = users::find_by_email(db, email).await? else {
        return Err(format!("no user with email {email}").into());
    };

    if !yes {
        let answer = prompt(&format!("Delete user {} <{}>? [y/N] ", user.username, user.email))?;
        if !matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes") {
            println!("Aborted.");
            return Ok(());
        }
    }

    users::delete_user(db, user.id).await?;
    audit::record(
        db,
        &Actor::system(),
        "user_deleted",
        Some("user"),
        Some(user.id),
        Some(json!({ "username": user.username, "email": user.email })),
    )
    .await;
    println!("Deleted user {}.", user.username);
    Ok(())
}

async fn handle_verify_ledger(db: &Database) -> CliResult {
    let products = catalog::all_products(db).await?;
    let mut broken = 0usize;

    for product in &products {
        let history = catalog::movement_history(db, product.id).await?;
        if let Err(e) = verify_history(&history, product.quantity) {
            broken += 1;
            println!("BROKEN  {} ({}): {}", product.sku, product.id, e);
        }
    }

    println!("Checked {} products, {} with ledger breaks.", products.len(), broken);
    if broken > 0 {
        return Err(format!("{broken} products have inconsistent movement history").into());
    }
    Ok(())
}
