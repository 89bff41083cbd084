//! bookvault server entry point.

use bookvault::{
    auth::AuthService,
    config::{Cli, Command, Config, UserCommand},
    db::{Database, now_timestamp, timestamp_to_datetime},
    library::{BookManager, UploadLimits, seed_demo_catalog},
    server,
    storage::{BlobStore, FsBlobStore},
};
use clap::Parser;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Find or load config
    let config_path = cli.config.clone().or_else(Config::find_config_file);

    let config = if let Some(ref path) = config_path {
        Config::load(path)?
    } else {
        Config::default()
    };

    match cli.command {
        Some(Command::Init { force }) => cmd_init(force).await,
        Some(Command::User { action }) => cmd_user(action, &config).await,
        Some(Command::Seed) => cmd_seed(&config).await,
        Some(Command::Serve { bind }) => cmd_serve(config, bind).await,
        None => cmd_serve(config, None).await,
    }
}

/// Initialize config, database and storage directory.
async fn cmd_init(force: bool) -> anyhow::Result<()> {
    let config_path = PathBuf::from("config.toml");

    if config_path.exists() && !force {
        anyhow::bail!(
            "Config file already exists: {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    std::fs::write(&config_path, Config::generate_default())?;
    println!("Created config file: {}", config_path.display());

    let config = Config::default();
    if let Some(parent) = config.database.path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let _db = Database::open(&config.database.path)?;
    println!("Initialized database: {}", config.database.path.display());

    let store = FsBlobStore::new(&config.storage.root)?;
    println!("Initialized storage: {}", store.root().display());

    println!("\nEdit config.toml to configure your server.");
    println!("Then create an admin: bookvault user add <email> --role admin");

    Ok(())
}

/// Load the demo catalog.
async fn cmd_seed(config: &Config) -> anyhow::Result<()> {
    let db = Database::open(&config.database.path)?;
    let blobs: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(&config.storage.root)?);
    let books = BookManager::new(db.clone(), blobs, UploadLimits::from(&config.storage));

    let created = seed_demo_catalog(&db, &books, now_timestamp())?;
    if created == 0 {
        println!("Catalog already has books, nothing seeded.");
    } else {
        println!("Seeded {} demo books.", created);
    }

    Ok(())
}

/// User management commands.
async fn cmd_user(action: UserCommand, config: &Config) -> anyhow::Result<()> {
    let db = Database::open(&config.database.path)?;
    let auth = AuthService::new(
        db,
        config.auth.session_days,
        config.auth.registration_enabled(),
    );

    match action {
        UserCommand::Add {
            email,
            name,
            password,
            role,
        } => {
            let password = match password {
                Some(p) => p,
                None => prompt_password("Password: ")?,
            };
            let name = name.unwrap_or_else(|| {
                email
                    .split_once('@')
                    .map(|(local, _)| local.to_string())
                    .unwrap_or_else(|| email.clone())
            });

            let user = auth.create_user(&name, &email, &password, &role)?;
            println!(
                "Created user: {} (role: {}, id: {})",
                user.email,
                user.role.as_str(),
                user.id
            );
        }

        UserCommand::Del { email } => {
            if auth.delete_user(&email)? {
                println!("Deleted user: {}", email);
            } else {
                println!("User not found: {}", email);
            }
        }

        UserCommand::List => {
            let users = auth.list_users()?;
            if users.is_empty() {
                println!("No users found.");
            } else {
                println!(
                    "{:<32} {:<8} {:<10} {:<17} LAST LOGIN",
                    "EMAIL", "ROLE", "PLAN", "EXPIRES"
                );
                println!("{}", "-".repeat(90));
                for user in users {
                    let format_ts = |ts: i64| {
                        timestamp_to_datetime(ts)
                            .format("%Y-%m-%d %H:%M")
                            .to_string()
                    };
                    let expires = user
                        .subscription_expires_at
                        .map(format_ts)
                        .unwrap_or_else(|| "-".to_string());
                    let last_login = user
                        .last_login
                        .map(format_ts)
                        .unwrap_or_else(|| "never".to_string());
                    println!(
                        "{:<32} {:<8} {:<10} {:<17} {}",
                        user.email,
                        user.role.as_str(),
                        user.subscription_type.as_str(),
                        expires,
                        last_login
                    );
                }
            }
        }

        UserCommand::Passwd { email, password } => {
            let password = match password {
                Some(p) => p,
                None => prompt_password("New password: ")?,
            };

            if auth.change_password(&email, &password)? {
                println!("Password changed for: {}", email);
            } else {
                println!("User not found: {}", email);
            }
        }

        UserCommand::Role { email, role } => {
            if auth.set_role(&email, &role)? {
                println!("Role of {} set to {}", email, role);
            } else {
                println!("User not found: {}", email);
            }
        }
    }

    Ok(())
}

/// Start the server.
async fn cmd_serve(mut config: Config, bind: Option<std::net::SocketAddr>) -> anyhow::Result<()> {
    if let Some(addr) = bind {
        config.server.bind = addr;
    }

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bookvault=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Some(parent) = config.database.path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let db = Database::open(&config.database.path)?;
    let blobs: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(&config.storage.root)?);

    tracing::info!(
        bind = %config.server.bind,
        database = %config.database.path.display(),
        storage = %config.storage.root.display(),
        "Starting bookvault server"
    );

    let expired = db.cleanup_expired_sessions()?;
    if expired > 0 {
        tracing::info!(sessions = expired, "Removed expired sessions");
    }

    let bind_addr = config.server.bind;
    let state = server::AppState::new(config, db, blobs);
    let app = server::create_router(state);

    let listener = TcpListener::bind(bind_addr).await?;
    tracing::info!(address = %bind_addr, "Server listening");

    axum::serve(listener, app).await?;

    Ok(())
}

/// Prompt for password input.
fn prompt_password(prompt: &str) -> anyhow::Result<String> {
    print!("{}", prompt);
    io::stdout().flush()?;

    let mut password = String::new();
    io::stdin().read_line(&mut password)?;

    Ok(password.trim().to_string())
}
