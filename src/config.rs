use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Online library API with PDF books, ratings and premium subscriptions.
#[derive(Parser, Debug, Clone)]
#[command(name = "bookvault")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file.
    #[arg(short, long, env = "BOOKVAULT_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Start the server (default if no command given).
    Serve {
        /// Address to bind the server to.
        #[arg(short, long)]
        bind: Option<SocketAddr>,
    },

    /// User management commands.
    User {
        /// User subcommand action.
        #[command(subcommand)]
        action: UserCommand,
    },

    /// Initialize database, storage directory and default config.
    Init {
        /// Force overwrite existing config.
        #[arg(short, long)]
        force: bool,
    },

    /// Load demo books into an empty catalog.
    Seed,
}

/// User management subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum UserCommand {
    /// Add a new user.
    Add {
        /// Login email.
        email: String,
        /// Display name (defaults to the email's local part).
        #[arg(short, long)]
        name: Option<String>,
        /// Password (will prompt if not provided).
        #[arg(short, long)]
        password: Option<String>,
        /// User role (admin or member).
        #[arg(short, long, default_value = "member")]
        role: String,
    },

    /// Delete a user and their ratings.
    Del {
        /// Email of the user to delete.
        email: String,
    },

    /// List all users.
    List,

    /// Change user password.
    Passwd {
        /// Email of the user.
        email: String,
        /// New password (will prompt if not provided).
        #[arg(short, long)]
        password: Option<String>,
    },

    /// Change user role.
    Role {
        /// Email of the user.
        email: String,
        /// New role (admin or member).
        role: String,
    },
}

/// Main configuration from TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Authentication configuration.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Blob storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Catalog listing configuration.
    #[serde(default)]
    pub catalog: CatalogConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to.
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,

    /// Library title.
    #[serde(default = "default_title")]
    pub title: String,

    /// Public base URL prefixed to book links (empty for relative links).
    #[serde(default)]
    pub public_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            title: default_title(),
            public_url: String::new(),
        }
    }
}

fn default_bind() -> SocketAddr {
    SocketAddr::new(
        std::net::IpAddr::V4(std::net::Ipv4Addr::new(0, 0, 0, 0)),
        8080,
    )
}

fn default_title() -> String {
    "Online Library".to_string()
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/bookvault.db")
}

/// Authentication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Registration mode: "open", "disabled".
    #[serde(default = "default_registration")]
    pub registration: String,

    /// Session token duration in days.
    #[serde(default = "default_session_days")]
    pub session_days: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            registration: default_registration(),
            session_days: default_session_days(),
        }
    }
}

fn default_registration() -> String {
    "open".to_string()
}

fn default_session_days() -> u32 {
    30
}

impl AuthConfig {
    /// Check if registration is enabled.
    pub fn registration_enabled(&self) -> bool {
        self.registration == "open"
    }
}

/// Blob storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding uploaded PDFs and covers.
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,

    /// Maximum PDF upload size in megabytes.
    #[serde(default = "default_max_pdf_mb")]
    pub max_pdf_mb: u64,

    /// Maximum cover image upload size in megabytes.
    #[serde(default = "default_max_cover_mb")]
    pub max_cover_mb: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
            max_pdf_mb: default_max_pdf_mb(),
            max_cover_mb: default_max_cover_mb(),
        }
    }
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("data/storage")
}

fn default_max_pdf_mb() -> u64 {
    50
}

fn default_max_cover_mb() -> u64 {
    5
}

const MIB: u64 = 1024 * 1024;

impl StorageConfig {
    /// PDF size limit in bytes.
    pub fn max_pdf_bytes(&self) -> usize {
        usize::try_from(self.max_pdf_mb.saturating_mul(MIB)).unwrap_or(usize::MAX)
    }

    /// Cover size limit in bytes.
    pub fn max_cover_bytes(&self) -> usize {
        usize::try_from(self.max_cover_mb.saturating_mul(MIB)).unwrap_or(usize::MAX)
    }

    /// Request body limit for admin uploads (both files plus form overhead).
    pub fn upload_body_limit(&self) -> usize {
        self.max_pdf_bytes()
            .saturating_add(self.max_cover_bytes())
            .saturating_add(MIB as usize)
    }
}

/// Catalog listing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Page size when the client does not ask for one.
    #[serde(default = "default_per_page")]
    pub default_per_page: u32,

    /// Upper bound on client-requested page size.
    #[serde(default = "default_max_per_page")]
    pub max_per_page: u32,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            default_per_page: default_per_page(),
            max_per_page: default_max_per_page(),
        }
    }
}

fn default_per_page() -> u32 {
    12
}

fn default_max_per_page() -> u32 {
    100
}

impl Config {
    /// Load configuration from file.
    pub fn load(path: &PathBuf) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::error::AppError::Config(format!("Failed to read config file: {}", e))
        })?;

        toml::from_str(&content).map_err(|e| {
            crate::error::AppError::Config(format!("Failed to parse config file: {}", e))
        })
    }

    /// Find config file in default locations.
    pub fn find_config_file() -> Option<PathBuf> {
        let candidates = [
            PathBuf::from("config.toml"),
            PathBuf::from("bookvault.toml"),
            dirs::config_dir()
                .map(|p| p.join("bookvault").join("config.toml"))
                .unwrap_or_default(),
            PathBuf::from("/etc/bookvault/config.toml"),
        ];

        candidates.into_iter().find(|p| p.exists())
    }

    /// Generate default config file content.
    pub fn generate_default() -> String {
        r#"# bookvault configuration

[server]
bind = "0.0.0.0:8080"
title = "Online Library"
# Prefix for book URLs in API responses, e.g. "https://books.example.com"
public_url = ""

[database]
# path = "/var/lib/bookvault/bookvault.db"

[auth]
# Registration mode: "open" or "disabled"
registration = "open"
# Session duration in days
session_days = 30

[storage]
# root = "/var/lib/bookvault/storage"
max_pdf_mb = 50
max_cover_mb = 5

[catalog]
default_per_page = 12
max_per_page = 100
"#
        .to_string()
    }
}
