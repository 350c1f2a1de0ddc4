//! Letterbox CLI - runs the API server and inspects its database.
//!
//! Settings come from flags, falling back to the environment. A `.env` file
//! in the working directory is loaded first.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use letterbox_common::{LetterId, UserId};
use letterbox_drive::{AuthConfig, AuthManager, DriveEndpoints, GoogleDocsClient};
use letterbox_storage::{CredentialStore, Database, LetterStore};
use letterbox_sync::ImportConfig;
use letterbox_web::{AppState, WebConfig};

#[derive(Parser)]
#[command(name = "letterbox")]
#[command(about = "Letterbox - letters mirrored to Google Drive")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// SQLite database path (default: platform data dir).
    #[arg(long, env = "LETTERBOX_DB", global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API.
    Serve(ServeArgs),

    /// List users and the state of their Drive credential.
    Users,

    /// Manage a user's letters.
    #[command(subcommand)]
    Letters(LetterCommands),
}

#[derive(Subcommand)]
enum LetterCommands {
    /// List a user's letters and where they were exported.
    List {
        /// User id.
        #[arg(short, long)]
        user: String,
    },

    /// Write a new draft letter for a user.
    Create {
        /// User id.
        #[arg(short, long)]
        user: String,

        /// Letter title (default: "Untitled Letter").
        #[arg(short, long, default_value = "")]
        title: String,

        /// Letter body.
        #[arg(short, long, default_value = "")]
        content: String,
    },
}

#[derive(Args)]
struct ServeArgs {
    /// OAuth client id.
    #[arg(long, env = "GOOGLE_CLIENT_ID")]
    client_id: String,

    /// OAuth client secret.
    #[arg(long, env = "GOOGLE_CLIENT_SECRET", hide_env_values = true)]
    client_secret: String,

    /// Redirect URI registered with Google.
    #[arg(
        long,
        env = "GOOGLE_REDIRECT_URI",
        default_value = "http://localhost:5000/auth/provider/callback"
    )]
    redirect_uri: String,

    /// Secret for session cookie MACs.
    #[arg(long, env = "SESSION_SECRET", hide_env_values = true)]
    session_secret: String,

    /// Frontend origin: CORS and post-login redirect.
    #[arg(long, env = "FRONTEND_URL", default_value = "http://localhost:3000")]
    frontend_url: String,

    /// Issue `Secure` cookies.
    #[arg(long, env = "LETTERBOX_PRODUCTION")]
    production: bool,

    /// Address to bind.
    #[arg(long, default_value = "0.0.0.0")]
    bind: IpAddr,

    /// Port to listen on.
    #[arg(short, long, env = "PORT", default_value_t = 5000)]
    port: u16,

    /// Maximum concurrent document fetches per import.
    #[arg(long, default_value_t = 8)]
    import_concurrency: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine; the environment may already be set.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let db = open_database(cli.db)?;

    match cli.command {
        Commands::Serve(args) => cmd_serve(db, args).await,
        Commands::Users => cmd_users(db),
        Commands::Letters(LetterCommands::List { user }) => cmd_letters(db, &user),
        Commands::Letters(LetterCommands::Create {
            user,
            title,
            content,
        }) => cmd_create_letter(db, &user, &title, &content).map(|_| ()),
    }
}

/// Open the database, creating its directory if needed.
fn open_database(path: Option<PathBuf>) -> Result<Database> {
    let path = match path {
        Some(path) => path,
        None => dirs::data_dir()
            .context("No platform data directory; pass --db")?
            .join("letterbox")
            .join("letterbox.db"),
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    Database::open(&path).with_context(|| format!("Failed to open database {}", path.display()))
}

/// Run the API server.
async fn cmd_serve(db: Database, args: ServeArgs) -> Result<()> {
    let web = WebConfig {
        frontend_url: args.frontend_url,
        session_secret: args.session_secret,
        production: args.production,
    };
    web.validate().context("Invalid web configuration")?;

    let auth = AuthManager::new(AuthConfig::new(
        args.client_id,
        args.client_secret,
        args.redirect_uri,
    ))
    .context("Invalid OAuth configuration")?;
    let docs = GoogleDocsClient::new(DriveEndpoints::default())
        .context("Failed to create Drive client")?;
    let import = ImportConfig {
        max_concurrent_fetches: args.import_concurrency,
    };

    let state = AppState::new(db, auth, Arc::new(docs), web, import);
    let addr = SocketAddr::new(args.bind, args.port);
    info!("Starting Letterbox {}", env!("CARGO_PKG_VERSION"));

    letterbox_web::serve(Arc::new(state), addr)
        .await
        .context("Server stopped")?;
    Ok(())
}

/// List users.
fn cmd_users(db: Database) -> Result<()> {
    let users = CredentialStore::new(db).list().context("Failed to list users")?;

    if users.is_empty() {
        println!("No users.");
        return Ok(());
    }

    println!("Users:");
    for user in users {
        let expiry = user
            .credential
            .expires_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "-".to_string());
        println!("  {} {} <{}>", user.id, user.display_name, user.email);
        println!(
            "    Provider: {}  Credential: {}  Refresh token: {}  Expires: {}",
            user.provider_id,
            user.credential_state,
            if user.credential.has_refresh_token() { "yes" } else { "no" },
            expiry
        );
    }

    Ok(())
}

/// List a user's letters.
fn cmd_letters(db: Database, user: &str) -> Result<()> {
    let user_id = UserId::new(user).context("Invalid user id")?;
    let letters = LetterStore::new(db)
        .list_for_author(&user_id)
        .context("Failed to list letters")?;

    if letters.is_empty() {
        println!("No letters.");
        return Ok(());
    }

    for letter in letters {
        let status = if letter.is_draft { "draft" } else { "final" };
        let drive = letter.drive_file_id.as_deref().unwrap_or("-");
        println!(
            "  {} [{}] {} (saved {}, drive: {})",
            letter.id,
            status,
            letter.title,
            letter.last_saved_at.to_rfc3339(),
            drive
        );
    }

    Ok(())
}

/// Create a draft letter for an existing user.
fn cmd_create_letter(db: Database, user: &str, title: &str, content: &str) -> Result<LetterId> {
    let user_id = UserId::new(user).context("Invalid user id")?;
    CredentialStore::new(db.clone())
        .find_by_id(&user_id)
        .context("Failed to look up user")?
        .with_context(|| format!("No user {}", user_id))?;

    let letter = LetterStore::new(db)
        .create(&user_id, title, content)
        .context("Failed to create letter")?;
    println!("Created letter {} \"{}\"", letter.id, letter.title);
    Ok(letter.id)
}
