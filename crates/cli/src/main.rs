//! Redseam CLI - shop the Redseam storefront from a terminal.
//!
//! # Usage
//!
//! ```bash
//! # Log in (the session is kept in $REDSEAM_SESSION_DIR, default .redseam)
//! redseam login -e shopper@redseam.ge -p hunter22
//!
//! # Browse
//! redseam products --price-from 50 --price-to 200 --sort price-asc
//! redseam product 42
//!
//! # Cart
//! redseam cart add 42 --color Red --size M --quantity 2
//! redseam cart update 42 --color Red --size M 0
//! redseam cart show
//!
//! # Place a (mock) order
//! redseam checkout --name Nino --surname Beridze --email nino@redseam.ge \
//!     --address "12 Rustaveli Ave" --zip 0108
//!
//! # Follow the cart while other terminals log in, out or edit it
//! redseam watch
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use redseam_client::ClientConfig;
use redseam_client::api::ProductSort;
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod output;

use commands::{CliError, Context};

#[derive(Parser)]
#[command(name = "redseam")]
#[command(author, version, about = "Redseam storefront client")]
struct Cli {
    /// Directory holding the session file (overrides `REDSEAM_SESSION_DIR`)
    #[arg(long, global = true)]
    session_dir: Option<PathBuf>,

    /// Print JSON instead of text where supported
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in with email and password
    Login {
        /// Account email
        #[arg(short, long)]
        email: String,

        /// Account password
        #[arg(short, long)]
        password: String,
    },
    /// Create an account and log in
    Register {
        /// Display name
        #[arg(short, long)]
        username: String,

        /// Account email
        #[arg(short, long)]
        email: String,

        /// Password (also sent as the confirmation)
        #[arg(short, long)]
        password: String,

        /// Avatar image to upload
        #[arg(long)]
        avatar: Option<PathBuf>,
    },
    /// End the session
    Logout,
    /// Show the logged-in user
    Whoami,
    /// List products
    Products {
        /// Page number
        #[arg(long, default_value_t = 1)]
        page: u32,

        /// Minimum price
        #[arg(long)]
        price_from: Option<u32>,

        /// Maximum price
        #[arg(long)]
        price_to: Option<u32>,

        /// Ordering (`newest`, `price-asc`, `price-desc`)
        #[arg(long, default_value = "newest")]
        sort: ProductSort,
    },
    /// Show one product
    Product {
        /// Product ID
        id: i64,
    },
    /// Inspect or change the cart
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
    /// Place an order for everything in the cart
    Checkout {
        /// First name
        #[arg(long)]
        name: String,

        /// Last name
        #[arg(long)]
        surname: String,

        /// Contact email (defaults to the account email)
        #[arg(long)]
        email: Option<String>,

        /// Street address
        #[arg(long)]
        address: String,

        /// Postal code
        #[arg(long)]
        zip: String,
    },
    /// Print the cart whenever it or the session changes
    Watch,
}

/// Variant selection shared by cart subcommands.
#[derive(clap::Args)]
struct Variant {
    /// Product ID
    id: i64,

    /// Color
    #[arg(long)]
    color: Option<String>,

    /// Size
    #[arg(long)]
    size: Option<String>,
}

#[derive(Subcommand)]
enum CartAction {
    /// Show the cart
    Show,
    /// Add units of a product variant
    Add {
        #[command(flatten)]
        variant: Variant,

        /// Units to add
        #[arg(short, long, default_value_t = 1)]
        quantity: u32,
    },
    /// Set the quantity of a line; 0 or less removes it
    Update {
        #[command(flatten)]
        variant: Variant,

        /// New quantity
        #[arg(allow_negative_numbers = true)]
        quantity: i64,
    },
    /// Remove a line
    Remove {
        #[command(flatten)]
        variant: Variant,
    },
    /// Remove every line
    Clear,
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &ClientConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match ClientConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            output::failure(&e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(dir) = cli.session_dir.clone() {
        config.session_dir = dir;
    }

    // Sentry must be initialized before the tracing subscriber
    let _sentry_guard = init_sentry(&config);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "redseam_client=warn,redseam_cli=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!(error = ?e, "Command failed");
            output::failure(&e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, config: ClientConfig) -> Result<(), CliError> {
    let ctx = Context::new(config, cli.json)?;

    match cli.command {
        Commands::Login { email, password } => commands::auth::login(&ctx, &email, &password).await,
        Commands::Register {
            username,
            email,
            password,
            avatar,
        } => commands::auth::register(&ctx, username, email, password, avatar.as_deref()).await,
        Commands::Logout => commands::auth::logout(&ctx),
        Commands::Whoami => commands::auth::whoami(&ctx),
        Commands::Products {
            page,
            price_from,
            price_to,
            sort,
        } => commands::catalog::products(&ctx, page, price_from, price_to, sort).await,
        Commands::Product { id } => commands::catalog::product(&ctx, id).await,
        Commands::Cart { action } => match action {
            CartAction::Show => commands::cart::show(&ctx).await,
            CartAction::Add { variant, quantity } => {
                commands::cart::add(&ctx, variant.id, variant.color, variant.size, quantity).await
            }
            CartAction::Update { variant, quantity } => {
                commands::cart::update(&ctx, variant.id, variant.color, variant.size, quantity).await
            }
            CartAction::Remove { variant } => {
                commands::cart::remove(&ctx, variant.id, variant.color, variant.size).await
            }
            CartAction::Clear => commands::cart::clear(&ctx).await,
        },
        Commands::Checkout {
            name,
            surname,
            email,
            address,
            zip,
        } => commands::checkout::place_order(&ctx, name, surname, email, address, zip).await,
        Commands::Watch => commands::cart::watch(&ctx).await,
    }
}
