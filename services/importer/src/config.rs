//! Runtime configuration: command line flags with environment fallbacks.
//!
//! `.env` is loaded by the binary before parsing, so every `env = ...` below
//! can also come from there.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use clap::Parser;
use sqlx::postgres::PgConnectOptions;

use crate::error::ConfigError;
use crate::loader::{LoadOptions, DEFAULT_BATCH_SIZE, DEFAULT_MAX_REPORTED_ERRORS};
use crate::pipeline::PipelineOptions;
use crate::resolver::ResolveStrategy;

#[derive(Parser, Debug)]
#[command(
    name = "importer",
    about = "Loads the sales CSV into the regions/products/customers/sales tables"
)]
pub struct Args {
    /// Source CSV file
    #[arg(long, env = "SOURCE_PATH", default_value = "database/cleaned-data/cleaned_data.csv")]
    pub source: PathBuf,

    /// Field delimiter of the source file
    #[arg(long, default_value = ",")]
    pub delimiter: char,

    /// Full connection URL; overrides server/port/database/user/password
    #[arg(long, env = "DB_URL", hide_env_values = true)]
    pub db_url: Option<String>,

    /// Database server host
    #[arg(long, env = "DB_SERVER", default_value = "localhost")]
    pub server: String,

    #[arg(long, env = "DB_PORT")]
    pub port: Option<u16>,

    #[arg(long, env = "DB_NAME", default_value = "sales_analytics")]
    pub database: String,

    /// Login user; without it the connection uses trusted authentication
    #[arg(long, env = "DB_USER")]
    pub user: Option<String>,

    #[arg(long, env = "DB_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Successful inserts between commits
    #[arg(long, env = "IMPORT_BATCH_SIZE", default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Row errors printed in the summary
    #[arg(long, default_value_t = DEFAULT_MAX_REPORTED_ERRORS)]
    pub max_errors: usize,

    /// How natural keys are resolved during the fact load
    #[arg(long, value_enum, default_value_t = ResolveStrategy::Cached)]
    pub resolve: ResolveStrategy,

    /// Dry run - load into memory, don't touch the database
    #[arg(long, default_value = "false")]
    pub dry_run: bool,

    /// Print the summary as JSON
    #[arg(long, default_value = "false")]
    pub json: bool,
}

/// How the importer authenticates against the database server.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthMode {
    /// No credentials sent; the server trusts the OS user (peer/ident/PGUSER)
    Trusted,
    Credentials {
        user: String,
        password: Option<String>,
    },
}

impl AuthMode {
    pub fn from_parts(user: Option<String>, password: Option<String>) -> Result<Self, ConfigError> {
        match (user, password) {
            (Some(user), password) => Ok(AuthMode::Credentials { user, password }),
            (None, Some(_)) => Err(ConfigError::PasswordWithoutUser),
            (None, None) => Ok(AuthMode::Trusted),
        }
    }
}

impl fmt::Debug for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMode::Trusted => f.write_str("Trusted"),
            AuthMode::Credentials { user, password } => f
                .debug_struct("Credentials")
                .field("user", user)
                .field("password", &password.as_ref().map(|_| "***"))
                .finish(),
        }
    }
}

#[derive(Clone)]
pub struct ImportConfig {
    pub db_url: Option<String>,
    pub server: String,
    pub port: Option<u16>,
    pub database: String,
    pub auth: AuthMode,
    pub source_path: PathBuf,
    pub delimiter: u8,
    pub batch_size: usize,
    pub max_reported_errors: usize,
    pub resolve: ResolveStrategy,
    pub dry_run: bool,
    pub json: bool,
}

impl fmt::Debug for ImportConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportConfig")
            .field("db_url", &self.db_url.as_ref().map(|_| "***"))
            .field("server", &self.server)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("auth", &self.auth)
            .field("source_path", &self.source_path)
            .field("delimiter", &(self.delimiter as char))
            .field("batch_size", &self.batch_size)
            .field("max_reported_errors", &self.max_reported_errors)
            .field("resolve", &self.resolve)
            .field("dry_run", &self.dry_run)
            .field("json", &self.json)
            .finish()
    }
}

impl TryFrom<Args> for ImportConfig {
    type Error = ConfigError;

    fn try_from(args: Args) -> Result<Self, Self::Error> {
        if !args.delimiter.is_ascii() {
            return Err(ConfigError::InvalidDelimiter(args.delimiter));
        }
        if args.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }

        Ok(Self {
            db_url: args.db_url.filter(|url| !url.trim().is_empty()),
            server: args.server,
            port: args.port,
            database: args.database,
            auth: AuthMode::from_parts(args.user, args.password)?,
            source_path: args.source,
            delimiter: args.delimiter as u8,
            batch_size: args.batch_size,
            max_reported_errors: args.max_errors,
            resolve: args.resolve,
            dry_run: args.dry_run,
            json: args.json,
        })
    }
}

impl ImportConfig {
    pub fn connect_options(&self) -> Result<PgConnectOptions, ConfigError> {
        if let Some(url) = &self.db_url {
            return PgConnectOptions::from_str(url).map_err(ConfigError::DbUrl);
        }

        let mut options = PgConnectOptions::new()
            .host(&self.server)
            .database(&self.database);
        if let Some(port) = self.port {
            options = options.port(port);
        }
        if let AuthMode::Credentials { user, password } = &self.auth {
            options = options.username(user);
            if let Some(password) = password {
                options = options.password(password);
            }
        }
        Ok(options)
    }

    /// Human-readable connection target without credentials.
    pub fn target(&self) -> String {
        match &self.db_url {
            Some(_) => "DB_URL".to_string(),
            None => match self.port {
                Some(port) => format!("{}:{}/{}", self.server, port, self.database),
                None => format!("{}/{}", self.server, self.database),
            },
        }
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            source_path: self.source_path.clone(),
            delimiter: self.delimiter,
            resolve: self.resolve,
            load: LoadOptions {
                batch_size: self.batch_size,
                max_reported_errors: self.max_reported_errors,
            },
        }
    }
}
