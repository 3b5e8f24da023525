//! Local Postgres databases and aerich migrations of a service.
//!
//! A service's databases are every value of an env key starting with
//! `POSTGRES_DB` plus every aerich app (each subdirectory of
//! `<dir>/migrations`). Connection details come from the service's `.env`;
//! a service missing any of [`REQUIRED_DOTENV_KEYS`] is
//! [`DbError::NotConfigured`], which callers treat as "skip this service".

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use thiserror::Error;

use stb_core::Service;

use crate::shell::{Shell, ShellCommand, ShellError, WorkdirScope};

pub const REQUIRED_DOTENV_KEYS: [&str; 3] = ["POSTGRES_PASSWORD", "POSTGRES_PORT", "POSTGRES_USER"];

const MIGRATIONS_DIR: &str = "migrations";
const AERICH_BASE_APP: &str = "aerich";

#[derive(Debug, Error)]
pub enum DbError {
    /// The service has no usable database configuration.
    #[error("{field} is required for database commands but is not filled out in {path}")]
    NotConfigured {
        service: String,
        field: &'static str,
        path: PathBuf,
    },

    #[error(transparent)]
    Shell(#[from] ShellError),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("migration worker for {app} panicked")]
    MigrationPanicked { app: String },
}

impl DbError {
    pub fn is_not_configured(&self) -> bool {
        matches!(self, DbError::NotConfigured { .. })
    }
}

/// Database operations keyed by service.
pub trait Database {
    /// Drop every database of the service. `force` disconnects other clients.
    fn drop_databases(&self, service: &Service, force: bool) -> Result<(), DbError>;

    /// Create every database of the service, then run its migrations.
    fn create_databases(&self, service: &Service, parallel_migrations: bool)
        -> Result<(), DbError>;

    /// Run pending migrations.
    fn upgrade_databases(&self, service: &Service, parallel_migrations: bool)
        -> Result<(), DbError>;
}

/// Result of [`reset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetOutcome {
    Reset,
    /// The service has no database configuration; nothing was touched.
    NotConfigured,
}

/// Drop, then recreate and migrate. A [`DbError::NotConfigured`] is
/// swallowed; every other failure propagates.
pub fn reset<D: Database + ?Sized>(
    db: &D,
    service: &Service,
    force: bool,
    parallel_migrations: bool,
) -> Result<ResetOutcome, DbError> {
    let result = db
        .drop_databases(service, force)
        .and_then(|()| db.create_databases(service, parallel_migrations));
    match result {
        Ok(()) => Ok(ResetOutcome::Reset),
        Err(err) if err.is_not_configured() => {
            tracing::warn!("skipping database reset for {}: {err}", service.name());
            Ok(ResetOutcome::NotConfigured)
        }
        Err(err) => Err(err),
    }
}

// ---------------------------------------------------------------------------
// Postgres
// ---------------------------------------------------------------------------

/// Local Postgres driven through `createdb`, `dropdb` and `poetry run aerich`.
#[derive(Debug, Clone, Default)]
pub struct Postgres<S> {
    shell: S,
}

struct Connection {
    user: String,
    password: String,
    port: String,
}

impl<S: Shell + Sync> Postgres<S> {
    pub fn new(shell: S) -> Self {
        Self { shell }
    }

    fn with_password(conn: &Connection, command: ShellCommand) -> ShellCommand {
        command.env("PGPASSWORD", conn.password.clone())
    }

    fn connection_args(conn: &Connection) -> [&str; 6] {
        ["-h", "localhost", "-p", &conn.port, "-U", &conn.user]
    }

    fn migrate(
        &self,
        scope: &WorkdirScope<'_, S>,
        conn: &Connection,
        apps: &BTreeSet<String>,
        parallel: bool,
    ) -> Result<(), DbError> {
        scope.run(&Self::with_password(
            conn,
            ShellCommand::from_words("poetry run aerich upgrade"),
        ))?;

        let commands: Vec<(String, ShellCommand)> = apps
            .iter()
            .filter(|app| app.as_str() != AERICH_BASE_APP)
            .map(|app| {
                let cmd = ShellCommand::from_words("poetry run aerich --app")
                    .arg(app.as_str())
                    .arg("upgrade");
                (app.clone(), Self::with_password(conn, cmd))
            })
            .collect();

        if !parallel {
            for (_, cmd) in &commands {
                scope.run(cmd)?;
            }
            return Ok(());
        }

        std::thread::scope(|s| -> Result<(), DbError> {
            let handles: Vec<_> = commands
                .iter()
                .map(|(app, cmd)| (app, s.spawn(move || scope.run(cmd))))
                .collect();
            for (app, handle) in handles {
                handle
                    .join()
                    .map_err(|_| DbError::MigrationPanicked { app: app.clone() })??;
            }
            Ok(())
        })
    }
}

impl<S: Shell + Sync> Database for Postgres<S> {
    fn drop_databases(&self, service: &Service, force: bool) -> Result<(), DbError> {
        let conn = connection(service)?;
        let databases = database_names(service)?;
        let scope = WorkdirScope::enter(&self.shell, &service.dir)?;
        for db in &databases {
            let mut cmd = ShellCommand::new("dropdb");
            if force {
                cmd = cmd.arg("-f");
            }
            let cmd = cmd
                .arg("--if-exists")
                .args(Self::connection_args(&conn))
                .arg(db.as_str());
            scope.run(&Self::with_password(&conn, cmd))?;
        }
        Ok(())
    }

    fn create_databases(
        &self,
        service: &Service,
        parallel_migrations: bool,
    ) -> Result<(), DbError> {
        let conn = connection(service)?;
        let databases = database_names(service)?;
        let apps = aerich_apps(&service.dir)?;
        let scope = WorkdirScope::enter(&self.shell, &service.dir)?;
        for db in &databases {
            let cmd = ShellCommand::new("createdb")
                .args(Self::connection_args(&conn))
                .arg(db.as_str());
            scope.run(&Self::with_password(&conn, cmd))?;
        }
        self.migrate(&scope, &conn, &apps, parallel_migrations)
    }

    fn upgrade_databases(
        &self,
        service: &Service,
        parallel_migrations: bool,
    ) -> Result<(), DbError> {
        let conn = connection(service)?;
        let apps = aerich_apps(&service.dir)?;
        let scope = WorkdirScope::enter(&self.shell, &service.dir)?;
        self.migrate(&scope, &conn, &apps, parallel_migrations)
    }
}

fn connection(service: &Service) -> Result<Connection, DbError> {
    let field = |name: &'static str| -> Result<String, DbError> {
        match service.dotenv.get(name) {
            Some(value) if !value.is_empty() => Ok(value.to_string()),
            _ => Err(DbError::NotConfigured {
                service: service.name().0,
                field: name,
                path: service.dotenv_path(),
            }),
        }
    };
    let [password, port, user] = REQUIRED_DOTENV_KEYS;
    Ok(Connection {
        password: field(password)?,
        port: field(port)?,
        user: field(user)?,
    })
}

/// Aerich apps plus every non-empty `POSTGRES_DB*` value, sorted.
fn database_names(service: &Service) -> Result<BTreeSet<String>, DbError> {
    let mut names = aerich_apps(&service.dir)?;
    names.extend(
        service
            .dotenv
            .iter()
            .filter(|(key, value)| key.starts_with("POSTGRES_DB") && !value.is_empty())
            .map(|(_, value)| value.to_string()),
    );
    Ok(names)
}

fn aerich_apps(dir: &Path) -> Result<BTreeSet<String>, DbError> {
    let migrations = dir.join(MIGRATIONS_DIR);
    if !migrations.is_dir() {
        return Ok(BTreeSet::new());
    }
    let entries = std::fs::read_dir(&migrations).map_err(|source| DbError::Io {
        path: migrations.clone(),
        source,
    })?;
    Ok(entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
