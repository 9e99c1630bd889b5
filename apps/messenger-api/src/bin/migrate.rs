//! Applies the chat schema (`base_user`, `base_chatmessage`) to Postgres.
//!
//!   messenger-migrate           migrate DATABASE_URL
//!   messenger-migrate --test    migrate the `<name>_test` sibling database

use std::path::Path;
use std::process::ExitCode;

use diesel::pg::PgConnection;
use diesel::Connection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use messenger_api::config::required_var;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("./migrations");

fn main() -> ExitCode {
    if dotenvy::dotenv().is_err() {
        let _ = dotenvy::from_path(Path::new(env!("CARGO_MANIFEST_DIR")).join(".env"));
    }

    let url = required_var("DATABASE_URL");
    let url = if std::env::args().skip(1).any(|arg| arg == "--test") {
        test_database_url(&url)
    } else {
        url
    };

    let mut conn = match PgConnection::establish(&url) {
        Ok(conn) => conn,
        Err(err) => {
            eprintln!("messenger-migrate: cannot connect: {err}");
            return ExitCode::FAILURE;
        }
    };

    match conn.run_pending_migrations(MIGRATIONS) {
        Ok(applied) if applied.is_empty() => println!("chat schema already up to date"),
        Ok(applied) => {
            for version in &applied {
                println!("applied {version}");
            }
        }
        Err(err) => {
            eprintln!("messenger-migrate: migration failed: {err}");
            return ExitCode::FAILURE;
        }
    }

    ExitCode::SUCCESS
}

/// Point a connection string at the `_test` variant of its database,
/// keeping any query parameters. URLs that already target a test database,
/// or that name no database, are returned as is.
fn test_database_url(url: &str) -> String {
    let (location, params) = match url.split_once('?') {
        Some((location, params)) => (location, Some(params)),
        None => (url, None),
    };

    let Some((server, database)) = location.rsplit_once('/') else {
        return url.to_string();
    };
    if database.is_empty() || database.ends_with("_test") {
        return url.to_string();
    }

    match params {
        Some(params) => format!("{server}/{database}_test?{params}"),
        None => format!("{server}/{database}_test"),
    }
}
