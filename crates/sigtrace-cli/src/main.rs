//! Offline inspection of a sigtrace contract database.
//!
//! Provides the `sigtrace` binary, which reads the SQLite database written by
//! `sigtrace-server` through the same `SignatureStore` trait the server uses,
//! and moves per-gem stat files in and out of it.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};

use sigtrace_core::{GemInfo, MethodIdentity};
use sigtrace_storage::stat::{self, StatFile};
use sigtrace_storage::{SignatureStore, SqliteStore};

const EXIT_OK: i32 = 0;
const EXIT_NOT_FOUND: i32 = 1;
const EXIT_DATABASE: i32 = 3;

/// Inspect learned method signature contracts.
#[derive(Parser)]
#[command(name = "sigtrace", about = "Inspect learned method signature contracts")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Print the contract of one method.
    Contract {
        /// Path to the contract database file.
        #[arg(short, long)]
        db: String,

        /// Owning type name.
        #[arg(short, long)]
        owner: String,

        /// Method name.
        #[arg(short, long)]
        method: String,

        /// Print the stored JSON instead of the readable form.
        #[arg(long)]
        json: bool,
    },
    /// List the methods of a type that have a contract.
    Methods {
        #[arg(short, long)]
        db: String,

        #[arg(short, long)]
        owner: String,
    },
    /// Print the archived calls of one method, one JSON object per line.
    Calls {
        #[arg(short, long)]
        db: String,

        #[arg(short, long)]
        owner: String,

        #[arg(short, long)]
        method: String,
    },
    /// Write the contracts learned from one gem version as a stat file.
    Export {
        #[arg(short, long)]
        db: String,

        /// Gem name.
        #[arg(short, long)]
        gem: String,

        /// Gem version. The closest archived version is used; the newest
        /// when omitted.
        #[arg(long = "version")]
        gem_version: Option<String>,

        /// Output file. Defaults to stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Merge a stat file into a database, creating the database if needed.
    Import {
        #[arg(short, long)]
        db: String,

        /// Stat file to import.
        file: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let exit_code = match cli.command {
        Commands::Contract {
            db,
            owner,
            method,
            json,
        } => run_contract(&db, &MethodIdentity::new(owner, method), json),
        Commands::Methods { db, owner } => run_methods(&db, &owner),
        Commands::Calls { db, owner, method } => run_calls(&db, &MethodIdentity::new(owner, method)),
        Commands::Export {
            db,
            gem,
            gem_version,
            out,
        } => run_export(&db, &gem, gem_version.as_deref(), out.as_deref()),
        Commands::Import { db, file } => run_import(&db, &file),
    };
    process::exit(exit_code);
}

/// Opens an existing database. Never creates one.
fn open_store(db_path: &str) -> Result<SqliteStore, i32> {
    if !Path::new(db_path).exists() {
        eprintln!("Error: database '{}' does not exist", db_path);
        return Err(EXIT_DATABASE);
    }
    SqliteStore::new(db_path).map_err(|e| {
        eprintln!("Error: failed to open database '{}': {}", db_path, e);
        EXIT_DATABASE
    })
}

/// Execute the contract subcommand.
///
/// Returns exit code: 0 = found, 1 = no contract, 3 = database error.
fn run_contract(db_path: &str, method: &MethodIdentity, json: bool) -> i32 {
    let store = match open_store(db_path) {
        Ok(store) => store,
        Err(code) => return code,
    };

    let info = match store.get_signature(method) {
        Ok(Some(info)) => info,
        Ok(None) => {
            eprintln!("No contract for {}", method);
            return EXIT_NOT_FOUND;
        }
        Err(e) => {
            eprintln!("Error: failed to load contract for {}: {}", method, e);
            return EXIT_DATABASE;
        }
    };

    if json {
        let json = serde_json::to_string_pretty(&info).unwrap_or_else(|e| {
            format!("{{\"error\": \"failed to serialize contract: {}\"}}", e)
        });
        println!("{}", json);
    } else {
        println!("{}", method);
        for line in info.contract.to_string().lines() {
            println!("  {}", line);
        }
    }
    EXIT_OK
}

/// Execute the methods subcommand.
fn run_methods(db_path: &str, owner: &str) -> i32 {
    let store = match open_store(db_path) {
        Ok(store) => store,
        Err(code) => return code,
    };

    match store.registered_methods(owner) {
        Ok(methods) if methods.is_empty() => {
            eprintln!("No methods registered for {}", owner);
            EXIT_NOT_FOUND
        }
        Ok(methods) => {
            for method in methods {
                println!("{}", method);
            }
            EXIT_OK
        }
        Err(e) => {
            eprintln!("Error: failed to list methods of {}: {}", owner, e);
            EXIT_DATABASE
        }
    }
}

/// Execute the calls subcommand.
fn run_calls(db_path: &str, method: &MethodIdentity) -> i32 {
    let store = match open_store(db_path) {
        Ok(store) => store,
        Err(code) => return code,
    };

    let calls = match store.calls_for_method(method) {
        Ok(calls) => calls,
        Err(e) => {
            eprintln!("Error: failed to load calls of {}: {}", method, e);
            return EXIT_DATABASE;
        }
    };
    if calls.is_empty() {
        eprintln!("No calls archived for {}", method);
        return EXIT_NOT_FOUND;
    }
    for call in calls {
        match serde_json::to_string(&call) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error: failed to serialize call: {}", e);
                return EXIT_DATABASE;
            }
        }
    }
    EXIT_OK
}

/// Execute the export subcommand.
///
/// Returns exit code: 0 = written, 1 = no calls from that gem, 3 = database
/// or file error.
fn run_export(db_path: &str, gem_name: &str, requested: Option<&str>, out: Option<&Path>) -> i32 {
    let store = match open_store(db_path) {
        Ok(store) => store,
        Err(code) => return code,
    };

    let versions = match store.gem_versions(gem_name) {
        Ok(versions) => versions,
        Err(e) => {
            eprintln!("Error: failed to list versions of {}: {}", gem_name, e);
            return EXIT_DATABASE;
        }
    };
    let chosen = match requested {
        Some(requested) => stat::closest_version(requested, &versions),
        None => stat::latest_version(&versions),
    };
    let Some(version) = chosen else {
        eprintln!("No calls archived for gem {}", gem_name);
        return EXIT_NOT_FOUND;
    };
    let gem = GemInfo {
        name: gem_name.to_string(),
        version: version.to_string(),
    };

    let stat_file = match stat::export_stat_file(&store, &gem) {
        Ok(Some(stat_file)) => stat_file,
        Ok(None) => {
            eprintln!("No calls archived for gem {} {}", gem.name, gem.version);
            return EXIT_NOT_FOUND;
        }
        Err(e) => {
            eprintln!("Error: failed to export {} {}: {}", gem.name, gem.version, e);
            return EXIT_DATABASE;
        }
    };
    let json = match stat_file.to_json() {
        Ok(json) => json,
        Err(e) => {
            eprintln!("Error: failed to serialize stat file: {}", e);
            return EXIT_DATABASE;
        }
    };

    match out {
        Some(path) => {
            if let Err(e) = fs::write(path, json) {
                eprintln!("Error: failed to write '{}': {}", path.display(), e);
                return EXIT_DATABASE;
            }
            eprintln!(
                "Exported {} signatures of {} {} to {}",
                stat_file.signatures.len(),
                gem.name,
                gem.version,
                path.display()
            );
        }
        None => println!("{}", json),
    }
    EXIT_OK
}

/// Execute the import subcommand.
///
/// Returns exit code: 0 = imported, 3 = database or file error.
fn run_import(db_path: &str, file: &Path) -> i32 {
    let stat_file = match fs::read_to_string(file)
        .map_err(|e| e.to_string())
        .and_then(|json| StatFile::from_json(&json).map_err(|e| e.to_string()))
    {
        Ok(stat_file) => stat_file,
        Err(e) => {
            eprintln!("Error: failed to read stat file '{}': {}", file.display(), e);
            return EXIT_DATABASE;
        }
    };

    let mut store = match SqliteStore::new(db_path) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Error: failed to open database '{}': {}", db_path, e);
            return EXIT_DATABASE;
        }
    };
    match stat::import_stat_file(&mut store, &stat_file) {
        Ok(report) => {
            eprintln!(
                "Imported {} signatures of {} {} ({} rejected)",
                report.imported, stat_file.gem.name, stat_file.gem.version, report.rejected
            );
            EXIT_OK
        }
        Err(e) => {
            eprintln!("Error: failed to import '{}': {}", file.display(), e);
            EXIT_DATABASE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigtrace_core::{CallObservation, Contract, SignatureInfo};

    fn seeded_db(dir: &tempfile::TempDir) -> String {
        let path = dir.path().join("sigtrace.db").to_str().unwrap().to_string();
        let mut store = SqliteStore::new(&path).unwrap();
        let mut obs = CallObservation::positional(MethodIdentity::new("Foo", "bar"), ["Integer"], "String");
        obs.gem = Some(GemInfo {
            name: "foo".into(),
            version: "1.0.0".into(),
        });
        store
            .put_signature(&SignatureInfo::new(obs.method.clone(), Contract::from_observation(&obs)))
            .unwrap();
        store.insert_call_if_not_contains(&obs).unwrap();
        path
    }

    #[test]
    fn test_exit_codes_for_existing_data() {
        let dir = tempfile::tempdir().unwrap();
        let db = seeded_db(&dir);
        let method = MethodIdentity::new("Foo", "bar");
        assert_eq!(run_contract(&db, &method, false), EXIT_OK);
        assert_eq!(run_contract(&db, &method, true), EXIT_OK);
        assert_eq!(run_methods(&db, "Foo"), EXIT_OK);
        assert_eq!(run_calls(&db, &method), EXIT_OK);
    }

    #[test]
    fn test_exit_codes_for_missing_data() {
        let dir = tempfile::tempdir().unwrap();
        let db = seeded_db(&dir);
        let missing = MethodIdentity::new("Foo", "missing");
        assert_eq!(run_contract(&db, &missing, false), EXIT_NOT_FOUND);
        assert_eq!(run_methods(&db, "Bar"), EXIT_NOT_FOUND);
        assert_eq!(run_calls(&db, &missing), EXIT_NOT_FOUND);
    }

    #[test]
    fn test_missing_database_is_not_created() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("absent.db").to_str().unwrap().to_string();
        assert_eq!(run_methods(&db, "Foo"), EXIT_DATABASE);
        assert!(!Path::new(&db).exists());
    }

    #[test]
    fn test_export_then_import_into_fresh_database() {
        let dir = tempfile::tempdir().unwrap();
        let db = seeded_db(&dir);
        let stat_path = dir.path().join("foo-1.0.0.json");
        assert_eq!(run_export(&db, "foo", Some("1.3.0"), Some(&stat_path)), EXIT_OK);

        let stat_file = StatFile::from_json(&fs::read_to_string(&stat_path).unwrap()).unwrap();
        assert_eq!(stat_file.gem.version, "1.0.0");
        assert_eq!(stat_file.signatures.len(), 1);

        let fresh = dir.path().join("fresh.db").to_str().unwrap().to_string();
        assert_eq!(run_import(&fresh, &stat_path), EXIT_OK);
        let store = SqliteStore::new(&fresh).unwrap();
        assert_eq!(
            store.get_signature(&MethodIdentity::new("Foo", "bar")).unwrap(),
            stat_file.signatures.first().cloned()
        );
    }

    #[test]
    fn test_export_and_import_failures() {
        let dir = tempfile::tempdir().unwrap();
        let db = seeded_db(&dir);
        assert_eq!(run_export(&db, "unknown", None, None), EXIT_NOT_FOUND);

        let garbage = dir.path().join("garbage.json");
        fs::write(&garbage, "not a stat file").unwrap();
        assert_eq!(run_import(&db, &garbage), EXIT_DATABASE);
        assert_eq!(run_import(&db, &dir.path().join("absent.json")), EXIT_DATABASE);
    }
}
