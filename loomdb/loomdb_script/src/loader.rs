//! Per-database setup scripts.
//!
//! Scripts live in `<dir>/<db_name>/<base_name>.sql`. A database without a
//! given script simply has nothing to run.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::{debug, info};

use loomdb_core::error::{Result, ScriptError};

use crate::splitter::split_statements;

/// Location of the `base_name` script for `db_name`
pub fn script_path(dir: &Path, db_name: &str, base_name: &str) -> PathBuf {
    dir.join(db_name).join(format!("{}.sql", base_name))
}

/// Load and split the `base_name` script for `db_name`.
///
/// A missing script yields no statements.
pub fn load_script_statements(dir: &Path, db_name: &str, base_name: &str) -> Result<Vec<String>> {
    let path = script_path(dir, db_name, base_name);

    let script = match fs::read_to_string(&path) {
        Ok(script) => script,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("No {} script for {}", base_name, db_name);
            return Ok(Vec::new());
        }
        Err(source) => return Err(ScriptError::Read { path, source }.into()),
    };

    let statements = split_statements(&script);
    info!(
        "Loaded {} statements from {}",
        statements.len(),
        path.display()
    );
    Ok(statements)
}

#[cfg(test)]
mod tests {
    use super::*;
    use loomdb_core::error::Error;

    #[test]
    fn test_script_path_layout() {
        let path = script_path(Path::new("/scripts"), "postgres", "init");
        assert_eq!(path, Path::new("/scripts/postgres/init.sql"));
    }

    #[test]
    fn test_missing_script_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let statements = load_script_statements(dir.path(), "h2", "init").unwrap();
        assert!(statements.is_empty());
    }

    #[test]
    fn test_load_and_split() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("h2")).unwrap();
        fs::write(
            dir.path().join("h2").join("init.sql"),
            "-- schema\nCREATE TABLE t (id INT);\nINSERT INTO t VALUES (1);\n",
        )
        .unwrap();

        let statements = load_script_statements(dir.path(), "h2", "init").unwrap();
        assert_eq!(
            statements,
            vec!["CREATE TABLE t (id INT)", "INSERT INTO t VALUES (1)"]
        );
    }

    #[test]
    fn test_unreadable_script_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the file should be cannot be read as a script
        fs::create_dir_all(dir.path().join("h2").join("init.sql")).unwrap();

        let result = load_script_statements(dir.path(), "h2", "init");
        assert!(matches!(result, Err(Error::Script(ScriptError::Read { .. }))));
    }
}
