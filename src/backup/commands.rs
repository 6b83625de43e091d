use crate::backup::backup_config::DatabaseConfig;
use crate::backup::exec::{quote, ShellCommand};
use itertools::Itertools;
use std::path::Path;

/// Consistent dump flags shared by the schema and the data section
static DUMP_FLAGS: &str = "--complete-insert --disable-keys --single-transaction";

fn client(db: &DatabaseConfig, program: &str) -> String {
    format!(
        "MYSQL_PWD={} {} -h {} -u {}",
        quote(db.password().inner()),
        program,
        quote(db.host()),
        quote(db.user()),
    )
}

/// Backtick-quoted identifier, for use inside a SQL statement.
fn identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

pub fn query(db: &DatabaseConfig, sql: &str) -> ShellCommand {
    ShellCommand::new(format!("{} -e {}", client(db, "mysql"), quote(sql)))
        .with_secret(db.password())
}

pub fn show_databases(db: &DatabaseConfig) -> ShellCommand {
    query(db, "SHOW DATABASES;")
}

pub fn show_tables(db: &DatabaseConfig, database: &str) -> ShellCommand {
    query(db, &format!("SHOW TABLES IN {};", identifier(database)))
}

/// Structure of every table, no rows. Truncates `file`.
pub fn dump_schema(db: &DatabaseConfig, database: &str, file: &Path) -> ShellCommand {
    ShellCommand::new(format!(
        "{} {} --no-data {} > {}",
        client(db, "mysqldump"),
        DUMP_FLAGS,
        quote(database),
        quote(&file.to_string_lossy()),
    ))
    .with_secret(db.password())
}

/// Rows of the listed tables only. Appends to `file`.
pub fn dump_data<S: AsRef<str>>(
    db: &DatabaseConfig,
    database: &str,
    tables: &[S],
    file: &Path,
) -> ShellCommand {
    ShellCommand::new(format!(
        "{} {} {} {} >> {}",
        client(db, "mysqldump"),
        DUMP_FLAGS,
        quote(database),
        tables.iter().map(|t| quote(t.as_ref())).join(" "),
        quote(&file.to_string_lossy()),
    ))
    .with_secret(db.password())
}

/// Compresses `file` into `<file>.gz` and removes the original.
pub fn compress(file: &Path) -> ShellCommand {
    ShellCommand::new(format!("gzip -v {}", quote(&file.to_string_lossy())))
}

pub fn mkdir_all(dir: &Path) -> ShellCommand {
    ShellCommand::new(format!("mkdir -p {}", quote(&dir.to_string_lossy())))
}

pub fn chmod(mode: &str, path: &Path, recursive: bool) -> ShellCommand {
    ShellCommand::new(format!(
        "chmod {}{} {}",
        if recursive { "-R " } else { "" },
        quote(mode),
        quote(&path.to_string_lossy()),
    ))
}
