//! SQL dialects
//!
//! A [`Dialect`] captures the handful of textual differences between
//! relational engines that the criteria compiler and the schema planner
//! care about: identifier quoting, string escaping, placeholders, the
//! auto-increment clause and the upsert verb.

/// Engine-specific SQL spelling.
pub trait Dialect: Send + Sync {
    fn name(&self) -> &'static str;

    /// Quote an identifier (table, column or index name).
    fn quote_ident(&self, ident: &str) -> String;

    /// Escape a string so it can sit between single quotes.
    fn sanitize(&self, text: &str) -> String;

    fn quote_string(&self, text: &str) -> String {
        format!("'{}'", self.sanitize(text))
    }

    /// Positional placeholder for the 1-based parameter `position`.
    fn placeholder(&self, _position: usize) -> String {
        "?".to_string()
    }

    /// Clause appended to a numeric `id` primary key so the engine
    /// generates identifiers, if the engine needs one.
    fn autoincrement(&self) -> Option<&'static str> {
        None
    }

    /// Insert-or-replace-by-primary-key verb.
    fn upsert_verb(&self) -> &'static str {
        "REPLACE INTO"
    }

    fn begin_statement(&self) -> &'static str {
        "BEGIN"
    }

    fn commit_statement(&self) -> &'static str {
        "COMMIT"
    }

    fn rollback_statement(&self) -> &'static str {
        "ROLLBACK"
    }
}

/// SQLite spelling. Integer primary keys alias the rowid, so no
/// auto-increment clause is needed for generated identifiers.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    /// Backtick quoting: SQLite reads a double-quoted name that matches no
    /// column as a string literal, backticked names are always identifiers.
    fn quote_ident(&self, ident: &str) -> String {
        format!("`{}`", ident.replace('`', "``"))
    }

    fn sanitize(&self, text: &str) -> String {
        text.replace('\'', "''")
    }

    fn upsert_verb(&self) -> &'static str {
        "INSERT OR REPLACE INTO"
    }
}
