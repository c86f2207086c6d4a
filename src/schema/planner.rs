//! Store schema planning
//!
//! Derives the statements that create or drop a store: the backing table
//! with one column per declared key plus the reserved columns, one index
//! per column, and the store's row in the shared catalog table. The catalog
//! row, not the table's own schema, is what later tells `save` which
//! top-level fields are promoted to columns.

use crate::core::{
    CREATED_COLUMN, DOCUMENT_COLUMN, ID_KEY, KeySchema, KeyType, META_TABLE, StoreMeta, StoreResult,
};
use crate::dialect::Dialect;

/// One step of a planned schema change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedStatement {
    Begin,
    Execute(String),
    Commit,
}

impl PlannedStatement {
    pub fn sql<'a>(&'a self, dialect: &dyn Dialect) -> &'a str {
        match self {
            PlannedStatement::Begin => dialect.begin_statement(),
            PlannedStatement::Execute(sql) => sql,
            PlannedStatement::Commit => dialect.commit_statement(),
        }
    }
}

enum ColumnKind {
    Declared(KeyType),
    Created,
    Document,
}

/// Plan the creation of store `name` with the given keys.
///
/// `keys` must already carry the `id` key; the façade defaults it.
pub fn plan_create_store(
    name: &str,
    keys: &KeySchema,
    dialect: &dyn Dialect,
) -> StoreResult<Vec<PlannedStatement>> {
    let table = dialect.quote_ident(name);

    let columns = keys
        .iter()
        .map(|(key, key_type)| (key, ColumnKind::Declared(key_type)))
        .chain([
            (CREATED_COLUMN, ColumnKind::Created),
            (DOCUMENT_COLUMN, ColumnKind::Document),
        ]);

    let mut column_defs = Vec::new();
    let mut indexes = Vec::new();

    for (key, kind) in columns {
        let column = dialect.quote_ident(key);
        let mut def = match kind {
            ColumnKind::Document => format!("{} TEXT", column),
            ColumnKind::Created => format!("{} TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP", column),
            ColumnKind::Declared(KeyType::Number) => format!("{} INTEGER", column),
            ColumnKind::Declared(KeyType::String) => format!("{} VARCHAR(255)", column),
        };

        if key == ID_KEY {
            def.push_str(" PRIMARY KEY");
            if keys.get(ID_KEY) == Some(KeyType::Number) {
                if let Some(clause) = dialect.autoincrement() {
                    def.push(' ');
                    def.push_str(clause);
                }
            }
            def.push_str(" NOT NULL");
        }
        column_defs.push(def);

        if key != DOCUMENT_COLUMN {
            let unique = if key == ID_KEY { "UNIQUE " } else { "" };
            indexes.push(PlannedStatement::Execute(format!(
                "CREATE {}INDEX {} ON {}({})",
                unique,
                dialect.quote_ident(&format!("idx-{}-{}", name, key)),
                table,
                column
            )));
        }
    }

    let meta = StoreMeta::from_schema(keys);
    let meta_json = serde_json::to_string(&meta)?;

    let meta_id = match dialect.autoincrement() {
        Some(clause) => format!("{} INTEGER PRIMARY KEY {}", dialect.quote_ident(ID_KEY), clause),
        None => format!("{} INTEGER PRIMARY KEY", dialect.quote_ident(ID_KEY)),
    };

    let mut statements = Vec::with_capacity(indexes.len() + 5);
    statements.push(PlannedStatement::Begin);
    statements.push(PlannedStatement::Execute(format!(
        "CREATE TABLE {} ({})",
        table,
        column_defs.join(", ")
    )));
    statements.extend(indexes);
    statements.push(PlannedStatement::Execute(format!(
        "CREATE TABLE IF NOT EXISTS {} ({}, {} VARCHAR(255) NOT NULL, {} TEXT NOT NULL)",
        dialect.quote_ident(META_TABLE),
        meta_id,
        dialect.quote_ident("store"),
        dialect.quote_ident("data"),
    )));
    statements.push(PlannedStatement::Execute(format!(
        "INSERT INTO {} ({}, {}) VALUES ({}, {})",
        dialect.quote_ident(META_TABLE),
        dialect.quote_ident("store"),
        dialect.quote_ident("data"),
        dialect.quote_string(name),
        dialect.quote_string(&meta_json),
    )));
    statements.push(PlannedStatement::Commit);
    Ok(statements)
}

/// Plan the removal of store `name`: its catalog row, then its table.
pub fn plan_delete_store(name: &str, dialect: &dyn Dialect) -> Vec<PlannedStatement> {
    vec![
        PlannedStatement::Begin,
        PlannedStatement::Execute(format!(
            "DELETE FROM {} WHERE {} = {}",
            dialect.quote_ident(META_TABLE),
            dialect.quote_ident("store"),
            dialect.quote_string(name)
        )),
        PlannedStatement::Execute(format!("DROP TABLE {}", dialect.quote_ident(name))),
        PlannedStatement::Commit,
    ]
}
