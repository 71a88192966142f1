//! DROP / RENAME / TRUNCATE, database, function and dictionary DDL

use super::creation::SchemaCreation;
use super::definition::{DictionaryDefinition, DictionaryLifetime, TableDefinition, TableKind};
use crate::types::{quote_identifier, quote_string};

/// Object kind for `DROP`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DropKind {
    #[default]
    Table,
    View,
    Dictionary,
}

impl DropKind {
    fn as_str(&self) -> &'static str {
        match self {
            DropKind::Table => "TABLE",
            DropKind::View => "VIEW",
            DropKind::Dictionary => "DICTIONARY",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DropOptions {
    pub kind: DropKind,
    pub if_exists: bool,
    pub sync: bool,
}

impl DropOptions {
    pub fn table() -> Self {
        Self::default()
    }

    pub fn view() -> Self {
        Self {
            kind: DropKind::View,
            ..Self::default()
        }
    }

    pub fn dictionary() -> Self {
        Self {
            kind: DropKind::Dictionary,
            ..Self::default()
        }
    }

    pub fn if_exists(mut self) -> Self {
        self.if_exists = true;
        self
    }

    pub fn sync(mut self) -> Self {
        self.sync = true;
        self
    }
}

fn if_exists(flag: bool) -> &'static str {
    if flag { "IF EXISTS " } else { "" }
}

impl SchemaCreation<'_> {
    pub fn drop_table(&self, name: &str, options: DropOptions) -> String {
        let mut sql = format!(
            "DROP {} {}{}{}",
            options.kind.as_str(),
            if_exists(options.if_exists),
            name,
            self.on_cluster()
        );
        if options.sync {
            sql.push_str(" SYNC");
        }
        sql
    }

    /// Drop statements for a definition: the distributed companion first,
    /// the base table last
    pub fn drop_table_definition(&self, def: &TableDefinition, options: DropOptions) -> Vec<String> {
        let mut statements = Vec::new();
        if let Some(distributed) = &def.distributed {
            statements.push(self.drop_table(
                &distributed.table,
                DropOptions {
                    kind: DropKind::Table,
                    ..options
                },
            ));
        }
        let kind = match def.kind {
            TableKind::Table => DropKind::Table,
            TableKind::View | TableKind::MaterializedView => DropKind::View,
        };
        statements.push(self.drop_table(&def.name, DropOptions { kind, ..options }));
        statements
    }

    pub fn rename_table(&self, from: &str, to: &str) -> String {
        format!("RENAME TABLE {} TO {}{}", from, to, self.on_cluster())
    }

    pub fn truncate_table(&self, name: &str, if_exists_flag: bool) -> String {
        format!(
            "TRUNCATE TABLE {}{}{}",
            if_exists(if_exists_flag),
            name,
            self.on_cluster()
        )
    }

    pub fn create_database(&self, name: &str, if_not_exists: bool, engine: Option<&str>) -> String {
        let mut sql = format!(
            "CREATE DATABASE {}{}{}",
            if if_not_exists { "IF NOT EXISTS " } else { "" },
            name,
            self.on_cluster()
        );
        if let Some(engine) = engine {
            sql.push_str(&format!(" ENGINE = {}", engine));
        }
        sql
    }

    pub fn drop_database(&self, name: &str, if_exists_flag: bool) -> String {
        format!(
            "DROP DATABASE {}{}{}",
            if_exists(if_exists_flag),
            name,
            self.on_cluster()
        )
    }

    /// `CREATE FUNCTION f AS (x) -> ...`
    pub fn create_function(&self, name: &str, body: &str, or_replace: bool) -> String {
        format!(
            "CREATE {}FUNCTION {}{} AS {}",
            if or_replace { "OR REPLACE " } else { "" },
            name,
            self.on_cluster(),
            body.trim()
        )
    }

    pub fn drop_function(&self, name: &str, if_exists_flag: bool) -> String {
        format!(
            "DROP FUNCTION {}{}{}",
            if_exists(if_exists_flag),
            name,
            self.on_cluster()
        )
    }

    pub fn create_dictionary(&self, def: &DictionaryDefinition) -> String {
        let mut sql = String::from("CREATE ");
        if def.or_replace {
            sql.push_str("OR REPLACE ");
        }
        sql.push_str("DICTIONARY ");
        if def.if_not_exists {
            sql.push_str("IF NOT EXISTS ");
        }
        sql.push_str(&def.name);
        sql.push_str(&self.on_cluster());

        let attributes: Vec<String> = def
            .attributes
            .iter()
            .map(|attr| {
                let mut sql = format!("{} {}", quote_identifier(&attr.name), attr.type_name);
                if let Some(default) = &attr.default {
                    sql.push_str(&format!(" DEFAULT {}", default.to_sql_literal()));
                }
                if let Some(expr) = &attr.expression {
                    sql.push_str(&format!(" EXPRESSION {}", expr));
                }
                if attr.hierarchical {
                    sql.push_str(" HIERARCHICAL");
                }
                if attr.injective {
                    sql.push_str(" INJECTIVE");
                }
                sql
            })
            .collect();
        sql.push_str(&format!(" ({})", attributes.join(", ")));

        if !def.primary_key.is_empty() {
            sql.push_str(&format!(" PRIMARY KEY {}", def.primary_key.join(", ")));
        }
        sql.push_str(&format!(" SOURCE({})", def.source));
        sql.push_str(&format!(" LAYOUT({})", def.layout));
        match def.lifetime {
            Some(DictionaryLifetime::Fixed(seconds)) => {
                sql.push_str(&format!(" LIFETIME({})", seconds))
            }
            Some(DictionaryLifetime::Range { min, max }) => {
                sql.push_str(&format!(" LIFETIME(MIN {} MAX {})", min, max))
            }
            None => {}
        }
        if let Some(comment) = &def.comment {
            sql.push_str(&format!(" COMMENT {}", quote_string(comment)));
        }
        sql
    }
}
