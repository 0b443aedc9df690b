use std::sync::Arc;

use indexmap::IndexMap;
use thiserror::Error;
use tracing::{debug, info};

use super::field::{Field, FieldType};

/// Declaration errors raised while building a [`Schema`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("primary key not found for model {model}")]
    MissingPrimaryKey { model: String },

    #[error("duplicate primary key for model {model}: `{first}` and `{second}`")]
    DuplicatePrimaryKey {
        model: String,
        first: String,
        second: String,
    },

    #[error("field `{field}` declared twice on model {model}")]
    DuplicateField { model: String, field: String },

    #[error("field `{field}` of model {model} cannot be a primary key ({ddl})")]
    UnsupportedPrimaryKey {
        model: String,
        field: String,
        ddl: String,
    },
}

/// Collects field declarations for one model. Created by [`Schema::builder`].
#[derive(Debug)]
pub struct SchemaBuilder {
    model: String,
    table: Option<String>,
    fields: Vec<(String, Field)>,
}

impl SchemaBuilder {
    /// Overrides the table name; the model name is used otherwise.
    #[must_use]
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Declares a field. Declaration order is preserved in every template.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, field: Field) -> Self {
        self.fields.push((name.into(), field));
        self
    }

    /// Validates the declarations and derives the SQL templates.
    ///
    /// # Errors
    ///
    /// - [`SchemaError::MissingPrimaryKey`] when no field is a primary key.
    /// - [`SchemaError::DuplicatePrimaryKey`] when more than one is.
    /// - [`SchemaError::DuplicateField`] when a name is declared twice.
    /// - [`SchemaError::UnsupportedPrimaryKey`] for boolean and text keys.
    pub fn build(self) -> Result<Arc<Schema>, SchemaError> {
        let model = self.model;
        let table = self.table.unwrap_or_else(|| model.clone());
        info!(model = %model, table = %table, "found model");

        let mut mapping: IndexMap<String, Field> = IndexMap::with_capacity(self.fields.len());
        let mut primary_key: Option<String> = None;
        let mut fields = Vec::new();

        for (name, field) in self.fields {
            if mapping.contains_key(&name) {
                return Err(SchemaError::DuplicateField { model, field: name });
            }
            debug!(field = %name, mapping = %field, "found mapping");

            if field.is_primary_key() {
                if matches!(field.kind(), FieldType::Boolean | FieldType::Text) {
                    return Err(SchemaError::UnsupportedPrimaryKey {
                        model,
                        field: name,
                        ddl: field.kind().ddl().to_owned(),
                    });
                }
                if let Some(first) = primary_key {
                    return Err(SchemaError::DuplicatePrimaryKey {
                        model,
                        first,
                        second: name,
                    });
                }
                primary_key = Some(name.clone());
            } else {
                fields.push(name.clone());
            }
            mapping.insert(name, field);
        }

        let Some(primary_key) = primary_key else {
            return Err(SchemaError::MissingPrimaryKey { model });
        };

        let mut schema = Schema {
            model,
            table,
            primary_key,
            fields,
            mapping,
            select_sql: String::new(),
            insert_sql: String::new(),
            update_sql: String::new(),
            delete_sql: String::new(),
        };
        schema.derive_templates();
        Ok(Arc::new(schema))
    }
}

/// Immutable description of a persisted model and its SQL templates.
///
/// Every [`Record`](super::Record) of the model shares one `Arc<Schema>`.
///
/// # Examples
///
/// ```
/// use weft::model::{Field, Schema};
///
/// let users = Schema::builder("User")
///     .table("users")
///     .field("id", Field::string().primary_key().ddl("varchar(50)"))
///     .field("email", Field::string().ddl("varchar(50)"))
///     .field("admin", Field::boolean())
///     .build()
///     .unwrap();
///
/// assert_eq!(users.select_sql(), "select `id`, `email`, `admin` from `users`");
/// assert_eq!(
///     users.insert_sql(),
///     "insert into `users` (`email`, `admin`, `id`) values (?, ?, ?)"
/// );
/// assert_eq!(users.update_sql(), "update `users` set `email`=?, `admin`=? where `id`=?");
/// assert_eq!(users.delete_sql(), "delete from `users` where `id`=?");
/// ```
#[derive(Debug)]
pub struct Schema {
    model: String,
    table: String,
    primary_key: String,
    fields: Vec<String>,
    mapping: IndexMap<String, Field>,
    select_sql: String,
    insert_sql: String,
    update_sql: String,
    delete_sql: String,
}

impl Schema {
    /// Starts a declaration for `model`.
    pub fn builder(model: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            model: model.into(),
            table: None,
            fields: Vec::new(),
        }
    }

    fn derive_templates(&mut self) {
        let table = quote(&self.table);
        let pk = quote(self.column(&self.primary_key));
        let columns: Vec<String> = self.fields.iter().map(|f| quote(self.column(f))).collect();

        self.select_sql = if columns.is_empty() {
            format!("select {pk} from {table}")
        } else {
            format!("select {pk}, {} from {table}", columns.join(", "))
        };

        let placeholders = vec!["?"; columns.len() + 1].join(", ");
        self.insert_sql = if columns.is_empty() {
            format!("insert into {table} ({pk}) values ({placeholders})")
        } else {
            format!(
                "insert into {table} ({}, {pk}) values ({placeholders})",
                columns.join(", ")
            )
        };

        // A key-only model still needs a syntactically valid assignment list.
        let assignments = if columns.is_empty() {
            format!("{pk}={pk}")
        } else {
            columns
                .iter()
                .map(|c| format!("{c}=?"))
                .collect::<Vec<_>>()
                .join(", ")
        };
        self.update_sql = format!("update {table} set {assignments} where {pk}=?");
        self.delete_sql = format!("delete from {table} where {pk}=?");
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Name of the primary-key field.
    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    /// Non-key field names in declaration order.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Every declared field, primary key included, in declaration order.
    pub fn mapping(&self) -> &IndexMap<String, Field> {
        &self.mapping
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.mapping.get(name)
    }

    /// Storage column of `field`: its declared override, else the field name.
    pub fn column<'a>(&'a self, field: &'a str) -> &'a str {
        self.mapping
            .get(field)
            .and_then(Field::column_name)
            .unwrap_or(field)
    }

    pub fn select_sql(&self) -> &str {
        &self.select_sql
    }

    pub fn insert_sql(&self) -> &str {
        &self.insert_sql
    }

    pub fn update_sql(&self) -> &str {
        &self.update_sql
    }

    pub fn delete_sql(&self) -> &str {
        &self.delete_sql
    }

    /// `create table` DDL for bootstrapping an empty database.
    ///
    /// Only the key column is `not null`; everything else is nullable.
    pub fn create_table_sql(&self) -> String {
        let pk = &self.primary_key;
        let mut columns = Vec::with_capacity(self.mapping.len());
        if let Some(field) = self.mapping.get(pk) {
            columns.push(format!(
                "{} {} not null primary key",
                quote(self.column(pk)),
                field.kind().ddl()
            ));
        }
        for name in &self.fields {
            if let Some(field) = self.mapping.get(name) {
                columns.push(format!("{} {}", quote(self.column(name)), field.kind().ddl()));
            }
        }
        format!("create table {} ({})", quote(&self.table), columns.join(", "))
    }
}

pub(crate) fn quote(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blog() -> Arc<Schema> {
        Schema::builder("Blog")
            .table("blogs")
            .field("id", Field::string().primary_key().ddl("varchar(50)"))
            .field("name", Field::string().ddl("varchar(50)"))
            .field("summary", Field::string().ddl("varchar(200)"))
            .field("content", Field::text())
            .field("created_at", Field::float())
            .build()
            .unwrap()
    }

    #[test]
    fn templates_follow_declaration_order() {
        let s = blog();
        assert_eq!(s.primary_key(), "id");
        assert_eq!(s.fields(), ["name", "summary", "content", "created_at"]);
        assert_eq!(
            s.select_sql(),
            "select `id`, `name`, `summary`, `content`, `created_at` from `blogs`"
        );
        assert_eq!(
            s.insert_sql(),
            "insert into `blogs` (`name`, `summary`, `content`, `created_at`, `id`) values (?, ?, ?, ?, ?)"
        );
        assert_eq!(
            s.update_sql(),
            "update `blogs` set `name`=?, `summary`=?, `content`=?, `created_at`=? where `id`=?"
        );
        assert_eq!(s.delete_sql(), "delete from `blogs` where `id`=?");
    }

    #[test]
    fn table_defaults_to_model_name() {
        let s = Schema::builder("Tag")
            .field("id", Field::integer().primary_key())
            .field("label", Field::string())
            .build()
            .unwrap();
        assert_eq!(s.table(), "Tag");
        assert_eq!(s.select_sql(), "select `id`, `label` from `Tag`");
    }

    #[test]
    fn exactly_one_primary_key() {
        let none = Schema::builder("Nothing").field("a", Field::string()).build();
        assert_eq!(
            none.unwrap_err(),
            SchemaError::MissingPrimaryKey {
                model: "Nothing".into()
            }
        );

        let two = Schema::builder("Twice")
            .field("a", Field::string().primary_key())
            .field("b", Field::integer().primary_key())
            .build();
        assert!(matches!(
            two.unwrap_err(),
            SchemaError::DuplicatePrimaryKey { first, second, .. } if first == "a" && second == "b"
        ));
    }

    #[test]
    fn duplicate_field_names_are_rejected() {
        let err = Schema::builder("User")
            .field("id", Field::string().primary_key())
            .field("name", Field::string())
            .field("name", Field::text())
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateField { field, .. } if field == "name"));
    }

    #[test]
    fn boolean_and_text_keys_are_rejected() {
        for field in [Field::boolean(), Field::text()] {
            let err = Schema::builder("Flag")
                .field("id", field.primary_key())
                .build()
                .unwrap_err();
            assert!(matches!(err, SchemaError::UnsupportedPrimaryKey { .. }));
        }
    }

    #[test]
    fn column_override_reaches_every_template() {
        let s = Schema::builder("Comment")
            .table("comments")
            .field("id", Field::integer().primary_key().column("comment_id"))
            .field("body", Field::text().column("content"))
            .build()
            .unwrap();
        assert_eq!(s.column("body"), "content");
        assert_eq!(s.column("unknown"), "unknown");
        assert_eq!(s.select_sql(), "select `comment_id`, `content` from `comments`");
        assert_eq!(
            s.insert_sql(),
            "insert into `comments` (`content`, `comment_id`) values (?, ?)"
        );
        assert_eq!(
            s.update_sql(),
            "update `comments` set `content`=? where `comment_id`=?"
        );
        assert_eq!(s.delete_sql(), "delete from `comments` where `comment_id`=?");
    }

    #[test]
    fn backticks_in_identifiers_are_doubled() {
        let s = Schema::builder("Odd")
            .table("we`ird")
            .field("id", Field::integer().primary_key())
            .field("a`b", Field::integer())
            .build()
            .unwrap();
        assert_eq!(s.select_sql(), "select `id`, `a``b` from `we``ird`");
        assert_eq!(s.delete_sql(), "delete from `we``ird` where `id`=?");
    }

    #[test]
    fn key_only_model_still_has_valid_templates() {
        let s = Schema::builder("Token")
            .field("id", Field::string().primary_key())
            .build()
            .unwrap();
        assert!(s.fields().is_empty());
        assert_eq!(s.select_sql(), "select `id` from `Token`");
        assert_eq!(s.insert_sql(), "insert into `Token` (`id`) values (?)");
        assert_eq!(s.update_sql(), "update `Token` set `id`=`id` where `id`=?");
    }

    #[test]
    fn create_table_uses_storage_types() {
        assert_eq!(
            blog().create_table_sql(),
            "create table `blogs` (`id` varchar(50) not null primary key, `name` varchar(50), \
             `summary` varchar(200), `content` text, `created_at` real)"
        );
    }
}
