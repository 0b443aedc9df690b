use std::sync::Arc;

use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, Serializer};
use tracing::{debug, warn};

use super::schema::{quote, Schema};
use crate::database::{Database, DbError, Row, Value};

/// Row cap appended to a `find_all` query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    /// `limit ?`
    Count(u32),
    /// `limit ?, ?`
    Range { offset: u32, count: u32 },
}

impl From<u32> for Limit {
    fn from(count: u32) -> Self {
        Limit::Count(count)
    }
}

impl From<(u32, u32)> for Limit {
    fn from((offset, count): (u32, u32)) -> Self {
        Limit::Range { offset, count }
    }
}

impl TryFrom<&serde_json::Value> for Limit {
    type Error = DbError;

    /// Accepts an integer or a two-element integer array.
    fn try_from(value: &serde_json::Value) -> Result<Self, Self::Error> {
        let int = |v: &serde_json::Value| v.as_u64().and_then(|n| u32::try_from(n).ok());
        let parsed = match value {
            serde_json::Value::Array(pair) if pair.len() == 2 => {
                int(&pair[0]).zip(int(&pair[1])).map(Limit::from)
            }
            other => int(other).map(Limit::Count),
        };
        parsed.ok_or_else(|| DbError::InvalidLimit(value.to_string()))
    }
}

/// Filters for [`Schema::find_all`].
///
/// # Examples
///
/// ```
/// use weft::model::{FindOptions, Limit};
///
/// let opts = FindOptions::new()
///     .filter("`user_id`=?", ["001".into()])
///     .order_by("created_at desc")
///     .limit((10, 5));
/// assert_eq!(opts.limit, Some(Limit::Range { offset: 10, count: 5 }));
/// ```
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub filter: Option<String>,
    pub args: Vec<Value>,
    pub order_by: Option<String>,
    pub limit: Option<Limit>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a `where` clause and its arguments.
    #[must_use]
    pub fn filter(mut self, clause: impl Into<String>, args: impl IntoIterator<Item = Value>) -> Self {
        self.filter = Some(clause.into());
        self.args.extend(args);
        self
    }

    #[must_use]
    pub fn order_by(mut self, order: impl Into<String>) -> Self {
        self.order_by = Some(order.into());
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: impl Into<Limit>) -> Self {
        self.limit = Some(limit.into());
        self
    }

    /// Sets the limit from an untyped value, e.g. a decoded query parameter.
    ///
    /// # Errors
    ///
    /// [`DbError::InvalidLimit`] unless `value` is a non-negative integer or a
    /// pair of them.
    pub fn try_limit(mut self, value: &serde_json::Value) -> Result<Self, DbError> {
        self.limit = Some(Limit::try_from(value)?);
        Ok(self)
    }
}

impl Schema {
    /// A new, empty record of this model.
    pub fn record(self: &Arc<Self>) -> Record {
        Record::new(self)
    }

    /// Finds records matching `options`.
    pub async fn find_all(
        self: &Arc<Self>,
        db: &Database,
        options: FindOptions,
    ) -> Result<Vec<Record>, DbError> {
        let mut sql = vec![self.select_sql().to_owned()];
        let mut args = options.args;
        if let Some(filter) = options.filter {
            sql.push("where".to_owned());
            sql.push(filter);
        }
        if let Some(order) = options.order_by {
            sql.push("order by".to_owned());
            sql.push(order);
        }
        match options.limit {
            Some(Limit::Count(count)) => {
                sql.push("limit ?".to_owned());
                args.push(count.into());
            }
            Some(Limit::Range { offset, count }) => {
                sql.push("limit ?, ?".to_owned());
                args.push(offset.into());
                args.push(count.into());
            }
            None => {}
        }

        let rows = db.select(&sql.join(" "), &args, None).await?;
        Ok(rows.into_iter().map(|row| Record::from_row(self, row)).collect())
    }

    /// Selects a single aggregate, e.g. `count(id)`, aliased as `_num_`.
    ///
    /// Returns `None` when the query yields no row.
    pub async fn find_number(
        &self,
        db: &Database,
        expr: &str,
        filter: Option<&str>,
        args: &[Value],
    ) -> Result<Option<Value>, DbError> {
        let mut sql = format!("select {expr} _num_ from {}", quote(self.table()));
        if let Some(filter) = filter {
            sql.push_str(" where ");
            sql.push_str(filter);
        }
        let rows = db.select(&sql, args, Some(1)).await?;
        Ok(rows
            .into_iter()
            .next()
            .and_then(|mut row| row.shift_remove("_num_")))
    }

    /// Finds a record by primary key.
    pub async fn find(
        self: &Arc<Self>,
        db: &Database,
        pk: impl Into<Value>,
    ) -> Result<Option<Record>, DbError> {
        let sql = format!(
            "{} where `{}`=?",
            self.select_sql(),
            self.column(self.primary_key())
        );
        let rows = db.select(&sql, &[pk.into()], Some(1)).await?;
        Ok(rows.into_iter().next().map(|row| Record::from_row(self, row)))
    }
}

/// One instance of a model: field name → value, in field order.
///
/// Records serialize as flat JSON objects.
///
/// # Examples
///
/// ```rust,no_run
/// use weft::database::Database;
/// use weft::model::{Field, Schema};
///
/// # async fn example(db: Database) -> Result<(), Box<dyn std::error::Error>> {
/// let users = Schema::builder("User")
///     .table("users")
///     .field("id", Field::string().primary_key())
///     .field("name", Field::string())
///     .field("admin", Field::boolean())
///     .build()?;
///
/// let mut user = users.record().with("id", "001").with("name", "Test");
/// user.save(&db).await?;
///
/// let found = users.find(&db, "001").await?.expect("saved above");
/// assert_eq!(found.value("admin"), false.into());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Record {
    schema: Arc<Schema>,
    values: IndexMap<String, Value>,
}

impl Record {
    pub fn new(schema: &Arc<Schema>) -> Self {
        Self {
            schema: Arc::clone(schema),
            values: IndexMap::new(),
        }
    }

    /// Rebuilds a record from a selected row, coercing each column through
    /// its field's storage type.
    pub fn from_row(schema: &Arc<Schema>, mut row: Row) -> Self {
        let mut values = IndexMap::with_capacity(row.len());
        for (name, field) in schema.mapping() {
            if let Some(value) = row.shift_remove(schema.column(name)) {
                values.insert(name.clone(), field.kind().coerce(value));
            }
        }
        // Columns outside the mapping, e.g. computed select-list entries.
        values.extend(row);
        Self {
            schema: Arc::clone(schema),
            values,
        }
    }

    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(field, value);
        self
    }

    /// Assigns a field, returning the previous value.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.values.insert(field.into(), value.into())
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    /// The assigned value, or `Null` when the field is unset.
    pub fn value(&self, field: &str) -> Value {
        self.values.get(field).cloned().unwrap_or_default()
    }

    /// The assigned value, falling back to the declared default when the field
    /// is unset or `Null`.
    ///
    /// A resolved default is stored back into the record, so a factory runs
    /// at most once per field.
    pub fn value_or_default(&mut self, field: &str) -> Value {
        if let Some(value) = self.values.get(field).filter(|v| !v.is_null()) {
            return value.clone();
        }
        let Some(default) = self.schema.field(field).and_then(|f| f.default()) else {
            return Value::Null;
        };
        let value = default.resolve();
        debug!(field, value = %value, "using default value");
        self.values.insert(field.to_owned(), value.clone());
        value
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Current primary-key value.
    pub fn primary_key(&self) -> Value {
        self.value(self.schema.primary_key())
    }

    /// Assigned fields in order.
    pub fn values(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Inserts this record, filling unset fields from their defaults.
    ///
    /// Afterwards the record holds every schema field; fields with neither a
    /// value nor a default hold `Null`. Returns the affected-row count; a
    /// count other than 1 is logged, not raised.
    pub async fn save(&mut self, db: &Database) -> Result<u64, DbError> {
        let schema = Arc::clone(&self.schema);
        let names = schema
            .fields()
            .iter()
            .map(String::as_str)
            .chain([schema.primary_key()]);

        let mut args = Vec::with_capacity(schema.fields().len() + 1);
        for name in names {
            let value = self.value_or_default(name);
            self.values
                .entry(name.to_owned())
                .or_insert_with(|| value.clone());
            args.push(value);
        }

        let affected = db.execute(schema.insert_sql(), &args).await?;
        self.check_affected("insert", affected);
        Ok(affected)
    }

    /// Writes every non-key field back by primary key. Unset fields are
    /// written as `NULL`; defaults are not applied.
    pub async fn update(&self, db: &Database) -> Result<u64, DbError> {
        let mut args: Vec<Value> = self.schema.fields().iter().map(|f| self.value(f)).collect();
        args.push(self.primary_key());

        let affected = db.execute(self.schema.update_sql(), &args).await?;
        self.check_affected("update", affected);
        Ok(affected)
    }

    /// Deletes the stored row with this record's primary key.
    pub async fn remove(&self, db: &Database) -> Result<u64, DbError> {
        let affected = db
            .execute(self.schema.delete_sql(), &[self.primary_key()])
            .await?;
        self.check_affected("remove", affected);
        Ok(affected)
    }

    fn check_affected(&self, op: &'static str, affected: u64) {
        if affected != 1 {
            warn!(
                model = self.schema.model(),
                op,
                affected,
                key = %self.primary_key(),
                "unexpected affected row count"
            );
        }
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (k, v) in &self.values {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::SqlitePool;
    use crate::model::Field;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn users() -> Arc<Schema> {
        static NEXT: AtomicU32 = AtomicU32::new(1);
        Schema::builder("User")
            .table("users")
            .field(
                "id",
                Field::string()
                    .primary_key()
                    .ddl("varchar(50)")
                    .default_with(|| format!("{:04}", NEXT.fetch_add(1, Ordering::SeqCst)).into()),
            )
            .field("email", Field::string().ddl("varchar(50)"))
            .field("admin", Field::boolean())
            .field("name", Field::string().ddl("varchar(50)"))
            .field("created_at", Field::float().default_value(1.5))
            .build()
            .unwrap()
    }

    async fn setup() -> (Database, Arc<Schema>) {
        let db = Database::from_pool(SqlitePool::memory().await.unwrap());
        let schema = users();
        db.execute(&schema.create_table_sql(), &[]).await.unwrap();
        (db, schema)
    }

    #[test]
    fn limit_from_untyped_values() {
        assert_eq!(Limit::try_from(&json!(3)).unwrap(), Limit::Count(3));
        assert_eq!(
            Limit::try_from(&json!([2, 3])).unwrap(),
            Limit::Range { offset: 2, count: 3 }
        );
        for bad in [json!("x"), json!([1]), json!([1, 2, 3]), json!(-1), json!(1.5)] {
            assert!(matches!(Limit::try_from(&bad), Err(DbError::InvalidLimit(_))));
        }
        assert!(FindOptions::new().try_limit(&json!("x")).is_err());
    }

    #[test]
    fn resolved_defaults_are_stored_back() {
        let schema = users();
        let mut user = schema.record();
        assert_eq!(user.value("admin"), Value::Null);
        assert_eq!(user.value_or_default("admin"), Value::Bool(false));
        assert_eq!(user.get("admin"), Some(&Value::Bool(false)));

        let first = user.value_or_default("id");
        assert_eq!(user.value_or_default("id"), first);
        assert_eq!(user.value_or_default("email"), Value::Null);
        assert!(user.get("email").is_none());
    }

    #[test]
    fn records_serialize_as_flat_maps() {
        let user = users().record().with("id", "7").with("admin", true).with("name", "Ann");
        assert_eq!(
            serde_json::to_value(&user).unwrap(),
            json!({"id": "7", "admin": true, "name": "Ann"})
        );
    }

    #[tokio::test]
    async fn save_then_find_round_trips() {
        let (db, schema) = setup().await;
        let mut user = schema
            .record()
            .with("email", "test@example.com")
            .with("name", "Test");
        assert_eq!(user.save(&db).await.unwrap(), 1);
        let id = user.primary_key();
        assert!(!id.is_null());

        let found = schema.find(&db, id.clone()).await.unwrap().unwrap();
        assert_eq!(found.value("id"), id);
        assert_eq!(found.value("admin"), Value::Bool(false));
        assert_eq!(found.value("created_at"), Value::Float(1.5));
        assert_eq!(
            found.values().map(|(k, _)| k).collect::<Vec<_>>(),
            ["id", "email", "admin", "name", "created_at"]
        );
        let saved: BTreeMap<_, _> = user.values().collect();
        assert_eq!(found.values().collect::<BTreeMap<_, _>>(), saved);

        assert!(schema.find(&db, "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unset_fields_are_stored_back_as_null() {
        let (db, schema) = setup().await;
        let mut user = schema.record().with("id", "u1");
        user.save(&db).await.unwrap();
        assert_eq!(user.get("email"), Some(&Value::Null));
        assert_eq!(user.get("name"), Some(&Value::Null));

        let found = schema.find(&db, "u1").await.unwrap().unwrap();
        let saved: BTreeMap<_, _> = user.values().collect();
        assert_eq!(found.values().collect::<BTreeMap<_, _>>(), saved);
    }

    #[tokio::test]
    async fn explicit_null_takes_the_default() {
        let (db, schema) = setup().await;
        let mut user = schema.record().with("id", "u2").with("admin", Value::Null);
        assert_eq!(user.value_or_default("admin"), Value::Bool(false));

        user.set("admin", Value::Null);
        user.save(&db).await.unwrap();
        let found = schema.find(&db, "u2").await.unwrap().unwrap();
        assert_eq!(found.value("admin"), Value::Bool(false));
    }

    #[tokio::test]
    async fn find_all_with_filter_order_and_limit() {
        let (db, schema) = setup().await;
        for (id, name) in [("a", "x"), ("b", "y"), ("c", "x"), ("d", "x")] {
            schema
                .record()
                .with("id", id)
                .with("name", name)
                .save(&db)
                .await
                .unwrap();
        }

        let xs = schema
            .find_all(
                &db,
                FindOptions::new()
                    .filter("`name`=?", ["x".into()])
                    .order_by("id desc"),
            )
            .await
            .unwrap();
        let ids: Vec<Value> = xs.iter().map(Record::primary_key).collect();
        assert_eq!(ids, [Value::from("d"), "c".into(), "a".into()]);

        let page = schema
            .find_all(&db, FindOptions::new().order_by("id").limit((1, 2)))
            .await
            .unwrap();
        let ids: Vec<Value> = page.iter().map(Record::primary_key).collect();
        assert_eq!(ids, [Value::from("b"), "c".into()]);

        let capped = schema
            .find_all(&db, FindOptions::new().limit(3))
            .await
            .unwrap();
        assert_eq!(capped.len(), 3);
    }

    #[tokio::test]
    async fn find_number_counts_and_misses() {
        let (db, schema) = setup().await;
        for id in ["a", "b", "c"] {
            schema.record().with("id", id).save(&db).await.unwrap();
        }
        let n = schema.find_number(&db, "count(id)", None, &[]).await.unwrap();
        assert_eq!(n, Some(Value::Int(3)));

        let n = schema
            .find_number(&db, "count(id)", Some("`id`<>?"), &["a".into()])
            .await
            .unwrap();
        assert_eq!(n, Some(Value::Int(2)));

        let none = schema
            .find_number(&db, "`id`", Some("`id`=?"), &["zzz".into()])
            .await
            .unwrap();
        assert_eq!(none, None);
    }

    #[tokio::test]
    async fn update_writes_unset_fields_as_null() {
        let (db, schema) = setup().await;
        let mut user = schema
            .record()
            .with("id", "u1")
            .with("email", "old@example.com")
            .with("name", "Old");
        user.save(&db).await.unwrap();

        let partial = schema.record().with("id", "u1").with("name", "New");
        assert_eq!(partial.update(&db).await.unwrap(), 1);

        let found = schema.find(&db, "u1").await.unwrap().unwrap();
        assert_eq!(found.value("name"), "New".into());
        assert_eq!(found.value("email"), Value::Null);
    }

    #[tokio::test]
    async fn anomalous_counts_are_not_errors() {
        let (db, schema) = setup().await;
        let ghost = schema.record().with("id", "ghost");
        assert_eq!(ghost.update(&db).await.unwrap(), 0);
        assert_eq!(ghost.remove(&db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn remove_deletes_the_row() {
        let (db, schema) = setup().await;
        let mut user = schema.record().with("id", "gone");
        user.save(&db).await.unwrap();
        assert_eq!(user.remove(&db).await.unwrap(), 1);
        assert!(schema.find(&db, "gone").await.unwrap().is_none());
    }
}
