use std::fmt;
use std::sync::Arc;

use crate::database::Value;

/// Storage type of a mapped column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    /// Variable-length string; carries its DDL, `varchar(100)` by default.
    String { ddl: String },
    Boolean,
    Integer,
    Float,
    Text,
}

impl FieldType {
    /// Column type used in generated DDL.
    pub fn ddl(&self) -> &str {
        match self {
            FieldType::String { ddl } => ddl,
            FieldType::Boolean => "boolean",
            FieldType::Integer => "bigint",
            FieldType::Float => "real",
            FieldType::Text => "text",
        }
    }

    /// Normalizes a value read back from storage.
    ///
    /// Backends without a native boolean hand back integers, and integral
    /// floats may come back as integers.
    pub fn coerce(&self, value: Value) -> Value {
        match (self, value) {
            (FieldType::Boolean, Value::Int(n)) => Value::Bool(n != 0),
            (FieldType::Float, Value::Int(n)) => Value::Float(n as f64),
            (_, v) => v,
        }
    }
}

/// Zero-argument value factory, e.g. an id generator or a clock.
pub type DefaultFactory = Arc<dyn Fn() -> Value + Send + Sync>;

/// Default used by [`Record::save`](super::Record::save) when a field has no value.
#[derive(Clone)]
pub enum FieldDefault {
    Value(Value),
    Factory(DefaultFactory),
}

impl FieldDefault {
    /// Produces the default, invoking the factory when there is one.
    pub fn resolve(&self) -> Value {
        match self {
            FieldDefault::Value(v) => v.clone(),
            FieldDefault::Factory(f) => f(),
        }
    }
}

impl fmt::Debug for FieldDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldDefault::Value(v) => f.debug_tuple("Value").field(v).finish(),
            FieldDefault::Factory(_) => f.write_str("Factory(..)"),
        }
    }
}

/// Declaration of one mapped column.
///
/// Built with one of the typed constructors and refined with the builder
/// methods; immutable once handed to a [`Schema`](super::Schema).
///
/// # Examples
///
/// ```
/// use weft::model::Field;
///
/// let id = Field::string().primary_key().ddl("varchar(50)");
/// let admin = Field::boolean();
/// let created_at = Field::float().default_with(|| 1_700_000_000.0.into());
///
/// assert!(id.is_primary_key());
/// assert_eq!(admin.kind().ddl(), "boolean");
/// assert!(created_at.default().is_some());
/// ```
#[derive(Debug, Clone)]
pub struct Field {
    column: Option<String>,
    kind: FieldType,
    primary_key: bool,
    default: Option<FieldDefault>,
}

impl Field {
    fn new(kind: FieldType, default: Option<Value>) -> Self {
        Self {
            column: None,
            kind,
            primary_key: false,
            default: default.map(FieldDefault::Value),
        }
    }

    /// `varchar(100)` column with no default.
    pub fn string() -> Self {
        Self::new(
            FieldType::String {
                ddl: "varchar(100)".to_owned(),
            },
            None,
        )
    }

    /// `boolean` column defaulting to `false`.
    pub fn boolean() -> Self {
        Self::new(FieldType::Boolean, Some(Value::Bool(false)))
    }

    /// `bigint` column defaulting to `0`.
    pub fn integer() -> Self {
        Self::new(FieldType::Integer, Some(Value::Int(0)))
    }

    /// `real` column defaulting to `0.0`.
    pub fn float() -> Self {
        Self::new(FieldType::Float, Some(Value::Float(0.0)))
    }

    /// `text` column with no default.
    pub fn text() -> Self {
        Self::new(FieldType::Text, None)
    }

    /// Marks this field as the primary key.
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Overrides the column name; the field name is used otherwise.
    #[must_use]
    pub fn column(mut self, name: impl Into<String>) -> Self {
        self.column = Some(name.into());
        self
    }

    /// Overrides the DDL of a string field. Other field types ignore it.
    #[must_use]
    pub fn ddl(mut self, ddl: impl Into<String>) -> Self {
        if let FieldType::String { ddl: current } = &mut self.kind {
            *current = ddl.into();
        }
        self
    }

    /// Sets a constant default.
    #[must_use]
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(FieldDefault::Value(value.into()));
        self
    }

    /// Sets a default computed on each save.
    #[must_use]
    pub fn default_with(mut self, factory: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        self.default = Some(FieldDefault::Factory(Arc::new(factory)));
        self
    }

    pub fn is_primary_key(&self) -> bool {
        self.primary_key
    }

    pub fn kind(&self) -> &FieldType {
        &self.kind
    }

    pub fn default(&self) -> Option<&FieldDefault> {
        self.default.as_ref()
    }

    /// Column override, if one was declared.
    pub fn column_name(&self) -> Option<&str> {
        self.column.as_deref()
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}", self.kind.ddl())?;
        if let Some(column) = &self.column {
            write!(f, ":{column}")?;
        }
        if self.primary_key {
            f.write_str(", primary key")?;
        }
        f.write_str(">")
    }
}
