//! The query builder and its supporting types.
//!
//! A [`Query`] accumulates intent (kind, fields, filters, sort, limit,
//! related sub-queries) through a fluent API and renders it to the compact
//! wire dictionary with [`Query::generate`]. The builder owns everything it
//! accumulates; `generate` snapshots that state into a fresh dictionary, so a
//! builder stays reusable after rendering.

pub mod filter;

use serde_json::json;

use crate::error::{Error, Result};
use self::filter::{Condition, Value};

/// The JSON-shaped payload emitted on the socket, with insertion order
/// preserved.
pub type Document = serde_json::Map<String, serde_json::Value>;

/// The kind of a query. A query whose kind is still [`QueryKind::None`] cannot
/// be rendered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum QueryKind {
    /// No kind set yet.
    #[default]
    None,
    /// An insert query.
    Insert,
    /// A select query.
    Select,
    /// An update query.
    Update,
    /// A delete query.
    Delete,
}

impl QueryKind {
    /// The integer code sent on the wire, or `None` if the kind is unset.
    pub fn wire_code(&self) -> Option<i64> {
        match self {
            QueryKind::None => None,
            QueryKind::Insert => Some(1),
            QueryKind::Select => Some(2),
            QueryKind::Update => Some(3),
            QueryKind::Delete => Some(4),
        }
    }
}

/// The direction of a sort on a single field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortOrder {
    /// Ascending order; `1` on the wire.
    Ascending,
    /// Descending order; `-1` on the wire.
    Descending,
}

impl SortOrder {
    fn wire_value(&self) -> i64 {
        match self {
            SortOrder::Ascending => 1,
            SortOrder::Descending => -1,
        }
    }

    /// Whether this is the ascending order.
    pub fn is_ascending(&self) -> bool {
        matches!(self, SortOrder::Ascending)
    }
}

/// A builder for a single query against a schema.
///
/// ```
/// use zteradb::{Query, SortOrder};
///
/// # fn main() -> zteradb::Result<()> {
/// let query = Query::new("orders")
///     .select()
///     .filter("status", "open")?
///     .sort("created_at", SortOrder::Descending)
///     .limit(0, 25)?;
/// let wire_dict = query.generate()?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct Query {
    schema_name: String,
    database_id: Option<String>,
    kind: QueryKind,
    fields: Document,
    filters: Document,
    filter_conditions: Vec<serde_json::Value>,
    related: Document,
    sort: Vec<(String, SortOrder)>,
    limit: Option<(i64, i64)>,
    count: bool,
}

impl Query {
    /// Creates a builder for a query against the named schema.
    pub fn new(schema_name: impl Into<String>) -> Self {
        Self {
            schema_name: schema_name.into(),
            ..Default::default()
        }
    }

    /// Creates a builder targeting a specific database.
    pub fn with_database(schema_name: impl Into<String>, database_id: impl Into<String>) -> Self {
        Self {
            schema_name: schema_name.into(),
            database_id: Some(database_id.into()),
            ..Default::default()
        }
    }

    /// Marks this as a select query. The last kind call wins.
    pub fn select(mut self) -> Self {
        self.kind = QueryKind::Select;
        self
    }

    /// Marks this as an insert query.
    pub fn insert(mut self) -> Self {
        self.kind = QueryKind::Insert;
        self
    }

    /// Marks this as an update query.
    pub fn update(mut self) -> Self {
        self.kind = QueryKind::Update;
        self
    }

    /// Marks this as a delete query.
    pub fn delete(mut self) -> Self {
        self.kind = QueryKind::Delete;
        self
    }

    /// The kind this query currently has.
    pub fn kind(&self) -> QueryKind {
        self.kind
    }

    /// Whether this is a select query; select queries stream their results.
    pub fn is_select(&self) -> bool {
        self.kind == QueryKind::Select
    }

    /// Adds a field value, merging with any previously added fields.
    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::invalid_query("field name must be a non-empty string"));
        }

        self.fields.insert(name, value.into().to_json());
        Ok(self)
    }

    /// Adds several field values at once.
    pub fn fields<I, K, V>(mut self, entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        for (name, value) in entries {
            self = self.field(name, value)?;
        }
        Ok(self)
    }

    /// Adds an exact-match filter on a field. [`Value::Null`] matches an
    /// explicit null.
    pub fn filter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::invalid_query(
                "filter field name must be a non-empty string",
            ));
        }

        self.filters.insert(name, value.into().to_json());
        Ok(self)
    }

    /// Appends a rendered filter condition built with the
    /// [`filter`](crate::query::filter) algebra.
    pub fn filter_condition(mut self, condition: &Condition) -> Self {
        self.filter_conditions.push(condition.render());
        self
    }

    /// Attaches a related sub-query under the given field name.
    ///
    /// The child query is rendered immediately and the snapshot is stored, so
    /// later changes to the child do not affect this query and no object
    /// graph survives into the wire dictionary.
    pub fn related(mut self, name: impl Into<String>, query: &Query) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::invalid_query(
                "related field name must be a non-empty string",
            ));
        }

        self.related
            .insert(name, serde_json::Value::Object(query.generate()?));
        Ok(self)
    }

    /// Adds a sort on a field. Sorts apply in the order they are added.
    pub fn sort(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort.push((field.into(), order));
        self
    }

    /// Limits the result window to `[start, end)`.
    pub fn limit(mut self, start: i64, end: i64) -> Result<Self> {
        if start < 0 {
            return Err(Error::invalid_query(format!(
                "limit start '{start}' must not be negative"
            )));
        }

        if end <= start {
            return Err(Error::invalid_query(format!(
                "limit end '{end}' must be greater than start '{start}'"
            )));
        }

        self.limit = Some((start, end));
        Ok(self)
    }

    /// Requests the count of matching records instead of the records.
    pub fn count(mut self) -> Self {
        self.count = true;
        self
    }

    /// The composite sort map, fields in the order they were added.
    pub fn sort_document(&self) -> Document {
        self.sort
            .iter()
            .map(|(field, order)| (field.clone(), order.wire_value().into()))
            .collect()
    }

    /// Renders the accumulated query to its wire dictionary.
    ///
    /// Only non-empty members are emitted, under the compact keys the server
    /// expects (`sh`, `db`, `qt`, `fl`, `fi`, `fc`, `rf`, `st`, `lt`, `cnt`).
    pub fn generate(&self) -> Result<Document> {
        if self.schema_name.trim().is_empty() {
            return Err(Error::invalid_query("schema name is required"));
        }

        let kind = self
            .kind
            .wire_code()
            .ok_or_else(|| Error::invalid_query("query kind not set"))?;

        let mut document = Document::new();
        document.insert("sh".to_string(), self.schema_name.clone().into());
        if let Some(database_id) = &self.database_id {
            document.insert("db".to_string(), database_id.clone().into());
        }
        document.insert("qt".to_string(), kind.into());
        if !self.fields.is_empty() {
            document.insert("fl".to_string(), serde_json::Value::Object(self.fields.clone()));
        }
        if !self.filters.is_empty() {
            document.insert("fi".to_string(), serde_json::Value::Object(self.filters.clone()));
        }
        if !self.filter_conditions.is_empty() {
            document.insert(
                "fc".to_string(),
                serde_json::Value::Array(self.filter_conditions.clone()),
            );
        }
        if !self.related.is_empty() {
            document.insert("rf".to_string(), serde_json::Value::Object(self.related.clone()));
        }
        if !self.sort.is_empty() {
            document.insert(
                "st".to_string(),
                serde_json::Value::Object(self.sort_document()),
            );
        }
        if let Some((start, end)) = self.limit {
            document.insert("lt".to_string(), json!([start, end]));
        }
        if self.count {
            document.insert("cnt".to_string(), true.into());
        }

        Ok(document)
    }
}
