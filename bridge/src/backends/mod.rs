//! Storage backends for the model layer.
//!
//! A [`Backend`] maps create/read/update/delete/query onto one AWS data
//! service. Services that cannot provide an operation return
//! [`Error::Unsupported`](crate::Error::Unsupported) rather than emulating it.

pub mod dynamodb;
pub mod partiql;
pub mod sqs;

use std::str::FromStr;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::{Error, Result};

pub use dynamodb::DynamoDbBackend;
pub use partiql::PartiQlBackend;
pub use sqs::{MessageQueue, SqsBackend};

/// A single stored record.
pub type Record = Map<String, Value>;

/// Where a model's records live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Model {
    /// Table name, or the queue URL for queue-backed models
    pub table_name: String,
    /// Attribute holding the record id
    pub id_column: String,
}

impl Model {
    pub fn new(table_name: impl Into<String>, id_column: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            id_column: id_column.into(),
        }
    }
}

/// Comparison applied by a [`Condition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
    IsNull,
    IsNotNull,
    Like,
}

impl FromStr for Operator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "=" | "IS" => Ok(Operator::Eq),
            "!=" | "<>" | "IS NOT" => Ok(Operator::NotEq),
            "<" => Ok(Operator::Lt),
            "<=" => Ok(Operator::Lte),
            ">" => Ok(Operator::Gt),
            ">=" => Ok(Operator::Gte),
            "IS NULL" => Ok(Operator::IsNull),
            "IS NOT NULL" => Ok(Operator::IsNotNull),
            "LIKE" => Ok(Operator::Like),
            other => Err(Error::Unsupported(format!("Operator '{}'", other))),
        }
    }
}

/// One `column <operator> value` filter.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub column: String,
    pub operator: Operator,
    pub values: Vec<Value>,
}

impl Condition {
    pub fn new(column: impl Into<String>, operator: Operator, values: Vec<Value>) -> Self {
        Self {
            column: column.into(),
            operator,
            values,
        }
    }

    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, Operator::Eq, vec![value.into()])
    }

    /// The first value, required by every operator except the null checks.
    pub fn value(&self) -> Result<&Value> {
        self.values.first().ok_or_else(|| {
            Error::Validation(format!(
                "Condition on '{}' ({:?}) needs a value",
                self.column, self.operator
            ))
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub column: String,
    pub direction: SortDirection,
}

/// Filters, ordering and pagination for a records query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub conditions: Vec<Condition>,
    pub sorts: Vec<Sort>,
    pub limit: Option<i32>,
    pub next_token: Option<String>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn sort(mut self, column: impl Into<String>, direction: SortDirection) -> Self {
        self.sorts.push(Sort {
            column: column.into(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: i32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn after(mut self, next_token: impl Into<String>) -> Self {
        self.next_token = Some(next_token.into());
        self
    }
}

/// One page of query results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub records: Vec<Record>,
    /// Opaque token for the following page, if there is one
    pub next_token: Option<String>,
}

/// Generic storage operations issued by the model layer.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn create(&self, data: Record, model: &Model) -> Result<Record>;

    async fn read(&self, id: &Value, model: &Model) -> Result<Option<Record>>;

    async fn update(&self, id: &Value, data: Record, model: &Model) -> Result<Record>;

    async fn delete(&self, id: &Value, model: &Model) -> Result<()>;

    async fn query(&self, query: &Query, model: &Model) -> Result<Page>;

    async fn count(&self, query: &Query, model: &Model) -> Result<usize>;
}
