//! DynamoDB backend.
//!
//! Queries are planned against the table's key schema: an equality on a hash
//! attribute of any index turns into a `Query`, everything else falls back to
//! a `Scan` with a filter expression.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use aws_sdk_dynamodb::types::{AttributeValue, KeySchemaElement, KeyType, ReturnValue, Select};
use aws_sdk_dynamodb::Client;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde_dynamo::{from_item, to_attribute_value, to_item};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::{Backend, Condition, Model, Operator, Page, Query, Record, SortDirection};
use crate::{Error, Result};

type Item = HashMap<String, AttributeValue>;

/// Indexes sharing one hash attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HashIndex {
    /// Index to use when no range attribute is involved. `None` is the table itself.
    pub default_index: Option<String>,
    /// Range attribute -> index carrying it
    pub sortable: HashMap<String, Option<String>>,
}

/// Key layout of a table and its secondary indexes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableIndexes {
    pub hash_key: String,
    pub range_key: Option<String>,
    pub hashes: HashMap<String, HashIndex>,
}

impl TableIndexes {
    pub fn new(hash_key: impl Into<String>, range_key: Option<String>) -> Self {
        let mut indexes = Self {
            hash_key: hash_key.into(),
            range_key: range_key.clone(),
            hashes: HashMap::new(),
        };
        let hash_key = indexes.hash_key.clone();
        indexes.add(None, &hash_key, range_key.as_deref());
        indexes
    }

    /// Register an index. The first index seen for a hash becomes its default,
    /// the table itself always wins.
    pub fn add(&mut self, index_name: Option<&str>, hash: &str, range: Option<&str>) {
        let entry = self.hashes.entry(hash.to_string()).or_insert_with(|| HashIndex {
            default_index: index_name.map(str::to_string),
            sortable: HashMap::new(),
        });
        if index_name.is_none() {
            entry.default_index = None;
        }
        if let Some(range) = range {
            let slot = entry
                .sortable
                .entry(range.to_string())
                .or_insert_with(|| index_name.map(str::to_string));
            if index_name.is_none() {
                *slot = None;
            }
        }
    }

    /// Range attribute of the table's primary key.
    pub fn primary_sort_column(&self) -> Option<&str> {
        self.range_key.as_deref()
    }

    fn from_schema(
        key_schema: &[KeySchemaElement],
        secondary: impl IntoIterator<Item = (Option<String>, Vec<KeySchemaElement>)>,
    ) -> Result<Self> {
        let (hash, range) = split_key_schema(key_schema);
        let hash = hash.ok_or_else(|| Error::Aws("Table key schema has no HASH key".to_string()))?;
        let mut indexes = Self::new(hash, range);
        for (name, schema) in secondary {
            if let (Some(hash), range) = split_key_schema(&schema) {
                indexes.add(name.as_deref(), &hash, range.as_deref());
            }
        }
        Ok(indexes)
    }
}

fn split_key_schema(schema: &[KeySchemaElement]) -> (Option<String>, Option<String>) {
    let mut hash = None;
    let mut range = None;
    for element in schema {
        match element.key_type() {
            KeyType::Hash => hash = Some(element.attribute_name().to_string()),
            KeyType::Range => range = Some(element.attribute_name().to_string()),
            _ => {}
        }
    }
    (hash, range)
}

/// Expressions and placeholders for one `Query`/`Scan` call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryPlan {
    pub index_name: Option<String>,
    /// `None` means scan
    pub key_condition: Option<String>,
    pub filter: Option<String>,
    pub names: HashMap<String, String>,
    pub values: Item,
    pub scan_forward: bool,
}

impl QueryPlan {
    fn names(&self) -> Option<HashMap<String, String>> {
        (!self.names.is_empty()).then(|| self.names.clone())
    }

    fn values(&self) -> Option<Item> {
        (!self.values.is_empty()).then(|| self.values.clone())
    }
}

fn is_range_operator(operator: Operator) -> bool {
    matches!(
        operator,
        Operator::Eq | Operator::Lt | Operator::Lte | Operator::Gt | Operator::Gte
    )
}

fn comparison(operator: Operator) -> Option<&'static str> {
    match operator {
        Operator::Eq => Some("="),
        Operator::NotEq => Some("<>"),
        Operator::Lt => Some("<"),
        Operator::Lte => Some("<="),
        Operator::Gt => Some(">"),
        Operator::Gte => Some(">="),
        _ => None,
    }
}

/// Turn a query into DynamoDB expressions.
pub fn plan_query(query: &Query, model: &Model, indexes: &TableIndexes) -> Result<QueryPlan> {
    let mut plan = QueryPlan {
        scan_forward: query
            .sorts
            .first()
            .map_or(true, |sort| sort.direction == SortDirection::Asc),
        ..Default::default()
    };

    let is_hash_eq = |c: &Condition| c.operator == Operator::Eq && indexes.hashes.contains_key(&c.column);
    let hash_position = query
        .conditions
        .iter()
        .position(|c| is_hash_eq(c) && c.column == model.id_column)
        .or_else(|| query.conditions.iter().position(is_hash_eq));

    let mut used = vec![false; query.conditions.len()];
    if let Some(hash_position) = hash_position {
        let hash = &query.conditions[hash_position];
        let hash_index = &indexes.hashes[&hash.column];
        used[hash_position] = true;

        plan.names.insert("#k0".to_string(), hash.column.clone());
        plan.values.insert(":k0".to_string(), to_attribute_value(hash.value()?)?);
        let mut key_condition = "#k0 = :k0".to_string();

        let range_position = query.conditions.iter().enumerate().position(|(i, c)| {
            !used[i] && is_range_operator(c.operator) && hash_index.sortable.contains_key(&c.column)
        });

        plan.index_name = match range_position {
            Some(range_position) => {
                let range = &query.conditions[range_position];
                used[range_position] = true;
                plan.names.insert("#k1".to_string(), range.column.clone());
                plan.values.insert(":k1".to_string(), to_attribute_value(range.value()?)?);
                key_condition.push_str(&format!(
                    " AND #k1 {} :k1",
                    comparison(range.operator).unwrap_or("=")
                ));
                hash_index.sortable[&range.column].clone()
            }
            None => query
                .sorts
                .first()
                .and_then(|sort| hash_index.sortable.get(&sort.column))
                .cloned()
                .unwrap_or_else(|| hash_index.default_index.clone()),
        };
        plan.key_condition = Some(key_condition);
    }

    let mut filters = Vec::new();
    for (i, condition) in query.conditions.iter().enumerate().filter(|(i, _)| !used[*i]) {
        let name = format!("#f{}", i);
        let value = format!(":f{}", i);
        plan.names.insert(name.clone(), condition.column.clone());

        let expression = match condition.operator {
            Operator::IsNull => format!("attribute_not_exists({})", name),
            Operator::IsNotNull => format!("attribute_exists({})", name),
            Operator::Like => {
                let pattern = condition.value()?.as_str().ok_or_else(|| {
                    Error::Validation(format!("LIKE on '{}' needs a string", condition.column))
                })?;
                match like_function(pattern)? {
                    LikeMatch::Any => format!("attribute_exists({})", name),
                    LikeMatch::Function(function, operand) => {
                        plan.values.insert(value.clone(), AttributeValue::S(operand));
                        format!("{}({}, {})", function, name, value)
                    }
                    LikeMatch::Exact(operand) => {
                        plan.values.insert(value.clone(), AttributeValue::S(operand));
                        format!("{} = {}", name, value)
                    }
                }
            }
            operator => {
                plan.values.insert(value.clone(), to_attribute_value(condition.value()?)?);
                format!("{} {} {}", name, comparison(operator).unwrap_or("="), value)
            }
        };
        filters.push(expression);
    }
    if !filters.is_empty() {
        plan.filter = Some(filters.join(" AND "));
    }

    Ok(plan)
}

pub(crate) enum LikeMatch {
    /// Pattern of only wildcards: any present value matches.
    Any,
    Function(&'static str, String),
    Exact(String),
}

pub(crate) fn like_function(pattern: &str) -> Result<LikeMatch> {
    if !pattern.is_empty() && pattern.chars().all(|c| c == '%') {
        return Ok(LikeMatch::Any);
    }
    let leading = pattern.starts_with('%');
    let trailing = pattern.ends_with('%');
    match (leading, trailing) {
        (true, true) => Ok(LikeMatch::Function(
            "contains",
            pattern[1..pattern.len() - 1].to_string(),
        )),
        (false, true) => Ok(LikeMatch::Function(
            "begins_with",
            pattern[..pattern.len() - 1].to_string(),
        )),
        (true, false) => Err(Error::Unsupported(format!(
            "LIKE '{}': suffix matches are not supported by DynamoDB, use '%{}%'",
            pattern,
            &pattern[1..]
        ))),
        (false, false) => Ok(LikeMatch::Exact(pattern.to_string())),
    }
}

/// Encode a `LastEvaluatedKey` as an opaque page token.
pub fn encode_next_token(key: Item) -> Result<String> {
    let record: Record = from_item(key)?;
    Ok(URL_SAFE_NO_PAD.encode(serde_json::to_vec(&record)?))
}

/// Decode a page token. Tokens that do not decode are ignored.
pub fn decode_next_token(token: &str) -> Option<Item> {
    let bytes = URL_SAFE_NO_PAD.decode(token.trim_end_matches('=')).ok()?;
    let record: Record = serde_json::from_slice(&bytes).ok()?;
    to_item(record).ok()
}

/// DynamoDB wrapper.
pub struct DynamoDbBackend {
    client: Client,
    indexes: RwLock<HashMap<String, Arc<TableIndexes>>>,
}

impl DynamoDbBackend {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            indexes: RwLock::new(HashMap::new()),
        }
    }

    /// Key schema for a table, described once per backend instance.
    pub async fn table_indexes(&self, table_name: &str) -> Result<Arc<TableIndexes>> {
        if let Some(indexes) = self.indexes.read().await.get(table_name) {
            return Ok(Arc::clone(indexes));
        }

        let output = self
            .client
            .describe_table()
            .table_name(table_name)
            .send()
            .await
            .map_err(|e| Error::Aws(format!("Failed to describe table {}: {}", table_name, e)))?;
        let table = output
            .table
            .ok_or_else(|| Error::Aws(format!("No description returned for {}", table_name)))?;

        let secondary = table
            .global_secondary_indexes()
            .iter()
            .map(|index| (index.index_name().map(str::to_string), index.key_schema().to_vec()))
            .chain(
                table
                    .local_secondary_indexes()
                    .iter()
                    .map(|index| (index.index_name().map(str::to_string), index.key_schema().to_vec())),
            );
        let indexes = Arc::new(TableIndexes::from_schema(table.key_schema(), secondary)?);
        debug!(table = %table_name, hashes = indexes.hashes.len(), "Described table");

        self.indexes
            .write()
            .await
            .insert(table_name.to_string(), Arc::clone(&indexes));
        Ok(indexes)
    }

    fn key(id: &Value, model: &Model) -> Result<Item> {
        Ok(HashMap::from([(model.id_column.clone(), to_attribute_value(id)?)]))
    }

    async fn run_query(
        &self,
        plan: &QueryPlan,
        model: &Model,
        limit: Option<i32>,
        start: Option<Item>,
        select: Option<Select>,
    ) -> Result<(Vec<Item>, i32, Option<Item>)> {
        match &plan.key_condition {
            Some(key_condition) => {
                let output = self
                    .client
                    .query()
                    .table_name(&model.table_name)
                    .set_index_name(plan.index_name.clone())
                    .key_condition_expression(key_condition)
                    .set_filter_expression(plan.filter.clone())
                    .set_expression_attribute_names(plan.names())
                    .set_expression_attribute_values(plan.values())
                    .scan_index_forward(plan.scan_forward)
                    .set_limit(limit)
                    .set_exclusive_start_key(start)
                    .set_select(select)
                    .send()
                    .await
                    .map_err(|e| Error::Aws(format!("Failed to query {}: {}", model.table_name, e)))?;
                Ok((output.items.unwrap_or_default(), output.count, output.last_evaluated_key))
            }
            None => {
                let output = self
                    .client
                    .scan()
                    .table_name(&model.table_name)
                    .set_filter_expression(plan.filter.clone())
                    .set_expression_attribute_names(plan.names())
                    .set_expression_attribute_values(plan.values())
                    .set_limit(limit)
                    .set_exclusive_start_key(start)
                    .set_select(select)
                    .send()
                    .await
                    .map_err(|e| Error::Aws(format!("Failed to scan {}: {}", model.table_name, e)))?;
                Ok((output.items.unwrap_or_default(), output.count, output.last_evaluated_key))
            }
        }
    }
}

#[async_trait]
impl Backend for DynamoDbBackend {
    async fn create(&self, data: Record, model: &Model) -> Result<Record> {
        let item: Item = to_item(&data)?;
        self.client
            .put_item()
            .table_name(&model.table_name)
            .set_item(Some(item))
            .send()
            .await
            .map_err(|e| Error::Aws(format!("Failed to put item in {}: {}", model.table_name, e)))?;
        Ok(data)
    }

    async fn read(&self, id: &Value, model: &Model) -> Result<Option<Record>> {
        let output = self
            .client
            .get_item()
            .table_name(&model.table_name)
            .set_key(Some(Self::key(id, model)?))
            .send()
            .await
            .map_err(|e| Error::Aws(format!("Failed to get item from {}: {}", model.table_name, e)))?;
        Ok(output.item.map(from_item).transpose()?)
    }

    async fn update(&self, id: &Value, data: Record, model: &Model) -> Result<Record> {
        let indexes = self.table_indexes(&model.table_name).await?;
        let mut key = Self::key(id, model)?;
        if let Some(sort_column) = indexes.primary_sort_column() {
            let sort_value = data.get(sort_column).ok_or_else(|| {
                Error::MissingField(format!("{} (sort key of {})", sort_column, model.table_name))
            })?;
            key.insert(sort_column.to_string(), to_attribute_value(sort_value)?);
        }

        let mut names = HashMap::new();
        let mut values = HashMap::new();
        let mut assignments = Vec::new();
        for (i, (column, value)) in data.iter().filter(|(c, _)| !key.contains_key(*c)).enumerate() {
            names.insert(format!("#u{}", i), column.clone());
            values.insert(format!(":u{}", i), to_attribute_value(value)?);
            assignments.push(format!("#u{} = :u{}", i, i));
        }
        if assignments.is_empty() {
            return Err(Error::Validation(format!(
                "Nothing to update on {}",
                model.table_name
            )));
        }

        let output = self
            .client
            .update_item()
            .table_name(&model.table_name)
            .set_key(Some(key))
            .update_expression(format!("SET {}", assignments.join(", ")))
            .set_expression_attribute_names(Some(names))
            .set_expression_attribute_values(Some(values))
            .return_values(ReturnValue::AllNew)
            .send()
            .await
            .map_err(|e| Error::Aws(format!("Failed to update item in {}: {}", model.table_name, e)))?;
        Ok(from_item(output.attributes.unwrap_or_default())?)
    }

    async fn delete(&self, id: &Value, model: &Model) -> Result<()> {
        self.client
            .delete_item()
            .table_name(&model.table_name)
            .set_key(Some(Self::key(id, model)?))
            .send()
            .await
            .map_err(|e| Error::Aws(format!("Failed to delete item from {}: {}", model.table_name, e)))?;
        Ok(())
    }

    async fn query(&self, query: &Query, model: &Model) -> Result<Page> {
        let indexes = self.table_indexes(&model.table_name).await?;
        let plan = plan_query(query, model, &indexes)?;
        let start = query.next_token.as_deref().and_then(|token| {
            let key = decode_next_token(token);
            if key.is_none() {
                warn!(table = %model.table_name, "Ignoring undecodable next_token");
            }
            key
        });

        let (items, _, last_key) = self.run_query(&plan, model, query.limit, start, None).await?;
        let records = items
            .into_iter()
            .map(from_item)
            .collect::<std::result::Result<Vec<Record>, _>>()?;
        let next_token = last_key.map(encode_next_token).transpose()?;
        Ok(Page { records, next_token })
    }

    async fn count(&self, query: &Query, model: &Model) -> Result<usize> {
        let indexes = self.table_indexes(&model.table_name).await?;
        let plan = plan_query(query, model, &indexes)?;

        let mut total = 0usize;
        let mut start = None;
        loop {
            let (_, count, last_key) = self
                .run_query(&plan, model, None, start, Some(Select::Count))
                .await?;
            total += usize::try_from(count).unwrap_or_default();
            match last_key {
                Some(key) => start = Some(key),
                None => return Ok(total),
            }
        }
    }
}
