//! DynamoDB backend speaking PartiQL through `ExecuteStatement`.
//!
//! Reads and writes are single statements with `?` parameters. Counting has
//! no PartiQL form, so it goes through the native [`DynamoDbBackend`].

use async_trait::async_trait;
use aws_sdk_dynamodb::operation::execute_statement::ExecuteStatementOutput;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde_dynamo::{from_item, to_attribute_value};
use serde_json::Value;
use tracing::{debug, warn};

use super::dynamodb::{like_function, plan_query, LikeMatch, TableIndexes};
use super::{Backend, DynamoDbBackend, Model, Operator, Page, Query, Record, SortDirection};
use crate::{Error, Result};

/// A PartiQL statement and its positional parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Statement {
    pub text: String,
    pub parameters: Vec<AttributeValue>,
}

impl Statement {
    fn bind(&mut self, value: &Value) -> Result<()> {
        self.parameters.push(to_attribute_value(value)?);
        Ok(())
    }
}

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

fn target(model: &Model, index_name: Option<&str>) -> String {
    match index_name {
        Some(index) => format!("{}.{}", quote(&model.table_name), quote(index)),
        None => quote(&model.table_name),
    }
}

/// `SELECT` for a query, reading from the index the native planner would pick.
pub fn select_statement(query: &Query, model: &Model, indexes: &TableIndexes) -> Result<Statement> {
    let plan = plan_query(query, model, indexes)?;
    if !query.sorts.is_empty() && plan.key_condition.is_none() {
        return Err(Error::Validation(format!(
            "Sorting {} needs an equality condition on a partition key",
            model.table_name
        )));
    }

    let mut statement = Statement::default();
    let mut wheres = Vec::new();
    for condition in &query.conditions {
        let column = quote(&condition.column);
        let clause = match condition.operator {
            Operator::IsNull => format!("{} IS MISSING", column),
            Operator::IsNotNull => format!("{} IS NOT MISSING", column),
            Operator::Like => {
                let pattern = condition.value()?.as_str().ok_or_else(|| {
                    Error::Validation(format!("LIKE on '{}' needs a string", condition.column))
                })?;
                match like_function(pattern)? {
                    LikeMatch::Any => format!("{} IS NOT MISSING", column),
                    LikeMatch::Function(function, operand) => {
                        statement.parameters.push(AttributeValue::S(operand));
                        format!("{}({}, ?)", function, column)
                    }
                    LikeMatch::Exact(operand) => {
                        statement.parameters.push(AttributeValue::S(operand));
                        format!("{} = ?", column)
                    }
                }
            }
            operator => {
                statement.bind(condition.value()?)?;
                let symbol = match operator {
                    Operator::NotEq => "<>",
                    Operator::Lt => "<",
                    Operator::Lte => "<=",
                    Operator::Gt => ">",
                    Operator::Gte => ">=",
                    _ => "=",
                };
                format!("{} {} ?", column, symbol)
            }
        };
        wheres.push(clause);
    }

    let mut text = format!("SELECT * FROM {}", target(model, plan.index_name.as_deref()));
    if !wheres.is_empty() {
        text.push_str(" WHERE ");
        text.push_str(&wheres.join(" AND "));
    }
    if !query.sorts.is_empty() {
        let sorts: Vec<String> = query
            .sorts
            .iter()
            .map(|sort| {
                let direction = match sort.direction {
                    SortDirection::Asc => "ASC",
                    SortDirection::Desc => "DESC",
                };
                format!("{} {}", quote(&sort.column), direction)
            })
            .collect();
        text.push_str(" ORDER BY ");
        text.push_str(&sorts.join(", "));
    }
    statement.text = text;
    Ok(statement)
}

pub fn insert_statement(data: &Record, model: &Model) -> Result<Statement> {
    let mut statement = Statement::default();
    let mut fields = Vec::with_capacity(data.len());
    for (column, value) in data {
        fields.push(format!("'{}': ?", column.replace('\'', "''")));
        statement.bind(value)?;
    }
    statement.text = format!(
        "INSERT INTO {} VALUE {{{}}}",
        quote(&model.table_name),
        fields.join(", ")
    );
    Ok(statement)
}

/// `UPDATE ... RETURNING ALL NEW *`. Key columns are matched, never set.
pub fn update_statement(
    id: &Value,
    data: &Record,
    model: &Model,
    sort_column: Option<&str>,
) -> Result<Statement> {
    let mut statement = Statement::default();
    let mut sets = Vec::new();
    for (column, value) in data
        .iter()
        .filter(|(c, _)| **c != model.id_column && Some(c.as_str()) != sort_column)
    {
        sets.push(format!("SET {} = ?", quote(column)));
        statement.bind(value)?;
    }
    if sets.is_empty() {
        return Err(Error::Validation(format!(
            "Nothing to update on {}",
            model.table_name
        )));
    }

    let mut wheres = vec![format!("{} = ?", quote(&model.id_column))];
    statement.bind(id)?;
    if let Some(sort_column) = sort_column {
        let sort_value = data.get(sort_column).ok_or_else(|| {
            Error::MissingField(format!("{} (sort key of {})", sort_column, model.table_name))
        })?;
        wheres.push(format!("{} = ?", quote(sort_column)));
        statement.bind(sort_value)?;
    }

    statement.text = format!(
        "UPDATE {} {} WHERE {} RETURNING ALL NEW *",
        quote(&model.table_name),
        sets.join(" "),
        wheres.join(" AND ")
    );
    Ok(statement)
}

pub fn delete_statement(id: &Value, model: &Model) -> Result<Statement> {
    let mut statement = Statement {
        text: format!(
            "DELETE FROM {} WHERE {} = ?",
            quote(&model.table_name),
            quote(&model.id_column)
        ),
        parameters: Vec::new(),
    };
    statement.bind(id)?;
    Ok(statement)
}

/// Wrap a PartiQL `NextToken` so clients only ever see URL-safe text.
pub fn encode_next_token(token: &str) -> Result<String> {
    Ok(URL_SAFE_NO_PAD.encode(serde_json::to_vec(token)?))
}

pub fn decode_next_token(token: &str) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD.decode(token.trim_end_matches('=')).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// PartiQL wrapper.
pub struct PartiQlBackend {
    client: Client,
    native: DynamoDbBackend,
}

impl PartiQlBackend {
    pub fn new(client: Client) -> Self {
        Self {
            native: DynamoDbBackend::new(client.clone()),
            client,
        }
    }

    async fn execute(
        &self,
        statement: Statement,
        limit: Option<i32>,
        next_token: Option<String>,
    ) -> Result<ExecuteStatementOutput> {
        debug!(statement = %statement.text, "Executing PartiQL");
        let parameters = (!statement.parameters.is_empty()).then_some(statement.parameters);
        self.client
            .execute_statement()
            .statement(&statement.text)
            .set_parameters(parameters)
            .set_limit(limit)
            .set_next_token(next_token)
            .send()
            .await
            .map_err(|e| Error::Aws(format!("Failed to execute '{}': {}", statement.text, e)))
    }
}

#[async_trait]
impl Backend for PartiQlBackend {
    async fn create(&self, data: Record, model: &Model) -> Result<Record> {
        self.execute(insert_statement(&data, model)?, None, None).await?;
        Ok(data)
    }

    async fn read(&self, id: &Value, model: &Model) -> Result<Option<Record>> {
        let statement = Statement {
            text: format!(
                "SELECT * FROM {} WHERE {} = ?",
                quote(&model.table_name),
                quote(&model.id_column)
            ),
            parameters: vec![to_attribute_value(id)?],
        };
        let output = self.execute(statement, None, None).await?;
        Ok(output
            .items
            .and_then(|items| items.into_iter().next())
            .map(from_item)
            .transpose()?)
    }

    async fn update(&self, id: &Value, data: Record, model: &Model) -> Result<Record> {
        let indexes = self.native.table_indexes(&model.table_name).await?;
        let statement = update_statement(id, &data, model, indexes.primary_sort_column())?;
        let output = self.execute(statement, None, None).await?;
        match output.items.and_then(|items| items.into_iter().next()) {
            Some(item) => Ok(from_item(item)?),
            None => {
                warn!(table = %model.table_name, "UPDATE returned no item");
                let mut merged = data;
                merged.insert(model.id_column.clone(), id.clone());
                Ok(merged)
            }
        }
    }

    async fn delete(&self, id: &Value, model: &Model) -> Result<()> {
        self.execute(delete_statement(id, model)?, None, None).await?;
        Ok(())
    }

    async fn query(&self, query: &Query, model: &Model) -> Result<Page> {
        let indexes = self.native.table_indexes(&model.table_name).await?;
        let statement = select_statement(query, model, &indexes)?;
        let start = query.next_token.as_deref().and_then(|token| {
            let decoded = decode_next_token(token);
            if decoded.is_none() {
                warn!(table = %model.table_name, "Ignoring undecodable next_token");
            }
            decoded
        });

        let output = self.execute(statement, query.limit, start).await?;
        let records = output
            .items
            .unwrap_or_default()
            .into_iter()
            .map(from_item)
            .collect::<std::result::Result<Vec<Record>, _>>()?;
        let next_token = output.next_token.as_deref().map(encode_next_token).transpose()?;
        Ok(Page { records, next_token })
    }

    async fn count(&self, query: &Query, model: &Model) -> Result<usize> {
        self.native.count(query, model).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{Condition, Sort};
    use serde_json::json;

    fn model() -> Model {
        Model::new("records", "id")
    }

    fn indexes() -> TableIndexes {
        let mut indexes = TableIndexes::new("id", None);
        indexes.add(Some("by-owner"), "owner", Some("created_at"));
        indexes
    }

    fn record(value: Value) -> Record {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_select_on_index_with_sort() {
        let mut query = Query::new()
            .filter(Condition::eq("owner", "ann"))
            .filter(Condition::new("title", Operator::Like, vec![json!("Intro%")]))
            .filter(Condition::new("deleted_at", Operator::IsNull, vec![]));
        query.sorts.push(Sort {
            column: "created_at".to_string(),
            direction: SortDirection::Desc,
        });
        let statement = select_statement(&query, &model(), &indexes()).unwrap();

        assert_eq!(
            statement.text,
            "SELECT * FROM \"records\".\"by-owner\" WHERE \"owner\" = ? AND \
             begins_with(\"title\", ?) AND \"deleted_at\" IS MISSING ORDER BY \"created_at\" DESC"
        );
        assert_eq!(
            statement.parameters,
            vec![
                AttributeValue::S("ann".to_string()),
                AttributeValue::S("Intro".to_string()),
            ]
        );
    }

    #[test]
    fn test_select_scan_operators() {
        let query = Query::new()
            .filter(Condition::new("rank", Operator::Gte, vec![json!(3)]))
            .filter(Condition::new("title", Operator::Like, vec![json!("%")]))
            .filter(Condition::new("archived", Operator::IsNotNull, vec![]));
        let statement = select_statement(&query, &model(), &indexes()).unwrap();

        assert_eq!(
            statement.text,
            "SELECT * FROM \"records\" WHERE \"rank\" >= ? AND \"title\" IS NOT MISSING \
             AND \"archived\" IS NOT MISSING"
        );
        assert_eq!(statement.parameters, vec![AttributeValue::N("3".to_string())]);
    }

    #[test]
    fn test_sort_needs_partition_key() {
        let mut query = Query::new();
        query.sorts.push(Sort {
            column: "created_at".to_string(),
            direction: SortDirection::Asc,
        });
        assert!(matches!(
            select_statement(&query, &model(), &indexes()),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_write_statements() {
        let data = record(json!({"id": "r-1", "title": "It's"}));
        let insert = insert_statement(&data, &model()).unwrap();
        assert_eq!(insert.text, "INSERT INTO \"records\" VALUE {'id': ?, 'title': ?}");
        assert_eq!(insert.parameters.len(), 2);

        let update = update_statement(&json!("r-1"), &data, &model(), None).unwrap();
        assert_eq!(
            update.text,
            "UPDATE \"records\" SET \"title\" = ? WHERE \"id\" = ? RETURNING ALL NEW *"
        );
        assert_eq!(
            update.parameters,
            vec![
                AttributeValue::S("It's".to_string()),
                AttributeValue::S("r-1".to_string()),
            ]
        );

        let delete = delete_statement(&json!("r-1"), &model()).unwrap();
        assert_eq!(delete.text, "DELETE FROM \"records\" WHERE \"id\" = ?");
    }

    #[test]
    fn test_update_with_sort_key() {
        let data = record(json!({"sk": "2024", "title": "New"}));
        let update = update_statement(&json!("r-1"), &data, &model(), Some("sk")).unwrap();
        assert!(update.text.ends_with("WHERE \"id\" = ? AND \"sk\" = ? RETURNING ALL NEW *"));
        assert_eq!(update.parameters.len(), 3);

        let only_keys = record(json!({"id": "r-1", "sk": "2024"}));
        assert!(matches!(
            update_statement(&json!("r-1"), &only_keys, &model(), Some("sk")),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            update_statement(&json!("r-1"), &record(json!({"title": "x"})), &model(), Some("sk")),
            Err(Error::MissingField(_))
        ));
    }

    #[test]
    fn test_next_token() {
        let token = encode_next_token("opaque/token+with=chars").unwrap();
        assert!(!token.contains('/') && !token.contains('+') && !token.contains('='));
        assert_eq!(decode_next_token(&token).as_deref(), Some("opaque/token+with=chars"));
        assert_eq!(decode_next_token("not a token!"), None);
    }

    mod client {
        use super::*;
        use aws_sdk_dynamodb::operation::describe_table::DescribeTableOutput;
        use aws_sdk_dynamodb::operation::scan::ScanOutput;
        use aws_sdk_dynamodb::types::{KeySchemaElement, KeyType, TableDescription};
        use aws_smithy_mocks::{mock, mock_client, Rule, RuleMode};
        use std::collections::HashMap;

        fn describe() -> Rule {
            mock!(Client::describe_table).then_output(|| {
                let hash = KeySchemaElement::builder()
                    .attribute_name("id")
                    .key_type(KeyType::Hash)
                    .build()
                    .unwrap();
                DescribeTableOutput::builder()
                    .table(TableDescription::builder().key_schema(hash).build())
                    .build()
            })
        }

        fn backend(rules: &[&Rule]) -> PartiQlBackend {
            PartiQlBackend::new(mock_client!(aws_sdk_dynamodb, RuleMode::MatchAny, rules))
        }

        #[tokio::test]
        async fn test_query_pages_through_statement_tokens() {
            let describe = describe();
            let select = mock!(Client::execute_statement)
                .match_requests(|req| {
                    req.statement() == Some("SELECT * FROM \"records\" WHERE \"id\" = ?")
                        && req.limit() == Some(10)
                        && req.next_token() == Some("ddb/page+2")
                })
                .then_output(|| {
                    ExecuteStatementOutput::builder()
                        .items(HashMap::from([("id".to_string(), AttributeValue::S("r-1".to_string()))]))
                        .next_token("ddb/page+3")
                        .build()
                });
            let backend = backend(&[&describe, &select]);

            let mut query = Query::new()
                .filter(Condition::eq("id", "r-1"))
                .after(encode_next_token("ddb/page+2").unwrap());
            query.limit = Some(10);
            let page = backend.query(&query, &model()).await.unwrap();

            assert_eq!(page.records, vec![record(json!({"id": "r-1"}))]);
            assert_eq!(
                page.next_token.as_deref().and_then(decode_next_token).as_deref(),
                Some("ddb/page+3")
            );
        }

        #[tokio::test]
        async fn test_read_missing_record() {
            let select = mock!(Client::execute_statement)
                .match_requests(|req| req.parameters() == [AttributeValue::S("r-404".to_string())])
                .then_output(|| ExecuteStatementOutput::builder().build());
            let backend = backend(&[&select]);

            assert_eq!(backend.read(&json!("r-404"), &model()).await.unwrap(), None);
        }

        #[tokio::test]
        async fn test_update_returns_new_item() {
            let describe = describe();
            let update = mock!(Client::execute_statement)
                .match_requests(|req| {
                    req.statement().is_some_and(|s| s.starts_with("UPDATE \"records\" SET \"title\" = ?"))
                })
                .then_output(|| {
                    ExecuteStatementOutput::builder()
                        .items(HashMap::from([
                            ("id".to_string(), AttributeValue::S("r-1".to_string())),
                            ("title".to_string(), AttributeValue::S("New".to_string())),
                            ("rank".to_string(), AttributeValue::N("3".to_string())),
                        ]))
                        .build()
                });
            let backend = backend(&[&describe, &update]);

            let updated = backend
                .update(&json!("r-1"), record(json!({"title": "New"})), &model())
                .await
                .unwrap();
            assert_eq!(updated, record(json!({"id": "r-1", "title": "New", "rank": 3})));
        }

        #[tokio::test]
        async fn test_count_uses_native_scan() {
            let describe = describe();
            let scan = mock!(Client::scan).then_output(|| ScanOutput::builder().count(4).build());
            let backend = backend(&[&describe, &scan]);

            assert_eq!(backend.count(&Query::new(), &model()).await.unwrap(), 4);
            assert_eq!(scan.num_calls(), 1);
        }
    }
}
