//! Records Lambda - CRUD over a DynamoDB table behind an HTTP trigger.
//!
//! The trigger (ALB, REST API or HTTP API) is chosen with `LAMBDA_TRIGGER`.
//!
//! Endpoints:
//! - GET /records - List records (filters: any attribute, plus `limit`, `next_token`, `sort`)
//! - POST /records - Create a record
//! - GET /records/{id} - Get a record
//! - PATCH /records/{id} - Update a record
//! - DELETE /records/{id} - Delete a record

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use bridge::backends::DynamoDbBackend;
use bridge::{
    Application, Backend, Condition, Config, Context, Environment, InputOutput, Model,
    ParameterStore, Query, Record, Reply, SortDirection,
};
use chrono::Utc;
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Query parameters that are not attribute filters.
const RESERVED_PARAMS: [&str; 3] = ["limit", "next_token", "sort"];

/// API response wrapper
#[derive(Debug, Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// List response
#[derive(Debug, Serialize)]
struct RecordList {
    records: Vec<Record>,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_token: Option<String>,
}

struct RecordsApi<B> {
    backend: B,
    model: Model,
}

impl<B: Backend> RecordsApi<B> {
    fn new(backend: B, model: Model) -> Self {
        Self { backend, model }
    }

    async fn route(&self, io: &mut dyn InputOutput) -> bridge::Result<Reply> {
        let method = io.request_method().to_string();
        let raw_path = io.path_info();
        // REST APIs include the stage in the path
        let path = raw_path.strip_prefix("/api").unwrap_or(raw_path);
        let segments: Vec<String> = path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        info!("Received request: method={}, path={}", method, path);

        match (method.as_str(), segments.as_slice()) {
            ("GET", [root]) if root == "records" => self.list(io).await,
            ("POST", [root]) if root == "records" => self.create(io).await,
            ("GET", [root, id]) if root == "records" => self.get(id).await,
            ("PATCH", [root, id]) if root == "records" => self.update(io, id).await,
            ("DELETE", [root, id]) if root == "records" => self.delete(id).await,
            _ => Err(bridge::Error::NotFound(format!("{} {}", method, path))),
        }
    }

    async fn list(&self, io: &dyn InputOutput) -> bridge::Result<Reply> {
        let mut query = Query::new();
        for (key, values) in io.query_parameters().iter() {
            if RESERVED_PARAMS.contains(&key) {
                continue;
            }
            if let Some(value) = values.first() {
                query = query.filter(Condition::eq(key, value.as_str()));
            }
        }
        if let Some(limit) = io.query_parameter("limit").first() {
            let limit = limit
                .parse()
                .map_err(|_| bridge::Error::Validation(format!("Invalid limit '{}'", limit)))?;
            query = query.limit(limit);
        }
        if let Some(token) = io.query_parameter("next_token").first() {
            query = query.after(token.as_str());
        }
        if let Some(sort) = io.query_parameter("sort").first() {
            query = match sort.strip_prefix('-') {
                Some(column) => query.sort(column, SortDirection::Desc),
                None => query.sort(sort.as_str(), SortDirection::Asc),
            };
        }

        let page = self.backend.query(&query, &self.model).await?;
        success(
            200,
            RecordList {
                records: page.records,
                next_token: page.next_token,
            },
        )
    }

    async fn create(&self, io: &dyn InputOutput) -> bridge::Result<Reply> {
        let mut record = json_object(io)?;
        let id_column = &self.model.id_column;
        if !record.contains_key(id_column) {
            record.insert(id_column.clone(), Value::String(Uuid::new_v4().to_string()));
        }
        let now = Utc::now().to_rfc3339();
        record.insert("created_at".to_string(), Value::String(now.clone()));
        record.insert("updated_at".to_string(), Value::String(now));

        let record = self.backend.create(record, &self.model).await?;
        success(201, record)
    }

    async fn get(&self, id: &str) -> bridge::Result<Reply> {
        match self.backend.read(&Value::from(id), &self.model).await? {
            Some(record) => success(200, record),
            None => Err(bridge::Error::NotFound(format!("Record {}", id))),
        }
    }

    async fn update(&self, io: &dyn InputOutput, id: &str) -> bridge::Result<Reply> {
        let mut changes = json_object(io)?;
        changes.remove(&self.model.id_column);
        changes.insert("updated_at".to_string(), Value::String(Utc::now().to_rfc3339()));

        if self.backend.read(&Value::from(id), &self.model).await?.is_none() {
            return Err(bridge::Error::NotFound(format!("Record {}", id)));
        }
        let record = self.backend.update(&Value::from(id), changes, &self.model).await?;
        success(200, record)
    }

    async fn delete(&self, id: &str) -> bridge::Result<Reply> {
        self.backend.delete(&Value::from(id), &self.model).await?;
        Ok(Reply::new("").with_status(204))
    }
}

#[async_trait]
impl<B: Backend> Application for RecordsApi<B> {
    async fn handle(&self, io: &mut dyn InputOutput) -> anyhow::Result<Reply> {
        match self.route(io).await {
            Ok(reply) => Ok(reply),
            Err(e) => {
                let status = e.status_code();
                if status >= 500 {
                    // Let the platform see server-side failures
                    return Err(e.into());
                }
                warn!(status, "Request failed: {}", e);
                Ok(Reply::json(&ApiResponse::<()> {
                    success: false,
                    data: None,
                    error: Some(e.to_string()),
                })?
                .with_status(status))
            }
        }
    }
}

fn json_object(io: &dyn InputOutput) -> bridge::Result<Record> {
    match io.json_body()? {
        Some(Value::Object(record)) => Ok(record),
        Some(_) => Err(bridge::Error::Validation("Body must be a JSON object".to_string())),
        None => Err(bridge::Error::MissingField("request body".to_string())),
    }
}

fn success<T: Serialize>(status: u16, data: T) -> bridge::Result<Reply> {
    Ok(Reply::json(&ApiResponse {
        success: true,
        data: Some(data),
        error: None,
    })?
    .with_status(status))
}

/// Application state
struct AppState {
    context: Context<RecordsApi<DynamoDbBackend>>,
}

impl AppState {
    async fn new() -> Result<Self, Error> {
        let sdk_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
        let secrets = ParameterStore::new(aws_sdk_ssm::Client::new(&sdk_config));
        let env = Environment::from_process().with_secrets(Arc::new(secrets));
        let config = Config::load(&env).await?;

        let table_name = env.get("RECORDS_TABLE").await?;
        let id_column = env
            .get_optional("RECORDS_ID_COLUMN")
            .await?
            .unwrap_or_else(|| "id".to_string());

        let backend = DynamoDbBackend::new(aws_sdk_dynamodb::Client::new(&sdk_config));
        let api = RecordsApi::new(backend, Model::new(table_name, id_column));
        info!(trigger = %config.trigger, "Records API configured");

        Ok(Self {
            context: Context::new(config.trigger, api),
        })
    }
}

async fn handler(state: Arc<AppState>, event: LambdaEvent<Value>) -> Result<Value, Error> {
    Ok(state.context.handle(event).await?)
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let state = Arc::new(AppState::new().await?);

    run(service_fn(move |event| {
        let state = Arc::clone(&state);
        async move { handler(state, event).await }
    }))
    .await
}
