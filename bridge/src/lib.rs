//! AWS Lambda integration layer.
//!
//! Adapts Lambda trigger events (ALB, API Gateway REST and HTTP APIs, direct
//! invocation, SQS and SNS) to a uniform request/response interface, and
//! provides DynamoDB/SQS storage backends, secret store lookups and IAM
//! database authentication.

pub mod backends;
pub mod batch;
pub mod config;
pub mod context;
pub mod db;
pub mod environment;
pub mod error;
pub mod iam_db_auth;
pub mod io;
pub mod secrets;

pub use backends::{Backend, Condition, Model, Operator, Page, Query, Record, Sort, SortDirection};
pub use batch::{BatchItemFailure, BatchResponse};
pub use config::Config;
pub use context::{Application, Context, EventAdapter, Route, TriggerKind};
pub use environment::Environment;
pub use error::{Error, Result};
pub use iam_db_auth::{ConnectionDetails, IamDbAuth};
pub use io::{Headers, InputOutput, QueryParameters, Reply, ResponseBody};
pub use secrets::{ParameterStore, SecretStore, SecretsManager};
