// promql-service-rs/src/conversation_store.rs
//
// Conversation persistence backed by MongoDB.
//
// The connection is established once at process start with a mandatory ping;
// an unreachable store fails startup. The mongodb client pools connections
// internally and is safe for concurrent use, so a single store handle is
// shared across all in-flight pipelines.

use async_trait::async_trait;
use chrono::Utc;
use mongodb::bson::doc;
use mongodb::{Client, Collection};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

pub const CONVERSATIONS_COLLECTION: &str = "conversations";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to connect to MongoDB: {0}")]
    Connection(String),

    #[error("MongoDB write failed: {0}")]
    Write(String),

    #[error("MongoDB read failed: {0}")]
    Read(String),
}

/// One end-to-end pipeline attempt, successful or not. Field names match the
/// persisted document shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRecord {
    pub conversation_id: String,
    pub natural_language_query: String,
    pub generated_payload: Value,
    pub chart_config: Value,
    pub prometheus_data: Value,
    /// Record-creation time, RFC 3339.
    pub timestamp: String,
    /// Outcome status: 200 full success, 400 bad generator output,
    /// 502 connector failure, 500 unexpected failure.
    pub success: i32,
}

impl ConversationRecord {
    /// A fresh record for one pipeline invocation. Payload fields start as
    /// empty objects; the outcome defaults to an internal error until the
    /// pipeline reaches a terminal state.
    pub fn new(conversation_id: String, natural_language_query: String) -> Self {
        Self {
            conversation_id,
            natural_language_query,
            generated_payload: Value::Object(Map::new()),
            chart_config: Value::Object(Map::new()),
            prometheus_data: Value::Object(Map::new()),
            timestamp: Utc::now().to_rfc3339(),
            success: 500,
        }
    }
}

/// Durable key-value store over conversation identifiers.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// New globally-unique conversation identifier. Pure generator, no side
    /// effect.
    fn generate_conversation_id(&self) -> String;

    /// Persist one record. Write failures come back as errors for the
    /// caller to log; they are never fatal to the pipeline outcome.
    async fn store_conversation(&self, record: &ConversationRecord) -> Result<(), StoreError>;

    /// The record for an identifier, or None. Storage-internal identity
    /// fields never leak out of this call.
    async fn get_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Option<ConversationRecord>, StoreError>;

    /// Liveness of the backing store. Defaults to healthy for stores
    /// without a meaningful probe.
    async fn healthy(&self) -> bool {
        true
    }
}

pub struct MongoConversationStore {
    client: Client,
    database_name: String,
    collection: Collection<ConversationRecord>,
}

impl MongoConversationStore {
    /// Connect and ping. The ping is not optional: a service that cannot
    /// reach its store must not come up.
    pub async fn connect(uri: &str, database_name: &str) -> Result<Self, StoreError> {
        let client = Client::with_uri_str(uri)
            .await
            .map_err(|err| StoreError::Connection(err.to_string()))?;

        let database = client.database(database_name);
        database
            .run_command(doc! {"ping": 1})
            .await
            .map_err(|err| StoreError::Connection(err.to_string()))?;

        log::info!("connected to MongoDB database: {}", database_name);

        let collection = database.collection(CONVERSATIONS_COLLECTION);
        Ok(Self {
            client,
            database_name: database_name.to_string(),
            collection,
        })
    }
}

#[async_trait]
impl ConversationStore for MongoConversationStore {
    fn generate_conversation_id(&self) -> String {
        Uuid::new_v4().to_string()
    }

    async fn store_conversation(&self, record: &ConversationRecord) -> Result<(), StoreError> {
        self.collection
            .insert_one(record)
            .await
            .map(|_| ())
            .map_err(|err| StoreError::Write(err.to_string()))
    }

    async fn get_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Option<ConversationRecord>, StoreError> {
        self.collection
            .find_one(doc! {"conversationId": conversation_id})
            // Exclude Mongo's internal _id; only domain fields leave the store.
            .projection(doc! {"_id": 0})
            .await
            .map_err(|err| StoreError::Read(err.to_string()))
    }

    async fn healthy(&self) -> bool {
        self.client
            .database(&self.database_name)
            .run_command(doc! {"ping": 1})
            .await
            .is_ok()
    }
}
