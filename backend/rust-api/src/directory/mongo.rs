use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mongodb::bson::{doc, DateTime as BsonDateTime};
use mongodb::{Collection, Database};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{QuestionBank, QuestionInfo, SessionDirectory, UserAccount, UserDirectory};
use crate::error::StoreError;
use crate::models::{AnswerKey, Session, SessionStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionDocument {
    #[serde(rename = "_id")]
    id: String,
    access_code: String,
    status: SessionStatus,
    #[serde(default)]
    is_deferred: bool,
    deferred_available_from: Option<BsonDateTime>,
    deferred_available_to: Option<BsonDateTime>,
    #[serde(default)]
    current_question_index: u32,
    #[serde(default)]
    question_count: u32,
}

impl From<SessionDocument> for Session {
    fn from(doc: SessionDocument) -> Self {
        Session {
            id: doc.id,
            access_code: doc.access_code,
            status: doc.status,
            is_deferred: doc.is_deferred,
            deferred_available_from: doc.deferred_available_from.and_then(bson_to_chrono),
            deferred_available_to: doc.deferred_available_to.and_then(bson_to_chrono),
            current_question_index: doc.current_question_index,
            question_count: doc.question_count,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuestionDocument {
    #[serde(rename = "_id")]
    id: String,
    answer_key: AnswerKey,
    duration_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UserDocument {
    #[serde(rename = "_id")]
    id: String,
    username: String,
}

fn bson_to_chrono(dt: BsonDateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(dt.timestamp_millis())
}

fn mongo_error(context: &str, err: mongodb::error::Error) -> StoreError {
    StoreError::Backend(format!("{}: {}", context, err))
}

/// Directory backed by the MongoDB collections of the persistence layer.
#[derive(Clone)]
pub struct MongoDirectory {
    mongo: Database,
    op_timeout: Duration,
}

impl MongoDirectory {
    pub fn new(mongo: Database, op_timeout: Duration) -> Self {
        Self { mongo, op_timeout }
    }

    fn sessions(&self) -> Collection<SessionDocument> {
        self.mongo.collection("game_sessions")
    }

    async fn find_session(
        &self,
        filter: mongodb::bson::Document,
    ) -> Result<Option<Session>, StoreError> {
        let found = tokio::time::timeout(self.op_timeout, self.sessions().find_one(filter))
            .await
            .map_err(|_| StoreError::Timeout {
                operation: "find_session",
            })?
            .map_err(|e| mongo_error("Failed to query game_sessions", e))?;
        Ok(found.map(Session::from))
    }
}

#[async_trait]
impl SessionDirectory for MongoDirectory {
    async fn session_by_code(&self, access_code: &str) -> Result<Option<Session>, StoreError> {
        self.find_session(doc! { "accessCode": access_code }).await
    }

    async fn session_by_id(&self, session_id: &str) -> Result<Option<Session>, StoreError> {
        self.find_session(doc! { "_id": session_id }).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        tokio::time::timeout(self.op_timeout, self.mongo.run_command(doc! { "ping": 1 }))
            .await
            .map_err(|_| StoreError::Timeout { operation: "ping" })?
            .map_err(|e| mongo_error("MongoDB ping failed", e))?;
        Ok(())
    }
}

#[async_trait]
impl QuestionBank for MongoDirectory {
    async fn question(&self, question_id: &str) -> Result<Option<QuestionInfo>, StoreError> {
        let collection: Collection<QuestionDocument> = self.mongo.collection("questions");
        let found = tokio::time::timeout(
            self.op_timeout,
            collection.find_one(doc! { "_id": question_id }),
        )
        .await
        .map_err(|_| StoreError::Timeout {
            operation: "find_question",
        })?
        .map_err(|e| mongo_error("Failed to query questions", e))?;

        Ok(found.map(|q| QuestionInfo {
            id: q.id,
            answer_key: q.answer_key,
            duration_ms: q.duration_ms.max(0) as u64,
        }))
    }
}

#[async_trait]
impl UserDirectory for MongoDirectory {
    async fn find_user(&self, user_id: &str) -> Result<Option<UserAccount>, StoreError> {
        let collection: Collection<UserDocument> = self.mongo.collection("users");
        let found = tokio::time::timeout(self.op_timeout, collection.find_one(doc! { "_id": user_id }))
            .await
            .map_err(|_| StoreError::Timeout {
                operation: "find_user",
            })?
            .map_err(|e| mongo_error("Failed to query users", e))?;

        Ok(found.map(|u| UserAccount {
            id: u.id,
            username: u.username,
        }))
    }
}
