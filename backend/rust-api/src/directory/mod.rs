//! Read-only collaborators owned by the session/question/user persistence
//! layer. The core only consumes them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::models::{AnswerKey, Session};

pub mod memory;
pub mod mongo;

pub use memory::InMemoryDirectory;
pub use mongo::MongoDirectory;

/// What the core needs to know about a question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionInfo {
    pub id: String,
    pub answer_key: AnswerKey,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: String,
    pub username: String,
}

#[async_trait]
pub trait SessionDirectory: Send + Sync {
    async fn session_by_code(&self, access_code: &str) -> Result<Option<Session>, StoreError>;

    async fn session_by_id(&self, session_id: &str) -> Result<Option<Session>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
pub trait QuestionBank: Send + Sync {
    async fn question(&self, question_id: &str) -> Result<Option<QuestionInfo>, StoreError>;

    async fn canonical_answer(&self, question_id: &str) -> Result<Option<AnswerKey>, StoreError> {
        Ok(self.question(question_id).await?.map(|q| q.answer_key))
    }
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user(&self, user_id: &str) -> Result<Option<UserAccount>, StoreError>;
}
