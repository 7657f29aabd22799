use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use super::{QuestionBank, QuestionInfo, SessionDirectory, UserAccount, UserDirectory};
use crate::error::StoreError;
use crate::models::{Session, SessionStatus};

/// Directory held in process memory, used for tests and local runs.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    sessions: RwLock<HashMap<String, Session>>,
    questions: RwLock<HashMap<String, QuestionInfo>>,
    users: RwLock<HashMap<String, UserAccount>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_session(&self, session: Session) {
        self.sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(session.id.clone(), session);
    }

    pub fn set_session_status(&self, session_id: &str, status: SessionStatus) {
        if let Some(session) = self
            .sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .get_mut(session_id)
        {
            session.status = status;
        }
    }

    pub fn insert_question(&self, question: QuestionInfo) {
        self.questions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(question.id.clone(), question);
    }

    pub fn insert_user(&self, user: UserAccount) {
        self.users
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(user.id.clone(), user);
    }
}

#[async_trait]
impl SessionDirectory for InMemoryDirectory {
    async fn session_by_code(&self, access_code: &str) -> Result<Option<Session>, StoreError> {
        Ok(self
            .sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .find(|s| s.access_code == access_code)
            .cloned())
    }

    async fn session_by_id(&self, session_id: &str) -> Result<Option<Session>, StoreError> {
        Ok(self
            .sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(session_id)
            .cloned())
    }
}

#[async_trait]
impl QuestionBank for InMemoryDirectory {
    async fn question(&self, question_id: &str) -> Result<Option<QuestionInfo>, StoreError> {
        Ok(self
            .questions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(question_id)
            .cloned())
    }
}

#[async_trait]
impl UserDirectory for InMemoryDirectory {
    async fn find_user(&self, user_id: &str) -> Result<Option<UserAccount>, StoreError> {
        Ok(self
            .users
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(user_id)
            .cloned())
    }
}
