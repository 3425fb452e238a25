//! SQLite-backed case manager.
//!
//! Stands in for the external case-management service when the copilot runs
//! self-contained: cases land in the local `cases` table.

use async_trait::async_trait;
use tracing::debug;

use super::database::SharedDatabase;
use crate::copilot::ambiguity::ActiveCase;
use crate::copilot::bridge::{CaseManager, NewCaseRequest};
use crate::types::{FairError, Result};

pub struct LocalCaseStore {
    db: SharedDatabase,
}

impl LocalCaseStore {
    pub fn new(db: SharedDatabase) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CaseManager for LocalCaseStore {
    async fn create_case(&self, request: &NewCaseRequest, auth_token: &str) -> Result<String> {
        if auth_token.is_empty() {
            return Err(FairError::Unauthorized("missing credential for case creation".into()));
        }
        let record = self.db.insert_case(request)?;
        debug!(case_id = %record.id, user_id = %record.user_id, "Stored case");
        Ok(record.id)
    }

    async fn active_cases(&self, user_id: &str) -> Result<Vec<ActiveCase>> {
        self.db.list_active_cases(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::copilot::collected::CaseType;
    use crate::storage::Database;
    use std::sync::Arc;

    fn request(user_id: &str) -> NewCaseRequest {
        NewCaseRequest {
            user_id: user_id.into(),
            title: "Small Claims - Lake County".into(),
            case_type: CaseType::SmallClaims,
            jurisdiction: "Lake County".into(),
            case_number: None,
            hearing_date: Some("2025-12-01".into()),
            opposing_party: Some("Acme Repairs".into()),
            amount_in_dispute: Some("$1,200.00".into()),
            description: "They never fixed the car".into(),
        }
    }

    #[tokio::test]
    async fn test_create_and_list() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let store = LocalCaseStore::new(db.clone());

        let id = store.create_case(&request("u1"), "token").await.unwrap();
        let stored = db.get_case(&id).unwrap().unwrap();
        assert_eq!(stored.case_type, "small_claims");
        assert_eq!(stored.amount_in_dispute.as_deref(), Some("$1,200.00"));

        let active = store.active_cases("u1").await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, id);
        assert!(store.active_cases("u2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_token_rejected() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let store = LocalCaseStore::new(db);
        let err = store.create_case(&request("u1"), "").await.unwrap_err();
        assert_eq!(err.code(), "UNAUTHORIZED");
    }
}
