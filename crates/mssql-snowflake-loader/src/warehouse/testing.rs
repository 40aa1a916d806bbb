//! In-memory warehouse for tests.

use super::{QueryResult, Warehouse};
use crate::error::{LoadError, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Records every statement and answers queries by statement prefix.
#[derive(Default)]
pub(crate) struct FakeWarehouse {
    statements: Mutex<Vec<String>>,
    responses: Mutex<Vec<(String, QueryResult)>>,
    failures: Mutex<VecDeque<(String, LoadError)>>,
}

impl FakeWarehouse {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn respond(&self, prefix: &str, result: QueryResult) {
        self.responses
            .lock()
            .unwrap()
            .push((prefix.to_string(), result));
    }

    /// Fail the next statement starting with `prefix` once.
    pub(crate) fn fail_once(&self, prefix: &str, error: LoadError) {
        self.failures
            .lock()
            .unwrap()
            .push_back((prefix.to_string(), error));
    }

    pub(crate) fn statements(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }

    fn record(&self, sql: &str) -> Result<()> {
        self.statements.lock().unwrap().push(sql.to_string());
        let mut failures = self.failures.lock().unwrap();
        if let Some(pos) = failures.iter().position(|(p, _)| sql.starts_with(p.as_str())) {
            if let Some((_, err)) = failures.remove(pos) {
                return Err(err);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Warehouse for FakeWarehouse {
    async fn execute(&self, sql: &str) -> Result<()> {
        self.record(sql)
    }

    async fn query(&self, sql: &str) -> Result<QueryResult> {
        self.record(sql)?;
        let responses = self.responses.lock().unwrap();
        Ok(responses
            .iter()
            .find(|(prefix, _)| sql.starts_with(prefix.as_str()))
            .map(|(_, r)| r.clone())
            .unwrap_or_default())
    }
}
