//! Audit history DTOs

use crate::audit::AuditEntry;
use serde::{Deserialize, Serialize};
use validator::Validate;

pub const DEFAULT_HISTORY_LIMIT: usize = 100;

#[derive(Debug, Deserialize, Validate)]
pub struct HistoryQuery {
    #[validate(range(min = 1, max = 1000, message = "limit must be between 1 and 1000"))]
    pub limit: Option<usize>,
}

impl HistoryQuery {
    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_HISTORY_LIMIT)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub success: bool,
    pub count: usize,
    pub entries: Vec<AuditEntry>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearHistoryResponse {
    pub success: bool,
    pub message: String,
    pub removed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_limit_bounds() {
        assert_eq!(HistoryQuery { limit: None }.limit(), DEFAULT_HISTORY_LIMIT);
        assert!(HistoryQuery { limit: Some(0) }.validate().is_err());
        assert!(HistoryQuery { limit: Some(5000) }.validate().is_err());
        assert!(HistoryQuery { limit: Some(25) }.validate().is_ok());
    }
}
