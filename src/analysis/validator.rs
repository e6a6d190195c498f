//! Syntax validation for the validate stage
//!
//! Separate from the risk analyzer: this one says yes or no, and its error
//! text is shown to the operator as-is.

use super::script::{leading_keyword, split_statements};
use crate::db::Database;
use crate::error::AppError;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use std::sync::Arc;
use tracing::debug;

/// Keywords a deployable statement may start with
pub const ALLOWED_KEYWORDS: [&str; 9] = [
    "SELECT", "INSERT", "UPDATE", "DELETE", "CREATE", "ALTER", "DROP", "TRUNCATE", "WITH",
];

static SUSPICIOUS_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)'\s*OR\s+'",
        r"(?i)'\s*OR\s+1\s*=\s*1",
        r"(?i)UNION\s+SELECT",
        r"(?i)EXEC\s*\(",
        r"(?i)EXECUTE\s*\(",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Yes/no syntax check consumed by the workflow's validate stage
#[async_trait]
pub trait SqlValidator: Send + Sync {
    async fn validate(&self, script: &str) -> Result<(), AppError>;
}

/// Keyword whitelist, injection patterns and a structural parse, applied to
/// every statement of the script. SELECTs the parser rejects get a second
/// opinion from the database planner.
pub struct SyntaxValidator {
    db: Arc<dyn Database>,
}

impl SyntaxValidator {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    async fn validate_statement(&self, statement: &str) -> Result<(), AppError> {
        let trimmed = statement.trim();
        if trimmed.is_empty() {
            return Err(AppError::Validation("SQL is empty.".to_string()));
        }

        let upper = trimmed.to_uppercase();
        let keyword = leading_keyword(&upper);
        let followed_by_space = upper
            .get(keyword.len()..)
            .and_then(|rest| rest.chars().next())
            .map(char::is_whitespace)
            .unwrap_or(false);

        if !ALLOWED_KEYWORDS.contains(&keyword.as_str()) || !followed_by_space {
            return Err(AppError::Validation(format!(
                "SQL must start with a valid SQL keyword: {}",
                ALLOWED_KEYWORDS.join(", ")
            )));
        }

        if SUSPICIOUS_PATTERNS.iter().any(|re| re.is_match(trimmed)) {
            return Err(AppError::Validation(
                "SQL contains potentially dangerous pattern. Please review your query.".to_string(),
            ));
        }

        let dialect = GenericDialect {};
        if let Err(e) = Parser::parse_sql(&dialect, trimmed) {
            debug!("Parser rejected statement ({}), keyword {}", e, keyword);
            if keyword == "SELECT" {
                self.db.explain(trimmed).await.map_err(|err| {
                    AppError::Validation(format!(
                        "SQL syntax validation failed: {}",
                        err.detail()
                    ))
                })?;
            }
            // Other kinds pass once the keyword and pattern checks hold
        }

        Ok(())
    }
}

#[async_trait]
impl SqlValidator for SyntaxValidator {
    async fn validate(&self, script: &str) -> Result<(), AppError> {
        let statements = split_statements(script);
        if statements.is_empty() {
            return Err(AppError::Validation("SQL is empty.".to_string()));
        }

        for statement in &statements {
            self.validate_statement(statement).await?;
        }

        debug!("Validated {} statement(s)", statements.len());
        Ok(())
    }
}
