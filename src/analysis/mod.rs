//! SQL Analysis Module
//!
//! Everything that looks at SQL text without changing the database:
//! - Risk findings per statement (parser first, keyword fallback second)
//! - Syntax validation for the validate stage
//! - Schema comparison preview against a snapshot
//! - Script splitting shared with the executor

pub mod analyzer;
pub mod classify;
pub mod comparison;
pub mod findings;
pub mod script;
pub mod validator;

pub use analyzer::{SqlAnalyzer, StatementAnalysis};
pub use classify::{parse_statement, ParseOutcome, StatementClassification, StatementKind, StatementShape};
pub use comparison::SchemaComparison;
pub use findings::{Category, Finding, Severity};
pub use script::split_statements;
pub use validator::{SqlValidator, SyntaxValidator};
