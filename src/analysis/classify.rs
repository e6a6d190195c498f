//! Statement classification
//!
//! A statement is either parsed structurally with `sqlparser` or, when the
//! parser gives up, classified from keywords in the upper-cased text. Both
//! paths produce the same [`StatementShape`].

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlparser::ast::{SelectItem, SetExpr, Statement};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

static WHERE_CLAUSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bWHERE\b").unwrap());
static FROM_CLAUSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bFROM\b").unwrap());
static LIMIT_CLAUSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bLIMIT\b").unwrap());
static ORDER_BY: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bORDER\s+BY\b").unwrap());
static GROUP_BY: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bGROUP\s+BY\b").unwrap());
static JOIN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bJOIN\b").unwrap());
static SUBQUERY: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(\s*SELECT\b").unwrap());
static DISTINCT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bSELECT\s+DISTINCT\b").unwrap());
static WILDCARD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bSELECT\s+(?:DISTINCT\s+)?\*").unwrap());
static INSERT_COLUMNS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*INSERT\s+INTO\s+[\w.]+\s*\(").unwrap());
static VALUE_TUPLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\)\s*,\s*\(").unwrap());
static CREATE_TABLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*CREATE\s+(?:TEMP\w*\s+|UNLOGGED\s+)?TABLE\b").unwrap());

/// Statement kinds the analyzer has rules for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    Alter,
    Drop,
    Truncate,
    CreateTable,
    Unknown,
}

impl StatementKind {
    /// Classify by the statement's opening keyword(s). Expects upper-cased text.
    pub fn from_leading_keyword(upper: &str) -> Self {
        let keyword = super::script::leading_keyword(upper);
        match keyword.as_str() {
            "SELECT" | "WITH" => StatementKind::Select,
            "INSERT" => StatementKind::Insert,
            "UPDATE" => StatementKind::Update,
            "DELETE" => StatementKind::Delete,
            "ALTER" => StatementKind::Alter,
            "DROP" => StatementKind::Drop,
            "TRUNCATE" => StatementKind::Truncate,
            "CREATE" if CREATE_TABLE.is_match(upper) => StatementKind::CreateTable,
            _ => StatementKind::Unknown,
        }
    }

    /// Whether executing this kind reports an affected-row count
    pub fn is_dml(&self) -> bool {
        matches!(
            self,
            StatementKind::Insert | StatementKind::Update | StatementKind::Delete
        )
    }
}

/// Kind plus the two clauses every caller cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementClassification {
    pub kind: StatementKind,
    pub has_where_clause: bool,
    pub has_limit_clause: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectShape {
    /// Unqualified `*` in the projection
    pub wildcard: bool,
    /// Projection is `COUNT(*)` style aggregate
    pub count_star: bool,
    pub has_from: bool,
    pub has_where: bool,
    pub has_limit: bool,
    pub has_order_by: bool,
    pub join_count: usize,
    pub subquery_count: usize,
    pub distinct: bool,
    pub group_by: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertShape {
    pub explicit_columns: bool,
    /// Number of VALUES tuples; 0 when the source is a query
    pub value_rows: usize,
}

/// WHERE/LIMIT presence for UPDATE and DELETE
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterShape {
    pub has_where: bool,
    pub has_limit: bool,
}

/// A classified statement with the payload its kind's rules need
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatementShape {
    Select(SelectShape),
    Insert(InsertShape),
    Update(FilterShape),
    Delete(FilterShape),
    Alter,
    Drop,
    Truncate,
    CreateTable,
    Unknown,
}

impl StatementShape {
    pub fn kind(&self) -> StatementKind {
        match self {
            StatementShape::Select(_) => StatementKind::Select,
            StatementShape::Insert(_) => StatementKind::Insert,
            StatementShape::Update(_) => StatementKind::Update,
            StatementShape::Delete(_) => StatementKind::Delete,
            StatementShape::Alter => StatementKind::Alter,
            StatementShape::Drop => StatementKind::Drop,
            StatementShape::Truncate => StatementKind::Truncate,
            StatementShape::CreateTable => StatementKind::CreateTable,
            StatementShape::Unknown => StatementKind::Unknown,
        }
    }

    pub fn classification(&self) -> StatementClassification {
        let (has_where_clause, has_limit_clause) = match self {
            StatementShape::Select(s) => (s.has_where, s.has_limit),
            StatementShape::Update(f) | StatementShape::Delete(f) => (f.has_where, f.has_limit),
            _ => (false, false),
        };
        StatementClassification {
            kind: self.kind(),
            has_where_clause,
            has_limit_clause,
        }
    }

    /// Keyword/regex classification over upper-cased text
    pub fn from_text(upper: &str) -> Self {
        match StatementKind::from_leading_keyword(upper) {
            StatementKind::Select => StatementShape::Select(SelectShape {
                wildcard: WILDCARD.is_match(upper),
                count_star: upper.contains("COUNT(*)"),
                has_from: FROM_CLAUSE.is_match(upper),
                has_where: WHERE_CLAUSE.is_match(upper),
                has_limit: LIMIT_CLAUSE.is_match(upper),
                has_order_by: ORDER_BY.is_match(upper),
                join_count: JOIN.find_iter(upper).count(),
                subquery_count: SUBQUERY.find_iter(upper).count(),
                distinct: DISTINCT.is_match(upper),
                group_by: GROUP_BY.is_match(upper),
            }),
            StatementKind::Insert => {
                let value_rows = match upper.find("VALUES") {
                    Some(pos) => VALUE_TUPLE.find_iter(&upper[pos..]).count() + 1,
                    None => 0,
                };
                StatementShape::Insert(InsertShape {
                    explicit_columns: INSERT_COLUMNS.is_match(upper),
                    value_rows,
                })
            }
            StatementKind::Update => StatementShape::Update(Self::filter_from_text(upper)),
            StatementKind::Delete => StatementShape::Delete(Self::filter_from_text(upper)),
            StatementKind::Alter => StatementShape::Alter,
            StatementKind::Drop => StatementShape::Drop,
            StatementKind::Truncate => StatementShape::Truncate,
            StatementKind::CreateTable => StatementShape::CreateTable,
            StatementKind::Unknown => StatementShape::Unknown,
        }
    }

    fn filter_from_text(upper: &str) -> FilterShape {
        FilterShape {
            has_where: WHERE_CLAUSE.is_match(upper),
            has_limit: LIMIT_CLAUSE.is_match(upper),
        }
    }

    /// Shape of a parsed statement. `upper` is the statement text, used for
    /// details the AST walk does not cover.
    fn from_statement(statement: &Statement, upper: &str) -> Self {
        match statement {
            Statement::Query(query) => {
                let mut shape = match Self::from_text(upper) {
                    StatementShape::Select(s) => s,
                    _ => SelectShape::default(),
                };
                shape.has_order_by = query.order_by.is_some();
                shape.has_limit = query.limit.is_some() || query.fetch.is_some();

                if let SetExpr::Select(select) = query.body.as_ref() {
                    shape.wildcard = select
                        .projection
                        .iter()
                        .any(|item| matches!(item, SelectItem::Wildcard(_)));
                    shape.has_from = !select.from.is_empty();
                    shape.has_where = select.selection.is_some();
                    shape.distinct = select.distinct.is_some();
                    shape.join_count = select.from.iter().map(|t| t.joins.len()).sum();
                }
                StatementShape::Select(shape)
            }
            Statement::Insert(insert) => {
                let value_rows = match insert.source.as_deref().map(|q| q.body.as_ref()) {
                    Some(SetExpr::Values(values)) => values.rows.len(),
                    _ => 0,
                };
                StatementShape::Insert(InsertShape {
                    explicit_columns: !insert.columns.is_empty(),
                    value_rows,
                })
            }
            Statement::Update { selection, .. } => StatementShape::Update(FilterShape {
                has_where: selection.is_some(),
                has_limit: LIMIT_CLAUSE.is_match(upper),
            }),
            Statement::Delete(delete) => StatementShape::Delete(FilterShape {
                has_where: delete.selection.is_some(),
                has_limit: delete.limit.is_some(),
            }),
            Statement::AlterTable { .. } => StatementShape::Alter,
            Statement::Drop { .. } => StatementShape::Drop,
            Statement::Truncate { .. } => StatementShape::Truncate,
            Statement::CreateTable(_) => StatementShape::CreateTable,
            _ => Self::from_text(upper),
        }
    }
}

/// Result of trying to parse one statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    Parsed(StatementShape),
    Unparsed { reason: String },
}

/// Parse `sql` as exactly one statement
pub fn parse_statement(sql: &str) -> ParseOutcome {
    let dialect = GenericDialect {};
    match Parser::parse_sql(&dialect, sql) {
        Ok(statements) if statements.len() == 1 => {
            let upper = sql.to_uppercase();
            ParseOutcome::Parsed(StatementShape::from_statement(&statements[0], &upper))
        }
        Ok(statements) => ParseOutcome::Unparsed {
            reason: format!("expected one statement, found {}", statements.len()),
        },
        Err(e) => ParseOutcome::Unparsed {
            reason: e.to_string(),
        },
    }
}
