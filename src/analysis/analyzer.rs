//! SQL risk analyzer
//!
//! Produces an ordered list of findings for one statement: kind-specific
//! rules first, then security patterns, then performance heuristics, then a
//! trailing summary.

use super::classify::{
    parse_statement, FilterShape, InsertShape, ParseOutcome, SelectShape, StatementClassification,
    StatementShape,
};
use super::findings::{Category, Finding};
use super::script::split_statements;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

static INJECTION: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"'\s+OR\s+'",
        r"\bOR\s+1\s*=\s*1\b",
        r"\bUNION\s+(?:ALL\s+)?SELECT\b",
        r";\s*DROP\b",
        r"\bEXEC(?:UTE)?\s+\w",
        r"\bXP_\w+",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});
static DYNAMIC_EXEC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bEXEC(?:UTE)?\s*\(|\b(?:SP|XP)_\w+").unwrap());
static LEADING_WILDCARD_LIKE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\bI?LIKE\s+['"]%"#).unwrap());
static FUNCTION_IN_WHERE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bWHERE\s+[A-Z_]+\s*\([^)]+\)\s*[=<>]").unwrap());
static QUOTED_NUMBER_COMPARISON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bWHERE\s+[A-Z_][A-Z0-9_.]*\s*=\s*'[0-9]+(?:\.[0-9]+)?'").unwrap());
static FILTER_OR_JOIN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bWHERE\b|\bJOIN\b").unwrap());
static INDEX_HINT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bINDEX\b|\bPRIMARY\b|\bUNIQUE\b").unwrap());
static IDENTIFIER_FILTER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\bWHERE\b.*\b(?:ID|\w+_ID)\s*(?:=|IN\b)").unwrap());

/// Findings for one statement plus how it was classified
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementAnalysis {
    pub statement: String,
    /// `None` for blank input
    pub classification: Option<StatementClassification>,
    /// False when the keyword fallback was used
    pub parsed: bool,
    pub findings: Vec<Finding>,
}

impl StatementAnalysis {
    pub fn has_critical(&self) -> bool {
        self.findings.iter().any(|f| f.is_critical())
    }
}

pub struct SqlAnalyzer;

impl SqlAnalyzer {
    /// Analyze the whole text as a single logical statement
    pub fn smart_analyze(sql: &str) -> Vec<Finding> {
        Self::analyze(sql).findings
    }

    pub fn analyze(sql: &str) -> StatementAnalysis {
        let trimmed = sql.trim();

        if trimmed.is_empty() {
            return StatementAnalysis {
                statement: String::new(),
                classification: None,
                parsed: false,
                findings: vec![Finding::info(Category::Style, "No SQL provided.")],
            };
        }

        let upper = trimmed.to_uppercase();
        let mut findings = Vec::new();

        let (shape, parsed) = match parse_statement(trimmed) {
            ParseOutcome::Parsed(shape) => (shape, true),
            ParseOutcome::Unparsed { reason } => {
                debug!("Falling back to keyword analysis: {}", reason);
                findings.push(Finding::warning(
                    Category::Style,
                    "Using basic analysis (SQL syntax may have limitations).",
                ));
                (StatementShape::from_text(&upper), false)
            }
        };

        findings.extend(Self::kind_findings(&shape, &upper));
        findings.extend(Self::security_findings(&upper));
        findings.extend(Self::performance_findings(&upper));

        let summary = if findings.is_empty() {
            "SQL appears safe and efficient.".to_string()
        } else {
            format!("Analysis completed with {} observations.", findings.len())
        };
        findings.push(Finding::info(Category::Style, summary));

        StatementAnalysis {
            statement: trimmed.to_string(),
            classification: Some(shape.classification()),
            parsed,
            findings,
        }
    }

    /// Split the script and analyze each statement on its own
    pub fn analyze_statements(script: &str) -> Vec<StatementAnalysis> {
        let statements = split_statements(script);
        if statements.is_empty() {
            return vec![Self::analyze(script)];
        }
        statements.iter().map(|s| Self::analyze(s)).collect()
    }

    fn kind_findings(shape: &StatementShape, upper: &str) -> Vec<Finding> {
        match shape {
            StatementShape::Select(select) => Self::select_findings(select),
            StatementShape::Delete(filter) => Self::delete_findings(filter),
            StatementShape::Update(filter) => Self::update_findings(filter, upper),
            StatementShape::Insert(insert) => Self::insert_findings(insert),
            StatementShape::Alter => vec![
                Finding::warning(Category::Safety, "Schema change: ALTER statement detected."),
                Finding::info(Category::Safety, "Test schema changes in a non-production environment first."),
            ],
            StatementShape::Drop => vec![
                Finding::critical(Category::Safety, "DROP statement detected: potential data loss."),
                Finding::info(Category::Safety, "Take a backup before execution."),
            ],
            StatementShape::Truncate => vec![
                Finding::critical(Category::Safety, "TRUNCATE clears the entire table contents."),
                Finding::info(Category::Safety, "Use DELETE with WHERE for selective removal."),
            ],
            StatementShape::CreateTable => vec![
                Finding::info(Category::Style, "Schema creation: CREATE TABLE statement detected."),
                Finding::info(Category::Performance, "Consider adding indexes and constraints."),
            ],
            StatementShape::Unknown => Vec::new(),
        }
    }

    fn select_findings(select: &SelectShape) -> Vec<Finding> {
        let mut findings = Vec::new();

        if select.wildcard && !select.count_star {
            findings.push(Finding::warning(
                Category::Performance,
                "Avoid SELECT *; specify the columns you need.",
            ));
        }
        if select.has_from && !select.has_where {
            findings.push(Finding::info(
                Category::Performance,
                "No WHERE clause: may return a large result set.",
            ));
        }
        if select.has_order_by && !select.has_limit {
            findings.push(Finding::info(
                Category::Performance,
                "Consider adding LIMIT to ORDER BY queries.",
            ));
        }
        if select.join_count > 3 {
            findings.push(Finding::warning(
                Category::Performance,
                format!("Multiple JOINs ({}) may impact performance.", select.join_count),
            ));
        }
        if select.subquery_count > 2 {
            findings.push(Finding::warning(
                Category::Performance,
                format!(
                    "Multiple subqueries ({}) may impact performance.",
                    select.subquery_count
                ),
            ));
        }
        if select.distinct && !select.group_by {
            findings.push(Finding::info(
                Category::Performance,
                "DISTINCT can be expensive on large tables.",
            ));
        }

        findings
    }

    fn delete_findings(filter: &FilterShape) -> Vec<Finding> {
        let mut findings = Vec::new();

        if !filter.has_where {
            findings.push(Finding::critical(
                Category::Safety,
                "DELETE without WHERE will remove ALL rows from the table.",
            ));
        } else {
            findings.push(Finding::warning(
                Category::Safety,
                "DELETE operation: confirm a backup exists.",
            ));
        }
        if !filter.has_limit {
            findings.push(Finding::info(
                Category::Safety,
                "Add a LIMIT clause for safety during testing.",
            ));
        }

        findings
    }

    fn update_findings(filter: &FilterShape, upper: &str) -> Vec<Finding> {
        let mut findings = Vec::new();

        if !filter.has_where {
            findings.push(Finding::critical(
                Category::Safety,
                "UPDATE without WHERE will modify ALL rows in the table.",
            ));
        } else if IDENTIFIER_FILTER.is_match(upper) || INDEX_HINT.is_match(upper) {
            findings.push(Finding::warning(
                Category::Safety,
                "Filter touches identifier or key columns; updating them may break relationships.",
            ));
        }
        if !filter.has_limit {
            findings.push(Finding::info(
                Category::Safety,
                "Add a LIMIT clause for safety during testing.",
            ));
        }

        findings
    }

    fn insert_findings(insert: &InsertShape) -> Vec<Finding> {
        let mut findings = Vec::new();

        if !insert.explicit_columns {
            findings.push(Finding::warning(
                Category::Style,
                "Specify column names in INSERT statements.",
            ));
        }
        if insert.value_rows > 1 {
            findings.push(Finding::info(
                Category::Performance,
                format!(
                    "Multiple value sets detected ({}): consider batch size limits.",
                    insert.value_rows
                ),
            ));
        }
        if !insert.explicit_columns && insert.value_rows > 0 {
            findings.push(Finding::warning(
                Category::Safety,
                "Implicit column mapping: values depend on table column order.",
            ));
        }

        findings
    }

    fn security_findings(upper: &str) -> Vec<Finding> {
        let mut findings = Vec::new();

        if INJECTION.iter().any(|re| re.is_match(upper)) {
            findings.push(Finding::critical(
                Category::Security,
                "Possible SQL injection pattern detected.",
            ));
        }
        if DYNAMIC_EXEC.is_match(upper) {
            findings.push(Finding::warning(
                Category::Security,
                "Dynamic SQL execution or system procedure call detected.",
            ));
        }

        findings
    }

    fn performance_findings(upper: &str) -> Vec<Finding> {
        let mut findings = Vec::new();

        if LEADING_WILDCARD_LIKE.is_match(upper) {
            findings.push(Finding::warning(
                Category::Performance,
                "Leading wildcard in LIKE prevents index usage.",
            ));
        }
        if FUNCTION_IN_WHERE.is_match(upper) {
            findings.push(Finding::warning(
                Category::Performance,
                "Functions in WHERE clause may prevent index usage.",
            ));
        }
        if QUOTED_NUMBER_COMPARISON.is_match(upper) {
            findings.push(Finding::info(
                Category::Performance,
                "Possible implicit type conversion in WHERE clause.",
            ));
        }
        if FILTER_OR_JOIN.is_match(upper) && !INDEX_HINT.is_match(upper) {
            findings.push(Finding::info(
                Category::Performance,
                "Consider indexing columns used in WHERE/JOIN clauses.",
            ));
        }

        findings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::classify::StatementKind;
    use crate::analysis::findings::Severity;
    use pretty_assertions::assert_eq;

    fn messages(findings: &[Finding]) -> Vec<&str> {
        findings.iter().map(|f| f.message.as_str()).collect()
    }

    #[test]
    fn test_blank_input_single_info() {
        let findings = SqlAnalyzer::smart_analyze("   \n ");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Info);
        assert_eq!(findings[0].message, "No SQL provided.");
    }

    #[test]
    fn test_delete_without_where_is_critical() {
        let findings = SqlAnalyzer::smart_analyze("DELETE FROM t");
        assert!(findings.iter().any(|f| f.is_critical()));
        assert_eq!(
            messages(&findings),
            vec![
                "DELETE without WHERE will remove ALL rows from the table.",
                "Add a LIMIT clause for safety during testing.",
                "Analysis completed with 2 observations.",
            ]
        );
    }

    #[test]
    fn test_delete_with_where_has_no_critical() {
        let findings = SqlAnalyzer::smart_analyze("DELETE FROM t WHERE id=1");
        assert!(!findings.iter().any(|f| f.is_critical()));
        assert_eq!(findings[0].severity, Severity::Warning);
        assert_eq!(findings[0].message, "DELETE operation: confirm a backup exists.");
    }

    #[test]
    fn test_update_rules() {
        let no_filter = SqlAnalyzer::smart_analyze("UPDATE t SET x=1");
        assert_eq!(no_filter[0].severity, Severity::Critical);

        let by_id = SqlAnalyzer::smart_analyze("UPDATE users SET name = 'a' WHERE user_id = 7");
        assert!(!by_id.iter().any(|f| f.is_critical()));
        assert!(by_id
            .iter()
            .any(|f| f.message.contains("identifier or key columns")));
    }

    #[test]
    fn test_insert_rules() {
        let findings = SqlAnalyzer::smart_analyze("INSERT INTO t VALUES (1), (2)");
        let msgs = messages(&findings);
        assert_eq!(msgs[0], "Specify column names in INSERT statements.");
        assert!(msgs[1].starts_with("Multiple value sets detected (2)"));
        assert!(msgs[2].starts_with("Implicit column mapping"));

        let explicit = SqlAnalyzer::smart_analyze("INSERT INTO t (id) VALUES (1)");
        assert_eq!(
            messages(&explicit),
            vec!["SQL appears safe and efficient."]
        );
    }

    #[test]
    fn test_ddl_rules() {
        let drop = SqlAnalyzer::smart_analyze("DROP TABLE customers");
        assert_eq!(drop[0].severity, Severity::Critical);
        assert_eq!(drop[1].severity, Severity::Info);

        let truncate = SqlAnalyzer::smart_analyze("TRUNCATE TABLE customers");
        assert_eq!(truncate[0].severity, Severity::Critical);

        let alter = SqlAnalyzer::smart_analyze("ALTER TABLE customers ADD COLUMN tier INT");
        assert_eq!(alter[0].severity, Severity::Warning);

        let create = SqlAnalyzer::smart_analyze("CREATE TABLE audit (id INT PRIMARY KEY)");
        assert!(create[..2].iter().all(|f| f.severity == Severity::Info));
    }

    #[test]
    fn test_select_rules() {
        let findings = SqlAnalyzer::smart_analyze("SELECT * FROM orders ORDER BY created_at");
        let msgs = messages(&findings);
        assert_eq!(
            msgs,
            vec![
                "Avoid SELECT *; specify the columns you need.",
                "No WHERE clause: may return a large result set.",
                "Consider adding LIMIT to ORDER BY queries.",
                "Analysis completed with 3 observations.",
            ]
        );

        let count = SqlAnalyzer::smart_analyze("SELECT COUNT(*) FROM orders WHERE total > 10 LIMIT 1");
        assert!(!messages(&count).contains(&"Avoid SELECT *; specify the columns you need."));
    }

    #[test]
    fn test_unparsable_input_falls_back() {
        let analysis = SqlAnalyzer::analyze("DELETE FROM WHERE ???");
        assert!(!analysis.parsed);
        assert_eq!(analysis.findings[0].severity, Severity::Warning);
        assert!(analysis.findings[0].message.starts_with("Using basic analysis"));
        assert_eq!(
            analysis.classification.map(|c| c.kind),
            Some(StatementKind::Delete)
        );
        assert!(analysis.findings.len() > 1);
    }

    #[test]
    fn test_security_patterns() {
        let findings = SqlAnalyzer::smart_analyze("SELECT name FROM users WHERE name = '' OR '1'='1'");
        assert!(findings
            .iter()
            .any(|f| f.category == Category::Security && f.is_critical()));

        let exec = SqlAnalyzer::smart_analyze("EXEC('DROP TABLE x')");
        assert!(exec
            .iter()
            .any(|f| f.category == Category::Security && f.severity == Severity::Warning));
    }

    #[test]
    fn test_performance_patterns() {
        let findings =
            SqlAnalyzer::smart_analyze("SELECT id FROM users WHERE LOWER(email) = 'x' AND name LIKE '%son'");
        let msgs = messages(&findings);
        assert!(msgs.contains(&"Leading wildcard in LIKE prevents index usage."));
        assert!(msgs.contains(&"Functions in WHERE clause may prevent index usage."));
        assert!(msgs.contains(&"Consider indexing columns used in WHERE/JOIN clauses."));

        let coercion = SqlAnalyzer::smart_analyze("SELECT id FROM users WHERE age = '42'");
        assert!(messages(&coercion).contains(&"Possible implicit type conversion in WHERE clause."));
    }

    #[test]
    fn test_analyze_statements_per_statement() {
        let results = SqlAnalyzer::analyze_statements("DROP TABLE a; SELECT id FROM b WHERE id = 1 LIMIT 5;");
        assert_eq!(results.len(), 2);
        assert!(results[0].has_critical());
        assert_eq!(
            results[1].classification.map(|c| c.kind),
            Some(StatementKind::Select)
        );
        assert!(results.iter().all(|r| r.parsed));
    }

    #[test]
    fn test_quoted_or_literal_is_not_injection() {
        let findings = SqlAnalyzer::smart_analyze(
            "UPDATE addresses SET region = 'west' WHERE state IN ('WA', 'OR', 'CA')",
        );
        assert!(!findings.iter().any(|f| f.category == Category::Security));
    }

    #[test]
    fn test_join_count_threshold() {
        let four = SqlAnalyzer::smart_analyze(
            "SELECT a.id FROM a JOIN b ON a.id = b.a_id JOIN c ON b.id = c.b_id \
             JOIN d ON c.id = d.c_id JOIN e ON d.id = e.d_id WHERE a.id = 1 LIMIT 10",
        );
        assert!(messages(&four).contains(&"Multiple JOINs (4) may impact performance."));

        let three = SqlAnalyzer::smart_analyze(
            "SELECT a.id FROM a JOIN b ON a.id = b.a_id JOIN c ON b.id = c.b_id \
             JOIN d ON c.id = d.c_id WHERE a.id = 1 LIMIT 10",
        );
        assert!(!three.iter().any(|f| f.message.starts_with("Multiple JOINs")));
    }

    #[test]
    fn test_subquery_count_threshold() {
        let three = SqlAnalyzer::smart_analyze(
            "SELECT id FROM a WHERE id IN (SELECT a_id FROM b WHERE x IN \
             (SELECT x FROM c WHERE y IN (SELECT y FROM d))) LIMIT 5",
        );
        assert!(messages(&three).contains(&"Multiple subqueries (3) may impact performance."));

        let two = SqlAnalyzer::smart_analyze(
            "SELECT id FROM a WHERE id IN (SELECT a_id FROM b WHERE x IN (SELECT x FROM c)) LIMIT 5",
        );
        assert!(!two.iter().any(|f| f.message.starts_with("Multiple subqueries")));
    }

    #[test]
    fn test_distinct_without_group_by() {
        let distinct =
            SqlAnalyzer::smart_analyze("SELECT DISTINCT region FROM stores WHERE open = true LIMIT 5");
        assert!(messages(&distinct).contains(&"DISTINCT can be expensive on large tables."));

        let grouped = SqlAnalyzer::smart_analyze(
            "SELECT DISTINCT region FROM stores WHERE open = true GROUP BY region LIMIT 5",
        );
        assert!(!grouped.iter().any(|f| f.message.starts_with("DISTINCT")));
    }

    #[test]
    fn test_identifier_filter_spans_lines() {
        let findings = SqlAnalyzer::smart_analyze("UPDATE t SET x = 1\nWHERE\n  id = 7");
        assert!(findings
            .iter()
            .any(|f| f.message.contains("identifier or key columns")));
    }
}
