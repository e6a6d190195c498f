//! Script splitting
//!
//! Breaks a multi-statement script into individual statements. Semicolons
//! inside string literals, quoted identifiers, dollar-quoted bodies and
//! comments do not end a statement.

/// Split a script on `;`, trimming each fragment and skipping empty ones
pub fn split_statements(script: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut chars = script.chars().peekable();

    let mut in_single = false;
    // Inside E'...', where backslash escapes the next character
    let mut escape_string = false;
    let mut in_double = false;
    // Open dollar quote and the length of `current` where its body starts
    let mut dollar_tag: Option<(String, usize)> = None;

    while let Some(c) = chars.next() {
        if let Some((tag, body_start)) = &dollar_tag {
            current.push(c);
            if c == '$' && current.len() >= body_start + tag.len() && current.ends_with(tag.as_str()) {
                dollar_tag = None;
            }
            continue;
        }

        match c {
            '\'' if !in_double => {
                // A quote right after a closing one is a doubled '' and keeps the mode
                if !in_single && !current.ends_with('\'') {
                    escape_string = opens_escape_string(&current);
                }
                in_single = !in_single;
                current.push(c);
            }
            '\\' if in_single && escape_string => {
                current.push(c);
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            '"' if !in_single => {
                in_double = !in_double;
                current.push(c);
            }
            '-' if !in_single && !in_double && chars.peek() == Some(&'-') => {
                // Line comment: drop through end of line
                for next in chars.by_ref() {
                    if next == '\n' {
                        current.push('\n');
                        break;
                    }
                }
            }
            '/' if !in_single && !in_double && chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
                current.push(' ');
            }
            '$' if !in_single
                && !in_double
                && !current.chars().last().is_some_and(is_ident_char) =>
            {
                // $$ or $tag$ opens a dollar-quoted body
                let mut tag = String::from("$");
                let mut lookahead = chars.clone();
                let mut closed = false;
                while let Some(&n) = lookahead.peek() {
                    if n == '$' {
                        tag.push('$');
                        closed = true;
                        break;
                    }
                    if n.is_alphanumeric() || n == '_' {
                        tag.push(n);
                        lookahead.next();
                    } else {
                        break;
                    }
                }
                current.push('$');
                if closed {
                    for _ in 1..tag.len() {
                        if let Some(n) = chars.next() {
                            current.push(n);
                        }
                    }
                    dollar_tag = Some((tag, current.len()));
                }
            }
            ';' if !in_single && !in_double => {
                push_fragment(&mut statements, &current);
                current.clear();
            }
            _ => current.push(c),
        }
    }

    push_fragment(&mut statements, &current);
    statements
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// A quote opened right after a standalone `E` starts an escape string
fn opens_escape_string(before: &str) -> bool {
    let mut rev = before.chars().rev();
    matches!(rev.next(), Some('E' | 'e')) && !rev.next().is_some_and(is_ident_char)
}

fn push_fragment(statements: &mut Vec<String>, fragment: &str) {
    let trimmed = fragment.trim();
    if !trimmed.is_empty() {
        statements.push(trimmed.to_string());
    }
}

/// First word of a statement, upper-cased
pub fn leading_keyword(statement: &str) -> String {
    statement
        .trim_start()
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or_default()
        .to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_split_skips_empty_fragments() {
        let parts = split_statements("INSERT INTO t VALUES (1);\n\n INSERT INTO t VALUES (2);;  ");
        assert_eq!(
            parts,
            vec!["INSERT INTO t VALUES (1)", "INSERT INTO t VALUES (2)"]
        );
    }

    #[test]
    fn test_split_respects_quotes() {
        let parts = split_statements("INSERT INTO notes VALUES ('a;b'); SELECT \"odd;name\" FROM x");
        assert_eq!(
            parts,
            vec![
                "INSERT INTO notes VALUES ('a;b')",
                "SELECT \"odd;name\" FROM x"
            ]
        );
    }

    #[test]
    fn test_split_strips_comments() {
        let parts = split_statements("-- setup; ignored\nCREATE TABLE a (id int); /* x; y */ DROP TABLE b");
        assert_eq!(parts, vec!["CREATE TABLE a (id int)", "DROP TABLE b"]);
    }

    #[test]
    fn test_split_keeps_dollar_bodies() {
        let script = "CREATE FUNCTION f() RETURNS int AS $$ SELECT 1; $$ LANGUAGE sql; SELECT f()";
        let parts = split_statements(script);
        assert_eq!(parts.len(), 2);
        assert!(parts[0].ends_with("LANGUAGE sql"));
        assert_eq!(parts[1], "SELECT f()");
    }

    #[test]
    fn test_split_honours_escape_strings() {
        let parts = split_statements("SELECT E'\\''; DELETE FROM t; SELECT 'x'");
        assert_eq!(parts, vec!["SELECT E'\\''", "DELETE FROM t", "SELECT 'x'"]);

        let parts = split_statements("INSERT INTO t VALUES (e'a\\';b', 'c''d;'); DELETE FROM t");
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1], "DELETE FROM t");
    }

    #[test]
    fn test_backslash_is_literal_in_standard_strings() {
        let parts = split_statements("INSERT INTO paths VALUES ('C:\\'); DELETE FROM paths");
        assert_eq!(parts, vec!["INSERT INTO paths VALUES ('C:\\')", "DELETE FROM paths"]);

        // NAME' is not an escape-string prefix
        let parts = split_statements("SELECT NAME'\\'; DELETE FROM t");
        assert_eq!(parts.len(), 2);
    }

    #[test]
    fn test_dollar_after_identifier_is_not_a_quote() {
        let parts = split_statements("SELECT x$y$ FROM t; DELETE FROM t WHERE id = $1");
        assert_eq!(parts, vec!["SELECT x$y$ FROM t", "DELETE FROM t WHERE id = $1"]);
    }

    #[test]
    fn test_leading_keyword() {
        assert_eq!(leading_keyword("  update t set x = 1"), "UPDATE");
        assert_eq!(leading_keyword("WITH(x) AS"), "WITH");
        assert_eq!(leading_keyword(""), "");
    }
}
