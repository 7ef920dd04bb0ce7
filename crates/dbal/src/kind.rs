//! Statement kind detection for raw SQL.

use std::fmt;

/// The kind of a raw SQL statement, by leading keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    Create,
    Drop,
    Alter,
    /// Anything unrecognised (TRUNCATE, GRANT, CALL, ...)
    Other,
}

impl StatementKind {
    /// Detect the statement kind from a SQL string.
    ///
    /// Leading whitespace, comments and parentheses are skipped. For CTEs
    /// (`WITH ...`), looks past the CTE definitions to the main statement;
    /// a data-modifying CTE body makes the whole statement that kind.
    pub fn from_sql(sql: &str) -> Self {
        let trimmed = strip_sql_prefix(sql);
        if starts_with_keyword(trimmed, "WITH") {
            return Self::detect_cte(trimmed);
        }
        Self::from_keyword(trimmed)
    }

    /// Only plain reads may be served from, and stored in, the cache.
    pub fn is_read(self) -> bool {
        self == StatementKind::Select
    }

    /// Anything that is not a plain read is treated as a mutation.
    pub fn is_mutation(self) -> bool {
        !self.is_read()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StatementKind::Select => "SELECT",
            StatementKind::Insert => "INSERT",
            StatementKind::Update => "UPDATE",
            StatementKind::Delete => "DELETE",
            StatementKind::Create => "CREATE",
            StatementKind::Drop => "DROP",
            StatementKind::Alter => "ALTER",
            StatementKind::Other => "OTHER",
        }
    }

    fn from_keyword(s: &str) -> Self {
        const KEYWORDS: [(&str, StatementKind); 8] = [
            ("SELECT", StatementKind::Select),
            ("VALUES", StatementKind::Select),
            ("INSERT", StatementKind::Insert),
            ("UPDATE", StatementKind::Update),
            ("DELETE", StatementKind::Delete),
            ("CREATE", StatementKind::Create),
            ("DROP", StatementKind::Drop),
            ("ALTER", StatementKind::Alter),
        ];
        KEYWORDS
            .iter()
            .find(|(kw, _)| starts_with_keyword(s, kw))
            .map_or(StatementKind::Other, |(_, kind)| *kind)
    }

    /// Detect the kind of a `WITH ...` statement.
    fn detect_cte(sql: &str) -> Self {
        let mut depth: i32 = 0;
        let mut last_top_level = 0;
        let mut body_kind: Option<StatementKind> = None;
        let bytes = sql.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                b'(' => {
                    if depth == 0 && body_kind.is_none() {
                        let kind = Self::from_keyword(strip_sql_prefix(&sql[i + 1..]));
                        if kind.is_mutation() && kind != StatementKind::Other {
                            body_kind = Some(kind);
                        }
                    }
                    depth += 1;
                }
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        last_top_level = i + 1;
                    }
                }
                b'\'' => {
                    // Skip string literal
                    i += 1;
                    while i < bytes.len() {
                        if bytes[i] == b'\'' {
                            if bytes.get(i + 1) == Some(&b'\'') {
                                i += 1;
                            } else {
                                break;
                            }
                        }
                        i += 1;
                    }
                }
                _ => {}
            }
            i += 1;
        }

        let main = Self::from_keyword(strip_sql_prefix(&sql[last_top_level..]));
        match (main, body_kind) {
            (StatementKind::Select, Some(body)) => body,
            (kind, _) => kind,
        }
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strip leading whitespace, SQL comments (`--` and `/* */`), and parentheses
/// from a SQL string to find the first meaningful keyword.
pub(crate) fn strip_sql_prefix(sql: &str) -> &str {
    let mut s = sql;
    loop {
        let before = s;
        s = s.trim_start();
        if let Some(rest) = s.strip_prefix("--") {
            match rest.find('\n') {
                Some(pos) => {
                    s = &rest[pos + 1..];
                    continue;
                }
                None => return "",
            }
        }
        if let Some(rest) = s.strip_prefix("/*") {
            match rest.find("*/") {
                Some(pos) => {
                    s = &rest[pos + 2..];
                    continue;
                }
                None => return "",
            }
        }
        if let Some(rest) = s.strip_prefix('(') {
            s = rest;
            continue;
        }
        if s == before {
            break;
        }
    }
    s
}

/// Case-insensitive keyword match that refuses identifier continuations
/// (`SELECTED` is not `SELECT`).
pub(crate) fn starts_with_keyword(s: &str, keyword: &str) -> bool {
    match s.get(0..keyword.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(keyword) => !s[keyword.len()..]
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_'),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_keywords() {
        assert_eq!(StatementKind::from_sql("SELECT 1"), StatementKind::Select);
        assert_eq!(StatementKind::from_sql("  select * from t"), StatementKind::Select);
        assert_eq!(StatementKind::from_sql("INSERT INTO t VALUES (1)"), StatementKind::Insert);
        assert_eq!(StatementKind::from_sql("update t set a = 1"), StatementKind::Update);
        assert_eq!(StatementKind::from_sql("DELETE FROM t"), StatementKind::Delete);
        assert_eq!(StatementKind::from_sql("CREATE TABLE t (a INT)"), StatementKind::Create);
        assert_eq!(StatementKind::from_sql("DROP TABLE t"), StatementKind::Drop);
        assert_eq!(StatementKind::from_sql("ALTER TABLE t ADD b INT"), StatementKind::Alter);
        assert_eq!(StatementKind::from_sql("TRUNCATE t"), StatementKind::Other);
        assert_eq!(StatementKind::from_sql(""), StatementKind::Other);
    }

    #[test]
    fn test_comments_and_parens_skipped() {
        assert_eq!(
            StatementKind::from_sql("-- fetch\n/* users */ (SELECT 1)"),
            StatementKind::Select
        );
        assert_eq!(
            StatementKind::from_sql("/* note */ DELETE FROM t"),
            StatementKind::Delete
        );
        assert_eq!(StatementKind::from_sql("-- only a comment"), StatementKind::Other);
    }

    #[test]
    fn test_keyword_boundary() {
        assert_eq!(StatementKind::from_sql("SELECTED"), StatementKind::Other);
        assert_eq!(StatementKind::from_sql("SELECT\n1"), StatementKind::Select);
    }

    #[test]
    fn test_cte_detection() {
        assert_eq!(
            StatementKind::from_sql("WITH x AS (SELECT 1) SELECT * FROM x"),
            StatementKind::Select
        );
        assert_eq!(
            StatementKind::from_sql("WITH x AS (SELECT ')') DELETE FROM t USING x"),
            StatementKind::Delete
        );
        assert_eq!(
            StatementKind::from_sql(
                "WITH gone AS (DELETE FROM t RETURNING id) SELECT count(*) FROM gone"
            ),
            StatementKind::Delete
        );
    }

    #[test]
    fn test_only_select_is_read() {
        assert!(StatementKind::Select.is_read());
        assert!(StatementKind::Other.is_mutation());
        assert!(StatementKind::Alter.is_mutation());
    }
}
