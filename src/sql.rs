//! SQL text helpers.
//!
//! This module provides functionality to:
//! - Rewrite a query into COUNT form for the preliminary row count
//! - Inject a row-id range predicate into a query for one partition
//! - Parse the single-cell result of a counting query
//! - Redact string literals before SQL is written to logs
//!
//! None of this parses SQL. A small scanner finds keywords at the top level
//! of the statement, skipping quoted text, comments and parenthesized
//! subqueries, which is enough to rewrite `SELECT ... FROM ... [WHERE ...]`.

use crate::error::AppError;
use crate::table::TabularResult;

// ─────────────────────────────────────────────────────────────────────────────
// Top-level word scanning
// ─────────────────────────────────────────────────────────────────────────────

/// A bare word outside quotes, comments and parentheses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Word<'a> {
    start: usize,
    text: &'a str,
}

impl Word<'_> {
    fn is(&self, keyword: &str) -> bool {
        self.text.eq_ignore_ascii_case(keyword)
    }
}

/// Collects the words of `sql` that sit at parenthesis depth zero.
///
/// Handles:
/// - Single, double and backtick quoting, with backslash escapes
/// - `--` line comments and `/* */` block comments
/// - Nested subqueries
fn top_level_words(sql: &str) -> Vec<Word<'_>> {
    let bytes = sql.as_bytes();
    let len = bytes.len();
    let mut words = Vec::new();

    let mut i = 0;
    let mut paren_depth: u32 = 0;

    while i < len {
        let ch = bytes[i];

        // Quoted text
        if ch == b'\'' || ch == b'"' || ch == b'`' {
            i += 1;
            while i < len {
                if bytes[i] == b'\\' {
                    i += 2;
                    continue;
                }
                if bytes[i] == ch {
                    break;
                }
                i += 1;
            }
            i += 1;
            continue;
        }

        // Comments
        if ch == b'-' && bytes.get(i + 1) == Some(&b'-') {
            while i < len && bytes[i] != b'\n' {
                i += 1;
            }
            continue;
        }
        if ch == b'/' && bytes.get(i + 1) == Some(&b'*') {
            i += 2;
            while i + 1 < len && !(bytes[i] == b'*' && bytes[i + 1] == b'/') {
                i += 1;
            }
            i += 2;
            continue;
        }

        if ch == b'(' {
            paren_depth += 1;
            i += 1;
            continue;
        }
        if ch == b')' {
            paren_depth = paren_depth.saturating_sub(1);
            i += 1;
            continue;
        }

        if is_identifier_char(ch) {
            let start = i;
            while i < len && is_identifier_char(bytes[i]) {
                i += 1;
            }
            if paren_depth == 0 {
                words.push(Word {
                    start,
                    text: &sql[start..i],
                });
            }
            continue;
        }

        i += 1;
    }

    words
}

/// Checks if a byte is a valid identifier character (letter, digit, or underscore).
fn is_identifier_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Keywords that end a WHERE clause. Those marked `true` must be followed by BY.
const CLAUSE_TERMINATORS: &[(&str, bool)] = &[
    ("group", true),
    ("order", true),
    ("cluster", true),
    ("distribute", true),
    ("sort", true),
    ("having", false),
    ("window", false),
    ("limit", false),
    ("offset", false),
];

/// Set operators. A range predicate would only bind the first branch.
const SET_OPERATORS: &[&str] = &["union", "intersect", "except", "minus"];

fn has_set_operator(words: &[Word<'_>]) -> bool {
    words.iter().any(|w| SET_OPERATORS.iter().any(|kw| w.is(kw)))
}

fn is_clause_terminator(words: &[Word<'_>], idx: usize) -> bool {
    CLAUSE_TERMINATORS.iter().any(|(kw, needs_by)| {
        words[idx].is(kw) && (!needs_by || words.get(idx + 1).is_some_and(|w| w.is("by")))
    })
}

/// Returns the index (into `words`) of the top-level FROM.
fn find_from(sql: &str, words: &[Word<'_>]) -> Result<usize, AppError> {
    words.iter().position(|w| w.is("from")).ok_or_else(|| {
        AppError::InvalidArgument(format!(
            "Invalid SQL: no top-level FROM clause found in {:?}",
            redact_sql_literals(sql)
        ))
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// COUNT rewriting
// ─────────────────────────────────────────────────────────────────────────────

/// Top-level keywords that make `COUNT(*)` over the same FROM meaningless.
const UNSUPPORTED_FOR_COUNT: &[&str] = &["group", "having", "limit", "offset", "distinct"];

/// Attempt to rewrite a query into its COUNT form.
///
/// # Returns
///
/// - `Ok(Some(query))` - Successfully rewrote to COUNT form
/// - `Ok(None)` - Query shape is unsupported for COUNT (e.g., GROUP BY)
/// - `Err(AppError)` - No top-level FROM found
///
/// A leading `WITH` clause is kept in front of the rewritten SELECT. Any
/// other text ahead of the SELECT (Hive's `FROM t SELECT ...` form, for
/// instance) is not rewritten.
///
/// # Example
///
/// ```
/// use hive_extract::sql::make_count_sql;
/// let count = make_count_sql("SELECT id, name FROM t WHERE active = 1").unwrap();
/// assert_eq!(count, Some("SELECT COUNT(*) FROM t WHERE active = 1".to_string()));
/// ```
pub fn make_count_sql(original: &str) -> Result<Option<String>, AppError> {
    let sql = trim_statement(original);
    let words = top_level_words(sql);
    let from_idx = find_from(sql, &words)?;

    if has_set_operator(&words)
        || words
            .iter()
            .any(|w| UNSUPPORTED_FOR_COUNT.iter().any(|kw| w.is(kw)))
    {
        return Ok(None);
    }

    let select_idx = match words[..from_idx].iter().rposition(|w| w.is("select")) {
        Some(idx) => idx,
        None => return Ok(None),
    };
    let prefix = if select_idx == 0 {
        ""
    } else if words[0].is("with") {
        sql[..words[select_idx].start].trim_end()
    } else {
        return Ok(None);
    };

    // ORDER BY is legal but pointless in a count; cut it off.
    let mut end = sql.len();
    for idx in from_idx + 1..words.len() {
        if words[idx].is("order") && words.get(idx + 1).is_some_and(|w| w.is("by")) {
            end = words[idx].start;
            break;
        }
    }

    let from_onwards = sql[words[from_idx].start..end].trim_end();
    if prefix.is_empty() {
        Ok(Some(format!("SELECT COUNT(*) {}", from_onwards)))
    } else {
        Ok(Some(format!("{} SELECT COUNT(*) {}", prefix, from_onwards)))
    }
}

/// Parses the row count from the single-cell result of a counting query.
///
/// Engines return the count as an integer, and some render it as a float
/// (`"120000.0"`). The value is returned signed; range checks belong to the
/// partition planner.
pub fn parse_row_count(count_sql: &str, result: &TabularResult) -> Result<i64, AppError> {
    let cell = result
        .first_cell()
        .ok_or_else(|| AppError::query_failed(count_sql, "Counting query returned no rows"))?;
    let cell = cell.trim();

    if let Ok(n) = cell.parse::<i64>() {
        return Ok(n);
    }

    match cell.parse::<f64>() {
        Ok(f) if f.fract() == 0.0 && f.is_finite() => Ok(f as i64),
        _ => Err(AppError::query_failed(
            count_sql,
            format!("Cannot parse row count: {:?}", cell),
        )),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Partition predicate
// ─────────────────────────────────────────────────────────────────────────────

/// Restricts `base` to rows whose `column` lies in `[low, high)`.
///
/// An existing top-level WHERE condition is parenthesized and AND-ed with the
/// range; otherwise a WHERE clause is inserted before any trailing
/// GROUP BY / ORDER BY / LIMIT.
///
/// # Errors
///
/// Returns `AppError::InvalidArgument` if there is no top-level FROM, or if
/// the query combines SELECTs with UNION / INTERSECT / EXCEPT, since the
/// range would only restrict the first branch.
pub fn with_rowid_range(base: &str, column: &str, low: u64, high: u64) -> Result<String, AppError> {
    let sql = trim_statement(base);
    let words = top_level_words(sql);
    let from_idx = find_from(sql, &words)?;

    if has_set_operator(&words) {
        return Err(AppError::InvalidArgument(format!(
            "Cannot partition a set operation by row id: {:?}",
            redact_sql_literals(sql)
        )));
    }
    let range = format!("{col} >= {low} AND {col} < {high}", col = column);

    let where_idx = (from_idx + 1..words.len()).find(|&i| words[i].is("where"));
    let search_from = where_idx.unwrap_or(from_idx) + 1;
    let tail_start = (search_from..words.len())
        .find(|&i| is_clause_terminator(&words, i))
        .map(|i| words[i].start)
        .unwrap_or(sql.len());

    let head = sql[..tail_start].trim_end();
    let tail = sql[tail_start..].trim();

    let mut out = match where_idx {
        Some(idx) => {
            let cond_start = words[idx].start + words[idx].text.len();
            let condition = sql[cond_start..tail_start].trim();
            format!(
                "{} WHERE ({}) AND {}",
                sql[..words[idx].start].trim_end(),
                condition,
                range
            )
        }
        None => format!("{} WHERE {}", head, range),
    };

    if !tail.is_empty() {
        out.push(' ');
        out.push_str(tail);
    }
    Ok(out)
}

/// Strips surrounding whitespace and trailing semicolons.
fn trim_statement(sql: &str) -> &str {
    sql.trim().trim_end_matches(';').trim_end()
}

// ─────────────────────────────────────────────────────────────────────────────
// Log redaction
// ─────────────────────────────────────────────────────────────────────────────

/// Redacts quoted string literals for safe debug logging.
///
/// Replaces contents of single-quoted and double-quoted strings with '?'.
/// Backtick-quoted identifiers are left alone.
pub fn redact_sql_literals(sql: &str) -> String {
    let mut result = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '\'' || ch == '"' {
            result.push(ch);
            result.push('?');

            // Skip to the closing quote
            while let Some(inner) = chars.next() {
                if inner == '\\' {
                    chars.next();
                } else if inner == ch {
                    result.push(ch);
                    break;
                }
            }
        } else {
            result.push(ch);
        }
    }

    result
}

/// Logs a statement at debug level when the caller opted in.
pub(crate) fn log_statement(enabled: bool, label: &str, sql: &str) {
    if enabled {
        tracing::debug!("[SQL] {}: {}", label, redact_sql_literals(sql));
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
