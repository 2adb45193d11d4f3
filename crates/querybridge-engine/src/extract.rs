//! SQL extraction from model output and the read-only guard

use crate::error::HandlerError;
use regex::Regex;
use sqlparser::ast::{Query, SetExpr, Statement};
use sqlparser::dialect::SnowflakeDialect;
use sqlparser::parser::Parser;
use std::sync::OnceLock;
use tracing::debug;

fn sql_block_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?m)sql\n([^`]*)").expect("SQL block pattern is valid"))
}

/// Extract the statement of the first `sql` code block
///
/// Returns the text between `sql\n` and the next backtick, untrimmed, or
/// `None` when the text has no such block.
pub fn extract_sql(text: &str) -> Option<&str> {
    sql_block_pattern()
        .captures(text)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str())
}

/// Leading keywords accepted when a statement cannot be parsed
///
/// `WITH` is absent: a CTE can front a DML statement.
const READ_ONLY_KEYWORDS: &[&str] = &["SELECT", "SHOW", "DESCRIBE", "DESC", "EXPLAIN"];

/// Rejects statements that could mutate the warehouse
#[derive(Debug, Default, Clone, Copy)]
pub struct ReadOnlyGuard;

impl ReadOnlyGuard {
    pub fn new() -> Self {
        Self
    }

    /// Check every statement in `sql`
    pub fn check(&self, sql: &str) -> Result<(), HandlerError> {
        match Parser::parse_sql(&SnowflakeDialect {}, sql) {
            Ok(statements) => {
                if statements.is_empty() {
                    return Err(HandlerError::UnsafeStatement("empty statement".to_string()));
                }
                match statements.iter().find(|statement| !Self::is_read_only(statement)) {
                    Some(statement) => Err(HandlerError::UnsafeStatement(Self::summarize(&statement.to_string()))),
                    None => Ok(()),
                }
            }
            Err(e) => {
                debug!(error = %e, "Statement did not parse, checking leading keywords");
                Self::check_keywords(sql)
            }
        }
    }

    fn is_read_only(statement: &Statement) -> bool {
        match statement {
            Statement::Query(query) => Self::is_read_only_query(query),
            // EXPLAIN ANALYZE runs its statement
            Statement::Explain { statement, .. } => Self::is_read_only(statement),
            other => Self::is_read_only_command(other),
        }
    }

    /// `WITH ... INSERT` and `WITH ... UPDATE` parse as queries
    fn is_read_only_query(query: &Query) -> bool {
        let ctes_read_only = query
            .with
            .as_ref()
            .map_or(true, |with| with.cte_tables.iter().all(|cte| Self::is_read_only_query(&cte.query)));

        ctes_read_only && Self::is_read_only_body(&query.body)
    }

    fn is_read_only_body(body: &SetExpr) -> bool {
        match body {
            // SELECT ... INTO creates a table
            SetExpr::Select(select) => select.into.is_none(),
            SetExpr::Values(_) | SetExpr::Table(_) => true,
            SetExpr::Query(query) => Self::is_read_only_query(query),
            SetExpr::SetOperation { left, right, .. } => Self::is_read_only_body(left) && Self::is_read_only_body(right),
            _ => false,
        }
    }

    fn is_read_only_command(statement: &Statement) -> bool {
        matches!(
            statement,
            Statement::ExplainTable { .. }
                | Statement::ShowTables { .. }
                | Statement::ShowColumns { .. }
                | Statement::ShowVariable { .. }
                | Statement::ShowCreate { .. }
                | Statement::ShowFunctions { .. }
        )
    }

    fn check_keywords(sql: &str) -> Result<(), HandlerError> {
        let mut seen = false;

        for part in sql.split(';').map(str::trim).filter(|part| !part.is_empty()) {
            seen = true;
            let keyword = part
                .trim_start_matches('(')
                .split(|c: char| c.is_whitespace() || c == '(')
                .next()
                .unwrap_or_default()
                .to_ascii_uppercase();

            if !READ_ONLY_KEYWORDS.contains(&keyword.as_str()) {
                return Err(HandlerError::UnsafeStatement(Self::summarize(part)));
            }
        }

        if seen {
            Ok(())
        } else {
            Err(HandlerError::UnsafeStatement("empty statement".to_string()))
        }
    }

    fn summarize(sql: &str) -> String {
        let flat = sql.split_whitespace().collect::<Vec<_>>().join(" ");
        match flat.char_indices().nth(80) {
            Some((index, _)) => format!("{}...", &flat[..index]),
            None => flat,
        }
    }
}
