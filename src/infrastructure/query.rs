//! Store query builder
//!
//! A [`Query`] mirrors the filter-chain protocol of the hosted store
//! (`select`, `insert`, `delete`, `eq`, `ilike`, `or`, `order`, `limit`, `range`).
//! It renders to PostgREST request parts for the hosted backend and to a single
//! parameterised SQLite statement for the local backend. Both renderings yield
//! rows as JSON objects.

use crate::infrastructure::database::StoreError;
use reqwest::Method;
use serde_json::{Map, Value};

/// Tables known to the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Companions,
    SessionHistory,
    Bookmarks,
}

impl Table {
    pub fn name(&self) -> &'static str {
        match self {
            Table::Companions => "companions",
            Table::SessionHistory => "session_history",
            Table::Bookmarks => "bookmarks",
        }
    }

    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Table::Companions => &[
                "id",
                "name",
                "subject",
                "topic",
                "voice",
                "style",
                "duration",
                "author",
                "created_at",
            ],
            Table::SessionHistory | Table::Bookmarks => {
                &["id", "user_id", "companion_id", "created_at"]
            }
        }
    }
}

/// A related row pulled in through a foreign key, e.g. `companions:companion_id(*)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Embed {
    pub alias: &'static str,
    pub foreign_key: &'static str,
    pub table: Table,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    All,
    Columns(Vec<&'static str>),
    Embed(Embed),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    Eq { column: &'static str, value: String },
    /// Case-insensitive `LIKE`; `%` is the wildcard.
    ILike { column: &'static str, pattern: String },
    Or(Vec<Filter>),
}

impl Filter {
    pub fn eq(column: &'static str, value: impl Into<String>) -> Filter {
        Filter::Eq {
            column,
            value: value.into(),
        }
    }

    /// Partial match: `column ILIKE %term%`.
    pub fn contains(column: &'static str, term: &str) -> Filter {
        Filter::ILike {
            column,
            pattern: format!("%{term}%"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: &'static str,
    pub ascending: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Select(Selection),
    Insert {
        rows: Vec<Map<String, Value>>,
        returning: bool,
    },
    Delete,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub table: Table,
    pub operation: Operation,
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl Query {
    /// Starts a `select *` on the table.
    pub fn table(table: Table) -> Query {
        Query {
            table,
            operation: Operation::Select(Selection::All),
            filters: Vec::new(),
            order: None,
            limit: None,
            offset: None,
        }
    }

    pub fn select(mut self, selection: Selection) -> Query {
        self.operation = Operation::Select(selection);
        self
    }

    pub fn insert(mut self, rows: Vec<Map<String, Value>>, returning: bool) -> Query {
        self.operation = Operation::Insert { rows, returning };
        self
    }

    pub fn delete(mut self) -> Query {
        self.operation = Operation::Delete;
        self
    }

    pub fn filter(mut self, filter: Filter) -> Query {
        self.filters.push(filter);
        self
    }

    pub fn eq(self, column: &'static str, value: impl Into<String>) -> Query {
        self.filter(Filter::eq(column, value))
    }

    pub fn ilike(self, column: &'static str, pattern: impl Into<String>) -> Query {
        self.filter(Filter::ILike {
            column,
            pattern: pattern.into(),
        })
    }

    pub fn or(self, filters: Vec<Filter>) -> Query {
        self.filter(Filter::Or(filters))
    }

    pub fn order(mut self, column: &'static str, ascending: bool) -> Query {
        self.order = Some(Order { column, ascending });
        self
    }

    pub fn limit(mut self, limit: u64) -> Query {
        self.limit = Some(limit);
        self
    }

    /// Zero-based, inclusive row range.
    pub fn range(mut self, from: u64, to: u64) -> Query {
        self.offset = Some(from);
        self.limit = Some(to.saturating_sub(from) + 1);
        self
    }

    /// Whether the caller expects rows back.
    pub fn returns_rows(&self) -> bool {
        match &self.operation {
            Operation::Select(_) => true,
            Operation::Insert { returning, .. } => *returning,
            Operation::Delete => false,
        }
    }

    pub fn to_postgrest(&self) -> Result<PostgrestRequest, StoreError> {
        let mut params = Vec::new();

        let (method, body, prefer) = match &self.operation {
            Operation::Select(selection) => {
                params.push(("select".to_owned(), postgrest_selection(selection)));
                (Method::GET, None, None)
            }
            Operation::Insert { rows, returning } => {
                if rows.is_empty() {
                    return Err(StoreError::InvalidQuery("insert without rows".into()));
                }
                let prefer = if *returning {
                    params.push(("select".to_owned(), "*".to_owned()));
                    "return=representation"
                } else {
                    "return=minimal"
                };
                let body = Value::Array(rows.iter().cloned().map(Value::Object).collect());
                (Method::POST, Some(body), Some(prefer))
            }
            Operation::Delete => {
                if self.filters.is_empty() {
                    return Err(StoreError::InvalidQuery("delete without filters".into()));
                }
                (Method::DELETE, None, Some("return=minimal"))
            }
        };

        for filter in &self.filters {
            params.push(match filter {
                Filter::Eq { column, value } => (column.to_string(), format!("eq.{value}")),
                Filter::ILike { column, pattern } => {
                    (column.to_string(), format!("ilike.{}", pattern.replace('%', "*")))
                }
                Filter::Or(filters) => ("or".to_owned(), format!("({})", postgrest_or(filters))),
            });
        }

        if let Some(order) = &self.order {
            let direction = if order.ascending { "asc" } else { "desc" };
            params.push(("order".to_owned(), format!("{}.{direction}", order.column)));
        }
        if let Some(offset) = self.offset {
            params.push(("offset".to_owned(), offset.to_string()));
        }
        if let Some(limit) = self.limit {
            params.push(("limit".to_owned(), limit.to_string()));
        }

        Ok(PostgrestRequest {
            method,
            path: format!("/rest/v1/{}", self.table.name()),
            params,
            body,
            prefer,
        })
    }

    pub fn to_sql(&self) -> Result<SqlStatement, StoreError> {
        let table = self.table.name();
        let mut binds = Vec::new();

        let mut sql = match &self.operation {
            Operation::Select(selection) => {
                let (row, join) = match selection {
                    Selection::All => (json_object(Some(table), self.table.columns()), None),
                    Selection::Columns(columns) => (json_object(Some(table), columns), None),
                    Selection::Embed(embed) => {
                        let inner = json_object(Some("embedded"), embed.table.columns());
                        let row = format!(
                            "CASE WHEN embedded.id IS NULL THEN json_object('{alias}', NULL) \
                             ELSE json_object('{alias}', {inner}) END",
                            alias = embed.alias
                        );
                        let join = format!(
                            " LEFT JOIN {} AS embedded ON embedded.id = {table}.{}",
                            embed.table.name(),
                            embed.foreign_key
                        );
                        (row, Some(join))
                    }
                };
                let mut sql = format!("SELECT {row} AS data FROM {table}");
                if let Some(join) = join {
                    sql.push_str(&join);
                }
                sql
            }
            Operation::Insert { rows, .. } => {
                let mut columns: Vec<&str> = Vec::new();
                for key in rows.iter().flat_map(|row| row.keys()) {
                    if !columns.contains(&key.as_str()) {
                        columns.push(key.as_str());
                    }
                }
                if columns.is_empty() {
                    return Err(StoreError::InvalidQuery("insert without rows".into()));
                }

                let placeholders = format!("({})", vec!["?"; columns.len()].join(", "));
                let values = vec![placeholders; rows.len()].join(", ");
                for row in rows {
                    for column in &columns {
                        binds.push(SqlValue::from(row.get(*column).unwrap_or(&Value::Null)));
                    }
                }

                return Ok(SqlStatement {
                    sql: format!(
                        "INSERT INTO {table} ({}) VALUES {values} RETURNING {} AS data",
                        columns.join(", "),
                        json_object(None, self.table.columns())
                    ),
                    binds,
                });
            }
            Operation::Delete => {
                if self.filters.is_empty() {
                    return Err(StoreError::InvalidQuery("delete without filters".into()));
                }
                format!("DELETE FROM {table}")
            }
        };

        if !self.filters.is_empty() {
            let clauses: Vec<String> = self
                .filters
                .iter()
                .map(|f| sql_filter(table, f, &mut binds))
                .collect();
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        if let Operation::Delete = self.operation {
            sql.push_str(&format!(
                " RETURNING {} AS data",
                json_object(None, self.table.columns())
            ));
            return Ok(SqlStatement { sql, binds });
        }

        if let Some(order) = &self.order {
            let direction = if order.ascending { "ASC" } else { "DESC" };
            // rowid keeps rows with equal keys in insertion order
            sql.push_str(&format!(
                " ORDER BY {table}.{} {direction}, {table}.rowid {direction}",
                order.column
            ));
        }

        match (self.limit, self.offset) {
            (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}")),
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {limit}")),
            (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {offset}")),
            (None, None) => {}
        }

        Ok(SqlStatement { sql, binds })
    }
}

/// Parts of an HTTP request against a PostgREST endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct PostgrestRequest {
    pub method: Method,
    pub path: String,
    pub params: Vec<(String, String)>,
    pub body: Option<Value>,
    pub prefer: Option<&'static str>,
}

/// SQLite statement whose single `data` column is a JSON object.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    pub sql: String,
    pub binds: Vec<SqlValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl From<&Value> for SqlValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => SqlValue::Null,
            Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => SqlValue::Integer(i),
                None => SqlValue::Real(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => SqlValue::Text(s.clone()),
            other => SqlValue::Text(other.to_string()),
        }
    }
}

fn postgrest_selection(selection: &Selection) -> String {
    match selection {
        Selection::All => "*".to_owned(),
        Selection::Columns(columns) => columns.join(","),
        Selection::Embed(embed) => format!("{}:{}(*)", embed.alias, embed.foreign_key),
    }
}

fn postgrest_or(filters: &[Filter]) -> String {
    filters
        .iter()
        .map(|filter| match filter {
            Filter::Eq { column, value } => format!("{column}.eq.{}", quote_reserved(value)),
            Filter::ILike { column, pattern } => {
                format!("{column}.ilike.{}", quote_reserved(&pattern.replace('%', "*")))
            }
            Filter::Or(inner) => format!("or({})", postgrest_or(inner)),
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Values inside logical operators must be double-quoted when they contain
/// PostgREST's reserved characters.
fn quote_reserved(value: &str) -> String {
    let reserved = |c: char| matches!(c, ',' | '.' | ':' | '(' | ')' | '"' | '\\') || c.is_whitespace();
    if value.chars().any(reserved) {
        let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
        format!("\"{escaped}\"")
    } else {
        value.to_owned()
    }
}

fn json_object(qualifier: Option<&str>, columns: &[&str]) -> String {
    let pairs: Vec<String> = columns
        .iter()
        .map(|column| match qualifier {
            Some(q) => format!("'{column}', {q}.{column}"),
            None => format!("'{column}', {column}"),
        })
        .collect();
    format!("json_object({})", pairs.join(", "))
}

fn sql_filter(table: &str, filter: &Filter, binds: &mut Vec<SqlValue>) -> String {
    match filter {
        Filter::Eq { column, value } => {
            binds.push(SqlValue::Text(value.clone()));
            format!("{table}.{column} = ?")
        }
        Filter::ILike { column, pattern } => {
            binds.push(SqlValue::Text(pattern.clone()));
            format!("{table}.{column} LIKE ?")
        }
        Filter::Or(filters) => {
            let clauses: Vec<String> = filters
                .iter()
                .map(|f| sql_filter(table, f, binds))
                .collect();
            format!("({})", clauses.join(" OR "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn param<'a>(request: &'a PostgrestRequest, name: &str) -> Vec<&'a str> {
        request
            .params
            .iter()
            .filter(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    #[test]
    fn range_is_inclusive() {
        let query = Query::table(Table::Companions).range(10, 19);
        assert_eq!(query.offset, Some(10));
        assert_eq!(query.limit, Some(10));

        let request = query.to_postgrest().unwrap();
        assert_eq!(param(&request, "offset"), vec!["10"]);
        assert_eq!(param(&request, "limit"), vec!["10"]);
        assert!(query.to_sql().unwrap().sql.ends_with("LIMIT 10 OFFSET 10"));
    }

    #[test]
    fn postgrest_filters() {
        let request = Query::table(Table::Companions)
            .filter(Filter::contains("subject", "math"))
            .or(vec![
                Filter::contains("topic", "algebra"),
                Filter::contains("name", "algebra"),
            ])
            .to_postgrest()
            .unwrap();

        assert_eq!(request.method, Method::GET);
        assert_eq!(request.path, "/rest/v1/companions");
        assert_eq!(param(&request, "select"), vec!["*"]);
        assert_eq!(param(&request, "subject"), vec!["ilike.*math*"]);
        assert_eq!(
            param(&request, "or"),
            vec!["(topic.ilike.*algebra*,name.ilike.*algebra*)"]
        );
    }

    #[test]
    fn or_values_with_reserved_characters_are_quoted() {
        let request = Query::table(Table::Companions)
            .or(vec![
                Filter::contains("topic", "a,b"),
                Filter::eq("name", "say \"hi\""),
            ])
            .to_postgrest()
            .unwrap();
        assert_eq!(
            param(&request, "or"),
            vec![r#"(topic.ilike."*a,b*",name.eq."say \"hi\"")"#]
        );
    }

    #[test]
    fn postgrest_embed_order_and_limit() {
        let request = Query::table(Table::SessionHistory)
            .select(Selection::Embed(Embed {
                alias: "companions",
                foreign_key: "companion_id",
                table: Table::Companions,
            }))
            .eq("user_id", "user_1")
            .order("created_at", false)
            .limit(5)
            .to_postgrest()
            .unwrap();

        assert_eq!(param(&request, "select"), vec!["companions:companion_id(*)"]);
        assert_eq!(param(&request, "user_id"), vec!["eq.user_1"]);
        assert_eq!(param(&request, "order"), vec!["created_at.desc"]);
        assert_eq!(param(&request, "limit"), vec!["5"]);
    }

    #[test]
    fn postgrest_insert_and_delete() {
        let row = json!({"user_id": "u", "companion_id": "c"});
        let request = Query::table(Table::Bookmarks)
            .insert(vec![row.as_object().unwrap().clone()], false)
            .to_postgrest()
            .unwrap();
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.prefer, Some("return=minimal"));
        assert_eq!(request.body, Some(json!([{"user_id": "u", "companion_id": "c"}])));

        let request = Query::table(Table::Bookmarks)
            .delete()
            .eq("companion_id", "c")
            .eq("user_id", "u")
            .to_postgrest()
            .unwrap();
        assert_eq!(request.method, Method::DELETE);
        assert_eq!(param(&request, "companion_id"), vec!["eq.c"]);
        assert_eq!(param(&request, "user_id"), vec!["eq.u"]);
    }

    #[test]
    fn unfiltered_delete_is_refused() {
        let query = Query::table(Table::Bookmarks).delete();
        assert!(matches!(query.to_postgrest(), Err(StoreError::InvalidQuery(_))));
        assert!(matches!(query.to_sql(), Err(StoreError::InvalidQuery(_))));
    }

    #[test]
    fn sql_select_with_or_filter() {
        let statement = Query::table(Table::Companions)
            .filter(Filter::contains("subject", "math"))
            .or(vec![
                Filter::contains("topic", "x"),
                Filter::contains("name", "x"),
            ])
            .to_sql()
            .unwrap();

        assert!(statement.sql.starts_with("SELECT json_object('id', companions.id"));
        assert!(statement.sql.contains(
            " WHERE companions.subject LIKE ? AND (companions.topic LIKE ? OR companions.name LIKE ?)"
        ));
        assert_eq!(
            statement.binds,
            vec![
                SqlValue::Text("%math%".into()),
                SqlValue::Text("%x%".into()),
                SqlValue::Text("%x%".into()),
            ]
        );
    }

    #[test]
    fn sql_embed_joins_on_foreign_key() {
        let statement = Query::table(Table::Bookmarks)
            .select(Selection::Embed(Embed {
                alias: "companions",
                foreign_key: "companion_id",
                table: Table::Companions,
            }))
            .eq("user_id", "u")
            .order("created_at", false)
            .to_sql()
            .unwrap();

        assert!(statement.sql.contains(
            "LEFT JOIN companions AS embedded ON embedded.id = bookmarks.companion_id"
        ));
        assert!(statement.sql.contains(
            "ORDER BY bookmarks.created_at DESC, bookmarks.rowid DESC"
        ));
    }

    #[test]
    fn sql_insert_binds_every_column_per_row() {
        let first = json!({"a": 1, "b": "x"});
        let second = json!({"b": "y", "c": true});
        let statement = Query::table(Table::Companions)
            .insert(
                vec![
                    first.as_object().unwrap().clone(),
                    second.as_object().unwrap().clone(),
                ],
                true,
            )
            .to_sql()
            .unwrap();

        assert!(statement
            .sql
            .starts_with("INSERT INTO companions (a, b, c) VALUES (?, ?, ?), (?, ?, ?) RETURNING"));
        assert_eq!(
            statement.binds,
            vec![
                SqlValue::Integer(1),
                SqlValue::Text("x".into()),
                SqlValue::Null,
                SqlValue::Null,
                SqlValue::Text("y".into()),
                SqlValue::Integer(1),
            ]
        );
    }
}
