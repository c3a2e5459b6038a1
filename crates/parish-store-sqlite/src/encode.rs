//! Encoding and decoding helpers between core types and the values stored in
//! SQLite columns, plus the SQL builder for ordered document queries.
//!
//! Timestamps are stored as fixed-precision RFC 3339 strings. Document bodies
//! and upload metadata are stored as compact JSON.

use chrono::{DateTime, Utc};
use parish_core::{
  query::{Direction, FilterOp, ListQuery, Scalar},
  record::timestamp,
  store::{StoredBlob, UploadMetadata},
};
use rusqlite::types::Value as SqlValue;

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { timestamp::format(dt) }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Scalars ─────────────────────────────────────────────────────────────────

/// `json_extract` yields JSON booleans as 0/1, so booleans bind as integers.
pub fn encode_scalar(value: &Scalar) -> SqlValue {
  match value {
    Scalar::Bool(b) => SqlValue::Integer(i64::from(*b)),
    Scalar::Integer(n) => SqlValue::Integer(*n),
    Scalar::Real(r) => SqlValue::Real(*r),
    Scalar::Text(s) => SqlValue::Text(s.clone()),
  }
}

// ─── Query builder ───────────────────────────────────────────────────────────

/// A statement plus its positional parameters.
pub struct Statement {
  pub sql:    String,
  pub params: Vec<SqlValue>,
}

/// Field paths are validated identifiers before they reach this point, so
/// inlining them into the JSON path is safe.
fn extract(field: &str) -> String { format!("json_extract(data, '$.{field}')") }

fn op_sql(op: FilterOp) -> &'static str {
  match op {
    FilterOp::Eq => "=",
    FilterOp::Lt => "<",
    FilterOp::Le => "<=",
    FilterOp::Gt => ">",
    FilterOp::Ge => ">=",
  }
}

/// Build the `SELECT id, data` statement for a validated query.
pub fn select_documents(query: &ListQuery, limit: Option<usize>) -> Statement {
  let mut conds = vec!["collection = ?".to_owned()];
  let mut params = vec![SqlValue::Text(query.collection.as_str().to_owned())];

  // Documents without an orderable value for every order key are excluded.
  for key in &query.order {
    conds.push(format!(
      "json_type(data, '$.{}') IN ('true', 'false', 'integer', 'real', \
       'text')",
      key.field
    ));
  }

  for filter in &query.filters {
    conds.push(format!("{} {} ?", extract(&filter.field), op_sql(filter.op)));
    params.push(encode_scalar(&filter.value));
  }

  // Keyset continuation: strictly after the cursor under the full ordering
  // `(k1, .., kn, id ASC)`, expanded into a disjunction of prefix matches.
  if let Some(cursor) = &query.cursor {
    let mut branches = Vec::with_capacity(query.order.len() + 1);
    for depth in 0..=query.order.len() {
      let mut branch = Vec::with_capacity(depth + 1);
      for (key, value) in query.order.iter().zip(cursor.values()).take(depth) {
        branch.push(format!("{} = ?", extract(&key.field)));
        params.push(encode_scalar(value));
      }
      match query.order.get(depth).zip(cursor.values().get(depth)) {
        Some((key, value)) => {
          let cmp = match key.direction {
            Direction::Asc => ">",
            Direction::Desc => "<",
          };
          branch.push(format!("{} {cmp} ?", extract(&key.field)));
          params.push(encode_scalar(value));
        }
        None => {
          branch.push("id > ?".to_owned());
          params.push(SqlValue::Text(cursor.id().to_owned()));
        }
      }
      branches.push(format!("({})", branch.join(" AND ")));
    }
    conds.push(format!("({})", branches.join(" OR ")));
  }

  let order = query
    .order
    .iter()
    .map(|key| {
      let dir = match key.direction {
        Direction::Asc => "ASC",
        Direction::Desc => "DESC",
      };
      format!("{} {dir}", extract(&key.field))
    })
    .chain(std::iter::once("id ASC".to_owned()))
    .collect::<Vec<_>>()
    .join(", ");

  let mut sql = format!(
    "SELECT id, data FROM documents WHERE {} ORDER BY {order}",
    conds.join(" AND ")
  );
  if let Some(limit) = limit {
    sql.push_str(" LIMIT ?");
    params.push(SqlValue::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
  }

  Statement { sql, params }
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read directly from a `blobs` row, minus the bytes.
pub struct RawBlob {
  pub path:           String,
  pub content_type:   String,
  pub size:           i64,
  pub content_hash:   String,
  pub download_token: String,
  pub metadata:       String,
  pub created_at:     String,
}

impl RawBlob {
  pub const COLUMNS: &'static str = "path, content_type, size, content_hash, \
                                     download_token, metadata, created_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      path:           row.get(0)?,
      content_type:   row.get(1)?,
      size:           row.get(2)?,
      content_hash:   row.get(3)?,
      download_token: row.get(4)?,
      metadata:       row.get(5)?,
      created_at:     row.get(6)?,
    })
  }

  pub fn into_blob(self) -> Result<StoredBlob> {
    let metadata: UploadMetadata = serde_json::from_str(&self.metadata)?;
    Ok(StoredBlob {
      path: self.path,
      content_type: self.content_type,
      size: u64::try_from(self.size).unwrap_or_default(),
      content_hash: self.content_hash,
      download_token: self.download_token,
      metadata,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

#[cfg(test)]
mod tests {
  use parish_core::{query::Cursor, record::Collection, store::Document};
  use serde_json::json;

  use super::*;

  #[test]
  fn unpaged_query_orders_by_keys_then_id() {
    let query = ListQuery::new(Collection::Sermons)
      .order_by("date", Direction::Desc)
      .filter("date", FilterOp::Ge, "2024-01-01");
    let stmt = select_documents(&query, None);
    assert!(stmt.sql.ends_with(
      "ORDER BY json_extract(data, '$.date') DESC, id ASC"
    ));
    assert_eq!(stmt.params.len(), 2);
  }

  #[test]
  fn cursor_expands_into_prefix_branches() {
    let doc = Document {
      id:   "s1".into(),
      data: json!({ "preacher": "Ruth", "date": "2024-03-03" }),
    };
    let order = ListQuery::new(Collection::Sermons)
      .order_by("preacher", Direction::Asc)
      .order_by("date", Direction::Desc);
    let cursor = Cursor::after(&doc, &order.order);
    let query = order.page_size(9).after(cursor);
    let stmt = select_documents(&query, Some(9));

    assert!(stmt.sql.contains("(json_extract(data, '$.preacher') > ?)"));
    assert!(stmt.sql.contains(
      "(json_extract(data, '$.preacher') = ? AND json_extract(data, \
       '$.date') < ?)"
    ));
    assert!(stmt.sql.contains("AND id > ?)"));
    // collection + 1 + 2 + 3 keyset params + limit
    assert_eq!(stmt.params.len(), 8);
    assert_eq!(stmt.params.last(), Some(&SqlValue::Integer(9)));
  }
}
