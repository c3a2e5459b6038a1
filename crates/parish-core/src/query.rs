//! Query, cursor and page types for the list/filter/paginate engine.
//!
//! A [`ListQuery`] names one collection, a sequence of order keys, a set of
//! conjunctive filters, a page size and an optional continuation [`Cursor`].
//! Backends receive only queries that passed [`ListQuery::validate`].

use std::collections::HashSet;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::{Error, Result, record::Collection, store::Document};

/// Page size used when a caller does not ask for one.
pub const DEFAULT_PAGE_SIZE: usize = 9;

/// Largest page a single query may request.
pub const MAX_PAGE_SIZE: usize = 100;

// ─── Field paths ─────────────────────────────────────────────────────────────

/// Top-level document fields are plain identifiers (`date`, `startDate`).
/// Backends may rely on this when building their native query text.
pub fn validate_field_path(field: &str) -> Result<()> {
  let mut chars = field.chars();
  let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
    && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
  if valid {
    Ok(())
  } else {
    Err(Error::InvalidFieldPath(field.to_owned()))
  }
}

// ─── Scalars ─────────────────────────────────────────────────────────────────

/// A comparable field value: the only kind of value filters and cursors
/// carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
  Bool(bool),
  Integer(i64),
  Real(f64),
  Text(String),
}

impl Scalar {
  /// Convert a JSON field value; arrays, objects and null are not orderable.
  pub fn from_json(value: &Value) -> Option<Self> {
    match value {
      Value::Bool(b) => Some(Self::Bool(*b)),
      Value::Number(n) => n
        .as_i64()
        .map(Self::Integer)
        .or_else(|| n.as_f64().map(Self::Real)),
      Value::String(s) => Some(Self::Text(s.clone())),
      Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
  }
}

impl From<&str> for Scalar {
  fn from(s: &str) -> Self { Self::Text(s.to_owned()) }
}

impl From<String> for Scalar {
  fn from(s: String) -> Self { Self::Text(s) }
}

impl From<bool> for Scalar {
  fn from(b: bool) -> Self { Self::Bool(b) }
}

impl From<i64> for Scalar {
  fn from(n: i64) -> Self { Self::Integer(n) }
}

// ─── Ordering and filters ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
  Asc,
  Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderKey {
  pub field:     String,
  pub direction: Direction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
  Eq,
  Lt,
  Le,
  Gt,
  Ge,
}

impl FilterOp {
  /// Range operators constrain where the field may appear in the ordering.
  pub fn is_range(self) -> bool { !matches!(self, Self::Eq) }
}

/// One conjunctive predicate on a single field.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
  pub field: String,
  pub op:    FilterOp,
  pub value: Scalar,
}

// ─── Cursor ──────────────────────────────────────────────────────────────────

/// Opaque continuation token: the order-key values and id of the last
/// document on the previous page.
///
/// Continuation is by value, not by position, so a cursor whose document was
/// deleted in the meantime still resumes after where that document sorted.
#[derive(Debug, Clone, PartialEq)]
pub struct Cursor {
  values: Vec<Scalar>,
  id:     String,
}

#[derive(Serialize, Deserialize)]
struct CursorBody {
  v:  Vec<Scalar>,
  id: String,
}

impl Cursor {
  /// Build the cursor that continues after `doc` under `order`.
  ///
  /// Returns `None` if `doc` lacks one of the order fields; such documents
  /// never appear in ordered results.
  pub fn after(doc: &Document, order: &[OrderKey]) -> Option<Self> {
    let values = order
      .iter()
      .map(|key| doc.field(&key.field).and_then(Scalar::from_json))
      .collect::<Option<Vec<_>>>()?;
    Some(Self {
      values,
      id: doc.id.clone(),
    })
  }

  pub fn values(&self) -> &[Scalar] { &self.values }

  pub fn id(&self) -> &str { &self.id }

  pub fn encode(&self) -> String {
    let body = CursorBody {
      v:  self.values.clone(),
      id: self.id.clone(),
    };
    // Serialising plain scalars and a string cannot fail.
    let json = serde_json::to_vec(&body).unwrap_or_default();
    URL_SAFE_NO_PAD.encode(json)
  }

  pub fn decode(token: &str) -> Result<Self> {
    let bytes = URL_SAFE_NO_PAD
      .decode(token.trim())
      .map_err(|_| Error::InvalidCursor)?;
    let body: CursorBody =
      serde_json::from_slice(&bytes).map_err(|_| Error::InvalidCursor)?;
    Ok(Self {
      values: body.v,
      id:     body.id,
    })
  }
}

impl Serialize for Cursor {
  fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&self.encode())
  }
}

impl<'de> Deserialize<'de> for Cursor {
  fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
    let token = String::deserialize(d)?;
    Self::decode(&token).map_err(serde::de::Error::custom)
  }
}

// ─── ListQuery ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct ListQuery {
  pub collection: Collection,
  /// Order keys in priority order. The document id is always appended by the
  /// backend as a final ascending tie-break.
  pub order:      Vec<OrderKey>,
  pub filters:    Vec<Filter>,
  pub page_size:  usize,
  pub cursor:     Option<Cursor>,
}

impl ListQuery {
  pub fn new(collection: Collection) -> Self {
    Self {
      collection,
      order: Vec::new(),
      filters: Vec::new(),
      page_size: DEFAULT_PAGE_SIZE,
      cursor: None,
    }
  }

  pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
    self.order.push(OrderKey {
      field: field.to_owned(),
      direction,
    });
    self
  }

  pub fn filter(
    mut self,
    field: &str,
    op: FilterOp,
    value: impl Into<Scalar>,
  ) -> Self {
    self.filters.push(Filter {
      field: field.to_owned(),
      op,
      value: value.into(),
    });
    self
  }

  pub fn page_size(mut self, page_size: usize) -> Self {
    self.page_size = page_size;
    self
  }

  pub fn after(mut self, cursor: Option<Cursor>) -> Self {
    self.cursor = cursor;
    self
  }

  /// Check the query shape before it reaches a backend.
  ///
  /// Every range-filtered field must be an order key, and those keys must
  /// come before any key that is only sorted on.
  pub fn validate(&self) -> Result<()> {
    if self.order.is_empty() {
      return Err(Error::InvalidQuery(
        "at least one order key is required".into(),
      ));
    }
    if !(1..=MAX_PAGE_SIZE).contains(&self.page_size) {
      return Err(Error::InvalidQuery(format!(
        "page size must be between 1 and {MAX_PAGE_SIZE}"
      )));
    }

    let mut seen = HashSet::new();
    for key in &self.order {
      validate_field_path(&key.field)?;
      if !seen.insert(key.field.as_str()) {
        return Err(Error::InvalidQuery(format!(
          "field `{}` appears twice in the ordering",
          key.field
        )));
      }
    }

    let mut range_fields = HashSet::new();
    for filter in &self.filters {
      validate_field_path(&filter.field)?;
      if filter.op.is_range() {
        range_fields.insert(filter.field.as_str());
      }
    }
    for field in &range_fields {
      if !seen.contains(field) {
        return Err(Error::InvalidQuery(format!(
          "field `{field}` has a range filter and must also be an order key"
        )));
      }
    }
    for (position, key) in self.order.iter().enumerate() {
      if range_fields.contains(key.field.as_str())
        && position >= range_fields.len()
      {
        return Err(Error::InvalidQuery(format!(
          "range-filtered field `{}` must be ordered before sort-only fields",
          key.field
        )));
      }
    }

    if let Some(cursor) = &self.cursor
      && cursor.values.len() != self.order.len()
    {
      return Err(Error::InvalidCursor);
    }
    Ok(())
  }
}

// ─── Page ────────────────────────────────────────────────────────────────────

/// One page of results. `next_cursor` is `None` iff the page came back
/// shorter than the requested page size.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
  pub items:       Vec<T>,
  pub next_cursor: Option<Cursor>,
}

impl<T> Page<T> {
  pub fn has_more(&self) -> bool { self.next_cursor.is_some() }

  pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
    Page {
      items:       self.items.into_iter().map(f).collect(),
      next_cursor: self.next_cursor,
    }
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  fn sermons() -> ListQuery { ListQuery::new(Collection::Sermons) }

  #[test]
  fn cursor_token_is_opaque_and_decodable() {
    let doc = Document {
      id:   "s1".into(),
      data: json!({ "date": "2024-01-07", "preacher": "Ade" }),
    };
    let order = vec![
      OrderKey {
        field:     "preacher".into(),
        direction: Direction::Asc,
      },
      OrderKey {
        field:     "date".into(),
        direction: Direction::Desc,
      },
    ];
    let cursor = Cursor::after(&doc, &order).unwrap();
    let token = cursor.encode();
    assert!(!token.contains('{'));
    let decoded = Cursor::decode(&token).unwrap();
    assert_eq!(decoded.id(), "s1");
    assert_eq!(decoded.values(), &[
      Scalar::from("Ade"),
      Scalar::from("2024-01-07")
    ]);
  }

  #[test]
  fn cursor_requires_every_order_field() {
    let doc = Document {
      id:   "s1".into(),
      data: json!({ "title": "x" }),
    };
    let order = vec![OrderKey {
      field:     "date".into(),
      direction: Direction::Desc,
    }];
    assert!(Cursor::after(&doc, &order).is_none());
  }

  #[test]
  fn garbage_cursor_is_rejected() {
    assert!(matches!(
      Cursor::decode("not*base64"),
      Err(Error::InvalidCursor)
    ));
    assert!(matches!(
      Cursor::decode(&URL_SAFE_NO_PAD.encode(b"[1,2]")),
      Err(Error::InvalidCursor)
    ));
  }

  #[test]
  fn ordering_is_required() {
    assert!(matches!(sermons().validate(), Err(Error::InvalidQuery(_))));
  }

  #[test]
  fn page_size_is_bounded() {
    let q = sermons().order_by("date", Direction::Desc);
    assert!(q.clone().page_size(0).validate().is_err());
    assert!(q.clone().page_size(MAX_PAGE_SIZE + 1).validate().is_err());
    assert!(q.page_size(MAX_PAGE_SIZE).validate().is_ok());
  }

  #[test]
  fn field_paths_must_be_identifiers() {
    let q = sermons().order_by("date') --", Direction::Desc);
    assert!(matches!(q.validate(), Err(Error::InvalidFieldPath(_))));
  }

  #[test]
  fn range_filter_on_sort_only_field_is_rejected() {
    let q = sermons()
      .filter("date", FilterOp::Ge, "2024-01-01")
      .order_by("preacher", Direction::Asc);
    assert!(matches!(q.validate(), Err(Error::InvalidQuery(_))));
  }

  #[test]
  fn range_filtered_key_must_lead_the_ordering() {
    let late = sermons()
      .filter("date", FilterOp::Ge, "2024-01-01")
      .order_by("preacher", Direction::Asc)
      .order_by("date", Direction::Desc);
    assert!(matches!(late.validate(), Err(Error::InvalidQuery(_))));

    let leading = sermons()
      .filter("date", FilterOp::Ge, "2024-01-01")
      .filter("date", FilterOp::Le, "2024-12-31")
      .order_by("date", Direction::Desc)
      .order_by("preacher", Direction::Asc);
    assert!(leading.validate().is_ok());
  }

  #[test]
  fn equality_filters_do_not_constrain_ordering() {
    let q = ListQuery::new(Collection::Announcements)
      .filter("isActive", FilterOp::Eq, true)
      .order_by("startDate", Direction::Desc);
    assert!(q.validate().is_ok());
  }

  #[test]
  fn cursor_shape_must_match_ordering() {
    let doc = Document {
      id:   "s1".into(),
      data: json!({ "date": "2024-01-07" }),
    };
    let one_key = vec![OrderKey {
      field:     "date".into(),
      direction: Direction::Desc,
    }];
    let cursor = Cursor::after(&doc, &one_key);
    let q = sermons()
      .order_by("preacher", Direction::Asc)
      .order_by("date", Direction::Desc)
      .after(cursor);
    assert!(matches!(q.validate(), Err(Error::InvalidCursor)));
  }
}
