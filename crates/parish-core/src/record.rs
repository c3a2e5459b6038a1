//! Domain records — the document shapes stored in each collection.
//!
//! Records are plain values. Field names on the wire are camelCase and match
//! the documents the site has always written, so existing data decodes
//! without migration.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{Error, Result, store::Document};

/// Upper bound on images attached to a single event.
pub const MAX_EVENT_IMAGES: usize = 5;

// ─── Collections ─────────────────────────────────────────────────────────────

/// The document collections. Names are the wire contract.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Collection {
  Sermons,
  Events,
  Announcements,
  Users,
}

impl Collection {
  pub fn as_str(self) -> &'static str { self.into() }
}

// ─── Timestamps ──────────────────────────────────────────────────────────────

/// RFC 3339 timestamps with fixed microsecond precision.
///
/// Fixed precision keeps lexicographic order equal to chronological order,
/// which is what the document store sorts on.
pub mod timestamp {
  use chrono::{DateTime, SecondsFormat, Utc};
  use serde::{Deserialize, Deserializer, Serializer};

  pub fn format(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
  }

  pub fn serialize<S: Serializer>(
    dt: &DateTime<Utc>,
    s: S,
  ) -> Result<S::Ok, S::Error> {
    s.serialize_str(&format(*dt))
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(
    d: D,
  ) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(d)?;
    DateTime::parse_from_rfc3339(&raw)
      .map(|dt| dt.with_timezone(&Utc))
      .map_err(serde::de::Error::custom)
  }
}

/// Parse a `YYYY-MM-DD` calendar date, naming `field` in the error.
pub fn parse_calendar_date(
  field: &'static str,
  value: &str,
) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| {
    Error::InvalidDate {
      field,
      value: value.to_owned(),
    }
  })
}

/// Trim `value` and reject it if nothing is left.
pub fn required(field: &'static str, value: &str) -> Result<String> {
  let trimmed = value.trim();
  if trimmed.is_empty() {
    return Err(Error::MissingField(field));
  }
  Ok(trimmed.to_owned())
}

// ─── Record trait ────────────────────────────────────────────────────────────

/// A typed view over the documents of one collection.
///
/// The document id lives outside the document body, so it is stripped on
/// encode and injected on decode.
pub trait Record: Serialize + DeserializeOwned + Send + Sync + 'static {
  const COLLECTION: Collection;

  fn id(&self) -> &str;

  /// Document body for this record, without the `id` key.
  fn to_data(&self) -> Result<Value> {
    let mut value = serde_json::to_value(self)?;
    if let Some(obj) = value.as_object_mut() {
      obj.remove("id");
    }
    Ok(value)
  }

  fn from_document(doc: Document) -> Result<Self> {
    let Document { id, mut data } = doc;
    if let Some(obj) = data.as_object_mut() {
      obj.insert("id".to_owned(), Value::String(id.clone()));
    }
    serde_json::from_value(data).map_err(|source| Error::Decode {
      collection: Self::COLLECTION.as_str(),
      id,
      source,
    })
  }
}

/// Records that take part in the local free-text search.
pub trait Searchable {
  /// The text fields examined by [`crate::listing::local_search`].
  fn search_fields(&self) -> Vec<&str>;

  /// Case-insensitive substring match; `needle` must already be lowercase.
  fn matches(&self, needle: &str) -> bool {
    self
      .search_fields()
      .iter()
      .any(|field| field.to_lowercase().contains(needle))
  }
}

// ─── Sermon ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sermon {
  pub id:          String,
  pub title:       String,
  pub description: String,
  /// Always the canonical embed URL produced by
  /// [`crate::video::VideoRef::embed_url`].
  #[serde(rename = "youtubeUrl")]
  pub video_url:   String,
  pub preacher:    String,
  /// Calendar date, `YYYY-MM-DD`.
  pub date:        String,
  #[serde(default)]
  pub tags:        Vec<String>,
  #[serde(with = "timestamp")]
  pub created_at:  DateTime<Utc>,
  #[serde(with = "timestamp")]
  pub updated_at:  DateTime<Utc>,
}

impl Record for Sermon {
  const COLLECTION: Collection = Collection::Sermons;

  fn id(&self) -> &str { &self.id }
}

impl Searchable for Sermon {
  fn search_fields(&self) -> Vec<&str> {
    vec![&self.title, &self.preacher, &self.description]
  }
}

// ─── Event ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
  pub id:          String,
  pub title:       String,
  pub description: String,
  /// Free-text label, e.g. `"22-27 SEPT 2025"`.
  pub date:        String,
  /// Download URLs of the attached images; at most [`MAX_EVENT_IMAGES`].
  #[serde(default)]
  pub image_urls:  Vec<String>,
  #[serde(with = "timestamp")]
  pub created_at:  DateTime<Utc>,
  #[serde(with = "timestamp")]
  pub updated_at:  DateTime<Utc>,
}

impl Record for Event {
  const COLLECTION: Collection = Collection::Events;

  fn id(&self) -> &str { &self.id }
}

impl Searchable for Event {
  fn search_fields(&self) -> Vec<&str> {
    vec![&self.title, &self.description]
  }
}

// ─── Announcement ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Announcement {
  pub id:         String,
  pub title:      String,
  pub content:    String,
  pub is_active:  bool,
  pub start_date: String,
  /// Not checked against `start_date`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub end_date:   Option<String>,
  #[serde(with = "timestamp")]
  pub created_at: DateTime<Utc>,
  #[serde(with = "timestamp")]
  pub updated_at: DateTime<Utc>,
}

impl Record for Announcement {
  const COLLECTION: Collection = Collection::Announcements;

  fn id(&self) -> &str { &self.id }
}

impl Searchable for Announcement {
  fn search_fields(&self) -> Vec<&str> { vec![&self.title, &self.content] }
}

// ─── UserRole ────────────────────────────────────────────────────────────────

/// The role record for one identity, keyed by uid. A missing record means
/// the identity is not privileged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRole {
  pub id:         String,
  #[serde(default)]
  pub email:      Option<String>,
  #[serde(default)]
  pub is_admin:   bool,
  #[serde(default)]
  pub created_at: Option<String>,
}

impl Record for UserRole {
  const COLLECTION: Collection = Collection::Users;

  fn id(&self) -> &str { &self.id }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;
  use serde_json::json;

  use super::*;

  fn sermon() -> Sermon {
    let at = Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap();
    Sermon {
      id:          "abc".into(),
      title:       "Grace".into(),
      description: "On grace".into(),
      video_url:   "https://www.youtube.com/embed/dQw4w9WgXcQ".into(),
      preacher:    "Evangelist Ade".into(),
      date:        "2024-05-01".into(),
      tags:        vec![],
      created_at:  at,
      updated_at:  at,
    }
  }

  #[test]
  fn to_data_strips_id_and_uses_wire_names() {
    let data = sermon().to_data().unwrap();
    assert!(data.get("id").is_none());
    assert_eq!(
      data["youtubeUrl"],
      json!("https://www.youtube.com/embed/dQw4w9WgXcQ")
    );
    assert_eq!(data["createdAt"], json!("2024-05-01T09:30:00.000000Z"));
  }

  #[test]
  fn from_document_injects_id() {
    let data = sermon().to_data().unwrap();
    let decoded = Sermon::from_document(Document {
      id: "xyz".into(),
      data,
    })
    .unwrap();
    assert_eq!(decoded.id, "xyz");
    assert_eq!(decoded.title, "Grace");
  }

  #[test]
  fn undecodable_document_names_collection_and_id() {
    let err = Event::from_document(Document {
      id:   "e1".into(),
      data: json!({ "title": 4 }),
    })
    .unwrap_err();
    assert!(matches!(
      err,
      Error::Decode { collection: "events", ref id, .. } if id == "e1"
    ));
  }

  #[test]
  fn role_defaults_to_unprivileged() {
    let role = UserRole::from_document(Document {
      id:   "u1".into(),
      data: json!({ "email": "a@b.c" }),
    })
    .unwrap();
    assert!(!role.is_admin);
  }

  #[test]
  fn search_is_case_insensitive() {
    assert!(sermon().matches("ade"));
    assert!(sermon().matches("grace"));
    assert!(!sermon().matches("mercy"));
  }

  #[test]
  fn calendar_dates_are_validated() {
    assert!(parse_calendar_date("date", "2024-02-29").is_ok());
    assert!(matches!(
      parse_calendar_date("date", "29/02/2024"),
      Err(Error::InvalidDate { field: "date", .. })
    ));
  }

  #[test]
  fn collection_names_are_lowercase() {
    assert_eq!(Collection::Announcements.as_str(), "announcements");
    assert_eq!(
      "sermons".parse::<Collection>().unwrap(),
      Collection::Sermons
    );
  }
}
