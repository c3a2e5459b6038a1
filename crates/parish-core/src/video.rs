//! YouTube reference normalization.
//!
//! Sermon videos are stored only in the canonical embed form
//! `https://www.youtube.com/embed/{id}`, whatever shape the admin pasted.
//! Accepted inputs:
//!
//! - `https://www.youtube.com/watch?v={id}&...`
//! - `https://youtu.be/{id}?si=...`
//! - `https://www.youtube.com/embed/{id}`
//! - a bare 11-character video id
//!
//! `youtube.com/clip/...` share links are rejected: a clip id is not a video
//! id and cannot be embedded.

use std::fmt;

use crate::{Error, Result};

const EMBED_PREFIX: &str = "https://www.youtube.com/embed/";
const VIDEO_ID_LEN: usize = 11;

/// A validated YouTube video id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VideoRef {
  id: String,
}

impl VideoRef {
  /// Extract the video id from any supported reference shape.
  pub fn parse(input: &str) -> Result<Self> {
    let raw = input.trim();
    let invalid = || Error::InvalidVideoReference(raw.to_owned());

    if raw.is_empty() {
      return Err(Error::MissingField("youtubeUrl"));
    }
    if is_video_id(raw) {
      return Ok(Self { id: raw.to_owned() });
    }

    let without_scheme = raw
      .strip_prefix("https://")
      .or_else(|| raw.strip_prefix("http://"))
      .unwrap_or(raw);
    let without_fragment = without_scheme
      .split_once('#')
      .map_or(without_scheme, |(before, _)| before);
    let (host, rest) = without_fragment
      .split_once('/')
      .unwrap_or((without_fragment, ""));
    let (path, query) = rest.split_once('?').unwrap_or((rest, ""));

    let host = host.to_ascii_lowercase();
    let host = host
      .strip_prefix("www.")
      .or_else(|| host.strip_prefix("m."))
      .unwrap_or(&host);

    let candidate = match host {
      "youtu.be" => first_segment(path),
      "youtube.com" | "youtube-nocookie.com" | "music.youtube.com" => {
        if path.starts_with("clip/") {
          return Err(Error::UnsupportedClipLink(raw.to_owned()));
        }
        if path == "watch" || path == "watch/" {
          query_param(query, "v")
        } else if let Some(tail) = path
          .strip_prefix("embed/")
          .or_else(|| path.strip_prefix("shorts/"))
          .or_else(|| path.strip_prefix("live/"))
          .or_else(|| path.strip_prefix("v/"))
        {
          first_segment(tail)
        } else {
          None
        }
      }
      _ => None,
    };

    match candidate {
      Some(id) if is_video_id(id) => Ok(Self { id: id.to_owned() }),
      _ => Err(invalid()),
    }
  }

  pub fn id(&self) -> &str { &self.id }

  /// The canonical embeddable form stored on sermons.
  pub fn embed_url(&self) -> String { format!("{EMBED_PREFIX}{}", self.id) }
}

impl fmt::Display for VideoRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.embed_url())
  }
}

/// Normalize any supported reference to the canonical embed URL.
pub fn normalize_youtube(input: &str) -> Result<String> {
  VideoRef::parse(input).map(|video| video.embed_url())
}

fn is_video_id(s: &str) -> bool {
  s.len() == VIDEO_ID_LEN
    && s
      .bytes()
      .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

fn first_segment(path: &str) -> Option<&str> {
  path.split('/').next().filter(|s| !s.is_empty())
}

fn query_param<'a>(query: &'a str, key: &str) -> Option<&'a str> {
  query
    .split('&')
    .filter_map(|pair| pair.split_once('='))
    .find(|(k, _)| *k == key)
    .map(|(_, v)| v)
}
