//! Storage paths for uploaded images.

/// Replace every character outside `[A-Za-z0-9.]` with `_`.
pub fn sanitize_file_name(name: &str) -> String {
  name
    .chars()
    .map(|c| if c.is_ascii_alphanumeric() || c == '.' { c } else { '_' })
    .collect()
}

/// `{folder}/{owner}_{timestampMillis}_{index}_{sanitizedName}`
pub fn storage_path(
  folder: &str,
  owner: &str,
  timestamp_millis: i64,
  index: usize,
  file_name: &str,
) -> String {
  format!(
    "{folder}/{owner}_{timestamp_millis}_{index}_{}",
    sanitize_file_name(file_name)
  )
}
