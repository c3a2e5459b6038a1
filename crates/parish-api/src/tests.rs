use std::{io::Cursor, path::PathBuf, time::Duration};

use axum::{
  body::{Body, to_bytes},
  http::{Request, StatusCode, header},
  response::Response,
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use parish_core::{
  record::Collection,
  session::provision_admin,
  store::{BlobStore, Credentials, DocumentStore},
};
use parish_media::MediaConfig;
use parish_store_sqlite::{DEFAULT_BASE_URL, SqliteStore};
use serde_json::{Value, json};
use tower::ServiceExt;

use super::*;

// ── Helpers ───────────────────────────────────────────────────────────────────

const ADMIN_EMAIL: &str = "admin@church.org";
const ADMIN_PASSWORD: &str = "secret1";

async fn make_state() -> AppState<SqliteStore> {
  let store = SqliteStore::open_in_memory().await.unwrap();
  provision_admin(&store, &store, ADMIN_EMAIL, ADMIN_PASSWORD)
    .await
    .unwrap();
  AppState::new(store, ServerConfig {
    host:       "127.0.0.1".to_string(),
    port:       8080,
    base_url:   DEFAULT_BASE_URL.to_string(),
    store_path: PathBuf::from(":memory:"),
    page_size:  DEFAULT_PAGE_SIZE,
    media:      MediaConfig::default(),
    session_idle_minutes: 30,
    session_days: 30,
  })
}

async fn send(
  state: &AppState<SqliteStore>,
  method: &str,
  uri: &str,
  token: Option<&str>,
  body: Option<Value>,
) -> Response {
  let mut builder = Request::builder().method(method).uri(uri);
  if let Some(token) = token {
    builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
  }
  let body = match body {
    Some(json) => {
      builder = builder.header(header::CONTENT_TYPE, "application/json");
      Body::from(json.to_string())
    }
    None => Body::empty(),
  };
  router(state.clone())
    .oneshot(builder.body(body).unwrap())
    .await
    .unwrap()
}

async fn json_body(resp: Response) -> Value {
  let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
  serde_json::from_slice(&bytes).unwrap()
}

async fn sign_in(state: &AppState<SqliteStore>, email: &str, password: &str) -> String {
  let resp = send(
    state,
    "POST",
    "/api/auth/sign-in",
    None,
    Some(json!({ "email": email, "password": password })),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::OK);
  json_body(resp).await["token"].as_str().unwrap().to_owned()
}

async fn admin_token(state: &AppState<SqliteStore>) -> String {
  sign_in(state, ADMIN_EMAIL, ADMIN_PASSWORD).await
}

fn sermon(title: &str, date: &str, video: &str) -> Value {
  json!({
    "title": title,
    "description": "A sermon",
    "youtubeUrl": video,
    "preacher": "Pastor Ruth",
    "date": date,
  })
}

async fn seed_sermons(state: &AppState<SqliteStore>, count: usize) {
  for day in 1..=count {
    state
      .backend
      .create(
        Collection::Sermons,
        json!({
          "title": format!("Sermon {day}"),
          "description": "A sermon",
          "youtubeUrl": "https://www.youtube.com/embed/dQw4w9WgXcQ",
          "preacher": "Pastor Ruth",
          "date": format!("2024-01-{day:02}"),
          "tags": [],
          "createdAt": "2024-01-01T00:00:00Z",
          "updatedAt": "2024-01-01T00:00:00Z",
        }),
      )
      .await
      .unwrap();
  }
}

fn png_upload(name: &str) -> Value {
  let img = RgbImage::from_fn(64, 48, |x, y| Rgb([(x * 3) as u8, (y * 5) as u8, 90]));
  let mut out = Cursor::new(Vec::new());
  DynamicImage::ImageRgb8(img)
    .write_to(&mut out, ImageFormat::Png)
    .unwrap();
  json!({
    "fileName": name,
    "contentType": "image/png",
    "data": STANDARD.encode(out.into_inner()),
  })
}

// ── Public listings ───────────────────────────────────────────────────────────

#[tokio::test]
async fn sermon_archive_pages_with_a_cursor() {
  let state = make_state().await;
  seed_sermons(&state, 11).await;

  let first = json_body(send(&state, "GET", "/api/sermons", None, None).await).await;
  let items = first["items"].as_array().unwrap();
  assert_eq!(items.len(), 9);
  assert_eq!(items[0]["date"], "2024-01-11");
  let cursor = first["nextCursor"].as_str().unwrap();

  let uri = format!("/api/sermons?cursor={cursor}");
  let second = json_body(send(&state, "GET", &uri, None, None).await).await;
  let items = second["items"].as_array().unwrap();
  assert_eq!(items.len(), 2);
  assert_eq!(items[1]["date"], "2024-01-01");
  assert!(second["nextCursor"].is_null());
}

#[tokio::test]
async fn sermon_archive_filters_and_searches() {
  let state = make_state().await;
  seed_sermons(&state, 11).await;

  let uri = "/api/sermons?sort=oldest&startDate=2024-01-03&endDate=2024-01-05";
  let page = json_body(send(&state, "GET", uri, None, None).await).await;
  let dates: Vec<_> = page["items"]
    .as_array()
    .unwrap()
    .iter()
    .map(|s| s["date"].as_str().unwrap().to_owned())
    .collect();
  assert_eq!(dates, ["2024-01-03", "2024-01-04", "2024-01-05"]);

  let page =
    json_body(send(&state, "GET", "/api/sermons?q=sermon%2010", None, None).await).await;
  assert_eq!(page["items"].as_array().unwrap().len(), 1);

  let resp = send(
    &state,
    "GET",
    "/api/sermons?sort=preacher&startDate=2024-01-03",
    None,
    None,
  )
  .await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn garbage_cursors_are_rejected() {
  let state = make_state().await;
  let resp = send(&state, "GET", "/api/sermons?cursor=%21%21", None, None).await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn missing_records_are_404() {
  let state = make_state().await;
  let resp = send(&state, "GET", "/api/events/nope", None, None).await;
  assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn home_shows_only_active_announcements() {
  let state = make_state().await;
  let token = admin_token(&state).await;
  for (title, active) in [("Visible", true), ("Hidden", false)] {
    let resp = send(
      &state,
      "POST",
      "/api/dashboard/announcements",
      Some(&token),
      Some(json!({
        "title": title,
        "content": "Details",
        "isActive": active,
        "startDate": "2024-06-01",
      })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
  }

  let home = json_body(send(&state, "GET", "/api/home", None, None).await).await;
  let announcements = home["announcements"].as_array().unwrap();
  assert_eq!(announcements.len(), 1);
  assert_eq!(announcements[0]["title"], "Visible");

  let admin = json_body(
    send(&state, "GET", "/api/dashboard/announcements", Some(&token), None).await,
  )
  .await;
  assert_eq!(admin["items"].as_array().unwrap().len(), 2);
}

// ── Access control ────────────────────────────────────────────────────────────

#[tokio::test]
async fn dashboard_requires_a_session() {
  let state = make_state().await;
  let resp = send(&state, "GET", "/api/dashboard", None, None).await;
  assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

  let resp = send(&state, "GET", "/api/dashboard", Some("bogus"), None).await;
  assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn plain_accounts_are_forbidden() {
  let state = make_state().await;
  let resp = send(
    &state,
    "POST",
    "/api/auth/sign-up",
    None,
    Some(json!({ "email": "member@church.org", "password": "hunter22" })),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::CREATED);
  let body = json_body(resp).await;
  assert_eq!(body["state"]["phase"], "authenticated");
  assert_eq!(body["state"]["privilege"], "unprivileged");
  let token = body["token"].as_str().unwrap();

  let resp = send(&state, "GET", "/api/dashboard", Some(token), None).await;
  assert_eq!(resp.status(), StatusCode::FORBIDDEN);
  let resp = send(
    &state,
    "POST",
    "/api/dashboard/sermons",
    Some(token),
    Some(sermon("Grace", "2024-03-03", "https://youtu.be/dQw4w9WgXcQ")),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn duplicate_sign_up_conflicts() {
  let state = make_state().await;
  let resp = send(
    &state,
    "POST",
    "/api/auth/sign-up",
    None,
    Some(json!({ "email": ADMIN_EMAIL, "password": "another1" })),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::CONFLICT);

  let resp = send(
    &state,
    "POST",
    "/api/auth/sign-in",
    None,
    Some(json!({ "email": ADMIN_EMAIL, "password": "wrong-pass" })),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn idle_session_gates_are_evicted_then_resumed() {
  let store = SqliteStore::open_in_memory().await.unwrap();
  let registry = sessions::SessionRegistry::with_idle_timeout(
    Arc::new(store),
    Duration::from_millis(100),
  );

  let first = registry.sign_up("a@b.co", "secret1").await.unwrap();
  let token = first.token().unwrap();
  assert_eq!(registry.len(), 1);

  tokio::time::sleep(Duration::from_millis(200)).await;
  registry.sign_up("c@d.co", "secret1").await.unwrap();
  assert_eq!(registry.len(), 1);

  // The backend session outlives the in-memory gate.
  let resumed = registry.resolve(token).await.unwrap();
  assert!(!Arc::ptr_eq(&resumed, &first));
  assert_eq!(
    resumed.state().principal().unwrap().uid,
    first.state().principal().unwrap().uid
  );
}

#[tokio::test]
async fn federated_sign_in_is_only_reachable_from_the_library() {
  let state = make_state().await;
  let assertion = json!({
    "provider": "google",
    "subject": "1234",
    "email": "a@gmail.com",
  });
  let resp = send(&state, "POST", "/api/auth/sign-in", None, Some(assertion)).await;
  assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
  assert!(state.sessions.is_empty());

  let gate = state
    .sessions
    .sign_in(Credentials::Federated {
      provider: "google".into(),
      subject:  "1234".into(),
      email:    Some("a@gmail.com".into()),
    })
    .await
    .unwrap();
  assert!(gate.state().principal().is_some());
}

#[tokio::test]
async fn signed_out_sessions_cannot_mutate() {
  let state = make_state().await;
  let token = admin_token(&state).await;

  let session =
    json_body(send(&state, "GET", "/api/auth/session", Some(&token), None).await).await;
  assert_eq!(session["privilege"], "privileged");

  let resp = send(&state, "POST", "/api/auth/sign-out", Some(&token), None).await;
  assert_eq!(resp.status(), StatusCode::NO_CONTENT);
  assert!(state.sessions.is_empty());

  let resp = send(
    &state,
    "POST",
    "/api/dashboard/sermons",
    Some(&token),
    Some(sermon("Grace", "2024-03-03", "https://youtu.be/dQw4w9WgXcQ")),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn revoked_admins_are_refused_on_the_next_mutation() {
  let state = make_state().await;
  let token = admin_token(&state).await;

  let (uid, _) = state
    .backend
    .query(
      &parish_core::query::ListQuery::new(Collection::Users)
        .order_by("email", parish_core::query::Direction::Asc),
      None,
    )
    .await
    .unwrap()
    .into_iter()
    .map(|doc| (doc.id, doc.data))
    .next()
    .unwrap();
  state
    .backend
    .update(Collection::Users, &uid, json!({ "isAdmin": false }))
    .await
    .unwrap();

  let resp = send(
    &state,
    "POST",
    "/api/dashboard/sermons",
    Some(&token),
    Some(sermon("Grace", "2024-03-03", "https://youtu.be/dQw4w9WgXcQ")),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::FORBIDDEN);
  assert_eq!(state.backend.count(Collection::Sermons).await.unwrap(), 0);
}

// ── Sermons ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn sermon_links_are_stored_in_embed_form() {
  let state = make_state().await;
  let token = admin_token(&state).await;

  for (index, link) in [
    "https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=10s",
    "https://youtu.be/dQw4w9WgXcQ",
    "https://www.youtube.com/live/dQw4w9WgXcQ?feature=share",
    "dQw4w9WgXcQ",
  ]
  .into_iter()
  .enumerate()
  {
    let resp = send(
      &state,
      "POST",
      "/api/dashboard/sermons",
      Some(&token),
      Some(sermon(&format!("Sermon {index}"), "2024-03-03", link)),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED, "{link}");
    let saved = json_body(resp).await;
    assert_eq!(
      saved["record"]["youtubeUrl"],
      "https://www.youtube.com/embed/dQw4w9WgXcQ",
      "{link}"
    );
    assert_eq!(saved["page"]["items"].as_array().unwrap().len(), index + 1);
  }
}

#[tokio::test]
async fn clip_links_are_rejected_without_writing() {
  let state = make_state().await;
  let token = admin_token(&state).await;

  let resp = send(
    &state,
    "POST",
    "/api/dashboard/sermons",
    Some(&token),
    Some(sermon("Clip", "2024-03-03", "https://youtube.com/clip/UgkxAbCdEfGh")),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  let body = json_body(resp).await;
  assert!(body["error"].as_str().unwrap().contains("clip"));
  assert_eq!(state.backend.count(Collection::Sermons).await.unwrap(), 0);
}

#[tokio::test]
async fn updates_keep_the_creation_time() {
  let state = make_state().await;
  let token = admin_token(&state).await;

  let created = json_body(
    send(
      &state,
      "POST",
      "/api/dashboard/sermons",
      Some(&token),
      Some(sermon("Grace", "2024-03-03", "https://youtu.be/dQw4w9WgXcQ")),
    )
    .await,
  )
  .await;
  let id = created["record"]["id"].as_str().unwrap();

  let resp = send(
    &state,
    "PUT",
    &format!("/api/dashboard/sermons/{id}"),
    Some(&token),
    Some(sermon("Amazing Grace", "2024-03-03", "https://youtu.be/dQw4w9WgXcQ")),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::OK);
  let updated = json_body(resp).await;
  assert_eq!(updated["record"]["title"], "Amazing Grace");
  assert_eq!(updated["record"]["createdAt"], created["record"]["createdAt"]);

  let resp = send(
    &state,
    "PUT",
    "/api/dashboard/sermons/missing",
    Some(&token),
    Some(sermon("Nope", "2024-03-03", "https://youtu.be/dQw4w9WgXcQ")),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn deletion_needs_confirmation() {
  let state = make_state().await;
  let token = admin_token(&state).await;
  seed_sermons(&state, 3).await;
  let page = json_body(
    send(&state, "GET", "/api/dashboard/sermons", Some(&token), None).await,
  )
  .await;
  let ids: Vec<String> = page["items"]
    .as_array()
    .unwrap()
    .iter()
    .map(|s| s["id"].as_str().unwrap().to_owned())
    .collect();

  let uri = format!("/api/dashboard/sermons/{}", ids[0]);
  let resp = send(&state, "DELETE", &uri, Some(&token), None).await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

  let resp = send(&state, "DELETE", &format!("{uri}?confirm=true"), Some(&token), None).await;
  assert_eq!(resp.status(), StatusCode::NO_CONTENT);

  let resp = send(
    &state,
    "POST",
    "/api/dashboard/sermons/batch-delete",
    Some(&token),
    Some(json!({ "ids": [ids[1], ids[2], "unknown"], "confirm": true })),
  )
  .await;
  assert_eq!(json_body(resp).await["deleted"], 2);
  assert_eq!(state.backend.count(Collection::Sermons).await.unwrap(), 0);
}

// ── Events and media ──────────────────────────────────────────────────────────

#[tokio::test]
async fn event_images_are_uploaded_and_served() {
  let state = make_state().await;
  let token = admin_token(&state).await;

  let resp = send(
    &state,
    "POST",
    "/api/dashboard/events",
    Some(&token),
    Some(json!({
      "title": "Retreat",
      "description": "Weekend away",
      "date": "22-27 SEPT 2025",
      "images": [png_upload("front door.png"), png_upload("hall.png")],
    })),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::CREATED);
  let saved = json_body(resp).await;
  let urls = saved["record"]["imageUrls"].as_array().unwrap();
  assert_eq!(urls.len(), 2);

  let url = urls[0].as_str().unwrap();
  let local = url.strip_prefix(DEFAULT_BASE_URL).unwrap();
  let resp = send(&state, "GET", local, None, None).await;
  assert_eq!(resp.status(), StatusCode::OK);
  assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/png");

  let (path, _) = local.split_once('?').unwrap();
  let resp = send(&state, "GET", &format!("{path}?token=wrong"), None, None).await;
  assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn too_many_images_are_refused_whole() {
  let state = make_state().await;
  let token = admin_token(&state).await;
  let images: Vec<_> = (0..6).map(|i| png_upload(&format!("{i}.png"))).collect();

  let resp = send(
    &state,
    "POST",
    "/api/dashboard/events",
    Some(&token),
    Some(json!({
      "title": "Retreat",
      "description": "Weekend away",
      "date": "Soon",
      "images": images,
    })),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  assert_eq!(state.backend.count(Collection::Events).await.unwrap(), 0);
  assert_eq!(state.backend.blob_count().await.unwrap(), 0);
}

#[tokio::test]
async fn replacing_event_images_releases_the_old_ones() {
  let state = make_state().await;
  let token = admin_token(&state).await;

  let created = json_body(
    send(
      &state,
      "POST",
      "/api/dashboard/events",
      Some(&token),
      Some(json!({
        "title": "Retreat",
        "description": "Weekend away",
        "date": "Soon",
        "images": [png_upload("old.png")],
      })),
    )
    .await,
  )
  .await;
  let id = created["record"]["id"].as_str().unwrap();
  let old = created["record"]["imageUrls"][0].as_str().unwrap().to_owned();

  // No new images: the stored ones stay.
  let kept = json_body(
    send(
      &state,
      "PUT",
      &format!("/api/dashboard/events/{id}"),
      Some(&token),
      Some(json!({ "title": "Retreat", "description": "Updated", "date": "Soon" })),
    )
    .await,
  )
  .await;
  assert_eq!(kept["record"]["imageUrls"][0], old.as_str());

  let replaced = json_body(
    send(
      &state,
      "PUT",
      &format!("/api/dashboard/events/{id}"),
      Some(&token),
      Some(json!({
        "title": "Retreat",
        "description": "Updated",
        "date": "Soon",
        "images": [png_upload("new.png")],
      })),
    )
    .await,
  )
  .await;
  assert_ne!(replaced["record"]["imageUrls"][0], old.as_str());

  let old_path = state.backend.resolve_reference(&old).unwrap();
  assert!(
    BlobStore::get(state.backend.as_ref(), &old_path)
      .await
      .unwrap()
      .is_none()
  );

  let resp = send(
    &state,
    "DELETE",
    &format!("/api/dashboard/events/{id}?confirm=true"),
    Some(&token),
    None,
  )
  .await;
  assert_eq!(resp.status(), StatusCode::OK);
  let outcome = json_body(resp).await;
  assert_eq!(outcome["deleted"], 1);
  assert!(outcome["orphanedImages"].as_array().unwrap().is_empty());
}

// ── Dashboard ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn dashboard_stats_summarise_the_collections() {
  let state = make_state().await;
  let token = admin_token(&state).await;
  seed_sermons(&state, 4).await;

  let stats = json_body(send(&state, "GET", "/api/dashboard", Some(&token), None).await).await;
  assert_eq!(stats["sermons"], 4);
  assert_eq!(stats["events"], 0);
  assert_eq!(stats["recentSermon"]["title"], "Sermon 4");
  assert_eq!(stats["recentSermon"]["date"], "2024-01-04");
  assert!(stats["upcomingEvent"].is_null());
}
