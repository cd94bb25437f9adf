use std::sync::Arc;

use atlas_store_sqlite::SqliteStore;
use axum::{
  Router,
  body::Body,
  http::{Request, StatusCode, header},
};
use serde_json::{Value, json};
use tower::ServiceExt as _;
use uuid::Uuid;

use crate::api_router;

async fn app() -> Router {
  let store = SqliteStore::open_in_memory().await.unwrap();
  api_router(Arc::new(store))
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
  let builder = Request::builder().method(method).uri(uri);
  let req = match body {
    Some(body) => builder
      .header(header::CONTENT_TYPE, "application/json")
      .body(Body::from(body.to_string()))
      .unwrap(),
    None => builder.body(Body::empty()).unwrap(),
  };
  let resp = app.clone().oneshot(req).await.unwrap();
  let status = resp.status();
  let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
    .await
    .unwrap();
  let value = if bytes.is_empty() {
    Value::Null
  } else {
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
  };
  (status, value)
}

fn id(value: &Value, field: &str) -> String {
  value[field].as_str().unwrap().to_string()
}

async fn create_tag(app: &Router, tag: Value) -> String {
  let (status, body) = send(app, "POST", "/tags", Some(tag)).await;
  assert_eq!(status, StatusCode::CREATED, "{body}");
  id(&body, "tag_id")
}

/// A summary dated by its own TIME tag. Returns `(summary_id, time_tag_id)`.
async fn dated_summary(app: &Router, year: i64) -> (String, String) {
  let (status, summary) = send(
    app,
    "POST",
    "/summaries",
    Some(json!({ "text": format!("something in {year}") })),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED);
  let summary_id = id(&summary, "summary_id");

  let time_id = create_tag(
    app,
    json!({
      "type": "TIME",
      "data": {
        "name": year.to_string(),
        "datetime": format!("+{year:04}-00-00T00:00:00Z"),
        "calendar_model": "http://www.wikidata.org/entity/Q1985727",
        "precision": 9
      }
    }),
  )
  .await;
  let (status, _) = send(
    app,
    "POST",
    "/tag-instances",
    Some(json!({ "tag_id": time_id, "summary_id": summary_id, "start_char": 0, "stop_char": 4 })),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED);
  (summary_id, time_id)
}

fn person() -> Value {
  json!({ "type": "PERSON", "data": { "names": ["Ibn Battuta"] } })
}

#[tokio::test]
async fn create_and_get_tag() {
  let app = app().await;
  let tag_id = create_tag(&app, person()).await;

  let (status, body) = send(&app, "GET", &format!("/tags/{tag_id}"), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["value"]["type"], "PERSON");

  let (status, body) = send(&app, "GET", "/tags?kind=PERSON", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn missing_tag_is_404_json() {
  let app = app().await;
  let (status, body) = send(&app, "GET", &format!("/tags/{}", Uuid::new_v4()), None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
  assert!(body["error"].as_str().unwrap().contains("not found"));

  let (status, _) = send(&app, "GET", &format!("/tags/{}/story", Uuid::new_v4()), None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn tag_instance_gets_story_order() {
  let app = app().await;
  let person_id = create_tag(&app, person()).await;
  let (late, _) = dated_summary(&app, 1354).await;
  let (early, _) = dated_summary(&app, 1325).await;

  for summary_id in [&late, &early] {
    let (status, body) = send(
      &app,
      "POST",
      "/tag-instances",
      Some(json!({ "tag_id": person_id, "summary_id": summary_id, "start_char": 0, "stop_char": 3 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body["story_order"].as_i64().is_some());
  }

  let (status, story) = send(&app, "GET", &format!("/tags/{person_id}/story"), None).await;
  assert_eq!(status, StatusCode::OK);
  let order: Vec<String> =
    story.as_array().unwrap().iter().map(|i| id(i, "summary_id")).collect();
  assert_eq!(order, vec![early, late]);
}

#[tokio::test]
async fn undated_summary_is_a_conflict() {
  let app = app().await;
  let person_id = create_tag(&app, person()).await;
  let (_, summary) = send(&app, "POST", "/summaries", Some(json!({ "text": "undated" }))).await;

  let (status, body) = send(
    &app,
    "POST",
    "/tag-instances",
    Some(json!({ "tag_id": person_id, "summary_id": id(&summary, "summary_id"), "start_char": 0, "stop_char": 1 })),
  )
  .await;
  assert_eq!(status, StatusCode::CONFLICT);
  assert!(body["error"].as_str().unwrap().contains("no time tag"));
}

#[tokio::test]
async fn second_time_tag_is_a_conflict() {
  let app = app().await;
  let (summary_id, _) = dated_summary(&app, 1325).await;
  let (_, other_time) = dated_summary(&app, 1354).await;

  let (status, body) = send(
    &app,
    "POST",
    "/tag-instances",
    Some(json!({ "tag_id": other_time, "summary_id": summary_id, "start_char": 0, "stop_char": 4 })),
  )
  .await;
  assert_eq!(status, StatusCode::CONFLICT);
  assert!(body["error"].as_str().unwrap().contains("already dated"));
}

#[tokio::test]
async fn inverted_span_is_bad_request() {
  let app = app().await;
  let person_id = create_tag(&app, person()).await;
  let (summary_id, _) = dated_summary(&app, 1325).await;

  let (status, _) = send(
    &app,
    "POST",
    "/tag-instances",
    Some(json!({ "tag_id": person_id, "summary_id": summary_id, "start_char": 9, "stop_char": 2 })),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn rebalance_and_verify() {
  let app = app().await;
  let person_id = create_tag(&app, person()).await;
  for year in [1354, 1325, 1349] {
    let (summary_id, _) = dated_summary(&app, year).await;
    send(
      &app,
      "POST",
      "/tag-instances",
      Some(json!({ "tag_id": person_id, "summary_id": summary_id, "start_char": 0, "stop_char": 0 })),
    )
    .await;
  }

  let (status, body) =
    send(&app, "POST", &format!("/tags/{person_id}/rebalance?mode=bulk"), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["renumbered"], 3);
  assert_eq!(body["mode"], "bulk");

  let (_, story) = send(&app, "GET", &format!("/tags/{person_id}/story"), None).await;
  let orders: Vec<i64> = story
    .as_array()
    .unwrap()
    .iter()
    .map(|i| i["story_order"].as_i64().unwrap())
    .collect();
  assert_eq!(orders, vec![100_000, 101_000, 102_000]);

  let (status, body) = send(&app, "GET", &format!("/tags/{person_id}/verify"), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["checked"], 3);
  assert!(body["mismatch"].is_null());
}

#[tokio::test]
async fn story_endpoint_pages_forward() {
  let app = app().await;
  let person_id = create_tag(&app, person()).await;
  let mut summaries = Vec::new();
  for year in [1325, 1332, 1349] {
    let (summary_id, _) = dated_summary(&app, year).await;
    send(
      &app,
      "POST",
      "/tag-instances",
      Some(json!({ "tag_id": person_id, "summary_id": summary_id, "start_char": 0, "stop_char": 0 })),
    )
    .await;
    summaries.push(summary_id);
  }

  let uri = format!(
    "/story?event_id={}&story_id={person_id}&direction=next",
    summaries[0]
  );
  let (status, page) = send(&app, "GET", &uri, None).await;
  assert_eq!(status, StatusCode::OK);
  let events: Vec<String> = page.as_array().unwrap().iter().map(|p| id(p, "event_id")).collect();
  assert_eq!(events, &summaries[1..]);
  assert!(page.as_array().unwrap().iter().all(|p| p["story_id"] == person_id.as_str()));
}
