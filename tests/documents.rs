//! Document operation tests against a mock HTTP server.

use feathercouch::{CouchClient, CouchConfig, CouchError, Document, WriteResult};
use futures::StreamExt;
use mockito::Matcher;
use serde_json::{json, Value};

async fn client_for(server: &mockito::ServerGuard) -> CouchClient {
    let config = CouchConfig::from_url(&server.url(), "inventory").unwrap();
    CouchClient::new(config).unwrap()
}

#[tokio::test]
async fn find_decodes_document() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/inventory/bolt-m4")
        .match_header("accept", "application/json")
        .with_status(200)
        .with_body(r#"{"_id":"bolt-m4","_rev":"1-abc","stock":40}"#)
        .create_async()
        .await;

    let client = client_for(&server).await;
    let doc: Document = client.find("bolt-m4").await.unwrap();

    assert_eq!(doc.id.as_deref(), Some("bolt-m4"));
    assert_eq!(doc.fields.get("stock"), Some(&json!(40)));
    mock.assert_async().await;
}

#[tokio::test]
async fn find_maps_404_to_not_found() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/inventory/missing")
        .with_status(404)
        .with_body(r#"{"error":"not_found","reason":"missing"}"#)
        .create_async()
        .await;

    let client = client_for(&server).await;
    let err = client.find::<Document>("missing").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn update_maps_409_to_conflict() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("PUT", "/inventory/bolt-m4")
        .with_status(409)
        .with_body(r#"{"error":"conflict","reason":"Document update conflict."}"#)
        .create_async()
        .await;

    let client = client_for(&server).await;
    let err = client
        .update(&json!({"_id": "bolt-m4", "_rev": "1-abc", "stock": 39}))
        .await
        .unwrap_err();
    assert!(err.is_conflict());
}

#[tokio::test]
async fn server_error_carries_body_text() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/inventory/broken")
        .with_status(500)
        .with_body(r#"{"reason":"x"}"#)
        .create_async()
        .await;

    let client = client_for(&server).await;
    let err = client.find::<Document>("broken").await.unwrap_err();
    match err {
        CouchError::Status { status, reason } => {
            assert_eq!(status, 500);
            assert!(reason.contains("\"x\""));
        }
        other => panic!("expected Status, got {other:?}"),
    }
}

#[tokio::test]
async fn save_round_trips_document() {
    let mut server = mockito::Server::new_async().await;
    let put = server
        .mock("PUT", "/inventory/bolt-m4")
        .match_header("content-type", "application/json")
        .match_body(Matcher::Json(json!({"_id": "bolt-m4", "stock": 40})))
        .with_status(201)
        .with_body(r#"{"ok":true,"id":"bolt-m4","rev":"1-abc"}"#)
        .create_async()
        .await;
    let get = server
        .mock("GET", "/inventory/bolt-m4")
        .match_query(Matcher::UrlEncoded("rev".into(), "1-abc".into()))
        .with_status(200)
        .with_body(r#"{"_id":"bolt-m4","_rev":"1-abc","stock":40}"#)
        .create_async()
        .await;

    let client = client_for(&server).await;
    let saved = client
        .save(&json!({"_id": "bolt-m4", "stock": 40}))
        .await
        .unwrap();
    assert!(saved.succeeded());
    assert_eq!(saved.rev, "1-abc");

    let fetched: Value = client.find_rev(&saved.id, &saved.rev).await.unwrap();
    assert_eq!(fetched["stock"], json!(40));
    put.assert_async().await;
    get.assert_async().await;
}

#[tokio::test]
async fn save_generates_identifier_when_absent() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("PUT", Matcher::Regex(r"^/inventory/[0-9a-f]{32}$".into()))
        .with_status(201)
        .with_body(r#"{"ok":true,"id":"generated","rev":"1-abc"}"#)
        .create_async()
        .await;

    let client = client_for(&server).await;
    let result = client.save(&json!({"stock": 40})).await.unwrap();
    assert!(result.succeeded());
    mock.assert_async().await;
}

#[tokio::test]
async fn save_with_revision_issues_no_request() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("PUT", Matcher::Regex("^/inventory/.*".into()))
        .expect(0)
        .create_async()
        .await;

    let client = client_for(&server).await;
    let err = client
        .save(&json!({"_id": "bolt-m4", "_rev": "1-abc"}))
        .await
        .unwrap_err();
    assert!(err.is_precondition());
    mock.assert_async().await;
}

#[tokio::test]
async fn update_without_revision_issues_no_request() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("PUT", Matcher::Regex("^/inventory/.*".into()))
        .expect(0)
        .create_async()
        .await;

    let client = client_for(&server).await;
    let err = client.update(&json!({"_id": "bolt-m4"})).await.unwrap_err();
    assert!(err.is_precondition());
    mock.assert_async().await;
}

#[tokio::test]
async fn post_returns_server_assigned_identifier() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/inventory")
        .match_header("content-type", "application/json")
        .with_status(201)
        .with_body(r#"{"ok":true,"id":"server-id","rev":"1-abc"}"#)
        .create_async()
        .await;

    let client = client_for(&server).await;
    let result = client.post(&json!({"stock": 40})).await.unwrap();
    assert_eq!(result.id, "server-id");
}

#[tokio::test]
async fn save_batch_posts_with_batch_marker() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/inventory")
        .match_query(Matcher::UrlEncoded("batch".into(), "ok".into()))
        .with_status(202)
        .with_body(r#"{"ok":true,"id":"bolt-m4"}"#)
        .create_async()
        .await;

    let client = client_for(&server).await;
    client
        .save_batch(&json!({"_id": "bolt-m4", "stock": 40}))
        .await
        .unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn remove_sends_revision_query() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("DELETE", "/inventory/bolt-m4")
        .match_query(Matcher::UrlEncoded("rev".into(), "1-abc".into()))
        .with_status(200)
        .with_body(r#"{"ok":true,"id":"bolt-m4","rev":"2-def"}"#)
        .create_async()
        .await;

    let client = client_for(&server).await;
    let result = client
        .remove(&json!({"_id": "bolt-m4", "_rev": "1-abc"}))
        .await
        .unwrap();
    assert_eq!(result.rev, "2-def");
    mock.assert_async().await;
}

#[tokio::test]
async fn remove_maps_404_to_not_found() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("DELETE", "/inventory/gone")
        .match_query(Matcher::Any)
        .with_status(404)
        .with_body(r#"{"error":"not_found","reason":"deleted"}"#)
        .create_async()
        .await;

    let client = client_for(&server).await;
    let err = client.remove_by_id("gone", "1-abc").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn bulk_reports_per_item_outcomes_in_order() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/inventory/_bulk_docs")
        .match_body(Matcher::PartialJson(json!({"new_edits": true})))
        .with_status(201)
        .with_body(
            r#"[
                {"ok":true,"id":"a","rev":"1-a"},
                {"id":"b","error":"conflict","reason":"Document update conflict."},
                {"ok":true,"id":"c","rev":"1-c"}
            ]"#,
        )
        .create_async()
        .await;

    let client = client_for(&server).await;
    let docs = vec![json!({"_id": "a"}), json!({"_id": "b"}), json!({"_id": "c"})];
    let results: Vec<WriteResult> = client.bulk(&docs, true).await.unwrap();

    assert_eq!(results.len(), 3);
    assert_eq!(
        results.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(),
        vec!["a", "b", "c"]
    );
    assert!(results[0].succeeded());
    assert!(!results[1].succeeded());
    assert_eq!(results[1].error.as_deref(), Some("conflict"));
    assert!(results[2].succeeded());
    mock.assert_async().await;
}

#[tokio::test]
async fn bulk_with_new_edits_false_preserves_revisions() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/inventory/_bulk_docs")
        .match_body(Matcher::PartialJson(json!({"new_edits": false})))
        .with_status(201)
        .with_body(r#"[{"ok":true,"id":"a","rev":"7-r"}]"#)
        .create_async()
        .await;

    let client = client_for(&server).await;
    let docs = vec![json!({"_id": "a", "_rev": "7-r"})];
    let results = client.bulk(&docs, false).await.unwrap();
    assert!(results[0].succeeded());
    mock.assert_async().await;
}

#[tokio::test]
async fn contains_translates_404_to_false() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("HEAD", "/inventory/present")
        .with_status(200)
        .create_async()
        .await;
    server
        .mock("HEAD", "/inventory/absent")
        .with_status(404)
        .create_async()
        .await;

    let client = client_for(&server).await;
    assert!(client.contains("present").await.unwrap());
    assert!(!client.contains("absent").await.unwrap());
}

#[tokio::test]
async fn find_docs_unwraps_query_envelope() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/inventory/_find")
        .match_body(Matcher::PartialJson(json!({"selector": {"stock": {"$lt": 10}}})))
        .with_status(200)
        .with_body(r#"{"docs":[{"_id":"a","stock":2},{"_id":"b","stock":5}],"bookmark":"x"}"#)
        .create_async()
        .await;

    let client = client_for(&server).await;
    let query = json!({"selector": {"stock": {"$lt": 10}}});
    let docs: Vec<Value> = client.find_docs(&query).await.unwrap();

    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0]["_id"], json!("a"));
    mock.assert_async().await;
}

#[tokio::test]
async fn find_docs_fails_whole_call_on_one_malformed_element() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/inventory/_find")
        .with_status(200)
        .with_body(r#"{"docs":[{"_id":"a","stock":2},"not an object"]}"#)
        .create_async()
        .await;

    let client = client_for(&server).await;
    let query = json!({"selector": {}});
    let result: Result<Vec<Document>, _> = client.find_docs(&query).await;
    assert!(matches!(result, Err(CouchError::Decode(_))));
}

#[tokio::test]
async fn save_attachment_to_existing_document() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("PUT", "/inventory/bolt-m4/datasheet.pdf")
        .match_query(Matcher::UrlEncoded("rev".into(), "1-abc".into()))
        .match_header("content-type", "application/pdf")
        .with_status(201)
        .with_body(r#"{"ok":true,"id":"bolt-m4","rev":"2-def"}"#)
        .create_async()
        .await;

    let client = client_for(&server).await;
    let result = client
        .save_attachment(
            b"%PDF-1.4".as_slice(),
            "datasheet.pdf",
            "application/pdf",
            Some("bolt-m4"),
            Some("1-abc"),
        )
        .await
        .unwrap();
    assert_eq!(result.rev, "2-def");
    mock.assert_async().await;
}

#[tokio::test]
async fn save_attachment_creates_container_document() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock(
            "PUT",
            Matcher::Regex(r"^/inventory/[0-9a-f]{32}/logo\.png$".into()),
        )
        .match_header("content-type", "image/png")
        .with_status(201)
        .with_body(r#"{"ok":true,"id":"generated","rev":"1-abc"}"#)
        .create_async()
        .await;

    let client = client_for(&server).await;
    let result = client
        .save_attachment(b"\x89PNG".as_slice(), "logo.png", "image/png", None, None)
        .await
        .unwrap();
    assert!(result.succeeded());
    mock.assert_async().await;
}

#[tokio::test]
async fn find_attachment_streams_raw_bytes() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/inventory/bolt-m4/datasheet.pdf")
        .with_status(200)
        .with_header("content-type", "application/pdf")
        .with_body("%PDF-1.4 payload")
        .create_async()
        .await;

    let client = client_for(&server).await;
    let mut stream = client
        .find_attachment("bolt-m4", "datasheet.pdf")
        .await
        .unwrap();

    let mut collected = Vec::new();
    while let Some(chunk) = stream.next().await {
        collected.extend_from_slice(&chunk.unwrap());
    }
    assert_eq!(collected, b"%PDF-1.4 payload");
}

#[tokio::test]
async fn requests_carry_basic_authorization() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/inventory/bolt-m4")
        .match_header("authorization", "Basic YWRtaW46c2VjcmV0")
        .with_status(200)
        .with_body(r#"{"_id":"bolt-m4","_rev":"1-abc"}"#)
        .create_async()
        .await;

    let config = CouchConfig::from_url(&server.url(), "inventory")
        .unwrap()
        .with_credentials("admin", "secret");
    let client = CouchClient::new(config).unwrap();
    let _: Document = client.find("bolt-m4").await.unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn document_names_are_path_escaped() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/inventory/spare%2Fparts")
        .with_status(200)
        .with_body(r#"{"_id":"spare/parts","_rev":"1-abc"}"#)
        .create_async()
        .await;

    let client = client_for(&server).await;
    let _: Document = client.find("spare/parts").await.unwrap();
    mock.assert_async().await;
}
