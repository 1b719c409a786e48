//! Integration tests for the item endpoints

use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, ResponseTemplate};

use whereisit_core::domain::{ItemId, ItemStatus, PostType};
use whereisit_core::ports::{GatewayError, ISessionGateway};

use crate::common;

#[tokio::test]
async fn test_get_item_parses_document() {
    let (server, client) = common::setup_backend_mock().await;
    Mock::given(method("GET"))
        .and(path("/items/42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::item_json(
            "42",
            "active",
            "owner@campus.edu",
            "2024-03-14",
        )))
        .mount(&server)
        .await;

    let item = client.get_item(&ItemId::new("42").unwrap()).await.unwrap();

    assert_eq!(item.post_type, PostType::Lost);
    assert_eq!(item.status, ItemStatus::Active);
    assert_eq!(item.owner_email.as_str(), "owner@campus.edu");
    assert!(item.date.is_some());
    assert_eq!(item.thumbnail.as_deref(), Some("https://img.example/item.png"));
}

#[tokio::test]
async fn test_get_missing_item_is_not_found() {
    let (server, client) = common::setup_backend_mock().await;
    Mock::given(method("GET"))
        .and(path("/items/404"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "Item not found"})))
        .mount(&server)
        .await;

    let err = client.get_item(&ItemId::new("404").unwrap()).await.unwrap_err();

    assert_eq!(err, GatewayError::NotFound("Item not found".into()));
}

#[tokio::test]
async fn test_list_items() {
    let (server, client) = common::setup_backend_mock().await;
    Mock::given(method("GET"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            common::item_json("1", "active", "a@campus.edu", "2024-03-01T10:00:00Z"),
            common::item_json("2", "recovered", "b@campus.edu", "2024-03-02"),
        ])))
        .mount(&server)
        .await;

    let items = client.list_items().await.unwrap();

    assert_eq!(items.len(), 2);
    assert_eq!(items[1].status, ItemStatus::Recovered);
}

#[tokio::test]
async fn test_malformed_list_is_invalid_response() {
    let (server, client) = common::setup_backend_mock().await;
    Mock::given(method("GET"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": "nope"})))
        .mount(&server)
        .await;

    let err = client.list_items().await.unwrap_err();

    assert!(matches!(err, GatewayError::InvalidResponse(_)));
}

#[tokio::test]
async fn test_rate_limited_carries_retry_after() {
    let (server, client) = common::setup_backend_mock().await;
    Mock::given(method("GET"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
        .mount(&server)
        .await;

    let err = client.list_items().await.unwrap_err();

    assert_eq!(
        err,
        GatewayError::TooManyRequests {
            retry_after: Some(std::time::Duration::from_secs(7))
        }
    );
}

fn draft() -> whereisit_core::domain::ItemDraft {
    use chrono::TimeZone;
    whereisit_core::domain::ItemDraft {
        post_type: PostType::Found,
        title: "Umbrella".to_string(),
        description: "Black, folding".to_string(),
        category: "Accessories".to_string(),
        location: "Gym".to_string(),
        date: chrono::Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap(),
        thumbnail: "https://img.example/u.png".to_string(),
        contact_name: "Finn".to_string(),
        contact_email: whereisit_core::domain::Email::new("finder@campus.edu").unwrap(),
    }
}

#[tokio::test]
async fn test_create_item_posts_draft_and_returns_inserted_id() {
    let (server, client) = common::setup_backend_mock().await;
    Mock::given(method("POST"))
        .and(path("/items"))
        .and(body_partial_json(json!({
            "postType": "found",
            "title": "Umbrella",
            "contactEmail": "finder@campus.edu",
            "date": "2024-03-01T08:00:00Z"
        })))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(json!({"acknowledged": true, "insertedId": "665f1c"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let id = client.create_item(&draft()).await.unwrap();

    assert_eq!(id, ItemId::new("665f1c").unwrap());
}

#[tokio::test]
async fn test_create_item_accepts_stored_document() {
    let (server, client) = common::setup_backend_mock().await;
    Mock::given(method("POST"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(201).set_body_json(common::item_json(
            "77",
            "active",
            "finder@campus.edu",
            "2024-03-01",
        )))
        .mount(&server)
        .await;

    let id = client.create_item(&draft()).await.unwrap();

    assert_eq!(id.as_str(), "77");
}

#[tokio::test]
async fn test_create_item_rejection_keeps_reason() {
    let (server, client) = common::setup_backend_mock().await;
    Mock::given(method("POST"))
        .and(path("/items"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"message": "Title is required"})),
        )
        .mount(&server)
        .await;

    let err = client.create_item(&draft()).await.unwrap_err();

    assert_eq!(
        err,
        GatewayError::Rejected {
            status: 400,
            reason: "Title is required".into()
        }
    );
}

#[tokio::test]
async fn test_update_item_puts_draft() {
    let (server, client) = common::setup_backend_mock().await;
    Mock::given(method("PUT"))
        .and(path("/items/42"))
        .and(body_partial_json(json!({"title": "Umbrella", "location": "Gym"})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"message": "Item updated successfully"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    client
        .update_item(&ItemId::new("42").unwrap(), &draft())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_update_someone_elses_item_is_forbidden() {
    let (server, client) = common::setup_backend_mock().await;
    Mock::given(method("PUT"))
        .and(path("/items/42"))
        .respond_with(
            ResponseTemplate::new(403).set_body_json(json!({"message": "Not authorized"})),
        )
        .mount(&server)
        .await;

    let err = client
        .update_item(&ItemId::new("42").unwrap(), &draft())
        .await
        .unwrap_err();

    assert_eq!(err, GatewayError::Forbidden("Not authorized".into()));
}

#[tokio::test]
async fn test_delete_item() {
    let (server, client) = common::setup_backend_mock().await;
    Mock::given(method("DELETE"))
        .and(path("/items/42"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    client.delete_item(&ItemId::new("42").unwrap()).await.unwrap();
}

#[tokio::test]
async fn test_delete_missing_item_is_not_found() {
    let (server, client) = common::setup_backend_mock().await;
    Mock::given(method("DELETE"))
        .and(path("/items/9"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "Item not found"})))
        .mount(&server)
        .await;

    let err = client.delete_item(&ItemId::new("9").unwrap()).await.unwrap_err();

    assert_eq!(err, GatewayError::NotFound("Item not found".into()));
}

#[tokio::test]
async fn test_list_my_items_accepts_each_envelope() {
    let (server, client) = common::setup_backend_mock().await;
    let doc = common::item_json("1", "active", "finder@campus.edu", "2024-03-01");
    Mock::given(method("GET"))
        .and(path("/debug/my-items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"sampleItems": [doc.clone()]})))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/debug/my-items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": [doc.clone()]})))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/debug/my-items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([doc])))
        .mount(&server)
        .await;

    for _ in 0..3 {
        let mine = client.list_my_items().await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id.as_str(), "1");
    }
}
