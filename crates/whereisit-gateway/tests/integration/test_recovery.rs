//! Integration tests for the recovery endpoints

use chrono::NaiveDate;
use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, ResponseTemplate};

use whereisit_core::domain::{
    BackendUserId, ClaimDetails, Email, Item, ItemId, ItemStatus, PostType, RecoveryRequest, Role,
    SubjectId, UserProfile,
};
use whereisit_core::ports::{GatewayError, ISessionGateway};

use crate::common;

fn item() -> Item {
    Item {
        id: ItemId::new("42").unwrap(),
        post_type: PostType::Lost,
        status: ItemStatus::Active,
        owner_email: Email::new("owner@campus.edu").unwrap(),
        title: "Blue backpack".into(),
        location: "Library".into(),
        date: None,
        description: String::new(),
        category: String::new(),
        thumbnail: None,
        contact_name: String::new(),
    }
}

fn finder() -> UserProfile {
    UserProfile {
        subject_id: SubjectId::new("sub-finder").unwrap(),
        email: Email::new("finder@campus.edu").unwrap(),
        display_name: "Fay Finder".into(),
        role: Role::User,
        backend_id: BackendUserId::new("u-finder").unwrap(),
        photo_url: None,
    }
}

fn request() -> RecoveryRequest {
    let details = ClaimDetails::new("Front desk", NaiveDate::from_ymd_opt(2024, 3, 14).unwrap())
        .with_notes("Has my name inside");
    RecoveryRequest::new(&item(), &finder(), details).unwrap()
}

#[tokio::test]
async fn test_recover_item_posts_claim_and_parses_record() {
    let (server, client) = common::setup_backend_mock().await;
    Mock::given(method("POST"))
        .and(path("/items/42/recover"))
        .and(body_json(json!({
            "claimedLocation": "Front desk",
            "claimedDate": "2024-03-14",
            "notes": "Has my name inside"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "success": true,
            "recoveryRecord": {
                "_id": "rec-1",
                "itemId": "42",
                "recoveredLocation": "Front desk",
                "recoveredDate": "2024-03-14T00:00:00.000Z",
                "notes": "Has my name inside",
                "recoveredBy": {"email": "finder@campus.edu", "name": "Fay Finder"},
                "originalOwner": {"email": "owner@campus.edu"},
                "originalPostType": "Lost",
                "originalItemData": {"title": "Blue backpack"},
                "recoveryStatus": "completed",
                "createdAt": "2024-03-14T12:00:00Z"
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let record = client.recover_item(&request()).await.expect("recover failed");

    assert_eq!(record.id.as_str(), "rec-1");
    assert_eq!(record.item_title(), Some("Blue backpack"));
    assert_eq!(record.recovered_location, "Front desk");
}

#[tokio::test]
async fn test_recover_conflict_carries_reason() {
    let (server, client) = common::setup_backend_mock().await;
    Mock::given(method("POST"))
        .and(path("/items/42/recover"))
        .respond_with(
            ResponseTemplate::new(409).set_body_json(json!({"reason": "Item already recovered"})),
        )
        .mount(&server)
        .await;

    let err = client.recover_item(&request()).await.unwrap_err();

    assert_eq!(err, GatewayError::Conflict("Item already recovered".into()));
}

#[tokio::test]
async fn test_recover_other_refusal_is_rejected() {
    let (server, client) = common::setup_backend_mock().await;
    Mock::given(method("POST"))
        .and(path("/items/42/recover"))
        .respond_with(ResponseTemplate::new(400).set_body_json(
            json!({"message": "You cannot recover your own item"}),
        ))
        .mount(&server)
        .await;

    let err = client.recover_item(&request()).await.unwrap_err();

    assert_eq!(
        err,
        GatewayError::Rejected {
            status: 400,
            reason: "You cannot recover your own item".into()
        }
    );
}

#[tokio::test]
async fn test_recover_server_error_is_transient() {
    let (server, client) = common::setup_backend_mock().await;
    Mock::given(method("POST"))
        .and(path("/items/42/recover"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = client.recover_item(&request()).await.unwrap_err();

    assert!(err.is_transient());
}

#[tokio::test]
async fn test_list_recoveries() {
    let (server, client) = common::setup_backend_mock().await;
    Mock::given(method("GET"))
        .and(path("/recoveries"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "_id": "rec-9",
            "itemId": "9",
            "claimedLocation": "Gym",
            "claimedDate": "2024-02-01",
            "recoveredBy": {"email": "finder@campus.edu"},
            "originalOwner": {"email": "owner@campus.edu"},
            "recoveryStatus": "completed"
        }])))
        .mount(&server)
        .await;

    let records = client.list_recoveries().await.unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].recovered_location, "Gym");
    assert!(records[0].recovered_date.is_some());
}
