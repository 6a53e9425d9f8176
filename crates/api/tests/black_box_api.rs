use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use propdesk_api::app::{build_app, memory_state};
use propdesk_api::config::Config;
use propdesk_infra::{DevOtpSender, MemoryDb};
use propdesk_users::MIN_PASSWORD_COST;
use reqwest::StatusCode;
use serde_json::{Value, json};

const JWT_SECRET: &str = "test-secret";
const PASSWORD: &str = "secret1";

struct TestServer {
    base_url: String,
    db: MemoryDb,
    otp: Arc<DevOtpSender>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod over the in-memory backend, on an ephemeral port.
        let config = Config {
            jwt_secret: JWT_SECRET.to_string(),
            password_cost: MIN_PASSWORD_COST,
            ..Config::default()
        };
        let db = MemoryDb::new();
        let otp = Arc::new(DevOtpSender::new());
        let state = memory_state(&config, &db, otp.clone()).expect("failed to build state");
        let app = build_app(state, config.request_timeout);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}/v1", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            db,
            otp,
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt(sub: &str, roles: &[&str], expires_in: ChronoDuration) -> String {
    let now = Utc::now();
    let claims = json!({
        "sub": sub,
        "roles": roles,
        "iss": "propdesk",
        "iat": (now - ChronoDuration::minutes(1)).timestamp(),
        "exp": (now + expires_in).timestamp(),
    });

    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some("dev".to_string());
    jsonwebtoken::encode(&header, &claims, &EncodingKey::from_secret(JWT_SECRET.as_bytes()))
        .expect("failed to encode jwt")
}

/// Register, activate and log in; returns `(user_id, token)`.
async fn sign_in(client: &reqwest::Client, srv: &TestServer, phone: &str) -> (String, String) {
    let res = client
        .post(srv.url("/users/register"))
        .json(&json!({
            "first_name": "Lan",
            "last_name": "Tran",
            "phone": phone,
            "password": PASSWORD,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let user: Value = res.json().await.unwrap();
    let user_id = user["id"].as_str().unwrap().to_string();

    let code = srv.otp.last_code(phone).expect("otp was sent");
    let res = client
        .post(srv.url("/users/verify-otp"))
        .json(&json!({ "user_id": user_id, "otp": code }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .get(srv.url("/users/token"))
        .basic_auth(phone, Some(PASSWORD))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    (user_id, body["token"].as_str().unwrap().to_string())
}

/// Each entry is one block, listing the unit count of each of its floors.
fn property_body(blocks: &[Vec<usize>]) -> Value {
    let blocks: Vec<Value> = blocks
        .iter()
        .enumerate()
        .map(|(b, floors)| {
            let floors: Vec<Value> = floors
                .iter()
                .enumerate()
                .map(|(f, units)| {
                    let units: Vec<Value> = (0..*units).map(|u| json!({ "name": format!("{}{:02}", f + 1, u) })).collect();
                    json!({ "name": format!("Floor {}", f + 1), "units": units })
                })
                .collect();
            json!({ "name": format!("Block {}", b + 1), "floors": floors })
        })
        .collect();

    json!({
        "name": "Sunrise Residence",
        "addressLevel1ID": 79,
        "addressLevel2ID": 760,
        "addressLevel3ID": 26734,
        "street": "12 Le Loi",
        "blocks": blocks,
    })
}

async fn create_property(client: &reqwest::Client, srv: &TestServer, token: &str, blocks: &[Vec<usize>]) -> Value {
    let res = client
        .post(srv.url("/properties"))
        .bearer_auth(token)
        .json(&property_body(blocks))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    res.json().await.unwrap()
}

fn unit_counts(detail: &Value) -> Vec<Vec<usize>> {
    detail["blocks"]
        .as_array()
        .unwrap()
        .iter()
        .map(|b| {
            b["floors"]
                .as_array()
                .unwrap()
                .iter()
                .map(|f| f["units"].as_array().unwrap().len())
                .collect()
        })
        .collect()
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client.get(srv.url("/properties")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "unauthenticated");

    let res = client
        .get(srv.url("/properties"))
        .header("Authorization", "Bearer not-a-jwt")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client.get(srv.url("/liveness")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn expired_token_is_rejected() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = mint_jwt(&uuid::Uuid::now_v7().to_string(), &["USER"], ChronoDuration::minutes(-5));

    let res = client.get(srv.url("/properties")).bearer_auth(token).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn registration_activation_and_login() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let phone = "0911111111";

    let (user_id, token) = sign_in(&client, &srv, phone).await;

    // Phone numbers are unique.
    let res = client
        .post(srv.url("/users/register"))
        .json(&json!({ "first_name": "Other", "phone": phone, "password": PASSWORD }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    // Already active.
    let res = client
        .post(srv.url("/users/verify-otp"))
        .json(&json!({ "user_id": user_id, "otp": "123456" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .get(srv.url("/users/token"))
        .basic_auth(phone, Some("wrong-password"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .get(srv.url("/users/token"))
        .basic_auth("0999999999", Some(PASSWORD))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client.get(srv.url("/properties")).bearer_auth(&token).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let listed: Value = res.json().await.unwrap();
    assert_eq!(listed, json!([]));
}

#[tokio::test]
async fn wrong_otp_keeps_user_pending() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let phone = "0922222222";

    let res = client
        .post(srv.url("/users/register"))
        .json(&json!({ "first_name": "Minh", "phone": phone, "password": PASSWORD }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let user: Value = res.json().await.unwrap();
    assert_eq!(user["status"], "CREATED");
    assert!(user.get("password_hash").is_none());

    let res = client
        .post(srv.url("/users/verify-otp"))
        .json(&json!({ "user_id": user["id"], "otp": "not-a-code" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["message"], "invalid otp");

    let res = client
        .post(srv.url("/users/verify-otp"))
        .json(&json!({ "user_id": "nope", "otp": "123456" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let code = srv.otp.last_code(phone).unwrap();
    let res = client
        .post(srv.url("/users/verify-otp"))
        .json(&json!({ "user_id": user["id"], "otp": code }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let user: Value = res.json().await.unwrap();
    assert_eq!(user["status"], "ACTIVE");
}

#[tokio::test]
async fn nested_property_is_created_and_read_back() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let (user_id, token) = sign_in(&client, &srv, "0911111111").await;

    let shape = vec![vec![15, 15, 15], vec![180]];
    let created = create_property(&client, &srv, &token, &shape).await;

    assert_eq!(created["managerID"], user_id.as_str());
    assert_eq!(created["status"], "CREATED");
    assert_eq!(unit_counts(&created), shape);

    let counts = srv.db.row_counts().unwrap();
    assert_eq!((counts.properties, counts.blocks, counts.floors, counts.units), (1, 2, 4, 225));

    let block = &created["blocks"][1];
    let floor = &block["floors"][0];
    for node in [block, floor] {
        assert_eq!(node["status"], "ACTIVE");
        assert_eq!(node["createdAt"], created["createdAt"]);
        assert_eq!(node["updatedAt"], created["updatedAt"]);
    }
    assert_eq!(floor["blockID"], block["id"]);
    assert_eq!(floor["units"][0]["floorID"], floor["id"]);
    assert_eq!(floor["units"][0]["propertyID"], created["id"]);

    let id = created["id"].as_str().unwrap();
    let res = client
        .get(srv.url(&format!("/properties/{id}")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let fetched: Value = res.json().await.unwrap();
    assert_eq!(fetched, created);

    let res = client.get(srv.url("/properties")).bearer_auth(&token).send().await.unwrap();
    let listed: Value = res.json().await.unwrap();
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["id"], created["id"]);
    assert!(listed[0].get("blocks").is_none());
}

#[tokio::test]
async fn six_blocks_are_rejected_without_writing_anything() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let (_, token) = sign_in(&client, &srv, "0911111111").await;

    let shape: Vec<Vec<usize>> = (0..6).map(|_| vec![1]).collect();
    let res = client
        .post(srv.url("/properties"))
        .bearer_auth(&token)
        .json(&property_body(&shape))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "limit_exceeded");
    assert_eq!(body["message"], "maximum number of blocks exceeded");

    assert_eq!(srv.db.row_counts().unwrap().hierarchy(), 0);
    let res = client.get(srv.url("/properties")).bearer_auth(&token).send().await.unwrap();
    let listed: Value = res.json().await.unwrap();
    assert_eq!(listed, json!([]));
}

#[tokio::test]
async fn invalid_fields_are_reported_by_name() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let (_, token) = sign_in(&client, &srv, "0911111111").await;

    let mut body = property_body(&[vec![2]]);
    body["addressLevel2ID"] = json!(0);
    body["blocks"][0]["name"] = json!("");

    let res = client
        .post(srv.url("/properties"))
        .bearer_auth(&token)
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    let fields: Vec<&str> = body["fields"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["field"].as_str().unwrap())
        .collect();
    assert_eq!(fields, vec!["addressLevel2ID", "blocks[0].name"]);
    assert_eq!(srv.db.row_counts().unwrap().hierarchy(), 0);
}

#[tokio::test]
async fn second_property_exceeds_the_manager_quota() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let (_, token) = sign_in(&client, &srv, "0911111111").await;
    create_property(&client, &srv, &token, &[vec![1]]).await;

    let res = client
        .post(srv.url("/properties"))
        .bearer_auth(&token)
        .json(&property_body(&[vec![1]]))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(srv.db.row_counts().unwrap().properties, 1);
}

#[tokio::test]
async fn admin_or_subject_guards_property_access() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let (_, owner_token) = sign_in(&client, &srv, "0911111111").await;
    let (other_id, other_token) = sign_in(&client, &srv, "0922222222").await;

    let created = create_property(&client, &srv, &owner_token, &[vec![2]]).await;
    let path = format!("/properties/{}", created["id"].as_str().unwrap());

    let res = client.get(srv.url(&path)).bearer_auth(&other_token).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = client
        .put(srv.url(&format!("/users/{other_id}")))
        .bearer_auth(&owner_token)
        .json(&json!({ "first_name": "Hacked" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let admin = mint_jwt(&uuid::Uuid::now_v7().to_string(), &["ADMIN"], ChronoDuration::minutes(10));
    let res = client.get(srv.url(&path)).bearer_auth(&admin).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    // Admins hold no USER role, so the caller-scoped listing is closed to them.
    let res = client.get(srv.url("/properties")).bearer_auth(&admin).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn subject_can_update_own_profile() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let (user_id, token) = sign_in(&client, &srv, "0911111111").await;

    let res = client
        .put(srv.url(&format!("/users/{user_id}")))
        .bearer_auth(&token)
        .json(&json!({ "first_name": "Hoa", "phone": "0933333333" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let user: Value = res.json().await.unwrap();
    assert_eq!(user["first_name"], "Hoa");

    // The cached phone index follows the change.
    let res = client
        .get(srv.url("/users/token"))
        .basic_auth("0933333333", Some(PASSWORD))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let res = client
        .get(srv.url("/users/token"))
        .basic_auth("0911111111", Some(PASSWORD))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn missing_targets_answer_no_content() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let (_, token) = sign_in(&client, &srv, "0911111111").await;
    let created = create_property(&client, &srv, &token, &[vec![1]]).await;
    let id = created["id"].as_str().unwrap();
    let missing = uuid::Uuid::now_v7();

    let res = client
        .get(srv.url(&format!("/properties/{missing}")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = client
        .get(srv.url("/properties/not-a-uuid"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .put(srv.url(&format!("/properties/{id}/units/{missing}")))
        .bearer_auth(&token)
        .json(&json!({ "name": "999" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = client
        .delete(srv.url(&format!("/properties/{id}/units/{missing}")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = client
        .post(srv.url(&format!("/properties/{id}/units")))
        .bearer_auth(&token)
        .json(&json!({ "name": "102", "blockID": missing.to_string(), "floorID": missing.to_string() }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    assert_eq!(srv.db.row_counts().unwrap().units, 1);
}

#[tokio::test]
async fn unit_lifecycle_inside_a_property() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let (_, token) = sign_in(&client, &srv, "0911111111").await;
    let created = create_property(&client, &srv, &token, &[vec![1, 1]]).await;
    let id = created["id"].as_str().unwrap();
    let block = &created["blocks"][0];
    let floor = &block["floors"][1];

    let res = client
        .post(srv.url(&format!("/properties/{id}/units")))
        .bearer_auth(&token)
        .json(&json!({ "name": "202", "blockID": block["id"], "floorID": floor["id"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let unit: Value = res.json().await.unwrap();
    assert_eq!(unit["floorID"], floor["id"]);
    let unit_id = unit["id"].as_str().unwrap();

    let res = client
        .put(srv.url(&format!("/properties/{id}/units/{unit_id}")))
        .bearer_auth(&token)
        .json(&json!({ "name": "202A" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let unit: Value = res.json().await.unwrap();
    assert_eq!(unit["name"], "202A");

    let res = client
        .delete(srv.url(&format!("/properties/{id}/units/{unit_id}")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let unit: Value = res.json().await.unwrap();
    assert_eq!(unit["status"], "DELETED");

    let res = client
        .get(srv.url(&format!("/properties/{id}")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let detail: Value = res.json().await.unwrap();
    assert_eq!(unit_counts(&detail), vec![vec![1, 1]]);
}

#[tokio::test]
async fn deleting_a_property_hides_its_whole_tree() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let (_, token) = sign_in(&client, &srv, "0911111111").await;
    let created = create_property(&client, &srv, &token, &[vec![3, 3], vec![5]]).await;
    let path = format!("/properties/{}", created["id"].as_str().unwrap());

    let res = client.delete(srv.url(&path)).bearer_auth(&token).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let deleted: Value = res.json().await.unwrap();
    assert_eq!(deleted["status"], "DELETED");

    let res = client.get(srv.url(&path)).bearer_auth(&token).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    // Soft-deleted rows stay, and the quota is free again.
    assert_eq!(srv.db.row_counts().unwrap().units, 11);
    create_property(&client, &srv, &token, &[vec![1]]).await;
}

#[tokio::test]
async fn update_cannot_mark_a_property_deleted() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let (_, token) = sign_in(&client, &srv, "0911111111").await;
    let created = create_property(&client, &srv, &token, &[vec![2]]).await;
    let path = format!("/properties/{}", created["id"].as_str().unwrap());

    let res = client
        .put(srv.url(&path))
        .bearer_auth(&token)
        .json(&json!({ "status": "DELETED" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client.get(srv.url(&path)).bearer_auth(&token).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let detail: Value = res.json().await.unwrap();
    assert_eq!(detail["status"], "CREATED");
    assert_eq!(unit_counts(&detail), vec![vec![2]]);
}
