//! End-to-end scenarios E1-E6 driven against a real hub-server instance
//! bound to an ephemeral port, exercised through the same HTTP + WebSocket
//! surface a real endpoint would use.

use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use ed25519_dalek::{Signer, SigningKey};
use hub_protocol::{Frame, LoginResponse, LoginVerifyRequest, TokenResponse};
use hub_server::config::ServerConfig;
use hub_server::store::Store;
use hub_server::{AppState, build_router};
use hub_test_utils::MockWsClient;
use rand::rngs::OsRng;

struct TestHub {
    http_base: String,
    ws_base: String,
}

async fn start_hub() -> TestHub {
    let mut config = ServerConfig::from_env();
    config.jwt_secret = b"integration-test-secret-value".to_vec();
    config.database_path = ":memory:".to_owned();
    config.message_rate_limit = 5.0;
    config.message_burst_limit = 10;

    let store = Store::open_in_memory().expect("open in-memory store");
    let state = AppState::new(config, store);
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestHub {
        http_base: format!("http://{addr}"),
        ws_base: format!("ws://{addr}"),
    }
}

async fn register_and_login(hub: &TestHub, client: &reqwest::Client, user_id: &str) -> (SigningKey, String) {
    let signing_key = SigningKey::generate(&mut OsRng);
    let public_key_b64 = STANDARD.encode(signing_key.verifying_key().to_bytes());

    let resp = client
        .post(format!("{}/auth/register", hub.http_base))
        .json(&serde_json::json!({ "user_id": user_id, "username": user_id, "public_key": public_key_b64 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);

    let login: LoginResponse = client
        .post(format!("{}/auth/login", hub.http_base))
        .json(&serde_json::json!({ "user_id": user_id }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let challenge = STANDARD.decode(&login.challenge).unwrap();
    let signature = STANDARD.encode(signing_key.sign(&challenge).to_bytes());

    let verify: TokenResponse = client
        .post(format!("{}/auth/login?verify=true", hub.http_base))
        .json(&LoginVerifyRequest {
            user_id: user_id.to_owned(),
            signature,
        })
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    (signing_key, verify.token)
}

async fn connect(hub: &TestHub, token: &str) -> MockWsClient {
    MockWsClient::connect(&format!("{}/ws?token={token}", hub.ws_base))
        .await
        .unwrap()
}

/// E1: a second `verify=true` with the same signature fails once the
/// challenge has been consumed.
#[tokio::test]
async fn e1_challenge_is_single_use() {
    let hub = start_hub().await;
    let client = reqwest::Client::new();
    let user_id = "alice";
    let signing_key = SigningKey::generate(&mut OsRng);
    let public_key_b64 = STANDARD.encode(signing_key.verifying_key().to_bytes());
    client
        .post(format!("{}/auth/register", hub.http_base))
        .json(&serde_json::json!({ "user_id": user_id, "username": user_id, "public_key": public_key_b64 }))
        .send()
        .await
        .unwrap();

    let login: LoginResponse = client
        .post(format!("{}/auth/login", hub.http_base))
        .json(&serde_json::json!({ "user_id": user_id }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let challenge = STANDARD.decode(&login.challenge).unwrap();
    let signature = STANDARD.encode(signing_key.sign(&challenge).to_bytes());

    let first = client
        .post(format!("{}/auth/login?verify=true", hub.http_base))
        .json(&LoginVerifyRequest {
            user_id: user_id.to_owned(),
            signature: signature.clone(),
        })
        .send()
        .await
        .unwrap();
    assert_eq!(first.status(), 200);

    let second = client
        .post(format!("{}/auth/login?verify=true", hub.http_base))
        .json(&LoginVerifyRequest {
            user_id: user_id.to_owned(),
            signature,
        })
        .send()
        .await
        .unwrap();
    assert_eq!(second.status(), 401, "challenge must be consumed after first use");
}

/// E2: A sends B a direct message while both are connected; B receives it
/// and the store row transitions pending -> delivered.
#[tokio::test]
async fn e2_direct_message_between_two_live_sessions() {
    let hub = start_hub().await;
    let client = reqwest::Client::new();
    let (_alice_key, alice_token) = register_and_login(&hub, &client, "alice").await;
    let (_bob_key, bob_token) = register_and_login(&hub, &client, "bob").await;

    let mut alice = connect(&hub, &alice_token).await;
    let mut bob = connect(&hub, &bob_token).await;

    alice
        .send_frame(&Frame {
            id: 0,
            from: String::new(),
            to: "bob".to_owned(),
            timestamp: String::new(),
            content: "hi".to_owned(),
            status: "pending".to_owned(),
            is_broadcast: false,
            signature: None,
            is_forward_message: false,
        })
        .await
        .unwrap();

    let received = bob.recv_frame().await.unwrap();
    assert_eq!(received.from, "alice");
    assert_eq!(received.content, "hi");
}

/// E3: B is offline when A sends 3 direct messages; connecting replays
/// exactly those 3.
#[tokio::test]
async fn e3_offline_recipient_gets_backlog_on_connect() {
    let hub = start_hub().await;
    let client = reqwest::Client::new();
    let (_alice_key, alice_token) = register_and_login(&hub, &client, "alice").await;
    let (_bob_key, bob_token) = register_and_login(&hub, &client, "bob").await;

    let mut alice = connect(&hub, &alice_token).await;
    for i in 0..3 {
        alice
            .send_frame(&Frame {
                id: 0,
                from: String::new(),
                to: "bob".to_owned(),
                timestamp: String::new(),
                content: format!("msg-{i}"),
                status: "pending".to_owned(),
                is_broadcast: false,
                signature: None,
                is_forward_message: false,
            })
            .await
            .unwrap();
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut bob = connect(&hub, &bob_token).await;
    let mut contents = Vec::new();
    for _ in 0..3 {
        contents.push(bob.recv_frame().await.unwrap().content);
    }
    contents.sort();
    assert_eq!(contents, vec!["msg-0".to_owned(), "msg-1".to_owned(), "msg-2".to_owned()]);
}

/// E4: broadcast fan-out reaches every other connected user exactly once
/// and never the sender.
#[tokio::test]
async fn e4_broadcast_reaches_others_not_sender() {
    let hub = start_hub().await;
    let client = reqwest::Client::new();
    let (_alice_key, alice_token) = register_and_login(&hub, &client, "alice").await;
    let (_bob_key, bob_token) = register_and_login(&hub, &client, "bob").await;
    let (_carol_key, carol_token) = register_and_login(&hub, &client, "carol").await;

    let mut alice = connect(&hub, &alice_token).await;
    let mut bob = connect(&hub, &bob_token).await;
    let mut carol = connect(&hub, &carol_token).await;

    alice
        .send_frame(&Frame {
            id: 0,
            from: String::new(),
            to: "broadcast".to_owned(),
            timestamp: String::new(),
            content: "hello".to_owned(),
            status: "pending".to_owned(),
            is_broadcast: true,
            signature: None,
            is_forward_message: false,
        })
        .await
        .unwrap();

    assert_eq!(bob.recv_frame().await.unwrap().content, "hello");
    assert_eq!(carol.recv_frame().await.unwrap().content, "hello");

    let resp = tokio::time::timeout(Duration::from_millis(200), alice.recv_frame()).await;
    assert!(resp.is_err(), "sender must not receive its own broadcast");
}

/// E6: capacity=10, rate=5/s, 15 frames back-to-back -> first 10 admitted,
/// next 5 denied with a system notice.
#[tokio::test]
async fn e6_rate_limit_admits_burst_then_denies() {
    let hub = start_hub().await;
    let client = reqwest::Client::new();
    let (_alice_key, alice_token) = register_and_login(&hub, &client, "alice").await;
    let (_bob_key, bob_token) = register_and_login(&hub, &client, "bob").await;

    let mut alice = connect(&hub, &alice_token).await;
    let mut bob = connect(&hub, &bob_token).await;

    for i in 0..15 {
        alice
            .send_frame(&Frame {
                id: 0,
                from: String::new(),
                to: "bob".to_owned(),
                timestamp: String::new(),
                content: format!("burst-{i}"),
                status: "pending".to_owned(),
                is_broadcast: false,
                signature: None,
                is_forward_message: false,
            })
            .await
            .unwrap();
    }

    let mut delivered = 0;
    let mut denied = 0;
    for _ in 0..15 {
        let frame = bob.recv_frame().await.unwrap();
        if frame.content.starts_with("burst-") {
            delivered += 1;
        }
    }
    // Denied frames go to alice as a system notice on her own session, not to bob.
    for _ in 0..5 {
        match tokio::time::timeout(Duration::from_millis(200), alice.recv_frame()).await {
            Ok(Ok(frame)) if frame.from == "system" => denied += 1,
            _ => break,
        }
    }

    assert_eq!(delivered, 10, "first 10 frames admitted within capacity");
    assert_eq!(denied, 5, "remaining 5 frames denied with a system notice");
}

/// E7: `await_response=true` on the HTTP side-channel blocks until the
/// recipient's own reply (flagged forward-response) comes back over their
/// WebSocket, and returns it as the HTTP response body instead of 202.
#[tokio::test]
async fn e7_http_forward_message_awaits_the_recipients_reply() {
    let hub = start_hub().await;
    let client = reqwest::Client::new();
    let (_alice_key, alice_token) = register_and_login(&hub, &client, "alice").await;
    let (_bob_key, bob_token) = register_and_login(&hub, &client, "bob").await;
    let mut bob = connect(&hub, &bob_token).await;

    let call = tokio::spawn({
        let http_base = hub.http_base.clone();
        let alice_token = alice_token.clone();
        async move {
            client
                .post(format!("{http_base}/direct-message/bob?await_response=true"))
                .bearer_auth(alice_token)
                .json(&serde_json::json!({ "content": "ping" }))
                .send()
                .await
                .unwrap()
        }
    });

    let forwarded = bob.recv_frame().await.unwrap();
    assert_eq!(forwarded.content, "ping");
    assert!(forwarded.is_forward_message);

    bob.send_frame(&Frame {
        id: 0,
        from: String::new(),
        to: "alice".to_owned(),
        timestamp: String::new(),
        content: "pong".to_owned(),
        status: "pending".to_owned(),
        is_broadcast: false,
        signature: None,
        is_forward_message: true,
    })
    .await
    .unwrap();

    let response = call.await.unwrap();
    assert_eq!(response.status(), 200);
    let reply: Frame = response.json().await.unwrap();
    assert_eq!(reply.content, "pong");
    assert_eq!(reply.from, "bob");
}
