use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header::CONTENT_TYPE},
};
use fridge_server::{
    blob::MemoryBlobStore,
    build_router,
    config::Config,
    membership::{KvError, KvStore, MemoryKv},
    models::NewReply,
    state::State,
    store::{MemoryStore, Store},
};
use serde_json::{Value, json};
use tokio::task::JoinSet;
use tower::ServiceExt;

const BOUNDARY: &str = "fridge-test-boundary";

struct Harness {
    app: Router,
    store: Arc<MemoryStore>,
    blobs: Arc<MemoryBlobStore>,
}

/// Memberships with a little latency on every call, like a remote Redis.
struct LaggyKv(MemoryKv);

impl LaggyKv {
    async fn lag() {
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

#[async_trait]
impl KvStore for LaggyKv {
    async fn add(&self, key: &str, member: i64) -> Result<bool, KvError> {
        Self::lag().await;
        self.0.add(key, member).await
    }

    async fn remove(&self, key: &str, member: i64) -> Result<bool, KvError> {
        Self::lag().await;
        self.0.remove(key, member).await
    }

    async fn members(&self, key: &str) -> Result<Vec<i64>, KvError> {
        Self::lag().await;
        self.0.members(key).await
    }

    async fn contains(&self, key: &str, member: i64) -> Result<bool, KvError> {
        Self::lag().await;
        self.0.contains(key, member).await
    }
}

fn harness() -> Harness {
    harness_with(Arc::new(MemoryKv::new()))
}

fn harness_with(kv: Arc<dyn KvStore>) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let blobs = Arc::new(MemoryBlobStore::new());
    let state = State::from_parts(Config::default(), store.clone(), blobs.clone(), kv);

    Harness {
        app: build_router(state),
        store,
        blobs,
    }
}

async fn call(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };

    (status, body)
}

async fn call_raw(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();

    (status, bytes.to_vec())
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn get_as(uri: &str, client: &str) -> Request<Body> {
    Request::get(uri)
        .header("x-client-id", client)
        .body(Body::empty())
        .unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn post_json_as(uri: &str, client: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header(CONTENT_TYPE, "application/json")
        .header("x-client-id", client)
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn post_empty(uri: &str, client: Option<&str>) -> Request<Body> {
    let mut request = Request::post(uri);
    if let Some(client) = client {
        request = request.header("x-client-id", client);
    }
    request.body(Body::empty()).unwrap()
}

fn multipart(uri: &str, fields: &[(&str, &str)], image: Option<(&str, &[u8])>) -> Request<Body> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((file_name, bytes)) = image {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"{file_name}\"\r\nContent-Type: image/png\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::post(uri)
        .header(
            CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn create_post(app: &Router) -> i64 {
    let (status, post) = call(
        app,
        multipart(
            "/api/no-login/posts",
            &[
                ("title", "Leftover pizza"),
                ("description", "Free to a good home"),
                ("author", "anon"),
            ],
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    post["id"].as_i64().unwrap()
}

async fn create_poll_post(app: &Router) -> i64 {
    let (status, post) = call(
        app,
        multipart(
            "/api/no-login/posts",
            &[
                ("title", "Pets"),
                ("description", "Settle this"),
                ("author", "anon"),
                ("hasPoll", "true"),
                ("pollQuestion", "Cats or dogs?"),
                ("pollOptions", r#"["Cats", "Dogs", "  "]"#),
            ],
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(post["hasPoll"], json!(true));

    post["id"].as_i64().unwrap()
}

async fn add_reply(app: &Router, post_id: i64, content: &str, parent_id: Option<i64>) -> i64 {
    let (status, reply) = call(
        app,
        post_json(
            &format!("/api/no-login/posts/{post_id}/replies"),
            json!({ "content": content, "author": "anon", "parent_id": parent_id }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{reply}");

    reply["id"].as_i64().unwrap()
}

fn occurrences(haystack: &[u8], needle: &[u8]) -> usize {
    haystack.windows(needle.len()).filter(|w| *w == needle).count()
}

fn contents(nodes: &Value) -> Vec<String> {
    nodes
        .as_array()
        .unwrap()
        .iter()
        .map(|node| node["content"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_posts_list_and_pagination() {
    let h = harness();
    for _ in 0..3 {
        create_post(&h.app).await;
    }

    let (status, body) = call(&h.app, get("/api/no-login/posts?page=1&limit=2")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["posts"].as_array().unwrap().len(), 2);
    assert_eq!(body["pagination"]["total"], json!(3));
    assert_eq!(body["pagination"]["hasMore"], json!(true));

    let (_, body) = call(&h.app, get("/api/no-login/posts?page=2&limit=2")).await;
    assert_eq!(body["posts"].as_array().unwrap().len(), 1);
    assert_eq!(body["pagination"]["hasMore"], json!(false));
}

#[tokio::test]
async fn test_create_post_requires_fields() {
    let h = harness();

    let (status, body) = call(
        &h.app,
        multipart("/api/no-login/posts", &[("title", "Only a title")], None),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"],
        json!("Title, description, and author are required")
    );
}

#[tokio::test]
async fn test_create_post_with_image() {
    let h = harness();

    let (status, post) = call(
        &h.app,
        multipart(
            "/api/no-login/posts",
            &[
                ("title", "Fridge"),
                ("description", "Look"),
                ("author", "anon"),
                ("hasImage", "true"),
            ],
            Some(("shelf.png", b"\x89PNG fake")),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(post["hasImage"], json!(true));

    let url = post["image"].as_str().unwrap();
    let name = url.rsplit('/').next().unwrap();
    assert!(name.ends_with(".png"));

    let (content_type, bytes) = h.blobs.get(name).await.unwrap();
    assert_eq!(content_type, "image/png");
    assert_eq!(bytes, b"\x89PNG fake".to_vec());
}

#[tokio::test]
async fn test_reactions() {
    let h = harness();
    let post_id = create_post(&h.app).await;

    let uri = format!("/api/no-login/posts/{post_id}/reactions");
    call(&h.app, post_empty(&uri, None)).await;
    let (status, body) = call(&h.app, post_empty(&uri, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "reactions": 2 }));

    let (status, body) = call(
        &h.app,
        post_empty("/api/no-login/posts/9999/reactions", None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], json!("Post not found"));
}

#[tokio::test]
async fn test_invalid_post_id() {
    let h = harness();

    let (status, body) = call(&h.app, get("/api/no-login/posts/abc/replies")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("Invalid post ID"));
}

#[tokio::test]
async fn test_reply_tree() {
    let h = harness();
    let post_id = create_post(&h.app).await;

    let first = add_reply(&h.app, post_id, "first", None).await;
    let nested = add_reply(&h.app, post_id, "nested", Some(first)).await;
    add_reply(&h.app, post_id, "deeper", Some(nested)).await;
    add_reply(&h.app, post_id, "second", None).await;
    add_reply(&h.app, post_id, "sibling", Some(first)).await;

    let (status, flat) = call(
        &h.app,
        get(&format!("/api/no-login/posts/{post_id}/replies")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(flat.as_array().unwrap().len(), 5);

    let (status, tree) = call(
        &h.app,
        get(&format!("/api/no-login/posts/{post_id}/replies/tree")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(contents(&tree), ["first", "second"]);
    assert_eq!(contents(&tree[0]["children"]), ["nested", "sibling"]);
    assert_eq!(contents(&tree[0]["children"][0]["children"]), ["deeper"]);
    assert_eq!(tree[1]["children"], json!([]));
    assert_eq!(tree[0]["parent_id"], Value::Null);
}

#[tokio::test]
async fn test_reply_tree_promotes_orphans() {
    let h = harness();
    let post_id = create_post(&h.app).await;

    let root = add_reply(&h.app, post_id, "root", None).await;
    h.store
        .insert_reply(NewReply {
            post_id,
            content: "orphan".to_string(),
            author: "anon".to_string(),
            parent_id: Some(424_242),
        })
        .await
        .unwrap();
    add_reply(&h.app, post_id, "child", Some(root)).await;

    let (_, tree) = call(
        &h.app,
        get(&format!("/api/no-login/posts/{post_id}/replies/tree")),
    )
    .await;

    assert_eq!(contents(&tree), ["root", "orphan"]);
    assert_eq!(contents(&tree[0]["children"]), ["child"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_reply_tree_handles_long_chains() {
    let h = harness();
    let post_id = create_post(&h.app).await;

    let mut parent_id = None;
    for n in 0..10_000 {
        let reply = h
            .store
            .insert_reply(NewReply {
                post_id,
                content: format!("reply {n}"),
                author: "anon".to_string(),
                parent_id,
            })
            .await
            .unwrap();
        parent_id = Some(reply.id);
    }

    let (status, body) = call_raw(
        &h.app,
        get(&format!("/api/no-login/posts/{post_id}/replies/tree")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    assert!(body.starts_with(b"[{"));
    assert!(body.ends_with(b"]}]"));
    assert_eq!(occurrences(&body, b"\"content\":"), 10_000);
    assert_eq!(occurrences(&body, b"\"children\":[]"), 1);
}

#[tokio::test]
async fn test_reply_parent_checks() {
    let h = harness();
    let post_id = create_post(&h.app).await;
    let other_post = create_post(&h.app).await;
    let foreign = add_reply(&h.app, other_post, "elsewhere", None).await;

    let uri = format!("/api/no-login/posts/{post_id}/replies");

    let (status, body) = call(
        &h.app,
        post_json(
            &uri,
            json!({ "content": "hi", "author": "anon", "parent_id": 31337 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("Invalid parent reply"));

    let (status, body) = call(
        &h.app,
        post_json(
            &uri,
            json!({ "content": "hi", "author": "anon", "parent_id": foreign }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"],
        json!("Parent reply must belong to the same post")
    );

    let (status, body) = call(&h.app, post_json(&uri, json!({ "author": "anon" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("Content and author are required"));
}

#[tokio::test]
async fn test_poll_votes_and_tally() {
    let h = harness();
    let post_id = create_poll_post(&h.app).await;
    let uri = format!("/api/no-login/posts/{post_id}/polls");

    let (status, poll) = call(&h.app, get(&uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(poll["question"], json!("Cats or dogs?"));
    assert_eq!(poll["options"], json!(["Cats", "Dogs"]));
    assert_eq!(poll["voteCounts"], json!([0, 0]));
    assert_eq!(poll["totalVotes"], json!(0));
    assert_eq!(poll["hasVoted"], json!(false));

    call(&h.app, post_json(&uri, json!({ "optionIndex": 0 }))).await;
    call(&h.app, post_json(&uri, json!({ "optionIndex": 0 }))).await;
    let (status, tally) = call(
        &h.app,
        post_json_as(&uri, "client-a", json!({ "optionIndex": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tally, json!({ "voteCounts": [2, 1], "totalVotes": 3 }));

    let (_, poll) = call(&h.app, get_as(&uri, "client-a")).await;
    assert_eq!(poll["hasVoted"], json!(true));
    assert_eq!(poll["voteCounts"], json!([2, 1]));

    let (_, poll) = call(&h.app, get_as(&uri, "client-b")).await;
    assert_eq!(poll["hasVoted"], json!(false));

    // repeat votes still count
    let (status, tally) = call(
        &h.app,
        post_json_as(&uri, "client-a", json!({ "optionIndex": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tally["totalVotes"], json!(4));
}

#[tokio::test]
async fn test_vote_rejects_bad_index() {
    let h = harness();
    let post_id = create_poll_post(&h.app).await;
    let uri = format!("/api/no-login/posts/{post_id}/polls");

    for body in [
        json!({ "optionIndex": 2 }),
        json!({ "optionIndex": -1 }),
        json!({ "optionIndex": "one" }),
        json!({}),
    ] {
        let (status, response) = call(&h.app, post_json(&uri, body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(response["error"], json!("Invalid option index"));
    }

    let (_, poll) = call(&h.app, get(&uri)).await;
    assert_eq!(poll["totalVotes"], json!(0));
}

#[tokio::test]
async fn test_poll_missing() {
    let h = harness();
    let post_id = create_post(&h.app).await;
    let uri = format!("/api/no-login/posts/{post_id}/polls");

    let (status, body) = call(&h.app, get(&uri)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], json!("Poll not found"));

    let (status, _) = call(&h.app, post_json(&uri, json!({ "optionIndex": 0 }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_channel_membership() {
    let h = harness();

    let (status, channel) = call(
        &h.app,
        post_json(
            "/api/no-login/channels",
            json!({ "name": "Dorm 4", "description": "Shared fridge" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(channel["member_count"], json!(1));
    let channel_id = channel["id"].as_i64().unwrap();

    let join = format!("/api/no-login/channels/{channel_id}/join");
    let leave = format!("/api/no-login/channels/{channel_id}/leave");

    let (status, change) = call(&h.app, post_empty(&join, Some("client-a"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(change["success"], json!(true));
    assert_eq!(change["channelId"], json!(channel_id));
    assert_eq!(change["message"], json!("Successfully joined channel Dorm 4"));

    // second join from the same client does not count again
    call(&h.app, post_empty(&join, Some("client-a"))).await;

    let (_, channels) = call(&h.app, get("/api/no-login/channels")).await;
    assert_eq!(channels[0]["member_count"], json!(2));

    let (_, joined) = call(&h.app, get_as("/api/no-login/channels/joined", "client-a")).await;
    assert_eq!(joined, json!([channel_id]));

    let (_, joined) = call(&h.app, get("/api/no-login/channels/joined")).await;
    assert_eq!(joined, json!([]));

    let (_, change) = call(&h.app, post_empty(&leave, Some("client-a"))).await;
    assert_eq!(change["message"], json!("Successfully left channel Dorm 4"));

    let (_, channels) = call(&h.app, get("/api/no-login/channels")).await;
    assert_eq!(channels[0]["member_count"], json!(1));

    let (_, joined) = call(&h.app, get_as("/api/no-login/channels/joined", "client-a")).await;
    assert_eq!(joined, json!([]));

    let (status, body) = call(
        &h.app,
        post_empty("/api/no-login/channels/777/join", None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], json!("Channel not found"));

    let (status, body) = call(
        &h.app,
        post_empty("/api/no-login/channels/nope/join", None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("Invalid channel ID"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_joins_count_once() {
    let h = harness_with(Arc::new(LaggyKv(MemoryKv::new())));

    let (_, channel) = call(
        &h.app,
        post_json(
            "/api/no-login/channels",
            json!({ "name": "Kitchen", "description": "Second floor" }),
        ),
    )
    .await;
    let join = format!("/api/no-login/channels/{}/join", channel["id"]);

    let mut tasks = JoinSet::new();
    for _ in 0..16 {
        let app = h.app.clone();
        let request = post_empty(&join, Some("client-a"));
        tasks.spawn(async move { call(&app, request).await.0 });
    }
    while let Some(status) = tasks.join_next().await {
        assert_eq!(status.unwrap(), StatusCode::OK);
    }

    let (_, channels) = call(&h.app, get("/api/no-login/channels")).await;
    assert_eq!(channels[0]["member_count"], json!(2));
}

#[tokio::test]
async fn test_channel_posts_stay_out_of_main_feed() {
    let h = harness();

    let (_, channel) = call(
        &h.app,
        post_json(
            "/api/no-login/channels",
            json!({ "name": "Lab", "description": "Third floor" }),
        ),
    )
    .await;
    let channel_id = channel["id"].as_i64().unwrap();
    let uri = format!("/api/no-login/channels/{channel_id}/posts");

    let (status, post) = call(
        &h.app,
        multipart(
            &uri,
            &[
                ("title", "Yogurt"),
                ("description", "Expires Friday"),
                ("author", "anon"),
            ],
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(post["channel_id"], json!(channel_id));

    let (_, posts) = call(&h.app, get(&uri)).await;
    assert_eq!(posts.as_array().unwrap().len(), 1);

    let (_, feed) = call(&h.app, get("/api/no-login/posts")).await;
    assert_eq!(feed["pagination"]["total"], json!(0));

    let (status, _) = call(
        &h.app,
        multipart(
            "/api/no-login/channels/999/posts",
            &[("title", "t"), ("description", "d"), ("author", "a")],
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_reports() {
    let h = harness();
    let post_id = create_post(&h.app).await;

    let (status, receipt) = call(
        &h.app,
        post_json(
            "/api/reports",
            json!({
                "postId": post_id,
                "postTitle": "Leftover pizza",
                "postAuthor": "anon",
                "category": "spam",
                "reason": "Posted five times",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(receipt["message"], json!("Report submitted successfully"));
    assert_eq!(receipt["report"]["status"], json!("pending"));
    assert_eq!(h.store.reports().await.len(), 1);

    let (status, body) = call(
        &h.app,
        post_json("/api/reports", json!({ "postId": post_id })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "message": "Missing required fields" }));

    let (status, body) = call(
        &h.app,
        post_json(
            "/api/reports",
            json!({
                "postId": post_id,
                "postTitle": "   ",
                "postAuthor": "anon",
                "category": "spam",
                "reason": "blank title",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], json!("Missing required fields"));
    assert_eq!(h.store.reports().await.len(), 1);
}
