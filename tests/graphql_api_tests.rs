//! Integration tests for the GraphQL API
//!
//! These tests drive the full Axum app in memory:
//! - Auth gate decisions before execution
//! - User and post CRUD with error codes
//! - Eager loading of nested relations
//! - `postCreated` subscriptions

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use futures::StreamExt;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tower::ServiceExt;

use postboard::app::{AppState, build_app};
use postboard::config::{AuthSettings, Config};
use postboard::db::Database;
use postboard::db::schema_sync::sync_schema;
use postboard::graphql::{AuthGate, AuthPolicy, PostNotifications, PostboardSchema, build_schema};
use postboard::services::{NotificationChannel, NotificationChannelConfig};

const SECRET: &str = "integration-secret";
const AUDIENCE: &str = "my-audience";

struct TestApp {
    router: Router,
    db: Database,
    schema: PostboardSchema,
    notifications: PostNotifications,
}

fn test_config(policy: AuthPolicy) -> Config {
    Config {
        port: 0,
        graphql_path: "/graphql".to_string(),
        database_url: "sqlite::memory:".to_string(),
        database_max_connections: 1,
        notification_topic: "POST_CREATED".to_string(),
        notification_capacity: 16,
        log_json: false,
        auth: AuthSettings {
            jwt_secret: SECRET.to_string(),
            jwt_public_key: None,
            audience: AUDIENCE.to_string(),
            reject_on_missing_token: policy.reject_on_missing_token,
            reject_on_invalid_token: policy.reject_on_invalid_token,
        },
    }
}

async fn setup(policy: AuthPolicy) -> TestApp {
    let config = Arc::new(test_config(policy));
    let db = Database::connect_in_memory().await.unwrap();
    sync_schema(&db).await.unwrap();

    let notifications: PostNotifications =
        NotificationChannel::new(NotificationChannelConfig::default());
    let schema = build_schema(db.clone(), notifications.clone());
    let auth = Arc::new(AuthGate::new(&config.auth).unwrap());

    let router = build_app(AppState {
        config,
        schema: schema.clone(),
        auth,
    });

    TestApp {
        router,
        db,
        schema,
        notifications,
    }
}

fn token() -> String {
    encode(
        &Header::new(Algorithm::HS256),
        &json!({"sub": "tester", "aud": AUDIENCE}),
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

fn bearer() -> String {
    format!("Bearer {}", token())
}

impl TestApp {
    /// POST a GraphQL document and return status plus decoded body
    async fn post(&self, query: &str, authorization: Option<&str>) -> (StatusCode, Value) {
        let mut request = Request::builder()
            .method(Method::POST)
            .uri("/graphql")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(value) = authorization {
            request = request.header(header::AUTHORIZATION, value);
        }
        let request = request
            .body(Body::from(json!({ "query": query }).to_string()))
            .unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    /// Authenticated request that must succeed without GraphQL errors
    async fn ok(&self, query: &str) -> Value {
        let (status, body) = self.post(query, Some(&bearer())).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.get("errors").is_none(), "unexpected errors: {body}");
        body["data"].clone()
    }

    /// Authenticated request that must fail; returns the first error's code
    async fn error_code(&self, query: &str) -> String {
        let (_, body) = self.post(query, Some(&bearer())).await;
        body["errors"][0]["extensions"]["code"]
            .as_str()
            .unwrap_or_default()
            .to_string()
    }

    async fn create_user(&self, name: &str, email: &str) -> i64 {
        let data = self
            .ok(&format!(
                r#"mutation {{ createUser(name: "{name}", email: "{email}") {{ id }} }}"#
            ))
            .await;
        data["createUser"]["id"].as_i64().unwrap()
    }
}

// ============================================================================
// HTTP Surface
// ============================================================================

mod http_surface {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_root_says_hello_without_auth() {
        let app = setup(AuthPolicy::default()).await;
        let response = app
            .router
            .clone()
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"Hello World!");
    }

    #[tokio::test]
    async fn test_cors_allows_any_origin() {
        let app = setup(AuthPolicy::default()).await;
        let response = app
            .router
            .clone()
            .oneshot(
                Request::get("/")
                    .header(header::ORIGIN, "http://example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .and_then(|v| v.to_str().ok()),
            Some("*")
        );
    }

    #[tokio::test]
    async fn test_graphiql_for_browsers() {
        let app = setup(AuthPolicy::default()).await;
        let response = app
            .router
            .clone()
            .oneshot(
                Request::get("/graphql")
                    .header(header::ACCEPT, "text/html")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&bytes).contains("graphiql"));
    }

    #[tokio::test]
    async fn test_query_over_get_passes_the_gate() {
        let app = setup(AuthPolicy::default()).await;
        app.create_user("Ada", "ada@example.com").await;

        let request = |auth: Option<String>| {
            let mut builder = Request::get("/graphql?query=%7Busers%7Bname%7D%7D");
            if let Some(value) = auth {
                builder = builder.header(header::AUTHORIZATION, value);
            }
            builder.body(Body::empty()).unwrap()
        };

        let denied = app.router.clone().oneshot(request(None)).await.unwrap();
        assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

        let allowed = app
            .router
            .clone()
            .oneshot(request(Some(bearer())))
            .await
            .unwrap();
        assert_eq!(allowed.status(), StatusCode::OK);
        let bytes = to_bytes(allowed.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["data"]["users"], json!([{"name": "Ada"}]));
    }

    #[tokio::test]
    async fn test_mutation_over_get_not_allowed() {
        let app = setup(AuthPolicy::default()).await;
        let request = Request::get(
            "/graphql?query=mutation%7BcreateUser(name:%22x%22,email:%22x@x%22)%7Bid%7D%7D",
        )
        .header(header::AUTHORIZATION, bearer())
        .body(Body::empty())
        .unwrap();

        let response = app.router.clone().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(
            response
                .headers()
                .get(header::ALLOW)
                .and_then(|v| v.to_str().ok()),
            Some("POST")
        );
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert!(body["errors"][0]["message"].is_string());
        assert_eq!(app.db.users().count().await.unwrap(), 0);
    }
}

// ============================================================================
// Auth Gate
// ============================================================================

mod auth_gate {
    use super::*;
    use pretty_assertions::assert_eq;

    const CREATE: &str = r#"mutation { createUser(name: "Eve", email: "eve@example.com") { id } }"#;

    #[tokio::test]
    async fn test_missing_token_rejected_before_execution() {
        let app = setup(AuthPolicy::default()).await;
        let (status, body) = app.post(CREATE, None).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["errors"][0]["message"], json!("Unauthenticated"));
        assert_eq!(
            body["errors"][0]["extensions"]["code"],
            json!("UNAUTHENTICATED")
        );
        assert_eq!(app.db.users().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_invalid_tokens_rejected() {
        let app = setup(AuthPolicy::default()).await;

        let wrong_secret = encode(
            &Header::new(Algorithm::HS256),
            &json!({"aud": AUDIENCE}),
            &EncodingKey::from_secret(b"some-other-secret"),
        )
        .unwrap();
        let wrong_audience = encode(
            &Header::new(Algorithm::HS256),
            &json!({"aud": "someone-else"}),
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        for value in [
            format!("Bearer {wrong_secret}"),
            format!("Bearer {wrong_audience}"),
            format!("Token {}", token()),
            "Bearer not.a.jwt".to_string(),
        ] {
            let (status, body) = app.post(CREATE, Some(&value)).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "accepted {value}");
            assert_eq!(
                body["errors"][0]["extensions"]["code"],
                json!("UNAUTHENTICATED")
            );
        }
        assert_eq!(app.db.users().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_permissive_policy_executes_anonymously() {
        let app = setup(AuthPolicy::permissive()).await;

        let (status, body) = app.post(CREATE, None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["data"]["createUser"]["id"].is_number());

        let (status, _) = app.post("{ users { id } }", Some("Bearer garbage")).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_valid_token_executes() {
        let app = setup(AuthPolicy::default()).await;
        let (status, body) = app.post(CREATE, Some(&bearer())).await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.get("errors").is_none());
        assert_eq!(app.db.users().count().await.unwrap(), 1);
    }
}

// ============================================================================
// Users
// ============================================================================

mod users {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_create_then_fetch() {
        let app = setup(AuthPolicy::default()).await;
        let id = app.create_user("Ada", "ada@example.com").await;

        let data = app
            .ok(&format!(
                "{{ user(id: {id}) {{ id name email createdAt updatedAt }} }}"
            ))
            .await;
        let user = &data["user"];
        assert_eq!(user["name"], json!("Ada"));
        assert_eq!(user["email"], json!("ada@example.com"));
        assert_matches!(
            chrono::DateTime::parse_from_rfc3339(user["createdAt"].as_str().unwrap()),
            Ok(_)
        );
        assert_eq!(user["createdAt"], user["updatedAt"]);

        let data = app.ok("{ user(id: 999) { id } }").await;
        assert_eq!(data["user"], Value::Null);
    }

    #[tokio::test]
    async fn test_duplicate_email_is_conflict() {
        let app = setup(AuthPolicy::default()).await;
        app.create_user("Ada", "ada@example.com").await;

        let code = app
            .error_code(r#"mutation { createUser(name: "Other", email: "ada@example.com") { id } }"#)
            .await;
        assert_eq!(code, "CONFLICT");
        assert_eq!(app.db.users().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_update_changes_only_given_fields() {
        let app = setup(AuthPolicy::default()).await;
        let id = app.create_user("Ada", "ada@example.com").await;

        let data = app
            .ok(&format!(
                r#"mutation {{ updateUser(id: {id}, name: "Ada Lovelace") {{ name email }} }}"#
            ))
            .await;
        assert_eq!(
            data["updateUser"],
            json!({"name": "Ada Lovelace", "email": "ada@example.com"})
        );
    }

    #[tokio::test]
    async fn test_update_missing_user_is_not_found() {
        let app = setup(AuthPolicy::default()).await;

        let code = app
            .error_code(r#"mutation { updateUser(id: 41, name: "Ghost") { id } }"#)
            .await;
        assert_eq!(code, "NOT_FOUND");
        assert_eq!(app.db.users().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_twice() {
        let app = setup(AuthPolicy::default()).await;
        let id = app.create_user("Ada", "ada@example.com").await;
        let delete = format!("mutation {{ deleteUser(id: {id}) {{ id name }} }}");

        let data = app.ok(&delete).await;
        assert_eq!(data["deleteUser"], json!({"id": id, "name": "Ada"}));

        assert_eq!(app.error_code(&delete).await, "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_delete_removes_posts() {
        let app = setup(AuthPolicy::default()).await;
        let id = app.create_user("Ada", "ada@example.com").await;
        app.ok(&format!(
            r#"mutation {{ createPost(title: "Hi", content: "World", authorId: {id}) {{ id }} }}"#
        ))
        .await;

        app.ok(&format!("mutation {{ deleteUser(id: {id}) {{ id }} }}"))
            .await;

        let data = app.ok("{ posts { id } }").await;
        assert_eq!(data["posts"], json!([]));
    }
}

// ============================================================================
// Posts
// ============================================================================

mod posts {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_create_post_resolves_author() {
        let app = setup(AuthPolicy::default()).await;
        let id = app.create_user("Ada", "ada@example.com").await;

        let data = app
            .ok(&format!(
                r#"mutation {{ createPost(title: "Hi", content: "World", authorId: {id}) {{ title authorId author {{ id name }} }} }}"#
            ))
            .await;
        assert_eq!(
            data["createPost"],
            json!({"title": "Hi", "authorId": id, "author": {"id": id, "name": "Ada"}})
        );
    }

    #[tokio::test]
    async fn test_create_post_for_unknown_author() {
        let app = setup(AuthPolicy::default()).await;

        let code = app
            .error_code(r#"mutation { createPost(title: "Hi", content: "World", authorId: 77) { id } }"#)
            .await;
        assert_eq!(code, "INVALID_REFERENCE");

        let data = app.ok("{ posts { id } }").await;
        assert_eq!(data["posts"], json!([]));
    }

    #[tokio::test]
    async fn test_post_by_id() {
        let app = setup(AuthPolicy::default()).await;
        let id = app.create_user("Ada", "ada@example.com").await;
        let data = app
            .ok(&format!(
                r#"mutation {{ createPost(title: "Hi", content: "World", authorId: {id}) {{ id }} }}"#
            ))
            .await;
        let post_id = data["createPost"]["id"].as_i64().unwrap();

        let data = app
            .ok(&format!(
                "{{ post(id: {post_id}) {{ content author {{ email }} }} }}"
            ))
            .await;
        assert_eq!(
            data["post"],
            json!({"content": "World", "author": {"email": "ada@example.com"}})
        );

        let data = app.ok("{ post(id: 500) { id } }").await;
        assert_eq!(data["post"], Value::Null);
    }

    #[tokio::test]
    async fn test_nested_relations() {
        let app = setup(AuthPolicy::default()).await;
        let ada = app.create_user("Ada", "ada@example.com").await;
        let bob = app.create_user("Bob", "bob@example.com").await;
        for (title, author) in [("First", ada), ("Second", ada), ("Third", bob)] {
            app.ok(&format!(
                r#"mutation {{ createPost(title: "{title}", content: "...", authorId: {author}) {{ id }} }}"#
            ))
            .await;
        }

        let data = app.ok("{ users { name posts { title } } }").await;
        assert_eq!(
            data["users"],
            json!([
                {"name": "Ada", "posts": [{"title": "First"}, {"title": "Second"}]},
                {"name": "Bob", "posts": [{"title": "Third"}]},
            ])
        );

        let data = app
            .ok(&format!(
                "{{ user(id: {bob}) {{ posts {{ title author {{ name posts {{ title }} }} }} }} }}"
            ))
            .await;
        assert_eq!(
            data["user"]["posts"][0]["author"],
            json!({"name": "Bob", "posts": [{"title": "Third"}]})
        );
    }
}

// ============================================================================
// Subscriptions
// ============================================================================

mod subscriptions {
    use super::*;
    use pretty_assertions::assert_eq;

    const SUBSCRIBE: &str = "subscription { postCreated { title content author { name } } }";

    async fn wait_for_subscribers(notifications: &PostNotifications, expected: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while notifications.subscriber_count() != expected {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("subscriber count never reached");
    }

    #[tokio::test]
    async fn test_subscriber_receives_created_post_once() {
        let app = setup(AuthPolicy::default()).await;
        let ada = app.create_user("Ada", "ada@example.com").await;

        let mut stream = app.schema.execute_stream(SUBSCRIBE);
        let listener = tokio::spawn(async move {
            let first = stream.next().await;
            let second = tokio::time::timeout(Duration::from_millis(100), stream.next()).await;
            (first, second.is_err())
        });
        wait_for_subscribers(&app.notifications, 1).await;

        app.ok(&format!(
            r#"mutation {{ createPost(title: "Hi", content: "World", authorId: {ada}) {{ id }} }}"#
        ))
        .await;

        let (first, nothing_else) = listener.await.unwrap();
        let response = first.unwrap();
        assert!(response.errors.is_empty());
        assert_eq!(
            response.data.into_json().unwrap(),
            json!({"postCreated": {"title": "Hi", "content": "World", "author": {"name": "Ada"}}})
        );
        assert!(nothing_else);
    }

    #[tokio::test]
    async fn test_late_subscriber_gets_nothing() {
        let app = setup(AuthPolicy::default()).await;
        let ada = app.create_user("Ada", "ada@example.com").await;
        app.ok(&format!(
            r#"mutation {{ createPost(title: "Early", content: "...", authorId: {ada}) {{ id }} }}"#
        ))
        .await;

        let mut stream = app.schema.execute_stream(SUBSCRIBE);
        let received = tokio::time::timeout(Duration::from_millis(100), stream.next()).await;
        assert!(received.is_err());
    }

    #[tokio::test]
    async fn test_dropping_subscription_releases_slot() {
        let app = setup(AuthPolicy::default()).await;

        let mut stream = app.schema.execute_stream(SUBSCRIBE);
        let listener = tokio::spawn(async move {
            let _ = tokio::time::timeout(Duration::from_millis(500), stream.next()).await;
        });
        wait_for_subscribers(&app.notifications, 1).await;

        listener.await.unwrap();
        assert_eq!(app.notifications.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_create_publishes_nothing() {
        let app = setup(AuthPolicy::default()).await;

        let mut stream = app.schema.execute_stream(SUBSCRIBE);
        let listener = tokio::spawn(async move {
            tokio::time::timeout(Duration::from_millis(150), stream.next())
                .await
                .is_err()
        });
        wait_for_subscribers(&app.notifications, 1).await;

        let code = app
            .error_code(r#"mutation { createPost(title: "Hi", content: "World", authorId: 9) { id } }"#)
            .await;
        assert_eq!(code, "INVALID_REFERENCE");
        assert!(listener.await.unwrap());
    }
}

// ============================================================================
// End to end
// ============================================================================

#[tokio::test]
async fn test_author_post_round_trip() {
    let app = setup(AuthPolicy::default()).await;
    let ada = app.create_user("Ada", "ada@example.com").await;

    app.ok(&format!(
        r#"mutation {{ createPost(title: "Hi", content: "World", authorId: {ada}) {{ id }} }}"#
    ))
    .await;

    let data = app.ok("{ posts { title content author { name } } }").await;
    assert_eq!(
        data["posts"],
        json!([{"title": "Hi", "content": "World", "author": {"name": "Ada"}}])
    );
}
