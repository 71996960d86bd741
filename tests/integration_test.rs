use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use zenjournal::client::{ClientError, JournalClient};
use zenjournal::config::ClientConfig;
use zenjournal::credentials::{Credential, CredentialStore, MemoryCredentialStore};
use zenjournal::models::JournalEntryDraft;
use zenjournal::plans::{GenerationState, WorkflowError};
use zenjournal::scripted::ScriptedBackend;
use zenjournal::session::SessionState;
use zenjournal::transport::{Body, Method};

fn entry_json(id: &str, title: &str, content: &str, tags: &[&str]) -> Value {
    json!({
        "id": id,
        "title": title,
        "content": content,
        "mood_rating": 7,
        "tags": tags,
        "created_at": "2024-03-01T08:30:00",
        "updated_at": "2024-03-01T08:30:00"
    })
}

fn plan_json(id: &str) -> Value {
    json!({
        "id": id,
        "title": "Steady Ground",
        "analysis": "Mood has been stable across the week.",
        "recommendations": ["Keep the morning walk", "Journal before bed"],
        "generated_at": "2024-03-02T09:00:00",
        "zen_insight": "Water shapes stone by persistence"
    })
}

fn script_login(backend: &ScriptedBackend) {
    backend
        .respond(
            Method::Post,
            "/auth/login",
            200,
            json!({"access_token": "tok-kira", "token_type": "bearer"}),
        )
        .respond(
            Method::Get,
            "/auth/me",
            200,
            json!({
                "id": "u1",
                "username": "kira",
                "email": "kira@example.com",
                "traits": {"openness": 7, "conscientiousness": 6, "extraversion": 4,
                           "agreeableness": 8, "neuroticism": 3},
                "created_at": "2024-01-15T12:00:00Z"
            }),
        );
}

fn new_client(
    backend: &Arc<ScriptedBackend>,
    store: &Arc<MemoryCredentialStore>,
) -> JournalClient {
    JournalClient::with_backend(ClientConfig::default(), backend.clone(), store.clone()).unwrap()
}

async fn logged_in() -> (JournalClient, Arc<ScriptedBackend>, Arc<MemoryCredentialStore>) {
    let backend = Arc::new(ScriptedBackend::new());
    let store = Arc::new(MemoryCredentialStore::new());
    script_login(&backend);
    let mut client = new_client(&backend, &store);
    client.login("kira", "zen123").await.unwrap();
    (client, backend, store)
}

/// Login persists the credential and every later call carries it
#[tokio::test]
async fn test_login_then_authenticated_calls() {
    let (mut client, backend, store) = logged_in().await;

    assert_eq!(client.session().state(), SessionState::Authenticated);
    assert_eq!(client.identity().unwrap().username, "kira");
    assert_eq!(store.load().unwrap().unwrap().as_str(), "tok-kira");

    let login = &backend.requests()[0];
    assert_eq!(login.path, "/auth/login");
    assert_eq!(login.bearer, None);
    assert_eq!(
        login.body,
        Body::Form(vec![
            ("username".to_string(), "kira".to_string()),
            ("password".to_string(), "zen123".to_string()),
        ])
    );

    backend.respond(Method::Get, "/journal/", 200, json!([]));
    client.list_entries(None).await.unwrap();
    let list = backend.requests().pop().unwrap();
    assert_eq!(list.bearer.as_deref(), Some("tok-kira"));
}

/// Create prepends the server copy, delete removes it, search stays local
#[tokio::test]
async fn test_journal_create_search_delete() {
    let (mut client, backend, _) = logged_in().await;
    backend
        .respond(
            Method::Get,
            "/journal/",
            200,
            json!([entry_json("e1", "Busy day", "Too many meetings", &["work"])]),
        )
        .respond(
            Method::Post,
            "/journal/",
            200,
            entry_json("e2", "Morning walk", "Felt calm by the river", &["nature"]),
        )
        .respond(
            Method::Delete,
            "/journal/e2",
            200,
            json!({"message": "Journal entry deleted successfully"}),
        );

    client.list_entries(None).await.unwrap();
    let draft = JournalEntryDraft::new("Morning walk", "Felt calm by the river").with_mood(8);
    let created = client.create_entry(&draft).await.unwrap();
    assert_eq!(created.id, "e2");

    let ids: Vec<&str> = client.journal().items().iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["e2", "e1"]);

    let before = backend.requests().len();
    let hits = client.search_entries("CALM");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "e2");
    assert_eq!(backend.requests().len(), before);

    client.delete_entry("e2").await.unwrap();
    let ids: Vec<&str> = client.journal().items().iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["e1"]);
}

/// The server's explanation for a refused plan reaches the user verbatim
#[tokio::test]
async fn test_generate_failure_surfaces_detail() {
    let (mut client, backend, _) = logged_in().await;
    backend.respond(
        Method::Post,
        "/strategic-plan/generate",
        400,
        json!({"detail": "Not enough journal entries"}),
    );

    let err = client.generate_plan().await.unwrap_err();
    assert_eq!(err.display_message(), "Not enough journal entries");
    assert!(client.plans().current().is_none());
    assert_eq!(client.plans().state(), GenerationState::Idle);
    assert!(client.session().is_authenticated());
}

#[tokio::test]
async fn test_plan_generation_is_single_flight() {
    let backend = Arc::new(ScriptedBackend::new().with_latency(Duration::from_millis(30)));
    let store = Arc::new(MemoryCredentialStore::new());
    script_login(&backend);
    backend.respond(Method::Post, "/strategic-plan/generate", 200, plan_json("p1"));
    let mut client = new_client(&backend, &store);
    client.login("kira", "zen123").await.unwrap();

    let plans = client.plans();
    let (first, second) = tokio::join!(plans.generate(), plans.generate());

    assert_eq!(first.unwrap().id, "p1");
    assert!(matches!(second, Err(WorkflowError::AlreadyGenerating)));
    assert_eq!(backend.calls(Method::Post, "/strategic-plan/generate"), 1);
    assert_eq!(plans.current().unwrap().id, "p1");
    assert_eq!(plans.history().len(), 1);
}

/// Logout clears the stored credential, so the next launch starts signed out
#[tokio::test]
async fn test_logout_survives_restart() {
    let (mut client, backend, store) = logged_in().await;
    client.logout();
    assert_eq!(client.session().state(), SessionState::Unauthenticated);
    assert!(store.load().unwrap().is_none());

    let mut relaunched = new_client(&backend, &store);
    assert!(!relaunched.session().is_loading());
    assert_eq!(relaunched.restore().await, SessionState::Unauthenticated);
    assert!(matches!(
        relaunched.list_entries(None).await,
        Err(ClientError::NotAuthenticated)
    ));
}

/// A saved credential is restored on the next launch
#[tokio::test]
async fn test_restore_from_saved_credential() {
    let backend = Arc::new(ScriptedBackend::new());
    let store = Arc::new(MemoryCredentialStore::with_credential(Credential::new("tok-kira")));
    script_login(&backend);

    let mut client = new_client(&backend, &store);
    assert!(client.session().is_loading());
    assert_eq!(client.restore().await, SessionState::Authenticated);
    assert_eq!(client.identity().unwrap().email, "kira@example.com");
    assert_eq!(backend.calls(Method::Post, "/auth/login"), 0);
}

/// A rejected credential on restore leaves nothing behind
#[tokio::test]
async fn test_restore_with_revoked_credential() {
    let backend = Arc::new(ScriptedBackend::new());
    let store = Arc::new(MemoryCredentialStore::with_credential(Credential::new("tok-old")));
    backend.respond(
        Method::Get,
        "/auth/me",
        401,
        json!({"detail": "Could not validate credentials"}),
    );

    let mut client = new_client(&backend, &store);
    assert_eq!(client.restore().await, SessionState::Unauthenticated);
    assert!(client.identity().is_none());
    assert!(store.load().unwrap().is_none());
}

#[tokio::test]
async fn test_wrong_password() {
    let backend = Arc::new(ScriptedBackend::new());
    let store = Arc::new(MemoryCredentialStore::new());
    backend.respond(
        Method::Post,
        "/auth/login",
        401,
        json!({"detail": "Incorrect username or password"}),
    );

    let mut client = new_client(&backend, &store);
    let err = client.login("kira", "nope").await.unwrap_err();
    assert_eq!(err.display_message(), "Incorrect username or password");
    assert_eq!(client.session().state(), SessionState::Unauthenticated);
    assert!(store.load().unwrap().is_none());
    assert_eq!(backend.calls(Method::Get, "/auth/me"), 0);
}
