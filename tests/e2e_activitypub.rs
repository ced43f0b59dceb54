//! E2E tests for ForgeFed documents
//!
//! - Actor document and collections
//! - Repository, ticket and note documents
//! - authorize_interaction

mod common;

use common::{REMOTE, RemotePeer, TestServer};
use forgefed::data::{Comment, Issue};
use serde_json::{Value, json};

#[tokio::test]
async fn test_actor_document() {
    let server = TestServer::new().await;
    server.create_local_user("alice").await;

    let response = server.get("/actor/alice").await;
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["content-type"],
        "application/activity+json"
    );

    let actor: Value = response.json().await.unwrap();
    let iri = server.iri("/actor/alice");
    assert_eq!(actor["@context"].as_array().unwrap().len(), 3);
    assert_eq!(actor["type"], "Person");
    assert_eq!(actor["id"], iri);
    assert_eq!(actor["preferredUsername"], "alice");
    assert_eq!(actor["location"], format!("alice@{}", server.domain));
    assert_eq!(actor["inbox"], format!("{}/inbox", iri));
    assert_eq!(actor["liked"], format!("{}/liked", iri));
    assert_eq!(actor["icon"]["mediaType"], "image/png");
    assert_eq!(actor["publicKey"]["id"], format!("{}#main-key", iri));
    assert_eq!(actor["publicKey"]["owner"], iri);
    assert!(
        actor["publicKey"]["publicKeyPem"]
            .as_str()
            .unwrap()
            .starts_with("-----BEGIN PUBLIC KEY-----")
    );
}

#[tokio::test]
async fn test_unknown_actor_is_not_found() {
    let server = TestServer::new().await;

    let response = server.get("/actor/nobody").await;
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_collections() {
    let server = TestServer::new().await;
    let alice = server.create_local_user("alice").await;
    let carol = server.create_local_user("carol").await;
    let public = server.create_repository(&carol, "public", false).await;
    let private = server.create_repository(&carol, "private", true).await;
    let db = &server.state.db;
    db.follow_user(&carol.id, &alice.id).await.unwrap();
    db.star_repo(&alice.id, &public.id, true).await.unwrap();
    db.star_repo(&alice.id, &private.id, true).await.unwrap();

    let followers: Value = server.get("/actor/alice/followers").await.json().await.unwrap();
    assert_eq!(followers["type"], "OrderedCollection");
    assert_eq!(followers["totalItems"], 1);
    assert_eq!(followers["orderedItems"][0]["id"], server.iri("/actor/carol"));

    let following: Value = server.get("/actor/alice/following").await.json().await.unwrap();
    assert_eq!(following["totalItems"], 0);

    let liked: Value = server.get("/actor/alice/liked").await.json().await.unwrap();
    assert_eq!(liked["totalItems"], 1);
    assert_eq!(liked["orderedItems"][0]["type"], "Repository");
    assert_eq!(liked["orderedItems"][0]["id"], server.iri("/repo/carol/public"));
}

#[tokio::test]
async fn test_outboxes_are_not_implemented() {
    let server = TestServer::new().await;
    let alice = server.create_local_user("alice").await;
    server.create_repository(&alice, "widgets", false).await;

    for path in [
        "/actor/alice/outbox",
        "/repo/alice/widgets/outbox",
        "/repo/alice/widgets/followers",
    ] {
        assert_eq!(server.get(path).await.status(), 501, "{path}");
    }
}

#[tokio::test]
async fn test_repository_document() {
    let server = TestServer::new().await;
    let alice = server.create_local_user("alice").await;
    server.create_repository(&alice, "widgets", false).await;
    server.create_repository(&alice, "secret", true).await;

    let repo: Value = server.get("/repo/alice/widgets").await.json().await.unwrap();
    let iri = server.iri("/repo/alice/widgets");
    assert_eq!(repo["type"], "Repository");
    assert_eq!(repo["id"], iri);
    assert_eq!(repo["name"], "widgets");
    assert_eq!(repo["attributedTo"], server.iri("/actor/alice"));
    assert_eq!(repo["inbox"], format!("{}/inbox", iri));
    assert_eq!(repo["team"], format!("{}/team", iri));
    assert!(repo.get("forkedFrom").is_none());

    assert_eq!(server.get("/repo/alice/secret").await.status(), 404);
}

#[tokio::test]
async fn test_ticket_and_note_documents() {
    let server = TestServer::new().await;
    let alice = server.create_local_user("alice").await;
    let repo = server.create_repository(&alice, "widgets", false).await;
    let db = &server.state.db;

    let mut issue = Issue::new(&repo.id, 7, &alice.id);
    issue.title = "Broken build".to_string();
    issue.content = "It fails".to_string();
    let (issue, _) = db.insert_issue_if_absent(&issue).await.unwrap();
    let (other, _) = db
        .insert_issue_if_absent(&Issue::new(&repo.id, 8, &alice.id))
        .await
        .unwrap();
    let (comment, _) = db
        .insert_comment_if_absent(&Comment::new(&issue.id, &alice.id, "On it"))
        .await
        .unwrap();

    let ticket: Value = server.get("/ticket/alice/widgets/7").await.json().await.unwrap();
    let ticket_iri = server.iri("/ticket/alice/widgets/7");
    assert_eq!(ticket["type"], "Ticket");
    assert_eq!(ticket["id"], ticket_iri);
    assert_eq!(ticket["name"], "#7");
    assert_eq!(ticket["summary"], "Broken build");
    assert_eq!(ticket["context"], server.iri("/repo/alice/widgets"));
    assert_eq!(ticket["attributedTo"], server.iri("/actor/alice"));

    let note: Value = server
        .get(&format!("/ticket/alice/widgets/7/{}", comment.id))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(note["type"], "Note");
    assert_eq!(note["content"], "On it");
    assert_eq!(note["context"], ticket_iri);

    let response = server
        .get(&format!("/ticket/alice/widgets/{}/{}", other.idx, comment.id))
        .await;
    assert_eq!(response.status(), 404);
    assert_eq!(server.get("/ticket/alice/widgets/99").await.status(), 404);
}

#[tokio::test]
async fn test_authorize_interaction_mirrors_remote_person() {
    let server = TestServer::new().await;
    let bob = RemotePeer::publish(&server.transport, "bob").await;

    let response = server
        .client
        .get(server.url("/authorize_interaction"))
        .query(&[("uri", bob.actor_iri.as_str())])
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 303);
    assert_eq!(
        response.headers()["location"],
        server.iri(&format!("/{}", bob.local_name())).as_str()
    );
    assert!(
        server
            .state
            .db
            .get_user_by_iri(&bob.actor_iri)
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn test_authorize_interaction_mirrors_remote_repository() {
    let server = TestServer::new().await;
    let bob = RemotePeer::publish(&server.transport, "bob").await;
    let repo_iri = format!("{}/repo/bob/widgets", REMOTE);
    server.transport.insert_json(
        &repo_iri,
        &json!({
            "type": "Repository",
            "id": repo_iri,
            "name": "widgets",
            "attributedTo": bob.actor_iri,
        }),
    );

    let response = server
        .client
        .get(server.url("/authorize_interaction"))
        .query(&[("uri", repo_iri.as_str())])
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 303);
    assert_eq!(
        response.headers()["location"],
        server
            .iri(&format!("/{}/widgets", bob.local_name()))
            .as_str()
    );
}

#[tokio::test]
async fn test_authorize_interaction_rejects_unsupported_types() {
    let server = TestServer::new().await;
    let uri = format!("{}/event/1", REMOTE);
    server
        .transport
        .insert_json(&uri, &json!({ "type": "Event", "id": uri }));

    let response = server
        .client
        .get(server.url("/authorize_interaction"))
        .query(&[("uri", uri.as_str())])
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 500);
}
