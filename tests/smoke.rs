// ABOUTME: End-to-end smoke tests for a full storyloom run through the HTTP router.
// ABOUTME: Drives refine, a lorebook tool call, a rejection, a revision and an approval with a scripted model.

use std::sync::Arc;

use axum::body::Body;
use http::Request;
use storyloom_agent::testing::ScriptedModel;
use storyloom_agent::{
    ChatModel, LorebookLookup, MessageRole, ModelReply, NoLookup, PromptStore, ToolCall, Workflow,
};
use storyloom_server::{AppState, ProviderStatus, create_router};
use tower::ServiceExt;

const REFINED: &str = r#"Here you go: {"summary": "A dragon guards Emberfall", "genre": "fantasy", "style": "epic", "length": "short"}"#;
const FIRST_DRAFT: &str = r#"{"title": "Ashka", "body": "Ashka slept above Emberfall.", "notes": "used lore"}"#;
const REJECT: &str = r#"{"approved": false, "score": 5, "feedback": "Give Ashka a rival.", "issues": ["no conflict"]}"#;
const SECOND_DRAFT: &str = r#"```json
{"title": "Ashka and the Rival", "body": "Ashka woke when the rival came to Emberfall."}
```"#;
const APPROVE: &str = r#"{"approved": true, "score": 8.5, "feedback": "Good.", "issues": []}"#;

/// Helper to extract JSON body from a response.
async fn json_body(resp: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn lore_lookup_call() -> ModelReply {
    ModelReply {
        content: String::new(),
        tool_calls: vec![ToolCall {
            id: "call_0".to_string(),
            name: "search_lorebook".to_string(),
            arguments: serde_json::json!({ "query": "Emberfall dragon" }),
        }],
    }
}

fn scripted_run() -> Arc<ScriptedModel> {
    Arc::new(ScriptedModel::new(vec![
        ModelReply::text(REFINED),
        lore_lookup_call(),
        ModelReply::text(FIRST_DRAFT),
        ModelReply::text(REJECT),
        ModelReply::text(SECOND_DRAFT),
        ModelReply::text(APPROVE),
    ]))
}

fn app_state(model: Arc<ScriptedModel>, lorebook: LorebookLookup) -> Arc<AppState> {
    let chat: Arc<dyn ChatModel> = model;
    let workflow = Workflow::new(chat, Arc::new(lorebook), Arc::new(PromptStore::builtin()));
    Arc::new(AppState::new(Arc::new(workflow), ProviderStatus::detect(), 3))
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

#[tokio::test]
async fn smoke_test_full_run() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("places.md"),
        "Emberfall is a volcanic city guarded by the dragon Ashka.\n\nRiften is a city of thieves.\n",
    )
    .unwrap();
    let lorebook = LorebookLookup::from_dir(dir.path()).unwrap();

    let model = scripted_run();
    let app = create_router(app_state(Arc::clone(&model), lorebook));

    let resp = app
        .oneshot(post_json(
            "/api/runs",
            serde_json::json!({ "user_input": "a dragon story" }),
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let json = json_body(resp).await;
    let state = &json["state"];

    assert_eq!(json["outcome"], "approved");
    assert_eq!(state["is_complete"], true);
    assert_eq!(state["retry_count"], 1);
    assert_eq!(state["request"]["summary"], "A dragon guards Emberfall");
    assert_eq!(state["draft"]["title"], "Ashka and the Rival");
    assert_eq!(state["verdict"]["score"], 8.5);
    assert_eq!(
        state["feedback_history"],
        serde_json::json!(["Give Ashka a rival."])
    );
    assert_eq!(
        state["draft_history"],
        serde_json::json!([
            "Ashka slept above Emberfall.",
            "Ashka woke when the rival came to Emberfall."
        ])
    );

    assert_eq!(model.call_count(), 6);
    let calls = model.recorded_messages();

    // The writer saw the lore passage as a tool result on its second call.
    let tool_result = calls[2]
        .iter()
        .find(|m| m.role == MessageRole::Tool)
        .expect("tool result in history");
    assert_eq!(tool_result.tool_call_id.as_deref(), Some("call_0"));
    assert!(tool_result.content.starts_with("[Lore] Emberfall"));

    // The revision request carries the reviewer's feedback and the previous body.
    let revision_prompt = &calls[4].last().unwrap().content;
    assert!(revision_prompt.contains("Give Ashka a rival."));
    assert!(revision_prompt.contains("Ashka slept above Emberfall."));
}

#[tokio::test]
async fn smoke_test_streamed_run() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("lore.txt"),
        "Emberfall is a volcanic city guarded by the dragon Ashka.",
    )
    .unwrap();
    let lorebook = LorebookLookup::from_dir(dir.path()).unwrap();
    let app = create_router(app_state(scripted_run(), lorebook));

    let resp = app
        .oneshot(post_json(
            "/api/runs/stream",
            serde_json::json!({ "user_input": "a dragon story" }),
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();

    assert!(text.contains("event: tool_invoked"));
    assert!(text.contains("Emberfall dragon"));
    assert_eq!(text.matches("event: draft_written").count(), 2);
    assert_eq!(text.matches("event: draft_reviewed").count(), 2);
    assert_eq!(text.matches("event: run_completed").count(), 1);
}

#[tokio::test]
async fn smoke_test_unreachable_model_still_completes() {
    let chat: Arc<dyn ChatModel> = Arc::new(ScriptedModel::failing());
    let workflow = Workflow::new(chat, Arc::new(NoLookup), Arc::new(PromptStore::builtin()));
    let state = Arc::new(AppState::new(Arc::new(workflow), ProviderStatus::detect(), 2));
    let app = create_router(state);

    let resp = app
        .oneshot(post_json(
            "/api/runs",
            serde_json::json!({ "user_input": "anything" }),
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let json = json_body(resp).await;
    assert_eq!(json["outcome"], "retries_exhausted");
    assert_eq!(json["state"]["retry_count"], 2);
    assert_eq!(json["state"]["request"]["summary"], "anything");
    assert_eq!(json["state"]["verdict"]["approved"], false);
}
