mod common;

use async_trait::async_trait;
use common::{LISTINGS, MockBrowser};
use scrapeflow::actions::{ActionContext, ActionHandler, Capability, Params};
use scrapeflow::browser::Browser;
use scrapeflow::dsl::builder::WorkflowBuilder;
use scrapeflow::dsl::{EngineSettings, NextState, NullPolicy};
use scrapeflow::error::{NavigationError, WorkflowError};
use scrapeflow::extract::PathKind;
use scrapeflow::runtime::{ConfigStore, Engine, ExecutionContext, Outcome};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};

fn engine_with(browser: MockBrowser) -> Engine {
    Engine::with_standard_actions(Arc::new(browser), reqwest::Client::new())
}

/// Stands in for `call_api`, returning canned results in order and
/// recording the parameters it was given.
#[derive(Debug)]
struct ScriptedApi {
    results: Mutex<Vec<Value>>,
    seen: Arc<Mutex<Vec<Params>>>,
}

impl ScriptedApi {
    fn new(results: Vec<Value>) -> (Self, Arc<Mutex<Vec<Params>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let api = Self {
            results: Mutex::new(results.into_iter().rev().collect()),
            seen: seen.clone(),
        };
        (api, seen)
    }
}

#[async_trait]
impl ActionHandler for ScriptedApi {
    fn capability(&self) -> Capability {
        Capability::CallApi
    }

    fn validate(&self, _params: &Params) -> anyhow::Result<()> {
        Ok(())
    }

    async fn execute(&self, params: Params, _ctx: &ActionContext<'_>) -> anyhow::Result<Value> {
        self.seen.lock().unwrap().push(params);
        Ok(self.results.lock().unwrap().pop().unwrap_or(Value::Null))
    }
}

#[tokio::test]
async fn test_null_result_transitions_to_done() {
    let config = WorkflowBuilder::new("open")
        .state("open", "goto_link").param("link", "http://site/missing")
            .next_state(NextState::on_null(Some("done"), Some("retry")))
            .build()
        .state("retry", "goto_link").param("link", "http://site/other").build()
        .state("done", "goto_link").param("link", "http://site/home").build()
        .build();

    let engine = engine_with(MockBrowser::new().page("http://site/home", "<html><body></body></html>"));
    let report = engine.run_with(config).await.unwrap();

    assert_eq!(report.outcome, Outcome::Completed);
    assert_eq!(report.history["open"], Value::Null);
    assert_eq!(report.history["done"], json!({"url": "http://site/home"}));
    assert!(!report.history.contains_key("retry"));
    assert_eq!(report.steps, 2);
}

#[tokio::test]
async fn test_previous_result_feeds_the_next_step() {
    let config = WorkflowBuilder::new("open")
        .state("open", "goto_link").param("link", "http://site/list").next("scrape").build()
        .state("scrape", "scrap_page").param("by", "TAG_NAME").param("value", "body").next("extract").build()
        .state("extract", "extract_data")
            .previous_result("raw_data")
            .param("selectors", json!([{"tag": "div", "class": "listing"}]))
            .next("project")
            .build()
        .state("project", "project_fields")
            .previous_result("records")
            .param("fields", json!({
                "link": {"type": "xpath", "attribute": "//a", "extract": "attribute", "attribute_name": "href"},
                "price": {"type": "xpath", "xpath": "//span[@class='price']"},
                "reserved": {"type": "html"}
            }))
            .build()
        .build();

    let engine = engine_with(MockBrowser::new().page("http://site/list", LISTINGS));
    let report = engine.run_with(config).await.unwrap();

    let extracted = &report.history["extract"]["0"];
    assert_eq!(extracted.as_array().unwrap().len(), 3);
    assert!(extracted.as_array().unwrap().iter().all(|r| r["tag"] == "div"));
    assert_eq!(extracted[0]["attributes"]["data-id"], "1");

    let rows = report.last_result["0"].as_array().unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0]["link"], "/one");
    assert_eq!(rows[1]["price"], "20");
    assert_eq!(rows[2]["link"], Value::Null);
    assert!(rows.iter().all(|r| r["reserved"].is_null()));
}

#[tokio::test]
async fn test_unknown_state_is_fatal() {
    let config = WorkflowBuilder::new("open")
        .state("open", "goto_link").param("link", "http://site/").next("nowhere").build()
        .build();

    let engine = engine_with(MockBrowser::new().fallback("<html><body></body></html>"));
    let err = engine.run_with(config).await.unwrap_err();
    assert!(matches!(err, WorkflowError::UnknownState(ref s) if s == "nowhere"));
}

#[tokio::test]
async fn test_unknown_action_is_fatal() {
    let config = WorkflowBuilder::new("start")
        .state("start", "teleport").param("to", "mars").build()
        .build();

    let engine = engine_with(MockBrowser::new());
    let err = engine.run_with(config).await.unwrap_err();
    match err {
        WorkflowError::UnknownAction { state, action } => {
            assert_eq!(state, "start");
            assert_eq!(action, "teleport");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_known_capability_without_handler() {
    let config = WorkflowBuilder::new("start")
        .state("start", "goto_link").param("link", "http://site/").build()
        .build();

    let engine = Engine::new(Arc::new(MockBrowser::new()));
    let err = engine.run_with(config).await.unwrap_err();
    assert!(matches!(err, WorkflowError::ActionNotRegistered { .. }));
}

#[tokio::test]
async fn test_missing_parameter_is_fatal() {
    let config = WorkflowBuilder::new("start")
        .state("start", "scrap_page").param("by", "TAG_NAME").build()
        .build();

    let engine = engine_with(MockBrowser::new());
    let err = engine.run_with(config).await.unwrap_err();
    match err {
        WorkflowError::Action { state, source } => {
            assert_eq!(state, "start");
            assert!(source.to_string().contains("value"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_step_limit_stops_cycles() {
    let config = WorkflowBuilder::new("ping")
        .max_steps(5)
        .state("ping", "goto_link").param("link", "http://site/a").next("pong").build()
        .state("pong", "goto_link").param("link", "http://site/b").next("ping").build()
        .build();

    let engine = engine_with(MockBrowser::new().fallback("<html><body></body></html>"));
    let err = engine.run_with(config).await.unwrap_err();
    match err {
        WorkflowError::StepLimitExceeded { limit, state } => {
            assert_eq!(limit, 5);
            assert_eq!(state, "pong");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_halt_policy_ends_run_on_null() {
    let config = WorkflowBuilder::new("scrape")
        .on_null(NullPolicy::Halt)
        .state("scrape", "scrap_page").param("by", "ID").param("value", "gone").next("extract").build()
        .state("extract", "extract_data")
            .previous_result("raw_data")
            .param("selectors", json!([{"tag": "div"}]))
            .build()
        .build();

    let browser = Arc::new(MockBrowser::new().page("http://site/", LISTINGS));
    let engine = Engine::with_standard_actions(browser.clone(), reqwest::Client::new());
    browser.navigate("http://site/").await.unwrap();

    let report = engine.run_with(config).await.unwrap();
    assert_eq!(report.outcome, Outcome::Halted { state: "scrape".into() });
    assert_eq!(report.steps, 1);
    assert_eq!(report.history["scrape"], Value::Null);
}

#[tokio::test]
async fn test_continue_policy_passes_null_along() {
    let config = WorkflowBuilder::new("scrape")
        .state("scrape", "scrap_page").param("by", "ID").param("value", "gone").next("extract").build()
        .state("extract", "extract_data")
            .previous_result("raw_data")
            .param("selectors", json!([{"tag": "div"}]))
            .build()
        .build();

    let browser = Arc::new(MockBrowser::new().page("http://site/", LISTINGS));
    let engine = Engine::with_standard_actions(browser.clone(), reqwest::Client::new());
    browser.navigate("http://site/").await.unwrap();

    let report = engine.run_with(config).await.unwrap();
    assert_eq!(report.outcome, Outcome::Completed);
    assert_eq!(report.steps, 2);
    assert_eq!(report.history["extract"], Value::Null);
}

#[tokio::test]
async fn test_acyclic_graph_terminates_within_state_count() {
    let config = WorkflowBuilder::new("a")
        .max_steps(3)
        .state("a", "goto_link").param("link", "http://site/a").next("b").build()
        .state("b", "goto_link").param("link", "http://site/b").next("c").build()
        .state("c", "goto_link").param("link", "http://site/c").build()
        .build();

    let engine = engine_with(MockBrowser::new().fallback("<html><body></body></html>"));
    let report = engine.run_with(config).await.unwrap();
    assert_eq!(report.steps, 3);
    assert_eq!(report.last_result, json!({"url": "http://site/c"}));
}

#[tokio::test]
async fn test_condition_drives_api_polling() {
    let config = WorkflowBuilder::new("poll")
        .state("poll", "call_api")
            .param("api_url", "http://api/jobs")
            .next_state(NextState::when("pending == true", Some("poll"), Some("report")))
            .build()
        .state("report", "call_api")
            .previous_result("params")
            .param("api_url", "http://api/report")
            .build()
        .build();

    let (api, seen) = ScriptedApi::new(vec![
        json!({"pending": true}),
        json!({"pending": true}),
        json!({"pending": false, "id": 7}),
        json!({"ok": true}),
    ]);
    let mut engine = Engine::new(Arc::new(MockBrowser::new()));
    engine.register_action(Arc::new(api));

    let report = engine.run_with(config).await.unwrap();
    assert_eq!(report.steps, 4);
    assert_eq!(report.last_result, json!({"ok": true}));

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 4);
    assert_eq!(seen[3].get("params"), Some(&json!({"pending": false, "id": 7})));
}

#[tokio::test]
async fn test_fetch_source_navigation() {
    let config = WorkflowBuilder::new("lookup")
        .state("lookup", "fetch_source")
            .param("source", "catalog")
            .param("path", json!([["key", "items"], {"kind": "index", "key": -1}, ["attr", "name"]]))
            .build()
        .build();

    let engine = engine_with(MockBrowser::new());
    engine.register_source("catalog", json!({"items": [{"name": "a"}, {"name": "b"}]}));
    let report = engine.run_with(config).await.unwrap();
    assert_eq!(report.last_result, json!("b"));
}

#[tokio::test]
async fn test_fetch_source_failure_names_the_segment() {
    let config = WorkflowBuilder::new("lookup")
        .state("lookup", "fetch_source")
            .param("source", "catalog")
            .param("path", json!([["key", "items"], ["index", 5], ["key", "name"]]))
            .build()
        .build();

    let engine = engine_with(MockBrowser::new());
    engine.register_source("catalog", json!({"items": [{"name": "a"}]}));
    let err = engine.run_with(config).await.unwrap_err();

    let WorkflowError::Action { source, .. } = err else {
        panic!("expected an action failure");
    };
    let nav = source.downcast_ref::<NavigationError>().expect("navigation error");
    assert_eq!(nav.kind, PathKind::Index);
    assert_eq!(nav.key, "5");
    assert_eq!(nav.position, 1);
}

#[tokio::test]
async fn test_fetch_source_reads_run_history() {
    let config = WorkflowBuilder::new("open")
        .state("open", "goto_link").param("link", "http://site/x").next("lookup").build()
        .state("lookup", "fetch_source")
            .param("source", "open")
            .param("path", json!([["key", "url"]]))
            .build()
        .build();

    let engine = engine_with(MockBrowser::new().fallback("<html><body></body></html>"));
    let report = engine.run_with(config).await.unwrap();
    assert_eq!(report.last_result, json!("http://site/x"));
}

#[tokio::test]
async fn test_single_step_is_explicit_about_context() {
    let config = WorkflowBuilder::new("a")
        .state("a", "goto_link").param("link", "http://site/a").next("b").build()
        .state("b", "goto_link").previous_result("link").build()
        .build();
    let settings = config.settings.clone();
    let store = ConfigStore::in_memory(config);
    let engine = engine_with(MockBrowser::new().fallback("<html><body></body></html>"));

    let ctx = ExecutionContext::new("a");
    let ctx = engine.step(&store, &settings, ctx).await.unwrap();
    assert_eq!(ctx.current_state.as_deref(), Some("b"));
    assert_eq!(ctx.previous_result, json!({"url": "http://site/a"}));

    // The object handed to `link` is not a URL, so navigation is skipped.
    let ctx = engine.step(&store, &settings, ctx).await.unwrap();
    assert!(ctx.is_finished());
    assert_eq!(ctx.history["b"], Value::Null);

    let same = engine.step(&store, &settings, ctx.clone()).await.unwrap();
    assert_eq!(same.steps, ctx.steps);
}

fn dumping_workflow(raw_dump: String) -> scrapeflow::dsl::WorkflowConfig {
    WorkflowBuilder::new("extract")
        .settings(EngineSettings {
            raw_dump: Some(raw_dump),
            ..Default::default()
        })
        .state("extract", "extract_data")
            .param("raw_data", LISTINGS)
            .param("selectors", json!([{"tag": "div", "class": "listing"}]))
            .build()
        .build()
}

#[tokio::test]
async fn test_raw_dump_writes_markup_handed_to_extract() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let dump = dir.path().join("raw_data.html");

    let engine = engine_with(MockBrowser::new());
    let report = engine
        .run_with(dumping_workflow(dump.display().to_string()))
        .await
        .unwrap();

    assert_eq!(std::fs::read_to_string(&dump).unwrap(), LISTINGS);
    assert_eq!(report.last_result["0"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_raw_dump_failure_does_not_fail_extraction() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let dump = dir.path().join("missing").join("raw_data.html");

    let engine = engine_with(MockBrowser::new());
    let report = engine
        .run_with(dumping_workflow(dump.display().to_string()))
        .await
        .unwrap();

    assert!(!dump.exists());
    assert_eq!(report.outcome, Outcome::Completed);
    assert_eq!(report.last_result["0"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_run_from_starts_mid_graph() {
    let config = WorkflowBuilder::new("a")
        .state("a", "goto_link").param("link", "http://site/a").next("b").build()
        .state("b", "goto_link").param("link", "http://site/b").build()
        .build();
    let store = ConfigStore::in_memory(config);
    let browser = Arc::new(MockBrowser::new().fallback("<html><body></body></html>"));
    let engine = Engine::with_standard_actions(browser.clone(), reqwest::Client::new());

    let report = engine.run_from(&store, "b").await.unwrap();
    assert_eq!(report.steps, 1);
    assert!(!report.history.contains_key("a"));
    assert_eq!(browser.visited(), vec!["http://site/b".to_string()]);
}
