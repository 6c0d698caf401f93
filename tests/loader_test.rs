use scrapeflow::compiler::{loader, validator};
use scrapeflow::dsl::builder::WorkflowBuilder;
use scrapeflow::dsl::{NextState, NullPolicy, ParamValue};
use scrapeflow::error::ConfigError;
use serde_json::json;
use std::fs;

const LISTING_WORKFLOW: &str = r#"
initial_state: open_listing
userAgent: "Mozilla/5.0 (X11; Linux x86_64)"
settings:
  max_steps: 50
  on_null: halt
  settle_ms: 250
states:
  open_listing:
    method: goto_next_page
    parameters:
      base_url: "https://site/list?page={i}"
      next_page: 1
    next_state: scrape
  scrape:
    method: scrap_page
    parameters:
      by: TAG_NAME
      value: body
    next_state: extract
  extract:
    method: extract_data
    parameters:
      raw_data: "{previous_result}"
      selectors:
        - tag: div
          class: listing
    next_state:
      on_null: null
      otherwise: open_listing
"#;

#[test]
fn test_load_listing_workflow() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let file_path = temp_dir.path().join("listing.yaml");
    fs::write(&file_path, LISTING_WORKFLOW).expect("Failed to write temp file");

    let loaded = loader::load_workflow_from_yaml(&file_path).expect("Failed to load workflow from YAML");

    let expected = WorkflowBuilder::new("open_listing")
        .user_agent("Mozilla/5.0 (X11; Linux x86_64)")
        .settings(scrapeflow::dsl::EngineSettings {
            max_steps: Some(50),
            on_null: NullPolicy::Halt,
            settle_ms: 250,
            ..Default::default()
        })
        .state("open_listing", "goto_next_page")
            .param("base_url", "https://site/list?page={i}")
            .param("next_page", 1)
            .next("scrape")
            .build()
        .state("scrape", "scrap_page")
            .param("by", "TAG_NAME")
            .param("value", "body")
            .next("extract")
            .build()
        .state("extract", "extract_data")
            .previous_result("raw_data")
            .param("selectors", json!([{"tag": "div", "class": "listing"}]))
            .next_state(NextState::on_null(None, Some("open_listing")))
            .build()
        .build();

    assert_eq!(loaded, expected);
    assert_eq!(loaded.settings.page_timeout_secs, 10);
    assert!(validator::check(&loaded).is_empty());
}

#[test]
fn test_save_and_reload_preserves_document() {
    let original = loader::parse_workflow(LISTING_WORKFLOW).unwrap();
    let temp_dir = tempfile::tempdir().unwrap();
    let file_path = temp_dir.path().join("saved.yaml");

    loader::save_workflow_to_yaml(&original, &file_path).unwrap();
    let text = fs::read_to_string(&file_path).unwrap();
    assert!(text.contains("userAgent"));

    let reloaded = loader::load_workflow_from_yaml(&file_path).unwrap();
    assert_eq!(reloaded, original);
}

#[test]
fn test_free_form_keys_are_kept() {
    let config = loader::parse_workflow(
        r#"
initial_state: a
user_agent: "bot"
proxy_hint: none
retries: 3
states:
  a:
    method: goto_link
    parameters: { link: "http://x" }
"#,
    )
    .unwrap();
    assert_eq!(config.user_agent.as_deref(), Some("bot"));
    assert_eq!(config.extra.len(), 2);
    assert_eq!(config.extra["retries"], serde_yaml::Value::from(3u64));
    assert_eq!(config.states["a"].next_state, None);
    assert_eq!(config.states["a"].parameters["link"], ParamValue::literal("http://x"));
}

#[test]
fn test_describe_lists_every_state() {
    let config = loader::parse_workflow(LISTING_WORKFLOW).unwrap();
    let table = loader::describe(&config);
    assert!(table.starts_with("Initial state: open_listing\n"));
    for state in ["open_listing", "scrape", "extract"] {
        assert!(table.contains(&format!(">State: {state}\n")));
    }
    assert!(table.contains("raw_data: <previous result>"));
    assert!(table.contains("Method: goto_next_page"));
}

#[test]
fn test_missing_file_and_bad_yaml() {
    let err = loader::load_workflow_from_yaml("/definitely/not/here.yaml").unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));

    let err = loader::parse_workflow("states: [1, 2]").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn test_validation_rejects_unknown_methods() {
    let config = loader::parse_workflow(
        r#"
initial_state: a
states:
  a:
    method: scrape_everything
"#,
    )
    .unwrap();
    let err = validator::validate(&config).unwrap_err();
    assert!(err.to_string().contains("scrape_everything"));
}
