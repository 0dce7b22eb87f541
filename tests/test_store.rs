use chrono::{DateTime, TimeZone, Utc};
use query_link::condition::{Condition, FieldInfo, SearchMode};
use query_link::config::EngineConfig;
use query_link::resolver::{DatePickerValue, UrlQuery};
use query_link::storage::{CommonFilterHistory, KeyValueStorage, MemoryStorage};
use query_link::store::{
    CompileError, CompileResponse, DrillDown, DrillOperator, LocalCompiler, MergeError,
    MergeOutcome, QueryCompiler, QueryStore,
};
use std::cell::Cell;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap()
}

fn load(query: &str) -> QueryStore {
    let mut storage = MemoryStorage::new();
    QueryStore::load(&UrlQuery::parse(query), &mut storage, EngineConfig::default(), now())
}

fn fields() -> Vec<FieldInfo> {
    vec![
        FieldInfo::new("msg", "text").case_sensitive(false),
        FieldInfo::new("trace", "text"),
        FieldInfo::new("ok", "boolean"),
    ]
}

#[test]
fn test_query_params_filter_and_shape_conditions() {
    let mut store = load("search_mode=ui");
    store.set_fields(fields());
    store.add_condition(Condition::new("msg", "=~", &["Timeout*"]));
    store.add_condition(Condition::new("trace", "=~", &["ABC*"]));
    store.add_condition(Condition::new("ok", "is true", &["whatever"]));
    store.add_condition(Condition::new("level", "=", &["ERROR"]).with_disabled(true));
    store.add_condition(Condition::new("_ip-select_", "=", &["10.0.0.1"]));

    let params = store.query_params();
    assert_eq!(params.keyword, "*");
    assert_eq!(params.search_mode, SearchMode::Ui);
    assert_eq!(params.addition.len(), 3);

    assert_eq!(params.addition[0].operator, "=~");
    assert_eq!(params.addition[0].value, vec!["timeout*"]);
    assert_eq!(params.addition[1].value, vec!["ABC*"], "case-sensitive field keeps case");
    assert_eq!(params.addition[2].operator, "is true");
    assert_eq!(params.addition[2].value, vec![""]);
}

#[test]
fn test_query_params_are_pure() {
    let mut store = load("search_mode=ui&keyword=oops");
    store.set_fields(fields());
    let first = serde_json::to_string(&store.query_params()).unwrap();
    let second = serde_json::to_string(&store.query_params()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_sql_mode_sends_keyword_only() {
    let mut store = load("search_mode=sql&keyword=level%3AERROR");
    store.add_condition(Condition::new("msg", "is", &["x"]).with_disabled(true));
    let params = store.query_params();
    assert!(params.addition.is_empty());
    assert_eq!(params.keyword, "level:ERROR");

    store.set_keyword("   ");
    assert_eq!(store.query_params().keyword, "*");
}

#[test]
fn test_ui_mode_folds_keyword_from_url() {
    let store = load("search_mode=ui&keyword=timeout");
    let state = store.state();
    assert_eq!(state.keyword, "*");
    assert_eq!(state.conditions.len(), 1);
    assert_eq!(state.conditions[0].field, "*");

    let params = store.query_params();
    assert_eq!(params.addition[0].field, "*");
    assert_eq!(params.addition[0].operator, "contains match phrase");
}

#[test]
fn test_legacy_addition_and_keyword_merge_into_sql_keyword() {
    let addition = r#"[{"field":"level","operator":"=","value":["ERROR"]}]"#;
    let query = format!(
        "addition={}&keyword=timeout",
        query_link::serializer::encode_component(addition)
    );
    let mut store = load(&query);
    assert_eq!(store.state().search_mode, SearchMode::Sql);
    assert!(store.needs_merge());

    assert_eq!(store.merge_with(&LocalCompiler).unwrap(), MergeOutcome::Applied);
    assert_eq!(store.state().keyword, r#"level: "ERROR" AND (timeout)"#);
    assert!(store.state().conditions.is_empty());
    assert_eq!(store.merge_with(&LocalCompiler).unwrap(), MergeOutcome::NotNeeded);

    let params = store.url_params();
    assert!(!params.contains_key("addition"));
    assert_eq!(params.get("search_mode").map(String::as_str), Some("sql"));
}

struct FailingCompiler {
    calls: Cell<usize>,
}

impl QueryCompiler for FailingCompiler {
    fn compile(&self, _addition: &[Condition]) -> Result<CompileResponse, CompileError> {
        self.calls.set(self.calls.get() + 1);
        Err(CompileError::Transport("connection reset".to_string()))
    }
}

#[test]
fn test_failed_compile_leaves_state_and_releases_slot() {
    let mut store = load("search_mode=sql");
    store.add_condition(Condition::new("level", "=", &["ERROR"]));
    let before = store.state().clone();

    let compiler = FailingCompiler { calls: Cell::new(0) };
    let err = store.merge_with(&compiler).unwrap_err();
    assert!(matches!(err, MergeError::Compile(CompileError::Transport(_))));
    assert_eq!(store.state(), &before);

    let _ = store.merge_with(&compiler);
    assert_eq!(compiler.calls.get(), 2);
}

#[test]
fn test_overlapping_merges_apply_only_the_current_one() {
    let mut store = load("search_mode=sql");
    store.add_condition(Condition::new("level", "=", &["ERROR"]));
    let old = store.begin_merge().unwrap();

    store.add_condition(Condition::new("host", "=", &["web-1"]));
    let current = store.begin_merge().unwrap();
    assert_ne!(old.generation(), current.generation());
    assert_eq!(current.addition().len(), 2);

    let outcome = store
        .complete_merge(current, CompileResponse::ok(r#"level: "ERROR" AND host: "web-1""#))
        .unwrap();
    assert_eq!(outcome, MergeOutcome::Applied);

    let outcome = store.complete_merge(old, CompileResponse::ok("level: \"ERROR\"")).unwrap();
    assert_eq!(outcome, MergeOutcome::Stale);
    assert_eq!(store.state().keyword, r#"level: "ERROR" AND host: "web-1""#);
}

#[test]
fn test_invalid_time_range_is_rejected_without_change() {
    let mut store = load("");
    let generation = store.generation();
    assert!(
        store
            .set_time_range(DatePickerValue::new("last tuesday", "now"), now())
            .is_err()
    );
    assert_eq!(store.generation(), generation);
    assert_eq!(store.state().time_range.picker.start, "now-15m");
}

#[test]
fn test_common_filter_round_trip_through_history() {
    let config = EngineConfig::default();
    let mut storage = MemoryStorage::new();
    let mut store = load("search_mode=ui");
    store.add_condition(Condition::new("level", "=", &["ERROR"]));
    store.add_condition(Condition::new("host", "=", &["a"]).with_disabled(true));

    let mut history = CommonFilterHistory::load(&storage, &config.storage);
    history.upsert(store.common_filter_entry("42", now()));
    history.save(&mut storage, &config.storage).unwrap();
    assert!(storage.get(&config.storage.history_key).unwrap().is_some());

    let reloaded = CommonFilterHistory::load(&storage, &config.storage);
    let entry = reloaded.get("42").unwrap();
    assert_eq!(entry.addition.len(), 1);

    let mut fresh = load("");
    assert!(fresh.apply_common_filter(entry));
    assert_eq!(fresh.state().conditions[0].field, "level");
}

#[test]
fn test_unknown_search_mode_keeps_sql_keyword() {
    let addition = query_link::serializer::encode_component(
        r#"[{"field":"a","operator":"=","value":["1"]}]"#,
    );
    let store = load(&format!("search_mode=graph&keyword=level%3AERROR&addition={addition}"));
    assert_eq!(store.state().search_mode, SearchMode::Sql);
    assert_eq!(store.state().keyword, "level:ERROR");
    assert_eq!(store.state().conditions.len(), 1);
}

#[test]
fn test_drill_down_in_ui_mode_types_by_field() {
    let mut store = load("search_mode=ui");
    store.set_fields(fields());

    assert!(store.drill_down(&[
        DrillDown::new("msg", DrillOperator::Is, &["boom"]),
        DrillDown::new("ok", DrillOperator::IsNot, &["true"]),
        DrillDown::new("level", DrillOperator::IsNot, &["INFO"]),
    ]));
    let conditions = &store.state().conditions;
    assert_eq!(conditions.len(), 3);
    assert_eq!(conditions[0].operator, "contains match phrase");
    assert_eq!(conditions[0].field_type.as_deref(), Some("text"));
    assert_eq!(conditions[1].operator, "is false");
    assert!(conditions[1].value.is_empty());
    assert_eq!(conditions[2].operator, "!=");
    assert_eq!(conditions[2].value, vec!["INFO"]);

    let generation = store.generation();
    assert!(!store.drill_down(&[DrillDown::new("msg", DrillOperator::Is, &["boom"])]));
    assert_eq!(store.generation(), generation);
}

#[test]
fn test_drill_down_in_sql_mode_extends_keyword() {
    let mut store = load("search_mode=sql");
    assert!(store.drill_down(&[DrillDown::new("level", DrillOperator::Is, &["ERROR"])]));
    assert_eq!(store.state().keyword, r#"level: "ERROR""#);

    assert!(store.drill_down(&[
        DrillDown::new("level", DrillOperator::Is, &["ERROR"]),
        DrillDown::new("host", DrillOperator::IsNot, &["a"]),
    ]));
    assert_eq!(store.state().keyword, r#"level: "ERROR" AND NOT host: "a""#);
    assert!(store.state().conditions.is_empty());
    assert!(!store.needs_merge());

    assert!(!store.drill_down(&[DrillDown::new("host", DrillOperator::IsNot, &["a"])]));
}
