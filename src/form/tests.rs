use super::*;
use futures::executor::block_on;
use futures::future::join;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::i18n::Locale;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, FormModel)]
struct ProfileForm {
    name: String,
    age: u32,
    #[serde(rename = "emailAddress")]
    email: String,
}

fn map(value: Value) -> ValueMap {
    match value {
        Value::Object(map) => map,
        _ => ValueMap::new(),
    }
}

fn quick_form(defaults: Value) -> FormController {
    FormController::new(map(defaults), FormOptions::default())
}

fn batched_form(defaults: Value) -> FormController {
    FormController::new(
        map(defaults),
        FormOptions {
            quick: false,
            ..FormOptions::default()
        },
    )
}

fn count_changes(controller: &FormController) -> Arc<AtomicUsize> {
    let count = Arc::new(AtomicUsize::new(0));
    let counter = count.clone();
    controller
        .on_change(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .expect("register change listener");
    count
}

fn record_values(target: &Arc<Mutex<Vec<Value>>>) -> impl Fn(&Value) + Send + Sync + 'static {
    let target = target.clone();
    move |value: &Value| target.lock().expect("recorder lock").push(value.clone())
}

#[derive(Default)]
struct TestInput {
    shown: Option<Value>,
    disabled: bool,
    syncs: usize,
}

impl FieldWidget for TestInput {
    fn sync(&mut self, value: Option<&Value>, disabled: bool) {
        self.shown = value.cloned();
        self.disabled = disabled;
        self.syncs += 1;
    }
}

#[test]
fn writes_fold_into_values_in_call_order() {
    let controller = quick_form(json!({ "a": 1 }));

    controller.set_value("b", json!(2)).expect("set b");
    controller
        .set_values(map(json!({ "a": 3, "c": 4 })))
        .expect("merge");
    controller.set_value("c", json!(5)).expect("set c");

    assert_eq!(
        Value::Object(controller.values().expect("values")),
        json!({ "a": 3, "b": 2, "c": 5 })
    );
}

#[test]
fn quick_mode_commits_every_change_once() {
    let controller = quick_form(json!({ "a": 1 }));
    let changes = count_changes(&controller);

    controller.set_value("a", json!(2)).expect("set a");
    assert_eq!(changes.load(Ordering::SeqCst), 1);
    assert_eq!(
        controller.data().expect("data"),
        controller.values().expect("values")
    );

    controller.set_value("a", json!(2)).expect("same value");
    controller.set_values(map(json!({ "a": 2 }))).expect("same merge");
    assert_eq!(changes.load(Ordering::SeqCst), 1);
}

#[test]
fn change_listeners_receive_committed_copy() {
    let controller = quick_form(json!({}));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = record_values(&seen);
    controller
        .on_change(move |values| recorder(&Value::Object(values.clone())))
        .expect("register");

    controller.set_value("name", json!("Ann")).expect("set");

    assert_eq!(
        *seen.lock().expect("seen"),
        vec![json!({ "name": "Ann" })]
    );
}

#[test]
fn batched_mode_notifies_only_on_submit() {
    let controller = batched_form(json!({ "a": 1 }));
    let changes = count_changes(&controller);

    controller.set_value("a", json!(2)).expect("set a");
    controller.set_value("b", json!(3)).expect("set b");
    assert_eq!(changes.load(Ordering::SeqCst), 0);
    assert_eq!(
        Value::Object(controller.data().expect("data")),
        json!({ "a": 1 })
    );

    block_on(controller.submit()).expect("submit");
    assert_eq!(changes.load(Ordering::SeqCst), 1);
    assert_eq!(
        Value::Object(controller.result_data().expect("result data")),
        json!({ "a": 2, "b": 3 })
    );
}

#[test]
fn reset_restores_defaults_independent_of_history() {
    let controller = quick_form(json!({ "name": "x", "tags": ["a"] }));
    let changes = count_changes(&controller);

    controller.set_value("name", json!("y")).expect("set name");
    controller
        .set_values(map(json!({ "tags": [], "extra": true })))
        .expect("merge");
    controller.reset().expect("reset");

    let defaults = controller.default_values().expect("defaults");
    assert_eq!(controller.values().expect("values"), defaults);
    assert_eq!(controller.data().expect("data"), defaults);
    assert_eq!(changes.load(Ordering::SeqCst), 3);
}

#[test]
fn batched_reset_leaves_data_for_next_submit() {
    let controller = batched_form(json!({ "name": "x" }));
    let changes = count_changes(&controller);

    controller.set_value("name", json!("y")).expect("set");
    block_on(controller.submit()).expect("submit");
    controller.set_value("name", json!("z")).expect("set again");
    controller.reset().expect("reset");

    assert_eq!(
        Value::Object(controller.values().expect("values")),
        json!({ "name": "x" })
    );
    assert_eq!(
        Value::Object(controller.data().expect("data")),
        json!({ "name": "y" })
    );
    assert_eq!(changes.load(Ordering::SeqCst), 1);
}

#[test]
fn submit_rejects_until_required_field_is_filled() {
    let controller = quick_form(json!({ "name": "" }));
    controller
        .add_item("name", RuleSet::from(Rule::required()))
        .expect("register rules");
    let submitted = Arc::new(Mutex::new(Vec::new()));
    let recorder = record_values(&submitted);
    controller
        .on_submit(move |values| recorder(&Value::Object(values.clone())))
        .expect("register submit listener");

    let error = block_on(controller.submit()).expect_err("empty name must be rejected");
    let errors = error.validation_errors().expect("validation error");
    assert!(errors.contains("name"));
    assert!(
        controller
            .validate_errors()
            .expect("errors")
            .is_some_and(|errors| errors.contains("name"))
    );
    assert!(submitted.lock().expect("submitted").is_empty());
    assert_eq!(controller.submit_state().expect("state"), SubmitState::Failed);

    controller.set_value("name", json!("Ann")).expect("set name");
    block_on(controller.submit()).expect("filled name must submit");
    assert_eq!(
        *submitted.lock().expect("submitted"),
        vec![json!({ "name": "Ann" })]
    );
    assert!(controller.validate_errors().expect("errors").is_none());
    assert_eq!(
        controller.submit_state().expect("state"),
        SubmitState::Succeeded
    );
    assert_eq!(controller.submit_count().expect("count"), 2);
}

#[test]
fn reset_returns_to_idle_but_keeps_errors() {
    let controller = quick_form(json!({}));
    controller
        .add_item("name", RuleSet::from(Rule::required()))
        .expect("register rules");

    assert!(block_on(controller.submit()).is_err());
    controller.reset().expect("reset");

    assert_eq!(controller.submit_state().expect("state"), SubmitState::Idle);
    assert!(controller.field_error("name").expect("field error").is_some());

    controller.set_value("name", json!("Ann")).expect("set");
    block_on(controller.validate()).expect("validate");
    assert!(controller.field_error("name").expect("field error").is_none());
}

#[test]
fn overlapping_submits_each_fail_on_debounced_rule() {
    let controller = quick_form(json!({ "user": "ann" }));
    controller
        .add_item(
            "user",
            RuleSet::from(
                Rule::async_fn(|_value, _values| async {
                    Err::<(), String>("taken".to_string())
                })
                .debounce(20),
            ),
        )
        .expect("register rules");
    let submits = Arc::new(AtomicUsize::new(0));
    let counter = submits.clone();
    controller
        .on_submit(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .expect("register submit listener");

    let (first, second) = block_on(join(controller.submit(), controller.submit()));

    assert!(first.is_err());
    assert!(second.is_err());
    assert_eq!(submits.load(Ordering::SeqCst), 0);
    assert_eq!(controller.submit_state().expect("state"), SubmitState::Failed);
    assert_eq!(controller.submit_count().expect("count"), 2);
    assert_eq!(
        controller
            .field_error("user")
            .expect("field error")
            .map(|error| error.message),
        Some("taken".to_string())
    );
}

#[test]
fn overlapping_validations_return_their_own_outcomes() {
    let controller = quick_form(json!({ "code": "x" }));
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    controller
        .add_item(
            "code",
            RuleSet::from(
                Rule::async_fn(move |_value, _values| {
                    let call = counter.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if call == 0 {
                            Err::<(), String>("first run fails".to_string())
                        } else {
                            Ok(())
                        }
                    }
                })
                .debounce(5),
            ),
        )
        .expect("register rules");

    let (first, second) = block_on(join(controller.validate(), controller.validate()));

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_ne!(first.is_ok(), second.is_ok());
    let latest_failed = second.is_err();
    assert_eq!(
        controller.validate_errors().expect("errors").is_some(),
        latest_failed
    );
}

#[test]
fn later_registration_replaces_rule_set() {
    let controller = quick_form(json!({ "code": "ab" }));
    controller
        .add_item("code", RuleSet::from(Rule::min_length(3)))
        .expect("first registration");
    assert!(block_on(controller.validate()).is_err());

    controller
        .add_item("code", RuleSet::from(Rule::max_length(5)))
        .expect("second registration");
    block_on(controller.validate()).expect("replaced rules must pass");
}

#[test]
fn unmounted_binder_leaves_rules_active() {
    let controller = quick_form(json!({}));
    let context = FormContext::root(&controller);
    let binder =
        FieldBinder::mount(&context, "email", RuleSet::from(Rule::required())).expect("mount");
    assert_eq!(
        controller.mounted_fields().expect("mounted"),
        vec![FieldKey::new("email")]
    );

    drop(binder);

    assert!(controller.mounted_fields().expect("mounted").is_empty());
    assert!(
        controller
            .registered_rules(&FieldKey::new("email"))
            .expect("rules")
            .is_some()
    );
    let error = block_on(controller.validate()).expect_err("stale rules still validate");
    assert!(
        error
            .validation_errors()
            .is_some_and(|errors| errors.contains("email"))
    );
}

#[test]
fn object_scope_merges_into_parent_slot() {
    let controller = quick_form(json!({ "profile": { "a": 1 } }));
    let context = FormContext::root(&controller);
    let profile = context.object("profile");

    profile.set_value("b", json!(2)).expect("set b");

    assert_eq!(
        controller.value("profile").expect("profile"),
        Some(json!({ "a": 1, "b": 2 }))
    );
    assert_eq!(Value::Object(profile.values()), json!({ "a": 1, "b": 2 }));

    profile
        .set_values(map(json!({ "a": 3 })))
        .expect("merge into scope");
    assert_eq!(
        controller.value("profile").expect("profile"),
        Some(json!({ "a": 3, "b": 2 }))
    );
}

#[test]
fn object_scope_over_external_value_composes_writes() {
    let controller = quick_form(json!({}));
    let context = FormContext::root(&controller);
    let emitted = Arc::new(Mutex::new(Vec::new()));
    let external = ExternalValue::new(Some(json!({ "a": 1 })), record_values(&emitted));
    let scope = context.object_with(external);

    scope.set_value("b", json!(2)).expect("set b");
    scope.set_value("c", json!(3)).expect("set c");

    assert_eq!(
        *emitted.lock().expect("emitted"),
        vec![
            json!({ "a": 1, "b": 2 }),
            json!({ "a": 1, "b": 2, "c": 3 })
        ]
    );
    assert!(controller.values().expect("values").is_empty());

    scope
        .update_value(Some(json!({ "z": 0 })))
        .expect("host refresh");
    assert_eq!(Value::Object(scope.values()), json!({ "z": 0 }));
}

#[test]
fn object_scope_treats_non_map_as_empty() {
    let controller = quick_form(json!({}));
    let context = FormContext::root(&controller);
    let emitted = Arc::new(Mutex::new(Vec::new()));
    let scope = context.object_with(ExternalValue::new(Some(json!(7)), record_values(&emitted)));

    assert!(scope.values().is_empty());
    scope.set_value("a", json!(1)).expect("set");
    assert_eq!(*emitted.lock().expect("emitted"), vec![json!({ "a": 1 })]);
}

#[test]
fn array_scope_clones_sequence_on_write() {
    let controller = quick_form(json!({}));
    let context = FormContext::root(&controller);

    let emitted = Arc::new(Mutex::new(Vec::new()));
    let numbers =
        context.array_with(ExternalValue::new(Some(json!([10, 20])), record_values(&emitted)));
    numbers.set_value(0, json!(99)).expect("set index 0");
    assert_eq!(*emitted.lock().expect("emitted"), vec![json!([99, 20])]);

    let emitted = Arc::new(Mutex::new(Vec::new()));
    let empty = context.array_with(ExternalValue::new(None, record_values(&emitted)));
    empty.set_value(1, json!(5)).expect("set index 1");
    let emitted = emitted.lock().expect("emitted");
    assert_eq!(emitted.len(), 1);
    assert_eq!(emitted[0][1], json!(5));
    assert_eq!(emitted[0][0], Value::Null);
}

#[test]
fn array_scope_ignores_non_numeric_names() {
    let controller = quick_form(json!({ "items": [1] }));
    let context = FormContext::root(&controller);
    let items = context.array("items");

    items
        .context()
        .set_value("label", json!("x"))
        .expect("ignored write");
    items.context().set_value("1", json!(2)).expect("numeric name");

    assert_eq!(controller.value("items").expect("items"), Some(json!([1, 2])));
}

#[test]
fn array_scope_ignores_writes_far_past_the_end() {
    let controller = quick_form(json!({ "items": [1] }));
    let context = FormContext::root(&controller);
    let items = context.array("items");

    items.set_value(usize::MAX, json!(2)).expect("max index ignored");
    items
        .context()
        .set_value("18446744073709551615", json!(3))
        .expect("max numeric name ignored");
    items.set_value(1_000_000, json!(4)).expect("huge index ignored");
    assert_eq!(controller.value("items").expect("items"), Some(json!([1])));

    items.set_value(3, json!(5)).expect("small gap padded");
    assert_eq!(
        controller.value("items").expect("items"),
        Some(json!([1, null, null, 5]))
    );
}

#[test]
fn array_items_scope_nested_objects() {
    let controller = quick_form(json!({
        "users": [{ "name": "a" }, { "name": "b" }]
    }));
    let context = FormContext::root(&controller);
    let users = context.array("users");

    assert_eq!(users.len(), 2);
    let names = users.render_items(|item| {
        assert_eq!(item.values.len(), 2);
        format!("{}:{}", item.index, item.value["name"])
    });
    assert_eq!(names, vec!["0:\"a\"".to_string(), "1:\"b\"".to_string()]);

    users
        .item(1)
        .set_value("name", json!("c"))
        .expect("nested write");

    assert_eq!(
        controller.value("users").expect("users"),
        Some(json!([{ "name": "a" }, { "name": "c" }]))
    );
}

#[test]
fn binder_inside_array_item_writes_through_every_scope() {
    let controller = quick_form(json!({ "users": [{ "name": "a" }] }));
    let changes = count_changes(&controller);
    let context = FormContext::root(&controller);
    let first = context.array("users").item(0);
    let binder = FieldBinder::mount(first.context(), "name", RuleSet::new()).expect("mount");

    assert_eq!(binder.value(), Some(json!("a")));
    binder.change(json!("z")).expect("change");

    assert_eq!(
        controller.value("users").expect("users"),
        Some(json!([{ "name": "z" }]))
    );
    assert_eq!(changes.load(Ordering::SeqCst), 1);
}

#[test]
fn array_actions_replace_whole_sequence() {
    let controller = quick_form(json!({ "tags": ["a", "b"] }));
    let context = FormContext::root(&controller);
    let tags = context.array("tags");

    tags.apply(&ArrayAction::push(json!("c"))).expect("push");
    tags.apply(&ArrayAction::swap(0, 2)).expect("swap");
    tags.apply(&ArrayAction::remove(1)).expect("remove");
    tags.apply(&ArrayAction::remove(10)).expect("out of range");

    assert_eq!(
        controller.value("tags").expect("tags"),
        Some(json!(["c", "a"]))
    );

    tags.apply(&ArrayAction::new(|items| items.into_iter().rev().collect()))
        .expect("reverse");
    assert_eq!(tags.values(), vec![json!("a"), json!("c")]);
}

#[test]
fn deferred_defaults_replay_pending_writes() {
    let controller = FormController::new(
        DefaultValues::deferred(|| async {
            Ok::<ValueMap, DefaultsError>(map(json!({ "a": 1, "b": 0 })))
        }),
        FormOptions::default(),
    );
    assert_eq!(
        controller.defaults_phase().expect("phase"),
        DefaultsPhase::Pending
    );

    controller.set_value("b", json!(2)).expect("write while pending");
    assert_eq!(
        Value::Object(controller.values().expect("values")),
        json!({ "b": 2 })
    );

    let phase = block_on(controller.resolve_defaults()).expect("resolve");
    assert_eq!(phase, DefaultsPhase::Ready);
    assert_eq!(
        Value::Object(controller.values().expect("values")),
        json!({ "a": 1, "b": 2 })
    );
    assert_eq!(
        Value::Object(controller.data().expect("data")),
        json!({ "a": 1, "b": 2 })
    );

    controller.reset().expect("reset");
    assert_eq!(
        Value::Object(controller.values().expect("values")),
        json!({ "a": 1, "b": 0 })
    );

    let again = block_on(controller.resolve_defaults()).expect("second resolve");
    assert_eq!(again, DefaultsPhase::Ready);
}

#[test]
fn resolved_defaults_notify_quick_forms() {
    let controller = FormController::new(
        DefaultValues::deferred(|| async {
            Ok::<ValueMap, DefaultsError>(map(json!({ "a": 1 })))
        }),
        FormOptions::default(),
    );
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = record_values(&seen);
    controller
        .on_change(move |values| recorder(&Value::Object(values.clone())))
        .expect("register");

    block_on(controller.resolve_defaults()).expect("resolve");

    assert_eq!(*seen.lock().expect("seen"), vec![json!({ "a": 1 })]);
    assert_eq!(
        Value::Object(controller.data().expect("data")),
        json!({ "a": 1 })
    );
}

#[test]
fn resolved_defaults_stay_silent_in_batched_forms() {
    let controller = FormController::new(
        DefaultValues::deferred(|| async {
            Ok::<ValueMap, DefaultsError>(map(json!({ "a": 1 })))
        }),
        FormOptions {
            quick: false,
            ..FormOptions::default()
        },
    );
    let changes = count_changes(&controller);

    block_on(controller.resolve_defaults()).expect("resolve");

    assert_eq!(changes.load(Ordering::SeqCst), 0);
    assert_eq!(
        Value::Object(controller.data().expect("data")),
        json!({ "a": 1 })
    );
}

#[test]
fn failed_defaults_keep_last_good_values() {
    let controller = FormController::new(
        DefaultValues::deferred(|| async {
            Err::<ValueMap, DefaultsError>(DefaultsError::Producer("offline".to_string()))
        }),
        FormOptions::default(),
    );
    controller.set_value("b", json!(2)).expect("write while pending");

    let phase = block_on(controller.resolve_defaults()).expect("resolve");

    assert_eq!(phase, DefaultsPhase::Failed);
    assert_eq!(
        Value::Object(controller.values().expect("values")),
        json!({ "b": 2 })
    );

    let sync = FormController::new(
        DefaultValues::producer(|| Err(DefaultsError::NotAMap)),
        FormOptions::default(),
    );
    assert_eq!(sync.defaults_phase().expect("phase"), DefaultsPhase::Failed);
    assert!(sync.values().expect("values").is_empty());
}

#[test]
fn non_map_defaults_degrade_to_empty() {
    let controller = FormController::new(json!([1, 2, 3]), FormOptions::default());

    assert_eq!(controller.defaults_phase().expect("phase"), DefaultsPhase::Ready);
    assert!(controller.values().expect("values").is_empty());
}

#[test]
fn typed_model_round_trips_through_lenses() {
    let fields = ProfileForm::fields();
    let controller = FormController::from_model(
        &ProfileForm {
            name: "Ann".to_string(),
            age: 30,
            email: "ann@calm.form".to_string(),
        },
        FormOptions::default(),
    )
    .expect("controller from model");

    assert_eq!(fields.email().key().as_str(), "emailAddress");
    assert_eq!(ProfileForm::field_keys(), &["name", "age", "emailAddress"]);

    controller.set_field(fields.age(), 31).expect("set age");
    assert_eq!(controller.field(fields.age()).expect("age"), Some(31));

    controller
        .register_rules(fields.name(), RuleSet::from(Rule::min_length(5)))
        .expect("register");
    assert!(block_on(controller.validate()).is_err());

    let model: ProfileForm = controller.model().expect("model");
    assert_eq!(model.age, 31);
    assert_eq!(model.email, "ann@calm.form");
}

#[test]
fn binder_reads_writes_and_reports_errors() {
    let controller = quick_form(json!({ "email": "" }));
    let context = FormContext::root(&controller);
    let binder = FieldBinder::mount(&context, "email", RuleSet::from(Rule::required()))
        .expect("mount")
        .label("Email")
        .required(true);

    assert!(block_on(context.validate()).is_err());
    let presentation = binder.presentation().expect("presentation");
    assert_eq!(presentation.label.as_deref(), Some("Email"));
    assert!(presentation.required);
    assert!(presentation.error.is_some());

    binder.change(json!("a@calm.form")).expect("change");
    assert_eq!(binder.value(), Some(json!("a@calm.form")));
    block_on(context.validate()).expect("filled field validates");
    assert!(binder.presentation().expect("presentation").error.is_none());
}

#[test]
fn binder_presentation_falls_back_to_context() {
    let controller = FormController::new(
        map(json!({})),
        FormOptions {
            direction: Direction::Vertical,
            disabled: true,
            label_props: map(json!({ "width": 120, "align": "left" })),
            ..FormOptions::default()
        },
    );
    let context = FormContext::root(&controller);

    let inherited = FieldBinder::mount(&context, "a", RuleSet::new()).expect("mount a");
    assert!(inherited.is_disabled());
    assert!(!inherited.is_horizontal());

    let own = FieldBinder::mount(&context, "b", RuleSet::new())
        .expect("mount b")
        .disabled(false)
        .direction(Direction::Horizontal)
        .label_props(map(json!({ "width": 80 })));
    assert!(!own.is_disabled());
    assert!(own.is_horizontal());
    assert_eq!(
        Value::Object(own.merged_label_props()),
        json!({ "width": 80, "align": "left" })
    );

    let enabled = context.clone().with_disabled(false);
    let child = FieldBinder::mount(&enabled, "c", RuleSet::new()).expect("mount c");
    assert!(!child.is_disabled());
}

#[test]
fn binder_rename_reregisters_and_notifies() {
    let controller = quick_form(json!({}));
    let renames = Arc::new(Mutex::new(Vec::new()));
    let recorder = renames.clone();
    controller
        .on_field_change(move |field, previous| {
            recorder
                .lock()
                .expect("renames")
                .push((field.to_string(), previous.map(ToString::to_string)));
        })
        .expect("register field listener");
    let context = FormContext::root(&controller);

    let mut binder =
        FieldBinder::mount(&context, "email", RuleSet::from(Rule::required())).expect("mount");
    binder.set_field("contact").expect("rename");
    binder.set_field("contact").expect("same name");

    assert_eq!(
        *renames.lock().expect("renames"),
        vec![
            ("email".to_string(), None),
            ("contact".to_string(), Some("email".to_string()))
        ]
    );
    assert!(
        controller
            .registered_rules(&FieldKey::new("contact"))
            .expect("rules")
            .is_some()
    );
    assert_eq!(
        controller.mounted_fields().expect("mounted"),
        vec![FieldKey::new("contact")]
    );

    binder
        .set_rules(RuleSet::from(Rule::min_length(2)))
        .expect("set rules");
    assert_eq!(
        controller
            .registered_rules(&FieldKey::new("contact"))
            .expect("rules")
            .map(|rules| rules.len()),
        Some(1)
    );
}

#[test]
fn multiple_binder_merges_partial_maps() {
    let controller = quick_form(json!({ "start": 0 }));
    let context = FormContext::root(&controller);
    let binder = FieldBinder::mount(&context, "range", RuleSet::new())
        .expect("mount")
        .multiple();

    binder
        .change(json!({ "start": 1, "end": 2 }))
        .expect("merge change");

    assert_eq!(binder.value(), Some(json!({ "start": 1, "end": 2 })));
}

#[test]
fn bound_widget_composes_handler_write_and_sync() {
    let controller = quick_form(json!({ "title": "a" }));
    let context = FormContext::root(&controller);
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let binder = FieldBinder::mount(&context, "title", RuleSet::new())
        .expect("mount")
        .disabled(true);

    let mut bound = binder.bind(TestInput::default()).on_change(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(bound.widget().shown, Some(json!("a")));
    assert!(bound.widget().disabled);

    bound.change(json!("b")).expect("change");

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(bound.widget().shown, Some(json!("b")));
    assert_eq!(bound.widget().syncs, 2);
    assert_eq!(controller.value("title").expect("title"), Some(json!("b")));
}

#[test]
fn triggers_run_click_handler_then_act() {
    let controller = quick_form(json!({ "name": "Ann" }));
    let context = FormContext::root(&controller);
    let clicks = Arc::new(AtomicUsize::new(0));
    let submits = Arc::new(AtomicUsize::new(0));
    let submit_counter = submits.clone();
    controller
        .on_submit(move |_| {
            submit_counter.fetch_add(1, Ordering::SeqCst);
        })
        .expect("register submit listener");

    let click_counter = clicks.clone();
    let submit = SubmitTrigger::new(&context).on_click(move || {
        click_counter.fetch_add(1, Ordering::SeqCst);
    });
    block_on(submit.click()).expect("submit click");
    assert_eq!(clicks.load(Ordering::SeqCst), 1);
    assert_eq!(submits.load(Ordering::SeqCst), 1);

    controller.set_value("name", json!("Bob")).expect("set");
    ResetTrigger::new(&context).click().expect("reset click");
    assert_eq!(controller.value("name").expect("name"), Some(json!("Ann")));
}

#[test]
fn nested_scopes_share_root_lifecycle() {
    let controller = quick_form(json!({ "profile": { "name": "" } }));
    let context = FormContext::root(&controller);
    let profile = context.object("profile");
    profile
        .context()
        .add_item("profile.name", RuleSet::from(Rule::required()))
        .expect("register from nested scope");

    assert!(block_on(profile.context().submit()).is_err());
    assert!(
        profile
            .context()
            .validate_errors()
            .expect("errors")
            .is_some()
    );
    assert_eq!(controller.submit_count().expect("count"), 1);
}

#[test]
fn options_load_from_json() {
    let options = FormOptions::from_json(json!({
        "quick": false,
        "direction": "vertical",
        "locale": "zh-CN",
        "label_props": { "width": 100 }
    }))
    .expect("options");

    assert!(!options.quick);
    assert_eq!(options.direction, Direction::Vertical);
    assert!(!options.disabled);
    assert_eq!(options.locale, Locale::Tag("zh-CN".to_string()));
    assert_eq!(Value::Object(options.label_props), json!({ "width": 100 }));

    let defaults = FormOptions::from_json(json!({})).expect("empty options");
    assert_eq!(defaults, FormOptions::default());
}

#[test]
fn poisoned_state_degrades_scopes_to_empty() {
    let controller = quick_form(json!({ "a": 1 }));
    let poisoner = controller.clone();
    let joined = std::thread::spawn(move || {
        let _guard = poisoner.state.write();
        panic!("poison form state");
    })
    .join();
    assert!(joined.is_err());

    let context = FormContext::root(&controller);
    assert_eq!(context.values(), json!({}));
    assert_eq!(context.value("a"), None);
    assert!(matches!(
        controller.values(),
        Err(FormError::StatePoisoned(_))
    ));
}

#[test]
fn controller_clones_share_state() {
    let controller = quick_form(json!({}));
    let clone = controller.clone();

    clone.set_value("a", json!(1)).expect("set through clone");

    assert_eq!(controller.value("a").expect("value"), Some(json!(1)));
    assert_eq!(
        controller.form_id().expect("id"),
        clone.form_id().expect("id")
    );
}
