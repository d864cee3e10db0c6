mod common;

use std::cell::RefCell;
use std::rc::Rc;

use common::{path, Replica};
use serde_json::json;
use synced_doc::{Doc, Primitive};
use synced_store::array_diff::diff;
use synced_store::{Key, Path, StorePath, SyncError, Update, Value};

fn boris() -> Replica {
    let replica = Replica::new(100_000, json!({ "users": {} }));
    let report = replica.store.mutate(
        ["users", "boris"],
        Update::replace(json!({ "id": 1, "tests": [] })),
    );
    assert!(report.is_ok(), "{:?}", report.errors);
    replica
}

fn record(replica: &Replica, watched: &[&str]) -> Rc<RefCell<Vec<Vec<StorePath>>>> {
    let calls = Rc::new(RefCell::new(Vec::new()));
    let sink = calls.clone();
    replica
        .store
        .subscribe(path(watched), move |paths| sink.borrow_mut().push(paths.to_vec()));
    calls
}

// ── Write path ─────────────────────────────────────────────────────────────

#[test]
fn new_mapping_lands_in_document_and_store() {
    let replica = Replica::new(100_000, json!({ "users": {} }));
    let calls = record(&replica, &["users"]);

    let report = replica.store.mutate(
        ["users", "boris"],
        Update::replace(json!({ "id": 1, "tests": [] })),
    );

    assert!(report.is_ok());
    assert_eq!(report.branches, 1);
    assert!(report.ops > 0);
    let expected = json!({ "users": { "boris": { "id": 1, "tests": [] } } });
    assert_eq!(replica.doc.to_json_roots(), expected);
    assert_eq!(replica.store.snapshot(), expected);
    assert!(replica.store.doc_node(&path(&["users", "boris", "tests"])).is_some());
    assert_eq!(replica.store.linked_count(), 3);

    // The echo of the local write changes nothing.
    replica.settle();
    assert_eq!(replica.store.pending_updates(), 0);
    assert_eq!(calls.borrow().len(), 1);
    assert_eq!(calls.borrow()[0], vec![path(&["users", "boris"])]);
}

#[test]
fn swapping_two_elements_is_one_move() {
    let ops = diff(&[1, 2, 3], &[1, 3, 2]);
    assert_eq!(ops.moved.len(), 1);
    assert!(ops.added.is_empty());
    assert!(ops.deleted.is_empty());

    let replica = boris();
    let tests = ["users", "boris", "tests"];
    replica.store.mutate(tests, Update::replace(json!([1, 2, 3])));
    let report = replica.store.mutate(tests, Update::replace(json!([1, 3, 2])));

    assert!(report.is_ok());
    assert_eq!(report.ops, 2);
    assert_eq!(
        replica.store.get(&path(&tests)).map(|v| v.to_json()),
        Some(json!([1, 3, 2]))
    );
    assert_eq!(
        replica.doc.to_json_roots(),
        json!({ "users": { "boris": { "id": 1, "tests": [1, 3, 2] } } })
    );
}

#[test]
fn reordering_containers_keeps_their_document_nodes() {
    let replica = Replica::new(100_000, json!({ "cards": [] }));
    replica.store.mutate(
        "cards",
        Update::replace(json!([{ "n": "a" }, { "n": "b" }, { "n": "c" }])),
    );
    let first = replica.store.doc_node(&[Key::from("cards"), Key::from(0)]);
    let linked = replica.store.linked_count();

    let report = replica.store.mutate(
        "cards",
        Update::mutate_in_place(|draft| {
            if let Some(items) = draft.as_sequence_mut() {
                items.reverse();
            }
        }),
    );

    assert!(report.is_ok(), "{:?}", report.errors);
    assert!(report.ops <= 4);
    assert_eq!(
        replica.store.snapshot(),
        json!({ "cards": [{ "n": "c" }, { "n": "b" }, { "n": "a" }] })
    );
    assert_eq!(replica.store.doc_node(&[Key::from("cards"), Key::from(2)]), first);
    assert_eq!(replica.store.linked_count(), linked);
}

#[test]
fn removal_deletes_key_and_releases_mirrors() {
    let replica = boris();
    assert_eq!(replica.doc.observer_count(), 3);

    let report = replica.store.mutate(["users", "boris"], Update::Remove);

    assert!(report.is_ok());
    assert_eq!(replica.store.get(&path(&["users", "boris"])), None);
    assert_eq!(replica.doc.to_json_roots(), json!({ "users": {} }));
    assert_eq!(replica.store.linked_count(), 1);
    assert_eq!(replica.doc.observer_count(), 1);

    replica.settle();
    assert_eq!(replica.store.snapshot(), json!({ "users": {} }));
}

#[test]
fn filter_fans_out_to_matching_elements_only() {
    let replica = Replica::new(100_000, json!({ "people": [] }));
    replica
        .store
        .mutate("people", Update::replace(json!([{ "id": 1 }, { "id": -1 }])));

    let positive = Path::new()
        .key("people")
        .filter(|user| user.get("id").and_then(Value::as_i64).is_some_and(|id| id > 0))
        .key("flag");
    let report = replica.store.mutate(positive, Update::replace(true));

    assert!(report.is_ok());
    assert_eq!(report.branches, 1);
    assert_eq!(
        replica.store.snapshot(),
        json!({ "people": [{ "id": 1, "flag": true }, { "id": -1 }] })
    );

    let everyone = Path::new().key("people").filter(|_| true).key("id");
    let report = replica.store.mutate(
        everyone,
        Update::transform(|id| Some(Value::from(id.and_then(Value::as_i64).unwrap_or(0) * 10))),
    );
    assert_eq!(report.branches, 2);
    assert_eq!(report.applied, 2);
    assert_eq!(
        replica.doc.to_json_roots(),
        json!({ "people": [{ "id": 10, "flag": true }, { "id": -10 }] })
    );
}

#[test]
fn draft_edits_reach_nested_values() {
    let replica = Replica::new(100_000, json!({ "users": {} }));
    replica.store.mutate(
        ["users", "boris"],
        Update::replace(json!({ "age": 30, "tags": ["a"] })),
    );
    let boris = replica.store.doc_node(&path(&["users", "boris"]));
    let tags = replica.store.doc_node(&path(&["users", "boris", "tags"]));

    let report = replica.store.mutate(
        "users",
        Update::mutate_in_place(|draft| {
            if let Some(boris) = draft.get_mut("boris") {
                if let Some(age) = boris.get_mut("age") {
                    *age = Value::from(31);
                }
                if let Some(tags) = boris.get_mut("tags").and_then(Value::as_sequence_mut) {
                    tags.push(Value::from("b"));
                }
            }
        }),
    );

    assert!(report.is_ok(), "{:?}", report.errors);
    assert!(report.ops > 0);
    let expected = json!({ "users": { "boris": { "age": 31, "tags": ["a", "b"] } } });
    assert_eq!(replica.store.snapshot(), expected);
    assert_eq!(replica.doc.to_json_roots(), expected);
    assert_eq!(replica.store.doc_node(&path(&["users", "boris"])), boris);
    assert_eq!(replica.store.doc_node(&path(&["users", "boris", "tags"])), tags);
}

#[test]
fn untouched_draft_and_identity_transform_emit_nothing() {
    let replica = boris();

    let draft = replica.store.mutate("users", Update::mutate_in_place(|_| {}));
    let transform = replica
        .store
        .mutate(["users", "boris"], Update::transform(|current| current.cloned()));

    assert!(draft.is_ok() && transform.is_ok());
    assert_eq!(draft.ops + transform.ops, 0);
}

#[test]
fn filter_sees_nested_fields() {
    let replica = Replica::new(100_000, json!({ "people": [] }));
    replica.store.mutate(
        "people",
        Update::replace(json!([{ "profile": { "age": 30 } }, { "profile": { "age": 10 } }])),
    );

    let adults = Path::new()
        .key("people")
        .filter(|person| {
            person
                .get("profile")
                .and_then(|profile| profile.get("age"))
                .and_then(Value::as_i64)
                .is_some_and(|age| age > 18)
        })
        .key("adult");
    let report = replica.store.mutate(adults, Update::replace(true));

    assert_eq!(report.branches, 1);
    assert_eq!(
        replica.store.snapshot(),
        json!({ "people": [
            { "profile": { "age": 30 }, "adult": true },
            { "profile": { "age": 10 } },
        ] })
    );
}

#[test]
fn unchanged_value_emits_nothing() {
    let replica = boris();
    replica.doc.take_outbox();

    let report = replica.store.mutate(
        ["users", "boris"],
        Update::replace(json!({ "id": 1, "tests": [] })),
    );

    assert!(report.is_ok());
    assert_eq!(report.ops, 0);
    assert!(replica.doc.take_outbox().is_empty());
}

// ── Read path ──────────────────────────────────────────────────────────────

#[test]
fn remote_delete_of_unmirrored_key_is_ignored() {
    let replica = Replica::new(100_000, json!({ "users": {} }));
    let calls = record(&replica, &["users"]);
    let remote = Doc::new(200_000);
    let users = remote.root_map("users").unwrap();

    remote.transact(|tx| tx.map_set_primitive(users, "x", Primitive::from(1)).unwrap());
    remote.transact(|tx| tx.map_delete(users, "x").unwrap());
    for patch in remote.take_outbox() {
        replica.doc.apply_patch(&patch);
    }
    replica.settle();

    assert_eq!(replica.store.snapshot(), json!({ "users": {} }));
    assert!(replica.store.take_diagnostics().is_empty());
    assert!(calls.borrow().is_empty());
}

#[test]
fn remote_changes_arrive_in_one_debounced_batch() {
    let replica = Replica::new(100_000, json!({ "users": {} }));
    let calls = record(&replica, &["users"]);
    let remote = Doc::new(200_000);
    let users = remote.root_map("users").unwrap();

    remote.transact(|tx| {
        let alice = tx.new_map();
        tx.map_set_primitive(alice, "age", Primitive::from(3)).unwrap();
        tx.map_set(users, "alice", alice).unwrap();
    });
    remote.transact(|tx| tx.map_set_primitive(users, "bob", Primitive::from("hi")).unwrap());
    for patch in remote.take_outbox() {
        replica.doc.apply_patch(&patch);
    }

    assert_eq!(replica.store.snapshot(), json!({ "users": {} }));
    assert_eq!(replica.store.pending_updates(), 2);

    replica.settle();
    assert_eq!(
        replica.store.snapshot(),
        json!({ "users": { "alice": { "age": 3 }, "bob": "hi" } })
    );
    assert_eq!(calls.borrow().len(), 1);

    // Nested containers picked up from the remote are observed too.
    let alice = remote.model().obj(users).unwrap().get("alice").unwrap();
    remote.transact(|tx| tx.map_set_primitive(alice, "age", Primitive::from(4)).unwrap());
    for patch in remote.take_outbox() {
        replica.doc.apply_patch(&patch);
    }
    replica.settle();
    assert_eq!(
        replica.store.get(&path(&["users", "alice", "age"])),
        Some(Value::from(4))
    );
    assert_eq!(calls.borrow().len(), 2);
}

#[test]
fn last_write_in_a_window_wins() {
    let replica = Replica::new(100_000, json!({ "users": {} }));
    let calls = record(&replica, &["users"]);
    let remote = Doc::new(200_000);
    let users = remote.root_map("users").unwrap();

    remote.transact(|tx| tx.map_set_primitive(users, "x", Primitive::from(1)).unwrap());
    remote.transact(|tx| tx.map_set_primitive(users, "x", Primitive::from(2)).unwrap());
    for patch in remote.take_outbox() {
        replica.doc.apply_patch(&patch);
    }
    replica.settle();

    assert_eq!(calls.borrow().len(), 1);
    assert_eq!(replica.store.get(&path(&["users", "x"])), Some(Value::from(2)));
}

#[test]
fn containers_gone_before_the_flush_leave_no_observers() {
    let replica = Replica::new(100_000, json!({ "users": {} }));
    assert_eq!(replica.doc.observer_count(), 1);
    let remote = Doc::new(200_000);
    let users = remote.root_map("users").unwrap();

    for i in 0..5 {
        let key = format!("temp-{i}");
        remote.transact(|tx| {
            let temp = tx.new_map();
            tx.map_set(users, &key, temp).unwrap();
        });
        remote.transact(|tx| tx.map_delete(users, &key).unwrap());
    }
    for patch in remote.take_outbox() {
        replica.doc.apply_patch(&patch);
    }
    replica.settle();

    assert_eq!(replica.store.snapshot(), json!({ "users": {} }));
    assert_eq!(replica.doc.observer_count(), 1);
    assert_eq!(replica.store.linked_count(), 1);
}

#[test]
fn flush_now_skips_the_debounce_window() {
    let replica = Replica::new(100_000, json!({ "tags": [] }));
    let remote = Doc::new(200_000);
    let tags = remote.root_array("tags").unwrap();
    remote.transact(|tx| {
        let tag = tx.new_con(Primitive::from("rust"));
        tx.arr_insert(tags, 0, vec![tag]).unwrap();
    });
    for patch in remote.take_outbox() {
        replica.doc.apply_patch(&patch);
    }

    assert_eq!(replica.store.flush_now(), 1);
    assert_eq!(replica.store.snapshot(), json!({ "tags": ["rust"] }));
}

// ── Errors ─────────────────────────────────────────────────────────────────

#[test]
fn shape_must_be_a_mapping_of_collections() {
    let replica = Replica::new(100_000, json!([1, 2]));
    assert!(matches!(
        replica.store.take_diagnostics().as_slice(),
        [SyncError::ShapeViolation(_)]
    ));
    assert_eq!(replica.store.snapshot(), json!({}));

    let replica = Replica::new(100_000, json!({ "count": 1, "users": {} }));
    assert!(matches!(
        replica.store.take_diagnostics().as_slice(),
        [SyncError::ShapeViolation(_)]
    ));
    assert_eq!(replica.store.snapshot(), json!({ "users": {} }));
}

#[test]
fn existing_document_content_wins_over_the_shape() {
    let seed = boris();
    let patches = seed.doc.take_outbox();

    let doc = Doc::new(300_000);
    doc.root_map("users").unwrap();
    for patch in &patches {
        doc.apply_patch(patch);
    }
    let store = synced_store::create_synced_store(
        &doc,
        Value::from_json(&json!({ "users": { "someone": "else" } })),
        synced_store::SyncConfig::default(),
        seed.scheduler.clone(),
    );

    assert_eq!(
        store.snapshot(),
        json!({ "users": { "boris": { "id": 1, "tests": [] } } })
    );
    assert!(doc.take_outbox().is_empty());
}

#[test]
fn store_owned_values_cannot_be_copied() {
    let replica = boris();
    let before = replica.store.snapshot();

    let report = replica.store.mutate(
        "users",
        Update::mutate_in_place(|draft| {
            let boris = draft.get("boris").cloned();
            if let (Some(map), Some(boris)) = (draft.as_mapping_mut(), boris) {
                map.insert("copy".into(), boris);
            }
        }),
    );

    assert!(matches!(report.errors.as_slice(), [SyncError::ShapeViolation(_)]));
    assert_eq!(report.ops, 0);
    assert_eq!(replica.store.snapshot(), before);
}

#[test]
fn resolution_errors_are_reported() {
    let replica = boris();

    let missing = replica
        .store
        .mutate(["users", "nobody", "age"], Update::replace(1));
    assert!(matches!(missing.errors.as_slice(), [SyncError::PathNotFound(_)]));

    let filtered = replica.store.mutate(
        Path::new().key("users").filter(|_| true).key("id"),
        Update::replace(2),
    );
    assert!(matches!(
        filtered.errors.as_slice(),
        [SyncError::FilterOnNonSequence(_)]
    ));

    let absent = replica.store.mutate(
        ["users", "nobody"],
        Update::mutate_in_place(|_| {}),
    );
    assert!(matches!(absent.errors.as_slice(), [SyncError::Unsupported(_)]));

    let empty = replica.store.mutate(Path::new(), Update::Remove);
    assert!(matches!(empty.errors.as_slice(), [SyncError::Unsupported(_)]));

    assert_eq!(replica.store.take_diagnostics().len(), 4);
    assert_eq!(
        replica.store.snapshot(),
        json!({ "users": { "boris": { "id": 1, "tests": [] } } })
    );
}

#[test]
fn removing_an_absent_key_is_a_no_op() {
    let replica = boris();
    let report = replica.store.mutate(["users", "ghost"], Update::Remove);
    assert!(report.is_ok());
    assert_eq!(report.ops, 0);
}
