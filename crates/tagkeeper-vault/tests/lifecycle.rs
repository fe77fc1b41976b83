use std::fs;

use chrono::Duration;
use chrono::Utc;
use pretty_assertions::assert_eq;
use tempfile::tempdir;
use tempfile::TempDir;

use tagkeeper_core::bulk;
use tagkeeper_core::moves::MoveDecision;
use tagkeeper_core::moves::MoveHandler;
use tagkeeper_core::moves::RenameOutcome;
use tagkeeper_core::persistence;
use tagkeeper_core::persistence::StateStore;
use tagkeeper_core::rules::FolderRule;
use tagkeeper_core::state::EngineState;
use tagkeeper_core::state::Settings;
use tagkeeper_core::store::DocumentStore;
use tagkeeper_vault::vault::VaultStore;

fn tags(list: &[&str]) -> Vec<String> {
    list.iter().map(|t| t.to_string()).collect()
}

fn vault_fixture() -> (TempDir, VaultStore, EngineState) {
    let dir = tempdir().expect("tmpdir");
    fs::create_dir_all(dir.path().join("Health/Therapy")).expect("mkdir");
    fs::create_dir_all(dir.path().join("Inbox")).expect("mkdir");
    fs::write(
        dir.path().join("Health/note.md"),
        "---\ntitle: Note\n---\nbody\n",
    )
    .expect("write");
    fs::write(dir.path().join("Health/Therapy/session.md"), "session\n").expect("write");
    fs::write(dir.path().join("Inbox/capture.md"), "capture\n").expect("write");

    let store = VaultStore::open(dir.path()).expect("open");
    let mut state = EngineState::new(Settings::default());
    state.rules.insert(
        String::new(),
        FolderRule {
            folder_tag_levels: vec![1],
            ..FolderRule::default()
        },
    );
    state.rules.insert(
        "Health".to_string(),
        FolderRule {
            tags: tags(&["medical"]),
            ..FolderRule::default()
        },
    );
    (dir, store, state)
}

#[test]
fn bulk_apply_then_undo_round_trips_the_vault() {
    let (_dir, mut store, mut state) = vault_fixture();
    let now = Utc::now();

    let summary = bulk::bulk_apply(&mut state, &mut store, None, &mut |_| {}, now).expect("apply");
    assert_eq!(summary.changed, 3);
    assert_eq!(
        store.read_tags("Health/note.md").expect("read"),
        tags(&["health", "medical"])
    );
    assert_eq!(
        store.read_tags("Inbox/capture.md").expect("read"),
        tags(&["inbox"])
    );

    let op_id = state.history.latest_id().expect("recorded").to_string();
    let report = state
        .history
        .undo(&mut state.tracking, &mut store, &op_id, now)
        .expect("undo")
        .expect("found");

    assert_eq!(report.restored, 3);
    assert_eq!(report.failed, 0);
    assert!(store.read_tags("Health/note.md").expect("read").is_empty());
    assert!(state.tracking.is_empty());
    // the frontmatter block itself is gone again
    let content = fs::read_to_string(store.root().join("Health/Therapy/session.md")).expect("read");
    assert_eq!(content, "session\n");
}

#[test]
fn move_retag_decision_works_against_the_filesystem() {
    let (_dir, mut store, mut state) = vault_fixture();
    let now = Utc::now();
    bulk::bulk_apply(&mut state, &mut store, None, &mut |_| {}, now).expect("apply");

    let mut handler = MoveHandler::new();
    store
        .rename("Inbox/capture.md", "Health/capture.md")
        .expect("rename");
    let outcome = handler
        .on_rename(
            &mut state,
            &mut store,
            "Inbox/capture.md",
            "Health/capture.md",
            now,
        )
        .expect("signal");
    assert_eq!(outcome, RenameOutcome::Queued);

    let batch = handler
        .poll(now + Duration::milliseconds(500))
        .expect("debounce elapsed");
    let report = handler
        .apply_decision(
            &mut state,
            &mut store,
            batch,
            MoveDecision::Retag,
            &[],
            false,
            now,
        )
        .expect("decision");

    assert_eq!(report.applied, 1);
    assert_eq!(
        store.read_tags("Health/capture.md").expect("read"),
        tags(&["health", "medical"])
    );
    assert!(state.tracking.get("Inbox/capture.md").is_none());
    assert_eq!(
        state.tracking.get("Health/capture.md").expect("entry").auto_tags,
        tags(&["health", "medical"])
    );
}

#[test]
fn cancel_decision_restores_the_tree_and_cleans_up() {
    let (dir, mut store, mut state) = vault_fixture();
    let now = Utc::now();

    fs::create_dir_all(dir.path().join("Staging")).expect("mkdir");
    store
        .rename("Inbox/capture.md", "Staging/capture.md")
        .expect("rename");
    let mut handler = MoveHandler::new();
    handler
        .on_rename(
            &mut state,
            &mut store,
            "Inbox/capture.md",
            "Staging/capture.md",
            now,
        )
        .expect("signal");
    let batch = handler.poll(now + Duration::seconds(1)).expect("batch");
    handler
        .apply_decision(
            &mut state,
            &mut store,
            batch,
            MoveDecision::Cancel,
            &[],
            false,
            now,
        )
        .expect("decision");

    assert!(store.exists("Inbox/capture.md"));
    assert!(!store.exists("Staging/capture.md"));
    assert!(!dir.path().join("Staging").exists());
}

#[test]
fn engine_state_survives_a_restart() {
    let (dir, mut store, mut state) = vault_fixture();
    let now = Utc::now();
    bulk::bulk_apply(&mut state, &mut store, None, &mut |_| {}, now).expect("apply");

    let state_store =
        StateStore::open(dir.path().join(".tagkeeper/state.json")).expect("open state");
    state_store
        .save(&persistence::snapshot(&state))
        .expect("save");

    let reloaded = persistence::restore(
        state_store
            .load()
            .expect("load")
            .expect("state file present"),
    );
    assert_eq!(reloaded.rules, state.rules);
    assert_eq!(reloaded.tracking, state.tracking);
    assert_eq!(
        reloaded.history.operations(),
        state.history.operations()
    );
}
