use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thinkt_core::{CancellationToken, ContentBlock, Error, Role, Source};
use thinkt_local_store::sources::{create_store, UNKNOWN_PROJECT};
use thinkt_local_store::{ops, ProjectFilter, Store, StoreOptions, StoreRegistry};

const CLAUDE_SESSION: &str = concat!(
    r#"{"type":"user","uuid":"u1","sessionId":"s1","timestamp":"2026-01-05T10:00:00Z","message":{"role":"user","content":"fix the build"}}"#,
    "\n",
    r#"{"type":"assistant","uuid":"a1","timestamp":"2026-01-05T10:00:02Z","message":{"role":"assistant","model":"claude-sonnet-4","content":[{"type":"thinking","thinking":"look at Cargo.toml","signature":"sig"},{"type":"text","text":"Reading."},{"type":"tool_use","id":"t1","name":"Read","input":{"file_path":"Cargo.toml"}}]}}"#,
    "\n",
    r#"{"type":"user","uuid":"u2","timestamp":"2026-01-05T10:00:03Z","message":{"role":"user","content":[{"type":"tool_result","tool_use_id":"t1","content":[{"type":"text","text":"[workspace]"}]}]}}"#,
    "\n",
    r#"{"type":"assistant","uuid":"a2","timestamp":"2026-01-05T10:00:05Z","message":{"role":"assistant","model":"claude-sonnet-4","content":[{"type":"text","text":"Fixed."}]}}"#,
    "\n",
);

fn codex_session(cwd: &str) -> String {
    [
        format!(
            r#"{{"timestamp":"2026-01-01T00:00:00Z","type":"session_meta","payload":{{"id":"c1","cwd":"{cwd}","model_provider":"openai"}}}}"#
        ),
        r#"{"timestamp":"2026-01-01T00:00:01Z","type":"event_msg","payload":{"type":"user_message","message":"list files"}}"#.to_string(),
        r#"{"timestamp":"2026-01-01T00:00:02Z","type":"event_msg","payload":{"type":"agent_message","message":"Listing."}}"#.to_string(),
        r#"{"timestamp":"2026-01-01T00:00:02Z","type":"response_item","payload":{"type":"function_call","name":"shell","arguments":"{\"command\":[\"ls\"]}","call_id":"call_ls"}}"#.to_string(),
        r#"{"timestamp":"2026-01-01T00:00:03Z","type":"response_item","payload":{"type":"function_call_output","call_id":"call_ls","output":"{\"output\":\"a.txt\\n\"}"}}"#.to_string(),
    ]
    .join("\n")
        + "\n"
}

fn encode(path: &Path) -> String {
    path.to_string_lossy().replace(['/', '.'], "-")
}

struct Fixture {
    _root: tempfile::TempDir,
    claude: PathBuf,
    codex: PathBuf,
    work: PathBuf,
    registry: StoreRegistry,
}

/// Claude and Codex data for the same working directory, plus a Claude project whose
/// directory is gone.
fn fixture() -> Fixture {
    let root = tempfile::tempdir().expect("tempdir");
    let work = root.path().join("work").join("app");
    fs::create_dir_all(&work).expect("work dir");
    let work_str = work.to_string_lossy().into_owned();

    let claude = root.path().join("claude");
    let live = claude.join("projects").join(encode(&work));
    fs::create_dir_all(&live).expect("claude project");
    fs::write(live.join("s1.jsonl"), CLAUDE_SESSION).expect("claude session");
    fs::write(live.join("s2.jsonl"), CLAUDE_SESSION).expect("claude session");
    let gone = claude.join("projects").join("-gone-legacy");
    fs::create_dir_all(&gone).expect("gone project");
    fs::write(gone.join("old.jsonl"), CLAUDE_SESSION.replace("fix the build", "old work"))
        .expect("old session");

    let codex = root.path().join("codex");
    let day = codex.join("sessions/2026/01/01");
    fs::create_dir_all(&day).expect("codex dir");
    fs::write(
        day.join("rollout-2026-01-01T00-00-00-c1.jsonl"),
        codex_session(&work_str),
    )
    .expect("codex session");

    let options = StoreOptions::default();
    let registry = StoreRegistry::builder()
        .register(create_store(Source::Claude, claude.clone(), options.clone()))
        .register(create_store(Source::Codex, codex.clone(), options))
        .initial_load_bytes(64)
        .build();
    Fixture {
        _root: root,
        claude,
        codex,
        work,
        registry,
    }
}

#[test]
fn deleted_projects_are_filtered_by_default() {
    let fx = fixture();
    let cancel = CancellationToken::new();
    let live = fx
        .registry
        .list_all_projects(&cancel, &ProjectFilter::default())
        .expect("list");
    assert_eq!(live.len(), 2);
    assert!(live.iter().all(|p| p.path_exists));
    assert_eq!(live[0].source, Source::Claude);
    assert_eq!(live[1].source, Source::Codex);

    let all = fx
        .registry
        .list_all_projects(
            &cancel,
            &ProjectFilter {
                include_deleted: true,
                sources: Vec::new(),
            },
        )
        .expect("list");
    assert_eq!(all.len(), 3);
    let gone = all.iter().find(|p| !p.path_exists).expect("deleted project");
    assert_eq!(gone.path, "/gone/legacy");

    let codex_only = fx
        .registry
        .list_all_projects(
            &cancel,
            &ProjectFilter {
                include_deleted: false,
                sources: vec![Source::Codex],
            },
        )
        .expect("list");
    assert_eq!(codex_only.len(), 1);
    assert_ne!(codex_only[0].id, UNKNOWN_PROJECT);
}

#[test]
fn entry_count_matches_full_load() {
    let fx = fixture();
    let cancel = CancellationToken::new();
    for store in fx.registry.all() {
        for project in store.list_projects(&cancel).expect("projects") {
            let sessions = store.list_sessions(&cancel, &project.id).expect("sessions");
            assert_eq!(sessions.len(), project.session_count);
            for meta in sessions {
                let session = store
                    .load_session(&cancel, &meta.id)
                    .expect("load")
                    .expect("session exists");
                assert_eq!(meta.entry_count, session.entries.len(), "{}", meta.id);
                let counted: usize = meta.role_counts.values().sum();
                assert_eq!(counted, meta.entry_count);
                for role in Role::ALL {
                    let actual = session.entries.iter().filter(|e| e.role == role).count();
                    assert_eq!(meta.role_count(role), actual);
                }
            }
        }
    }
}

#[test]
fn codex_scenario_through_the_store() {
    let fx = fixture();
    let cancel = CancellationToken::new();
    let store = fx.registry.get(Source::Codex).expect("codex store");
    let mut reader = store
        .open_session(&cancel, "c1")
        .expect("open by uuid suffix");
    let mut entries = Vec::new();
    while let Some(entry) = reader.read_next().expect("read") {
        entries.push(entry);
    }
    reader.close().expect("close");
    assert!(matches!(reader.read_next(), Err(Error::Closed)));

    let roles: Vec<Role> = entries.iter().map(|e| e.role).collect();
    assert_eq!(
        roles,
        vec![Role::User, Role::Assistant, Role::Assistant, Role::Tool]
    );
    assert_eq!(entries[0].text, "list files");
    assert_eq!(entries[1].text, "Listing.");
    assert_eq!(
        entries[2].content_blocks,
        vec![ContentBlock::tool_use(
            "call_ls",
            "shell",
            serde_json::json!({"command": ["ls"]})
        )]
    );
    assert!(entries[3].tool_result_for("call_ls").is_some());
    assert_eq!(reader.metadata().project_path, fx.work.to_string_lossy());
}

#[test]
fn path_resolution_is_scoped_to_base_dirs() {
    let fx = fixture();
    let cancel = CancellationToken::new();
    let session = fx.claude.join("projects").join(encode(&fx.work)).join("s1.jsonl");

    let (store, meta) = fx
        .registry
        .resolve_session_by_path(&cancel, &session)
        .expect("resolve");
    assert_eq!(store.source(), Source::Claude);
    assert_eq!(meta.id, "s1");
    assert_eq!(meta.first_prompt, "fix the build");

    let outside = fx.work.join("s1.jsonl");
    fs::write(&outside, CLAUDE_SESSION).expect("stray file");
    let err = fx
        .registry
        .resolve_session_by_path(&cancel, &outside)
        .err()
        .expect("outside base dirs");
    assert!(err.is_not_found());

    let sneaky = fx.codex.join("..").join("work/app/s1.jsonl");
    assert!(fx
        .registry
        .resolve_session_by_path(&cancel, &sneaky)
        .err()
        .expect("escapes via ..")
        .is_not_found());

    let codex_store = fx.registry.get(Source::Codex).expect("codex");
    assert!(codex_store
        .get_session_meta(&cancel, &session.to_string_lossy())
        .expect("lookup")
        .is_none());
}

#[test]
fn ambiguous_and_unique_project_resolution() {
    let fx = fixture();
    let cancel = CancellationToken::new();
    let work = fx.work.to_string_lossy().into_owned();

    match fx.registry.resolve_project(&cancel, &work) {
        Err(Error::Ambiguous { sources, .. }) => {
            assert_eq!(sources, vec![Source::Claude, Source::Codex]);
        }
        other => panic!("expected ambiguity, got {other:?}"),
    }
    assert!(matches!(
        fx.registry.resolve_project(&cancel, "app"),
        Err(Error::Ambiguous { .. })
    ));

    let legacy = fx.registry.resolve_project(&cancel, "legacy").expect("suffix match");
    assert_eq!(legacy.source, Source::Claude);
    let by_id = fx
        .registry
        .resolve_project(&cancel, "-gone-legacy")
        .expect("id match");
    assert_eq!(by_id.path, "/gone/legacy");

    assert!(fx
        .registry
        .resolve_project(&cancel, "nope")
        .expect_err("no match")
        .is_not_found());

    let inner = fx.work.join("src/main.rs");
    let found = fx
        .registry
        .find_project_for_path(&cancel, &inner)
        .expect("find")
        .expect("containing project");
    assert_eq!(found.path, work);
}

#[test]
fn lazy_session_preloads_and_grows() {
    let fx = fixture();
    let cancel = CancellationToken::new();
    let session = fx.claude.join("projects").join(encode(&fx.work)).join("s2.jsonl");
    let mut lazy = fx
        .registry
        .open_lazy_session_by_path(&cancel, &session)
        .expect("open lazy");
    assert_eq!(lazy.metadata().entry_count, 4);
    assert_eq!(lazy.entry_count(), 1);
    assert!(lazy.has_more());
    assert!(lazy.progress() < 1.0);

    lazy.load_all().expect("load all");
    assert_eq!(lazy.entry_count(), lazy.metadata().entry_count);
    assert!(!lazy.has_more());

    let closer = lazy.closer();
    std::thread::spawn(move || closer.close())
        .join()
        .expect("close thread");
    assert!(matches!(lazy.load_all(), Err(Error::Closed)));
}

#[test]
fn copy_and_delete_project() {
    let fx = fixture();
    let cancel = CancellationToken::new();
    let project = fx
        .registry
        .list_all_projects(
            &cancel,
            &ProjectFilter {
                include_deleted: false,
                sources: vec![Source::Claude],
            },
        )
        .expect("list")
        .remove(0);

    let target = fx.work.join("export");
    assert_eq!(
        ops::copy_project(&fx.registry, &cancel, &project, &target).expect("copy"),
        2
    );
    assert_eq!(
        ops::copy_project(&fx.registry, &cancel, &project, &target).expect("copy again"),
        2
    );
    let mut names: Vec<String> = fs::read_dir(&target)
        .expect("read export")
        .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names, vec!["s1.jsonl", "s1_2.jsonl", "s2.jsonl", "s2_2.jsonl"]);

    let removed = ops::delete_project(&fx.registry, &cancel, &project).expect("delete");
    assert_eq!(removed, 2);
    let store: &Arc<dyn Store> = fx.registry.get_arc(Source::Claude).expect("claude");
    assert!(store.list_sessions(&cancel, &project.id).expect("list").is_empty());
    assert!(store
        .list_projects(&cancel)
        .expect("projects")
        .iter()
        .all(|p| p.id != project.id));
    assert!(ops::copy_project(&fx.registry, &cancel, &project, &target).is_err());
}

#[test]
fn delete_single_session() {
    let fx = fixture();
    let cancel = CancellationToken::new();
    let path = fx.codex.join("sessions/2026/01/01/rollout-2026-01-01T00-00-00-c1.jsonl");
    let meta = ops::delete_session(&fx.registry, &cancel, &path).expect("delete");
    assert_eq!(meta.source, Source::Codex);
    assert!(!path.exists());
    assert!(fx
        .registry
        .get(Source::Codex)
        .expect("codex")
        .list_projects(&cancel)
        .expect("projects")
        .is_empty());
}

#[test]
fn cancelled_listing_fails() {
    let fx = fixture();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = fx
        .registry
        .list_all_projects(&cancel, &ProjectFilter::default())
        .expect_err("cancelled");
    assert!(err.is_cancelled());
}

#[test]
fn source_status_reports_registered_stores() {
    let fx = fixture();
    let cancel = CancellationToken::new();
    let status = fx.registry.source_status(&cancel).expect("status");
    assert_eq!(status.len(), 2);
    assert!(status.iter().all(|info| info.available));
    assert_eq!(status[0].project_count, 2);
    assert_eq!(status[1].project_count, 1);
    assert_eq!(
        fx.registry.available_sources(),
        vec![Source::Claude, Source::Codex]
    );
}
