use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde_json::Value;

const CLAUDE_SESSION: &str = concat!(
    r#"{"type":"user","uuid":"u1","sessionId":"s1","timestamp":"2026-01-05T10:00:00Z","message":{"role":"user","content":"fix the build"}}"#,
    "\n",
    r#"{"type":"assistant","uuid":"a1","timestamp":"2026-01-05T10:00:02Z","message":{"role":"assistant","model":"claude-sonnet-4","content":[{"type":"text","text":"Reading."},{"type":"tool_use","id":"t1","name":"Read","input":{"file_path":"Cargo.toml"}}]}}"#,
    "\n",
    r#"{"type":"user","uuid":"u2","timestamp":"2026-01-05T10:00:03Z","message":{"role":"user","content":[{"type":"tool_result","tool_use_id":"t1","content":"[workspace]"}]}}"#,
    "\n",
    r#"{"type":"assistant","uuid":"a2","timestamp":"2026-01-05T10:00:05Z","message":{"role":"assistant","model":"claude-sonnet-4","content":[{"type":"text","text":"Fixed."}]}}"#,
    "\n",
);

fn codex_session(cwd: &str) -> String {
    [
        format!(
            r#"{{"timestamp":"2026-01-01T00:00:00Z","type":"session_meta","payload":{{"id":"c1","cwd":"{cwd}"}}}}"#
        ),
        r#"{"timestamp":"2026-01-01T00:00:01Z","type":"event_msg","payload":{"type":"user_message","message":"list files"}}"#.to_string(),
    ]
    .join("\n")
        + "\n"
}

fn write_file(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent");
    }
    fs::write(path, content).expect("write file");
}

struct Home {
    root: tempfile::TempDir,
    work: PathBuf,
    claude_session: PathBuf,
}

impl Home {
    fn path(&self, rel: &str) -> PathBuf {
        self.root.path().join(rel)
    }
}

/// Claude and Codex sessions for one working directory, with the other vendors absent.
fn make_home() -> Home {
    let root = tempfile::tempdir().expect("tempdir");
    let work = root.path().join("work").join("app");
    fs::create_dir_all(&work).expect("work dir");
    let encoded = work.to_string_lossy().replace(['/', '.'], "-");

    let claude_session = root
        .path()
        .join("claude/projects")
        .join(&encoded)
        .join("s1.jsonl");
    let claude_lines = CLAUDE_SESSION.replace(
        r#""sessionId":"s1","#,
        &format!(r#""sessionId":"s1","cwd":"{}","#, work.display()),
    );
    write_file(&claude_session, &claude_lines);
    write_file(
        &claude_session.with_file_name("s2.jsonl"),
        &claude_lines.replace("fix the build", "add tests"),
    );
    write_file(
        &root
            .path()
            .join("codex/sessions/2026/01/01/rollout-2026-01-01T00-00-00-c1.jsonl"),
        &codex_session(&work.to_string_lossy()),
    );
    write_file(
        &root.path().join("config/thinkt.toml"),
        "[reader]\ninitial_load_bytes = 64\n",
    );
    Home {
        root,
        work,
        claude_session,
    }
}

fn thinkt(home: &Home, args: &[&str]) -> Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_thinkt"));
    cmd.args(args)
        .env("HOME", home.path("home"))
        .env("THINKT_CONFIG_DIR", home.path("config"))
        .env("RUST_LOG", "off");
    for vendor in ["claude", "codex", "kimi", "gemini", "copilot", "qwen"] {
        cmd.env(
            format!("THINKT_{}_HOME", vendor.to_ascii_uppercase()),
            home.path(vendor),
        );
    }
    cmd.output().expect("run thinkt")
}

fn json(output: &Output) -> Value {
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("json stdout")
}

fn stdout(output: &Output) -> String {
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn sources_lists_only_present_vendors() {
    let home = make_home();
    let infos = json(&thinkt(&home, &["sources", "--json"]));
    let infos = infos.as_array().expect("array");
    assert_eq!(infos.len(), 2);
    assert_eq!(infos[0]["source"], "claude");
    assert_eq!(infos[0]["project_count"], 1);
    assert_eq!(infos[1]["source"], "codex");
    assert_eq!(infos[1]["available"], true);
}

#[test]
fn projects_across_and_within_sources() {
    let home = make_home();
    let text = stdout(&thinkt(&home, &["projects"]));
    assert!(text.contains("Total: 2 project(s)"), "{text}");
    assert!(text.contains(&home.work.to_string_lossy().into_owned()));

    let codex = json(&thinkt(&home, &["projects", "--source", "codex", "--json"]));
    let codex = codex.as_array().expect("array");
    assert_eq!(codex.len(), 1);
    assert_eq!(codex[0]["source"], "codex");
    assert_eq!(codex[0]["session_count"], 1);
}

#[test]
fn shared_path_needs_a_source() {
    let home = make_home();
    let work = home.work.to_string_lossy().into_owned();

    let ambiguous = thinkt(&home, &["sessions", &work]);
    assert!(!ambiguous.status.success());
    let stderr = String::from_utf8_lossy(&ambiguous.stderr);
    assert!(stderr.starts_with("Error:"), "{stderr}");
    assert!(stderr.contains("--source"), "{stderr}");

    let sessions = json(&thinkt(&home, &["sessions", &work, "--source", "claude", "--json"]));
    let sessions = sessions.as_array().expect("array");
    assert_eq!(sessions.len(), 2);
    assert!(sessions.iter().all(|meta| meta["entry_count"] == 4));
}

#[test]
fn view_by_id_and_by_path() {
    let home = make_home();
    let text = stdout(&thinkt(&home, &["view", "s1", "--source", "claude", "--all"]));
    assert!(text.contains("fix the build"), "{text}");
    assert!(text.contains("-> Read"), "{text}");
    assert!(text.contains("Fixed."), "{text}");
    assert!(!text.contains("Pass --all"));

    let path = home.claude_session.to_string_lossy().into_owned();
    let partial = json(&thinkt(&home, &["view", &path, "--json"]));
    assert_eq!(partial["has_more"], true);
    let entries = partial["entries"].as_array().expect("entries");
    assert!(!entries.is_empty() && entries.len() < 4);
    assert_eq!(entries[0]["text"], "fix the build");

    let missing = thinkt(&home, &["view", "nope"]);
    assert!(!missing.status.success());
}

#[test]
fn resolve_session_file_and_directory() {
    let home = make_home();
    let path = home.claude_session.to_string_lossy().into_owned();
    let session = json(&thinkt(&home, &["resolve", &path, "--json"]));
    assert_eq!(session["kind"], "session");
    assert_eq!(session["meta"]["id"], "s1");
    assert_eq!(session["meta"]["source"], "claude");

    let nested = home.work.join("src");
    fs::create_dir_all(&nested).expect("nested dir");
    let project = json(&thinkt(
        &home,
        &["resolve", &nested.to_string_lossy(), "--json"],
    ));
    assert_eq!(project["kind"], "project");
    assert_eq!(project["project"]["path"], home.work.to_string_lossy().as_ref());
}

#[test]
fn copy_then_delete() {
    let home = make_home();
    let work = home.work.to_string_lossy().into_owned();
    let target = home.path("backup");
    let target_str = target.to_string_lossy().into_owned();

    stdout(&thinkt(
        &home,
        &["copy", "project", &work, &target_str, "--source", "claude"],
    ));
    assert!(target.join("s1.jsonl").is_file());
    assert!(target.join("s2.jsonl").is_file());

    let path = home.claude_session.to_string_lossy().into_owned();
    let text = stdout(&thinkt(&home, &["delete", "session", &path, "--yes"]));
    assert!(text.contains("Deleted session s1"), "{text}");
    assert!(!home.claude_session.exists());
    assert!(home.claude_session.with_file_name("s2.jsonl").exists());

    let text = stdout(&thinkt(
        &home,
        &["delete", "project", &work, "--source", "codex", "--yes"],
    ));
    assert!(text.contains("Deleted 1 session(s)"), "{text}");
    let codex = json(&thinkt(&home, &["projects", "--source", "codex", "--json"]));
    assert_eq!(codex.as_array().map(Vec::len), Some(0));
}

#[test]
fn prompts_in_each_format() {
    let home = make_home();
    let plain = stdout(&thinkt(&home, &["prompts", "s1", "--format", "plain"]));
    assert_eq!(plain, "fix the build\n\n");

    let markdown = stdout(&thinkt(&home, &["prompts", "s1"]));
    assert!(markdown.starts_with("# Prompts\n"));
    assert!(markdown.contains("## 2026-01-05T10:00:00Z\n\nfix the build"));
    assert!(!markdown.contains("Fixed."));

    let value = json(&thinkt(&home, &["--json", "prompts", "s1"]));
    assert_eq!(value.as_array().map(Vec::len), Some(1));
    assert_eq!(value[0]["uuid"], "u1");

    let bad = thinkt(&home, &["prompts", "s1", "--format", "yaml"]);
    assert!(!bad.status.success());
}

#[test]
fn resume_prints_the_vendor_command() {
    let home = make_home();
    let out = stdout(&thinkt(&home, &["resume", "s1", "--print"]));
    assert_eq!(
        out.trim_end(),
        format!("cd {} && claude --resume s1", home.work.display())
    );

    let value = json(&thinkt(&home, &["--json", "resume", "s1"]));
    assert_eq!(value["program"], "claude");
    assert_eq!(value["source"], "claude");
    assert_eq!(value["args"][1], "s1");

    let codex = home.path("codex/sessions/2026/01/01/rollout-2026-01-01T00-00-00-c1.jsonl");
    let out = thinkt(&home, &["resume", &codex.to_string_lossy(), "--print"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("cannot be resumed"));
}
