use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn apd_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("apd");
    path
}

const HARVEST: &str = r#"{"content_id": "2601.01234", "period_id": "2026-W03", "content_type": "PAPER", "title": "Scaling Laws for Sparse Mixture Models", "source_url": "https://huggingface.co/papers/2601.01234"}
{"content_id": "arxiv-2601.01234", "period_id": "2026-01-14", "content_type": "PAPER", "title": "Sparse mixture scaling", "pdf_url": "https://arxiv.org/pdf/2601.01234v1"}
{"content_id": "rust-lang/rust", "period_id": "2026-W03", "content_type": "GITHUB", "title": "rust", "source_url": "https://github.com/rust-lang/rust", "github_stars": 100000, "github_language": "Rust", "github_description": "Empowering everyone to build reliable and efficient software."}
{"content_id": "tiny/toy", "period_id": "2026-W03", "content_type": "REPOSITORY", "title": "toy", "github_stars": 12}
{"content_id": "zhihu-1", "period_id": "2026-W03", "content_type": "NEWS", "title": "Open model release tops the charts", "news_rank": 1, "news_source": "zhihu"}
{"content_id": "misc-80", "period_id": "2026-W03", "content_type": "NEWS", "title": "Minor update", "news_rank": 80}
this line is not json
"#;

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/apd.sqlite"

[dedup]
merge_strategy = "keep_first"

[pipeline]
max_retries = 2

[embedding]
provider = "disabled"
"#,
        root.display()
    );

    let config_path = config_dir.join("apd.toml");
    fs::write(&config_path, config_content).unwrap();
    fs::write(root.join("harvest.jsonl"), HARVEST).unwrap();

    (tmp, config_path)
}

fn run_apd(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = apd_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run apd binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn ingest(tmp: &TempDir, config_path: &Path) {
    let harvest = tmp.path().join("harvest.jsonl");
    let (stdout, stderr, success) = run_apd(config_path, &["ingest", harvest.to_str().unwrap()]);
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_apd(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/apd.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_apd(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_apd(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_apd(&tmp.path().join("nope.toml"), &["status"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"), "{stderr}");
}

#[test]
fn test_ingest_counts_malformed_lines() {
    let (tmp, config_path) = setup_test_env();
    let harvest = tmp.path().join("harvest.jsonl");

    let (stdout, stderr, success) = run_apd(&config_path, &["ingest", harvest.to_str().unwrap()]);
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("records read: 7"), "{stdout}");
    assert!(stdout.contains("upserted and scored: 6"), "{stdout}");
    assert!(stdout.contains("failed: 1"), "{stdout}");
}

#[test]
fn test_ingest_is_idempotent() {
    let (tmp, config_path) = setup_test_env();
    ingest(&tmp, &config_path);
    ingest(&tmp, &config_path);

    let (stdout, _, success) = run_apd(&config_path, &["status"]);
    assert!(success);
    assert!(stdout.contains("TOTAL"));
    let total_line = stdout.lines().find(|l| l.contains("TOTAL")).unwrap();
    assert!(total_line.trim().ends_with('6'), "{total_line}");
}

#[test]
fn test_list_hides_filtered_records() {
    let (tmp, config_path) = setup_test_env();
    ingest(&tmp, &config_path);

    let (stdout, _, success) = run_apd(
        &config_path,
        &["list", "--type", "NEWS", "--exclude-filtered", "--order", "quality"],
    );
    assert!(success);
    assert!(stdout.contains("zhihu-1"), "{stdout}");
    assert!(!stdout.contains("misc-80"), "{stdout}");

    let (stdout, _, _) = run_apd(&config_path, &["show", "tiny/toy"]);
    assert!(stdout.contains("filtered_out: true"), "{stdout}");
    assert!(stdout.contains("too few stars"), "{stdout}");
}

#[test]
fn test_show_unknown_id_fails() {
    let (_tmp, config_path) = setup_test_env();
    run_apd(&config_path, &["init"]);
    let (_, stderr, success) = run_apd(&config_path, &["show", "does-not-exist"]);
    assert!(!success);
    assert!(stderr.contains("content not found"), "{stderr}");
}

#[test]
fn test_find_by_title() {
    let (tmp, config_path) = setup_test_env();
    ingest(&tmp, &config_path);

    let (stdout, _, success) = run_apd(&config_path, &["find", "OPEN MODEL RELEASE tops the charts!"]);
    assert!(success);
    assert!(stdout.contains("zhihu-1"), "{stdout}");
}

#[test]
fn test_status_lifecycle_with_retry() {
    let (tmp, config_path) = setup_test_env();
    ingest(&tmp, &config_path);

    let (stdout, stderr, success) = run_apd(&config_path, &["advance", "zhihu-1", "PDF_OK"]);
    assert!(success, "advance failed: {stderr}");
    assert!(stdout.contains("zhihu-1 -> PDF_OK"));

    let (_, stderr, success) = run_apd(&config_path, &["advance", "zhihu-1", "NEW"]);
    assert!(!success, "regression should be rejected");
    assert!(stderr.contains("cannot move"), "{stderr}");

    let (_, _, success) = run_apd(
        &config_path,
        &["advance", "zhihu-1", "ERROR", "--error", "generation failed"],
    );
    assert!(success);

    let (stdout, _, _) = run_apd(&config_path, &["show", "zhihu-1"]);
    assert!(stdout.contains("failed at:    PDF_OK"), "{stdout}");

    let (stdout, _, success) = run_apd(&config_path, &["retry", "--period", "2026-W03"]);
    assert!(success);
    assert!(stdout.contains("reset 1 errored record(s)"), "{stdout}");

    let (stdout, _, _) = run_apd(&config_path, &["show", "zhihu-1"]);
    assert!(stdout.contains("status:       PDF_OK"), "{stdout}");
    assert!(stdout.contains("retry_count:  1"), "{stdout}");
}

#[test]
fn test_ready_lists_earlier_stages() {
    let (tmp, config_path) = setup_test_env();
    ingest(&tmp, &config_path);
    run_apd(&config_path, &["advance", "zhihu-1", "VIDEO_OK"]);

    let (stdout, _, success) = run_apd(&config_path, &["ready", "NBLM_OK", "--period", "2026-W03"]);
    assert!(success);
    assert!(stdout.contains("misc-80"), "{stdout}");
    assert!(!stdout.contains("zhihu-1"), "{stdout}");
}

#[test]
fn test_dedup_and_merge() {
    let (tmp, config_path) = setup_test_env();
    ingest(&tmp, &config_path);

    let (stdout, stderr, success) = run_apd(&config_path, &["dedup", "--period", "2026-W03"]);
    assert!(success, "dedup failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("groups:             1"), "{stdout}");
    assert!(stdout.contains("2601.01234 <- arxiv-2601.01234"), "{stdout}");
    assert!(stdout.contains("exact_url"), "{stdout}");

    let (stdout, _, success) = run_apd(&config_path, &["merge"]);
    assert!(success);
    assert!(stdout.contains("merged:         1"), "{stdout}");

    let (stdout, _, _) = run_apd(&config_path, &["show", "arxiv-2601.01234"]);
    assert!(stdout.contains("merged_into:  2601.01234"), "{stdout}");

    // Already resolved; nothing left to merge.
    let (stdout, _, _) = run_apd(&config_path, &["merge"]);
    assert!(stdout.contains("pending groups: 0"), "{stdout}");
}

#[test]
fn test_manual_merge_strategy() {
    let (tmp, config_path) = setup_test_env();
    ingest(&tmp, &config_path);
    run_apd(&config_path, &["dedup"]);

    let (stdout, stderr, success) = run_apd(
        &config_path,
        &["merge", "--strategy", "manual:arxiv-2601.01234"],
    );
    assert!(success, "merge failed: {stderr}");
    assert!(stdout.contains("merged:         1"), "{stdout}");

    let (stdout, _, _) = run_apd(&config_path, &["show", "2601.01234"]);
    assert!(stdout.contains("merged_into:  arxiv-2601.01234"), "{stdout}");
}

#[test]
fn test_recommend_popular_skips_filtered() {
    let (tmp, config_path) = setup_test_env();
    ingest(&tmp, &config_path);

    let (stdout, stderr, success) = run_apd(&config_path, &["recommend", "popular", "--limit", "5"]);
    assert!(success, "recommend failed: {stderr}");
    assert!(stdout.contains("zhihu-1"), "{stdout}");
    assert!(stdout.contains("rust-lang/rust"), "{stdout}");
    assert!(!stdout.contains("tiny/toy"), "{stdout}");
    assert!(!stdout.contains("misc-80"), "{stdout}");
}

#[test]
fn test_recommend_similar_requires_content_id() {
    let (tmp, config_path) = setup_test_env();
    ingest(&tmp, &config_path);

    let (_, stderr, success) = run_apd(&config_path, &["recommend", "similar"]);
    assert!(!success);
    assert!(stderr.contains("--content-id"), "{stderr}");
}

#[test]
fn test_track_and_hybrid() {
    let (tmp, config_path) = setup_test_env();
    ingest(&tmp, &config_path);

    let (stdout, stderr, success) = run_apd(
        &config_path,
        &["track", "zhihu-1", "favorite", "--user", "alice"],
    );
    assert!(success, "track failed: {stderr}");
    assert!(stdout.contains("alice favorite zhihu-1 (weight 3)"), "{stdout}");

    let (_, stderr, success) = run_apd(
        &config_path,
        &["track", "zhihu-1", "view", "--user", "alice", "--weight", "0"],
    );
    assert!(!success);
    assert!(stderr.contains("positive"), "{stderr}");

    let (stdout, _, success) = run_apd(
        &config_path,
        &["recommend", "hybrid", "--user", "alice", "--log"],
    );
    assert!(success);
    assert!(stdout.contains("(popular)"), "{stdout}");

    let (stdout, _, _) = run_apd(&config_path, &["stats"]);
    assert!(stdout.contains("Interactions:    1 from 1 user(s)"), "{stdout}");
    assert!(!stdout.contains("Recommendations: 0"), "{stdout}");
}

#[test]
fn test_evaluate_all_rescores() {
    let (tmp, config_path) = setup_test_env();
    ingest(&tmp, &config_path);

    let (stdout, _, success) = run_apd(&config_path, &["evaluate"]);
    assert!(success);
    assert!(stdout.contains("scored: 0"), "{stdout}");

    let (stdout, _, success) = run_apd(&config_path, &["evaluate", "--all"]);
    assert!(success);
    assert!(stdout.contains("scored: 6"), "{stdout}");
}

#[test]
fn test_stats_by_type() {
    let (tmp, config_path) = setup_test_env();
    ingest(&tmp, &config_path);

    let (stdout, stderr, success) = run_apd(&config_path, &["stats"]);
    assert!(success, "stats failed: {stderr}");
    assert!(stdout.contains("Records:         6"), "{stdout}");
    assert!(stdout.contains("REPOSITORY"), "{stdout}");
    assert!(stdout.contains("NEWS"), "{stdout}");
}
