use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;

use tidyfold_lib::services::prompt_service::ORGANIZER_INSTRUCTIONS;
use tidyfold_lib::{
    start_organization, AppState, ChatMessage, OracleError, OracleGateway, OrganizerConfig,
    PlanningOracle, RunOutcome,
};

type Script = Box<dyn Fn(&str) -> String + Send + Sync>;

struct ScriptedOracle {
    script: Script,
    calls: AtomicUsize,
}

#[async_trait]
impl PlanningOracle for ScriptedOracle {
    async fn complete(&self, transcript: &[ChatMessage]) -> Result<String, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let prompt = transcript.last().map(|m| m.content.as_str()).unwrap_or("");
        Ok((self.script)(prompt))
    }
}

fn field<'a>(prompt: &'a str, key: &str) -> Option<&'a str> {
    prompt.lines().find_map(|line| line.strip_prefix(key))
}

fn test_config() -> OrganizerConfig {
    OrganizerConfig {
        retry_delay_ms: 1,
        janitor_interval_secs: 3600,
        ..OrganizerConfig::default()
    }
}

type Fixture = (AppState, Arc<OracleGateway>, Arc<ScriptedOracle>);

fn setup(script: impl Fn(&str) -> String + Send + Sync + 'static) -> Fixture {
    setup_with(test_config(), script)
}

fn setup_with(
    config: OrganizerConfig,
    script: impl Fn(&str) -> String + Send + Sync + 'static,
) -> Fixture {
    let oracle = Arc::new(ScriptedOracle {
        script: Box::new(script),
        calls: AtomicUsize::new(0),
    });
    let gateway = Arc::new(OracleGateway::new(
        oracle.clone(),
        ORGANIZER_INSTRUCTIONS,
        config.max_transcript_messages,
    ));
    (AppState::new(config), gateway, oracle)
}

fn loose_files(dir: &Path) -> Vec<String> {
    fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap())
        .filter(|entry| entry.file_type().unwrap().is_file())
        .map(|entry| entry.file_name().to_string_lossy().to_string())
        .collect()
}

#[tokio::test]
async fn files_are_sorted_by_type() {
    let base = TempDir::new().unwrap();
    fs::write(base.path().join("report.pdf"), "pdf").unwrap();
    fs::write(base.path().join("photo.jpg"), "jpg").unwrap();

    let (state, gateway, _) = setup(|prompt| match field(prompt, "File: ") {
        Some(name) if name.ends_with(".pdf") => format!(
            r#"[{{"action":"move_file","source":"{name}","destination":"Documents/{name}"}}]"#
        ),
        Some(name) if name.ends_with(".jpg") => format!(
            r#"[{{"action":"move_file","source":"{name}","destination":"Images/{name}"}}]"#
        ),
        _ => "[]".to_string(),
    });

    let outcome =
        start_organization(&state, gateway, &base.path().to_string_lossy()).await;
    let RunOutcome::Completed(summary) = outcome else {
        panic!("run did not complete: {outcome:?}");
    };

    assert!(base.path().join("Documents/report.pdf").is_file());
    assert!(base.path().join("Images/photo.jpg").is_file());
    assert!(loose_files(base.path()).is_empty());
    assert_eq!(summary.moved, 2);

    let moved: Vec<String> = state
        .audit
        .messages()
        .into_iter()
        .filter(|m| m.starts_with("Moved"))
        .collect();
    assert_eq!(
        moved,
        vec![
            "Moved photo.jpg -> Images/photo.jpg".to_string(),
            "Moved report.pdf -> Documents/report.pdf".to_string(),
        ]
    );

    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["moved"], 2);
}

#[tokio::test]
async fn emptied_folder_is_removed_before_parent_finishes() {
    let base = TempDir::new().unwrap();
    let root: PathBuf = base.path().to_path_buf();
    fs::create_dir_all(root.join("inbox")).unwrap();
    fs::write(root.join("inbox/a.txt"), "a").unwrap();
    fs::create_dir_all(root.join("Docs")).unwrap();
    fs::write(root.join("Docs/.keep"), "").unwrap();

    let stub_root = root.clone();
    let (state, gateway, _) = setup(move |prompt| {
        if field(prompt, "File: ") == Some("a.txt") && field(prompt, "Directory: ") == Some("inbox")
        {
            let _ = fs::rename(stub_root.join("inbox/a.txt"), stub_root.join("Docs/a.txt"));
        }
        "[]".to_string()
    });

    let outcome = start_organization(&state, gateway, &root.to_string_lossy()).await;
    let RunOutcome::Completed(summary) = outcome else {
        panic!("run did not complete: {outcome:?}");
    };

    assert!(!root.join("inbox").exists());
    assert!(root.join("Docs/a.txt").is_file());
    assert_eq!(summary.removed_dirs, 1);
    assert!(state
        .audit
        .messages()
        .contains(&"Removed empty folder inbox".to_string()));
}

#[tokio::test]
async fn protected_root_is_refused_without_oracle_calls() {
    let (state, gateway, oracle) = setup(|_| "[]".to_string());

    let outcome = start_organization(&state, gateway, "/etc").await;

    assert!(matches!(outcome, RunOutcome::Refused(_)));
    assert_eq!(oracle.calls.load(Ordering::SeqCst), 0);
    assert!(!state.is_busy());
}

#[tokio::test]
async fn refinement_sweep_follows_config() {
    for (refine, expected_calls) in [(true, 2), (false, 1)] {
        let base = TempDir::new().unwrap();
        for folder in ["pics", "Docs"] {
            fs::create_dir_all(base.path().join(folder)).unwrap();
            fs::write(base.path().join(folder).join(".keep"), "").unwrap();
        }

        let config = OrganizerConfig {
            refinement_pass: refine,
            ..test_config()
        };
        let (state, gateway, oracle) = setup_with(config, |_| "[]".to_string());

        start_organization(&state, gateway, &base.path().to_string_lossy()).await;

        assert_eq!(oracle.calls.load(Ordering::SeqCst), expected_calls);
    }
}
