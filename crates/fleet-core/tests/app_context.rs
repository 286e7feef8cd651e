//! End-to-end tests wiring fleet.toml through AppContext with real commands.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use fleet_core::config::CONFIG_FILE_NAME;
use fleet_core::context::AppContext;
use fleet_core::deploy::{DeployOutcome, RecordingReporter};
use fleet_core::error::PipelineError;
use tempfile::TempDir;

fn write_project(root: &Path) {
    fs::write(
        root.join(CONFIG_FILE_NAME),
        r#"
project_id = "e2e"

[build]
command = ["cp", "{source}/index.js", "{output}/index.js"]

[platform]
deploy_command = ["sh", "-c", "echo {name}@{project}:{region} >> deploys.log"]
list_command = ["printf", "api\nlegacy\n"]

[defaults]
region = "eu-west-1"
"#,
    )
    .unwrap();

    for (name, content) in [("api", "a1"), ("web", "w1")] {
        let dir = root.join("functions").join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("index.js"), content).unwrap();
    }
}

#[test]
fn missing_config_is_a_config_error() {
    let temp = TempDir::new().unwrap();
    let err = AppContext::load(Some(&temp.path().join(CONFIG_FILE_NAME))).unwrap_err();
    assert!(matches!(err, PipelineError::Config(_)));
}

#[test]
fn scan_uses_configured_roots_and_defaults() {
    let temp = TempDir::new().unwrap();
    write_project(temp.path());

    let ctx = AppContext::load(Some(&temp.path().join(CONFIG_FILE_NAME))).unwrap();
    let descriptors = ctx.scan().unwrap();

    assert_eq!(descriptors.len(), 2);
    assert_eq!(descriptors[0].function_name, "api");
    assert_eq!(descriptors[0].output_path, temp.path().join("dist").join("api"));
    assert_eq!(descriptors[0].trigger.region.as_deref(), Some("eu-west-1"));
}

#[cfg(unix)]
#[tokio::test]
async fn deploy_then_redeploy_with_command_collaborators() {
    let temp = TempDir::new().unwrap();
    write_project(temp.path());
    let ctx = AppContext::load(Some(&temp.path().join(CONFIG_FILE_NAME))).unwrap();
    let project_id = ctx.config().project_id.clone();

    let run = || async {
        ctx.orchestrator(ctx.deploy_options(), Arc::new(RecordingReporter::new()))
            .unwrap()
            .run(ctx.scan().unwrap())
            .await
            .unwrap()
    };

    let first = run().await;
    assert!(first.success(), "{first:?}");
    assert_eq!(first.count(DeployOutcome::Deployed), 2);

    let log = fs::read_to_string(temp.path().join("deploys.log")).unwrap();
    let mut lines: Vec<String> = log.lines().map(String::from).collect();
    lines.sort();
    assert_eq!(
        lines,
        vec![
            format!("api@{project_id}:eu-west-1"),
            format!("web@{project_id}:eu-west-1"),
        ]
    );

    fs::write(temp.path().join("functions/web/index.js"), "w2").unwrap();
    let second = run().await;
    assert_eq!(second.result("api").unwrap().outcome, DeployOutcome::Skipped);
    assert_eq!(second.result("web").unwrap().outcome, DeployOutcome::Deployed);
}

#[cfg(unix)]
#[tokio::test]
async fn orphans_lists_remote_only_functions() {
    let temp = TempDir::new().unwrap();
    write_project(temp.path());
    let ctx = AppContext::load(Some(&temp.path().join(CONFIG_FILE_NAME))).unwrap();

    assert_eq!(ctx.orphans().await.unwrap(), vec!["legacy".to_string()]);
}
