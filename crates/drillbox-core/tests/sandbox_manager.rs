//! Sandbox lifecycle against a scripted container runtime.

use std::sync::Arc;
use std::time::Duration;

use drillbox_core::fakes::ScriptedRuntime;
use drillbox_core::sandbox::{
    CliOutput, SandboxConfig, SandboxError, SandboxManager, CONTROL_MOUNT_PATH, TIMEOUT_EXIT_CODE,
};
use drillbox_core::scenario::{
    Category, CommandCheck, Difficulty, Distribution, Scenario, ValidationCheck, ValidationRules,
};
use drillbox_core::Environment;

fn scenario(setup: &[&str]) -> Scenario {
    Scenario {
        id: "net-007".into(),
        category: Category::Networking,
        difficulty: Difficulty::Medium,
        task: "Bring up eth1".into(),
        points: 20,
        distribution: None,
        setup_commands: setup.iter().map(|s| s.to_string()).collect(),
        hints: vec![],
        time_limit: None,
        tags: vec![],
        validation: ValidationRules {
            checks: vec![ValidationCheck::Command(CommandCheck {
                command: "ip link show eth1".into(),
                expected_output: None,
                expected_exit_code: 0,
                regex_match: None,
                description: None,
            })],
        },
    }
}

fn manager(runtime: Arc<ScriptedRuntime>) -> SandboxManager {
    SandboxManager::with_runtime(SandboxConfig::default(), runtime)
}

// -------------------------------------------------------------------------
// Creation
// -------------------------------------------------------------------------

#[tokio::test]
async fn test_create_launches_with_mounts_and_runs_setup() {
    let runtime = Arc::new(ScriptedRuntime::new());
    runtime.on_exec(
        "apt-get install",
        CliOutput::failed(100, "E: Unable to locate package"),
    );
    let manager = manager(runtime.clone());
    let control = tempfile::tempdir().unwrap();

    let sandbox = manager
        .create(
            Distribution::Ubuntu,
            &scenario(&["mkdir -p /srv", "apt-get install -y nothing", "touch /srv/x"]),
            Some(control.path()),
        )
        .await
        .unwrap();

    assert!(sandbox.name.starts_with("drillbox-net-007-"));
    assert_eq!(sandbox.image, "drillbox-ubuntu:latest");
    assert_eq!(sandbox.id.len(), 64);
    assert_eq!(sandbox.short_id().len(), 12);

    let run = &runtime.calls_for("run")[0];
    let mount = format!("{}:{}:rw", control.path().display(), CONTROL_MOUNT_PATH);
    assert!(run.contains(&mount));
    assert!(run.contains(&"--privileged".to_string()));
    assert!(run.contains(&"SYS_ADMIN".to_string()));
    assert_eq!(run.last().unwrap(), "drillbox-ubuntu:latest");

    assert_eq!(runtime.calls_for("exec").len(), 3);
    assert_eq!(sandbox.setup_warnings.len(), 1);
    let warning = &sandbox.setup_warnings[0];
    assert_eq!(warning.index, 1);
    assert_eq!(warning.exit_code, 100);
    assert!(warning.output.contains("Unable to locate package"));
}

#[tokio::test]
async fn test_create_failure_is_classified() {
    let runtime = Arc::new(ScriptedRuntime::new());
    runtime.fail_next(
        "run",
        CliOutput::failed(
            1,
            "Got permission denied while trying to connect to the Docker daemon socket",
        ),
    );
    let err = manager(runtime.clone())
        .create(Distribution::Ubuntu, &scenario(&[]), None)
        .await
        .unwrap_err();
    assert!(matches!(err, SandboxError::PermissionDenied(_)));
    assert!(runtime.containers().is_empty());
}

#[tokio::test]
async fn test_timed_out_start_removes_partial_container() {
    let runtime = Arc::new(ScriptedRuntime::new().run_times_out());
    let err = manager(runtime.clone())
        .create(Distribution::Ubuntu, &scenario(&[]), None)
        .await
        .unwrap_err();
    assert!(matches!(err, SandboxError::Timeout { .. }));

    let run = &runtime.calls_for("run")[0];
    let name = &run[run.iter().position(|a| a == "--name").unwrap() + 1];
    let rm = &runtime.calls_for("rm")[0];
    assert_eq!(rm.last().unwrap(), name);
    assert!(runtime.containers().is_empty());
}

#[tokio::test]
async fn test_missing_image_is_built_from_recipe() {
    let recipes = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(recipes.path().join("rocky")).unwrap();
    std::fs::write(recipes.path().join("rocky/Dockerfile"), "FROM rockylinux:9\n").unwrap();

    let runtime = Arc::new(ScriptedRuntime::new().without_images());
    let config = SandboxConfig {
        recipes_dir: recipes.path().to_path_buf(),
        ..SandboxConfig::default()
    };
    let manager = SandboxManager::with_runtime(config, runtime.clone());

    let mut lines = Vec::new();
    let image = manager
        .acquire_image_with_progress(Distribution::Rocky, &mut |line: &str| {
            lines.push(line.to_string())
        })
        .await
        .unwrap();
    assert_eq!(image, "drillbox-rocky:latest");
    assert!(lines.iter().any(|l| l.starts_with("Successfully built")));
    assert_eq!(runtime.calls_for("build").len(), 1);

    // The second acquisition finds the built image.
    manager.acquire_image(Distribution::Rocky).await.unwrap();
    assert_eq!(runtime.calls_for("build").len(), 1);
}

#[tokio::test]
async fn test_missing_recipe_and_failed_build() {
    let recipes = tempfile::tempdir().unwrap();
    let config = SandboxConfig {
        recipes_dir: recipes.path().to_path_buf(),
        ..SandboxConfig::default()
    };

    let runtime = Arc::new(ScriptedRuntime::new().without_images());
    let err = SandboxManager::with_runtime(config.clone(), runtime)
        .acquire_image(Distribution::Centos)
        .await
        .unwrap_err();
    assert!(matches!(err, SandboxError::ImageBuild { ref reason, .. } if reason.contains("no build recipe")));

    std::fs::create_dir_all(recipes.path().join("centos")).unwrap();
    std::fs::write(recipes.path().join("centos/Dockerfile"), "FROM centos:7\n").unwrap();
    let runtime = Arc::new(ScriptedRuntime::new().without_images().fail_build(1));
    let err = SandboxManager::with_runtime(config, runtime)
        .acquire_image(Distribution::Centos)
        .await
        .unwrap_err();
    assert!(matches!(err, SandboxError::ImageBuild { ref reason, .. } if reason.contains("status 1")));
}

// -------------------------------------------------------------------------
// Execution
// -------------------------------------------------------------------------

#[tokio::test]
async fn test_execute_timeout_reports_exit_124() {
    let runtime = Arc::new(ScriptedRuntime::new());
    runtime.on_exec_timeout("sleep 600");
    let manager = manager(runtime.clone());
    let sandbox = manager
        .create(Distribution::Ubuntu, &scenario(&[]), None)
        .await
        .unwrap();

    let out = manager
        .execute(&sandbox, "sleep 600", Some(Duration::from_secs(2)))
        .await
        .unwrap();
    assert_eq!(out.exit_code, TIMEOUT_EXIT_CODE);
    assert!(out.stderr.unwrap().contains("timed out after 2s"));

    // Without a limit the same command simply runs.
    let out = manager.execute(&sandbox, "sleep 600", None).await.unwrap();
    assert_eq!(out.exit_code, 0);
}

#[tokio::test]
async fn test_execute_on_stopped_sandbox_is_not_running() {
    let runtime = Arc::new(ScriptedRuntime::new());
    let manager = manager(runtime.clone());
    let sandbox = manager
        .create(Distribution::Ubuntu, &scenario(&[]), None)
        .await
        .unwrap();

    runtime.kill(&sandbox.name);
    let err = manager.execute(&sandbox, "true", None).await.unwrap_err();
    assert!(matches!(err, SandboxError::NotRunning { .. }));

    let env = manager.environment(&sandbox);
    assert_eq!(env.execute("true", None).await.exit_code, -1);
}

#[tokio::test]
async fn test_environment_reads_through_exec() {
    let runtime = Arc::new(ScriptedRuntime::new());
    runtime.on_exec("cat -- /etc/hostname", CliOutput::ok("drillbox\n"));
    runtime.on_exec("stat -c", CliOutput::ok("644|root|root|9\n"));
    runtime.on_exec("test -e /nope", CliOutput::failed(1, ""));
    let manager = manager(runtime.clone());
    let sandbox = manager
        .create(Distribution::Ubuntu, &scenario(&[]), None)
        .await
        .unwrap();
    let env = manager.environment(&sandbox);

    assert_eq!(env.read_file("/etc/hostname").await.unwrap(), "drillbox\n");
    let stat = env.stat("/etc/hostname").await.unwrap();
    assert_eq!(stat.permissions, "644");
    assert_eq!(stat.size, 9);
    assert!(!env.exists("/nope").await);
    assert!(env.exists("/etc").await);
}

#[tokio::test]
async fn test_copy_in_requires_existing_source() {
    let runtime = Arc::new(ScriptedRuntime::new());
    let manager = manager(runtime.clone());
    let sandbox = manager
        .create(Distribution::Ubuntu, &scenario(&[]), None)
        .await
        .unwrap();

    let err = manager
        .copy_in(&sandbox, std::path::Path::new("/no/such/file"), "/tmp/x")
        .await
        .unwrap_err();
    assert!(matches!(err, SandboxError::SourceMissing(_)));

    let file = tempfile::NamedTempFile::new().unwrap();
    manager.copy_in(&sandbox, file.path(), "/tmp/x").await.unwrap();
    let cp = &runtime.calls_for("cp")[0];
    assert_eq!(cp.last().unwrap(), &format!("{}:/tmp/x", sandbox.name));
}

// -------------------------------------------------------------------------
// Teardown
// -------------------------------------------------------------------------

#[tokio::test]
async fn test_destroy_removes_container_and_control_dir_idempotently() {
    let runtime = Arc::new(ScriptedRuntime::new());
    let manager = manager(runtime.clone());
    let control = tempfile::tempdir().unwrap();

    let sandbox = manager
        .create(Distribution::Ubuntu, &scenario(&[]), Some(control.path()))
        .await
        .unwrap();
    assert_eq!(runtime.containers(), vec![sandbox.name.clone()]);

    manager.destroy(&sandbox).await;
    assert!(runtime.containers().is_empty());
    assert!(!control.path().exists());

    // Already gone: still counts as removed and does not retry with -v.
    manager.destroy(&sandbox).await;
    assert!(runtime
        .calls_for("rm")
        .iter()
        .all(|c| !c.contains(&"-v".to_string())));
}

#[tokio::test]
async fn test_destroy_retries_failed_removal() {
    let runtime = Arc::new(ScriptedRuntime::new());
    let manager = manager(runtime.clone());
    let sandbox = manager
        .create(Distribution::Ubuntu, &scenario(&[]), None)
        .await
        .unwrap();

    runtime.fail_next("rm", CliOutput::failed(1, "device or resource busy"));
    manager.destroy(&sandbox).await;

    let rms = runtime.calls_for("rm");
    assert_eq!(rms.len(), 2);
    assert!(rms[1].contains(&"-v".to_string()));
    assert!(runtime.containers().is_empty());
}

#[tokio::test]
async fn test_ping_maps_daemon_failure() {
    let runtime = Arc::new(ScriptedRuntime::new());
    let manager = manager(runtime.clone());
    assert_eq!(manager.ping().await.unwrap(), "24.0.7");

    runtime.fail_next(
        "version",
        CliOutput::failed(1, "Cannot connect to the Docker daemon"),
    );
    assert!(matches!(
        manager.ping().await,
        Err(SandboxError::RuntimeUnavailable(_))
    ));
}
