//! End-to-end scenarios across languages and backends.
//!
//! Each scenario needs a host toolchain (node, tsc, python3) or a
//! reachable container daemon; when the prerequisite is missing the test
//! logs a skip line and returns instead of failing, so the suite runs
//! whatever the host can support.

use execbox::executors::ContainerExecutor;
use execbox::{
    Backend, Environment, EnvironmentConfig, ExecOptions, ExecboxError, Language, MountMode,
    PullPolicy, SecurityPolicy,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn have(tool: &str) -> bool {
    which::which(tool).is_ok()
}

fn container_config(language: Language, image: &str) -> EnvironmentConfig {
    let mut policy = SecurityPolicy::new(image);
    policy.pull_policy = PullPolicy::IfNotPresent;
    EnvironmentConfig::new(language, Backend::Container)
        .with_timeout_ms(120_000)
        .with_policy(policy)
}

/// Container infrastructure problems (daemon hiccups, no registry access)
/// are environmental, not regressions; report them as skips.
fn skip_if_infra(err: &ExecboxError, scenario: &str) -> bool {
    if let ExecboxError::Runtime { message, .. } = err {
        eprintln!("skipping {}: container infrastructure unavailable ({})", scenario, message);
        return true;
    }
    false
}

#[tokio::test]
async fn scenario_a_javascript_hello_world() {
    init_logging();
    if !have("node") {
        eprintln!("skipping scenario A: node not installed");
        return;
    }

    let config = EnvironmentConfig::new(Language::Javascript, Backend::Process).with_timeout_ms(10_000);
    let mut env = Environment::new(config).unwrap();
    env.add_file("main.js", "console.log('Hello JS World');\n")
        .await
        .unwrap();

    let result = env
        .execute(Some("main.js"), &[], ExecOptions::default())
        .await
        .unwrap();
    assert_eq!(result.exit_code, Some(0));
    assert_eq!(result.signal, None);
    assert_eq!(result.stdout.trim(), "Hello JS World");

    env.delete().await;
}

#[tokio::test]
async fn scenario_b_python_memory_ceiling_prevents_completion() {
    init_logging();
    if !have("python3") {
        eprintln!("skipping scenario B: python3 not installed");
        return;
    }
    if !cfg!(unix) {
        eprintln!("skipping scenario B: resource ceilings are a no-op off unix");
        return;
    }

    let config = EnvironmentConfig::new(Language::Python, Backend::Process)
        .with_timeout_ms(30_000)
        .with_memory_limit_mb(20);
    let mut env = Environment::new(config).unwrap();
    env.add_file(
        "hog.py",
        "data = []\nwhile True:\n    data.append('x' * 1024 * 1024)\n",
    )
    .await
    .unwrap();

    match env.execute(Some("hog.py"), &[], ExecOptions::default()).await {
        Ok(result) => assert!(
            !result.success(),
            "unbounded allocation must not finish cleanly: {:?}",
            result
        ),
        // A timeout or explicit limit failure also counts as "never
        // completes successfully".
        Err(_) => {}
    }

    env.delete().await;
}

#[tokio::test]
async fn scenario_c_typescript_type_error_fails_before_execution() {
    init_logging();
    if !have("tsc") {
        eprintln!("skipping scenario C: tsc not installed");
        return;
    }

    let config = EnvironmentConfig::new(Language::Typescript, Backend::Process).with_timeout_ms(60_000);
    let mut env = Environment::new(config).unwrap();
    env.add_file("bad.ts", "const count: number = \"not a number\";\n")
        .await
        .unwrap();

    let err = env
        .execute(Some("bad.ts"), &[], ExecOptions::default())
        .await
        .unwrap_err();
    match err {
        ExecboxError::Compilation { stdout, stderr } => {
            assert!(
                !stdout.is_empty() || !stderr.is_empty(),
                "compiler diagnostics must be captured"
            );
        }
        other => panic!("expected a compilation error, got {:?}", other),
    }
    // The emitted script was never produced, so nothing could have run.
    assert!(!env.workspace().join(".execbox-out/bad.js").exists());

    env.delete().await;
}

#[tokio::test]
async fn typescript_compiles_and_runs_when_valid() {
    init_logging();
    if !have("tsc") || !have("node") {
        eprintln!("skipping typescript run: tsc or node not installed");
        return;
    }

    let config = EnvironmentConfig::new(Language::Typescript, Backend::Process).with_timeout_ms(60_000);
    let mut env = Environment::new(config).unwrap();
    env.add_file("greet.ts", "const who: string = 'TS World';\nconsole.log(`Hello ${who}`);\n")
        .await
        .unwrap();

    let result = env
        .execute(Some("greet.ts"), &[], ExecOptions::default())
        .await
        .unwrap();
    assert_eq!(result.exit_code, Some(0));
    assert_eq!(result.stdout.trim(), "Hello TS World");

    env.delete().await;
}

#[tokio::test]
async fn scenario_d_network_none_blocks_name_resolution() {
    init_logging();
    if !ContainerExecutor::daemon_available().await {
        eprintln!("skipping scenario D: no container daemon");
        return;
    }

    let mut config = container_config(Language::Python, "python:3.12-slim");
    config.policy.as_mut().unwrap().network_mode = Some("none".to_string());
    let mut env = Environment::new(config).unwrap();
    env.add_file(
        "resolve.py",
        "import socket\nsocket.gethostbyname('example.com')\n",
    )
    .await
    .unwrap();

    match env.execute(Some("resolve.py"), &[], ExecOptions::default()).await {
        Ok(result) => {
            assert_ne!(result.exit_code, Some(0));
            assert!(
                result.stderr.contains("gaierror") || result.stderr.contains("resolution"),
                "expected a name-resolution failure, got: {}",
                result.stderr
            );
        }
        Err(err) => {
            if !skip_if_infra(&err, "scenario D") {
                panic!("unexpected failure: {:?}", err);
            }
        }
    }

    env.delete().await;
}

#[tokio::test]
async fn scenario_e_read_only_workspace_rejects_writes() {
    init_logging();
    if !ContainerExecutor::daemon_available().await {
        eprintln!("skipping scenario E: no container daemon");
        return;
    }

    let mut config = container_config(Language::Python, "python:3.12-slim");
    config.policy.as_mut().unwrap().workspace_mount = MountMode::ReadOnly;
    let mut env = Environment::new(config).unwrap();
    env.add_file(
        "write.py",
        "open('/workspace/out.txt', 'w').write('data')\n",
    )
    .await
    .unwrap();

    match env.execute(Some("write.py"), &[], ExecOptions::default()).await {
        Ok(result) => {
            assert_ne!(result.exit_code, Some(0));
            assert!(
                result.stderr.contains("Read-only"),
                "expected a read-only filesystem error, got: {}",
                result.stderr
            );
        }
        Err(err) => {
            if !skip_if_infra(&err, "scenario E") {
                panic!("unexpected failure: {:?}", err);
            }
        }
    }

    env.delete().await;
}

#[tokio::test]
async fn container_hello_world_reports_exit_and_logs() {
    init_logging();
    if !ContainerExecutor::daemon_available().await {
        eprintln!("skipping container hello world: no container daemon");
        return;
    }

    let config = container_config(Language::Python, "python:3.12-slim");
    let mut env = Environment::new(config).unwrap();
    env.add_file("hello.py", "print('Hello Container World')\n")
        .await
        .unwrap();

    match env.execute(Some("hello.py"), &[], ExecOptions::default()).await {
        Ok(result) => {
            assert_eq!(result.exit_code, Some(0));
            assert_eq!(result.stdout.trim(), "Hello Container World");
        }
        Err(err) => {
            if !skip_if_infra(&err, "container hello world") {
                panic!("unexpected failure: {:?}", err);
            }
        }
    }

    env.delete().await;
}
