use crate::{
    create_backend, BackendKind, EnvEntry, Invocation, SandboxConfig, SandboxError,
};

fn resolve(entries: &[EnvEntry], key: &str) -> Option<String> {
    js_sandbox::environment::resolve(entries, key).map(str::to_owned)
}

#[tokio::test]
async fn test_worker_runs_a_pre_request_script() {
    let backend = create_backend(BackendKind::IsolatedWorker, SandboxConfig::default());

    let output = backend
        .execute(Invocation::pre_request(
            "pw.env.set(\"from\", \"worker\")",
            Vec::new(),
        ))
        .await
        .unwrap();

    assert_eq!(resolve(&output.envs, "from").as_deref(), Some("worker"));
}

#[tokio::test]
async fn test_reused_worker_leaks_nothing_between_invocations() {
    let config = SandboxConfig {
        reuse_worker: true,
        ..SandboxConfig::default()
    };
    let backend = create_backend(BackendKind::IsolatedWorker, config);

    backend
        .execute(Invocation::pre_request(
            "var secret = \"s3cr3t\"; pw.env.set(\"a\", \"1\");",
            Vec::new(),
        ))
        .await
        .unwrap();

    let output = backend
        .execute(Invocation::pre_request(
            "pw.env.set(\"t\", typeof secret)",
            Vec::new(),
        ))
        .await
        .unwrap();

    assert_eq!(resolve(&output.envs, "t").as_deref(), Some("undefined"));
    assert_eq!(resolve(&output.envs, "a"), None);
}

#[tokio::test]
async fn test_fresh_worker_per_invocation_also_works() {
    let config = SandboxConfig {
        reuse_worker: false,
        ..SandboxConfig::default()
    };
    let backend = create_backend(BackendKind::IsolatedWorker, config);

    for round in 0..3 {
        let output = backend
            .execute(Invocation::pre_request(
                "pw.env.set(\"round\", \"done\")",
                Vec::new(),
            ))
            .await
            .unwrap();
        assert_eq!(
            resolve(&output.envs, "round").as_deref(),
            Some("done"),
            "round {round}"
        );
    }
}

#[tokio::test]
async fn test_worker_timeout_is_terminal_and_backend_survives() {
    // A deadline far below the engine fuel bound, so the wall clock
    // loses the race and the worker is abandoned mid-script. The fuel
    // still bounds the orphaned thread.
    let config = SandboxConfig {
        timeout_ms: 200,
        loop_iteration_limit: 500_000_000,
        ..SandboxConfig::default()
    };
    let backend = create_backend(BackendKind::IsolatedWorker, config);

    let err = backend
        .execute(Invocation::pre_request("while (true) {}", Vec::new()))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "TIMEOUT");

    let output = backend
        .execute(Invocation::pre_request(
            "pw.env.set(\"alive\", \"yes\")",
            Vec::new(),
        ))
        .await
        .unwrap();
    assert_eq!(resolve(&output.envs, "alive").as_deref(), Some("yes"));
}

#[tokio::test]
async fn test_worker_reports_script_errors_by_kind() {
    let backend = create_backend(BackendKind::IsolatedWorker, SandboxConfig::default());

    let parse = backend
        .execute(Invocation::pre_request("function {", Vec::new()))
        .await
        .unwrap_err();
    assert!(matches!(parse, SandboxError::Parse(_)));

    let runtime = backend
        .execute(Invocation::pre_request(
            "null.anything",
            Vec::new(),
        ))
        .await
        .unwrap_err();
    assert!(matches!(runtime, SandboxError::Runtime(_)));
}

#[tokio::test]
async fn test_concurrent_worker_invocations_stay_isolated() {
    let backend = create_backend(
        BackendKind::IsolatedWorker,
        SandboxConfig {
            reuse_worker: false,
            ..SandboxConfig::default()
        },
    );

    let invocations: Vec<Invocation> = (0..4)
        .map(|i| {
            Invocation::pre_request(
                format!("pw.env.set(\"id\", \"{i}\")"),
                Vec::new(),
            )
        })
        .collect();

    let outcomes = crate::run_all(backend.as_ref(), invocations).await;

    for (i, outcome) in outcomes.iter().enumerate() {
        let output = outcome.as_ref().unwrap();
        assert_eq!(
            resolve(&output.envs, "id").as_deref(),
            Some(i.to_string().as_str()),
            "invocation {i} saw another invocation's data"
        );
    }
}
