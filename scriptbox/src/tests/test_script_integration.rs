use crate::{
    create_backend, BackendKind, EnvEntry, Invocation, ResponseSnapshot, SandboxConfig,
};

fn ok_response() -> ResponseSnapshot {
    ResponseSnapshot {
        status: 200,
        status_text: "OK".to_string(),
        headers: vec![EnvEntry::new("content-type", "application/json")],
        body: "{\"user\": \"ada\"}".to_string(),
    }
}

#[tokio::test]
async fn test_nested_blocks_produce_a_nested_tree() {
    let backend = create_backend(BackendKind::InProcess, SandboxConfig::default());

    let output = backend
        .execute(Invocation::test(
            "pw.test(\"outer\", () => { pw.test(\"inner\", () => { pw.expect(1).toBe(1) }) })",
            Vec::new(),
            ok_response(),
        ))
        .await
        .unwrap();

    let root = output.tests.unwrap();
    assert_eq!(root.children.len(), 1);
    let outer = &root.children[0];
    assert_eq!(outer.label, "outer");
    let inner = &outer.children[0];
    assert_eq!(inner.label, "inner");
    assert_eq!(inner.results.len(), 1);
    assert!(inner.results[0].passed);
    assert!(outer.passed());
    assert!(root.passed());
}

#[tokio::test]
async fn test_failed_expectation_fails_every_ancestor() {
    let backend = create_backend(BackendKind::InProcess, SandboxConfig::default());

    let output = backend
        .execute(Invocation::test(
            "pw.test(\"group\", () => {\n\
               pw.expect(\"a\").toBe(\"a\");\n\
               pw.test(\"deep\", () => { pw.expect(1).toBe(2) });\n\
             })",
            Vec::new(),
            ok_response(),
        ))
        .await
        .unwrap();

    let root = output.tests.unwrap();
    let group = &root.children[0];
    assert!(!root.passed());
    assert!(!group.passed());
    assert!(!group.children[0].passed());
    assert_eq!(root.counts(), (1, 1));
}

#[tokio::test]
async fn test_response_assertions_and_env_updates_together() {
    let backend = create_backend(BackendKind::InProcess, SandboxConfig::default());

    let output = backend
        .execute(Invocation::test(
            "pw.test(\"response ok\", () => {\n\
               pw.expect(pw.response.status).toBeLevel2xx();\n\
               pw.expect(pw.response.body).toInclude(\"ada\");\n\
             });\n\
             pw.env.set(\"lastStatus\", pw.response.status);",
            Vec::new(),
            ok_response(),
        ))
        .await
        .unwrap();

    assert!(output.tests.unwrap().passed());
    assert_eq!(
        js_sandbox::environment::resolve(&output.envs, "lastStatus"),
        Some("200")
    );
}

#[tokio::test]
async fn test_status_class_helpers_respect_negation() {
    let backend = create_backend(BackendKind::InProcess, SandboxConfig::default());

    let output = backend
        .execute(Invocation::test(
            "pw.expect(pw.response.status).not.toBeLevel4xx()",
            Vec::new(),
            ResponseSnapshot {
                status: 200,
                status_text: "OK".to_string(),
                headers: Vec::new(),
                body: String::new(),
            },
        ))
        .await
        .unwrap();

    let root = output.tests.unwrap();
    assert_eq!(root.results.len(), 1);
    assert!(root.results[0].passed);
}

#[tokio::test]
async fn test_console_entries_do_not_touch_the_tree() {
    let backend = create_backend(BackendKind::InProcess, SandboxConfig::default());

    let output = backend
        .execute(Invocation::test(
            "console.log(\"inspecting\", pw.response.status);\n\
             pw.test(\"t\", () => pw.expect(true).toBe(true));",
            Vec::new(),
            ok_response(),
        ))
        .await
        .unwrap();

    assert_eq!(output.console.len(), 1);
    assert_eq!(output.console[0].message, "inspecting 200");
    let root = output.tests.unwrap();
    assert_eq!(root.counts(), (1, 0));
}

#[tokio::test]
async fn test_headers_are_visible_as_pairs() {
    let backend = create_backend(BackendKind::InProcess, SandboxConfig::default());

    let output = backend
        .execute(Invocation::test(
            "pw.expect(pw.response.headers[0].key).toBe(\"content-type\")",
            Vec::new(),
            ok_response(),
        ))
        .await
        .unwrap();

    assert!(output.tests.unwrap().passed());
}
