//! # Failure Scenarios
//!
//! Every failure must reach the original caller as a `BridgeError` with the
//! right kind, and leave no pending call behind.
//!
//! | Trigger | Caller sees |
//! |---------|-------------|
//! | procedure outside the manifest | `procedure-not-permitted`, nothing sent |
//! | permitted but never registered | `procedure-not-found` |
//! | handler returns an error or panics | `handler-error` |
//! | no result before the deadline | `timeout` |
//! | sandbox torn down | `cancelled` |
//! | outstanding ceiling reached | `too-many-outstanding` |

#[cfg(test)]
mod tests {
    use crate::integration::harness::{math_host, Harness, SANDBOX_ORIGIN};
    use sb_01_host_bridge::{HandlerError, HostBridge, HostConfig};
    use sb_02_sandbox_runtime::{CallOptions, SandboxConfig};
    use serde_json::{json, Value};
    use shared_protocol::{ErrorKind, NamespaceManifest};
    use std::sync::Arc;
    use std::time::Duration;

    /// Host whose `slow.echo` answers after `delay` and whose `slow.hang` never answers.
    fn slow_host(config: HostConfig, delay: Duration) -> HostBridge {
        let host = HostBridge::new(config).unwrap();
        host.register_fn("slow", "echo", move |args| async move {
            tokio::time::sleep(delay).await;
            Ok::<Value, HandlerError>(json!(args))
        });
        host.register_fn("slow", "hang", |_args| async {
            futures::future::pending::<()>().await;
            Ok::<Value, HandlerError>(Value::Null)
        });
        host
    }

    fn slow_manifest() -> NamespaceManifest {
        NamespaceManifest::new().with_namespace("slow", ["echo", "hang"])
    }

    async fn wait_outstanding(harness: &Harness, n: usize) {
        while harness.sandbox.outstanding() < n {
            tokio::task::yield_now().await;
        }
    }

    // =========================================================================
    // PERMISSION AND LOOKUP
    // =========================================================================

    #[tokio::test]
    async fn test_call_outside_manifest_never_crosses() {
        let harness = Harness::math(&NamespaceManifest::new().with_namespace("math", ["add"]));
        let math = harness.proxy("math");

        let err = math
            .call("subtract", vec![json!(5), json!(3)])
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::ProcedureNotPermitted);
        assert_eq!(harness.sandbox_end.frames_sent(), 0);
        assert_eq!(harness.host.metrics().calls_received, 0);
        assert_eq!(harness.sandbox.pending().stats().registered, 0);
    }

    #[tokio::test]
    async fn test_unregistered_procedure_reports_not_found() {
        let harness = Harness::math(&NamespaceManifest::new().with_namespace("math", ["add", "mul"]));

        let err = harness
            .proxy("math")
            .call("mul", vec![json!(2), json!(3)])
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::ProcedureNotFound);
        assert!(err.message.contains("math.mul"));
        assert_eq!(harness.host.metrics().not_found, 1);
    }

    // =========================================================================
    // HANDLER FAILURES
    // =========================================================================

    #[tokio::test]
    async fn test_handler_error_reaches_caller_and_is_not_cached() {
        let harness = Harness::math(&NamespaceManifest::new().with_namespace("math", ["div"]));
        let math = harness.proxy("math");

        for _ in 0..2 {
            let err = math.call("div", vec![json!(1), json!(0)]).await.unwrap_err();
            assert_eq!(err.kind, ErrorKind::HandlerError);
            assert!(err.message.contains("division by zero"));
        }
        assert_eq!(harness.host.metrics().handler_errors, 2);
        assert_eq!(harness.sandbox.cache().stats().entries, 0);
    }

    #[tokio::test]
    async fn test_invalid_arguments_are_a_handler_error() {
        let harness = Harness::math(&NamespaceManifest::new().with_namespace("math", ["add"]));

        let err = harness
            .proxy("math")
            .call("add", vec![json!("two"), json!(3)])
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::HandlerError);
        assert!(err.message.contains("not an integer"));
    }

    #[tokio::test]
    async fn test_handler_panic_becomes_handler_error() {
        let host = math_host(HostConfig::default());
        host.register_sync("boom", "now", |_args| -> Result<Value, HandlerError> {
            panic!("kaboom")
        });
        let manifest = NamespaceManifest::new()
            .with_namespace("boom", ["now"])
            .with_namespace("math", ["add"]);
        let harness = Harness::mount(host, SANDBOX_ORIGIN, &manifest, SandboxConfig::default());

        let err = harness.proxy("boom").call("now", vec![]).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::HandlerError);
        assert!(err.message.contains("kaboom"));

        // The binding keeps serving after a panic.
        let sum = harness.proxy("math").call("add", vec![json!(1), json!(2)]).await;
        assert_eq!(sum.unwrap(), json!(3));
    }

    #[tokio::test]
    async fn test_anyhow_errors_propagate_from_handlers() {
        let host = HostBridge::new(HostConfig::default()).unwrap();
        host.register_fn("cfg", "load", |_args| async {
            let parsed: Value = serde_json::from_str("{ not json")
                .map_err(|e| anyhow::anyhow!(e).context("loading settings"))?;
            Ok::<Value, HandlerError>(parsed)
        });
        let manifest = NamespaceManifest::new().with_namespace("cfg", ["load"]);
        let harness = Harness::mount(host, SANDBOX_ORIGIN, &manifest, SandboxConfig::default());

        let err = harness.proxy("cfg").call("load", vec![]).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::HandlerError);
        assert!(err.message.contains("loading settings"));
    }

    // =========================================================================
    // DEADLINES
    // =========================================================================

    #[tokio::test]
    async fn test_timeout_then_late_result_has_no_effect() {
        let harness = Harness::mount(
            slow_host(HostConfig::default(), Duration::from_millis(150)),
            SANDBOX_ORIGIN,
            &slow_manifest(),
            SandboxConfig::default(),
        );
        let options = CallOptions::new()
            .with_timeout(Duration::from_millis(40))
            .no_cache();

        let err = harness
            .proxy("slow")
            .call_with("echo", vec![json!("late")], options)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Timeout);
        assert_eq!(harness.sandbox.outstanding(), 0);

        tokio::time::sleep(Duration::from_millis(250)).await;
        let stats = harness.sandbox.pending().stats();
        assert_eq!(stats.timeouts, 1);
        assert_eq!(stats.late_results, 1);
        assert_eq!(stats.resolved, 0);
        assert_eq!(harness.host.metrics().calls_succeeded, 1);
    }

    #[tokio::test]
    async fn test_host_handler_deadline() {
        let config = HostConfig {
            handler_timeout: Some(Duration::from_millis(30)),
            ..HostConfig::default()
        };
        let harness = Harness::mount(
            slow_host(config, Duration::from_secs(5)),
            SANDBOX_ORIGIN,
            &slow_manifest(),
            SandboxConfig::default(),
        );

        let err = harness
            .proxy("slow")
            .call("echo", vec![])
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Timeout);
        assert_eq!(harness.host.metrics().handler_timeouts, 1);
    }

    // =========================================================================
    // TEARDOWN AND BACKPRESSURE
    // =========================================================================

    #[tokio::test]
    async fn test_teardown_cancels_every_outstanding_call() {
        let harness = Harness::mount(
            slow_host(HostConfig::default(), Duration::ZERO),
            SANDBOX_ORIGIN,
            &slow_manifest(),
            SandboxConfig::default(),
        );
        let slow = harness.proxy("slow");

        let calls: Vec<_> = (0..5)
            .map(|i| {
                let slow = slow.clone();
                tokio::spawn(async move { slow.call("hang", vec![json!(i)]).await })
            })
            .collect();
        wait_outstanding(&harness, 5).await;

        let cancelled = harness.injector.teardown(&harness.sandbox.id());
        assert_eq!(cancelled, 5);
        assert_eq!(harness.sandbox.outstanding(), 0);
        for call in calls {
            assert_eq!(call.await.unwrap().unwrap_err().kind, ErrorKind::Cancelled);
        }

        let after = slow.call("echo", vec![]).await.unwrap_err();
        assert_eq!(after.kind, ErrorKind::Cancelled);
    }

    #[tokio::test]
    async fn test_teardown_inside_the_window_dispatches_nothing() {
        let host = HostBridge::new(HostConfig::default()).unwrap();
        host.register_sync("bank", "transfer", |args| Ok(json!({ "moved": args })));
        let mut config = SandboxConfig::default();
        config.batch.window = Duration::from_millis(50);
        let manifest = NamespaceManifest::new().with_namespace("bank", ["transfer"]);
        let harness = Harness::mount(host, SANDBOX_ORIGIN, &manifest, config);

        let bank = harness.proxy("bank");
        let transfer = tokio::spawn(async move { bank.call("transfer", vec![json!(100)]).await });
        while harness.sandbox.batcher().queued() < 1 {
            tokio::task::yield_now().await;
        }

        assert_eq!(harness.injector.teardown(&harness.sandbox.id()), 1);
        assert_eq!(transfer.await.unwrap().unwrap_err().kind, ErrorKind::Cancelled);

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(harness.sandbox_end.frames_sent(), 0);
        assert_eq!(harness.host.metrics().calls_received, 0);
    }

    #[tokio::test]
    async fn test_removing_a_namespace_cancels_only_its_calls() {
        let host = slow_host(HostConfig::default(), Duration::from_millis(20));
        host.register_sync("math", "add", |_args| Ok(json!(0)));
        let manifest = slow_manifest().with_namespace("math", ["add"]);
        let harness = Harness::mount(host, SANDBOX_ORIGIN, &manifest, SandboxConfig::default());

        let slow = harness.proxy("slow");
        let hanging = tokio::spawn(async move { slow.call("hang", vec![]).await });
        wait_outstanding(&harness, 1).await;

        harness.injector.remove(&harness.sandbox.id(), &["slow"]);
        assert_eq!(hanging.await.unwrap().unwrap_err().kind, ErrorKind::Cancelled);
        assert!(harness.injector.proxy(&harness.sandbox.id(), "slow").is_none());

        let math = harness.proxy("math");
        assert_eq!(math.call("add", vec![]).await.unwrap(), json!(0));
    }

    #[tokio::test]
    async fn test_outstanding_ceiling_rejects_excess_calls() {
        let mut config = SandboxConfig::default();
        config.calls.max_outstanding = 2;
        let harness = Harness::mount(
            slow_host(HostConfig::default(), Duration::ZERO),
            SANDBOX_ORIGIN,
            &slow_manifest(),
            config,
        );
        let slow = Arc::new(harness.proxy("slow"));

        let held: Vec<_> = (0..2)
            .map(|i| {
                let slow = Arc::clone(&slow);
                tokio::spawn(async move { slow.call("hang", vec![json!(i)]).await })
            })
            .collect();
        wait_outstanding(&harness, 2).await;

        let err = slow.call("hang", vec![json!(99)]).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::TooManyOutstanding);
        assert_eq!(harness.sandbox.pending().stats().rejected, 1);

        harness.sandbox.close();
        for call in held {
            assert_eq!(call.await.unwrap().unwrap_err().kind, ErrorKind::Cancelled);
        }
    }
}
