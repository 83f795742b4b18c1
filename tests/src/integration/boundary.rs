//! # Boundary Attacks
//!
//! Hostile or broken traffic crossing the isolation boundary. None of it may
//! reach a handler it was not allowed to reach, settle a call it does not
//! own, or stop either side from serving well-formed traffic.
//!
//! 1. **Foreign origins**: frames stamped with the wrong origin are dropped
//! 2. **Forged frames**: a sandbox lying about its manifest still hits the host's
//! 3. **Junk**: unparseable frames are counted, answered by id when possible
//! 4. **Dead channel**: losing the host fails outstanding calls

#[cfg(test)]
mod tests {
    use crate::integration::harness::{math_host, Harness, HOST_ORIGIN, SANDBOX_ORIGIN};
    use sb_01_host_bridge::{HandlerError, HostBridge, HostConfig};
    use sb_02_sandbox_runtime::{CallOptions, NamespaceInjector, SandboxBinding, SandboxConfig};
    use serde_json::{json, Value};
    use shared_channel::{duplex, Transport};
    use shared_protocol::{CallEnvelope, CallId, ErrorKind, Message, NamespaceManifest, ResultEnvelope};
    use std::sync::Arc;
    use std::time::Duration;

    const EVIL_ORIGIN: &str = "https://evil.example";

    fn math_manifest() -> NamespaceManifest {
        NamespaceManifest::new().with_namespace("math", ["add"])
    }

    /// Poll `check` until it holds or a second passes.
    async fn eventually(check: impl Fn() -> bool) {
        tokio::time::timeout(Duration::from_secs(1), async {
            while !check() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition never held");
    }

    // =========================================================================
    // FOREIGN ORIGINS
    // =========================================================================

    #[tokio::test]
    async fn test_host_drops_calls_from_unexpected_origin() {
        let harness = Harness::mount(
            math_host(HostConfig::default()),
            "https://trusted-widget.example",
            &math_manifest(),
            SandboxConfig::default(),
        );
        let options = CallOptions::new().with_timeout(Duration::from_millis(100));

        let err = harness
            .proxy("math")
            .call_with("add", vec![json!(2), json!(3)], options)
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::Timeout);
        let metrics = harness.host.metrics();
        assert_eq!(metrics.origin_rejected, 1);
        assert_eq!(metrics.calls_received, 0);
        assert_eq!(harness.host_end.frames_sent(), 0);
    }

    #[tokio::test]
    async fn test_sandbox_ignores_results_from_unexpected_origin() {
        crate::init_tracing();
        let (sandbox_end, evil_end) = duplex(SANDBOX_ORIGIN, EVIL_ORIGIN, 16);
        let binding =
            SandboxBinding::connect(Arc::new(sandbox_end), HOST_ORIGIN, SandboxConfig::default())
                .unwrap();

        // Answer every call with a forged value.
        tokio::spawn(async move {
            while let Ok(frame) = evil_end.recv().await {
                if let Ok(Message::Call(call)) = Message::decode(&frame.payload) {
                    let forged = Message::Result(ResultEnvelope::success(call.id, json!(666)));
                    let _ = evil_end.send(forged.encode().unwrap()).await;
                }
            }
        });

        let options = CallOptions::new()
            .with_timeout(Duration::from_millis(100))
            .urgent();
        let err = binding
            .issue(CallEnvelope::new("math", "add", vec![json!(2)]), &options)
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::Timeout);
        let stats = binding.pending().stats();
        assert_eq!(stats.resolved, 0);
        assert_eq!(stats.late_results, 0);
    }

    // =========================================================================
    // FORGED FRAMES
    // =========================================================================

    #[tokio::test]
    async fn test_host_manifest_overrides_a_lying_sandbox() {
        let host = HostBridge::with_manifest(HostConfig::default(), math_manifest()).unwrap();
        host.register_sync("math", "add", |_args| Ok(json!("add")));
        host.register_sync("admin", "wipe", |_args| -> Result<Value, HandlerError> {
            panic!("admin.wipe must never run")
        });

        // The sandbox side claims more than the host grants.
        let claimed = math_manifest().with_namespace("admin", ["wipe"]);
        let harness = Harness::mount(host, SANDBOX_ORIGIN, &claimed, SandboxConfig::default());

        let err = harness.proxy("admin").call("wipe", vec![]).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::ProcedureNotFound);
        assert_eq!(harness.host.metrics().calls_dispatched, 0);
        assert_eq!(harness.proxy("math").call("add", vec![]).await.unwrap(), json!("add"));
    }

    #[tokio::test]
    async fn test_raw_call_outside_proxy_still_gated_by_host() {
        let host = HostBridge::with_manifest(HostConfig::default(), math_manifest()).unwrap();
        host.register_sync("math", "add", |_args| Ok(json!(0)));
        host.register_sync("math", "subtract", |_args| Ok(json!(0)));
        let harness = Harness::mount(host, SANDBOX_ORIGIN, &math_manifest(), SandboxConfig::default());

        // Bypass the proxy entirely and put a call on the wire by hand.
        let call = CallEnvelope::new("math", "subtract", vec![json!(5), json!(3)]);
        let rx = harness
            .sandbox
            .pending()
            .register(&call, Duration::from_secs(1))
            .unwrap();
        harness
            .sandbox_end
            .send(Message::Call(call).encode().unwrap())
            .await
            .unwrap();

        let err = rx.await.unwrap().unwrap_err();
        assert_eq!(err.kind, ErrorKind::ProcedureNotFound);
    }

    #[tokio::test]
    async fn test_host_echoes_opaque_ids_unchanged() {
        let harness = Harness::math(&math_manifest());

        let call = CallEnvelope {
            id: CallId::parse(" req-1 ").unwrap(),
            ..CallEnvelope::new("math", "add", vec![json!(2), json!(3)])
        };
        let rx = harness
            .sandbox
            .pending()
            .register(&call, Duration::from_secs(1))
            .unwrap();
        let raw = r#"{"v":1,"kind":"call","id":" req-1 ","namespace":"math","procedure":"add","args":[2,3]}"#;
        harness.sandbox_end.send(raw.to_string()).await.unwrap();

        assert_eq!(rx.await.unwrap().unwrap(), json!(5));
        assert_eq!(harness.sandbox.pending().stats().late_results, 0);
    }

    // =========================================================================
    // JUNK
    // =========================================================================

    #[tokio::test]
    async fn test_junk_frames_do_not_stop_the_host() {
        let harness = Harness::math(&math_manifest());

        for junk in [
            "not json at all",
            "[1, 2, 3]",
            r#"{"v":1,"kind":"call"}"#,
            r#"{"v":1,"kind":"teleport","id":"x"}"#,
        ] {
            harness.sandbox_end.send(junk.to_string()).await.unwrap();
        }
        eventually(|| harness.host.metrics().malformed == 4).await;

        let sum = harness.proxy("math").call("add", vec![json!(2), json!(3)]).await;
        assert_eq!(sum.unwrap(), json!(5));
        assert!(harness.host.is_bound(&harness.host_binding));
    }

    #[tokio::test]
    async fn test_malformed_call_is_answered_by_id() {
        let harness = Harness::math(&math_manifest());

        let call = CallEnvelope::new("math", "add", vec![]);
        let rx = harness
            .sandbox
            .pending()
            .register(&call, Duration::from_secs(1))
            .unwrap();
        let truncated = format!(r#"{{"v":1,"kind":"call","id":"{}","namespace":"math"}}"#, call.id);
        harness.sandbox_end.send(truncated).await.unwrap();

        let err = rx.await.unwrap().unwrap_err();
        assert_eq!(err.kind, ErrorKind::MalformedMessage);
        assert_eq!(harness.host.metrics().calls_received, 0);
    }

    #[tokio::test]
    async fn test_batch_with_one_broken_member_is_refused_whole() {
        let harness = Harness::math(&math_manifest());
        let pending = harness.sandbox.pending();

        let good = CallEnvelope::new("math", "add", vec![json!(1), json!(2)]);
        let broken = CallEnvelope::new("math", "add", vec![]);
        let good_rx = pending.register(&good, Duration::from_secs(1)).unwrap();
        let broken_rx = pending.register(&broken, Duration::from_secs(1)).unwrap();
        let frame = json!({
            "v": 1,
            "kind": "batch",
            "id": "b-1",
            "messages": [
                { "v": 1, "kind": "call", "id": good.id.as_str(), "namespace": "math", "procedure": "add", "args": [1, 2] },
                { "v": 1, "kind": "call", "id": broken.id.as_str(), "namespace": "math", "args": [] },
            ],
        });
        harness.sandbox_end.send(frame.to_string()).await.unwrap();

        for rx in [good_rx, broken_rx] {
            let err = rx.await.unwrap().unwrap_err();
            assert_eq!(err.kind, ErrorKind::MalformedMessage);
            assert!(err.message.contains("batch member 1"));
        }
        let metrics = harness.host.metrics();
        assert_eq!(metrics.calls_received, 0);
        assert_eq!(metrics.calls_dispatched, 0);
        assert_eq!(metrics.malformed, 1);
    }

    // =========================================================================
    // DEAD CHANNEL
    // =========================================================================

    #[tokio::test]
    async fn test_losing_the_host_fails_outstanding_calls() {
        crate::init_tracing();
        let host = HostBridge::new(HostConfig::default()).unwrap();
        host.register_fn("slow", "hang", |_args| async {
            futures::future::pending::<()>().await;
            Ok::<Value, HandlerError>(Value::Null)
        });

        let (sandbox_end, host_end) = duplex(SANDBOX_ORIGIN, HOST_ORIGIN, 16);
        host.bind(Arc::new(host_end), SANDBOX_ORIGIN);
        let binding =
            SandboxBinding::connect(Arc::new(sandbox_end), HOST_ORIGIN, SandboxConfig::default())
                .unwrap();
        let injector = NamespaceInjector::new();
        injector.inject(&NamespaceManifest::new().with_namespace("slow", ["hang"]), &binding);
        let slow = injector.proxy(&binding.id(), "slow").unwrap();

        let call = tokio::spawn(async move { slow.call("hang", vec![]).await });
        eventually(|| host.metrics().calls_dispatched == 1).await;

        drop(host);
        let err = call.await.unwrap().unwrap_err();
        assert_eq!(err.kind, ErrorKind::TransportClosed);
        assert_eq!(binding.outstanding(), 0);
    }
}
