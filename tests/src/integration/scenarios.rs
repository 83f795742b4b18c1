//! # Call Scenarios
//!
//! Happy paths through the whole bridge:
//!
//! ```text
//! RemoteProxy ──► CallCache ──► BatchScheduler ══ duplex ══► HostBridge ──► handler
//!      ▲                                                          │
//!      └──────────── ResponseListener ◄══ duplex ═════════════════┘
//! ```
//!
//! 1. **Correlation**: every call resolves with its own handler value
//! 2. **Caching**: repeated and concurrent identical calls cross once
//! 3. **Batching**: calls inside one window leave as one frame

#[cfg(test)]
mod tests {
    use crate::integration::harness::{math_host, Harness, SANDBOX_ORIGIN};
    use futures::future::join_all;
    use sb_01_host_bridge::HostConfig;
    use sb_02_sandbox_runtime::{CallOptions, SandboxConfig};
    use serde_json::json;
    use shared_protocol::NamespaceManifest;
    use std::time::Duration;

    fn math_manifest() -> NamespaceManifest {
        NamespaceManifest::from_json(r#"{ "math": ["add"] }"#).unwrap()
    }

    // =========================================================================
    // CORRELATION
    // =========================================================================

    #[tokio::test]
    async fn test_math_add_resolves_with_handler_value() {
        let harness = Harness::math(&math_manifest());
        let math = harness.proxy("math");

        assert_eq!(math.call("add", vec![json!(2), json!(3)]).await.unwrap(), json!(5));

        let stats = harness.host.metrics();
        assert_eq!(stats.calls_received, 1);
        assert_eq!(stats.calls_succeeded, 1);
        assert_eq!(harness.sandbox.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_distinct_calls_each_get_their_own_result() {
        let harness = Harness::math(&math_manifest());
        let add = harness.proxy("math").method("add").unwrap();

        let calls = (0..20i64).map(|i| add.call_as::<i64>(vec![json!(i), json!(1000)]));
        let results = join_all(calls).await;

        for (i, result) in results.into_iter().enumerate() {
            assert_eq!(result.unwrap(), i as i64 + 1000);
        }
        assert_eq!(harness.host.metrics().calls_received, 20);
    }

    // =========================================================================
    // CACHING
    // =========================================================================

    #[tokio::test]
    async fn test_concurrent_identical_calls_cross_once() {
        let harness = Harness::math(&math_manifest());
        let math = harness.proxy("math");
        let options = CallOptions::new().with_ttl(Duration::from_secs(5));

        let (a, b) = tokio::join!(
            math.call_with("add", vec![json!(2), json!(3)], options.clone()),
            math.call_with("add", vec![json!(2), json!(3)], options.clone()),
        );

        assert_eq!(a.unwrap(), json!(5));
        assert_eq!(b.unwrap(), json!(5));
        assert_eq!(harness.host.metrics().calls_received, 1);
        assert_eq!(harness.sandbox_end.frames_sent(), 1);
        assert_eq!(harness.sandbox.cache().stats().coalesced, 1);
    }

    #[tokio::test]
    async fn test_cached_result_expires_after_ttl() {
        let harness = Harness::math(&math_manifest());
        let math = harness.proxy("math");
        let options = CallOptions::new().with_ttl(Duration::from_millis(50));

        for _ in 0..3 {
            let value = math
                .call_with("add", vec![json!(1), json!(1)], options.clone())
                .await
                .unwrap();
            assert_eq!(value, json!(2));
        }
        assert_eq!(harness.host.metrics().calls_received, 1);

        tokio::time::sleep(Duration::from_millis(80)).await;
        math.call_with("add", vec![json!(1), json!(1)], options)
            .await
            .unwrap();
        assert_eq!(harness.host.metrics().calls_received, 2);
    }

    #[tokio::test]
    async fn test_non_cacheable_namespace_always_crosses() {
        let mut config = SandboxConfig::default();
        config.cache.non_cacheable = vec!["math.*".into()];
        let harness = Harness::mount(
            math_host(HostConfig::default()),
            SANDBOX_ORIGIN,
            &math_manifest(),
            config,
        );
        let math = harness.proxy("math");

        math.call("add", vec![json!(4), json!(4)]).await.unwrap();
        math.call("add", vec![json!(4), json!(4)]).await.unwrap();

        assert_eq!(harness.host.metrics().calls_received, 2);
        assert_eq!(harness.sandbox.cache().stats().entries, 0);
    }

    // =========================================================================
    // BATCHING
    // =========================================================================

    #[tokio::test]
    async fn test_window_fans_out_as_one_batch() {
        let mut config = SandboxConfig::default();
        config.batch.window = Duration::from_millis(50);
        let harness = Harness::mount(
            math_host(HostConfig::default()),
            SANDBOX_ORIGIN,
            &math_manifest(),
            config,
        );
        let math = harness.proxy("math");

        let calls = (1..=5i64).map(|i| math.call("add", vec![json!(i), json!(i)]));
        let results = join_all(calls).await;

        let values: Vec<_> = results.into_iter().map(Result::unwrap).collect();
        assert_eq!(values, vec![json!(2), json!(4), json!(6), json!(8), json!(10)]);

        let host = harness.host.metrics();
        assert_eq!(host.batches_received, 1);
        assert_eq!(host.calls_received, 5);
        assert_eq!(harness.sandbox_end.frames_sent(), 1);
        assert_eq!(harness.sandbox.batcher().stats().batches_sent, 1);
        assert_eq!(harness.sandbox.batcher().stats().windowed_calls, 5);
    }

    #[tokio::test]
    async fn test_urgent_call_skips_the_window() {
        let mut config = SandboxConfig::default();
        config.batch.window = Duration::from_secs(60);
        let harness = Harness::mount(
            math_host(HostConfig::default()),
            SANDBOX_ORIGIN,
            &math_manifest(),
            config,
        );
        let math = harness.proxy("math");

        let value = tokio::time::timeout(
            Duration::from_secs(1),
            math.call_with("add", vec![json!(7), json!(8)], CallOptions::new().urgent()),
        )
        .await
        .expect("urgent call must not wait for the window")
        .unwrap();

        assert_eq!(value, json!(15));
        assert_eq!(harness.sandbox.batcher().stats().immediate_sends, 1);
        assert_eq!(harness.sandbox.batcher().queued(), 0);
    }

    #[tokio::test]
    async fn test_full_window_flushes_early() {
        let mut config = SandboxConfig::default();
        config.batch.window = Duration::from_secs(60);
        config.batch.max_batch_size = 3;
        let harness = Harness::mount(
            math_host(HostConfig::default()),
            SANDBOX_ORIGIN,
            &math_manifest(),
            config,
        );
        let math = harness.proxy("math");

        let calls = (0..3i64).map(|i| math.call("add", vec![json!(i)]));
        let results = tokio::time::timeout(Duration::from_secs(1), join_all(calls))
            .await
            .expect("a full window must flush without waiting");

        assert!(results.iter().all(Result::is_ok));
        assert_eq!(harness.host.metrics().batches_received, 1);
    }
}
