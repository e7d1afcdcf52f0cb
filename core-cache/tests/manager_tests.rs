//! Tests for the cache manager
//!
//! Transport behaviour is driven with synthetic events so every transition can
//! be checked without a network.

#[cfg(test)]
mod tests {
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::{
        BridgeError, DownloadRequest, DownloadTransport, TransferId, TransportEvent,
        TransportEventSender,
    };
    use core_cache::{
        CacheConfig, CacheError, CacheManager, CacheStatus, MediaSource, ResourceRef,
        StartOutcome,
    };
    use core_runtime::events::{CacheEvent, CoreEvent, EventBus};
    use mockall::mock;
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use uuid::Uuid;

    mock! {
        pub Transport {}

        impl DownloadTransport for Transport {
            fn begin_download(&self, request: DownloadRequest, events: TransportEventSender) -> BridgeResult<()>;
            fn in_flight(&self) -> Option<usize>;
        }
    }

    struct TestContext {
        manager: CacheManager,
        base: PathBuf,
    }

    impl TestContext {
        fn new(transport: MockTransport) -> Self {
            let base = std::env::temp_dir().join(format!("core-cache-test-{}", Uuid::new_v4()));
            let manager = CacheManager::new(CacheConfig::new(&base), Arc::new(transport)).unwrap();
            Self { manager, base }
        }

        /// Write a finished download body outside the store.
        fn temp_file(&self, contents: &[u8]) -> PathBuf {
            let dir = self.base.join("staging");
            fs::create_dir_all(&dir).unwrap();
            let path = dir.join(format!("{}.part", Uuid::new_v4()));
            fs::write(&path, contents).unwrap();
            path
        }

        fn start(&self, resource: &ResourceRef) -> TransferId {
            match self.manager.start_caching(resource).unwrap() {
                StartOutcome::Started(id) => id,
                other => panic!("expected a new transfer, got {:?}", other),
            }
        }

        fn progress(&self, id: TransferId, resource: &ResourceRef, written: i64, expected: i64) {
            self.manager.handle_event(TransportEvent::Progress {
                id,
                url: resource.url().clone(),
                bytes_written: written,
                bytes_expected: expected,
            });
        }

        fn complete(&self, id: TransferId, resource: &ResourceRef, temp_path: &Path) {
            self.manager.handle_event(TransportEvent::Completed {
                id,
                url: resource.url().clone(),
                temp_path: temp_path.to_path_buf(),
            });
        }

        fn fail(&self, id: TransferId, resource: &ResourceRef) {
            self.manager.handle_event(TransportEvent::Failed {
                id,
                url: resource.url().clone(),
                error: "HTTP error: 503".to_string(),
            });
        }
    }

    impl Drop for TestContext {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.base);
        }
    }

    fn accepting_transport(times: usize) -> MockTransport {
        let mut transport = MockTransport::new();
        transport
            .expect_begin_download()
            .times(times)
            .returning(|_, _| Ok(()));
        transport
    }

    fn track(url: &str) -> ResourceRef {
        ResourceRef::parse(url).unwrap()
    }

    fn episode() -> ResourceRef {
        track("https://cdn.example.com/podcast/episode-01.mp3")
    }

    fn drain(receiver: &mut tokio::sync::broadcast::Receiver<CoreEvent>) -> Vec<CacheEvent> {
        let mut events = Vec::new();
        while let Ok(CoreEvent::Cache(event)) = receiver.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_start_caching_fetches_exactly_once() {
        let ctx = TestContext::new(accepting_transport(1));
        let r = episode();

        assert!(matches!(
            ctx.manager.start_caching(&r).unwrap(),
            StartOutcome::Started(_)
        ));
        assert_eq!(
            ctx.manager.start_caching(&r).unwrap(),
            StartOutcome::AlreadyDownloading
        );
        assert!(ctx.manager.is_downloading(&r));
        assert_eq!(ctx.manager.downloading(), vec![r.clone()]);

        let state = ctx.manager.download_state(&r).unwrap();
        assert_eq!(state.bytes_written, 0);
        assert_eq!(state.bytes_expected, -1);
        assert_eq!(ctx.manager.progress(&r), Some(0.0));
    }

    #[test]
    fn test_transport_receives_request_url() {
        let mut transport = MockTransport::new();
        transport
            .expect_begin_download()
            .withf(|request, _| request.url.as_str() == "https://cdn.example.com/podcast/episode-01.mp3")
            .times(1)
            .returning(|_, _| Ok(()));
        let ctx = TestContext::new(transport);

        ctx.start(&episode());
    }

    #[test]
    fn test_cached_resource_is_not_fetched() {
        // No expectation: any transport call panics.
        let ctx = TestContext::new(MockTransport::new());
        let r = episode();
        fs::create_dir_all(ctx.manager.cache_dir()).unwrap();
        fs::write(ctx.manager.cache_dir().join(r.key()), b"cached").unwrap();

        assert_eq!(
            ctx.manager.start_caching(&r).unwrap(),
            StartOutcome::AlreadyCached
        );
        assert!(!ctx.manager.is_downloading(&r));
    }

    #[test]
    fn test_progress_then_completion() {
        let ctx = TestContext::new(accepting_transport(1));
        let r = episode();
        let token_before = ctx.manager.token();

        let id = ctx.start(&r);

        ctx.progress(id, &r, 50, 200);
        assert_eq!(ctx.manager.progress(&r), Some(0.25));

        ctx.progress(id, &r, 200, 200);
        assert_eq!(ctx.manager.progress(&r), Some(1.0));
        assert_eq!(ctx.manager.token(), token_before);

        let temp = ctx.temp_file(&[7u8; 200]);
        ctx.complete(id, &r, &temp);

        let path = ctx.manager.local_path(&r).expect("file cached");
        assert_eq!(path, ctx.manager.cache_dir().join("episode-01.mp3"));
        assert!(ctx.manager.is_downloaded(&r));
        assert!(!ctx.manager.is_downloading(&r));
        assert_eq!(ctx.manager.progress(&r), None);
        assert_ne!(ctx.manager.token(), token_before);
        assert_eq!(ctx.manager.file_size_bytes(&r).unwrap(), Some(200));
        assert_eq!(ctx.manager.file_size(&r), Some("200 bytes".to_string()));
        assert!(!temp.exists());
    }

    #[test]
    fn test_progress_is_clamped() {
        let ctx = TestContext::new(accepting_transport(1));
        let r = episode();
        let id = ctx.start(&r);

        ctx.progress(id, &r, 500, 200);
        let state = ctx.manager.download_state(&r).unwrap();
        assert_eq!(state.bytes_written, 200);
        assert_eq!(state.progress, 1.0);

        ctx.progress(id, &r, 120, -1);
        let state = ctx.manager.download_state(&r).unwrap();
        assert_eq!(state.bytes_written, 120);
        assert_eq!(state.progress, 1.0);
        assert!(!state.is_size_known());
    }

    #[test]
    fn test_failure_clears_registry_without_token_change() {
        let ctx = TestContext::new(accepting_transport(2));
        let r = episode();
        let token_before = ctx.manager.token();

        let id = ctx.start(&r);
        ctx.progress(id, &r, 10, 100);
        ctx.fail(id, &r);

        assert!(!ctx.manager.is_downloading(&r));
        assert!(ctx.manager.local_path(&r).is_none());
        assert_eq!(ctx.manager.token(), token_before);
        assert_eq!(ctx.manager.status(&r), CacheStatus::NotCached);

        // A failed resource can be requested again.
        ctx.start(&r);
        assert!(ctx.manager.is_downloading(&r));
    }

    #[test]
    fn test_transport_refusal_rolls_back() {
        let mut transport = MockTransport::new();
        transport
            .expect_begin_download()
            .times(1)
            .returning(|_, _| Err(BridgeError::NotAvailable("offline".to_string())));
        let ctx = TestContext::new(transport);
        let r = episode();

        let result = ctx.manager.start_caching(&r);

        assert!(matches!(result, Err(CacheError::Transport(_))));
        assert!(!ctx.manager.is_downloading(&r));
        assert!(ctx.manager.downloading().is_empty());
    }

    #[test]
    fn test_remove_cache() {
        let ctx = TestContext::new(accepting_transport(1));
        let r = episode();
        let initial = ctx.manager.token();

        assert!(!ctx.manager.remove_cache(&r).unwrap());
        assert_eq!(ctx.manager.token(), initial);

        let id = ctx.start(&r);
        ctx.complete(id, &r, &ctx.temp_file(b"audio"));
        let after_download = ctx.manager.token();

        assert!(ctx.manager.remove_cache(&r).unwrap());
        assert!(ctx.manager.local_path(&r).is_none());
        assert_ne!(ctx.manager.token(), after_download);

        let after_remove = ctx.manager.token();
        assert!(!ctx.manager.remove_cache(&r).unwrap());
        assert_eq!(ctx.manager.token(), after_remove);
    }

    #[test]
    fn test_colliding_urls_share_cache_entry() {
        let ctx = TestContext::new(accepting_transport(1));
        let v1 = track("https://a.example.com/v1/x.mp3");
        let v2 = track("https://b.example.com/v2/x.mp3");

        let id = ctx.start(&v1);
        assert_eq!(
            ctx.manager.start_caching(&v2).unwrap(),
            StartOutcome::AlreadyDownloading
        );

        ctx.complete(id, &v1, &ctx.temp_file(b"x"));
        assert_eq!(ctx.manager.local_path(&v2), ctx.manager.local_path(&v1));
        assert!(ctx.manager.is_downloaded(&v2));
    }

    #[test]
    fn test_completion_from_outside_the_store() {
        let ctx = TestContext::new(accepting_transport(2));
        let elsewhere =
            std::env::temp_dir().join(format!("core-cache-elsewhere-{}", Uuid::new_v4()));
        fs::create_dir_all(&elsewhere).unwrap();

        let first = episode();
        let second = track("https://cdn.example.com/podcast/episode-02.mp3");
        let first_id = ctx.start(&first);
        let second_id = ctx.start(&second);

        let temp = elsewhere.join("body.part");
        fs::write(&temp, vec![3u8; 4096]).unwrap();

        // Readers for other resources work while a completion is applied.
        let manager = ctx.manager.clone();
        let reader_target = second.clone();
        let reader = std::thread::spawn(move || {
            for _ in 0..100 {
                assert!(manager.is_downloading(&reader_target));
            }
        });
        ctx.complete(first_id, &first, &temp);
        reader.join().unwrap();

        assert!(!temp.exists());
        assert_eq!(ctx.manager.file_size_bytes(&first).unwrap(), Some(4096));
        assert!(ctx.manager.is_downloading(&second));

        let leftovers: Vec<_> = fs::read_dir(ctx.manager.cache_dir())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("episode-01.mp3")]);

        let stats = ctx.manager.stats().unwrap();
        assert_eq!(stats.cached_files, 1);
        assert_eq!(stats.total_bytes, 4096);
        assert_eq!(stats.downloading, 1);

        ctx.fail(second_id, &second);
        let _ = fs::remove_dir_all(&elsewhere);
    }

    #[test]
    fn test_stats_ignores_staged_files() {
        let ctx = TestContext::new(MockTransport::new());
        fs::create_dir_all(ctx.manager.cache_dir()).unwrap();
        fs::write(ctx.manager.cache_dir().join("a.mp3"), vec![0u8; 10]).unwrap();
        fs::write(
            ctx.manager.cache_dir().join(".b.mp3.0123.incoming"),
            vec![0u8; 99],
        )
        .unwrap();

        let stats = ctx.manager.stats().unwrap();
        assert_eq!(stats.cached_files, 1);
        assert_eq!(stats.total_bytes, 10);
    }

    #[test]
    fn test_completion_replaces_existing_file() {
        let ctx = TestContext::new(accepting_transport(1));
        let r = episode();
        let id = ctx.start(&r);

        // Someone else wrote the destination while the download was running.
        fs::create_dir_all(ctx.manager.cache_dir()).unwrap();
        fs::write(ctx.manager.cache_dir().join(r.key()), b"stale copy").unwrap();

        ctx.complete(id, &r, &ctx.temp_file(b"fresh"));

        let path = ctx.manager.local_path(&r).unwrap();
        assert_eq!(fs::read(path).unwrap(), b"fresh");
        assert!(!ctx.manager.is_downloading(&r));
    }

    #[test]
    fn test_completion_move_failure_reverts_to_not_cached() {
        let ctx = TestContext::new(accepting_transport(1));
        let bus = EventBus::new(16);
        let mut events = bus.subscribe();
        let manager = ctx.manager.clone().with_event_bus(bus);
        let r = episode();
        let id = ctx.start(&r);
        let token_before = manager.token();

        ctx.complete(id, &r, &ctx.base.join("vanished.part"));

        assert!(!manager.is_downloading(&r));
        assert!(manager.local_path(&r).is_none());
        assert_eq!(manager.token(), token_before);
        assert!(drain(&mut events)
            .iter()
            .any(|e| matches!(e, CacheEvent::DownloadFailed { transfer_id, .. } if *transfer_id == id)));
    }

    #[test]
    fn test_stale_attempt_events_are_ignored() {
        let ctx = TestContext::new(accepting_transport(2));
        let r = episode();

        let first = ctx.start(&r);
        ctx.fail(first, &r);
        let second = ctx.start(&r);
        assert_ne!(first, second);

        ctx.progress(first, &r, 90, 100);
        assert_eq!(ctx.manager.progress(&r), Some(0.0));

        let stale_temp = ctx.temp_file(b"old attempt");
        ctx.complete(first, &r, &stale_temp);
        assert!(ctx.manager.is_downloading(&r));
        assert!(ctx.manager.local_path(&r).is_none());
        assert!(!stale_temp.exists());

        ctx.fail(first, &r);
        assert!(ctx.manager.is_downloading(&r));

        ctx.progress(second, &r, 30, 100);
        assert_eq!(ctx.manager.progress(&r), Some(0.3));
    }

    #[test]
    fn test_events_for_unknown_resources_are_ignored() {
        let ctx = TestContext::new(MockTransport::new());
        let r = episode();
        let token = ctx.manager.token();

        ctx.progress(TransferId(42), &r, 1, 2);
        let temp = ctx.temp_file(b"unexpected");
        ctx.complete(TransferId(42), &r, &temp);

        assert!(ctx.manager.downloading().is_empty());
        assert!(ctx.manager.local_path(&r).is_none());
        assert_eq!(ctx.manager.token(), token);
        assert!(!temp.exists());
    }

    #[test]
    fn test_completion_handler_runs_once() {
        let ctx = TestContext::new(MockTransport::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&calls);
        ctx.manager.set_completion_handler(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        ctx.manager.handle_event(TransportEvent::SessionDrained);
        ctx.manager.handle_event(TransportEvent::SessionDrained);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let counter = Arc::clone(&calls);
        ctx.manager.set_completion_handler(move || {
            counter.fetch_add(10, Ordering::SeqCst);
        });
        ctx.manager.handle_event(TransportEvent::SessionDrained);
        assert_eq!(calls.load(Ordering::SeqCst), 11);
    }

    #[test]
    fn test_completion_handler_is_replaced() {
        let ctx = TestContext::new(MockTransport::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let first = Arc::clone(&calls);
        ctx.manager.set_completion_handler(move || {
            first.fetch_add(1, Ordering::SeqCst);
        });
        let second = Arc::clone(&calls);
        ctx.manager.set_completion_handler(move || {
            second.fetch_add(100, Ordering::SeqCst);
        });

        ctx.manager.handle_event(TransportEvent::SessionDrained);
        assert_eq!(calls.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn test_resolve_source() {
        let ctx = TestContext::new(accepting_transport(1));
        let r = episode();

        let source = ctx.manager.resolve_source(&r);
        assert_eq!(source, MediaSource::Remote(r.url().clone()));
        assert!(ctx.manager.is_downloading(&r));

        // Still downloading: stream again without a second fetch.
        assert!(!ctx.manager.resolve_source(&r).is_local());
        assert_eq!(ctx.manager.download_states().len(), 1);
    }

    #[test]
    fn test_resolve_source_prefers_local_file() {
        let ctx = TestContext::new(MockTransport::new());
        let r = episode();
        fs::create_dir_all(ctx.manager.cache_dir()).unwrap();
        fs::write(ctx.manager.cache_dir().join(r.key()), b"cached").unwrap();

        assert_eq!(
            ctx.manager.resolve_source(&r),
            MediaSource::Local(ctx.manager.cache_dir().join(r.key()))
        );
    }

    #[test]
    fn test_event_bus_sequence() {
        let ctx = TestContext::new(accepting_transport(1));
        let bus = EventBus::new(32);
        let mut receiver = bus.subscribe();
        let manager = ctx.manager.clone().with_event_bus(bus);
        let r = episode();

        let id = ctx.start(&r);
        ctx.progress(id, &r, 100, 200);
        ctx.complete(id, &r, &ctx.temp_file(b"body"));
        manager.remove_cache(&r).unwrap();
        manager.handle_event(TransportEvent::SessionDrained);

        let events = drain(&mut receiver);
        assert_eq!(events.len(), 5);
        assert!(matches!(&events[0], CacheEvent::DownloadStarted { key, .. } if key == "episode-01.mp3"));
        assert!(matches!(
            &events[1],
            CacheEvent::DownloadProgress { bytes_written: 100, bytes_expected: 200, .. }
        ));
        assert!(matches!(&events[2], CacheEvent::DownloadCompleted { .. }));
        assert!(matches!(&events[3], CacheEvent::CacheRemoved { .. }));
        assert!(matches!(
            &events[4],
            CacheEvent::SessionDrained { handler_invoked: false }
        ));
    }

    #[tokio::test]
    async fn test_token_subscription_sees_changes() {
        let ctx = TestContext::new(accepting_transport(1));
        let r = episode();
        let mut tokens = ctx.manager.subscribe();
        let initial = *tokens.borrow_and_update();

        let id = ctx.start(&r);
        ctx.complete(id, &r, &ctx.temp_file(b"body"));

        tokens.changed().await.unwrap();
        let current = *tokens.borrow_and_update();
        assert_ne!(current, initial);
        assert_eq!(current, ctx.manager.token());
    }

    /// Transport that "downloads" by writing a fixed body from a spawned task.
    struct LoopbackTransport {
        staging: PathBuf,
        body: Vec<u8>,
    }

    impl DownloadTransport for LoopbackTransport {
        fn begin_download(
            &self,
            request: DownloadRequest,
            events: TransportEventSender,
        ) -> BridgeResult<()> {
            let temp_path = self.staging.join(format!("{}.part", request.id.0));
            let body = self.body.clone();

            tokio::spawn(async move {
                let total = body.len() as i64;
                std::fs::write(&temp_path, &body)?;
                events.send(TransportEvent::Progress {
                    id: request.id,
                    url: request.url.clone(),
                    bytes_written: total / 2,
                    bytes_expected: total,
                })?;
                events.send(TransportEvent::Completed {
                    id: request.id,
                    url: request.url,
                    temp_path,
                })?;
                events.send(TransportEvent::SessionDrained)?;
                Ok::<_, BridgeError>(())
            });
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_event_pump_end_to_end() {
        let base = std::env::temp_dir().join(format!("core-cache-pump-{}", Uuid::new_v4()));
        let staging = base.join("staging");
        fs::create_dir_all(&staging).unwrap();

        let transport = LoopbackTransport {
            staging,
            body: vec![1u8; 64],
        };
        let manager = CacheManager::new(CacheConfig::new(&base), Arc::new(transport)).unwrap();
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        manager.set_completion_handler(move || {
            let _ = done_tx.send(());
        });

        let pump = manager.start().unwrap();
        let r = episode();
        manager.start_caching(&r).unwrap();

        tokio::time::timeout(Duration::from_secs(5), done_rx)
            .await
            .expect("session drained in time")
            .unwrap();

        assert!(manager.is_downloaded(&r));
        assert!(!manager.is_downloading(&r));
        assert_eq!(manager.file_size_bytes(&r).unwrap(), Some(64));

        manager.shutdown();
        tokio::time::timeout(Duration::from_secs(5), pump)
            .await
            .expect("pump stopped")
            .unwrap();

        let _ = fs::remove_dir_all(&base);
    }
}
