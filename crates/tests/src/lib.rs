//! 集成测试与端到端测试。
//!
//! 覆盖范围：
//! - 配置快照
//! - 记录回放：`DataAdapter` → `Matcher` → sinks
//! - 在线模式：进程内总线 + 合成相机

#[cfg(test)]
mod contract_tests {
    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{MatchPolicy, MessageKind, SinkType};

    #[test]
    fn test_full_config_snapshot() {
        let toml = r#"
[matcher]
max_time_diff_ms = 80
policy = "drain_stale"

[record]
path = "drive.rsrec"
camera_channel = "/camera"
event_channel = "/events"
fps = 15.0

[message_types]
"vendor.Image" = "camera"

[regions]
image_regions = ["lane_1", "lane_2"]

[[sinks]]
name = "results"
sink_type = "file"
params = { base_path = "./out", save_points = "false" }

[log]
level = "debug"
format = "json"
"#;
        let config = ConfigLoader::load_from_str(toml, ConfigFormat::Toml).unwrap();

        assert_eq!(config.matcher.max_time_diff_ms, 80);
        assert_eq!(config.matcher.policy, MatchPolicy::DrainStale);
        assert_eq!(config.queues.events, 1000);
        assert_eq!(config.record.as_ref().unwrap().channels().len(), 2);
        assert_eq!(
            config.message_type_table().classify("vendor.Image"),
            Some(MessageKind::Camera)
        );
        assert_eq!(config.sinks[0].sink_type, SinkType::File);
        assert_eq!(config.log.format, "json");
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::{Duration, Instant};

    use bytes::Bytes;
    use contracts::{
        BaseEvent, BaseEventsMessage, BusMessage, CameraMessage, Correlation, CorrelationKind,
        FrameBundle, ImageFrame, MatcherConfig, MessageTypeTable, PointCloudMessage, PointModel,
        SinkConfig, SinkType, DEFAULT_EVENT_TYPE,
    };
    use dispatcher::create_dispatcher;
    use ingestion::{
        CameraSource, CameraSourceConfig, ChannelDecl, ChannelEventOptions, ChannelEventSource,
        DataAdapter, LocalBus, OnlineSources, RecordOptions, RecordSource, RecordWriter,
        SyntheticGrabber,
    };
    use matcher::Matcher;
    use point_codec::{
        encode_packed_core, encode_packed_supplement, PackedPoint, PointRecordCodec,
    };
    use tokio::sync::mpsc;

    fn camera(ts: u64) -> BusMessage {
        BusMessage::Camera(CameraMessage {
            timestamp_ms: ts,
            width: 2,
            height: 1,
            channels: 3,
            data: Bytes::from_static(&[10, 20, 30, 40, 50, 60]),
        })
    }

    fn events(ts: u64, region: &str) -> BusMessage {
        BusMessage::Events(BaseEventsMessage {
            timestamp_ms: ts,
            events: vec![BaseEvent {
                region_attribute: DEFAULT_EVENT_TYPE.into(),
                region_name: region.into(),
                region_id: 1,
                boxes: vec![],
            }],
        })
    }

    /// 事件 1000 ms，图像 1080 ms（记录时间）
    fn write_event_then_image(path: &Path) {
        let mut writer = RecordWriter::create(
            path,
            vec![
                ChannelDecl::new("/camera", MessageTypeTable::CAMERA),
                ChannelDecl::new("/events", MessageTypeTable::EVENTS),
            ],
        )
        .unwrap();
        writer.write("/events", 1_000_000_000, &events(1000, "lane_1")).unwrap();
        writer.write("/camera", 1_080_000_000, &camera(1080)).unwrap();
        writer.finish().unwrap();
    }

    fn replay_options() -> RecordOptions {
        RecordOptions {
            camera_channel: Some("/camera".into()),
            event_channel: Some("/events".into()),
            ..Default::default()
        }
    }

    /// 挂在 adapter 回调后的 Matcher，收集所有关联结果
    struct Harness {
        matcher: Arc<Matcher>,
        out: Arc<Mutex<Vec<Correlation>>>,
    }

    impl Harness {
        fn new(max_time_diff_ms: u64) -> Self {
            Self {
                matcher: Arc::new(Matcher::new(MatcherConfig {
                    max_time_diff_ms,
                    ..Default::default()
                })),
                out: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn adapter(&self) -> DataAdapter {
            let adapter = DataAdapter::default();

            let matcher = self.matcher.clone();
            let out = self.out.clone();
            adapter.set_image_callback(Arc::new(move |frame: ImageFrame| {
                let results = matcher.add_image(frame.tagged("lane_1".into(), None));
                out.lock().unwrap().extend(results);
            }));

            let matcher = self.matcher.clone();
            let out = self.out.clone();
            adapter.set_frame_callback(Arc::new(move |bundle: FrameBundle| {
                for event in bundle.into_enriched_events() {
                    let results = matcher.add_event(event);
                    out.lock().unwrap().extend(results);
                }
            }));

            adapter
        }

        fn kinds(&self) -> Vec<CorrelationKind> {
            self.out.lock().unwrap().iter().map(|c| c.kind()).collect()
        }
    }

    fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        cond()
    }

    #[test]
    fn test_replay_matches_within_tolerance() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drive.rsrec");
        write_event_then_image(&path);

        let harness = Harness::new(150);
        let adapter = harness.adapter();
        adapter.configure_offline(RecordSource::open(&path, replay_options()).unwrap());
        adapter.run().unwrap();

        assert_eq!(harness.kinds(), vec![CorrelationKind::Matched]);
        let out = harness.out.lock().unwrap();
        assert_eq!(out[0].gap_ms(), Some(80));
        assert_eq!(out[0].region.as_str(), "lane_1");
        assert!(harness.matcher.flush().is_empty());
    }

    #[test]
    fn test_replay_outside_tolerance_yields_two_orphans() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drive.rsrec");
        write_event_then_image(&path);

        let harness = Harness::new(50);
        let adapter = harness.adapter();
        adapter.configure_offline(RecordSource::open(&path, replay_options()).unwrap());
        adapter.run().unwrap();

        // The image ages the event out and waits for a later event
        assert_eq!(harness.kinds(), vec![CorrelationKind::OrphanEvent]);
        assert_eq!(harness.matcher.pending("lane_1"), (0, 1));

        let flushed = harness.matcher.flush();
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0].kind(), CorrelationKind::OrphanImage);

        let stats = harness.matcher.stats();
        assert_eq!(stats.orphan_events, 1);
        assert_eq!(stats.orphan_images, 1);
        assert_eq!(stats.matched, 0);
    }

    #[test]
    fn test_replay_paces_camera_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("paced.rsrec");
        let mut writer = RecordWriter::create(
            &path,
            vec![ChannelDecl::new("/camera", MessageTypeTable::CAMERA)],
        )
        .unwrap();
        for i in 0..3u64 {
            writer
                .write("/camera", (1000 + i) * 1_000_000, &camera(1000 + i))
                .unwrap();
        }
        writer.finish().unwrap();

        let adapter = DataAdapter::default();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        adapter.set_image_callback(Arc::new(move |_: ImageFrame| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        adapter.configure_offline(
            RecordSource::open(
                &path,
                RecordOptions {
                    camera_channel: Some("/camera".into()),
                    fps: Some(10.0),
                    ..Default::default()
                },
            )
            .unwrap(),
        );

        let started = Instant::now();
        adapter.run().unwrap();

        assert_eq!(seen.load(Ordering::SeqCst), 3);
        assert!(started.elapsed() >= Duration::from_millis(200));
    }

    #[test]
    fn test_compressed_points_are_transcoded_on_replay() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("points.rsrec");

        let packed = [PackedPoint {
            x: 1.0,
            y: 2.0,
            z: 3.0,
            intensity: 7,
            offset_ms: 5,
            scan_id: 1,
            scan_idx: 2,
        }];
        let compressed = PointRecordCodec::compress(&PointCloudMessage {
            timestamp_ms: 1000,
            frame_start_ns: 1_000_000_000,
            model: PointModel::Packed,
            point_size: 1,
            core: encode_packed_core(&packed),
            supplement: encode_packed_supplement(&packed),
        })
        .unwrap();

        let mut writer = RecordWriter::create(
            &path,
            vec![ChannelDecl::new(
                "/points",
                MessageTypeTable::COMPRESSED_POINT_CLOUD,
            )],
        )
        .unwrap();
        writer
            .write(
                "/points",
                1_000_000_000,
                &BusMessage::CompressedPointCloud(compressed),
            )
            .unwrap();
        writer.finish().unwrap();

        let adapter = DataAdapter::default();
        let bundles = Arc::new(Mutex::new(Vec::new()));
        let sink = bundles.clone();
        adapter.set_frame_callback(Arc::new(move |bundle: FrameBundle| {
            sink.lock().unwrap().push(bundle);
        }));
        adapter.configure_offline(
            RecordSource::open(
                &path,
                RecordOptions {
                    points_channel: Some("/points".into()),
                    ..Default::default()
                },
            )
            .unwrap(),
        );
        adapter.run().unwrap();

        let bundles = bundles.lock().unwrap();
        assert_eq!(bundles.len(), 1);
        let frame = bundles[0].points.as_ref().unwrap();
        assert_eq!(frame.model, PointModel::Canonical);

        let points = PointRecordCodec::decode_points(frame);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].core.timestamp_ns, 1_005_000_000);
        assert_eq!(points[0].core.x, 1.0);
        assert_eq!(points[0].supplement.scan_idx, 2);
    }

    #[tokio::test]
    async fn test_replay_into_file_sink() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drive.rsrec");
        write_event_then_image(&path);
        let results = dir.path().join("results");

        let harness = Harness::new(150);
        let adapter = harness.adapter();
        adapter.configure_offline(RecordSource::open(&path, replay_options()).unwrap());
        tokio::task::spawn_blocking(move || adapter.run())
            .await
            .unwrap()
            .unwrap();

        let sinks = vec![
            SinkConfig {
                name: "log".into(),
                sink_type: SinkType::Log,
                queue_capacity: 10,
                params: Default::default(),
            },
            SinkConfig {
                name: "files".into(),
                sink_type: SinkType::File,
                queue_capacity: 10,
                params: [
                    ("base_path".to_string(), results.display().to_string()),
                    ("save_points".to_string(), "false".to_string()),
                ]
                .into_iter()
                .collect(),
            },
        ];
        let (tx, rx) = mpsc::channel(16);
        let handle = create_dispatcher(sinks, rx).unwrap().spawn();

        let correlations: Vec<Correlation> = harness.out.lock().unwrap().drain(..).collect();
        for correlation in correlations {
            tx.try_send(correlation).unwrap();
        }
        drop(tx);

        let metrics = handle.await.unwrap();
        assert_eq!(metrics.len(), 2);
        assert!(metrics.iter().all(|(_, m)| m.written == 1 && m.failed == 0));

        let rows = std::fs::read_to_string(results.join("results.jsonl")).unwrap();
        let lines: Vec<&str> = rows.lines().collect();
        assert_eq!(lines.len(), 1);
        let row: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(row["kind"], "matched");
        assert_eq!(row["region"], "lane_1");
        assert_eq!(row["gap_ms"], 80);
        assert!(results.join("images").read_dir().unwrap().next().is_some());
    }

    #[test]
    fn test_online_bus_and_camera_match() {
        let bus = Arc::new(LocalBus::new());
        let events_source = ChannelEventSource::subscribe(
            bus.clone(),
            ChannelEventOptions {
                event_channel: Some("/events".into()),
                ..Default::default()
            },
        )
        .unwrap();
        let camera_source = CameraSource::open(
            SyntheticGrabber::new("cam0", 4, 2).with_interval(Duration::from_millis(20)),
            CameraSourceConfig::default(),
        )
        .unwrap();

        let harness = Harness::new(1000);
        let adapter = harness.adapter();
        adapter
            .configure_online(OnlineSources {
                camera: Some(camera_source),
                events: Some(events_source),
            })
            .unwrap();
        adapter.run().unwrap();

        // Event timestamps come from the wall clock on receipt
        thread::sleep(Duration::from_millis(100));
        bus.publish("/events", events(0, "lane_1"));

        let matched = wait_until(Duration::from_secs(3), || {
            harness.matcher.stats().matched >= 1
        });
        adapter.stop().unwrap();

        assert!(matched);
        let out = harness.out.lock().unwrap();
        let pair = out
            .iter()
            .find(|c| c.kind() == CorrelationKind::Matched)
            .unwrap();
        assert!(pair.gap_ms().unwrap() <= 1000);
    }
}
