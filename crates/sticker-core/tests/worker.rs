mod common;

use anyhow::Result;
use common::init_tracing;
use flate2::write::GzEncoder;
use flate2::Compression;
use lottie_data::LottieJson;
use std::io::Write;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use sticker_core::port::{self, MainPort};
use sticker_core::protocol::{
    CallbackArgs, Envelope, FromWorker, MethodCall, RemoteError, Reply, TimingInfo, ToWorker, WorkerUpdate,
    MEDIA_CHANNEL,
};
use sticker_core::rasterizer::{frame_index_of, paint, FrameRasterizer, PlaceholderFactory, RasterizerFactory};
use sticker_core::types::{MessageId, RenderId, Rgb};
use sticker_core::worker::{self, WorkerOptions};
use sticker_core::MemorySourceLoader;
use tiny_skia::Pixmap;

const TIMEOUT: Duration = Duration::from_secs(5);

fn document(frames: u32, fr: u32) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({ "v": "5.7.4", "ip": 0, "op": frames, "fr": fr, "w": 512, "h": 512 }))
        .unwrap()
}

fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).unwrap();
    encoder.finish().unwrap()
}

fn loader() -> MemorySourceLoader {
    MemorySourceLoader::new()
        .with("duck.json", document(10, 60))
        .with("duck.tgs", gzip(&document(90, 60)))
        .with("fast.json", document(60, 60))
        .with("broken.json", b"{ not json".to_vec())
}

struct Session {
    port: MainPort,
    thread: JoinHandle<()>,
    next_id: MessageId,
}

impl Session {
    fn start(index: usize, factory: Arc<dyn RasterizerFactory>) -> Self {
        init_tracing();
        let (main, worker_end) = port::channel();
        let thread = worker::spawn(
            index,
            worker_end,
            Arc::new(loader()),
            factory,
            WorkerOptions::default(),
        )
        .unwrap();
        Self {
            port: main,
            thread,
            next_id: 1,
        }
    }

    /// Started worker with its `Ready` update consumed.
    fn ready(factory: Arc<dyn RasterizerFactory>) -> Self {
        let session = Self::start(0, factory);
        assert!(matches!(
            session.next(),
            FromWorker::Update(WorkerUpdate::Ready { index: 0 })
        ));
        session
    }

    fn next(&self) -> FromWorker {
        let mut envelope = self.port.recv_timeout(TIMEOUT).expect("worker reply");
        assert_eq!(envelope.channel, MEDIA_CHANNEL);
        assert_eq!(envelope.payloads.len(), 1);
        envelope.payloads.remove(0)
    }

    fn send(&mut self, calls: Vec<MethodCall>) -> Vec<MessageId> {
        let mut ids = Vec::new();
        let payloads = calls
            .into_iter()
            .map(|call| {
                let message_id = self.next_id;
                self.next_id += 1;
                ids.push(message_id);
                ToWorker::CallMethod {
                    message_id,
                    call,
                    with_callback: true,
                }
            })
            .collect();
        self.port.post(Envelope::new(MEDIA_CHANNEL, payloads)).unwrap();
        ids
    }

    /// Sends one call and gathers its callbacks up to the response.
    fn call(&mut self, call: MethodCall) -> (Vec<CallbackArgs>, Result<Reply, RemoteError>) {
        let id = self.send(vec![call])[0];
        self.collect(id)
    }

    fn collect(&self, id: MessageId) -> (Vec<CallbackArgs>, Result<Reply, RemoteError>) {
        let mut callbacks = Vec::new();
        loop {
            match self.next() {
                FromWorker::MethodCallback { message_id, args } => {
                    assert_eq!(message_id, id);
                    callbacks.push(args);
                }
                FromWorker::MethodResponse { message_id, result } => {
                    assert_eq!(message_id, id);
                    return (callbacks, result);
                }
                other => panic!("unexpected message {:?}", other),
            }
        }
    }

    fn init(&mut self, render_id: &str, source_url: &str, is_low_priority: bool) -> TimingInfo {
        let (callbacks, result) = self.call(MethodCall::Init {
            render_id: RenderId::from(render_id),
            source_url: source_url.into(),
            size: 16,
            is_low_priority,
            custom_color: None,
        });
        assert_eq!(result, Ok(Reply::Ack));
        match callbacks.as_slice() {
            [CallbackArgs::Inited(timing)] => *timing,
            other => panic!("expected one Inited callback, got {:?}", other),
        }
    }

    fn render(&mut self, render_id: &str, start_index: usize) -> (Vec<(usize, Pixmap)>, Result<Reply, RemoteError>) {
        let (callbacks, result) = self.call(MethodCall::RenderFrames {
            render_id: RenderId::from(render_id),
            start_index,
        });
        let frames = callbacks
            .into_iter()
            .map(|args| match args {
                CallbackArgs::Frame { index, bitmap } => (index, bitmap),
                other => panic!("unexpected callback {:?}", other),
            })
            .collect();
        (frames, result)
    }

    fn shutdown(self) {
        drop(self.port);
        self.thread.join().unwrap();
    }
}

fn encoded(bitmap: &Pixmap) -> Option<usize> {
    bitmap
        .pixel(1, 1)
        .and_then(|p| frame_index_of([p.red(), p.green(), p.blue(), p.alpha()]))
}

#[test]
fn announces_itself_first() {
    let session = Session::start(2, Arc::new(PlaceholderFactory));
    assert!(matches!(
        session.next(),
        FromWorker::Update(WorkerUpdate::Ready { index: 2 })
    ));
    session.shutdown();
}

#[test]
fn init_reports_timing_then_acks() {
    let mut session = Session::ready(Arc::new(PlaceholderFactory));
    let timing = session.init("duck", "duck.json", false);
    assert_eq!(timing.reduce_factor, 1);
    assert_eq!(timing.frames_count, 10);

    let tgs = session.init("goose", "duck.tgs", false);
    assert_eq!(tgs.frames_count, 90);
    session.shutdown();
}

#[test]
fn renders_a_prefetch_window() {
    let mut session = Session::ready(Arc::new(PlaceholderFactory));
    session.init("duck", "duck.json", false);

    let (frames, result) = session.render("duck", 0);
    assert_eq!(result, Ok(Reply::Rendered { frames: 4 }));
    let indices: Vec<usize> = frames.iter().map(|(index, _)| *index).collect();
    assert_eq!(indices, vec![0, 1, 2, 3]);
    assert!(frames.iter().all(|(index, bitmap)| encoded(bitmap) == Some(*index)));
    assert_eq!(frames[0].1.width(), 16);

    // The window stops at the last frame.
    let (frames, result) = session.render("duck", 8);
    assert_eq!(result, Ok(Reply::Rendered { frames: 2 }));
    assert_eq!(frames.len(), 2);
    session.shutdown();
}

#[test]
fn low_priority_skips_native_frames() {
    let mut session = Session::ready(Arc::new(PlaceholderFactory));
    let timing = session.init("fast", "fast.json", true);
    assert_eq!(timing.reduce_factor, 2);
    assert_eq!(timing.frames_count, 30);
    assert!((timing.ms_per_frame - 1000.0 / 30.0).abs() < 1e-9);

    let (frames, _) = session.render("fast", 1);
    assert_eq!(frames[0].0, 1);
    assert_eq!(encoded(&frames[0].1), Some(2));
    assert_eq!(encoded(&frames[3].1), Some(8));
    session.shutdown();
}

#[test]
fn errors_are_returned_to_the_caller() {
    let mut session = Session::ready(Arc::new(PlaceholderFactory));

    let (callbacks, result) = session.render("ghost", 0);
    assert!(callbacks.is_empty());
    assert!(result.unwrap_err().message.contains("unknown render id ghost"));

    let (_, result) = session.call(MethodCall::Init {
        render_id: RenderId::from("missing"),
        source_url: "missing.json".into(),
        size: 16,
        is_low_priority: false,
        custom_color: None,
    });
    assert!(result.unwrap_err().message.contains("missing.json"));

    let (_, result) = session.call(MethodCall::Init {
        render_id: RenderId::from("broken"),
        source_url: "broken.json".into(),
        size: 16,
        is_low_priority: false,
        custom_color: None,
    });
    assert!(result.unwrap_err().message.contains("failed to decode broken.json"));

    session.init("duck", "duck.json", false);
    let (_, result) = session.render("duck", 10);
    assert!(result.unwrap_err().message.contains("out of range"));
    session.shutdown();
}

#[test]
fn tint_follows_set_color() {
    let mut session = Session::ready(Arc::new(PlaceholderFactory));
    let (_, result) = session.call(MethodCall::Init {
        render_id: RenderId::from("duck"),
        source_url: "duck.json".into(),
        size: 16,
        is_low_priority: false,
        custom_color: Some(Rgb(0, 0, 7)),
    });
    assert_eq!(result, Ok(Reply::Ack));

    let (frames, _) = session.render("duck", 0);
    assert_eq!(frames[0].1.pixel(0, 0).map(|p| p.blue()), Some(7));

    let (_, result) = session.call(MethodCall::SetColor {
        render_id: RenderId::from("duck"),
        custom_color: Some(Rgb(0, 0, 9)),
    });
    assert_eq!(result, Ok(Reply::Ack));
    let (frames, _) = session.render("duck", 4);
    assert_eq!(frames[0].1.pixel(0, 0).map(|p| p.blue()), Some(9));

    // Swapping the source keeps the tint.
    let (callbacks, result) = session.call(MethodCall::ChangeData {
        render_id: RenderId::from("duck"),
        source_url: "duck.tgs".into(),
        is_low_priority: false,
    });
    assert_eq!(result, Ok(Reply::Ack));
    assert!(matches!(callbacks[..], [CallbackArgs::Inited(TimingInfo { frames_count: 90, .. })]));
    let (frames, _) = session.render("duck", 40);
    assert_eq!(frames[0].1.pixel(0, 0).map(|p| p.blue()), Some(9));
    assert_eq!(encoded(&frames[0].1), Some(40));
    session.shutdown();
}

#[test]
fn destroy_drops_the_context() {
    let mut session = Session::ready(Arc::new(PlaceholderFactory));
    session.init("duck", "duck.json", false);
    let (_, result) = session.call(MethodCall::Destroy {
        render_id: RenderId::from("duck"),
    });
    assert_eq!(result, Ok(Reply::Ack));
    let (_, result) = session.render("duck", 0);
    assert!(result.is_err());

    // Destroying twice is harmless.
    let (_, result) = session.call(MethodCall::Destroy {
        render_id: RenderId::from("duck"),
    });
    assert_eq!(result, Ok(Reply::Ack));
    session.shutdown();
}

#[test]
fn cancel_in_the_same_envelope_stops_rendering() {
    let mut session = Session::ready(Arc::new(PlaceholderFactory));
    session.init("duck", "duck.json", false);

    let message_id = session.next_id;
    session.next_id += 1;
    session
        .port
        .post(Envelope::new(
            MEDIA_CHANNEL,
            vec![
                ToWorker::CallMethod {
                    message_id,
                    call: MethodCall::RenderFrames {
                        render_id: RenderId::from("duck"),
                        start_index: 0,
                    },
                    with_callback: true,
                },
                ToWorker::CancelProgress { message_id },
            ],
        ))
        .unwrap();
    let (frames, result) = session.collect(message_id);
    assert!(frames.is_empty());
    assert_eq!(result, Ok(Reply::Rendered { frames: 0 }));

    // Cancellations of unknown requests are forgotten.
    session
        .port
        .post(Envelope::single(MEDIA_CHANNEL, ToWorker::CancelProgress { message_id: 999 }))
        .unwrap();
    let (frames, _) = session.render("duck", 0);
    assert_eq!(frames.len(), 4);
    session.shutdown();
}

#[test]
fn calls_in_one_envelope_run_in_order() {
    let mut session = Session::ready(Arc::new(PlaceholderFactory));
    let ids = session.send(vec![
        MethodCall::Init {
            render_id: RenderId::from("duck"),
            source_url: "duck.json".into(),
            size: 16,
            is_low_priority: false,
            custom_color: None,
        },
        MethodCall::RenderFrames {
            render_id: RenderId::from("duck"),
            start_index: 2,
        },
    ]);
    let (callbacks, result) = session.collect(ids[0]);
    assert_eq!(callbacks.len(), 1);
    assert_eq!(result, Ok(Reply::Ack));
    let (callbacks, result) = session.collect(ids[1]);
    assert_eq!(callbacks.len(), 4);
    assert_eq!(result, Ok(Reply::Rendered { frames: 4 }));
    session.shutdown();
}

struct Fragile {
    size: u32,
}

impl FrameRasterizer for Fragile {
    fn load(&mut self, _document: &LottieJson, size: u32, _tint: Option<Rgb>) -> Result<()> {
        self.size = size;
        Ok(())
    }

    fn set_tint(&mut self, _tint: Option<Rgb>) {}

    fn render(&mut self, frame: usize) -> Result<Pixmap> {
        if frame == 5 {
            panic!("corrupt shape at frame {}", frame);
        }
        paint(frame, self.size, None)
    }
}

struct FragileFactory;

impl RasterizerFactory for FragileFactory {
    fn create(&self) -> Box<dyn FrameRasterizer> {
        Box::new(Fragile { size: 0 })
    }
}

#[test]
fn panics_are_reported_and_the_worker_survives() {
    let mut session = Session::ready(Arc::new(FragileFactory));
    session.init("duck", "duck.json", false);

    let ids = session.send(vec![MethodCall::RenderFrames {
        render_id: RenderId::from("duck"),
        start_index: 4,
    }]);
    assert!(matches!(
        session.next(),
        FromWorker::MethodCallback {
            args: CallbackArgs::Frame { index: 4, .. },
            ..
        }
    ));
    match session.next() {
        FromWorker::UnhandledError { message } => assert_eq!(message, "corrupt shape at frame 5"),
        other => panic!("expected a fault, got {:?}", other),
    }
    assert_eq!(ids.len(), 1);

    let (frames, result) = session.render("duck", 0);
    assert_eq!(frames.len(), 4);
    assert_eq!(result, Ok(Reply::Rendered { frames: 4 }));
    session.shutdown();
}
