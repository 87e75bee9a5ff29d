#![allow(dead_code)]

use std::collections::HashMap;
use std::time::{Duration, Instant};
use sticker_core::config::EngineConfig;
use sticker_core::engine::{Engine, FrameStats};
use sticker_core::pool::WorkerPool;
use sticker_core::port::{self, WorkerPort};
use sticker_core::protocol::{
    CallbackArgs, Envelope, FromWorker, MethodCall, RemoteError, Reply, TimingInfo, ToWorker, MEDIA_CHANNEL,
};
use sticker_core::rasterizer::{frame_index_of, paint};
use sticker_core::scheduler::Scheduler;
use sticker_core::types::{MessageId, RenderId, Rgb};
use sticker_core::{Animation, AnimationRequest, Canvas};

/// Nominal frame duration of scripted sources; the harness clock advances by it.
pub const FRAME_MS: u64 = 20;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("sticker_core=debug")
        .try_init();
}

#[derive(Clone, Copy)]
pub struct ScriptedSource {
    pub frames_count: usize,
    pub blue: u8,
    pub reduce_factor: u32,
}

#[derive(Debug, Clone)]
pub struct ReceivedCall {
    pub message_id: MessageId,
    pub call: MethodCall,
    pub with_callback: bool,
}

/// Main-thread stand-in for a media worker, answering calls on demand.
pub struct ScriptedWorker {
    port: WorkerPort,
    sources: HashMap<String, ScriptedSource>,
    contexts: HashMap<RenderId, (ScriptedSource, u32)>,
    pub prefetch: usize,
    /// Number of upcoming `renderFrames` calls answered with an error.
    pub reject_renders: usize,
    pub log: Vec<ReceivedCall>,
    pub cancels: Vec<MessageId>,
    pub envelopes: usize,
}

impl ScriptedWorker {
    pub fn new(port: WorkerPort) -> Self {
        Self {
            port,
            sources: HashMap::new(),
            contexts: HashMap::new(),
            prefetch: 4,
            reject_renders: 0,
            log: Vec::new(),
            cancels: Vec::new(),
            envelopes: 0,
        }
    }

    pub fn add_source(&mut self, url: &str, frames_count: usize, blue: u8) {
        self.add_reduced_source(url, frames_count, blue, 1);
    }

    /// Source whose timing is reported with `reduce_factor`.
    pub fn add_reduced_source(&mut self, url: &str, frames_count: usize, blue: u8, reduce_factor: u32) {
        self.sources.insert(
            url.to_string(),
            ScriptedSource {
                frames_count,
                blue,
                reduce_factor,
            },
        );
    }

    /// Reads every queued envelope.
    pub fn receive(&mut self) -> Vec<ReceivedCall> {
        let mut calls = Vec::new();
        while let Ok(envelope) = self.port.try_recv() {
            assert_eq!(envelope.channel, MEDIA_CHANNEL);
            self.envelopes += 1;
            for payload in envelope.payloads {
                match payload {
                    ToWorker::CallMethod {
                        message_id,
                        call,
                        with_callback,
                    } => {
                        let received = ReceivedCall {
                            message_id,
                            call,
                            with_callback,
                        };
                        self.log.push(received.clone());
                        calls.push(received);
                    }
                    ToWorker::CancelProgress { message_id } => self.cancels.push(message_id),
                }
            }
        }
        calls
    }

    /// Answers every queued call the way a real worker would.
    pub fn serve(&mut self) -> usize {
        let calls = self.receive();
        let count = calls.len();
        for call in calls {
            self.answer(call);
        }
        count
    }

    pub fn answer(&mut self, received: ReceivedCall) {
        let ReceivedCall {
            message_id, call, ..
        } = received;
        match call {
            MethodCall::Init {
                render_id,
                source_url,
                size,
                ..
            } => {
                let source = self.source(&source_url);
                self.contexts.insert(render_id, (source, size));
                self.inited(message_id, source);
                self.respond(message_id, Reply::Ack);
            }
            MethodCall::ChangeData {
                render_id,
                source_url,
                ..
            } => {
                let source = self.source(&source_url);
                let size = self.contexts.get(&render_id).map(|(_, size)| *size).unwrap();
                self.contexts.insert(render_id, (source, size));
                self.inited(message_id, source);
                self.respond(message_id, Reply::Ack);
            }
            MethodCall::RenderFrames { start_index, .. } if self.reject_renders > 0 => {
                self.reject_renders -= 1;
                self.post(FromWorker::MethodResponse {
                    message_id,
                    result: Err(RemoteError::new(format!("cannot render frame {}", start_index))),
                });
            }
            MethodCall::RenderFrames {
                render_id,
                start_index,
            } => {
                let (source, size) = *self.contexts.get(&render_id).unwrap();
                let end = (start_index + self.prefetch).min(source.frames_count);
                for index in start_index..end {
                    self.frame(message_id, index, size, source.blue);
                }
                self.respond(
                    message_id,
                    Reply::Rendered {
                        frames: end - start_index,
                    },
                );
            }
            MethodCall::SetColor { .. } => self.respond(message_id, Reply::Ack),
            MethodCall::Destroy { render_id } => {
                self.contexts.remove(&render_id);
                self.respond(message_id, Reply::Ack);
            }
        }
    }

    fn source(&self, url: &str) -> ScriptedSource {
        *self
            .sources
            .get(url)
            .unwrap_or_else(|| panic!("unknown scripted source {}", url))
    }

    pub fn inited(&self, message_id: MessageId, source: ScriptedSource) {
        self.post(FromWorker::MethodCallback {
            message_id,
            args: CallbackArgs::Inited(TimingInfo {
                reduce_factor: source.reduce_factor,
                ms_per_frame: (FRAME_MS * source.reduce_factor as u64) as f64,
                frames_count: source.frames_count,
            }),
        });
    }

    pub fn frame(&self, message_id: MessageId, index: usize, size: u32, blue: u8) {
        let bitmap = paint(index, size, Some(Rgb(0, 0, blue))).unwrap();
        self.post(FromWorker::MethodCallback {
            message_id,
            args: CallbackArgs::Frame { index, bitmap },
        });
    }

    pub fn respond(&self, message_id: MessageId, reply: Reply) {
        self.post(FromWorker::MethodResponse {
            message_id,
            result: Ok(reply),
        });
    }

    pub fn post(&self, payload: FromWorker) {
        self.port
            .post(Envelope::single(MEDIA_CHANNEL, payload))
            .unwrap();
    }

    pub fn count(&self, name: &str) -> usize {
        self.log.iter().filter(|c| c.call.name() == name).count()
    }

    pub fn render_requests(&self) -> Vec<usize> {
        self.log
            .iter()
            .filter_map(|c| match c.call {
                MethodCall::RenderFrames { start_index, .. } => Some(start_index),
                _ => None,
            })
            .collect()
    }
}

/// Engine on one scripted worker with a manual clock.
pub struct Harness {
    pub engine: Engine,
    pub worker: ScriptedWorker,
    pub now: Instant,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        init_tracing();
        let scheduler = Scheduler::new();
        let (main, worker) = port::channel();
        let pool = WorkerPool::from_ports(vec![main], scheduler.clone());
        Self {
            engine: Engine::with_pool(config, pool, scheduler),
            worker: ScriptedWorker::new(worker),
            now: Instant::now(),
        }
    }

    pub fn source(mut self, url: &str, frames_count: usize, blue: u8) -> Self {
        self.worker.add_source(url, frames_count, blue);
        self
    }

    pub fn reduced_source(mut self, url: &str, frames_count: usize, blue: u8, reduce_factor: u32) -> Self {
        self.worker.add_reduced_source(url, frames_count, blue, reduce_factor);
        self
    }

    pub fn init(&mut self, request: AnimationRequest) -> Animation {
        let animation = self.engine.init(request).unwrap();
        self.engine.end_turn();
        animation
    }

    /// One host redraw, one frame duration after the previous one.
    pub fn step(&mut self) -> FrameStats {
        self.now += Duration::from_millis(FRAME_MS);
        self.engine.run_frame(self.now).unwrap()
    }

    /// Flush, let the worker answer, then redraw.
    pub fn cycle(&mut self) -> FrameStats {
        self.engine.end_turn();
        self.worker.serve();
        self.step()
    }

    pub fn cycles(&mut self, n: usize) {
        for _ in 0..n {
            self.cycle();
        }
    }

    /// Cycles until `done` holds. Returns the number of cycles run.
    pub fn cycle_until(&mut self, max: usize, mut done: impl FnMut(&Self) -> bool) -> usize {
        for n in 0..max {
            if done(self) {
                return n;
            }
            self.cycle();
        }
        assert!(done(self), "condition not reached within {} cycles", max);
        max
    }
}

/// Placeholder frame shown at `(x, y)`, if any.
pub fn shown_frame(canvas: &Canvas, x: u32, y: u32) -> Option<usize> {
    canvas.pixel(x, y).and_then(frame_index_of)
}

/// Blue channel at `(x, y)`.
pub fn shown_blue(canvas: &Canvas, x: u32, y: u32) -> Option<u8> {
    canvas.pixel(x, y).map(|rgba| rgba[2])
}
