use crate::config::EngineConfig;
use crate::port::WorkerPort;
use crate::protocol::{
    CallbackArgs, Envelope, FromWorker, MethodCall, RemoteError, Reply, TimingInfo, ToWorker, WorkerUpdate,
    MEDIA_CHANNEL,
};
use crate::rasterizer::{FrameRasterizer, RasterizerFactory};
use crate::types::{MessageId, RenderId, Rgb};
use crate::SourceLoader;
use anyhow::{anyhow, Context, Result};
use lottie_data::{decode_payload, LottieJson};
use std::any::Any;
use std::collections::{HashMap, HashSet, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, instrument, warn};

/// Worker-side settings.
#[derive(Debug, Clone, Copy)]
pub struct WorkerOptions {
    pub prefetch_frames: usize,
    pub normal_fps: u32,
    pub low_priority_fps: u32,
}

impl From<&EngineConfig> for WorkerOptions {
    fn from(config: &EngineConfig) -> Self {
        Self {
            prefetch_frames: config.prefetch_frames,
            normal_fps: config.normal_fps,
            low_priority_fps: config.low_priority_fps,
        }
    }
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

/// Derives playback timing of `document` reduced towards `target_fps`.
///
/// Frame rates that are an exact multiple of the target skip frames
/// (`reduce_factor > 1`); any other rate plays every frame.
pub fn derive_timing(document: &LottieJson, target_fps: u32) -> Result<TimingInfo> {
    let frames = document.total_frames();
    if frames == 0 {
        return Err(anyhow!("animation has no frames"));
    }
    let fps = document.frame_rate();
    let whole_fps = fps as u32;
    let reduce_factor = if target_fps > 0
        && fps.fract() == 0.0
        && whole_fps > target_fps
        && whole_fps % target_fps == 0
    {
        whole_fps / target_fps
    } else {
        1
    };
    Ok(TimingInfo {
        reduce_factor,
        ms_per_frame: 1000.0 / (fps as f64 / reduce_factor as f64),
        frames_count: frames.div_ceil(reduce_factor) as usize,
    })
}

struct RenderContext {
    rasterizer: Box<dyn FrameRasterizer>,
    timing: TimingInfo,
    size: u32,
    tint: Option<Rgb>,
}

/// Worker-thread side of the `media` channel.
///
/// Owns one decode context per render id and handles payloads one at a time,
/// in arrival order.
pub struct MediaWorker {
    index: usize,
    port: WorkerPort,
    loader: Arc<dyn SourceLoader>,
    factory: Arc<dyn RasterizerFactory>,
    options: WorkerOptions,
    renderers: HashMap<RenderId, RenderContext>,
    canceled: HashSet<MessageId>,
    backlog: VecDeque<QueuedCall>,
    current: Option<MessageId>,
}

struct QueuedCall {
    message_id: MessageId,
    call: MethodCall,
    with_callback: bool,
}

/// Starts a worker on a named thread.
pub fn spawn(
    index: usize,
    port: WorkerPort,
    loader: Arc<dyn SourceLoader>,
    factory: Arc<dyn RasterizerFactory>,
    options: WorkerOptions,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("sticker-worker-{}", index))
        .spawn(move || MediaWorker::new(index, port, loader, factory, options).run())
}

impl MediaWorker {
    pub fn new(
        index: usize,
        port: WorkerPort,
        loader: Arc<dyn SourceLoader>,
        factory: Arc<dyn RasterizerFactory>,
        options: WorkerOptions,
    ) -> Self {
        Self {
            index,
            port,
            loader,
            factory,
            options,
            renderers: HashMap::new(),
            canceled: HashSet::new(),
            backlog: VecDeque::new(),
            current: None,
        }
    }

    /// Serves the port until the main side hangs up.
    pub fn run(mut self) {
        info!(worker = self.index, "Worker started");
        if !self.send(FromWorker::Update(WorkerUpdate::Ready { index: self.index })) {
            return;
        }
        loop {
            let queued = match self.backlog.pop_front() {
                Some(queued) => queued,
                None => match self.port.recv() {
                    Ok(envelope) => {
                        self.absorb(envelope);
                        continue;
                    }
                    Err(_) => break,
                },
            };
            if !self.handle(queued) {
                break;
            }
        }
        info!(worker = self.index, contexts = self.renderers.len(), "Worker stopped");
    }

    /// Queues the calls of `envelope` and applies its cancellations right away.
    fn absorb(&mut self, envelope: Envelope<ToWorker>) {
        if envelope.channel != MEDIA_CHANNEL {
            debug!(worker = self.index, channel = %envelope.channel, "ignoring envelope");
            return;
        }
        for payload in envelope.payloads {
            match payload {
                ToWorker::CallMethod {
                    message_id,
                    call,
                    with_callback,
                } => self.backlog.push_back(QueuedCall {
                    message_id,
                    call,
                    with_callback,
                }),
                ToWorker::CancelProgress { message_id } => {
                    let known = self.current == Some(message_id)
                        || self.backlog.iter().any(|queued| queued.message_id == message_id);
                    if known {
                        self.canceled.insert(message_id);
                    }
                }
            }
        }
    }

    fn handle(&mut self, queued: QueuedCall) -> bool {
        let QueuedCall {
            message_id,
            call,
            with_callback,
        } = queued;
        self.current = Some(message_id);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.call_method(message_id, call, with_callback)
        }));
        self.current = None;
        self.canceled.remove(&message_id);
        let message = match outcome {
            Ok(result) => FromWorker::MethodResponse {
                message_id,
                result: result.map_err(|e| RemoteError::new(format!("{:#}", e))),
            },
            Err(panic) => FromWorker::UnhandledError {
                message: panic_message(panic),
            },
        };
        self.send(message)
    }

    #[instrument(level = "debug", skip(self), fields(worker = self.index))]
    fn call_method(&mut self, message_id: MessageId, call: MethodCall, with_callback: bool) -> Result<Reply> {
        match call {
            MethodCall::Init {
                render_id,
                source_url,
                size,
                is_low_priority,
                custom_color,
            } => {
                let context = self.load_context(&source_url, size, is_low_priority, custom_color)?;
                let timing = context.timing;
                if self.renderers.insert(render_id.clone(), context).is_some() {
                    warn!(%render_id, "Replacing existing decode context");
                }
                self.callback(message_id, with_callback, CallbackArgs::Inited(timing));
                Ok(Reply::Ack)
            }
            MethodCall::ChangeData {
                render_id,
                source_url,
                is_low_priority,
            } => {
                let (size, tint) = self
                    .renderers
                    .get(&render_id)
                    .map(|c| (c.size, c.tint))
                    .ok_or_else(|| anyhow!("unknown render id {}", render_id))?;
                let context = self.load_context(&source_url, size, is_low_priority, tint)?;
                let timing = context.timing;
                self.renderers.insert(render_id, context);
                self.callback(message_id, with_callback, CallbackArgs::Inited(timing));
                Ok(Reply::Ack)
            }
            MethodCall::RenderFrames {
                render_id,
                start_index,
            } => self.render_frames(message_id, with_callback, &render_id, start_index),
            MethodCall::SetColor {
                render_id,
                custom_color,
            } => {
                let context = self
                    .renderers
                    .get_mut(&render_id)
                    .ok_or_else(|| anyhow!("unknown render id {}", render_id))?;
                context.tint = custom_color;
                context.rasterizer.set_tint(custom_color);
                Ok(Reply::Ack)
            }
            MethodCall::Destroy { render_id } => {
                if self.renderers.remove(&render_id).is_none() {
                    debug!(%render_id, "destroy of unknown render id");
                }
                Ok(Reply::Ack)
            }
        }
    }

    fn load_context(
        &self,
        source_url: &str,
        size: u32,
        is_low_priority: bool,
        tint: Option<Rgb>,
    ) -> Result<RenderContext> {
        let bytes = self.loader.load_bytes(source_url)?;
        let document = decode_payload(&bytes).with_context(|| format!("failed to decode {}", source_url))?;
        let target_fps = if is_low_priority {
            self.options.low_priority_fps
        } else {
            self.options.normal_fps
        };
        let timing = derive_timing(&document, target_fps)?;
        let mut rasterizer = self.factory.create();
        rasterizer.load(&document, size, tint)?;
        debug!(
            worker = self.index,
            source_url,
            frames = timing.frames_count,
            reduce_factor = timing.reduce_factor,
            "decode context ready"
        );
        Ok(RenderContext {
            rasterizer,
            timing,
            size,
            tint,
        })
    }

    fn render_frames(
        &mut self,
        message_id: MessageId,
        with_callback: bool,
        render_id: &RenderId,
        start_index: usize,
    ) -> Result<Reply> {
        let timing = self
            .renderers
            .get(render_id)
            .map(|context| context.timing)
            .ok_or_else(|| anyhow!("unknown render id {}", render_id))?;
        let frames_count = timing.frames_count;
        if start_index >= frames_count {
            return Err(anyhow!("frame {} out of range (0..{})", start_index, frames_count));
        }
        let reduce_factor = timing.reduce_factor as usize;
        let end = (start_index + self.options.prefetch_frames.max(1)).min(frames_count);

        let mut rendered = 0;
        for index in start_index..end {
            if self.canceled.contains(&message_id) {
                debug!(message_id, rendered, "render canceled");
                break;
            }
            let context = self
                .renderers
                .get_mut(render_id)
                .ok_or_else(|| anyhow!("decode context {} dropped", render_id))?;
            let bitmap = context.rasterizer.render(index * reduce_factor)?;
            if with_callback {
                let envelope = Envelope::single(
                    MEDIA_CHANNEL,
                    FromWorker::MethodCallback {
                        message_id,
                        args: CallbackArgs::Frame { index, bitmap },
                    },
                );
                self.port.post(envelope).map_err(|_| anyhow!("port closed"))?;
            }
            rendered += 1;
            while let Ok(envelope) = self.port.try_recv() {
                self.absorb(envelope);
            }
        }
        Ok(Reply::Rendered { frames: rendered })
    }

    fn callback(&self, message_id: MessageId, with_callback: bool, args: CallbackArgs) {
        if with_callback && !self.canceled.contains(&message_id) {
            self.send(FromWorker::MethodCallback { message_id, args });
        }
    }

    fn send(&self, payload: FromWorker) -> bool {
        self.port.post(Envelope::single(MEDIA_CHANNEL, payload)).is_ok()
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "worker panicked".to_string()
    }
}
