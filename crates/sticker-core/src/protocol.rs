use crate::types::{MessageId, RenderId, Rgb};
use std::fmt;
use thiserror::Error;
use tiny_skia::Pixmap;

/// Channel tag of the animation workers.
pub const MEDIA_CHANNEL: &str = "media";

/// Batch of payloads posted in one turn.
#[derive(Debug)]
pub struct Envelope<P> {
    pub channel: String,
    pub payloads: Vec<P>,
}

impl<P> Envelope<P> {
    pub fn new(channel: impl Into<String>, payloads: Vec<P>) -> Self {
        Self {
            channel: channel.into(),
            payloads,
        }
    }

    pub fn single(channel: impl Into<String>, payload: P) -> Self {
        Self::new(channel, vec![payload])
    }
}

/// Remote methods of the media worker.
#[derive(Debug, Clone, PartialEq)]
pub enum MethodCall {
    /// Creates a decode context. Answers with an `Inited` callback.
    Init {
        render_id: RenderId,
        source_url: String,
        size: u32,
        is_low_priority: bool,
        custom_color: Option<Rgb>,
    },
    /// Swaps the source of an existing context. Answers with an `Inited` callback.
    ChangeData {
        render_id: RenderId,
        source_url: String,
        is_low_priority: bool,
    },
    /// Renders forward from `start_index`, one `Frame` callback per frame.
    RenderFrames {
        render_id: RenderId,
        start_index: usize,
    },
    /// Updates the tint of later frames.
    SetColor {
        render_id: RenderId,
        custom_color: Option<Rgb>,
    },
    Destroy {
        render_id: RenderId,
    },
}

impl MethodCall {
    pub fn name(&self) -> &'static str {
        match self {
            MethodCall::Init { .. } => "init",
            MethodCall::ChangeData { .. } => "changeData",
            MethodCall::RenderFrames { .. } => "renderFrames",
            MethodCall::SetColor { .. } => "setColor",
            MethodCall::Destroy { .. } => "destroy",
        }
    }

    pub fn render_id(&self) -> &RenderId {
        match self {
            MethodCall::Init { render_id, .. }
            | MethodCall::ChangeData { render_id, .. }
            | MethodCall::RenderFrames { render_id, .. }
            | MethodCall::SetColor { render_id, .. }
            | MethodCall::Destroy { render_id } => render_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ToWorker {
    CallMethod {
        message_id: MessageId,
        call: MethodCall,
        with_callback: bool,
    },
    /// Stops callbacks of a pending request.
    CancelProgress { message_id: MessageId },
}

/// Playback timing of a decode context, derived on the worker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimingInfo {
    pub reduce_factor: u32,
    pub ms_per_frame: f64,
    pub frames_count: usize,
}

pub enum CallbackArgs {
    Inited(TimingInfo),
    Frame { index: usize, bitmap: Pixmap },
}

impl fmt::Debug for CallbackArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallbackArgs::Inited(timing) => f.debug_tuple("Inited").field(timing).finish(),
            CallbackArgs::Frame { index, bitmap } => f
                .debug_struct("Frame")
                .field("index", index)
                .field("width", &bitmap.width())
                .field("height", &bitmap.height())
                .finish(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Ack,
    Rendered { frames: usize },
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct RemoteError {
    pub message: String,
}

impl RemoteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WorkerUpdate {
    Ready { index: usize },
}

#[derive(Debug)]
pub enum FromWorker {
    Update(WorkerUpdate),
    MethodResponse {
        message_id: MessageId,
        result: Result<Reply, RemoteError>,
    },
    MethodCallback {
        message_id: MessageId,
        args: CallbackArgs,
    },
    /// Error raised outside of any request handler.
    UnhandledError { message: String },
}
