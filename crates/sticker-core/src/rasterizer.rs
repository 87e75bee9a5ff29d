use crate::types::Rgb;
use anyhow::{anyhow, Result};
use lottie_data::LottieJson;
use tiny_skia::{Color, Pixmap};

/// Frame decode service owned by one worker decode context.
///
/// `render` receives native document frame numbers; reduced-rate playback
/// skips frames before calling it.
pub trait FrameRasterizer: Send {
    /// Prepares the rasterizer for `document` at `size`x`size` pixels.
    fn load(&mut self, document: &LottieJson, size: u32, tint: Option<Rgb>) -> Result<()>;

    fn set_tint(&mut self, tint: Option<Rgb>);

    fn render(&mut self, frame: usize) -> Result<Pixmap>;
}

/// Creates one rasterizer per decode context. Shared by all workers.
pub trait RasterizerFactory: Send + Sync {
    fn create(&self) -> Box<dyn FrameRasterizer>;
}

/// Blue channel of placeholder frames without a tint.
pub const PLACEHOLDER_BLUE: u8 = 0x80;

/// Deterministic stand-in that paints each frame in a colour encoding its number.
///
/// Red carries the low byte of the frame number, green the high byte, blue the
/// tint (or [`PLACEHOLDER_BLUE`]).
#[derive(Default)]
pub struct PlaceholderRasterizer {
    size: u32,
    total_frames: usize,
    tint: Option<Rgb>,
}

impl PlaceholderRasterizer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FrameRasterizer for PlaceholderRasterizer {
    fn load(&mut self, document: &LottieJson, size: u32, tint: Option<Rgb>) -> Result<()> {
        if size == 0 {
            return Err(anyhow!("cannot rasterize at size 0"));
        }
        self.size = size;
        self.total_frames = document.total_frames() as usize;
        self.tint = tint;
        Ok(())
    }

    fn set_tint(&mut self, tint: Option<Rgb>) {
        self.tint = tint;
    }

    fn render(&mut self, frame: usize) -> Result<Pixmap> {
        if frame >= self.total_frames {
            return Err(anyhow!("frame {} out of range (0..{})", frame, self.total_frames));
        }
        paint(frame, self.size, self.tint)
    }
}

pub struct PlaceholderFactory;

impl RasterizerFactory for PlaceholderFactory {
    fn create(&self) -> Box<dyn FrameRasterizer> {
        Box::new(PlaceholderRasterizer::new())
    }
}

/// Solid placeholder bitmap of `frame`.
pub fn paint(frame: usize, size: u32, tint: Option<Rgb>) -> Result<Pixmap> {
    let mut pixmap = Pixmap::new(size, size).ok_or_else(|| anyhow!("invalid frame size {}", size))?;
    let blue = tint.map(|Rgb(_, _, b)| b).unwrap_or(PLACEHOLDER_BLUE);
    pixmap.fill(Color::from_rgba8(
        (frame & 0xff) as u8,
        ((frame >> 8) & 0xff) as u8,
        blue,
        255,
    ));
    Ok(pixmap)
}

/// Frame number encoded in an opaque placeholder pixel.
pub fn frame_index_of(rgba: [u8; 4]) -> Option<usize> {
    if rgba[3] != 255 {
        return None;
    }
    Some(rgba[0] as usize | (rgba[1] as usize) << 8)
}
