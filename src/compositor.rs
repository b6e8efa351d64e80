//! Frame compositing
//!
//! A real-time loop that draws the current screen frame onto the output
//! surface and, when enabled, overlays the camera as a positioned,
//! bordered picture-in-picture. The loop is a repeating task bound to an
//! explicit cancellable handle: it draws while recording, holds while
//! paused, and terminates for any other status.

use crate::capture::stream::{FrameHandle, VideoFrame};
use crate::recorder::state::RecordingStatus;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

/// Corner the face overlay is anchored to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverlayAnchor {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

/// Clip shape for the face overlay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlayShape {
    Circle,
    Rectangle,
}

/// Compositor configuration, frozen for the duration of a session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositorConfig {
    /// Whether the face overlay is drawn at all
    pub face_enabled: bool,

    /// Overlay corner
    pub face_anchor: OverlayAnchor,

    /// Overlay size as a fraction of output width
    pub face_size_ratio: f64,

    /// Overlay clip shape
    pub face_shape: OverlayShape,

    /// Distance from the anchored edges, in pixels
    pub margin: u32,

    /// Output surface width
    pub output_width: u32,

    /// Output surface height
    pub output_height: u32,

    /// Composite frame rate (display-refresh stand-in)
    pub frame_rate: u32,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            face_enabled: true,
            face_anchor: OverlayAnchor::BottomRight,
            face_size_ratio: 0.125,
            face_shape: OverlayShape::Circle,
            margin: 20,
            output_width: 1920,
            output_height: 1080,
            frame_rate: 30,
        }
    }
}

/// Overlay placement in output coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Compute the overlay rectangle from anchor and size ratio.
///
/// Circle overlays use a square region; rectangle overlays keep the
/// camera frame's aspect ratio.
pub fn overlay_rect(config: &CompositorConfig, camera_aspect: f64) -> OverlayRect {
    let width = ((config.output_width as f64 * config.face_size_ratio) as u32).max(1);
    let height = match config.face_shape {
        OverlayShape::Circle => width,
        OverlayShape::Rectangle => ((width as f64 / camera_aspect.max(0.01)) as u32).max(1),
    };
    let width = width.min(config.output_width);
    let height = height.min(config.output_height);

    let (x, y) = match config.face_anchor {
        OverlayAnchor::TopLeft => (config.margin, config.margin),
        OverlayAnchor::TopRight => (
            config.output_width.saturating_sub(width + config.margin),
            config.margin,
        ),
        OverlayAnchor::BottomLeft => (
            config.margin,
            config.output_height.saturating_sub(height + config.margin),
        ),
        OverlayAnchor::BottomRight => (
            config.output_width.saturating_sub(width + config.margin),
            config.output_height.saturating_sub(height + config.margin),
        ),
    };

    OverlayRect {
        x,
        y,
        width,
        height,
    }
}

/// Plate padding around the overlay, in pixels
const PLATE_PAD: u32 = 6;
/// Plate opacity (0-255)
const PLATE_ALPHA: u32 = 102;

/// Compose one output frame: screen scaled to full extent, then the
/// camera overlay when present.
pub fn compose(
    config: &CompositorConfig,
    screen: &VideoFrame,
    camera: Option<&VideoFrame>,
    timestamp_ms: f64,
) -> VideoFrame {
    let width = config.output_width;
    let height = config.output_height;
    let mut surface = vec![0u8; (width * height * 4) as usize];

    blit_scaled(screen, &mut surface, width, height);

    if let Some(cam) = camera {
        let aspect = cam.width as f64 / cam.height.max(1) as f64;
        let rect = overlay_rect(config, aspect);
        draw_plate(&mut surface, width, height, rect, config.face_shape);
        draw_overlay(&mut surface, width, height, cam, rect, config.face_shape);
    }

    VideoFrame::packed(surface, width, height, timestamp_ms)
}

/// Nearest-neighbor scale of the source frame over the whole surface
fn blit_scaled(src: &VideoFrame, dst: &mut [u8], dst_w: u32, dst_h: u32) {
    if src.width == 0 || src.height == 0 {
        return;
    }
    for y in 0..dst_h {
        let sy = (y as u64 * src.height as u64 / dst_h as u64) as u32;
        for x in 0..dst_w {
            let sx = (x as u64 * src.width as u64 / dst_w as u64) as u32;
            let si = (sy * src.bytes_per_row + sx * 4) as usize;
            let di = ((y * dst_w + x) * 4) as usize;
            if si + 4 <= src.data.len() {
                dst[di..di + 4].copy_from_slice(&src.data[si..si + 4]);
            }
        }
    }
}

/// Translucent backing plate, slightly larger than the overlay
fn draw_plate(dst: &mut [u8], dst_w: u32, dst_h: u32, rect: OverlayRect, shape: OverlayShape) {
    let x0 = rect.x.saturating_sub(PLATE_PAD);
    let y0 = rect.y.saturating_sub(PLATE_PAD);
    let x1 = (rect.x + rect.width + PLATE_PAD).min(dst_w);
    let y1 = (rect.y + rect.height + PLATE_PAD).min(dst_h);

    let cx = (rect.x as f64) + rect.width as f64 / 2.0;
    let cy = (rect.y as f64) + rect.height as f64 / 2.0;
    let radius = rect.width.min(rect.height) as f64 / 2.0 + PLATE_PAD as f64;

    for y in y0..y1 {
        for x in x0..x1 {
            if shape == OverlayShape::Circle {
                let dx = x as f64 + 0.5 - cx;
                let dy = y as f64 + 0.5 - cy;
                if dx * dx + dy * dy > radius * radius {
                    continue;
                }
            }
            let i = ((y * dst_w + x) * 4) as usize;
            // Blend towards black at PLATE_ALPHA
            for c in 0..3 {
                let v = dst[i + c] as u32;
                dst[i + c] = (v * (255 - PLATE_ALPHA) / 255) as u8;
            }
        }
    }
}

/// Draw the camera frame into the overlay rect, cover-fit and clipped
fn draw_overlay(
    dst: &mut [u8],
    dst_w: u32,
    dst_h: u32,
    cam: &VideoFrame,
    rect: OverlayRect,
    shape: OverlayShape,
) {
    if cam.width == 0 || cam.height == 0 || rect.width == 0 || rect.height == 0 {
        return;
    }

    // Cover fit: scale so the camera fills the rect, center-cropping excess
    let scale = (rect.width as f64 / cam.width as f64).max(rect.height as f64 / cam.height as f64);
    let crop_w = rect.width as f64 / scale;
    let crop_h = rect.height as f64 / scale;
    let crop_x = (cam.width as f64 - crop_w) / 2.0;
    let crop_y = (cam.height as f64 - crop_h) / 2.0;

    let cx = rect.width as f64 / 2.0;
    let cy = rect.height as f64 / 2.0;
    let radius = rect.width.min(rect.height) as f64 / 2.0;

    for y in 0..rect.height {
        let oy = rect.y + y;
        if oy >= dst_h {
            break;
        }
        for x in 0..rect.width {
            let ox = rect.x + x;
            if ox >= dst_w {
                break;
            }
            if shape == OverlayShape::Circle {
                let dx = x as f64 + 0.5 - cx;
                let dy = y as f64 + 0.5 - cy;
                if dx * dx + dy * dy > radius * radius {
                    continue;
                }
            }
            let sx = (crop_x + x as f64 * crop_w / rect.width as f64) as u32;
            let sy = (crop_y + y as f64 * crop_h / rect.height as f64) as u32;
            let sx = sx.min(cam.width - 1);
            let sy = sy.min(cam.height - 1);
            let si = (sy * cam.bytes_per_row + sx * 4) as usize;
            let di = ((oy * dst_w + ox) * 4) as usize;
            if si + 4 <= cam.data.len() {
                dst[di..di + 4].copy_from_slice(&cam.data[si..si + 4]);
            }
        }
    }
}

/// Real-time compositor for one session
pub struct FrameCompositor {
    config: CompositorConfig,
    screen: FrameHandle,
    camera: Option<FrameHandle>,
    frames_tx: broadcast::Sender<Arc<VideoFrame>>,
    current_tx: watch::Sender<Option<Arc<VideoFrame>>>,
    started: Instant,
}

impl FrameCompositor {
    pub fn new(config: CompositorConfig, screen: FrameHandle, camera: Option<FrameHandle>) -> Self {
        let (frames_tx, _) = broadcast::channel(8);
        let (current_tx, _) = watch::channel(None);
        Self {
            config,
            screen,
            camera,
            frames_tx,
            current_tx,
            started: Instant::now(),
        }
    }

    /// Feed of composited frames for the encoder
    pub fn frames(&self) -> broadcast::Receiver<Arc<VideoFrame>> {
        self.frames_tx.subscribe()
    }

    /// Most recent composited frame
    pub fn current_frame(&self) -> watch::Receiver<Option<Arc<VideoFrame>>> {
        self.current_tx.subscribe()
    }

    fn compose_once(&self) -> Option<VideoFrame> {
        // Screen frame not yet decodable: skip the draw, not an error
        let screen = self.screen.borrow().clone()?;
        let camera = if self.config.face_enabled {
            self.camera
                .as_ref()
                .and_then(|handle| handle.borrow().clone())
        } else {
            None
        };
        let timestamp_ms = self.started.elapsed().as_secs_f64() * 1000.0;
        Some(compose(
            &self.config,
            &screen,
            camera.as_deref(),
            timestamp_ms,
        ))
    }

    fn publish(&self, frame: VideoFrame) {
        let frame = Arc::new(frame);
        let _ = self.frames_tx.send(Arc::clone(&frame));
        self.current_tx.send_replace(Some(frame));
    }

    /// One synchronous draw before the encoder starts, so the first
    /// encoded frame is never blank.
    pub fn prime(&self) {
        if let Some(frame) = self.compose_once() {
            self.publish(frame);
        }
    }

    /// Start the repeating draw loop. Consuming `self` makes a second
    /// schedule of the same compositor impossible.
    pub fn start(self, status: watch::Receiver<RecordingStatus>) -> CompositorHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let running = Arc::new(AtomicBool::new(true));
        let interval_ms = (1000.0 / self.config.frame_rate.max(1) as f64) as u64;

        let task = {
            let cancelled = Arc::clone(&cancelled);
            let running = Arc::clone(&running);
            tokio::spawn(async move {
                let mut ticker =
                    tokio::time::interval(std::time::Duration::from_millis(interval_ms.max(1)));
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    ticker.tick().await;
                    if cancelled.load(Ordering::SeqCst) {
                        break;
                    }
                    match *status.borrow() {
                        RecordingStatus::Recording => {
                            if let Some(frame) = self.compose_once() {
                                self.publish(frame);
                            }
                        }
                        // Compositing pauses with the session
                        RecordingStatus::Paused => {}
                        _ => break,
                    }
                }
                running.store(false, Ordering::SeqCst);
                tracing::debug!("Compositor loop terminated");
            })
        };

        CompositorHandle {
            cancelled,
            running,
            task: Mutex::new(Some(task)),
        }
    }
}

/// Cancellable handle over the running compositor loop
pub struct CompositorHandle {
    cancelled: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl CompositorHandle {
    /// Request termination. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Wait for the loop task to finish
    pub async fn stopped(&self) {
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(width: u32, height: u32) -> CompositorConfig {
        CompositorConfig {
            output_width: width,
            output_height: height,
            ..CompositorConfig::default()
        }
    }

    fn solid_frame(width: u32, height: u32, bgra: [u8; 4]) -> VideoFrame {
        let mut data = Vec::with_capacity((width * height * 4) as usize);
        for _ in 0..width * height {
            data.extend_from_slice(&bgra);
        }
        VideoFrame::packed(data, width, height, 0.0)
    }

    #[test]
    fn overlay_rect_anchors() {
        let mut cfg = config(1000, 500);
        cfg.face_size_ratio = 0.1;
        cfg.margin = 10;
        cfg.face_shape = OverlayShape::Circle;

        cfg.face_anchor = OverlayAnchor::TopLeft;
        assert_eq!(
            overlay_rect(&cfg, 1.0),
            OverlayRect {
                x: 10,
                y: 10,
                width: 100,
                height: 100
            }
        );

        cfg.face_anchor = OverlayAnchor::BottomRight;
        assert_eq!(
            overlay_rect(&cfg, 1.0),
            OverlayRect {
                x: 890,
                y: 390,
                width: 100,
                height: 100
            }
        );
    }

    #[test]
    fn rectangle_overlay_keeps_camera_aspect() {
        let mut cfg = config(1000, 1000);
        cfg.face_size_ratio = 0.2;
        cfg.face_shape = OverlayShape::Rectangle;
        let rect = overlay_rect(&cfg, 2.0);
        assert_eq!(rect.width, 200);
        assert_eq!(rect.height, 100);
    }

    #[test]
    fn compose_scales_screen_to_full_extent() {
        let mut cfg = config(8, 8);
        cfg.face_enabled = false;
        let screen = solid_frame(4, 4, [1, 2, 3, 255]);
        let out = compose(&cfg, &screen, None, 0.0);
        assert_eq!(out.width, 8);
        assert_eq!(out.height, 8);
        assert_eq!(&out.data[0..4], &[1, 2, 3, 255]);
        let last = out.data.len() - 4;
        assert_eq!(&out.data[last..], &[1, 2, 3, 255]);
    }

    #[test]
    fn compose_draws_camera_pixels_inside_overlay() {
        let mut cfg = config(100, 100);
        cfg.face_enabled = true;
        cfg.face_anchor = OverlayAnchor::TopLeft;
        cfg.face_size_ratio = 0.4;
        cfg.face_shape = OverlayShape::Rectangle;
        cfg.margin = 0;

        let screen = solid_frame(10, 10, [0, 0, 0, 255]);
        let camera = solid_frame(10, 10, [9, 9, 9, 255]);
        let out = compose(&cfg, &screen, Some(&camera), 0.0);

        // Center of the overlay carries camera pixels
        let i = ((20 * 100 + 20) * 4) as usize;
        assert_eq!(&out.data[i..i + 4], &[9, 9, 9, 255]);
        // Far corner is still screen
        let j = ((90 * 100 + 90) * 4) as usize;
        assert_eq!(&out.data[j..j + 4], &[0, 0, 0, 255]);
    }

    #[test]
    fn circle_clip_leaves_corners_untouched_by_camera() {
        let mut cfg = config(100, 100);
        cfg.face_enabled = true;
        cfg.face_anchor = OverlayAnchor::TopLeft;
        cfg.face_size_ratio = 0.5;
        cfg.face_shape = OverlayShape::Circle;
        cfg.margin = 0;

        let screen = solid_frame(10, 10, [7, 7, 7, 255]);
        let camera = solid_frame(10, 10, [200, 200, 200, 255]);
        let out = compose(&cfg, &screen, Some(&camera), 0.0);

        // The overlay rect corner lies outside the circle: plate-darkened
        // screen pixels, never camera pixels.
        let corner = &out.data[0..4];
        assert_ne!(corner, &[200, 200, 200, 255]);
        // Center of the circle is camera
        let c = ((25 * 100 + 25) * 4) as usize;
        assert_eq!(&out.data[c..c + 4], &[200, 200, 200, 255]);
    }
}
