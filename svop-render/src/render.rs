use ab_glyph::FontVec;
use anyhow::{ensure, Context, Result};
use bytemuck::{cast_slice, cast_slice_mut};
use std::cell::RefCell;
use std::collections::HashMap;
use std::time::Duration;
use svop_core::view::{NOTICE_COLOR, PASS_COLOR, TEXT_COLOR};
use svop_core::{ButtonLayout, ControlSignal, FrameView, GazePoint, InfoPanel, StimulusPoint};
use svop_timing::{HighPrecisionTimer, TickStats, Timer};
use tiny_skia::{
    Color, ColorU8, FilterQuality, Paint, PathBuilder, Pixmap, PixmapPaint, Rect, Stroke,
    Transform,
};
use tracing::{debug, warn};

use crate::text::TextCache;

const FONT_SIZE: f32 = 28.0;
const GAZE_RADIUS: f32 = 30.0;
const GAZE_STROKE: f32 = 4.0;
/// Stimulus image edge length as a multiple of the stimulus diameter.
const STIMULUS_SCALE: u32 = 5;
const INFO_OFFSET_X: f32 = 210.0;
const INFO_LINE_HEIGHT: f32 = 25.0;
const INSTRUCTION_LINE_HEIGHT: f32 = 30.0;

const BAR_COLOR: [u8; 4] = [50, 50, 50, 255];
const LABEL_COLOR: [u8; 4] = [0, 0, 0, 255];

/// Sidebar button fill per control, in `ControlSignal::ALL` order.
pub const BUTTON_COLORS: [[u8; 4]; 4] = [
    [100, 100, 100, 255],
    [255, 0, 0, 255],
    [0, 255, 0, 255],
    [150, 50, 50, 255],
];

fn button_color(signal: ControlSignal) -> [u8; 4] {
    match signal {
        ControlSignal::PauseToggle => BUTTON_COLORS[0],
        ControlSignal::Skip => BUTTON_COLORS[1],
        ControlSignal::Retry => BUTTON_COLORS[2],
        ControlSignal::Quit => BUTTON_COLORS[3],
    }
}

fn paint_for(color: [u8; 4]) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color(Color::from_rgba8(color[0], color[1], color[2], color[3]));
    paint
}

pub struct FrameStats {
    pub clear: Duration,
    pub draw: Duration,
    pub copy: Duration,
    pub total: Duration,
    pub dirty_count: usize,
}

/// Paints [`FrameView`]s onto an offscreen canvas and copies the changed
/// regions into the window's RGBA frame buffer.
pub struct SkiaRenderer {
    width: u32,
    height: u32,
    center: (f32, f32),

    text: Option<TextCache>,
    stimulus: Option<Pixmap>,
    buttons: ButtonLayout,

    canvas: Pixmap,
    dirty_regions: Vec<Rect>,
    first_frame: bool,

    component_timers: HashMap<&'static str, RefCell<HighPrecisionTimer>>,
    clear_buffer: Vec<u8>,
}

impl SkiaRenderer {
    /// Without a font every text element is skipped.
    pub fn new(width: u32, height: u32, font: Option<FontVec>) -> Result<Self> {
        let mut canvas = Pixmap::new(width, height).context("canvas size must be non-zero")?;
        canvas.fill(Color::BLACK);
        if font.is_none() {
            warn!("no font loaded, text will not be drawn");
        }

        Ok(SkiaRenderer {
            width,
            height,
            center: (width as f32 / 2.0, height as f32 / 2.0),
            text: font.map(TextCache::new),
            stimulus: None,
            buttons: ButtonLayout::new(width),
            canvas,
            dirty_regions: Vec::with_capacity(16),
            first_frame: true,
            component_timers: ["draw", "clear", "copy"]
                .iter()
                .map(|&k| (k, RefCell::new(HighPrecisionTimer::new())))
                .collect(),
            clear_buffer: Self::black_buffer(width, height),
        })
    }

    fn black_buffer(width: u32, height: u32) -> Vec<u8> {
        [0u8, 0, 0, 255]
            .into_iter()
            .cycle()
            .take((width * height * 4) as usize)
            .collect()
    }

    pub fn resize(&mut self, new_width: u32, new_height: u32) -> Result<()> {
        self.canvas = Pixmap::new(new_width, new_height).context("canvas size must be non-zero")?;
        self.canvas.fill(Color::BLACK);
        self.width = new_width;
        self.height = new_height;
        self.center = (new_width as f32 / 2.0, new_height as f32 / 2.0);
        self.buttons = ButtonLayout::new(new_width);
        self.clear_buffer = Self::black_buffer(new_width, new_height);
        self.dirty_regions.clear();
        self.first_frame = true;
        Ok(())
    }

    /// Installs the stimulus image from straight RGBA8 pixels, scaled to a
    /// square of `STIMULUS_SCALE` stimulus diameters.
    pub fn set_stimulus_image(&mut self, rgba: &[u8], width: u32, height: u32, diameter_px: i32) -> Result<()> {
        ensure!(
            rgba.len() == (width * height * 4) as usize,
            "stimulus image buffer does not match {}x{}",
            width,
            height
        );
        let mut source = Pixmap::new(width, height).context("stimulus image is empty")?;
        for (dst, px) in source.pixels_mut().iter_mut().zip(rgba.chunks_exact(4)) {
            *dst = ColorU8::from_rgba(px[0], px[1], px[2], px[3]).premultiply();
        }

        let side = (diameter_px.max(1) as u32) * STIMULUS_SCALE;
        let mut scaled = Pixmap::new(side, side).context("stimulus size must be non-zero")?;
        let paint = PixmapPaint {
            quality: FilterQuality::Bilinear,
            ..PixmapPaint::default()
        };
        scaled.draw_pixmap(
            0,
            0,
            source.as_ref(),
            &paint,
            Transform::from_scale(side as f32 / width as f32, side as f32 / height as f32),
            None,
        );
        debug!("stimulus image {}x{} scaled to {}x{}", width, height, side, side);
        self.stimulus = Some(scaled);
        Ok(())
    }

    pub fn buttons(&self) -> &ButtonLayout {
        &self.buttons
    }

    pub fn component_stats(&self, name: &str) -> Option<TickStats> {
        self.component_timers
            .get(name)
            .map(|t| t.borrow().tick_stats())
    }

    fn clear_dirty(&mut self, dirty: &[Rect]) {
        let stride = self.width as usize * 4;
        let canvas_data = self.canvas.data_mut();

        for rect in dirty {
            let (x0, y0, x1, y1) = Self::clamp_rect(rect, self.width, self.height);
            if x1 <= x0 || y1 <= y0 {
                continue;
            }
            let row_len = (x1 - x0) * 4;
            for y in y0..y1 {
                let off = y * stride + x0 * 4;
                canvas_data[off..off + row_len].copy_from_slice(&self.clear_buffer[off..off + row_len]);
            }
        }
    }

    fn copy_dirty_region(&self, dirty: &Rect, frame_buffer: &mut [u8]) {
        let (x0, y0, x1, y1) = Self::clamp_rect(dirty, self.width, self.height);
        if x1 <= x0 || y1 <= y0 {
            return;
        }
        let src: &[u32] = cast_slice(self.canvas.data());
        let dst: &mut [u32] = cast_slice_mut(frame_buffer);
        let stride = self.width as usize;
        for row in y0..y1 {
            let off = row * stride;
            dst[off + x0..off + x1].copy_from_slice(&src[off + x0..off + x1]);
        }
    }

    fn clamp_rect(rect: &Rect, width: u32, height: u32) -> (usize, usize, usize, usize) {
        (
            rect.x().floor().max(0.0).min(width as f32) as usize,
            rect.y().floor().max(0.0).min(height as f32) as usize,
            (rect.x() + rect.width()).ceil().max(0.0).min(width as f32) as usize,
            (rect.y() + rect.height()).ceil().max(0.0).min(height as f32) as usize,
        )
    }

    fn coalesce_dirty(rects: &mut Vec<Rect>) {
        rects.sort_by(|a, b| a.y().total_cmp(&b.y()).then(a.x().total_cmp(&b.x())));
        let mut out: Vec<Rect> = Vec::with_capacity(rects.len());
        for r in rects.drain(..) {
            if let Some(last) = out.last_mut() {
                let same_row = (r.y() - last.y()).abs() < 1.0 && (r.height() - last.height()).abs() < 1.0;
                let touching = r.x() <= last.x() + last.width() + 1.0;
                if same_row && touching {
                    let nx = last.x().min(r.x());
                    let nx2 = (last.x() + last.width()).max(r.x() + r.width());
                    if let Some(merged) = Rect::from_xywh(nx, last.y(), nx2 - nx, last.height()) {
                        *last = merged;
                        continue;
                    }
                }
            }
            out.push(r);
        }
        *rects = out;
    }

    fn mark_dirty(&mut self, x: f32, y: f32, w: f32, h: f32) {
        if let Some(rect) = Rect::from_xywh(x, y, w, h) {
            self.dirty_regions.push(rect);
        }
    }

    /// Paints `view` and presents it into `frame_buffer` (RGBA8, canvas-sized).
    pub fn render_frame<T: Timer>(
        &mut self,
        view: &FrameView,
        frame_buffer: &mut [u8],
        timer: &mut T,
    ) -> Result<FrameStats> {
        ensure!(
            frame_buffer.len() == self.clear_buffer.len(),
            "frame buffer is {} bytes, canvas needs {}",
            frame_buffer.len(),
            self.clear_buffer.len()
        );
        if self.first_frame {
            self.first_frame = false;
            self.canvas.fill(Color::BLACK);
            frame_buffer.copy_from_slice(&self.clear_buffer);
            self.dirty_regions.clear();
        }

        // 1) clear what the previous frame drew
        let old_dirty = std::mem::take(&mut self.dirty_regions);
        let t_clear = {
            let t = timer.now();
            self.clear_dirty(&old_dirty);
            timer.elapsed(t)
        };

        // 2) draw the new frame, collecting its dirty rects
        let t_draw = {
            let t = timer.now();
            self.draw_view(view);
            timer.elapsed(t)
        };

        // 3) present old and new regions
        let mut present_rects = old_dirty;
        present_rects.extend_from_slice(&self.dirty_regions);
        Self::coalesce_dirty(&mut present_rects);
        let t_copy = {
            let t = timer.now();
            for rect in &present_rects {
                self.copy_dirty_region(rect, frame_buffer);
            }
            timer.elapsed(t)
        };

        let total = t_clear + t_draw + t_copy;
        self.component_timers["draw"].borrow_mut().record_frame(t_draw);
        self.component_timers["clear"].borrow_mut().record_frame(t_clear);
        self.component_timers["copy"].borrow_mut().record_frame(t_copy);

        Ok(FrameStats {
            clear: t_clear,
            draw: t_draw,
            copy: t_copy,
            total,
            dirty_count: self.dirty_regions.len(),
        })
    }

    fn draw_view(&mut self, view: &FrameView) {
        match view {
            FrameView::Instructions { lines } => {
                for (i, line) in lines.iter().enumerate() {
                    let y = self.center.1 + i as f32 * INSTRUCTION_LINE_HEIGHT;
                    self.draw_text_centered_x(line, NOTICE_COLOR, self.center.0, y);
                }
            }
            FrameView::Presenting {
                stimulus,
                gaze,
                info,
                show_buttons,
            } => {
                if *show_buttons {
                    self.draw_sidebar();
                }
                self.draw_stimulus(stimulus);
                if let Some(g) = gaze {
                    self.draw_gaze(g);
                }
                self.draw_info(info);
            }
            FrameView::Banner(banner) => {
                self.draw_text_centered(banner.text(), banner.color(), self.center);
            }
            FrameView::Blank => {}
            FrameView::Complete { passed, judged } => {
                let summary = format!("Passed {passed}/{judged}");
                self.draw_text_centered("Test complete", TEXT_COLOR, self.center);
                self.draw_text_centered(
                    &summary,
                    TEXT_COLOR,
                    (self.center.0, self.center.1 + INSTRUCTION_LINE_HEIGHT * 1.5),
                );
            }
        }
    }

    fn draw_stimulus(&mut self, point: &StimulusPoint) {
        let Some(image) = self.stimulus.take() else {
            return;
        };
        let (cx, cy) = point.position();
        let x = (cx - image.width() as f32 * 0.5).floor();
        let y = (cy - image.height() as f32 * 0.5).floor();
        self.blit(&image, x, y);
        self.stimulus = Some(image);
    }

    fn draw_gaze(&mut self, gaze: &GazePoint) {
        let (x, y) = (gaze.x as f32, gaze.y as f32);
        let Some(path) = PathBuilder::from_circle(x, y, GAZE_RADIUS) else {
            return;
        };
        let stroke = Stroke {
            width: GAZE_STROKE,
            ..Stroke::default()
        };
        self.canvas
            .stroke_path(&path, &paint_for(PASS_COLOR), &stroke, Transform::identity(), None);
        let r = GAZE_RADIUS + GAZE_STROKE;
        self.mark_dirty(x - r, y - r, 2.0 * r, 2.0 * r);
    }

    fn draw_info(&mut self, info: &InfoPanel) {
        let x = self.width as f32 - INFO_OFFSET_X;
        for (i, line) in info.lines().iter().enumerate() {
            self.draw_text_at(line, TEXT_COLOR, x, 10.0 + i as f32 * INFO_LINE_HEIGHT);
        }
    }

    fn draw_sidebar(&mut self) {
        let layout = self.buttons.clone();
        self.fill_rect(layout.bar_x, 0.0, layout.bar_width, self.height as f32, BAR_COLOR);
        for b in &layout.buttons {
            self.fill_rect(b.x, b.y, b.width, b.height, button_color(b.signal));
            self.draw_text_at(b.signal.label(), LABEL_COLOR, b.x + 10.0, b.y + 8.0);
        }
    }

    fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32, color: [u8; 4]) {
        if let Some(rect) = Rect::from_xywh(x, y, w, h) {
            self.canvas
                .fill_rect(rect, &paint_for(color), Transform::identity(), None);
            self.dirty_regions.push(rect);
        }
    }

    fn draw_text_at(&mut self, text: &str, color: [u8; 4], x: f32, y: f32) {
        let Some(pm) = self.text.as_mut().and_then(|c| c.get_or_render(text, FONT_SIZE, color)) else {
            return;
        };
        self.blit(&pm, x.floor(), y.floor());
    }

    fn draw_text_centered_x(&mut self, text: &str, color: [u8; 4], cx: f32, y: f32) {
        let Some(pm) = self.text.as_mut().and_then(|c| c.get_or_render(text, FONT_SIZE, color)) else {
            return;
        };
        self.blit(&pm, (cx - pm.width() as f32 * 0.5).floor(), y.floor());
    }

    fn draw_text_centered(&mut self, text: &str, color: [u8; 4], center: (f32, f32)) {
        let Some(pm) = self.text.as_mut().and_then(|c| c.get_or_render(text, FONT_SIZE, color)) else {
            return;
        };
        let x = (center.0 - pm.width() as f32 * 0.5).floor();
        let y = (center.1 - pm.height() as f32 * 0.5).floor();
        self.blit(&pm, x, y);
    }

    /// Alpha-blends `pixmap` with its top-left corner at (x, y).
    fn blit(&mut self, pixmap: &Pixmap, x: f32, y: f32) {
        self.canvas.draw_pixmap(
            x as i32,
            y as i32,
            pixmap.as_ref(),
            &PixmapPaint::default(),
            Transform::identity(),
            None,
        );
        self.mark_dirty(x, y, pixmap.width() as f32, pixmap.height() as f32);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use svop_core::{Banner, Verdict};
    use svop_timing::ManualTimer;

    const W: u32 = 640;
    const H: u32 = 360;

    fn renderer() -> SkiaRenderer {
        SkiaRenderer::new(W, H, None).unwrap()
    }

    fn pixel(fb: &[u8], x: u32, y: u32) -> [u8; 4] {
        let i = ((y * W + x) * 4) as usize;
        [fb[i], fb[i + 1], fb[i + 2], fb[i + 3]]
    }

    fn presenting(gaze: Option<GazePoint>, show_buttons: bool) -> FrameView {
        FrameView::Presenting {
            stimulus: StimulusPoint::new(1, 200, 180),
            gaze,
            info: InfoPanel {
                stimulus: 1,
                total: 5,
                elapsed_s: 0.0,
                distance: None,
            },
            show_buttons,
        }
    }

    #[test]
    fn rejects_mismatched_frame_buffer() {
        let mut r = renderer();
        let mut fb = vec![0u8; 16];
        assert!(r.render_frame(&FrameView::Blank, &mut fb, &mut ManualTimer::new()).is_err());
    }

    #[test]
    fn stimulus_image_is_drawn_at_the_point() {
        let mut r = renderer();
        let red = [255u8, 0, 0, 255].repeat(4);
        r.set_stimulus_image(&red, 2, 2, 4).unwrap();

        let mut fb = vec![0u8; (W * H * 4) as usize];
        r.render_frame(&presenting(None, false), &mut fb, &mut ManualTimer::new())
            .unwrap();
        // 4 px diameter scales the image to a 20 px square centred on (200, 180)
        assert_eq!(pixel(&fb, 200, 180), [255, 0, 0, 255]);
        assert_eq!(pixel(&fb, 191, 171), [255, 0, 0, 255]);
        assert_eq!(pixel(&fb, 185, 165), [0, 0, 0, 255]);
    }

    #[test]
    fn previous_frame_is_cleared() {
        let mut r = renderer();
        let mut fb = vec![0u8; (W * H * 4) as usize];
        let mut timer = ManualTimer::new();
        r.render_frame(&presenting(None, true), &mut fb, &mut timer).unwrap();
        assert_eq!(pixel(&fb, W - 5, 5), BAR_COLOR);
        assert_eq!(pixel(&fb, W - 100, 160), BUTTON_COLORS[0]);

        let stats = r.render_frame(&FrameView::Blank, &mut fb, &mut timer).unwrap();
        assert_eq!(stats.dirty_count, 0);
        assert_eq!(pixel(&fb, W - 5, 5), [0, 0, 0, 255]);
        assert_eq!(pixel(&fb, W - 100, 160), [0, 0, 0, 255]);
    }

    #[test]
    fn gaze_ring_is_hollow() {
        let mut r = renderer();
        let mut fb = vec![0u8; (W * H * 4) as usize];
        let gaze = GazePoint { x: 400.0, y: 200.0 };
        r.render_frame(&presenting(Some(gaze), false), &mut fb, &mut ManualTimer::new())
            .unwrap();
        assert_eq!(pixel(&fb, 400, 200), [0, 0, 0, 255]);
        assert_eq!(pixel(&fb, 430, 200)[1], 255);
    }

    #[test]
    fn text_is_skipped_without_font() {
        let mut r = renderer();
        let mut fb = vec![0u8; (W * H * 4) as usize];
        let stats = r
            .render_frame(
                &FrameView::Banner(Banner::Verdict(Verdict::Pass)),
                &mut fb,
                &mut ManualTimer::new(),
            )
            .unwrap();
        assert_eq!(stats.dirty_count, 0);
        assert!(fb.chunks_exact(4).all(|p| p == [0, 0, 0, 255]));
        assert_eq!(r.component_stats("draw").map(|s| s.samples), Some(1));
    }
}
