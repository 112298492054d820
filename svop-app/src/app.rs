use anyhow::{Context, Result, anyhow};
use pixels::{Pixels, SurfaceTexture};
use std::path::PathBuf;
use std::sync::Arc;
use svop_core::geometry::{
    ScreenGeometry, SIDEBAR_WIDTH_PX, angular_to_pixel_diameter, convert_to_pixels, generate_points,
};
use svop_core::{
    ControlQueue, ControlSender, ControlSignal, GazeTracker, PointerHandle, PointerTracker,
    UdpGazeTracker,
};
use svop_render::{SkiaRenderer, load_font};
use svop_session::{FileResultSink, ResultSink, Session, SessionConfig, SessionEnd, SessionStatus};
use svop_timing::{HighPrecisionTimer, Timer};
use tracing::{error, info, warn};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{ElementState, MouseButton, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::Key,
    window::{Fullscreen, Window, WindowId},
};

use crate::cli::{Cli, TrackerChoice};

pub struct App {
    config: SessionConfig,
    font_path: PathBuf,
    tracker_data_dir: PathBuf,

    window: Option<Arc<Window>>,
    pixels: Option<Pixels<'static>>,
    renderer: Option<SkiaRenderer>,
    session: Option<Session<HighPrecisionTimer>>,
    tracker: Option<Box<dyn GazeTracker>>,
    pointer: Option<PointerHandle>,

    controls: ControlQueue,
    keyboard: ControlSender,
    buttons: ControlSender,
    cursor: (f32, f32),

    current_size: Option<PhysicalSize<u32>>,
    scale_factor: f64,
    refresh_rate: Option<f64>,

    failure: Option<anyhow::Error>,
    should_exit: bool,
}

impl App {
    pub fn new(cli: &Cli) -> Result<Self> {
        let config = cli.session_config()?;
        config.validate().context("invalid session configuration")?;

        let (tracker, pointer): (Box<dyn GazeTracker>, Option<PointerHandle>) = match cli.tracker {
            TrackerChoice::Pointer => {
                let (tracker, handle) = PointerTracker::new();
                (Box::new(tracker), Some(handle))
            }
            TrackerChoice::Udp(addr) => (Box::new(UdpGazeTracker::bind(addr)?), None),
        };
        info!("gaze tracker: {}", tracker.name());

        let (tx, controls) = ControlQueue::channel();

        Ok(Self {
            config,
            font_path: cli.font.clone(),
            tracker_data_dir: cli.tracker_data_dir.clone(),
            window: None,
            pixels: None,
            renderer: None,
            session: None,
            tracker: Some(tracker),
            pointer,
            controls,
            keyboard: tx.with_source("keyboard"),
            buttons: tx.with_source("buttons"),
            cursor: (0.0, 0.0),
            current_size: None,
            scale_factor: 1.0,
            refresh_rate: None,
            failure: None,
            should_exit: false,
        })
    }

    pub fn run(mut self) -> Result<()> {
        let event_loop = EventLoop::new()?;
        println!("=== SVOP VISUAL FIELD SCREENING ===");
        println!("Platform: {}", std::env::consts::OS);
        println!("Architecture: {}", std::env::consts::ARCH);
        println!("User: {}", self.config.sanitized_user_name());
        println!(
            "Stimulus: {} ({:.2} deg), {} points\n",
            self.config.stimulus_size.label(),
            self.config.stimulus_size.angular_diameter_deg(),
            self.config.stimulus_points
        );

        event_loop.run_app(&mut self)?;

        match self.failure.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn create_window_and_surface(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let primary_monitor = event_loop
            .primary_monitor()
            .or_else(|| event_loop.available_monitors().next())
            .ok_or_else(|| anyhow!("No monitor available"))?;

        self.refresh_rate = primary_monitor
            .refresh_rate_millihertz()
            .map(|rate| rate as f64 / 1000.0);

        let window_attributes = Window::default_attributes()
            .with_title("SVOP")
            .with_fullscreen(Some(Fullscreen::Borderless(Some(primary_monitor.clone()))))
            .with_resizable(false);

        let window = Arc::new(event_loop.create_window(window_attributes)?);
        let physical_size = window.inner_size();
        self.current_size = Some(physical_size);
        self.scale_factor = window.scale_factor();

        println!("Display Configuration:");
        println!("  Physical size: {}×{}", physical_size.width, physical_size.height);
        println!("  Scale factor: {:.2}", self.scale_factor);
        if let Some(refresh_rate) = self.refresh_rate {
            println!("  Refresh rate: {:.1} Hz", refresh_rate);
        }

        let surface_texture = SurfaceTexture::new(physical_size.width, physical_size.height, window.clone());
        self.pixels = Some(Pixels::new(physical_size.width, physical_size.height, surface_texture)?);

        let geometry = ScreenGeometry::from_physical(
            physical_size.width,
            physical_size.height,
            self.config.screen_width_cm,
            self.config.viewing_distance_cm,
        )?;
        let diameter_px = angular_to_pixel_diameter(
            self.config.stimulus_size.angular_diameter_deg(),
            self.config.viewing_distance_cm,
            geometry.pixels_per_cm,
        )?;
        println!(
            "  {:.2} px/cm, stimulus diameter {} px",
            geometry.pixels_per_cm, diameter_px
        );

        let stimulus = image::open(&self.config.stimulus_image)
            .with_context(|| format!("cannot open stimulus image {}", self.config.stimulus_image.display()))?
            .into_rgba8();

        let font = match load_font(&self.font_path) {
            Ok(font) => Some(font),
            Err(e) => {
                warn!("{e:#}");
                None
            }
        };
        let mut renderer = SkiaRenderer::new(physical_size.width, physical_size.height, font)?;
        let (iw, ih) = stimulus.dimensions();
        renderer.set_stimulus_image(stimulus.as_raw(), iw, ih, diameter_px)?;
        self.renderer = Some(renderer);

        let reserved = if self.config.show_buttons { SIDEBAR_WIDTH_PX } else { 0 };
        let points = convert_to_pixels(
            generate_points(self.config.stimulus_points)?,
            &geometry,
            diameter_px,
            reserved,
        );
        for p in &points {
            info!("stimulus {} at ({}, {})", p.index, p.x, p.y);
        }

        let tracker = self.tracker.as_mut().context("tracker already released")?;
        tracker.preview()?;
        tracker.calibrate(self.config.calibration_points)?;
        tracker.start_sampling()?;

        self.session = Some(Session::new(
            points,
            diameter_px,
            self.config.policy.clone(),
            self.config.show_buttons,
            HighPrecisionTimer::new(),
        ));

        window.set_cursor_visible(self.config.show_buttons);
        window.request_redraw();
        self.window = Some(window);

        Ok(())
    }

    /// One session tick: drain controls, evaluate, draw, then yield.
    fn tick(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let (Some(session), Some(tracker)) = (self.session.as_mut(), self.tracker.as_mut()) else {
            return Ok(());
        };

        let started = session.timer.now();
        let signals = self.controls.drain();
        let status = session.tick(&signals, tracker.as_mut());

        if let (Some(pix), Some(renderer)) = (self.pixels.as_mut(), self.renderer.as_mut()) {
            renderer.render_frame(&session.view(), pix.frame_mut(), &mut session.timer)?;
            pix.render()?;
        }
        let work = session.timer.elapsed(started);
        session.timer.record_frame(work);

        match status {
            SessionStatus::Running => {
                session.timer.sleep(session.tick_interval().saturating_sub(work));
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            SessionStatus::Ended(end) => self.finish(end, event_loop)?,
        }
        Ok(())
    }

    fn finish(&mut self, end: SessionEnd, event_loop: &ActiveEventLoop) -> Result<()> {
        let Some(session) = self.session.as_ref() else {
            return Ok(());
        };
        let user = self.config.sanitized_user_name();

        let mut sink = FileResultSink::new(&self.config.output_dir, self.config.result_format);
        let saved = sink.save(&user, session.records());

        if let Some(mut tracker) = self.tracker.take() {
            let data = self.tracker_data_dir.join(format!("svop_{user}_gaze.csv"));
            svop_core::shut_down(tracker.as_mut(), &data);
        }

        let stats = session.timer.tick_stats();
        info!(
            "loop: {} ticks, {:.3} ms average work, jitter {:.3} ms, {:.1} Hz",
            stats.samples,
            stats.average_tick_ns / 1e6,
            stats.jitter_ns / 1e6,
            stats.effective_rate_hz
        );

        let summary = session.summary();
        println!("\nSession {}.", if end == SessionEnd::Quit { "ended early" } else { "complete" });
        println!(
            "Passed {}/{} ({:.0}%), skipped {}, retries {}",
            summary.passed,
            summary.judged,
            summary.pass_rate(),
            summary.skipped,
            summary.retried
        );

        self.exit(event_loop);
        let path = saved.context("saving results")?;
        println!("Results saved to {}", path.display());
        Ok(())
    }

    fn handle_key(&mut self, key: &Key) {
        if let Key::Character(s) = key {
            if let Some(signal) = s.chars().next().and_then(ControlSignal::from_key) {
                self.keyboard.send(signal);
            }
        }
    }

    fn handle_click(&mut self) {
        if !self.config.show_buttons {
            return;
        }
        if let Some(renderer) = &self.renderer {
            if let Some(signal) = renderer.buttons().hit(self.cursor.0, self.cursor.1) {
                self.buttons.send(signal);
            }
        }
    }

    fn handle_resize(&mut self, new_size: PhysicalSize<u32>) {
        if self.current_size == Some(new_size) {
            return;
        }
        self.current_size = Some(new_size);
        if let Some(pixels) = &mut self.pixels {
            if let Err(e) = pixels.resize_surface(new_size.width, new_size.height) {
                error!("Failed to resize surface: {}", e);
            }
            if let Err(e) = pixels.resize_buffer(new_size.width, new_size.height) {
                error!("Failed to resize buffer: {}", e);
            }
        }
        if let Some(renderer) = &mut self.renderer {
            if let Err(e) = renderer.resize(new_size.width, new_size.height) {
                error!("Failed to resize renderer: {e:#}");
            }
        }
        warn!(
            "display resized to {}×{}; stimulus layout is unchanged",
            new_size.width, new_size.height
        );
    }

    /// Releases the tracker and stops the loop after a fatal error.
    fn fail(&mut self, e: anyhow::Error, event_loop: &ActiveEventLoop) {
        error!("{e:#}");
        if let Some(mut tracker) = self.tracker.take() {
            tracker.release();
        }
        self.failure = Some(e);
        self.exit(event_loop);
    }

    fn exit(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.set_cursor_visible(true);
        }
        self.should_exit = true;
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            if let Err(e) = self.create_window_and_surface(event_loop) {
                self.fail(e.context("startup failed"), event_loop);
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                if self.session.is_some() && !self.should_exit {
                    self.keyboard.with_source("window").send(ControlSignal::Quit);
                } else {
                    self.exit(event_loop);
                }
            }
            WindowEvent::RedrawRequested if !self.should_exit => {
                if let Err(e) = self.tick(event_loop) {
                    self.fail(e, event_loop);
                }
            }
            WindowEvent::KeyboardInput { event, .. } if event.state.is_pressed() && !event.repeat => {
                self.handle_key(&event.logical_key);
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.cursor = (position.x as f32, position.y as f32);
                if let Some(pointer) = &self.pointer {
                    pointer.set(position.x, position.y);
                }
            }
            WindowEvent::CursorLeft { .. } => {
                if let Some(pointer) = &self.pointer {
                    pointer.clear();
                }
            }
            WindowEvent::MouseInput {
                state: ElementState::Pressed,
                button: MouseButton::Left,
                ..
            } => self.handle_click(),
            WindowEvent::Resized(sz) => self.handle_resize(sz),
            WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                self.scale_factor = scale_factor;
                if let Some(window) = &self.window {
                    self.handle_resize(window.inner_size());
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.should_exit {
            event_loop.exit();
        }
    }
}

impl Drop for App {
    fn drop(&mut self) {
        if let Some(tracker) = self.tracker.as_mut() {
            tracker.release();
        }
        info!("application resources cleaned up");
    }
}
