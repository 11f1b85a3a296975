use crate::Args;
use crate::setup::{self, Prepared};
use crate::worker::{AppEvent, Engine, LessonJob};
use anyhow::{Result, anyhow};
use motex_experiment::{JsonProgressStore, LessonEngine, LessonOutcome};
use motex_render::{RenderConfig, SkiaRenderer};
use motex_scene::{SharedScene, SharedUi};
use motex_timing::{HighPrecisionTimer, Signals, Timer};
use pixels::{Pixels, SurfaceTexture};
use std::sync::Arc;
use std::thread::JoinHandle;
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop, EventLoopProxy},
    keyboard::{KeyCode, PhysicalKey},
    window::{Fullscreen, Window, WindowId},
};

const FRAME_LOG_INTERVAL: u64 = 600;

pub struct App {
    window: Option<Arc<Window>>,
    pixels: Option<Pixels<'static>>,
    renderer: Option<SkiaRenderer>,
    render_config: RenderConfig,
    windowed: bool,

    scene: SharedScene,
    ui: SharedUi,
    engine: Arc<Engine>,
    job: Option<LessonJob>,
    worker: Option<JoinHandle<()>>,
    proxy: Option<EventLoopProxy<AppEvent>>,

    timer: HighPrecisionTimer,
    frames: u64,
    refresh_rate: Option<f64>,
    exiting: bool,
}

impl App {
    pub fn new(args: Args) -> Result<Self> {
        let config = setup::load_experiment_config(args.config.as_deref())?;
        let render_config = setup::load_render_config(args.render_config.as_deref())?;
        let progress = JsonProgressStore::new(&args.progress_file);

        let Prepared {
            plan,
            writer,
            record,
            continued,
        } = setup::prepare(&args, &config, &progress)?;
        tracing::info!(
            subject = %record.subject,
            blocks = plan.blocks.len(),
            trials = plan.trial_count(),
            continued,
            "lesson ready"
        );

        let scene = SharedScene::new(config.physics.drift_after_finish);
        let ui = SharedUi::new();
        let tick = config.physics.tick();
        let engine = Arc::new(LessonEngine::new(
            scene.clone(),
            ui.clone(),
            Arc::new(Signals::new()),
            progress,
            config,
        ));
        let job = LessonJob {
            engine: engine.clone(),
            scene: scene.clone(),
            plan,
            writer,
            tick,
        };

        Ok(Self {
            window: None,
            pixels: None,
            renderer: None,
            render_config,
            windowed: args.windowed,
            scene,
            ui,
            engine,
            job: Some(job),
            worker: None,
            proxy: None,
            timer: HighPrecisionTimer::new(),
            frames: 0,
            refresh_rate: None,
            exiting: false,
        })
    }

    pub fn run(mut self) -> Result<()> {
        let event_loop = EventLoop::<AppEvent>::with_user_event().build()?;
        self.proxy = Some(event_loop.create_proxy());
        tracing::info!(
            os = std::env::consts::OS,
            arch = std::env::consts::ARCH,
            "SPACE responds, P continues after a block, ESC aborts"
        );
        event_loop.run_app(&mut self)?;
        Ok(())
    }

    fn create_window_and_surface(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let monitor = event_loop
            .primary_monitor()
            .or_else(|| event_loop.available_monitors().next())
            .ok_or_else(|| anyhow!("no monitor available"))?;
        self.refresh_rate = monitor
            .refresh_rate_millihertz()
            .map(|rate| rate as f64 / 1000.0);

        let mut attributes = Window::default_attributes().with_title("Motex");
        if !self.windowed {
            attributes = attributes
                .with_fullscreen(Some(Fullscreen::Borderless(Some(monitor))))
                .with_resizable(false);
        }
        let window = Arc::new(event_loop.create_window(attributes)?);
        let size = window.inner_size();
        tracing::info!(
            width = size.width,
            height = size.height,
            scale = window.scale_factor(),
            refresh_hz = ?self.refresh_rate,
            "display configured"
        );

        let surface = SurfaceTexture::new(size.width, size.height, window.clone());
        self.pixels = Some(Pixels::new(size.width, size.height, surface)?);
        self.renderer = Some(SkiaRenderer::new(
            size.width,
            size.height,
            self.render_config.clone(),
        )?);

        window.set_cursor_visible(self.windowed);
        window.request_redraw();
        self.window = Some(window);
        Ok(())
    }

    fn start_lesson(&mut self) -> Result<()> {
        let (Some(job), Some(proxy)) = (self.job.take(), self.proxy.clone()) else {
            return Ok(());
        };
        self.worker = Some(job.spawn(proxy)?);
        Ok(())
    }

    fn render(&mut self) -> Result<()> {
        let (Some(pixels), Some(renderer)) = (self.pixels.as_mut(), self.renderer.as_mut()) else {
            return Ok(());
        };
        let scene = self.scene.snapshot();
        let ui = self.ui.snapshot();

        let stats = renderer.render_frame(&scene, &ui, pixels.frame_mut(), &mut self.timer)?;
        let t = self.timer.now();
        pixels.render()?;
        let present = self.timer.elapsed(t);

        self.frames += 1;
        tracing::trace!(
            draw_ms = stats.draw.as_secs_f64() * 1e3,
            copy_ms = stats.copy.as_secs_f64() * 1e3,
            present_ms = present.as_secs_f64() * 1e3,
            "frame"
        );
        if self.frames % FRAME_LOG_INTERVAL == 0 {
            let cal = self.timer.calibration_stats();
            tracing::debug!(
                frames = self.frames,
                avg_ms = cal.average_frame_time_ns / 1e6,
                jitter_ms = cal.jitter_ns / 1e6,
                max_ms = cal.max_frame_time_ns / 1e6,
                fps = cal.effective_fps,
                "frame timing"
            );
        }
        Ok(())
    }

    fn handle_input(&mut self, key: PhysicalKey, event_loop: &ActiveEventLoop) {
        let PhysicalKey::Code(code) = key else {
            return;
        };
        let signals = Arc::clone(self.engine.signals());
        match code {
            KeyCode::Space => {
                if !signals.space.fire() {
                    tracing::trace!("space pressed with nothing waiting");
                }
            }
            KeyCode::KeyP => {
                if !signals.pause.fire() {
                    tracing::trace!("pause pressed with nothing waiting");
                }
            }
            KeyCode::Escape => self.request_exit(event_loop),
            _ => {}
        }
    }

    fn handle_resize(&mut self, size: PhysicalSize<u32>) {
        if size.width == 0 || size.height == 0 {
            return;
        }
        if let Some(pixels) = &mut self.pixels {
            if let Err(e) = pixels.resize_surface(size.width, size.height) {
                tracing::error!(%e, "failed to resize surface");
            }
            if let Err(e) = pixels.resize_buffer(size.width, size.height) {
                tracing::error!(%e, "failed to resize buffer");
            }
        }
        if let Some(renderer) = &mut self.renderer {
            if let Err(e) = renderer.resize(size.width, size.height) {
                tracing::error!(error = %e, "failed to resize canvas");
            }
        }
        tracing::info!(width = size.width, height = size.height, "display resized");
    }

    /// Aborts the lesson; the loop exits once the lesson thread has unwound.
    fn request_exit(&mut self, event_loop: &ActiveEventLoop) {
        self.exiting = true;
        self.engine.abort_lesson();
        if self.worker.is_none() {
            event_loop.exit();
        }
    }

    fn finish(&mut self, outcome: Result<LessonOutcome, String>, event_loop: &ActiveEventLoop) {
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("lesson thread panicked");
            }
        }
        match outcome {
            Ok(LessonOutcome::Completed) => tracing::info!("experiment completed, results saved"),
            Ok(LessonOutcome::Aborted) => tracing::info!("experiment aborted, progress kept"),
            Err(e) => tracing::error!(error = %e, "lesson failed"),
        }
        if let Some(window) = &self.window {
            window.set_cursor_visible(true);
        }
        self.exiting = true;
        event_loop.exit();
    }
}

impl ApplicationHandler<AppEvent> for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        let started = self
            .create_window_and_surface(event_loop)
            .and_then(|()| self.start_lesson());
        if let Err(e) = started {
            tracing::error!(error = %format!("{e:#}"), "failed to start");
            event_loop.exit();
        }
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: AppEvent) {
        match event {
            AppEvent::LessonFinished(outcome) => self.finish(outcome, event_loop),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => self.request_exit(event_loop),
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.render() {
                    tracing::error!(error = %format!("{e:#}"), "render failed");
                    self.request_exit(event_loop);
                    return;
                }
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            WindowEvent::KeyboardInput { event, .. } if event.state.is_pressed() && !event.repeat => {
                self.handle_input(event.physical_key, event_loop);
            }
            WindowEvent::Resized(size) => self.handle_resize(size),
            WindowEvent::ScaleFactorChanged { .. } => {
                if let Some(window) = &self.window {
                    let size = window.inner_size();
                    self.handle_resize(size);
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.exiting && self.worker.is_none() {
            event_loop.exit();
        }
    }
}

impl Drop for App {
    fn drop(&mut self) {
        self.engine.abort_lesson();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("lesson thread panicked");
            }
        }
        tracing::debug!("application resources released");
    }
}
