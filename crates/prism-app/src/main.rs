// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{anyhow, Result};
use clap::Parser;
use prism_core::init_tracing;
use prism_platform::drawable_size;
use prism_render::{FrameStatus, RenderSize, Renderer};
use prism_render_vk::VkRenderer;
use tracing::{error, info, warn};

use prism_platform::winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowId},
};

mod config;

use config::AppCfg;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML config file; missing means defaults
    #[arg(long, default_value = "prism.toml")]
    config: PathBuf,

    /// Exit cleanly after this many presented frames
    #[arg(long)]
    frames: Option<u64>,

    /// Window width override
    #[arg(long)]
    width: Option<u32>,

    /// Window height override
    #[arg(long)]
    height: Option<u32>,
}

// Field order matters: the renderer must go before the window it draws to.
struct App {
    renderer: Option<VkRenderer>,
    window: Option<Window>,

    cfg: AppCfg,
    frame_limit: Option<u64>,
    presented: u64,
    failure: Option<anyhow::Error>,

    paused: bool,
    exiting: bool,
    fps_frames: u32,
    last_fps_instant: Instant,
}

impl App {
    fn new(cfg: AppCfg, frame_limit: Option<u64>) -> Self {
        App {
            renderer: None,
            window: None,
            cfg,
            frame_limit,
            presented: 0,
            failure: None,
            paused: false,
            exiting: false,
            fps_frames: 0,
            last_fps_instant: Instant::now(),
        }
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        self.exiting = true;
        self.renderer = None;
        self.window = None;
        event_loop.exit();
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        error!("{err:#}");
        self.failure = Some(err);
        self.shutdown(event_loop);
    }

    fn start(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let attrs = Window::default_attributes()
            .with_title(self.cfg.window.title.clone())
            .with_inner_size(PhysicalSize::new(
                self.cfg.window.width,
                self.cfg.window.height,
            ));
        let window = event_loop.create_window(attrs)?;

        let size = drawable_size(&window);
        self.paused = size.is_zero_area();
        let initial = RenderSize {
            width: size.width.max(1),
            height: size.height.max(1),
        };

        let renderer = VkRenderer::with_options(
            &window,
            &window,
            initial,
            &self.cfg.render.vk_options(),
        )?;
        info!("backend = vk ({})", renderer.device_name());

        self.window = Some(window);
        self.renderer = Some(renderer);
        Ok(())
    }

    fn draw(&mut self, event_loop: &ActiveEventLoop) {
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };
        match renderer.render() {
            Ok(FrameStatus::Presented) => {
                self.presented += 1;
                self.fps_frames = self.fps_frames.saturating_add(1);
                if self.frame_limit.is_some_and(|n| self.presented >= n) {
                    info!("presented {} frames, exiting", self.presented);
                    self.shutdown(event_loop);
                }
            }
            Ok(FrameStatus::RebuildRequired) => {
                warn!("presentation chain must be rebuilt, which is not supported; exiting");
                self.shutdown(event_loop);
            }
            Err(e) => self.fail(event_loop, e),
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() || self.exiting {
            return;
        }
        event_loop.set_control_flow(ControlFlow::Wait);
        if let Err(e) = self.start(event_loop) {
            self.fail(event_loop, e.context("renderer startup failed"));
            return;
        }
        info!("resumed → paused={}", self.paused);
        if let Some(w) = &self.window {
            w.request_redraw();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if let Some(window) = &self.window {
            if window_id != window.id() {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("CloseRequested");
                self.shutdown(event_loop);
            }

            WindowEvent::Resized(new_size) => {
                let size = prism_platform::to_render_size(new_size);
                let now_paused = size.is_zero_area();
                if self.paused != now_paused {
                    self.paused = now_paused;
                    info!("Resized → {}x{} (paused={})", size.width, size.height, self.paused);
                }
                if self.paused {
                    return;
                }
                if let Some(renderer) = self.renderer.as_mut() {
                    if let Err(e) = renderer.resize(size) {
                        self.fail(event_loop, e);
                        return;
                    }
                }
                if let Some(w) = &self.window {
                    w.request_redraw();
                }
            }

            WindowEvent::RedrawRequested => {
                if self.exiting || self.paused {
                    return;
                }
                self.draw(event_loop);
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.exiting {
            return;
        }
        if self.paused {
            event_loop.set_control_flow(ControlFlow::Wait);
            self.fps_frames = 0;
            return;
        }

        // FIFO presentation paces the loop
        if let Some(w) = &self.window {
            w.request_redraw();
        }

        let now = Instant::now();
        if now.duration_since(self.last_fps_instant).as_secs_f32() >= 1.0 {
            info!("fps ~ {}", self.fps_frames);
            self.fps_frames = 0;
            self.last_fps_instant = now;
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let (mut cfg, problem) = config::load(&args.config);
    init_tracing(&cfg.log.filter);
    config::report(&args.config, problem);

    if let Some(w) = args.width {
        cfg.window.width = w;
    }
    if let Some(h) = args.height {
        cfg.window.height = h;
    }

    let event_loop: EventLoop<()> = EventLoop::new()?;
    let mut app = App::new(cfg, args.frames);
    event_loop.run_app(&mut app)?;

    match app.failure.take() {
        Some(e) => Err(anyhow!("prism exited after an error: {e:#}")),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults() {
        let args = Args::parse_from(["prism-app"]);
        assert_eq!(args.config, PathBuf::from("prism.toml"));
        assert!(args.frames.is_none());
        assert!(args.width.is_none());
    }

    #[test]
    fn cli_overrides() {
        let args = Args::parse_from([
            "prism-app",
            "--config",
            "alt.toml",
            "--frames",
            "120",
            "--width",
            "1024",
            "--height",
            "768",
        ]);
        assert_eq!(args.config, PathBuf::from("alt.toml"));
        assert_eq!(args.frames, Some(120));
        assert_eq!((args.width, args.height), (Some(1024), Some(768)));
    }
}
