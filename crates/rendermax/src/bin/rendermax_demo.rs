//! # RENDERMAX Demo
//!
//! Headless run of a decorated software backend:
//!
//! ```text
//! main thread:      build chain ─► RenderLoop::run ─► summary
//! animator thread:  FadeHandle::load(wave) every few milliseconds
//! ```
//!
//! Usage: `rendermax_demo [config.toml]`. Without a path the defaults are
//! used. Log level follows `RUST_LOG` (default `info`).

use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rendermax::core::{chain_names, FrameState, RendererSlot, ScreenCell};
use rendermax::fx::FadeHandle;
use rendermax::{build_chain, ConfigResult, RenderLoop, RendermaxConfig};
use tracing_subscriber::EnvFilter;

const ANIMATION_PERIOD: Duration = Duration::from_millis(4);

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "demo failed");
            ExitCode::FAILURE
        }
    }
}

fn run() -> ConfigResult<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => RendermaxConfig::load(path)?,
        None => RendermaxConfig::default(),
    };

    let slot = RendererSlot::global();
    let handles = build_chain(slot, &config)?;
    tracing::info!(
        chain = ?slot.chain(),
        fades = handles.len(),
        frames = config.render_loop.frames,
        "demo starting"
    );

    let done = Arc::new(AtomicBool::new(false));
    let animator = spawn_animator(handles, Arc::clone(&done));

    let mut render_loop = RenderLoop::new(slot, config.render_loop.clone());
    let outcome = render_loop.run(None, draw_pattern).cloned();

    done.store(true, Ordering::Release);
    if animator.join().is_err() {
        tracing::error!("fade animator panicked");
    }

    let stats = outcome?;
    stats.log_summary();

    let final_chain = slot.with_active(|renderer| chain_names(renderer))?;
    let removed = slot.reset_to_backend()?;
    tracing::info!(chain = ?final_chain, removed, "decorators removed");
    drop(slot.take());
    Ok(())
}

/// Writes a diagonal glyph sweep into the whole grid.
fn draw_pattern(frame: u64, state: &mut FrameState) {
    state.fill_cells(|x, y| {
        let phase = (frame as usize + x + y) % 256;
        ScreenCell::new(phase as u8, (x % 15) as u8 + 1, (y % 8) as u8, phase % 7 == 0)
    });
}

fn spawn_animator(handles: Vec<FadeHandle>, done: Arc<AtomicBool>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let started = Instant::now();
        let mut values = Vec::new();
        let mut misses = 0u64;
        while !done.load(Ordering::Acquire) {
            let t = started.elapsed().as_secs_f32();
            for handle in &handles {
                let (width, height) = handle.dims();
                values.clear();
                for x in 0..width {
                    for y in 0..height {
                        let wave = (t * 3.0 + x as f32 * 0.35 + y as f32 * 0.2).sin();
                        values.push(0.5 + 0.5 * wave);
                    }
                }
                // The render thread may have resized the map since dims().
                if handle.load(&values).is_err() {
                    misses += 1;
                }
            }
            thread::sleep(ANIMATION_PERIOD);
        }
        tracing::debug!(misses, "fade animator finished");
    })
}
