use std::cell::Cell;
use std::rc::Rc;

use instant::Instant;

use crate::city::City;
use crate::config::CityConfig;
use crate::event::RenderTrigger;
use crate::shortcuts::ShortcutRegistry;
use crate::transport::SpriteInstance;
use crate::util::pool::PoolStats;

/// Simulation tick length (seconds).
const TICK_RATE: f32 = 1.0 / 60.0;
const TICKS_PER_SECOND: u64 = 60;
/// Rendered frames per simulation tick (120 Hz display).
const FRAMES_PER_TICK: u64 = 2;
/// How often to log progress (simulated ticks).
const STATS_LOG_INTERVAL: u64 = 10 * TICKS_PER_SECOND;

// ---------------------------------------------------------------------------
// Controls
// ---------------------------------------------------------------------------

/// Flags flipped by shortcut handlers, read by the frame loop.
#[derive(Default)]
struct Controls {
    paused: Cell<bool>,
    dump_stats: Cell<bool>,
    clear_trips: Cell<bool>,
}

fn bind_shortcuts(controls: &Rc<Controls>) -> ShortcutRegistry {
    let mut shortcuts = ShortcutRegistry::new();

    let c = Rc::clone(controls);
    shortcuts.set("space", move || {
        let paused = !c.paused.get();
        c.paused.set(paused);
        log::info!("{}", if paused { "Paused" } else { "Resumed" });
    });

    let c = Rc::clone(controls);
    shortcuts.set("s", move || c.dump_stats.set(true));

    let c = Rc::clone(controls);
    shortcuts.set("c", move || c.clear_trips.set(true));

    shortcuts
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// What a run did, for the final log line and for tests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub frames: u64,
    /// Ticks simulated (paused slots excluded).
    pub ticks: u64,
    pub paused_ticks: u64,
    pub deliveries: u64,
    pub skipped_trips: u64,
    /// Frames where the delivery counter changed.
    pub hud_refreshes: u64,
    /// Most vehicles drawn in a single frame.
    pub peak_vehicles: usize,
    pub sprites: PoolStats,
}

fn log_stats(city: &City, tick: u64) {
    let stats = city.sprite_stats();
    log::info!(
        "t={:.0}s | trips: {} | vehicles: {} active / {} idle | deliveries: {} | reuse: {:.0}%",
        tick as f64 / TICKS_PER_SECOND as f64,
        city.active_trips(),
        stats.active,
        stats.idle,
        city.deliveries(),
        stats.reuse_rate() * 100.0,
    );
}

/// Entry point: run the city headless for `config.ticks` tick slots.
pub fn run(config: &CityConfig) -> Result<RunSummary, Box<dyn std::error::Error>> {
    let started = Instant::now();
    let mut city = City::new(config);
    let mut hud = RenderTrigger::attach(city.completed());
    let controls = Rc::new(Controls::default());
    let mut shortcuts = bind_shortcuts(&controls);

    log::info!(
        "City ready: {} buildings, shortcuts [{}]",
        city.buildings().len(),
        shortcuts.keys().join(", ")
    );

    let total_frames = config.ticks * FRAMES_PER_TICK;
    let key_interval = TICKS_PER_SECOND * FRAMES_PER_TICK;
    let mut keys = config.keys.iter();
    // Reusable instance buffer (avoid per-frame allocation)
    let mut instance_buf: Vec<SpriteInstance> = Vec::new();
    let mut summary = RunSummary::default();

    for frame in 1..=total_frames {
        summary.frames += 1;

        if frame % key_interval == 0 {
            if let Some(key) = keys.next() {
                if !shortcuts.trigger(key) {
                    log::warn!("No shortcut bound to '{key}'");
                }
            }
        }

        if frame % FRAMES_PER_TICK == 0 {
            if controls.paused.get() {
                summary.paused_ticks += 1;
            } else {
                city.tick(TICK_RATE)?;
                summary.ticks += 1;
            }
        }

        if controls.clear_trips.take() {
            let cancelled = city.clear_trips();
            log::info!("Cleared {cancelled} trips");
        }

        if hud.take_dirty() {
            summary.hud_refreshes += 1;
            log::trace!("HUD refresh: {} deliveries", city.deliveries());
        }

        instance_buf.clear();
        city.build_instances(&mut instance_buf);
        summary.peak_vehicles = summary.peak_vehicles.max(instance_buf.len());

        let slot = frame / FRAMES_PER_TICK;
        let periodic = frame % FRAMES_PER_TICK == 0 && slot % STATS_LOG_INTERVAL == 0;
        if controls.dump_stats.take() || periodic {
            log_stats(&city, slot);
        }
    }

    hud.detach(city.completed());

    summary.deliveries = city.deliveries();
    summary.skipped_trips = city.skipped_trips();
    summary.sprites = city.sprite_stats();

    log::info!(
        "Simulated {} ticks ({} frames) in {:.2}ms | deliveries: {} | skipped: {} | vehicles created: {} | peak on screen: {}",
        summary.ticks,
        summary.frames,
        started.elapsed().as_secs_f64() * 1000.0,
        summary.deliveries,
        summary.skipped_trips,
        summary.sprites.created,
        summary.peak_vehicles,
    );
    Ok(summary)
}
