use std::rc::Rc;

use glam::Vec2;
use thiserror::Error;

use crate::config::CityConfig;
use crate::event::Event;
use crate::transport::{SceneError, SceneLayer, SpriteInstance, Texture, TransportSpritePool};
use crate::util::pool::{AllocError, PoolHandle, PoolStats};

/// City bounds in pixels.
const CITY_W: f32 = 1920.0;
const CITY_H: f32 = 1080.0;
/// Keep buildings away from the edges.
const BUILDING_MARGIN: f32 = 64.0;
/// Vehicle layer node limit.
const LAYER_CAPACITY: usize = 4096;
/// Vehicles draw above roads, below UI.
const VEHICLE_Z: i32 = 10;

/// A delivery between two buildings.
#[derive(Debug, Clone, Copy)]
pub struct Trip {
    pub from: usize,
    pub to: usize,
}

/// Fraction of the route covered, 0.0 to 1.0.
#[derive(Debug, Clone, Copy)]
pub struct Progress(pub f32);

/// Vehicle sprite borrowed for the trip.
#[derive(Debug, Clone, Copy)]
pub struct Sprite(pub PoolHandle);

/// Emitted when a vehicle reaches its destination.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TripCompleted {
    pub from: usize,
    pub to: usize,
    pub distance: f32,
}

#[derive(Debug, Error)]
pub enum CityError {
    #[error("vehicle sprite unavailable: {0}")]
    Sprite(#[from] AllocError<SceneError>),
}

/// Buildings, in-flight trips and the vehicle sprites that draw them.
pub struct City {
    world: hecs::World,
    buildings: Vec<Vec2>,
    sprites: TransportSpritePool,
    completed: Event<TripCompleted>,
    rng: fastrand::Rng,
    trip_rate: f32,
    trip_speed: f32,
    /// Fractional trips carried between ticks.
    spawn_budget: f32,
    deliveries: u64,
    skipped: u64,
    // Reused each tick
    arrivals: Vec<(hecs::Entity, PoolHandle, TripCompleted)>,
}

impl City {
    pub fn new(config: &CityConfig) -> Self {
        let mut rng = fastrand::Rng::with_seed(config.seed);
        let buildings = (0..config.building_count())
            .map(|_| {
                Vec2::new(
                    BUILDING_MARGIN + rng.f32() * (CITY_W - 2.0 * BUILDING_MARGIN),
                    BUILDING_MARGIN + rng.f32() * (CITY_H - 2.0 * BUILDING_MARGIN),
                )
            })
            .collect();

        let texture = Rc::new(Texture::new(1, "delivery_truck", 32, 16));
        let layer = SceneLayer::new("vehicles", VEHICLE_Z, LAYER_CAPACITY);
        let mut pool_config = config.sprite_pool();
        // Every sprite owns a layer node, so the layer bounds the fleet.
        pool_config.max_instances = Some(
            pool_config
                .max_instances
                .map_or(LAYER_CAPACITY, |max| max.min(LAYER_CAPACITY)),
        );
        let sprites = TransportSpritePool::new(texture, layer, pool_config);

        Self {
            world: hecs::World::new(),
            buildings,
            sprites,
            completed: Event::new(),
            rng,
            trip_rate: config.trip_rate.max(0.0),
            trip_speed: config.trip_speed.max(1.0),
            spawn_budget: 0.0,
            deliveries: 0,
            skipped: 0,
            arrivals: Vec::new(),
        }
    }

    /// Advance one fixed step: spawn due trips, move vehicles, finish arrivals.
    pub fn tick(&mut self, dt: f32) -> Result<(), CityError> {
        self.spawn_budget += self.trip_rate * dt;
        while self.spawn_budget >= 1.0 {
            self.spawn_budget -= 1.0;
            self.spawn_trip()?;
        }
        self.advance(dt);
        self.finish_arrivals();
        Ok(())
    }

    /// Start a trip between two random buildings.
    /// Returns false if every vehicle is busy.
    pub fn spawn_trip(&mut self) -> Result<bool, CityError> {
        let n = self.buildings.len();
        let from = self.rng.usize(0..n);
        let to = (from + 1 + self.rng.usize(0..n - 1)) % n;

        let handle = match self.sprites.allocate() {
            Ok(handle) => handle,
            Err(AllocError::Exhausted { capacity }) => {
                self.skipped += 1;
                log::debug!("all {capacity} vehicles busy, dropping trip {from} -> {to}");
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };

        let (start, end) = (self.buildings[from], self.buildings[to]);
        if let Some(sprite) = self.sprites.get_mut(handle) {
            sprite.position = start;
            sprite.rotation = heading(start, end);
        }
        self.world
            .spawn((Trip { from, to }, Progress(0.0), Sprite(handle)));
        Ok(true)
    }

    fn advance(&mut self, dt: f32) {
        for (entity, (trip, progress, sprite)) in self
            .world
            .query_mut::<(&Trip, &mut Progress, &Sprite)>()
        {
            let start = self.buildings[trip.from];
            let end = self.buildings[trip.to];
            let distance = start.distance(end).max(1.0);

            progress.0 = (progress.0 + self.trip_speed * dt / distance).min(1.0);
            if let Some(vehicle) = self.sprites.get_mut(sprite.0) {
                vehicle.position = start.lerp(end, progress.0);
            }

            if progress.0 >= 1.0 {
                self.arrivals.push((
                    entity,
                    sprite.0,
                    TripCompleted {
                        from: trip.from,
                        to: trip.to,
                        distance,
                    },
                ));
            }
        }
    }

    fn finish_arrivals(&mut self) {
        let mut arrivals = std::mem::take(&mut self.arrivals);
        for (entity, handle, done) in arrivals.drain(..) {
            let despawned = self.world.despawn(entity);
            debug_assert!(despawned.is_ok(), "arrived trip {entity:?} already gone");
            // Rejections are already logged by the pool.
            let _ = self.sprites.release(handle);
            self.deliveries += 1;
            self.completed.emit(&done);
        }
        self.arrivals = arrivals;
    }

    /// Drop every in-flight trip and park all vehicles. Returns trips cancelled.
    pub fn clear_trips(&mut self) -> usize {
        let cancelled = self.world.len() as usize;
        self.world.clear();
        self.sprites.release_all();
        cancelled
    }

    pub fn set_trip_rate(&mut self, per_second: f32) {
        self.trip_rate = per_second.max(0.0);
    }

    pub fn completed(&self) -> &Event<TripCompleted> {
        &self.completed
    }

    pub fn build_instances(&self, buf: &mut Vec<SpriteInstance>) {
        self.sprites.build_instances(buf);
    }

    pub fn sprites(&self) -> &TransportSpritePool {
        &self.sprites
    }

    pub fn sprite_stats(&self) -> PoolStats {
        self.sprites.stats()
    }

    pub fn buildings(&self) -> &[Vec2] {
        &self.buildings
    }

    pub fn active_trips(&self) -> usize {
        self.world.len() as usize
    }

    pub fn deliveries(&self) -> u64 {
        self.deliveries
    }

    pub fn skipped_trips(&self) -> u64 {
        self.skipped
    }
}

/// Heading from `start` toward `end`, in radians.
fn heading(start: Vec2, end: Vec2) -> f32 {
    let d = end - start;
    d.y.atan2(d.x)
}
