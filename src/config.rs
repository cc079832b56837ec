use clap::Parser;

use crate::util::pool::{PoolConfig, ReleasePolicy};

/// cityidle - headless delivery-route simulation
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct CityConfig {
    /// Number of fixed simulation ticks to run (60 per simulated second)
    #[arg(long, default_value = "3600")]
    pub ticks: u64,

    /// RNG seed for building layout and trip routing
    #[arg(long, default_value = "42")]
    pub seed: u64,

    /// Number of buildings (at least 2)
    #[arg(long, default_value = "12")]
    pub buildings: usize,

    /// New delivery trips per simulated second
    #[arg(long, default_value = "4.0")]
    pub trip_rate: f32,

    /// Vehicle speed in pixels per second
    #[arg(long, default_value = "180.0")]
    pub trip_speed: f32,

    /// Maximum vehicle sprites alive at once (0 = unbounded)
    #[arg(long, default_value = "0")]
    pub max_sprites: usize,

    /// Warn instead of panicking on invalid sprite releases
    #[arg(long)]
    pub lenient_release: bool,

    /// Shortcut keys to press, one per simulated second (e.g. "space,s,space")
    #[arg(long, value_delimiter = ',')]
    pub keys: Vec<String>,
}

impl CityConfig {
    /// Parse configuration from command line arguments
    pub fn parse_args() -> Self {
        CityConfig::parse()
    }

    pub fn building_count(&self) -> usize {
        self.buildings.max(2)
    }

    pub fn sprite_pool(&self) -> PoolConfig {
        PoolConfig {
            name: "transport",
            max_instances: (self.max_sprites > 0).then_some(self.max_sprites),
            release_policy: if self.lenient_release {
                ReleasePolicy::Warn
            } else {
                ReleasePolicy::Panic
            },
        }
    }
}

impl Default for CityConfig {
    fn default() -> Self {
        Self {
            ticks: 3600,
            seed: 42,
            buildings: 12,
            trip_rate: 4.0,
            trip_speed: 180.0,
            max_sprites: 0,
            lenient_release: false,
            keys: Vec::new(),
        }
    }
}
