use cityidle::{app, CityConfig};

fn main() {
    env_logger::init();
    log::info!("cityidle starting up");

    let config = CityConfig::parse_args();
    if let Err(e) = app::run(&config) {
        log::error!("Fatal error: {e}");
        std::process::exit(1);
    }
}
