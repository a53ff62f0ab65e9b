use multichat::config::Config;
use multichat::persist::Store;
use multichat::state::State;
use multichat::{net, util};
use std::env;
use std::path::Path;
use std::process;

#[tokio::main]
async fn main() {
    env_logger::init();

    let config = match env::args().nth(1) {
        Some(path) => match Config::from_file(Path::new(&path)) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("{}", err);
                process::exit(1);
            }
        },
        None => Config::default(),
    };

    let resolver = match hickory_resolver::TokioAsyncResolver::tokio_from_system_conf() {
        Ok(resolver) => Some(resolver),
        Err(err) => {
            log::warn!("No reverse lookups, resolver unavailable: {}", err);
            None
        }
    };

    let state = State::new(config, resolver);
    let store = Store::new(&state.config.data_dir);
    if let Err(err) = store.load(&state).await {
        log::warn!("Failed to load saved state: {}", err);
    }

    log::info!("Multichat starting at {}", util::time_str());
    if let Err(err) = net::run(state.clone()).await {
        log::error!("Listener failed: {}", err);
        process::exit(1);
    }

    // Workers have drained; write everything back.  Losing persistence is
    // logged, never fatal.
    if let Err(err) = store.save(&state).await {
        log::error!("Failed to save state: {}", err);
    }
    log::info!("Multichat stopped");
}
