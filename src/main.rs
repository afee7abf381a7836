use clap::Parser;
use std::fs;
use std::path::Path;

use spin_ledger::{repositories, services, settings};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "config.toml")]
    config: String,
    #[arg(long, default_value = "log4rs.yaml")]
    log4rs: String,
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    let args = Args::parse();

    init_logging(&args.log4rs).expect("Failed to initialize logging.");
    let settings = settings::Settings::load(&args.config).expect("Could not load config file.");

    let pool = repositories::connect(&settings.database.url, settings.database.max_connections)
        .await
        .expect("Could not connect to database.");
    repositories::migrate(&pool)
        .await
        .expect("Could not prepare database schema.");

    let core = services::Core::from_settings(pool, &settings).expect("Invalid settings.");

    log::info!("Starting services.");
    services::start_services(core, settings)
        .await
        .expect("Could not start services.");
}

fn init_logging(path: &str) -> Result<(), anyhow::Error> {
    if !Path::new("logs").exists() {
        fs::create_dir("logs")?;
    }

    match log4rs::init_file(path, Default::default()) {
        Ok(_) => {
            println!("[*] Logging initialized successfully.");
            Ok(())
        }
        Err(e) => {
            println!("[ERROR] Failed to initialize logging: {}", e);
            Err(anyhow::anyhow!("Could not initialize logging: {}", e))
        }
    }
}
