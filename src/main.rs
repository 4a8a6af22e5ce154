use std::path::Path;

use actix_web::{web, App, HttpServer};
use anyhow::Context;
use clap::Parser;
use env_logger::Env;
use log::{error, info};

use subforge::interfaces::simple_generator;
use subforge::settings::{update_settings_from_file, Settings};
use subforge::web_handlers::interfaces;

#[derive(Parser, Debug)]
#[command(name = "subforge", about = "A utility to convert between proxy subscription formats")]
struct Args {
    /// Path to the preference file
    #[arg(short = 'f', long = "config")]
    config: Option<String>,

    /// Run the batch generator instead of serving HTTP
    #[arg(short = 'g', long = "gen")]
    generate: bool,

    /// Restrict the batch generator to one artifact section
    #[arg(short = 'p', long = "artifact", requires = "generate")]
    artifact: Option<String>,
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(Env::default().default_filter_or("info"));

    let args = Args::parse();

    let config_path = args.config.unwrap_or_else(|| {
        if Path::new("pref.yml").exists() {
            "pref.yml".to_string()
        } else {
            "pref.ini".to_string()
        }
    });

    if Path::new(&config_path).exists() {
        info!("Loading settings from {}.", config_path);
        if let Err(e) = update_settings_from_file(&config_path) {
            error!("Error loading settings: {}", e);
        }
    } else {
        info!("No preference file found, using defaults.");
    }

    if args.generate {
        return simple_generator("generate.ini", args.artifact.as_deref())
            .map_err(|e| anyhow::anyhow!(e));
    }

    let settings = Settings::current();
    let listen_address = if settings.listen_address.contains(':') {
        settings.listen_address.clone()
    } else {
        format!("{}:{}", settings.listen_address, settings.listen_port)
    };

    info!("Subforge starting on {}.", listen_address);

    HttpServer::new(|| {
        App::new()
            .configure(interfaces::config)
            .route(
                "/",
                web::get().to(|| async { "subforge is running!" }),
            )
    })
    .workers(settings.max_concur_threads as usize)
    .backlog(settings.max_pending_conns)
    .bind(&listen_address)
    .with_context(|| format!("cannot bind {}", listen_address))?
    .run()
    .await?;

    Ok(())
}
