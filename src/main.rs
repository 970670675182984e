mod bot;
mod components;
mod config;
mod db;
mod log;

use std::{sync::Arc, time::Duration};

use serenity::{client::bridge::gateway::ShardManager, prelude::Mutex};

trait ResultLog {
    type OkType;
    fn expect_log(self, msg: &str) -> Self::OkType;
}
impl<T, E: std::fmt::Display> ResultLog for Result<T, E> {
    type OkType = T;
    fn expect_log(self, msg: &str) -> T {
        match self {
            Ok(v) => v,
            Err(e) => {
                log_error!("{}: {}", msg, e);
                panic!("{}: {}", msg, e)
            }
        }
    }
}

/// Attend SIGINT ou SIGTERM
async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => (),
                    _ = terminate.recv() => (),
                }
            }
            Err(e) => {
                log_warn!("SIGTERM ne peut pas être écouté: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Arrête les shards au premier signal. Le processus est quitté si l'arrêt dépasse `grace`.
fn spawn_shutdown(shard_manager: Arc<Mutex<ShardManager>>, grace: Duration) {
    tokio::spawn(async move {
        wait_for_signal().await;
        log_info!("Arrêt demandé, fermeture des shards");
        let shutdown = async { shard_manager.lock().await.shutdown_all().await };
        if tokio::time::timeout(grace, shutdown).await.is_err() {
            log_warn!("Les shards ne se sont pas arrêtés après {:?}, arrêt forcé", grace);
            std::process::exit(1);
        }
    });
}

#[tokio::main]
async fn main() {
    let config = config::Config::read_file("./config.json").expect_log("Could not load the configuration file");
    if let Err(e) = log::init(&config.log_level) {
        eprintln!("Logger déjà installé: {}", e);
    }
    let database = db::start_db(&config.database_url).await.expect_log("Could not open the database");
    let mut bot = bot::Bot::new(&config, Arc::new(database)).await.expect_log("Could not create the bot");
    spawn_shutdown(bot.shard_manager(), config.shutdown_grace());
    if let Err(e) = bot.start().await {
        log_error!("Client won't start: {}", e);
    }
    log_info!("Bot arrêté");
}
