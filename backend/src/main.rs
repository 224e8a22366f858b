mod config;
mod db;
mod error;
mod export;
mod job_controller;
mod ledger;
mod locks;
mod security;
mod services;
mod state;
mod storage;
mod validation;

use crate::config::Config;
use crate::job_controller::state::{start_job_updater, JobsState};
use crate::state::AppState;
use actix_web::{web, App, HttpServer};
use env_logger::Env;
use log::{error, info};
use std::io;

#[actix_web::main]
async fn main() -> io::Result<()> {
    env_logger::init_from_env(Env::default().default_filter_or("info"));

    let config = Config::from_env().map_err(|e| {
        error!("invalid configuration: {}", e);
        io::Error::new(io::ErrorKind::InvalidInput, e)
    })?;
    let address = config.bind_address();

    let state = AppState::from_config(config)?;
    state.db.ping().map_err(io::Error::other)?;
    info!(
        "database {} ready, uploads stored under {}",
        state.db.path().display(),
        state.config.upload_dir.display()
    );
    if state.config.centers.is_empty() {
        info!("accepting submissions from any center name");
    } else {
        info!("accepting submissions from centers: {}", state.config.centers.join(", "));
    }
    let state = web::Data::new(state);

    // Job controller state and its updater task
    let (jobs_state, rx) = JobsState::new();
    tokio::spawn(start_job_updater(jobs_state.jobs.clone(), rx));
    let jobs_state = web::Data::new(jobs_state);

    info!("Server running at http://{}:{}", address.0, address.1);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .app_data(jobs_state.clone())
            .configure(services::routes)
    })
    .bind(address)?
    .run()
    .await
}
