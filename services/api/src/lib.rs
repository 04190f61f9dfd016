mod cli;
mod demo;
mod infra;
mod routes;
mod server;

use notaria_queue::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
