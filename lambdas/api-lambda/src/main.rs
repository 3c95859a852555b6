use aws_config::timeout::TimeoutConfig;
use aws_sdk_dynamodb::Client as DynamoClient;
use fitplans_shared::checkout::StripeCheckout;
use fitplans_shared::config::Config;
use fitplans_shared::store::DynamoStore;
use fitplans_shared::AppState;
use lambda_http::{run, service_fn, tracing, Error, Request};
use std::sync::Arc;

mod http_handler;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing::init_default_subscriber();

    let config = Config::from_env()?;

    // Initialize AWS clients once at startup
    let timeouts = TimeoutConfig::builder()
        .operation_timeout(config.external_timeout)
        .operation_attempt_timeout(config.external_timeout)
        .build();
    let aws_config = aws_config::from_env().timeout_config(timeouts).load().await;

    let store = DynamoStore::new(DynamoClient::new(&aws_config), config.table_name.clone());
    let processor = StripeCheckout::new(&config.checkout, config.external_timeout)?;

    tracing::info!("Using table {}", config.table_name);
    let state = AppState::new(Arc::new(store), Arc::new(processor), config);

    run(service_fn(move |event: Request| {
        let state = Arc::clone(&state);
        async move { http_handler::function_handler(event, state).await }
    }))
    .await
}
