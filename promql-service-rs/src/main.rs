// promql-service-rs/src/main.rs
// PromQL Query Generator API - natural language to PromQL over HTTP.
//
// Startup order matters: configuration first, then the store connection
// (with its liveness ping - the service refuses to start without a reachable
// store), then the HTTP listener.

use std::sync::Arc;

use config_rs::ServiceConfig;

use promql_service::conversation_store::MongoConversationStore;
use promql_service::llm_client::LLMClient;
use promql_service::pipeline::QueryPipeline;
use promql_service::prometheus_client::PrometheusClient;
use promql_service::spec_validation::ValidationMode;
use promql_service::PromqlService;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file
    dotenv::dotenv().ok();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let service_config = ServiceConfig::new("promql");
    let port = service_config.get_service_port(8000);

    let generator = LLMClient::from_env()?;
    let executor = PrometheusClient::from_env()?;

    let mongodb_uri = config_rs::env_or("MONGODB_URI", "mongodb://localhost:27017");
    let database_name = config_rs::env_or("MONGODB_DATABASE_NAME", "promql");
    let store = MongoConversationStore::connect(&mongodb_uri, &database_name).await?;

    let pipeline = QueryPipeline::new(
        Arc::new(generator),
        Arc::new(executor),
        Arc::new(store),
        ValidationMode::with_chart_config(),
    );
    let service = Arc::new(PromqlService::new(pipeline));

    let addr = service_config.get_bind_address(port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    log::info!("PromQL service starting on {}", addr);
    println!("PromQL service listening on {}", addr);

    axum::serve(listener, service.create_router()).await?;

    Ok(())
}
