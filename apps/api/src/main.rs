use std::net::SocketAddr;
use std::sync::Arc;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{self, TraceLayer};
use tracing::{info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use scheduling_cell::handlers::SchedulingState;
use scheduling_cell::services::{AvailabilityService, BookingService, ConflictService};
use scheduling_cell::store::{
    BookingStore, ScheduleStore, ServiceCatalog, SupabaseSchedulingStore,
};
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

#[tokio::main]
async fn main() {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting BookWell scheduling API server");

    // Load configuration
    let config = Arc::new(AppConfig::from_env());

    let supabase = Arc::new(SupabaseClient::new(&config));
    let store = Arc::new(SupabaseSchedulingStore::new(supabase));
    let schedule: Arc<dyn ScheduleStore> = store.clone();
    let catalog: Arc<dyn ServiceCatalog> = store.clone();
    let bookings: Arc<dyn BookingStore> = store;

    // Booking events feed the notification dispatcher; for now that is a
    // logging drain.
    let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            info!("Appointment event: {:?}", event);
        }
    });

    let state = SchedulingState {
        availability: Arc::new(AvailabilityService::new(
            schedule.clone(),
            catalog.clone(),
            bookings.clone(),
        )),
        booking: Arc::new(
            BookingService::new(schedule, catalog, bookings.clone(), &config)
                .with_event_sink(event_tx),
        ),
        conflicts: Arc::new(ConflictService::new(bookings)),
        config: config.clone(),
    };

    // Set up CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build the application router
    let app = router::create_router(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors);

    // Run the server
    let addr = SocketAddr::from(([0, 0, 0, 0], 3000));
    info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
