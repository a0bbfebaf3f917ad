use actix_web::{web, App, HttpResponse, HttpServer, Responder, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use bank_number_generator::config::{Config, StoreBackend};
use bank_number_generator::metrics::AllocationMetrics;
use bank_number_generator::redis_sequence_store::RedisSequenceStore;
use bank_number_generator::registry::resolve_type_code;
use bank_number_generator::{
    EntityFamily, EntityRegistry, IdentifierAllocator, IdentifierError, IdentifierFormat,
    InMemorySequenceStore, ParsedIdentifier, SequenceStore, TypeCode,
};

#[derive(Debug, Deserialize)]
struct TypeCodeQuery {
    #[serde(default)]
    type_code: String,
}

#[derive(Debug, Deserialize)]
struct FamilyQuery {
    family: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FloorPayload {
    floor: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct IdentifierResponse {
    identifier: String,
    family: EntityFamily,
    type_code: Option<String>,
    allocated_at: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ParsedResponse {
    family: EntityFamily,
    type_code: Option<String>,
    counter: u64,
}

impl From<ParsedIdentifier> for ParsedResponse {
    fn from(parsed: ParsedIdentifier) -> Self {
        ParsedResponse {
            family: parsed.family,
            type_code: parsed.type_code.map(|t| t.code().to_string()),
            counter: parsed.counter,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SequenceResponse {
    key: String,
    counter: u64,
}

fn to_http_error(err: IdentifierError) -> actix_web::Error {
    match err {
        IdentifierError::InvalidTypeCode { .. } | IdentifierError::MalformedIdentifier(_) => {
            actix_web::error::ErrorBadRequest(err)
        }
        IdentifierError::StoreUnavailable(_) => actix_web::error::ErrorServiceUnavailable(err),
        IdentifierError::CounterOverflow { .. } | IdentifierError::StoreRejected(_) => {
            actix_web::error::ErrorInternalServerError(err)
        }
    }
}

fn sequence_target(
    family: &str,
    type_code: &str,
) -> Result<(EntityFamily, Option<TypeCode>), IdentifierError> {
    let family: EntityFamily = family.parse()?;
    let type_code = resolve_type_code(family, type_code)?;
    Ok((family, type_code))
}

async fn allocate_identifier(
    family: web::Path<String>,
    query: web::Query<TypeCodeQuery>,
    registry: web::Data<EntityRegistry>,
) -> Result<impl Responder> {
    let request_id = Uuid::new_v4();
    let span = info_span!("allocate_identifier", %request_id, family = %family);

    async move {
        let (family, type_code) =
            sequence_target(&family, &query.type_code).map_err(to_http_error)?;
        let identifier = registry
            .new_identifier(family, type_code)
            .await
            .map_err(|e| {
                warn!(error = %e, "allocation failed");
                to_http_error(e)
            })?;
        info!(%identifier, "identifier allocated");

        Ok::<_, actix_web::Error>(web::Json(IdentifierResponse {
            identifier: identifier.into_string(),
            family,
            type_code: type_code.map(|t| t.code().to_string()),
            allocated_at: chrono::Utc::now().to_rfc3339(),
        }))
    }
    .instrument(span)
    .await
}

async fn parse_identifier(
    identifier: web::Path<String>,
    query: web::Query<FamilyQuery>,
    registry: web::Data<EntityRegistry>,
) -> Result<impl Responder> {
    let parsed = match query.family.as_deref() {
        Some(family) => family
            .parse::<EntityFamily>()
            .and_then(|family| registry.parse_as(family, &identifier)),
        None => registry.parse(&identifier),
    }
    .map_err(to_http_error)?;
    Ok(web::Json(ParsedResponse::from(parsed)))
}

async fn current_sequence(
    family: web::Path<String>,
    query: web::Query<TypeCodeQuery>,
    registry: web::Data<EntityRegistry>,
) -> Result<impl Responder> {
    let (family, type_code) = sequence_target(&family, &query.type_code).map_err(to_http_error)?;
    let counter = registry
        .current_counter(family, type_code)
        .await
        .map_err(to_http_error)?;
    let key = registry.format().validate(family, type_code).map_err(to_http_error)?;
    Ok(web::Json(SequenceResponse {
        key: key.to_string(),
        counter,
    }))
}

async fn advance_sequence(
    family: web::Path<String>,
    query: web::Query<TypeCodeQuery>,
    payload: web::Json<FloorPayload>,
    registry: web::Data<EntityRegistry>,
) -> Result<impl Responder> {
    let request_id = Uuid::new_v4();
    let span = info_span!("advance_sequence", %request_id, family = %family);

    async move {
        let (family, type_code) =
            sequence_target(&family, &query.type_code).map_err(to_http_error)?;
        let counter = registry
            .advance_floor(family, type_code, payload.floor)
            .await
            .map_err(|e| match e {
                // The floor came from the caller, the store is untouched.
                IdentifierError::CounterOverflow { .. } => actix_web::error::ErrorBadRequest(e),
                e => to_http_error(e),
            })?;
        let key = registry.format().validate(family, type_code).map_err(to_http_error)?;
        info!(%key, counter, "sequence floor advanced");
        Ok::<_, actix_web::Error>(web::Json(SequenceResponse {
            key: key.to_string(),
            counter,
        }))
    }
    .instrument(span)
    .await
}

async fn render_metrics(metrics: web::Data<AllocationMetrics>) -> Result<impl Responder> {
    let body = metrics
        .render()
        .map_err(actix_web::error::ErrorInternalServerError)?;
    Ok(HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(body))
}

fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/api/identifiers/{family}", web::post().to(allocate_identifier))
        .route("/api/identifiers/{identifier}", web::get().to(parse_identifier))
        .route("/api/sequences/{family}", web::get().to(current_sequence))
        .route("/api/sequences/{family}", web::put().to(advance_sequence))
        .route("/metrics", web::get().to(render_metrics));
}

fn build_store(config: &Config) -> Result<Arc<dyn SequenceStore>, IdentifierError> {
    match config.store {
        StoreBackend::Redis => Ok(Arc::new(RedisSequenceStore::new(config.redis_url.clone())?)),
        StoreBackend::Memory => {
            warn!("using in-memory sequence store, counters are lost on restart");
            Ok(Arc::new(InMemorySequenceStore::new()))
        }
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    let store = build_store(&config)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    let metrics = Arc::new(
        AllocationMetrics::new()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?,
    );

    let allocator = IdentifierAllocator::new(store, IdentifierFormat::new(config.format));
    let registry = web::Data::new(
        EntityRegistry::new(allocator)
            .with_retry(config.retry)
            .with_metrics(Arc::clone(&metrics)),
    );
    let metrics_data = web::Data::from(metrics);

    info!(
        bind_addr = %config.bind_addr,
        port = config.port,
        store = ?config.store,
        "starting identifier service"
    );

    HttpServer::new(move || {
        App::new()
            .app_data(registry.clone())
            .app_data(metrics_data.clone())
            .configure(configure_routes)
    })
    .bind((config.bind_addr.as_str(), config.port))?
    .run()
    .await
}
