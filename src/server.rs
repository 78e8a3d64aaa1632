use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, Query};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::{Extension, Json as AxumJson, Router};
use hyper::Server;
use serde::Deserialize;
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;

use crate::brokers::alerce::CROSSMATCH_RADIUS_ARCSEC;
use crate::brokers::{AlerceClient, AtlasClient, AtlasCredentials};
use crate::catalog::CatalogCache;
use crate::error::MetabrokerError;
use crate::lookup::TransientLookup;
use crate::orchestrator::BrokerOrchestrator;
use crate::types::{BrokerId, Coordinates, TnsCredentials, TransientTarget};

/// Everything the HTTP handlers share.
pub struct AppState {
    pub cache: Arc<CatalogCache>,
    pub lookup: TransientLookup,
    pub orchestrator: BrokerOrchestrator,
    pub alerce: AlerceClient,
    pub atlas: AtlasClient,
    pub tns_credentials: Option<TnsCredentials>,
    pub atlas_credentials: Option<AtlasCredentials>,
}

/// Health check endpoint
async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "metabroker",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn tns_cache_info(Extension(state): Extension<Arc<AppState>>) -> Response {
    match state.cache.get_cache_info().await {
        Ok(info) => Json(info).into_response(),
        Err(e) => internal_error(e),
    }
}

async fn tns_data(Extension(state): Extension<Arc<AppState>>) -> Response {
    match state.cache.get_all().await {
        Ok(records) => Json(records).into_response(),
        Err(MetabrokerError::NoDataAvailable(message)) => not_found(message),
        Err(e) => internal_error(e),
    }
}

#[derive(Debug, Default, Deserialize)]
struct UpdateRequest {
    tns_id: Option<String>,
    tns_username: Option<String>,
}

/// Trigger a catalog refresh. Credentials in the request body win over the
/// ones from the environment. The response is always 200 with a success
/// flag, matching what refresh-button clients expect.
async fn update_tns(
    Extension(state): Extension<Arc<AppState>>,
    body: Option<AxumJson<UpdateRequest>>,
) -> Response {
    let request = body.map(|AxumJson(r)| r).unwrap_or_default();
    let credentials = match (request.tns_id, request.tns_username) {
        (Some(tns_id), Some(tns_username)) => Some(TnsCredentials {
            tns_id,
            tns_username,
        }),
        _ => state.tns_credentials.clone(),
    };
    match state.cache.refresh(credentials.as_ref()).await {
        Ok(summary) => Json(json!({
            "success": true,
            "count": summary.count,
            "download_date": summary.download_date,
            "reused": summary.reused,
        }))
        .into_response(),
        Err(e) => Json(json!({
            "success": false,
            "error": e.to_string(),
        }))
        .into_response(),
    }
}

async fn resolve(
    Extension(state): Extension<Arc<AppState>>,
    Path(name): Path<String>,
) -> Response {
    match state.lookup.resolve(&name).await {
        Ok(Some(record)) => {
            let target = TransientTarget::from_record(&record);
            Json(json!({ "record": record, "target": target })).into_response()
        }
        Ok(None) => not_found(format!("Couldn't find '{name}' in the TNS catalog.")),
        Err(e) => internal_error(e),
    }
}

async fn search(
    Extension(state): Extension<Arc<AppState>>,
    Path(name): Path<String>,
) -> Response {
    let record = match state.lookup.resolve(&name).await {
        Ok(Some(record)) => record,
        Ok(None) => return not_found(format!("Couldn't find '{name}' in the TNS catalog.")),
        Err(e) => return internal_error(e),
    };
    let target = TransientTarget::from_record(&record);
    let report = state.orchestrator.query_all(&target).await;
    Json(report).into_response()
}

#[derive(Debug, Deserialize)]
struct BrokerQueryParams {
    name: Option<String>,
    ztf_id: Option<String>,
    ra: Option<f64>,
    dec: Option<f64>,
}

async fn broker_query(
    Extension(state): Extension<Arc<AppState>>,
    Path(broker): Path<String>,
    Query(params): Query<BrokerQueryParams>,
) -> Response {
    let Some(broker) = BrokerId::parse(&broker) else {
        return not_found(format!(
            "Unknown broker '{broker}'. Supported brokers: {}",
            crate::constants::get_supported_brokers().join(", ")
        ));
    };
    let Some(target) = build_target(&state, params).await else {
        return bad_request("name, ztf_id or ra/dec is required");
    };
    match state.orchestrator.query_broker(broker, &target).await {
        Ok(Some(observation)) => Json(observation).into_response(),
        Ok(None) => not_found(format!("{}: No object found.", broker.display_name())),
        Err(MetabrokerError::BrokerUnavailableForObject { reason, .. }) => not_found(reason),
        Err(e) => bad_gateway(e),
    }
}

/// Assemble the query target from whatever the caller supplied. A catalog
/// name gets resolved first; explicit ztf_id and coordinates win over the
/// resolved values.
async fn build_target(state: &AppState, params: BrokerQueryParams) -> Option<TransientTarget> {
    let mut target = match &params.name {
        Some(name) => match state.lookup.resolve(name).await {
            Ok(Some(record)) => TransientTarget::from_record(&record),
            _ => TransientTarget {
                name: name.clone(),
                ztf_id: None,
                coordinates: None,
            },
        },
        None => {
            let name = params
                .ztf_id
                .clone()
                .or_else(|| Some(format!("{} {}", params.ra?, params.dec?)))?;
            TransientTarget {
                name,
                ztf_id: None,
                coordinates: None,
            }
        }
    };
    if params.ztf_id.is_some() {
        target.ztf_id = params.ztf_id;
    }
    if let (Some(ra), Some(dec)) = (params.ra, params.dec) {
        target.coordinates = Some(Coordinates { ra, dec });
    }
    Some(target)
}

#[derive(Debug, Deserialize)]
struct LightcurveParams {
    ztf_id: Option<String>,
}

async fn alerce_lightcurve(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<LightcurveParams>,
) -> Response {
    let Some(ztf_id) = params.ztf_id else {
        return bad_request("ztf_id is required");
    };
    match state.alerce.lightcurve(&ztf_id).await {
        Ok(lightcurve) => Json(lightcurve).into_response(),
        Err(e) => bad_gateway(e),
    }
}

#[derive(Debug, Deserialize)]
struct CrossmatchParams {
    ra: Option<f64>,
    dec: Option<f64>,
    radius: Option<f64>,
}

async fn alerce_crossmatch(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<CrossmatchParams>,
) -> Response {
    let (Some(ra), Some(dec)) = (params.ra, params.dec) else {
        return bad_request("ra and dec coordinates are required");
    };
    let radius = params.radius.unwrap_or(CROSSMATCH_RADIUS_ARCSEC);
    match state
        .alerce
        .crossmatch(Coordinates { ra, dec }, radius)
        .await
    {
        Ok(catalogs) => Json(catalogs).into_response(),
        Err(e) => bad_gateway(e),
    }
}

#[derive(Debug, Deserialize)]
struct PhotometryParams {
    ra: Option<f64>,
    dec: Option<f64>,
    mjd_min: Option<f64>,
}

/// ATLAS credentials come from the server environment only. The legacy
/// surface accepted them as query parameters, which leaks passwords into
/// access logs.
async fn atlas_photometry(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<PhotometryParams>,
) -> Response {
    let Some(credentials) = &state.atlas_credentials else {
        return bad_request("ATLAS credentials not configured; set ATLAS_USERNAME and ATLAS_PASSWORD");
    };
    let (Some(ra), Some(dec)) = (params.ra, params.dec) else {
        return bad_request("ra and dec are required");
    };
    match state
        .atlas
        .photometry(credentials, Coordinates { ra, dec }, params.mjd_min)
        .await
    {
        Ok(result) => Json(result).into_response(),
        Err(e) => bad_gateway(e),
    }
}

fn not_found(message: String) -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "error": message }))).into_response()
}

fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}

fn bad_gateway(e: MetabrokerError) -> Response {
    (
        StatusCode::BAD_GATEWAY,
        Json(json!({ "error": e.to_string() })),
    )
        .into_response()
}

fn internal_error(e: MetabrokerError) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": e.to_string() })),
    )
        .into_response()
}

/// Create the HTTP server with all routes
pub fn create_server(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    // Catalog answers must never be cached by intermediaries; freshness is
    // the whole point of /api/tns-cache-info.
    let no_store = SetResponseHeaderLayer::overriding(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-store"),
    );

    let api = Router::new()
        .route("/tns-cache-info", get(tns_cache_info))
        .route("/tns-data", get(tns_data))
        .route("/update-tns", post(update_tns))
        .route("/resolve/:name", get(resolve))
        .route("/search/:name", get(search))
        .route("/broker/:broker", get(broker_query))
        .route("/alerce/lightcurve", get(alerce_lightcurve))
        .route("/alerce/crossmatch", get(alerce_crossmatch))
        .route("/atlas/photometry", get(atlas_photometry))
        .layer(no_store);

    Router::new()
        .route("/health", get(health))
        .nest("/api", api)
        .layer(Extension(state))
        .layer(ServiceBuilder::new().layer(cors))
}

/// Start the HTTP server on the specified port
pub async fn start_server(
    state: Arc<AppState>,
    port: u16,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = create_server(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    println!("🚀 HTTP server running on http://localhost:{port}");
    println!("💚 Health check: http://localhost:{port}/health");
    println!("🔭 Catalog info: http://localhost:{port}/api/tns-cache-info");

    Server::bind(&addr).serve(app.into_make_service()).await?;

    Ok(())
}
