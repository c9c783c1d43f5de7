// HTTP request handlers
use crate::application::connector::{ConnectorHandle, DeployOutcome};
use crate::application::dashboard_service::GridCell;
use crate::application::deploy_service::DeployOptions;
use crate::application::dispatcher::RuntimeCommands;
use crate::application::error::ConnectorError;
use crate::application::signal_store::LogEntry;
use crate::domain::runtime::RuntimeEndpoint;
use crate::domain::signal::SignalValueMap;
use crate::presentation::app_state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("unknown connector {0}")]
    UnknownConnector(String),
    #[error("{0} was not sent: no active runtime or broker connection")]
    NotSent(&'static str),
    #[error("deploy is not configured")]
    DeployUnavailable,
    #[error(transparent)]
    Connector(#[from] ConnectorError),
    #[error("{0:#}")]
    Internal(anyhow::Error),
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        match error.downcast::<ConnectorError>() {
            Ok(error) => ApiError::Connector(error),
            Err(error) => ApiError::Internal(error),
        }
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::UnknownConnector(_) => StatusCode::NOT_FOUND,
            ApiError::NotSent(_) => StatusCode::CONFLICT,
            ApiError::DeployUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Connector(e) => match e {
                ConnectorError::UnknownRuntime(_) => StatusCode::NOT_FOUND,
                ConnectorError::RuntimeOffline(_) | ConnectorError::NotSent(_) => {
                    StatusCode::CONFLICT
                }
                ConnectorError::RequestTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
                ConnectorError::Stopped => StatusCode::SERVICE_UNAVAILABLE,
                ConnectorError::PrimaryTaken | ConnectorError::WizardTaken => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            ApiError::Internal(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn find_connector<'a>(state: &'a AppState, name: &str) -> ApiResult<&'a ConnectorHandle> {
    state
        .connector(name)
        .ok_or_else(|| ApiError::UnknownConnector(name.to_string()))
}

fn accepted(sent: bool, command: &'static str) -> ApiResult<StatusCode> {
    if sent {
        Ok(StatusCode::ACCEPTED)
    } else {
        Err(ApiError::NotSent(command))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorView {
    pub name: String,
    pub target_prefix: String,
    pub active_id: Option<String>,
    pub runtimes: Vec<RuntimeEndpoint>,
}

#[derive(Debug, Deserialize)]
pub struct SelectBody {
    pub kit_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ApisBody {
    pub apis: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct RunBody {
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct DeployBody {
    pub prototype_id: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub disable_code_convert: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct MockSignalsBody {
    pub signals: Vec<Value>,
}

#[derive(Debug, Deserialize)]
pub struct LibBody {
    pub name: String,
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

/// Roster published by the primary connector
pub async fn list_runtimes(State(state): State<Arc<AppState>>) -> Json<Vec<RuntimeEndpoint>> {
    Json(state.store.runtimes())
}

/// Runtime picked by the connector that owns the wizard selection
pub async fn get_wizard_target(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({ "kitId": state.store.wizard_active_id() }))
}

pub async fn get_connector(
    Path(name): Path<String>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<ConnectorView>> {
    let connector = find_connector(&state, &name)?;
    Ok(Json(ConnectorView {
        name: connector.name().to_string(),
        target_prefix: connector.prefix().to_string(),
        active_id: connector.active_id(),
        runtimes: connector.roster(),
    }))
}

pub async fn select_runtime(
    Path(name): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<SelectBody>,
) -> ApiResult<StatusCode> {
    find_connector(&state, &name)?.select(&body.kit_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn set_subscriptions(
    Path(name): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<ApisBody>,
) -> ApiResult<StatusCode> {
    find_connector(&state, &name)?.set_used_apis(body.apis).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn run_app(
    Path(name): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<RunBody>,
) -> ApiResult<StatusCode> {
    let connector = find_connector(&state, &name)?;
    accepted(connector.commands().run_app(&body.code).await, "run_python_app")
}

pub async fn stop_app(
    Path(name): Path<String>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<StatusCode> {
    let connector = find_connector(&state, &name)?;
    accepted(connector.commands().stop_app().await, "stop_python_app")
}

pub async fn deploy(
    Path(name): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<DeployBody>,
) -> ApiResult<Json<DeployOutcome>> {
    let connector = find_connector(&state, &name)?;
    let service = state
        .deploy_service
        .as_ref()
        .ok_or(ApiError::DeployUnavailable)?;

    let options = DeployOptions {
        code: body.code,
        disable_code_convert: body.disable_code_convert,
    };
    let outcome = service
        .deploy_prototype(connector, &body.prototype_id, options)
        .await?;
    Ok(Json(outcome))
}

pub async fn set_mock_signals(
    Path(name): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<MockSignalsBody>,
) -> ApiResult<StatusCode> {
    let connector = find_connector(&state, &name)?;
    accepted(
        connector.commands().set_mock_signals(body.signals).await,
        "set_mock_signals",
    )
}

/// Ask the runtime for its mock signals; the list arrives as a connector event
pub async fn load_mock_signals(
    Path(name): Path<String>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<StatusCode> {
    let connector = find_connector(&state, &name)?;
    accepted(connector.commands().load_mock_signals().await, "list_mock_signal")
}

pub async fn write_signals(
    Path(name): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(values): Json<Map<String, Value>>,
) -> ApiResult<StatusCode> {
    let connector = find_connector(&state, &name)?;
    accepted(
        connector.commands().write_signals_value(values).await,
        "write_signals_value",
    )
}

pub async fn install_lib(
    Path(name): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<LibBody>,
) -> ApiResult<StatusCode> {
    let connector = find_connector(&state, &name)?;
    accepted(
        connector.commands().request_install_lib(&body.name).await,
        "install_python_packages",
    )
}

pub async fn list_libs(
    Path(name): Path<String>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<StatusCode> {
    let connector = find_connector(&state, &name)?;
    accepted(connector.commands().list_python_libs().await, "list_python_packages")
}

pub async fn get_signals(State(state): State<Arc<AppState>>) -> Json<SignalValueMap> {
    Json(state.store.values())
}

pub async fn get_logs(State(state): State<Arc<AppState>>) -> Json<Vec<LogEntry>> {
    Json(state.store.log_history())
}

pub async fn get_dashboard(State(state): State<Arc<AppState>>) -> Json<Vec<GridCell>> {
    Json(state.dashboard_service.layout())
}
