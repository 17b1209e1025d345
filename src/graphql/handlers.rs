//! HTTP handlers for the GraphQL endpoint
//!
//! One path serves everything: `POST` runs queries and mutations, `GET` upgrades
//! to a WebSocket for subscriptions, shows GraphiQL to browsers, or runs a
//! GraphQL-over-GET query. Authentication happens before execution in all three.

use async_graphql::http::GraphiQLSource;
use async_graphql::parser::parse_query;
use async_graphql::parser::types::OperationType;
use async_graphql::{Data, ErrorExtensions, Pos, ServerError};
use async_graphql_axum::{GraphQLProtocol, GraphQLRequest, GraphQLResponse, GraphQLWebSocket};
use axum::extract::{FromRequest, FromRequestParts, Request, State, WebSocketUpgrade};
use axum::http::header::{ACCEPT, ALLOW, AUTHORIZATION, UPGRADE};
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::app::AppState;

use super::auth::{AuthError, AuthGate};

fn authorization_header(headers: &HeaderMap) -> Option<&str> {
    headers.get(AUTHORIZATION).and_then(|h| h.to_str().ok())
}

fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    headers
        .get(UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false)
}

fn accepts_html(headers: &HeaderMap) -> bool {
    headers
        .get(ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("text/html"))
        .unwrap_or(false)
}

/// Token from a `connection_init` payload, with or without the `Bearer ` prefix
fn connection_param_token(params: &JsonValue) -> Option<&str> {
    params
        .get("authorization")
        .or_else(|| params.get("Authorization"))
        .and_then(|v| v.as_str())
        .map(|token| token.strip_prefix("Bearer ").unwrap_or(token))
}

/// 401 with a GraphQL-shaped error body
fn unauthorized(err: AuthError) -> Response {
    let response = async_graphql::Response::from_errors(vec![
        err.extend().into_server_error(Pos::default()),
    ]);
    (StatusCode::UNAUTHORIZED, GraphQLResponse::from(response)).into_response()
}

/// Whether the document declares a mutation. Unparsable documents are left
/// for execution to report.
fn declares_mutation(query: &str) -> bool {
    parse_query(query)
        .map(|doc| {
            doc.operations
                .iter()
                .any(|(_, op)| op.node.ty == OperationType::Mutation)
        })
        .unwrap_or(false)
}

/// 405 for mutations sent over GET
fn mutation_over_get() -> Response {
    let response = async_graphql::Response::from_errors(vec![ServerError::new(
        "Can only perform a mutation operation from a POST request.",
        None,
    )]);
    (
        StatusCode::METHOD_NOT_ALLOWED,
        [(ALLOW, "POST")],
        GraphQLResponse::from(response),
    )
        .into_response()
}

/// Run the gate and attach the verified claims to the request
fn authorize(
    gate: &AuthGate,
    headers: &HeaderMap,
    request: async_graphql::Request,
) -> Result<async_graphql::Request, Response> {
    match gate.authenticate(authorization_header(headers)) {
        Ok(Some(claims)) => Ok(request.data(claims)),
        Ok(None) => {
            debug!("Executing anonymous GraphQL request");
            Ok(request)
        }
        Err(e) => Err(unauthorized(e)),
    }
}

/// Authenticate, then execute. Nothing runs when the gate refuses the request.
async fn execute(
    state: &AppState,
    headers: &HeaderMap,
    request: async_graphql::Request,
) -> Response {
    match authorize(&state.auth, headers, request) {
        Ok(request) => GraphQLResponse::from(state.schema.execute(request).await).into_response(),
        Err(response) => response,
    }
}

/// `POST <graphql path>`: queries and mutations
pub async fn graphql_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    req: GraphQLRequest,
) -> Response {
    execute(&state, &headers, req.into_inner()).await
}

/// `GET <graphql path>`: WebSocket subscriptions, GraphiQL, or a query in the URL.
/// Mutations are only accepted over `POST`.
pub async fn graphql_get_handler(State(state): State<AppState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();

    if is_websocket_upgrade(&parts.headers) {
        return subscription_handler(state, parts).await;
    }

    if accepts_html(&parts.headers) {
        return Html(
            GraphiQLSource::build()
                .endpoint(&state.config.graphql_path)
                .subscription_endpoint(&state.config.graphql_path)
                .finish(),
        )
        .into_response();
    }

    let headers = parts.headers.clone();
    let req: GraphQLRequest =
        match GraphQLRequest::from_request(Request::from_parts(parts, body), &state).await {
            Ok(req) => req,
            Err(rejection) => return rejection.into_response(),
        };
    let request = req.into_inner();
    if declares_mutation(&request.query) {
        return mutation_over_get();
    }
    execute(&state, &headers, request).await
}

/// Upgrade to a GraphQL WebSocket. The gate runs once, on `connection_init`,
/// using the upgrade request's header or else the init payload.
async fn subscription_handler(state: AppState, mut parts: Parts) -> Response {
    let protocol = match GraphQLProtocol::from_request_parts(&mut parts, &state).await {
        Ok(protocol) => protocol,
        Err(rejection) => return rejection.into_response(),
    };
    let ws = match WebSocketUpgrade::from_request_parts(&mut parts, &state).await {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    let header_auth = authorization_header(&parts.headers).map(str::to_owned);
    let gate = state.auth.clone();
    let schema = state.schema.clone();

    ws.protocols(["graphql-transport-ws", "graphql-ws"])
        .on_upgrade(move |socket| {
            GraphQLWebSocket::new(socket, schema, protocol)
                .on_connection_init(move |params| async move {
                    let outcome = match header_auth.as_deref() {
                        Some(header) => gate.authenticate(Some(header)),
                        None => gate.authenticate_token(connection_param_token(&params)),
                    };
                    let claims = match outcome {
                        Ok(claims) => claims,
                        Err(e) => {
                            debug!(error = %e, "Refusing subscription connection");
                            return Err(e.extend());
                        }
                    };

                    let mut data = Data::default();
                    if let Some(claims) = claims {
                        data.insert(claims);
                    }
                    Ok(data)
                })
                .serve()
        })
}
