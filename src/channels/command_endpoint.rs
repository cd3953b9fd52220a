//! HTTP command boundary.
//!
//! `POST /commands` accepts one chat command relayed by a gateway process,
//! runs it, and answers with exactly one [`Acknowledgement`]. The route
//! requires a bearer token and is only mounted when one is configured.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use subtle::ConstantTimeEq;
use tokio_util::sync::CancellationToken;

use super::commands::{CommandConfig, ParsedCommand, parse_command, usage};
use crate::announce::{Acknowledgement, AnnounceService};
use crate::safety::Invoker;

/// A chat message forwarded for execution.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandRequest {
    pub user_id: u64,
    #[serde(default)]
    pub role_ids: Vec<u64>,
    #[serde(default)]
    pub role_names: Vec<String>,
    pub content: String,
}

impl CommandRequest {
    fn invoker(&self) -> Invoker {
        Invoker {
            user_id: self.user_id,
            role_ids: self.role_ids.clone(),
            role_names: self.role_names.clone(),
        }
    }
}

#[derive(Clone)]
struct CommandState {
    service: Arc<AnnounceService>,
    commands: Arc<CommandConfig>,
    cancel: CancellationToken,
}

#[derive(Clone)]
struct TokenState {
    token: Arc<SecretString>,
}

/// Route fragment for [`super::HealthServer::add_routes`].
///
/// In-flight commands observe `cancel`, so shutting down aborts any
/// announcement that has not started sending.
pub fn command_routes(
    service: Arc<AnnounceService>,
    commands: CommandConfig,
    token: SecretString,
    cancel: CancellationToken,
) -> Router {
    let auth = TokenState {
        token: Arc::new(token),
    };
    Router::new()
        .route("/commands", post(run_command))
        .route_layer(middleware::from_fn_with_state(auth, require_token))
        .with_state(CommandState {
            service,
            commands: Arc::new(commands),
            cancel,
        })
}

async fn require_token(
    State(auth): State<TokenState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Response {
    if let Some(value) = headers.get("authorization")
        && let Ok(value) = value.to_str()
        && let Some(token) = value.strip_prefix("Bearer ")
        && bool::from(token.as_bytes().ct_eq(auth.token.expose_secret().as_bytes()))
    {
        return next.run(request).await;
    }
    (StatusCode::UNAUTHORIZED, "Invalid or missing auth token").into_response()
}

async fn run_command(
    State(state): State<CommandState>,
    Json(request): Json<CommandRequest>,
) -> Json<Acknowledgement> {
    let ack = match parse_command(&request.content, &state.commands) {
        ParsedCommand::Announce(args) => {
            state
                .service
                .handle(&request.invoker(), &args, &state.cancel)
                .await
        }
        ParsedCommand::Help => Acknowledgement {
            success: true,
            text: usage(&state.commands.prefix),
        },
        ParsedCommand::Invalid(hint) => Acknowledgement::failure(hint),
        ParsedCommand::NotACommand => Acknowledgement::failure(format!(
            "Not a command. {}",
            usage(&state.commands.prefix)
        )),
    };
    Json(ack)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::announce::AnnounceConfig;
    use crate::channels::{Destination, HealthServer, HealthServerConfig};
    use crate::document::{Block, Document, DocumentReader, Paragraph, Run};
    use crate::ledger::StatusSlot;
    use crate::media::ImageResolver;
    use crate::testing::{MemoryDocumentSource, MemoryObjectStore, RecordingPlatform};

    async fn start(platform: Arc<RecordingPlatform>) -> (HealthServer, String) {
        let source = MemoryDocumentSource::new().with_document(Document {
            id: "doc-1".to_string(),
            blocks: vec![Block::Paragraph(Paragraph {
                runs: vec![Run::Text("Big news".to_string())],
            })],
            ..Document::default()
        });
        let service = AnnounceService::new(
            DocumentReader::new(Arc::new(source)),
            ImageResolver::new(Arc::new(MemoryObjectStore::new())),
            platform,
            AnnounceConfig::new("doc-1"),
        );

        let mut server = HealthServer::new(
            HealthServerConfig {
                addr: "127.0.0.1:0".parse().unwrap(),
            },
            StatusSlot::default(),
        );
        server.add_routes(command_routes(
            Arc::new(service),
            CommandConfig::default(),
            SecretString::from("s3cret".to_string()),
            CancellationToken::new(),
        ));
        server.start().await.unwrap();
        let url = format!("http://{}/commands", server.local_addr().unwrap());
        (server, url)
    }

    async fn post_command(url: &str, token: Option<&str>, content: &str) -> reqwest::Response {
        let mut request = reqwest::Client::new().post(url).json(&serde_json::json!({
            "user_id": 1,
            "content": content,
        }));
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        request.send().await.unwrap()
    }

    #[tokio::test]
    async fn test_announce_command_round_trip() {
        let platform = Arc::new(RecordingPlatform::new());
        let (mut server, url) = start(Arc::clone(&platform)).await;

        let ack: Acknowledgement = post_command(&url, Some("s3cret"), "!announce <#55>")
            .await
            .json()
            .await
            .unwrap();
        assert_eq!(ack.text, "✅ Announcement sent.");

        let sent = platform.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, Destination::channel(55));
        assert_eq!(sent[0].1.text, "Big news");
        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_rejects_missing_or_wrong_token() {
        let platform = Arc::new(RecordingPlatform::new());
        let (mut server, url) = start(Arc::clone(&platform)).await;

        assert_eq!(
            post_command(&url, None, "!announce 55").await.status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            post_command(&url, Some("nope"), "!announce 55").await.status(),
            StatusCode::UNAUTHORIZED
        );
        assert!(platform.sent().is_empty());
        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_invalid_command_gets_usage() {
        let platform = Arc::new(RecordingPlatform::new());
        let (mut server, url) = start(platform).await;

        let ack: Acknowledgement = post_command(&url, Some("s3cret"), "!announce general")
            .await
            .json()
            .await
            .unwrap();
        assert!(!ack.success);
        assert!(ack.text.contains("Usage: !announce"));
        server.shutdown().await;
    }
}
