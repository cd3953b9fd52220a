//! Wiring: builds every component from [`Config`] and runs the service.
//!
//! Each external collaborator is constructed once here and handed to the
//! components that need it. Nothing is process-global.

use std::net::SocketAddr;
use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use tokio_util::sync::CancellationToken;

use crate::announce::{AnnounceConfig, AnnounceService};
use crate::channels::{
    ChatPlatform, CommandConfig, DiscordClient, HealthServer, HealthServerConfig, command_routes,
};
use crate::config::Config;
use crate::document::{DocumentReader, DocumentSource};
use crate::error::Error;
use crate::google::{DriveStore, GoogleClient, GoogleDocsSource, ServiceAccountAuth, SheetsLedger};
use crate::ledger::{DeliveryLoop, LedgerStore};
use crate::media::{HttpLinkFetcher, ImageResolver, LinkFetcher, ObjectStore};
use crate::safety::AccessPolicy;

/// The external collaborators the relay talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub documents: Arc<dyn DocumentSource>,
    pub objects: Arc<dyn ObjectStore>,
    pub ledger: Arc<dyn LedgerStore>,
    pub platform: Arc<dyn ChatPlatform>,
    pub links: Arc<dyn LinkFetcher>,
}

impl Collaborators {
    /// Google Docs/Drive/Sheets plus Discord, authenticated from `config`.
    pub fn production(config: &Config) -> Result<Self, Error> {
        let auth = ServiceAccountAuth::from_json(config.google.credentials_json.expose_secret())?;
        let google = GoogleClient::new(Arc::new(auth));

        let platform = DiscordClient::new(config.discord_token.clone());
        let max_bytes = platform.limits().max_total_bytes;
        let links = HttpLinkFetcher::new().with_max_bytes(max_bytes);

        Ok(Self {
            documents: Arc::new(GoogleDocsSource::new(google.clone())),
            objects: Arc::new(DriveStore::new(google.clone()).with_max_bytes(max_bytes)),
            ledger: Arc::new(SheetsLedger::new(
                google,
                config.google.spreadsheet_id.clone(),
                config.google.sheet_name.clone(),
            )),
            platform: Arc::new(platform),
            links: Arc::new(links),
        })
    }
}

/// A fully wired relay.
pub struct Relay {
    announce: Arc<AnnounceService>,
    delivery: Arc<DeliveryLoop>,
    commands: CommandConfig,
    command_token: Option<SecretString>,
    health_addr: SocketAddr,
}

impl Relay {
    /// Build against the production Google and Discord bindings.
    pub fn from_config(config: &Config) -> Result<Self, Error> {
        Ok(Self::assemble(Collaborators::production(config)?, config))
    }

    /// Build against any set of collaborators.
    pub fn assemble(parts: Collaborators, config: &Config) -> Self {
        let settings = &config.announce;

        let resolver = ImageResolver::new(parts.objects)
            .with_concurrency(settings.image_fetch_concurrency);
        let policy = AccessPolicy::open()
            .with_allowed_roles(settings.allowed_roles.clone())
            .with_rate_limit(settings.rate_limit);
        let announce = AnnounceService::new(
            DocumentReader::new(parts.documents),
            resolver,
            Arc::clone(&parts.platform),
            AnnounceConfig::new(config.google.document_id.clone())
                .with_timeout(settings.render_timeout),
        )
        .with_policy(policy);

        let delivery = DeliveryLoop::new(
            parts.ledger,
            parts.platform,
            parts.links,
            config.scan.clone(),
        );

        Self {
            announce: Arc::new(announce),
            delivery: Arc::new(delivery),
            commands: CommandConfig::new(settings.command_prefix.clone()),
            command_token: settings.command_token.clone(),
            health_addr: config.health_addr,
        }
    }

    pub fn announce(&self) -> &AnnounceService {
        &self.announce
    }

    pub fn delivery(&self) -> &DeliveryLoop {
        &self.delivery
    }

    /// Serve the liveness endpoint and run the delivery loop until
    /// `shutdown` fires.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), Error> {
        let mut health = HealthServer::new(
            HealthServerConfig {
                addr: self.health_addr,
            },
            self.delivery.status_slot(),
        );
        match &self.command_token {
            Some(token) => health.add_routes(command_routes(
                Arc::clone(&self.announce),
                self.commands.clone(),
                token.clone(),
                shutdown.child_token(),
            )),
            None => tracing::info!("COMMAND_TOKEN not set; POST /commands is disabled"),
        }
        health.start().await?;

        let delivery = Arc::clone(&self.delivery).spawn(shutdown.child_token());
        tracing::info!(
            document_id = %self.announce.config().document_id,
            health = %self.health_addr,
            "Relay running"
        );

        shutdown.cancelled().await;

        health.shutdown().await;
        if let Err(e) = delivery.await {
            tracing::error!(error = %e, "Delivery loop task failed");
        }
        tracing::info!("Relay stopped");
        Ok(())
    }
}
