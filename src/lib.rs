// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Wearable Link: connect wearable health providers and keep their data scored
//!
//! This crate links a user's account to a wearable provider with OAuth 2.0
//! and PKCE, then periodically pulls the provider's health telemetry, scores
//! it and stores it as health records.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::SharedRepository;
use services::{
    AuthTransactionStore, HealthAggregator, HealthDataSource, KmsService, ProviderClient,
    ProviderService, ScoringConfig, SyncScheduler,
};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: SharedRepository,
    pub auth_store: Arc<AuthTransactionStore>,
    pub provider: Arc<ProviderService>,
    pub aggregator: Arc<HealthAggregator>,
    pub scheduler: Arc<SyncScheduler>,
}

impl AppState {
    /// Wire the services together.
    ///
    /// `source` is where the aggregator reads health data from; production
    /// passes a [`ProviderClient`] built from the same config. `kms` seals
    /// provider tokens at rest.
    pub fn new(
        config: Config,
        db: SharedRepository,
        kms: KmsService,
        source: Arc<dyn HealthDataSource>,
    ) -> Self {
        let auth_store = Arc::new(AuthTransactionStore::new(
            config.auth_transaction_ttl(),
            config.used_code_ceiling,
        ));
        let provider = Arc::new(ProviderService::new(
            ProviderClient::new(&config),
            db.clone(),
            kms,
            config.provider_scopes.clone(),
        ));
        let aggregator = Arc::new(HealthAggregator::new(
            source,
            db.clone(),
            ScoringConfig::default(),
            config.fetch_timeout(),
        ));
        let scheduler = Arc::new(SyncScheduler::new(Arc::clone(&aggregator)));

        Self {
            config,
            db,
            auth_store,
            provider,
            aggregator,
            scheduler,
        }
    }
}
