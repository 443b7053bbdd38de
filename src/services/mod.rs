// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod aggregator;
pub mod auth_store;
pub mod kms;
pub mod pkce;
pub mod provider;
pub mod scheduler;
pub mod scoring;

pub use aggregator::{HealthAggregator, HealthDataSource, SyncSummary, TokenProvider};
pub use auth_store::{AuthTransactionStore, ReaperHandle, RedeemedTransaction};
pub use kms::KmsService;
pub use provider::{ProviderClient, ProviderService, ProviderTokens};
pub use scheduler::SyncScheduler;
pub use scoring::ScoringConfig;
