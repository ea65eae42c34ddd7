//! Delivery of claim notifications
//!
//! The workflow builds the verification link and hands it over; actual email
//! delivery happens outside this service.

use anyhow::{Context, Result};
use async_trait::async_trait;
use claims_common::{ListingIdentity, ListingType};
use serde::Serialize;
use tracing::{info, warn};

use crate::models::Claim;

/// Outbound channel for claim events
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver the verification link to the claimant
    async fn send_verification(&self, claim: &Claim, verification_url: &str) -> Result<()>;

    /// Announce that a listing has been claimed
    async fn send_listing_claimed(&self, claim: &Claim) -> Result<()>;
}

/// Kind of event carried by a [`NotificationPayload`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationEvent {
    VerificationRequested,
    ListingClaimed,
}

/// Webhook payload sent for every claim event
#[derive(Debug, Serialize)]
pub struct NotificationPayload {
    pub event: NotificationEvent,

    pub claim_id: String,

    pub listing_type: ListingType,

    pub listing_slug: String,

    pub listing_country: String,

    pub listing_name: String,

    /// Recipient of the email
    pub email: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_url: Option<String>,
}

impl NotificationPayload {
    pub fn new(event: NotificationEvent, claim: &Claim, verification_url: Option<&str>) -> Self {
        let ListingIdentity {
            listing_type,
            slug,
            country,
        } = claim.listing.clone();

        Self {
            event,
            claim_id: claim.id.clone(),
            listing_type,
            listing_slug: slug,
            listing_country: country,
            listing_name: claim.listing_name.clone(),
            email: claim.claimant.email.clone(),
            verification_url: verification_url.map(str::to_string),
        }
    }
}

/// Writes notifications to the log instead of sending them (development)
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_verification(&self, claim: &Claim, verification_url: &str) -> Result<()> {
        info!(
            claim_id = %claim.id,
            email = %claim.claimant.email,
            listing = %claim.listing_name,
            "Verification link: {}",
            verification_url
        );
        Ok(())
    }

    async fn send_listing_claimed(&self, claim: &Claim) -> Result<()> {
        info!(
            claim_id = %claim.id,
            listing = %claim.listing,
            "Listing claimed"
        );
        Ok(())
    }
}

/// Posts notifications to an HTTP endpoint that handles email delivery
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    webhook_url: String,
    http_client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(webhook_url: String) -> Self {
        Self {
            webhook_url,
            http_client: reqwest::Client::new(),
        }
    }

    async fn post(&self, payload: &NotificationPayload) -> Result<()> {
        let response = self
            .http_client
            .post(&self.webhook_url)
            .json(payload)
            .send()
            .await
            .context("Failed to connect to notification webhook")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            warn!(
                "Webhook returned error status {} for claim: {}",
                status, payload.claim_id
            );
            anyhow::bail!("Notification webhook rejected event: {}", error_text);
        }

        info!(
            "Webhook sent successfully for claim: {} ({:?})",
            payload.claim_id, payload.event
        );
        Ok(())
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send_verification(&self, claim: &Claim, verification_url: &str) -> Result<()> {
        let payload = NotificationPayload::new(
            NotificationEvent::VerificationRequested,
            claim,
            Some(verification_url),
        );
        self.post(&payload).await
    }

    async fn send_listing_claimed(&self, claim: &Claim) -> Result<()> {
        let payload = NotificationPayload::new(NotificationEvent::ListingClaimed, claim, None);
        self.post(&payload).await
    }
}
