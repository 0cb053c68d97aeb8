//! Stand-in `Auth`/`Billing` adapters.
//!
//! Auth, billing, the search provider, LLM extraction, and rendering
//! are external collaborators this system consumes but does not
//! re-specify. The adapters below exist only so the binary is runnable
//! end to end without a real identity/billing backend wired in —
//! mirroring `crawlcore-worker::fetcher::HttpFetcher`'s role as a
//! minimal default for the `Fetcher` port. A production deployment
//! replaces both with real adapters behind the same `Auth`/`Billing`
//! traits.

use async_trait::async_trait;
use std::collections::HashMap;

use crawlcore_types::error::{CoreError, Result};
use crawlcore_types::ports::external::{Auth, AuthContext, Billing, SearchOptions, SearchProvider, SearchResult};

/// Trusts the caller's `Authorization: Bearer <team_id>` header as the
/// team identity. No signature check, no plan lookup: every team gets
/// the `"default"` plan and `zero_data_retention` enabled, so the
/// feature is exercisable without a real entitlements service.
pub struct HeaderAuthAdapter;

#[async_trait]
impl Auth for HeaderAuthAdapter {
    async fn authenticate(&self, api_key: &str) -> Result<AuthContext> {
        if api_key.trim().is_empty() {
            return Err(CoreError::Auth("missing API key".into()));
        }
        let mut flags = HashMap::new();
        flags.insert("zero_data_retention".to_string(), true);
        Ok(AuthContext {
            team_id: api_key.to_string(),
            plan: "default".to_string(),
            flags,
        })
    }
}

/// Reports unlimited credits and never bills. The core's credit
/// accounting calls through this port at the same points a real
/// billing adapter would occupy (`InsufficientCredits`, `bill`), so
/// swapping in a real adapter later requires no changes above this
/// module.
pub struct UnlimitedBilling;

#[async_trait]
impl Billing for UnlimitedBilling {
    async fn check_credits(&self, _team_id: &str, _n: u64) -> Result<(bool, u64)> {
        Ok((true, u64::MAX))
    }

    async fn bill(&self, _team_id: &str, _n: u64) -> Result<()> {
        Ok(())
    }
}

/// Always returns an empty result list. The real search provider is
/// an out-of-scope external collaborator (spec.md §1); per §6.1's
/// convention its errors — and, here, its total absence — are
/// swallowed into an empty list rather than surfaced to the caller.
pub struct NullSearchProvider;

#[async_trait]
impl SearchProvider for NullSearchProvider {
    async fn search(&self, _query: &str, _options: &SearchOptions) -> Vec<SearchResult> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_api_key_is_rejected() {
        let auth = HeaderAuthAdapter;
        assert!(auth.authenticate("").await.is_err());
    }

    #[tokio::test]
    async fn any_nonempty_key_authenticates() {
        let auth = HeaderAuthAdapter;
        let ctx = auth.authenticate("team-42").await.unwrap();
        assert_eq!(ctx.team_id, "team-42");
        assert_eq!(ctx.flags.get("zero_data_retention"), Some(&true));
    }

    #[tokio::test]
    async fn unlimited_billing_always_approves() {
        let billing = UnlimitedBilling;
        let (ok, _remaining) = billing.check_credits("team-1", 1_000_000).await.unwrap();
        assert!(ok);
        billing.bill("team-1", 1_000_000).await.unwrap();
    }

    #[tokio::test]
    async fn null_search_provider_returns_nothing() {
        let provider = NullSearchProvider;
        let results = provider.search("rust", &SearchOptions::default()).await;
        assert!(results.is_empty());
    }
}
