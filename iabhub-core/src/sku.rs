//! Sku id translation between canonical ids and provider-specific ids.
//!
//! Ids the resolver does not know pass through unchanged in both
//! directions; [`to_provider_or_same`] and [`to_canonical_or_same`] apply
//! that rule.

use crate::error::{IabError, IabResult};
use std::collections::HashMap;
use tracing::debug;

/// Bidirectional sku mapping for one provider.
pub trait SkuResolver: Send + Sync {
    /// Maps a provider sku back to the canonical sku.
    fn to_canonical(&self, provider_sku: &str) -> Option<String>;

    /// Maps a canonical sku to the provider's sku.
    fn to_provider(&self, canonical_sku: &str) -> Option<String>;
}

/// Maps every sku to itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityResolver;

impl SkuResolver for IdentityResolver {
    fn to_canonical(&self, provider_sku: &str) -> Option<String> {
        Some(provider_sku.to_string())
    }

    fn to_provider(&self, canonical_sku: &str) -> Option<String> {
        Some(canonical_sku.to_string())
    }
}

/// Table-driven resolver. The mapping must be one-to-one.
#[derive(Debug, Clone, Default)]
pub struct MapSkuResolver {
    to_provider: HashMap<String, String>,
    to_canonical: HashMap<String, String>,
}

impl MapSkuResolver {
    /// Creates an empty resolver; every sku passes through.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a resolver from `(canonical, provider)` pairs.
    pub fn from_pairs<I, C, P>(pairs: I) -> IabResult<Self>
    where
        I: IntoIterator<Item = (C, P)>,
        C: Into<String>,
        P: Into<String>,
    {
        let mut resolver = Self::new();
        for (canonical, provider) in pairs {
            resolver.add(canonical, provider)?;
        }
        Ok(resolver)
    }

    /// Adds one mapping. Fails if either side is already mapped.
    pub fn add(
        &mut self,
        canonical: impl Into<String>,
        provider: impl Into<String>,
    ) -> IabResult<()> {
        let canonical = canonical.into();
        let provider = provider.into();
        if let Some(existing) = self.to_provider.get(&canonical) {
            return Err(IabError::InvalidSkuMapping(format!(
                "canonical sku {canonical} already maps to {existing}"
            )));
        }
        if let Some(existing) = self.to_canonical.get(&provider) {
            return Err(IabError::InvalidSkuMapping(format!(
                "provider sku {provider} already maps to {existing}"
            )));
        }
        self.to_canonical.insert(provider.clone(), canonical.clone());
        self.to_provider.insert(canonical, provider);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.to_provider.len()
    }

    pub fn is_empty(&self) -> bool {
        self.to_provider.is_empty()
    }
}

impl SkuResolver for MapSkuResolver {
    fn to_canonical(&self, provider_sku: &str) -> Option<String> {
        self.to_canonical.get(provider_sku).cloned()
    }

    fn to_provider(&self, canonical_sku: &str) -> Option<String> {
        self.to_provider.get(canonical_sku).cloned()
    }
}

/// Provider sku for `canonical`, or `canonical` itself when unmapped.
pub fn to_provider_or_same(resolver: &dyn SkuResolver, canonical: &str) -> String {
    resolver.to_provider(canonical).unwrap_or_else(|| {
        debug!("no provider mapping for sku {canonical}, passing through");
        canonical.to_string()
    })
}

/// Canonical sku for `provider_sku`, or `provider_sku` itself when unmapped.
pub fn to_canonical_or_same(resolver: &dyn SkuResolver, provider_sku: &str) -> String {
    resolver.to_canonical(provider_sku).unwrap_or_else(|| {
        debug!("no canonical mapping for sku {provider_sku}, passing through");
        provider_sku.to_string()
    })
}
