//! Billing models shared by providers, the engine and host helpers.
//!
//! These are vendor-neutral: a provider translates its SDK's own types into
//! these before handing them to the engine.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The three kinds of purchasable items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkuKind {
    /// May be bought again once consumed.
    Consumable,
    /// Bought once, owned forever.
    Entitlement,
    /// Recurs on a schedule.
    Subscription,
}

impl SkuKind {
    /// All kinds, in declaration order.
    pub const ALL: [SkuKind; 3] = [Self::Consumable, Self::Entitlement, Self::Subscription];
}

impl fmt::Display for SkuKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Consumable => "consumable",
            Self::Entitlement => "entitlement",
            Self::Subscription => "subscription",
        };
        f.write_str(s)
    }
}

/// Identity of a billing provider.
///
/// Two providers are the same provider iff both the name and the package
/// name match. Provider selection uses this to drop duplicate registrations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProviderInfo {
    /// Provider name, e.g. `"Google"`.
    pub name: String,
    /// Package of the store app backing this provider, if any.
    pub package_name: Option<String>,
}

impl ProviderInfo {
    /// Creates provider info with no package name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            package_name: None,
        }
    }

    /// Sets the package name.
    pub fn with_package(mut self, package_name: impl Into<String>) -> Self {
        self.package_name = Some(package_name.into());
        self
    }

    /// Returns the package name if it is set and non-empty.
    pub fn package_name(&self) -> Option<&str> {
        self.package_name.as_deref().filter(|p| !p.is_empty())
    }
}

impl fmt::Display for ProviderInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.package_name() {
            Some(package) => write!(f, "{} ({package})", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Description of one purchasable item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkuDetails {
    pub sku: String,
    pub kind: SkuKind,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Localized, formatted price as reported by the store.
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub icon_url: Option<String>,
    /// Name of the provider that produced these details.
    #[serde(default)]
    pub provider_name: Option<String>,
    /// Raw vendor payload, kept for callers that need store-specific fields.
    #[serde(default)]
    pub original_json: Option<String>,
}

impl SkuDetails {
    /// Creates details with only the sku and kind set.
    pub fn new(sku: impl Into<String>, kind: SkuKind) -> Self {
        Self {
            sku: sku.into(),
            kind,
            title: None,
            description: None,
            price: None,
            icon_url: None,
            provider_name: None,
            original_json: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_price(mut self, price: impl Into<String>) -> Self {
        self.price = Some(price.into());
        self
    }

    pub fn with_icon_url(mut self, icon_url: impl Into<String>) -> Self {
        self.icon_url = Some(icon_url.into());
        self
    }

    pub fn with_provider(mut self, provider_name: impl Into<String>) -> Self {
        self.provider_name = Some(provider_name.into());
        self
    }

    pub fn with_original_json(mut self, json: impl Into<String>) -> Self {
        self.original_json = Some(json.into());
        self
    }
}

/// A completed purchase as reported by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Purchase {
    pub sku: String,
    pub kind: SkuKind,
    /// Store token used to consume or acknowledge the purchase.
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub order_id: Option<String>,
    /// Purchase time in milliseconds since the epoch.
    #[serde(default)]
    pub purchase_time_ms: Option<i64>,
    #[serde(default)]
    pub canceled: bool,
    #[serde(default)]
    pub provider_name: Option<String>,
    #[serde(default)]
    pub original_json: Option<String>,
    /// Receipt signature, if the store signs purchases.
    #[serde(default)]
    pub signature: Option<String>,
}

impl Purchase {
    /// Creates a purchase with only the sku and kind set.
    pub fn new(sku: impl Into<String>, kind: SkuKind) -> Self {
        Self {
            sku: sku.into(),
            kind,
            token: None,
            order_id: None,
            purchase_time_ms: None,
            canceled: false,
            provider_name: None,
            original_json: None,
            signature: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_order_id(mut self, order_id: impl Into<String>) -> Self {
        self.order_id = Some(order_id.into());
        self
    }

    pub fn with_purchase_time(mut self, purchase_time_ms: i64) -> Self {
        self.purchase_time_ms = Some(purchase_time_ms);
        self
    }

    pub fn with_provider(mut self, provider_name: impl Into<String>) -> Self {
        self.provider_name = Some(provider_name.into());
        self
    }

    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    pub fn with_original_json(mut self, json: impl Into<String>) -> Self {
        self.original_json = Some(json.into());
        self
    }

    /// Marks the purchase as canceled (refunded or revoked by the store).
    pub fn canceled(mut self) -> Self {
        self.canceled = true;
        self
    }
}

/// Result of a sku details query, keyed by sku.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkusDetails {
    pub details: BTreeMap<String, SkuDetails>,
    /// Skus the provider could not find.
    #[serde(default)]
    pub unavailable: Vec<String>,
}

impl SkusDetails {
    /// Creates an empty result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a result from a list of details, keyed by each detail's sku.
    pub fn from_details(details: impl IntoIterator<Item = SkuDetails>) -> Self {
        Self {
            details: details.into_iter().map(|d| (d.sku.clone(), d)).collect(),
            unavailable: Vec::new(),
        }
    }

    /// Adds details under their own sku.
    pub fn insert(&mut self, details: SkuDetails) {
        self.details.insert(details.sku.clone(), details);
    }

    /// Records a sku the provider could not resolve.
    pub fn mark_unavailable(&mut self, sku: impl Into<String>) {
        self.unavailable.push(sku.into());
    }

    pub fn get(&self, sku: &str) -> Option<&SkuDetails> {
        self.details.get(sku)
    }

    /// Skus with details, in sorted order.
    pub fn skus(&self) -> Vec<&str> {
        self.details.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.details.len()
    }

    pub fn is_empty(&self) -> bool {
        self.details.is_empty()
    }

    /// Folds another result into this one.
    pub fn merge(&mut self, other: SkusDetails) {
        self.details.extend(other.details);
        self.unavailable.extend(other.unavailable);
    }
}

/// Outcome of a purchase verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationResult {
    /// The purchase is trusted.
    Success,
    /// The purchase was checked and rejected.
    Failed,
    /// The purchase could not be checked.
    Error,
}

impl VerificationResult {
    #[must_use]
    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// One owned purchase together with its verification outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub purchase: Purchase,
    pub verification: VerificationResult,
}

impl InventoryItem {
    /// Wraps a purchase that has not been verified yet.
    ///
    /// Providers produce items this way; the engine replaces the
    /// verification result before the inventory leaves it.
    pub fn unverified(purchase: Purchase) -> Self {
        Self {
            purchase,
            verification: VerificationResult::Error,
        }
    }
}

/// Purchases owned by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    pub items: Vec<InventoryItem>,
    /// Whether the provider has another page to return.
    #[serde(default)]
    pub has_more: bool,
}

impl Inventory {
    /// Builds an inventory page from unverified purchases.
    pub fn from_purchases(purchases: impl IntoIterator<Item = Purchase>, has_more: bool) -> Self {
        Self {
            items: purchases.into_iter().map(InventoryItem::unverified).collect(),
            has_more,
        }
    }

    pub fn purchases(&self) -> impl Iterator<Item = &Purchase> {
        self.items.iter().map(|i| &i.purchase)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
