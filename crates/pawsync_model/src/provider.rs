//! Service providers, listing drafts and availability.

use crate::error::{require, ModelError, ModelResult};
use crate::ids::ClientRef;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Service category offered by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Dog walking.
    DogWalking,
    /// Grooming.
    Grooming,
}

impl Category {
    /// Wire name of the category.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::DogWalking => "dog_walking",
            Category::Grooming => "grooming",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "dog_walking" => Ok(Category::DogWalking),
            "grooming" => Ok(Category::Grooming),
            other => Err(ModelError::UnknownVariant {
                kind: "category",
                value: other.to_string(),
            }),
        }
    }
}

/// Listing lifecycle. Cancellation is a soft delete and can be reversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderStatus {
    /// Listed and bookable.
    #[default]
    Active,
    /// Soft-deleted by its owner.
    Cancelled,
}

/// Social-proof counters shown on a listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocialProof {
    /// Distinct local owners who booked this month.
    pub local_bookers_this_month: u32,
    /// Bookers who share a group with the viewer.
    pub shared_group_bookers: u32,
    /// Average response time in minutes, when known.
    pub response_time_minutes: Option<u32>,
}

/// A service provider listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    /// Provider ID.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Service category.
    pub category: Category,
    /// Suburb the provider operates in.
    pub suburb: String,
    /// Short description.
    #[serde(default)]
    pub description: String,
    /// Starting price in whole currency units.
    pub price_from: u32,
    /// Average rating (0-5).
    pub rating: f64,
    /// Number of reviews.
    #[serde(default)]
    pub review_count: u32,
    /// Latitude.
    #[serde(default)]
    pub latitude: f64,
    /// Longitude.
    #[serde(default)]
    pub longitude: f64,
    /// Distance from the query origin, when one was given.
    #[serde(default)]
    pub distance_km: Option<f64>,
    /// User who owns the listing.
    #[serde(default)]
    pub owner_user_id: Option<String>,
    /// Human label for the owning account.
    #[serde(default)]
    pub owner_label: Option<String>,
    /// Listing status.
    #[serde(default)]
    pub status: ProviderStatus,
    /// Social-proof counters.
    #[serde(default)]
    pub social_proof: SocialProof,
    /// Idempotency key of the write that created this listing, if client-originated.
    #[serde(default)]
    pub client_ref: Option<ClientRef>,
}

impl Provider {
    /// Returns true if `user_id` owns this listing.
    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.owner_user_id.as_deref() == Some(user_id)
    }

    /// Returns true if the listing is bookable.
    pub fn is_active(&self) -> bool {
        self.status == ProviderStatus::Active
    }
}

/// Fields for creating a new listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderDraft {
    /// Owning user.
    pub user_id: String,
    /// Display name.
    pub name: String,
    /// Service category.
    pub category: Category,
    /// Suburb.
    pub suburb: String,
    /// Description.
    pub description: String,
    /// Starting price.
    pub price_from: u32,
    /// Idempotency key for this write.
    pub client_ref: ClientRef,
}

impl ProviderDraft {
    /// Checks required fields.
    pub fn validate(&self) -> ModelResult<()> {
        require("user_id", &self.user_id)?;
        require("name", &self.name)?;
        require("suburb", &self.suburb)?;
        Ok(())
    }

    /// Builds the client-only listing shown until the server confirms the write.
    pub fn to_local_provider(&self) -> Provider {
        Provider {
            id: self.client_ref.local_id(),
            name: self.name.trim().to_string(),
            category: self.category,
            suburb: self.suburb.trim().to_string(),
            description: self.description.trim().to_string(),
            price_from: self.price_from,
            rating: 0.0,
            review_count: 0,
            latitude: 0.0,
            longitude: 0.0,
            distance_km: None,
            owner_user_id: Some(self.user_id.clone()),
            owner_label: None,
            status: ProviderStatus::Active,
            social_proof: SocialProof::default(),
            client_ref: Some(self.client_ref),
        }
    }
}

/// Partial update to a listing owned by `actor_user_id`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderUpdate {
    /// Acting user; must own the listing.
    pub actor_user_id: String,
    /// New name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New suburb.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suburb: Option<String>,
    /// New description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// New starting price.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_from: Option<u32>,
}

impl ProviderUpdate {
    /// Applies the update to a local copy of the listing.
    pub fn apply_to(&self, provider: &mut Provider) {
        if let Some(name) = &self.name {
            provider.name = name.trim().to_string();
        }
        if let Some(suburb) = &self.suburb {
            provider.suburb = suburb.trim().to_string();
        }
        if let Some(description) = &self.description {
            provider.description = description.trim().to_string();
        }
        if let Some(price) = self.price_from {
            provider.price_from = price;
        }
    }
}

/// Sort order for provider listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    /// Best text/locality match first.
    #[default]
    Relevance,
    /// Highest rating first.
    Rating,
    /// Nearest first.
    Distance,
    /// Cheapest first.
    Price,
}

impl SortBy {
    /// Wire name of the sort order.
    pub fn as_str(&self) -> &'static str {
        match self {
            SortBy::Relevance => "relevance",
            SortBy::Rating => "rating",
            SortBy::Distance => "distance",
            SortBy::Price => "price",
        }
    }
}

/// A geographic point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
}

/// Query for `GET providers`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderQuery {
    /// Restrict to a category.
    pub category: Option<Category>,
    /// Restrict to a suburb.
    pub suburb: Option<String>,
    /// Minimum rating.
    pub min_rating: Option<f64>,
    /// Maximum distance from `origin`.
    pub max_distance_km: Option<f64>,
    /// Query origin.
    pub origin: Option<GeoPoint>,
    /// Free-text search.
    pub q: Option<String>,
    /// Sort order.
    pub sort_by: SortBy,
    /// Include soft-cancelled listings.
    pub include_inactive: bool,
    /// Restrict to listings owned by this user.
    pub user_id: Option<String>,
}

impl ProviderQuery {
    /// Renders the query as URL query pairs, skipping unset fields.
    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(category) = self.category {
            pairs.push(("category", category.to_string()));
        }
        if let Some(suburb) = &self.suburb {
            pairs.push(("suburb", suburb.clone()));
        }
        if let Some(min_rating) = self.min_rating {
            pairs.push(("minRating", min_rating.to_string()));
        }
        if let Some(max_distance) = self.max_distance_km {
            pairs.push(("maxDistanceKm", max_distance.to_string()));
        }
        if let Some(origin) = self.origin {
            pairs.push(("lat", origin.lat.to_string()));
            pairs.push(("lng", origin.lng.to_string()));
        }
        if let Some(q) = &self.q {
            pairs.push(("q", q.clone()));
        }
        pairs.push(("sortBy", self.sort_by.as_str().to_string()));
        if self.include_inactive {
            pairs.push(("includeInactive", "true".to_string()));
        }
        if let Some(user_id) = &self.user_id {
            pairs.push(("userId", user_id.clone()));
        }
        pairs
    }
}

/// Why a slot cannot be booked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotBlockReason {
    /// Provider blacked the slot out.
    Blackout,
    /// An active booking occupies it.
    Booked,
    /// A live hold reserves it.
    Held,
}

/// One bookable slot for a provider on a date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilitySlot {
    /// Slot date.
    pub date: NaiveDate,
    /// Start time in `HH:MM` form.
    pub time_slot: String,
    /// Whether the slot can be held.
    pub available: bool,
    /// Block reason when unavailable.
    #[serde(default)]
    pub reason: Option<SlotBlockReason>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> ProviderDraft {
        ProviderDraft {
            user_id: "user_1".into(),
            name: " Golden Walkers ".into(),
            category: Category::DogWalking,
            suburb: "Surry Hills".into(),
            description: "Reliable neighbourhood walks.".into(),
            price_from: 28,
            client_ref: ClientRef::new(),
        }
    }

    #[test]
    fn category_parse_roundtrip() {
        assert_eq!("grooming".parse::<Category>().unwrap(), Category::Grooming);
        assert_eq!(Category::DogWalking.to_string(), "dog_walking");
        assert!("cat_sitting".parse::<Category>().is_err());
    }

    #[test]
    fn local_provider_carries_client_ref() {
        let draft = draft();
        let provider = draft.to_local_provider();
        assert_eq!(provider.id, draft.client_ref.local_id());
        assert_eq!(provider.client_ref, Some(draft.client_ref));
        assert_eq!(provider.name, "Golden Walkers");
        assert!(provider.is_owned_by("user_1"));
        assert!(provider.is_active());
    }

    #[test]
    fn draft_validation() {
        let mut draft = draft();
        assert!(draft.validate().is_ok());
        draft.name = "  ".into();
        assert_eq!(
            draft.validate(),
            Err(ModelError::MissingField { field: "name" })
        );
    }

    #[test]
    fn query_pairs_skip_unset_fields() {
        let query = ProviderQuery {
            category: Some(Category::Grooming),
            q: Some("wash".into()),
            ..Default::default()
        };
        let pairs = query.to_query_pairs();
        assert_eq!(
            pairs,
            vec![
                ("category", "grooming".to_string()),
                ("q", "wash".to_string()),
                ("sortBy", "relevance".to_string()),
            ]
        );
    }

    #[test]
    fn update_applies_only_set_fields() {
        let mut provider = draft().to_local_provider();
        ProviderUpdate {
            actor_user_id: "user_1".into(),
            price_from: Some(35),
            ..Default::default()
        }
        .apply_to(&mut provider);
        assert_eq!(provider.price_from, 35);
        assert_eq!(provider.name, "Golden Walkers");
    }
}
