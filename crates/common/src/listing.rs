//! Directory listing identity

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Kind of directory entry that can be claimed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingType {
    SolarPark,
    SheepFarm,
}

impl ListingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingType::SolarPark => "solar_park",
            ListingType::SheepFarm => "sheep_farm",
        }
    }

    /// Path segment of the public directory page for this kind of listing
    pub fn directory_path(&self) -> &'static str {
        match self {
            ListingType::SolarPark => "solarparks",
            ListingType::SheepFarm => "sheepfarms",
        }
    }
}

impl fmt::Display for ListingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ListingType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "solar_park" => Ok(ListingType::SolarPark),
            "sheep_farm" => Ok(ListingType::SheepFarm),
            other => Err(Error::InvalidListingType(other.to_string())),
        }
    }
}

/// Composite key of a directory entry.
///
/// Slugs repeat across countries and listing kinds, so all three parts are
/// needed to address a single listing. The country is stored lowercased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ListingIdentity {
    pub listing_type: ListingType,
    pub slug: String,
    pub country: String,
}

impl ListingIdentity {
    pub fn new(listing_type: ListingType, slug: &str, country: &str) -> Self {
        Self {
            listing_type,
            slug: slug.trim().to_string(),
            country: country.trim().to_lowercase(),
        }
    }

    /// Stable storage key fragment, e.g. `solar_park:netherlands:zonnepark-a`
    pub fn storage_key(&self) -> String {
        format!("{}:{}:{}", self.listing_type, self.country, self.slug)
    }

    /// Canonical page of the listing on the public site
    pub fn page_path(&self) -> String {
        format!(
            "/{}/{}/{}",
            self.listing_type.directory_path(),
            self.country,
            self.slug
        )
    }
}

impl fmt::Display for ListingIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.listing_type, self.country, self.slug)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_type_parse() {
        assert_eq!("solar_park".parse::<ListingType>().unwrap(), ListingType::SolarPark);
        assert_eq!("sheep_farm".parse::<ListingType>().unwrap(), ListingType::SheepFarm);
        assert!("windmill".parse::<ListingType>().is_err());
    }

    #[test]
    fn test_identity_normalizes_country() {
        let identity = ListingIdentity::new(ListingType::SolarPark, " zonnepark-a ", "Netherlands");
        assert_eq!(identity.slug, "zonnepark-a");
        assert_eq!(identity.country, "netherlands");
        assert_eq!(identity.storage_key(), "solar_park:netherlands:zonnepark-a");
    }

    #[test]
    fn test_page_path() {
        let park = ListingIdentity::new(ListingType::SolarPark, "zonnepark-a", "netherlands");
        assert_eq!(park.page_path(), "/solarparks/netherlands/zonnepark-a");

        let farm = ListingIdentity::new(ListingType::SheepFarm, "de-kudde", "Belgium");
        assert_eq!(farm.page_path(), "/sheepfarms/belgium/de-kudde");
    }

    #[test]
    fn test_same_slug_different_country_differs() {
        let a = ListingIdentity::new(ListingType::SolarPark, "park", "germany");
        let b = ListingIdentity::new(ListingType::SolarPark, "park", "france");
        assert_ne!(a, b);
    }
}
