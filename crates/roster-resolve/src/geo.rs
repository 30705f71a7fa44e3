//! Free-text location → normalized address and country.

use std::{future::Future, sync::Arc, time::Duration};

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::{Error, Result, cache::ResponseCache};

/// A resolved location. All-empty fields record a query with no match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
  pub address:      String,
  /// ISO 3166-1 alpha-2 code.
  pub country_code: String,
  pub country_name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AddressComponent {
  pub long_name:  String,
  pub short_name: String,
  #[serde(default)]
  pub types:      Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GeocodeMatch {
  pub formatted_address:  String,
  #[serde(default)]
  pub address_components: Vec<AddressComponent>,
}

impl GeocodeMatch {
  fn country(&self) -> Option<&AddressComponent> {
    self
      .address_components
      .iter()
      .find(|c| c.types.iter().any(|t| t == "country"))
  }
}

/// A geocoding backend.
pub trait Geocoder: Send + Sync {
  /// Candidate matches for `query`, best first. No match is an empty list.
  fn geocode(
    &self,
    query: String,
  ) -> impl Future<Output = Result<Vec<GeocodeMatch>>> + Send + '_;
}

// ─── Google implementation ───────────────────────────────────────────────────

#[derive(Deserialize)]
struct GeocodeResponse {
  status:        String,
  #[serde(default)]
  results:       Vec<GeocodeMatch>,
  #[serde(default)]
  error_message: Option<String>,
}

/// The Google Geocoding JSON API.
#[derive(Clone)]
pub struct GoogleGeocoder {
  client:   Client,
  base_url: String,
  api_key:  String,
}

impl GoogleGeocoder {
  pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
    let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
    Ok(Self {
      client,
      base_url: base_url.trim_end_matches('/').to_owned(),
      api_key: api_key.to_owned(),
    })
  }
}

impl Geocoder for GoogleGeocoder {
  async fn geocode(&self, query: String) -> Result<Vec<GeocodeMatch>> {
    let resp = self
      .client
      .get(&self.base_url)
      .query(&[("address", query.as_str()), ("key", self.api_key.as_str())])
      .send()
      .await?;

    if !resp.status().is_success() {
      return Err(Error::Status {
        endpoint: "geocode".into(),
        status:   resp.status().as_u16(),
      });
    }

    let body: GeocodeResponse = resp.json().await?;
    match body.status.as_str() {
      "OK" => Ok(body.results),
      "ZERO_RESULTS" => Ok(Vec::new()),
      other => Err(Error::Api {
        endpoint: "geocode".into(),
        message:  body.error_message.unwrap_or_else(|| other.to_owned()),
      }),
    }
  }
}

// ─── Resolver ────────────────────────────────────────────────────────────────

/// Caching front for a [`Geocoder`].
pub struct GeoResolver<G> {
  geocoder: G,
  cache:    Arc<ResponseCache>,
  ttl:      Duration,
}

impl<G: Geocoder> GeoResolver<G> {
  pub fn new(geocoder: G, cache: Arc<ResponseCache>, ttl: Duration) -> Self {
    Self { geocoder, cache, ttl }
  }

  /// Resolve `text` to a location that has a country.
  ///
  /// Queries are trimmed and lowercased. Both "no match" and "no country"
  /// outcomes are cached and replayed as errors; transport errors are not.
  pub async fn resolve(&self, text: &str) -> Result<Location> {
    let key = text.trim().to_lowercase();
    if key.is_empty() {
      return Err(Error::EmptyLocation);
    }

    if let Some(hit) = self.cache.locations.get(&key) {
      return replay(key, hit);
    }

    let matches = self.geocoder.geocode(key.clone()).await?;
    let Some(best) = matches.first() else {
      self.cache.locations.insert(&key, Location::default(), self.ttl);
      return Err(Error::NoLocationMatch(key));
    };

    let location = match best.country() {
      Some(country) => Location {
        address:      best.formatted_address.clone(),
        country_code: country.short_name.clone(),
        country_name: country.long_name.clone(),
      },
      None => Location {
        address: best.formatted_address.clone(),
        ..Default::default()
      },
    };
    self.cache.locations.insert(&key, location.clone(), self.ttl);
    replay(key, location)
  }
}

fn replay(key: String, location: Location) -> Result<Location> {
  if location.address.is_empty() && location.country_code.is_empty() {
    Err(Error::NoLocationMatch(key))
  } else if location.country_code.is_empty() {
    Err(Error::NoCountry(key))
  } else {
    Ok(location)
  }
}
