use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;

use crate::domain::SpeciesRecord;
use crate::error::EtlError;

pub trait SpeciesClient {
    /// Look up one species. Any error means the id is skipped by the collector.
    fn fetch_species(&self, id: u32) -> Result<SpeciesRecord, EtlError>;
}

#[derive(Clone)]
pub struct PokeApiClient {
    client: Client,
    base_url: String,
}

impl PokeApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, EtlError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("species-etl/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| EtlError::SpeciesHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| EtlError::SpeciesHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn species_url(&self, id: u32) -> String {
        format!("{}/pokemon-species/{id}/", self.base_url)
    }
}

impl SpeciesClient for PokeApiClient {
    fn fetch_species(&self, id: u32) -> Result<SpeciesRecord, EtlError> {
        let response = self
            .client
            .get(self.species_url(id))
            .send()
            .map_err(|err| EtlError::SpeciesHttp(err.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|err| EtlError::SpeciesHttp(err.to_string()))?;
        species_from_response(status, &body)
    }
}

/// Map a raw `pokemon-species` response to a record. Non-2xx statuses keep the body
/// as the error message.
pub fn species_from_response(status: u16, body: &str) -> Result<SpeciesRecord, EtlError> {
    if !(200..300).contains(&status) {
        let message = if body.trim().is_empty() {
            "species request failed".to_string()
        } else {
            body.trim().to_string()
        };
        return Err(EtlError::SpeciesStatus { status, message });
    }
    let payload: Value =
        serde_json::from_str(body).map_err(|err| EtlError::SpeciesPayload(err.to_string()))?;
    parse_species(&payload)
}

/// Flatten a `pokemon-species` payload into a record.
pub fn parse_species(payload: &Value) -> Result<SpeciesRecord, EtlError> {
    Ok(SpeciesRecord {
        id: required_i64(payload, "id")?,
        name: payload
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| missing("name"))?,
        base_happiness: payload.get("base_happiness").and_then(Value::as_i64),
        capture_rate: required_i64(payload, "capture_rate")?,
        forms_switchable: required_bool(payload, "forms_switchable")?,
        gender_rate: required_i64(payload, "gender_rate")?,
        habitat_name: nested_name(payload, "habitat"),
        has_gender_differences: required_bool(payload, "has_gender_differences")?,
        hatch_counter: payload.get("hatch_counter").and_then(Value::as_i64),
        is_baby: required_bool(payload, "is_baby")?,
        is_legendary: required_bool(payload, "is_legendary")?,
        is_mythical: required_bool(payload, "is_mythical")?,
        shape_name: nested_name(payload, "shape"),
        growth_rate: nested_name(payload, "growth_rate"),
    })
}

/// `payload[field].name` when the nested object is present, `None` when it is absent
/// or `null`.
pub fn nested_name(payload: &Value, field: &str) -> Option<String> {
    payload
        .get(field)
        .and_then(Value::as_object)
        .and_then(|object| object.get("name"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn required_i64(payload: &Value, field: &str) -> Result<i64, EtlError> {
    payload
        .get(field)
        .and_then(Value::as_i64)
        .ok_or_else(|| missing(field))
}

fn required_bool(payload: &Value, field: &str) -> Result<bool, EtlError> {
    payload
        .get(field)
        .and_then(Value::as_bool)
        .ok_or_else(|| missing(field))
}

fn missing(field: &str) -> EtlError {
    EtlError::SpeciesPayload(format!("missing or mistyped field `{field}`"))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    fn bulbasaur() -> Value {
        json!({
            "id": 1,
            "name": "bulbasaur",
            "base_happiness": 50,
            "capture_rate": 45,
            "forms_switchable": false,
            "gender_rate": 1,
            "habitat": {"name": "grassland", "url": "https://pokeapi.co/api/v2/pokemon-habitat/3/"},
            "has_gender_differences": false,
            "hatch_counter": 20,
            "is_baby": false,
            "is_legendary": false,
            "is_mythical": false,
            "shape": {"name": "quadruped", "url": "https://pokeapi.co/api/v2/pokemon-shape/8/"},
            "growth_rate": {"name": "medium-slow", "url": "https://pokeapi.co/api/v2/growth-rate/4/"},
            "flavor_text_entries": []
        })
    }

    #[test]
    fn parse_full_payload() {
        let record = parse_species(&bulbasaur()).unwrap();
        assert_eq!(record.id, 1);
        assert_eq!(record.name, "bulbasaur");
        assert_eq!(record.base_happiness, Some(50));
        assert_eq!(record.habitat_name.as_deref(), Some("grassland"));
        assert_eq!(record.shape_name.as_deref(), Some("quadruped"));
        assert_eq!(record.growth_rate.as_deref(), Some("medium-slow"));
    }

    #[test]
    fn absent_nested_objects_become_null() {
        let mut payload = bulbasaur();
        payload["habitat"] = Value::Null;
        payload.as_object_mut().unwrap().remove("shape");
        payload["base_happiness"] = Value::Null;

        let record = parse_species(&payload).unwrap();
        assert_eq!(record.habitat_name, None);
        assert_eq!(record.shape_name, None);
        assert_eq!(record.base_happiness, None);
        assert_eq!(record.growth_rate.as_deref(), Some("medium-slow"));
    }

    #[test]
    fn missing_required_field_is_payload_error() {
        let mut payload = bulbasaur();
        payload.as_object_mut().unwrap().remove("capture_rate");
        assert_matches!(parse_species(&payload), Err(EtlError::SpeciesPayload(_)));
    }

    #[test]
    fn response_status_and_body_mapping() {
        assert_matches!(
            species_from_response(404, "Not Found"),
            Err(EtlError::SpeciesStatus { status: 404, ref message }) if message == "Not Found"
        );
        assert_matches!(
            species_from_response(500, ""),
            Err(EtlError::SpeciesStatus { status: 500, .. })
        );
        assert_matches!(
            species_from_response(200, "<html>"),
            Err(EtlError::SpeciesPayload(_))
        );

        let record = species_from_response(200, &bulbasaur().to_string()).unwrap();
        assert_eq!(record.name, "bulbasaur");
    }

    #[test]
    fn species_url_template() {
        let client =
            PokeApiClient::new("https://pokeapi.co/api/v2/", Duration::from_secs(5)).unwrap();
        assert_eq!(
            client.species_url(25),
            "https://pokeapi.co/api/v2/pokemon-species/25/"
        );
    }
}
