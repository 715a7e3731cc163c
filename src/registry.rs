use std::collections::BTreeSet;
use std::fs;
use std::time::Duration;

use camino::Utf8Path;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};

use crate::error::TriadError;
use crate::store::Store;

pub const OBO_REGISTRY_URL: &str = "https://obofoundry.org/registry/ontologies.jsonld";
pub const BIOPORTAL_ONTOLOGIES_URL: &str = "https://data.bioontology.org/ontologies";

/// Lowercased ontology prefixes known to the OBO Foundry and BioPortal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefixRegistry {
    #[serde(default)]
    pub obo: BTreeSet<String>,
    #[serde(default)]
    pub bioportal: BTreeSet<String>,
}

impl PrefixRegistry {
    pub fn new<I, J, S, T>(obo: I, bioportal: J) -> Self
    where
        I: IntoIterator<Item = S>,
        J: IntoIterator<Item = T>,
        S: AsRef<str>,
        T: AsRef<str>,
    {
        Self {
            obo: normalize_prefixes(obo),
            bioportal: normalize_prefixes(bioportal),
        }
    }

    pub fn load(path: &Utf8Path) -> Result<Self, TriadError> {
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| TriadError::Filesystem(format!("read registry {path}: {err}")))?;
        let registry: PrefixRegistry = serde_json::from_str(&content)
            .map_err(|err| TriadError::RegistryParse(err.to_string()))?;
        Ok(Self::new(registry.obo, registry.bioportal))
    }

    pub fn save(&self, path: &Utf8Path) -> Result<(), TriadError> {
        let content = serde_json::to_vec_pretty(self)
            .map_err(|err| TriadError::RegistryParse(err.to_string()))?;
        Store::write_bytes_atomic(path, &content)
    }

    pub fn uses_obo_prefix(&self, prefix: &str) -> bool {
        self.obo.contains(&prefix.trim().to_lowercase())
    }

    pub fn uses_bioportal_prefix(&self, prefix: &str) -> bool {
        self.bioportal.contains(&prefix.trim().to_lowercase())
    }

    pub fn is_known(&self, prefix: &str) -> bool {
        self.uses_obo_prefix(prefix) || self.uses_bioportal_prefix(prefix)
    }

    pub fn len(&self) -> usize {
        self.obo.union(&self.bioportal).count()
    }

    pub fn is_empty(&self) -> bool {
        self.obo.is_empty() && self.bioportal.is_empty()
    }
}

fn normalize_prefixes<I, S>(prefixes: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    prefixes
        .into_iter()
        .map(|prefix| prefix.as_ref().trim().to_lowercase())
        .filter(|prefix| !prefix.is_empty())
        .collect()
}

pub trait RegistryClient: Send + Sync {
    fn fetch_obo_prefixes(&self) -> Result<Vec<String>, TriadError>;
    fn fetch_bioportal_prefixes(&self) -> Result<Vec<String>, TriadError>;
}

#[derive(Clone)]
pub struct RegistryHttpClient {
    client: Client,
    bioportal_api_key: Option<String>,
}

impl RegistryHttpClient {
    pub fn new() -> Result<Self, TriadError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("envtriad/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| TriadError::RegistryHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| TriadError::RegistryHttp(err.to_string()))?;
        let bioportal_api_key = std::env::var("BIOPORTAL_API_KEY")
            .ok()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());
        Ok(Self {
            client,
            bioportal_api_key,
        })
    }

    fn get_text(&self, url: &str, query: &[(&str, &str)]) -> Result<String, TriadError> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .map_err(|err| TriadError::RegistryHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "registry request failed".to_string());
            return Err(TriadError::RegistryStatus { status, message });
        }
        response
            .text()
            .map_err(|err| TriadError::RegistryHttp(err.to_string()))
    }
}

impl RegistryClient for RegistryHttpClient {
    fn fetch_obo_prefixes(&self) -> Result<Vec<String>, TriadError> {
        let body = self.get_text(OBO_REGISTRY_URL, &[])?;
        parse_obo_registry(&body)
    }

    fn fetch_bioportal_prefixes(&self) -> Result<Vec<String>, TriadError> {
        let Some(api_key) = self.bioportal_api_key.as_deref() else {
            tracing::warn!("BIOPORTAL_API_KEY not set; skipping BioPortal prefixes");
            return Ok(Vec::new());
        };
        let body = self.get_text(
            BIOPORTAL_ONTOLOGIES_URL,
            &[("apikey", api_key), ("display_links", "false")],
        )?;
        parse_bioportal_ontologies(&body)
    }
}

pub fn fetch_registry(client: &dyn RegistryClient) -> Result<PrefixRegistry, TriadError> {
    let obo = client.fetch_obo_prefixes()?;
    let bioportal = client.fetch_bioportal_prefixes()?;
    tracing::info!(obo = obo.len(), bioportal = bioportal.len(), "fetched prefix registry");
    Ok(PrefixRegistry::new(obo, bioportal))
}

#[derive(Deserialize)]
struct OboRegistry {
    #[serde(default)]
    ontologies: Vec<OboOntology>,
}

#[derive(Deserialize)]
struct OboOntology {
    #[serde(default)]
    id: Option<String>,
    #[serde(default, rename = "preferredPrefix")]
    preferred_prefix: Option<String>,
}

#[derive(Deserialize)]
struct BioportalOntology {
    #[serde(default)]
    acronym: Option<String>,
}

/// Both the ontology id and its preferred prefix count as OBO prefixes.
pub fn parse_obo_registry(body: &str) -> Result<Vec<String>, TriadError> {
    let registry: OboRegistry =
        serde_json::from_str(body).map_err(|err| TriadError::RegistryParse(err.to_string()))?;
    Ok(registry
        .ontologies
        .into_iter()
        .flat_map(|ontology| [ontology.id, ontology.preferred_prefix])
        .flatten()
        .filter(|prefix| !prefix.trim().is_empty())
        .collect())
}

pub fn parse_bioportal_ontologies(body: &str) -> Result<Vec<String>, TriadError> {
    let ontologies: Vec<BioportalOntology> =
        serde_json::from_str(body).map_err(|err| TriadError::RegistryParse(err.to_string()))?;
    Ok(ontologies
        .into_iter()
        .filter_map(|ontology| ontology.acronym)
        .filter(|prefix| !prefix.trim().is_empty())
        .collect())
}
