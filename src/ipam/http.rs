//! NetBox-dialect HTTP implementation of [`AddressSpace`].

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use super::{AddressRecord, AddressSpace, NextFree, Prefix};
use crate::{LoadtestError, Result};

const CARVE_DESCRIPTION: &str = "ipam-loadtest created this prefix";
const ALLOCATE_DESCRIPTION: &str = "ipam-loadtest allocated this address";

#[derive(Debug, Deserialize)]
struct PrefixPage {
    results: Vec<Prefix>,
}

/// Client for the NetBox IPAM REST API.
///
/// Holds one connection pool plus the base URL and token; the whole value
/// is shared read-only across workers, so there is no per-call session
/// state anywhere.
pub struct IpamClient {
    client: Client,
    base_url: String,
}

impl IpamClient {
    /// Build a client for `http://{host}/api` authenticated with `token`.
    ///
    /// Requests carry no overall timeout: slow replies from a loaded
    /// service are the thing being measured.
    pub fn new(host: &str, token: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let auth = HeaderValue::from_str(&format!("Token {}", token))
            .map_err(|_| LoadtestError::Config("API token is not a valid header value".into()))?;
        headers.insert(AUTHORIZATION, auth);

        let client = Client::builder()
            .user_agent(concat!("ipam-loadtest/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .connect_timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(IpamClient {
            client,
            base_url: format!("http://{}/api", host),
        })
    }
}

#[async_trait]
impl AddressSpace for IpamClient {
    async fn lookup_prefix(&self, cidr: &str) -> Result<Prefix> {
        let url = format!(
            "{}/ipam/prefixes/?prefix={}",
            self.base_url,
            cidr.replace('/', "%2F")
        );
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(LoadtestError::Api(format!(
                "prefix lookup for {} returned {}",
                cidr, status
            )));
        }

        let page: PrefixPage = response.json().await?;
        page.results
            .into_iter()
            .next()
            .ok_or_else(|| LoadtestError::Api(format!("prefix {} not found", cidr)))
    }

    async fn delete_prefix(&self, prefix: &Prefix) -> Result<()> {
        let url = format!("{}/ipam/prefixes/{}/", self.base_url, prefix.id);
        let response = self.client.delete(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(LoadtestError::Api(format!(
                "deleting prefix {} returned {}",
                prefix.prefix, status
            )));
        }
        Ok(())
    }

    async fn carve_child_prefix(&self, parent_cidr: &str, prefix_length: u8) -> Result<Prefix> {
        let parent = self.lookup_prefix(parent_cidr).await?;
        let url = format!(
            "{}/ipam/prefixes/{}/available-prefixes/",
            self.base_url, parent.id
        );
        let body = serde_json::json!({
            "prefix_length": prefix_length,
            "description": CARVE_DESCRIPTION,
        });

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(LoadtestError::Api(format!(
                "carving a /{} from {} returned {}",
                prefix_length, parent_cidr, status
            )));
        }
        Ok(response.json().await?)
    }

    async fn allocate_next_free(&self, prefix: &Prefix) -> Result<NextFree> {
        let url = format!(
            "{}/ipam/prefixes/{}/available-ips/",
            self.base_url, prefix.id
        );
        let body = serde_json::json!({ "description": ALLOCATE_DESCRIPTION });

        let response = self.client.post(&url).json(&body).send().await?;
        match response.status() {
            // NetBox answers 204 when the prefix has no free addresses left.
            StatusCode::NO_CONTENT => Ok(NextFree::Exhausted),
            status if status.is_success() => Ok(NextFree::Allocated(response.json().await?)),
            status => Err(LoadtestError::Api(format!(
                "next-free allocation in {} returned {}",
                prefix.prefix, status
            ))),
        }
    }

    async fn claim_address(
        &self,
        address: &str,
        description: &str,
    ) -> Result<Option<AddressRecord>> {
        let url = format!("{}/ipam/ip-addresses/", self.base_url);
        let body = serde_json::json!({
            "address": address,
            "description": description,
        });

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(Some(response.json().await?))
        } else if status.is_client_error() {
            // Claim declined (typically a duplicate assignment); the caller
            // skips this address rather than retrying.
            Ok(None)
        } else {
            Err(LoadtestError::Api(format!(
                "claiming {} returned {}",
                address, status
            )))
        }
    }

    async fn release_address(&self, record: &AddressRecord) -> Result<bool> {
        let url = format!("{}/ipam/ip-addresses/{}/", self.base_url, record.id);
        let response = self.client.delete(&url).send().await?;
        Ok(response.status() == StatusCode::NO_CONTENT)
    }
}
