use std::fmt::Display;
use std::str::FromStr;

use blobfs::Error;
use serde::{Deserialize, Serialize};

/// Environment variable holding the storage account name,
///
pub const ACCOUNT_ENV: &str = "AZURE_STORAGE_ACCOUNT";

/// Environment variable holding the storage account key,
///
pub const KEY_ENV: &str = "AZURE_STORAGE_KEY";

/// Environment variable holding the endpoint protocol, optional,
///
pub const PROTOCOL_ENV: &str = "AZURE_STORAGE_PROTOCOL";

/// Protocol used to reach the blob endpoint,
///
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    #[default]
    Https,
}

impl FromStr for Protocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(Protocol::Http),
            "https" => Ok(Protocol::Https),
            _ => Err(Error::Config(format!("Unrecognized protocol `{s}`"))),
        }
    }
}

impl Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Http => write!(f, "http"),
            Protocol::Https => write!(f, "https"),
        }
    }
}

/// Struct for storage account settings,
///
/// # Connection descriptor
///
/// Settings can be read from, and formatted as, a connection descriptor of the form,
///
/// `DefaultEndpointsProtocol=https;AccountName=<name>;AccountKey=<key>`
///
/// An optional `BlobEndpoint=<uri>` overrides the endpoint derived from the account name,
/// ex. when targeting a local emulator.
///
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountConfig {
    pub account_name: String,
    pub account_key: String,
    #[serde(default)]
    pub protocol: Protocol,
    #[serde(default)]
    pub blob_endpoint: Option<String>,
}

impl AccountConfig {
    /// Returns a new account config,
    ///
    pub fn new(
        account_name: impl Into<String>,
        account_key: impl Into<String>,
        protocol: Protocol,
    ) -> Self {
        Self {
            account_name: account_name.into(),
            account_key: account_key.into(),
            protocol,
            blob_endpoint: None,
        }
    }

    /// Returns self w/ a blob endpoint override,
    ///
    pub fn with_blob_endpoint(mut self, blob_endpoint: impl Into<String>) -> Self {
        self.blob_endpoint = Some(blob_endpoint.into());
        self
    }

    /// Reads the account config from the environment,
    ///
    pub fn from_env() -> Result<Self, Error> {
        let account_name = std::env::var(ACCOUNT_ENV)
            .map_err(|_| Error::Config(format!("{ACCOUNT_ENV} is not set")))?;
        let account_key =
            std::env::var(KEY_ENV).map_err(|_| Error::Config(format!("{KEY_ENV} is not set")))?;
        let protocol = match std::env::var(PROTOCOL_ENV) {
            Ok(protocol) => protocol.parse()?,
            Err(_) => Protocol::default(),
        };

        Ok(Self::new(account_name, account_key, protocol))
    }

    /// Returns the blob endpoint uri,
    ///
    pub fn endpoint(&self) -> String {
        match self.blob_endpoint.as_ref() {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => format!(
                "{}://{}.blob.core.windows.net",
                self.protocol, self.account_name
            ),
        }
    }

    /// Returns the connection descriptor for this account,
    ///
    pub fn connection_string(&self) -> String {
        let mut connection_string = format!(
            "DefaultEndpointsProtocol={};AccountName={};AccountKey={}",
            self.protocol, self.account_name, self.account_key
        );

        if let Some(endpoint) = self.blob_endpoint.as_ref() {
            connection_string.push_str(";BlobEndpoint=");
            connection_string.push_str(endpoint);
        }

        connection_string
    }
}

impl FromStr for AccountConfig {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut account_name = None;
        let mut account_key = None;
        let mut protocol = Protocol::default();
        let mut blob_endpoint = None;

        for setting in s.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            // Keys are base64 and may end w/ `=`, only split on the first one
            let Some((name, value)) = setting.split_once('=') else {
                return Err(Error::Config(format!("Malformed setting `{setting}`")));
            };

            match name {
                "DefaultEndpointsProtocol" => protocol = value.parse()?,
                "AccountName" => account_name = Some(value.to_string()),
                "AccountKey" => account_key = Some(value.to_string()),
                "BlobEndpoint" => blob_endpoint = Some(value.to_string()),
                _ => {}
            }
        }

        Ok(Self {
            account_name: account_name
                .ok_or_else(|| Error::Config("AccountName is missing".to_string()))?,
            account_key: account_key
                .ok_or_else(|| Error::Config("AccountKey is missing".to_string()))?,
            protocol,
            blob_endpoint,
        })
    }
}

impl std::fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountConfig")
            .field("account_name", &self.account_name)
            .field("account_key", &"<redacted>")
            .field("protocol", &self.protocol)
            .field("blob_endpoint", &self.blob_endpoint)
            .finish()
    }
}
