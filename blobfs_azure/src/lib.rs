mod config;
pub use config::AccountConfig;
pub use config::Protocol;
pub use config::ACCOUNT_ENV;
pub use config::KEY_ENV;
pub use config::PROTOCOL_ENV;

mod store;
pub use store::AzureBlobStore;

use blobfs::{AdapterOptions, BlobPathAdapter};

/// Type alias for an adapter over an Azure storage account,
///
pub type AzureBlobAdapter = BlobPathAdapter<AzureBlobStore>;

/// Returns an adapter for the storage account,
///
/// The client handle is created here and reused for the lifetime of the adapter.
///
pub fn connect(
    account_name: impl Into<String>,
    account_key: impl Into<String>,
    protocol: Protocol,
) -> AzureBlobAdapter {
    let config = AccountConfig::new(account_name, account_key, protocol);
    BlobPathAdapter::new(AzureBlobStore::new(&config))
}

/// Returns an adapter for the storage account w/ adapter options,
///
pub fn connect_with_options(config: &AccountConfig, options: AdapterOptions) -> AzureBlobAdapter {
    BlobPathAdapter::with_options(AzureBlobStore::new(config), options)
}
