//! Remote browser plumbing: the provider contract, the CDP connection
//! manager, and the portal client that drives a live tab.

mod connection;
mod portal;
mod provider;

pub use connection::{allocate_browser, resolve_endpoint, CdpConnector};
pub use portal::BrowserPortalClient;
pub use provider::{BrowserProvider, HttpBrowserProvider};
