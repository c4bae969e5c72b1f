//! Connectivity check

use davsync_core::{DavsyncResult, Depth};
use tracing::warn;

use crate::transport::WebdavTransport;

/// Verify the address is well formed and the server answers at all
pub async fn check_health(transport: &WebdavTransport) -> DavsyncResult<()> {
    transport.config().validate()?;
    // A Depth: 0 PROPFIND on the server root is the lightest round trip
    transport
        .backend()
        .propfind("/", Depth::Zero)
        .await
        .map(|_| ())
}

/// Returns true if the server is reachable; logs the reason otherwise
pub async fn check_connectivity(transport: &WebdavTransport) -> bool {
    match check_health(transport).await {
        Ok(()) => true,
        Err(e) => {
            warn!(address = %transport.config().address, error = %e, "WebDAV connectivity check failed");
            false
        }
    }
}
