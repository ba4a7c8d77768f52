pub use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Return [`Error::Cancelled`] once `cancel` has fired.
pub fn check(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(Error::Cancelled)
    } else {
        Ok(())
    }
}
