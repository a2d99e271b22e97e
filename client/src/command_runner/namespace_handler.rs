use std::sync::Arc;

use utilities::logger::{instrument, trace, tracing};

use super::CommandError;
use crate::master::service::{Listing, MasterService};

pub struct NamespaceHandler {
    master: Arc<dyn MasterService>,
}

/// Directories first with a trailing `/`, then files, one per line.
fn format_listing(listing: &Listing) -> String {
    listing
        .dirs
        .iter()
        .map(|dir| format!("{dir}/"))
        .chain(listing.files.iter().cloned())
        .collect::<Vec<String>>()
        .join("\n")
}

impl NamespaceHandler {
    pub fn new(master: Arc<dyn MasterService>) -> Self {
        Self { master }
    }

    #[instrument(skip(self))]
    pub async fn mkdir(&self, path: &str) -> Result<String, CommandError> {
        self.master.mkdir(path).await?;
        Ok(String::new())
    }

    #[instrument(skip(self))]
    pub async fn rmdir(&self, path: &str) -> Result<String, CommandError> {
        self.master.rmdir(path).await?;
        Ok(String::new())
    }

    #[instrument(skip(self))]
    pub async fn ls(&self, path: &str) -> Result<String, CommandError> {
        let listing = self.master.ls(path).await?;
        trace!(dirs = listing.dirs.len(), files = listing.files.len(), "got listing");
        Ok(format_listing(&listing))
    }

    #[instrument(skip(self))]
    pub async fn mv(&self, old_path: &str, new_path: &str) -> Result<String, CommandError> {
        self.master.mv(old_path, new_path).await?;
        Ok(String::new())
    }
}
