//! Init command handler.

use color_eyre::Result;

use crate::store;

use super::App;

impl App {
    /// Run the init command to prepare the configured store.
    pub async fn run_init(&self) -> Result<()> {
        let config = self.load_config()?;
        config.validate()?;

        tracing::info!(backend = ?config.store.backend, "Preparing store");
        store::prepare(&config.store)
            .await
            .map_err(|e| color_eyre::eyre::eyre!("Failed to prepare store: {}", e))?;

        if config.source_store.is_some() {
            tracing::info!("[source_store] is read as is and not prepared");
        }
        tracing::info!("Store ready");
        Ok(())
    }
}
