//! Audit command handler.

use color_eyre::Result;

use crate::context::Context;
use crate::di::FromRef;
use crate::engine::{render_audit, NormalizationAudit};
use crate::store;

use super::App;

impl App {
    /// Run the read-only normalisation audit.
    pub async fn run_audit(&self, json: bool) -> Result<()> {
        let config = self.load_config()?;
        config.validate()?;

        if config.audit.targets.is_empty() {
            tracing::warn!("No [[audit.targets]] configured; nothing to audit");
        }
        if config.audit.canonical_owner.is_none()
            && config.audit.targets.iter().any(|t| t.check_owner)
        {
            tracing::warn!("check_owner is set but audit.canonical_owner is not; owner checks are skipped");
        }

        let store_config = config.store.clone();
        let reports = store::with_store(&store_config, |store| async move {
            let ctx = Context::new(store, config);
            Ok(NormalizationAudit::from_ref(&ctx).run().await)
        })
        .await
        .map_err(|e| color_eyre::eyre::eyre!("Audit failed: {}", e))?;

        if json {
            println!("{}", serde_json::to_string_pretty(&reports)?);
        } else {
            print!("{}", render_audit(&reports));
        }
        Ok(())
    }
}
