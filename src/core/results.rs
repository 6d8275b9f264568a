//! Result persistence.
//!
//! Verdicts are stored twice with the retention TTL: under `analysis:{id}`
//! and under the short share id `guardian:{share_id}`. Stored results are
//! never rewritten; staleness is re-derived on every lookup.

use rand::distributions::Alphanumeric;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::models::errors::{GuardianError, GuardianResult};
use crate::models::types::{AnalysisResult, SimulationOutcome, Warning, WarningKind};
use crate::utils::cache::{get_json, set_json, KvStore};
use crate::utils::constants::{
    ANALYSIS_KEY_PREFIX, SHARE_ID_LEN, SHARE_KEY_PREFIX, SIMULATION_KEY_PREFIX,
    SIMULATION_TTL_SECS, STALE_AFTER_SECS,
};

/// Random share token, not derived from request content
pub fn new_share_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SHARE_ID_LEN)
        .map(char::from)
        .collect()
}

#[derive(Clone)]
pub struct ResultStore {
    store: Arc<dyn KvStore>,
    retention: Duration,
}

impl ResultStore {
    pub fn new(store: Arc<dyn KvStore>, retention: Duration) -> Self {
        Self { store, retention }
    }

    pub async fn persist(&self, result: &AnalysisResult) -> GuardianResult<()> {
        if result.share_id.is_empty() {
            return Err(GuardianError::internal("result has no share id"));
        }
        let analysis_key = format!("{}{}", ANALYSIS_KEY_PREFIX, result.id);
        let share_key = format!("{}{}", SHARE_KEY_PREFIX, result.share_id);
        set_json(self.store.as_ref(), &analysis_key, result, self.retention).await?;
        set_json(self.store.as_ref(), &share_key, result, self.retention).await?;
        debug!("💾 Stored {} as {}", result.id, result.share_id);
        Ok(())
    }

    /// Cached verdict for a share id, with staleness judged now
    pub async fn by_share_id(&self, share_id: &str) -> GuardianResult<Option<AnalysisResult>> {
        self.by_share_id_at(share_id, chrono::Utc::now().timestamp()).await
    }

    /// Cached verdict with staleness judged at `now` (unix seconds)
    pub async fn by_share_id_at(&self, share_id: &str, now: i64) -> GuardianResult<Option<AnalysisResult>> {
        let key = format!("{}{}", SHARE_KEY_PREFIX, share_id);
        let Some(mut result) = get_json::<AnalysisResult>(self.store.as_ref(), &key).await? else {
            return Ok(None);
        };

        let age = now - result.created_at;
        if age > STALE_AFTER_SECS {
            result.warnings.push(Warning::new(
                WarningKind::StaleResult,
                "results",
                format!("Analysis is {} minutes old; on-chain state may have changed", age / 60),
            ));
        }
        Ok(Some(result))
    }

    pub async fn by_id(&self, id: &str) -> GuardianResult<Option<AnalysisResult>> {
        get_json(self.store.as_ref(), &format!("{}{}", ANALYSIS_KEY_PREFIX, id)).await
    }

    /// Store a simulation for later reference, returning its id
    pub async fn save_simulation(&self, simulation: &SimulationOutcome) -> GuardianResult<String> {
        let id = uuid::Uuid::new_v4().to_string();
        set_json(
            self.store.as_ref(),
            &format!("{}{}", SIMULATION_KEY_PREFIX, id),
            simulation,
            Duration::from_secs(SIMULATION_TTL_SECS),
        )
        .await?;
        Ok(id)
    }

    pub async fn load_simulation(&self, id: &str) -> GuardianResult<Option<SimulationOutcome>> {
        get_json(self.store.as_ref(), &format!("{}{}", SIMULATION_KEY_PREFIX, id)).await
    }
}
