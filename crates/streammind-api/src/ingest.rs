//! Token ingestion: persist, then publish.

use tracing::{debug, error};

use streammind_models::{AnalysisToken, NewToken};
use streammind_store::{StoreResult, TokenStore};

use crate::hub::{FanoutHub, PublishOutcome};
use crate::metrics;

/// Append a token and, only once the append succeeded, hand its content to
/// the live subscribers of its session.
pub async fn ingest_token(
    store: &dyn TokenStore,
    hub: &FanoutHub,
    token: NewToken,
) -> StoreResult<(AnalysisToken, PublishOutcome)> {
    let session_id = token.session_id;
    let token_index = token.token_index;

    let stored = match store.append(token).await {
        Ok(stored) => stored,
        Err(e) => {
            error!(session_id = %session_id, token_index, error = %e, "Failed to persist analysis token");
            metrics::record_ingest_failure("persistence");
            return Err(e);
        }
    };
    metrics::record_token_ingested();

    let outcome = hub.publish(&stored.session_id, &stored.content);
    debug!(
        session_id = %stored.session_id,
        token_index = stored.token_index,
        id = stored.id,
        delivered = outcome.delivered,
        "Ingested analysis token"
    );
    Ok((stored, outcome))
}
