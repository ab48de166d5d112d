//! Paged streaming reads for replay clients.

use std::sync::Arc;

use futures::stream::{self, Stream, TryStreamExt};

use streammind_models::{AnalysisToken, SessionId};

use crate::error::{StoreError, StoreResult};
use crate::store::TokenStore;

/// Tokens fetched per store round trip.
pub const DEFAULT_REPLAY_BATCH: usize = 100;

/// Keyset position inside a session log: the next page starts at
/// `min_index`, after skipping `skip` tokens that carry exactly that index
/// and were already emitted.
#[derive(Debug, Clone, Copy)]
struct Cursor {
    min_index: i32,
    skip: usize,
}

impl Cursor {
    fn advance(self, page: &[AnalysisToken]) -> Option<Self> {
        let last = page.last()?.token_index;
        let same = page.iter().rev().take_while(|t| t.token_index == last).count();
        let skip = if last == self.min_index { self.skip + same } else { same };
        Some(Self { min_index: last, skip })
    }
}

/// Stream the tokens of a session with `token_index >= from_index`, in
/// listing order, one page at a time.
///
/// Items are yielded as soon as their page is read. A failed read yields a
/// single `Err` and ends the stream; items yielded before it stay valid.
pub fn replay_stream(
    store: Arc<dyn TokenStore>,
    session_id: SessionId,
    from_index: i32,
    batch_size: usize,
) -> impl Stream<Item = StoreResult<AnalysisToken>> + Send + 'static {
    let batch_size = batch_size.max(1);
    let start = Cursor {
        min_index: from_index,
        skip: 0,
    };

    stream::try_unfold(Some(start), move |cursor| {
        let store = Arc::clone(&store);
        async move {
            let Some(cursor) = cursor else {
                return Ok::<_, StoreError>(None);
            };

            let page = store
                .list_page(&session_id, cursor.min_index, cursor.skip, batch_size)
                .await?;
            if page.is_empty() {
                return Ok(None);
            }

            let next = if page.len() < batch_size {
                None
            } else {
                cursor.advance(&page)
            };
            Ok(Some((page, next)))
        }
    })
    .map_ok(|page| stream::iter(page.into_iter().map(Ok)))
    .try_flatten()
}
