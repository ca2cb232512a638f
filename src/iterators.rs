use std::collections::VecDeque;
use std::marker::PhantomData;
use std::sync::Arc;

use futures::stream::{self, Stream};

use crate::networking::codec::{self, TxKey};
use crate::networking::handler::ChaincodeHandler;
use crate::protos::{
    KeyModification, Kv, MessageType, QueryResponse, QueryResponseMetadata, QueryStateClose,
    QueryStateNext,
};
use crate::{Error, Result};

/// Record types a peer-side cursor can yield.
pub trait QueryRecord: prost::Message + Default + Send + 'static {}

impl QueryRecord for Kv {}
impl QueryRecord for KeyModification {}

pub type StateQueryIterator = QueryIterator<Kv>;
pub type HistoryQueryIterator = QueryIterator<KeyModification>;

/// Pull cursor over a peer-side query. Pages are fetched with
/// QUERY_STATE_NEXT as the buffered one runs out.
///
/// Dropping an open iterator sends nothing; the peer releases its cursors
/// when the transaction completes. Call [`QueryIterator::close`] to release
/// it earlier.
pub struct QueryIterator<R: QueryRecord> {
    handler: Arc<ChaincodeHandler>,
    key: TxKey,
    id: String,
    page: VecDeque<Vec<u8>>,
    has_more: bool,
    closed: bool,
    _record: PhantomData<fn() -> R>,
}

impl<R: QueryRecord> QueryIterator<R> {
    pub(crate) fn new(handler: Arc<ChaincodeHandler>, key: TxKey, response: QueryResponse) -> Self {
        let mut iterator = QueryIterator {
            handler,
            key,
            id: String::new(),
            page: VecDeque::new(),
            has_more: false,
            closed: false,
            _record: PhantomData,
        };
        iterator.load_page(response);
        iterator
    }

    fn load_page(&mut self, response: QueryResponse) {
        self.id = response.id;
        self.has_more = response.has_more;
        self.page = response
            .results
            .into_iter()
            .map(|result| result.result_bytes)
            .collect();
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    #[allow(clippy::should_implement_trait)]
    pub async fn next(&mut self) -> Result<Option<R>> {
        if self.closed {
            return Err(Error::IteratorClosed);
        }
        if self.page.is_empty() && self.has_more {
            let request = QueryStateNext {
                id: self.id.clone(),
            };
            let reply = self
                .handler
                .request(&self.key, MessageType::QueryStateNext, codec::encode(&request))
                .await?;
            let response: QueryResponse = codec::decode_response(reply, "QueryStateNext")?;
            self.load_page(response);
        }
        match self.page.pop_front() {
            Some(bytes) => Ok(Some(codec::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Releases the peer-side cursor. Only the first call reaches the peer.
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.page.clear();
        let request = QueryStateClose {
            id: self.id.clone(),
        };
        let reply = self
            .handler
            .request(&self.key, MessageType::QueryStateClose, codec::encode(&request))
            .await?;
        codec::response_payload(reply, "QueryStateClose")?;
        Ok(())
    }

    /// Drains every remaining record, then closes the cursor.
    pub async fn collect_all(mut self) -> Result<Vec<R>> {
        let mut records = vec![];
        while let Some(record) = self.next().await? {
            records.push(record);
        }
        self.close().await?;
        Ok(records)
    }

    /// Stream of the remaining records. The cursor is closed once the last
    /// record has been yielded.
    pub fn into_stream(self) -> impl Stream<Item = Result<R>> + Send {
        stream::try_unfold(self, |mut iterator| async move {
            match iterator.next().await? {
                Some(record) => Ok(Some((record, iterator))),
                None => {
                    iterator.close().await?;
                    Ok(None)
                }
            }
        })
    }
}

pub(crate) fn response_metadata(response: &QueryResponse) -> Result<QueryResponseMetadata> {
    if response.metadata.is_empty() {
        return Ok(QueryResponseMetadata::default());
    }
    codec::decode(&response.metadata)
}
