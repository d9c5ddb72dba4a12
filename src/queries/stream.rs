//! Streaming bridge.

use crate::db::{Connect, QueryState};
use crate::error::DbResult;
use crate::queries::Queries;
use crate::queries::driver::close_context;
use futures_util::stream::{self, BoxStream, StreamExt};
use std::vec::IntoIter;

enum StreamState<T, S, C> {
    Pending(Queries<Vec<T>, S>, C),
    Draining(S, IntoIter<T>),
    Done,
}

async fn next_item<T, S, C>(
    context: S,
    mut items: IntoIter<T>,
) -> Option<(DbResult<T>, StreamState<T, S, C>)>
where
    S: QueryState,
{
    match items.next() {
        Some(item) => Some((Ok(item), StreamState::Draining(context, items))),
        None => {
            close_context(context).await;
            None
        }
    }
}

impl<T, S> Queries<Vec<T>, S>
where
    T: Send + 'static,
    S: QueryState,
{
    /// Run when first polled and yield the resulting items one at a time.
    ///
    /// The stream owns its context: it is closed once the last item has been taken, or
    /// dropped (closing the connection) when the stream is dropped early. A failure to open
    /// or run is yielded as the only item.
    ///
    /// The whole computation runs on the first poll, so every item is in memory before the
    /// first one is yielded. Memory use is that of the full `Vec`, not of one row; only the
    /// connection's lifetime is tied to the stream.
    pub fn into_stream<C>(self, source: C) -> BoxStream<'static, DbResult<T>>
    where
        C: Connect<Context = S> + 'static,
    {
        stream::unfold(StreamState::Pending(self, source), |state| async move {
            match state {
                StreamState::Pending(queries, source) => {
                    let mut context = match source.open().await {
                        Ok(context) => context,
                        Err(e) => return Some((Err(e), StreamState::Done)),
                    };
                    match queries.run_on(&mut context).await {
                        Ok(items) => next_item(context, items.into_iter()).await,
                        Err(e) => {
                            close_context(context).await;
                            Some((Err(e), StreamState::Done))
                        }
                    }
                }
                StreamState::Draining(context, items) => next_item(context, items).await,
                StreamState::Done => None,
            }
        })
        .boxed()
    }
}
