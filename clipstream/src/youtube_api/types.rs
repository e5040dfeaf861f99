//! Shared types and streaming infrastructure for the YouTube API client.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};
use tokio_stream::Stream;

/// One page of a list endpoint: its items and the token of the next page, if there is one.
pub type Page<T> = (VecDeque<T>, Option<String>);

type PendingPage<'a, F, T> = Pin<Box<dyn Future<Output = eyre::Result<(F, Page<T>)>> + 'a + Send>>;

/// Yields the items of a YouTube list endpoint one by one, fetching the next page lazily once the
/// current one is drained.
///
/// `fetcher` is called with `None` for the first page and with the previous `nextPageToken`
/// afterwards. The stream ends after the first error.
pub struct PagedStream<'a, T, F> {
    buffered: VecDeque<T>,
    pending: Option<PendingPage<'a, F, T>>,
}

impl<'a, T, F> PagedStream<'a, T, F> {
    pub fn new<Fut>(fetcher: F) -> Self
    where
        F: Fn(Option<String>) -> Fut,
        F: Send + 'a,
        Fut: Future<Output = eyre::Result<Page<T>>> + Send + 'a,
    {
        Self {
            buffered: VecDeque::new(),
            pending: Some(Self::fetch(fetcher, None)),
        }
    }

    fn fetch<Fut>(fetcher: F, page_token: Option<String>) -> PendingPage<'a, F, T>
    where
        F: Fn(Option<String>) -> Fut,
        F: Send + 'a,
        Fut: Future<Output = eyre::Result<Page<T>>> + Send + 'a,
    {
        Box::pin(async move {
            let page = fetcher(page_token).await?;
            Ok((fetcher, page))
        })
    }
}

impl<'a, T: Unpin, F> Unpin for PagedStream<'a, T, F> {}

impl<'a, T: Unpin, F, Fut> Stream for PagedStream<'a, T, F>
where
    F: Fn(Option<String>) -> Fut,
    F: Send + 'a,
    Fut: Future<Output = eyre::Result<Page<T>>> + Send + 'a,
{
    type Item = eyre::Result<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(item) = self.buffered.pop_front() {
                return Poll::Ready(Some(Ok(item)));
            }
            let Some(pending) = self.pending.as_mut() else {
                return Poll::Ready(None);
            };
            match pending.as_mut().poll(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Err(e)) => {
                    self.pending = None;
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(Ok((fetcher, (items, next_page_token)))) => {
                    self.buffered.extend(items);
                    // the next request is created here but only polled once the buffer is empty
                    self.pending = next_page_token.map(|token| Self::fetch(fetcher, Some(token)));
                }
            }
        }
    }
}

/// Paging details for lists of resources.
///
/// See: <https://developers.google.com/youtube/v3/docs/pageInfo>
#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct PageInfo {
    /// The total number of results in the result set.
    #[serde(rename = "totalResults", default)]
    pub total_results: u32,
    /// The number of results included in the API response.
    #[serde(rename = "resultsPerPage", default)]
    pub results_per_page: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    #[tokio::test]
    async fn follows_page_tokens_until_the_last_page() {
        let calls = std::sync::Mutex::new(Vec::new());
        let stream = PagedStream::new(|token: Option<String>| {
            calls.lock().unwrap().push(token.clone());
            async move {
                Ok(match token.as_deref() {
                    None => (VecDeque::from([1, 2]), Some("p2".to_string())),
                    Some("p2") => (VecDeque::new(), Some("p3".to_string())),
                    Some("p3") => (VecDeque::from([3]), None),
                    Some(other) => eyre::bail!("unexpected token {other}"),
                })
            }
        });
        let items: Vec<i32> = stream.map(|r| r.unwrap()).collect().await;
        assert_eq!(items, vec![1, 2, 3]);
        assert_eq!(
            *calls.lock().unwrap(),
            vec![None, Some("p2".to_string()), Some("p3".to_string())]
        );
    }

    #[tokio::test]
    async fn stops_after_an_error() {
        let stream = PagedStream::new(|token: Option<String>| async move {
            match token {
                None => Ok((VecDeque::from(["a"]), Some("next".to_string()))),
                Some(_) => Err(eyre::eyre!("HTTP 500")),
            }
        });
        let results: Vec<_> = stream.collect().await;
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
    }
}
