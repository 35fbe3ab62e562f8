//! Async page-batch streaming over a paginated GraphQL endpoint (§4.3, §9
//! "Projection control"), grounded on `paginator.py`'s `Paginator._fetch_batch`
//! (a `batch_size`-wide `asyncio.gather` of concurrent page fetches, advancing
//! the page cursor by `batch_size` each round).

use futures_core::stream::Stream;
use pnw_protocol::wire::Page;

use crate::error::RestError;

/// Streams every record of a paginated endpoint, fetching up to `batch_size`
/// pages concurrently per round and terminating when a page in the round
/// reports `has_more_pages = false`.
///
/// `fetch_page(page_number)` must be 1-indexed per upstream's contract.
pub fn paginate<T, F, Fut>(
    fetch_page: F,
    page_size: u32,
    batch_size: u32,
) -> impl Stream<Item = Result<T, RestError>>
where
    T: Send + 'static,
    F: Fn(u32) -> Fut + Clone + Send + 'static,
    Fut: std::future::Future<Output = Result<Page<T>, RestError>> + Send,
{
    async_stream::try_stream! {
        let mut page = 1u32;
        loop {
            let mut fetches = Vec::with_capacity(batch_size as usize);
            for offset in 0..batch_size {
                let fetch_page = fetch_page.clone();
                let this_page = page + offset;
                fetches.push(async move { fetch_page(this_page).await });
            }
            let results = futures_util::future::join_all(fetches).await;
            page += batch_size;

            let mut exhausted = false;
            for result in results {
                let batch = result?;
                let has_more = batch.paginator_info.has_more_pages;
                for record in batch.data {
                    yield record;
                }
                if !has_more {
                    exhausted = true;
                }
            }
            if exhausted {
                break;
            }
            let _ = page_size;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use pnw_protocol::wire::PaginatorInfo;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn paginate_stops_when_a_page_reports_no_more_pages() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();

        let fetch = move |page: u32| {
            let calls2 = calls2.clone();
            async move {
                calls2.fetch_add(1, Ordering::SeqCst);
                if page <= 2 {
                    Ok(Page {
                        data: vec![page as i64],
                        paginator_info: PaginatorInfo { count: 1, has_more_pages: page < 2 },
                    })
                } else {
                    Ok(Page { data: vec![], paginator_info: PaginatorInfo { count: 0, has_more_pages: false } })
                }
            }
        };

        let stream = paginate(fetch, 100, 2);
        tokio::pin!(stream);
        let mut items = Vec::new();
        while let Some(item) = stream.next().await {
            items.push(item.unwrap());
        }
        assert_eq!(items, vec![1, 2]);
    }
}
