use crate::model::Post;
use crate::page::{ListState, LoadingKind, PagedList, PageFetcher, TailState};
use crate::store::{DocumentRef, DocumentStore};
use crate::upsert::{upsert, UpsertOutcome};
use crate::wordpress::WordpressPost;
use anyhow::{bail, Result};
use tracing::{info, instrument, warn};

pub const POSTS_COLLECTION: &str = "posts";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub fetched: usize,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
}

impl From<WordpressPost> for Post {
    fn from(post: WordpressPost) -> Self {
        Post {
            ext_id: post.id,
            title: post.title,
            content_html: post.content,
            image_url: post.image_url,
            published: post.published,
        }
    }
}

/// Pull every page of posts and upsert each into the store. Unchanged posts
/// produce no writes, so a re-run against identical upstream content leaves
/// every document's stamps untouched.
///
/// No retry is attempted here: a cancelled or failed fetch surfaces as an
/// error and the caller decides whether to run again.
#[instrument(skip_all)]
pub async fn sync_posts<F>(
    store: &dyn DocumentStore,
    fetcher: F,
    page_size: u32,
) -> Result<SyncReport>
where
    F: PageFetcher<Item = WordpressPost>,
{
    let mut list = PagedList::new(fetcher, page_size);

    list.start_initial_fetch().await;
    match list.state() {
        ListState::Error(message) => bail!("posts fetch failed: {message}"),
        ListState::Loading(LoadingKind::Retry) => {
            bail!("posts fetch was cancelled; run the sync again")
        }
        ListState::Loading(_) => bail!("posts fetch finished in an unexpected state"),
        ListState::Success { .. } => {}
    }

    while list.has_more() {
        let before = list.state().items().len();
        list.load_more().await;
        match list.state() {
            ListState::Success {
                tail: TailState::Error(message),
                ..
            } => bail!("posts fetch failed: {message}"),
            ListState::Success { items, .. } if items.len() == before => {
                // Cancelled or an empty page: no progress, so stop instead
                // of re-issuing the same request.
                bail!("posts fetch made no progress; run the sync again")
            }
            _ => {}
        }
    }

    let mut report = SyncReport::default();
    for wp_post in list.state().items() {
        report.fetched += 1;
        let target = DocumentRef::new(POSTS_COLLECTION, wp_post.id.to_string());
        let post = Post::from(wp_post.clone());
        match upsert(store, &target, &post).await {
            Ok(UpsertOutcome::Inserted) => report.inserted += 1,
            Ok(UpsertOutcome::Updated) => report.updated += 1,
            Ok(UpsertOutcome::Unchanged) => report.unchanged += 1,
            Err(err) => {
                warn!(?err, ext_id = wp_post.id, "post upsert failed");
                return Err(err.into());
            }
        }
    }

    info!(
        fetched = report.fetched,
        inserted = report.inserted,
        updated = report.updated,
        unchanged = report.unchanged,
        "posts sync finished"
    );
    Ok(report)
}
