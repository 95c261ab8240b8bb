use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, instrument, warn};

use crate::{ChapterEntry, DestinationRef, DocumentHandle, OutlineNode, ResolutionError};

/// Resolves an outline destination to a 1-based page number.
pub async fn resolve_destination(
    document: &dyn DocumentHandle,
    destination: Option<&DestinationRef>,
) -> Result<usize, ResolutionError> {
    let explicit = match destination {
        None => return Err(ResolutionError::NoDestination),
        Some(DestinationRef::Named(name)) => document.resolve_named_destination(name).await?,
        Some(DestinationRef::Explicit(explicit)) => explicit.clone(),
    };
    let target = explicit
        .target
        .ok_or(ResolutionError::UnresolvableReference(None))?;
    let page_index = document.page_index_for_reference(target).await?;
    Ok(page_index + 1)
}

/// Produces one [`ChapterEntry`] per top-level node, in outline order.
///
/// Lookups run concurrently and finish in any order; each result is written
/// back to the slot of the node it came from. A failed lookup leaves that
/// entry without a page number and does not affect the others.
#[instrument(skip_all, fields(nodes = roots.len()))]
pub async fn flatten_outline(
    document: &Arc<dyn DocumentHandle>,
    roots: &[OutlineNode],
) -> Vec<ChapterEntry> {
    let mut entries: Vec<ChapterEntry> = roots
        .iter()
        .map(|node| ChapterEntry {
            title: node.title.clone(),
            page_number: None,
        })
        .collect();

    let mut pending = JoinSet::new();
    for (index, node) in roots.iter().enumerate() {
        let document = Arc::clone(document);
        let destination = node.destination.clone();
        pending.spawn(async move {
            let result = resolve_destination(document.as_ref(), destination.as_ref()).await;
            (index, result)
        });
    }

    while let Some(joined) = pending.join_next().await {
        match joined {
            Ok((index, Ok(page))) => entries[index].page_number = Some(page),
            Ok((index, Err(ResolutionError::NoDestination))) => {
                debug!(title = %entries[index].title, "outline entry has no target");
            }
            Ok((index, Err(err))) => {
                warn!(title = %entries[index].title, %err, "failed to resolve outline entry");
            }
            Err(err) => warn!(?err, "outline resolution task did not complete"),
        }
    }

    entries
}
