use crate::services::document::DocumentSource;
use crate::services::naming::format_index_code;
use crate::types::{Chapter, Granularity, OutlineNode};
use tracing::{debug, warn};

/// State handed down one level of the outline walk.
#[derive(Debug, Clone, Copy)]
struct TraversalContext<'a> {
    depth: usize,
    max_depth: usize,
    parent_path: &'a [usize],
    main_title: Option<&'a str>,
}

/// Flattens a bookmark tree into start-page chapter candidates.
pub struct OutlineFlattener;

impl OutlineFlattener {
    /// Pre-order walk down to `granularity` levels. Every node whose
    /// destination resolves to a page becomes a single-page chapter; end
    /// pages are assigned later by the range normalizer.
    pub fn flatten<D: DocumentSource + ?Sized>(
        doc: &D,
        outline: &[OutlineNode],
        granularity: Granularity,
    ) -> Vec<Chapter> {
        let mut chapters = Vec::new();
        let root = TraversalContext {
            depth: 1,
            max_depth: granularity.depth(),
            parent_path: &[],
            main_title: None,
        };
        Self::walk(doc, outline, root, &mut chapters);

        debug!(
            "Outline flattened to {} chapters at granularity {}",
            chapters.len(),
            granularity
        );
        chapters
    }

    fn walk<D: DocumentSource + ?Sized>(
        doc: &D,
        items: &[OutlineNode],
        ctx: TraversalContext<'_>,
        chapters: &mut Vec<Chapter>,
    ) {
        if ctx.depth > ctx.max_depth {
            return;
        }

        for (idx, item) in items.iter().enumerate() {
            let mut path = ctx.parent_path.to_vec();
            path.push(idx + 1);

            let main_title = ctx
                .main_title
                .filter(|t| !t.is_empty())
                .unwrap_or(&item.title);

            match Self::resolve_page(doc, item) {
                Some(page) => chapters.push(Chapter {
                    id: format!("bookmark-{}", chapters.len()),
                    title: item.title.clone(),
                    start_page: page,
                    end_page: page,
                    index_code: Some(format_index_code(&path)),
                    main_chapter_title: Some(main_title.to_string()),
                }),
                None => warn!(
                    "Skipping bookmark '{}': destination does not resolve to a page",
                    item.title
                ),
            }

            if !item.items.is_empty() {
                let child = TraversalContext {
                    depth: ctx.depth + 1,
                    max_depth: ctx.max_depth,
                    parent_path: &path,
                    main_title: Some(main_title),
                };
                Self::walk(doc, &item.items, child, chapters);
            }
        }
    }

    /// 1-based page targeted by a bookmark.
    fn resolve_page<D: DocumentSource + ?Sized>(doc: &D, item: &OutlineNode) -> Option<usize> {
        let dest = item.dest.as_ref()?;
        let page = doc.resolve_destination(dest)?;
        doc.page_index_of(page).map(|idx| idx + 1)
    }
}
