//! SQUASH mode: one destination commit covering the whole pending range.

use tracing::debug;

use crate::console::Console;
use crate::destination::{DestinationEffect, TransformResult, Writer};
use crate::error::FerryError;
use crate::model::{Author, Change, Revision};
use crate::origin::{ChangesResponse, EmptyReason, Reader};
use crate::workflow::Workflow;

pub(crate) fn run(
    wf: &Workflow,
    reader: &dyn Reader,
    writer: &dyn Writer,
    requested: &Revision,
    source_ref: Option<&str>,
    console: &dyn Console,
) -> Result<Vec<DestinationEffect>, FerryError> {
    let last = if wf.force {
        None
    } else {
        wf.last_imported(reader, writer)?
    };
    if let Some(last) = &last {
        debug!(baseline = %last.id(), "found last imported revision");
    }

    let changes = match reader.changes(last.as_ref(), requested)? {
        ChangesResponse::Changes(changes) => changes,
        ChangesResponse::Empty(EmptyReason::ToIsAncestor) => {
            return Err(FerryError::empty(format!(
                "the destination is already at {} or newer",
                requested.id()
            )));
        }
        ChangesResponse::Empty(EmptyReason::NoChangesInRoots) => {
            if wf.force {
                Vec::new()
            } else {
                return Err(FerryError::empty(format!(
                    "no changes up to {} touch the configured paths",
                    requested.id()
                )));
            }
        }
        ChangesResponse::Empty(EmptyReason::UnrelatedRevisions) => {
            return Err(FerryError::validation(format!(
                "the last imported revision and {} share no history; \
                 re-run with --force to import from scratch",
                requested.id()
            )));
        }
    };

    wf.check_cancelled()?;
    let workdir = wf.checkout_and_transform(reader, requested, console)?;

    let summary = squash_summary(requested, &changes);
    let newest = changes.last();
    let author = match newest {
        Some(change) => wf.authoring.resolve(change.author()),
        None => wf
            .authoring
            .resolve(&requested.author().cloned().unwrap_or_else(|| {
                Author::new("ferry", "noreply@ferry.invalid")
            })),
    };
    let timestamp = newest.map_or_else(
        || {
            requested
                .timestamp()
                .copied()
                .unwrap_or_else(Workflow::fallback_timestamp)
        },
        |change| *change.timestamp(),
    );

    let mut transform = TransformResult::new(
        workdir.path().to_path_buf(),
        requested.clone(),
        author,
        timestamp,
        summary,
        wf.origin.label_name(),
    )
    .changes(changes)
    .set_rev_id(wf.set_rev_id);
    if let Some(reference) = source_ref {
        transform = transform.raw_source_ref(reference);
    }

    wf.write_with_retry(writer, &transform, console)
}

/// The squash commit message: a single change keeps its message; several
/// are summarized with their first lines, newest first.
fn squash_summary(requested: &Revision, changes: &[Change]) -> String {
    match changes {
        [] => format!("Import of {requested}\n"),
        [only] => format!("{}\n", only.message().trim_end()),
        several => {
            let mut summary = format!(
                "Import of {} ({} changes)\n\n",
                requested.id().short(),
                several.len()
            );
            for change in several.iter().rev() {
                summary.push_str(&format!(
                    "  - {} {} by {}\n",
                    change.id().short(),
                    change.first_line(),
                    change.author()
                ));
            }
            summary
        }
    }
}
