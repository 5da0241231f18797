//! ITERATIVE mode: one destination commit per origin change.

use tracing::{debug, warn};

use crate::console::Console;
use crate::destination::{DestinationEffect, EffectKind, TransformResult, Writer};
use crate::error::{ErrorKind, FerryError};
use crate::model::{LabelSet, Revision};
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
    let label = wf.origin.label_name().to_owned();
    let last = if wf.force {
        None
    } else {
        wf.last_imported(reader, writer)?
    };

    let changes = match reader.changes(last.as_ref(), requested)? {
        ChangesResponse::Changes(changes) => changes,
        ChangesResponse::Empty(EmptyReason::ToIsAncestor | EmptyReason::NoChangesInRoots) => {
            return Err(FerryError::empty(format!(
                "no pending changes up to {}",
                requested.id()
            )));
        }
        ChangesResponse::Empty(EmptyReason::UnrelatedRevisions) => {
            return Err(FerryError::validation(format!(
                "the last imported revision and {} share no history; \
                 re-run with --force to import from scratch",
                requested.id()
            )));
        }
    };

    let total = changes.len();
    let mut effects = Vec::new();
    // Labels of skipped empty changes, folded into the next non-empty
    // commit so their identity survives in destination history.
    let mut folded = LabelSet::new();

    for (index, change) in changes.iter().enumerate() {
        wf.check_cancelled()?;
        console.info(&format!(
            "migrating change {}/{total}: {} {}",
            index + 1,
            change.id().short(),
            change.first_line()
        ));

        let workdir = wf.checkout_and_transform(reader, change.revision(), console)?;
        let mut transform = TransformResult::new(
            workdir.path().to_path_buf(),
            change.revision().clone(),
            wf.authoring.resolve(change.author()),
            *change.timestamp(),
            format!("{}\n", change.message().trim_end()),
            label.as_str(),
        )
        .requested_revision(requested.clone())
        .changes(vec![change.clone()])
        .labels(folded.clone())
        .set_rev_id(wf.set_rev_id);
        if let Some(reference) = source_ref {
            transform = transform.raw_source_ref(reference);
        }

        match wf.write_with_retry(writer, &transform, console) {
            Ok(mut written) => {
                effects.append(&mut written);
                folded = LabelSet::new();
            }
            Err(err) if err.is_empty_change() => {
                if wf.migrate_noop_changes {
                    debug!(change = %change.id(), "recording no-op change");
                    effects.push(DestinationEffect::new(
                        EffectKind::Noop,
                        format!("change {} is a no-op in the destination", change.id().short()),
                        None,
                    ));
                } else {
                    console.info(&format!(
                        "change {} is empty; folding its label into the next commit",
                        change.id().short()
                    ));
                    folded.add(label.clone(), change.id().as_str());
                }
            }
            Err(err) if wf.force && err.kind() == ErrorKind::Repo => {
                // --force downgrades destination rejections to warnings.
                console.warn(&format!("change {} rejected: {err}", change.id().short()));
                effects.push(DestinationEffect::new(
                    EffectKind::Error,
                    format!("change {} rejected by the destination", change.id().short()),
                    None,
                ));
            }
            Err(err) => return Err(err),
        }
    }

    if !folded.is_empty() {
        warn!(
            count = folded.len(),
            "trailing empty changes had no later commit to carry their labels"
        );
    }
    if effects.is_empty() {
        return Err(FerryError::empty(format!(
            "all {total} pending changes were empty in the destination"
        )));
    }
    Ok(effects)
}
