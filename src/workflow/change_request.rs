//! CHANGE_REQUEST mode: one commit staged on its baseline and rebased onto
//! the destination's push ref, published as a change request.

use tracing::debug;

use crate::console::Console;
use crate::destination::{DestinationEffect, TransformResult, Writer};
use crate::error::FerryError;
use crate::model::Revision;
use crate::origin::Reader;
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
    let change = reader.change(requested)?;

    // Baseline candidates: the change's own baseline label when present,
    // otherwise unlabeled first-parent ancestors of the change.
    let candidates: Vec<String> = match change.labels().last(&label) {
        Some(value) => vec![value.to_owned()],
        None => reader
            .find_baselines_without_label(requested, &label, wf.baseline_search_limit)?
            .iter()
            .map(|rev| rev.id().to_string())
            .collect(),
    };

    let mut baseline = None;
    for candidate in &candidates {
        if let Some(commit) = writer.resolve_baseline(&wf.destination_files, &label, candidate)? {
            debug!(origin = candidate, destination = %commit, "resolved baseline");
            baseline = Some(commit);
            break;
        }
    }
    let baseline = match baseline {
        Some(commit) => Some(commit),
        None if wf.force => {
            console.warn(&format!(
                "no baseline for {} found in the destination; staging onto the current tip",
                requested.id().short()
            ));
            None
        }
        None => {
            return Err(FerryError::validation(format!(
                "could not find a baseline for {} in the destination \
                 (searched {} candidate revisions); re-run with --force to stage onto the tip",
                requested.id(),
                candidates.len()
            )));
        }
    };

    wf.check_cancelled()?;
    let workdir = wf.checkout_and_transform(reader, requested, console)?;

    let mut transform = TransformResult::new(
        workdir.path().to_path_buf(),
        requested.clone(),
        wf.authoring.resolve(change.author()),
        *change.timestamp(),
        format!("{}\n", change.message().trim_end()),
        label.as_str(),
    )
    .changes(vec![change.clone()])
    .set_rev_id(wf.set_rev_id);
    if let Some(commit) = baseline {
        transform = transform.baseline(commit.to_string());
    }
    if let Some(reference) = source_ref {
        transform = transform.raw_source_ref(reference);
    }

    wf.write_with_retry(writer, &transform, console)
}
