//! Text report and command execution for the batch binary.

use crate::cfg::startupcfg::SubscriptionCmd;
use crate::scl::{find_by_identity, identity, ElementId, SclDocument};
use crate::subscription::compat::fcda_specification;
use crate::subscription::index::{control_elements, fcda_elements, get_subscribed_ext_ref_elements};
use crate::subscription::mutation::subscribe_status;
use crate::subscription::{ActionSink, ControlBlockKind, SubscribeStatus, SubscriptionEngine};
use anyhow::Context;
use tracing::info;

/// Control blocks of `kind` with their FCDAs, bound later binding sinks
/// and the IEDs receiving them through pre-configured sinks.
pub fn report(doc: &SclDocument, engine: &mut SubscriptionEngine, kind: ControlBlockKind) -> String {
    let mut lines = vec![format!("SCL edition {}", doc.edition().as_str())];
    let ieds = doc.children_by_tag(doc.root(), "IED").collect::<Vec<_>>();
    for control in control_elements(doc, kind) {
        lines.push(format!("{} {}", kind.tag(), identity(doc, control)));
        for fcda in fcda_elements(doc, control) {
            let spec = fcda_specification(doc, fcda);
            lines.push(format!(
                "  {} [{} {}] used {}",
                identity(doc, fcda),
                spec.cdc.as_deref().unwrap_or("?"),
                spec.btype.as_deref().unwrap_or("?"),
                engine.fcda_usage_count(doc, control, fcda)
            ));
            for ext_ref in get_subscribed_ext_ref_elements(doc, doc.root(), kind, Some(fcda), Some(control), true) {
                let supervision = engine
                    .existing_supervision(doc, ext_ref)
                    .map(|ln| format!(" supervised by {}", identity(doc, ln)))
                    .unwrap_or_default();
                lines.push(format!("    <- {}{}", identity(doc, ext_ref), supervision));
            }
        }
        let publisher = doc.closest(control, &["IED"]);
        for ied in ieds.iter().copied().filter(|ied| Some(*ied) != publisher) {
            let status = subscribe_status(doc, control, ied);
            if status != SubscribeStatus::None {
                lines.push(format!("  {} {:?}", doc.attr_or_empty(ied, "name"), status));
            }
        }
    }
    lines.join("\n")
}

fn element(doc: &SclDocument, wanted: &str) -> crate::Result<ElementId> {
    find_by_identity(doc, wanted).with_context(|| format!("no element with identity '{}'", wanted))
}

/// Runs one command against the current document; the resulting action
/// goes to `sink`.
pub fn execute(
    cmd: &SubscriptionCmd,
    doc: &SclDocument,
    engine: &mut SubscriptionEngine,
    sink: &mut dyn ActionSink,
) -> crate::Result<()> {
    info!("execute {:?}", cmd);
    match cmd {
        SubscriptionCmd::Subscribe { ext_ref, control, fcda } => {
            let ext_ref = element(doc, ext_ref)?;
            let control = element(doc, control)?;
            let fcda = element(doc, fcda)?;
            engine.subscribe(doc, sink, ext_ref, Some(control), Some(fcda));
        }
        SubscriptionCmd::Unsubscribe { ext_ref } => {
            let ext_ref = element(doc, ext_ref)?;
            engine.unsubscribe(doc, sink, ext_ref);
        }
        SubscriptionCmd::SubscribeIed { control, ied } => {
            let control = element(doc, control)?;
            let ied = element(doc, ied)?;
            engine.subscribe_ied(doc, sink, control, ied);
        }
        SubscriptionCmd::UnsubscribeIed { control, ied } => {
            let control = element(doc, control)?;
            let ied = element(doc, ied)?;
            engine.unsubscribe_ied(doc, sink, control, ied);
        }
    }
    Ok(())
}
