//! Subscribe / unsubscribe as edit actions.
//!
//! Nothing here writes to the document. Each operation computes the edits,
//! emits them as one [`Action`] and a notification, and drops the derived
//! caches so the next query sees the document the applier produces.

use super::compat::{unsupported_ext_ref, FCDA_MIRROR_ATTRS};
use super::event::{ActionSink, SubscriptionEvent};
use super::index::{fcda_elements, find_control_block, find_fcdas, is_subscribed};
use super::supervision::{self, control_block_reference, reference_still_used};
use super::{ControlBlockKind, Selection, SubscriptionEngine};
use crate::scl::{Action, AttributeChange, EditRequest, ElementId, NewElement, SclDocument, SclEdition};
use crate::utils::ied_name_of;
use serde::Serialize;
use tracing::debug;

/// Everything a binding writes to a sink. Unsubscribing clears all of them.
pub const BINDING_ATTRS: [&str; 13] = [
    "iedName",
    "ldInst",
    "prefix",
    "lnClass",
    "lnInst",
    "doName",
    "daName",
    "serviceType",
    "srcLDInst",
    "srcPrefix",
    "srcLNClass",
    "srcLNInst",
    "srcCBName",
];

/// How much of a control block's data set an IED receives through pre-configured sinks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum SubscribeStatus {
    Full,
    Partial,
    None,
}

fn non_empty(value: &str) -> Option<&str> {
    (!value.is_empty()).then_some(value)
}

/// Attribute changes binding a sink to `fcda` published by `control`.
///
/// `None` when the FCDA sits outside any named IED. Provenance is only
/// written for edition 2 documents; empty `srcPrefix`/`srcLNInst` are
/// cleared rather than written empty.
pub fn ext_ref_binding_changes(
    doc: &SclDocument,
    control: ElementId,
    fcda: ElementId,
) -> Option<Vec<AttributeChange>> {
    let ied_name = ied_name_of(doc, fcda)?;
    let mut changes = vec![AttributeChange::set("iedName", ied_name)];
    changes.extend(
        FCDA_MIRROR_ATTRS
            .iter()
            .map(|attr| AttributeChange::set_or_clear(attr, doc.attr(fcda, attr))),
    );
    if doc.edition() == SclEdition::Ed2003 {
        return Some(changes);
    }

    let service_type = ControlBlockKind::of(doc, control).and_then(|kind| kind.service_type());
    let ld = doc.closest(control, &["LDevice"]);
    let ln = doc.closest(control, &["LN0", "LN"]);
    let Some(service_type) = service_type else {
        changes.extend(BINDING_ATTRS[7..].iter().map(|attr| AttributeChange::clear(attr)));
        return Some(changes);
    };
    let from_ln = |attr: &str| ln.map(|ln| doc.attr_or_empty(ln, attr)).unwrap_or("");
    changes.push(AttributeChange::set("serviceType", service_type));
    changes.push(AttributeChange::set(
        "srcLDInst",
        ld.map(|ld| doc.attr_or_empty(ld, "inst")).unwrap_or(""),
    ));
    changes.push(AttributeChange::set_or_clear("srcPrefix", non_empty(from_ln("prefix"))));
    changes.push(AttributeChange::set("srcLNClass", from_ln("lnClass")));
    changes.push(AttributeChange::set_or_clear("srcLNInst", non_empty(from_ln("inst"))));
    changes.push(AttributeChange::set("srcCBName", doc.attr_or_empty(control, "name")));
    Some(changes)
}

/// Pre-configured (no `intAddr`) sink in `inputs` already bound to `fcda`.
pub fn preconfigured_ext_ref(
    doc: &SclDocument,
    inputs: ElementId,
    fcda: ElementId,
    control: Option<ElementId>,
) -> Option<ElementId> {
    let ied_name = ied_name_of(doc, fcda)?;
    let edition_2 = doc.edition() != SclEdition::Ed2003;
    let kind = control.and_then(|cb| ControlBlockKind::of(doc, cb));
    let control_attrs: Vec<(&str, &str)> = match (control, kind.and_then(|k| k.service_type())) {
        (Some(cb), Some(service_type)) if edition_2 => {
            let ld = doc.closest(cb, &["LDevice"]);
            let ln = doc.closest(cb, &["LN0", "LN"]);
            vec![
                ("serviceType", service_type),
                ("srcLDInst", ld.map(|ld| doc.attr_or_empty(ld, "inst")).unwrap_or("")),
                ("srcLNClass", ln.map(|ln| doc.attr_or_empty(ln, "lnClass")).unwrap_or("")),
                ("srcLNInst", ln.map(|ln| doc.attr_or_empty(ln, "inst")).unwrap_or("")),
                ("srcCBName", doc.attr_or_empty(cb, "name")),
            ]
        }
        _ => Vec::new(),
    };

    doc.children_by_tag(inputs, "ExtRef").find(|e| {
        !doc.has_attr(*e, "intAddr")
            && doc.attr(*e, "iedName") == Some(ied_name)
            && FCDA_MIRROR_ATTRS.iter().all(|attr| match non_empty(doc.attr_or_empty(fcda, attr)) {
                Some(value) => doc.attr(*e, attr) == Some(value),
                None => true,
            })
            && control_attrs
                .iter()
                .all(|(attr, value)| value.is_empty() || doc.attr(*e, attr) == Some(*value))
    })
}

/* enough addressing on both ends to write a sink that can be resolved again */
fn can_create_valid_ext_ref(doc: &SclDocument, fcda: ElementId, control: ElementId) -> bool {
    if ied_name_of(doc, fcda).is_none()
        || ["ldInst", "lnClass", "doName"]
            .iter()
            .any(|attr| doc.attr_or_empty(fcda, attr).is_empty())
    {
        return false;
    }
    if doc.edition() == SclEdition::Ed2003 {
        return true;
    }
    let ld_inst = doc.closest(control, &["LDevice"]).map(|ld| doc.attr_or_empty(ld, "inst"));
    let ln_class = doc.closest(control, &["LN0", "LN"]).map(|ln| doc.attr_or_empty(ln, "lnClass"));
    [ld_inst, ln_class, doc.attr(control, "name")]
        .iter()
        .all(|value| value.is_some_and(|v| !v.is_empty()))
}

fn preconfigured_inputs(doc: &SclDocument, ied: ElementId) -> Vec<ElementId> {
    doc.descendants_by_tag(ied, &["Inputs"])
        .into_iter()
        .filter(|inputs| doc.parent(*inputs).is_some_and(|p| matches!(doc.tag(p), "LN0" | "LN")))
        .collect()
}

/// Full when every FCDA of `control` reaches `ied`, None when none does.
pub fn subscribe_status(doc: &SclDocument, control: ElementId, ied: ElementId) -> SubscribeStatus {
    let fcdas = fcda_elements(doc, control);
    let inputs = preconfigured_inputs(doc, ied);
    let linked = fcdas
        .iter()
        .map(|fcda| {
            inputs
                .iter()
                .filter(|i| preconfigured_ext_ref(doc, **i, *fcda, Some(control)).is_some())
                .count()
        })
        .sum::<usize>();
    if linked == 0 {
        SubscribeStatus::None
    } else if linked >= fcdas.len() {
        SubscribeStatus::Full
    } else {
        SubscribeStatus::Partial
    }
}

fn is_element(doc: &SclDocument, e: ElementId, tag: &str) -> bool {
    doc.is_attached(e) && doc.tag(e) == tag
}

impl SubscriptionEngine {
    /// Binds a later binding sink to `fcda` of `control`, with supervision
    /// when policy allows. Missing control block or FCDA is a no-op.
    pub fn subscribe(
        &mut self,
        doc: &SclDocument,
        sink: &mut dyn ActionSink,
        ext_ref: ElementId,
        control: Option<ElementId>,
        fcda: Option<ElementId>,
    ) {
        let (Some(control), Some(fcda)) = (control, fcda) else {
            debug!("subscribe without control block or FCDA ignored");
            return;
        };
        if !is_element(doc, ext_ref, "ExtRef") || !is_element(doc, fcda, "FCDA") || !doc.is_attached(control) {
            debug!("subscribe on stale elements ignored");
            return;
        }
        let Some(changes) = ext_ref_binding_changes(doc, control, fcda) else {
            return;
        };

        let mut edits = vec![EditRequest::Update {
            target: ext_ref,
            changes,
        }];
        if self.cfg.instantiate_supervision {
            if let Some(ied) = doc.closest(ext_ref, &["IED"]) {
                edits.extend(supervision::instantiate(doc, &mut self.cache, &self.cfg, control, ied));
            }
        }

        debug!("subscribe {:?} to {:?}: {} edits", ext_ref, fcda, edits.len());
        sink.dispatch(Action::new(&self.cfg.connect_title, edits));
        self.cache.invalidate();
        sink.notify(SubscriptionEvent::SubscriptionChanged {
            control: Some(control),
            fcda: Some(fcda),
        });
    }

    /// Clears every binding attribute of `ext_ref`, `intAddr` and `desc`
    /// untouched, and drops the supervision when this was its last sink.
    pub fn unsubscribe(&mut self, doc: &SclDocument, sink: &mut dyn ActionSink, ext_ref: ElementId) {
        if !is_element(doc, ext_ref, "ExtRef") {
            debug!("unsubscribe on stale element ignored");
            return;
        }
        let control = find_control_block(doc, ext_ref);
        let fcda = find_fcdas(doc, ext_ref).into_iter().next();

        let mut edits = vec![EditRequest::Update {
            target: ext_ref,
            changes: BINDING_ATTRS.iter().map(|attr| AttributeChange::clear(attr)).collect(),
        }];
        if let (Some(control), Some(ied)) = (control, doc.closest(ext_ref, &["IED"])) {
            if supervision::can_remove(doc, &mut self.cache, ext_ref) {
                edits.extend(supervision::remove(doc, &mut self.cache, &self.cfg, control, ied));
            }
        }

        debug!("unsubscribe {:?}: {} edits", ext_ref, edits.len());
        sink.dispatch(Action::new(&self.cfg.disconnect_title, edits));
        self.cache.invalidate();
        sink.notify(SubscriptionEvent::SubscriptionChanged { control, fcda });
    }

    /// Adds one pre-configured sink per FCDA of `control` that `ied` does
    /// not receive yet, under `LN0 > Inputs`.
    pub fn subscribe_ied(
        &mut self,
        doc: &SclDocument,
        sink: &mut dyn ActionSink,
        control: ElementId,
        ied: ElementId,
    ) {
        if !doc.is_attached(control) || !is_element(doc, ied, "IED") {
            return;
        }
        let Some(ln0) = doc.descendants_by_tag(ied, &["LN0"]).into_iter().next() else {
            return;
        };
        let inputs = doc.children_by_tag(ln0, "Inputs").next();

        let new_ext_refs: Vec<NewElement> = fcda_elements(doc, control)
            .into_iter()
            .filter(|fcda| inputs.map_or(true, |i| preconfigured_ext_ref(doc, i, *fcda, Some(control)).is_none()))
            .filter(|fcda| can_create_valid_ext_ref(doc, *fcda, control))
            .filter_map(|fcda| ext_ref_binding_changes(doc, control, fcda))
            .map(|changes| {
                changes.into_iter().fold(NewElement::new("ExtRef"), |e, change| match change {
                    AttributeChange::Set { name, value } => e.with_attr(&name, &value),
                    AttributeChange::Clear { .. } => e,
                })
            })
            .collect();

        let mut edits: Vec<EditRequest> = match inputs {
            Some(inputs) => new_ext_refs
                .into_iter()
                .map(|element| EditRequest::CreateElement {
                    parent: inputs,
                    element,
                    reference: None,
                })
                .collect(),
            None if new_ext_refs.is_empty() => Vec::new(),
            None => vec![EditRequest::CreateElement {
                parent: ln0,
                element: NewElement {
                    children: new_ext_refs,
                    ..NewElement::new("Inputs")
                },
                reference: None,
            }],
        };
        if self.cfg.instantiate_supervision {
            edits.extend(supervision::instantiate(doc, &mut self.cache, &self.cfg, control, ied));
        }
        if edits.is_empty() {
            return;
        }

        sink.dispatch(Action::new(&self.cfg.connect_title, edits));
        self.cache.invalidate();
        sink.notify(SubscriptionEvent::SubscriptionChanged {
            control: Some(control),
            fcda: None,
        });
    }

    /// Deletes the pre-configured sinks of `ied` bound to `control`.
    /// An `Inputs` left without children goes with them.
    pub fn unsubscribe_ied(
        &mut self,
        doc: &SclDocument,
        sink: &mut dyn ActionSink,
        control: ElementId,
        ied: ElementId,
    ) {
        if !doc.is_attached(control) || !is_element(doc, ied, "IED") {
            return;
        }
        let fcdas = fcda_elements(doc, control);
        let mut deleted: Vec<ElementId> = Vec::new();
        let mut edits: Vec<EditRequest> = Vec::new();
        for inputs in preconfigured_inputs(doc, ied) {
            let mut bound: Vec<ElementId> = Vec::new();
            for fcda in &fcdas {
                if let Some(e) = preconfigured_ext_ref(doc, inputs, *fcda, Some(control)) {
                    if !bound.contains(&e) {
                        bound.push(e);
                    }
                }
            }
            if bound.is_empty() {
                continue;
            }
            let emptied = doc.children(inputs).iter().all(|c| bound.contains(c));
            match (emptied, doc.parent(inputs)) {
                (true, Some(parent)) => edits.push(EditRequest::DeleteElement {
                    parent,
                    element: inputs,
                }),
                _ => edits.extend(bound.iter().map(|e| EditRequest::DeleteElement {
                    parent: inputs,
                    element: *e,
                })),
            }
            deleted.extend(bound);
        }

        if let Some(cb_ref) = control_block_reference(doc, control) {
            if !reference_still_used(doc, ied, &cb_ref, &deleted) {
                edits.extend(supervision::remove(doc, &mut self.cache, &self.cfg, control, ied));
            }
        }
        if edits.is_empty() {
            return;
        }

        sink.dispatch(Action::new(&self.cfg.disconnect_title, edits));
        self.cache.invalidate();
        sink.notify(SubscriptionEvent::SubscriptionChanged {
            control: Some(control),
            fcda: None,
        });
    }

    /// Subscriber view click on a sink: a bound sink is unsubscribed, a
    /// free one becomes the pending selection.
    pub fn select_ext_ref(&mut self, doc: &SclDocument, sink: &mut dyn ActionSink, ext_ref: Option<ElementId>) {
        if let Some(e) = ext_ref {
            if is_element(doc, e, "ExtRef") && is_subscribed(doc, e) {
                self.selection.ext_ref = None;
                self.unsubscribe(doc, sink, e);
                return;
            }
        }
        self.selection.ext_ref = ext_ref;
        sink.notify(SubscriptionEvent::ExtRefSelectionChanged { ext_ref });
    }

    /// FCDA picked in the publisher list. A pending free sink from another
    /// IED is subscribed right away when its restriction allows it.
    pub fn select_fcda(
        &mut self,
        doc: &SclDocument,
        sink: &mut dyn ActionSink,
        control: Option<ElementId>,
        fcda: Option<ElementId>,
    ) {
        self.selection.control = control;
        self.selection.fcda = fcda;
        sink.notify(SubscriptionEvent::FcdaSelected { control, fcda });

        let Some(ext_ref) = self.selection.ext_ref else {
            return;
        };
        let (Some(_), Some(fcda_id)) = (control, fcda) else {
            return;
        };
        if !is_element(doc, ext_ref, "ExtRef") || !is_element(doc, fcda_id, "FCDA") {
            return;
        }
        let same_ied = doc.closest(ext_ref, &["IED"]) == doc.closest(fcda_id, &["IED"]);
        if same_ied || is_subscribed(doc, ext_ref) || unsupported_ext_ref(doc, Some(ext_ref), fcda, control) {
            return;
        }
        self.subscribe(doc, sink, ext_ref, control, fcda);
        self.selection = Selection::default();
    }
}
