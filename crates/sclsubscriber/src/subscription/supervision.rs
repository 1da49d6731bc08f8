//! LGOS / LSVS supervision bookkeeping.
//!
//! A supervision LN watches one control block for its IED. The watched
//! control block is stored as a reference string in
//! `DOI[GoCBRef|SvCBRef] > DAI[setSrcRef] > Val`. The same string is built
//! from the control block when instantiating ([`control_block_reference`])
//! and from a sink's provenance when looking up ([`ext_ref_control_block_reference`]),
//! and the two must agree byte for byte.

use super::datatype::resolve_data_attribute;
use super::index::{find_control_block, is_subscribed, owner_ied_name, SubscriptionCache};
use super::ControlBlockKind;
use crate::comdata::EngineCfg;
use crate::scl::{EditRequest, ElementId, NewElement, SclDocument, SclEdition};
use std::collections::HashMap;
use tracing::{debug, warn};

const SRC_REF_DAI: &str = "setSrcRef";

/// `<ied><ldInst>/<prefix><lnClass><lnInst>.<cbName>` of a control block.
pub fn control_block_reference(doc: &SclDocument, control: ElementId) -> Option<String> {
    let ied_name = doc.closest(control, &["IED"]).and_then(|ied| doc.attr(ied, "name"))?;
    let ld = doc.closest(control, &["LDevice"])?;
    let ln = doc.closest(control, &["LN0", "LN"])?;
    let cb_name = doc.attr(control, "name")?;
    Some(format!(
        "{}{}/{}{}{}.{}",
        ied_name,
        doc.attr_or_empty(ld, "inst"),
        doc.attr_or_empty(ln, "prefix"),
        doc.attr_or_empty(ln, "lnClass"),
        doc.attr_or_empty(ln, "inst"),
        cb_name
    ))
}

/// The reference of [`control_block_reference`] rebuilt from a sink's
/// `iedName` and `src*` attributes. `None` without `srcCBName`.
pub fn ext_ref_control_block_reference(doc: &SclDocument, ext_ref: ElementId) -> Option<String> {
    let cb_name = doc.attr(ext_ref, "srcCBName").filter(|name| !name.is_empty())?;
    let ied_name = doc.attr(ext_ref, "iedName")?;
    let ld_inst = doc
        .attr(ext_ref, "srcLDInst")
        .or_else(|| doc.attr(ext_ref, "ldInst"))
        .unwrap_or("");
    Some(format!(
        "{}{}/{}{}{}.{}",
        ied_name,
        ld_inst,
        doc.attr_or_empty(ext_ref, "srcPrefix"),
        doc.attr(ext_ref, "srcLNClass").unwrap_or("LLN0"),
        doc.attr_or_empty(ext_ref, "srcLNInst"),
        cb_name
    ))
}

/* provenance first, the reverse control block lookup for sinks without it */
fn sink_reference(doc: &SclDocument, ext_ref: ElementId) -> Option<String> {
    ext_ref_control_block_reference(doc, ext_ref)
        .or_else(|| find_control_block(doc, ext_ref).and_then(|cb| control_block_reference(doc, cb)))
}

fn supervision_do_of_class(ln_class: &str) -> Option<&'static str> {
    match ln_class {
        "LGOS" => ControlBlockKind::Gse.supervision_do(),
        "LSVS" => ControlBlockKind::SampledValue.supervision_do(),
        _ => None,
    }
}

fn supervision_dai(doc: &SclDocument, ln: ElementId) -> Option<ElementId> {
    let do_name = supervision_do_of_class(doc.attr(ln, "lnClass")?)?;
    let doi = doc.child_with_attr(ln, &["DOI"], "name", do_name)?;
    doc.child_with_attr(doi, &["DAI"], "name", SRC_REF_DAI)
}

/// Control block reference a supervision LN watches, `None` when the LN is free.
pub fn supervision_reference(doc: &SclDocument, ln: ElementId) -> Option<&str> {
    let dai = supervision_dai(doc, ln)?;
    let val = doc.children_by_tag(dai, "Val").next()?;
    let text = doc.text(val).trim();
    (!text.is_empty()).then_some(text)
}

/// Every instantiated supervision LN, keyed by `(IED name, reference)`.
/// Only the first LN per key is kept.
pub(crate) fn build_supervision_index(doc: &SclDocument) -> HashMap<(String, String), ElementId> {
    let mut res = HashMap::new();
    for ln in doc.descendants_by_tag(doc.root(), &["LN"]) {
        if !matches!(doc.attr(ln, "lnClass"), Some("LGOS") | Some("LSVS")) || !doc.is_public(ln) {
            continue;
        }
        let Some(cb_ref) = supervision_reference(doc, ln) else {
            continue;
        };
        let key = (owner_ied_name(doc, ln), cb_ref.to_string());
        if let Some(first) = res.get(&key) {
            warn!("duplicate supervision of {} in {}: {:?} and {:?}", key.1, key.0, first, ln);
            continue;
        }
        res.insert(key, ln);
    }
    debug!("supervision index rebuilt, {} instances", res.len());
    res
}

/// Supervision LN for the control block a sink is bound to.
pub fn existing_supervision(doc: &SclDocument, cache: &mut SubscriptionCache, ext_ref: ElementId) -> Option<ElementId> {
    let cb_ref = sink_reference(doc, ext_ref)?;
    cache.supervision(doc, &owner_ied_name(doc, ext_ref), &cb_ref)
}

/// Supervision LN in `subscriber_ied` watching `control`.
pub fn supervision_for(
    doc: &SclDocument,
    cache: &mut SubscriptionCache,
    control: ElementId,
    subscriber_ied: ElementId,
) -> Option<ElementId> {
    let cb_ref = control_block_reference(doc, control)?;
    let ied_name = doc.attr(subscriber_ied, "name")?;
    cache.supervision(doc, ied_name, &cb_ref)
}

fn supervision_lns(doc: &SclDocument, ied: ElementId, class: &str) -> Vec<ElementId> {
    doc.descendants_by_tag(ied, &["LN"])
        .into_iter()
        .filter(|ln| doc.attr(*ln, "lnClass") == Some(class) && doc.is_public(*ln))
        .collect()
}

fn max_supervisions(doc: &SclDocument, ied: ElementId, kind: ControlBlockKind) -> usize {
    let Some(attr) = kind.supervision_capacity_attr() else {
        return 0;
    };
    doc.children_by_tag(ied, "Services")
        .flat_map(|services| doc.children_by_tag(services, "SupSubscription"))
        .next()
        .and_then(|sup| doc.attr(sup, attr))
        .and_then(|max| max.trim().parse::<usize>().ok())
        .unwrap_or(0)
}

fn next_free_inst(doc: &SclDocument, lns: &[ElementId], max_inst: u32) -> Option<u32> {
    let used: Vec<&str> = lns.iter().map(|ln| doc.attr_or_empty(*ln, "inst")).collect();
    (1..=max_inst).find(|inst| !used.contains(&inst.to_string().as_str()))
}

/// True unless `subscriber_ied` already supervises `control`, the edition
/// or the control block kind has no supervision, the IED has no LN of the
/// supervision class to copy from, or its capacity is used up.
pub fn can_instantiate(
    doc: &SclDocument,
    cache: &mut SubscriptionCache,
    cfg: &EngineCfg,
    control: ElementId,
    subscriber_ied: ElementId,
) -> bool {
    if doc.edition() == SclEdition::Ed2003 {
        return false;
    }
    let Some(kind) = ControlBlockKind::of(doc, control) else {
        return false;
    };
    let Some(class) = kind.supervision_class() else {
        return false;
    };
    if supervision_for(doc, cache, control, subscriber_ied).is_some() {
        return false;
    }
    let lns = supervision_lns(doc, subscriber_ied, class);
    if lns.is_empty() {
        return false;
    }
    let used = lns.iter().filter(|ln| supervision_reference(doc, **ln).is_some()).count();
    if used >= max_supervisions(doc, subscriber_ied, kind) {
        return false;
    }
    lns.iter().any(|ln| supervision_reference(doc, *ln).is_none())
        || next_free_inst(doc, &lns, cfg.max_supervision_inst).is_some()
}

fn src_ref_dai(doc: &SclDocument, template_ln: ElementId, do_name: &str, cb_ref: &str) -> NewElement {
    let mut dai = NewElement::new("DAI").with_attr("name", SRC_REF_DAI);
    let read_only = resolve_data_attribute(doc, template_ln, do_name, SRC_REF_DAI)
        .is_some_and(|da| doc.attr(da, "valKind") == Some("RO"));
    if read_only {
        dai = dai.with_attr("valKind", "RO").with_attr("valImport", "true");
    }
    dai.with_child(NewElement::new("Val").with_text(cb_ref))
}

/* write the reference into a free LN, reusing whatever part of the path exists */
fn fill_free_supervision(doc: &SclDocument, ln: ElementId, do_name: &str, cb_ref: &str) -> Vec<EditRequest> {
    let Some(doi) = doc.child_with_attr(ln, &["DOI"], "name", do_name) else {
        return vec![EditRequest::CreateElement {
            parent: ln,
            element: NewElement::new("DOI")
                .with_attr("name", do_name)
                .with_child(src_ref_dai(doc, ln, do_name, cb_ref)),
            reference: None,
        }];
    };
    let Some(dai) = doc.child_with_attr(doi, &["DAI"], "name", SRC_REF_DAI) else {
        return vec![EditRequest::CreateElement {
            parent: doi,
            element: src_ref_dai(doc, ln, do_name, cb_ref),
            reference: None,
        }];
    };
    let mut edits: Vec<EditRequest> = doc
        .children_by_tag(dai, "Val")
        .map(|val| EditRequest::DeleteElement {
            parent: dai,
            element: val,
        })
        .collect();
    edits.push(EditRequest::CreateElement {
        parent: dai,
        element: NewElement::new("Val").with_text(cb_ref),
        reference: None,
    });
    edits
}

/// Edits making `subscriber_ied` supervise `control`; empty when
/// [`can_instantiate`] says no.
///
/// A free LN of the supervision class is reused first. Otherwise a new one
/// is created next to the first LN of that class, with the lowest unused
/// `inst`, and marked as tool-created so that it can be removed again.
pub fn instantiate(
    doc: &SclDocument,
    cache: &mut SubscriptionCache,
    cfg: &EngineCfg,
    control: ElementId,
    subscriber_ied: ElementId,
) -> Vec<EditRequest> {
    if !can_instantiate(doc, cache, cfg, control, subscriber_ied) {
        return Vec::new();
    }
    let Some(kind) = ControlBlockKind::of(doc, control) else {
        return Vec::new();
    };
    let (Some(class), Some(do_name), Some(cb_ref)) = (
        kind.supervision_class(),
        kind.supervision_do(),
        control_block_reference(doc, control),
    ) else {
        return Vec::new();
    };

    let lns = supervision_lns(doc, subscriber_ied, class);
    if let Some(free) = lns.iter().copied().find(|ln| supervision_reference(doc, *ln).is_none()) {
        debug!("reusing supervision {:?} for {}", free, cb_ref);
        return fill_free_supervision(doc, free, do_name, &cb_ref);
    }

    let (Some(template), Some(inst)) = (lns.first().copied(), next_free_inst(doc, &lns, cfg.max_supervision_inst))
    else {
        return Vec::new();
    };
    let Some(ld) = doc.closest(template, &["LDevice"]) else {
        return Vec::new();
    };

    let mut ln = NewElement::new("LN")
        .with_attr("lnClass", class)
        .with_attr("inst", &inst.to_string());
    if let Some(ln_type) = doc.attr(template, "lnType") {
        ln = ln.with_attr("lnType", ln_type);
    }
    let ln = ln
        .with_child(NewElement::new("Private").with_attr("type", &cfg.created_marker))
        .with_child(
            NewElement::new("DOI")
                .with_attr("name", do_name)
                .with_child(src_ref_dai(doc, template, do_name, &cb_ref)),
        );

    /* keep LNs together: insert right after the last LN of the LDevice */
    let children = doc.children(ld);
    let reference = children
        .iter()
        .rposition(|child| doc.tag(*child) == "LN")
        .and_then(|last| children.get(last + 1).copied());

    debug!("creating {}{} for {}", class, inst, cb_ref);
    vec![EditRequest::CreateElement {
        parent: ld,
        element: ln,
        reference,
    }]
}

/// True when a public bound sink of `ied` other than `excluded` still
/// listens to `cb_ref`.
pub(crate) fn reference_still_used(doc: &SclDocument, ied: ElementId, cb_ref: &str, excluded: &[ElementId]) -> bool {
    doc.descendants_by_tag(ied, &["ExtRef"])
        .into_iter()
        .filter(|e| !excluded.contains(e) && doc.is_public(*e) && is_subscribed(doc, *e))
        .any(|e| sink_reference(doc, e).as_deref() == Some(cb_ref))
}

/// True when `ext_ref` is the last sink of its IED depending on an existing supervision.
pub fn can_remove(doc: &SclDocument, cache: &mut SubscriptionCache, ext_ref: ElementId) -> bool {
    let Some(ied) = doc.closest(ext_ref, &["IED"]) else {
        return false;
    };
    let Some(cb_ref) = sink_reference(doc, ext_ref) else {
        return false;
    };
    if cache.supervision(doc, &owner_ied_name(doc, ext_ref), &cb_ref).is_none() {
        return false;
    }
    !reference_still_used(doc, ied, &cb_ref, &[ext_ref])
}

/// Edits ending the supervision of `control` in `subscriber_ied`.
///
/// Tool-created LNs are deleted. Vendor LNs stay and only lose their `Val`,
/// which frees them for the next subscription.
pub fn remove(
    doc: &SclDocument,
    cache: &mut SubscriptionCache,
    cfg: &EngineCfg,
    control: ElementId,
    subscriber_ied: ElementId,
) -> Vec<EditRequest> {
    let Some(ln) = supervision_for(doc, cache, control, subscriber_ied) else {
        return Vec::new();
    };
    let created = doc
        .children_by_tag(ln, "Private")
        .any(|private| doc.attr(private, "type") == Some(cfg.created_marker.as_str()));
    if created {
        let Some(parent) = doc.parent(ln) else {
            return Vec::new();
        };
        return vec![EditRequest::DeleteElement { parent, element: ln }];
    }
    let Some(dai) = supervision_dai(doc, ln) else {
        return Vec::new();
    };
    doc.children_by_tag(dai, "Val")
        .map(|val| EditRequest::DeleteElement {
            parent: dai,
            element: val,
        })
        .collect()
}
