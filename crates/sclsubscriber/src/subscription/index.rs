//! Queries over sources (FCDAs of control blocks) and sinks (ExtRefs).
//!
//! Every function here is a pure function of the document. The only state
//! kept is [`SubscriptionCache`], which is thrown away whenever the
//! document stamp changes.

use super::compat::{is_subscribed_to, FCDA_MIRROR_ATTRS};
use super::supervision::build_supervision_index;
use super::ControlBlockKind;
use crate::scl::{identity, DocStamp, ElementId, SclDocument};
use crate::utils::ied_name_of;
use std::collections::HashMap;
use tracing::trace;

/* attributes whose presence makes a sink count as bound */
const BOUND_ATTRS: [&str; 6] = ["iedName", "ldInst", "lnClass", "lnInst", "doName", "daName"];

/// Attribute presence check, independent of any source.
pub fn is_subscribed(doc: &SclDocument, ext_ref: ElementId) -> bool {
    BOUND_ATTRS.iter().all(|attr| doc.has_attr(ext_ref, attr))
}

/// All sinks below `root` of one addressing mode, sinks of the FCDA's own IED excluded.
pub fn get_ext_ref_elements(
    doc: &SclDocument,
    root: ElementId,
    fcda: Option<ElementId>,
    include_later_binding: bool,
) -> Vec<ElementId> {
    let publisher = fcda.and_then(|f| doc.closest(f, &["IED"]));
    doc.descendants_by_tag(root, &["ExtRef"])
        .into_iter()
        .filter(|e| doc.has_attr(*e, "intAddr") == include_later_binding)
        .filter(|e| publisher.is_none() || doc.closest(*e, &["IED"]) != publisher)
        .collect()
}

pub fn get_subscribed_ext_ref_elements(
    doc: &SclDocument,
    root: ElementId,
    kind: ControlBlockKind,
    fcda: Option<ElementId>,
    control: Option<ElementId>,
    include_later_binding: bool,
) -> Vec<ElementId> {
    get_ext_ref_elements(doc, root, fcda, include_later_binding)
        .into_iter()
        .filter(|e| is_subscribed_to(doc, kind, control, fcda, *e))
        .collect()
}

/// Later binding sinks still free and accepting `kind`'s service type.
pub fn get_available_ext_ref_elements(
    doc: &SclDocument,
    root: ElementId,
    kind: ControlBlockKind,
    fcda: Option<ElementId>,
) -> Vec<ElementId> {
    get_ext_ref_elements(doc, root, fcda, true)
        .into_iter()
        .filter(|e| !is_subscribed(doc, *e))
        .filter(|e| match doc.attr(*e, "serviceType") {
            None => true,
            Some(service_type) => Some(service_type) == kind.service_type(),
        })
        .collect()
}

/// Public FCDAs of the IED named by `iedName` whose six reference
/// attributes equal the sink's.
pub fn find_fcdas(doc: &SclDocument, ext_ref: ElementId) -> Vec<ElementId> {
    if doc.tag(ext_ref) != "ExtRef" || !doc.is_public(ext_ref) {
        return Vec::new();
    }
    let Some(ied_name) = doc.attr(ext_ref, "iedName") else {
        return Vec::new();
    };
    let Some(ied) = doc
        .descendants_by_tag(doc.root(), &["IED"])
        .into_iter()
        .find(|ied| doc.attr(*ied, "name") == Some(ied_name) && doc.is_public(*ied))
    else {
        return Vec::new();
    };

    doc.descendants_by_tag(ied, &["FCDA"])
        .into_iter()
        .filter(|fcda| doc.is_public(*fcda))
        .filter(|fcda| {
            FCDA_MIRROR_ATTRS
                .iter()
                .all(|attr| doc.attr_or_empty(*fcda, attr) == doc.attr_or_empty(ext_ref, attr))
        })
        .collect()
}

/* provenance attributes point at exactly one control block */
fn matches_provenance(doc: &SclDocument, ext_ref: ElementId, cb_name: &str, control: ElementId) -> bool {
    let Some(ln0) = doc.closest(control, &["LN0"]) else {
        return false;
    };
    let Some(ld) = doc.closest(ln0, &["LDevice"]) else {
        return false;
    };
    let src_ld_inst = doc
        .attr(ext_ref, "srcLDInst")
        .or_else(|| doc.attr(ext_ref, "ldInst"))
        .unwrap_or("");
    doc.attr(control, "name") == Some(cb_name)
        && doc.attr_or_empty(ext_ref, "srcLNInst") == doc.attr_or_empty(ln0, "inst")
        && doc.attr(ext_ref, "srcLNClass").unwrap_or("LLN0") == doc.attr_or_empty(ln0, "lnClass")
        && doc.attr_or_empty(ext_ref, "srcPrefix") == doc.attr_or_empty(ln0, "prefix")
        && src_ld_inst == doc.attr_or_empty(ld, "inst")
}

/// Reverse lookup: control blocks that may publish the sink's source.
///
/// Candidates are the control blocks next to each matching FCDA's data set,
/// restricted to the kinds allowed by the sink's `serviceType`. A sink with
/// `srcCBName` is matched on its provenance, any other on the data set name.
/// Result is deduplicated and in document order per FCDA, so the first
/// entry is the tie-break winner.
pub fn find_control_blocks_for_ext_ref(doc: &SclDocument, ext_ref: ElementId) -> Vec<ElementId> {
    let kinds = ControlBlockKind::for_service_type(doc.attr(ext_ref, "serviceType"));
    let src_cb_name = doc.attr(ext_ref, "srcCBName").filter(|name| !name.is_empty());

    let mut res: Vec<ElementId> = Vec::new();
    for fcda in find_fcdas(doc, ext_ref) {
        let Some(data_set) = doc.parent(fcda) else {
            continue;
        };
        let Some(any_ln) = doc.parent(data_set) else {
            continue;
        };
        let ds_name = doc.attr_or_empty(data_set, "name");
        let candidates = doc
            .descendants(any_ln)
            .into_iter()
            .filter(|cb| ControlBlockKind::of(doc, *cb).is_some_and(|k| kinds.contains(&k)))
            .filter(|cb| match src_cb_name {
                Some(cb_name) => matches_provenance(doc, ext_ref, cb_name, *cb),
                None => doc.attr(*cb, "datSet") == Some(ds_name),
            });
        for cb in candidates {
            if !res.contains(&cb) {
                res.push(cb);
            }
        }
    }
    res
}

pub fn find_control_block(doc: &SclDocument, ext_ref: ElementId) -> Option<ElementId> {
    find_control_blocks_for_ext_ref(doc, ext_ref).into_iter().next()
}

/// FCDA of `control`'s data set the sink is bound to.
pub fn find_fcda(doc: &SclDocument, ext_ref: ElementId, control: ElementId) -> Option<ElementId> {
    let data_set_ref = doc.attr(control, "datSet")?;
    find_fcdas(doc, ext_ref)
        .into_iter()
        .find(|fcda| doc.parent(*fcda).and_then(|ds| doc.attr(ds, "name")) == Some(data_set_ref))
}

/// `LN0 > <kind>` elements of the document, sorted by identity.
pub fn control_elements(doc: &SclDocument, kind: ControlBlockKind) -> Vec<ElementId> {
    let mut res: Vec<(String, ElementId)> = doc
        .descendants_by_tag(doc.root(), &["LN0"])
        .into_iter()
        .flat_map(|ln0| doc.children_by_tag(ln0, kind.tag()).collect::<Vec<_>>())
        .map(|cb| (identity(doc, cb), cb))
        .collect();
    res.sort_by(|a, b| a.0.cmp(&b.0));
    res.into_iter().map(|(_, cb)| cb).collect()
}

/// FCDAs of the data set referenced by `control`, in data set order.
pub fn fcda_elements(doc: &SclDocument, control: ElementId) -> Vec<ElementId> {
    let (Some(any_ln), Some(data_set_ref)) = (doc.parent(control), doc.attr(control, "datSet")) else {
        return Vec::new();
    };
    doc.child_with_attr(any_ln, &["DataSet"], "name", data_set_ref)
        .map(|ds| doc.children_by_tag(ds, "FCDA").collect())
        .unwrap_or_default()
}

/// Number of later binding sinks in the document bound to `fcda` of `control`.
pub fn count_ext_ref_usage(doc: &SclDocument, control: ElementId, fcda: ElementId) -> usize {
    let Some(kind) = ControlBlockKind::of(doc, control) else {
        return 0;
    };
    get_subscribed_ext_ref_elements(doc, doc.root(), kind, Some(fcda), Some(control), true).len()
}

/// Short label of the source control block as recorded on the sink.
pub fn src_control_block_description(doc: &SclDocument, ext_ref: ElementId) -> String {
    let prefix = doc.attr_or_empty(ext_ref, "srcPrefix");
    let prefix = if prefix.is_empty() {
        String::new()
    } else {
        format!("{} ", prefix)
    };
    format!(
        "{}{} / {} {}",
        prefix,
        doc.attr_or_empty(ext_ref, "srcLDInst"),
        doc.attr_or_empty(ext_ref, "srcLNClass"),
        doc.attr_or_empty(ext_ref, "srcCBName")
    )
}

/// Sinks of one IED that may take a `kind` binding, sorted by their address path.
pub fn ext_refs_by_ied(doc: &SclDocument, ied: ElementId, kind: ControlBlockKind) -> Vec<ElementId> {
    let addr_path = |e: ElementId| {
        let parent = doc.parent(e).map(|p| identity(doc, p)).unwrap_or_default();
        format!("{}{}", parent, doc.attr_or_empty(e, "intAddr"))
    };
    let mut res: Vec<(String, ElementId)> = doc
        .descendants_by_tag(ied, &["ExtRef"])
        .into_iter()
        .filter(|e| {
            let service_type = doc.attr(*e, "serviceType");
            (doc.has_attr(*e, "intAddr") && service_type.is_none())
                || (service_type.is_some() && service_type == kind.service_type())
        })
        .map(|e| (addr_path(e), e))
        .collect();
    res.sort_by(|a, b| a.0.cmp(&b.0));
    res.into_iter().map(|(_, e)| e).collect()
}

/// Derived data that is expensive to recompute on every query.
///
/// Both maps are dropped together as soon as the document stamp differs
/// from the one they were built for, and can be dropped explicitly with
/// [`SubscriptionCache::invalidate`].
#[derive(Debug, Default)]
pub struct SubscriptionCache {
    stamp: Option<DocStamp>,
    fcda_counts: HashMap<String, usize>,
    supervisions: Option<HashMap<(String, String), ElementId>>,
}

impl SubscriptionCache {
    fn sync(&mut self, doc: &SclDocument) {
        let stamp = doc.stamp();
        if self.stamp != Some(stamp) {
            trace!("subscription cache reset for {:?}", stamp);
            self.fcda_counts.clear();
            self.supervisions = None;
            self.stamp = Some(stamp);
        }
    }

    pub fn invalidate(&mut self) {
        self.stamp = None;
        self.fcda_counts.clear();
        self.supervisions = None;
    }

    /// [`count_ext_ref_usage`], keyed by the FCDA's identity.
    pub fn fcda_usage_count(&mut self, doc: &SclDocument, control: ElementId, fcda: ElementId) -> usize {
        self.sync(doc);
        let key = format!("{} {}", identity(doc, control), identity(doc, fcda));
        if let Some(count) = self.fcda_counts.get(&key) {
            return *count;
        }
        let count = count_ext_ref_usage(doc, control, fcda);
        self.fcda_counts.insert(key, count);
        count
    }

    /// Supervision LN per `(subscriber IED name, control block reference)`.
    pub fn supervision(&mut self, doc: &SclDocument, ied_name: &str, cb_ref: &str) -> Option<ElementId> {
        self.sync(doc);
        let index = self
            .supervisions
            .get_or_insert_with(|| build_supervision_index(doc));
        index.get(&(ied_name.to_string(), cb_ref.to_string())).copied()
    }

    pub fn is_fresh(&self, doc: &SclDocument) -> bool {
        self.stamp == Some(doc.stamp())
    }
}

/// IED name owning `element`, empty when outside any IED.
pub(crate) fn owner_ied_name(doc: &SclDocument, element: ElementId) -> String {
    ied_name_of(doc, element).unwrap_or_default().to_string()
}
