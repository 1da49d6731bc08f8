//! Structural identity strings.
//!
//! `identity` is the one place that names elements for cache keys and
//! selection values. It is built from the element's position in the SCL
//! addressing scheme (IED / LDevice / LN / DO / DA nesting), never from the
//! arena handle, and is injective over the attached tree: `[`, `]`, `>`
//! and `\` inside a local key are escaped with `\`, and siblings whose
//! escaped key would collide get a `[k]` suffix.

use super::{ElementId, SclDocument};
use std::collections::HashMap;

const NAMED_TAGS: [&str; 24] = [
    "IED",
    "AccessPoint",
    "DataSet",
    "GSEControl",
    "SampledValueControl",
    "ReportControl",
    "LogControl",
    "SettingControl",
    "Log",
    "DOI",
    "SDI",
    "DAI",
    "DO",
    "SDO",
    "DA",
    "BDA",
    "SubNetwork",
    "Substation",
    "VoltageLevel",
    "Bay",
    "ConductingEquipment",
    "Function",
    "LNode",
    "Association",
];

const TEMPLATE_TAGS: [&str; 4] = ["LNodeType", "DOType", "DAType", "EnumType"];

pub fn identity(doc: &SclDocument, element: ElementId) -> String {
    let Some(parent) = doc.parent(element) else {
        /* root, or a detached subtree root */
        return String::new();
    };
    let key = sibling_keys(doc, parent)
        .into_iter()
        .find(|(_, child)| *child == element)
        .map(|(key, _)| key)
        .unwrap_or_default();
    if parent == doc.root() {
        key
    } else {
        format!("{}>{}", identity(doc, parent), key)
    }
}

/// Inverse of [`identity`] over the attached tree.
///
/// Walks the path one step at a time, keying each parent's children once.
pub fn find_by_identity(doc: &SclDocument, wanted: &str) -> Option<ElementId> {
    let mut cur = doc.root();
    if wanted.is_empty() {
        return Some(cur);
    }
    for step in split_steps(wanted) {
        cur = sibling_keys(doc, cur)
            .into_iter()
            .find(|(key, _)| *key == step)
            .map(|(_, child)| child)?;
    }
    Some(cur)
}

/// Unique keys of all children of `parent`, in document order.
///
/// The n-th earlier child with the same escaped local key adds `[n]`.
/// Escaping keeps `[`, `]` and `>` out of raw keys, so suffixed and plain
/// keys never meet.
fn sibling_keys(doc: &SclDocument, parent: ElementId) -> Vec<(String, ElementId)> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    doc.children(parent)
        .iter()
        .map(|child| {
            /* any tag: a DataSet and a control block may share a name */
            let key = escape_key(&local_key(doc, *child));
            let earlier = seen.entry(key.clone()).or_insert(0);
            let unique = if *earlier == 0 {
                key
            } else {
                format!("{}[{}]", key, earlier)
            };
            *earlier += 1;
            (unique, *child)
        })
        .collect()
}

fn escape_key(raw: &str) -> String {
    let mut res = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '\\' | '[' | ']' | '>') {
            res.push('\\');
        }
        res.push(c);
    }
    res
}

/* split on `>` not preceded by the escape character */
fn split_steps(path: &str) -> Vec<String> {
    let mut steps = Vec::new();
    let mut cur = String::new();
    let mut chars = path.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                cur.push(c);
                if let Some(next) = chars.next() {
                    cur.push(next);
                }
            }
            '>' => steps.push(std::mem::take(&mut cur)),
            _ => cur.push(c),
        }
    }
    steps.push(cur);
    steps
}

fn local_key(doc: &SclDocument, e: ElementId) -> String {
    let tag = doc.tag(e);
    let a = |name: &str| doc.attr_or_empty(e, name);
    match tag {
        "LDevice" => a("inst").to_string(),
        "LN0" => "LLN0".to_string(),
        "LN" => format!("{} {} {}", a("prefix"), a("lnClass"), a("inst")),
        "FCDA" => {
            let da = if doc.has_attr(e, "daName") {
                format!(".{}", a("daName"))
            } else {
                String::new()
            };
            format!(
                "{}/{} {} {}.{}{} ({})",
                a("ldInst"),
                a("prefix"),
                a("lnClass"),
                a("lnInst"),
                a("doName"),
                da,
                a("fc")
            )
        }
        "ExtRef" => match doc.attr(e, "intAddr") {
            Some(int_addr) => int_addr.to_string(),
            None => format!(
                "{} {}/{} {} {} {} {}",
                a("iedName"),
                a("ldInst"),
                a("prefix"),
                a("lnClass"),
                a("lnInst"),
                a("doName"),
                a("daName")
            ),
        },
        "ConnectedAP" => format!("{} {}", a("iedName"), a("apName")),
        "GSE" | "SMV" => format!("{} {}", a("ldInst"), a("cbName")),
        "EnumVal" => a("ord").to_string(),
        "Private" => match doc.attr(e, "type") {
            Some(t) => format!("Private {}", t),
            None => "Private".to_string(),
        },
        _ if TEMPLATE_TAGS.contains(&tag) => a("id").to_string(),
        _ if NAMED_TAGS.contains(&tag) && doc.has_attr(e, "name") => a("name").to_string(),
        _ => tag.to_string(),
    }
}
