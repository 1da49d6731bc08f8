use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

pub mod edit;
pub mod identity;
mod parse;
mod write;

pub use edit::{Action, AttributeChange, EditRequest, NewElement};
pub use identity::{find_by_identity, identity};

/************************************************************************/
/*			目录					*/
/*1 文档句柄 及 节点*/
/*2 只读查询*/
/*3 版本 及 文档标识*/
/************************************************************************/

/* every constructed document gets its own id, used to detect document swaps */
static NEXT_DOC_ID: AtomicU64 = AtomicU64::new(1);

/// Handle of one element inside a [`SclDocument`].
///
/// Handles are only meaningful for the document that produced them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementId(pub(crate) usize);

/// `(doc_id, revision)` pair. Two equal stamps mean the document was not
/// swapped nor edited in between.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DocStamp {
    pub doc_id: u64,
    pub revision: u64,
}

/// Schema edition, taken from the root `SCL` element.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SclEdition {
    Ed2003,
    Ed2007B,
    Ed2007B4,
}

impl SclEdition {
    pub fn as_str(&self) -> &'static str {
        match self {
            SclEdition::Ed2003 => "2003",
            SclEdition::Ed2007B => "2007B",
            SclEdition::Ed2007B4 => "2007B4",
        }
    }
}

/************************************************************************/
/*			1 文档句柄 及 节点 start					*/
/************************************************************************/
#[derive(Clone, Debug, Default)]
pub(crate) struct SclNode {
    pub(crate) tag: String,
    /*属性 保持文件里的顺序     */
    pub(crate) attrs: Vec<(String, String)>,
    pub(crate) text: Option<String>,
    /*被删除的子树 parent 为 None   */
    pub(crate) parent: Option<ElementId>,
    pub(crate) children: Vec<ElementId>,
}

/// The whole SCL file as an element arena.
///
/// Reads go through the query methods below. Writes only happen through
/// [`SclDocument::apply`], one [`Action`] at a time.
#[derive(Debug)]
pub struct SclDocument {
    pub(crate) nodes: Vec<SclNode>,
    root: ElementId,
    doc_id: u64,
    revision: u64,
}

impl Clone for SclDocument {
    /* a clone is another document: it gets a fresh id */
    fn clone(&self) -> Self {
        SclDocument {
            nodes: self.nodes.clone(),
            root: self.root,
            doc_id: NEXT_DOC_ID.fetch_add(1, Ordering::Relaxed),
            revision: 0,
        }
    }
}

impl SclDocument {
    pub(crate) fn with_root(tag: &str, attrs: Vec<(String, String)>) -> Self {
        SclDocument {
            nodes: vec![SclNode {
                tag: tag.to_string(),
                attrs,
                ..Default::default()
            }],
            root: ElementId(0),
            doc_id: NEXT_DOC_ID.fetch_add(1, Ordering::Relaxed),
            revision: 0,
        }
    }

    pub(crate) fn alloc(&mut self, node: SclNode) -> ElementId {
        self.nodes.push(node);
        ElementId(self.nodes.len() - 1)
    }

    pub(crate) fn bump_revision(&mut self) {
        self.revision += 1;
    }

    fn node(&self, id: ElementId) -> &SclNode {
        &self.nodes[id.0]
    }

    /// True when `id` was allocated by this document.
    pub fn contains(&self, id: ElementId) -> bool {
        id.0 < self.nodes.len()
    }
}
/************************************************************************/
/*			1 文档句柄 及 节点 end					*/
/************************************************************************/

/************************************************************************/
/*			2 只读查询 start					*/
/************************************************************************/
impl SclDocument {
    pub fn root(&self) -> ElementId {
        self.root
    }

    pub fn tag(&self, id: ElementId) -> &str {
        &self.node(id).tag
    }

    pub fn attrs(&self, id: ElementId) -> &[(String, String)] {
        &self.node(id).attrs
    }

    pub fn attr(&self, id: ElementId, name: &str) -> Option<&str> {
        self.node(id)
            .attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /* missing attribute reads as empty string */
    pub fn attr_or_empty(&self, id: ElementId, name: &str) -> &str {
        self.attr(id, name).unwrap_or("")
    }

    pub fn has_attr(&self, id: ElementId, name: &str) -> bool {
        self.attr(id, name).is_some()
    }

    /// Text content owned directly by the element (e.g. a `Val`).
    pub fn text(&self, id: ElementId) -> &str {
        self.node(id).text.as_deref().unwrap_or("")
    }

    pub fn parent(&self, id: ElementId) -> Option<ElementId> {
        self.node(id).parent
    }

    pub fn children(&self, id: ElementId) -> &[ElementId] {
        &self.node(id).children
    }

    pub fn children_by_tag<'a>(
        &'a self,
        id: ElementId,
        tag: &'a str,
    ) -> impl Iterator<Item = ElementId> + 'a {
        self.children(id)
            .iter()
            .copied()
            .filter(move |child| self.tag(*child) == tag)
    }

    /// First direct child whose tag is one of `tags` and whose `attr` equals `value`.
    pub fn child_with_attr(
        &self,
        id: ElementId,
        tags: &[&str],
        attr: &str,
        value: &str,
    ) -> Option<ElementId> {
        self.children(id).iter().copied().find(|child| {
            tags.contains(&self.tag(*child)) && self.attr(*child, attr) == Some(value)
        })
    }

    /// All descendants in document order, `id` itself excluded.
    pub fn descendants(&self, id: ElementId) -> Vec<ElementId> {
        let mut res = Vec::new();
        let mut stack: Vec<ElementId> = self.children(id).iter().rev().copied().collect();
        while let Some(cur) = stack.pop() {
            res.push(cur);
            stack.extend(self.children(cur).iter().rev().copied());
        }
        res
    }

    pub fn descendants_by_tag(&self, id: ElementId, tags: &[&str]) -> Vec<ElementId> {
        self.descendants(id)
            .into_iter()
            .filter(|e| tags.contains(&self.tag(*e)))
            .collect()
    }

    /// Nearest ancestor-or-self whose tag is one of `tags`.
    pub fn closest(&self, id: ElementId, tags: &[&str]) -> Option<ElementId> {
        let mut cur = Some(id);
        while let Some(e) = cur {
            if tags.contains(&self.tag(e)) {
                return Some(e);
            }
            cur = self.parent(e);
        }
        None
    }

    /// Reachable from the root, i.e. not inside a deleted subtree.
    pub fn is_attached(&self, id: ElementId) -> bool {
        if !self.contains(id) {
            return false;
        }
        let mut cur = id;
        loop {
            if cur == self.root {
                return true;
            }
            match self.parent(cur) {
                Some(p) => cur = p,
                None => return false,
            }
        }
    }

    /// Not inside a `Private` section.
    pub fn is_public(&self, id: ElementId) -> bool {
        self.closest(id, &["Private"]).is_none()
    }
}
/************************************************************************/
/*			2 只读查询 end					*/
/************************************************************************/

/************************************************************************/
/*			3 版本 及 文档标识 start					*/
/************************************************************************/
impl SclDocument {
    /// `version`/`revision`/`release` of the root element mapped onto the
    /// editions the subscription rules distinguish.
    pub fn edition(&self) -> SclEdition {
        let version = self.attr(self.root, "version").unwrap_or("");
        if version.is_empty() || version == "2003" {
            return SclEdition::Ed2003;
        }
        let release = self
            .attr(self.root, "release")
            .and_then(|r| r.trim().parse::<u32>().ok())
            .unwrap_or(0);
        if version == "2007" && release >= 4 {
            SclEdition::Ed2007B4
        } else {
            SclEdition::Ed2007B
        }
    }

    pub fn stamp(&self) -> DocStamp {
        DocStamp {
            doc_id: self.doc_id,
            revision: self.revision,
        }
    }
}
/************************************************************************/
/*			3 版本 及 文档标识 end					*/
/************************************************************************/

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"<SCL version="2007" revision="B" release="4">
        <IED name="IED1">
            <AccessPoint name="P1"><Server><LDevice inst="CB1">
                <LN0 lnClass="LLN0" inst="" lnType="LLN0T"/>
                <LN lnClass="XCBR" inst="1" lnType="XCBRT"><Private type="x"><ExtRef/></Private></LN>
            </LDevice></Server></AccessPoint>
        </IED>
    </SCL>"#;

    #[test]
    fn test_queries() {
        let doc = SclDocument::parse_str(DOC).unwrap();
        let root = doc.root();
        assert_eq!(doc.tag(root), "SCL");
        assert_eq!(doc.edition(), SclEdition::Ed2007B4);

        let lns = doc.descendants_by_tag(root, &["LN0", "LN"]);
        assert_eq!(lns.len(), 2);
        assert_eq!(doc.tag(lns[0]), "LN0");
        assert_eq!(doc.attr(lns[1], "lnClass"), Some("XCBR"));
        assert_eq!(doc.attr_or_empty(lns[1], "prefix"), "");

        let ied = doc.closest(lns[1], &["IED"]).unwrap();
        assert_eq!(doc.attr(ied, "name"), Some("IED1"));
        assert!(doc.is_attached(lns[1]));

        let ext_ref = doc.descendants_by_tag(root, &["ExtRef"])[0];
        assert!(!doc.is_public(ext_ref));
        assert!(doc.is_public(lns[1]));
    }

    #[test]
    fn test_edition_defaults() {
        let doc = SclDocument::parse_str("<SCL/>").unwrap();
        assert_eq!(doc.edition(), SclEdition::Ed2003);
        let doc = SclDocument::parse_str(r#"<SCL version="2007" revision="B"/>"#).unwrap();
        assert_eq!(doc.edition(), SclEdition::Ed2007B);
    }

    #[test]
    fn test_clone_gets_new_identity() {
        let doc = SclDocument::parse_str(DOC).unwrap();
        let other = doc.clone();
        assert_ne!(doc.stamp(), other.stamp());
    }
}
