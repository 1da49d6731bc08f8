//! Edit requests and their application.
//!
//! The subscription core only *builds* [`Action`]s. Whoever owns the
//! document applies them, as one unit, with [`SclDocument::apply`].

use super::{ElementId, SclDocument, SclNode};
use anyhow::bail;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// One attribute-level change. `Clear` removes the attribute.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum AttributeChange {
    Set { name: String, value: String },
    Clear { name: String },
}

impl AttributeChange {
    pub fn set(name: &str, value: &str) -> Self {
        AttributeChange::Set {
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    pub fn clear(name: &str) -> Self {
        AttributeChange::Clear {
            name: name.to_string(),
        }
    }

    /// `Set` for a present value, `Clear` for an absent one.
    pub fn set_or_clear(name: &str, value: Option<&str>) -> Self {
        match value {
            Some(value) => AttributeChange::set(name, value),
            None => AttributeChange::clear(name),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            AttributeChange::Set { name, .. } | AttributeChange::Clear { name } => name,
        }
    }
}

/// Detached element description, materialized when a create request is applied.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewElement {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    pub text: Option<String>,
    pub children: Vec<NewElement>,
}

impl NewElement {
    pub fn new(tag: &str) -> Self {
        NewElement {
            tag: tag.to_string(),
            ..Default::default()
        }
    }

    pub fn with_attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = Some(text.to_string());
        self
    }

    pub fn with_child(mut self, child: NewElement) -> Self {
        self.children.push(child);
        self
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Deep copy of an existing subtree.
    pub fn snapshot(doc: &SclDocument, id: ElementId) -> Self {
        let text = doc.text(id);
        NewElement {
            tag: doc.tag(id).to_string(),
            attrs: doc.attrs(id).to_vec(),
            text: (!text.is_empty()).then(|| text.to_string()),
            children: doc
                .children(id)
                .iter()
                .map(|child| NewElement::snapshot(doc, *child))
                .collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum EditRequest {
    Update {
        target: ElementId,
        changes: Vec<AttributeChange>,
    },
    /// Appended as last child unless `reference` names the sibling to insert before.
    CreateElement {
        parent: ElementId,
        element: NewElement,
        reference: Option<ElementId>,
    },
    DeleteElement {
        parent: ElementId,
        element: ElementId,
    },
}

/// Ordered edit requests applied atomically, one undo step.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub title: String,
    pub edits: Vec<EditRequest>,
}

impl Action {
    pub fn new(title: &str, edits: Vec<EditRequest>) -> Self {
        Action {
            title: title.to_string(),
            edits,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }
}

/* how to take back one applied edit when a later one in the same action fails */
enum Rollback {
    Edit(EditRequest),
    Reattach {
        parent: ElementId,
        element: ElementId,
        position: usize,
    },
}

impl SclDocument {
    /// Applies all edits of `action` or none of them.
    ///
    /// Returns the inverse action on success. The revision of the document
    /// is bumped once per applied action.
    pub fn apply(&mut self, action: &Action) -> crate::Result<Action> {
        let mut rollbacks: Vec<Rollback> = Vec::with_capacity(action.edits.len());
        let mut inverse: Vec<EditRequest> = Vec::with_capacity(action.edits.len());
        for (index, edit) in action.edits.iter().enumerate() {
            match self.apply_edit(edit) {
                Ok((rollback, undo)) => {
                    rollbacks.push(rollback);
                    inverse.push(undo);
                }
                Err(err) => {
                    for rollback in rollbacks.into_iter().rev() {
                        self.roll_back(rollback);
                    }
                    return Err(err.context(format!(
                        "action '{}' rejected at edit {}",
                        action.title, index
                    )));
                }
            }
        }
        self.bump_revision();
        inverse.reverse();
        Ok(Action {
            title: action.title.clone(),
            edits: inverse,
        })
    }

    fn apply_edit(&mut self, edit: &EditRequest) -> crate::Result<(Rollback, EditRequest)> {
        match edit {
            EditRequest::Update { target, changes } => {
                if !self.is_attached(*target) {
                    bail!("update target {:?} is not part of the document", target);
                }
                let mut undo = Vec::with_capacity(changes.len());
                for change in changes {
                    let old = self.attr(*target, change.name()).map(str::to_string);
                    undo.push(AttributeChange::set_or_clear(change.name(), old.as_deref()));
                    self.write_attr(*target, change);
                }
                undo.reverse();
                let undo = EditRequest::Update {
                    target: *target,
                    changes: undo,
                };
                Ok((Rollback::Edit(undo.clone()), undo))
            }
            EditRequest::CreateElement {
                parent,
                element,
                reference,
            } => {
                if !self.is_attached(*parent) {
                    bail!("create parent {:?} is not part of the document", parent);
                }
                let position = match reference {
                    Some(reference) => match self.position_in_parent(*parent, *reference) {
                        Some(pos) => pos,
                        None => bail!("reference {:?} is not a child of {:?}", reference, parent),
                    },
                    None => self.children(*parent).len(),
                };
                let id = self.materialize(element, *parent);
                self.nodes[parent.0].children.insert(position, id);
                let undo = EditRequest::DeleteElement {
                    parent: *parent,
                    element: id,
                };
                Ok((Rollback::Edit(undo.clone()), undo))
            }
            EditRequest::DeleteElement { parent, element } => {
                if !self.is_attached(*parent) {
                    bail!("delete parent {:?} is not part of the document", parent);
                }
                let Some(position) = self.position_in_parent(*parent, *element) else {
                    bail!("element {:?} is not a child of {:?}", element, parent);
                };
                let snapshot = NewElement::snapshot(self, *element);
                self.nodes[parent.0].children.remove(position);
                self.nodes[element.0].parent = None;
                let reference = self.children(*parent).get(position).copied();
                Ok((
                    Rollback::Reattach {
                        parent: *parent,
                        element: *element,
                        position,
                    },
                    EditRequest::CreateElement {
                        parent: *parent,
                        element: snapshot,
                        reference,
                    },
                ))
            }
        }
    }

    fn roll_back(&mut self, rollback: Rollback) {
        match rollback {
            Rollback::Edit(edit) => {
                if let Err(err) = self.apply_edit(&edit) {
                    warn!("rollback edit failed: {:#}", err);
                }
            }
            Rollback::Reattach {
                parent,
                element,
                position,
            } => {
                let position = position.min(self.nodes[parent.0].children.len());
                self.nodes[parent.0].children.insert(position, element);
                self.nodes[element.0].parent = Some(parent);
            }
        }
    }

    fn write_attr(&mut self, target: ElementId, change: &AttributeChange) {
        let attrs = &mut self.nodes[target.0].attrs;
        match change {
            AttributeChange::Set { name, value } => {
                match attrs.iter_mut().find(|(key, _)| key == name) {
                    Some(slot) => slot.1 = value.clone(),
                    None => attrs.push((name.clone(), value.clone())),
                }
            }
            AttributeChange::Clear { name } => attrs.retain(|(key, _)| key != name),
        }
    }

    fn position_in_parent(&self, parent: ElementId, child: ElementId) -> Option<usize> {
        if !self.contains(child) || self.parent(child) != Some(parent) {
            return None;
        }
        self.children(parent).iter().position(|c| *c == child)
    }

    fn materialize(&mut self, element: &NewElement, parent: ElementId) -> ElementId {
        let id = self.alloc(SclNode {
            tag: element.tag.clone(),
            attrs: element.attrs.clone(),
            text: element.text.clone(),
            parent: Some(parent),
            children: Vec::new(),
        });
        for child in &element.children {
            let child_id = self.materialize(child, id);
            self.nodes[id.0].children.push(child_id);
        }
        id
    }
}
