//! Per-object allowable actions

use std::fmt;

use ahash::AHashMap;
use log::debug;

use crate::xml::{parse_bool, Element};

/// The 29 actions a CMIS server reports for an object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    DeleteObject,
    UpdateProperties,
    GetFolderTree,
    GetProperties,
    GetObjectRelationships,
    GetObjectParents,
    GetFolderParent,
    GetDescendants,
    MoveObject,
    DeleteContentStream,
    CheckOut,
    CancelCheckOut,
    CheckIn,
    SetContentStream,
    GetAllVersions,
    AddObjectToFolder,
    RemoveObjectFromFolder,
    GetContentStream,
    ApplyPolicy,
    GetAppliedPolicies,
    RemovePolicy,
    GetChildren,
    CreateDocument,
    CreateFolder,
    CreateRelationship,
    DeleteTree,
    GetRenditions,
    GetACL,
    ApplyACL,
}

impl Action {
    pub const ALL: [Action; 29] = [
        Action::DeleteObject,
        Action::UpdateProperties,
        Action::GetFolderTree,
        Action::GetProperties,
        Action::GetObjectRelationships,
        Action::GetObjectParents,
        Action::GetFolderParent,
        Action::GetDescendants,
        Action::MoveObject,
        Action::DeleteContentStream,
        Action::CheckOut,
        Action::CancelCheckOut,
        Action::CheckIn,
        Action::SetContentStream,
        Action::GetAllVersions,
        Action::AddObjectToFolder,
        Action::RemoveObjectFromFolder,
        Action::GetContentStream,
        Action::ApplyPolicy,
        Action::GetAppliedPolicies,
        Action::RemovePolicy,
        Action::GetChildren,
        Action::CreateDocument,
        Action::CreateFolder,
        Action::CreateRelationship,
        Action::DeleteTree,
        Action::GetRenditions,
        Action::GetACL,
        Action::ApplyACL,
    ];

    /// Element name used on the wire, e.g. `canCheckOut`
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::DeleteObject => "canDeleteObject",
            Action::UpdateProperties => "canUpdateProperties",
            Action::GetFolderTree => "canGetFolderTree",
            Action::GetProperties => "canGetProperties",
            Action::GetObjectRelationships => "canGetObjectRelationships",
            Action::GetObjectParents => "canGetObjectParents",
            Action::GetFolderParent => "canGetFolderParent",
            Action::GetDescendants => "canGetDescendants",
            Action::MoveObject => "canMoveObject",
            Action::DeleteContentStream => "canDeleteContentStream",
            Action::CheckOut => "canCheckOut",
            Action::CancelCheckOut => "canCancelCheckOut",
            Action::CheckIn => "canCheckIn",
            Action::SetContentStream => "canSetContentStream",
            Action::GetAllVersions => "canGetAllVersions",
            Action::AddObjectToFolder => "canAddObjectToFolder",
            Action::RemoveObjectFromFolder => "canRemoveObjectFromFolder",
            Action::GetContentStream => "canGetContentStream",
            Action::ApplyPolicy => "canApplyPolicy",
            Action::GetAppliedPolicies => "canGetAppliedPolicies",
            Action::RemovePolicy => "canRemovePolicy",
            Action::GetChildren => "canGetChildren",
            Action::CreateDocument => "canCreateDocument",
            Action::CreateFolder => "canCreateFolder",
            Action::CreateRelationship => "canCreateRelationship",
            Action::DeleteTree => "canDeleteTree",
            Action::GetRenditions => "canGetRenditions",
            Action::GetACL => "canGetACL",
            Action::ApplyACL => "canApplyACL",
        }
    }

    /// Parse a wire element name
    pub fn parse(s: &str) -> Option<Action> {
        Action::ALL.into_iter().find(|a| a.as_str() == s)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Action flags of one object. An action missing from the map is not
/// defined, which is different from being defined as `false`.
#[derive(Debug, Clone, Default)]
pub struct AllowableActions {
    states: AHashMap<Action, bool>,
}

impl AllowableActions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read an `allowableActions` element.
    ///
    /// Children with unknown names are skipped. Content that is not an XML
    /// boolean counts as `false`; this keeps servers that send odd values
    /// usable at the cost of hiding actions they may actually allow.
    pub fn from_node(node: &Element) -> Self {
        let mut states = AHashMap::new();
        for child in node.elements() {
            let Some(action) = Action::parse(child.local_name()) else {
                debug!("skipping unknown allowable action {}", child.local_name());
                continue;
            };
            let text = child.text();
            let enabled = parse_bool(&text).unwrap_or_else(|| {
                debug!("non-boolean value {text:?} for {action}, treating as false");
                false
            });
            states.insert(action, enabled);
        }
        Self { states }
    }

    pub fn set(&mut self, action: Action, enabled: bool) {
        self.states.insert(action, enabled);
    }

    pub fn is_allowed(&self, action: Action) -> bool {
        self.states.get(&action).copied().unwrap_or(false)
    }

    pub fn is_defined(&self, action: Action) -> bool {
        self.states.contains_key(&action)
    }

    /// Defined actions with their flags
    pub fn iter(&self) -> impl Iterator<Item = (Action, bool)> + '_ {
        self.states.iter().map(|(a, b)| (*a, *b))
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
