//! Dashboard Tree Builder
//!
//! Rebuilds Grafana's folder hierarchy from the two flat search listings
//! (`dash-folder` and `dash-db`) and attaches dashboards to their folders.
//!
//! # Pipeline
//!
//! ```text
//! folders ─┐
//!          ├─► fix out-of-bounds ─► index by parent ─► single-root fix ─► place folders ─► attach dashboards
//! dashboards┘                                                                                  (READ filter)
//! ```
//!
//! The service account may see a dashboard without seeing its folder, or only
//! one subtree with no root folder at all. Both shapes are repaired instead of
//! rejected.
//!
//! Folder nodes live in an arena; parent/child links and the UID lookup are
//! indices into it. Folder chains that never reach the root are placed as
//! detached subtrees at the top level. Only dashboard leaves are filtered by
//! rights, folders are always kept.

use crate::rights::{AccessRights, ProfileId};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Parent key of top-level folders and dashboards
pub const ROOT: &str = "root";

/// Grafana folder, as returned by `search?type=dash-folder`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    pub uid: String,
    #[serde(default)]
    pub title: String,
    /// Parent folder; absent or empty means root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_uid: Option<String>,
}

impl Folder {
    pub fn parent_key(&self) -> &str {
        match self.folder_uid.as_deref() {
            Some(parent) if !parent.is_empty() => parent,
            _ => ROOT,
        }
    }
}

/// Grafana dashboard, as returned by `search?type=dash-db`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub uid: String,
    #[serde(default)]
    pub title: String,
    /// Containing folder; may name a folder the service account cannot see
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_title: Option<String>,
    /// Path fragment, e.g. `/d/abc123/sales`
    #[serde(default)]
    pub url: String,
}

impl Dashboard {
    pub fn folder_key(&self) -> &str {
        match self.folder_uid.as_deref() {
            Some(folder) if !folder.is_empty() => folder,
            _ => ROOT,
        }
    }

    fn move_to_root(&mut self) {
        self.folder_uid = Some(ROOT.to_string());
    }
}

/// Reassign dashboards whose folder is not in `folders` to the root.
///
/// Returns how many dashboards were moved.
pub fn fix_out_of_bounds(dashboards: &mut [Dashboard], folders: &[Folder]) -> usize {
    let known: HashSet<&str> = folders.iter().map(|f| f.uid.as_str()).collect();
    let mut moved = 0;

    for dashboard in dashboards.iter_mut() {
        let in_bounds = dashboard
            .folder_uid
            .as_deref()
            .is_some_and(|uid| known.contains(uid));

        if !in_bounds {
            if dashboard.folder_uid.as_deref() != Some(ROOT) {
                moved += 1;
            }
            dashboard.move_to_root();
        }
    }

    moved
}

/// Keep the dashboards `profile` can read, in listing order
pub fn visible_dashboards<R>(
    dashboards: Vec<Dashboard>,
    rights: &R,
    profile: ProfileId,
) -> Result<Vec<Dashboard>>
where
    R: AccessRights + ?Sized,
{
    let mut visible = Vec::with_capacity(dashboards.len());
    for dashboard in dashboards {
        if rights.can_view(profile, &dashboard.uid)? {
            visible.push(dashboard);
        }
    }
    Ok(visible)
}

/// Folders grouped by parent key, preserving listing order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FolderIndex {
    parents: Vec<String>,
    groups: HashMap<String, Vec<Folder>>,
}

impl FolderIndex {
    /// Group `folders` by parent key
    pub fn new(folders: &[Folder]) -> Self {
        let mut index = Self::default();

        for folder in folders {
            let parent = folder.parent_key();
            if !index.groups.contains_key(parent) {
                index.parents.push(parent.to_string());
            }
            index
                .groups
                .entry(parent.to_string())
                .or_default()
                .push(folder.clone());
        }

        index
    }

    /// Parent keys, in order of first appearance
    pub fn parents(&self) -> &[String] {
        &self.parents
    }

    pub fn children(&self, parent: &str) -> &[Folder] {
        self.groups.get(parent).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_root(&self) -> bool {
        self.groups.contains_key(ROOT)
    }

    /// Promote a lone parent group to the root.
    ///
    /// Applies when no folder sits at the root and every folder shares one
    /// parent, i.e. the service account only sees a single subtree. Folders of
    /// the group and dashboards pointing at the old parent are rewritten to
    /// `root`. Returns the old parent key when the correction was applied.
    pub fn promote_single_root(&mut self, dashboards: &mut [Dashboard]) -> Option<String> {
        if self.groups.is_empty() || self.has_root() || self.groups.len() != 1 {
            return None;
        }

        let old = self.parents.pop()?;
        let mut group = self.groups.remove(&old)?;

        for folder in group.iter_mut() {
            if folder.parent_key() == old {
                folder.folder_uid = Some(ROOT.to_string());
            }
        }
        for dashboard in dashboards.iter_mut() {
            if dashboard.folder_uid.as_deref() == Some(old.as_str()) {
                dashboard.move_to_root();
            }
        }

        self.parents.push(ROOT.to_string());
        self.groups.insert(ROOT.to_string(), group);

        debug!("Promoted folder group '{}' to root", old);
        Some(old)
    }
}

/// Index of a folder node in the tree arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FolderId(usize);

#[derive(Debug, Clone, PartialEq)]
struct FolderNode {
    folder: Folder,
    subfolders: Vec<FolderId>,
    dashboards: Vec<Dashboard>,
}

#[derive(Debug, Clone, PartialEq)]
enum Entry {
    Folder(FolderId),
    Dashboard(Dashboard),
}

/// Nested folder/dashboard listing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FolderTree {
    nodes: Vec<FolderNode>,
    by_uid: HashMap<String, FolderId>,
    top: Vec<Entry>,
}

/// Depth-first traversal event
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WalkEvent<'a> {
    EnterFolder { folder: &'a Folder, depth: usize },
    Dashboard { dashboard: &'a Dashboard, depth: usize },
    LeaveFolder { folder: &'a Folder, depth: usize },
}

/// Serializable view of a tree node
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum TreeNode {
    #[serde(rename = "dash-folder")]
    Folder(FolderView),
    #[serde(rename = "dash-db")]
    Dashboard(DashboardLeaf),
}

impl TreeNode {
    fn leaf<F>(dashboard: &Dashboard, link: &F) -> Self
    where
        F: Fn(&Dashboard) -> Option<String>,
    {
        TreeNode::Dashboard(DashboardLeaf {
            embed_url: link(dashboard),
            dashboard: dashboard.clone(),
        })
    }
}

/// Dashboard leaf, with the iframe URL when one was issued
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardLeaf {
    #[serde(flatten)]
    pub dashboard: Dashboard,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embed_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FolderView {
    pub uid: String,
    pub title: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub subfolders: Vec<TreeNode>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dashboards: Vec<TreeNode>,
}

impl FolderTree {
    /// Build the full, unfiltered tree
    pub fn build(folders: Vec<Folder>, mut dashboards: Vec<Dashboard>) -> Self {
        let moved = fix_out_of_bounds(&mut dashboards, &folders);

        let mut index = FolderIndex::new(&folders);
        index.promote_single_root(&mut dashboards);

        let mut tree = Self::default();
        let root_level = tree.place_level(&index, ROOT);
        let detached = tree.place_detached(&index);
        if root_level.is_empty() && !detached.is_empty() {
            debug!("No root level in folder listing, showing {} detached folders", detached.len());
        }
        tree.top = root_level
            .into_iter()
            .chain(detached)
            .map(Entry::Folder)
            .collect();

        for dashboard in dashboards {
            tree.attach(dashboard);
        }

        debug!(
            "Built dashboard tree: {} folders, {} dashboards, {} moved to root",
            tree.folder_count(),
            tree.dashboard_count(),
            moved
        );
        tree
    }

    /// Build the tree showing only dashboards `profile` can read
    pub fn build_for_profile<R>(
        folders: Vec<Folder>,
        dashboards: Vec<Dashboard>,
        rights: &R,
        profile: ProfileId,
    ) -> Result<Self>
    where
        R: AccessRights + ?Sized,
    {
        let visible = visible_dashboards(dashboards, rights, profile)?;
        Ok(Self::build(folders, visible))
    }

    /// Place the folders of one parent group, recursing into their children.
    /// A folder already placed is skipped, which also stops parent cycles.
    fn place_level(&mut self, index: &FolderIndex, parent: &str) -> Vec<FolderId> {
        let mut level = Vec::new();

        for folder in index.children(parent) {
            if self.by_uid.contains_key(&folder.uid) {
                continue;
            }

            let id = FolderId(self.nodes.len());
            self.nodes.push(FolderNode {
                folder: folder.clone(),
                subfolders: Vec::new(),
                dashboards: Vec::new(),
            });
            self.by_uid.insert(folder.uid.clone(), id);

            let subfolders = self.place_level(index, &folder.uid);
            self.nodes[id.0].subfolders = subfolders;
            level.push(id);
        }

        level
    }

    fn attach(&mut self, dashboard: Dashboard) {
        let target = match dashboard.folder_key() {
            ROOT => None,
            uid => self.by_uid.get(uid).copied(),
        };

        match target {
            Some(id) => self.nodes[id.0].dashboards.push(dashboard),
            None => self.top.push(Entry::Dashboard(dashboard)),
        }
    }

    /// Place folders whose parent chain never reaches the root.
    ///
    /// Happens when the service account sees a subtree but not the folder
    /// above it, e.g. `A` (parent `P` hidden) and `A/B`. Groups hanging off an
    /// unknown parent go first so visible subtrees stay nested; whatever is
    /// left only hangs off a parent cycle. Returns the top of each chain.
    fn place_detached(&mut self, index: &FolderIndex) -> Vec<FolderId> {
        let known: HashSet<&str> = index
            .groups
            .values()
            .flatten()
            .map(|f| f.uid.as_str())
            .collect();

        let mut detached = Vec::new();
        for parent in index.parents() {
            if !known.contains(parent.as_str()) {
                detached.extend(self.place_level(index, parent));
            }
        }
        for parent in index.parents() {
            detached.extend(self.place_level(index, parent));
        }
        detached
    }

    pub fn is_empty(&self) -> bool {
        self.top.is_empty()
    }

    pub fn folder_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn dashboard_count(&self) -> usize {
        let nested: usize = self.nodes.iter().map(|n| n.dashboards.len()).sum();
        let top = self
            .top
            .iter()
            .filter(|e| matches!(e, Entry::Dashboard(_)))
            .count();
        nested + top
    }

    /// Visit the tree depth-first: folder, its subfolders, then its dashboards
    pub fn walk<'a, F>(&'a self, mut visit: F)
    where
        F: FnMut(WalkEvent<'a>),
    {
        for entry in &self.top {
            match entry {
                Entry::Folder(id) => self.walk_folder(*id, 0, &mut visit),
                Entry::Dashboard(dashboard) => visit(WalkEvent::Dashboard { dashboard, depth: 0 }),
            }
        }
    }

    fn walk_folder<'a, F>(&'a self, id: FolderId, depth: usize, visit: &mut F)
    where
        F: FnMut(WalkEvent<'a>),
    {
        let node = &self.nodes[id.0];
        visit(WalkEvent::EnterFolder {
            folder: &node.folder,
            depth,
        });

        for sub in &node.subfolders {
            self.walk_folder(*sub, depth + 1, visit);
        }
        for dashboard in &node.dashboards {
            visit(WalkEvent::Dashboard {
                dashboard,
                depth: depth + 1,
            });
        }

        visit(WalkEvent::LeaveFolder {
            folder: &node.folder,
            depth,
        });
    }

    /// Resolve the arena into nested nodes
    pub fn to_nodes(&self) -> Vec<TreeNode> {
        self.to_nodes_with(&|_| None)
    }

    /// Resolve the arena into nested nodes, giving each dashboard leaf the
    /// URL returned by `link`
    pub fn to_nodes_with<F>(&self, link: &F) -> Vec<TreeNode>
    where
        F: Fn(&Dashboard) -> Option<String>,
    {
        self.top
            .iter()
            .map(|entry| match entry {
                Entry::Folder(id) => TreeNode::Folder(self.folder_view(*id, link)),
                Entry::Dashboard(dashboard) => TreeNode::leaf(dashboard, link),
            })
            .collect()
    }

    fn folder_view<F>(&self, id: FolderId, link: &F) -> FolderView
    where
        F: Fn(&Dashboard) -> Option<String>,
    {
        let node = &self.nodes[id.0];
        FolderView {
            uid: node.folder.uid.clone(),
            title: node.folder.title.clone(),
            subfolders: node
                .subfolders
                .iter()
                .map(|sub| TreeNode::Folder(self.folder_view(*sub, link)))
                .collect(),
            dashboards: node
                .dashboards
                .iter()
                .map(|dashboard| TreeNode::leaf(dashboard, link))
                .collect(),
        }
    }

    /// Indented plain-text outline, one line per node
    pub fn outline(&self) -> String {
        let mut out = String::new();
        self.walk(|event| match event {
            WalkEvent::EnterFolder { folder, depth } => {
                out.push_str(&format!("{}{}/\n", "  ".repeat(depth), folder.title));
            }
            WalkEvent::Dashboard { dashboard, depth } => {
                out.push_str(&format!("{}{}\n", "  ".repeat(depth), dashboard.title));
            }
            WalkEvent::LeaveFolder { .. } => {}
        });
        out
    }
}

impl Serialize for FolderTree {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_nodes().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn folder(uid: &str, parent: Option<&str>) -> Folder {
        Folder {
            uid: uid.to_string(),
            title: uid.to_string(),
            folder_uid: parent.map(str::to_string),
        }
    }

    fn dashboard(uid: &str, folder: Option<&str>) -> Dashboard {
        Dashboard {
            uid: uid.to_string(),
            title: uid.to_string(),
            folder_uid: folder.map(str::to_string),
            folder_title: None,
            url: format!("/d/{}/{}", uid, uid),
        }
    }

    #[test]
    fn test_fix_out_of_bounds() {
        let folders = vec![folder("A", None)];
        let mut dashboards = vec![
            dashboard("d1", Some("B")),
            dashboard("d2", Some("A")),
            dashboard("d3", None),
        ];

        let moved = fix_out_of_bounds(&mut dashboards, &folders);

        assert_eq!(moved, 2);
        assert_eq!(dashboards[0].folder_uid.as_deref(), Some(ROOT));
        assert_eq!(dashboards[1].folder_uid.as_deref(), Some("A"));
        assert_eq!(dashboards[2].folder_uid.as_deref(), Some(ROOT));
    }

    #[test]
    fn test_index_preserves_order() {
        let folders = vec![
            folder("b", Some("A")),
            folder("A", None),
            folder("a", Some("A")),
            folder("empty", Some("")),
        ];
        let index = FolderIndex::new(&folders);

        assert_eq!(index.parents(), &["A".to_string(), ROOT.to_string()]);
        let children: Vec<_> = index.children("A").iter().map(|f| f.uid.as_str()).collect();
        assert_eq!(children, vec!["b", "a"]);
        assert_eq!(index.children(ROOT).len(), 2);
    }

    #[test]
    fn test_promote_single_root() {
        let folders = vec![folder("X", Some("Y")), folder("Z", Some("Y"))];
        let mut dashboards = vec![dashboard("d1", Some("Y")), dashboard("d2", Some("X"))];
        let mut index = FolderIndex::new(&folders);

        assert_eq!(index.promote_single_root(&mut dashboards).as_deref(), Some("Y"));
        assert!(index.has_root());
        assert!(index
            .children(ROOT)
            .iter()
            .all(|f| f.folder_uid.as_deref() == Some(ROOT)));
        assert_eq!(dashboards[0].folder_uid.as_deref(), Some(ROOT));
        assert_eq!(dashboards[1].folder_uid.as_deref(), Some("X"));
    }

    #[test]
    fn test_promote_skipped_when_root_exists() {
        let folders = vec![folder("A", None), folder("B", Some("A"))];
        let mut index = FolderIndex::new(&folders);

        assert!(index.promote_single_root(&mut []).is_none());
    }

    #[test]
    fn test_promote_skipped_with_several_parents() {
        let folders = vec![folder("A", Some("P")), folder("B", Some("Q"))];
        let mut index = FolderIndex::new(&folders);

        assert!(index.promote_single_root(&mut []).is_none());
        assert!(!index.has_root());
    }

    #[test]
    fn test_nested_structure() {
        let folders = vec![
            folder("F1", None),
            folder("F2", Some("F1")),
            folder("F3", Some("F2")),
        ];
        let dashboards = vec![dashboard("d1", Some("F3")), dashboard("d2", Some("F1"))];

        let tree = FolderTree::build(folders, dashboards);

        assert_eq!(tree.outline(), "F1/\n  F2/\n    F3/\n      d1\n  d2\n");
        assert_eq!(tree.folder_count(), 3);
        assert_eq!(tree.dashboard_count(), 2);
    }

    #[test]
    fn test_parent_cycle_terminates() {
        let folders = vec![folder("A", None), folder("B", Some("A")), folder("A", Some("B"))];
        let tree = FolderTree::build(folders, vec![]);

        assert_eq!(tree.folder_count(), 2);
        assert_eq!(tree.outline(), "A/\n  B/\n");
    }

    #[test]
    fn test_detached_subtree_stays_nested() {
        let mut tree = FolderTree::default();
        let index = FolderIndex::new(&[folder("B", Some("A")), folder("A", Some("P"))]);
        assert!(tree.place_level(&index, ROOT).is_empty());

        let detached = tree.place_detached(&index);

        assert_eq!(detached.len(), 1);
        assert_eq!(tree.nodes[detached[0].0].folder.uid, "A");
        assert_eq!(tree.folder_count(), 2);
    }

    #[test]
    fn test_detached_cycle_is_placed_once() {
        let mut tree = FolderTree::default();
        let index = FolderIndex::new(&[folder("A", Some("B")), folder("B", Some("A"))]);

        let detached = tree.place_detached(&index);

        assert_eq!(detached.len(), 1);
        assert_eq!(tree.folder_count(), 2);
    }

    #[test]
    fn test_leaf_links() {
        let tree = FolderTree::build(
            vec![folder("F", None)],
            vec![dashboard("d1", Some("F")), dashboard("d2", None)],
        );
        let nodes = tree.to_nodes_with(&|d| Some(format!("https://g{}", d.url)));
        let json = serde_json::to_value(&nodes).unwrap();

        assert_eq!(json[0]["dashboards"][0]["embedUrl"], "https://g/d/d1/d1");
        assert_eq!(json[1]["embedUrl"], "https://g/d/d2/d2");
        assert!(serde_json::to_value(&tree).unwrap()[1].get("embedUrl").is_none());
    }

    #[test]
    fn test_walk_events_order() {
        let tree = FolderTree::build(
            vec![folder("F", None), folder("G", Some("F"))],
            vec![dashboard("d1", Some("F"))],
        );

        let mut events = Vec::new();
        tree.walk(|event| {
            events.push(match event {
                WalkEvent::EnterFolder { folder, .. } => format!("+{}", folder.uid),
                WalkEvent::Dashboard { dashboard, .. } => dashboard.uid.clone(),
                WalkEvent::LeaveFolder { folder, .. } => format!("-{}", folder.uid),
            })
        });

        assert_eq!(events, vec!["+F", "+G", "-G", "d1", "-F"]);
    }

    #[test]
    fn test_serialized_shape() {
        let tree = FolderTree::build(
            vec![folder("F", None)],
            vec![dashboard("d1", Some("F")), dashboard("d2", None)],
        );
        let json = serde_json::to_value(&tree).unwrap();

        assert_eq!(json[0]["type"], "dash-folder");
        assert_eq!(json[0]["dashboards"][0]["type"], "dash-db");
        assert_eq!(json[0]["dashboards"][0]["uid"], "d1");
        assert!(json[0].get("subfolders").is_none());
        assert_eq!(json[1]["uid"], "d2");
        assert_eq!(json[1]["folderUid"], ROOT);
    }

    #[test]
    fn test_empty_inputs() {
        let tree = FolderTree::build(vec![], vec![]);
        assert!(tree.is_empty());
        assert_eq!(tree.outline(), "");
    }
}
