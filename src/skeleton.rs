//! Bone tree shared by the mesh and animation outputs.
//!
//! Bones are appended in pre-order (parents strictly before children) and
//! the insertion index doubles as the bone id the files reference, so a
//! serialized parent index is always smaller than its child's. Influences
//! and pose data name bones by their authored name; the skeleton owns the
//! name lookup.

use cgmath::Matrix4;
use petgraph::Direction;
use petgraph::graph::NodeIndex;
use std::collections::HashMap;
use std::collections::hash_map::Entry;

pub type BoneId = NodeIndex;
pub type BoneTree = ::petgraph::Graph<Bone, ()>;

pub struct Bone {
    pub name: String,
    /// Rest transform in export space.
    pub bind_matrix: Matrix4<f64>,
}

pub struct Skeleton {
    pub tree: BoneTree,
    by_name: HashMap<String, BoneId>,
}

impl Skeleton {
    pub fn new() -> Skeleton {
        Skeleton { tree: BoneTree::new(), by_name: HashMap::new() }
    }

    /// Appends a bone and returns its id. `parent` must belong to this
    /// skeleton. Write-once: there is no removal.
    pub fn add_bone(
        &mut self,
        parent: Option<BoneId>,
        name: &str,
        bind_matrix: Matrix4<f64>,
    ) -> BoneId {
        debug!("bone: {:?}", name);
        let id = self.tree.add_node(Bone {
            name: name.to_string(),
            bind_matrix,
        });
        if let Some(parent) = parent {
            self.tree.add_edge(parent, id, ());
        }
        match self.by_name.entry(name.to_string()) {
            Entry::Vacant(e) => { e.insert(id); }
            Entry::Occupied(_) => {
                warn!("multiple bones are named {:?}; lookups resolve to the first", name);
            }
        }
        id
    }

    pub fn bone_count(&self) -> usize {
        self.tree.node_count()
    }

    pub fn bone_by_name(&self, name: &str) -> Option<BoneId> {
        self.by_name.get(name).cloned()
    }

    pub fn parent(&self, bone: BoneId) -> Option<BoneId> {
        self.tree.neighbors_directed(bone, Direction::Incoming).next()
    }
}

#[test]
fn test_ids_are_dense_and_parents_come_first() {
    use cgmath::One;
    let mut skel = Skeleton::new();
    let root = skel.add_bone(None, "root", Matrix4::one());
    let arm = skel.add_bone(Some(root), "arm", Matrix4::one());
    let hand = skel.add_bone(Some(arm), "hand", Matrix4::one());
    let leg = skel.add_bone(Some(root), "leg", Matrix4::one());

    let ids = skel.tree.node_indices().map(|i| i.index()).collect::<Vec<_>>();
    assert_eq!(ids, vec![0, 1, 2, 3]);
    assert_eq!(hand.index(), 2);
    for id in skel.tree.node_indices() {
        if let Some(parent) = skel.parent(id) {
            assert!(parent.index() < id.index());
        }
    }
    assert_eq!(skel.parent(root), None);
    assert_eq!(skel.parent(hand), Some(arm));
    assert_eq!(skel.parent(leg), Some(root));
    assert_eq!(skel.bone_count(), 4);
}

#[test]
fn test_bone_lookup_by_name() {
    use cgmath::One;
    let mut skel = Skeleton::new();
    let root = skel.add_bone(None, "root", Matrix4::one());
    let dup = skel.add_bone(Some(root), "root", Matrix4::one());
    assert_eq!(skel.bone_by_name("root"), Some(root));
    assert_ne!(root, dup);
    assert!(skel.bone_by_name("missing").is_none());
}
