//! Vertex/weight model for the mesh file.
//!
//! A `Mesh` owns one `SubMesh` per material run. Each `SubMesh` owns an
//! arena of vertices; a vertex's id is its arena index, assigned in
//! first-use order and never reused. Polygon corners that reference the
//! same authored vertex can still need distinct export vertices (flat
//! shading, divergent UVs); those splits are recorded as clones that name
//! their parent by index, while `linked_group_id` keeps track of which
//! export vertices the engine should treat as the same authored point.
//!
//! Weights live in a separate per-submesh array, regenerated by
//! `generate_weights` once assembly is done: one entry per (vertex,
//! influence) pair, vertex-major, each vertex recording the contiguous
//! `(first_weight_index, count)` slice the file format points at. A
//! weight's position is the vertex's rest position moved into the
//! influencing bone's local frame, so the engine can re-derive the bind
//! shape under any animated pose.

use cgmath::{Point2, Point3, SquareMatrix, Transform};
use errors::{ErrorKind, Result};
use skeleton::{BoneId, Skeleton};
use smallvec::SmallVec;
use std::collections::HashMap;

pub mod builder;

/// Name of an external material resource.
#[derive(Clone, Debug)]
pub struct Material {
    pub name: String,
}

impl Material {
    pub fn new(name: &str) -> Material {
        Material { name: name.to_string() }
    }
}

#[derive(Copy, Clone, Debug)]
pub struct Influence {
    pub bone: BoneId,
    pub weight: f64,
}

pub type Influences = SmallVec<[Influence; 4]>;

pub struct Vertex {
    /// Rest position in export space.
    pub position: Point3<f64>,
    pub texcoord: Option<Point2<f64>>,
    pub influences: Influences,
    pub linked_group_id: u32,
    /// For clones, the arena index of the vertex this one was split from.
    pub cloned_from: Option<usize>,
    pub clones: Vec<usize>,
    /// Index of this vertex's first entry in the submesh weight array.
    pub first_weight_index: usize,
}

/// Why a vertex had to be split off its source.
#[derive(Copy, Clone, Debug)]
pub enum CloneReason {
    /// Flat-shaded polygons never share vertices with other polygons.
    FlatFace,
    /// Same authored vertex, different UV (a texture seam).
    DifferentTexCoord,
}

/// Triangle over submesh vertex ids, in input winding order. The writer
/// flips it to the engine's winding when emitting.
#[derive(Copy, Clone, Debug)]
pub struct Face {
    pub vertices: [usize; 3],
}

/// One (vertex, influence) pair with the rest position re-expressed in
/// the influencing bone's local frame.
#[derive(Copy, Clone, Debug)]
pub struct Weight {
    pub bone: BoneId,
    pub weight: f64,
    pub position: Point3<f64>,
}

pub struct SubMesh {
    pub material: Material,
    pub vertices: Vec<Vertex>,
    pub faces: Vec<Face>,
    pub weights: Vec<Weight>,
    next_group_id: u32,
}

impl SubMesh {
    pub fn new(material: Material) -> SubMesh {
        SubMesh {
            material,
            vertices: vec![],
            faces: vec![],
            weights: vec![],
            next_group_id: 0,
        }
    }

    /// Creates a fresh vertex (its own linked group) and returns its id.
    pub fn add_vertex(&mut self, position: Point3<f64>) -> usize {
        let group = self.fresh_group_id();
        self.vertices.push(Vertex {
            position,
            texcoord: None,
            influences: SmallVec::new(),
            linked_group_id: group,
            cloned_from: None,
            clones: vec![],
            first_weight_index: 0,
        });
        self.vertices.len() - 1
    }

    /// Splits a new vertex off `src`. Influences are copied either way;
    /// only texture-seam clones stay in the source's linked group, a
    /// flat-face clone starts a group of its own.
    pub fn clone_vertex(&mut self, src: usize, reason: CloneReason) -> usize {
        let group = match reason {
            CloneReason::DifferentTexCoord => self.vertices[src].linked_group_id,
            CloneReason::FlatFace => self.fresh_group_id(),
        };
        let vertex = Vertex {
            position: self.vertices[src].position,
            texcoord: None,
            influences: self.vertices[src].influences.clone(),
            linked_group_id: group,
            cloned_from: Some(src),
            clones: vec![],
            first_weight_index: 0,
        };
        let id = self.vertices.len();
        self.vertices.push(vertex);
        self.vertices[src].clones.push(id);
        id
    }

    /// Settles which vertex a corner with UV `uv` ends up on: `v` itself
    /// if its UV is unset or already matches, an existing clone with the
    /// same UV, or a fresh texture-seam clone.
    pub fn resolve_texcoord(&mut self, v: usize, uv: Point2<f64>) -> usize {
        match self.vertices[v].texcoord {
            None => {
                self.vertices[v].texcoord = Some(uv);
                v
            }
            Some(have) if have == uv => v,
            Some(_) => {
                for i in 0..self.vertices[v].clones.len() {
                    let clone = self.vertices[v].clones[i];
                    if self.vertices[clone].texcoord == Some(uv) {
                        return clone;
                    }
                }
                let clone = self.clone_vertex(v, CloneReason::DifferentTexCoord);
                self.vertices[clone].texcoord = Some(uv);
                clone
            }
        }
    }

    pub fn add_face(&mut self, v0: usize, v1: usize, v2: usize) {
        self.faces.push(Face { vertices: [v0, v1, v2] });
    }

    /// Regenerates the weight array from scratch: one weight per (vertex,
    /// influence) pair in vertex order, recording each vertex's slice of
    /// the array. Fails on a bone whose bind matrix has no inverse.
    pub fn generate_weights(&mut self, skel: &Skeleton) -> Result<()> {
        self.weights.clear();
        let mut inv_binds: Vec<Option<_>> = vec![None; skel.bone_count()];
        for vi in 0..self.vertices.len() {
            self.vertices[vi].first_weight_index = self.weights.len();
            for ii in 0..self.vertices[vi].influences.len() {
                let Influence { bone, weight } = self.vertices[vi].influences[ii];
                let inv = match inv_binds[bone.index()] {
                    Some(inv) => inv,
                    None => {
                        let inv = match skel.tree[bone].bind_matrix.invert() {
                            Some(inv) => inv,
                            None => bail!(ErrorKind::SingularBindMatrix(
                                skel.tree[bone].name.clone()
                            )),
                        };
                        inv_binds[bone.index()] = Some(inv);
                        inv
                    }
                };
                let position = inv.transform_point(self.vertices[vi].position);
                self.weights.push(Weight { bone, weight, position });
            }
        }
        Ok(())
    }

    fn fresh_group_id(&mut self) -> u32 {
        let id = self.next_group_id;
        self.next_group_id += 1;
        id
    }
}

pub struct Mesh {
    pub name: String,
    pub sub_meshes: Vec<SubMesh>,
}

impl Mesh {
    pub fn new(name: &str) -> Mesh {
        Mesh { name: name.to_string(), sub_meshes: vec![] }
    }

    /// Assembles a mesh from raw polygons. See `builder`.
    pub fn build(
        name: &str,
        materials: &[Material],
        polygons: Vec<builder::Polygon>,
        skel: &Skeleton,
        on_unknown_bone: builder::UnknownBone,
    ) -> Result<Mesh> {
        builder::build(name, materials, polygons, skel, on_unknown_bone)
    }

    /// Takes ownership of a submesh, appending it at the next local index.
    pub fn adopt(&mut self, sub: SubMesh) -> usize {
        self.sub_meshes.push(sub);
        self.sub_meshes.len() - 1
    }

    /// Rebinds every submesh of `other` into this mesh, in order.
    pub fn absorb(&mut self, other: Mesh) {
        for sub in other.sub_meshes {
            self.adopt(sub);
        }
    }
}

/// Diagnostic: warns about faces that cover the same three vertices as an
/// earlier face (in any corner order) and returns how many were found.
/// Off the critical path; callers opt in.
pub fn report_double_faces(sub: &SubMesh) -> usize {
    let mut seen: HashMap<[usize; 3], usize> = HashMap::new();
    let mut doubles = 0;
    for (i, face) in sub.faces.iter().enumerate() {
        let mut key = face.vertices;
        key.sort();
        match seen.get(&key) {
            Some(&first) => {
                warn!("double face in material {:?}: tri {} covers the same vertices as tri {}",
                    sub.material.name, i, first);
                doubles += 1;
            }
            None => { seen.insert(key, i); }
        }
    }
    doubles
}

#[cfg(test)]
fn test_skeleton() -> Skeleton {
    use cgmath::{Matrix4, vec3};
    let mut skel = Skeleton::new();
    let root = skel.add_bone(None, "root", Matrix4::from_translation(vec3(1.0, 2.0, 3.0)));
    skel.add_bone(Some(root), "tip", Matrix4::from_translation(vec3(0.0, 5.0, 0.0)));
    skel
}

#[test]
fn test_clone_linked_groups() {
    let mut sub = SubMesh::new(Material::new("mat"));
    let v = sub.add_vertex(Point3::new(0.0, 0.0, 0.0));

    let seam = sub.clone_vertex(v, CloneReason::DifferentTexCoord);
    assert_eq!(sub.vertices[seam].linked_group_id, sub.vertices[v].linked_group_id);

    let flat = sub.clone_vertex(v, CloneReason::FlatFace);
    assert_ne!(sub.vertices[flat].linked_group_id, sub.vertices[v].linked_group_id);

    assert_eq!(sub.vertices[seam].cloned_from, Some(v));
    assert_eq!(sub.vertices[v].clones, vec![seam, flat]);
}

#[test]
fn test_resolve_texcoord_reuses_matching_clone() {
    let mut sub = SubMesh::new(Material::new("mat"));
    let v = sub.add_vertex(Point3::new(0.0, 0.0, 0.0));

    let a = Point2::new(0.25, 0.25);
    let b = Point2::new(0.75, 0.75);

    assert_eq!(sub.resolve_texcoord(v, a), v);
    assert_eq!(sub.resolve_texcoord(v, a), v);

    let clone = sub.resolve_texcoord(v, b);
    assert_ne!(clone, v);
    assert_eq!(sub.vertices[clone].texcoord, Some(b));
    assert_eq!(sub.vertices[clone].linked_group_id, sub.vertices[v].linked_group_id);

    // the same seam again lands on the same clone
    assert_eq!(sub.resolve_texcoord(v, b), clone);
    assert_eq!(sub.vertices.len(), 2);
}

#[test]
fn test_generate_weights_layout() {
    use cgmath::One;
    use cgmath::Matrix4;
    let mut skel = Skeleton::new();
    let a = skel.add_bone(None, "a", Matrix4::one());
    let b = skel.add_bone(Some(a), "b", Matrix4::one());

    let mut sub = SubMesh::new(Material::new("mat"));
    let v0 = sub.add_vertex(Point3::new(1.0, 0.0, 0.0));
    sub.vertices[v0].influences.push(Influence { bone: a, weight: 0.5 });
    sub.vertices[v0].influences.push(Influence { bone: b, weight: 0.5 });
    let v1 = sub.add_vertex(Point3::new(0.0, 1.0, 0.0));
    let v2 = sub.add_vertex(Point3::new(0.0, 0.0, 1.0));
    sub.vertices[v2].influences.push(Influence { bone: b, weight: 1.0 });

    sub.generate_weights(&skel).unwrap();

    let total: usize = sub.vertices.iter().map(|v| v.influences.len()).sum();
    assert_eq!(sub.weights.len(), total);
    assert_eq!(sub.vertices[v0].first_weight_index, 0);
    assert_eq!(sub.vertices[v1].first_weight_index, 2);
    assert_eq!(sub.vertices[v2].first_weight_index, 2);

    // regeneration starts over instead of appending
    sub.generate_weights(&skel).unwrap();
    assert_eq!(sub.weights.len(), total);
}

#[test]
fn test_weight_positions_are_bone_local() {
    let skel = test_skeleton();
    let root = skel.bone_by_name("root").unwrap();

    let mut sub = SubMesh::new(Material::new("mat"));
    let v = sub.add_vertex(Point3::new(1.0, 2.0, 3.0));
    sub.vertices[v].influences.push(Influence { bone: root, weight: 1.0 });

    sub.generate_weights(&skel).unwrap();
    assert_eq!(sub.weights[0].position, Point3::new(0.0, 0.0, 0.0));
}

#[test]
fn test_generate_weights_rejects_singular_bind() {
    use cgmath::Matrix4;
    let mut skel = Skeleton::new();
    let flat = skel.add_bone(None, "flat", Matrix4::from_scale(0.0));

    let mut sub = SubMesh::new(Material::new("mat"));
    let v = sub.add_vertex(Point3::new(1.0, 1.0, 1.0));
    sub.vertices[v].influences.push(Influence { bone: flat, weight: 1.0 });

    assert!(sub.generate_weights(&skel).is_err());
}

#[test]
fn test_absorb_preserves_order() {
    let mut first = Mesh::new("first");
    first.adopt(SubMesh::new(Material::new("a")));
    let mut second = Mesh::new("second");
    second.adopt(SubMesh::new(Material::new("b")));
    second.adopt(SubMesh::new(Material::new("c")));

    first.absorb(second);
    let names = first.sub_meshes.iter().map(|s| s.material.name.clone()).collect::<Vec<_>>();
    assert_eq!(names, vec!["a", "b", "c"]);
}

#[test]
fn test_report_double_faces() {
    let mut sub = SubMesh::new(Material::new("mat"));
    for _ in 0..4 {
        sub.add_vertex(Point3::new(0.0, 0.0, 0.0));
    }
    sub.add_face(0, 1, 2);
    sub.add_face(1, 2, 3);
    sub.add_face(2, 0, 1); // same triple as the first, rotated
    assert_eq!(report_double_faces(&sub), 1);

    let mut clean = SubMesh::new(Material::new("mat"));
    for _ in 0..3 {
        clean.add_vertex(Point3::new(0.0, 0.0, 0.0));
    }
    clean.add_face(0, 1, 2);
    assert_eq!(report_double_faces(&clean), 0);
}
