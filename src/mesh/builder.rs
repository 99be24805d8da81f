//! Geometry assembly: raw polygons in, per-material submeshes out.
//!
//! Polygons arrive as authored: corners in winding order, each naming its
//! source vertex, its position in export space, its raw bone weights, and
//! an optional UV. Each pass over the remaining polygons gathers every
//! polygon matching the front polygon's material into one submesh, so
//! pre-grouped input makes exactly one pass per material and interleaved
//! input still exports everything (loudly). Within a submesh, corners are
//! resolved to export vertices through a source-vertex reuse map: smooth
//! polygons share vertices, flat polygons never do, and UV seams split
//! off clones. Polygons with more than three corners are fan-triangulated
//! once their corners are resolved.

use cgmath::{Point2, Point3};
use errors::{ErrorKind, Result};
use mesh::{CloneReason, Influence, Influences, Material, Mesh, SubMesh};
use skeleton::Skeleton;
use smallvec::SmallVec;
use std::collections::HashMap;

/// One polygon as authored, corners in winding order.
pub struct Polygon {
    pub material_index: usize,
    pub smooth: bool,
    pub corners: Vec<Corner>,
}

pub struct Corner {
    /// Identity of the authored vertex this corner references.
    pub source_vertex: usize,
    /// Position in export space.
    pub position: Point3<f64>,
    /// Raw UV; V is flipped on export.
    pub uv: Option<Point2<f64>>,
    /// (bone name, raw weight) pairs; weights need not be normalized.
    /// Read the first time a corner materializes a vertex; reuses and
    /// clones keep the influences already on the vertex.
    pub influences: Vec<(String, f64)>,
}

/// Policy for an influence that names a bone the skeleton lacks.
#[derive(Copy, Clone, Debug)]
pub enum UnknownBone {
    /// Report and drop that one influence.
    Skip,
    /// Fail the whole build.
    Abort,
}

pub fn build(
    name: &str,
    materials: &[Material],
    polygons: Vec<Polygon>,
    skel: &Skeleton,
    on_unknown_bone: UnknownBone,
) -> Result<Mesh> {
    info!("mesh: {}", name);
    let mut b = Builder {
        skel,
        on_unknown_bone,
        name,
        created: 0,
        flat_clones: 0,
        seam_clones: 0,
    };
    let mut mesh = Mesh::new(name);
    let mut queue = polygons;

    while !queue.is_empty() {
        let material_index = queue[0].material_index;
        let material = match materials.get(material_index) {
            Some(material) => material.clone(),
            None => {
                error!("mesh {}: polygons reference material index {} but only {} materials exist; dropping them",
                    name, material_index, materials.len());
                queue.retain(|p| p.material_index != material_index);
                continue;
            }
        };

        let mut sub = SubMesh::new(material);
        let mut seen = HashMap::new();
        let mut deferred = Vec::with_capacity(queue.len());
        for poly in queue {
            if degenerate(&poly) {
                continue;
            }
            if poly.material_index != material_index {
                error!("mesh {}: face uses material {} while material {} is being gathered",
                    name, poly.material_index, material_index);
                deferred.push(poly);
                continue;
            }
            b.add_polygon(&mut sub, &mut seen, poly)?;
        }
        mesh.adopt(sub);
        queue = deferred;
    }

    info!("mesh {}: {} vertices ({} split for flat shading, {} split at texture seams)",
        name,
        b.created + b.flat_clones + b.seam_clones,
        b.flat_clones,
        b.seam_clones,
    );
    Ok(mesh)
}

struct Builder<'a> {
    skel: &'a Skeleton,
    on_unknown_bone: UnknownBone,
    name: &'a str,
    created: u32,
    flat_clones: u32,
    seam_clones: u32,
}

impl<'a> Builder<'a> {
    fn add_polygon(
        &mut self,
        sub: &mut SubMesh,
        seen: &mut HashMap<usize, usize>,
        poly: Polygon,
    ) -> Result<()> {
        let mut corner_verts = SmallVec::<[usize; 4]>::new();
        for corner in &poly.corners {
            let v = match seen.get(&corner.source_vertex).cloned() {
                None => {
                    let v = sub.add_vertex(corner.position);
                    self.created += 1;
                    if poly.smooth {
                        seen.insert(corner.source_vertex, v);
                    }
                    if corner.influences.is_empty() {
                        warn!("vertex without bone attachment in mesh: {}", self.name);
                    }
                    sub.vertices[v].influences = self.influences(&corner.influences)?;
                    v
                }
                Some(found) if !poly.smooth => {
                    self.flat_clones += 1;
                    sub.clone_vertex(found, CloneReason::FlatFace)
                }
                Some(found) => found,
            };

            let v = match corner.uv {
                Some(raw) => {
                    let uv = Point2::new(raw.x, 1.0 - raw.y);
                    let before = sub.vertices.len();
                    let resolved = sub.resolve_texcoord(v, uv);
                    if sub.vertices.len() > before {
                        self.seam_clones += 1;
                    }
                    resolved
                }
                None => v,
            };
            corner_verts.push(v);
        }

        for i in 1..corner_verts.len() - 1 {
            sub.add_face(corner_verts[0], corner_verts[i], corner_verts[i + 1]);
        }
        Ok(())
    }

    /// Resolves raw (bone name, weight) pairs against the skeleton and
    /// normalizes so the weights sum to one. A zero sum passes the raw
    /// weights through; the engine sees them as authored.
    fn influences(&self, raw: &[(String, f64)]) -> Result<Influences> {
        let sum: f64 = raw.iter().map(|&(_, w)| w).sum();
        if sum == 0.0 && !raw.is_empty() {
            warn!("influence weights sum to zero in mesh {}; exporting them unnormalized",
                self.name);
        }
        let mut list = Influences::new();
        for &(ref bone_name, weight) in raw {
            let bone = match self.skel.bone_by_name(bone_name) {
                Some(bone) => bone,
                None => match self.on_unknown_bone {
                    UnknownBone::Skip => {
                        warn!("influence references unknown bone {:?} in mesh {}; dropping it",
                            bone_name, self.name);
                        continue;
                    }
                    UnknownBone::Abort => bail!(ErrorKind::UnknownBone(bone_name.clone())),
                },
            };
            let weight = if sum != 0.0 { weight / sum } else { weight };
            list.push(Influence { bone, weight });
        }
        Ok(list)
    }
}

fn degenerate(poly: &Polygon) -> bool {
    if poly.corners.len() < 3 {
        return true;
    }
    for i in 0..poly.corners.len() {
        for j in i + 1..poly.corners.len() {
            if poly.corners[i].source_vertex == poly.corners[j].source_vertex {
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
fn poly(material_index: usize, smooth: bool, ids: &[usize]) -> Polygon {
    Polygon {
        material_index,
        smooth,
        corners: ids.iter().map(|&i| Corner {
            source_vertex: i,
            position: Point3::new(i as f64, 0.0, 0.0),
            uv: None,
            influences: vec![],
        }).collect(),
    }
}

#[cfg(test)]
fn cube(smooth: bool) -> Vec<Polygon> {
    [
        [0, 1, 2, 3], [4, 5, 6, 7], [0, 1, 5, 4],
        [2, 3, 7, 6], [0, 3, 7, 4], [1, 2, 6, 5],
    ].iter().map(|ids| poly(0, smooth, ids)).collect()
}

#[cfg(test)]
fn one_material() -> Vec<Material> {
    vec![Material::new("mat")]
}

#[test]
fn test_smooth_cube() {
    let skel = Skeleton::new();
    let mesh = Mesh::build("cube", &one_material(), cube(true), &skel, UnknownBone::Skip).unwrap();

    assert_eq!(mesh.sub_meshes.len(), 1);
    let sub = &mesh.sub_meshes[0];
    assert_eq!(sub.vertices.len(), 8);
    assert_eq!(sub.faces.len(), 12);
    for v in &sub.vertices {
        assert!(v.influences.is_empty());
        assert_eq!(v.first_weight_index, 0);
    }
}

#[test]
fn test_flat_cube_splits_every_corner() {
    let skel = Skeleton::new();
    let mesh = Mesh::build("cube", &one_material(), cube(false), &skel, UnknownBone::Skip).unwrap();

    let sub = &mesh.sub_meshes[0];
    assert_eq!(sub.vertices.len(), 24);
    assert_eq!(sub.faces.len(), 12);
}

#[test]
fn test_flat_triangles_never_share_vertices() {
    let skel = Skeleton::new();
    let polys = vec![poly(0, false, &[0, 1, 2]), poly(0, false, &[1, 2, 3])];
    let mesh = Mesh::build("m", &one_material(), polys, &skel, UnknownBone::Skip).unwrap();

    let sub = &mesh.sub_meshes[0];
    assert_eq!(sub.vertices.len(), 6);
    let first = sub.faces[0].vertices;
    let second = sub.faces[1].vertices;
    for a in &first {
        assert!(!second.contains(a));
    }
    // every flat corner is an independent vertex with its own group
    for (i, v) in sub.vertices.iter().enumerate() {
        assert_eq!(v.linked_group_id, i as u32);
    }
}

#[test]
fn test_flat_after_smooth_clones_and_inherits_influences() {
    use cgmath::Matrix4;
    use cgmath::One;
    let mut skel = Skeleton::new();
    let bone = skel.add_bone(None, "b", Matrix4::one());

    let mut first = poly(0, true, &[0, 1, 2]);
    for corner in &mut first.corners {
        corner.influences = vec![("b".to_string(), 2.0)];
    }
    // influences on a reused source vertex are ignored; the clone inherits
    let mut second = poly(0, false, &[0, 1, 3]);
    second.corners[0].influences = vec![("b".to_string(), 0.25)];

    let mesh = Mesh::build("m", &one_material(), vec![first, second], &skel, UnknownBone::Skip)
        .unwrap();
    let sub = &mesh.sub_meshes[0];
    assert_eq!(sub.vertices.len(), 6);

    let clone = sub.faces[1].vertices[0];
    let source = sub.faces[0].vertices[0];
    assert_eq!(sub.vertices[clone].cloned_from, Some(source));
    assert_ne!(sub.vertices[clone].linked_group_id, sub.vertices[source].linked_group_id);
    assert_eq!(sub.vertices[clone].influences.len(), 1);
    assert_eq!(sub.vertices[clone].influences[0].bone, bone);
    assert_eq!(sub.vertices[clone].influences[0].weight, 1.0);
}

#[test]
fn test_uv_seam_splits_into_same_linked_group() {
    let skel = Skeleton::new();
    let mut first = poly(0, true, &[0, 1, 2]);
    for corner in &mut first.corners {
        corner.uv = Some(Point2::new(0.0, 0.0));
    }
    let mut second = poly(0, true, &[0, 1, 3]);
    second.corners[0].uv = Some(Point2::new(0.5, 0.5));
    second.corners[1].uv = Some(Point2::new(0.5, 0.5));
    second.corners[2].uv = Some(Point2::new(0.0, 0.0));
    // same seam again must land on the clones already made
    let third = Polygon {
        material_index: 0,
        smooth: true,
        corners: second.corners.iter().map(|c| Corner {
            source_vertex: c.source_vertex,
            position: c.position,
            uv: c.uv,
            influences: vec![],
        }).collect(),
    };

    let mesh = Mesh::build("m", &one_material(), vec![first, second, third], &skel,
        UnknownBone::Skip).unwrap();
    let sub = &mesh.sub_meshes[0];
    // 3 from the first triangle, 2 seam clones, 1 new corner
    assert_eq!(sub.vertices.len(), 6);

    let source = sub.faces[0].vertices[0];
    let clone = sub.faces[1].vertices[0];
    assert_ne!(clone, source);
    assert_eq!(sub.vertices[clone].cloned_from, Some(source));
    assert_eq!(sub.vertices[clone].linked_group_id, sub.vertices[source].linked_group_id);
    // V flip: authored (0.5, 0.5) is stored as (0.5, 0.5), authored (0, 0) as (0, 1)
    assert_eq!(sub.vertices[clone].texcoord, Some(Point2::new(0.5, 0.5)));
    assert_eq!(sub.vertices[source].texcoord, Some(Point2::new(0.0, 1.0)));
    assert_eq!(sub.faces[2].vertices, sub.faces[1].vertices);
}

#[test]
fn test_weight_normalization() {
    use cgmath::Matrix4;
    use cgmath::One;
    let mut skel = Skeleton::new();
    skel.add_bone(None, "a", Matrix4::one());
    skel.add_bone(None, "b", Matrix4::one());

    let mut tri = poly(0, true, &[0, 1, 2]);
    tri.corners[0].influences = vec![("a".to_string(), 2.0), ("b".to_string(), 6.0)];
    tri.corners[1].influences = vec![("a".to_string(), 0.0), ("b".to_string(), 0.0)];

    let mesh = Mesh::build("m", &one_material(), vec![tri], &skel, UnknownBone::Skip).unwrap();
    let verts = &mesh.sub_meshes[0].vertices;
    assert_eq!(verts[0].influences[0].weight, 0.25);
    assert_eq!(verts[0].influences[1].weight, 0.75);
    // zero sum passes raw weights through
    assert_eq!(verts[1].influences[0].weight, 0.0);
    assert_eq!(verts[1].influences[1].weight, 0.0);
}

#[test]
fn test_unknown_bone_policies() {
    use cgmath::Matrix4;
    use cgmath::One;
    let mut skel = Skeleton::new();
    skel.add_bone(None, "real", Matrix4::one());

    let mut tri = poly(0, true, &[0, 1, 2]);
    tri.corners[0].influences =
        vec![("real".to_string(), 1.0), ("gone".to_string(), 1.0)];

    let mesh = Mesh::build("m", &one_material(), vec![tri], &skel, UnknownBone::Skip).unwrap();
    let v = &mesh.sub_meshes[0].vertices[0];
    assert_eq!(v.influences.len(), 1);
    // the dropped influence still took part in the sum
    assert_eq!(v.influences[0].weight, 0.5);

    let mut tri = poly(0, true, &[0, 1, 2]);
    tri.corners[0].influences = vec![("gone".to_string(), 1.0)];
    assert!(Mesh::build("m", &one_material(), vec![tri], &skel, UnknownBone::Abort).is_err());
}

#[test]
fn test_interleaved_materials_regroup() {
    let skel = Skeleton::new();
    let materials = vec![Material::new("a"), Material::new("b")];
    let polys = vec![
        poly(0, true, &[0, 1, 2]),
        poly(1, true, &[3, 4, 5]),
        poly(0, true, &[6, 7, 8]),
    ];
    let mesh = Mesh::build("m", &materials, polys, &skel, UnknownBone::Skip).unwrap();

    assert_eq!(mesh.sub_meshes.len(), 2);
    assert_eq!(mesh.sub_meshes[0].material.name, "a");
    assert_eq!(mesh.sub_meshes[0].faces.len(), 2);
    assert_eq!(mesh.sub_meshes[1].material.name, "b");
    assert_eq!(mesh.sub_meshes[1].faces.len(), 1);
}

#[test]
fn test_degenerate_polygons_dropped() {
    let skel = Skeleton::new();
    let polys = vec![
        poly(0, true, &[0, 1]),          // too few corners
        poly(0, true, &[0, 1, 2, 0]),    // repeated corner identity
        poly(0, true, &[3, 4, 5]),
    ];
    let mesh = Mesh::build("m", &one_material(), polys, &skel, UnknownBone::Skip).unwrap();
    let sub = &mesh.sub_meshes[0];
    assert_eq!(sub.faces.len(), 1);
    assert_eq!(sub.vertices.len(), 3);
}

#[test]
fn test_fan_triangulation() {
    let skel = Skeleton::new();
    let mesh = Mesh::build("m", &one_material(), vec![poly(0, true, &[0, 1, 2, 3, 4])],
        &skel, UnknownBone::Skip).unwrap();
    let sub = &mesh.sub_meshes[0];
    assert_eq!(sub.vertices.len(), 5);
    let tris = sub.faces.iter().map(|f| f.vertices).collect::<Vec<_>>();
    assert_eq!(tris, vec![[0, 1, 2], [0, 2, 3], [0, 3, 4]]);
}

#[test]
fn test_out_of_range_material_drops_polygons() {
    let skel = Skeleton::new();
    let polys = vec![poly(7, true, &[0, 1, 2]), poly(0, true, &[3, 4, 5])];
    let mesh = Mesh::build("m", &one_material(), polys, &skel, UnknownBone::Skip).unwrap();
    assert_eq!(mesh.sub_meshes.len(), 1);
    assert_eq!(mesh.sub_meshes[0].material.name, "mat");
    assert_eq!(mesh.sub_meshes[0].faces.len(), 1);
}
