//! Writer for the mesh file.
//!
//! Pure formatting over a finished skeleton and mesh; every submesh must
//! have had its weights generated first. Rendering mutates nothing.

use convert::format::{FnFmt, Triple};
use errors::Result;
use mesh::{Mesh, SubMesh};
use skeleton::Skeleton;
use std::fmt::Write;
use xform;

pub fn write<W: Write>(w: &mut W, skel: &Skeleton, mesh: &Mesh) -> Result<()> {
    write_lines!(w,
        "numJoints {num_joints}",
        "numMeshes {num_meshes}",
        "";
        num_joints = skel.bone_count(),
        num_meshes = mesh.sub_meshes.len(),
    )?;
    write_joints(w, skel)?;
    for sub in &mesh.sub_meshes {
        write_sub_mesh(w, sub)?;
    }
    Ok(())
}

fn write_joints<W: Write>(w: &mut W, skel: &Skeleton) -> Result<()> {
    write_lines!(w,
        "joints {{";
    )?;
    for id in skel.tree.node_indices() {
        let bone = &skel.tree[id];
        let parent = match skel.parent(id) {
            Some(parent) => parent.index() as i64,
            None => -1,
        };
        let pos = xform::translation(&bone.bind_matrix);
        let q = xform::negative_hemisphere(xform::rotation(&bone.bind_matrix));
        write_lines!(w,
            "\t\"{name}\"\t{parent} {position} {orientation}";
            name = bone.name,
            parent = parent,
            position = Triple(pos.x, pos.y, pos.z),
            orientation = Triple(q.v.x, q.v.y, q.v.z),
        )?;
    }
    write_lines!(w,
        "}}",
        "";
    )?;
    Ok(())
}

fn write_sub_mesh<W: Write>(w: &mut W, sub: &SubMesh) -> Result<()> {
    let num_influences: usize = sub.vertices.iter().map(|v| v.influences.len()).sum();
    if sub.weights.len() != num_influences {
        bail!("material {:?}: weights were not generated before serialization",
            sub.material.name);
    }

    write_lines!(w,
        "mesh {{",
        "\tmaterial \"{material}\"",
        "",
        "\tnumVerts {num_verts}";
        material = sub.material.name,
        num_verts = sub.vertices.len(),
    )?;
    for (i, v) in sub.vertices.iter().enumerate() {
        let uv = FnFmt(|f| match v.texcoord {
            Some(uv) => write!(f, "( {:.6} {:.6} )", uv.x, uv.y),
            None => write!(f, "( 0.0 0.0 )"),
        });
        write_lines!(w,
            "\tvert {i} {group} {uv} ( {first_weight} {num_weights} )";
            i = i,
            group = v.linked_group_id,
            uv = uv,
            first_weight = v.first_weight_index,
            num_weights = v.influences.len(),
        )?;
    }

    write_lines!(w,
        "",
        "\tnumTris {num_tris}";
        num_tris = sub.faces.len(),
    )?;
    for (i, face) in sub.faces.iter().enumerate() {
        // engine winding: first, third, second
        let vs = &face.vertices;
        write_lines!(w,
            "\ttri {i} {a} {b} {c}";
            i = i, a = vs[0], b = vs[2], c = vs[1],
        )?;
    }

    write_lines!(w,
        "",
        "\tnumWeights {num_weights}";
        num_weights = sub.weights.len(),
    )?;
    for (i, weight) in sub.weights.iter().enumerate() {
        write_lines!(w,
            "\tweight {i} {bone} {weight:.6} {position}";
            i = i,
            bone = weight.bone.index(),
            weight = weight.weight,
            position = Triple(weight.position.x, weight.position.y, weight.position.z),
        )?;
    }
    write_lines!(w,
        "}}",
        "";
    )?;
    Ok(())
}

#[cfg(test)]
use mesh::builder::{Corner, Polygon, UnknownBone};
#[cfg(test)]
use mesh::Material;

#[cfg(test)]
fn corner(source_vertex: usize, uv: Option<(f64, f64)>, influences: Vec<(String, f64)>) -> Corner {
    use cgmath::{Point2, Point3};
    Corner {
        source_vertex,
        position: Point3::new(source_vertex as f64, 0.0, 0.0),
        uv: uv.map(|(u, v)| Point2::new(u, v)),
        influences,
    }
}

#[cfg(test)]
fn cube() -> Vec<Polygon> {
    [
        [0, 1, 2, 3], [4, 5, 6, 7], [0, 1, 5, 4],
        [2, 3, 7, 6], [0, 3, 7, 4], [1, 2, 6, 5],
    ].iter().map(|ids| Polygon {
        material_index: 0,
        smooth: true,
        corners: ids.iter().map(|&i| corner(i, None, vec![])).collect(),
    }).collect()
}

#[cfg(test)]
fn render(skel: &Skeleton, mesh: &Mesh) -> String {
    let mut s = String::new();
    write(&mut s, skel, mesh).unwrap();
    s
}

#[cfg(test)]
fn declared(s: &str, key: &str) -> usize {
    s.lines()
        .find(|l| l.trim_start().starts_with(key))
        .unwrap()
        .trim_start()
        .trim_start_matches(key)
        .trim()
        .parse()
        .unwrap()
}

#[test]
fn test_cube_scene() {
    let skel = Skeleton::new();
    let mut mesh = Mesh::build("cube", &[Material::new("mat")], cube(), &skel,
        UnknownBone::Skip).unwrap();
    for sub in &mut mesh.sub_meshes {
        sub.generate_weights(&skel).unwrap();
    }
    let s = render(&skel, &mesh);

    assert!(s.starts_with("numJoints 0\nnumMeshes 1\n\njoints {\n}\n\nmesh {\n"));
    assert!(s.contains("\tmaterial \"mat\"\n"));
    assert!(s.contains("\tnumVerts 8\n"));
    assert!(s.contains("\tnumTris 12\n"));
    assert!(s.contains("\tnumWeights 0\n"));
    let verts = s.lines().filter(|l| l.starts_with("\tvert ")).collect::<Vec<_>>();
    assert_eq!(verts.len(), 8);
    for line in verts {
        assert!(line.ends_with("( 0.0 0.0 ) ( 0 0 )"));
    }
}

#[test]
fn test_counts_match_emitted_lines() {
    use cgmath::{Matrix4, One};
    let mut skel = Skeleton::new();
    skel.add_bone(None, "b", Matrix4::one());

    // a texture seam: the second triangle revisits two source vertices
    // with different UVs
    let weights = || vec![("b".to_string(), 1.0)];
    let polys = vec![
        Polygon {
            material_index: 0,
            smooth: true,
            corners: vec![
                corner(0, Some((0.0, 0.0)), weights()),
                corner(1, Some((1.0, 0.0)), weights()),
                corner(2, Some((1.0, 1.0)), weights()),
            ],
        },
        Polygon {
            material_index: 0,
            smooth: true,
            corners: vec![
                corner(0, Some((0.5, 0.5)), weights()),
                corner(1, Some((0.5, 0.0)), weights()),
                corner(3, Some((0.0, 1.0)), weights()),
            ],
        },
    ];
    let mut mesh = Mesh::build("m", &[Material::new("mat")], polys, &skel,
        UnknownBone::Skip).unwrap();
    for sub in &mut mesh.sub_meshes {
        sub.generate_weights(&skel).unwrap();
    }
    let s = render(&skel, &mesh);

    assert_eq!(declared(&s, "numVerts"),
        s.lines().filter(|l| l.starts_with("\tvert ")).count());
    assert_eq!(declared(&s, "numTris"),
        s.lines().filter(|l| l.starts_with("\ttri ")).count());
    assert_eq!(declared(&s, "numWeights"),
        s.lines().filter(|l| l.starts_with("\tweight ")).count());
}

#[test]
fn test_joint_lines() {
    use cgmath::{vec3, Deg, Matrix4};
    let mut skel = Skeleton::new();
    let root = skel.add_bone(None, "root", Matrix4::from_translation(vec3(1.0, 2.0, 3.0)));
    skel.add_bone(Some(root), "tip", Matrix4::from_angle_z(Deg(270.0)));
    let s = render(&skel, &Mesh::new("m"));

    assert!(s.starts_with("numJoints 2\nnumMeshes 0\n\njoints {\n"));
    // identity orientation picks the negative hemisphere
    assert!(s.contains(
        "\t\"root\"\t-1 ( 1.000000 2.000000 3.000000 ) ( -0.000000 -0.000000 -0.000000 )\n"));
    // a positive-scalar quaternion gets its vector part negated
    assert!(s.contains(
        "\t\"tip\"\t0 ( 0.000000 0.000000 0.000000 ) ( -0.000000 -0.000000 0.707107 )\n"));
}

#[test]
fn test_winding_flip() {
    use cgmath::Point3;
    let mut sub = SubMesh::new(Material::new("mat"));
    for i in 0..3 {
        sub.add_vertex(Point3::new(i as f64, 0.0, 0.0));
    }
    sub.add_face(0, 1, 2);
    let mut mesh = Mesh::new("m");
    mesh.adopt(sub);

    let s = render(&Skeleton::new(), &mesh);
    assert!(s.contains("\ttri 0 0 2 1\n"));
}

#[test]
fn test_vert_and_weight_lines() {
    use cgmath::{Matrix4, One, Point2, Point3};
    use mesh::Influence;
    let mut skel = Skeleton::new();
    let b = skel.add_bone(None, "b", Matrix4::one());

    let mut sub = SubMesh::new(Material::new("mat"));
    let v = sub.add_vertex(Point3::new(1.0, 2.0, 3.0));
    sub.vertices[v].texcoord = Some(Point2::new(0.25, 0.75));
    sub.vertices[v].influences.push(Influence { bone: b, weight: 1.0 });
    sub.generate_weights(&skel).unwrap();
    let mut mesh = Mesh::new("m");
    mesh.adopt(sub);

    let s = render(&skel, &mesh);
    assert!(s.contains("\tvert 0 0 ( 0.250000 0.750000 ) ( 0 1 )\n"));
    assert!(s.contains("\tweight 0 0 1.000000 ( 1.000000 2.000000 3.000000 )\n"));
}

#[test]
fn test_ungenerated_weights_are_an_error() {
    use cgmath::{Matrix4, One, Point3};
    use mesh::Influence;
    let mut skel = Skeleton::new();
    let b = skel.add_bone(None, "b", Matrix4::one());

    let mut sub = SubMesh::new(Material::new("mat"));
    let v = sub.add_vertex(Point3::new(0.0, 0.0, 0.0));
    sub.vertices[v].influences.push(Influence { bone: b, weight: 1.0 });
    let mut mesh = Mesh::new("m");
    mesh.adopt(sub);

    let mut s = String::new();
    assert!(write(&mut s, &skel, &mesh).is_err());
}
