//! Export driver: turns finished models into text buffers and persists
//! them.
//!
//! An export run is atomic from the caller's side: it either yields the
//! buffers the mode asks for, or reports why one of them could not be
//! produced. Writing the buffers to disk is separate and per-file; a
//! failure on one file never blocks the other.

#[macro_use]
mod format;
mod anim_file;
mod mesh_file;

use anim::Animation;
use errors::Result;
use mesh::Mesh;
use skeleton::Skeleton;
use std::fs::File;
use std::io::Write;
use std::mem;
use std::path::Path;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ExportMode {
    MeshOnly,
    AnimOnly,
    MeshAndAnim,
}

/// Rendered text buffers from one export run.
pub struct ExportOutput {
    pub mesh: Option<String>,
    pub anim: Option<String>,
}

pub fn export(
    mode: ExportMode,
    skel: &Skeleton,
    meshes: Vec<Mesh>,
    anim: Option<&Animation>,
) -> Result<ExportOutput> {
    let mut output = ExportOutput { mesh: None, anim: None };

    if mode != ExportMode::AnimOnly {
        output.mesh = render_mesh(skel, meshes)?;
    }
    if mode != ExportMode::MeshOnly {
        output.anim = match anim {
            Some(anim) => {
                let mut s = String::new();
                anim_file::write(&mut s, anim)?;
                Some(s)
            }
            None => {
                error!("no animation to export");
                None
            }
        };
    }
    Ok(output)
}

/// Merges every mesh into the first, finalizes skinning, and renders.
/// A submesh whose weights cannot be generated is reported and dropped;
/// the rest of the mesh still exports.
fn render_mesh(skel: &Skeleton, meshes: Vec<Mesh>) -> Result<Option<String>> {
    let mut meshes = meshes.into_iter();
    let mut mesh = match meshes.next() {
        Some(mesh) => mesh,
        None => {
            error!("no meshes to export");
            return Ok(None);
        }
    };
    for other in meshes {
        mesh.absorb(other);
    }

    let sub_meshes = mem::replace(&mut mesh.sub_meshes, vec![]);
    for mut sub in sub_meshes {
        match sub.generate_weights(skel) {
            Ok(()) => { mesh.adopt(sub); }
            Err(e) => error!("dropping a submesh of {}: {}", mesh.name, e),
        }
    }

    let mut s = String::new();
    mesh_file::write(&mut s, skel, &mesh)?;
    Ok(Some(s))
}

/// Writes whichever buffers the run produced, appending the engine's
/// extensions to `path`. Failures are reported per file.
pub fn save(output: &ExportOutput, path: &Path) {
    if let Some(ref mesh) = output.mesh {
        save_file(path, ".urchinMesh", mesh);
    }
    if let Some(ref anim) = output.anim {
        save_file(path, ".urchinAnim", anim);
    }
}

fn save_file(path: &Path, extension: &str, contents: &str) {
    let mut file_name = path.as_os_str().to_os_string();
    file_name.push(extension);
    let result = File::create(&file_name)
        .and_then(|mut f| f.write_all(contents.as_bytes()));
    match result {
        Ok(()) => info!("wrote {}", Path::new(&file_name).display()),
        Err(e) => error!("failed to write {}: {}", Path::new(&file_name).display(), e),
    }
}

#[cfg(test)]
use cgmath::Matrix4;
#[cfg(test)]
use mesh::builder::{Corner, Polygon, UnknownBone};
#[cfg(test)]
use mesh::Material;

#[cfg(test)]
fn rig() -> Skeleton {
    use cgmath::{vec3, One};
    let mut skel = Skeleton::new();
    let root = skel.add_bone(None, "root", Matrix4::one());
    skel.add_bone(Some(root), "tip", Matrix4::from_translation(vec3(0.0, 2.0, 0.0)));
    skel
}

#[cfg(test)]
fn skinned_triangle(material_index: usize) -> Polygon {
    use cgmath::Point3;
    Polygon {
        material_index,
        smooth: true,
        corners: (0..3).map(|i| Corner {
            source_vertex: i,
            position: Point3::new(i as f64, 0.0, 0.0),
            uv: None,
            influences: vec![("root".to_string(), 1.0)],
        }).collect(),
    }
}

#[cfg(test)]
fn one_mesh(skel: &Skeleton) -> Mesh {
    Mesh::build("m", &[Material::new("mat")], vec![skinned_triangle(0)], skel,
        UnknownBone::Skip).unwrap()
}

#[test]
fn test_mode_gates_buffers() {
    use anim::AnimationBuilder;
    let skel = rig();
    let anim = AnimationBuilder::new(&skel).build();

    let out = export(ExportMode::MeshOnly, &skel, vec![one_mesh(&skel)], Some(&anim)).unwrap();
    assert!(out.mesh.is_some());
    assert!(out.anim.is_none());

    let out = export(ExportMode::AnimOnly, &skel, vec![one_mesh(&skel)], Some(&anim)).unwrap();
    assert!(out.mesh.is_none());
    assert!(out.anim.is_some());

    let out = export(ExportMode::MeshAndAnim, &skel, vec![one_mesh(&skel)], Some(&anim))
        .unwrap();
    assert!(out.mesh.is_some());
    assert!(out.anim.is_some());
}

#[test]
fn test_meshes_merge_into_one_file() {
    let skel = rig();
    let a = one_mesh(&skel);
    let b = Mesh::build("n", &[Material::new("other")], vec![skinned_triangle(0)], &skel,
        UnknownBone::Skip).unwrap();

    let out = export(ExportMode::MeshOnly, &skel, vec![a, b], None).unwrap();
    let s = out.mesh.unwrap();
    assert!(s.contains("numMeshes 2\n"));
    assert!(s.contains("\tmaterial \"mat\"\n"));
    assert!(s.contains("\tmaterial \"other\"\n"));
}

#[test]
fn test_missing_inputs_yield_no_buffers() {
    let skel = rig();
    let out = export(ExportMode::MeshAndAnim, &skel, vec![], None).unwrap();
    assert!(out.mesh.is_none());
    assert!(out.anim.is_none());
}

#[test]
fn test_unskinnable_submesh_is_dropped() {
    use cgmath::Point3;
    let mut skel = Skeleton::new();
    skel.add_bone(None, "root", Matrix4::one());
    skel.add_bone(None, "crushed", Matrix4::from_scale(0.0));

    let good = skinned_triangle(0);
    let bad = Polygon {
        material_index: 1,
        smooth: true,
        corners: (0..3).map(|i| Corner {
            source_vertex: i,
            position: Point3::new(i as f64, 0.0, 0.0),
            uv: None,
            influences: vec![("crushed".to_string(), 1.0)],
        }).collect(),
    };
    let mesh = Mesh::build("m", &[Material::new("good"), Material::new("bad")],
        vec![good, bad], &skel, UnknownBone::Skip).unwrap();

    let out = export(ExportMode::MeshOnly, &skel, vec![mesh], None).unwrap();
    let s = out.mesh.unwrap();
    assert!(s.contains("numMeshes 1\n"));
    assert!(s.contains("\tmaterial \"good\"\n"));
    assert!(!s.contains("\tmaterial \"bad\"\n"));
}

#[test]
fn test_mesh_and_anim_end_to_end() {
    use anim::AnimationBuilder;
    use cgmath::{vec3, One, Point3, Quaternion};
    let skel = rig();
    let root = skel.bone_by_name("root").unwrap();

    let mut builder = AnimationBuilder::new(&skel);
    builder.add_key(root, vec3(0.0, 0.0, 0.0), Quaternion::one());
    builder.add_frame_bounds(&[Point3::new(1.0, 1.0, 1.0)]);
    let anim = builder.build();

    let out = export(ExportMode::MeshAndAnim, &skel, vec![one_mesh(&skel)], Some(&anim))
        .unwrap();
    let mesh = out.mesh.unwrap();
    assert!(mesh.starts_with("numJoints 2\n"));
    assert!(mesh.contains("\tnumWeights 3\n"));
    let anim = out.anim.unwrap();
    assert!(anim.starts_with("numFrames 1\nnumJoints 2\n"));
    assert!(anim.contains("\t\"tip\"\t0 0 0 root\n"));
}
