//! Writer for the animation file.
//!
//! Pure formatting over a built `Animation`. Bones without keys appear in
//! the hierarchy and base frame but contribute nothing to the per-frame
//! blocks; the engine holds them at their base frame.

use anim::{Aabb, Animation, FRAME_RATE};
use convert::format::Triple;
use errors::Result;
use std::fmt::Write;
use xform;

pub fn write<W: Write>(w: &mut W, anim: &Animation) -> Result<()> {
    write_lines!(w,
        "numFrames {num_frames}",
        "numJoints {num_joints}",
        "frameRate {frame_rate}",
        "numAnimatedComponents {num_components}",
        "";
        num_frames = anim.num_frames,
        num_joints = anim.skeleton.bone_count(),
        frame_rate = FRAME_RATE,
        num_components = anim.num_animated_components,
    )?;
    write_hierarchy(w, anim)?;
    write_bounds(w, anim)?;
    write_base_frame(w, anim)?;
    write_frames(w, anim)?;
    Ok(())
}

fn write_hierarchy<W: Write>(w: &mut W, anim: &Animation) -> Result<()> {
    write_lines!(w,
        "hierarchy {{";
    )?;
    let skel = anim.skeleton;
    for id in skel.tree.node_indices() {
        let bone = &skel.tree[id];
        let track = &anim.tracks[id.index()];
        match skel.parent(id) {
            Some(parent) => write_lines!(w,
                "\t\"{name}\"\t{parent} {flags} {index} {parent_name}";
                name = bone.name,
                parent = parent.index(),
                flags = track.flags,
                index = track.frame_data_index,
                parent_name = skel.tree[parent].name,
            )?,
            None => write_lines!(w,
                "\t\"{name}\"\t-1 {flags} {index}";
                name = bone.name,
                flags = track.flags,
                index = track.frame_data_index,
            )?,
        }
    }
    write_lines!(w,
        "}}",
        "";
    )?;
    Ok(())
}

fn write_bounds<W: Write>(w: &mut W, anim: &Animation) -> Result<()> {
    if anim.bounds.len() != anim.num_frames {
        warn!("animation has {} bounding boxes for {} frames",
            anim.bounds.len(), anim.num_frames);
    }
    write_lines!(w,
        "bounds {{";
    )?;
    let zero = Aabb::of_points(&[]);
    for f in 0..anim.num_frames {
        let b = anim.bounds.get(f).cloned().unwrap_or(zero);
        write_lines!(w,
            "\t{min} {max}";
            min = Triple(b.min.x, b.min.y, b.min.z),
            max = Triple(b.max.x, b.max.y, b.max.z),
        )?;
    }
    write_lines!(w,
        "}}",
        "";
    )?;
    Ok(())
}

fn write_base_frame<W: Write>(w: &mut W, anim: &Animation) -> Result<()> {
    write_lines!(w,
        "base_frame {{";
    )?;
    for track in &anim.tracks {
        write_lines!(w,
            "\t{position} {orientation}";
            position = Triple(track.base_position.x, track.base_position.y,
                track.base_position.z),
            orientation = Triple(track.base_orientation.v.x, track.base_orientation.v.y,
                track.base_orientation.v.z),
        )?;
    }
    write_lines!(w,
        "}}",
        "";
    )?;
    Ok(())
}

fn write_frames<W: Write>(w: &mut W, anim: &Animation) -> Result<()> {
    for f in 0..anim.num_frames {
        write_lines!(w,
            "frame {f} {{";
            f = f,
        )?;
        for track in &anim.tracks {
            if track.keys.is_empty() {
                continue;
            }
            // a short track holds its last key
            let key = track.keys[f.min(track.keys.len() - 1)];
            let q = xform::negative_hemisphere(key.orientation);
            write_lines!(w,
                "\t{x:.6} {y:.6} {z:.6} {qx:.6} {qy:.6} {qz:.6}";
                x = key.position.x, y = key.position.y, z = key.position.z,
                qx = q.v.x, qy = q.v.y, qz = q.v.z,
            )?;
        }
        write_lines!(w,
            "}}",
            "";
        )?;
    }
    Ok(())
}

#[cfg(test)]
use anim::AnimationBuilder;
#[cfg(test)]
use skeleton::Skeleton;

#[cfg(test)]
fn rig() -> Skeleton {
    use cgmath::{vec3, Matrix4};
    let mut skel = Skeleton::new();
    let root = skel.add_bone(None, "root", Matrix4::from_translation(vec3(0.0, 1.0, 0.0)));
    skel.add_bone(Some(root), "tip", Matrix4::from_translation(vec3(0.0, 3.0, 0.0)));
    skel
}

#[cfg(test)]
fn render(anim: &Animation) -> String {
    let mut s = String::new();
    write(&mut s, anim).unwrap();
    s
}

#[cfg(test)]
fn block<'a>(s: &'a str, opener: &str) -> &'a str {
    s.split(opener).nth(1).unwrap().split("}").next().unwrap()
}

#[test]
fn test_static_and_animated_bones() {
    use cgmath::{vec3, Point3, Quaternion};
    let skel = rig();
    let root = skel.bone_by_name("root").unwrap();

    let mut builder = AnimationBuilder::new(&skel);
    for i in 0..3 {
        builder.add_key(root, vec3(i as f64, 0.0, 0.0), Quaternion::new(1.0, 0.0, 0.0, 0.0));
        builder.add_frame_bounds(&[Point3::new(-1.0, -1.0, -1.0), Point3::new(1.0, 1.0, 1.0)]);
    }
    let anim = builder.build();
    let s = render(&anim);

    assert!(s.starts_with(
        "numFrames 3\nnumJoints 2\nframeRate 24\nnumAnimatedComponents 6\n\nhierarchy {\n"));
    assert!(s.contains("\t\"root\"\t-1 63 0\n"));
    assert!(s.contains("\t\"tip\"\t0 0 0 root\n"));

    assert_eq!(block(&s, "bounds {\n").lines().count(), 3);

    // only the animated bone appears in the frame blocks
    assert_eq!(s.matches("\nframe ").count(), 3);
    for f in 0..3 {
        let body = block(&s, &format!("frame {} {{\n", f));
        assert_eq!(body.lines().count(), 1);
        assert!(body.starts_with(&format!("\t{}.000000 ", f)));
    }
}

#[test]
fn test_frame_lines_pick_the_negative_hemisphere() {
    use cgmath::{vec3, Quaternion};
    let skel = rig();
    let root = skel.bone_by_name("root").unwrap();

    let mut builder = AnimationBuilder::new(&skel);
    builder.add_key(root, vec3(0.0, 0.0, 0.0), Quaternion::new(0.8, 0.6, 0.0, 0.0));
    builder.add_frame_bounds(&[]);
    let anim = builder.build();
    let s = render(&anim);

    assert!(block(&s, "frame 0 {\n")
        .contains("\t0.000000 0.000000 0.000000 -0.600000 -0.000000 -0.000000\n"));
    assert!(block(&s, "base_frame {\n")
        .contains("( -0.600000 -0.000000 -0.000000 )\n"));
}

#[test]
fn test_bounds_pad_missing_frames() {
    use cgmath::{vec3, Point3, Quaternion};
    let skel = rig();
    let root = skel.bone_by_name("root").unwrap();

    let mut builder = AnimationBuilder::new(&skel);
    let q = Quaternion::new(1.0, 0.0, 0.0, 0.0);
    builder.add_key(root, vec3(0.0, 0.0, 0.0), q);
    builder.add_key(root, vec3(1.0, 0.0, 0.0), q);
    builder.add_frame_bounds(&[Point3::new(2.0, 2.0, 2.0)]);
    let anim = builder.build();
    let s = render(&anim);

    let bounds = block(&s, "bounds {\n").lines().collect::<Vec<_>>();
    assert_eq!(bounds.len(), 2);
    assert_eq!(bounds[0], "\t( 2.000000 2.000000 2.000000 ) ( 2.000000 2.000000 2.000000 )");
    assert_eq!(bounds[1], "\t( 0.000000 0.000000 0.000000 ) ( 0.000000 0.000000 0.000000 )");
}

#[test]
fn test_short_tracks_hold_their_last_key() {
    use cgmath::{vec3, Quaternion};
    let skel = rig();
    let root = skel.bone_by_name("root").unwrap();
    let tip = skel.bone_by_name("tip").unwrap();

    let mut builder = AnimationBuilder::new(&skel);
    let q = Quaternion::new(1.0, 0.0, 0.0, 0.0);
    builder.add_key(root, vec3(0.0, 0.0, 0.0), q);
    builder.add_key(root, vec3(1.0, 0.0, 0.0), q);
    builder.add_key(tip, vec3(9.0, 9.0, 9.0), q);
    let anim = builder.build();
    let s = render(&anim);

    let tip_line = "\t9.000000 9.000000 9.000000 -0.000000 -0.000000 -0.000000\n";
    assert!(block(&s, "frame 0 {\n").contains(tip_line));
    assert!(block(&s, "frame 1 {\n").contains(tip_line));
}

#[test]
fn test_no_keys_at_all() {
    let skel = rig();
    let anim = AnimationBuilder::new(&skel).build();
    let s = render(&anim);

    assert!(s.starts_with("numFrames 0\nnumJoints 2\nframeRate 24\nnumAnimatedComponents 0\n"));
    assert!(!s.contains("frame 0"));
    assert_eq!(block(&s, "bounds {\n").lines().count(), 0);
    // the base frame still covers every bone, from the bind pose
    let base = block(&s, "base_frame {\n").lines().collect::<Vec<_>>();
    assert_eq!(base.len(), 2);
    assert_eq!(base[0], "\t( 0.000000 1.000000 0.000000 ) ( -0.000000 -0.000000 -0.000000 )");
    assert_eq!(base[1], "\t( 0.000000 3.000000 0.000000 ) ( -0.000000 -0.000000 -0.000000 )");
}
