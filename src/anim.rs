//! Animation tracks and bounds for the animation file.
//!
//! An `AnimationBuilder` collects per-bone keyframes (positions and
//! orientations relative to the parent bone) plus one bounding box per
//! frame, then `build` settles what the file format wants per bone: the
//! channel flags, the offset into each frame's flattened component array,
//! and a base frame — the first key, or the bind pose for bones that
//! never move. Whole frames of armature-space pose matrices can be fed
//! with `add_pose_frame`, which does the parent-relative conversion
//! itself.

use cgmath::{Matrix4, Point3, Quaternion, SquareMatrix, Vector3};
use skeleton::{BoneId, Skeleton};
use std::collections::HashMap;
use xform;

/// Frames per second in the engine's playback clock.
pub static FRAME_RATE: u32 = 24;

/// All six channels (Tx, Ty, Tz, Qx, Qy, Qz).
pub static ANIMATED_ALL: u8 = 63;

#[derive(Copy, Clone, Debug)]
pub struct Keyframe {
    /// Position relative to the parent bone.
    pub position: Vector3<f64>,
    /// Orientation relative to the parent bone.
    pub orientation: Quaternion<f64>,
}

/// One bone's armature-space pose matrix for one frame.
pub struct BonePose {
    pub name: String,
    pub matrix: Matrix4<f64>,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Aabb {
    pub min: Point3<f64>,
    pub max: Point3<f64>,
}

impl Aabb {
    /// Smallest box containing `points`; the zero box when there are none.
    pub fn of_points(points: &[Point3<f64>]) -> Aabb {
        let mut points = points.iter();
        let first = match points.next() {
            Some(&p) => p,
            None => {
                let o = Point3::new(0.0, 0.0, 0.0);
                return Aabb { min: o, max: o };
            }
        };
        let mut min = first;
        let mut max = first;
        for &p in points {
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            min.z = min.z.min(p.z);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
            max.z = max.z.max(p.z);
        }
        Aabb { min, max }
    }
}

pub struct AnimationBuilder<'s> {
    skeleton: &'s Skeleton,
    keys: Vec<Vec<Keyframe>>,
    bounds: Vec<Aabb>,
}

impl<'s> AnimationBuilder<'s> {
    pub fn new(skeleton: &'s Skeleton) -> AnimationBuilder<'s> {
        AnimationBuilder {
            skeleton,
            keys: (0..skeleton.bone_count()).map(|_| vec![]).collect(),
            bounds: vec![],
        }
    }

    /// Appends a keyframe for `bone` (which must belong to the builder's
    /// skeleton). Push a bone's frames in playback order.
    pub fn add_key(
        &mut self,
        bone: BoneId,
        position: Vector3<f64>,
        orientation: Quaternion<f64>,
    ) {
        self.keys[bone.index()].push(Keyframe { position, orientation });
    }

    /// Records one frame of armature-space pose matrices; `world` places
    /// root bones in export space. A pose naming a bone the skeleton
    /// lacks, or whose parent pose is missing or singular, is reported
    /// and skipped.
    pub fn add_pose_frame(&mut self, world: &Matrix4<f64>, poses: &[BonePose]) {
        let by_name = poses.iter()
            .map(|p| (&p.name[..], &p.matrix))
            .collect::<HashMap<_, _>>();

        for pose in poses {
            let bone = match self.skeleton.bone_by_name(&pose.name) {
                Some(bone) => bone,
                None => {
                    error!("pose animates bone {:?} which is not in the skeleton; skipping it",
                        pose.name);
                    continue;
                }
            };
            let relative = match self.skeleton.parent(bone) {
                Some(parent) => {
                    let parent_name = &self.skeleton.tree[parent].name;
                    let parent_pose = match by_name.get(&parent_name[..]) {
                        Some(&m) => m,
                        None => {
                            error!("bone {:?} has no pose for its parent {:?} this frame; skipping it",
                                pose.name, parent_name);
                            continue;
                        }
                    };
                    match parent_pose.invert() {
                        Some(inv) => inv * pose.matrix,
                        None => {
                            error!("parent pose for bone {:?} is singular; skipping it",
                                pose.name);
                            continue;
                        }
                    }
                }
                None => world * pose.matrix,
            };
            self.add_key(bone, xform::translation(&relative), xform::rotation(&relative));
        }
    }

    /// Appends the bounding box for the next frame in range.
    pub fn add_frame_bounds(&mut self, points: &[Point3<f64>]) {
        self.bounds.push(Aabb::of_points(points));
    }

    /// Settles flags, frame-data indices, and base frames. Terminal: the
    /// result only gets read.
    pub fn build(self) -> Animation<'s> {
        let AnimationBuilder { skeleton, keys, bounds } = self;
        let num_frames = keys.iter().map(|k| k.len()).max().unwrap_or(0);

        let mut num_animated_components = 0;
        let mut tracks = Vec::with_capacity(keys.len());
        for (i, keys) in keys.into_iter().enumerate() {
            if keys.is_empty() {
                // never animated; its base frame is the bind pose
                let bind = &skeleton.tree[BoneId::new(i)].bind_matrix;
                tracks.push(Track {
                    flags: 0,
                    frame_data_index: 0,
                    base_position: xform::translation(bind),
                    base_orientation: xform::negative_hemisphere(xform::rotation(bind)),
                    keys,
                });
            } else {
                if keys.len() != num_frames {
                    warn!("bone {:?} has {} keys but the animation has {} frames; its last key will hold",
                        skeleton.tree[BoneId::new(i)].name, keys.len(), num_frames);
                }
                let base = keys[0];
                let frame_data_index = num_animated_components;
                num_animated_components += 6;
                tracks.push(Track {
                    flags: ANIMATED_ALL,
                    frame_data_index,
                    base_position: base.position,
                    base_orientation: xform::negative_hemisphere(base.orientation),
                    keys,
                });
            }
        }

        Animation { skeleton, tracks, bounds, num_frames, num_animated_components }
    }
}

/// Finished animation, ready to serialize.
pub struct Animation<'s> {
    pub skeleton: &'s Skeleton,
    /// One per bone, in skeleton order.
    pub tracks: Vec<Track>,
    /// One per frame.
    pub bounds: Vec<Aabb>,
    pub num_frames: usize,
    pub num_animated_components: usize,
}

pub struct Track {
    /// `ANIMATED_ALL` when the bone carries keys, 0 otherwise.
    pub flags: u8,
    /// Offset of this bone's six floats inside a frame's component array.
    pub frame_data_index: usize,
    pub base_position: Vector3<f64>,
    /// Already flipped into the export hemisphere.
    pub base_orientation: Quaternion<f64>,
    pub keys: Vec<Keyframe>,
}

#[cfg(test)]
fn two_bone_skeleton() -> Skeleton {
    use cgmath::vec3;
    let mut skel = Skeleton::new();
    let root = skel.add_bone(None, "root", Matrix4::from_translation(vec3(0.0, 1.0, 0.0)));
    skel.add_bone(Some(root), "tip", Matrix4::from_translation(vec3(0.0, 3.0, 0.0)));
    skel
}

#[test]
fn test_bounds_of_points() {
    let zero = Point3::new(0.0, 0.0, 0.0);
    assert_eq!(Aabb::of_points(&[]), Aabb { min: zero, max: zero });

    let b = Aabb::of_points(&[
        Point3::new(1.0, -2.0, 5.0),
        Point3::new(-3.0, 4.0, 0.0),
        Point3::new(2.0, 0.0, -1.0),
    ]);
    assert_eq!(b.min, Point3::new(-3.0, -2.0, -1.0));
    assert_eq!(b.max, Point3::new(2.0, 4.0, 5.0));
}

#[test]
fn test_build_flags_and_frame_data_indices() {
    use cgmath::vec3;
    let skel = two_bone_skeleton();
    let root = skel.bone_by_name("root").unwrap();

    let mut builder = AnimationBuilder::new(&skel);
    for i in 0..3 {
        builder.add_key(root, vec3(i as f64, 0.0, 0.0), Quaternion::new(1.0, 0.0, 0.0, 0.0));
    }
    let anim = builder.build();

    assert_eq!(anim.num_frames, 3);
    assert_eq!(anim.num_animated_components, 6);
    assert_eq!(anim.tracks[0].flags, ANIMATED_ALL);
    assert_eq!(anim.tracks[0].frame_data_index, 0);
    assert_eq!(anim.tracks[0].keys.len(), 3);
    // the static bone falls back to its bind pose
    assert_eq!(anim.tracks[1].flags, 0);
    assert_eq!(anim.tracks[1].frame_data_index, 0);
    assert!(anim.tracks[1].keys.is_empty());
    assert_eq!(anim.tracks[1].base_position, vec3(0.0, 3.0, 0.0));
}

#[test]
fn test_base_frame_hemisphere() {
    use cgmath::vec3;
    let skel = two_bone_skeleton();
    let root = skel.bone_by_name("root").unwrap();
    let tip = skel.bone_by_name("tip").unwrap();

    let mut builder = AnimationBuilder::new(&skel);
    builder.add_key(root, vec3(0.0, 0.0, 0.0), Quaternion::new(0.8, 0.6, 0.0, 0.0));
    builder.add_key(tip, vec3(0.0, 0.0, 0.0), Quaternion::new(-0.8, 0.6, 0.0, 0.0));
    let anim = builder.build();

    assert_eq!(anim.tracks[0].base_orientation, Quaternion::new(-0.8, -0.6, 0.0, 0.0));
    assert_eq!(anim.tracks[1].base_orientation, Quaternion::new(-0.8, 0.6, 0.0, 0.0));
}

#[test]
fn test_add_pose_frame_is_parent_relative() {
    use cgmath::{vec3, Deg, InnerSpace, Rotation3};
    let skel = two_bone_skeleton();

    let root_pose = Matrix4::from_angle_z(Deg(90.0));
    let tip_pose = root_pose * Matrix4::from_translation(vec3(0.0, 2.0, 0.0));
    let mut builder = AnimationBuilder::new(&skel);
    builder.add_pose_frame(&Matrix4::from_translation(vec3(5.0, 0.0, 0.0)), &[
        BonePose { name: "root".to_string(), matrix: root_pose },
        BonePose { name: "tip".to_string(), matrix: tip_pose },
    ]);
    let anim = builder.build();

    // root lands in export space
    let root_key = anim.tracks[0].keys[0];
    assert!((root_key.position - vec3(5.0, 0.0, 0.0)).magnitude() < 1e-9);
    let want = Quaternion::from_angle_z(Deg(90.0));
    assert!((root_key.orientation.dot(want).abs() - 1.0).abs() < 1e-9);

    // the tip's key is relative to its parent's pose
    let tip_key = anim.tracks[1].keys[0];
    assert!((tip_key.position - vec3(0.0, 2.0, 0.0)).magnitude() < 1e-9);
    assert!((tip_key.orientation.s.abs() - 1.0).abs() < 1e-9);
}

#[test]
fn test_add_pose_frame_skips_bad_entries() {
    use cgmath::One;
    let skel = two_bone_skeleton();

    let mut builder = AnimationBuilder::new(&skel);
    builder.add_pose_frame(&Matrix4::one(), &[
        // not in the skeleton: reported, skipped
        BonePose { name: "phantom".to_string(), matrix: Matrix4::one() },
        // parent pose missing this frame: reported, skipped
        BonePose { name: "tip".to_string(), matrix: Matrix4::one() },
    ]);
    let anim = builder.build();
    assert_eq!(anim.num_frames, 0);
    assert!(anim.tracks.iter().all(|t| t.keys.is_empty()));
}

#[test]
fn test_ragged_keys_take_the_max() {
    use cgmath::{vec3, One};
    let skel = two_bone_skeleton();
    let root = skel.bone_by_name("root").unwrap();
    let tip = skel.bone_by_name("tip").unwrap();

    let mut builder = AnimationBuilder::new(&skel);
    let q = Quaternion::one();
    builder.add_key(root, vec3(0.0, 0.0, 0.0), q);
    builder.add_key(root, vec3(1.0, 0.0, 0.0), q);
    builder.add_key(tip, vec3(0.0, 0.0, 0.0), q);
    let anim = builder.build();

    assert_eq!(anim.num_frames, 2);
    assert_eq!(anim.num_animated_components, 12);
    assert_eq!(anim.tracks[0].frame_data_index, 0);
    assert_eq!(anim.tracks[1].frame_data_index, 6);
}
