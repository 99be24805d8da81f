//! Produces the Urchin engine's two text asset formats from in-memory
//! scene data: `.urchinMesh` (bind-pose skinned mesh) and `.urchinAnim`
//! (skeletal animation).
//!
//! The host authoring tool extracts polygons, bone rest transforms, and
//! per-frame pose transforms from its scene and hands them to this crate,
//! which builds the export model (`Skeleton`, `Mesh`, `Animation`) and
//! renders the text buffers. See `convert::export` for the driver.

#![recursion_limit = "1024"] // for error_chain

#[macro_use]
extern crate log;
#[macro_use]
extern crate error_chain;
extern crate atty;
extern crate cgmath;
extern crate petgraph;
extern crate smallvec;
extern crate termcolor;

mod errors;
pub mod logger;
mod xform;
pub mod skeleton;
pub mod mesh;
pub mod anim;
pub mod convert;

pub use errors::{Error, ErrorKind, Result};
pub use skeleton::{Bone, BoneId, Skeleton};
pub use mesh::{Material, Mesh, SubMesh};
pub use mesh::builder::{Corner, Polygon, UnknownBone};
pub use anim::{Aabb, Animation, AnimationBuilder, BonePose, Keyframe};
pub use convert::{export, save, ExportMode, ExportOutput};
