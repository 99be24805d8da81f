//! Helpers for picking apart affine transforms.
//!
//! Bind and pose matrices arrive as general 4x4 affine transforms, but the
//! file formats store a bone transform as a translation plus the vector
//! part of a unit quaternion. The engine reconstructs the scalar part as
//! `w = -sqrt(1 - |v|²)`, so only the representative of {q, -q} with a
//! non-positive scalar survives a round trip; `negative_hemisphere` picks
//! it.

use cgmath::{InnerSpace, Matrix3, Matrix4, Quaternion, Vector3};

/// Translation column of an affine transform.
pub fn translation(m: &Matrix4<f64>) -> Vector3<f64> {
    m.w.truncate()
}

/// Rotation of an affine transform as a unit quaternion. Scale is
/// stripped by normalizing the basis columns first, the same treatment
/// authoring tools give a matrix asked for its rotation.
pub fn rotation(m: &Matrix4<f64>) -> Quaternion<f64> {
    let rot = Matrix3::from_cols(
        unit(m.x.truncate()),
        unit(m.y.truncate()),
        unit(m.z.truncate()),
    );
    Quaternion::from(rot).normalize()
}

fn unit(v: Vector3<f64>) -> Vector3<f64> {
    let mag2 = v.magnitude2();
    if mag2 > 0.0 { v / mag2.sqrt() } else { v }
}

/// The representative of {q, -q} whose scalar part is not positive.
pub fn negative_hemisphere(q: Quaternion<f64>) -> Quaternion<f64> {
    if q.s > 0.0 { -q } else { q }
}

#[test]
fn test_translation() {
    use cgmath::vec3;
    let m = Matrix4::from_translation(vec3(1.0, 2.0, 3.0));
    assert_eq!(translation(&m), vec3(1.0, 2.0, 3.0));
}

#[test]
fn test_rotation_ignores_scale() {
    use cgmath::{Deg, Rotation3};
    let m = Matrix4::from_angle_z(Deg(90.0)) * Matrix4::from_scale(3.0);
    let q = rotation(&m);
    let want = Quaternion::from_angle_z(Deg(90.0));
    // q and -q are the same rotation
    assert!((q.dot(want).abs() - 1.0).abs() < 1e-9);
}

#[test]
fn test_negative_hemisphere() {
    let q = Quaternion::new(0.8, 0.6, 0.0, 0.0);
    let flipped = negative_hemisphere(q);
    assert_eq!(flipped, -q);

    let q = Quaternion::new(-0.8, 0.6, 0.0, 0.0);
    assert_eq!(negative_hemisphere(q), q);

    let q = Quaternion::new(0.0, 1.0, 0.0, 0.0);
    assert_eq!(negative_hemisphere(q), q);
}
