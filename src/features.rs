//! Feature derivation from raw hand joints.
//!
//! The layout is the 84 joint values (x, y, z, visibility for each of the 21
//! joints) followed by 15 angles in degrees between consecutive bones of each
//! finger.

use crate::error::FrameError;
use crate::frame::{Joint, ANGLE_COUNT, FEATURE_DIM, JOINT_COUNT};

const BONE_PARENTS: [usize; 20] = [0, 1, 2, 3, 0, 5, 6, 7, 0, 9, 10, 11, 0, 13, 14, 15, 0, 17, 18, 19];
const BONE_CHILDREN: [usize; 20] = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20];

const ANGLE_FIRST: [usize; ANGLE_COUNT] = [0, 1, 2, 4, 5, 6, 8, 9, 10, 12, 13, 14, 16, 17, 18];
const ANGLE_SECOND: [usize; ANGLE_COUNT] = [1, 2, 3, 5, 6, 7, 9, 10, 11, 13, 14, 15, 17, 18, 19];

const MIN_BONE_LENGTH: f32 = 1e-6;

/// Derive a feature vector from 21 joints
///
/// With `force_visibility` every visibility value is written as 1.0, which is
/// what the sequence model was trained on.
pub fn derive(joints: &[Joint], force_visibility: bool) -> Result<Vec<f32>, FrameError> {
    if joints.len() != JOINT_COUNT {
        return Err(FrameError::JointCount {
            expected: JOINT_COUNT,
            actual: joints.len(),
        });
    }

    let mut values = Vec::with_capacity(FEATURE_DIM);
    for joint in joints {
        let visibility = if force_visibility {
            1.0
        } else {
            joint.visibility
        };
        values.extend_from_slice(&[joint.x, joint.y, joint.z, visibility]);
    }

    values.extend(bone_angles(joints));

    if values.iter().any(|v| !v.is_finite()) {
        return Err(FrameError::NonFinite { field: "joints" });
    }

    Ok(values)
}

fn bone_angles(joints: &[Joint]) -> impl Iterator<Item = f32> {
    let bones: Vec<[f32; 3]> = BONE_PARENTS
        .iter()
        .zip(BONE_CHILDREN.iter())
        .map(|(&parent, &child)| {
            let (p, c) = (joints[parent], joints[child]);
            normalize([c.x - p.x, c.y - p.y, c.z - p.z])
        })
        .collect();

    ANGLE_FIRST
        .iter()
        .zip(ANGLE_SECOND.iter())
        .map(move |(&a, &b)| {
            let dot: f32 = bones[a].iter().zip(bones[b].iter()).map(|(x, y)| x * y).sum();
            dot.clamp(-1.0, 1.0).acos().to_degrees()
        })
}

fn normalize(v: [f32; 3]) -> [f32; 3] {
    let mut length = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    if length == 0.0 {
        length = MIN_BONE_LENGTH;
    }
    [v[0] / length, v[1] / length, v[2] / length]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn straight_hand() -> Vec<Joint> {
        // Every finger a straight line from the wrist
        let mut joints = vec![Joint::new(0.5, 0.9, 0.0)];
        for finger in 0..5 {
            let x = 0.3 + finger as f32 * 0.1;
            for segment in 1..=4 {
                let mut joint = Joint::new(x, 0.9 - segment as f32 * 0.1, 0.0);
                joint.visibility = 0.5;
                joints.push(joint);
            }
        }
        joints
    }

    #[test]
    fn test_derive_layout() {
        let values = derive(&straight_hand(), false).unwrap();
        assert_eq!(values.len(), FEATURE_DIM);

        // Joint values come first, in x, y, z, visibility order
        assert_eq!(&values[0..4], &[0.5, 0.9, 0.0, 1.0]);
        assert_eq!(values[7], 0.5);
    }

    #[test]
    fn test_forced_visibility() {
        let values = derive(&straight_hand(), true).unwrap();
        for joint in 0..JOINT_COUNT {
            assert_eq!(values[joint * 4 + 3], 1.0);
        }
    }

    #[test]
    fn test_straight_fingers_have_near_zero_angles_between_segments() {
        let values = derive(&straight_hand(), false).unwrap();
        let angles = &values[JOINT_COUNT * 4..];
        assert_eq!(angles.len(), ANGLE_COUNT);

        // Second and third angle of each finger are between collinear segments
        for finger in 0..5 {
            assert!(angles[finger * 3 + 1].abs() < 0.5);
            assert!(angles[finger * 3 + 2].abs() < 0.5);
        }
    }

    #[test]
    fn test_wrong_joint_count() {
        let joints = vec![Joint::new(0.0, 0.0, 0.0); 5];
        assert_eq!(
            derive(&joints, false),
            Err(FrameError::JointCount {
                expected: JOINT_COUNT,
                actual: 5
            })
        );
    }

    #[test]
    fn test_non_finite_joint_rejected() {
        let mut joints = straight_hand();
        joints[3].x = f32::INFINITY;
        assert!(matches!(
            derive(&joints, false),
            Err(FrameError::NonFinite { .. })
        ));
    }

    #[test]
    fn test_coincident_joints_do_not_produce_nan() {
        let joints = vec![Joint::new(0.5, 0.5, 0.0); JOINT_COUNT];
        let values = derive(&joints, false).unwrap();
        assert!(values.iter().all(|v| v.is_finite()));
    }
}
