use super::Side;

/// Thoracic then lumbar vertebrae, top to bottom. Cervical levels are not tracked.
pub const VERTEBRA_LEVELS: [&str; 17] = [
    "T1", "T2", "T3", "T4", "T5", "T6", "T7", "T8", "T9", "T10", "T11", "T12", "L1", "L2", "L3",
    "L4", "L5",
];

/// Landmarks on one side of a complete spine.
pub const COMPLETE_SIDE_POINTS: usize = VERTEBRA_LEVELS.len();

pub fn vertebra_label(level: usize, side: Side) -> String {
    format!("{}{}", VERTEBRA_LEVELS[level], side.suffix())
}

/// Splits labels such as `T7L` into the level index and side.
pub fn parse_label(label: &str) -> Option<(usize, Side)> {
    let label = label.trim();
    let side = match label.chars().last()? {
        'L' | 'l' => Side::Left,
        'R' | 'r' => Side::Right,
        _ => return None,
    };
    let name = &label[..label.len() - 1];
    VERTEBRA_LEVELS
        .iter()
        .position(|level| level.eq_ignore_ascii_case(name))
        .map(|level| (level, side))
}

/// Provenance label of the `point`-th synthesized point of sub-patch `patch`.
pub fn patch_point_label(patch: usize, point: usize) -> String {
    format!("SubPatch-{}_Point-{}", patch, point)
}

/// Inverse of [`patch_point_label`]: `SubPatch-2_Point-0` gives `(2, 0)`.
pub fn parse_patch_label(label: &str) -> Option<(usize, usize)> {
    let (patch, point) = label.trim().strip_prefix("SubPatch-")?.split_once("_Point-")?;
    Some((patch.parse().ok()?, point.parse().ok()?))
}
