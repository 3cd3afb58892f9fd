//! Resolution hint to traversal depth mapping
//!
//! The hint is a user-facing `[0, 1]` dial: 0 favors speed (coarse
//! macrocells, aggressive skipping), 1 favors accuracy (elementary cells).

/// `(hint, depth)` breakpoints for the four-level sparse tree
pub const VDB_DEPTH_BREAKPOINTS: [(f32, u32); 4] = [(0.0, 0), (0.2, 1), (0.4, 2), (0.8, 3)];

/// Upper end of the lower linear segment of the BVH mapping
pub const BVH_LOWER_HINT: f32 = 0.45;
/// Lower end of the upper linear segment of the BVH mapping
pub const BVH_UPPER_HINT: f32 = 0.55;

/// Clamp a hint into `[0, 1]`; NaN maps to 0
pub fn clamp_hint(hint: f32) -> f32 {
    if hint.is_nan() { 0.0 } else { hint.clamp(0.0, 1.0) }
}

/// Depth of the last breakpoint whose hint is `<= hint`
pub fn depth_from_breakpoints(hint: f32, breakpoints: &[(f32, u32)]) -> u32 {
    let hint = clamp_hint(hint);
    breakpoints
        .iter()
        .take_while(|(h, _)| *h <= hint)
        .last()
        .map(|(_, d)| *d)
        .unwrap_or(0)
}

/// Sparse tree mapping
pub fn vdb_depth(hint: f32) -> u32 {
    depth_from_breakpoints(hint, &VDB_DEPTH_BREAKPOINTS)
}

/// BVH mapping for a hierarchy of measured depth `bvh_depth`
///
/// Hints up to 0.45 cover `[0, D/2]`, hints from 0.55 cover `[D/2 + 1, D]`,
/// the band in between holds at `D/2`, and a hint of 1 is always `D`.
pub fn bvh_depth(hint: f32, bvh_depth: u32) -> u32 {
    let hint = clamp_hint(hint);
    let half = bvh_depth / 2;
    if hint >= 1.0 {
        return bvh_depth;
    }
    if hint <= BVH_LOWER_HINT {
        let f = hint / BVH_LOWER_HINT;
        return ((f * half as f32).floor() as u32).min(half);
    }
    if hint < BVH_UPPER_HINT {
        return half;
    }
    let lo = (half + 1).min(bvh_depth);
    let f = (hint - BVH_UPPER_HINT) / (1.0 - BVH_UPPER_HINT);
    (lo + (f * (bvh_depth - lo) as f32).floor() as u32).min(bvh_depth)
}
