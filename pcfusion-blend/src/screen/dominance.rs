//! Dominant-camera selection at reduced resolution.

use super::raster::FragmentBuffer;
use pcfusion_data::Raster;

/// For every reduced pixel, the slot whose fragment should own it.
///
/// The full-resolution pixel at the block center is sampled. Among fragments
/// within `depth_tolerance` of the nearest, the highest quality wins; equal
/// quality goes to the lowest slot. Uncovered pixels get `None`.
pub fn select_dominant(fragments: &[&FragmentBuffer], scale: u32, depth_tolerance: f32, out: &mut Raster<Option<u16>>) {
    let Some(first) = fragments.first() else {
        out.fill(None);
        return;
    };
    let (w, h) = first.dimensions();
    let (mw, mh) = out.dimensions();
    let scale = scale.max(1);

    for my in 0..mh {
        let y = (my * scale + scale / 2).min(h.saturating_sub(1));
        for mx in 0..mw {
            let x = (mx * scale + scale / 2).min(w.saturating_sub(1));
            let i = first.depth.index(x, y);
            *out.get_mut(mx, my) = dominant_at(fragments, i, depth_tolerance);
        }
    }
}

fn dominant_at(fragments: &[&FragmentBuffer], i: usize, depth_tolerance: f32) -> Option<u16> {
    let nearest = fragments
        .iter()
        .map(|f| f.depth.as_slice()[i])
        .fold(f32::INFINITY, f32::min);
    if !nearest.is_finite() {
        return None;
    }
    let mut best: Option<(u16, f32)> = None;
    for (slot, f) in fragments.iter().enumerate() {
        let d = f.depth.as_slice()[i];
        if !(d <= nearest + depth_tolerance) {
            continue;
        }
        let q = f.quality.as_slice()[i];
        if best.is_none_or(|(_, bq)| q > bq) {
            best = Some((slot as u16, q));
        }
    }
    best.map(|(slot, _)| slot)
}
