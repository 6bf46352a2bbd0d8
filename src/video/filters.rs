//! FFmpeg filter graph generation for a [`Timeline`].
//!
//! Input `i` of the encoder command is the looped still image of clip `i`.
//! Each clip is fitted to the canvas, animated with per-frame expressions,
//! faded, shifted to its start time and overlaid onto a black canvas.

use super::timeline::{AnimationKind, Clip, Timeline};

/// Label of the finished video stream.
pub const VIDEO_OUTPUT_LABEL: &str = "vout";

/// Build the `-filter_complex` graph for the timeline.
pub fn build_filter_graph(timeline: &Timeline, fps: u32) -> String {
    let canvas = timeline.canvas;
    let mut chains = Vec::with_capacity(timeline.clips.len() * 2 + 2);

    chains.push(format!(
        "color=c=black:s={}x{}:r={}:d={:.3}[base0]",
        canvas.width,
        canvas.height,
        fps,
        timeline.duration()
    ));

    for (i, clip) in timeline.clips.iter().enumerate() {
        chains.push(clip_chain(i, clip, canvas.width, canvas.height));
        chains.push(overlay_chain(i, clip));
    }

    chains.push(format!(
        "[base{}]format=yuv420p[{}]",
        timeline.clips.len(),
        VIDEO_OUTPUT_LABEL
    ));

    chains.join(";")
}

fn clip_chain(index: usize, clip: &Clip, width: u32, height: u32) -> String {
    let mut filters = vec![
        format!("scale={}:{}:force_original_aspect_ratio=decrease", width, height),
        "setsar=1".to_string(),
        "format=rgba".to_string(),
    ];
    filters.extend(motion_filters(clip.kind, clip.duration));

    if clip.fade_in > 0.0 {
        filters.push(format!("fade=t=in:st=0:d={:.3}:alpha=1", clip.fade_in));
    }
    if clip.fade_out > 0.0 {
        filters.push(format!(
            "fade=t=out:st={:.3}:d={:.3}:alpha=1",
            clip.duration - clip.fade_out,
            clip.fade_out
        ));
    }
    filters.push(format!("setpts=PTS-STARTPTS+{:.3}/TB", clip.start));

    format!("[{}:v]{}[c{}]", index, filters.join(","), index)
}

/// Per-frame scale and rotation; `t` is local to the clip here.
fn motion_filters(kind: AnimationKind, duration: f64) -> Vec<String> {
    let motion = kind.motion();
    let mut filters = Vec::new();
    if !motion.rotation_deg.is_constant(0.0) {
        filters.push(format!(
            "rotate=a='({})*PI/180':ow='hypot(iw,ih)':oh=ow:c=none",
            motion.rotation_deg.expression("t", duration)
        ));
    }
    if !motion.scale.is_constant(1.0) {
        filters.push(scale_expr(&motion.scale.expression("t", duration)));
    }
    filters
}

/// Scale by a time expression, keeping dimensions even.
fn scale_expr(factor: &str) -> String {
    format!(
        "scale=w='trunc(iw*({f})/2)*2':h='trunc(ih*({f})/2)*2':eval=frame",
        f = factor
    )
}

/// Overlay onto the running canvas; `t` is global here, so pans are shifted by the clip start.
fn overlay_chain(index: usize, clip: &Clip) -> String {
    let local_t = format!("t-{:.3}", clip.start);
    let (x, y) = match clip.kind.motion().pan {
        Some((x, y)) => (
            x.expression(&local_t, clip.duration),
            y.expression(&local_t, clip.duration),
        ),
        None => (
            "(main_w-overlay_w)/2".to_string(),
            "(main_h-overlay_h)/2".to_string(),
        ),
    };

    format!(
        "[base{i}][c{i}]overlay=x='{x}':y='{y}':eval=frame:eof_action=pass:enable='between(t,{start:.3},{end:.3})'[base{next}]",
        i = index,
        x = x,
        y = y,
        start = clip.start,
        end = clip.end(),
        next = index + 1
    )
}
