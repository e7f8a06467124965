//! FFmpeg filter graph construction for slideshows.
//!
//! Every input is normalized first (scaled to the target height, resampled to
//! the target frame rate, converted to a common pixel format) and labelled
//! `[v{i}]`. The normalized streams are then either chained through `xfade`
//! filters or joined with a single `concat`.

use slidecast_models::ConversionConfig;

/// A complete `-filter_complex` value and the label to map into the output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlideshowGraph {
    pub filter: String,
    pub output_label: String,
}

/// Normalization chain for input `index`, labelled `[v{index}]`.
///
/// `scale=-2:H` keeps the aspect ratio with an even width, as libx264
/// requires.
pub fn normalize_filter(index: usize, resolution: u32, fps: u32, pixel_format: &str) -> String {
    format!(
        "[{index}:v]scale=-2:{resolution},fps={fps},format={pixel_format}[v{index}]"
    )
}

/// Start time of the `k`-th cross-fade (1-based).
///
/// Each fade overlaps the tail of the running composite by one transition
/// length, so fade `k` starts at `k * (duration - transition)`.
pub fn xfade_offset(k: usize, duration: f64, transition: f64) -> f64 {
    k as f64 * (duration - transition)
}

/// One `xfade` step blending `left` into `right`, writing `out`.
pub fn xfade_filter(left: &str, right: &str, out: &str, transition: f64, offset: f64) -> String {
    format!(
        "[{left}][{right}]xfade=transition=fade:duration={transition:.4}:offset={offset:.4}[{out}]"
    )
}

/// Concatenation of the normalized streams `[v0]..[v{count-1}]` into `out`.
pub fn concat_filter(count: usize, out: &str) -> String {
    let inputs: String = (0..count).map(|i| format!("[v{i}]")).collect();
    format!("{inputs}concat=n={count}:v=1:a=0[{out}]")
}

/// Build the full graph for `count` slides.
///
/// Callers never pass zero slides; a zero count yields an empty graph.
pub fn build_slideshow_graph(
    count: usize,
    config: &ConversionConfig,
    pixel_format: &str,
) -> SlideshowGraph {
    let mut parts: Vec<String> = (0..count)
        .map(|i| normalize_filter(i, config.resolution(), config.fps(), pixel_format))
        .collect();

    let output_label = if count <= 1 {
        "v0".to_string()
    } else if config.has_transition() {
        let duration = f64::from(config.duration());
        let transition = config.transition_duration();
        let mut last = "v0".to_string();
        for k in 1..count {
            let out = format!("x{k}");
            parts.push(xfade_filter(
                &last,
                &format!("v{k}"),
                &out,
                transition,
                xfade_offset(k, duration, transition),
            ));
            last = out;
        }
        last
    } else {
        parts.push(concat_filter(count, "out"));
        "out".to_string()
    };

    SlideshowGraph {
        filter: parts.join(";"),
        output_label: format!("[{output_label}]"),
    }
}
