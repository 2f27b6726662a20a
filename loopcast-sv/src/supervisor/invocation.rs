//! Transcoder invocation builder
//!
//! Deterministically assembles the ffmpeg argument list for one media item.
//! Pure: no I/O, no process interaction, fully testable in isolation.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Fixed encoding presets
///
/// Each profile pins the video filter chain, rate-control triple, x264
/// preset, keyframe interval, and audio settings for its target surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncodingProfile {
    /// 16:9 landscape at 1280x720
    Horizontal720,
    /// 16:9 landscape at 1920x1080, frame rate forced to 30
    Horizontal1080,
    /// 9:16 portrait at 720x1280, center-cropped from the source
    Vertical,
}

impl Default for EncodingProfile {
    fn default() -> Self {
        EncodingProfile::Horizontal720
    }
}

impl EncodingProfile {
    fn video_filter(&self) -> &'static str {
        match self {
            EncodingProfile::Horizontal720 => "scale=1280:720,format=yuv420p",
            EncodingProfile::Horizontal1080 => "scale=1920:1080",
            EncodingProfile::Vertical => "crop=in_h*9/16:in_h,scale=720:1280",
        }
    }

    fn preset(&self) -> &'static str {
        match self {
            EncodingProfile::Horizontal720 => "veryfast",
            EncodingProfile::Horizontal1080 | EncodingProfile::Vertical => "superfast",
        }
    }

    fn bitrate(&self) -> &'static str {
        match self {
            EncodingProfile::Horizontal720 => "4000k",
            EncodingProfile::Horizontal1080 => "4500k",
            EncodingProfile::Vertical => "3000k",
        }
    }

    fn buffer_size(&self) -> &'static str {
        match self {
            EncodingProfile::Horizontal720 => "8000k",
            EncodingProfile::Horizontal1080 => "9000k",
            EncodingProfile::Vertical => "6000k",
        }
    }

    /// Explicit output frame rate, where the preset pins one
    fn forced_frame_rate(&self) -> Option<&'static str> {
        match self {
            EncodingProfile::Horizontal1080 => Some("30"),
            _ => None,
        }
    }

    /// Standalone pixel format flag; Horizontal720 carries it in the filter
    fn explicit_pixel_format(&self) -> Option<&'static str> {
        match self {
            EncodingProfile::Horizontal720 => None,
            _ => Some("yuv420p"),
        }
    }
}

/// Destination endpoint: base URL plus secret key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub base: String,
    pub key: String,
}

impl Endpoint {
    /// Full destination URL: base and key concatenated exactly once, with
    /// no separator added or removed
    pub fn url(&self) -> String {
        format!("{}{}", self.base, self.key)
    }
}

/// Build the ordered transcoder argument list for one item
///
/// `loop_input` adds the indefinite input loop (single-file mode only);
/// folder mode streams each item once and advances.
pub fn build(
    item: &Path,
    profile: EncodingProfile,
    endpoint: &Endpoint,
    loop_input: bool,
) -> Vec<String> {
    let mut args: Vec<String> = Vec::with_capacity(32);

    // Read input at its native frame rate
    args.push("-re".into());
    if loop_input {
        args.push("-stream_loop".into());
        args.push("-1".into());
    }
    args.push("-i".into());
    args.push(item.to_string_lossy().into_owned());

    args.push("-vf".into());
    args.push(profile.video_filter().into());

    args.push("-c:v".into());
    args.push("libx264".into());
    args.push("-preset".into());
    args.push(profile.preset().into());
    args.push("-b:v".into());
    args.push(profile.bitrate().into());
    args.push("-maxrate".into());
    args.push(profile.bitrate().into());
    args.push("-bufsize".into());
    args.push(profile.buffer_size().into());

    if let Some(rate) = profile.forced_frame_rate() {
        args.push("-r".into());
        args.push(rate.into());
    }
    if let Some(pix_fmt) = profile.explicit_pixel_format() {
        args.push("-pix_fmt".into());
        args.push(pix_fmt.into());
    }

    // Keyframe interval
    args.push("-g".into());
    args.push("60".into());

    args.push("-c:a".into());
    args.push("aac".into());
    args.push("-b:a".into());
    args.push("128k".into());
    args.push("-ar".into());
    args.push("44100".into());

    args.push("-f".into());
    args.push("flv".into());
    args.push(endpoint.url());

    args
}
