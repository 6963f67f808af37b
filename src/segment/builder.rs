//! Segment boundary construction
//!
//! Turns a video's full transcript window sequence and frame caption sequence
//! into an ordered, gapless, non-overlapping sequence of segments. Boundaries
//! come from transcript-window edges; windows coarser than the configured
//! maximum are re-split at fixed intervals so no single segment grows
//! unboundedly.

use crate::config::SegmentationConfig;
use crate::error::{Result, VideoRagError};
use crate::segment::{FrameCaption, Segment, TranscriptWindow};

/// Builds canonical segments from raw transcript and caption inputs
pub struct SegmentBuilder {
    config: SegmentationConfig,
}

impl SegmentBuilder {
    /// Create a builder with the given segmentation settings
    pub fn new(config: SegmentationConfig) -> Self {
        Self { config }
    }

    /// Create a builder with default settings
    pub fn with_default_config() -> Self {
        Self::new(SegmentationConfig::default())
    }

    /// Build the segment sequence for one video.
    ///
    /// Invariants on the output: segments are ordered by `start`, contiguous,
    /// non-overlapping, cover `[0, duration)` entirely, and every id is a
    /// deterministic function of `(video_id, start, end)`.
    ///
    /// Zero total input (no transcript text and no captions) is fatal for the
    /// video and yields [`VideoRagError::EmptyIngestion`]. An empty transcript
    /// with captions present produces caption-only segments.
    pub fn build(
        &self,
        video_id: &str,
        duration: f64,
        windows: &[TranscriptWindow],
        captions: &[FrameCaption],
    ) -> Result<Vec<Segment>> {
        let has_transcript = windows.iter().any(|w| !w.text.trim().is_empty());
        if !has_transcript && captions.is_empty() {
            return Err(VideoRagError::EmptyIngestion(format!(
                "video {} has no transcript and no captions",
                video_id
            )));
        }

        // Coverage must extend to the furthest transcript edge, even when the
        // reported duration falls short of it. Captions never grow the span;
        // one past the end clamps into the last segment.
        let mut span = duration;
        for w in windows {
            span = span.max(w.end);
        }
        if span <= 0.0 {
            return Err(VideoRagError::InvalidInput(format!(
                "video {} has non-positive duration {}",
                video_id, duration
            )));
        }

        let boundaries = self.boundaries(span, windows);
        let mut segments = self.empty_segments(video_id, &boundaries);
        self.merge_transcripts(&mut segments, windows);
        self.merge_captions(&mut segments, captions);

        log::info!(
            "Built {} segments covering [0, {:.3}) for video {}",
            segments.len(),
            span,
            video_id
        );
        Ok(segments)
    }

    /// Compute the ordered boundary list `[0, ..., span]`.
    ///
    /// Window edges are used directly; any interval longer than the configured
    /// maximum is subdivided at `segment_interval`. With no usable windows the
    /// whole span is cut at fixed intervals.
    fn boundaries(&self, span: f64, windows: &[TranscriptWindow]) -> Vec<f64> {
        let mut edges: Vec<f64> = vec![0.0];

        let mut sorted: Vec<&TranscriptWindow> = windows.iter().filter(|w| w.end > w.start).collect();
        sorted.sort_by(|a, b| a.start.total_cmp(&b.start));

        for window in sorted {
            let start = window.start.clamp(0.0, span);
            let end = window.end.clamp(0.0, span);
            push_edge(&mut edges, start);
            push_edge(&mut edges, end);
        }
        push_edge(&mut edges, span);

        // Subdivide intervals that are coarser than the configured maximum.
        let mut refined = vec![edges[0]];
        for pair in edges.windows(2) {
            let (lo, hi) = (pair[0], pair[1]);
            if hi - lo > self.config.max_window_seconds {
                let mut cut = lo + self.config.segment_interval;
                while cut < hi - EDGE_EPSILON {
                    refined.push(cut);
                    cut += self.config.segment_interval;
                }
            }
            refined.push(hi);
        }
        refined
    }

    fn empty_segments(&self, video_id: &str, boundaries: &[f64]) -> Vec<Segment> {
        boundaries
            .windows(2)
            .filter(|pair| pair[1] - pair[0] > EDGE_EPSILON)
            .map(|pair| Segment {
                segment_id: Segment::make_id(video_id, pair[0], pair[1]),
                video_id: video_id.to_string(),
                start: pair[0],
                end: pair[1],
                transcript: String::new(),
                captions: Vec::new(),
                chunk_embedding_ids: Vec::new(),
            })
            .collect()
    }

    /// Concatenate window text into the owning segments in time order.
    ///
    /// A window that was subdivided contributes its full text to the first
    /// segment it overlaps; the remaining sub-segments keep an empty
    /// transcript and rely on their captions.
    fn merge_transcripts(&self, segments: &mut [Segment], windows: &[TranscriptWindow]) {
        let mut sorted: Vec<&TranscriptWindow> = windows
            .iter()
            .filter(|w| !w.text.trim().is_empty())
            .collect();
        sorted.sort_by(|a, b| a.start.total_cmp(&b.start));

        for window in sorted {
            let ts = window.start.max(0.0);
            if let Some(segment) = find_owner_mut(segments, ts) {
                if !segment.transcript.is_empty() {
                    segment.transcript.push(' ');
                }
                segment.transcript.push_str(window.text.trim());
            }
        }
    }

    /// Attach each caption to the segment containing its timestamp; captions
    /// outside all segments clamp to the nearest bounding segment.
    fn merge_captions(&self, segments: &mut [Segment], captions: &[FrameCaption]) {
        let mut sorted: Vec<&FrameCaption> = captions.iter().collect();
        sorted.sort_by(|a, b| a.frame_ts.total_cmp(&b.frame_ts));

        for caption in sorted {
            let index = match segments.iter().position(|s| s.contains(caption.frame_ts)) {
                Some(i) => i,
                None if caption.frame_ts < segments[0].start => 0,
                None => segments.len() - 1,
            };
            segments[index].captions.push((*caption).clone());
        }
    }
}

const EDGE_EPSILON: f64 = 1e-6;

fn push_edge(edges: &mut Vec<f64>, value: f64) {
    if edges.iter().all(|e| (e - value).abs() > EDGE_EPSILON) && value > 0.0 {
        edges.push(value);
        edges.sort_by(|a, b| a.total_cmp(b));
    }
}

fn find_owner_mut(segments: &mut [Segment], ts: f64) -> Option<&mut Segment> {
    segments.iter_mut().find(|s| s.contains(ts))
}
