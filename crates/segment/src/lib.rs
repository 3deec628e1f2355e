//! Reasoning/answer segmentation of a streamed text.
//!
//! Models that emit their chain of thought inline wrap it in a marker pair
//! (`<think> … </think>` by default) and the marker can land anywhere
//! relative to chunk boundaries, including split across several fragments.
//! The [`Segmenter`] classifies an append-only fragment stream into the two
//! phases without ever re-ordering or altering the underlying text.
//!
//! The machine is pure: no I/O, no clocks. Output is a function of the exact
//! input fragment sequence. Re-chunking the same text may move *when*
//! emissions happen but never changes the concatenated reasoning or answer.

use cb_domain::config::SegmentationConfig;
use cb_domain::trace::TraceEvent;

/// Which sub-stream a piece of emitted text belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Reasoning,
    Answer,
}

/// One classified piece of output text.
pub type Emission = (Phase, String);

/// Result of draining the segmenter at end of stream.
#[derive(Debug)]
pub struct FinishReport {
    /// Trailing buffered text, flushed as reasoning.
    pub emissions: Vec<Emission>,
    /// True when segmentation was enabled and the closing marker never
    /// appeared: the entire output was classified as reasoning and the
    /// caller should surface the degradation rather than merge silently.
    pub marker_absent: bool,
}

/// Incremental classifier for one streamed generation. Single use: feed
/// fragments in arrival order, then call [`Segmenter::finish`] exactly once.
pub struct Segmenter {
    enabled: bool,
    marker: String,
    open_marker: String,
    warmup_fragments: usize,
    /// Non-empty proper prefixes of `marker`, longest first. A buffer suffix
    /// matching one of these might be the start of a split marker and is
    /// withheld until more text arrives.
    prefixes: Vec<String>,
    phase: Phase,
    buffer: String,
    fragments_seen: usize,
    open_checked: bool,
}

impl Segmenter {
    pub fn new(cfg: &SegmentationConfig) -> Self {
        // Char-boundary-safe prefix table; markers are not assumed ASCII.
        let mut prefixes: Vec<String> = cfg
            .marker
            .char_indices()
            .skip(1)
            .map(|(i, _)| cfg.marker[..i].to_string())
            .collect();
        prefixes.reverse();

        Self {
            enabled: cfg.enabled && !cfg.marker.is_empty(),
            marker: cfg.marker.clone(),
            open_marker: cfg.open_marker.clone(),
            warmup_fragments: cfg.warmup_fragments,
            prefixes,
            phase: Phase::Reasoning,
            buffer: String::new(),
            fragments_seen: 0,
            open_checked: false,
        }
    }

    /// Current phase. Transitions to [`Phase::Answer`] permanently once the
    /// closing marker has been consumed.
    pub fn phase(&self) -> Phase {
        if self.enabled {
            self.phase
        } else {
            Phase::Answer
        }
    }

    /// Classify one incoming fragment, producing zero or more emissions.
    pub fn feed(&mut self, fragment: &str) -> Vec<Emission> {
        if fragment.is_empty() {
            return Vec::new();
        }

        // Disabled, or already past the marker: pass through verbatim.
        if !self.enabled || self.phase == Phase::Answer {
            return vec![(Phase::Answer, fragment.to_string())];
        }

        self.buffer.push_str(fragment);
        self.fragments_seen += 1;

        // Warm-up: very short leading fragments are accumulated and
        // evaluated together so a marker prefix spread over them cannot
        // cause a premature split.
        if self.fragments_seen <= self.warmup_fragments {
            return Vec::new();
        }

        self.drain()
    }

    /// Flush any withheld text and report whether the marker ever appeared.
    pub fn finish(&mut self) -> FinishReport {
        let mut emissions = Vec::new();

        // The stream may end while warm-up is still accumulating, with the
        // full marker sitting unexamined in the buffer. Run one regular
        // drain before flushing so the split still happens.
        if self.enabled && self.phase == Phase::Reasoning && !self.buffer.is_empty() {
            emissions.extend(self.drain());
        }

        let marker_absent = self.enabled && self.phase == Phase::Reasoning;

        if !self.buffer.is_empty() {
            // Whatever is still held back can no longer become a marker.
            emissions.push((Phase::Reasoning, std::mem::take(&mut self.buffer)));
        }

        if marker_absent {
            let reasoning_chars: usize = emissions.iter().map(|(_, t)| t.len()).sum();
            TraceEvent::MarkerAbsent { reasoning_chars }.emit();
        }

        FinishReport {
            emissions,
            marker_absent,
        }
    }

    /// Drain the reasoning buffer: strip the opening tag once, split on the
    /// closing marker if present, otherwise withhold a possible marker
    /// prefix and emit the rest.
    fn drain(&mut self) -> Vec<Emission> {
        let mut out = Vec::new();

        if !self.open_checked {
            if let Some(rest) = self.buffer.strip_prefix(&self.open_marker) {
                self.buffer = rest.to_string();
                self.open_checked = true;
            } else if self.open_marker.starts_with(self.buffer.as_str()) {
                // The whole buffer could still turn out to be the opening
                // tag; withhold it until more text arrives.
                return out;
            } else {
                self.open_checked = true;
            }
        }

        if let Some(idx) = self.buffer.find(&self.marker) {
            // Split at the first occurrence; the marker itself is consumed
            // and never re-detected.
            let before = self.buffer[..idx].to_string();
            let after = self.buffer[idx + self.marker.len()..].to_string();
            if !before.is_empty() {
                out.push((Phase::Reasoning, before));
            }
            if !after.is_empty() {
                out.push((Phase::Answer, after));
            }
            self.buffer.clear();
            self.phase = Phase::Answer;
            TraceEvent::PhaseTransition {
                fragments_seen: self.fragments_seen,
            }
            .emit();
            return out;
        }

        for prefix in &self.prefixes {
            if self.buffer.ends_with(prefix.as_str()) {
                tracing::debug!(prefix = %prefix, "withholding possible marker prefix");
                let keep_from = self.buffer.len() - prefix.len();
                let emit = self.buffer[..keep_from].to_string();
                if !emit.is_empty() {
                    out.push((Phase::Reasoning, emit));
                }
                self.buffer.drain(..keep_from);
                return out;
            }
        }

        if !self.buffer.is_empty() {
            out.push((Phase::Reasoning, std::mem::take(&mut self.buffer)));
        }
        out
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(warmup: usize) -> SegmentationConfig {
        SegmentationConfig {
            enabled: true,
            marker: "</think>".into(),
            open_marker: "<think>".into(),
            warmup_fragments: warmup,
        }
    }

    /// Feed all fragments plus finish, returning the concatenated reasoning
    /// and answer streams.
    fn run(cfg: &SegmentationConfig, fragments: &[&str]) -> (String, String, bool) {
        let mut seg = Segmenter::new(cfg);
        let mut reasoning = String::new();
        let mut answer = String::new();
        let mut push = |emissions: Vec<Emission>, r: &mut String, a: &mut String| {
            for (phase, text) in emissions {
                match phase {
                    Phase::Reasoning => r.push_str(&text),
                    Phase::Answer => a.push_str(&text),
                }
            }
        };
        for f in fragments {
            push(seg.feed(f), &mut reasoning, &mut answer);
        }
        let report = seg.finish();
        push(report.emissions, &mut reasoning, &mut answer);
        (reasoning, answer, report.marker_absent)
    }

    #[test]
    fn whole_marker_in_one_fragment() {
        let (r, a, absent) = run(&cfg(0), &["plan</think>result"]);
        assert_eq!(r, "plan");
        assert_eq!(a, "result");
        assert!(!absent);
    }

    #[test]
    fn marker_split_at_chunk_boundary() {
        let (r, a, _) = run(&cfg(0), &["plan</thi", "nk>result"]);
        assert_eq!(r, "plan");
        assert_eq!(a, "result");
    }

    #[test]
    fn every_two_way_split_preserves_both_streams() {
        let text = "alpha beta</think>gamma delta";
        for cut in 1..text.len() {
            if !text.is_char_boundary(cut) {
                continue;
            }
            let (r, a, absent) = run(&cfg(0), &[&text[..cut], &text[cut..]]);
            assert_eq!(r, "alpha beta", "cut at {cut}");
            assert_eq!(a, "gamma delta", "cut at {cut}");
            assert!(!absent);
        }
    }

    #[test]
    fn every_three_way_split_preserves_both_streams() {
        let text = "a</think>b!";
        for first in 1..text.len() {
            for second in first + 1..text.len() {
                let fragments = [&text[..first], &text[first..second], &text[second..]];
                let (r, a, _) = run(&cfg(0), &fragments);
                assert_eq!(r, "a", "cuts at {first},{second}");
                assert_eq!(a, "b!", "cuts at {first},{second}");
            }
        }
    }

    #[test]
    fn marker_never_appears() {
        let (r, a, absent) = run(&cfg(0), &["just ", "thinking ", "out loud"]);
        assert_eq!(r, "just thinking out loud");
        assert_eq!(a, "");
        assert!(absent);
    }

    #[test]
    fn lone_prefix_is_flushed_at_finish() {
        // A trailing "</th" could still have become a marker; finish()
        // releases it as reasoning.
        let (r, a, absent) = run(&cfg(0), &["half a marker </th"]);
        assert_eq!(r, "half a marker </th");
        assert_eq!(a, "");
        assert!(absent);
    }

    #[test]
    fn empty_fragments_are_noops() {
        let mut seg = Segmenter::new(&cfg(0));
        assert!(seg.feed("").is_empty());
        let (r, a, _) = run(&cfg(0), &["", "x</think>", "", "y"]);
        assert_eq!(r, "x");
        assert_eq!(a, "y");
    }

    #[test]
    fn disabled_segmentation_passes_everything_as_answer() {
        let c = SegmentationConfig {
            enabled: false,
            ..cfg(0)
        };
        let mut seg = Segmenter::new(&c);
        assert_eq!(
            seg.feed("contains </think> literally"),
            vec![(Phase::Answer, "contains </think> literally".to_string())]
        );
        let report = seg.finish();
        assert!(report.emissions.is_empty());
        assert!(!report.marker_absent);
    }

    #[test]
    fn warmup_buffers_leading_fragments() {
        let mut seg = Segmenter::new(&cfg(3));
        assert!(seg.feed("a").is_empty());
        assert!(seg.feed("b").is_empty());
        assert!(seg.feed("c").is_empty());
        // Fourth fragment is past the window; the whole buffer drains.
        let out = seg.feed("d");
        assert_eq!(out, vec![(Phase::Reasoning, "abcd".to_string())]);
    }

    #[test]
    fn warmup_still_detects_marker_spread_over_window() {
        let (r, a, _) = run(&cfg(3), &["<", "th", "ink>x</think>", "y"]);
        assert_eq!(r, "x");
        assert_eq!(a, "y");
    }

    #[test]
    fn answer_phase_never_buffers() {
        let mut seg = Segmenter::new(&cfg(0));
        seg.feed("r</think>");
        // After the transition every fragment passes through immediately,
        // marker text included.
        assert_eq!(
            seg.feed("</think>"),
            vec![(Phase::Answer, "</think>".to_string())]
        );
        assert_eq!(seg.phase(), Phase::Answer);
    }

    #[test]
    fn opening_tag_is_stripped_once() {
        let (r, a, _) = run(&cfg(0), &["<think>inner</think>out"]);
        assert_eq!(r, "inner");
        assert_eq!(a, "out");
    }

    #[test]
    fn opening_tag_split_across_fragments_is_stripped() {
        let (r, a, absent) = run(&cfg(0), &["<th", "ink>hi</think>", "ok"]);
        assert_eq!(r, "hi");
        assert_eq!(a, "ok");
        assert!(!absent);
    }

    #[test]
    fn withheld_open_prefix_flushes_at_finish() {
        // "<th" could still have grown into the opening tag; once the
        // stream ends it is plain reasoning text.
        let (r, a, absent) = run(&cfg(0), &["<th"]);
        assert_eq!(r, "<th");
        assert_eq!(a, "");
        assert!(absent);
    }

    #[test]
    fn finish_inside_warmup_still_splits_on_marker() {
        // The whole stream fits inside the default warm-up window; the
        // marker must still be honored when the buffer drains at finish.
        let (r, a, absent) = run(
            &SegmentationConfig::default(),
            &["plan ", "done</think>", "the answer"],
        );
        assert_eq!(r, "plan done");
        assert_eq!(a, "the answer");
        assert!(!absent);
    }

    #[test]
    fn overlapping_prefix_holdback_prefers_the_longest() {
        // With a self-overlapping marker a buffer suffix can match more
        // than one prefix; withholding the longest is what keeps the
        // eventual marker intact.
        let c = SegmentationConfig {
            marker: "aaa".into(),
            ..cfg(0)
        };
        let (r, a, absent) = run(&c, &["xaa", "a done"]);
        assert_eq!(r, "x");
        assert_eq!(a, " done");
        assert!(!absent);
    }

    #[test]
    fn end_to_end_streamed_think_block() {
        let (r, a, absent) = run(
            &cfg(0),
            &["<think>", "hello ", "wor", "ld</thi", "nk>answer"],
        );
        assert_eq!(r, "hello world");
        assert_eq!(a, "answer");
        assert!(!absent);
    }

    #[test]
    fn identical_input_gives_identical_emissions() {
        let fragments = ["ab", "c</t", "hink>", "tail"];
        let collect = || {
            let mut seg = Segmenter::new(&cfg(0));
            let mut all = Vec::new();
            for f in &fragments {
                all.extend(seg.feed(f));
            }
            all.extend(seg.finish().emissions);
            all
        };
        assert_eq!(collect(), collect());
    }
}
