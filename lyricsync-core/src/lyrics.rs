//! Lyric lines and normalization of the two response shapes.

/// A single lyric line scheduled at an offset into the track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LyricLine {
    /// Offset from the start of the track in milliseconds
    pub offset_ms: u64,
    /// Line text
    pub text: String,
}

impl LyricLine {
    pub fn new(offset_ms: u64, text: impl Into<String>) -> Self {
        Self {
            offset_ms,
            text: text.into(),
        }
    }
}

/// Lyrics as returned by a provider, classified once when the response is
/// parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LyricsPayload {
    /// Lines carrying service-provided absolute offsets
    Timed(Vec<LyricLine>),
    /// Lines without offsets, in display order
    Untimed(Vec<String>),
    /// The track has no lyrics
    Empty,
}

impl LyricsPayload {
    #[must_use]
    pub const fn is_timed(&self) -> bool {
        matches!(self, Self::Timed(_))
    }

    /// Normalize into the lines still to be emitted, ascending by offset.
    ///
    /// Timed lines at or before `progress_ms` are dropped since the listener
    /// is already past them. Untimed lines are all kept and spread evenly
    /// across `duration_ms` from the start of the track.
    #[must_use]
    pub fn into_lines(self, progress_ms: u64, duration_ms: u64) -> Vec<LyricLine> {
        match self {
            Self::Timed(lines) => {
                let mut upcoming: Vec<LyricLine> = lines
                    .into_iter()
                    .filter(|line| line.offset_ms > progress_ms)
                    .collect();
                upcoming.sort_by_key(|line| line.offset_ms);
                upcoming
            }
            Self::Untimed(lines) => synthesize_offsets(duration_ms, lines.len())
                .zip(lines)
                .map(|(offset_ms, text)| LyricLine { offset_ms, text })
                .collect(),
            Self::Empty => Vec::new(),
        }
    }
}

/// Evenly spaced offsets for `count` untimed lines: `round(duration / count) * i`.
pub fn synthesize_offsets(duration_ms: u64, count: usize) -> impl Iterator<Item = u64> {
    let count_u64 = u64::try_from(count).unwrap_or(u64::MAX).max(1);
    // Integer round-half-up of duration / count
    let per_line = duration_ms.saturating_add(count_u64 / 2) / count_u64;
    (0..count_u64)
        .take(count)
        .map(move |i| per_line.saturating_mul(i))
}

/// Join word tokens of a line with single spaces.
pub fn join_words<'a>(words: impl IntoIterator<Item = &'a str>) -> String {
    words.into_iter().collect::<Vec<_>>().join(" ")
}
