/// Sentence-ending punctuation considered when choosing a cut point
const SENTENCE_ENDINGS: &[char] = &['.', '!', '?', '。', '！', '？'];

/// Character span `[start, end)` inside the original text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextSpan {
    /// Start offset in characters
    pub start: usize,

    /// End offset in characters (exclusive)
    pub end: usize,
}

impl TextSpan {
    /// Span length in characters
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Whether the span is empty
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Split text into overlapping windows of at most `chunk_size` characters
///
/// Before cutting, the last `lookback` characters of a window are scanned
/// backward for sentence-ending punctuation; the cut moves just past it when
/// found. The next window starts `overlap` characters before the cut, but
/// always at least one character after the previous start. Spans are in
/// characters, start offsets strictly increase and the last span ends at the
/// text length.
pub fn split_with_overlap(
    text: &str,
    chunk_size: usize,
    overlap: usize,
    lookback: usize,
) -> Vec<TextSpan> {
    let chars: Vec<char> = text.chars().collect();
    let text_len = chars.len();
    let chunk_size = chunk_size.max(1);

    if text_len == 0 {
        return Vec::new();
    }

    if text_len <= chunk_size {
        return vec![TextSpan {
            start: 0,
            end: text_len,
        }];
    }

    let mut spans = Vec::new();
    let mut start = 0;

    loop {
        let mut end = (start + chunk_size).min(text_len);
        if end < text_len {
            if let Some(cut) = find_break_point(&chars, start, end, lookback) {
                end = cut;
            }
        }

        spans.push(TextSpan { start, end });

        if end >= text_len {
            break;
        }

        // Move to next window with overlap, never backwards
        start = end.saturating_sub(overlap).max(start + 1);
    }

    spans
}

/// Find the offset just past the last sentence ending in the window tail
fn find_break_point(chars: &[char], start: usize, end: usize, lookback: usize) -> Option<usize> {
    let lower = end.saturating_sub(lookback).max(start + 1);
    (lower..end)
        .rev()
        .find(|&i| SENTENCE_ENDINGS.contains(&chars[i]))
        .map(|i| i + 1)
}
