use anyhow::Result;

/// Separators tried in order, coarsest first. The empty separator splits
/// into single characters and always applies.
const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Recursive character splitter.
///
/// Text is split on the coarsest separator it contains; pieces that are
/// still too long are split again with the next separator. Neighbouring
/// pieces are then merged back into chunks of at most `chunk_size`
/// characters, each chunk repeating up to `chunk_overlap` characters from
/// the end of the previous one.
#[derive(Debug, Clone, Copy)]
pub struct RecursiveSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl RecursiveSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        anyhow::ensure!(chunk_size > 0, "chunk size must be greater than zero");
        anyhow::ensure!(
            chunk_overlap < chunk_size,
            "chunk overlap ({}) must be smaller than chunk size ({})",
            chunk_overlap,
            chunk_size
        );
        Ok(Self { chunk_size, chunk_overlap })
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        self.split_with(text, &DEFAULT_SEPARATORS)
    }

    fn split_with(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let (separator, finer) = pick_separator(text, separators);

        let pieces: Vec<String> = if separator.is_empty() {
            text.chars().map(String::from).collect()
        } else {
            text.split(separator)
                .filter(|piece| !piece.is_empty())
                .map(str::to_string)
                .collect()
        };

        let mut chunks = Vec::new();
        let mut short_pieces: Vec<String> = Vec::new();

        for piece in pieces {
            if char_len(&piece) < self.chunk_size {
                short_pieces.push(piece);
                continue;
            }

            if !short_pieces.is_empty() {
                chunks.extend(self.merge(&short_pieces, separator));
                short_pieces.clear();
            }

            if finer.is_empty() {
                let trimmed = piece.trim();
                if !trimmed.is_empty() {
                    chunks.push(trimmed.to_string());
                }
            } else {
                chunks.extend(self.split_with(&piece, finer));
            }
        }

        if !short_pieces.is_empty() {
            chunks.extend(self.merge(&short_pieces, separator));
        }

        chunks
    }

    /// Greedily join pieces (each shorter than `chunk_size`) into chunks,
    /// keeping a tail of at most `chunk_overlap` characters between chunks.
    fn merge(&self, pieces: &[String], separator: &str) -> Vec<String> {
        let sep_len = char_len(separator);
        let mut chunks = Vec::new();
        let mut window: Vec<&str> = Vec::new();
        let mut window_len = 0usize;

        for piece in pieces {
            let piece_len = char_len(piece);

            if !window.is_empty() && joined_len(window_len, piece_len, &window, sep_len) > self.chunk_size {
                push_trimmed(&mut chunks, &window.join(separator));

                while window_len > self.chunk_overlap
                    || (window_len > 0 && joined_len(window_len, piece_len, &window, sep_len) > self.chunk_size)
                {
                    let removed = window.remove(0);
                    let removed_sep = if window.is_empty() { 0 } else { sep_len };
                    window_len = window_len.saturating_sub(char_len(removed) + removed_sep);
                }
            }

            if !window.is_empty() {
                window_len += sep_len;
            }
            window.push(piece);
            window_len += piece_len;
        }

        if !window.is_empty() {
            push_trimmed(&mut chunks, &window.join(separator));
        }

        chunks
    }
}

fn pick_separator<'a, 'b>(text: &str, separators: &'b [&'a str]) -> (&'a str, &'b [&'a str]) {
    for (i, &separator) in separators.iter().enumerate() {
        if separator.is_empty() {
            return (separator, &[]);
        }
        if text.contains(separator) {
            return (separator, &separators[i + 1..]);
        }
    }
    ("", &[])
}

/// Length of the window once `piece` is appended to it.
fn joined_len(window_len: usize, piece_len: usize, window: &[&str], sep_len: usize) -> usize {
    window_len + piece_len + if window.is_empty() { 0 } else { sep_len }
}

fn push_trimmed(chunks: &mut Vec<String>, text: &str) {
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn splitter(size: usize, overlap: usize) -> RecursiveSplitter {
        RecursiveSplitter::new(size, overlap).unwrap()
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = splitter(100, 10).split("short");
        assert_eq!(chunks, vec!["short".to_string()]);
    }

    #[test]
    fn test_empty_text() {
        assert!(splitter(100, 10).split("").is_empty());
        assert!(splitter(100, 10).split("   \n\n  ").is_empty());
    }

    #[test]
    fn test_invalid_overlap_rejected() {
        assert!(RecursiveSplitter::new(10, 10).is_err());
        assert!(RecursiveSplitter::new(0, 0).is_err());
    }

    #[test]
    fn test_prefers_paragraph_boundaries() {
        let text = "First paragraph about pumps.\n\nSecond paragraph about valves.";
        let chunks = splitter(40, 0).split(text);
        assert_eq!(
            chunks,
            vec![
                "First paragraph about pumps.".to_string(),
                "Second paragraph about valves.".to_string(),
            ]
        );
    }

    #[test]
    fn test_chunks_respect_size_limit() {
        let text = "lorem ipsum dolor sit amet ".repeat(200);
        let chunks = splitter(500, 100).split(&text);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 500, "chunk too long: {}", chunk.len());
        }
    }

    #[test]
    fn test_consecutive_chunks_overlap() {
        let text = (0..60).map(|i| format!("w{:02}", i)).collect::<Vec<_>>().join(" ");
        let chunks = splitter(40, 12).split(&text);
        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            let last_word = pair[0].split(' ').last().unwrap();
            assert!(
                pair[1].contains(last_word),
                "expected '{}' to carry over into '{}'",
                last_word,
                pair[1]
            );
        }
    }

    #[test]
    fn test_no_overlap_keeps_all_words_once() {
        let text = (0..50).map(|i| format!("t{}", i)).collect::<Vec<_>>().join(" ");
        let chunks = splitter(30, 0).split(&text);
        let rejoined = chunks.join(" ");
        assert_eq!(rejoined, text);
    }

    #[test]
    fn test_unbroken_text_falls_back_to_characters() {
        let text = "x".repeat(25);
        let chunks = splitter(10, 0).split(&text);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 10);
        assert_eq!(chunks[2].len(), 5);
    }

    #[test]
    fn test_japanese_text_chunking() {
        let text = "これはテスト文章です。日本語のマルチバイト文字を含むテキストを正しくチャンクに分割できるかテストします。句読点で分割されることを確認します。";
        let chunks = splitter(20, 5).split(text);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(!chunk.is_empty());
            assert!(chunk.chars().count() <= 20);
        }
    }

    #[test]
    fn test_mixed_text_chunking() {
        let text = "AI Security Conference 2026 event report.\nParticipants discussed the latest techniques.\nOver 100 people attended.";
        let chunks = splitter(50, 10).split(text);
        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert!(!chunk.is_empty());
            assert!(chunk.chars().count() <= 50);
        }
    }
}
