//! Greedy token-bounded line packing.

use super::{Chunk, TokenCounter};

/// Pack the lines of `text` into chunks of at most `budget` tokens.
///
/// A line costs its own token count plus the token count of a newline.
/// Lines are never split, so a single line over budget becomes a chunk on
/// its own. Chunk line ranges start at `start_line` and are contiguous.
/// Blank or whitespace-only input yields no chunks.
pub fn split(text: &str, start_line: usize, budget: usize, counter: &dyn TokenCounter) -> Vec<Chunk> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let newline_cost = counter.count("\n");

    let mut chunks = Vec::new();
    let mut buffer: Vec<&str> = Vec::new();
    let mut buffer_tokens = 0;
    let mut chunk_start = start_line;

    for line in text.split('\n') {
        let line_tokens = counter.count(line) + newline_cost;

        if buffer_tokens + line_tokens > budget && !buffer.is_empty() {
            chunks.push(flush(&buffer, chunk_start));
            chunk_start += buffer.len();
            buffer.clear();
            buffer_tokens = 0;
        }

        buffer.push(line);
        buffer_tokens += line_tokens;
    }

    if !buffer.is_empty() {
        chunks.push(flush(&buffer, chunk_start));
    }

    chunks
}

fn flush(lines: &[&str], start_line: usize) -> Chunk {
    Chunk::new(lines.join("\n"), start_line, start_line + lines.len() - 1)
}
