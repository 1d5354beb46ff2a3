//! Сегментация длинного текста
//!
//! Текст режется на фрагменты ограниченной длины по границам предложений.
//! Слова никогда не разрезаются: слишком длинное предложение делится по пробелам
//! (или между иероглифами), а одиночный токен длиннее лимита остается целым.
//! Склейка сегментов без учета пробелов всегда дает исходный текст.

use serde::Serialize;

/// Результат сегментации
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SplitResult {
    /// Количество сегментов
    pub length: usize,
    /// Сегменты в исходном порядке
    pub segments: Vec<String>,
}

impl SplitResult {
    /// Достаточно ли одного вызова движка
    pub fn is_single(&self) -> bool {
        self.length <= 1
    }
}

/// Разбить текст на сегменты длиной не более `max_chars` символов
pub fn split_text(text: &str, max_chars: usize) -> SplitResult {
    let max_chars = max_chars.max(1);
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0usize;

    for unit in sentence_units(text) {
        let unit_chars = unit.chars().count();

        if current_chars + unit_chars <= max_chars {
            current.push_str(unit);
            current_chars += unit_chars;
            continue;
        }

        flush(&mut segments, &mut current, &mut current_chars);

        if unit_chars <= max_chars {
            current.push_str(unit);
            current_chars = unit_chars;
            continue;
        }

        // Предложение длиннее лимита: режем по словам
        for piece in word_pieces(unit, max_chars) {
            let piece_chars = piece.chars().count();
            if current_chars + piece_chars > max_chars {
                flush(&mut segments, &mut current, &mut current_chars);
            }
            current.push_str(piece);
            current_chars += piece_chars;
        }
    }
    flush(&mut segments, &mut current, &mut current_chars);

    SplitResult {
        length: segments.len(),
        segments,
    }
}

fn flush(segments: &mut Vec<String>, current: &mut String, current_chars: &mut usize) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        segments.push(trimmed.to_string());
    }
    current.clear();
    *current_chars = 0;
}

fn is_sentence_end(ch: char) -> bool {
    matches!(
        ch,
        '.' | '!' | '?' | ';' | '\n' | '…' | '。' | '！' | '？' | '；'
    )
}

/// Знаки, которые завершают предложение и без последующего пробела
fn is_standalone_end(ch: char) -> bool {
    matches!(ch, '\n' | '。' | '！' | '？' | '；')
}

fn is_closing(ch: char) -> bool {
    matches!(ch, '"' | '\'' | ')' | ']' | '»' | '”' | '’' | '」' | '』' | '）')
}

/// Разбить текст на предложения, сохраняя все символы (включая пробелы)
fn sentence_units(text: &str) -> Vec<&str> {
    let mut units = Vec::new();
    let mut start = 0usize;
    let mut chars = text.char_indices().peekable();

    while let Some((idx, ch)) = chars.next() {
        if !is_sentence_end(ch) {
            continue;
        }
        let mut end = idx + ch.len_utf8();
        let mut standalone = is_standalone_end(ch);
        // Многоточия и закрывающие кавычки остаются в предложении
        while let Some(&(next_idx, next)) = chars.peek() {
            if is_sentence_end(next) || is_closing(next) {
                standalone |= is_standalone_end(next);
                end = next_idx + next.len_utf8();
                chars.next();
            } else {
                break;
            }
        }
        // "example.com", "3.14": точка внутри токена не завершает предложение
        let followed_by_space = chars.peek().map(|&(_, next)| next.is_whitespace()).unwrap_or(true);
        if !standalone && !followed_by_space {
            continue;
        }
        // Пробелы после знака препинания тоже принадлежат предложению
        while let Some(&(next_idx, next)) = chars.peek() {
            if next.is_whitespace() {
                end = next_idx + next.len_utf8();
                chars.next();
            } else {
                break;
            }
        }
        units.push(&text[start..end]);
        start = end;
    }
    if start < text.len() {
        units.push(&text[start..]);
    }
    units
}

fn is_cjk(ch: char) -> bool {
    matches!(ch as u32,
        0x3040..=0x30FF   // кана
        | 0x3400..=0x4DBF
        | 0x4E00..=0x9FFF
        | 0xAC00..=0xD7AF // хангыль
        | 0xF900..=0xFAFF
    )
}

/// Разбить предложение на части не длиннее лимита по допустимым точкам разрыва
fn word_pieces(unit: &str, max_chars: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0usize;
    let mut count = 0usize;
    // Последняя допустимая точка разрыва внутри текущей части (байтовый индекс, число символов до нее)
    let mut last_break: Option<(usize, usize)> = None;
    let mut prev: Option<char> = None;

    for (idx, ch) in unit.char_indices() {
        if idx > start {
            let can_break = prev.map(|p| p.is_whitespace()).unwrap_or(false)
                || (is_cjk(ch) && prev.map(is_cjk).unwrap_or(false));
            if can_break {
                last_break = Some((idx, count));
            }
        }

        if count >= max_chars {
            if let Some((break_idx, break_count)) = last_break.take() {
                pieces.push(&unit[start..break_idx]);
                start = break_idx;
                count -= break_count;
            }
            // Без точки разрыва токен остается целым и превышает лимит
        }

        count += 1;
        prev = Some(ch);
    }
    if start < unit.len() {
        pieces.push(&unit[start..]);
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    fn squash(text: &str) -> String {
        text.chars().filter(|c| !c.is_whitespace()).collect()
    }

    #[test]
    fn test_short_text_is_single_segment() {
        let result = split_text("Hello world. How are you?", 500);
        assert_eq!(result.length, 1);
        assert!(result.is_single());
        assert_eq!(result.segments[0], "Hello world. How are you?");
    }

    #[test]
    fn test_empty_text_has_no_segments() {
        let result = split_text("   \n  ", 100);
        assert_eq!(result.length, 0);
        assert!(result.segments.is_empty());
    }

    #[test]
    fn test_long_text_reconstructs() {
        let sentence = "The quick brown fox jumps over the lazy dog, again and again! ";
        let mut text = String::new();
        while text.chars().count() < 4000 {
            text.push_str(sentence);
        }
        let text: String = text.chars().take(4000).collect();

        let result = split_text(&text, 500);
        assert!(result.length >= 8, "got {} segments", result.length);
        assert_eq!(result.length, result.segments.len());
        for segment in &result.segments {
            assert!(!segment.is_empty());
            assert!(segment.chars().count() <= 500);
        }
        assert_eq!(squash(&result.segments.concat()), squash(&text));
    }

    #[test]
    fn test_splits_on_sentence_boundaries() {
        let text = "First sentence here. Second sentence here. Third one.";
        let result = split_text(text, 25);
        assert_eq!(
            result.segments,
            vec!["First sentence here.", "Second sentence here.", "Third one."]
        );
    }

    #[test]
    fn test_overlong_sentence_never_cuts_words() {
        let text = "alpha beta gamma delta epsilon zeta eta theta iota kappa lambda";
        let result = split_text(text, 12);
        let words: Vec<&str> = text.split_whitespace().collect();
        for segment in &result.segments {
            for word in segment.split_whitespace() {
                assert!(words.contains(&word), "word {:?} was cut", word);
            }
        }
        assert_eq!(squash(&result.segments.concat()), squash(text));
    }

    #[test]
    fn test_single_token_longer_than_limit_stays_whole() {
        let text = "short https://example.com/a/very/long/path/that/keeps/going tail";
        let result = split_text(text, 10);
        assert!(result
            .segments
            .iter()
            .any(|s| s == "https://example.com/a/very/long/path/that/keeps/going"));
        assert_eq!(squash(&result.segments.concat()), squash(text));
    }

    #[test]
    fn test_cjk_text_without_spaces() {
        let text = "这是一个没有标点符号而且非常非常长的中文句子用来测试分段逻辑是否正确";
        let result = split_text(text, 10);
        assert!(result.length > 1);
        for segment in &result.segments {
            assert!(segment.chars().count() <= 10);
        }
        assert_eq!(result.segments.concat(), text);
    }

    #[test]
    fn test_closing_quotes_stay_with_sentence() {
        let text = "He said \"stop.\" Then he left.";
        let result = split_text(text, 16);
        assert_eq!(result.segments[0], "He said \"stop.\"");
    }
}
