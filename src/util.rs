use chrono::Utc;

/// Formatted time of the present moment, used in startup logs.
pub fn time_str() -> String {
    Utc::now().to_rfc2822()
}

/// Whether an answer to a yes/no prompt counts as a yes.
pub fn yes(answer: &str) -> bool {
    matches!(answer, "yes" | "true" | "1")
}

/// Plural suffix for a count.
pub fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

/// Greedy word wrap.  Words longer than `width` get a line of their own.
pub fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut line = String::new();
    for word in text.split_whitespace() {
        if line.is_empty() {
            line.push_str(word);
        } else if line.chars().count() + 1 + word.chars().count() <= width {
            line.push(' ');
            line.push_str(word);
        } else {
            out.push(std::mem::take(&mut line));
            line.push_str(word);
        }
    }
    if !line.is_empty() {
        out.push(line);
    }
    out
}

/// The first `length` characters of `text` with newlines flattened,
/// followed by an ellipsis when something was cut.
pub fn preview(text: &str, length: usize) -> String {
    let flat = text.replace('\n', " ");
    if flat.chars().count() > length {
        let cut: String = flat.chars().take(length).collect();
        format!("{}...", cut)
    } else {
        flat
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_fills_to_width() {
        let lines = wrap("aa bb cc dd", 5);
        assert_eq!(lines, vec!["aa bb", "cc dd"]);
    }

    #[test]
    fn wrap_gives_long_words_their_own_line() {
        let lines = wrap("a verylongword b", 6);
        assert_eq!(lines, vec!["a", "verylongword", "b"]);
    }

    #[test]
    fn wrap_of_blank_text_is_empty() {
        assert!(wrap("   ", 10).is_empty());
    }

    #[test]
    fn preview_truncates_and_flattens() {
        assert_eq!(preview("one\ntwo", 70), "one two");
        assert_eq!(preview("abcdef", 4), "abcd...");
        assert_eq!(preview("abcd", 4), "abcd");
    }

    #[test]
    fn yes_accepts_the_three_affirmatives() {
        assert!(yes("yes") && yes("true") && yes("1"));
        assert!(!yes("y") && !yes("YES") && !yes(""));
    }
}
