//! Keyword-lexicon emotion detection over eight categories.

use crate::models::EmotionLabel;

/// Keyword (or phrase) lists per emotion, in `EmotionLabel::ALL` order.
const EMOTION_KEYWORDS: [(EmotionLabel, &[&str]); 8] = [
    (
        EmotionLabel::Joy,
        &["happy", "excited", "amazing", "awesome", "love", "great", "wonderful", "fantastic", "delighted"],
    ),
    (
        EmotionLabel::Anger,
        &["angry", "mad", "furious", "hate", "terrible", "awful", "disgusting", "worst", "outraged"],
    ),
    (
        EmotionLabel::Fear,
        &["scared", "afraid", "worried", "anxious", "nervous", "terrified", "panic"],
    ),
    (
        EmotionLabel::Sadness,
        &["sad", "disappointed", "depressed", "upset", "crying", "heartbroken"],
    ),
    (
        EmotionLabel::Surprise,
        &["surprised", "shocked", "amazed", "unexpected", "wow", "omg", "incredible"],
    ),
    (
        EmotionLabel::Disgust,
        &["disgusting", "gross", "revolting", "sick", "nasty", "horrible"],
    ),
    (
        EmotionLabel::Trust,
        &["trust", "reliable", "confident", "believe", "faith", "dependable"],
    ),
    (
        EmotionLabel::Anticipation,
        &["excited", "looking forward", "can't wait", "anticipating", "hopeful", "soon"],
    ),
];

#[derive(Debug, Clone, Default)]
pub struct EmotionLexicon;

impl EmotionLexicon {
    /// Number of distinct keywords of each category present in `text`.
    pub fn hits(&self, text: &str) -> [(EmotionLabel, usize); 8] {
        let padded = normalize(text);
        EMOTION_KEYWORDS.map(|(label, words)| {
            let n = words
                .iter()
                .filter(|w| padded.contains(&format!(" {w} ")))
                .count();
            (label, n)
        })
    }

    /// Category with most hits; ties go to the earlier category. `None`
    /// when nothing matched.
    pub fn detect(&self, text: &str) -> Option<EmotionLabel> {
        let mut best: Option<(EmotionLabel, usize)> = None;
        for (label, n) in self.hits(text) {
            if n == 0 {
                continue;
            }
            match best {
                Some((_, m)) if m >= n => {}
                _ => best = Some((label, n)),
            }
        }
        best.map(|(label, _)| label)
    }
}

/// Lower-case, map everything except letters/digits/apostrophes to spaces,
/// and pad with a space on both ends so phrases match on word boundaries.
fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push(' ');
    let mut last_space = true;
    for ch in text.to_lowercase().replace('\u{2019}', "'").chars() {
        if ch.is_alphanumeric() || ch == '\'' {
            out.push(ch);
            last_space = false;
        } else if !last_space {
            out.push(' ');
            last_space = true;
        }
    }
    if !last_space {
        out.push(' ');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_single_category() {
        let lex = EmotionLexicon;
        assert_eq!(lex.detect("I'm so worried about this"), Some(EmotionLabel::Fear));
        assert_eq!(lex.detect("plain statement"), None);
        assert_eq!(lex.detect(""), None);
    }

    #[test]
    fn ties_resolve_in_lexicon_order() {
        // "excited" counts for both joy and anticipation
        assert_eq!(EmotionLexicon.detect("so excited"), Some(EmotionLabel::Joy));
    }

    #[test]
    fn phrases_match_on_word_boundaries() {
        let lex = EmotionLexicon;
        assert_eq!(
            lex.detect("Can't wait, looking forward to it!"),
            Some(EmotionLabel::Anticipation)
        );
        // "sickle" must not count as "sick"
        assert_eq!(lex.detect("a sickle"), None);
    }
}
