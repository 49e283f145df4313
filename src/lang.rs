use std::fmt;

/// Languages the assistant answers in. Everything that is not Bangla is
/// handled as English.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lang {
    #[default]
    En,
    Bn,
}

impl Lang {
    /// ISO 639-1 code, as expected by the translation endpoint.
    pub fn code(self) -> &'static str {
        match self {
            Lang::En => "en",
            Lang::Bn => "bn",
        }
    }

    pub fn not_found_message(self) -> &'static str {
        match self {
            Lang::Bn => "দুঃখিত, আমি আপনার প্রশ্নের উত্তর খুঁজে পাইনি।",
            Lang::En => "Sorry, I couldn't find the answer.",
        }
    }
}

impl fmt::Display for Lang {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Detects the query language from its script.
///
/// Bangla wins when most alphabetic characters fall in the Bengali block, so
/// a Bangla question with a Latin brand name ("Napa কী?") still counts as Bangla.
pub fn detect(text: &str) -> Lang {
    let (bengali, other) = text
        .chars()
        .filter(|c| c.is_alphabetic() || is_bengali(*c))
        .fold((0usize, 0usize), |(b, o), c| {
            if is_bengali(c) { (b + 1, o) } else { (b, o + 1) }
        });

    if bengali > 0 && bengali >= other {
        Lang::Bn
    } else {
        Lang::En
    }
}

pub fn contains_bengali(text: &str) -> bool {
    text.chars().any(is_bengali)
}

fn is_bengali(c: char) -> bool {
    matches!(c, '\u{0980}'..='\u{09FF}')
}
