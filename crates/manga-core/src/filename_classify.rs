use regex::Regex;
use std::sync::LazyLock;

/// `(leading tag) [author] rest`, both prefixes optional.
static HEAD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:\((?P<lead>[^)]*)\))?\s*(?:\[(?P<author>[^\]]*)\])?\s*(?P<rest>.*?)\s*$").unwrap()
});

/// One trailing `(tag)` or `[tag]` at the end of the remaining text.
static TAIL_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s*(?:\((?P<paren>[^()]*)\)|\[(?P<bracket>[^\[\]]*)\])\s*$").unwrap()
});

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classified {
    pub name: String,
    pub author: String,
    pub tags: Vec<String>,
}

/// Split a work's display name (extension already stripped) into name, author and tags.
///
/// Grammar: `(tag)? [author]? name ((tag)|[tag])*`. Every trailing tag is kept,
/// in filename order, after the leading tag. Empty tags are dropped. When no
/// core name is left the input is returned verbatim as the name.
pub fn classify(filename: &str) -> Classified {
    let verbatim = || Classified {
        name: filename.to_string(),
        ..Default::default()
    };

    let Some(caps) = HEAD_RE.captures(filename) else {
        return verbatim();
    };

    let mut rest = caps.name("rest").map_or("", |m| m.as_str());
    let mut trailing = Vec::new();
    while let Some(tail) = TAIL_TAG_RE.captures(rest) {
        let whole = tail.get(0).map_or(0..0, |m| m.range());
        if whole.start == 0 {
            // Nothing but tags left, so there is no core name.
            return verbatim();
        }
        let tag = tail
            .name("paren")
            .or_else(|| tail.name("bracket"))
            .map_or("", |m| m.as_str());
        trailing.push(tag.to_string());
        rest = &rest[..whole.start];
    }

    let name = rest.trim();
    if name.is_empty() {
        return verbatim();
    }

    let mut tags = Vec::with_capacity(trailing.len() + 1);
    if let Some(lead) = caps.name("lead") {
        tags.push(lead.as_str().to_string());
    }
    tags.extend(trailing.into_iter().rev());
    tags.retain(|t| !t.is_empty());

    Classified {
        name: name.to_string(),
        author: caps.name("author").map_or("", |m| m.as_str()).to_string(),
        tags,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_author_name_and_all_trailing_tags() {
        let c = classify("[AuthorX] Some Title (tag1)(tag2)");
        assert_eq!(c.author, "AuthorX");
        assert_eq!(c.name, "Some Title");
        assert_eq!(c.tags, vec!["tag1", "tag2"]);
    }

    #[test]
    fn test_leading_tag_comes_first() {
        let c = classify("(C99) [Circle] Title [Digital] (English)");
        assert_eq!(c.author, "Circle");
        assert_eq!(c.name, "Title");
        assert_eq!(c.tags, vec!["C99", "Digital", "English"]);
    }

    #[test]
    fn test_plain_name() {
        let c = classify("Just A Name");
        assert_eq!(c.name, "Just A Name");
        assert!(c.author.is_empty());
        assert!(c.tags.is_empty());
    }

    #[test]
    fn test_no_core_name_falls_back_to_verbatim() {
        for input in ["[Author]", "(tag)", "(a)(b)", "[Author] (tag)", ""] {
            let c = classify(input);
            assert_eq!(c.name, input, "input {:?}", input);
            assert!(c.author.is_empty());
            assert!(c.tags.is_empty());
        }
    }

    #[test]
    fn test_parenthesized_word_inside_name() {
        let c = classify("(tag) (Another) Title");
        assert_eq!(c.name, "(Another) Title");
        assert_eq!(c.tags, vec!["tag"]);
    }

    #[test]
    fn test_tags_are_not_deduplicated() {
        let c = classify("Title (x) (x)");
        assert_eq!(c.name, "Title");
        assert_eq!(c.tags, vec!["x", "x"]);
    }

    #[test]
    fn test_empty_tags_dropped() {
        let c = classify("Title ()");
        assert_eq!(c.name, "Title");
        assert!(c.tags.is_empty());
    }

    #[test]
    fn test_unicode_names() {
        let c = classify("[作者] 漫画のタイトル (第1巻)");
        assert_eq!(c.author, "作者");
        assert_eq!(c.name, "漫画のタイトル");
        assert_eq!(c.tags, vec!["第1巻"]);
    }
}
